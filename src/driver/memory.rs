//! In-memory driver for tests and embedding.
//!
//! Understands just enough SQL for the connectors in this crate:
//!
//! - `SELECT MIN(c), MAX(c) FROM t [WHERE ...]`
//! - `SELECT c1, c2 | * FROM t [WHERE a AND b AND ...]`, where each term is
//!   `column <op> literal` (`=`, `<>`, `!=`, `<`, `<=`, `>`, `>=`) or `1 = 1`
//! - `INSERT INTO t (c1, c2) VALUES (?, ?)`
//!
//! Table and column names match case-insensitively; quotes and qualifiers
//! (`"t"."ID"`) are stripped. The driver counts open connections and cursors
//! so tests can assert that every path releases them.

use super::{Connection, Driver, ResultSet};
use crate::config::ConnectionConfig;
use crate::error::{ConnectorError, Result};
use crate::types::sql::{ColumnDescriptor, SqlValue};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

static BOUNDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*SELECT\s+MIN\s*\((.+?)\)\s*,\s*MAX\s*\((.+?)\)\s+FROM\s+(\S+?)(?:\s+WHERE\s+(.*?))?\s*;?\s*$")
        .expect("valid bounds regex")
});

static SELECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*SELECT\s+(.+?)\s+FROM\s+(\S+?)(?:\s+WHERE\s+(.*?))?\s*;?\s*$")
        .expect("valid select regex")
});

static INSERT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*INSERT\s+INTO\s+(\S+?)\s*\((.*?)\)\s*VALUES\s*\((.*?)\)\s*;?\s*$")
        .expect("valid insert regex")
});

static AND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+AND\s+").expect("valid conjunction regex"));

static TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+?)\s*(>=|<=|<>|!=|=|<|>)\s*(.+)$").expect("valid term regex")
});

/// A table to seed the driver with.
#[derive(Clone, Debug)]
pub struct MemoryTableSpec {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl MemoryTableSpec {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_rows(mut self, rows: Vec<Vec<SqlValue>>) -> Self {
        self.rows = rows;
        self
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        let name = unquote(name);
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                ConnectorError::Connection(format!("no column '{name}' in table '{}'", self.name))
            })
    }
}

#[derive(Default)]
struct State {
    tables: HashMap<String, MemoryTableSpec>,
    credentials: Option<(String, String)>,
    unavailable: bool,
    open_connections: usize,
    open_cursors: usize,
    statements: Vec<String>,
}

/// In-memory [`Driver`]. Clones share the same database.
#[derive(Clone)]
pub struct MemoryDriver {
    name: String,
    url: String,
    state: Arc<Mutex<State>>,
}

impl MemoryDriver {
    /// A driver named `memory` serving `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self::named("memory", url)
    }

    pub fn named(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Require these credentials on connect.
    #[must_use]
    pub fn with_credentials(self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.state().credentials = Some((user.into(), password.into()));
        self
    }

    /// Add or replace a table.
    pub fn add_table(&self, table: MemoryTableSpec) {
        self.state().tables.insert(key(&table.name), table);
    }

    /// Make every subsequent `connect` fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Snapshot of a table's rows.
    #[must_use]
    pub fn rows(&self, table: &str) -> Option<Vec<Vec<SqlValue>>> {
        self.state().tables.get(&key(table)).map(|t| t.rows.clone())
    }

    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.state().open_connections
    }

    #[must_use]
    pub fn open_cursors(&self) -> usize {
        self.state().open_cursors
    }

    /// Every statement received so far, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let mut state = self.state();
        if state.unavailable {
            return Err(ConnectorError::Connection(format!(
                "database at '{}' is unavailable",
                config.url
            )));
        }
        if config.url != self.url {
            return Err(ConnectorError::Connection(format!(
                "no database at '{}'",
                config.url
            )));
        }
        if let Some((user, password)) = &state.credentials {
            let ok = config.username.as_deref() == Some(user.as_str())
                && config.password.as_deref() == Some(password.as_str());
            if !ok {
                return Err(ConnectorError::Connection("authentication failed".into()));
            }
        }
        state.open_connections += 1;
        drop(state);
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            open: true,
        }))
    }
}

struct MemoryConnection {
    state: Arc<Mutex<State>>,
    open: bool,
}

impl MemoryConnection {
    fn state(&self) -> Result<MutexGuard<'_, State>> {
        if !self.open {
            return Err(ConnectorError::Connection("connection is closed".into()));
        }
        self.state
            .lock()
            .map_err(|_| ConnectorError::Connection("memory database state poisoned".into()))
    }
}

impl Connection for MemoryConnection {
    fn query(&mut self, sql: &str) -> Result<Box<dyn ResultSet>> {
        let mut state = self.state()?;
        state.statements.push(sql.to_string());

        let (columns, rows) = if let Some(caps) = BOUNDS.captures(sql) {
            let table = table(&state, &caps[3])?;
            let lo = table.column_index(&caps[1])?;
            let hi = table.column_index(&caps[2])?;
            let rows = filter_rows(table, caps.get(4).map(|m| m.as_str()))?;
            let min = rows.iter().map(|r| &r[lo]).filter(|v| !v.is_null()).min_by(|a, b| order(a, b));
            let max = rows.iter().map(|r| &r[hi]).filter(|v| !v.is_null()).max_by(|a, b| order(a, b));
            let columns = vec![
                ColumnDescriptor::new(format!("MIN({})", table.columns[lo].name), table.columns[lo].sql_type, true),
                ColumnDescriptor::new(format!("MAX({})", table.columns[hi].name), table.columns[hi].sql_type, true),
            ];
            let row = vec![
                min.cloned().unwrap_or(SqlValue::Null),
                max.cloned().unwrap_or(SqlValue::Null),
            ];
            (columns, vec![row])
        } else if let Some(caps) = SELECT.captures(sql) {
            let table = table(&state, &caps[2])?;
            let projection: Vec<usize> = if caps[1].trim() == "*" {
                (0..table.columns.len()).collect()
            } else {
                caps[1]
                    .split(',')
                    .map(|c| table.column_index(c))
                    .collect::<Result<_>>()?
            };
            let columns = projection.iter().map(|&i| table.columns[i].clone()).collect();
            let rows = filter_rows(table, caps.get(3).map(|m| m.as_str()))?
                .into_iter()
                .map(|r| projection.iter().map(|&i| r[i].clone()).collect())
                .collect();
            (columns, rows)
        } else {
            return Err(ConnectorError::Connection(format!("unsupported query: {sql}")));
        };

        state.open_cursors += 1;
        drop(state);
        Ok(Box::new(MemoryResultSet {
            state: Arc::clone(&self.state),
            columns,
            rows: rows.into_iter(),
            open: true,
        }))
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let mut state = self.state()?;
        state.statements.push(sql.to_string());
        let caps = INSERT
            .captures(sql)
            .ok_or_else(|| ConnectorError::Connection(format!("unsupported statement: {sql}")))?;
        let placeholders = caps[3].split(',').map(str::trim).collect::<Vec<_>>();
        if placeholders.iter().any(|p| *p != "?") || placeholders.len() != params.len() {
            return Err(ConnectorError::Connection(format!(
                "expected {} parameters, got {}",
                placeholders.len(),
                params.len()
            )));
        }
        let table = state
            .tables
            .get_mut(&key(&caps[1]))
            .ok_or_else(|| ConnectorError::Connection(format!("no table '{}'", unquote(&caps[1]))))?;
        let targets = caps[2]
            .split(',')
            .map(|c| table.column_index(c))
            .collect::<Result<Vec<_>>>()?;
        if targets.len() != params.len() {
            return Err(ConnectorError::Connection(format!(
                "{} columns but {} values",
                targets.len(),
                params.len()
            )));
        }
        let mut row = vec![SqlValue::Null; table.columns.len()];
        for (idx, value) in targets.into_iter().zip(params) {
            if value.is_null() && !table.columns[idx].nullable {
                return Err(ConnectorError::Connection(format!(
                    "column '{}' does not accept NULL",
                    table.columns[idx].name
                )));
            }
            row[idx] = value.clone();
        }
        table.rows.push(row);
        Ok(1)
    }

    fn table_columns(&mut self, name: &str) -> Result<Vec<ColumnDescriptor>> {
        let state = self.state()?;
        Ok(table(&state, name)?.columns.clone())
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.open_connections = state.open_connections.saturating_sub(1);
        }
        Ok(())
    }
}

struct MemoryResultSet {
    state: Arc<Mutex<State>>,
    columns: Vec<ColumnDescriptor>,
    rows: std::vec::IntoIter<Vec<SqlValue>>,
    open: bool,
}

impl ResultSet for MemoryResultSet {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>> {
        if !self.open {
            return Err(ConnectorError::Connection("result set is closed".into()));
        }
        Ok(self.rows.next())
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.open_cursors = state.open_cursors.saturating_sub(1);
        }
        Ok(())
    }
}

fn unquote(name: &str) -> &str {
    let name = name.trim();
    let last = name.rsplit('.').next().unwrap_or(name);
    last.trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']')
}

fn key(name: &str) -> String {
    unquote(name).to_lowercase()
}

fn table<'a>(state: &'a State, name: &str) -> Result<&'a MemoryTableSpec> {
    state
        .tables
        .get(&key(name))
        .ok_or_else(|| ConnectorError::Connection(format!("no table '{}'", unquote(name))))
}

fn filter_rows<'a>(table: &'a MemoryTableSpec, clause: Option<&str>) -> Result<Vec<&'a Vec<SqlValue>>> {
    let Some(clause) = clause.filter(|c| !c.trim().is_empty()) else {
        return Ok(table.rows.iter().collect());
    };
    let mut terms = Vec::new();
    for raw in AND.split(clause) {
        let term = raw.trim().trim_start_matches('(').trim_end_matches(')').trim();
        if term == "1 = 1" || term == "1=1" {
            continue;
        }
        let caps = TERM
            .captures(term)
            .ok_or_else(|| ConnectorError::Connection(format!("unsupported condition: {term}")))?;
        let column = table.column_index(&caps[1])?;
        let op = caps[2].to_string();
        let literal = parse_literal(caps[3].trim())?;
        terms.push((column, op, literal));
    }
    Ok(table
        .rows
        .iter()
        .filter(|row| {
            terms.iter().all(|(column, op, literal)| {
                let Some(ord) = compare(&row[*column], literal) else {
                    return false;
                };
                match op.as_str() {
                    "=" => ord == Ordering::Equal,
                    "<>" | "!=" => ord != Ordering::Equal,
                    "<" => ord == Ordering::Less,
                    "<=" => ord != Ordering::Greater,
                    ">" => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                }
            })
        })
        .collect())
}

fn parse_literal(raw: &str) -> Result<SqlValue> {
    if let Some(s) = raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return Ok(SqlValue::Text(s.replace("''", "'")));
    }
    if let Ok(v) = raw.parse::<i64>() {
        return Ok(SqlValue::BigInt(v));
    }
    raw.parse::<f64>()
        .map(SqlValue::Double)
        .map_err(|_| ConnectorError::Connection(format!("unsupported literal: {raw}")))
}

fn integral(v: &SqlValue) -> Option<i64> {
    match v {
        SqlValue::TinyInt(v) => Some(i64::from(*v)),
        SqlValue::SmallInt(v) => Some(i64::from(*v)),
        SqlValue::Integer(v) => Some(i64::from(*v)),
        SqlValue::BigInt(v) => Some(*v),
        _ => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn numeric(v: &SqlValue) -> Option<f64> {
    use rust_decimal::prelude::ToPrimitive;
    match v {
        SqlValue::Real(v) => Some(f64::from(*v)),
        SqlValue::Double(v) => Some(*v),
        SqlValue::Decimal(d) => d.to_f64(),
        other => integral(other).map(|i| i as f64),
    }
}

/// SQL comparison; `None` when either side is null or the kinds differ.
fn compare(a: &SqlValue, b: &SqlValue) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (integral(a), integral(b)) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (numeric(a), numeric(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (SqlValue::Text(x), SqlValue::Text(y)) => Some(x.cmp(y)),
        (SqlValue::Date(x), SqlValue::Date(y)) => Some(x.cmp(y)),
        (SqlValue::Time(x), SqlValue::Time(y)) => Some(x.cmp(y)),
        (SqlValue::Timestamp(x), SqlValue::Timestamp(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn order(a: &SqlValue, b: &SqlValue) -> Ordering {
    compare(a, b).unwrap_or(Ordering::Equal)
}
