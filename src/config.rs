//! Explicit connector configuration.
//!
//! Every config can be built directly or from the flat string properties a
//! host hands over ([`SourceConfig::from_properties`] and friends). Both paths
//! end in `validate`, so a config that exists has already been checked.
//!
//! # Examples
//!
//! ```
//! use sluice::SourceConfig;
//! use sluice::config::keys;
//! use std::collections::HashMap;
//!
//! let props: HashMap<String, String> = [
//!     (keys::REFERENCE_NAME, "students"),
//!     (keys::CONNECTION_STRING, "memory://db"),
//!     (keys::DRIVER, "memory"),
//!     (keys::IMPORT_QUERY, "SELECT * FROM student WHERE $CONDITIONS"),
//!     (keys::BOUNDING_QUERY, "SELECT MIN(ID), MAX(ID) FROM student"),
//!     (keys::SPLIT_BY, "ID"),
//!     (keys::NUM_SPLITS, "4"),
//! ]
//! .into_iter()
//! .map(|(k, v)| (k.to_string(), v.to_string()))
//! .collect();
//!
//! let config = SourceConfig::from_properties(&props)?;
//! assert_eq!(config.num_splits, 4);
//! # Ok::<(), sluice::ConnectorError>(())
//! ```

use crate::error::{ConnectorError, Result};
use crate::query;
use crate::schema::{ColumnCase, NameMatching, Schema};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

/// Property keys understood by `from_properties`.
pub mod keys {
    pub const CONNECTION_STRING: &str = "connectionString";
    pub const USER: &str = "user";
    pub const PASSWORD: &str = "password";
    pub const DRIVER: &str = "jdbcPluginName";
    pub const REFERENCE_NAME: &str = "referenceName";
    pub const IMPORT_QUERY: &str = "importQuery";
    pub const BOUNDING_QUERY: &str = "boundingQuery";
    pub const SPLIT_BY: &str = "splitBy";
    pub const NUM_SPLITS: &str = "numSplits";
    pub const COLUMN_NAME_CASE: &str = "columnNameCase";
    pub const SCHEMA: &str = "schema";
    pub const NAME: &str = "name";
    pub const ROW_FIELD: &str = "schema.row.field";
    pub const ROW_FIELD_CASE_SENSITIVE: &str = "case.sensitive.row.field";
    pub const FIELD_PROJECTION: &str = "fieldProjection";
    pub const TABLE_NAME: &str = "tableName";
    pub const COLUMNS: &str = "columns";
    pub const PATH: &str = "path";
    pub const DELIMITER: &str = "delimiter";
    pub const WRITE_HEADER: &str = "writeHeader";
    pub const EXTENSION: &str = "extension";
    pub const LINES_PER_SPLIT: &str = "linesPerSplit";
}

static SPLIT_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^("[^"]+"|[A-Za-z_][A-Za-z0-9_$]*)(\.("[^"]+"|[A-Za-z_][A-Za-z0-9_$]*))*$"#)
        .expect("valid split column regex")
});

type Properties = HashMap<String, String>;

fn required<'a>(props: &'a Properties, key: &str) -> Result<&'a str> {
    match props.get(key).map(|s| s.trim()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConnectorError::config(key, "required property is missing")),
    }
}

fn optional<'a>(props: &'a Properties, key: &str) -> Option<&'a str> {
    props.get(key).map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn parse_bool(props: &Properties, key: &str, default: bool) -> Result<bool> {
    match optional(props, key) {
        None => Ok(default),
        Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
        Some(v) => Err(ConnectorError::config(
            key,
            format!("expected true or false, got '{v}'"),
        )),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a split count. Zero and negative counts are a planning error, not a
/// config typo, so they surface as `InvalidSplitRange`.
fn parse_num_splits(props: &Properties) -> Result<usize> {
    let Some(raw) = optional(props, keys::NUM_SPLITS) else {
        return Ok(1);
    };
    let n: i64 = raw.parse().map_err(|_| {
        ConnectorError::config(keys::NUM_SPLITS, format!("'{raw}' is not an integer"))
    })?;
    if n <= 0 {
        return Err(ConnectorError::InvalidSplitRange(format!(
            "number of splits must be positive, got {n}"
        )));
    }
    usize::try_from(n).map_err(|_| ConnectorError::config(keys::NUM_SPLITS, "too large"))
}

/// What to do with a record field that has no destination column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FieldProjection {
    /// Unmapped fields are an error.
    #[default]
    Strict,
    /// Unmapped fields are dropped.
    Subset,
}

impl FieldProjection {
    fn from_properties(props: &Properties) -> Result<Self> {
        match optional(props, keys::FIELD_PROJECTION).map(str::to_ascii_lowercase) {
            None => Ok(Self::Strict),
            Some(v) if v == "strict" => Ok(Self::Strict),
            Some(v) if v == "subset" => Ok(Self::Subset),
            Some(v) => Err(ConnectorError::config(
                keys::FIELD_PROJECTION,
                format!("expected strict or subset, got '{v}'"),
            )),
        }
    }
}

/// How to reach a database.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Name the injected driver must report.
    pub driver: String,
}

impl ConnectionConfig {
    /// Build and validate.
    ///
    /// # Errors
    /// See [`ConnectionConfig::validate`].
    pub fn new(
        url: impl Into<String>,
        driver: impl Into<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self> {
        let cfg = Self {
            url: url.into(),
            username,
            password,
            driver: driver.into(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read `connectionString`, `jdbcPluginName`, `user` and `password`.
    ///
    /// An empty `password` is kept as an empty password; an empty `user` is
    /// treated as absent.
    ///
    /// # Errors
    /// Missing required keys, or the credential rule in [`ConnectionConfig::validate`].
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let cfg = Self {
            url: required(props, keys::CONNECTION_STRING)?.to_string(),
            driver: required(props, keys::DRIVER)?.to_string(),
            username: optional(props, keys::USER).map(str::to_string),
            password: props.get(keys::PASSWORD).cloned(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Username and password must be given together; an empty password counts
    /// as given.
    ///
    /// # Errors
    /// `InvalidConfig` naming the missing half, or an empty url/driver.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(ConnectorError::config(keys::CONNECTION_STRING, "must not be empty"));
        }
        if self.driver.trim().is_empty() {
            return Err(ConnectorError::config(keys::DRIVER, "must not be empty"));
        }
        match (&self.username, &self.password) {
            (Some(_), None) => Err(ConnectorError::config(
                keys::PASSWORD,
                "a password must be given together with a username (it may be empty)",
            )),
            (None, Some(_)) => Err(ConnectorError::config(
                keys::USER,
                "a username must be given together with a password",
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("driver", &self.driver)
            .finish()
    }
}

/// Configuration of a partitioned database source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    pub reference_name: String,
    pub connection: ConnectionConfig,
    /// Must contain [`crate::query::CONDITIONS_TOKEN`].
    pub import_query: String,
    /// Returns one row `(MIN, MAX)` of the split column. Needed when
    /// `num_splits > 1`.
    pub bounding_query: Option<String>,
    /// Split column. Needed when `num_splits > 1`.
    pub split_by: Option<String>,
    pub num_splits: usize,
    pub column_case: ColumnCase,
    /// Expected output schema; derived from the result set when absent.
    pub schema: Option<Schema>,
}

impl SourceConfig {
    /// A single-split source over `import_query`.
    pub fn new(
        reference_name: impl Into<String>,
        connection: ConnectionConfig,
        import_query: impl Into<String>,
    ) -> Self {
        Self {
            reference_name: reference_name.into(),
            connection,
            import_query: import_query.into(),
            bounding_query: None,
            split_by: None,
            num_splits: 1,
            column_case: ColumnCase::Exact,
            schema: None,
        }
    }

    /// Split the import across `num_splits` ranges of `split_by`.
    #[must_use]
    pub fn with_splits(
        mut self,
        split_by: impl Into<String>,
        bounding_query: impl Into<String>,
        num_splits: usize,
    ) -> Self {
        self.split_by = Some(split_by.into());
        self.bounding_query = Some(bounding_query.into());
        self.num_splits = num_splits;
        self
    }

    #[must_use]
    pub const fn with_column_case(mut self, case: ColumnCase) -> Self {
        self.column_case = case;
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// # Errors
    /// Missing keys, malformed values, or anything [`SourceConfig::validate`] rejects.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let cfg = Self {
            reference_name: required(props, keys::REFERENCE_NAME)?.to_string(),
            connection: ConnectionConfig::from_properties(props)?,
            import_query: required(props, keys::IMPORT_QUERY)?.to_string(),
            bounding_query: optional(props, keys::BOUNDING_QUERY).map(str::to_string),
            split_by: optional(props, keys::SPLIT_BY).map(str::to_string),
            num_splits: parse_num_splits(props)?,
            column_case: optional(props, keys::COLUMN_NAME_CASE)
                .unwrap_or_default()
                .parse()?,
            schema: optional(props, keys::SCHEMA).map(Schema::from_json).transpose()?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// `InvalidSplitRange` for zero splits, `InvalidConfig` for a query
    /// without `$CONDITIONS`, a multi-split config lacking a split column or
    /// bounding query, or a malformed split column name.
    pub fn validate(&self) -> Result<()> {
        self.connection.validate()?;
        if self.num_splits == 0 {
            return Err(ConnectorError::InvalidSplitRange(
                "number of splits must be positive, got 0".into(),
            ));
        }
        query::validate_import_query(&self.import_query)?;
        if self.num_splits > 1 {
            let split_by = self.split_by.as_deref().ok_or_else(|| {
                ConnectorError::config(keys::SPLIT_BY, "required when numSplits > 1")
            })?;
            if !SPLIT_COLUMN.is_match(split_by) {
                return Err(ConnectorError::config(
                    keys::SPLIT_BY,
                    format!("'{split_by}' is not a column name"),
                ));
            }
            match self.bounding_query.as_deref() {
                Some(q) if !q.trim().is_empty() => {}
                _ => {
                    return Err(ConnectorError::config(
                        keys::BOUNDING_QUERY,
                        "required when numSplits > 1",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Configuration of a key-value table sink.
#[derive(Clone, Debug)]
pub struct TableSinkConfig {
    pub name: String,
    pub schema: Schema,
    /// Field whose value becomes the row key.
    pub row_field: String,
    pub row_field_case_sensitive: bool,
    pub projection: FieldProjection,
}

impl TableSinkConfig {
    /// # Errors
    /// See [`TableSinkConfig::validate`].
    pub fn new(name: impl Into<String>, schema: Schema, row_field: impl Into<String>) -> Result<Self> {
        let cfg = Self {
            name: name.into(),
            schema,
            row_field: row_field.into(),
            row_field_case_sensitive: true,
            projection: FieldProjection::Strict,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// Missing keys, malformed schema JSON, or a failed validation.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let cfg = Self {
            name: required(props, keys::NAME)?.to_string(),
            schema: Schema::from_json(required(props, keys::SCHEMA)?)?,
            row_field: required(props, keys::ROW_FIELD)?.to_string(),
            row_field_case_sensitive: parse_bool(props, keys::ROW_FIELD_CASE_SENSITIVE, true)?,
            projection: FieldProjection::from_properties(props)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Name-matching mode for the row-key lookup.
    #[must_use]
    pub const fn row_field_matching(&self) -> NameMatching {
        NameMatching::from_case_sensitive(self.row_field_case_sensitive)
    }

    /// The row field must exist in the schema under the configured matching.
    ///
    /// # Errors
    /// `InvalidConfig` for an empty table name or an unknown row field.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ConnectorError::config(keys::NAME, "must not be empty"));
        }
        let rebound = self.schema.rebind(self.row_field_matching())?;
        if rebound.index_of(&self.row_field).is_none() {
            return Err(ConnectorError::config(
                keys::ROW_FIELD,
                format!("'{}' is not a field of the schema", self.row_field),
            ));
        }
        Ok(())
    }
}

/// Configuration of a delimited text sink.
#[derive(Clone, Debug)]
pub struct TextSinkConfig {
    /// Output directory.
    pub path: PathBuf,
    pub delimiter: u8,
    pub write_header: bool,
    /// Destination columns in order; all record fields when absent.
    pub columns: Option<Vec<String>>,
    pub projection: FieldProjection,
    /// Part-file extension; a trailing `.gz`, `.zst`, `.bz2` or `.xz`
    /// selects compression.
    pub extension: String,
}

impl TextSinkConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
            write_header: false,
            columns: None,
            projection: FieldProjection::Strict,
            extension: "csv".to_string(),
        }
    }

    #[must_use]
    pub const fn with_header(mut self, write_header: bool) -> Self {
        self.write_header = write_header;
        self
    }

    #[must_use]
    pub fn with_columns(mut self, columns: Vec<String>, projection: FieldProjection) -> Self {
        self.columns = Some(columns);
        self.projection = projection;
        self
    }

    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// # Errors
    /// Missing `path`, a multi-byte delimiter, or bad booleans/enums.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let delimiter = match props.get(keys::DELIMITER).map(String::as_str) {
            None | Some("") => b',',
            Some("\\t") => b'\t',
            Some(d) if d.len() == 1 => d.as_bytes()[0],
            Some(d) => {
                return Err(ConnectorError::config(
                    keys::DELIMITER,
                    format!("expected a single byte, got '{d}'"),
                ));
            }
        };
        let cfg = Self {
            path: PathBuf::from(required(props, keys::PATH)?),
            delimiter,
            write_header: parse_bool(props, keys::WRITE_HEADER, false)?,
            columns: optional(props, keys::COLUMNS).map(parse_list),
            projection: FieldProjection::from_properties(props)?,
            extension: optional(props, keys::EXTENSION).unwrap_or("csv").to_string(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// `InvalidConfig` for an empty path or an empty column list.
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(ConnectorError::config(keys::PATH, "must not be empty"));
        }
        if matches!(&self.columns, Some(c) if c.is_empty()) {
            return Err(ConnectorError::config(keys::COLUMNS, "must list at least one column"));
        }
        Ok(())
    }
}

/// Configuration of a database table sink.
#[derive(Clone, Debug)]
pub struct DatabaseSinkConfig {
    pub connection: ConnectionConfig,
    pub table: String,
    /// Destination columns; all table columns when absent. The `columns`
    /// property value `*` also selects all table columns.
    pub columns: Option<Vec<String>>,
    pub projection: FieldProjection,
}

/// Column selection of a database sink; a lone `*` means every column.
fn parse_column_selection(value: &str) -> Option<Vec<String>> {
    (value.trim() != ALL_COLUMNS).then(|| parse_list(value))
}

const ALL_COLUMNS: &str = "*";

impl DatabaseSinkConfig {
    pub fn new(connection: ConnectionConfig, table: impl Into<String>) -> Self {
        Self {
            connection,
            table: table.into(),
            columns: None,
            projection: FieldProjection::Strict,
        }
    }

    #[must_use]
    pub fn with_columns(mut self, columns: Vec<String>, projection: FieldProjection) -> Self {
        self.columns = Some(columns);
        self.projection = projection;
        self
    }

    /// # Errors
    /// Missing keys or a failed validation.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let cfg = Self {
            connection: ConnectionConfig::from_properties(props)?,
            table: required(props, keys::TABLE_NAME)?.to_string(),
            columns: optional(props, keys::COLUMNS).and_then(parse_column_selection),
            projection: FieldProjection::from_properties(props)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// Connection rule violations, an empty table name or column list, or a
    /// `*` entry inside the column list.
    pub fn validate(&self) -> Result<()> {
        self.connection.validate()?;
        if self.table.trim().is_empty() {
            return Err(ConnectorError::config(keys::TABLE_NAME, "must not be empty"));
        }
        if matches!(&self.columns, Some(c) if c.is_empty()) {
            return Err(ConnectorError::config(keys::COLUMNS, "must list at least one column"));
        }
        if matches!(&self.columns, Some(c) if c.iter().any(|name| name == ALL_COLUMNS)) {
            return Err(ConnectorError::config(
                keys::COLUMNS,
                "'*' is only accepted as the whole property value",
            ));
        }
        Ok(())
    }
}
