//! Import-query templating and bounding-query interpretation.
//!
//! # Features
//!
//! - **`$CONDITIONS` substitution** - every import query carries the
//!   placeholder; each split replaces it with its own parenthesized predicate
//! - **Bounding rows** - the `(MIN, MAX)` row of a bounding query becomes the
//!   range handed to the split planner
//! - **Empty tables** - `(NULL, NULL)` reads as "no bounds" rather than an
//!   error; a single NULL bound is rejected
//!
//! # Examples
//!
//! ```
//! use sluice::query::{bounded_query, parse_bounds};
//! use sluice::{BoundValue, SqlValue};
//!
//! let sql = bounded_query("SELECT * FROM t WHERE $CONDITIONS", "ID >= 1 AND ID < 4");
//! assert_eq!(sql, "SELECT * FROM t WHERE (ID >= 1 AND ID < 4)");
//!
//! let bounds = parse_bounds(SqlValue::Integer(1), SqlValue::BigInt(10))?;
//! assert_eq!(bounds, Some((BoundValue::Int(1), BoundValue::Int(10))));
//! assert_eq!(parse_bounds(SqlValue::Null, SqlValue::Null)?, None);
//! # Ok::<(), sluice::ConnectorError>(())
//! ```

use crate::error::{ConnectorError, Result};
use crate::split::BoundValue;
use crate::types::sql::SqlValue;
use rust_decimal::prelude::ToPrimitive;

/// Placeholder in an import query that receives the split predicate.
pub const CONDITIONS_TOKEN: &str = "$CONDITIONS";

/// An import query must carry the `$CONDITIONS` placeholder.
///
/// # Errors
/// `InvalidConfig` on the `importQuery` key.
pub fn validate_import_query(query: &str) -> Result<()> {
    if query.contains(CONDITIONS_TOKEN) {
        Ok(())
    } else {
        Err(ConnectorError::config(
            "importQuery",
            format!("query must contain the {CONDITIONS_TOKEN} placeholder"),
        ))
    }
}

/// Substitute `predicate` for every `$CONDITIONS` in `query`.
///
/// The predicate is parenthesized so it composes with surrounding `AND`/`OR`.
#[must_use]
pub fn bounded_query(query: &str, predicate: &str) -> String {
    query.replace(CONDITIONS_TOKEN, &format!("({predicate})"))
}

/// Interpret the `(MIN, MAX)` row of a bounding query.
///
/// Returns `Ok(None)` when both are null (the table is empty).
///
/// # Errors
/// `InvalidSplitRange` when exactly one bound is null, a bound is not
/// numeric, or the two bounds cannot be compared as the same kind of number.
pub fn parse_bounds(min: SqlValue, max: SqlValue) -> Result<Option<(BoundValue, BoundValue)>> {
    match (min.is_null(), max.is_null()) {
        (true, true) => return Ok(None),
        (true, false) | (false, true) => {
            return Err(ConnectorError::InvalidSplitRange(
                "bounding query returned exactly one NULL bound".into(),
            ));
        }
        (false, false) => {}
    }
    let lo = bound_value(min)?;
    let hi = bound_value(max)?;
    // Decimal bounds may come back one integral, one fractional.
    let pair = match (lo, hi) {
        (BoundValue::Int(a), BoundValue::Float(_)) => (int_as_float(a), hi),
        (BoundValue::Float(_), BoundValue::Int(b)) => (lo, int_as_float(b)),
        _ => (lo, hi),
    };
    Ok(Some(pair))
}

#[allow(clippy::cast_precision_loss)]
fn int_as_float(v: i64) -> BoundValue {
    BoundValue::float(v as f64)
}

fn bound_value(value: SqlValue) -> Result<BoundValue> {
    match value {
        SqlValue::TinyInt(v) => Ok(BoundValue::Int(i64::from(v))),
        SqlValue::SmallInt(v) => Ok(BoundValue::Int(i64::from(v))),
        SqlValue::Integer(v) => Ok(BoundValue::Int(i64::from(v))),
        SqlValue::BigInt(v) => Ok(BoundValue::Int(v)),
        SqlValue::Real(v) => Ok(BoundValue::float(f64::from(v))),
        SqlValue::Double(v) => Ok(BoundValue::float(v)),
        SqlValue::Decimal(d) if d.fract().is_zero() => d
            .to_i64()
            .map(BoundValue::Int)
            .ok_or_else(|| ConnectorError::InvalidSplitRange(format!("bound {d} exceeds i64"))),
        SqlValue::Decimal(d) => d
            .to_f64()
            .map(BoundValue::float)
            .ok_or_else(|| ConnectorError::InvalidSplitRange(format!("bound {d} is not representable"))),
        other => Err(ConnectorError::InvalidSplitRange(format!(
            "split column bounds must be numeric, got {}",
            other.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditions_are_parenthesized() {
        let q = bounded_query("SELECT * FROM t WHERE $CONDITIONS", "ID >= 1 AND ID < 4");
        assert_eq!(q, "SELECT * FROM t WHERE (ID >= 1 AND ID < 4)");
    }

    #[test]
    fn empty_table_has_no_bounds() {
        assert_eq!(parse_bounds(SqlValue::Null, SqlValue::Null).unwrap(), None);
    }

    #[test]
    fn one_null_bound_is_rejected() {
        assert!(parse_bounds(SqlValue::Integer(1), SqlValue::Null).is_err());
    }
}
