//! Portable schema model.
//!
//! A [`Schema`] is an ordered, name-unique list of [`Field`]s. Field names are
//! compared case-sensitively unless the schema was built with
//! [`NameMatching::CaseInsensitive`]; the same mode governs both lookups and
//! the uniqueness check.
//!
//! Schemas round-trip through a small JSON document so hosts can pass them as
//! a single configuration property:
//!
//! ```
//! use sluice::schema::{LogicalType, Schema};
//!
//! let schema = Schema::from_json(
//!     r#"{"name":"student","fields":[
//!         {"name":"ID","type":"int"},
//!         {"name":"NAME","type":"string","nullable":true}]}"#,
//! )?;
//! assert_eq!(schema.field("ID").unwrap().logical_type, LogicalType::Int);
//! # Ok::<(), sluice::ConnectorError>(())
//! ```

use crate::error::{ConnectorError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Logical type of a portable field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    Bool,
    Int,
    Long,
    Float,
    Double,
    String,
    Bytes,
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bool => "BOOL",
            Self::Int => "INT",
            Self::Long => "LONG",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::String => "STRING",
            Self::Bytes => "BYTES",
        };
        f.write_str(s)
    }
}

/// One named, typed column of a portable record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub logical_type: LogicalType,
    #[serde(default)]
    pub nullable: bool,
}

impl Field {
    /// A non-nullable field.
    pub fn of(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            nullable: false,
        }
    }

    /// A nullable field.
    pub fn nullable(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            nullable: true,
        }
    }
}

/// How field names are compared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMatching {
    #[default]
    CaseSensitive,
    CaseInsensitive,
}

impl NameMatching {
    /// Build a mode from a "case sensitive?" flag.
    #[must_use]
    pub const fn from_case_sensitive(case_sensitive: bool) -> Self {
        if case_sensitive {
            Self::CaseSensitive
        } else {
            Self::CaseInsensitive
        }
    }

    /// Whether two names refer to the same field under this mode.
    #[must_use]
    pub fn matches(self, a: &str, b: &str) -> bool {
        match self {
            Self::CaseSensitive => a == b,
            Self::CaseInsensitive => a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase(),
        }
    }

    /// Normalized key used for uniqueness checks.
    #[must_use]
    pub fn key<'a>(self, name: &'a str) -> Cow<'a, str> {
        match self {
            Self::CaseSensitive => Cow::Borrowed(name),
            Self::CaseInsensitive => Cow::Owned(name.to_lowercase()),
        }
    }
}

/// How result-set column names are rewritten before matching them to fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnCase {
    #[default]
    Exact,
    Upper,
    Lower,
}

impl ColumnCase {
    /// Apply the rewrite to a column name.
    #[must_use]
    pub fn apply<'a>(self, name: &'a str) -> Cow<'a, str> {
        match self {
            Self::Exact => Cow::Borrowed(name),
            Self::Upper => Cow::Owned(name.to_uppercase()),
            Self::Lower => Cow::Owned(name.to_lowercase()),
        }
    }
}

impl FromStr for ColumnCase {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "exact" | "no change" => Ok(Self::Exact),
            "upper" => Ok(Self::Upper),
            "lower" => Ok(Self::Lower),
            other => Err(ConnectorError::config(
                "columnNameCase",
                format!("unrecognized value '{other}', expected one of exact, upper, lower"),
            )),
        }
    }
}

/// An ordered, name-unique list of fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
    #[serde(skip_serializing_if = "is_case_sensitive")]
    matching: NameMatching,
}

fn is_case_sensitive(m: &NameMatching) -> bool {
    *m == NameMatching::CaseSensitive
}

#[derive(Deserialize)]
struct SchemaDoc {
    #[serde(default = "default_record_name")]
    name: String,
    fields: Vec<Field>,
    #[serde(default)]
    matching: NameMatching,
}

fn default_record_name() -> String {
    "record".to_string()
}

impl Schema {
    /// Build a case-sensitive schema.
    ///
    /// # Errors
    /// Fails with `SchemaMismatch` if two fields share a name.
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Result<Self> {
        Self::with_matching(name, fields, NameMatching::CaseSensitive)
    }

    /// Build a schema with an explicit name-matching mode.
    ///
    /// # Errors
    /// Fails with `SchemaMismatch` if two fields share a name under `matching`.
    pub fn with_matching(
        name: impl Into<String>,
        fields: Vec<Field>,
        matching: NameMatching,
    ) -> Result<Self> {
        let mut seen = HashSet::with_capacity(fields.len());
        for f in &fields {
            if f.name.is_empty() {
                return Err(ConnectorError::mismatch("", "field names must not be empty"));
            }
            if !seen.insert(matching.key(&f.name).into_owned()) {
                return Err(ConnectorError::mismatch(&f.name, "duplicate field name"));
            }
        }
        Ok(Self {
            name: name.into(),
            fields,
            matching,
        })
    }

    /// Parse the JSON form (see module docs).
    ///
    /// # Errors
    /// Fails with `InvalidConfig` on malformed JSON and `SchemaMismatch` on
    /// duplicate names.
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: SchemaDoc = serde_json::from_str(json)
            .map_err(|e| ConnectorError::config("schema", e.to_string()))?;
        Self::with_matching(doc.name, doc.fields, doc.matching)
    }

    /// Render the JSON form.
    ///
    /// # Errors
    /// Only fails if serialization itself fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ConnectorError::Other(e.into()))
    }

    /// Same fields, different matching mode.
    ///
    /// # Errors
    /// Fails if the new mode makes two names collide.
    pub fn rebind(&self, matching: NameMatching) -> Result<Self> {
        Self::with_matching(self.name.clone(), self.fields.clone(), matching)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn matching(&self) -> NameMatching {
        self.matching
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of a field, honoring the matching mode. An exact-case hit wins
    /// over a case-insensitive one.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .or_else(|| match self.matching {
                NameMatching::CaseSensitive => None,
                NameMatching::CaseInsensitive => self
                    .fields
                    .iter()
                    .position(|f| self.matching.matches(&f.name, name)),
            })
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    /// Check that `self` can feed `destination`.
    ///
    /// Every non-nullable destination field must exist here (under the
    /// destination's matching mode) with the same logical type.
    ///
    /// # Errors
    /// `SchemaMismatch` naming the first offending field.
    pub fn check_compatible(&self, destination: &Self) -> Result<()> {
        for want in destination.fields.iter().filter(|f| !f.nullable) {
            let found = self
                .fields
                .iter()
                .find(|f| f.name == want.name)
                .or_else(|| {
                    self.fields
                        .iter()
                        .find(|f| destination.matching.matches(&f.name, &want.name))
                });
            match found {
                None => {
                    return Err(ConnectorError::mismatch(
                        &want.name,
                        "required by the destination but missing from the source",
                    ));
                }
                Some(have) if have.logical_type != want.logical_type => {
                    return Err(ConnectorError::mismatch(
                        &want.name,
                        format!(
                            "source type {} does not match destination type {}",
                            have.logical_type, want.logical_type
                        ),
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
