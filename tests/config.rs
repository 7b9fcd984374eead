//! Configuration parsing and validation.

use anyhow::Result;
use sluice::config::keys;
use sluice::{
    ColumnCase, ConnectionConfig, ConnectorError, DatabaseSinkConfig, FieldProjection, SourceConfig,
    TableSinkConfig, TextSinkConfig,
};
use std::collections::HashMap;

fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn source_props() -> HashMap<String, String> {
    props(&[
        (keys::REFERENCE_NAME, "students"),
        (keys::CONNECTION_STRING, "memory://db"),
        (keys::DRIVER, "memory"),
        (keys::IMPORT_QUERY, "SELECT * FROM student WHERE $CONDITIONS"),
        (keys::BOUNDING_QUERY, "SELECT MIN(ID), MAX(ID) FROM student"),
        (keys::SPLIT_BY, "ID"),
        (keys::NUM_SPLITS, "4"),
    ])
}

#[test]
fn test_credential_matrix() {
    let cases: [(Option<&str>, Option<&str>, bool); 5] = [
        (None, None, true),
        (Some("emptyPwdUser"), Some(""), true),
        (Some("user"), Some("secret"), true),
        (Some("user"), None, false),
        (None, Some("secret"), false),
    ];
    for (user, password, valid) in cases {
        let result = ConnectionConfig::new(
            "memory://db",
            "memory",
            user.map(str::to_string),
            password.map(str::to_string),
        );
        assert_eq!(result.is_ok(), valid, "user={user:?} password={password:?}");
        if let Err(e) = result {
            assert!(matches!(e, ConnectorError::InvalidConfig { .. }), "{e:?}");
        }
    }
}

#[test]
fn test_empty_password_property_is_kept() -> Result<()> {
    let cfg = ConnectionConfig::from_properties(&props(&[
        (keys::CONNECTION_STRING, "memory://db"),
        (keys::DRIVER, "memory"),
        (keys::USER, "emptyPwdUser"),
        (keys::PASSWORD, ""),
    ]))?;
    assert_eq!(cfg.username.as_deref(), Some("emptyPwdUser"));
    assert_eq!(cfg.password.as_deref(), Some(""));
    Ok(())
}

#[test]
fn test_debug_redacts_password() -> Result<()> {
    let cfg = ConnectionConfig::new(
        "memory://db",
        "memory",
        Some("user".into()),
        Some("hunter2".into()),
    )?;
    let shown = format!("{cfg:?}");
    assert!(!shown.contains("hunter2"), "{shown}");
    assert!(shown.contains("redacted"));
    Ok(())
}

#[test]
fn test_source_from_properties() -> Result<()> {
    let cfg = SourceConfig::from_properties(&source_props())?;
    assert_eq!(cfg.reference_name, "students");
    assert_eq!(cfg.num_splits, 4);
    assert_eq!(cfg.split_by.as_deref(), Some("ID"));
    assert_eq!(cfg.column_case, ColumnCase::Exact);
    assert!(cfg.schema.is_none());
    Ok(())
}

#[test]
fn test_non_positive_split_count() {
    for n in ["0", "-3"] {
        let mut p = source_props();
        p.insert(keys::NUM_SPLITS.into(), n.into());
        let err = SourceConfig::from_properties(&p).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidSplitRange(_)), "numSplits={n}: {err:?}");
    }
}

#[test]
fn test_multi_split_needs_split_column_and_bounding_query() {
    for missing in [keys::SPLIT_BY, keys::BOUNDING_QUERY] {
        let mut p = source_props();
        p.remove(missing);
        let err = SourceConfig::from_properties(&p).unwrap_err();
        assert!(
            matches!(err, ConnectorError::InvalidConfig { ref key, .. } if key == missing),
            "{missing}: {err:?}"
        );
    }
}

#[test]
fn test_single_split_needs_no_bounds() -> Result<()> {
    let mut p = source_props();
    p.insert(keys::NUM_SPLITS.into(), "1".into());
    p.remove(keys::SPLIT_BY);
    p.remove(keys::BOUNDING_QUERY);
    assert_eq!(SourceConfig::from_properties(&p)?.num_splits, 1);
    Ok(())
}

#[test]
fn test_import_query_needs_conditions() {
    let mut p = source_props();
    p.insert(keys::IMPORT_QUERY.into(), "SELECT * FROM student".into());
    let err = SourceConfig::from_properties(&p).unwrap_err();
    assert!(matches!(err, ConnectorError::InvalidConfig { .. }), "{err:?}");

    // a single split still reads through the placeholder
    p.insert(keys::NUM_SPLITS.into(), "1".into());
    p.remove(keys::SPLIT_BY);
    p.remove(keys::BOUNDING_QUERY);
    let err = SourceConfig::from_properties(&p).unwrap_err();
    assert!(
        matches!(err, ConnectorError::InvalidConfig { ref key, .. } if key == keys::IMPORT_QUERY),
        "{err:?}"
    );
}

#[test]
fn test_column_case_values() -> Result<()> {
    for (raw, expected) in [("upper", ColumnCase::Upper), ("LOWER", ColumnCase::Lower), ("No change", ColumnCase::Exact)] {
        let mut p = source_props();
        p.insert(keys::COLUMN_NAME_CASE.into(), raw.into());
        assert_eq!(SourceConfig::from_properties(&p)?.column_case, expected);
    }
    let mut p = source_props();
    p.insert(keys::COLUMN_NAME_CASE.into(), "mixed".into());
    let err = SourceConfig::from_properties(&p).unwrap_err();
    assert!(matches!(err, ConnectorError::InvalidConfig { ref key, .. } if key == keys::COLUMN_NAME_CASE));
    Ok(())
}

#[test]
fn test_table_sink_row_field_case() -> Result<()> {
    let schema = r#"{"name":"s","fields":[{"name":"ID","type":"int"},{"name":"NAME","type":"string","nullable":true}]}"#;
    let base = [
        (keys::NAME, "students"),
        (keys::SCHEMA, schema),
        (keys::ROW_FIELD, "id"),
    ];

    let err = TableSinkConfig::from_properties(&props(&base)).unwrap_err();
    assert!(matches!(err, ConnectorError::InvalidConfig { ref key, .. } if key == keys::ROW_FIELD));

    let mut relaxed = base.to_vec();
    relaxed.push((keys::ROW_FIELD_CASE_SENSITIVE, "false"));
    let cfg = TableSinkConfig::from_properties(&props(&relaxed))?;
    assert!(!cfg.row_field_case_sensitive);
    assert_eq!(cfg.projection, FieldProjection::Strict);
    Ok(())
}

#[test]
fn test_text_sink_properties() -> Result<()> {
    let cfg = TextSinkConfig::from_properties(&props(&[
        (keys::PATH, "/tmp/out"),
        (keys::DELIMITER, "\\t"),
        (keys::WRITE_HEADER, "true"),
        (keys::COLUMNS, "ID, NAME"),
        (keys::FIELD_PROJECTION, "subset"),
        (keys::EXTENSION, "tsv.gz"),
    ]))?;
    assert_eq!(cfg.delimiter, b'\t');
    assert!(cfg.write_header);
    assert_eq!(cfg.columns, Some(vec!["ID".to_string(), "NAME".to_string()]));
    assert_eq!(cfg.projection, FieldProjection::Subset);
    assert_eq!(cfg.extension, "tsv.gz");

    let err = TextSinkConfig::from_properties(&props(&[(keys::PATH, "/tmp/out"), (keys::DELIMITER, "::")]))
        .unwrap_err();
    assert!(matches!(err, ConnectorError::InvalidConfig { ref key, .. } if key == keys::DELIMITER));
    Ok(())
}

#[test]
fn test_database_sink_properties() -> Result<()> {
    let cfg = DatabaseSinkConfig::from_properties(&props(&[
        (keys::CONNECTION_STRING, "memory://db"),
        (keys::DRIVER, "memory"),
        (keys::TABLE_NAME, "student"),
    ]))?;
    assert_eq!(cfg.table, "student");
    assert!(cfg.columns.is_none());

    let err = DatabaseSinkConfig::from_properties(&props(&[
        (keys::CONNECTION_STRING, "memory://db"),
        (keys::DRIVER, "memory"),
    ]))
    .unwrap_err();
    assert!(matches!(err, ConnectorError::InvalidConfig { ref key, .. } if key == keys::TABLE_NAME));
    Ok(())
}
