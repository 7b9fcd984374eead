//! Schemas, name matching, compatibility and records.

use anyhow::Result;
use sluice::{ConnectorError, Field, LogicalType, NameMatching, Record, Schema, Value};
use std::sync::Arc;

fn student_schema(matching: NameMatching) -> Result<Schema> {
    Ok(Schema::with_matching(
        "student",
        vec![
            Field::of("ID", LogicalType::Int),
            Field::nullable("Name", LogicalType::String),
            Field::nullable("score", LogicalType::Double),
        ],
        matching,
    )?)
}

#[test]
fn test_case_sensitive_lookup() -> Result<()> {
    let schema = student_schema(NameMatching::CaseSensitive)?;
    assert_eq!(schema.index_of("Name"), Some(1));
    assert_eq!(schema.index_of("NAME"), None);
    assert_eq!(schema.index_of("name"), None);
    Ok(())
}

#[test]
fn test_case_insensitive_lookup() -> Result<()> {
    let schema = student_schema(NameMatching::CaseInsensitive)?;
    assert_eq!(schema.index_of("NAME"), Some(1));
    assert_eq!(schema.index_of("name"), Some(1));
    assert_eq!(schema.field("SCORE").map(|f| f.logical_type), Some(LogicalType::Double));
    Ok(())
}

#[test]
fn test_uniqueness_follows_matching_mode() -> Result<()> {
    let fields = vec![
        Field::of("id", LogicalType::Int),
        Field::of("ID", LogicalType::Int),
    ];
    Schema::new("dup", fields.clone())?;
    let err = Schema::with_matching("dup", fields, NameMatching::CaseInsensitive).unwrap_err();
    assert!(matches!(err, ConnectorError::SchemaMismatch { .. }), "{err:?}");

    let err = Schema::new("dup", vec![Field::of("a", LogicalType::Int), Field::of("a", LogicalType::Long)])
        .unwrap_err();
    assert!(matches!(err, ConnectorError::SchemaMismatch { ref field, .. } if field == "a"));
    Ok(())
}

#[test]
fn test_json_round_trip() -> Result<()> {
    let schema = Schema::from_json(
        r#"{"name":"student","fields":[
            {"name":"ID","type":"int"},
            {"name":"NAME","type":"string","nullable":true},
            {"name":"PHOTO","type":"bytes","nullable":true}]}"#,
    )?;
    assert_eq!(schema.name(), "student");
    assert_eq!(schema.len(), 3);
    assert!(!schema.fields()[0].nullable);
    assert_eq!(Schema::from_json(&schema.to_json()?)?, schema);

    let unnamed = Schema::from_json(r#"{"fields":[{"name":"x","type":"long"}]}"#)?;
    assert_eq!(unnamed.name(), "record");
    Ok(())
}

#[test]
fn test_malformed_json_is_invalid_config() {
    let err = Schema::from_json(r#"{"fields":[{"name":"x","type":"decimal"}]}"#).unwrap_err();
    assert!(matches!(err, ConnectorError::InvalidConfig { ref key, .. } if key == "schema"));
}

#[test]
fn test_compatibility_requires_non_nullable_fields() -> Result<()> {
    let source = Schema::new(
        "src",
        vec![Field::of("id", LogicalType::Int), Field::nullable("name", LogicalType::String)],
    )?;

    let ok = Schema::new(
        "dst",
        vec![Field::of("id", LogicalType::Int), Field::nullable("extra", LogicalType::Long)],
    )?;
    source.check_compatible(&ok)?;

    let missing = Schema::new("dst", vec![Field::of("age", LogicalType::Int)])?;
    let err = source.check_compatible(&missing).unwrap_err();
    assert!(matches!(err, ConnectorError::SchemaMismatch { ref field, .. } if field == "age"));

    let wrong_type = Schema::new("dst", vec![Field::of("id", LogicalType::Long)])?;
    let err = source.check_compatible(&wrong_type).unwrap_err();
    assert!(matches!(err, ConnectorError::SchemaMismatch { ref field, .. } if field == "id"));
    Ok(())
}

#[test]
fn test_compatibility_honors_case_insensitive_destination() -> Result<()> {
    let source = Schema::new("src", vec![Field::of("ID", LogicalType::Int)])?;
    let strict = Schema::new("dst", vec![Field::of("id", LogicalType::Int)])?;
    assert!(source.check_compatible(&strict).is_err());

    let relaxed = strict.rebind(NameMatching::CaseInsensitive)?;
    source.check_compatible(&relaxed)?;
    Ok(())
}

#[test]
fn test_record_type_checks() -> Result<()> {
    let schema = Arc::new(student_schema(NameMatching::CaseSensitive)?);
    let record = Record::new(
        Arc::clone(&schema),
        vec![Value::Int(1), Value::Null, Value::Double(9.5)],
    )?;
    assert_eq!(record.get("ID"), Some(&Value::Int(1)));
    assert_eq!(record.get("Name"), Some(&Value::Null));

    let err = Record::new(Arc::clone(&schema), vec![Value::Int(1)]).unwrap_err();
    assert!(matches!(err, ConnectorError::SchemaMismatch { .. }));

    let err = Record::new(
        Arc::clone(&schema),
        vec![Value::Long(1), Value::Null, Value::Null],
    )
    .unwrap_err();
    assert!(matches!(err, ConnectorError::SchemaMismatch { ref field, .. } if field == "ID"));
    Ok(())
}

#[test]
fn test_record_builder_and_json() -> Result<()> {
    let schema = Arc::new(student_schema(NameMatching::CaseInsensitive)?);
    let record = Record::builder(schema)
        .set("id", 7)?
        .set("NAME", "Ada")?
        .build()?;
    assert_eq!(record.values(), &[Value::Int(7), Value::String("Ada".into()), Value::Null]);

    let json = serde_json::to_value(&record)?;
    assert_eq!(json, serde_json::json!({"ID": 7, "Name": "Ada", "score": null}));
    Ok(())
}
