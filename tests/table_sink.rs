//! Key-value table sink: row keys, cells, projection and idempotent writes.

use anyhow::Result;
use sluice::output::table::{decode_row, encode_row};
use sluice::{
    ConnectorError, FieldProjection, JobContext, KeyValueTable, LogicalType, MemoryTable, Record,
    Schema, SinkVariant, TableSinkConfig, TaskContext, Value, run_task,
};
use sluice::{Field, types::bytes};
use std::sync::Arc;

fn student_schema() -> Result<Schema> {
    Ok(Schema::new(
        "student",
        vec![
            Field::of("ID", LogicalType::Int),
            Field::nullable("NAME", LogicalType::String),
            Field::nullable("SCORE", LogicalType::Double),
        ],
    )?)
}

fn student(schema: &Arc<Schema>, id: i32, name: Option<&str>, score: f64) -> Result<Record> {
    Ok(Record::new(
        Arc::clone(schema),
        vec![
            Value::Int(id),
            name.map_or(Value::Null, |n| Value::String(n.into())),
            Value::Double(score),
        ],
    )?)
}

fn write(table: &MemoryTable, config: TableSinkConfig, records: Vec<Record>) -> Result<u64> {
    let format = SinkVariant::Table {
        config,
        table: Arc::new(table.clone()),
    }
    .into_output_format()?;
    let task = TaskContext::new(&JobContext::new("load"), 0, 0);
    Ok(run_task(format.as_ref(), &task, records.into_iter().map(|r| Ok(((), r))))?)
}

#[test]
fn test_rows_round_trip_through_table() -> Result<()> {
    let schema = Arc::new(student_schema()?);
    let config = TableSinkConfig::new("students", student_schema()?, "ID")?;
    let table = MemoryTable::new("students");

    let written = write(
        &table,
        config,
        vec![
            student(&schema, 1, Some("Ada"), 91.5)?,
            student(&schema, 2, Some("Grace"), 88.0)?,
        ],
    )?;
    assert_eq!(written, 2);
    assert_eq!(table.len(), 2);

    let key = bytes::encode(&Value::Int(2)).unwrap_or_default();
    let cells = table.get(&key)?.unwrap_or_default();
    assert!(!cells.contains_key("ID"));
    assert_eq!(cells.get("NAME").map(Vec::as_slice), Some(b"Grace".as_slice()));

    let record = decode_row(&schema, "ID", &key, &cells)?;
    assert_eq!(record, student(&schema, 2, Some("Grace"), 88.0)?);
    Ok(())
}

#[test]
fn test_null_cells_are_omitted() -> Result<()> {
    let schema = Arc::new(student_schema()?);
    let config = TableSinkConfig::new("students", student_schema()?, "ID")?;
    let (row, cells) = encode_row(&config, &student(&schema, 7, None, 50.0)?)?;
    assert_eq!(row, vec![0, 0, 0, 7]);
    assert_eq!(cells.keys().collect::<Vec<_>>(), vec!["SCORE"]);

    let back = decode_row(&schema, "ID", &row, &cells)?;
    assert_eq!(back.get("NAME"), Some(&Value::Null));
    Ok(())
}

#[test]
fn test_null_row_key_is_rejected() -> Result<()> {
    let schema = Arc::new(Schema::new(
        "keyed",
        vec![
            Field::nullable("KEY", LogicalType::String),
            Field::nullable("V", LogicalType::Long),
        ],
    )?);
    let config = TableSinkConfig::new("t", Schema::clone(&schema), "KEY")?;
    let record = Record::new(Arc::clone(&schema), vec![Value::Null, Value::Long(1)])?;
    let err = encode_row(&config, &record).unwrap_err();
    assert!(
        matches!(err, ConnectorError::RowKeyNullViolation { ref field } if field == "KEY"),
        "{err:?}"
    );
    Ok(())
}

#[test]
fn test_row_field_case_insensitive() -> Result<()> {
    let schema = Arc::new(student_schema()?);
    let config = TableSinkConfig {
        name: "students".into(),
        schema: student_schema()?,
        row_field: "id".into(),
        row_field_case_sensitive: false,
        projection: FieldProjection::Strict,
    };
    config.validate()?;
    let (row, cells) = encode_row(&config, &student(&schema, 3, Some("Lin"), 70.0)?)?;
    assert_eq!(row, vec![0, 0, 0, 3]);
    assert!(!cells.contains_key("ID"));

    let strict = TableSinkConfig {
        row_field_case_sensitive: true,
        ..config
    };
    assert!(strict.validate().is_err());
    Ok(())
}

#[test]
fn test_projection_strict_and_subset() -> Result<()> {
    let wide = Arc::new(Schema::new(
        "wide",
        vec![
            Field::of("ID", LogicalType::Int),
            Field::nullable("NAME", LogicalType::String),
            Field::nullable("EXTRA", LogicalType::Bool),
        ],
    )?);
    let record = Record::new(
        Arc::clone(&wide),
        vec![Value::Int(1), Value::String("x".into()), Value::Bool(true)],
    )?;

    let strict = TableSinkConfig::new("t", student_schema()?, "ID")?;
    let err = encode_row(&strict, &record).unwrap_err();
    assert!(matches!(err, ConnectorError::UnmappedField(ref f) if f == "EXTRA"), "{err:?}");

    let subset = TableSinkConfig {
        projection: FieldProjection::Subset,
        ..strict
    };
    let (_, cells) = encode_row(&subset, &record)?;
    assert_eq!(cells.keys().collect::<Vec<_>>(), vec!["NAME"]);
    Ok(())
}

#[test]
fn test_type_mismatch_is_rejected() -> Result<()> {
    let other = Arc::new(Schema::new(
        "other",
        vec![
            Field::of("ID", LogicalType::Int),
            Field::nullable("SCORE", LogicalType::String),
        ],
    )?);
    let record = Record::new(Arc::clone(&other), vec![Value::Int(1), Value::String("high".into())])?;
    let config = TableSinkConfig::new("t", student_schema()?, "ID")?;
    let err = encode_row(&config, &record).unwrap_err();
    assert!(matches!(err, ConnectorError::SchemaMismatch { ref field, .. } if field == "SCORE"));
    Ok(())
}

#[test]
fn test_rewrite_is_idempotent() -> Result<()> {
    let schema = Arc::new(student_schema()?);
    let table = MemoryTable::new("students");
    let rows = || -> Result<Vec<Record>> {
        Ok(vec![
            student(&schema, 1, Some("Ada"), 91.5)?,
            student(&schema, 2, None, 60.0)?,
        ])
    };

    write(&table, TableSinkConfig::new("students", student_schema()?, "ID")?, rows()?)?;
    let first = table.scan()?;
    // a re-run of the same task writes the same rows again
    write(&table, TableSinkConfig::new("students", student_schema()?, "ID")?, rows()?)?;
    assert_eq!(table.scan()?, first);
    assert_eq!(table.len(), 2);
    Ok(())
}

#[test]
fn test_table_name_must_match() -> Result<()> {
    let err = SinkVariant::Table {
        config: TableSinkConfig::new("students", student_schema()?, "ID")?,
        table: Arc::new(MemoryTable::new("courses")),
    }
    .into_output_format()
    .err();
    assert!(matches!(err, Some(ConnectorError::InvalidConfig { .. })));
    Ok(())
}
