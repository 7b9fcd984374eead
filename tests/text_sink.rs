//! Delimited text sink: headers, projection, compression and file commit.
#![cfg(feature = "sink-text")]

use anyhow::Result;
use sluice::io::compression::auto_detect_reader;
use sluice::output::text::render_cell;
use sluice::{
    ConnectorError, Field, FieldProjection, JobContext, LogicalType, OutputFormat, Record, Schema,
    SinkVariant, TaskContext, TextSinkConfig, Value, run_task,
};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn records(n: i32) -> Result<Vec<Record>> {
    let schema = Arc::new(Schema::new(
        "student",
        vec![
            Field::of("ID", LogicalType::Int),
            Field::nullable("NAME", LogicalType::String),
            Field::nullable("PHOTO", LogicalType::Bytes),
        ],
    )?);
    let mut out = Vec::new();
    for id in 1..=n {
        let name = if id == 2 { Value::Null } else { Value::String(format!("user{id}")) };
        out.push(Record::new(
            Arc::clone(&schema),
            vec![Value::Int(id), name, Value::Bytes(vec![0xca, 0xfe])],
        )?);
    }
    Ok(out)
}

/// Run one job of `tasks.len()` tasks and commit it.
fn run_job(config: TextSinkConfig, tasks: Vec<Vec<Record>>) -> Result<()> {
    let format = SinkVariant::Text(config).into_output_format()?;
    let job = JobContext::new("job1");
    format.check_output_specs(&job)?;
    let committer = format.output_committer(&TaskContext::new(&job, 0, 0))?;
    committer.setup_job(&job)?;
    for (task_id, records) in (0u32..).zip(tasks) {
        let task = TaskContext::new(&job, task_id, 0);
        run_task(format.as_ref(), &task, records.into_iter().map(|r| Ok(((), r))))?;
    }
    committer.commit_job(&job)?;
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    let mut out = String::new();
    auto_detect_reader(File::open(path)?, path)?.read_to_string(&mut out)?;
    Ok(out)
}

fn listing(dir: &Path) -> Result<Vec<String>> {
    let mut names = fs::read_dir(dir)?
        .map(|e| Ok(e?.file_name().to_string_lossy().into_owned()))
        .collect::<Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}

#[test]
fn test_render_cell() {
    assert_eq!(render_cell(&Value::Null), "");
    assert_eq!(render_cell(&Value::Bytes(vec![0x00, 0xab, 0x10])), "00ab10");
    assert_eq!(render_cell(&Value::Bool(true)), "true");
    assert_eq!(render_cell(&Value::Long(-4)), "-4");
}

#[test]
fn test_header_then_rows_and_success_marker() -> Result<()> {
    let tmp = TempDir::new()?;
    let out = tmp.path().join("out");
    run_job(TextSinkConfig::new(&out).with_header(true), vec![records(3)?])?;

    assert_eq!(listing(&out)?, vec!["_SUCCESS", "part-00000.csv"]);
    assert_eq!(
        read_text(&out.join("part-00000.csv"))?,
        "ID,NAME,PHOTO\n1,user1,cafe\n2,,cafe\n3,user3,cafe\n"
    );
    Ok(())
}

#[test]
fn test_columns_and_delimiter() -> Result<()> {
    let tmp = TempDir::new()?;
    let out = tmp.path().join("out");
    let config = TextSinkConfig::new(&out)
        .with_delimiter(b'\t')
        .with_header(true)
        .with_columns(vec!["NAME".into(), "ID".into(), "AGE".into()], FieldProjection::Subset);
    run_job(config, vec![records(1)?])?;
    assert_eq!(read_text(&out.join("part-00000.csv"))?, "NAME\tID\tAGE\nuser1\t1\t\n");
    Ok(())
}

#[test]
fn test_strict_projection_rejects_unmapped_field() -> Result<()> {
    let tmp = TempDir::new()?;
    let out = tmp.path().join("out");
    let config = TextSinkConfig::new(&out)
        .with_columns(vec!["ID".into(), "NAME".into()], FieldProjection::Strict);
    let err = run_job(config, vec![records(1)?]).unwrap_err();
    let err = err.downcast::<ConnectorError>()?;
    assert!(matches!(err, ConnectorError::UnmappedField(ref f) if f == "PHOTO"), "{err:?}");
    // the failed attempt left nothing behind
    assert!(!out.join("_temporary").join("attempt_job1_00000_0").exists());
    Ok(())
}

#[test]
fn test_gzip_part_files() -> Result<()> {
    let tmp = TempDir::new()?;
    let out = tmp.path().join("out");
    run_job(
        TextSinkConfig::new(&out).with_extension("csv.gz"),
        vec![records(2)?, records(1)?],
    )?;

    assert_eq!(
        listing(&out)?,
        vec!["_SUCCESS", "part-00000.csv.gz", "part-00001.csv.gz"]
    );
    let mut raw = [0u8; 2];
    File::open(out.join("part-00001.csv.gz"))?.read_exact(&mut raw)?;
    assert_eq!(raw, [0x1f, 0x8b]);
    assert_eq!(read_text(&out.join("part-00000.csv.gz"))?, "1,user1,cafe\n2,,cafe\n");
    Ok(())
}

#[test]
fn test_empty_task_writes_no_part_file() -> Result<()> {
    let tmp = TempDir::new()?;
    let out = tmp.path().join("out");
    run_job(TextSinkConfig::new(&out).with_header(true), vec![Vec::new(), records(1)?])?;
    assert_eq!(listing(&out)?, vec!["_SUCCESS", "part-00001.csv"]);
    Ok(())
}

#[test]
fn test_non_empty_output_directory_is_rejected() -> Result<()> {
    let tmp = TempDir::new()?;
    fs::write(tmp.path().join("existing.csv"), "x\n")?;
    let format = SinkVariant::Text(TextSinkConfig::new(tmp.path())).into_output_format()?;
    let err = format.check_output_specs(&JobContext::new("job1")).unwrap_err();
    assert!(matches!(err, ConnectorError::InvalidConfig { ref key, .. } if key == "path"));
    Ok(())
}

#[test]
fn test_abort_job_discards_uncommitted_output() -> Result<()> {
    let tmp = TempDir::new()?;
    let out = tmp.path().join("out");
    let format = SinkVariant::Text(TextSinkConfig::new(&out)).into_output_format()?;
    let job = JobContext::new("job2");
    let task = TaskContext::new(&job, 0, 0);
    let committer = format.output_committer(&task)?;
    committer.setup_job(&job)?;
    run_task(format.as_ref(), &task, records(2)?.into_iter().map(|r| Ok(((), r))))?;
    assert!(out.join("_temporary").join(task.task_name()).is_dir());

    committer.abort_job(&job)?;
    assert!(!out.join("_temporary").exists());
    assert!(!out.join("_SUCCESS").exists());
    assert!(!out.join("part-00000.csv").exists());
    Ok(())
}

#[test]
fn test_retried_attempt_replaces_committed_task() -> Result<()> {
    let tmp = TempDir::new()?;
    let out = tmp.path().join("out");
    let format = SinkVariant::Text(TextSinkConfig::new(&out)).into_output_format()?;
    let job = JobContext::new("job3");
    let committer = format.output_committer(&TaskContext::new(&job, 0, 0))?;
    committer.setup_job(&job)?;

    for (attempt, n) in [(0, 3), (1, 1)] {
        let task = TaskContext::new(&job, 0, attempt);
        run_task(format.as_ref(), &task, records(n)?.into_iter().map(|r| Ok(((), r))))?;
    }
    committer.commit_job(&job)?;
    assert_eq!(read_text(&out.join("part-00000.csv"))?, "1,user1,cafe\n");
    Ok(())
}
