//! External record shape tests for strata-core types.

use chrono::Utc;
use serde_json::json;
use strata_core::ids::*;
use strata_core::pipeline::{PipelineSource, PipelineType};
use strata_core::schedule::Schedule;
use strata_core::task::{DataAccessSpec, TaskStatus, WorkTask, meta};

#[test]
fn test_work_task_record_fields() {
    let task = WorkTask::pipeline_execution(PipelineId::new(), ProjectId::new("acme"))
        .with_priority(5)
        .with_parameter("region", json!("eu"))
        .with_metadata(meta::TRIGGER_TYPE, meta::TRIGGER_SCHEDULED)
        .with_data_access(DataAccessSpec {
            input_datasets: vec!["ds://orders".into()],
            output_location: Some("orders/summary.json".into()),
        });

    let value = serde_json::to_value(&task).expect("serialize");

    assert_eq!(value["type"], json!("pipeline_execution"));
    assert_eq!(value["status"], json!("queued"));
    assert_eq!(value["priority"], json!(5));
    assert_eq!(value["project_id"], json!("acme"));
    assert_eq!(value["task_spec"]["parameters"]["region"], json!("eu"));
    assert_eq!(value["resource_requirements"]["gpu"], json!(false));
    assert_eq!(
        value["data_access"]["output_location"],
        json!("orders/summary.json")
    );
    assert_eq!(value["metadata"]["trigger_type"], json!("scheduled"));

    let parsed: WorkTask = serde_json::from_value(value).expect("deserialize");
    assert_eq!(parsed, task);
}

#[test]
fn test_work_task_minimal_record_uses_defaults() {
    let id = TaskId::new();
    let pipeline = PipelineId::new();
    let record = json!({
        "id": id,
        "type": "pipeline_execution",
        "status": "running",
        "priority": 0,
        "submitted_at": Utc::now(),
        "project_id": "p",
        "task_spec": { "pipeline_id": pipeline, "project_id": "p" }
    });

    let task: WorkTask = serde_json::from_value(record).expect("deserialize");
    assert_eq!(task.id, id);
    assert_eq!(task.status, TaskStatus::Running);
    assert!(task.task_spec.parameters.is_empty());
    assert_eq!(task.resource_requirements.memory, 512);
    assert!(task.data_access.input_datasets.is_empty());
}

#[test]
fn test_schedule_record_fields() {
    let now = Utc::now();
    let schedule = Schedule {
        id: ScheduleId::new(),
        project_id: ProjectId::new("acme"),
        name: "hourly".into(),
        pipelines: vec![PipelineId::new()],
        cron_schedule: "0 * * * *".into(),
        enabled: false,
        created_at: now,
        updated_at: now,
        last_run: None,
        next_run: None,
    };

    let value = serde_json::to_value(&schedule).expect("serialize");
    for field in [
        "id",
        "project_id",
        "name",
        "pipelines",
        "cron_schedule",
        "enabled",
        "created_at",
        "updated_at",
        "last_run",
        "next_run",
    ] {
        assert!(value.get(field).is_some(), "missing field {field}");
    }
}

#[test]
fn test_pipeline_source_reads_yaml_document() {
    let yaml = r#"
version: "1"
name: orders
description: nightly orders ingestion
type: ingestion
steps:
  - name: fetch
    plugin: http/fetch
    config:
      url: https://example.com/orders
    output: raw
"#;
    let source: PipelineSource = serde_yaml::from_str(yaml).expect("parse");
    assert_eq!(source.pipeline_type, Some(PipelineType::Ingestion));
    assert_eq!(source.steps.len(), 1);
    assert_eq!(source.steps[0].output.as_deref(), Some("raw"));
    assert_eq!(source.steps[0].config["url"], json!("https://example.com/orders"));
}
