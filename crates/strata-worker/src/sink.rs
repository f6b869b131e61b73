//! File result sink.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use strata_core::ports::ResultSink;
use strata_core::task::WorkTask;
use strata_core::{ContextWindow, Error, Result};
use tracing::debug;

/// Writes the final context window as pretty JSON under a results directory.
///
/// The file is `<root>/<output_location>` when the task declares one, else
/// `<root>/<task id>.json`.
pub struct FileResultSink {
    root: PathBuf,
}

impl FileResultSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, task: &WorkTask) -> Result<PathBuf> {
        match task.data_access.output_location.as_deref() {
            Some(location) => {
                let relative = Path::new(location);
                let escapes = relative
                    .components()
                    .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
                if escapes || location.trim().is_empty() {
                    return Err(Error::Validation(format!(
                        "output location '{location}' must be a relative path inside the results directory"
                    )));
                }
                Ok(self.root.join(relative))
            }
            None => Ok(self.root.join(format!("{}.json", task.id))),
        }
    }
}

#[async_trait]
impl ResultSink for FileResultSink {
    async fn write(&self, task: &WorkTask, context: &ContextWindow) -> Result<Option<String>> {
        let path = self.path_for(task)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(context)?;
        tokio::fs::write(&path, body).await?;

        debug!(task_id = %task.id, path = %path.display(), "Wrote run result");
        Ok(Some(path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::task::DataAccessSpec;
    use strata_core::{PipelineId, ProjectId};

    fn task() -> WorkTask {
        WorkTask::pipeline_execution(PipelineId::new(), ProjectId::new("acme"))
    }

    #[tokio::test]
    async fn test_writes_context_to_declared_location() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileResultSink::new(dir.path());
        let task = task().with_data_access(DataAccessSpec {
            input_datasets: vec![],
            output_location: Some("daily/out.json".into()),
        });

        let mut ctx = ContextWindow::default();
        ctx.insert("rows", json!(3)).unwrap();

        let location = sink.write(&task, &ctx).await.unwrap().unwrap();
        assert!(location.ends_with("out.json"));

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("daily/out.json")).unwrap())
                .unwrap();
        assert_eq!(written, json!({"rows": 3}));
    }

    #[tokio::test]
    async fn test_defaults_to_task_id() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileResultSink::new(dir.path());
        let task = task();

        sink.write(&task, &ContextWindow::default()).await.unwrap();
        assert!(dir.path().join(format!("{}.json", task.id)).exists());
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileResultSink::new(dir.path());
        for location in ["../evil.json", "/etc/passwd"] {
            let task = task().with_data_access(DataAccessSpec {
                input_datasets: vec![],
                output_location: Some(location.into()),
            });
            assert!(sink.write(&task, &ContextWindow::default()).await.is_err());
        }
    }
}
