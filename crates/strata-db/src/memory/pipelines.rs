//! In-memory pipeline store.

use async_trait::async_trait;
use std::collections::HashMap;
use strata_core::pipeline::StoredPipeline;
use strata_core::ports::PipelineRepository;
use strata_core::{Error, PipelineId, ProjectId, Result};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryPipelineRepository {
    pipelines: RwLock<HashMap<PipelineId, StoredPipeline>>,
}

impl MemoryPipelineRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineRepository for MemoryPipelineRepository {
    async fn save(&self, pipeline: &StoredPipeline) -> Result<()> {
        self.pipelines
            .write()
            .await
            .insert(pipeline.id, pipeline.clone());
        Ok(())
    }

    async fn get(&self, id: PipelineId) -> Result<Option<StoredPipeline>> {
        Ok(self.pipelines.read().await.get(&id).cloned())
    }

    async fn exists(&self, id: PipelineId) -> Result<bool> {
        Ok(self.pipelines.read().await.contains_key(&id))
    }

    async fn list_by_project(&self, project_id: &ProjectId) -> Result<Vec<StoredPipeline>> {
        let mut pipelines: Vec<StoredPipeline> = self
            .pipelines
            .read()
            .await
            .values()
            .filter(|p| &p.project_id == project_id)
            .cloned()
            .collect();
        pipelines.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(pipelines)
    }

    async fn delete(&self, id: PipelineId) -> Result<()> {
        self.pipelines
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::PipelineNotFound(id.to_string()))
    }
}
