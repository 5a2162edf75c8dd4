use async_trait::async_trait;
use serde_json::Value;

use reportforge_shared::Result;
use reportforge_storage::Storage;

use crate::collaborators::StepSink;

/// Step journal backed by the libSQL database.
pub struct StorageSink {
    storage: Storage,
}

impl StorageSink {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl StepSink for StorageSink {
    async fn save_step(
        &self,
        session_id: &str,
        label: &str,
        payload: &Value,
        category: &str,
    ) -> Result<()> {
        self.storage
            .insert_step(session_id, label, category, payload)
            .await?;
        Ok(())
    }

    async fn save_error(
        &self,
        session_id: &str,
        label: &str,
        error: &str,
        context: Option<&Value>,
    ) -> Result<()> {
        self.storage
            .insert_error(session_id, label, error, context)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reportforge_shared::{AppConfig, PipelineInput};

    use super::*;
    use crate::pipeline::{PERSIST_CATEGORY, Pipeline, SilentProgress};
    use crate::testing::{FakeArtifacts, FakeInference, FakeSearch, collaborators};

    async fn temp_storage() -> (Storage, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("reportforge_sink_{}.db", uuid::Uuid::now_v7()));
        let storage = Storage::open(&path).await.expect("open storage");
        (storage, path)
    }

    #[tokio::test]
    async fn sink_writes_steps_and_errors() {
        let (storage, path) = temp_storage().await;
        let sink = StorageSink::new(storage);

        sink.save_step("s-1", "stage_avatar", &serde_json::json!({"a": 1}), "full_analysis")
            .await
            .expect("save step");
        sink.save_error("s-1", "stage_prePitch", "PRE_PITCH_FAILED: x", None)
            .await
            .expect("save error");

        let steps = sink.storage.list_steps("s-1").await.expect("list");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].payload["a"], 1);
        assert_eq!(sink.storage.list_errors("s-1").await.expect("errors").len(), 1);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn full_run_is_journaled() {
        let (storage, path) = temp_storage().await;
        let reader = Storage::open(&path).await.expect("second handle");
        let sink = Arc::new(StorageSink::new(storage));

        let pipeline = Pipeline::new(
            collaborators(
                FakeSearch::qualifying(5),
                FakeInference::good(),
                FakeArtifacts::default(),
                sink,
            ),
            &AppConfig::default(),
        );
        pipeline
            .execute(
                &PipelineInput::new("Digital Education"),
                Some("journaled".into()),
                &SilentProgress,
            )
            .await
            .expect("run completes");

        let steps = reader.list_steps("journaled").await.expect("list");
        // pipeline_started + 12 stages + final_analysis
        assert_eq!(steps.len(), 14);
        assert!(steps.iter().all(|s| s.category == PERSIST_CATEGORY));
        let last = reader
            .get_step("journaled", "final_analysis")
            .await
            .expect("query")
            .expect("final snapshot");
        assert_eq!(last.payload["metadata"]["sessionId"], "journaled");

        let _ = std::fs::remove_file(&path);
    }
}
