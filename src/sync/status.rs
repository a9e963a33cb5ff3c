//! Status events reported while a synchronization runs.
//!
//! A run produces an ordered stream of [`DataSyncStatus`] values. Each event names the
//! [`SyncStage`] it belongs to; a FAILED event may carry a [`ServerStatus`] so the caller can
//! branch its UX (prompting re-authentication on [`ServerStatus::Unauthorized`], for instance).

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
    Running,
    Succeeded,
    Failed,
}

/// Classification of a failure for caller-side handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ServerStatus {
    Unauthorized,
    InternalServerError,
}

/// The step of the pipeline an event belongs to, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Connectivity,
    Datasets,
    Observers,
    TaxonomyRanks,
    NomenclatureTypes,
    Nomenclatures,
    NomenclatureTaxonomy,
    DefaultNomenclatures,
    Taxa,
    TaxaAreas,
    AdditionalFields,
    Commit,
}

impl SyncStage {
    /// Human readable name of what the stage synchronizes.
    pub fn label(&self) -> &'static str {
        match self {
            SyncStage::Connectivity => "server connection",
            SyncStage::Datasets => "datasets",
            SyncStage::Observers => "observers",
            SyncStage::TaxonomyRanks => "taxonomy ranks",
            SyncStage::NomenclatureTypes => "nomenclature types",
            SyncStage::Nomenclatures => "nomenclatures",
            SyncStage::NomenclatureTaxonomy => "nomenclature taxonomy",
            SyncStage::DefaultNomenclatures => "default nomenclatures",
            SyncStage::Taxa => "taxa",
            SyncStage::TaxaAreas => "taxa areas",
            SyncStage::AdditionalFields => "additional fields",
            SyncStage::Commit => "local changes",
        }
    }

    /// Message of a FAILED event that carries no classification.
    pub fn failure_message(&self) -> String {
        match self {
            SyncStage::Connectivity => "failed to reach the server".to_string(),
            SyncStage::Commit => "failed to save local changes".to_string(),
            stage => format!("failed to synchronize {}", stage.label()),
        }
    }
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One event of the status stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataSyncStatus {
    pub state: SyncState,
    pub stage: SyncStage,
    pub message: Option<String>,
    /// Number of rows synchronized (SUCCEEDED) or fetched so far (RUNNING).
    pub count: Option<usize>,
    pub server_status: Option<ServerStatus>,
}

impl DataSyncStatus {
    pub fn running(stage: SyncStage, count: Option<usize>) -> Self {
        Self {
            state: SyncState::Running,
            stage,
            message: Some(format!("synchronizing {}", stage.label())),
            count,
            server_status: None,
        }
    }

    pub fn succeeded(stage: SyncStage, count: usize) -> Self {
        Self {
            state: SyncState::Succeeded,
            stage,
            message: Some(format!("{} {} synchronized", count, stage.label())),
            count: Some(count),
            server_status: None,
        }
    }

    pub fn failed(
        stage: SyncStage,
        message: impl Into<String>,
        server_status: Option<ServerStatus>,
    ) -> Self {
        Self {
            state: SyncState::Failed,
            stage,
            message: Some(message.into()),
            count: None,
            server_status,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.state == SyncState::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors() {
        let status = DataSyncStatus::succeeded(SyncStage::Observers, 3);
        assert_eq!(status.state, SyncState::Succeeded);
        assert_eq!(status.count, Some(3));
        assert_eq!(status.message.as_deref(), Some("3 observers synchronized"));

        let status = DataSyncStatus::failed(
            SyncStage::Datasets,
            "not connected",
            Some(ServerStatus::Unauthorized),
        );
        assert!(status.is_failed());
        assert_eq!(status.server_status, Some(ServerStatus::Unauthorized));
    }

    #[test]
    fn failure_messages_name_the_stage() {
        assert_eq!(
            SyncStage::TaxonomyRanks.failure_message(),
            "failed to synchronize taxonomy ranks"
        );
        assert_eq!(
            SyncStage::Commit.failure_message(),
            "failed to save local changes"
        );
    }

    #[test]
    fn serialized_shape() {
        let value = serde_json::to_value(DataSyncStatus::failed(
            SyncStage::Nomenclatures,
            "server error",
            Some(ServerStatus::InternalServerError),
        ))
        .unwrap();
        assert_eq!(value["state"], "FAILED");
        assert_eq!(value["stage"], "nomenclatures");
        assert_eq!(value["server_status"], "INTERNAL_SERVER_ERROR");
    }
}
