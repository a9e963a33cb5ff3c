//! Reference data sync orchestrator and integration point for all stages.
//!
//! This module defines the `SyncOrchestrator`, which runs one synchronization of the local
//! reference data against the remote service and reports it as an ordered stream of
//! [`DataSyncStatus`] events.
//!
//! The orchestrator is responsible for:
//! - Checking that the gateway is configured before touching the store
//! - Opening the single store transaction of the run
//! - Running the stages strictly in order: datasets, observers, taxonomy ranks, nomenclature,
//!   taxa and, when requested, additional fields
//! - Rolling the transaction back on the first failed stage or on cancellation, and committing
//!   it once every stage succeeded
//!
//! The pipeline runs on its own Tokio task and feeds a bounded channel; the returned stream
//! reads from that channel. Dropping the stream stops observation only: the run still completes
//! (or fails) and its transaction is committed (or rolled back). Use
//! [`SyncOrchestrator::run_with_cancellation`] to stop a run.

use crate::gateway::RemoteDataGateway;
use crate::store::{LocalStore, StoreTransaction};
use crate::sync::additional_fields::{
    AdditionalFieldsStage, AdditionalFieldsSync, GatewayAdditionalFieldsSync,
};
use crate::sync::errors::{SyncError, classify};
use crate::sync::events::StatusEmitter;
use crate::sync::nomenclature::NomenclatureReconciler;
use crate::sync::stages::{
    DatasetStage, ObserverStage, Stage, StageContext, StageOutcome, StageRunner, TaxonomyStage,
    check_reachable,
};
use crate::sync::status::{DataSyncStatus, SyncStage};
use crate::sync::taxa::{PagedTaxaSync, TaxaStage, TaxaSync};

use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Page size used when none (or zero) is given.
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// Ordered status events of one run.
pub type StatusStream = Pin<Box<dyn Stream<Item = DataSyncStatus> + Send>>;

/// Input of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    /// Also synchronize per-area taxa statistics
    pub with_additional_data: bool,
    /// Also synchronize the module's additional fields
    pub with_additional_fields: bool,
    /// Users menu listing the observers
    pub users_menu_id: i64,
    /// Area type the taxa statistics are computed for
    pub code_area_type: Option<String>,
    pub page_size: usize,
}

impl Params {
    pub fn new(users_menu_id: i64) -> Self {
        Self {
            with_additional_data: true,
            with_additional_fields: false,
            users_menu_id,
            code_area_type: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_additional_data(mut self, enabled: bool) -> Self {
        self.with_additional_data = enabled;
        self
    }

    pub fn with_additional_fields(mut self, enabled: bool) -> Self {
        self.with_additional_fields = enabled;
        self
    }

    pub fn with_code_area_type(mut self, code_area_type: impl Into<String>) -> Self {
        self.code_area_type = Some(code_area_type.into());
        self
    }

    /// Sets the page size; zero falls back to [`DEFAULT_PAGE_SIZE`].
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// The page size actually used for paged calls
    pub fn effective_page_size(&self) -> usize {
        match self.page_size {
            0 => DEFAULT_PAGE_SIZE,
            size => size,
        }
    }
}

/// Configuration of the orchestrator, fixed across runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Module whose datasets, defaults and additional fields are synchronized
    pub module_code: String,
    /// Taxa list pulled by the taxa stage
    pub taxa_list_id: i64,
    /// Capacity of the status channel; the pipeline waits when it is full
    pub status_buffer: usize,
}

impl SyncConfig {
    pub fn new(module_code: impl Into<String>, taxa_list_id: i64) -> Self {
        Self {
            module_code: module_code.into(),
            taxa_list_id,
            status_buffer: 1,
        }
    }

    pub fn with_module_code(mut self, module_code: impl Into<String>) -> Self {
        self.module_code = module_code.into();
        self
    }

    pub fn with_taxa_list_id(mut self, taxa_list_id: i64) -> Self {
        self.taxa_list_id = taxa_list_id;
        self
    }

    /// Sets the status channel capacity (at least 1).
    pub fn with_status_buffer(mut self, status_buffer: usize) -> Self {
        self.status_buffer = status_buffer.max(1);
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("OCCTAX", 100)
    }
}

/// Main sync orchestrator that sequences all stages of a run.
pub struct SyncOrchestrator {
    gateway: Arc<dyn RemoteDataGateway>,
    store: Arc<dyn LocalStore>,
    config: SyncConfig,
    taxa_sync: Arc<dyn TaxaSync>,
    additional_fields_sync: Arc<dyn AdditionalFieldsSync>,
}

impl SyncOrchestrator {
    pub fn new(
        gateway: Arc<dyn RemoteDataGateway>,
        store: Arc<dyn LocalStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            config,
            taxa_sync: Arc::new(PagedTaxaSync::new()),
            additional_fields_sync: Arc::new(GatewayAdditionalFieldsSync),
        }
    }

    /// Replace the taxa collaborator.
    pub fn with_taxa_sync(mut self, taxa_sync: Arc<dyn TaxaSync>) -> Self {
        self.taxa_sync = taxa_sync;
        self
    }

    /// Replace the additional fields collaborator.
    pub fn with_additional_fields_sync(
        mut self,
        additional_fields_sync: Arc<dyn AdditionalFieldsSync>,
    ) -> Self {
        self.additional_fields_sync = additional_fields_sync;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Start a run and return its status stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run(&self, params: Params) -> StatusStream {
        self.run_with_cancellation(params, CancellationToken::new())
    }

    /// Start a run that stops at the next stage or page boundary once `cancel` fires.
    pub fn run_with_cancellation(&self, params: Params, cancel: CancellationToken) -> StatusStream {
        let (sender, receiver) = mpsc::channel(self.config.status_buffer.max(1));
        let run = Run {
            gateway: self.gateway.clone(),
            store: self.store.clone(),
            config: self.config.clone(),
            stages: self.stages(&params),
            params,
            cancel,
        };

        tokio::spawn(async move {
            let mut emitter = StatusEmitter::new(sender);
            run.execute(&mut emitter).await;
            emitter.tracker().log_summary();
        });

        Box::pin(futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|status| (status, receiver))
        }))
    }

    /// The stages of a run, in execution order.
    fn stages(&self, params: &Params) -> Vec<Box<dyn Stage>> {
        let mut stages: Vec<Box<dyn Stage>> = vec![
            Box::new(DatasetStage),
            Box::new(ObserverStage),
            Box::new(TaxonomyStage),
            Box::new(NomenclatureReconciler),
            Box::new(TaxaStage::new(self.taxa_sync.clone())),
        ];
        if params.with_additional_fields {
            stages.push(Box::new(AdditionalFieldsStage::new(
                self.additional_fields_sync.clone(),
            )));
        }
        stages
    }
}

/// State of one run, moved onto the pipeline task.
struct Run {
    gateway: Arc<dyn RemoteDataGateway>,
    store: Arc<dyn LocalStore>,
    config: SyncConfig,
    stages: Vec<Box<dyn Stage>>,
    params: Params,
    cancel: CancellationToken,
}

impl Run {
    async fn execute(self, emitter: &mut StatusEmitter) {
        info!(
            "Starting reference data synchronization for module {}",
            self.config.module_code
        );

        if self.cancel.is_cancelled() {
            emitter
                .emit(classify(SyncStage::Connectivity, &SyncError::Cancelled))
                .await;
            return;
        }

        emitter
            .emit(DataSyncStatus::running(SyncStage::Connectivity, None))
            .await;
        if let Err(e) = check_reachable(self.gateway.as_ref()).await {
            warn!("Server is not reachable: {}", e);
            emitter.emit(classify(SyncStage::Connectivity, &e)).await;
            return;
        }

        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                warn!("Failed to open the local store: {}", e);
                emitter.emit(classify(SyncStage::Commit, &e.into())).await;
                return;
            }
        };

        match self.run_stages(&mut *tx, emitter).await {
            StageOutcome::Continue => self.commit(tx, emitter).await,
            StageOutcome::Abort => {
                if let Err(e) = tx.rollback().await {
                    warn!("Failed to roll back local changes: {}", e);
                }
            }
        }
    }

    async fn run_stages(
        &self,
        tx: &mut dyn StoreTransaction,
        emitter: &mut StatusEmitter,
    ) -> StageOutcome {
        let mut ctx = StageContext {
            gateway: self.gateway.as_ref(),
            tx,
            emitter,
            params: &self.params,
            config: &self.config,
            cancel: &self.cancel,
        };

        for stage in &self.stages {
            if StageRunner::run(stage.as_ref(), &mut ctx).await == StageOutcome::Abort {
                return StageOutcome::Abort;
            }
        }

        match ctx.check_cancelled(SyncStage::Commit) {
            Ok(()) => StageOutcome::Continue,
            Err(cancelled) => {
                ctx.emit(cancelled.status()).await;
                StageOutcome::Abort
            }
        }
    }

    async fn commit(&self, tx: Box<dyn StoreTransaction>, emitter: &mut StatusEmitter) {
        match tx.commit().await {
            Ok(()) => info!("Reference data synchronization complete"),
            Err(e) => {
                warn!("Failed to commit local changes: {}", e);
                emitter.emit(classify(SyncStage::Commit, &e.into())).await;
            }
        }
    }
}
