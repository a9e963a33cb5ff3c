use clap::Parser;
use futures_util::StreamExt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use refdata_sync::gateway::HttpGateway;
use refdata_sync::settings::Settings;
use refdata_sync::store::MemoryStore;
use refdata_sync::sync::{SyncOrchestrator, SyncState};

/// Synchronize GeoNature reference data once and report every stage.
#[derive(Parser, Debug)]
#[command(name = "refdata-sync", version, about)]
struct Cli {
	/// Path to the JSON settings file
	#[arg(short, long)]
	settings: PathBuf,

	/// Also synchronize the module's additional fields
	#[arg(long)]
	with_additional_fields: bool,

	/// Skip per-area taxa statistics
	#[arg(long)]
	no_additional_data: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.init();

	let cli = Cli::parse();

	let settings = match Settings::load(&cli.settings) {
		Ok(settings) => settings,
		Err(e) => {
			error!("{}", e);
			return ExitCode::FAILURE;
		}
	};

	let gateway = match settings
		.gateway_config()
		.map_err(|e| e.to_string())
		.and_then(|config| HttpGateway::new(config).map_err(|e| e.to_string()))
	{
		Ok(gateway) => gateway,
		Err(e) => {
			error!("Failed to create gateway: {}", e);
			return ExitCode::FAILURE;
		}
	};

	let mut params = settings.params();
	if cli.with_additional_fields {
		params = params.with_additional_fields(true);
	}
	if cli.no_additional_data {
		params = params.with_additional_data(false);
	}

	let store = MemoryStore::new();
	let orchestrator = SyncOrchestrator::new(
		Arc::new(gateway),
		Arc::new(store.clone()),
		settings.sync_config(),
	);

	info!(
		"Synchronizing module {} from {}",
		orchestrator.config().module_code,
		settings.sync.geonature_url
	);

	let mut failed = false;
	let mut statuses = orchestrator.run(params);
	while let Some(status) = statuses.next().await {
		match serde_json::to_string(&status) {
			Ok(line) => info!("{}", line),
			Err(e) => error!("Failed to serialize status: {}", e),
		}
		failed |= status.state == SyncState::Failed;
	}

	if failed {
		return ExitCode::FAILURE;
	}

	let tables = store.snapshot().await;
	info!(
		"Local store now holds {} datasets, {} observers, {} nomenclatures and {} taxa",
		tables.datasets.len(),
		tables.observers.len(),
		tables.nomenclatures.len(),
		tables.taxa.len()
	);
	ExitCode::SUCCESS
}
