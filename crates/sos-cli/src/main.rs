mod config;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sos_core::harvest::{CHECKLIST_HARVEST_ID, OBSERVATION_HARVEST_ID};
use sos_core::processing::PROCESSING_ID;
use sos_core::{
    AppError, ArtportalenSources, ChecklistHarvester, HarvestInfo, HarvestJob, HarvestMode,
    ObservationHarvester, ObservationProcessor, SosConfig, TracingReporter, load_config,
};
use sos_db::{
    ChecklistRepository, EnrichmentRepository, HarvestInfoRepository, MetadataRepository,
    ObservationRepository, SightingRepository, SiteRepository, VerbatimRepository,
    VocabularyRepository,
};

use crate::config::{Command, Config};

/// Connections to the Artportalen source, one pool per replica.
struct SourcePools {
    live: PgPool,
    backup: PgPool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Config::parse();
    let settings = load_config(cli.config.clone()).context("Failed to load configuration")?;

    info!("Connecting to database...");
    let sos_pool = connect(&cli.database_url, cli.max_connections)
        .await
        .context("Failed to connect to SOS database")?;

    let info_store = HarvestInfoRepository::new(sos_pool.clone());
    info_store
        .ensure_schema()
        .await
        .context("Failed to prepare harvest info table")?;
    let job = HarvestJob::new(info_store.clone());

    let cancel_token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel_token.clone()));

    let result = match cli.command {
        Command::Harvest { mode } => {
            let sources = connect_sources(&cli).await?;
            harvest_observations(&job, &settings, &sos_pool, sources, mode.into(), cancel_token)
                .await
        }
        Command::HarvestChecklists => {
            let sources = connect_sources(&cli).await?;
            harvest_checklists(&job, &settings, &sos_pool, sources, cancel_token).await
        }
        Command::Process { mode } => {
            let sources = connect_sources(&cli).await?;
            process(&job, &settings, &sos_pool, sources, mode.into(), cancel_token).await
        }
        Command::Status => {
            show_status(&info_store).await?;
            return Ok(());
        }
    };

    match result {
        Ok(true) => Ok(()),
        Ok(false) => {
            warn!("Run was cancelled before completion");
            Ok(())
        }
        Err(e) => {
            error!("{}", e.user_message());
            Err(e.into())
        }
    }
}

async fn connect(url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;
    Ok(pool)
}

async fn connect_sources(cli: &Config) -> anyhow::Result<SourcePools> {
    let live_url = cli.artportalen_database_url.as_deref().ok_or_else(|| {
        anyhow::anyhow!("ARTPORTALEN_DATABASE_URL (or --artportalen-database-url) is required")
    })?;

    info!("Connecting to Artportalen...");
    let live = connect(live_url, cli.max_connections)
        .await
        .context("Failed to connect to the live Artportalen database")?;
    let backup = match cli.artportalen_backup_database_url.as_deref() {
        Some(url) => connect(url, cli.max_connections)
            .await
            .context("Failed to connect to the Artportalen hot standby")?,
        None => live.clone(),
    };

    Ok(SourcePools { live, backup })
}

async fn harvest_observations(
    job: &HarvestJob<HarvestInfoRepository>,
    settings: &SosConfig,
    sos_pool: &PgPool,
    sources: SourcePools,
    mode: HarvestMode,
    cancel_token: CancellationToken,
) -> Result<bool, AppError> {
    let index = ObservationRepository::new(sos_pool.clone());
    index.ensure_schema().await?;

    let harvester = ObservationHarvester::with_config(
        ArtportalenSources {
            sightings: SightingRepository::new(sources.live.clone(), sources.backup),
            sites: SiteRepository::new(sources.live.clone()),
            enrichment: EnrichmentRepository::new(sources.live.clone()),
            metadata: MetadataRepository::new(sources.live),
        },
        VerbatimRepository::new(sos_pool.clone()),
        index,
        settings.artportalen.clone(),
        settings.processing.data_provider_id,
    );

    let outcome = job
        .run_observations(&harvester, mode, cancel_token, &TracingReporter)
        .await;
    print_latest(job, OBSERVATION_HARVEST_ID).await;
    outcome
}

async fn harvest_checklists(
    job: &HarvestJob<HarvestInfoRepository>,
    settings: &SosConfig,
    sos_pool: &PgPool,
    sources: SourcePools,
    cancel_token: CancellationToken,
) -> Result<bool, AppError> {
    let harvester = ChecklistHarvester::with_config(
        ChecklistRepository::new(sources.backup.clone()),
        SiteRepository::new(sources.backup.clone()),
        MetadataRepository::new(sources.backup),
        VerbatimRepository::new(sos_pool.clone()),
        settings.artportalen.clone(),
    );

    let outcome = job
        .run_checklists(&harvester, cancel_token, &TracingReporter)
        .await;
    print_latest(job, CHECKLIST_HARVEST_ID).await;
    outcome
}

async fn process(
    job: &HarvestJob<HarvestInfoRepository>,
    settings: &SosConfig,
    sos_pool: &PgPool,
    sources: SourcePools,
    mode: HarvestMode,
    cancel_token: CancellationToken,
) -> Result<bool, AppError> {
    let index = ObservationRepository::new(sos_pool.clone());
    index.ensure_schema().await?;

    let processor = ObservationProcessor::with_config(
        VerbatimRepository::new(sos_pool.clone()),
        index,
        MetadataRepository::new(sources.live),
        VocabularyRepository::new(sos_pool.clone()),
        settings.processing.clone(),
    );

    let outcome = job
        .run_processing(&processor, mode, cancel_token, &TracingReporter)
        .await;
    print_latest(job, PROCESSING_ID).await;
    outcome
}

/// Cancels the token on Ctrl+C or SIGTERM. Dispatched batches are allowed to finish.
async fn cancel_on_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, cancelling harvest...");
    cancel_token.cancel();
}

async fn print_latest(job: &HarvestJob<HarvestInfoRepository>, harvest_id: &str) {
    match job.latest(harvest_id).await {
        Ok(Some(info)) => print_run_summary(&info),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Could not read back the run record"),
    }
}

/// Print a summary of one run.
fn print_run_summary(info: &HarvestInfo) {
    let duration = info
        .end
        .map(|end| end - info.start)
        .map(|d| Duration::from_millis(d.num_milliseconds().max(0) as u64));

    info!("");
    info!("═══════════════════════════════════════════════════════");
    info!("Run complete: {}", info.id);
    info!("═══════════════════════════════════════════════════════");
    info!("  Status:              {}", info.status);
    info!("  Count:               {}", info.count);
    if let Some(duration) = duration {
        info!("  Duration:            {:.1}s", duration.as_secs_f64());
    }
    if let Some(notes) = &info.notes {
        info!("  Notes:               {}", notes);
    }
    info!("═══════════════════════════════════════════════════════");
}

async fn show_status(store: &HarvestInfoRepository) -> anyhow::Result<()> {
    println!("\nHarvest status\n");
    for harvest_id in [OBSERVATION_HARVEST_ID, CHECKLIST_HARVEST_ID, PROCESSING_ID] {
        let history = store.history(harvest_id, 1).await?;
        match history.first() {
            Some(info) => println!(
                "  {:<28} {:<17} {:>10}  {}",
                harvest_id,
                info.status.as_str(),
                info.count,
                info.start.format("%Y-%m-%d %H:%M:%S")
            ),
            None => println!("  {:<28} never run", harvest_id),
        }
    }
    println!();

    Ok(())
}
