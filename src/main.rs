use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use capgate::aggregator::{Aggregator, HttpTransport, RemoteTransport};
use capgate::classify::{ChatOracle, Classifier, ClassifyWorker};
use capgate::cli::{Cli, Command};
use capgate::config::{AggregatorConfig, ClassifierConfig, DatabaseConfig, GatewayConfig};
use capgate::gateway::{meta, Gateway};
use capgate::registry::CapabilityRegistry;
use capgate::store::connect_from_config;
use capgate::tools::{self, LocalToolSet};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let db_config = DatabaseConfig::resolve()?;
    let store = connect_from_config(&db_config)
        .await
        .with_context(|| format!("failed to open database at '{}'", db_config.path))?;

    match cli.command {
        Command::Run => run(store).await,
        Command::Skill { command } => capgate::cli::handle_skill(store, command).await,
        Command::Server { command } => {
            let config = AggregatorConfig::resolve()?;
            let transport: Arc<dyn RemoteTransport> =
                Arc::new(HttpTransport::new(config.request_timeout));
            let aggregator = Arc::new(Aggregator::new(Arc::clone(&store), transport, &config));
            capgate::cli::handle_server(store, aggregator, command).await
        }
    }
}

async fn run(store: Arc<dyn capgate::Store>) -> anyhow::Result<()> {
    let registry = CapabilityRegistry::new(Arc::clone(&store));

    let local_tools = Arc::new(LocalToolSet::with_builtins()?);
    let seeded_meta = meta::seed_defaults(&registry).await?;
    let seeded_local = tools::seed_capabilities(&local_tools, &registry).await?;
    info!(
        meta = seeded_meta,
        local = seeded_local,
        "capability records seeded"
    );

    let classifier_config = ClassifierConfig::resolve()?;
    let classify_queue = if classifier_config.enabled {
        let oracle = Arc::new(ChatOracle::new(&classifier_config));
        let classifier = Arc::new(Classifier::new(
            Arc::clone(&store),
            oracle,
            &classifier_config,
        ));
        let (worker, queue) =
            ClassifyWorker::new(Arc::clone(&store), classifier, classifier_config);
        tokio::spawn(worker.run());
        Some(queue)
    } else {
        info!("classification disabled");
        None
    };

    let aggregator_config = AggregatorConfig::resolve()?;
    let transport: Arc<dyn RemoteTransport> =
        Arc::new(HttpTransport::new(aggregator_config.request_timeout));
    let mut aggregator = Aggregator::new(Arc::clone(&store), transport, &aggregator_config);
    if let Some(queue) = classify_queue {
        aggregator = aggregator.with_classify_queue(queue);
    }
    let aggregator = Arc::new(aggregator);
    tokio::spawn(Arc::clone(&aggregator).run_resync_loop());

    let gateway_config = GatewayConfig::resolve()?;
    let gateway = Arc::new(Gateway::new(
        Arc::clone(&store),
        aggregator,
        local_tools,
        &gateway_config,
    ));

    info!("gateway ready, serving on stdio");
    capgate::rpc::serve_stdio(gateway).await?;
    info!("stdin closed, shutting down");
    Ok(())
}
