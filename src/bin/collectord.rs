use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use turbine_collector::{
    actors::{
        dispatcher::DispatcherHandle,
        ingestor::{IngestorHandle, StreamConfig},
    },
    config::read_config_file,
    sinks,
};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, default_value = "config.toml")]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("turbine_collector", LevelFilter::TRACE),
        ("turbine_collectord", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let sink = sinks::build_sink(&config)?;

    let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
    let dispatcher = DispatcherHandle::spawn(event_rx, sink.clone());

    let stream = StreamConfig::from_config(&config);
    let ingestors: Vec<_> = config
        .clusters
        .iter()
        .filter(|cluster| !cluster.trim().is_empty())
        .map(|cluster| {
            IngestorHandle::spawn(stream.clone(), cluster.trim().to_string(), event_tx.clone())
        })
        .collect();
    drop(event_tx);

    info!(
        "monitoring {} clusters through the {} backend",
        ingestors.len(),
        sink.name()
    );

    tokio::signal::ctrl_c().await?;
    info!("received shutdown signal");

    // Stop the producers first: the shared channel closes once the last
    // ingestor drops its sender, the dispatcher drains what is left, and
    // only then is the sink allowed to flush its final window.
    for ingestor in &ingestors {
        debug!("stopping ingestor for {}", ingestor.cluster);
        ingestor.shutdown().await;
    }

    dispatcher.join().await?;
    sink.shutdown().await;

    info!("shutdown complete");
    Ok(())
}
