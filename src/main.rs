use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use token_treemap::cli::Args;
use token_treemap::output::OutputWriter;
use token_treemap::{
    create_source, display_tree, fetch_or_fallback, run_refresh_loop, Aggregator, AssetDirectory, Config,
    PriceSource,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = args.into_config()?;

    info!("Starting token treemap with config: {:?}", redacted(&config));
    info!("Output directory: {}", config.output_dir.display());

    let directory = AssetDirectory::from_csv_path(&config.directory_path, &config.uncategorized_label)?;
    info!("Asset directory: {} assets", directory.len());

    let source = create_source(&config.source, &config)?;
    let aggregator = Aggregator::new(config.weight_mode);
    let writer = OutputWriter::new();

    let Some(refresh_secs) = config.refresh_secs else {
        run_once(&config, source.as_ref(), &directory, &aggregator, &writer).await?;
        return Ok(());
    };

    let window = config.to - config.from;
    let refreshes = run_refresh_loop(Duration::from_secs(refresh_secs), tokio::signal::ctrl_c(), |n| {
        // Later refreshes slide the window forward, keeping its length
        let mut current = config.clone();
        if n > 0 {
            current.to = chrono::Utc::now();
            current.from = current.to - window;
        }
        let (source, directory, aggregator, writer) = (source.as_ref(), &directory, &aggregator, &writer);
        async move { run_once(&current, source, directory, aggregator, writer).await.map(|_| ()) }
    })
    .await;
    info!("Completed {} refreshes", refreshes);

    Ok(())
}

async fn run_once(
    config: &Config,
    source: &dyn PriceSource,
    directory: &AssetDirectory,
    aggregator: &Aggregator,
    writer: &OutputWriter,
) -> Result<PathBuf> {
    let outcome = fetch_or_fallback(source, config, directory).await;
    if let Some(message) = &outcome.error {
        warn!("{}", message);
    }

    let tree = aggregator.build(&outcome.records);
    info!(
        "Built tree: {} categories, {} tokens, total weight {:.3} ({})",
        tree.children.len(),
        outcome.records.len(),
        tree.weight,
        aggregator.mode()
    );

    let output_path = writer.write_tree(config, &tree, outcome.error.as_deref())?;
    display_tree(&tree, config.preview_rows);

    if let Some(filename) = output_path.file_name() {
        info!("Generated: {}", filename.to_string_lossy());
    }
    Ok(output_path)
}

fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    if !config.clickhouse.password.is_empty() {
        config.clickhouse.password = "***".to_string();
    }
    config
}
