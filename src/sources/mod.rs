pub mod clickhouse;
pub mod synthetic;

use crate::cache::CacheManager;
use crate::directory::AssetDirectory;
use crate::types::{Config, DataSource, TokenRecord};
use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info};

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// First and last observed price over the configured window, one record
    /// per directory asset that has data
    async fn fetch_records(&self, config: &Config, directory: &AssetDirectory) -> Result<Vec<TokenRecord>>;
}

pub fn create_source(source: &DataSource, config: &Config) -> Result<Box<dyn PriceSource>> {
    match source {
        DataSource::ClickHouse => {
            let cache = match &config.cache_dir {
                Some(dir) => Some(CacheManager::new(dir.clone())?),
                None => None,
            };
            let client = clickhouse::ClickHouseClient::new(&config.clickhouse, cache);
            Ok(Box::new(clickhouse::ClickHouseSource::new(client)))
        }
        DataSource::Synthetic(model) => Ok(Box::new(synthetic::SyntheticSource::new(model.clone()))),
    }
}

/// Records from one fetch, or an empty set and a readable message when the fetch failed
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub records: Vec<TokenRecord>,
    pub error: Option<String>,
}

/// Fetch without ever failing: errors are logged and turned into an empty dataset
pub async fn fetch_or_fallback(
    source: &dyn PriceSource,
    config: &Config,
    directory: &AssetDirectory,
) -> FetchOutcome {
    match source.fetch_records(config, directory).await {
        Ok(records) => {
            info!("Fetched {} token records from {}", records.len(), config.source);
            FetchOutcome { records, error: None }
        }
        Err(e) => {
            error!("Data fetching error: {:#}", e);
            FetchOutcome {
                records: Vec::new(),
                error: Some(format!("Using empty dataset due to error: {}", e)),
            }
        }
    }
}
