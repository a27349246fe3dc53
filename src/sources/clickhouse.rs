use crate::cache::CacheManager;
use crate::directory::AssetDirectory;
use crate::sources::PriceSource;
use crate::types::{ClickHouseConfig, Config, TokenRecord, CACHE_SETTLE_SECS};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Explicitly constructed handle to the ClickHouse HTTP interface
#[derive(Clone)]
pub struct ClickHouseClient {
    agent: Arc<ureq::Agent>,
    endpoint: String,
    username: String,
    password: String,
    database: String,
    cache: Option<CacheManager>,
}

impl ClickHouseClient {
    pub fn new(config: &ClickHouseConfig, cache: Option<CacheManager>) -> Self {
        Self {
            agent: Arc::new(
                ureq::AgentBuilder::new()
                    .timeout(std::time::Duration::from_secs(config.timeout_secs))
                    .build(),
            ),
            endpoint: format!("http://{}:{}/", config.host, config.port),
            username: config.username.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
            cache,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn cache(&self) -> Option<&CacheManager> {
        self.cache.as_ref()
    }

    /// Cache key of `query` against this endpoint and database
    pub fn cache_key(&self, query: &str) -> String {
        format!("{}|{}|{}", self.endpoint, self.database, query)
    }

    /// Run `query` and decode the `JSONEachRow` response. The response cache is
    /// consulted and filled only when `cacheable` is set.
    pub async fn query_json_each_row<T: DeserializeOwned>(&self, query: &str, cacheable: bool) -> Result<Vec<T>> {
        let cache = if cacheable { self.cache.as_ref() } else { None };
        let cache_key = self.cache_key(query);
        if let Some(cache) = cache {
            if cache.is_cached(&cache_key) {
                debug!("Using cached response: {}", cache.get_cache_path(&cache_key).display());
                return parse_json_each_row(&cache.read_cached(&cache_key)?);
            }
        }

        let body = self.post(query.to_string()).await?;

        if let Some(cache) = cache {
            if let Err(e) = cache.write_cached(&cache_key, &body) {
                warn!("Failed to cache response: {}", e);
            }
        }
        parse_json_each_row(&body)
    }

    async fn post(&self, query: String) -> Result<String> {
        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();
        let username = self.username.clone();
        let password = self.password.clone();
        let database = self.database.clone();

        // ureq is synchronous, keep it off the async workers
        tokio::task::spawn_blocking(move || -> Result<String> {
            debug!("Querying {} ({} bytes)", endpoint, query.len());
            let response = agent
                .post(&endpoint)
                .query("database", &database)
                .query("default_format", "JSONEachRow")
                .set("X-ClickHouse-User", &username)
                .set("X-ClickHouse-Key", &password)
                .send_string(&query);

            match response {
                Ok(response) => Ok(response.into_string()?),
                Err(ureq::Error::Status(code, response)) => {
                    let message = response.into_string().unwrap_or_default();
                    bail!("ClickHouse returned HTTP {}: {}", code, message.trim())
                }
                Err(e) => Err(anyhow!("Failed to reach ClickHouse at {}: {}", endpoint, e)),
            }
        })
        .await?
    }
}

/// Decode a newline-delimited JSON body, skipping blank lines
pub fn parse_json_each_row<T: DeserializeOwned>(body: &str) -> Result<Vec<T>> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(i, line)| serde_json::from_str(line).map_err(|e| anyhow!("Malformed row {}: {}", i + 1, e)))
        .collect()
}

/// First and last positive price of one address over the window
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceRow {
    pub address: String,
    pub start_price: f64,
    pub end_price: f64,
}

/// Both legs of every swap carry a USDC price, so each side contributes observations.
pub fn build_price_query<'a>(
    table: &str,
    addresses: impl IntoIterator<Item = &'a str>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> String {
    let address_list = addresses
        .into_iter()
        .map(|a| format!("'{}'", escape_literal(a)))
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "SELECT
    address,
    argMin(price, timestamp) AS start_price,
    argMax(price, timestamp) AS end_price
FROM (
    SELECT timestamp, token_a AS address, token_a_usdc_price AS price FROM {table}
    UNION ALL
    SELECT timestamp, token_b AS address, token_b_usdc_price AS price FROM {table}
)
WHERE price > 0
    AND address IN ({address_list})
    AND timestamp >= toDateTime({from})
    AND timestamp < toDateTime({to})
GROUP BY address",
        table = table,
        address_list = address_list,
        from = from.timestamp(),
        to = to.timestamp(),
    )
}

/// A window's response is reproducible once it ended `CACHE_SETTLE_SECS` ago.
/// Sliding refresh windows are never cached.
pub fn is_cacheable_window(config: &Config, now: DateTime<Utc>) -> bool {
    config.refresh_secs.is_none() && config.to <= now - Duration::seconds(CACHE_SETTLE_SECS)
}

fn escape_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Attach directory metadata to price rows, in directory order.
/// Rows for unknown addresses are dropped.
pub fn join_with_directory(rows: Vec<PriceRow>, directory: &AssetDirectory, drop_zero_start: bool) -> Vec<TokenRecord> {
    let total = rows.len();
    let mut by_address: HashMap<String, PriceRow> = rows.into_iter().map(|r| (r.address.clone(), r)).collect();

    let mut records = Vec::with_capacity(by_address.len());
    for asset in directory.iter() {
        let Some(row) = by_address.remove(&asset.address) else {
            continue;
        };
        if drop_zero_start && row.start_price <= 0.0 {
            debug!("Dropping {} with non-positive start price", asset.symbol);
            continue;
        }
        records.push(TokenRecord {
            symbol: asset.symbol.clone(),
            category: asset.category.clone(),
            start_price: row.start_price,
            end_price: row.end_price,
            name: asset.name.clone(),
            address: asset.address.clone(),
        });
    }

    if !by_address.is_empty() {
        debug!("Ignored {} of {} rows for addresses not in the directory", by_address.len(), total);
    }
    records
}

pub struct ClickHouseSource {
    client: ClickHouseClient,
}

impl ClickHouseSource {
    pub fn new(client: ClickHouseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PriceSource for ClickHouseSource {
    async fn fetch_records(&self, config: &Config, directory: &AssetDirectory) -> Result<Vec<TokenRecord>> {
        if directory.is_empty() {
            warn!("Asset directory is empty, nothing to query");
            return Ok(Vec::new());
        }

        info!(
            "Fetching prices for {} assets from {} ({} to {})",
            directory.len(),
            self.client.endpoint(),
            config.from,
            config.to
        );

        let query = build_price_query(&config.clickhouse.table, directory.addresses(), config.from, config.to);
        let cacheable = is_cacheable_window(config, Utc::now());
        if !cacheable && self.client.cache().is_some() {
            debug!("Window ends at {}, bypassing response cache", config.to);
        }
        let rows: Vec<PriceRow> = self.client.query_json_each_row(&query, cacheable).await?;
        info!("Received {} price rows", rows.len());

        Ok(join_with_directory(rows, directory, config.drop_zero_start))
    }
}
