use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Id of the single depth-0 node
pub const ROOT_ID: &str = "root";

/// Leaf weight computation switches to a parallel map above this many records
pub const PARALLEL_THRESHOLD: usize = 1000;

/// Scale applied to absolute price changes before the log transform
pub const LOG_CHANGE_SCALE: f64 = 1_000_000.0;

/// A window must have ended at least this long ago before its response is cached
pub const CACHE_SETTLE_SECS: i64 = 3600;

/// Label used for directory entries with a blank category
pub const DEFAULT_UNCATEGORIZED: &str = "Uncategorized";

/// One priced asset over the requested window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub symbol: String,
    pub category: String,
    pub start_price: f64,
    pub end_price: f64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
}

impl TokenRecord {
    pub fn new(symbol: &str, category: &str, start_price: f64, end_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            category: category.to_string(),
            start_price,
            end_price,
            name: symbol.to_string(),
            address: String::new(),
        }
    }

    /// Absolute price move, end minus start
    pub fn price_change(&self) -> f64 {
        self.end_price - self.start_price
    }

    /// Percentage move relative to the start price.
    ///
    /// A zero start price is not guarded: the result is `+inf`, `-inf` or
    /// NaN and the color scale handles it sign-aware.
    pub fn percentage_change(&self) -> f64 {
        (self.end_price - self.start_price) / self.start_price * 100.0
    }
}

/// A node of the category treemap. Children are owned, so the tree is acyclic by construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    pub id: String,
    pub parent_id: Option<String>,
    pub weight: f64,
    pub depth: u8,
    pub payload: Option<TokenRecord>,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn is_leaf(&self) -> bool {
        self.depth == 2
    }

    /// Every node of the tree in pre-order, including `self`
    pub fn descendants(&self) -> Vec<&TreeNode> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.descendants());
        }
        out
    }

    pub fn leaves(&self) -> Vec<&TreeNode> {
        self.descendants().into_iter().filter(|n| n.is_leaf()).collect()
    }
}

/// How a leaf's weight is derived from its record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightMode {
    /// `log10(max(1, |change| * 1e6))`
    #[default]
    LogChange,
    PriceChange,
    PercentageChange,
    EndPrice,
}

impl std::fmt::Display for WeightMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeightMode::LogChange => write!(f, "log-change"),
            WeightMode::PriceChange => write!(f, "price-change"),
            WeightMode::PercentageChange => write!(f, "percentage-change"),
            WeightMode::EndPrice => write!(f, "end-price"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Parquet,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Parquet => write!(f, "parquet"),
        }
    }
}

/// Connection settings for the ClickHouse HTTP interface
#[derive(Debug, Clone)]
pub struct ClickHouseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub table: String,
    pub timeout_secs: u64,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8123,
            username: "default".to_string(),
            password: String::new(),
            database: "default".to_string(),
            table: "solana_swaps_prices_raw".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DataSource {
    ClickHouse,
    Synthetic(GenerativeModel),
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSource::ClickHouse => write!(f, "clickhouse"),
            DataSource::Synthetic(GenerativeModel::GBM { .. }) => write!(f, "gbm"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerativeModel {
    /// Yearly drift and volatility, applied over the configured window
    GBM { mu: f64, sigma: f64 },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source: DataSource,
    pub directory_path: PathBuf,
    pub uncategorized_label: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub weight_mode: WeightMode,
    pub drop_zero_start: bool,
    pub seed: Option<u64>,
    pub clickhouse: ClickHouseConfig,
    pub out_format: OutputFormat,
    pub cache_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub refresh_secs: Option<u64>,
    pub preview_rows: usize,
}
