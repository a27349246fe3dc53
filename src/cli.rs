use crate::types::{
    ClickHouseConfig, Config, DataSource, GenerativeModel, OutputFormat, WeightMode, DEFAULT_UNCATEGORIZED,
};
use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use regex::Regex;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// `clickhouse` or `gbm(mu,sigma)` with yearly parameters
    #[arg(long, default_value = "clickhouse")]
    pub source: String,

    /// CSV with address,name,symbol,category columns
    #[arg(long, default_value = "data/tokens.csv")]
    pub directory: PathBuf,

    #[arg(long, default_value = DEFAULT_UNCATEGORIZED)]
    pub uncategorized_label: String,

    #[arg(long, default_value = "yesterday")]
    pub from: String,

    #[arg(long, default_value = "now")]
    pub to: String,

    /// log-change | price-change | percentage-change | end-price
    #[arg(long, default_value = "log-change")]
    pub weight_mode: String,

    /// Keep rows whose start price is zero (their percentage change is infinite)
    #[arg(long)]
    pub keep_zero_start: bool,

    /// Seed for synthetic sources
    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, env = "CLICKHOUSE_HOST", default_value = "localhost")]
    pub ch_host: String,

    #[arg(long, env = "CLICKHOUSE_PORT", default_value = "8123")]
    pub ch_port: u16,

    #[arg(long, env = "CLICKHOUSE_USER", default_value = "default")]
    pub ch_user: String,

    #[arg(long, env = "CLICKHOUSE_PASSWORD", default_value = "", hide_env_values = true)]
    pub ch_password: String,

    #[arg(long, env = "CLICKHOUSE_DATABASE", default_value = "default")]
    pub ch_database: String,

    #[arg(long, default_value = "solana_swaps_prices_raw")]
    pub ch_table: String,

    #[arg(long, default_value = "60")]
    pub ch_timeout_secs: u64,

    #[arg(long, default_value = "json")]
    pub out_format: String,

    /// Cache raw query responses here; disabled when unset
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    #[arg(long, default_value = "./output")]
    pub output_dir: PathBuf,

    /// Rebuild the treemap every N seconds until interrupted
    #[arg(long)]
    pub refresh_secs: Option<u64>,

    #[arg(long, default_value = "5")]
    pub preview_rows: usize,
}

impl Args {
    pub fn into_config(self) -> Result<Config> {
        let source = parse_data_source(&self.source)?;
        let from = parse_datetime(&self.from)?;
        let to = parse_datetime(&self.to)?;
        if from >= to {
            bail!("Empty time window: --from {} is not before --to {}", from, to);
        }

        let weight_mode = parse_weight_mode(&self.weight_mode)?;

        let out_format = match self.out_format.as_str() {
            "json" => OutputFormat::Json,
            "parquet" => OutputFormat::Parquet,
            other => return Err(anyhow!("Invalid output format: {}", other)),
        };

        let table_re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")?;
        if !table_re.is_match(&self.ch_table) {
            bail!("Invalid table name: {}", self.ch_table);
        }

        if self.refresh_secs == Some(0) {
            bail!("--refresh-secs must be positive");
        }

        Ok(Config {
            source,
            directory_path: self.directory,
            uncategorized_label: self.uncategorized_label,
            from,
            to,
            weight_mode,
            drop_zero_start: !self.keep_zero_start,
            seed: self.seed,
            clickhouse: ClickHouseConfig {
                host: self.ch_host,
                port: self.ch_port,
                username: self.ch_user,
                password: self.ch_password,
                database: self.ch_database,
                table: self.ch_table,
                timeout_secs: self.ch_timeout_secs,
            },
            out_format,
            cache_dir: self.cache_dir,
            output_dir: self.output_dir,
            refresh_secs: self.refresh_secs,
            preview_rows: self.preview_rows,
        })
    }
}

pub fn parse_weight_mode(s: &str) -> Result<WeightMode> {
    match s {
        "log-change" => Ok(WeightMode::LogChange),
        "price-change" => Ok(WeightMode::PriceChange),
        "percentage-change" => Ok(WeightMode::PercentageChange),
        "end-price" => Ok(WeightMode::EndPrice),
        _ => Err(anyhow!("Invalid weight mode: {}", s)),
    }
}

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    use chrono::Duration;

    let now = Utc::now();
    let today = now.date_naive();

    match s {
        "now" => Ok(now),
        "today" => midnight(today),
        "yesterday" => midnight(today - Duration::days(1)),
        "7-days-ago" => midnight(today - Duration::days(7)),
        "30-days-ago" => midnight(today - Duration::days(30)),
        "90-days-ago" => midnight(today - Duration::days(90)),
        _ => {
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| anyhow!("Invalid date {}: {}", s, e))?;
            midnight(date)
        }
    }
}

fn midnight(date: NaiveDate) -> Result<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| anyhow!("Invalid date: {}", date))
}

pub fn parse_data_source(source: &str) -> Result<DataSource> {
    let gbm_re = Regex::new(r"^gbm\(([^,]+),([^)]+)\)$")?;

    if source == "clickhouse" {
        Ok(DataSource::ClickHouse)
    } else if let Some(caps) = gbm_re.captures(source) {
        let sigma: f64 = caps[2].trim().parse()?;
        if sigma < 0.0 {
            bail!("GBM volatility must be non-negative: {}", sigma);
        }
        Ok(DataSource::Synthetic(GenerativeModel::GBM {
            mu: caps[1].trim().parse()?,
            sigma,
        }))
    } else {
        Err(anyhow!("Unsupported data source: {}", source))
    }
}
