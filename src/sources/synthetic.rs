use crate::directory::AssetDirectory;
use crate::sources::PriceSource;
use crate::types::{Config, GenerativeModel, TokenRecord};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::info;

const MS_PER_YEAR: f64 = 365.25 * 24.0 * 60.0 * 60.0 * 1000.0;

/// Start prices are drawn log-uniformly between 10^MIN and 10^MAX
const START_PRICE_LOG10_MIN: f64 = -6.0;
const START_PRICE_LOG10_MAX: f64 = 3.0;

/// Generates start/end prices for every directory asset without a database
pub struct SyntheticSource {
    model: GenerativeModel,
}

impl SyntheticSource {
    pub fn new(model: GenerativeModel) -> Self {
        Self { model }
    }

    pub fn generate_records(&self, config: &Config, directory: &AssetDirectory) -> Result<Vec<TokenRecord>> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let years = ((config.to.timestamp_millis() - config.from.timestamp_millis()) as f64 / MS_PER_YEAR).max(0.0);

        match &self.model {
            GenerativeModel::GBM { mu, sigma } => {
                let normal = Normal::new(0.0, 1.0).map_err(|e| anyhow!("Invalid normal distribution: {}", e))?;
                let drift = (mu - sigma * sigma / 2.0) * years;
                let diffusion = sigma * years.sqrt();

                let records = directory
                    .iter()
                    .map(|asset| {
                        let start_price = 10f64.powf(rng.gen_range(START_PRICE_LOG10_MIN..START_PRICE_LOG10_MAX));
                        let z = normal.sample(&mut rng);
                        let end_price = start_price * (drift + diffusion * z).exp();
                        TokenRecord {
                            symbol: asset.symbol.clone(),
                            category: asset.category.clone(),
                            start_price,
                            end_price,
                            name: asset.name.clone(),
                            address: asset.address.clone(),
                        }
                    })
                    .collect();
                Ok(records)
            }
        }
    }
}

#[async_trait]
impl PriceSource for SyntheticSource {
    async fn fetch_records(&self, config: &Config, directory: &AssetDirectory) -> Result<Vec<TokenRecord>> {
        info!("Generating synthetic prices for {} assets with {:?}", directory.len(), self.model);
        self.generate_records(config, directory)
    }
}
