use anyhow::{Context, Result};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// One known tradable asset
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Asset {
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub category: String,
}

/// Asset metadata keyed by on-chain address, iterated in file order
#[derive(Debug, Clone, Default)]
pub struct AssetDirectory {
    assets: Vec<Asset>,
    by_address: HashMap<String, usize>,
}

impl AssetDirectory {
    /// Load a CSV with an `address,name,symbol,category` header.
    /// Blank categories become `uncategorized_label`.
    pub fn from_csv_path(path: &Path, uncategorized_label: &str) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open asset directory {}", path.display()))?;
        let directory = Self::from_reader(file, uncategorized_label)?;
        debug!("Loaded {} assets from {}", directory.len(), path.display());
        Ok(directory)
    }

    pub fn from_reader<R: Read>(reader: R, uncategorized_label: &str) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut assets = Vec::new();
        for result in reader.deserialize() {
            let mut asset: Asset = result?;
            if asset.category.is_empty() {
                asset.category = uncategorized_label.to_string();
            }
            assets.push(asset);
        }
        Ok(Self::from_assets(assets))
    }

    /// Later entries with an already-seen address are dropped
    pub fn from_assets(assets: Vec<Asset>) -> Self {
        let mut directory = Self::default();
        for asset in assets {
            if directory.by_address.contains_key(&asset.address) {
                warn!("Duplicate asset address {} ({}), keeping first entry", asset.address, asset.symbol);
                continue;
            }
            directory.by_address.insert(asset.address.clone(), directory.assets.len());
            directory.assets.push(asset);
        }
        directory
    }

    pub fn get(&self, address: &str) -> Option<&Asset> {
        self.by_address.get(address).map(|&i| &self.assets[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.iter()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.assets.iter().map(|a| a.address.as_str())
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
