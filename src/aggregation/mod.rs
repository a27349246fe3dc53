use crate::color::color_for;
use crate::types::{TokenRecord, TreeNode, WeightMode, LOG_CHANGE_SCALE, PARALLEL_THRESHOLD, ROOT_ID};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Builds the root / category / token tree from flat price records
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator {
    mode: WeightMode,
}

impl Aggregator {
    pub fn new(mode: WeightMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> WeightMode {
        self.mode
    }

    /// Build a fresh tree. Total over its input: an empty slice yields a
    /// root with no children and weight 0.
    pub fn build(&self, records: &[TokenRecord]) -> TreeNode {
        let weights = self.leaf_weights(records);

        // Group record indices by category in first-seen order
        let mut slots: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
        for (i, record) in records.iter().enumerate() {
            let slot = *slots.entry(record.category.as_str()).or_insert_with(|| {
                groups.push((record.category.as_str(), Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(i);
        }

        let mut categories: Vec<TreeNode> = groups
            .into_iter()
            .map(|(category, members)| {
                let mut used: HashSet<String> = HashSet::with_capacity(members.len());
                let mut tokens: Vec<TreeNode> = members
                    .into_iter()
                    .map(|i| {
                        let record = &records[i];
                        TreeNode {
                            id: unique_id(&mut used, &record.symbol),
                            parent_id: Some(category.to_string()),
                            weight: weights[i],
                            depth: 2,
                            payload: Some(record.clone()),
                            children: Vec::new(),
                        }
                    })
                    .collect();
                sort_by_weight_desc(&mut tokens);

                TreeNode {
                    id: category.to_string(),
                    parent_id: Some(ROOT_ID.to_string()),
                    weight: tokens.iter().map(|t| t.weight).sum(),
                    depth: 1,
                    payload: None,
                    children: tokens,
                }
            })
            .collect();
        sort_by_weight_desc(&mut categories);

        TreeNode {
            id: ROOT_ID.to_string(),
            parent_id: None,
            weight: categories.iter().map(|c| c.weight).sum(),
            depth: 0,
            payload: None,
            children: categories,
        }
    }

    fn leaf_weights(&self, records: &[TokenRecord]) -> Vec<f64> {
        let mode = self.mode;
        if records.len() > PARALLEL_THRESHOLD {
            records.par_iter().map(|r| leaf_weight(r, mode)).collect()
        } else {
            records.iter().map(|r| leaf_weight(r, mode)).collect()
        }
    }
}

/// Build the tree with the default log-change weights
pub fn build_tree(records: &[TokenRecord]) -> TreeNode {
    Aggregator::default().build(records)
}

/// Weight of a single token. Always finite and non-negative.
pub fn leaf_weight(record: &TokenRecord, mode: WeightMode) -> f64 {
    let raw = match mode {
        WeightMode::LogChange => (record.price_change().abs() * LOG_CHANGE_SCALE).max(1.0).log10(),
        WeightMode::PriceChange => record.price_change().abs(),
        WeightMode::PercentageChange => record.percentage_change().abs(),
        WeightMode::EndPrice => record.end_price,
    };
    if raw.is_finite() && raw > 0.0 {
        raw
    } else {
        0.0
    }
}

// Stable, so equal weights keep input order
fn sort_by_weight_desc(nodes: &mut [TreeNode]) {
    nodes.sort_by(|a, b| b.weight.total_cmp(&a.weight));
}

fn unique_id(used: &mut HashSet<String>, symbol: &str) -> String {
    let mut id = symbol.to_string();
    let mut n = 1;
    while !used.insert(id.clone()) {
        n += 1;
        id = format!("{}#{}", symbol, n);
    }
    id
}

/// One node of the flattened tree, the tabular form consumed by treemap layout libraries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreemapRow {
    /// Slash-joined path from the root, unique across the whole tree.
    /// `/` and `%` inside a node id appear as `%2F` and `%25`.
    pub id: String,
    pub parent: Option<String>,
    pub label: String,
    pub depth: u8,
    pub weight: f64,
    pub text: String,
    pub start_price: Option<f64>,
    pub end_price: Option<f64>,
    pub percentage_change: Option<f64>,
    pub color: Option<String>,
}

/// Flatten in pre-order: the root comes first and every parent precedes its children.
pub fn flatten(root: &TreeNode) -> Vec<TreemapRow> {
    let mut rows = Vec::new();
    push_rows(root, None, &mut rows);
    rows
}

fn push_rows(node: &TreeNode, parent_path: Option<&str>, rows: &mut Vec<TreemapRow>) {
    let path = match parent_path {
        Some(parent) => format!("{}/{}", parent, escape_segment(&node.id)),
        None => escape_segment(&node.id),
    };

    let row = match &node.payload {
        Some(record) => {
            let pct = record.percentage_change();
            TreemapRow {
                id: path.clone(),
                parent: parent_path.map(str::to_string),
                label: record.symbol.clone(),
                depth: node.depth,
                weight: node.weight,
                text: tooltip_text(record),
                start_price: Some(record.start_price),
                end_price: Some(record.end_price),
                percentage_change: pct.is_finite().then_some(pct),
                color: Some(color_for(pct).to_hex()),
            }
        }
        None => TreemapRow {
            id: path.clone(),
            parent: parent_path.map(str::to_string),
            label: node.id.clone(),
            depth: node.depth,
            weight: node.weight,
            text: node.id.to_uppercase(),
            start_price: None,
            end_price: None,
            percentage_change: None,
            color: None,
        },
    };
    rows.push(row);

    for child in &node.children {
        push_rows(child, Some(&path), rows);
    }
}

// `%` and `/` inside a segment are percent-encoded so joined paths stay unambiguous
fn escape_segment(segment: &str) -> String {
    segment.replace('%', "%25").replace('/', "%2F")
}

/// Hover text for a token: name, current price and absolute change.
/// Gains carry a leading `+`, losses keep their sign after the dollar (`$-0.5000`).
pub fn tooltip_text(record: &TokenRecord) -> String {
    let change = record.price_change();
    let sign = if change >= 0.0 { "+" } else { "" };
    format!(
        "{} ({})\nCurrent Price: ${:.4}\nChange: {}${:.4}",
        record.name, record.symbol, record.end_price, sign, change
    )
}

/// Signed percentage label as drawn on large tiles, e.g. `+4.20%`
pub fn percentage_label(pct: f64) -> String {
    if !pct.is_finite() {
        return "n/a".to_string();
    }
    let sign = if pct > 0.0 { "+" } else { "" };
    format!("{}{:.2}%", sign, pct)
}
