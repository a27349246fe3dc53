use crate::aggregation::{flatten, TreemapRow};
use crate::color::color_for;
use crate::types::{Config, OutputFormat, TokenRecord, TreeNode};
use anyhow::Result;
use arrow::array::{Float64Array, StringArray, UInt8Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Column order of the Parquet output
pub const COLUMNS: [&str; 10] = [
    "id",
    "parent",
    "label",
    "depth",
    "weight",
    "text",
    "start_price",
    "end_price",
    "percentage_change",
    "color",
];

#[derive(Serialize)]
struct TreemapDocument<'a> {
    source: String,
    weight_mode: String,
    from: String,
    to: String,
    error: Option<&'a str>,
    tree: NestedNode<'a>,
    rows: Vec<TreemapRow>,
}

/// Serialized view of a tree node; leaves carry their hex color
#[derive(Serialize)]
struct NestedNode<'a> {
    id: &'a str,
    parent_id: Option<&'a str>,
    weight: f64,
    depth: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<String>,
    payload: Option<&'a TokenRecord>,
    children: Vec<NestedNode<'a>>,
}

impl<'a> From<&'a TreeNode> for NestedNode<'a> {
    fn from(node: &'a TreeNode) -> Self {
        Self {
            id: &node.id,
            parent_id: node.parent_id.as_deref(),
            weight: node.weight,
            depth: node.depth,
            color: node.payload.as_ref().map(|r| color_for(r.percentage_change()).to_hex()),
            payload: node.payload.as_ref(),
            children: node.children.iter().map(NestedNode::from).collect(),
        }
    }
}

/// Writes a built tree to JSON (nested tree plus flat rows) or Parquet (flat rows)
#[derive(Debug, Default)]
pub struct OutputWriter;

impl OutputWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn write_tree(&self, config: &Config, tree: &TreeNode, error: Option<&str>) -> Result<PathBuf> {
        std::fs::create_dir_all(&config.output_dir)?;
        let output_path = config.output_dir.join(self.generate_filename(config));

        match config.out_format {
            OutputFormat::Json => {
                let document = TreemapDocument {
                    source: config.source.to_string(),
                    weight_mode: config.weight_mode.to_string(),
                    from: config.from.to_rfc3339(),
                    to: config.to.to_rfc3339(),
                    error,
                    tree: NestedNode::from(tree),
                    rows: flatten(tree),
                };
                let file = File::create(&output_path)?;
                serde_json::to_writer_pretty(file, &document)?;
            }
            OutputFormat::Parquet => write_parquet(&output_path, &flatten(tree))?,
        }

        Ok(output_path)
    }

    fn generate_filename(&self, config: &Config) -> String {
        format!(
            "treemap_{}_{}-{}_{}.{}",
            config.source,
            config.from.format("%Y%m%d"),
            config.to.format("%Y%m%d"),
            config.weight_mode,
            config.out_format
        )
    }
}

pub fn write_parquet(path: &Path, rows: &[TreemapRow]) -> Result<()> {
    let schema = Schema::new(vec![
        Field::new(COLUMNS[0], DataType::Utf8, false),
        Field::new(COLUMNS[1], DataType::Utf8, true),
        Field::new(COLUMNS[2], DataType::Utf8, false),
        Field::new(COLUMNS[3], DataType::UInt8, false),
        Field::new(COLUMNS[4], DataType::Float64, false),
        Field::new(COLUMNS[5], DataType::Utf8, false),
        Field::new(COLUMNS[6], DataType::Float64, true),
        Field::new(COLUMNS[7], DataType::Float64, true),
        Field::new(COLUMNS[8], DataType::Float64, true),
        Field::new(COLUMNS[9], DataType::Utf8, true),
    ]);

    let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
    let parents: Vec<Option<&str>> = rows.iter().map(|r| r.parent.as_deref()).collect();
    let labels: Vec<&str> = rows.iter().map(|r| r.label.as_str()).collect();
    let depths: Vec<u8> = rows.iter().map(|r| r.depth).collect();
    let weights: Vec<f64> = rows.iter().map(|r| r.weight).collect();
    let texts: Vec<&str> = rows.iter().map(|r| r.text.as_str()).collect();
    let start_prices: Vec<Option<f64>> = rows.iter().map(|r| r.start_price).collect();
    let end_prices: Vec<Option<f64>> = rows.iter().map(|r| r.end_price).collect();
    let changes: Vec<Option<f64>> = rows.iter().map(|r| r.percentage_change).collect();
    let colors: Vec<Option<&str>> = rows.iter().map(|r| r.color.as_deref()).collect();

    let batch = RecordBatch::try_new(
        Arc::new(schema.clone()),
        vec![
            Arc::new(StringArray::from(ids)) as _,
            Arc::new(StringArray::from(parents)) as _,
            Arc::new(StringArray::from(labels)) as _,
            Arc::new(UInt8Array::from(depths)) as _,
            Arc::new(Float64Array::from(weights)) as _,
            Arc::new(StringArray::from(texts)) as _,
            Arc::new(Float64Array::from(start_prices)) as _,
            Arc::new(Float64Array::from(end_prices)) as _,
            Arc::new(Float64Array::from(changes)) as _,
            Arc::new(StringArray::from(colors)) as _,
        ],
    )?;

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, Arc::new(schema), None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}
