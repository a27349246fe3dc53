pub mod aggregation;
pub mod cache;
pub mod cli;
pub mod color;
pub mod directory;
pub mod display;
pub mod output;
pub mod refresh;
pub mod sources;
pub mod types;

// Re-exports for library users
pub use aggregation::{build_tree, flatten, leaf_weight, Aggregator, TreemapRow};
pub use color::{color_for, Rgb, NEGATIVE, NEUTRAL, POSITIVE};
pub use directory::{Asset, AssetDirectory};
pub use display::display_tree;
pub use refresh::run_refresh_loop;
pub use sources::{create_source, fetch_or_fallback, FetchOutcome, PriceSource};
pub use types::{
    Config, DataSource, GenerativeModel, OutputFormat, TokenRecord, TreeNode, WeightMode,
    PARALLEL_THRESHOLD, ROOT_ID,
};
