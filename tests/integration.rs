use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use clap::Parser;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use token_treemap::cli::{parse_data_source, parse_datetime, parse_weight_mode, Args};
use token_treemap::directory::AssetDirectory;
use token_treemap::output::{OutputWriter, COLUMNS};
use token_treemap::sources::{create_source, fetch_or_fallback, PriceSource};
use token_treemap::types::{
    ClickHouseConfig, Config, DataSource, GenerativeModel, OutputFormat, TokenRecord, WeightMode, ROOT_ID,
};
use token_treemap::{build_tree, run_refresh_loop, Aggregator};

/// Base test config builder
fn test_config(source: DataSource) -> Config {
    Config {
        source,
        directory_path: "data/tokens.csv".into(),
        uncategorized_label: "Uncategorized".to_string(),
        from: Utc::now() - Duration::days(7),
        to: Utc::now(),
        weight_mode: WeightMode::LogChange,
        drop_zero_start: true,
        seed: Some(7),
        clickhouse: ClickHouseConfig::default(),
        out_format: OutputFormat::Json,
        cache_dir: None,
        output_dir: "/tmp/token_treemap_test_output".into(),
        refresh_secs: None,
        preview_rows: 3,
    }
}

fn shipped_directory() -> AssetDirectory {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("data/tokens.csv");
    AssetDirectory::from_csv_path(&path, "Uncategorized").unwrap()
}

struct FailingSource;

#[async_trait]
impl PriceSource for FailingSource {
    async fn fetch_records(&self, _config: &Config, _directory: &AssetDirectory) -> Result<Vec<TokenRecord>> {
        bail!("connection reset")
    }
}

#[tokio::test]
async fn test_synthetic_pipeline_builds_full_tree() {
    let model = GenerativeModel::GBM { mu: 0.0, sigma: 3.0 };
    let config = test_config(DataSource::Synthetic(model.clone()));
    let directory = shipped_directory();

    let source = create_source(&DataSource::Synthetic(model), &config).unwrap();
    let outcome = fetch_or_fallback(source.as_ref(), &config, &directory).await;
    assert!(outcome.error.is_none());
    assert_eq!(outcome.records.len(), directory.len());

    let tree = Aggregator::new(config.weight_mode).build(&outcome.records);
    assert_eq!(tree.leaves().len(), directory.len());

    let categories: std::collections::HashSet<&str> = directory.iter().map(|a| a.category.as_str()).collect();
    assert_eq!(tree.children.len(), categories.len());

    let sum: f64 = tree.children.iter().map(|c| c.weight).sum();
    assert!((tree.weight - sum).abs() < 1e-9);
}

#[tokio::test]
async fn test_failed_fetch_falls_back_to_empty_dataset() {
    let config = test_config(DataSource::ClickHouse);
    let directory = shipped_directory();

    let outcome = fetch_or_fallback(&FailingSource, &config, &directory).await;
    assert!(outcome.records.is_empty());
    let message = outcome.error.expect("error message");
    assert!(message.contains("connection reset"), "{}", message);

    let tree = build_tree(&outcome.records);
    assert_eq!(tree.id, ROOT_ID);
    assert!(tree.children.is_empty());
    assert_eq!(tree.weight, 0.0);
}

#[tokio::test]
async fn test_unreachable_clickhouse_falls_back() {
    let mut config = test_config(DataSource::ClickHouse);
    config.clickhouse.host = "127.0.0.1".to_string();
    config.clickhouse.port = 1;
    config.clickhouse.timeout_secs = 5;
    let directory = shipped_directory();

    let source = create_source(&DataSource::ClickHouse, &config).unwrap();
    let outcome = fetch_or_fallback(source.as_ref(), &config, &directory).await;
    assert!(outcome.records.is_empty());
    assert!(outcome.error.is_some());
}

#[tokio::test]
async fn test_empty_directory_skips_query() {
    let mut config = test_config(DataSource::ClickHouse);
    config.clickhouse.port = 1;
    let directory = AssetDirectory::default();

    let source = create_source(&DataSource::ClickHouse, &config).unwrap();
    let outcome = fetch_or_fallback(source.as_ref(), &config, &directory).await;
    assert!(outcome.records.is_empty());
    assert!(outcome.error.is_none());
}

#[test]
fn test_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(DataSource::ClickHouse);
    config.output_dir = dir.path().to_path_buf();

    let records = vec![
        TokenRecord::new("A", "X", 100.0, 110.0),
        TokenRecord::new("B", "X", 50.0, 40.0),
        TokenRecord::new("C", "Y", 2.0, 2.1),
    ];
    let tree = build_tree(&records);
    let path = OutputWriter::new().write_tree(&config, &tree, None).unwrap();
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("json"));

    let document: serde_json::Value = serde_json::from_reader(std::fs::File::open(&path).unwrap()).unwrap();
    assert_eq!(document["source"], "clickhouse");
    assert_eq!(document["weight_mode"], "log-change");
    assert!(document["error"].is_null());
    assert_eq!(document["tree"]["id"], ROOT_ID);
    assert_eq!(document["tree"]["children"].as_array().unwrap().len(), 2);
    assert!(document["tree"].get("color").is_none());

    // Leaves of the nested tree carry the same color as their flat row
    let x = &document["tree"]["children"][0];
    assert_eq!(x["id"], "X");
    assert!(x.get("color").is_none());
    let a = x["children"].as_array().unwrap().iter().find(|n| n["id"] == "A").expect("A leaf");
    assert_eq!(a["color"], "#22c55e");
    let b = x["children"].as_array().unwrap().iter().find(|n| n["id"] == "B").expect("B leaf");
    assert_eq!(b["color"], "#ff4976");
    assert_eq!(b["payload"]["symbol"], "B");

    let rows = document["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1 + 2 + 3);
    assert_eq!(rows[0]["id"], ROOT_ID);
    assert_eq!(rows[1]["id"], "root/X");
    assert_eq!(rows[2]["parent"], "root/X");
}

#[test]
fn test_json_output_records_fetch_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(DataSource::ClickHouse);
    config.output_dir = dir.path().to_path_buf();

    let tree = build_tree(&[]);
    let path = OutputWriter::new().write_tree(&config, &tree, Some("Using empty dataset due to error: boom")).unwrap();

    let document: serde_json::Value = serde_json::from_reader(std::fs::File::open(&path).unwrap()).unwrap();
    assert_eq!(document["error"], "Using empty dataset due to error: boom");
    assert_eq!(document["rows"].as_array().unwrap().len(), 1);
}

#[test]
fn test_parquet_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(DataSource::ClickHouse);
    config.output_dir = dir.path().to_path_buf();
    config.out_format = OutputFormat::Parquet;

    let records = vec![
        TokenRecord::new("A", "X", 100.0, 110.0),
        TokenRecord::new("B", "Y", 0.0, 1.0),
    ];
    let tree = build_tree(&records);
    let path = OutputWriter::new().write_tree(&config, &tree, None).unwrap();
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("parquet"));

    let reader = ParquetRecordBatchReaderBuilder::try_new(std::fs::File::open(&path).unwrap())
        .unwrap()
        .build()
        .unwrap();
    let mut total = 0;
    for batch in reader {
        let batch = batch.unwrap();
        assert_eq!(batch.num_columns(), COLUMNS.len());
        total += batch.num_rows();
    }
    assert_eq!(total, 1 + 2 + 2);
}

#[test]
fn test_cli_parsing() {
    assert!(matches!(parse_data_source("clickhouse").unwrap(), DataSource::ClickHouse));
    match parse_data_source("gbm(0.1, 0.8)").unwrap() {
        DataSource::Synthetic(GenerativeModel::GBM { mu, sigma }) => {
            assert_eq!(mu, 0.1);
            assert_eq!(sigma, 0.8);
        }
        other => panic!("unexpected source {:?}", other),
    }
    assert!(parse_data_source("binance").is_err());
    assert!(parse_data_source("gbm(0.1,-1)").is_err());

    assert_eq!(parse_weight_mode("end-price").unwrap(), WeightMode::EndPrice);
    assert!(parse_weight_mode("market-value").is_err());

    let date = parse_datetime("2025-03-04").unwrap();
    assert_eq!(date.to_rfc3339(), "2025-03-04T00:00:00+00:00");
    assert!(parse_datetime("yesterday").unwrap() < parse_datetime("now").unwrap());
    assert!(parse_datetime("04/03/2025").is_err());
}

#[test]
fn test_args_into_config() {
    let args = Args::try_parse_from([
        "token-treemap",
        "--source", "gbm(0,1)",
        "--from", "2025-01-01",
        "--to", "2025-01-08",
        "--weight-mode", "percentage-change",
        "--out-format", "parquet",
        "--seed", "3",
    ])
    .unwrap();
    let config = args.into_config().unwrap();
    assert_eq!(config.weight_mode, WeightMode::PercentageChange);
    assert_eq!(config.out_format, OutputFormat::Parquet);
    assert_eq!(config.seed, Some(3));
    assert!(config.drop_zero_start);
    assert_eq!(config.to - config.from, Duration::days(7));

    let reversed = Args::try_parse_from(["token-treemap", "--from", "2025-01-08", "--to", "2025-01-01"]).unwrap();
    assert!(reversed.into_config().is_err());

    let bad_table = Args::try_parse_from(["token-treemap", "--ch-table", "prices; DROP TABLE x"]).unwrap();
    assert!(bad_table.into_config().is_err());
}

#[tokio::test]
async fn test_refresh_loop_runs_until_shutdown() {
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let mut tx = Some(tx);
    let mut seen = Vec::new();

    let completed = run_refresh_loop(std::time::Duration::from_millis(10), rx, |n| {
        seen.push(n);
        if n == 2 {
            if let Some(tx) = tx.take() {
                let _ = tx.send(());
            }
        }
        async { Ok::<(), anyhow::Error>(()) }
    })
    .await;

    assert!(completed >= 3, "completed {}", completed);
    assert_eq!(seen, (0..seen.len()).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_refresh_loop_interrupts_slow_refresh() {
    let shutdown = tokio::time::sleep(std::time::Duration::from_millis(50));
    let stopped = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        run_refresh_loop(std::time::Duration::from_secs(60), shutdown, |_| async {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok::<(), anyhow::Error>(())
        }),
    )
    .await;

    // The first refresh never finished
    assert_eq!(stopped.expect("loop ignored shutdown"), 0);
}

#[tokio::test]
async fn test_refresh_loop_survives_failed_refresh() {
    let shutdown = tokio::time::sleep(std::time::Duration::from_millis(100));
    let completed = run_refresh_loop(std::time::Duration::from_millis(10), shutdown, |_| async {
        Err::<(), anyhow::Error>(anyhow::anyhow!("clickhouse down"))
    })
    .await;
    assert!(completed >= 2, "completed {}", completed);
}
