use arrow::array::{Array, Float64Array, StringArray, UInt8Array};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::collections::HashMap;
use std::env;
use std::fs::File;

struct Row {
    id: String,
    parent: Option<String>,
    label: String,
    depth: u8,
    weight: f64,
    change: Option<f64>,
    color: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <treemap.parquet>", args[0]);
        std::process::exit(1);
    }

    let filepath = &args[1];
    println!("\n{}", "=".repeat(100));
    println!("Inspecting: {}", filepath);
    println!("{}", "=".repeat(100));

    let file = File::open(filepath)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut rows = Vec::new();
    for batch_result in reader {
        let batch = batch_result?;
        let ids = batch.column(0).as_any().downcast_ref::<StringArray>()
            .ok_or("Failed to cast id column")?;
        let parents = batch.column(1).as_any().downcast_ref::<StringArray>()
            .ok_or("Failed to cast parent column")?;
        let labels = batch.column(2).as_any().downcast_ref::<StringArray>()
            .ok_or("Failed to cast label column")?;
        let depths = batch.column(3).as_any().downcast_ref::<UInt8Array>()
            .ok_or("Failed to cast depth column")?;
        let weights = batch.column(4).as_any().downcast_ref::<Float64Array>()
            .ok_or("Failed to cast weight column")?;
        let changes = batch.column(8).as_any().downcast_ref::<Float64Array>()
            .ok_or("Failed to cast percentage_change column")?;
        let colors = batch.column(9).as_any().downcast_ref::<StringArray>()
            .ok_or("Failed to cast color column")?;

        for i in 0..batch.num_rows() {
            rows.push(Row {
                id: ids.value(i).to_string(),
                parent: (!parents.is_null(i)).then(|| parents.value(i).to_string()),
                label: labels.value(i).to_string(),
                depth: depths.value(i),
                weight: weights.value(i),
                change: (!changes.is_null(i)).then(|| changes.value(i)),
                color: (!colors.is_null(i)).then(|| colors.value(i).to_string()),
            });
        }
    }

    println!("Total rows: {}", rows.len());
    if rows.is_empty() {
        println!("No data found!");
        return Ok(());
    }

    println!("\n{} FIRST 20 ROWS {}", "=".repeat(42), "=".repeat(42));
    print_header();
    for row in rows.iter().take(20) {
        print_row(row);
    }

    if rows.len() > 20 {
        println!("\n{} LAST 20 ROWS {}", "=".repeat(42), "=".repeat(42));
        print_header();
        for row in &rows[rows.len().saturating_sub(20).max(20)..] {
            print_row(row);
        }
    }

    println!("\n{} SANITY CHECKS {}", "=".repeat(42), "=".repeat(42));

    let roots = rows.iter().filter(|r| r.parent.is_none()).count();
    println!("Root rows: {} {}", roots, mark(roots == 1));

    let negative = rows.iter().filter(|r| !(r.weight.is_finite() && r.weight >= 0.0)).count();
    println!("Negative or non-finite weights: {} {}", negative, mark(negative == 0));

    let bad_depth = rows.iter().filter(|r| r.depth > 2).count();
    println!("Rows deeper than 2: {} {}", bad_depth, mark(bad_depth == 0));

    let mut child_sums: HashMap<&str, f64> = HashMap::new();
    let mut orphans = 0;
    let known: HashMap<&str, &Row> = rows.iter().map(|r| (r.id.as_str(), r)).collect();
    for row in &rows {
        if let Some(parent) = &row.parent {
            if !known.contains_key(parent.as_str()) {
                orphans += 1;
            }
            *child_sums.entry(parent.as_str()).or_insert(0.0) += row.weight;
        }
    }
    println!("Rows with unknown parent: {} {}", orphans, mark(orphans == 0));

    let mut mismatched = 0;
    for (parent, sum) in &child_sums {
        if let Some(row) = known.get(parent) {
            if (row.weight - sum).abs() > 1e-6 * row.weight.max(1.0) {
                mismatched += 1;
                println!("  weight mismatch at {}: {} vs children {}", parent, row.weight, sum);
            }
        }
    }
    println!("Parents whose weight != sum of children: {} {}", mismatched, mark(mismatched == 0));

    let categories = rows.iter().filter(|r| r.depth == 1).count();
    let tokens = rows.iter().filter(|r| r.depth == 2).count();
    println!("Categories: {}, tokens: {}", categories, tokens);
    println!("{}", "=".repeat(100));

    Ok(())
}

fn print_header() {
    println!("{:<40} {:<12} {:>6} {:>10} {:>10} {:>9}", "Id", "Label", "Depth", "Weight", "Change", "Color");
    println!("{}", "-".repeat(100));
}

fn print_row(row: &Row) {
    let change = row.change.map(|c| format!("{:+.2}%", c)).unwrap_or_default();
    println!("{:<40} {:<12} {:>6} {:>10.4} {:>10} {:>9}",
             row.id, row.label, row.depth, row.weight, change, row.color.as_deref().unwrap_or(""));
}

fn mark(ok: bool) -> &'static str {
    if ok { "PASS ✓" } else { "FAIL ✗" }
}
