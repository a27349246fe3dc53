use crate::aggregation::percentage_label;
use crate::color::color_for;
use crate::types::TreeNode;

/// Print a per-category preview of the built tree, largest movers first
pub fn display_tree(root: &TreeNode, rows_per_category: usize) {
    if root.children.is_empty() {
        println!("No data to display");
        return;
    }

    println!("\n{}", "=".repeat(100));
    println!("                                  TOKEN TREEMAP PREVIEW");
    println!("{}", "=".repeat(100));

    println!("{:<14} {:>16} {:>16} {:>12} {:>10} {:>10}",
        "Symbol", "Start", "End", "Change", "Weight", "Color");

    for category in &root.children {
        println!("{}", "-".repeat(100));
        println!("{} ({} tokens, weight {:.3}, {:.1}% of total)",
            category.id.to_uppercase(),
            category.children.len(),
            category.weight,
            share(category.weight, root.weight));

        for token in category.children.iter().take(rows_per_category) {
            let Some(record) = &token.payload else { continue };
            let pct = record.percentage_change();
            println!("{:<14} {:>16} {:>16} {:>12} {:>10.3} {:>10}",
                token.id,
                format_price(record.start_price),
                format_price(record.end_price),
                percentage_label(pct),
                token.weight,
                color_for(pct).to_hex());
        }

        if category.children.len() > rows_per_category {
            println!("  ... {} more", category.children.len() - rows_per_category);
        }
    }

    println!("{}", "=".repeat(100));

    let leaves = root.leaves();
    let gainers = leaves.iter()
        .filter_map(|n| n.payload.as_ref())
        .filter(|r| r.price_change() > 0.0)
        .count();
    println!("Categories: {}", root.children.len());
    println!("Tokens: {} ({} up, {} flat or down)", leaves.len(), gainers, leaves.len() - gainers);
    println!("Total weight: {:.3}", root.weight);
    println!("{}", "=".repeat(100));
}

// Adaptive precision, token prices span many orders of magnitude
fn format_price(price: f64) -> String {
    if price < 0.01 {
        format!("{:.10}", price)
    } else if price < 1.0 {
        format!("{:.6}", price)
    } else if price < 100.0 {
        format!("{:.4}", price)
    } else {
        format!("{:.2}", price)
    }
}

fn share(part: f64, total: f64) -> f64 {
    if total > 0.0 { 100.0 * part / total } else { 0.0 }
}
