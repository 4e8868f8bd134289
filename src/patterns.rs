//! `logfix patterns`: list the stored pattern library.

use anyhow::Result;

use logfix_core::models::{Category, Pattern};
use logfix_core::store::PatternStore;

use crate::config::Config;
use crate::runtime;

/// Stored patterns, optionally filtered by category, ordered by category
/// then success rate (best first).
pub async fn list_patterns(
    store: &dyn PatternStore,
    category: Option<Category>,
) -> Result<Vec<Pattern>> {
    let mut patterns: Vec<Pattern> = store
        .all_patterns()
        .await?
        .into_iter()
        .filter(|p| category.map_or(true, |c| p.category == c))
        .collect();

    patterns.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then(b.success_rate.total_cmp(&a.success_rate))
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(patterns)
}

pub async fn run_patterns(config: &Config, category: Option<&str>) -> Result<()> {
    let category = category.map(str::parse::<Category>).transpose()?;

    let rt = runtime::open(config).await?;
    let patterns = list_patterns(rt.engine.store().as_ref(), category).await;
    rt.close().await;
    let patterns = patterns?;

    if patterns.is_empty() {
        println!("No patterns. Run `logfix init` to seed the built-in library.");
        return Ok(());
    }

    println!(
        "{:<12} {:<12} {:>8} {:>6}   {}",
        "ID", "CATEGORY", "SUCCESS", "USES", "TITLE"
    );
    println!("{}", "-".repeat(76));
    for p in &patterns {
        println!(
            "{:<12} {:<12} {:>7.1}% {:>6}   {}",
            short_id(&p.id),
            p.category.as_str(),
            p.success_rate * 100.0,
            p.usage_count,
            p.template.title
        );
    }
    println!();
    println!("{} pattern(s)", patterns.len());
    Ok(())
}

/// First 12 characters of a content-hash id.
fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
