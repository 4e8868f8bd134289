//! Learning statistics.
//!
//! A quick summary of how the pattern library is learning: pattern count,
//! mean success rate, total usage, candidates waiting for promotion, and a
//! per-category breakdown. Used by `logfix stats`.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use logfix_core::feedback::CandidateLedger;
use logfix_core::models::Category;
use logfix_core::store::PatternStore;

use crate::config::Config;
use crate::runtime;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryStats {
    pub patterns: usize,
    pub mean_success_rate: f64,
    pub usage: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LearningStats {
    pub patterns: usize,
    pub mean_success_rate: f64,
    pub total_usage: u64,
    pub pending_candidates: usize,
    pub by_category: BTreeMap<Category, CategoryStats>,
}

/// Aggregate statistics over a store and its candidate ledger.
pub async fn collect_stats(
    store: &dyn PatternStore,
    ledger: &dyn CandidateLedger,
) -> Result<LearningStats> {
    let patterns = store.all_patterns().await?;
    let pending_candidates = ledger.pending().await?;

    let mut by_category: BTreeMap<Category, CategoryStats> = BTreeMap::new();
    let mut rate_sum = 0.0;
    let mut total_usage = 0u64;

    for p in &patterns {
        rate_sum += p.success_rate;
        total_usage += p.usage_count;

        let entry = by_category.entry(p.category).or_default();
        entry.patterns += 1;
        entry.usage += p.usage_count;
        // running sum; divided below
        entry.mean_success_rate += p.success_rate;
    }
    for entry in by_category.values_mut() {
        entry.mean_success_rate /= entry.patterns as f64;
    }

    Ok(LearningStats {
        patterns: patterns.len(),
        mean_success_rate: if patterns.is_empty() {
            0.0
        } else {
            rate_sum / patterns.len() as f64
        },
        total_usage,
        pending_candidates,
        by_category,
    })
}

/// Run the stats command: aggregate and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let rt = runtime::open(config).await?;
    let stats = collect_stats(rt.engine.store().as_ref(), rt.engine.ledger().as_ref()).await;
    rt.close().await;
    let stats = stats?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("logfix Learning Stats");
    println!("=====================");
    println!();
    println!("  Database:     {}", config.db.path.display());
    println!("  Size:         {}", format_bytes(db_size));
    println!();
    println!("  Patterns:     {}", stats.patterns);
    println!("  Mean success: {:.1}%", stats.mean_success_rate * 100.0);
    println!("  Total usage:  {}", stats.total_usage);
    println!("  Candidates:   {} pending", stats.pending_candidates);

    if !stats.by_category.is_empty() {
        println!();
        println!("  By category:");
        println!(
            "  {:<14} {:>8} {:>9} {:>8}",
            "CATEGORY", "PATTERNS", "SUCCESS", "USAGE"
        );
        println!("  {}", "-".repeat(42));
        for (category, s) in &stats.by_category {
            println!(
                "  {:<14} {:>8} {:>8.1}% {:>8}",
                category.as_str(),
                s.patterns,
                s.mean_success_rate * 100.0,
                s.usage
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logfix_core::feedback::InMemoryCandidateLedger;
    use logfix_core::models::{Keyword, Pattern, SolutionTemplate};
    use logfix_core::store::memory::InMemoryPatternStore;

    fn pattern(category: Category, term: &str, rate: f64, uses: u64) -> Pattern {
        let mut p = Pattern::new(
            category,
            vec![Keyword::new(term, 1.0)],
            Vec::new(),
            SolutionTemplate {
                title: term.to_string(),
                steps: vec!["fix it".into()],
                snippet: None,
                estimated_time: None,
            },
            rate,
        );
        p.usage_count = uses;
        p
    }

    #[tokio::test]
    async fn test_collect_stats() {
        let store = InMemoryPatternStore::with_patterns([
            pattern(Category::Docker, "copy failed", 0.8, 3),
            pattern(Category::Docker, "already allocated", 0.9, 1),
            pattern(Category::Database, "mysql", 0.4, 0),
        ]);
        let ledger = InMemoryCandidateLedger::new();

        let stats = collect_stats(&store, &ledger).await.unwrap();
        assert_eq!(stats.patterns, 3);
        assert!((stats.mean_success_rate - 0.7).abs() < 1e-9);
        assert_eq!(stats.total_usage, 4);
        assert_eq!(stats.pending_candidates, 0);

        let docker = &stats.by_category[&Category::Docker];
        assert_eq!(docker.patterns, 2);
        assert!((docker.mean_success_rate - 0.85).abs() < 1e-9);
        assert_eq!(docker.usage, 4);
    }

    #[tokio::test]
    async fn test_empty_store_stats() {
        let stats = collect_stats(&InMemoryPatternStore::new(), &InMemoryCandidateLedger::new())
            .await
            .unwrap();
        assert_eq!(stats, LearningStats::default());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
    }
}
