//! SQLite-backed [`PatternStore`] and [`CandidateLedger`].
//!
//! Maps each trait operation onto single SQL statements against the
//! `patterns` and `candidates` tables created by [`crate::migrate`].
//! Every write is one statement, so readers never see a half-written
//! pattern.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use logfix_core::embedding::{blob_to_vec, vec_to_blob};
use logfix_core::feedback::CandidateLedger;
use logfix_core::models::{CandidatePattern, Category, Keyword, Pattern, SolutionTemplate};
use logfix_core::store::{CasOutcome, PatternStore, UpsertOutcome};

/// SQLite implementation of [`PatternStore`].
pub struct SqlitePatternStore {
    pool: SqlitePool,
}

impl SqlitePatternStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const PATTERN_COLUMNS: &str =
    "id, category, keywords_json, embedding, template_json, success_rate, usage_count, created_at";

fn row_to_pattern(row: &SqliteRow) -> Result<Pattern> {
    let id: String = row.get("id");
    let category: String = row.get("category");
    let keywords_json: String = row.get("keywords_json");
    let embedding: Option<Vec<u8>> = row.get("embedding");
    let template_json: String = row.get("template_json");
    let created_at: i64 = row.get("created_at");

    let keywords: Vec<Keyword> = serde_json::from_str(&keywords_json)
        .with_context(|| format!("Corrupt keywords for pattern {}", id))?;
    let template: SolutionTemplate = serde_json::from_str(&template_json)
        .with_context(|| format!("Corrupt template for pattern {}", id))?;

    Ok(Pattern {
        category: category.parse::<Category>()?,
        keywords,
        embedding: embedding.map(|b| blob_to_vec(&b)).unwrap_or_default(),
        template,
        success_rate: row.get("success_rate"),
        usage_count: row.get::<i64, _>("usage_count").max(0) as u64,
        created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
        id,
    })
}

#[async_trait]
impl PatternStore for SqlitePatternStore {
    /// Rows that fail to decode are skipped with a warning.
    async fn all_patterns(&self) -> Result<Vec<Pattern>> {
        let rows = sqlx::query(&format!("SELECT {} FROM patterns", PATTERN_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| match row_to_pattern(row) {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!(
                        pattern_id = %row.get::<String, _>("id"),
                        error = %format!("{:#}", e),
                        "skipping unreadable pattern row"
                    );
                    None
                }
            })
            .collect())
    }

    async fn get_pattern(&self, id: &str) -> Result<Option<Pattern>> {
        let row = sqlx::query(&format!("SELECT {} FROM patterns WHERE id = ?", PATTERN_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_pattern).transpose()
    }

    async fn upsert(&self, pattern: &Pattern) -> Result<UpsertOutcome> {
        let embedding = if pattern.embedding.is_empty() {
            None
        } else {
            Some(vec_to_blob(&pattern.embedding))
        };

        let result = sqlx::query(
            r#"
            INSERT INTO patterns (id, category, keywords_json, embedding, template_json,
                                  success_rate, usage_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&pattern.id)
        .bind(pattern.category.as_str())
        .bind(serde_json::to_string(&pattern.keywords)?)
        .bind(embedding)
        .bind(serde_json::to_string(&pattern.template)?)
        .bind(pattern.success_rate.clamp(0.0, 1.0))
        .bind(pattern.usage_count as i64)
        .bind(pattern.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() == 1 {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Existing
        })
    }

    async fn update_success_rate(&self, id: &str, new_rate: f64) -> Result<bool> {
        let result = sqlx::query("UPDATE patterns SET success_rate = ? WHERE id = ?")
            .bind(new_rate.clamp(0.0, 1.0))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn compare_and_set_success_rate(
        &self,
        id: &str,
        expected: f64,
        new_rate: f64,
    ) -> Result<CasOutcome> {
        let result =
            sqlx::query("UPDATE patterns SET success_rate = ? WHERE id = ? AND success_rate = ?")
                .bind(new_rate.clamp(0.0, 1.0))
                .bind(id)
                .bind(expected)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 1 {
            return Ok(CasOutcome::Applied);
        }

        let current: Option<f64> =
            sqlx::query_scalar("SELECT success_rate FROM patterns WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(match current {
            Some(current) => CasOutcome::Conflict { current },
            None => CasOutcome::Missing,
        })
    }

    async fn record_usage(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE patterns SET usage_count = usage_count + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// SQLite implementation of [`CandidateLedger`], so votes accumulate
/// across CLI invocations.
pub struct SqliteCandidateLedger {
    pool: SqlitePool,
}

impl SqliteCandidateLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CandidateLedger for SqliteCandidateLedger {
    async fn propose(&self, candidate: &CandidatePattern) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO candidates (signature, candidate_json, positive_votes, created_at, updated_at)
            VALUES (?, ?, 0, ?, ?)
            ON CONFLICT(signature) DO NOTHING
            "#,
        )
        .bind(&candidate.signature)
        .bind(serde_json::to_string(candidate)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn vote(&self, signature: &str, positive: bool) -> Result<Option<u32>> {
        let votes: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE candidates
            SET positive_votes = positive_votes + ?, updated_at = ?
            WHERE signature = ?
            RETURNING positive_votes
            "#,
        )
        .bind(i64::from(positive))
        .bind(Utc::now().timestamp())
        .bind(signature)
        .fetch_optional(&self.pool)
        .await?;
        Ok(votes.map(|v| v.max(0) as u32))
    }

    async fn take(&self, signature: &str) -> Result<Option<CandidatePattern>> {
        let json: Option<String> = sqlx::query_scalar(
            "DELETE FROM candidates WHERE signature = ? RETURNING candidate_json",
        )
        .bind(signature)
        .fetch_optional(&self.pool)
        .await?;
        json.map(|j| {
            serde_json::from_str(&j)
                .with_context(|| format!("Corrupt candidate record {}", signature))
        })
        .transpose()
    }

    async fn pending(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM candidates")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }
}
