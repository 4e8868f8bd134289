//! Wiring from configuration to a ready [`Engine`].
//!
//! Every command that analyzes or rates goes through [`open`]: it connects
//! to the database, makes sure the schema exists, and assembles the
//! configured embedder, language model, SQLite pattern store (behind the
//! TTL snapshot cache) and SQLite candidate ledger.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;

use logfix_core::feedback::CandidateLedger;
use logfix_core::store::cached::CachedPatternStore;
use logfix_core::store::PatternStore;
use logfix_core::Engine;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::llm::create_model;
use crate::migrate;
use crate::sqlite_store::{SqliteCandidateLedger, SqlitePatternStore};

/// An engine bound to an open database pool.
pub struct Runtime {
    pub pool: SqlitePool,
    pub engine: Engine,
}

impl Runtime {
    pub async fn close(self) {
        self.pool.close().await;
    }
}

pub async fn open(config: &Config) -> Result<Runtime> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let engine = build_engine(config, pool.clone())?;
    Ok(Runtime { pool, engine })
}

/// Assemble an [`Engine`] over an existing pool.
pub fn build_engine(config: &Config, pool: SqlitePool) -> Result<Engine> {
    let embedder = create_embedder(&config.embedding)?;
    let model = create_model(&config.model)?;

    let store: Arc<dyn PatternStore> = Arc::new(CachedPatternStore::new(
        SqlitePatternStore::new(pool.clone()),
        config.cache_ttl(),
    ));
    let ledger: Arc<dyn CandidateLedger> = Arc::new(SqliteCandidateLedger::new(pool));

    tracing::debug!(
        embedder = embedder.model_name(),
        model = model.name(),
        "engine assembled"
    );

    Ok(Engine::new(
        embedder,
        store,
        ledger,
        model,
        config.engine_params(),
    ))
}
