//! # logfix
//!
//! A pattern-matching remediation engine for deployment logs.
//!
//! logfix scores a free-text log excerpt against a library of known
//! failure patterns, picks the best one above a confidence floor, and
//! returns a single remediation. When nothing matches it asks a language
//! model, and when that fails too it serves a generic troubleshooting
//! template. User ratings feed back into each pattern's success rate, and
//! well-rated model answers are promoted into new patterns.
//!
//! The engine itself lives in `logfix-core`; this crate is the
//! application shell around it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │   CLI    │──▶│  logfix-core │──▶│    SQLite    │
//! │ (logfix) │   │    Engine    │   │ patterns and │
//! └──────────┘   └──────┬───────┘   │  candidates  │
//!                       │           └──────────────┘
//!            ┌──────────┴─────────┐
//!            ▼                    ▼
//!      ┌──────────┐        ┌────────────┐
//!      │ Embedder │        │ Language   │
//!      │ hashing/ │        │ model      │
//!      │ HTTP     │        │ (HTTP)     │
//!      └──────────┘        └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite pattern store and candidate ledger |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Language-model providers |
//! | [`library`] | Built-in seed patterns |
//! | [`runtime`] | Engine assembly from config |
//! | [`analyze`] | `logfix analyze` |
//! | [`feedback_cmd`] | `logfix feedback` |
//! | [`patterns`] | `logfix patterns` |
//! | [`stats`] | `logfix stats` |

pub mod analyze;
pub mod config;
pub mod db;
pub mod embedding;
pub mod feedback_cmd;
pub mod library;
pub mod llm;
pub mod migrate;
pub mod patterns;
pub mod runtime;
pub mod sqlite_store;
pub mod stats;
