//! `logfix analyze`: classify one log excerpt and print its solution.
//!
//! The log is read from `--file` or, when absent, from stdin. Output is a
//! single JSON object on stdout: the [`Solution`](logfix_core::models::Solution)
//! by default, or the full [`Analysis`] (solution, match breakdown, scanned
//! issues and degradations) with `--explain`.
//!
//! Captured output is often not clean UTF-8; invalid bytes are replaced
//! with U+FFFD rather than rejected.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::io::AsyncReadExt;

use logfix_core::models::SourceTag;
use logfix_core::Analysis;

use crate::config::Config;
use crate::runtime;

pub async fn run_analyze(
    config: &Config,
    source: &str,
    file: Option<&Path>,
    explain: bool,
) -> Result<()> {
    let log_text = read_log(file).await?;
    // SourceTag parsing is infallible; unknown tags become `unknown`.
    let source: SourceTag = source.parse().unwrap_or(SourceTag::Unknown);

    let rt = runtime::open(config).await?;
    let result = rt.engine.analyze(&log_text, source).await;
    rt.close().await;

    let analysis = result?;
    println!("{}", render(&analysis, explain)?);
    Ok(())
}

async fn read_log(file: Option<&Path>) -> Result<String> {
    let bytes = match file {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read log file: {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .context("Failed to read log from stdin")?;
            buf
        }
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn render(analysis: &Analysis, explain: bool) -> Result<String> {
    let json = if explain {
        serde_json::to_string_pretty(analysis)?
    } else {
        serde_json::to_string_pretty(&analysis.solution)?
    };
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use logfix_core::embedding::HashingEmbedder;
    use logfix_core::feedback::InMemoryCandidateLedger;
    use logfix_core::store::memory::InMemoryPatternStore;
    use logfix_core::synth::DisabledModel;
    use logfix_core::{Engine, EngineParams};

    async fn analysis_for(log: &str) -> Analysis {
        let engine = Engine::new(
            Arc::new(HashingEmbedder::default()),
            Arc::new(InMemoryPatternStore::new()),
            Arc::new(InMemoryCandidateLedger::new()),
            Arc::new(DisabledModel),
            EngineParams::default(),
        );
        engine.analyze(log, SourceTag::Docker).await.unwrap()
    }

    #[tokio::test]
    async fn test_render_plain_is_solution_only() {
        let analysis = analysis_for("something odd happened").await;
        let value: serde_json::Value =
            serde_json::from_str(&render(&analysis, false).unwrap()).unwrap();
        assert_eq!(value["provenance"], "generic-fallback");
        assert!(value.get("match").is_none());
        assert!(!value["steps"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_render_explain_includes_match_and_issues() {
        let analysis = analysis_for("starting\nmkdir /data: permission denied").await;
        let value: serde_json::Value =
            serde_json::from_str(&render(&analysis, true).unwrap()).unwrap();
        assert_eq!(value["solution"]["provenance"], "generic-fallback");
        assert_eq!(value["match"]["patterns_considered"], 0);
        assert_eq!(value["match"]["confidence_floor"], 0.55);
        assert_eq!(value["issues"]["total_issues"], 1);
        assert_eq!(value["issues"]["primary_issue"], "permission");
        assert_eq!(value["issues"]["severity"], "error");
        assert_eq!(value["issues"]["errors"][0]["line"], 2);
    }

    #[tokio::test]
    async fn test_read_log_from_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "Error: port is already allocated").unwrap();
        let text = read_log(Some(tmp.path())).await.unwrap();
        assert!(text.contains("already allocated"));
        assert!(read_log(Some(Path::new("/nonexistent/log.txt"))).await.is_err());
    }

    #[tokio::test]
    async fn test_read_log_tolerates_invalid_utf8() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut bytes = b"Bind for 0.0.0.0:5000 failed: port is already allocated\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        std::fs::write(tmp.path(), &bytes).unwrap();

        let text = read_log(Some(tmp.path())).await.unwrap();
        assert!(text.contains("port is already allocated"));
        assert!(text.contains('\u{FFFD}'));

        let analysis = analysis_for(&text).await;
        assert!(!analysis.solution.title.is_empty());
    }
}
