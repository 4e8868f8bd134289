//! `logfix feedback`: rate a served solution.
//!
//! Feedback is fire-and-forget. A malformed rating or an unknown target
//! is logged, reported as a `dropped` outcome, and the process still
//! exits successfully.

use anyhow::Result;

use logfix_core::feedback::FeedbackOutcome;
use logfix_core::models::Rating;

use crate::config::Config;
use crate::runtime;

pub async fn run_feedback(
    config: &Config,
    target: &str,
    rating: &str,
    comment: Option<String>,
) -> Result<()> {
    let outcome = match rating.parse::<Rating>() {
        Ok(rating) => {
            let rt = runtime::open(config).await?;
            let outcome = rt.engine.feedback(target, rating, comment).await;
            rt.close().await;
            outcome
        }
        Err(reason) => {
            tracing::warn!(feedback_target = target, %reason, "dropping feedback");
            FeedbackOutcome::Dropped {
                reason: format!("Invalid feedback: {}", reason),
            }
        }
    };

    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}
