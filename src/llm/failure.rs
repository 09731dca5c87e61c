//! Second opinion after a failed fix: why it failed and what to try instead.
//!
//! Best-effort throughout. Nothing here returns an error; the worst case is a
//! canned placeholder in the report.

use super::client::{GenerationClient, GenerationRequest};
use super::prompts::build_failure_prompt;
use super::retry::{call_with_retry, RetryOutcome, RetryPolicy};
use crate::catalog::DefectRecord;
use crate::config::GenerationConfig;
use crate::snapshot::{CodebaseSnapshot, ContextMode};
use tracing::{info, warn};

/// Report text for a failed defect whose analysis could not be generated.
pub const ANALYSIS_UNAVAILABLE: &str =
    "Could not generate intelligent suggestions due to API error.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureAnalysis {
    pub analysis: String,
    pub succeeded: bool,
}

impl FailureAnalysis {
    pub fn unavailable() -> Self {
        Self {
            analysis: ANALYSIS_UNAVAILABLE.to_string(),
            succeeded: false,
        }
    }
}

/// Ask the model why generation failed. Any non-empty answer is accepted.
pub async fn analyze_failure(
    client: &dyn GenerationClient,
    config: &GenerationConfig,
    defect: &DefectRecord,
    prior_error: &str,
    prior_code: &str,
    snapshot: &CodebaseSnapshot,
    context_mode: ContextMode,
) -> FailureAnalysis {
    let excerpts = snapshot.extract(&defect.affected_paths, context_mode);
    let prompt = match build_failure_prompt(defect, prior_error, prior_code, &excerpts) {
        Ok(prompt) => prompt,
        Err(e) => {
            warn!(defect = %defect.name, error = %e, "could not build failure-analysis prompt");
            return FailureAnalysis::unavailable();
        }
    };

    let request = GenerationRequest {
        model: config.model.clone(),
        prompt,
        sampling: config.sampling.with_temperature(config.analysis_temperature),
    };
    let policy = RetryPolicy::new(config.max_attempts, config.analysis_retry_delay);
    let label = format!("{} (failure analysis)", defect.name);

    match call_with_retry(client, &request, policy, &label, |_| Ok(())).await {
        RetryOutcome::Accepted { text, attempts } => {
            info!(defect = %defect.name, attempts, "failure analysis generated");
            FailureAnalysis {
                analysis: text,
                succeeded: true,
            }
        }
        RetryOutcome::Exhausted { attempts, .. } => {
            warn!(defect = %defect.name, attempts, "failure analysis unavailable");
            FailureAnalysis::unavailable()
        }
    }
}
