//! Bounded retry around a single generation call.
//!
//! Shared by fix generation and failure analysis. An attempt ends in one of
//! three ways: accepted text, a soft failure (no text, or text the caller
//! rejects), or a hard transport error. Soft and hard failures are retried
//! the same way; the first accepted answer ends the loop.

use super::client::{GenerationClient, GenerationRequest};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause between attempts. Not applied after the final attempt.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// How a single round-trip went. Only the final one is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationAttempt {
    pub attempt_number: u32,
    pub succeeded: bool,
    pub raw_text: Option<String>,
    pub error: Option<String>,
    pub failure: Option<AttemptFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptFailure {
    /// The API answered without text
    Empty,
    /// The answer was rejected by the acceptance check
    Rejected,
    /// The call itself failed
    Transport,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    Accepted {
        text: String,
        attempts: u32,
    },
    Exhausted {
        last: GenerationAttempt,
        attempts: u32,
    },
}

impl RetryOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Accepted { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Call the model until `accept` passes or the policy runs out.
///
/// Response text is trimmed before it reaches `accept`. `accept` returns the
/// rejection reason on failure.
pub async fn call_with_retry<F>(
    client: &dyn GenerationClient,
    request: &GenerationRequest,
    policy: RetryPolicy,
    label: &str,
    accept: F,
) -> RetryOutcome
where
    F: Fn(&str) -> Result<(), String>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last = GenerationAttempt {
        attempt_number: 0,
        succeeded: false,
        raw_text: None,
        error: None,
        failure: None,
    };

    for attempt_number in 1..=max_attempts {
        info!(
            model = %request.model,
            attempt = attempt_number,
            max_attempts,
            "{}: calling generation API",
            label
        );

        last = match client.generate(request).await {
            Ok(response) => match response.text.as_deref().map(str::trim) {
                None | Some("") => {
                    warn!(attempt = attempt_number, "{}: empty response from API", label);
                    failed(attempt_number, None, "empty response", AttemptFailure::Empty)
                }
                Some(text) => match accept(text) {
                    Ok(()) => {
                        info!(
                            model = %request.model,
                            attempt = attempt_number,
                            "{}: API call succeeded",
                            label
                        );
                        return RetryOutcome::Accepted {
                            text: text.to_string(),
                            attempts: attempt_number,
                        };
                    }
                    Err(reason) => {
                        warn!(attempt = attempt_number, %reason, "{}: response rejected", label);
                        failed(
                            attempt_number,
                            Some(text.to_string()),
                            &reason,
                            AttemptFailure::Rejected,
                        )
                    }
                },
            },
            Err(err) => {
                warn!(attempt = attempt_number, error = %err, "{}: API call error", label);
                failed(attempt_number, None, &err.to_string(), AttemptFailure::Transport)
            }
        };

        if attempt_number < max_attempts && !policy.delay.is_zero() {
            tokio::time::sleep(policy.delay).await;
        }
    }

    RetryOutcome::Exhausted {
        last,
        attempts: max_attempts,
    }
}

fn failed(
    attempt_number: u32,
    raw_text: Option<String>,
    error: &str,
    failure: AttemptFailure,
) -> GenerationAttempt {
    GenerationAttempt {
        attempt_number,
        succeeded: false,
        raw_text,
        error: Some(error.to_string()),
        failure: Some(failure),
    }
}
