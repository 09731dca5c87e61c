pub mod client;
pub mod failure;
pub mod fix;
pub mod models;
pub mod prompts;
pub mod retry;
pub mod scripted;

pub use client::{
    ClientError, GeminiClient, GenerationClient, GenerationRequest, GenerationResponse,
};
pub use failure::{analyze_failure, FailureAnalysis, ANALYSIS_UNAVAILABLE};
pub use fix::{
    is_valid_format, FixFailure, FixFailureKind, FixGenerator, FixSummaryView, GeneratedFix,
};
pub use models::SamplingConfig;
pub use prompts::{build_failure_prompt, build_fix_prompt, PromptError};
pub use retry::{call_with_retry, GenerationAttempt, RetryOutcome, RetryPolicy};
pub use scripted::{ScriptedClient, ScriptedReply};
