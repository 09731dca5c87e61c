//! Plain-text run report.
//!
//! Rendering is a pure function of the outcomes, the statistics and the
//! generation settings; only the `Generated:` line depends on the clock.

use crate::config::GenerationConfig;
use crate::llm::FixSummaryView;
use chrono::{DateTime, Local};

pub const DEFAULT_REPORT_FILE: &str = "bug_fix_report.txt";

const BANNER_WIDTH: usize = 60;
const SECTION_RULE_WIDTH: usize = 40;
const CODE_RULE: &str = "-------------------------------";
const ANALYSIS_RULE: &str = "---------------------------------------------------------";

const RECOMMENDATIONS_ON_FAILURE: [&str; 4] = [
    "- Review the 'AI-GENERATED FAILURE ANALYSIS AND IMPROVED SOLUTION' for failed bugs.",
    "- Ensure the environment is correctly set up and dependencies are met.",
    "- Consult agent logs for further details on API errors.",
    "- Refine bug definitions or prompt hints if solutions are consistently incorrect.",
];

const RECOMMENDATIONS_ON_SUCCESS: [&str; 4] = [
    "- All bug solutions successfully generated! Review them for accuracy.",
    "- Manually apply the generated code snippets to your codebase.",
    "- Thoroughly test the application after applying changes.",
    "- Consider a code review for quality assurance before deploying.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    SolutionGenerated,
    /// Any failed fix generation, retry exhaustion or otherwise
    FailedToGenerateSolution,
    Error,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::SolutionGenerated => "solution_generated",
            OutcomeStatus::FailedToGenerateSolution => "failed_to_generate_solution",
            OutcomeStatus::Error => "error",
        }
    }

    /// Upper-case form used in the report.
    pub fn label(&self) -> String {
        self.as_str().to_uppercase()
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeStatus::SolutionGenerated)
    }
}

/// Result of processing one defect.
#[derive(Debug, Clone, PartialEq)]
pub struct BugOutcome {
    pub bug_name: String,
    pub status: OutcomeStatus,
    /// Accepted patch on success; last rejected answer (or empty) otherwise
    pub generated_code: String,
    pub error: Option<String>,
    pub fix_summary_view: Option<FixSummaryView>,
    /// Failure analysis; only set on non-success
    pub ai_suggestions: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunStatistics {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_seconds: f64,
    pub start_timestamp: DateTime<Local>,
}

impl RunStatistics {
    pub fn new(start_timestamp: DateTime<Local>) -> Self {
        Self {
            processed: 0,
            succeeded: 0,
            failed: 0,
            elapsed_seconds: 0.0,
            start_timestamp,
        }
    }

    pub fn record(&mut self, status: OutcomeStatus) {
        self.processed += 1;
        if status.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    /// `None` when nothing was processed.
    pub fn success_rate(&self) -> Option<f64> {
        if self.processed == 0 {
            None
        } else {
            Some(self.succeeded as f64 / self.processed as f64 * 100.0)
        }
    }
}

/// Render with the current local time.
pub fn render(
    outcomes: &[BugOutcome],
    stats: &RunStatistics,
    config: &GenerationConfig,
) -> String {
    render_at(outcomes, stats, config, Local::now())
}

/// Render with an explicit `Generated:` timestamp.
///
/// Summary counts come from `stats`; sections come from `outcomes`, in order.
pub fn render_at(
    outcomes: &[BugOutcome],
    stats: &RunStatistics,
    config: &GenerationConfig,
    generated_at: DateTime<Local>,
) -> String {
    let banner = "=".repeat(BANNER_WIDTH);

    let mut lines: Vec<String> = vec![
        banner.clone(),
        "BUG FIXER AGENT REPORT".to_string(),
        banner,
        format!("Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S")),
        format!("Model Used: {}", config.model),
        format!("Total Bugs Processed: {}", stats.processed),
        String::new(),
        "SUMMARY:".to_string(),
        format!("- Solutions Successfully Generated: {}", stats.succeeded),
        format!("- Failures (No Solution/Invalid Solution): {}", stats.failed),
    ];
    let rate = stats
        .success_rate()
        .map(|r| format!("{:.1}%", r))
        .unwrap_or_else(|| "N/A".to_string());
    lines.push(format!("- Success Rate (Solution Generation): {}", rate));
    lines.push(String::new());

    for (i, outcome) in outcomes.iter().enumerate() {
        render_outcome(&mut lines, i + 1, outcome);
    }

    lines.push("TECHNICAL DETAILS:".to_string());
    lines.push(format!("- Model: {}", config.model));
    lines.push(format!("- Temperature: {}", config.sampling.temperature));
    lines.push(format!("- Max Output Tokens: {}", config.sampling.max_output_tokens));
    lines.push(format!("- Max Retries: {}", config.max_attempts));
    lines.push(format!(
        "- Run Started: {}",
        stats.start_timestamp.format("%Y-%m-%d %H:%M:%S")
    ));
    lines.push(format!("- Elapsed Time: {:.2}s", stats.elapsed_seconds));
    lines.push(String::new());

    lines.push("GENERAL RECOMMENDATIONS:".to_string());
    let recommendations = if stats.failed > 0 {
        RECOMMENDATIONS_ON_FAILURE
    } else {
        RECOMMENDATIONS_ON_SUCCESS
    };
    lines.extend(recommendations.iter().map(|s| s.to_string()));

    lines.join("\n")
}

fn render_outcome(lines: &mut Vec<String>, index: usize, outcome: &BugOutcome) {
    lines.push(format!("BUG {}: {}", index, outcome.bug_name));
    lines.push(format!("Status: {}", outcome.status.label()));
    lines.push("-".repeat(SECTION_RULE_WIDTH));

    if outcome.status.is_success() {
        let view = outcome.fix_summary_view.as_ref();
        lines.push(format!(
            "Root Cause: {}",
            view.map(|v| v.root_cause.as_str()).unwrap_or("Not specified")
        ));
        lines.push(format!(
            "Proposed Fix Concept: {}",
            view.map(|v| v.fix_summary.as_str()).unwrap_or("Not specified")
        ));
        lines.push(format!(
            "Files Affected: {}",
            view.map(|v| v.affected_files.join(", ")).unwrap_or_default()
        ));
        lines.push("\n--- GENERATED CODE SOLUTION ---".to_string());
        lines.push(outcome.generated_code.clone());
        lines.push(CODE_RULE.to_string());
    } else {
        lines.push(format!(
            "Error: {}",
            outcome.error.as_deref().unwrap_or("Unknown error")
        ));
        if outcome.generated_code.is_empty() {
            lines.push("\nNo code solution was generated in the initial attempt.".to_string());
        } else {
            lines.push("\n--- ATTEMPTED CODE SOLUTION ---".to_string());
            lines.push(outcome.generated_code.clone());
            lines.push(CODE_RULE.to_string());
        }

        match outcome.ai_suggestions.as_deref() {
            Some(suggestions) if !suggestions.is_empty() => {
                lines.push(
                    "\n--- AI-GENERATED FAILURE ANALYSIS AND IMPROVED SOLUTION ---".to_string(),
                );
                lines.push(suggestions.to_string());
                lines.push(ANALYSIS_RULE.to_string());
            }
            _ => lines.push(
                "\nNo specific AI-generated suggestions available for this failure.".to_string(),
            ),
        }
    }

    lines.push(String::new());
}
