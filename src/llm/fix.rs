use super::client::{GenerationClient, GenerationRequest};
use super::prompts::build_fix_prompt;
use super::retry::{call_with_retry, AttemptFailure, GenerationAttempt, RetryOutcome, RetryPolicy};
use crate::catalog::{Catalog, DefectRecord};
use crate::config::GenerationConfig;
use crate::snapshot::{CodebaseSnapshot, ContextMode};
use crate::static_context::{self, PathContext};
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{error, info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  FORMAT VALIDATION
// ═══════════════════════════════════════════════════════════════════════════

/// Strict header check: `File: ` at the very start of a line.
fn file_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^File: ").expect("static regex pattern is valid"))
}

/// Looser pattern for pulling paths back out of accepted code.
fn file_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*File:[ \t]*(\S.*?)[ \t]*\r?$")
            .expect("static regex pattern is valid")
    })
}

/// Whether a response has the `File: <path>` + fenced block shape.
///
/// Missing fences only warn: answers with a `File:` line but no complete code
/// block are still accepted.
pub fn is_valid_format(text: &str) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    if !file_header_regex().is_match(text) {
        return false;
    }
    let fences = text.matches("```").count();
    if fences < 2 {
        warn!(fences, "generated code has no complete fenced block; accepting anyway");
    }
    true
}

/// Paths named by `File:` lines, deduplicated, first-seen order.
pub fn files_in_code(code: &str) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for caps in file_line_regex().captures_iter(code) {
        let path = caps[1].trim_matches('`').to_string();
        if !path.is_empty() && !files.contains(&path) {
            files.push(path);
        }
    }
    files
}

fn check_format(text: &str) -> Result<(), String> {
    if is_valid_format(text) {
        Ok(())
    } else {
        Err("response does not contain a `File: <path>` block".to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  RESULTS
// ═══════════════════════════════════════════════════════════════════════════

/// What the generator knew about the defect when it built the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisContext {
    pub defect: DefectRecord,
    /// Static analysis per affected path, in the record's order
    pub static_context: Vec<PathContext>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixMetadata {
    pub defect_name: String,
    pub analysis: AnalysisContext,
    pub attempts: u32,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedFix {
    pub code: String,
    pub metadata: FixMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixFailureKind {
    /// The name is not in the catalog
    NotFound,
    /// The prompt could not be built; the API was never called
    InvalidPrompt,
    /// Every attempt came back empty, malformed or errored
    Exhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixFailure {
    pub kind: FixFailureKind,
    pub error: String,
    pub last_attempt: Option<GenerationAttempt>,
}

impl FixFailure {
    fn new(kind: FixFailureKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            error: error.into(),
            last_attempt: None,
        }
    }

    fn exhausted(last: GenerationAttempt) -> Self {
        let error = match last.failure {
            Some(AttemptFailure::Transport) => format!(
                "API call failed: {}",
                last.error.as_deref().unwrap_or("unknown error")
            ),
            Some(AttemptFailure::Rejected) => {
                "No valid code snippet generated after max retries".to_string()
            }
            Some(AttemptFailure::Empty) => "No response from API after max retries".to_string(),
            None => "Failed to generate fix after all retries".to_string(),
        };
        Self {
            kind: FixFailureKind::Exhausted,
            error,
            last_attempt: Some(last),
        }
    }

    /// Text of the last rejected answer, if there was one.
    pub fn attempted_code(&self) -> &str {
        self.last_attempt
            .as_ref()
            .and_then(|a| a.raw_text.as_deref())
            .unwrap_or("")
    }
}

/// Defect fields plus the patch, attached to successful outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixSummaryView {
    pub bug_name: String,
    pub description: String,
    pub root_cause: String,
    pub fix_summary: String,
    pub affected_files: Vec<String>,
    pub generated_code: String,
}

impl FixSummaryView {
    /// Files come from the record; when it lists none they are recovered from
    /// the `File:` lines of the code.
    pub fn new(defect: &DefectRecord, generated_code: &str) -> Self {
        let affected_files = if defect.affected_paths.is_empty() {
            files_in_code(generated_code)
        } else {
            defect.affected_paths.clone()
        };
        Self {
            bug_name: defect.name.clone(),
            description: defect.description.clone(),
            root_cause: defect.root_cause.clone(),
            fix_summary: defect.fix_summary.clone(),
            affected_files,
            generated_code: generated_code.to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  GENERATOR
// ═══════════════════════════════════════════════════════════════════════════

/// Turns a defect name into a validated patch.
pub struct FixGenerator<'a> {
    client: &'a dyn GenerationClient,
    config: &'a GenerationConfig,
    catalog: &'a Catalog,
    project_root: &'a Path,
    context_mode: ContextMode,
}

impl<'a> FixGenerator<'a> {
    pub fn new(
        client: &'a dyn GenerationClient,
        config: &'a GenerationConfig,
        catalog: &'a Catalog,
        project_root: &'a Path,
    ) -> Self {
        Self {
            client,
            config,
            catalog,
            project_root,
            context_mode: ContextMode::default(),
        }
    }

    pub fn with_context_mode(mut self, mode: ContextMode) -> Self {
        self.context_mode = mode;
        self
    }

    pub async fn generate(
        &self,
        defect_name: &str,
        snapshot: &CodebaseSnapshot,
    ) -> Result<GeneratedFix, FixFailure> {
        let defect = self.catalog.find(defect_name).ok_or_else(|| {
            error!(defect = %defect_name, "defect not found in catalog");
            FixFailure::new(
                FixFailureKind::NotFound,
                format!("Bug '{}' not found in definitions", defect_name),
            )
        })?;

        let static_context = static_context::gather(self.project_root, &defect.affected_paths);
        let excerpts = snapshot.extract(&defect.affected_paths, self.context_mode);
        let analysis_summary = static_context::summarize(&static_context);
        let prompt = build_fix_prompt(defect, &excerpts, &analysis_summary).map_err(|e| {
            error!(defect = %defect.name, error = %e, "could not build fix prompt");
            FixFailure::new(
                FixFailureKind::InvalidPrompt,
                format!("Invalid prompt generated: {}", e),
            )
        })?;
        if prompt.trim().is_empty() {
            return Err(FixFailure::new(
                FixFailureKind::InvalidPrompt,
                "Invalid prompt generated",
            ));
        }

        let request = GenerationRequest {
            model: self.config.model.clone(),
            prompt,
            sampling: self.config.sampling,
        };
        let policy = RetryPolicy::new(self.config.max_attempts, self.config.retry_delay);

        match call_with_retry(self.client, &request, policy, &defect.name, check_format).await {
            RetryOutcome::Accepted { text, attempts } => {
                info!(defect = %defect.name, attempts, "fix generated");
                Ok(GeneratedFix {
                    code: text,
                    metadata: FixMetadata {
                        defect_name: defect.name.clone(),
                        analysis: AnalysisContext {
                            defect: defect.clone(),
                            static_context,
                        },
                        attempts,
                        model: self.config.model.clone(),
                    },
                })
            }
            RetryOutcome::Exhausted { last, attempts } => {
                let failure = FixFailure::exhausted(last);
                error!(
                    defect = %defect.name,
                    attempts,
                    error = %failure.error,
                    "fix generation failed"
                );
                Err(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::{ScriptedClient, ScriptedReply};
    use crate::snapshot::HEADER_LINE;
    use std::fs;
    use std::time::Duration;

    const VALID_PATCH: &str = "File: backend/todos/views.py\n```python\n    def get_queryset(self):\n        return Todo.objects.filter(user=self.request.user)\n```";

    fn catalog() -> Catalog {
        Catalog::new(vec![DefectRecord::new(
            "Permission Bug",
            "Users can see todos from other users.",
            &["backend/todos/views.py"],
            "No user filter.",
            "Filter by request.user.",
        )])
    }

    fn config() -> GenerationConfig {
        GenerationConfig {
            retry_delay: Duration::ZERO,
            analysis_retry_delay: Duration::ZERO,
            ..GenerationConfig::default()
        }
    }

    fn snapshot() -> CodebaseSnapshot {
        CodebaseSnapshot::new(format!(
            "{h}\nFile: backend/todos/views.py\n{h}\n\nclass TodoViewSet: pass\n\n",
            h = HEADER_LINE
        ))
    }

    #[test]
    fn test_format_validator_truth_table() {
        assert!(!is_valid_format(""));
        assert!(!is_valid_format("   \n\t"));
        assert!(!is_valid_format("```python\nx = 1\n```"));
        assert!(!is_valid_format("Here is the fix: change line 3"));
        assert!(is_valid_format(VALID_PATCH));
        // Lenient: a File: line without fences is accepted.
        assert!(is_valid_format("File: a.py\nx = 1"));
    }

    #[test]
    fn test_file_header_must_start_the_line_with_a_space() {
        assert!(!is_valid_format("File:x.py\n```\nx\n```"));
        assert!(!is_valid_format("  File: a.py\n```\nx\n```"));
        assert!(is_valid_format("File: \n```\nx\n```"));
        assert!(is_valid_format("Fix below.\nFile: a.py\n```\nx\n```"));
    }

    #[test]
    fn test_files_in_code_dedupes_in_order() {
        let code = "File: b.py\n```\n```\nFile: a.tsx\n```\n```\nFile: b.py\n";
        assert_eq!(files_in_code(code), vec!["b.py", "a.tsx"]);
        assert!(files_in_code("no headers").is_empty());
    }

    #[test]
    fn test_summary_view_recovers_files_from_code() {
        let record = DefectRecord::new("X", "d", &[], "r", "f");
        let view = FixSummaryView::new(&record, VALID_PATCH);
        assert_eq!(view.affected_files, vec!["backend/todos/views.py"]);

        let record = DefectRecord::new("Y", "d", &["listed.py"], "r", "f");
        let view = FixSummaryView::new(&record, VALID_PATCH);
        assert_eq!(view.affected_files, vec!["listed.py"]);
        assert_eq!(view.generated_code, VALID_PATCH);
    }

    #[tokio::test]
    async fn test_retry_bound_on_empty_responses() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::always(ScriptedReply::Empty);
        let (config, catalog) = (config(), catalog());
        let generator = FixGenerator::new(&client, &config, &catalog, dir.path());

        let failure = generator
            .generate("Permission Bug", &snapshot())
            .await
            .unwrap_err();

        assert_eq!(client.call_count(), 5);
        assert_eq!(failure.kind, FixFailureKind::Exhausted);
        assert_eq!(failure.error, "No response from API after max retries");
        assert_eq!(failure.attempted_code(), "");
    }

    #[tokio::test]
    async fn test_early_success_returns_metadata() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("backend/todos")).unwrap();
        fs::write(
            dir.path().join("backend/todos/views.py"),
            "class TodoViewSet:\n    def get_queryset(self):\n        return []\n",
        )
        .unwrap();

        let client = ScriptedClient::new([ScriptedReply::Empty, ScriptedReply::text(VALID_PATCH)]);
        let (config, catalog) = (config(), catalog());
        let generator = FixGenerator::new(&client, &config, &catalog, dir.path());

        let fix = generator.generate("Permission Bug", &snapshot()).await.unwrap();

        assert_eq!(client.call_count(), 2);
        assert_eq!(fix.code, VALID_PATCH);
        assert_eq!(fix.metadata.defect_name, "Permission Bug");
        assert_eq!(fix.metadata.attempts, 2);
        assert_eq!(fix.metadata.model, config.model);
        let ctx = &fix.metadata.analysis.static_context[0];
        assert_eq!(
            ctx.result.as_ref().unwrap().functions,
            vec!["get_queryset".to_string()]
        );

        let request = &client.requests()[0];
        assert!(request.prompt.contains("**BUG NAME:** Permission Bug"));
        assert!(request.prompt.contains("File: backend/todos/views.py"));
        assert_eq!(request.sampling, config.sampling);
    }

    #[tokio::test]
    async fn test_malformed_answers_keep_last_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::always(ScriptedReply::text("Just filter by user."));
        let (config, catalog) = (config(), catalog());
        let generator = FixGenerator::new(&client, &config, &catalog, dir.path());

        let failure = generator
            .generate("Permission Bug", &snapshot())
            .await
            .unwrap_err();

        assert_eq!(client.call_count(), 5);
        assert_eq!(failure.error, "No valid code snippet generated after max retries");
        assert_eq!(failure.attempted_code(), "Just filter by user.");
    }

    #[tokio::test]
    async fn test_transport_errors_report_last_message() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::always(ScriptedReply::Error("quota exceeded".into()));
        let (config, catalog) = (config(), catalog());
        let generator = FixGenerator::new(&client, &config, &catalog, dir.path());

        let failure = generator
            .generate("Permission Bug", &snapshot())
            .await
            .unwrap_err();

        assert_eq!(client.call_count(), 5);
        assert_eq!(failure.error, "API call failed: quota exceeded");
    }

    #[tokio::test]
    async fn test_unknown_defect_never_calls_api() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::always(ScriptedReply::text(VALID_PATCH));
        let (config, catalog) = (config(), catalog());
        let generator = FixGenerator::new(&client, &config, &catalog, dir.path());

        let failure = generator.generate("Ghost Bug", &snapshot()).await.unwrap_err();

        assert_eq!(client.call_count(), 0);
        assert_eq!(failure.kind, FixFailureKind::NotFound);
        assert_eq!(failure.error, "Bug 'Ghost Bug' not found in definitions");
    }

    #[tokio::test]
    async fn test_full_context_mode_sends_file_content() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::always(ScriptedReply::text(VALID_PATCH));
        let (config, catalog) = (config(), catalog());
        let generator = FixGenerator::new(&client, &config, &catalog, dir.path())
            .with_context_mode(ContextMode::Full);

        generator.generate("Permission Bug", &snapshot()).await.unwrap();

        assert!(client.requests()[0].prompt.contains("class TodoViewSet: pass"));
    }
}
