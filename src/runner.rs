//! Run controller: inspect, load, fix every catalog entry, report.
//!
//! Only setup failures (inspection, missing or empty snapshot) abort a run.
//! Everything that goes wrong for an individual defect ends up in its
//! [`BugOutcome`], and the report is always written once processing starts.

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{analyze_failure, FailureAnalysis, FixGenerator, FixSummaryView, GenerationClient};
use crate::report::{self, BugOutcome, OutcomeStatus, RunStatistics, DEFAULT_REPORT_FILE};
use crate::snapshot::inspect::inspect_directory_excluding;
use crate::snapshot::{CodebaseSnapshot, DEFAULT_SNAPSHOT_FILE};
use chrono::Local;
use futures::stream::{self, StreamExt};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    EnvironmentReady,
    ContextLoaded,
    /// Index of the most recently finished defect
    Processing(usize),
    Reporting,
    Done,
    Aborted,
}

/// Where the run reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub project_root: PathBuf,
    pub snapshot: PathBuf,
    pub report: PathBuf,
}

impl RunPaths {
    /// Snapshot and report at their default names inside `project_root`.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            snapshot: project_root.join(DEFAULT_SNAPSHOT_FILE),
            report: project_root.join(DEFAULT_REPORT_FILE),
            project_root,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stats: RunStatistics,
    pub report_path: PathBuf,
    /// Catalog order
    pub outcomes: Vec<BugOutcome>,
}

impl RunSummary {
    /// A run succeeds when no defect failed.
    pub fn success(&self) -> bool {
        self.stats.failed == 0
    }

    /// One-line console message for the end of a run.
    pub fn banner(&self) -> String {
        let report_name = self
            .report_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_REPORT_FILE.to_string());
        if self.success() {
            format!(
                "ALL BUG SOLUTIONS SUCCESSFULLY GENERATED! Review '{}'.",
                report_name
            )
        } else {
            format!(
                "SOME BUG SOLUTIONS FAILED TO GENERATE. Check '{}' for details and AI suggestions.",
                report_name
            )
        }
    }
}

pub struct RunController {
    config: Config,
    catalog: Catalog,
    client: Arc<dyn GenerationClient>,
    paths: RunPaths,
    skip_inspect: bool,
    keep_snapshot: bool,
    state: RunState,
}

impl RunController {
    pub fn new(
        config: Config,
        catalog: Catalog,
        client: Arc<dyn GenerationClient>,
        paths: RunPaths,
    ) -> Self {
        Self {
            config,
            catalog,
            client,
            paths,
            skip_inspect: false,
            keep_snapshot: false,
            state: RunState::Idle,
        }
    }

    /// Use an existing snapshot instead of inspecting the project.
    pub fn skip_inspect(mut self, skip: bool) -> Self {
        self.skip_inspect = skip;
        self
    }

    /// Leave the snapshot on disk after the report is written.
    pub fn keep_snapshot(mut self, keep: bool) -> Self {
        self.keep_snapshot = keep;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub async fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        let mut stats = RunStatistics::new(Local::now());
        info!(project_root = %self.paths.project_root.display(), "bug fixer run started");

        if let Err(e) = self.prepare_environment() {
            error!(error = %e, "failed to set up environment; exiting");
            self.state = RunState::Aborted;
            return Err(e);
        }
        self.state = RunState::EnvironmentReady;

        let snapshot = match self.load_context() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "failed to load codebase content; exiting");
                self.state = RunState::Aborted;
                return Err(e);
            }
        };
        self.state = RunState::ContextLoaded;

        let processor = DefectProcessor {
            client: self.client.as_ref(),
            config: &self.config,
            catalog: &self.catalog,
            project_root: &self.paths.project_root,
        };
        let names: Vec<&str> = self
            .catalog
            .records()
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        info!(defects = names.len(), "starting to process planted bugs");

        let mut outcomes = Vec::with_capacity(names.len());
        let mut results = stream::iter(names)
            .map(|name| processor.process(name, &snapshot))
            .buffered(self.config.concurrency.max(1));
        while let Some(outcome) = results.next().await {
            self.state = RunState::Processing(outcomes.len());
            stats.record(outcome.status);
            log_outcome(&outcome);
            outcomes.push(outcome);
        }

        self.state = RunState::Reporting;
        stats.elapsed_seconds = started.elapsed().as_secs_f64();
        let rendered = report::render(&outcomes, &stats, &self.config.generation);
        fs::write(&self.paths.report, rendered).map_err(|source| Error::Report {
            path: self.paths.report.clone(),
            source,
        })?;
        let success_rate = stats
            .success_rate()
            .map(|r| format!("{:.1}%", r))
            .unwrap_or_else(|| "N/A".to_string());
        info!(
            report = %self.paths.report.display(),
            elapsed_seconds = stats.elapsed_seconds,
            %success_rate,
            "bug solution generation complete"
        );

        if !self.keep_snapshot {
            remove_snapshot(&self.paths.snapshot);
        }
        self.state = RunState::Done;

        Ok(RunSummary {
            stats,
            report_path: self.paths.report.clone(),
            outcomes,
        })
    }

    fn prepare_environment(&self) -> Result<()> {
        let root = &self.paths.project_root;
        if !root.is_dir() {
            return Err(Error::Inspect {
                root: root.clone(),
                message: "project root is not a directory".to_string(),
            });
        }
        if self.skip_inspect {
            info!(snapshot = %self.paths.snapshot.display(), "skipping codebase inspection");
            return Ok(());
        }

        info!("inspecting the codebase to create the context file");
        let artifacts = [self.paths.report.as_path()];
        inspect_directory_excluding(root, &self.paths.snapshot, &artifacts).map_err(|e| match e {
            Error::Inspect { .. } => e,
            other => Error::Inspect {
                root: root.clone(),
                message: other.to_string(),
            },
        })?;
        Ok(())
    }

    fn load_context(&self) -> Result<CodebaseSnapshot> {
        let snapshot = CodebaseSnapshot::load(&self.paths.snapshot)?;
        if snapshot.is_empty() {
            return Err(Error::EmptySnapshot(self.paths.snapshot.clone()));
        }
        info!(characters = snapshot.len(), "loaded codebase content");
        Ok(snapshot)
    }
}

/// Borrowed view of the controller used while defects are in flight.
struct DefectProcessor<'a> {
    client: &'a dyn GenerationClient,
    config: &'a Config,
    catalog: &'a Catalog,
    project_root: &'a Path,
}

impl DefectProcessor<'_> {
    async fn process(&self, name: &str, snapshot: &CodebaseSnapshot) -> BugOutcome {
        info!(defect = %name, "processing bug");
        let generator = FixGenerator::new(
            self.client,
            &self.config.generation,
            self.catalog,
            self.project_root,
        )
        .with_context_mode(self.config.context_mode);

        let failure = match generator.generate(name, snapshot).await {
            Ok(fix) => {
                let view = FixSummaryView::new(&fix.metadata.analysis.defect, &fix.code);
                return BugOutcome {
                    bug_name: name.to_string(),
                    status: OutcomeStatus::SolutionGenerated,
                    generated_code: fix.code,
                    error: None,
                    fix_summary_view: Some(view),
                    ai_suggestions: None,
                };
            }
            Err(failure) => failure,
        };

        // Every kind of fix failure, including an unknown defect or a bad
        // prompt, is a failed generation rather than an `error` outcome.
        let attempted_code = failure.attempted_code().to_string();

        let analysis = match self.catalog.find(name) {
            Some(defect) => {
                analyze_failure(
                    self.client,
                    &self.config.generation,
                    defect,
                    &failure.error,
                    &attempted_code,
                    snapshot,
                    self.config.context_mode,
                )
                .await
            }
            None => FailureAnalysis::unavailable(),
        };

        BugOutcome {
            bug_name: name.to_string(),
            status: OutcomeStatus::FailedToGenerateSolution,
            generated_code: attempted_code,
            error: Some(failure.error),
            fix_summary_view: None,
            ai_suggestions: Some(analysis.analysis),
        }
    }
}

fn log_outcome(outcome: &BugOutcome) {
    let status = outcome.status.label();
    if outcome.status.is_success() {
        info!(defect = %outcome.bug_name, %status, "successfully generated a code solution");
    } else {
        warn!(
            defect = %outcome.bug_name,
            %status,
            error = outcome.error.as_deref().unwrap_or("Unknown error"),
            "generation failed; analysis and suggestions provided in report"
        );
    }
}

fn remove_snapshot(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => info!(snapshot = %path.display(), "cleaned up codebase snapshot"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(
            snapshot = %path.display(),
            error = %e,
            "could not remove codebase snapshot"
        ),
    }
}
