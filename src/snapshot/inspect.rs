//! Directory walker that produces a codebase snapshot.
//!
//! Walks the target with `walkdir`, prunes ignored directories, and
//! concatenates every remaining UTF-8 file into the snapshot format. Ignore
//! rules are a built-in default list plus the target's `.gitignore`.

use super::{header_triple, CodebaseSnapshot, FILE_SEPARATOR};
use crate::error::{Error, Result};
use glob::{MatchOptions, Pattern};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Always ignored, in addition to the target's `.gitignore`.
const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    // Version control
    ".git/",
    ".gitignore",
    // Python environments and caches
    ".venv/",
    "venv/",
    "__pycache__/",
    "*.pyc",
    ".pytest_cache/",
    ".ruff_cache/",
    // Secrets
    ".env",
    ".env.*",
    // Lock files
    "uv.lock",
    "poetry.lock",
    "Pipfile.lock",
    "package-lock.json",
    "yarn.lock",
    "Cargo.lock",
    // Build output and dependencies
    "node_modules/",
    "target/",
    "db.sqlite3",
    // The agent itself and its artifacts
    "bug_fixer_agent/",
    "tests/",
    "inspector.py",
    "bug_fix_report.txt",
    "codebase_content.txt",
    // Project metadata
    "README.md",
    "pyproject.toml",
    "requirements.txt",
    ".cz.toml",
    ".pre-commit-config.yml",
    "LICENSE",
    "license",
    // IDE folders
    ".vscode/",
    ".idea/",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
struct IgnoreRule {
    pattern: Pattern,
    negated: bool,
    dir_only: bool,
    /// Contains a `/` before its end: matched against the whole relative path.
    anchored: bool,
}

impl IgnoreRule {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\n', '\r']);
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let (negated, rest) = match line.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, line.strip_prefix('\\').unwrap_or(line)),
        };
        let (dir_only, rest) = match rest.strip_suffix('/') {
            Some(rest) => (true, rest),
            None => (false, rest),
        };
        let anchored = rest.contains('/');
        let rest = rest.trim_start_matches('/');
        if rest.is_empty() {
            return None;
        }

        match Pattern::new(rest) {
            Ok(pattern) => Some(Self {
                pattern,
                negated,
                dir_only,
                anchored,
            }),
            Err(err) => {
                warn!(pattern = %line, error = %err, "skipping invalid ignore pattern");
                None
            }
        }
    }

    fn matches(&self, rel_path: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        if self.anchored {
            self.pattern.matches_with(rel_path, MATCH_OPTIONS)
        } else {
            let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
            self.pattern.matches_with(name, MATCH_OPTIONS)
        }
    }
}

/// Ordered ignore rules with `.gitignore`-style semantics: the last matching
/// rule wins and `!` re-includes.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    rules: Vec<IgnoreRule>,
}

impl IgnoreRules {
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = Self::default();
        rules.extend(lines);
        rules
    }

    /// The default list plus the file names of this run's own artifacts
    /// (snapshot, report).
    pub fn with_defaults(artifact_names: &[&str]) -> Self {
        let mut rules = Self::from_lines(DEFAULT_IGNORE_PATTERNS);
        rules.extend(artifact_names);
        rules
    }

    pub fn extend<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.rules
            .extend(lines.into_iter().filter_map(|l| IgnoreRule::parse(l.as_ref())));
    }

    /// Append the rules of `<root>/.gitignore`, if there is one.
    pub fn extend_from_gitignore(&mut self, root: &Path) -> Result<()> {
        let path = root.join(".gitignore");
        if path.is_file() {
            let content = fs::read_to_string(&path)?;
            self.extend(content.lines());
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether this entry itself is matched, ignoring its ancestors.
    fn matches_entry(&self, rel_path: &str, is_dir: bool) -> bool {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matches(rel_path, is_dir))
            .map(|rule| !rule.negated)
            .unwrap_or(false)
    }

    /// Whether a `/`-separated relative path is excluded. A path under an
    /// excluded directory is excluded too.
    pub fn is_ignored(&self, rel_path: &str, is_dir: bool) -> bool {
        let rel_path = rel_path.trim_matches('/');
        if rel_path.is_empty() {
            return false;
        }
        let ancestor_ignored = rel_path
            .match_indices('/')
            .any(|(idx, _)| self.matches_entry(&rel_path[..idx], true));
        ancestor_ignored || self.matches_entry(rel_path, is_dir)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectSummary {
    pub files_added: Vec<String>,
    pub skipped: Vec<String>,
}

fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Walk `root` and build the snapshot in memory.
pub fn collect_snapshot(
    root: &Path,
    rules: &IgnoreRules,
) -> Result<(CodebaseSnapshot, InspectSummary)> {
    if !root.is_dir() {
        return Err(Error::Inspect {
            root: root.to_path_buf(),
            message: "directory not found".to_string(),
        });
    }

    let mut text = String::new();
    let mut summary = InspectSummary::default();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            match relative_slash_path(root, entry.path()) {
                Some(rel) => !rules.is_ignored(&rel, entry.file_type().is_dir()),
                None => true,
            }
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(rel) = relative_slash_path(root, entry.path()) else {
            continue;
        };

        let bytes = match fs::read(entry.path()) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %rel, error = %err, "error reading file");
                summary.skipped.push(rel);
                continue;
            }
        };
        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(_) => {
                debug!(path = %rel, "skipped binary file");
                summary.skipped.push(rel);
                continue;
            }
        };

        text.push_str(&header_triple(&rel));
        text.push_str("\n\n");
        text.push_str(&content);
        text.push_str(FILE_SEPARATOR);
        debug!(path = %rel, "added to snapshot");
        summary.files_added.push(rel);
    }

    Ok((CodebaseSnapshot::new(text), summary))
}

/// Inspect `root` with the default rules plus its `.gitignore` and write the
/// snapshot to `output`.
pub fn inspect_directory(root: &Path, output: &Path) -> Result<InspectSummary> {
    inspect_directory_excluding(root, output, &[])
}

/// Like [`inspect_directory`], also skipping other artifacts of the run
/// (a custom report location, for instance) by file name.
pub fn inspect_directory_excluding(
    root: &Path,
    output: &Path,
    artifacts: &[&Path],
) -> Result<InspectSummary> {
    let names: Vec<String> = std::iter::once(output)
        .chain(artifacts.iter().copied())
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();

    let mut rules = IgnoreRules::with_defaults(&names);
    rules.extend_from_gitignore(root)?;

    info!(root = %root.display(), output = %output.display(), "inspecting codebase");
    let (snapshot, summary) = collect_snapshot(root, &rules)?;
    fs::write(output, snapshot.as_str())?;
    info!(
        files = summary.files_added.len(),
        skipped = summary.skipped.len(),
        "codebase inspection complete"
    );
    Ok(summary)
}

/// Resolve an output path relative to the inspected root.
pub fn output_path(root: &Path, output: &Path) -> PathBuf {
    if output.is_absolute() {
        output.to_path_buf()
    } else {
        root.join(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_unanchored_patterns_match_any_level() {
        let rules = IgnoreRules::from_lines(["*.pyc", "node_modules/"]);
        assert!(rules.is_ignored("a.pyc", false));
        assert!(rules.is_ignored("backend/todos/x.pyc", false));
        assert!(rules.is_ignored("frontend/node_modules", true));
        assert!(rules.is_ignored("frontend/node_modules/react/index.js", false));
        assert!(!rules.is_ignored("frontend/src/App.tsx", false));
    }

    #[test]
    fn test_dir_only_pattern_skips_files() {
        let rules = IgnoreRules::from_lines(["build/"]);
        assert!(rules.is_ignored("build", true));
        assert!(!rules.is_ignored("build", false));
    }

    #[test]
    fn test_anchored_patterns_match_from_root() {
        let rules = IgnoreRules::from_lines(["/secret.txt", "docs/*.md"]);
        assert!(rules.is_ignored("secret.txt", false));
        assert!(!rules.is_ignored("nested/secret.txt", false));
        assert!(rules.is_ignored("docs/intro.md", false));
        assert!(!rules.is_ignored("docs/deep/intro.md", false));
    }

    #[test]
    fn test_negation_and_comments() {
        let rules = IgnoreRules::from_lines(["# comment", "", "*.log", "!keep.log"]);
        assert_eq!(rules.len(), 2);
        assert!(rules.is_ignored("debug.log", false));
        assert!(!rules.is_ignored("keep.log", false));
    }

    #[test]
    fn test_double_star() {
        let rules = IgnoreRules::from_lines(["**/generated/*.ts"]);
        assert!(rules.is_ignored("a/b/generated/api.ts", false));
        assert!(!rules.is_ignored("a/b/generated/api.py", false));
    }

    #[test]
    fn test_collect_snapshot_respects_rules_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "backend/todos/views.py", "class TodoViewSet:\n    pass\n");
        write(root, "frontend/src/App.tsx", "export default function App() {}\n");
        write(root, "frontend/node_modules/react/index.js", "ignored");
        write(root, ".env", "SECRET=1");
        write(root, "notes.log", "ignored by gitignore");
        write(root, ".gitignore", "*.log\n");
        fs::write(root.join("logo.bin"), [0xff, 0xfe, 0x00]).unwrap();

        let mut rules = IgnoreRules::with_defaults(&["codebase_content.txt"]);
        rules.extend_from_gitignore(root).unwrap();
        let (snapshot, summary) = collect_snapshot(root, &rules).unwrap();

        assert_eq!(
            summary.files_added,
            vec!["backend/todos/views.py", "frontend/src/App.tsx"]
        );
        assert_eq!(summary.skipped, vec!["logo.bin"]);
        assert_eq!(
            snapshot.file_content("backend/todos/views.py"),
            Some("class TodoViewSet:\n    pass\n")
        );
        assert!(!snapshot.as_str().contains("SECRET"));
        assert!(!snapshot.as_str().contains("node_modules"));
    }

    #[test]
    fn test_inspect_directory_writes_snapshot_and_ignores_itself() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "backend/todos/serializers.py", "fields = []\n");
        write(root, "snapshot.txt", "stale output");

        let output = root.join("snapshot.txt");
        let summary = inspect_directory(root, &output).unwrap();
        assert_eq!(summary.files_added, vec!["backend/todos/serializers.py"]);

        let snapshot = CodebaseSnapshot::load(&output).unwrap();
        assert_eq!(snapshot.paths(), vec!["backend/todos/serializers.py"]);
    }

    #[test]
    fn test_custom_report_name_is_not_snapshotted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "backend/todos/models.py", "class Todo:\n    pass\n");
        write(root, "reports/last_run.txt", "previous report");

        let output = root.join("snapshot.txt");
        let report = root.join("reports/last_run.txt");
        let summary = inspect_directory_excluding(root, &output, &[report.as_path()]).unwrap();
        assert_eq!(summary.files_added, vec!["backend/todos/models.py"]);

        let summary = inspect_directory(root, &output).unwrap();
        assert!(summary.files_added.contains(&"reports/last_run.txt".to_string()));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect_snapshot(&dir.path().join("nope"), &IgnoreRules::default()).unwrap_err();
        assert!(matches!(err, Error::Inspect { .. }));
    }
}
