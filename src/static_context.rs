//! Best-effort static context for affected files.
//!
//! Names (imports, functions, classes and components) come from regex
//! heuristics. Syntax warnings come from a tree-sitter parse. A failure on
//! one path is recorded for that path and never fails the defect.

use regex::Regex;
use serde::Serialize;
use std::cell::RefCell;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::warn;
use tree_sitter::{Node, Parser};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("File {0} does not exist")]
    Missing(String),
    #[error("Unsupported file type: {0}")]
    Unsupported(String),
    #[error("Could not read {path}: {message}")]
    Read { path: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Python,
    TypeScript,
}

impl FileKind {
    fn from_path(path: &str) -> Result<Self, AnalysisError> {
        let ext = Path::new(path)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "py" => Ok(FileKind::Python),
            "ts" | "tsx" | "js" | "jsx" => Ok(FileKind::TypeScript),
            _ => Err(AnalysisError::Unsupported(if ext.is_empty() {
                "(none)".to_string()
            } else {
                format!(".{}", ext)
            })),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileKind::Python => "python",
            FileKind::TypeScript => "typescript",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileAnalysis {
    pub kind: FileKind,
    pub imports: Vec<String>,
    pub functions: Vec<String>,
    /// Python classes, or React components for TypeScript/JavaScript.
    pub types: Vec<String>,
    pub syntax_warnings: Vec<String>,
}

/// One affected path and what was learned about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathContext {
    pub path: String,
    pub result: Result<FileAnalysis, AnalysisError>,
}

fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex pattern is valid"))
}

fn push_unique(into: &mut Vec<String>, value: &str) {
    let value = value.trim();
    if !value.is_empty() && !into.iter().any(|v| v == value) {
        into.push(value.to_string());
    }
}

/// Strip `as alias`, parentheses and `type` qualifiers from an import name.
fn clean_import_name(raw: &str) -> &str {
    let raw = raw.trim().trim_matches(|c| c == '(' || c == ')').trim();
    let raw = raw.strip_prefix("type ").unwrap_or(raw);
    raw.split_whitespace().next().unwrap_or("")
}

// One parser per grammar per thread; parsers are reused across files.
thread_local! {
    static PYTHON_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        let _ = p.set_language(&tree_sitter_python::LANGUAGE.into());
        p
    });

    static TS_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        let _ = p.set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into());
        p
    });

    static TSX_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        let _ = p.set_language(&tree_sitter_typescript::LANGUAGE_TSX.into());
        p
    });

    static JS_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        let _ = p.set_language(&tree_sitter_javascript::LANGUAGE.into());
        p
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grammar {
    Python,
    TypeScript,
    Tsx,
    JavaScript,
}

impl Grammar {
    fn from_path(path: &str) -> Option<Self> {
        let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "py" => Some(Grammar::Python),
            "ts" => Some(Grammar::TypeScript),
            "tsx" => Some(Grammar::Tsx),
            "js" | "jsx" => Some(Grammar::JavaScript),
            _ => None,
        }
    }

    fn parse(self, content: &str) -> Option<tree_sitter::Tree> {
        match self {
            Grammar::Python => PYTHON_PARSER.with(|p| p.borrow_mut().parse(content, None)),
            Grammar::TypeScript => TS_PARSER.with(|p| p.borrow_mut().parse(content, None)),
            Grammar::Tsx => TSX_PARSER.with(|p| p.borrow_mut().parse(content, None)),
            Grammar::JavaScript => JS_PARSER.with(|p| p.borrow_mut().parse(content, None)),
        }
    }
}

/// Depth-first search for the first `ERROR` or `MISSING` node.
fn first_syntax_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find_map(first_syntax_error);
    found
}

/// At most one line-numbered warning, like a compiler stopping at the first
/// syntax error.
fn syntax_warnings(path: &str, content: &str) -> Vec<String> {
    let Some(grammar) = Grammar::from_path(path) else {
        return Vec::new();
    };
    let Some(tree) = grammar.parse(content) else {
        return vec!["Analysis error: failed to parse file".to_string()];
    };
    let root = tree.root_node();
    if !root.has_error() {
        return Vec::new();
    }
    let warning = match first_syntax_error(root) {
        Some(node) if node.is_missing() => format!(
            "Syntax error at line {}: missing '{}'",
            node.start_position().row + 1,
            node.kind()
        ),
        Some(node) => format!(
            "Syntax error at line {}: invalid syntax",
            node.start_position().row + 1
        ),
        None => "Syntax error: invalid syntax".to_string(),
    };
    vec![warning]
}

fn analyze_python(content: &str) -> FileAnalysis {
    static IMPORT: OnceLock<Regex> = OnceLock::new();
    static FROM_IMPORT: OnceLock<Regex> = OnceLock::new();
    static DEF: OnceLock<Regex> = OnceLock::new();
    static CLASS: OnceLock<Regex> = OnceLock::new();

    let mut analysis = FileAnalysis {
        kind: FileKind::Python,
        imports: Vec::new(),
        functions: Vec::new(),
        types: Vec::new(),
        syntax_warnings: Vec::new(),
    };

    for caps in cached(&IMPORT, r"(?m)^\s*import\s+([\w., ]+)$").captures_iter(content) {
        for name in caps[1].split(',') {
            push_unique(&mut analysis.imports, clean_import_name(name));
        }
    }
    let from_import = cached(&FROM_IMPORT, r"(?m)^\s*from\s+([\w.]+)\s+import\s+(.+)$");
    for caps in from_import.captures_iter(content) {
        let module = &caps[1];
        for name in caps[2].split(',') {
            let name = clean_import_name(name);
            if !name.is_empty() {
                push_unique(&mut analysis.imports, &format!("{}.{}", module, name));
            }
        }
    }
    for caps in cached(&DEF, r"(?m)^\s*(?:async\s+)?def\s+(\w+)").captures_iter(content) {
        push_unique(&mut analysis.functions, &caps[1]);
    }
    for caps in cached(&CLASS, r"(?m)^\s*class\s+(\w+)").captures_iter(content) {
        push_unique(&mut analysis.types, &caps[1]);
    }
    analysis
}

fn analyze_typescript(content: &str) -> FileAnalysis {
    static NAMED_IMPORT: OnceLock<Regex> = OnceLock::new();
    static DEFAULT_IMPORT: OnceLock<Regex> = OnceLock::new();
    static SIDE_EFFECT_IMPORT: OnceLock<Regex> = OnceLock::new();
    static FUNCTION: OnceLock<Regex> = OnceLock::new();
    static ARROW: OnceLock<Regex> = OnceLock::new();
    static FC: OnceLock<Regex> = OnceLock::new();

    let mut analysis = FileAnalysis {
        kind: FileKind::TypeScript,
        imports: Vec::new(),
        functions: Vec::new(),
        types: Vec::new(),
        syntax_warnings: Vec::new(),
    };

    for caps in cached(
        &NAMED_IMPORT,
        r#"import\s+(?:\w+\s*,\s*)?\{([^}]+)\}\s+from\s+['"]([^'"]+)['"]"#,
    )
    .captures_iter(content)
    {
        for name in caps[1].split(',') {
            push_unique(&mut analysis.imports, clean_import_name(name));
        }
    }
    let default_import = cached(&DEFAULT_IMPORT, r#"import\s+(\w+)\s*(?:,|\s+from)"#);
    for caps in default_import.captures_iter(content) {
        push_unique(&mut analysis.imports, &caps[1]);
    }
    for caps in cached(&SIDE_EFFECT_IMPORT, r#"import\s+['"]([^'"]+)['"]"#).captures_iter(content) {
        push_unique(&mut analysis.imports, &caps[1]);
    }

    for caps in cached(&FUNCTION, r"function\s+(\w+)\s*\(").captures_iter(content) {
        push_unique(&mut analysis.functions, &caps[1]);
    }
    for caps in cached(
        &ARROW,
        r"const\s+(\w+)\s*(?::[^=]+)?=\s*(?:async\s*)?\([^)]*\)\s*(?::\s*[^=]+)?=>",
    )
    .captures_iter(content)
    {
        push_unique(&mut analysis.functions, &caps[1]);
    }
    for caps in cached(&FC, r"(\w+)\s*:\s*React\.FC").captures_iter(content) {
        push_unique(&mut analysis.functions, &caps[1]);
    }

    let components: Vec<String> = analysis
        .functions
        .iter()
        .filter(|name| name.chars().next().is_some_and(|c| c.is_ascii_uppercase()))
        .cloned()
        .collect();
    analysis.types = components;
    analysis
}

/// Analyze already-loaded source. `path` only picks the language.
pub fn analyze_source(path: &str, content: &str) -> Result<FileAnalysis, AnalysisError> {
    let mut analysis = match FileKind::from_path(path)? {
        FileKind::Python => analyze_python(content),
        FileKind::TypeScript => analyze_typescript(content),
    };
    analysis.syntax_warnings = syntax_warnings(path, content);
    Ok(analysis)
}

/// Analyze `rel_path` under `root`.
pub fn analyze_file(root: &Path, rel_path: &str) -> Result<FileAnalysis, AnalysisError> {
    let full = root.join(rel_path);
    let content = match fs::read_to_string(&full) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(AnalysisError::Missing(rel_path.to_string()))
        }
        Err(err) => {
            return Err(AnalysisError::Read {
                path: rel_path.to_string(),
                message: err.to_string(),
            })
        }
    };
    analyze_source(rel_path, &content)
}

/// Analyze every path, in order. Failures are logged and kept per path.
pub fn gather(root: &Path, paths: &[String]) -> Vec<PathContext> {
    paths
        .iter()
        .map(|path| {
            let result = analyze_file(root, path);
            if let Err(err) = &result {
                warn!(path = %path, error = %err, "could not analyze file");
            }
            PathContext {
                path: path.clone(),
                result,
            }
        })
        .collect()
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

/// One line per path, for the prompt.
pub fn summarize(contexts: &[PathContext]) -> String {
    contexts
        .iter()
        .map(|ctx| match &ctx.result {
            Ok(a) => {
                let types_label = match a.kind {
                    FileKind::Python => "classes",
                    FileKind::TypeScript => "components",
                };
                let mut line = format!(
                    "- {} ({}): imports: {}; functions: {}; {}: {}",
                    ctx.path,
                    a.kind.label(),
                    list_or_none(&a.imports),
                    list_or_none(&a.functions),
                    types_label,
                    list_or_none(&a.types)
                );
                if !a.syntax_warnings.is_empty() {
                    line.push_str(&format!("; warnings: {}", a.syntax_warnings.join(", ")));
                }
                line
            }
            Err(err) => format!("- {}: analysis unavailable ({})", ctx.path, err),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
