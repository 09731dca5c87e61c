//! Flat-text snapshot of a codebase, used as model context.
//!
//! A snapshot is a run of blocks, one per file:
//!
//! ```text
//! ****...****            (HEADER_LINE)
//! File: <relative/path>
//! ****...****
//!
//! <raw file content><FILE_SEPARATOR>
//! ```
//!
//! Blocks appear in directory-walk order and paths always use `/`.

pub mod inspect;

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;

/// One hundred asterisks.
pub const HEADER_LINE: &str = "****************************************************************************************************";
pub const FILE_SEPARATOR: &str = "\n\n";
pub const FILE_PREFIX: &str = "File: ";
/// Where the inspector writes and the run controller reads by default.
pub const DEFAULT_SNAPSHOT_FILE: &str = "codebase_content.txt";

/// How much of an affected file is put in front of the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    /// Header triples only. The long-standing behavior; prompts rely on the
    /// model already knowing the file from the header alone.
    #[default]
    Headers,
    /// Header plus the file's content.
    Full,
}

impl FromStr for ContextMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "headers" | "header" => Ok(ContextMode::Headers),
            "full" => Ok(ContextMode::Full),
            other => Err(format!("unknown context mode {:?} (expected headers or full)", other)),
        }
    }
}

impl fmt::Display for ContextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextMode::Headers => write!(f, "headers"),
            ContextMode::Full => write!(f, "full"),
        }
    }
}

/// A parsed file block borrowed from the snapshot text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotBlock<'a> {
    pub path: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodebaseSnapshot {
    text: String,
}

/// Render the three header lines of a block.
pub fn header_triple(path: &str) -> String {
    format!("{HEADER_LINE}\n{FILE_PREFIX}{path}\n{HEADER_LINE}")
}

impl CodebaseSnapshot {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::new(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(Error::SnapshotNotFound(path.to_path_buf()))
            }
            Err(err) => Err(Error::Io(err)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Header triples for each requested path present in the snapshot, in
    /// snapshot order, joined by [`FILE_SEPARATOR`].
    ///
    /// File content is NOT included; this is an index lookup. Use
    /// [`CodebaseSnapshot::extract_blocks`] when the content is needed.
    pub fn extract_headers(&self, paths: &[String]) -> String {
        self.header_positions()
            .into_iter()
            .filter(|h| paths.iter().any(|p| p == h.path))
            .map(|h| header_triple(h.path))
            .collect::<Vec<_>>()
            .join(FILE_SEPARATOR)
    }

    /// Full blocks (header triple, blank line, content) for each requested
    /// path, in snapshot order.
    pub fn extract_blocks(&self, paths: &[String]) -> String {
        self.blocks()
            .into_iter()
            .filter(|b| paths.iter().any(|p| p == b.path))
            .map(|b| format!("{}\n\n{}", header_triple(b.path), b.content))
            .collect::<Vec<_>>()
            .join(FILE_SEPARATOR)
    }

    pub fn extract(&self, paths: &[String], mode: ContextMode) -> String {
        match mode {
            ContextMode::Headers => self.extract_headers(paths),
            ContextMode::Full => self.extract_blocks(paths),
        }
    }

    /// Content of one file, if the snapshot has it.
    pub fn file_content(&self, path: &str) -> Option<&str> {
        self.blocks()
            .into_iter()
            .find(|b| b.path == path)
            .map(|b| b.content)
    }

    pub fn paths(&self) -> Vec<&str> {
        self.header_positions().into_iter().map(|h| h.path).collect()
    }

    /// Parse every block. Content runs from after the blank line following
    /// the header to the next header, minus one trailing separator.
    pub fn blocks(&self) -> Vec<SnapshotBlock<'_>> {
        let headers = self.header_positions();
        let mut blocks = Vec::with_capacity(headers.len());

        for (i, header) in headers.iter().enumerate() {
            let end = headers
                .get(i + 1)
                .map(|next| next.start)
                .unwrap_or(self.text.len());
            let mut start = header.body_start.min(end);
            if self.text[start..end].starts_with('\n') {
                start += 1;
            } else if self.text[start..end].starts_with("\r\n") {
                start += 2;
            }
            let raw = &self.text[start..end];
            let content = raw.strip_suffix(FILE_SEPARATOR).unwrap_or(raw);
            blocks.push(SnapshotBlock {
                path: header.path,
                content,
            });
        }

        blocks
    }

    fn header_positions(&self) -> Vec<HeaderPosition<'_>> {
        let mut lines: Vec<(usize, &str)> = Vec::new();
        let mut offset = 0;
        for raw in self.text.split_inclusive('\n') {
            lines.push((offset, raw));
            offset += raw.len();
        }

        let trim = |line: &str| line.trim_end_matches('\n').trim_end_matches('\r').to_string();
        let mut found = Vec::new();
        let mut i = 0;
        while i + 2 < lines.len() {
            let (start, first) = lines[i];
            let (_, second) = lines[i + 1];
            let (third_start, third) = lines[i + 2];
            let second_trimmed = second.trim_end_matches('\n').trim_end_matches('\r');

            if trim(first) == HEADER_LINE && trim(third) == HEADER_LINE {
                if let Some(path) = second_trimmed.strip_prefix(FILE_PREFIX) {
                    found.push(HeaderPosition {
                        start,
                        body_start: third_start + third.len(),
                        path,
                    });
                    i += 3;
                    continue;
                }
            }
            i += 1;
        }
        found
    }
}

struct HeaderPosition<'a> {
    start: usize,
    body_start: usize,
    path: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> CodebaseSnapshot {
        CodebaseSnapshot::new(format!(
            "{h}\nFile: frontend/src/components/TestFile.tsx\n{h}\n\n\
             import React from 'react';\nfunction TestComponent() {{}}\n{sep}\
             {h}\nFile: backend/models/AnotherFile.py\n{h}\n\n\
             from django.db import models\n{sep}\
             {h}\nFile: irrelevant/file.txt\n{h}\n\n\
             Some irrelevant content.\n{sep}",
            h = HEADER_LINE,
            sep = FILE_SEPARATOR
        ))
    }

    fn paths(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_header_line_is_one_hundred_stars() {
        assert_eq!(HEADER_LINE.len(), 100);
        assert!(HEADER_LINE.chars().all(|c| c == '*'));
    }

    #[test]
    fn test_extract_headers_returns_headers_without_content() {
        let snapshot = fixture();
        let extracted = snapshot.extract_headers(&paths(&[
            "backend/models/AnotherFile.py",
            "frontend/src/components/TestFile.tsx",
        ]));

        assert!(extracted.contains(&format!(
            "{HEADER_LINE}\nFile: frontend/src/components/TestFile.tsx\n{HEADER_LINE}"
        )));
        assert!(extracted.contains(&format!(
            "{HEADER_LINE}\nFile: backend/models/AnotherFile.py\n{HEADER_LINE}"
        )));
        // Content is deliberately absent from the header-only lookup.
        assert!(!extracted.contains("import React from 'react';"));
        assert!(!extracted.contains("from django.db import models"));
        assert!(!extracted.contains("irrelevant/file.txt"));

        // Snapshot order, not request order.
        let tsx = extracted.find("TestFile.tsx").unwrap();
        let py = extracted.find("AnotherFile.py").unwrap();
        assert!(tsx < py);
    }

    #[test]
    fn test_extract_headers_skips_missing_paths() {
        let snapshot = fixture();
        assert_eq!(snapshot.extract_headers(&paths(&["nope.rs"])), "");
        let one = snapshot.extract_headers(&paths(&["nope.rs", "irrelevant/file.txt"]));
        assert_eq!(one, header_triple("irrelevant/file.txt"));
    }

    #[test]
    fn test_blocks_parse_content() {
        let snapshot = fixture();
        let blocks = snapshot.blocks();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].path, "frontend/src/components/TestFile.tsx");
        assert_eq!(
            blocks[0].content,
            "import React from 'react';\nfunction TestComponent() {}\n"
        );
        assert_eq!(blocks[1].content, "from django.db import models\n");
        assert_eq!(blocks[2].content, "Some irrelevant content.\n");
    }

    #[test]
    fn test_extract_blocks_includes_content() {
        let snapshot = fixture();
        let extracted = snapshot.extract_blocks(&paths(&["backend/models/AnotherFile.py"]));
        assert_eq!(
            extracted,
            format!(
                "{}\n\nfrom django.db import models\n",
                header_triple("backend/models/AnotherFile.py")
            )
        );
    }

    #[test]
    fn test_extract_dispatches_on_mode() {
        let snapshot = fixture();
        let wanted = paths(&["irrelevant/file.txt"]);
        assert!(!snapshot
            .extract(&wanted, ContextMode::Headers)
            .contains("Some irrelevant"));
        assert!(snapshot
            .extract(&wanted, ContextMode::Full)
            .contains("Some irrelevant"));
    }

    #[test]
    fn test_file_content_and_paths() {
        let snapshot = fixture();
        assert_eq!(
            snapshot.paths(),
            vec![
                "frontend/src/components/TestFile.tsx",
                "backend/models/AnotherFile.py",
                "irrelevant/file.txt"
            ]
        );
        assert_eq!(
            snapshot.file_content("irrelevant/file.txt"),
            Some("Some irrelevant content.\n")
        );
        assert_eq!(snapshot.file_content("missing"), None);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("codebase_content.txt");
        let err = CodebaseSnapshot::load(&missing).unwrap_err();
        assert!(matches!(err, Error::SnapshotNotFound(p) if p == missing));
    }

    #[test]
    fn test_context_mode_from_str() {
        assert_eq!("full".parse::<ContextMode>().unwrap(), ContextMode::Full);
        assert_eq!(" Headers ".parse::<ContextMode>().unwrap(), ContextMode::Headers);
        assert!("everything".parse::<ContextMode>().is_err());
    }
}
