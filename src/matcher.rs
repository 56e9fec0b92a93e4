//! Line matcher for log triage
//!
//! Each catalog entry is compiled once when the catalog is loaded:
//! - Patterns containing regex metacharacters become regular expressions
//! - Everything else is matched as a plain substring
//!
//! Matching a line walks the compiled patterns in ordinal order and stops
//! at the first hit, so a line carries at most one interpretation.

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::catalog::{PatternCatalog, PatternEntry};
use crate::scanner::LogLine;

lazy_static! {
    static ref REGEX_METACHARACTERS: Regex =
        Regex::new(r"[\\.+*?()|\[\]{}^$]").expect("metacharacter class is a valid regex");
}

/// How a pattern is evaluated against a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    /// Plain substring containment
    Literal,
    /// Regular expression search
    Regex,
}

impl PatternKind {
    /// Classify pattern text by the presence of regex metacharacters
    pub fn detect(pattern: &str) -> Self {
        if REGEX_METACHARACTERS.is_match(pattern) {
            PatternKind::Regex
        } else {
            PatternKind::Literal
        }
    }
}

/// Options applied when compiling a catalog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOptions {
    /// Fold case for both literal and regex patterns
    #[serde(default)]
    pub case_insensitive: bool,
}

enum Needle {
    Substring(String),
    Regex(Regex),
}

/// A catalog entry compiled for matching
pub struct CompiledPattern {
    pub entry: PatternEntry,
    kind: PatternKind,
    needle: Needle,
}

impl CompiledPattern {
    /// Compile an entry, deciding literal vs regex once
    ///
    /// A pattern that looks like a regex but does not compile is kept as a
    /// literal instead of failing the whole catalog.
    pub fn compile(entry: PatternEntry, options: MatchOptions) -> Self {
        let detected = PatternKind::detect(&entry.pattern);

        let source = match detected {
            PatternKind::Regex => entry.pattern.clone(),
            PatternKind::Literal => regex::escape(&entry.pattern),
        };

        let (kind, needle) = if detected == PatternKind::Literal && !options.case_insensitive {
            (PatternKind::Literal, Needle::Substring(entry.pattern.clone()))
        } else {
            match RegexBuilder::new(&source)
                .case_insensitive(options.case_insensitive)
                .build()
            {
                Ok(re) => (detected, Needle::Regex(re)),
                Err(e) => {
                    tracing::warn!(
                        "Pattern #{} '{}' is not a valid regex, matching literally: {}",
                        entry.ordinal,
                        entry.pattern,
                        e
                    );
                    Self::literal_needle(&entry.pattern, options)
                }
            }
        };

        CompiledPattern {
            entry,
            kind,
            needle,
        }
    }

    fn literal_needle(pattern: &str, options: MatchOptions) -> (PatternKind, Needle) {
        if !options.case_insensitive {
            return (PatternKind::Literal, Needle::Substring(pattern.to_string()));
        }

        // An escaped literal always compiles unless it blows the size limit.
        match RegexBuilder::new(&regex::escape(pattern))
            .case_insensitive(true)
            .build()
        {
            Ok(re) => (PatternKind::Literal, Needle::Regex(re)),
            Err(_) => (
                PatternKind::Literal,
                Needle::Substring(pattern.to_string()),
            ),
        }
    }

    /// How this pattern ended up being evaluated
    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Check if this pattern matches the given text
    pub fn matches(&self, text: &str) -> bool {
        match &self.needle {
            Needle::Substring(s) => text.contains(s.as_str()),
            Needle::Regex(re) => re.is_match(text),
        }
    }
}

/// A matched log line together with its interpretation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub line_number: usize,
    pub log_line: String,
    pub interpretation: String,
}

/// Match one line against the catalog, first entry by ordinal wins
pub fn match_line(line: &LogLine, catalog: &PatternCatalog) -> Option<MatchRecord> {
    let text = line.text.trim();

    catalog
        .patterns()
        .iter()
        .find(|compiled| compiled.matches(text))
        .map(|compiled| MatchRecord {
            line_number: line.line_number,
            log_line: text.to_string(),
            interpretation: compiled.entry.interpretation.clone(),
        })
}
