//! Code repository parser.
//!
//! Consumes an in-memory snapshot (paths → contents plus an optional
//! commit log); detects languages from extensions, surfaces root
//! manifests, filters trivial commits, and extracts exported top-level
//! symbols with per-language regex.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use mnemon_core::errors::ParseError;
use mnemon_core::models::{ContentType, ParsedDocument, ParsedSection};
use mnemon_core::traits::DocumentParser;

pub struct CodeRepoParser;

#[derive(Debug, Deserialize)]
struct RepoSnapshot {
    #[serde(default)]
    name: Option<String>,
    /// path → file content
    files: BTreeMap<String, String>,
    /// One commit per line, "<hash> <subject>".
    #[serde(default)]
    log: String,
}

const MANIFEST_NAMES: &[&str] = &[
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "Makefile",
];

const TRIVIAL_COMMIT_PREFIXES: &[&str] = &[
    "wip",
    "fixup",
    "typo",
    "fmt",
    "lint",
    "merge branch",
    "merge pull request",
    "bump version",
];

fn language_for_extension(path: &str) -> Option<&'static str> {
    let ext = path.rsplit('.').next()?;
    match ext {
        "rs" => Some("rust"),
        "ts" | "tsx" => Some("typescript"),
        "js" | "jsx" | "mjs" => Some("javascript"),
        "py" => Some("python"),
        "go" => Some("go"),
        "java" => Some("java"),
        "rb" => Some("ruby"),
        "c" | "h" => Some("c"),
        "cpp" | "cc" | "hpp" => Some("cpp"),
        _ => None,
    }
}

/// Per-language export patterns, compiled once. A pattern that fails to
/// compile simply contributes no symbols.
fn symbol_patterns() -> &'static Vec<(&'static str, Regex)> {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (
                "rust",
                r"(?m)^pub\s+(?:async\s+)?(fn|struct|enum|trait|const|static|type)\s+([A-Za-z_][A-Za-z0-9_]*)",
            ),
            (
                "typescript",
                r"(?m)^export\s+(?:default\s+)?(?:async\s+)?(function|class|const|interface|type|enum)\s+([A-Za-z_$][A-Za-z0-9_$]*)",
            ),
            ("python", r"(?m)^(def|class)\s+([A-Za-z_][A-Za-z0-9_]*)"),
            ("go", r"(?m)^(func|type|var|const)\s+([A-Z][A-Za-z0-9_]*)"),
        ]
        .into_iter()
        .filter_map(|(lang, pattern)| Regex::new(pattern).ok().map(|re| (lang, re)))
        .collect()
    })
}

fn extract_symbols(language: &str, content: &str) -> Vec<String> {
    let key = match language {
        "javascript" => "typescript",
        other => other,
    };
    let Some((_, re)) = symbol_patterns().iter().find(|(lang, _)| *lang == key) else {
        return Vec::new();
    };
    re.captures_iter(content)
        .filter(|c| key != "python" || !c[2].starts_with('_'))
        .map(|c| format!("{} {}", &c[1], &c[2]))
        .collect()
}

fn is_trivial_commit(subject: &str) -> bool {
    let lower = subject.to_lowercase();
    TRIVIAL_COMMIT_PREFIXES
        .iter()
        .any(|p| lower.starts_with(p))
        || subject.trim().is_empty()
}

impl DocumentParser for CodeRepoParser {
    fn format(&self) -> &'static str {
        "code_repo"
    }

    fn parse(&self, source: &str) -> Result<ParsedDocument, ParseError> {
        let snapshot: RepoSnapshot = serde_json::from_str(source)?;
        let mut sections = Vec::new();

        // Language census.
        let mut languages: BTreeMap<&str, usize> = BTreeMap::new();
        for path in snapshot.files.keys() {
            if let Some(lang) = language_for_extension(path) {
                *languages.entry(lang).or_default() += 1;
            }
        }
        if !languages.is_empty() {
            let listing: Vec<String> = languages
                .iter()
                .map(|(lang, count)| format!("{lang}: {count} files"))
                .collect();
            sections.push(ParsedSection {
                heading: Some("Languages".to_string()),
                depth: 2,
                content: listing.join("\n"),
                content_type: ContentType::List,
                ..ParsedSection::default()
            });
        }

        // Root manifests, verbatim.
        for (path, content) in &snapshot.files {
            let is_root_manifest = !path.contains('/')
                && MANIFEST_NAMES.iter().any(|m| path == m);
            if is_root_manifest {
                sections.push(ParsedSection {
                    heading: Some(format!("Manifest: {path}")),
                    depth: 2,
                    content: content.clone(),
                    content_type: ContentType::Code,
                    language: language_for_extension(path).map(str::to_string),
                    ..ParsedSection::default()
                });
            }
        }

        // Commit log, trivia filtered.
        let kept: Vec<&str> = snapshot
            .log
            .lines()
            .filter(|line| {
                let subject = line.split_once(' ').map_or(*line, |(_, s)| s);
                !is_trivial_commit(subject)
            })
            .collect();
        if !kept.is_empty() {
            sections.push(ParsedSection {
                heading: Some("Commit history".to_string()),
                depth: 2,
                content: kept.join("\n"),
                content_type: ContentType::Text,
                ..ParsedSection::default()
            });
        }

        // Exported symbols per source file.
        for (path, content) in &snapshot.files {
            let Some(language) = language_for_extension(path) else {
                continue;
            };
            let symbols = extract_symbols(language, content);
            if symbols.is_empty() {
                continue;
            }
            sections.push(ParsedSection {
                heading: Some(format!("Exports: {path}")),
                depth: 3,
                content: symbols.join("\n"),
                content_type: ContentType::List,
                language: Some(language.to_string()),
                ..ParsedSection::default()
            });
        }

        if sections.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut doc = ParsedDocument::new("code_repo", sections);
        doc.title = snapshot.name;
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> String {
        serde_json::json!({
            "name": "demo",
            "files": {
                "Cargo.toml": "[package]\nname = \"demo\"",
                "src/lib.rs": "pub fn run() {}\nfn private() {}\npub struct Engine;\n",
                "scripts/tool.py": "def main():\n    pass\n\ndef _hidden():\n    pass\n",
            },
            "log": "abc123 Add retrieval engine\ndef456 wip\nfed789 Merge branch 'main'\n"
        })
        .to_string()
    }

    #[test]
    fn test_language_census() {
        let doc = CodeRepoParser.parse(&snapshot()).unwrap();
        let langs = doc
            .sections
            .iter()
            .find(|s| s.heading.as_deref() == Some("Languages"))
            .unwrap();
        assert!(langs.content.contains("rust: 1 files"));
        assert!(langs.content.contains("python: 1 files"));
    }

    #[test]
    fn test_exported_symbols_only() {
        let doc = CodeRepoParser.parse(&snapshot()).unwrap();
        let exports = doc
            .sections
            .iter()
            .find(|s| s.heading.as_deref() == Some("Exports: src/lib.rs"))
            .unwrap();
        assert!(exports.content.contains("fn run"));
        assert!(exports.content.contains("struct Engine"));
        assert!(!exports.content.contains("private"));

        let py = doc
            .sections
            .iter()
            .find(|s| s.heading.as_deref() == Some("Exports: scripts/tool.py"))
            .unwrap();
        assert!(py.content.contains("def main"));
        assert!(!py.content.contains("_hidden"));
    }

    #[test]
    fn test_trivial_commits_filtered() {
        let doc = CodeRepoParser.parse(&snapshot()).unwrap();
        let log = doc
            .sections
            .iter()
            .find(|s| s.heading.as_deref() == Some("Commit history"))
            .unwrap();
        assert!(log.content.contains("Add retrieval engine"));
        assert!(!log.content.contains("wip"));
        assert!(!log.content.contains("Merge branch"));
    }

    #[test]
    fn test_root_manifest_included() {
        let doc = CodeRepoParser.parse(&snapshot()).unwrap();
        assert!(doc
            .sections
            .iter()
            .any(|s| s.heading.as_deref() == Some("Manifest: Cargo.toml")));
    }
}
