//! Tree-sitter parsing: grammar lookup by extension and per-language entity extraction

mod c;
mod common;
mod cpp;
mod json;
mod typescript;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tree_sitter::{Language as Grammar, Parser};

use crate::model::CodeEntity;
use common::EntitySink;

/// Source languages with a grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    C,
    Cpp,
    TypeScript,
    Tsx,
    Json,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::C,
        Language::Cpp,
        Language::TypeScript,
        Language::Tsx,
        Language::Json,
    ];

    /// Case-insensitive, with or without the leading dot
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.strip_prefix('.').unwrap_or(ext).to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|lang| lang.extensions().contains(&ext.as_str()))
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Language::C => &["c", "h"],
            Language::Cpp => &["cpp", "hpp", "cc", "cxx", "hxx"],
            Language::TypeScript => &["ts"],
            Language::Tsx => &["tsx"],
            Language::Json => &["json"],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::Json => "json",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Language::C => "C",
            Language::Cpp => "C++",
            Language::TypeScript => "TypeScript",
            Language::Tsx => "TSX/React",
            Language::Json => "JSON",
        }
    }

    pub fn grammar(self) -> Grammar {
        match self {
            Language::C => tree_sitter_c::LANGUAGE.into(),
            Language::Cpp => tree_sitter_cpp::LANGUAGE.into(),
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Language::Json => tree_sitter_json::LANGUAGE.into(),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Entities from a batch of files plus what happened to each file
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionReport {
    #[serde(skip)]
    pub entities: Vec<CodeEntity>,
    pub parsed: usize,
    pub unsupported: usize,
    pub failed: usize,
}

enum FileOutcome {
    Parsed(Vec<CodeEntity>),
    Unsupported,
    Failed,
}

/// Grammars by language. Parsers are built per call so extraction can run on many threads.
pub struct GrammarRegistry {
    grammars: HashMap<Language, Grammar>,
}

impl GrammarRegistry {
    pub fn new() -> Self {
        let grammars = Language::ALL
            .into_iter()
            .map(|lang| (lang, lang.grammar()))
            .collect();
        Self { grammars }
    }

    /// A parser for `ext`, or `None` for unsupported extensions
    pub fn parser_for(&self, ext: &str) -> Option<Parser> {
        self.parser(Language::from_extension(ext)?)
    }

    pub fn parser(&self, language: Language) -> Option<Parser> {
        let grammar = self.grammars.get(&language)?;
        let mut parser = Parser::new();
        match parser.set_language(grammar) {
            Ok(()) => Some(parser),
            Err(e) => {
                tracing::warn!("Grammar for {} rejected: {}", language, e);
                None
            }
        }
    }

    pub fn supported_extensions(&self) -> Vec<&'static str> {
        Language::ALL
            .into_iter()
            .flat_map(|lang| lang.extensions().iter().copied())
            .collect()
    }

    /// Entities in one source buffer. Never fails: anything that goes wrong yields an empty list.
    pub fn extract(&self, source: &[u8], file_path: &str, language: Language) -> Vec<CodeEntity> {
        let Some(mut parser) = self.parser(language) else {
            return Vec::new();
        };
        let Some(tree) = parser.parse(source, None) else {
            tracing::warn!("Parser gave up on {}", file_path);
            return Vec::new();
        };
        let root = tree.root_node();
        if root.has_error() {
            tracing::debug!("{} has syntax errors, extracting what parsed", file_path);
        }

        let mut sink = EntitySink::new(source, file_path);
        match language {
            Language::C => c::extract(root, &mut sink),
            Language::Cpp => cpp::extract(root, &mut sink),
            Language::TypeScript | Language::Tsx => typescript::extract(root, &mut sink),
            Language::Json => json::extract(root, &mut sink),
        }
        sink.finish()
    }

    /// Read and extract one file. Relative paths are resolved against `root`,
    /// and entities carry the path relative to `root`.
    pub fn extract_file(&self, path: &Path, root: &Path) -> Vec<CodeEntity> {
        match self.extract_path(path, root) {
            FileOutcome::Parsed(entities) => entities,
            FileOutcome::Unsupported | FileOutcome::Failed => Vec::new(),
        }
    }

    /// Extract every file in parallel. Entities keep the order of `files`.
    pub fn extract_all(&self, files: &[PathBuf], root: &Path) -> ExtractionReport {
        let outcomes: Vec<FileOutcome> = files
            .par_iter()
            .map(|path| self.extract_path(path, root))
            .collect();

        let mut report = ExtractionReport::default();
        for outcome in outcomes {
            match outcome {
                FileOutcome::Parsed(entities) => {
                    report.parsed += 1;
                    report.entities.extend(entities);
                }
                FileOutcome::Unsupported => report.unsupported += 1,
                FileOutcome::Failed => report.failed += 1,
            }
        }
        tracing::info!(
            "Extracted {} entities from {} files ({} unsupported, {} failed)",
            report.entities.len(),
            report.parsed,
            report.unsupported,
            report.failed
        );
        report
    }

    fn extract_path(&self, path: &Path, root: &Path) -> FileOutcome {
        let Some(language) = Language::from_path(path) else {
            tracing::debug!("No grammar for {}", path.display());
            return FileOutcome::Unsupported;
        };
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        let source = match std::fs::read(&absolute) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", absolute.display(), e);
                return FileOutcome::Failed;
            }
        };
        let relative = relative_path(&absolute, root);
        FileOutcome::Parsed(self.extract(&source, &relative, language))
    }
}

impl Default for GrammarRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn relative_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
