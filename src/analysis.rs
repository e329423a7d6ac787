//! One analysis pass: extract, start language servers, enrich, shut down

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{AppConfig, LspConfig};
use crate::enrich::enrich;
use crate::error::{CodescopeError, Result};
use crate::lsp::document::absolute_path;
use crate::lsp::{CapabilityReport, LspManager};
use crate::model::CodeEntity;
use crate::parse::{ExtractionReport, GrammarRegistry};

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOptions {
    /// Query language servers for references and calls
    pub enrich: bool,
    /// Entity queries in flight at once
    pub concurrency: usize,
    pub lsp: LspConfig,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl AnalysisOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            enrich: config.analysis.enrich,
            concurrency: config.analysis.concurrency,
            lsp: config.lsp.clone(),
        }
    }
}

/// Totals over a set of entities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityStats {
    pub total_entities: usize,
    pub by_type: BTreeMap<&'static str, usize>,
    pub total_references: usize,
    pub total_callers: usize,
    pub total_callees: usize,
    /// Entities with at least one reference or call
    pub enriched: usize,
}

impl EntityStats {
    pub fn from_entities(entities: &[CodeEntity]) -> Self {
        let mut stats = Self {
            total_entities: entities.len(),
            ..Default::default()
        };
        for entity in entities {
            *stats.by_type.entry(entity.entity_type.as_str()).or_default() += 1;
            stats.total_references += entity.references.len();
            stats.total_callers += entity.incoming_calls.len();
            stats.total_callees += entity.outgoing_calls.len();
            if entity.is_enriched() {
                stats.enriched += 1;
            }
        }
        stats
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub entities: Vec<CodeEntity>,
    /// File counts; its entities have been moved into `entities`
    pub extraction: ExtractionReport,
    /// `None` when enrichment was not requested
    pub capabilities: Option<CapabilityReport>,
}

impl std::fmt::Display for AnalysisOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Files: {} parsed, {} unsupported, {} failed",
            self.extraction.parsed, self.extraction.unsupported, self.extraction.failed
        )?;
        let stats = self.stats();
        writeln!(f, "Entities: {}", stats.total_entities)?;
        for (ty, count) in &stats.by_type {
            writeln!(f, "  {}: {}", ty, count)?;
        }

        match &self.capabilities {
            Some(report) => {
                writeln!(f, "Enriched: {}", stats.enriched)?;
                writeln!(
                    f,
                    "References: {}, callers: {}, callees: {}",
                    stats.total_references, stats.total_callers, stats.total_callees
                )?;
                write!(f, "Language servers:\n{}", report)
            }
            None => write!(f, "Enrichment: off"),
        }
    }
}

impl AnalysisOutcome {
    pub fn stats(&self) -> EntityStats {
        EntityStats::from_entities(&self.entities)
    }
}

pub struct Analyzer;

impl Analyzer {
    /// Run a full pass over `files` (absolute, or relative to `root`).
    ///
    /// Only a missing root is an error. Every step after the language servers
    /// are started is total, so they are always shut down.
    pub async fn run<F>(root: &Path, files: &[PathBuf], options: &AnalysisOptions, on_progress: F) -> Result<AnalysisOutcome>
    where
        F: FnMut(usize, usize),
    {
        let root = root.canonicalize().map_err(|_| CodescopeError::RootNotFound {
            path: root.to_path_buf(),
        })?;

        let mut extraction = {
            let root = root.clone();
            let files = files.to_vec();
            match tokio::task::spawn_blocking(move || GrammarRegistry::new().extract_all(&files, &root)).await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!("Extraction task failed: {}", e);
                    ExtractionReport::default()
                }
            }
        };

        let entities = std::mem::take(&mut extraction.entities);
        if !options.enrich {
            return Ok(AnalysisOutcome {
                entities,
                extraction,
                capabilities: None,
            });
        }

        let (manager, capabilities) = LspManager::initialize_all(&options.lsp, &root).await;
        if !capabilities.available().is_empty() {
            tracing::info!("Language servers ready: {}", capabilities.available().join(", "));
        }

        let entities = Self::enrich_with_pool(
            entities,
            files,
            manager,
            options.concurrency,
            on_progress,
        )
        .await;

        Ok(AnalysisOutcome {
            entities,
            extraction,
            capabilities: Some(capabilities),
        })
    }

    /// Open the files the pool has servers for, enrich, then shut the pool down
    pub async fn enrich_with_pool<F>(
        entities: Vec<CodeEntity>,
        files: &[PathBuf],
        mut manager: LspManager,
        concurrency: usize,
        on_progress: F,
    ) -> Vec<CodeEntity>
    where
        F: FnMut(usize, usize),
    {
        if manager.running_servers().is_empty() {
            tracing::info!("No language server running, skipping enrichment");
            manager.shutdown_all().await;
            return entities;
        }

        open_files(&mut manager, files).await;
        tracing::debug!("Opened {} documents", manager.open_document_count());

        let entities = enrich(entities, &manager, concurrency, on_progress).await;
        manager.shutdown_all().await;
        entities
    }
}

async fn open_files(manager: &mut LspManager, files: &[PathBuf]) {
    for path in files {
        if !manager.has_client_for(path) {
            continue;
        }
        let absolute = absolute_path(manager.root(), path);
        let content = match tokio::fs::read(&absolute).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::debug!("Skipping didOpen for {}: {}", absolute.display(), e);
                continue;
            }
        };
        manager.open_file(path, &content).await;
    }
}
