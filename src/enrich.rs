//! Attach references and call hierarchy to extracted entities

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::lsp::LspError;
use crate::model::{CallHierarchyItem, CodeEntity, EntityRole, Reference};

/// Symbol lookups the enricher needs. Lines are 1-based, columns 0-based.
#[async_trait]
pub trait SymbolQuery: Send + Sync {
    async fn references(&self, path: &Path, line: u32, column: u32) -> Result<Vec<Reference>, LspError>;

    async fn incoming_calls(&self, path: &Path, line: u32, column: u32) -> Result<Vec<CallHierarchyItem>, LspError>;

    async fn outgoing_calls(&self, path: &Path, line: u32, column: u32) -> Result<Vec<CallHierarchyItem>, LspError>;
}

struct Lookup {
    index: usize,
    role: EntityRole,
    path: PathBuf,
    line: u32,
    column: u32,
}

enum Found {
    Calls {
        incoming: Vec<CallHierarchyItem>,
        outgoing: Vec<CallHierarchyItem>,
    },
    References(Vec<Reference>),
    Nothing,
}

/// Query `query` for every entity and merge the answers in.
///
/// Up to `concurrency` entities are in flight at once; `on_progress(done, total)`
/// fires once per entity in input order, whether or not its queries succeeded.
/// A failed query leaves the corresponding field empty.
pub async fn enrich<Q, F>(
    mut entities: Vec<CodeEntity>,
    query: &Q,
    concurrency: usize,
    mut on_progress: F,
) -> Vec<CodeEntity>
where
    Q: SymbolQuery + ?Sized,
    F: FnMut(usize, usize),
{
    let total = entities.len();
    let lookups: Vec<Lookup> = entities
        .iter()
        .enumerate()
        .map(|(index, entity)| {
            let (line, column) = entity.name_position();
            Lookup {
                index,
                role: entity.entity_type.role(),
                path: PathBuf::from(&entity.file_path),
                line,
                column,
            }
        })
        .collect();

    let mut results = stream::iter(lookups)
        .map(|lookup| async move {
            let found = run_lookup(query, &lookup).await;
            (lookup.index, found)
        })
        .buffered(concurrency.max(1));

    let mut done = 0;
    let mut enriched = 0;
    while let Some((index, found)) = results.next().await {
        if let Some(entity) = entities.get_mut(index) {
            match found {
                Found::Calls { incoming, outgoing } => {
                    entity.incoming_calls = incoming;
                    entity.outgoing_calls = outgoing;
                }
                Found::References(references) => entity.references = references,
                Found::Nothing => {}
            }
            if entity.is_enriched() {
                enriched += 1;
            }
        }
        done += 1;
        on_progress(done, total);
    }

    tracing::info!("Enriched {} of {} entities", enriched, total);
    entities
}

async fn run_lookup<Q>(query: &Q, lookup: &Lookup) -> Found
where
    Q: SymbolQuery + ?Sized,
{
    let Lookup { path, line, column, .. } = lookup;
    match lookup.role {
        EntityRole::Callable => {
            let incoming = swallow(query.incoming_calls(path, *line, *column).await, "incoming calls", lookup);
            let outgoing = swallow(query.outgoing_calls(path, *line, *column).await, "outgoing calls", lookup);
            Found::Calls { incoming, outgoing }
        }
        EntityRole::Referenceable => {
            Found::References(swallow(query.references(path, *line, *column).await, "references", lookup))
        }
        EntityRole::Skip => Found::Nothing,
    }
}

fn swallow<T>(result: Result<Vec<T>, LspError>, what: &str, lookup: &Lookup) -> Vec<T> {
    result.unwrap_or_else(|e| {
        tracing::debug!(
            "{} at {}:{}:{} failed: {}",
            what,
            lookup.path.display(),
            lookup.line,
            lookup.column,
            e
        );
        Vec::new()
    })
}
