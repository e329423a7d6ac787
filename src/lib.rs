//! Code intelligence engine: tree-sitter entity extraction plus language
//! server enrichment (references and call hierarchy).

pub mod analysis;
pub mod cli;
pub mod config;
pub mod enrich;
pub mod error;
pub mod lsp;
pub mod model;
pub mod parse;

pub use analysis::{AnalysisOptions, AnalysisOutcome, Analyzer};
pub use error::{CodescopeError, Result};
pub use model::{CallHierarchyItem, CodeEntity, EntityType, Reference, SymbolReferences};
pub use parse::{GrammarRegistry, Language};
