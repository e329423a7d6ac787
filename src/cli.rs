use std::io::BufRead;
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use crate::config::AppConfig;

/// Codescope: extract code entities and enrich them with references and call hierarchy
#[derive(Parser, Debug, Clone)]
#[command(name = "codescope")]
#[command(version)]
#[command(about = "Code entity extraction with language server enrichment", long_about = None)]
pub struct Cli {
    /// Workspace root; entity paths are reported relative to it
    #[arg(value_name = "ROOT", required_unless_present = "write_default_config")]
    pub root: Option<PathBuf>,

    /// Files to analyze. When none are given, newline-separated paths are read from stdin.
    #[arg(value_name = "FILES")]
    pub files: Vec<PathBuf>,

    /// Config file to use instead of the per-user one
    #[arg(long, env = "CODESCOPE_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Skip language servers; extraction only
    #[arg(long, default_value_t = false)]
    pub no_lsp: bool,

    /// Entity queries in flight at once
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
    pub format: OutputFormat,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Write the default config file (if none exists) and exit
    #[arg(long, default_value_t = false)]
    pub write_default_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Entities as a JSON document
    Json,
    /// Counts per entity type and server availability
    Summary,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Apply command-line overrides on top of the loaded config
    pub fn apply(&self, config: &mut AppConfig) {
        if self.no_lsp {
            config.analysis.enrich = false;
        }
        if let Some(n) = self.concurrency {
            config.analysis.concurrency = n.max(1);
        }
    }

    /// Log filter directive: `-v` flags win over the configured level
    pub fn log_level<'a>(&self, configured: &'a str) -> &'a str {
        match self.verbose {
            0 => configured,
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Paths from a newline-separated list, skipping blank lines
pub fn read_file_list(reader: impl BufRead) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            files.push(PathBuf::from(trimmed));
        }
    }
    Ok(files)
}
