use std::ffi::OsStr;
use std::io::{self, Write};
use std::path::Path;

use color_eyre::eyre::{eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use codescope::analysis::{AnalysisOptions, Analyzer};
use codescope::cli::{read_file_list, Cli, OutputFormat};
use codescope::config::{ConfigManager, GeneralConfig};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse_args();

    let config_manager = match &cli.config {
        Some(path) => ConfigManager::from_path(path.clone()),
        None => ConfigManager::new()?,
    };

    if cli.write_default_config {
        let path = config_manager.config_path().display().to_string();
        if config_manager.write_default_config()? {
            println!("Wrote default config to {}", path);
        } else {
            println!("Config already exists at {}", path);
        }
        return Ok(());
    }

    let mut config = config_manager.into_app_config();
    cli.apply(&mut config);

    // Held until exit so buffered file logs are flushed
    let _log_guard = init_tracing(&config.general, cli.log_level(&config.general.log_level));

    let root = cli.root.clone().ok_or_else(|| eyre!("a workspace ROOT is required"))?;
    let files = if cli.files.is_empty() {
        read_file_list(io::stdin().lock())?
    } else {
        cli.files.clone()
    };
    if files.is_empty() {
        tracing::warn!("No files to analyze");
    }

    let options = AnalysisOptions::from_config(&config);
    let outcome = Analyzer::run(&root, &files, &options, |done, total| {
        if done == total || done % 100 == 0 {
            tracing::info!("Enrichment progress: {}/{}", done, total);
        }
    })
    .await?;

    let mut stdout = io::stdout().lock();
    match cli.format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut stdout, &outcome)?;
            writeln!(stdout)?;
        }
        OutputFormat::Summary => writeln!(stdout, "{}", outcome)?,
    }

    Ok(())
}

fn init_tracing(general: &GeneralConfig, level: &str) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match &general.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().unwrap_or_else(|| OsStr::new("codescope.log"));
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
            None
        }
    }
}
