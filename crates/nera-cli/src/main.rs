//! NERA CLI - Command-line interface
//!
//! Usage:
//!   nera batch <path> [--format csv|tsv|json|jsonl] [--output FILE]
//!   nera analyze <text>
//!   nera labels

use anyhow::Context;
use clap::{Parser, Subcommand};
use nera_core::{AppConfig, EntityLabel, LoggingConfig};
use nera_parser::InputSet;
use nera_pipeline::{
    export, AnalysisService, BatchResult, CancellationToken, Destination, ExportFormat,
    ExportTarget,
};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nera")]
#[command(about = "Named entity recognition and batch text analysis")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables still apply)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a file or directory and export the results
    Batch(BatchArgs),
    /// Analyze one text and print the document as JSON
    Analyze {
        /// Text to analyze
        text: String,
    },
    /// List the known entity labels
    Labels,
}

#[derive(clap::Args)]
struct BatchArgs {
    /// File or directory to analyze
    path: PathBuf,

    /// Output format: csv, tsv, json or jsonl
    #[arg(short, long)]
    format: Option<String>,

    /// Output file, or "-" for stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Accepted file extension when walking a directory (repeatable)
    #[arg(long = "ext")]
    extensions: Vec<String>,

    /// Process at most this many documents
    #[arg(long)]
    max_items: Option<usize>,

    /// Stop adding documents once their total size exceeds this many bytes
    #[arg(long)]
    max_bytes: Option<u64>,

    /// Documents processed concurrently
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Skip language detection
    #[arg(long)]
    no_language: bool,

    /// Skip sentiment scoring
    #[arg(long)]
    no_sentiment: bool,

    /// Link entities against the knowledge graph
    #[arg(long)]
    link: bool,

    /// Also write the summary report to this file
    #[arg(long)]
    summary: Option<PathBuf>,
}

impl BatchArgs {
    /// Fold command-line overrides into the loaded configuration
    fn apply(&self, config: &mut AppConfig) {
        if !self.extensions.is_empty() {
            config.pipeline.extensions = self.extensions.clone();
        }
        if self.max_items.is_some() {
            config.pipeline.max_items = self.max_items;
        }
        if self.max_bytes.is_some() {
            config.pipeline.max_bytes = self.max_bytes;
        }
        if let Some(concurrency) = self.concurrency {
            config.pipeline.concurrency = concurrency.max(1);
        }
        if self.no_language {
            config.enrichment.language = false;
        }
        if self.no_sentiment {
            config.enrichment.sentiment = false;
        }
        if self.link {
            config.enrichment.linking = true;
        }
        if let Some(format) = &self.format {
            config.export.format = format.clone();
        }
    }

    fn target(&self, config: &AppConfig) -> anyhow::Result<ExportTarget> {
        let format: ExportFormat = config.export.format.parse()?;
        let target = match &self.output {
            Some(path) if path.as_os_str() == "-" => ExportTarget::stdout(format),
            Some(path) => ExportTarget::file(format, path),
            None => ExportTarget::file(
                format,
                ExportTarget::default_path(&config.export.output_stem, format),
            ),
        };
        Ok(target)
    }
}

fn init_tracing(logging: &LoggingConfig) {
    // `nera` prefixes every workspace crate target
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("nera={}", logging.level)));

    // Logs go to stderr so exports can be piped from stdout
    if logging.json_format {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

/// Make sure the export destination can be created before any work starts
fn prepare_destination(target: &ExportTarget) -> anyhow::Result<()> {
    if let Destination::File(path) = &target.destination {
        File::create(path)
            .with_context(|| format!("cannot create output {}", path.display()))?;
    }
    Ok(())
}

/// Print the summary report, then export
///
/// The report is produced even when the export fails.
fn deliver(
    batch: &BatchResult,
    target: &ExportTarget,
    summary: Option<&Path>,
) -> (String, nera_core::Result<u64>) {
    let report = batch.summary().report();
    if target.destination == Destination::Stdout {
        eprintln!("{report}");
    } else {
        println!("{report}");
    }

    if let Some(path) = summary {
        if let Err(e) = std::fs::write(path, &report) {
            warn!("Failed to write summary to {}: {}", path.display(), e);
        }
    }

    let exported = export(batch, target.clone());
    match &exported {
        Ok(written) => info!("Wrote {} bytes as {}", written, target.format),
        Err(e) => error!("Export failed: {}", e),
    }
    (report, exported)
}

async fn run_batch(mut config: AppConfig, args: BatchArgs) -> anyhow::Result<()> {
    args.apply(&mut config);
    let target = args.target(&config)?;
    prepare_destination(&target)?;

    let inputs = InputSet::from_path(
        &args.path,
        &config.pipeline.extensions,
        config.pipeline.recursive,
    )
    .with_context(|| format!("cannot read input {}", args.path.display()))?;
    if inputs.is_empty() {
        warn!("No matching input files under {}", args.path.display());
    }

    let service = AnalysisService::from_config(&config)?;

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling batch");
            signal.cancel();
        }
    });

    info!("Processing {} inputs from {}", inputs.len(), args.path.display());
    let batch = service.run_batch(inputs, cancel).await?;

    let (_, exported) = deliver(&batch, &target, args.summary.as_deref());
    service.shutdown().await;
    exported?;
    Ok(())
}

async fn run_analyze(config: AppConfig, text: &str) -> anyhow::Result<()> {
    let service = AnalysisService::from_config(&config)?;
    let document = service.analyze_text(text).await?;
    println!("{}", serde_json::to_string_pretty(&document)?);
    service.shutdown().await;
    Ok(())
}

fn print_labels() {
    for label in EntityLabel::ALL {
        println!("{:<12} {}", label.as_str(), label.description());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Batch(args) => run_batch(config, args).await,
        Commands::Analyze { text } => run_analyze(config, &text).await,
        Commands::Labels => {
            print_labels();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch_args(argv: &[&str]) -> BatchArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Batch(args) => args,
            _ => panic!("expected batch command"),
        }
    }

    #[test]
    fn test_batch_overrides_config() {
        let args = batch_args(&[
            "nera", "batch", "docs", "--ext", ".txt", "--ext", ".md", "--max-items", "5",
            "--concurrency", "0", "--no-sentiment", "--link",
        ]);
        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert_eq!(config.pipeline.extensions, vec![".txt", ".md"]);
        assert_eq!(config.pipeline.max_items, Some(5));
        assert_eq!(config.pipeline.concurrency, 1);
        assert!(config.enrichment.language);
        assert!(!config.enrichment.sentiment);
        assert!(config.enrichment.linking);
    }

    #[test]
    fn test_default_target_uses_stem() {
        let args = batch_args(&["nera", "batch", "docs", "--format", "csv"]);
        let mut config = AppConfig::default();
        args.apply(&mut config);

        let target = args.target(&config).unwrap();
        assert_eq!(target.format, ExportFormat::Csv);
        assert_eq!(
            target.destination,
            Destination::File(PathBuf::from("ner_results.csv"))
        );
    }

    #[test]
    fn test_dash_output_is_stdout() {
        let args = batch_args(&["nera", "batch", "docs", "-o", "-", "-f", "jsonl"]);
        let mut config = AppConfig::default();
        args.apply(&mut config);

        let target = args.target(&config).unwrap();
        assert_eq!(target, ExportTarget::stdout(ExportFormat::JsonLines));
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let args = batch_args(&["nera", "batch", "docs", "--format", "xml"]);
        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert!(args.target(&config).is_err());
    }

    #[test]
    fn test_missing_output_directory_is_fatal_before_work() {
        let target = ExportTarget::file(ExportFormat::Json, "/nonexistent_dir/out.json");
        assert!(prepare_destination(&target).is_err());
        assert!(prepare_destination(&ExportTarget::stdout(ExportFormat::Json)).is_ok());
    }

    #[tokio::test]
    async fn test_report_survives_failed_export() {
        let service = AnalysisService::from_config(&AppConfig::default()).unwrap();
        let inputs = InputSet::from_texts(["Apple Inc. was founded by Steve Jobs.", ""]);
        let batch = service
            .run_batch(inputs, CancellationToken::new())
            .await
            .unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("gone").join("out.json");
        let summary = dir.path().join("summary.txt");
        let target = ExportTarget::file(ExportFormat::Json, &out);

        let (report, exported) = deliver(&batch, &target, Some(&summary));

        assert!(exported.is_err());
        assert!(report.starts_with("=== Batch Analysis Report ==="));
        assert!(report.contains("Succeeded: 1 | Failed: 1"));
        assert_eq!(std::fs::read_to_string(&summary).unwrap(), report);
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["nera", "labels", "--config", "nera.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("nera.toml")));
    }
}
