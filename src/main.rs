use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use docintel_demo::config::{self, load_config};
use docintel_demo::export::{default_export_dir, write_exports, ExportFormat};
use docintel_demo::normalize::{normalize_with_warnings, RawResult};
use docintel_demo::report::render_report;
use docintel_demo::session::Session;
use docintel_demo::upload::Upload;
use docintel_demo::{init_tracing, AnalysisResult, AzureClient};

#[derive(Parser)]
#[command(name = "docintel", version, about = "Analyze documents with Azure Document Intelligence")]
struct Cli {
    /// More detailed logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show whether the service credentials are configured
    Status,
    /// Upload a PDF or image and show what was extracted
    Analyze {
        file: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Normalize a saved service response (or a previous JSON export) offline
    Normalize {
        raw: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct OutputArgs {
    /// Directory for exports (defaults to Downloads)
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Skip the JSON export
    #[arg(long)]
    no_json: bool,
    /// Skip the Excel export
    #[arg(long)]
    no_xlsx: bool,
    /// Do not print the report
    #[arg(short, long)]
    quiet: bool,
}

impl OutputArgs {
    fn formats(&self) -> Vec<ExportFormat> {
        let mut formats = Vec::new();
        if !self.no_json {
            formats.push(ExportFormat::Json);
        }
        if !self.no_xlsx {
            formats.push(ExportFormat::Workbook);
        }
        formats
    }

    fn emit(&self, result: &AnalysisResult) -> Result<()> {
        if !self.quiet {
            print!("{}", render_report(result));
        }
        let formats = self.formats();
        if formats.is_empty() {
            return Ok(());
        }
        let dir = self.out_dir.clone().unwrap_or_else(default_export_dir);
        let now = chrono::Local::now().naive_local();
        for path in write_exports(result, &dir, &formats, now)? {
            println!("Saved {}", path.display());
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| {
        if path.exists() {
            format!("Could not read file {}", path.display())
        } else {
            format!("File not found: {}", path.display())
        }
    })
}

fn status() -> ExitCode {
    let missing = config::missing_credentials();
    if missing.is_empty() {
        match load_config() {
            Ok(config) => {
                println!("configured");
                println!("  endpoint: {}", config.endpoint);
                println!("  model:    {}", config.model);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{e}");
                ExitCode::FAILURE
            }
        }
    } else {
        println!("not configured. Missing environment variables:");
        for var in missing {
            println!("  export {var}=your_value_here");
        }
        ExitCode::FAILURE
    }
}

fn analyze(file: &Path, output: &OutputArgs) -> Result<()> {
    let config = load_config()?;
    let bytes = read_file(file)?;
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document")
        .to_string();
    let upload = Upload::new(name, bytes);

    let client = AzureClient::new(config)?;
    let mut session = Session::new();
    let document = session.process(&upload, &client)?;
    output.emit(&document.result)
}

fn normalize_saved(raw: &Path, output: &OutputArgs) -> Result<()> {
    let bytes = read_file(raw)?;
    let raw = RawResult::from_slice(&bytes).context("Saved response is not valid JSON")?;
    let (result, warnings) = normalize_with_warnings(&raw);
    for warning in &warnings {
        tracing::warn!(warning = %warning, "normalization substituted a default");
    }
    output.emit(&result)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Command::Status => return Ok(status()),
        Command::Analyze { file, output } => analyze(file, output)?,
        Command::Normalize { raw, output } => normalize_saved(raw, output)?,
    }
    Ok(ExitCode::SUCCESS)
}
