//! xbrlld CLI - Convert XBRL taxonomies and instance documents to RDF

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tracing_subscriber::EnvFilter;

use xbrlld::rdf::RdfDialect;
use xbrlld::{Conversion, ConvertOptions};

/// Convert XBRL taxonomies and instance documents to RDF
#[derive(Parser)]
#[command(name = "xbrlld")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an XBRL document to RDF
    Convert {
        #[command(subcommand)]
        source: ConvertSource,
    },
}

#[derive(Subcommand)]
enum ConvertSource {
    /// Convert a taxonomy entry schema and its whole DTS
    Taxonomy {
        /// Entry schema URL or local path
        locator: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Convert an instance document (regular or inline XBRL)
    Instance {
        /// Instance document URL or local path
        locator: String,

        /// Include the referenced taxonomy graph in the output
        #[arg(long)]
        with_taxonomy: bool,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Output file (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output RDF dialect
    #[arg(short, long, value_enum, default_value = "turtle")]
    format: RdfDialect,

    /// Local mirror directory for remote documents
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Abort the conversion after this many seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl OutputArgs {
    fn options(&self, with_taxonomy: bool) -> ConvertOptions {
        ConvertOptions {
            dialect: self.format,
            with_taxonomy,
            cache_dir: self.cache_dir.clone(),
            timeout: self.timeout.map(Duration::from_secs),
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Convert { source } => match source {
            ConvertSource::Taxonomy { locator, output } => convert_taxonomy(&locator, &output),
            ConvertSource::Instance {
                locator,
                with_taxonomy,
                output,
            } => convert_instance(&locator, with_taxonomy, &output),
        },
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "✗".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn convert_taxonomy(locator: &str, output: &OutputArgs) -> Result<ExitCode> {
    let start = Instant::now();
    let conversion = xbrlld::convert_taxonomy(locator, &output.options(false))
        .with_context(|| format!("failed to resolve taxonomy at {locator}"))?;
    report_findings(&conversion);
    write_output(&conversion.rdf, output)?;

    println!("{} {}", "✓".green().bold(), locator);
    println!("  Documents: {}", conversion.stats.documents);
    println!("  Concepts: {}", conversion.stats.concepts);
    println!("  Relationships: {}", conversion.stats.relationships);
    println!("  Triples: {}", conversion.stats.triples);
    println!("  Time: {:.2}ms", start.elapsed().as_secs_f64() * 1000.0);
    Ok(exit_code(&conversion))
}

fn convert_instance(locator: &str, with_taxonomy: bool, output: &OutputArgs) -> Result<ExitCode> {
    let start = Instant::now();
    let conversion = xbrlld::convert_instance(locator, &output.options(with_taxonomy))
        .with_context(|| format!("failed to convert instance at {locator}"))?;
    report_findings(&conversion);
    if conversion.stats.facts == 0 {
        bail!("no facts survived binding in {locator}");
    }
    write_output(&conversion.rdf, output)?;

    println!("{} {}", "✓".green().bold(), locator);
    println!("  Facts: {}", conversion.stats.facts);
    println!("  Contexts: {}", conversion.stats.contexts);
    println!("  Units: {}", conversion.stats.units);
    println!("  Triples: {}", conversion.stats.triples);
    println!("  Time: {:.2}ms", start.elapsed().as_secs_f64() * 1000.0);
    Ok(exit_code(&conversion))
}

fn report_findings(conversion: &Conversion) {
    for warning in &conversion.warnings {
        eprintln!("{} {warning}", "warning:".yellow().bold());
    }
    for error in &conversion.errors {
        eprintln!("{} {error}", "error:".red().bold());
    }
}

/// Output is still written on partial success; the exit code reports that
/// errors were skipped over.
fn exit_code(conversion: &Conversion) -> ExitCode {
    if conversion.errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn write_output(rdf: &str, output: &OutputArgs) -> Result<()> {
    match &output.output {
        Some(path) => fs::write(path, rdf)
            .with_context(|| format!("cannot write {}", path.display()))?,
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            lock.write_all(rdf.as_bytes())?;
            lock.flush()?;
        }
    }
    Ok(())
}
