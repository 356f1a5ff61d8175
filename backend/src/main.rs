//! Entityload CLI - Analyze and load bulk entity-record files
//!
//! # Main Commands
//!
//! ```bash
//! entityload serve                  # Start HTTP server (port 3000)
//! entityload analyze input.jsonl    # Dry-run analysis of a bulk file
//! entityload load input.jsonl      # Load a bulk file into the engine
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! entityload parse input.csv        # Just parse the bulk file to JSON
//! entityload classify input.csv     # Show per-record classification
//! ```

use clap::{Parser, Subcommand};
use entityload::{
    analyze, classify, load, parse_bytes_auto, HttpEngineClient, LoadOptions, LoadStatusTracker,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "entityload")]
#[command(about = "Analyze and load bulk entity-record files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a bulk file and output its records as JSON
    Parse {
        /// Input file (CSV, JSON lines, or JSON array)
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Analyze a bulk file without touching the engine
    Analyze {
        /// Input file (CSV, JSON lines, or JSON array)
        input: PathBuf,

        /// Default data source for records that name none
        #[arg(short, long, default_value = "UNKNOWN")]
        data_source: String,

        /// Output file for the analysis JSON (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load a bulk file into the resolution engine
    Load {
        /// Input file (CSV, JSON lines, or JSON array)
        input: PathBuf,

        /// Default data source for records that name none
        #[arg(short, long, default_value = "UNKNOWN")]
        data_source: String,

        /// Engine base URL (default: ENGINE_URL from the environment)
        #[arg(short, long)]
        engine_url: Option<String>,

        /// Output file for the load result JSON (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show per-record classification of a bulk file
    Classify {
        /// Input file (CSV, JSON lines, or JSON array)
        input: PathBuf,

        /// Default data source for records that name none
        #[arg(short, long, default_value = "UNKNOWN")]
        data_source: String,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),

        Commands::Analyze {
            input,
            data_source,
            output,
        } => cmd_analyze(&input, &data_source, output.as_deref()),

        Commands::Load {
            input,
            data_source,
            engine_url,
            output,
        } => cmd_load(&input, &data_source, engine_url.as_deref(), output.as_deref()).await,

        Commands::Classify { input, data_source } => cmd_classify(&input, &data_source),

        Commands::Serve { port } => cmd_serve(port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing: {}", input.display());

    let bytes = fs::read(input)?;
    let batch = parse_bytes_auto(&bytes)?;

    eprintln!("   Format: {}", batch.format.as_str());
    eprintln!("   Encoding: {}", batch.encoding);
    if let Some(delimiter) = batch.delimiter {
        eprintln!(
            "   Delimiter: '{}'",
            match delimiter {
                '\t' => "\\t".to_string(),
                c => c.to_string(),
            }
        );
    }

    let mut records = Vec::new();
    let mut bad_lines = 0usize;
    for item in batch.records() {
        match item {
            Ok(record) => records.push(Value::Object(record.fields().clone())),
            Err(_) => bad_lines += 1,
        }
    }

    eprintln!("✅ Parsed {} records ({} unreadable)", records.len(), bad_lines);

    let json = serde_json::to_string_pretty(&records)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_analyze(
    input: &Path,
    data_source: &str,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Analyzing: {}", input.display());

    let bytes = fs::read(input)?;
    let batch = parse_bytes_auto(&bytes)?;
    let analysis = analyze(batch.records(), data_source);

    eprintln!("   Format: {}", batch.format.as_str());
    eprintln!("   Total records: {}", analysis.total_records);
    eprintln!("   Malformed:     {}", analysis.malformed_records);
    for stat in &analysis.data_sources {
        eprintln!(
            "   [{}] {} records, {} malformed",
            stat.data_source, stat.record_count, stat.malformed_count
        );
    }
    if !analysis.complete {
        eprintln!("   ⚠️  Analysis incomplete (input ended early)");
    }

    let json = serde_json::to_string_pretty(&analysis)?;
    write_output(&json, output)?;

    Ok(())
}

async fn cmd_load(
    input: &Path,
    data_source: &str,
    engine_url: Option<&str>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("🚚 Loading: {}", input.display());

    let engine = match engine_url {
        Some(url) => HttpEngineClient::new(url),
        None => HttpEngineClient::from_env()?,
    };

    let bytes = fs::read(input)?;
    let batch = parse_bytes_auto(&bytes)?;

    let options = LoadOptions {
        default_data_source: data_source.to_string(),
        ..LoadOptions::default()
    };
    let tracker = LoadStatusTracker::new();

    let result = load(batch.records(), &engine, &tracker, &options).await?;

    eprintln!("\n📊 Load {}:", result.status);
    eprintln!("   Submitted: {}", result.submitted);
    eprintln!("   Loaded:    {}", result.loaded);
    eprintln!("   Skipped:   {}", result.skipped);
    eprintln!("   Failed:    {}", result.failed);
    for error in result.errors.iter().take(5) {
        eprintln!("   ❌ {} [{}]: {}", error.record, error.code, error.message);
    }
    if let Some(ref reason) = result.abort_reason {
        eprintln!("   ⚠️  Aborted: {}", reason);
    }

    let json = serde_json::to_string_pretty(&result)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_classify(input: &Path, data_source: &str) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = fs::read(input)?;
    let batch = parse_bytes_auto(&bytes)?;

    for item in batch.records() {
        match item {
            Ok(record) => {
                let c = classify(&record, data_source);
                let classes: Vec<&str> = c.classes.iter().map(|cl| cl.code()).collect();
                println!(
                    "{:>5}  {}  {}  [{}]{}",
                    record.position(),
                    c.data_source,
                    c.entity_type,
                    classes.join(", "),
                    if c.malformed { "  MALFORMED" } else { "" }
                );
            }
            Err(e) => println!("    ?  {}", e),
        }
    }

    Ok(())
}

async fn cmd_serve(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    entityload::server::start_server(port).await
}

fn write_output(content: &str, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => {
            fs::write(path, content)?;
            eprintln!("💾 Written to {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}
