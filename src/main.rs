use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn, LevelFilter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use uasset_text::binary::{read_asset_with, write_asset};
use uasset_text::options::{CodecOptions, DEFAULT_MAX_DEPTH};
use uasset_text::{json, verify};
use walkdir::WalkDir;

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Format {
    Text,
    Json,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Deepest allowed nesting of structs and containers
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that an asset survives decode and encode byte for byte
    Test {
        /// Input asset or directory
        input: PathBuf,

        /// Recursive directory processing
        #[arg(short, long)]
        recursive: bool,
    },

    /// Convert a binary asset to its text form
    Decode {
        /// Input asset
        input: PathBuf,

        /// Output file (defaults to <input>.txt)
        result: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Convert a text or JSON document back to a binary asset
    Encode {
        /// Input document
        input: PathBuf,

        /// Output asset
        result: Option<PathBuf>,
    },

    /// Show information about an asset
    Info {
        /// Input asset
        input: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let options = CodecOptions::with_max_depth(cli.max_depth);

    let result = match &cli.command {
        Commands::Test { input, recursive } => test_command(input, *recursive, &options),
        Commands::Decode { input, result, format } => {
            decode_command(input, result.as_deref(), *format, &options).map(|_| ExitCode::SUCCESS)
        }
        Commands::Encode { input, result } => {
            encode_command(input, result.as_deref(), &options).map(|_| ExitCode::SUCCESS)
        }
        Commands::Info { input, json } => info_command(input, *json, &options).map(|_| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();
}

/// Warns and returns false when `path` has none of the expected extensions.
fn check_extension(path: &Path, expected: &[&str]) -> bool {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let matched = expected.contains(&ext);
    if !matched {
        warn!(
            "{} does not have a {} extension",
            path.display(),
            expected.iter().map(|e| format!(".{e}")).collect::<Vec<_>>().join(" or ")
        );
    }
    matched
}

/// `X.uasset` becomes `X.uasset.txt` (or `.json`).
fn default_decode_path(input: &Path, format: Format) -> PathBuf {
    let mut name = input.as_os_str().to_os_string();
    name.push(match format {
        Format::Text => ".txt",
        Format::Json => ".json",
    });
    PathBuf::from(name)
}

/// `X.uasset.txt` becomes `X.uasset`, anything else `<stem>.uasset`.
fn default_encode_path(input: &Path) -> PathBuf {
    let stripped = input.with_extension("");
    if stripped.extension().is_some_and(|e| e == "uasset") {
        stripped
    } else {
        input.with_extension("uasset")
    }
}

fn is_json_document(path: &Path, source: &str) -> bool {
    path.extension().is_some_and(|e| e == "json") || source.trim_start().starts_with('{')
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

fn test_command(input: &Path, recursive: bool, options: &CodecOptions) -> Result<ExitCode, Box<dyn std::error::Error>> {
    if !input.is_dir() {
        let passed = test_single_file(input, options);
        return Ok(if passed { ExitCode::SUCCESS } else { ExitCode::FAILURE });
    }
    if !recursive {
        return Err("Input is a directory but --recursive is not specified".into());
    }

    let mut total = 0;
    let mut passed = 0;
    let mut failed = 0;

    for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("uasset") {
            total += 1;
            if test_single_file(path, options) {
                passed += 1;
            } else {
                failed += 1;
            }
        }
    }

    println!("\n=== Round Trip Summary ===");
    println!("Total files: {}", total);
    println!("Passed: {}", passed);
    println!("Failed: {}", failed);

    Ok(if failed > 0 { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn test_single_file(path: &Path, options: &CodecOptions) -> bool {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("✗ {}: {}", path.display(), e);
            return false;
        }
    };
    match verify::verify(&data, options) {
        Ok(report) => {
            println!("✓ {}", path.display());
            info!(
                "{} bytes, {} names, {} property nodes, {} text lines",
                report.binary_len, report.names, report.property_nodes, report.text_lines
            );
            true
        }
        Err(e) => {
            eprintln!("✗ {}: {}", path.display(), e);
            false
        }
    }
}

fn decode_command(
    input: &Path,
    result: Option<&Path>,
    format: Format,
    options: &CodecOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    check_extension(input, &["uasset"]);
    let data = std::fs::read(input)?;
    let output = match format {
        Format::Text => verify::decode(&data, options)?,
        Format::Json => json::write_json(&read_asset_with(&data, options)?)?,
    };

    let path = result.map_or_else(|| default_decode_path(input, format), Path::to_path_buf);
    info!("Writing {:?} to {}", format, path.display());
    write_output(&path, output.as_bytes())?;
    println!("✓ Decoded to: {}", path.display());
    Ok(())
}

fn encode_command(input: &Path, result: Option<&Path>, options: &CodecOptions) -> Result<(), Box<dyn std::error::Error>> {
    check_extension(input, &["txt", "json"]);
    let source = std::fs::read_to_string(input)?;
    let bytes = if is_json_document(input, &source) {
        write_asset(&json::read_json(&source)?)?
    } else {
        verify::encode(&source, options)?
    };

    let path = result.map_or_else(|| default_encode_path(input), Path::to_path_buf);
    info!("Writing {} bytes to {}", bytes.len(), path.display());
    write_output(&path, &bytes)?;
    println!("✓ Encoded to: {}", path.display());
    Ok(())
}

fn info_command(input: &Path, as_json: bool, options: &CodecOptions) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(input)?;
    let asset = read_asset_with(&data, options)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&json::asset_summary(&asset))?);
        return Ok(());
    }

    println!("=== Asset Information ===");
    println!("File: {}", input.display());
    println!("Size: {} bytes", data.len());
    let header = &asset.header;
    println!("Package name: 0x{:016x}", header.name);
    println!("Source name: 0x{:016x}", header.source_name);
    println!("Package flags: 0x{:08x}", header.package_flags);
    println!(
        "Graph data: {} bytes at offset {}",
        header.graph_data_size, header.graph_data_offset
    );
    println!();
    println!("Names: {}", asset.names.len());
    println!("Summary bytes: {}", asset.summary.len());
    println!(
        "Properties: {} top-level, {} nodes",
        asset.properties.len(),
        asset.property_count()
    );
    println!("Trailer bytes: {}", asset.trailer.len());
    Ok(())
}
