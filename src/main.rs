//! Main entry point for the remotezip CLI application.
//!
//! Lists or extracts entries of a ZIP archive given as an HTTP(S) URL or a
//! local path.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use remotezip::{Cli, DirectoryEntry, HttpRangeReader, LocalFileReader, ReadAt, RemoteArchive};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?cli, "CLI arguments parsed");
    let config = cli.client_config();

    if cli.is_http_url() {
        let reader = Arc::new(HttpRangeReader::with_config(cli.archive.clone(), &config)?);
        let archive = RemoteArchive::new(Arc::clone(&reader), config);

        process_zip(&archive, &cli).await?;

        // Display network transfer statistics for HTTP sources
        if !cli.is_quiet() {
            eprintln!(
                "\nTotal bytes transferred: {} in {} requests",
                format_size(reader.transferred_bytes()),
                reader.request_count()
            );
        }
    } else {
        let reader = Arc::new(
            LocalFileReader::new(Path::new(&cli.archive))
                .with_context(|| format!("cannot open {}", cli.archive))?,
        );
        let archive = RemoteArchive::new(reader, config);
        process_zip(&archive, &cli).await?;
    }

    Ok(())
}

/// Process a ZIP archive based on CLI options.
///
/// - List mode (`-l` or `-v`): display archive contents
/// - Extract mode: extract the named entries, or every file when none are named
async fn process_zip<R: ReadAt>(archive: &RemoteArchive<R>, cli: &Cli) -> Result<()> {
    if cli.list || cli.verbose > 0 {
        return list_files(archive, cli.verbose > 0).await;
    }

    let directory = archive.directory().await?;

    let names: Vec<String> = if cli.entries.is_empty() {
        directory
            .iter()
            .filter(|e| !e.is_directory)
            .map(|e| e.name.clone())
            .collect()
    } else {
        cli.entries.clone()
    };

    let multiple_files = cli.pipe && names.len() > 1;
    for name in &names {
        extract_file(archive, name, cli, multiple_files).await?;
    }

    Ok(())
}

/// Print the central directory: names only, or a table with sizes,
/// compression ratio and modification time when `verbose`.
async fn list_files<R: ReadAt>(archive: &RemoteArchive<R>, verbose: bool) -> Result<()> {
    let directory = archive.directory().await?;
    if !verbose {
        directory.iter().for_each(|entry| println!("{}", entry.name));
        return Ok(());
    }

    let rule = "-".repeat(70);
    println!(
        "{:>10}  {:>10}  {:>5}  {:>16}  Name",
        "Length", "Size", "Cmpr", "Modified"
    );
    println!("{rule}");
    directory.iter().for_each(print_entry);
    println!("{rule}");

    let files: Vec<&DirectoryEntry> = directory.iter().filter(|e| !e.is_directory).collect();
    let uncompressed: u64 = files.iter().map(|e| e.uncompressed_size).sum();
    let compressed: u64 = files.iter().map(|e| e.compressed_size).sum();
    println!(
        "{uncompressed:>10}  {compressed:>10}  {}  {:>16}  {} files",
        ratio(compressed, uncompressed),
        "",
        files.len()
    );

    Ok(())
}

fn print_entry(entry: &DirectoryEntry) {
    let (year, month, day) = entry.mod_date();
    let (hour, minute, _) = entry.mod_time();
    let modified = format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}");

    println!(
        "{:>10}  {:>10}  {}  {modified:>16}  {}",
        entry.uncompressed_size,
        entry.compressed_size,
        ratio(entry.compressed_size, entry.uncompressed_size),
        entry.name
    );
}

/// Percentage saved by compression.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        format!("{:>4}%", 0)
    }
}

/// Extract a single entry from the archive.
///
/// - Pipe mode (`-p`): write to stdout instead of a file
/// - Custom output directory (`-d`)
/// - Junk paths (`-j`): drop directory components of the entry name
/// - Overwrite control (`-o`): existing files are skipped unless set
async fn extract_file<R: ReadAt>(
    archive: &RemoteArchive<R>,
    name: &str,
    cli: &Cli,
    show_filename: bool,
) -> Result<()> {
    if cli.pipe {
        let mut stdout = tokio::io::stdout();
        if show_filename {
            stdout
                .write_all(format!("--- {} ---\n", name).as_bytes())
                .await?;
        }
        archive.extract(name, &mut stdout).await?;
        return Ok(());
    }

    let file_name = output_name(name, cli.junk_paths)?;

    let output_path = match cli.extract_dir {
        Some(ref dir) => PathBuf::from(dir).join(&file_name),
        None => PathBuf::from(&file_name),
    };

    if output_path.exists() && !cli.overwrite {
        if !cli.is_quiet() {
            eprintln!("Skipping: {} (use -o to overwrite)", name);
        }
        return Ok(());
    }

    if !cli.is_quiet() {
        println!("  extracting: {}", name);
    }

    archive
        .extract_to_file(name, &output_path)
        .await
        .with_context(|| format!("failed to extract {}", name))?;

    Ok(())
}

/// Relative output path for an entry.
///
/// Absolute names and names with `..` components are refused.
fn output_name(name: &str, junk_paths: bool) -> Result<String> {
    let file_name = if junk_paths {
        Path::new(name)
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| name.to_string())
    } else {
        name.to_string()
    };

    if Path::new(&file_name)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        warn!(entry = name, "refusing to write outside the output directory");
        bail!("refusing to extract {name}: path leaves the output directory");
    }
    Ok(file_name)
}

/// Human-readable byte count, e.g. `1.50 MB`.
fn format_size(size: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if size < 1024 {
        return format!("{size} bytes");
    }

    let mut value = size as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}
