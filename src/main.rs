//! Main entry point for the receipt-archive CLI application.
//!
//! Packs a photo and its thumbnail into an archive, extracts either one
//! back, or lists the members of an archive.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use receipt_archive::cli::{Command, StderrLogger};
use receipt_archive::zip::{CompressionMethod, DirectoryEntry};
use receipt_archive::{ArchiveReader, Cli, LocalFileStore, ReceiptStore};

/// Application entry point.
///
/// Parses command-line arguments, installs the logger and dispatches to the
/// subcommand handler.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    StderrLogger::init(cli.log_level())?;

    match &cli.command {
        Command::Pack {
            image,
            thumbnail,
            output,
            ..
        } => pack(&cli, image, thumbnail, output).await,
        Command::Extract {
            archive,
            thumbnail,
            extract_dir,
            pipe,
            ..
        } => extract(&cli, archive, *thumbnail, extract_dir.as_deref(), *pipe).await,
        Command::List { archive, verbose } => list(archive, *verbose).await,
    }
}

/// Split a path into a store rooted at its directory and the file name key.
fn store_for(path: &str, cli: &Cli) -> Result<(ReceiptStore<LocalFileStore>, String)> {
    let path = Path::new(path);
    let key = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .with_context(|| format!("Not a file path: {}", path.display()))?;
    let root = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((
        ReceiptStore::new(Arc::new(LocalFileStore::new(root)), cli.archive_options()),
        key,
    ))
}

/// Compress a photo and its thumbnail into a new archive.
async fn pack(cli: &Cli, image: &str, thumbnail: &str, output: &str) -> Result<()> {
    let primary = tokio::fs::read(image)
        .await
        .with_context(|| format!("Failed to read {}", image))?;
    let thumb = tokio::fs::read(thumbnail)
        .await
        .with_context(|| format!("Failed to read {}", thumbnail))?;

    let (store, key) = store_for(output, cli)?;
    let saved = store.save(&key, primary, thumb).await?;

    if !cli.is_quiet() {
        println!(
            "  packed: {} ({} + {} -> {}, {:.0}%)",
            output,
            format_size(saved.primary_size as u64),
            format_size(saved.thumbnail_size as u64),
            format_size(saved.compressed_size as u64),
            saved.ratio() * 100.0
        );
    }

    Ok(())
}

/// Extract the photo or thumbnail.
///
/// - Pipe mode (`-p`): write to stdout instead of a file
/// - Custom output directory (`-d`): write the member file name there
async fn extract(
    cli: &Cli,
    archive: &str,
    thumbnail: bool,
    extract_dir: Option<&str>,
    pipe: bool,
) -> Result<()> {
    let (store, key) = store_for(archive, cli)?;
    let options = store.archiver().options();

    let (data, member) = if thumbnail {
        (store.open_thumbnail(&key).await?, options.thumbnail_member.clone())
    } else {
        (store.open_primary(&key).await?, options.primary_member.clone())
    };

    if pipe {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(&data).await?;
        stdout.flush().await?;
        return Ok(());
    }

    let output_path = match extract_dir {
        Some(dir) => PathBuf::from(dir).join(&member),
        None => PathBuf::from(&member),
    };

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    if !cli.is_quiet() {
        println!("  extracting: {}", output_path.display());
    }
    tokio::fs::write(&output_path, &data)
        .await
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    Ok(())
}

/// List members of an archive.
///
/// Uses the central directory when it is intact and falls back to walking
/// the local headers otherwise.
///
/// - Simple format: just member names, one per line
/// - Verbose format (`-v`): table with sizes, ratio, method and CRC
async fn list(archive: &str, verbose: bool) -> Result<()> {
    let data = tokio::fs::read(archive)
        .await
        .with_context(|| format!("Failed to read {}", archive))?;
    let reader = ArchiveReader::new(&data);

    let entries = match reader.central_directory() {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!("central directory unreadable ({}), scanning local headers", err);
            reader
                .entries()?
                .into_iter()
                .map(|e| DirectoryEntry {
                    lfh_offset: e.header_offset as u32,
                    name: e.name,
                    compression_method: e.header.compression_method,
                    compressed_size: e.header.compressed_size,
                    uncompressed_size: e.header.uncompressed_size,
                    crc32: e.header.crc32,
                })
                .collect()
        }
    };

    if verbose {
        // Print table header for verbose output
        println!(
            "{:>10}  {:>10}  {:>5}  {:>6}  {:>8}  Name",
            "Length", "Size", "Cmpr", "Method", "CRC-32"
        );
        println!("{}", "-".repeat(60));
    }

    // Track totals for summary line
    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;

    for entry in &entries {
        if verbose {
            let method = match entry.compression_method {
                CompressionMethod::Stored => "Stored".to_string(),
                CompressionMethod::Deflate => "Defl".to_string(),
                CompressionMethod::Unknown(m) => format!("#{}", m),
            };
            println!(
                "{:>10}  {:>10}  {}  {:>6}  {:08x}  {}",
                entry.uncompressed_size,
                entry.compressed_size,
                ratio(entry.compressed_size as u64, entry.uncompressed_size as u64),
                method,
                entry.crc32,
                entry.name
            );
            total_uncompressed += entry.uncompressed_size as u64;
            total_compressed += entry.compressed_size as u64;
        } else {
            println!("{}", entry.name);
        }
    }

    // Print summary line in verbose mode
    if verbose {
        println!("{}", "-".repeat(60));
        println!(
            "{:>10}  {:>10}  {}  {:>16}  {} files",
            total_uncompressed,
            total_compressed,
            ratio(total_compressed, total_uncompressed),
            "",
            entries.len()
        );
    }

    Ok(())
}

/// Compression ratio as percentage saved.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 {
        format!(
            "{:>4}%",
            100i64 - (compressed as i64 * 100 / uncompressed as i64)
        )
    } else {
        "  0%".to_string()
    }
}

/// Format a byte size into a human-readable string.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// assert_eq!(format_size(1048576), "1.00 MB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
