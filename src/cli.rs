use clap::{Parser, Subcommand};
use log::{LevelFilter, Log, Metadata, Record};

use crate::facade::ArchiveOptions;

#[derive(Parser, Debug)]
#[command(name = "receipt-archive")]
#[command(version)]
#[command(about = "Pack a receipt photo and its thumbnail into one archive", long_about = None)]
#[command(after_help = "Examples:\n  \
  receipt-archive pack photo.jpg thumb.jpg -o receipt.zip   build an archive\n  \
  receipt-archive extract receipt.zip -d out                 write image.jpg into out/\n  \
  receipt-archive extract receipt.zip --thumbnail -p | feh -  view the thumbnail")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', global = true, action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Log archive layout details
    #[arg(long = "debug", global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compress a photo and its thumbnail into an archive
    Pack {
        /// Full-resolution photo
        #[arg(value_name = "IMAGE")]
        image: String,

        /// Thumbnail
        #[arg(value_name = "THUMBNAIL")]
        thumbnail: String,

        /// Archive to write
        #[arg(short = 'o', value_name = "ARCHIVE")]
        output: String,

        /// DEFLATE level (0-9)
        #[arg(long, default_value_t = crate::codec::DEFAULT_LEVEL, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: u32,
    },

    /// Extract the photo (or thumbnail) from an archive
    Extract {
        /// Archive to read
        #[arg(value_name = "ARCHIVE")]
        archive: String,

        /// Extract the thumbnail instead of the photo
        #[arg(short = 't', long)]
        thumbnail: bool,

        /// Extract into exdir
        #[arg(short = 'd', value_name = "DIR")]
        extract_dir: Option<String>,

        /// Extract to pipe, no messages
        #[arg(short = 'p')]
        pipe: bool,

        /// Never fall back to treating a non-archive file as a raw image
        #[arg(long)]
        strict: bool,
    },

    /// List archive members
    List {
        /// Archive to read
        #[arg(value_name = "ARCHIVE")]
        archive: String,

        /// List verbosely
        #[arg(short = 'v')]
        verbose: bool,
    },
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || matches!(self.command, Command::Extract { pipe: true, .. })
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// Log level implied by the flags.
    pub fn log_level(&self) -> LevelFilter {
        if self.is_very_quiet() {
            LevelFilter::Error
        } else if self.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        }
    }

    /// Archive options implied by the flags.
    pub fn archive_options(&self) -> ArchiveOptions {
        let mut options = ArchiveOptions::default();
        match &self.command {
            Command::Pack { level, .. } => options.compression_level = *level,
            Command::Extract { strict, .. } => options.raw_fallback = !strict,
            Command::List { .. } => {}
        }
        options
    }
}

/// Minimal logger writing `level: message` lines to stderr.
pub struct StderrLogger {
    level: LevelFilter,
}

impl StderrLogger {
    /// Install the logger as the global `log` backend.
    pub fn init(level: LevelFilter) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(Self { level }))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}: {}", record.level().as_str().to_lowercase(), record.args());
        }
    }

    fn flush(&self) {}
}
