use clap::{Parser, Subcommand};
use photo_derive::config;
use photo_derive::event::StorageEvent;
use photo_derive::imaging::RustBackend;
use photo_derive::output;
use photo_derive::pipeline::{self, InvocationReport};
use photo_derive::storage::FsObjectStore;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error>;

#[derive(Parser)]
#[command(name = "photo-derive")]
#[command(about = "Derive web-ready image variants from uploaded photos")]
#[command(long_about = "\
Derive web-ready image variants from uploaded photos

Every upload at <bucket>/<folder>/<file> becomes, in the destination bucket:

  <folder>/
  ├── orig.jpeg            # auto-oriented, metadata stripped
  ├── 1200.jpeg            # one per box × format, fitted into the box
  ├── 1200.webp
  ├── ...
  └── thumbnail.jpeg       # square centre crop

Deleting the upload removes the folder again.

Buckets are directories under --storage-root. Settings come from the config
file, then environment variables (DIMENSIONS, FORMATS, THUMB_SIZE, QUALITY,
DESTINATION_BUCKET, MAX_KEYS, STORAGE_ROOT), then flags.

Exit status: 0 success, 1 error, 2 some variants failed.

Run 'photo-derive gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    /// Config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding one sub-directory per bucket
    #[arg(long, global = true)]
    storage_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Derive variants from a local file into a local directory
    Derive {
        /// Source image
        #[arg(long)]
        input: PathBuf,
        /// Output directory
        #[arg(long)]
        output: PathBuf,
        /// Boxes as label:width,height;label:width,height
        #[arg(long)]
        dims: Option<String>,
        /// Comma separated output formats, e.g. "jpeg,webp,png"
        #[arg(long)]
        formats: Option<String>,
        /// Thumbnail edge in pixels
        #[arg(long)]
        thumb_size: Option<u32>,
        /// Write a JSON report here
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Handle an upload notification (JSON from --event or stdin)
    HandleUpload {
        #[arg(long)]
        event: Option<PathBuf>,
    },
    /// Handle a deletion notification (JSON from --event or stdin)
    HandleDelete {
        #[arg(long)]
        event: Option<PathBuf>,
    },
    /// Delete every derived object below a prefix
    Cleanup {
        /// Destination bucket
        #[arg(long)]
        dest: String,
        /// Folder to empty, e.g. media/images/tags/bread
        #[arg(long)]
        prefix: String,
        /// Maximum keys to list
        #[arg(long)]
        max_keys: Option<usize>,
    },
    /// Print detected format, dimensions and embedded metadata
    Inspect { file: PathBuf },
    /// Print a stock config file with all options documented
    GenConfig,
}

enum Outcome {
    Success,
    Partial,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(Outcome::Success) => ExitCode::SUCCESS,
        Ok(Outcome::Partial) => ExitCode::from(2),
        Err(err) => {
            eprintln!("Error: {}", error_chain(err.as_ref()));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<Outcome, BoxError> {
    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(Outcome::Success);
    }

    let config = config::load_config(cli.config.as_deref(), &flag_overrides(&cli))?;
    init_thread_pool(&config.processing);
    let backend = RustBackend::new();

    match cli.command {
        Command::Derive {
            input,
            output: out_dir,
            report,
            ..
        } => {
            let result = pipeline::derive_local(&backend, &config, &input, &out_dir)?;
            output::print_derivation(&result);
            if let Some(path) = report {
                std::fs::write(&path, serde_json::to_string_pretty(&result)?)?;
            }
            Ok(outcome(std::slice::from_ref(&result)))
        }
        Command::HandleUpload { event } => {
            let event = read_event(event.as_deref())?;
            let store = FsObjectStore::new(&config.storage.root);
            let reports = pipeline::handle_upload(&store, &backend, &config, &event)?;
            for report in &reports {
                output::print_derivation(report);
            }
            Ok(outcome(&reports))
        }
        Command::HandleDelete { event } => {
            let event = read_event(event.as_deref())?;
            let store = FsObjectStore::new(&config.storage.root);
            for report in pipeline::handle_delete(&store, &config, &event)? {
                output::print_cleanup(&report);
            }
            Ok(Outcome::Success)
        }
        Command::Cleanup {
            dest,
            prefix,
            max_keys,
        } => {
            let store = FsObjectStore::new(&config.storage.root);
            let max_keys = max_keys.unwrap_or(config.storage.max_keys);
            let report = pipeline::delete_derived(&store, &dest, &prefix, None, max_keys)?;
            output::print_cleanup(&report);
            Ok(Outcome::Success)
        }
        Command::Inspect { file } => {
            let bytes = std::fs::read(&file)?;
            let info = pipeline::inspect(&backend, &bytes)?;
            output::print_inspection(&file.display().to_string(), &info);
            Ok(Outcome::Success)
        }
        Command::GenConfig => Ok(Outcome::Success),
    }
}

/// The flags that take part in config layering.
fn flag_overrides(cli: &Cli) -> config::FlagOverrides {
    let mut flags = config::FlagOverrides {
        storage_root: cli.storage_root.clone(),
        ..Default::default()
    };
    if let Command::Derive {
        dims,
        formats,
        thumb_size,
        ..
    } = &cli.command
    {
        flags.dimensions = dims.clone();
        flags.formats = formats.clone();
        flags.thumb_size = *thumb_size;
    }
    flags
}

fn outcome(reports: &[InvocationReport]) -> Outcome {
    if reports.iter().all(|r| r.status.is_success()) {
        Outcome::Success
    } else {
        Outcome::Partial
    }
}

/// Read an event from a file, or from stdin when no file is given.
fn read_event(path: Option<&Path>) -> Result<StorageEvent, BoxError> {
    let json = match path {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    Ok(StorageEvent::from_json(&json)?)
}

/// `outer: inner: innermost`, skipping sources already in the message.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; config can lower it, never raise it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
