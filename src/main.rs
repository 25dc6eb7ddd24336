//! data CLI - Command line interface for datadex
//!
//! Moves dataset blobs between the files of a dataset and a blobstore.

use clap::{Args, Parser, Subcommand};
use datadex::{
    hash_file, Backend, BlobTransferEngine, Config, DatasetIndex, Handle, HashCache, Manifest,
    ScanOptions, TransferEvent, TransferObserver, TransferOptions,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "data")]
#[command(about = "Manage dataset blobs in local and remote blobstores")]
#[command(version)]
struct Cli {
    /// Dataset directory
    #[arg(short = 'C', long = "dir", default_value = ".")]
    dir: PathBuf,

    /// Output format (json or text)
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Use the remote blobstore instead of the local one
    #[arg(long)]
    remote: bool,

    /// Remote blobstore URL (implies --remote)
    #[arg(long)]
    url: Option<String>,

    /// Verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage blobs in the blobstore
    #[command(subcommand)]
    Blob(BlobCommands),

    /// List tracked files and their hashes
    Manifest {
        /// Persist the manifest to Manifest.json
        #[arg(long)]
        write: bool,
    },

    /// Compute the hash of files
    Hash {
        /// Files to hash
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Validate a dataset handle (author/name[.format][@tag])
    Handle {
        /// The handle to parse
        handle: String,
    },
}

#[derive(Args)]
struct HashArgs {
    /// Blob hashes
    hashes: Vec<String>,

    /// All blobs in the manifest
    #[arg(long)]
    all: bool,
}

#[derive(Subcommand)]
enum BlobCommands {
    /// Upload blobs to the blobstore
    Put(HashArgs),

    /// Download blobs from the blobstore
    Get {
        #[command(flatten)]
        args: HashArgs,

        /// Verify downloaded content against its hash
        #[arg(long)]
        verify: bool,
    },

    /// Verify blob contents in the blobstore match their hash
    Check(HashArgs),

    /// Output blob contents
    Show {
        /// Blob hash
        hash: String,
    },
}

/// Prints one line per blob step, like `put blob 2aae6c3 data/file.csv`
struct CliObserver {
    format: OutputFormat,
}

impl TransferObserver for CliObserver {
    fn on_event(&mut self, event: &TransferEvent<'_>) {
        match self.format {
            OutputFormat::Json => {
                if let Ok(line) = serde_json::to_string(event) {
                    println!("{}", line);
                }
            }
            OutputFormat::Text => {
                let verb = match event.op {
                    datadex::Operation::Copy => "get",
                    op => op.as_str(),
                };
                match event.path {
                    Some(path) => println!("{} blob {} {}", verb, event.hash.short(), path.display()),
                    None => println!("{} blob {}", verb, event.hash.short()),
                }
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load(&cli.dir)?;
    if let Some(url) = &cli.url {
        config.remote_url = url.clone();
    }
    let backend = if cli.remote || cli.url.is_some() {
        Backend::Remote
    } else {
        Backend::Local
    };

    match cli.command {
        Commands::Blob(BlobCommands::Put(args)) => {
            let manifest = scan_manifest(&cli.dir, &config)?;
            let index = DatasetIndex::open(&cli.dir, &config, backend)?;
            let report = BlobTransferEngine::new(&index, &manifest)
                .with_observer(CliObserver { format: cli.format })
                .put(batch(args, &manifest))?;
            summary(&cli.format, "put", index.name(), report.blobs.len(), report.files);
        }

        Commands::Blob(BlobCommands::Get { args, verify }) => {
            let manifest = open_manifest(&cli.dir, &config)?;
            let index = DatasetIndex::open(&cli.dir, &config, backend)?;
            let report = BlobTransferEngine::new(&index, &manifest)
                .with_options(TransferOptions { verify })
                .with_observer(CliObserver { format: cli.format })
                .get(batch(args, &manifest))?;
            summary(&cli.format, "get", index.name(), report.blobs.len(), report.files);
        }

        Commands::Blob(BlobCommands::Check(args)) => {
            let index = DatasetIndex::open(&cli.dir, &config, backend)?;
            let hashes = if args.all {
                batch(args, &open_manifest(&cli.dir, &config)?)
            } else {
                args.hashes
            };
            let report = BlobTransferEngine::without_manifest(&index)
                .with_observer(CliObserver { format: cli.format })
                .check(hashes)?;
            summary(&cli.format, "check", index.name(), report.blobs.len(), 0);
        }

        Commands::Blob(BlobCommands::Show { hash }) => {
            let hash = datadex::Hash::parse(&hash)?;
            let index = DatasetIndex::open(&cli.dir, &config, backend)?;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            index.show_blob(&hash, &mut out)?;
            out.flush()?;
        }

        Commands::Manifest { write } => {
            let manifest = scan_manifest(&cli.dir, &config)?;
            if write {
                manifest.save()?;
            }
            match cli.format {
                OutputFormat::Json => {
                    let files: serde_json::Map<String, serde_json::Value> = manifest
                        .entries()
                        .iter()
                        .map(|(p, h)| (p.display().to_string(), h.to_hex().into()))
                        .collect();
                    output(
                        &cli.format,
                        &serde_json::json!({
                            "status": "ok",
                            "written": write,
                            "files": files
                        }),
                    );
                }
                OutputFormat::Text => {
                    for (path, hash) in manifest.entries() {
                        println!("{} {}", hash, path.display());
                    }
                }
            }
        }

        Commands::Hash { files } => {
            for file in files {
                let hash = hash_file(&file)?;
                match cli.format {
                    OutputFormat::Json => output(
                        &cli.format,
                        &serde_json::json!({
                            "path": file.display().to_string(),
                            "hash": hash.to_hex()
                        }),
                    ),
                    OutputFormat::Text => println!("{} {}", hash, file.display()),
                }
            }
        }

        Commands::Handle { handle } => {
            let parsed = Handle::parse(&handle)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "handle": parsed.to_string(),
                    "author": parsed.author,
                    "name": parsed.name,
                    "format": parsed.format,
                    "tag": parsed.tag
                }),
            );
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Explicit hashes, plus every manifest hash when `--all` is given
fn batch(args: HashArgs, manifest: &Manifest) -> Vec<String> {
    let mut hashes = args.hashes;
    if args.all {
        hashes.extend(manifest.all_hashes().iter().map(|h| h.to_hex()));
    }
    hashes
}

/// Fresh manifest from the files on disk
fn scan_manifest(dir: &Path, config: &Config) -> anyhow::Result<Manifest> {
    with_scan_options(dir, config, |options| Manifest::scan_with_options(dir, options))
}

/// Persisted manifest when present (files may be missing locally),
/// otherwise a fresh scan
fn open_manifest(dir: &Path, config: &Config) -> anyhow::Result<Manifest> {
    with_scan_options(dir, config, |options| Manifest::open_with_options(dir, options))
}

/// Build a manifest with the scan settings from `config`: the local store
/// is never tracked, and the hash cache is used when enabled
fn with_scan_options<F>(dir: &Path, config: &Config, build: F) -> anyhow::Result<Manifest>
where
    F: FnOnce(ScanOptions<'_>) -> datadex::Result<Manifest>,
{
    let exclude = config.local_store_path(dir).ok().into_iter().collect();
    if !config.hash_cache {
        return Ok(build(ScanOptions {
            exclude,
            cache: None,
        })?);
    }

    let mut cache = HashCache::for_dataset(dir);
    let manifest = build(ScanOptions {
        exclude,
        cache: Some(&mut cache),
    })?;
    // a loaded Manifest.json never consults the cache; saving would empty it
    if cache.hits() + cache.misses() > 0 {
        cache.save()?;
    }
    Ok(manifest)
}

fn summary(format: &OutputFormat, op: &str, store: &str, blobs: usize, files: usize) {
    match format {
        OutputFormat::Json => output(
            format,
            &serde_json::json!({
                "status": "ok",
                "op": op,
                "store": store,
                "blobs": blobs,
                "files": files
            }),
        ),
        OutputFormat::Text => eprintln!("{}: {} blob(s), {} file(s) via {}", op, blobs, files, store),
    }
}

fn output(format: &OutputFormat, value: &serde_json::Value) {
    match format {
        OutputFormat::Json => {
            println!("{}", value);
        }
        OutputFormat::Text => {
            println!(
                "{}",
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            );
        }
    }
}
