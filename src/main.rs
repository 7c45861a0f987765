use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleetcheck::{
    asset::AssetRegistry,
    cache::Cache,
    classify::{Classifier, CveCache, Filter, NvdFeed},
    config::Config,
    descriptor::{self, Descriptor},
    event::{EventBuilder, ResultLine},
    inspector::SshInspector,
    keys::{GpgAgentKeyCache, KeyCache},
    model::ScanReport,
    output::{check_destination, print_reports, write_reports, OutputFormat},
    publish::{classify_and_publish, HttpPublisher, JsonLinesPublisher, Publisher},
    resolver::{CandidateResolver, MigResolver, Overrides},
    scan::{Dispatcher, RemoteScanWorker},
    transform::TransformRegistry,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Exit codes for scripting
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
}

#[derive(Parser)]
#[command(name = "fleetcheck")]
#[command(
    author,
    version,
    about = "Find files across a fleet, extract versions remotely and classify them"
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run check descriptors against the fleet
    Scan {
        /// Only run the descriptor with this name
        #[arg(short, long)]
        descriptor: Option<String>,

        /// Descriptor directory (overrides config)
        #[arg(long)]
        descriptors: Option<PathBuf>,

        /// Override the resolver target of every descriptor
        #[arg(long)]
        target: Option<String>,

        /// Override the resolver action expiry of every descriptor
        #[arg(long)]
        expiry: Option<String>,

        /// Override the search path of every descriptor
        #[arg(long)]
        path: Option<String>,

        /// Maximum number of concurrent remote searches
        #[arg(short, long)]
        workers: Option<usize>,

        /// Per-host deadline in seconds (0 disables it)
        #[arg(long)]
        timeout: Option<u64>,

        /// Output format (lines, json, table)
        #[arg(short, long, default_value = "lines")]
        format: String,

        /// Write output to file; with several checks in lines format, a
        /// directory receiving one `<check>.txt` per check
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Classify scan result lines and publish vulnerability events
    Classify {
        /// File holding result lines written by `scan`
        results: PathBuf,

        /// Check name the results belong to
        #[arg(short, long)]
        check: String,

        /// Classification filter file
        #[arg(short, long)]
        filter: PathBuf,

        /// Asset id file (overrides config)
        #[arg(long)]
        asset_file: Option<PathBuf>,

        /// Event intake URL (overrides config)
        #[arg(long)]
        publish: Option<String>,

        /// Score drafts from the CVE feed
        #[arg(long, conflicts_with = "no_cve_feed")]
        cve_feed: bool,

        /// Never query the CVE feed
        #[arg(long)]
        no_cve_feed: bool,

        /// Event source name (overrides config)
        #[arg(long)]
        source_name: Option<String>,
    },

    /// List available output transforms
    Transforms,

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Clear the CVE record cache
    ClearCache,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<u8> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan {
            descriptor,
            descriptors,
            target,
            expiry,
            path,
            workers,
            timeout,
            format,
            output,
        } => {
            let format = OutputFormat::from_str(&format).map_err(|e| anyhow::anyhow!(e))?;
            let options = ScanOptions {
                only: descriptor,
                descriptors: descriptors.unwrap_or_else(|| config.descriptors.clone()),
                overrides: Overrides {
                    target,
                    expiry,
                    path,
                },
                workers: workers.unwrap_or(config.ssh.workers),
                timeout_secs: timeout.unwrap_or(config.ssh.timeout_secs),
                format,
                output,
            };
            run_scan(&config, options).await
        }
        Commands::Classify {
            results,
            check,
            filter,
            asset_file,
            publish,
            cve_feed,
            no_cve_feed,
            source_name,
        } => {
            let options = ClassifyOptions {
                results,
                check,
                filter,
                asset_file: asset_file.unwrap_or_else(|| config.classify.asset_file.clone()),
                publish_url: publish.or_else(|| config.classify.publish_url.clone()),
                use_feed: (config.feed.enabled || cve_feed) && !no_cve_feed,
                source_name: source_name.unwrap_or_else(|| config.classify.source_name.clone()),
            };
            run_classify(&config, options).await
        }
        Commands::Transforms => {
            println!("Available transforms:");
            for name in TransformRegistry::builtin().names() {
                println!("  {}", name);
            }
            Ok(exit_codes::SUCCESS)
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
        Commands::ClearCache => {
            let cache = Cache::with_ttl_hours(config.feed.cache_ttl_hours);
            cache.clear()?;
            println!("Cache cleared.");
            Ok(exit_codes::SUCCESS)
        }
    }
}

struct ScanOptions {
    only: Option<String>,
    descriptors: PathBuf,
    overrides: Overrides,
    workers: usize,
    timeout_secs: u64,
    format: OutputFormat,
    output: Option<PathBuf>,
}

async fn run_scan(config: &Config, options: ScanOptions) -> Result<u8> {
    let registry = TransformRegistry::builtin();
    let mut descriptors = descriptor::load_dir(&options.descriptors, &registry)?;
    if let Some(only) = &options.only {
        descriptors.retain(|d| &d.name == only);
        if descriptors.is_empty() {
            anyhow::bail!("no descriptor named {}", only);
        }
    }
    if descriptors.is_empty() {
        anyhow::bail!("no descriptors found in {}", options.descriptors.display());
    }
    info!(count = descriptors.len(), "descriptors loaded");
    check_destination(options.format, descriptors.len(), options.output.as_deref())?;

    if let Some(key_id) = &config.resolver.key_id {
        GpgAgentKeyCache::default()
            .ensure_cached(key_id, config.resolver.gpg_home.as_deref())
            .await?;
    }

    let resolver = MigResolver::new(config.resolver.binary.clone());
    let inspector = Arc::new(SshInspector::new(
        config.ssh.binary.clone(),
        config.ssh.args.clone(),
    ));

    let mut reports = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let report = scan_descriptor(
            descriptor,
            &resolver,
            Arc::clone(&inspector),
            &options,
        )
        .await?;
        reports.push(report);
    }

    match &options.output {
        Some(path) => {
            let written = write_reports(&reports, options.format, path)?;
            if options.format == OutputFormat::Table {
                for file in written {
                    println!("Results written to: {}", file.display());
                }
            }
        }
        None => print_reports(&reports, options.format)?,
    }

    Ok(exit_codes::SUCCESS)
}

async fn scan_descriptor(
    descriptor: Descriptor,
    resolver: &dyn CandidateResolver,
    inspector: Arc<SshInspector>,
    options: &ScanOptions,
) -> Result<ScanReport> {
    info!(check = %descriptor.name, "running check");
    let criteria = descriptor.criteria.with_overrides(&options.overrides);
    let candidates = resolver.resolve(&criteria).await?;

    let mut worker = RemoteScanWorker::new(inspector, descriptor.search);
    if options.timeout_secs > 0 {
        worker = worker.with_timeout(Duration::from_secs(options.timeout_secs));
    }

    let mut dispatcher = Dispatcher::new(options.workers).with_trim(descriptor.trim);
    let progress = if options.format == OutputFormat::Table {
        let pb = ProgressBar::new(candidates.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        pb.set_message(format!("Scanning {}...", descriptor.name));
        pb.enable_steady_tick(Duration::from_millis(100));
        dispatcher = dispatcher.with_progress(pb.clone());
        Some(pb)
    } else {
        None
    };

    let results = dispatcher.run(candidates, Arc::new(worker)).await?;

    if let Some(pb) = progress {
        pb.finish_with_message(format!("Scanned {} candidates", results.len()));
    }

    let report = ScanReport::new(descriptor.name, results);
    info!(
        check = %report.check,
        results = report.results.len(),
        failed = report.failed(),
        "check complete"
    );
    Ok(report)
}

struct ClassifyOptions {
    results: PathBuf,
    check: String,
    filter: PathBuf,
    asset_file: PathBuf,
    publish_url: Option<String>,
    use_feed: bool,
    source_name: String,
}

async fn run_classify(config: &Config, options: ClassifyOptions) -> Result<u8> {
    let filter = Filter::load(&options.filter)?;
    info!(
        filter = filter.name(),
        last_updated = %filter.last_updated(),
        "filter loaded"
    );

    let feed = if options.use_feed {
        let mut nvd = NvdFeed::new(config.feed.url.clone());
        if let Some(key) = &config.feed.api_key {
            nvd = nvd.with_api_key(key.clone());
        }
        let mut cache = CveCache::new(Box::new(nvd));
        if config.feed.cache_ttl_hours > 0 {
            cache = cache.with_disk_cache(Cache::with_ttl_hours(config.feed.cache_ttl_hours));
        }
        Some(cache)
    } else {
        None
    };

    let mut classifier = Classifier::new(&filter);
    if let Some(feed) = &feed {
        classifier = classifier.with_feed(feed);
    }

    let publisher: Box<dyn Publisher> = match &options.publish_url {
        Some(url) => Box::new(HttpPublisher::new(url.clone())),
        None => Box::new(JsonLinesPublisher::stdout()),
    };

    let assets = AssetRegistry::new(&options.asset_file);
    let builder = EventBuilder::new(&options.check, &options.source_name, &assets);

    let events = read_result_lines(&options.results)?
        .iter()
        .map(|line| builder.build(line))
        .collect::<Result<Vec<_>, _>>()?;

    classify_and_publish(events, &classifier, publisher.as_ref()).await?;
    Ok(exit_codes::SUCCESS)
}

/// Reads result lines, skipping error and malformed lines with a warning.
fn read_result_lines(path: &Path) -> Result<Vec<ResultLine>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut lines = Vec::new();
    for raw in content.lines().filter(|l| !l.trim().is_empty()) {
        match ResultLine::parse(raw) {
            Ok(line) if line.ok => lines.push(line),
            Ok(line) => warn!(host = %line.host, error = %line.detail, "skipping failed result"),
            Err(e) => warn!("skipping result line: {}", e),
        }
    }
    Ok(lines)
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let config = Config::default();
        config.save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'fleetcheck config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}
