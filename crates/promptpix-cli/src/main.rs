mod page;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use promptpix_contracts::{derive_cache_key, ErrorDisplay, TagAttributes};
use promptpix_engine::{
    AdapterRegistry, Component, ComponentDirectory, ComponentState, CorsMode, EngineConfig,
    EnvKeyResolver, ExecutionCore, FileLayer, KeyStore, LocalLayer, MemoryLayer, ThemeScope,
};
use tracing_subscriber::{fmt, EnvFilter};

use crate::page::{Page, PageSection};

#[derive(Debug, Parser)]
#[command(name = "promptpix", version, about = "Render declarative AI image tags")]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct EngineArgs {
    /// JSON engine configuration; environment variables and flags override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// JSON file backing the local cache layer. In-memory when omitted.
    #[arg(long, global = true)]
    cache_file: Option<PathBuf>,
    #[arg(long, global = true)]
    relay: Option<String>,
    #[arg(long, global = true)]
    no_remote_cache: bool,
    #[arg(long, global = true)]
    verbose: bool,
    /// Credential for one provider; repeatable. Environment variables are the fallback.
    #[arg(long = "api-key", global = true, value_name = "PROVIDER=KEY")]
    api_keys: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render a single tag and print its image URL.
    Render(TagArgs),
    /// Render every tag of a JSON page description.
    Page(PageArgs),
    /// Report which providers have a usable credential.
    Key(KeyArgs),
    /// Print a tag's cache key and whether it is cached.
    Lookup(TagArgs),
    /// Drop a tag's cached image.
    Invalidate(TagArgs),
    Providers,
}

#[derive(Debug, Args)]
struct TagArgs {
    #[arg(long)]
    id: Option<String>,
    #[arg(long)]
    provider: String,
    #[arg(long)]
    operation: Option<String>,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long = "ref")]
    img_ref: Option<String>,
    #[arg(long)]
    aspect: Option<String>,
    #[arg(long)]
    style: Option<String>,
    #[arg(long)]
    quality: Option<String>,
    #[arg(long)]
    format: Option<String>,
    #[arg(long)]
    negative_prompt: Option<String>,
    #[arg(long)]
    seed: Option<String>,
    /// Raw provider parameters as a JSON object.
    #[arg(long)]
    params: Option<String>,
    #[arg(long)]
    theme: Option<String>,
}

impl TagArgs {
    fn attributes(&self) -> TagAttributes {
        TagAttributes {
            id: self.id.clone(),
            provider: Some(self.provider.clone()),
            operation: self.operation.clone(),
            prompt: self.prompt.clone(),
            img_ref: self.img_ref.clone(),
            aspect: self.aspect.clone(),
            style: self.style.clone(),
            quality: self.quality.clone(),
            format: self.format.clone(),
            negative_prompt: self.negative_prompt.clone(),
            seed: self.seed.clone(),
            params: self.params.clone(),
        }
    }

    fn theme(&self) -> Option<&str> {
        self.theme
            .as_deref()
            .filter(|theme| !theme.trim().is_empty())
    }
}

#[derive(Debug, Args)]
struct PageArgs {
    file: PathBuf,
}

#[derive(Debug, Args)]
struct KeyArgs {
    /// Providers to check; every registered provider when empty.
    providers: Vec<String>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("promptpix error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.engine.verbose);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(dispatch(cli))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<i32> {
    let keys = key_store(&cli.engine.api_keys)?;
    let core = build_core(&cli.engine, keys.clone())?;
    match cli.command {
        Command::Render(args) => render(&core, &args).await,
        Command::Page(args) => render_page(&core, &args).await,
        Command::Key(args) => Ok(report_keys(&core, &keys, &args)),
        Command::Lookup(args) => lookup(&core, &args).await,
        Command::Invalidate(args) => invalidate(&core, &args).await,
        Command::Providers => {
            list_providers(core.registry());
            Ok(0)
        }
    }
}

fn load_config(args: &EngineArgs) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str::<EngineConfig>(&raw)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    config.apply_env();
    if let Some(relay) = &args.relay {
        config.relay_url = Some(relay.clone());
    }
    if args.no_remote_cache {
        config.remote_cache = false;
    }
    if args.verbose {
        config.verbose = true;
    }
    Ok(config)
}

fn key_store(entries: &[String]) -> Result<KeyStore> {
    let keys = KeyStore::new().with_fallback(Arc::new(EnvKeyResolver));
    for entry in entries {
        let Some((provider, key)) = entry.split_once('=') else {
            bail!("--api-key expects PROVIDER=KEY");
        };
        if provider.trim().is_empty() || key.trim().is_empty() {
            bail!("--api-key expects a non-empty provider and key");
        }
        keys.save_key(provider, key);
    }
    Ok(keys)
}

fn build_core(args: &EngineArgs, keys: KeyStore) -> Result<ExecutionCore> {
    let config = load_config(args)?;
    let local: Arc<dyn LocalLayer> = match &args.cache_file {
        Some(path) => Arc::new(FileLayer::new(path)),
        None => Arc::new(MemoryLayer::new()),
    };
    Ok(ExecutionCore::builder(AdapterRegistry::with_defaults())
        .config(config)
        .keys(Arc::new(keys))
        .local_layer(local)
        .build())
}

async fn render(core: &ExecutionCore, args: &TagArgs) -> Result<i32> {
    let theme = ThemeScope::root();
    theme.set_prompt(args.theme().map(str::to_string));
    let component = Component::mount(
        core.clone(),
        ComponentDirectory::new(),
        theme,
        args.attributes(),
    );
    let state = component.wait_settled().await;
    match (&state.image, state.error_display()) {
        (Some(url), None) => {
            println!("{url}");
            Ok(0)
        }
        (_, display) => {
            print_failure(component.id(), display.as_ref());
            Ok(1)
        }
    }
}

async fn render_page(core: &ExecutionCore, args: &PageArgs) -> Result<i32> {
    let section = PageSection::load(&args.file)?;
    if section.tag_count() == 0 {
        bail!("page {} contains no tags", args.file.display());
    }
    let page = Page::mount(core, &section);
    tracing::info!(tags = page.components().len(), "rendering page");
    let mut failures = 0;
    for (id, state) in page.settle().await {
        if !print_state(&id, &state) {
            failures += 1;
        }
    }
    Ok(if failures == 0 { 0 } else { 1 })
}

fn print_state(id: &str, state: &ComponentState) -> bool {
    match (&state.image, state.error_display()) {
        (Some(url), None) => {
            println!("{id}\t{url}");
            true
        }
        (_, display) => {
            print_failure(id, display.as_ref());
            false
        }
    }
}

fn print_failure(id: &str, display: Option<&ErrorDisplay>) {
    match display {
        Some(display) => {
            eprintln!("{id}: {}: {}", display.title, display.detail);
            eprintln!("  hint: {}", display.hint);
        }
        None => eprintln!("{id}: no image produced"),
    }
}

fn report_keys(core: &ExecutionCore, keys: &KeyStore, args: &KeyArgs) -> i32 {
    let providers = if args.providers.is_empty() {
        core.registry().names()
    } else {
        args.providers.clone()
    };
    let mut missing = 0;
    for provider in providers {
        let source = if keys.has_saved_key(&provider) {
            "flag"
        } else if EnvKeyResolver::lookup(&provider).is_some() {
            "environment"
        } else {
            missing += 1;
            "missing"
        };
        println!("{provider}\t{source}");
    }
    if missing == 0 {
        0
    } else {
        1
    }
}

async fn lookup(core: &ExecutionCore, args: &TagArgs) -> Result<i32> {
    let key = cache_key(args);
    match core.lookup(&key).await {
        Some(hit) => {
            let age = hit
                .age_ms
                .map(|age| format!("{}s", age / 1000))
                .unwrap_or_else(|| "unknown age".to_string());
            println!("{key}\thit\t{}\t{age}", hit.url);
            Ok(0)
        }
        None => {
            println!("{key}\tmiss");
            Ok(1)
        }
    }
}

async fn invalidate(core: &ExecutionCore, args: &TagArgs) -> Result<i32> {
    let key = cache_key(args);
    core.invalidate(&key).await;
    println!("{key}\tinvalidated");
    Ok(0)
}

/// Element references are keyed by their literal here; no anchor is mounted.
fn cache_key(args: &TagArgs) -> String {
    derive_cache_key(&args.attributes(), args.theme(), None)
}

fn list_providers(registry: &AdapterRegistry) {
    for adapter in registry.iter() {
        let operations: Vec<&str> = adapter
            .supported_operations()
            .iter()
            .map(|operation| operation.as_str())
            .collect();
        let mode = match adapter.cors_mode() {
            CorsMode::Direct => "direct",
            CorsMode::Relay => "relay",
        };
        println!(
            "{}\t{}\t{}\t{}",
            adapter.id(),
            adapter.display_name(),
            mode,
            operations.join(",")
        );
    }
}
