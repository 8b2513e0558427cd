use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use image::Rgba;
use pdf_engine::{LopdfEngine, PdfEngine};
use pdfview_cache::{CacheConfig, DocumentCache, PdfSource};
use pdfview_core::{open_document, PdfView, SessionState, SharedEngine, ViewerConfig, ViewerError, ViewerEvent};
use pdfview_scheduler::InlineExecutor;
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use viewer_core::Point;

const BACKDROP: Rgba<u8> = Rgba([128, 128, 128, 255]);

/// Upper bound on pump rounds while waiting for inline work to settle.
const MAX_SETTLE_ROUNDS: usize = 64;

#[derive(Debug, Parser)]
#[command(name = "pdfview")]
#[command(about = "Tiled PDF viewer core")]
pub struct Cli {
    /// Viewer settings (TOML).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Cache settings (TOML). `PDFVIEW_*` variables override it.
    #[arg(long, global = true, value_name = "FILE")]
    cache_config: Option<PathBuf>,
    /// Cache directory, overriding every other setting.
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
    /// More log output; repeat for more.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable document metadata.
    Info {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        password: Option<String>,
    },
    /// Render one viewport of a page to PNG.
    Render {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        password: Option<String>,
        /// 1-based page number.
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 800.0)]
        width: f32,
        #[arg(long, default_value_t = 1000.0)]
        height: f32,
        /// Zoom relative to fit, applied around the viewport centre.
        #[arg(long, default_value_t = 1.0)]
        zoom: f32,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Print viewer events as JSON lines.
        #[arg(long)]
        events: bool,
    },
    /// Inspect or maintain the download cache.
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Subcommand)]
enum CacheCommand {
    /// Download a remote source if needed and print its local path.
    Resolve {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Remove the cached copy of a source.
    Clear {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Remove every cached document.
    ClearAll,
    /// Print the total size of cached documents in bytes.
    Size,
    /// Remove interrupted downloads older than the given age.
    Sweep {
        #[arg(long, default_value_t = 3600)]
        older_than_secs: u64,
    },
    /// Print the effective cache configuration.
    Config,
}

#[derive(Debug, Args)]
struct SourceArgs {
    /// Local path, `file://` URI or http(s) URL.
    #[arg(value_name = "SOURCE")]
    uri: String,
    /// Always download, ignoring any cached copy.
    #[arg(long)]
    no_cache: bool,
    #[arg(long, value_name = "NAME")]
    cache_file_name: Option<String>,
    /// Seconds a cached copy stays fresh; 0 never expires.
    #[arg(long, value_name = "SECS")]
    expiration: Option<u64>,
    #[arg(long, default_value = "GET")]
    method: String,
    /// Request header as `Name: value`. Repeatable.
    #[arg(long = "header", value_name = "HEADER", value_parser = parse_header)]
    headers: Vec<(String, String)>,
}

impl SourceArgs {
    fn to_source(&self) -> PdfSource {
        let mut source =
            PdfSource::new(self.uri.clone()).with_cache(!self.no_cache).with_method(self.method.clone());
        if let Some(name) = &self.cache_file_name {
            source = source.with_cache_file_name(name.clone());
        }
        if let Some(seconds) = self.expiration {
            source = source.with_expiration(seconds);
        }
        for (name, value) in &self.headers {
            source = source.with_header(name.clone(), value.clone());
        }
        source
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) =
        raw.split_once(':').ok_or_else(|| format!("expected `Name: value`, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name is empty in `{raw}`"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    source: String,
    path: String,
    page_count: u32,
    encrypted: bool,
    pages: Vec<PageOutput>,
}

#[derive(Debug, Serialize)]
struct PageOutput {
    index: u32,
    width_pt: f32,
    height_pt: f32,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Info { source, password } => run_info(&cli, source, password.as_deref()),
        Commands::Render { source, password, page, width, height, zoom, output, events } => {
            let options = RenderOptions {
                page: *page,
                width: *width,
                height: *height,
                zoom: *zoom,
                output: output.as_deref(),
                events: *events,
            };
            run_render(&cli, source, password.as_deref(), options)
        }
        Commands::Cache { action } => run_cache(&cli, action),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // A second `run` in the same process keeps the first logger.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init();
}

fn viewer_config(cli: &Cli) -> Result<ViewerConfig> {
    match &cli.config {
        Some(path) => ViewerConfig::from_file(path)
            .with_context(|| format!("failed to load viewer config {}", path.display())),
        None => Ok(ViewerConfig::default()),
    }
}

fn cache_config(cli: &Cli) -> Result<CacheConfig> {
    let mut config = match &cli.cache_config {
        Some(path) => CacheConfig::from_file(path)
            .with_context(|| format!("failed to load cache config {}", path.display()))?
            .apply_env()?,
        None => CacheConfig::from_env()?,
    };
    if let Some(dir) = &cli.cache_dir {
        config = config.with_cache_dir(dir);
    }
    Ok(config)
}

fn run_info(cli: &Cli, args: &SourceArgs, password: Option<&str>) -> Result<()> {
    let config = viewer_config(cli)?;
    let cache = DocumentCache::new(cache_config(cli)?);
    let source = args.to_source();
    if source.is_empty() {
        return Err(ViewerError::EmptySource.into());
    }

    let path = cache.resolve(&source).map_err(ViewerError::from)?;

    let engine = Arc::new(LopdfEngine::new());
    let shared: SharedEngine = engine.clone();
    let mut encrypted = false;
    let opened = open_document(&shared, &path, password, &config.temp_dir(), &mut || {
        encrypted = true;
    })?;

    let pages = (0..opened.page_count)
        .map(|index| {
            let size = engine.page_size(opened.handle, index)?;
            Ok(PageOutput { index, width_pt: size.width_pt, height_pt: size.height_pt })
        })
        .collect::<Result<Vec<_>>>()?;
    engine.close(opened.handle)?;

    let payload = InfoOutput {
        source: source.uri.clone(),
        path: path.display().to_string(),
        page_count: opened.page_count,
        encrypted,
        pages,
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);

    Ok(())
}

struct RenderOptions<'a> {
    page: u32,
    width: f32,
    height: f32,
    zoom: f32,
    output: Option<&'a Path>,
    events: bool,
}

fn run_render(
    cli: &Cli,
    args: &SourceArgs,
    password: Option<&str>,
    options: RenderOptions<'_>,
) -> Result<()> {
    if options.page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }
    if !(options.width > 0.0 && options.height > 0.0) {
        anyhow::bail!("--width and --height must be positive");
    }

    let config = viewer_config(cli)?;
    let cache = Arc::new(DocumentCache::new(cache_config(cli)?));
    let engine: SharedEngine = Arc::new(LopdfEngine::new());
    let mut view = PdfView::new(config, engine, cache, Arc::new(InlineExecutor));

    view.set_viewport_size(options.width, options.height);
    view.set_page(options.page - 1);
    if let Some(password) = password {
        view.set_password(password);
    }
    let source = args.to_source();
    view.set_source(source.clone());
    settle(&mut view);

    if options.zoom != 1.0 {
        let centre = Point::new(options.width / 2.0, options.height / 2.0);
        view.pinch(centre, options.zoom);
        settle(&mut view);
    }

    let events = view.drain_events();
    if options.events {
        for event in &events {
            println!("{}", serde_json::to_string(event)?);
        }
    }

    if let SessionState::Failed(kind) = view.state() {
        let message = events
            .iter()
            .rev()
            .find_map(|event| match event {
                ViewerEvent::Error { message } => Some(message.clone()),
                _ => None,
            })
            .unwrap_or_else(|| format!("{kind:?}"));
        anyhow::bail!(message);
    }

    let image = view.snapshot(BACKDROP).context("nothing to render")?;
    let page = view.current_page().map_or(options.page, |index| index + 1);
    let output = options
        .output
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| default_render_output(&source, page));

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    image
        .save(&output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    if !options.events {
        println!("{}", output.display());
    }
    view.close();

    Ok(())
}

/// Applies completions until no more arrive. With an inline executor every
/// task has finished by the time it was spawned.
fn settle(view: &mut PdfView) {
    for _ in 0..MAX_SETTLE_ROUNDS {
        if !view.pump() {
            return;
        }
    }
    log::warn!("view still busy after {MAX_SETTLE_ROUNDS} rounds");
}

fn run_cache(cli: &Cli, action: &CacheCommand) -> Result<()> {
    let cache = DocumentCache::new(cache_config(cli)?);

    match action {
        CacheCommand::Resolve { source } => {
            let source = source.to_source();
            let path = cache
                .resolve_with_progress(&source, &mut |percent| {
                    log::info!("downloading {}: {percent}%", source.uri);
                })
                .map_err(ViewerError::from)?;
            println!("{}", path.display());
        }
        CacheCommand::Clear { source } => {
            let removed = cache.clear(&source.to_source())?;
            println!("{}", if removed { "removed" } else { "not cached" });
        }
        CacheCommand::ClearAll => {
            println!("{}", cache.clear_all()?);
        }
        CacheCommand::Size => {
            println!("{}", cache.size()?);
        }
        CacheCommand::Sweep { older_than_secs } => {
            println!("{}", cache.sweep_partials(Duration::from_secs(*older_than_secs))?);
        }
        CacheCommand::Config => {
            print!("{}", cache.config().to_toml()?);
        }
    }

    Ok(())
}

fn default_render_output(source: &PdfSource, page: u32) -> PathBuf {
    let name = source.uri.rsplit(['/', '\\']).next().unwrap_or_default();
    let stem = Path::new(name).file_stem().and_then(|stem| stem.to_str()).unwrap_or("page");

    PathBuf::from(format!("{stem}-page-{page}.png"))
}
