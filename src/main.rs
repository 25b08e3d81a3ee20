use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, bail};
use cachecrawl::{
    CacheGate, EntityKey, HttpFetcher, JsonLinesSink, NullSink, RecordSink, Route, Settings,
    news, seeds,
    sites::{self, NameberryContent, NameberryExtractor},
};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(
    name = "cachecrawl",
    version,
    about = "Cache-first crawler for name, recipe and news sites"
)]
struct Cli {
    #[arg(long, global = true, help = "TOML settings file")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Cache root directory (overrides settings)")]
    cache_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Crawl a site from seed names or a page range
    Crawl(CrawlArgs),
    /// Show how a URL or cache path maps to a key and where it would be fetched from
    Resolve {
        #[arg(long, value_enum)]
        site: Site,
        locator: String,
    },
    /// Save news articles under their mirror paths
    Mirror {
        #[arg(long, default_value = "/tmp", help = "Storage root")]
        root: PathBuf,
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

#[derive(Debug, clap::Args)]
struct CrawlArgs {
    #[arg(long, value_enum)]
    site: Site,

    #[arg(long, help = "JSON array of names or {\"name\": ...} objects")]
    seeds: Option<PathBuf>,

    #[arg(long, help = "First listing page (page-based sites)")]
    from: Option<u32>,

    #[arg(long, help = "Last listing page, inclusive")]
    to: Option<u32>,

    #[arg(long, help = "Write records as JSON lines to this file")]
    out: Option<PathBuf>,

    #[arg(long, help = "Only parse cached pages; never fetch")]
    local_only: bool,

    #[arg(long, help = "Concurrent fetch/extract workers")]
    concurrency: Option<usize>,

    #[arg(long, help = "Concurrent remote requests per host")]
    per_host: Option<usize>,

    #[arg(long, help = "Remote requests per second")]
    rps: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Site {
    Babynames,
    Nameberry,
    NameberrySimilar,
    Behindthename,
    Foodnetwork,
}

impl Site {
    fn handler(self) -> &'static str {
        match self {
            Site::Babynames => sites::BABYNAMES,
            Site::Nameberry | Site::NameberrySimilar => sites::NAMEBERRY,
            Site::Behindthename => sites::BEHINDTHENAME,
            Site::Foodnetwork => sites::FOODNETWORK_SEARCH,
        }
    }

    fn routes(self, root: &std::path::Path, seeds: &[EntityKey]) -> anyhow::Result<Vec<Route>> {
        Ok(match self {
            Site::Babynames => vec![sites::babynames_route(root)?],
            Site::Nameberry => vec![sites::nameberry_route(
                root,
                NameberryExtractor::new(NameberryContent::Meaning),
            )?],
            Site::NameberrySimilar => vec![sites::nameberry_route(
                root,
                NameberryExtractor::new(NameberryContent::SimilarNames)
                    .known_names(seeds.iter().map(EntityKey::name)),
            )?],
            Site::Behindthename => vec![sites::behindthename_route(root)?],
            Site::Foodnetwork => sites::foodnetwork_routes(root)?.into(),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let cli = Cli::parse();
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(root) = cli.cache_root {
        settings.cache_root = root;
    }

    match cli.command {
        Command::Crawl(args) => crawl(settings, args).await,
        Command::Resolve { site, locator } => resolve(&settings, site, &locator),
        Command::Mirror { root, urls } => mirror(&settings, root, urls).await,
    }
}

async fn crawl(mut settings: Settings, args: CrawlArgs) -> anyhow::Result<()> {
    settings.local_only |= args.local_only;
    if let Some(concurrency) = args.concurrency {
        settings.crawling_concurrency = concurrency;
    }
    if let Some(per_host) = args.per_host {
        settings.per_host_concurrency = per_host;
    }
    if args.rps.is_some() {
        settings.requests_per_second = args.rps;
    }

    let seeds: Vec<EntityKey> = match (&args.seeds, args.from, args.to) {
        (Some(path), None, None) => seeds::load_names(path).await?,
        (None, Some(from), Some(to)) if from <= to => seeds::page_range(from..=to).collect(),
        (None, Some(from), Some(to)) => bail!("empty page range {}..={}", from, to),
        _ => bail!("give either --seeds or both --from and --to"),
    };

    let sink: Arc<dyn RecordSink> = match &args.out {
        Some(path) => Arc::new(
            JsonLinesSink::create(path)
                .await
                .with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Arc::new(NullSink),
    };

    let mut builder = settings.builder().sink(sink);
    for route in args.site.routes(&settings.cache_root, &seeds)? {
        builder = builder.route(route);
    }
    let crawler = builder.build()?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing in-flight tasks");
            ctrl_c.cancel();
        }
    });

    let report = crawler
        .crawl_with_cancellation(args.site.handler(), seeds, cancel)
        .await?;

    println!("{}", report.summary());
    for failure in &report.failures {
        let key = failure
            .key
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        println!(
            "  failed [{}] {} {}: {}",
            failure.error.kind(),
            key,
            failure.locator,
            failure.error
        );
    }
    if !report.unresolved.is_empty() {
        println!("  {} keys left for a later run", report.unresolved.len());
    }
    Ok(())
}

fn resolve(settings: &Settings, site: Site, locator: &str) -> anyhow::Result<()> {
    let routes = site.routes(&settings.cache_root, &[])?;
    let route = sites::route_for(&routes, locator)
        .with_context(|| format!("{} does not belong to {:?}", locator, site))?;
    let codec = route.codec();
    let key = codec.decode_str(locator)?;
    let gate = CacheGate::new(Arc::new(codec.clone()));

    println!("handler: {}", route.handler());
    println!("key:     {}", key);
    println!("remote:  {}", codec.encode_remote(&key)?);
    println!("local:   {}", codec.encode_local(&key)?);
    println!("fetch:   {}", gate.resolve_fetch_target(&key)?);
    Ok(())
}

async fn mirror(settings: &Settings, root: PathBuf, urls: Vec<String>) -> anyhow::Result<()> {
    let fetcher = HttpFetcher::new(
        &settings.user_agent,
        Duration::from_secs(settings.timeout_secs),
    )?;
    for url in urls {
        let path = news::mirror(&fetcher, &root, &url)
            .await
            .with_context(|| format!("mirroring {}", url))?;
        println!("{} -> {}", url, path.display());
    }
    Ok(())
}
