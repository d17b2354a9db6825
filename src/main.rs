//! navdata command-line client.
//!
//! ```text
//! navdata --config navdata.toml weather 52.52 13.405
//! navdata cameras 52.6 13.2 52.4 13.6
//! navdata estimate 52.52 13.405 --radius-km 10 --min-zoom 10 --max-zoom 15
//! navdata prefetch 52.52 13.405 --radius-km 5      (Ctrl+C aborts the session)
//! ```
//!
//! Results go to stdout as JSON; logs go to stderr.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;

use navdata::config::{load_config, NavConfig};
use navdata::geo::{LatLon, TileCoord};
use navdata::lifecycle::{signals, Shutdown};
use navdata::observability::{logging, metrics};
use navdata::prefetch::{CacheName, PrefetchOutcome, TileArea};
use navdata::region::Region;
use navdata::NavDataService;

#[derive(Parser)]
#[command(name = "navdata")]
#[command(about = "Fetch regional navigation data with failover and caching", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Force a region instead of detecting one
    #[arg(short, long)]
    region: Option<Region>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Current weather at a point
    Weather { lat: f64, lon: f64 },
    /// Speed cameras inside a bounding box
    Cameras { lat1: f64, lon1: f64, lat2: f64, lon2: f64 },
    /// Traffic flow inside a bounding box
    Traffic { lat1: f64, lon1: f64, lat2: f64, lon2: f64 },
    /// Download one map tile and report its size
    Tile { z: u8, x: u32, y: u32 },
    /// Estimate the size of an area download
    Estimate(AreaArgs),
    /// Download every tile of an area into the tile cache
    Prefetch(AreaArgs),
    /// Bytes held by the persistent caches
    CacheSize,
    /// Empty one persistent cache (tiles, static, api)
    ClearCache { name: CacheName },
    /// Circuit breaker state per provider
    Circuits,
}

#[derive(clap::Args)]
struct AreaArgs {
    lat: f64,
    lon: f64,
    #[arg(long, default_value_t = 5.0)]
    radius_km: f64,
    #[arg(long, default_value_t = 10)]
    min_zoom: u8,
    #[arg(long, default_value_t = 15)]
    max_zoom: u8,
}

impl AreaArgs {
    fn area(&self) -> Result<TileArea, navdata::prefetch::PrefetchError> {
        TileArea::new(LatLon::new(self.lat, self.lon), self.radius_km, self.min_zoom, self.max_zoom)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => NavConfig::default(),
    };
    if cli.region.is_some() {
        config.region.force = cli.region;
    }

    logging::init_logging(&config.observability);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let service = NavDataService::connect(config)?;
    tracing::info!(region = %service.region(), "navdata starting");

    match cli.command {
        Commands::Weather { lat, lon } => print_json(&service.weather_now(lat, lon).await?)?,
        Commands::Cameras { lat1, lon1, lat2, lon2 } => {
            let cameras = service
                .speed_cameras(LatLon::new(lat1, lon1), LatLon::new(lat2, lon2))
                .await?;
            print_json(&cameras)?;
        }
        Commands::Traffic { lat1, lon1, lat2, lon2 } => {
            let flow = service
                .traffic_flow(LatLon::new(lat1, lon1), LatLon::new(lat2, lon2))
                .await?;
            print_json(&flow)?;
        }
        Commands::Tile { z, x, y } => {
            let coord = TileCoord { z, x, y };
            let body = service.tile(coord).await?;
            println!("{} {} bytes", coord, body.len());
        }
        Commands::Estimate(args) => {
            let estimate = navdata::prefetch::estimate_download(
                args.radius_km,
                args.min_zoom,
                args.max_zoom,
                service.config().prefetch.average_tile_bytes,
            );
            let exact = navdata::prefetch::DownloadEstimate::for_tiles(
                args.area()?.tile_count(),
                service.config().prefetch.average_tile_bytes,
            );
            println!(
                "~{} tiles (~{:.1} MB), exact {} tiles (~{:.1} MB)",
                estimate.tiles,
                estimate.megabytes(),
                exact.tiles,
                exact.megabytes()
            );
        }
        Commands::Prefetch(args) => prefetch(&service, args.area()?).await?,
        Commands::CacheSize => {
            let shutdown = Shutdown::new();
            let (client, _) = service.spawn_prefetch(shutdown.clone());
            println!("{}", client.cache_size().await?);
            shutdown.trigger();
        }
        Commands::ClearCache { name } => {
            let shutdown = Shutdown::new();
            let (client, _) = service.spawn_prefetch(shutdown.clone());
            client.clear_cache(name).await?;
            println!("cleared {}", name);
            shutdown.trigger();
        }
        Commands::Circuits => {
            for (provider, status) in service.circuit_statuses() {
                println!("{provider}: {:?} ({} failures)", status.state, status.failures);
            }
        }
    }

    Ok(())
}

async fn prefetch(service: &NavDataService, area: TileArea) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = Shutdown::new();
    let (client, worker) = service.spawn_prefetch(shutdown.clone());

    let mut session = client.prefetch_area(&area).await?;
    let aborter = session.aborter();
    let interrupt = tokio::spawn(async move {
        signals::interrupted().await;
        if let Err(e) = aborter.abort().await {
            tracing::warn!(error = %e, "Failed to abort prefetch session");
        }
    });

    while let Some(progress) = session.progress().await {
        eprintln!(
            "{}/{} tiles, {} bytes",
            progress.cached, progress.total, progress.bytes_downloaded
        );
    }
    interrupt.abort();

    match session.wait().await {
        PrefetchOutcome::Completed(p) => println!("cached {} of {} tiles ({} bytes)", p.cached, p.total, p.bytes_downloaded),
        PrefetchOutcome::Cancelled => println!("cancelled"),
        PrefetchOutcome::Failed(error) => {
            shutdown.trigger();
            return Err(error.into());
        }
    }

    shutdown.trigger();
    let _ = worker.await;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
