mod csv;
mod db;
mod duration;
mod location;
mod pipeline;
mod records;
mod settings;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::{info, warn};

use duration::DurationParser;
use location::{
    CacheStore, JsonCacheFile, LocationResolver, NominatimClient, OfflineTable, SqliteCacheStore,
    Throttle,
};
use settings::Settings;

#[derive(Parser)]
#[command(name = "nuforc_normalize", about = "Normalize NUFORC sighting durations and locations")]
struct Cli {
    /// SQLite database (default: $NUFORC_DB_PATH or data/nuforc.sqlite)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load scraped reports from a data.json file
    Import { file: PathBuf },
    /// Load the offline city table from a uscities CSV
    ImportCities { file: PathBuf },
    /// Parse the duration field of every report not parsed yet
    Durations {
        /// Max reports to parse (default: all pending)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// How many of the most common unmatched strings to list
        #[arg(long, default_value = "20")]
        show_unmatched: usize,
    },
    /// Geocode every report not located yet (resumable)
    Locate {
        /// Max reports to locate (default: all pending)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// How many reports the offline city table covers
    Coverage,
    /// Inspect or maintain the geocoder cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Parse one duration string
    Parse {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Resolve one city
    Resolve { city: String, region: String },
    /// Show database statistics
    Stats,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Number of cached lookups
    Stats,
    /// Drop lookups that found nothing so they are retried
    Prune,
    /// Write the cache to a JSON file
    Export { file: PathBuf },
    /// Add entries from a JSON file, keeping existing ones
    Import { file: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }

    let result = match cli.command {
        Commands::Import { file } => {
            let conn = open_db(&settings.db_path)?;
            let reports = records::load_reports(&file)?;
            let inserted = db::insert_reports(&conn, &reports)?;
            println!("Inserted {} new reports ({} in file)", inserted, reports.len());
            Ok(())
        }
        Commands::ImportCities { file } => {
            let conn = open_db(&settings.db_path)?;
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let rows = location::offline::parse_cities_csv(&text)?;
            let inserted = db::insert_cities(&conn, &rows)?;
            println!("Stored {} cities", inserted);
            Ok(())
        }
        Commands::Durations { limit, show_unmatched } => {
            let conn = open_db(&settings.db_path)?;
            let pending = db::fetch_unparsed_durations(&conn, limit)?;
            if pending.is_empty() {
                println!("No unparsed durations. Run 'import' first or all are parsed.");
            } else {
                println!("Parsing {} durations...", pending.len());
                let stats = pipeline::classify_durations(&conn, &DurationParser::new(), &pending)?;
                println!(
                    "Done: {} parsed ({} matched, {} unmatched).",
                    stats.total, stats.matched, stats.unmatched
                );
            }
            print_unmatched(&conn, show_unmatched)
        }
        Commands::Locate { limit } => {
            let conn = open_db(&settings.db_path)?;
            let places = db::fetch_unlocated(&conn, limit)?;
            if places.is_empty() {
                println!("No unlocated reports. Run 'import' first or all are located.");
                return Ok(());
            }
            let store = SqliteCacheStore::new(&conn);
            let mut resolver = build_resolver(&conn, &store, &settings)?;
            println!(
                "Locating {} reports ({} cached lookups)...",
                places.len(),
                resolver.cache().len()
            );
            let stats =
                pipeline::locate_reports(&conn, &mut resolver, &store, &places, settings.save_every)?;
            println!(
                "Done: {} located, {} missing, {} unresolvable ({} geocoder lookups).",
                stats.located, stats.missing, stats.unresolvable, stats.fetched
            );
            Ok(())
        }
        Commands::Coverage => {
            let conn = open_db(&settings.db_path)?;
            let table = OfflineTable::from_rows(db::fetch_cities(&conn)?);
            let places = db::fetch_report_places(&conn)?;
            let c = pipeline::coverage(&table, &places);
            println!("Found:       {}", c.found);
            println!("Name only:   {}", c.name_only);
            println!("Not found:   {}", c.not_found);
            Ok(())
        }
        Commands::Cache { action } => {
            let conn = open_db(&settings.db_path)?;
            let store = SqliteCacheStore::new(&conn);
            match action {
                CacheAction::Stats => {
                    let cache = store.load()?;
                    let empty = cache.iter().filter(|(_, c)| c.is_empty()).count();
                    println!("Cached lookups: {}", cache.len());
                    println!("Empty:          {}", empty);
                }
                CacheAction::Prune => {
                    let removed = store.prune_empty()?;
                    println!("Removed {} empty lookups", removed.len());
                }
                CacheAction::Export { file } => {
                    let cache = store.load()?;
                    JsonCacheFile::new(&file).save(&cache)?;
                    println!("Exported {} lookups to {:?}", cache.len(), file);
                }
                CacheAction::Import { file } => {
                    let mut cache = store.load()?;
                    let added = cache.merge(JsonCacheFile::new(&file).load()?);
                    store.save(&cache)?;
                    println!("Imported {} new lookups from {:?}", added, file);
                }
            }
            Ok(())
        }
        Commands::Parse { text } => {
            let text = text.join(" ");
            let parser = DurationParser::new();
            match parser.parse_tree(&text) {
                Ok(expr) => {
                    println!("{:?}", expr);
                    let parsed = parser.parse(&text)?;
                    println!(
                        "{} seconds ({})",
                        parsed.seconds(),
                        format_duration(parsed.as_duration())
                    );
                }
                Err(no_match) => println!("{}", no_match),
            }
            Ok(())
        }
        Commands::Resolve { city, region } => {
            let conn = open_db(&settings.db_path)?;
            let store = SqliteCacheStore::new(&conn);
            let mut resolver = build_resolver(&conn, &store, &settings)?;
            let res = resolver.resolve_messy(&city, &region)?;
            store.save(resolver.cache())?;
            println!("Matched:    {}", res.city);
            match (res.result.longitude, res.result.latitude) {
                (Some(lon), Some(lat)) => println!("Coords:     {}, {}", lat, lon),
                _ => println!("Coords:     -"),
            }
            println!("Confidence: {}", res.result.confidence.as_i8());
            println!("Lookup:     {}", if res.fetched { "geocoder" } else { "local" });
            Ok(())
        }
        Commands::Stats => {
            let conn = open_db(&settings.db_path)?;
            let s = db::get_stats(&conn)?;
            println!("Reports:             {}", s.reports);
            println!("Durations parsed:    {}", s.durations_parsed);
            println!("Durations unmatched: {}", s.durations_unmatched);
            println!("Located:             {}", s.located);
            for (confidence, n) in &s.by_confidence {
                println!("  confidence {:>2}:     {}", confidence, n);
            }
            println!("Location errors:     {}", s.location_errors);
            println!("Offline cities:      {}", s.cities);
            println!("Cached lookups:      {}", s.cached_lookups);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_db(path: &Path) -> Result<Connection> {
    let conn = db::connect(path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

fn build_resolver(
    conn: &Connection,
    store: &SqliteCacheStore,
    settings: &Settings,
) -> Result<LocationResolver<NominatimClient>> {
    let offline = OfflineTable::from_rows(db::fetch_cities(conn)?);
    if offline.is_empty() {
        warn!("Offline city table is empty; run 'import-cities' to avoid needless lookups");
    }
    let cache = store.load()?;
    info!(
        "Offline table: {} cities, cache: {} lookups",
        offline.len(),
        cache.len()
    );
    let throttle = Throttle::new(settings.min_interval());
    info!(
        "Geocoder {} (at most one request per {}ms)",
        settings.geocoder_url,
        throttle.min_interval().as_millis()
    );
    let geocoder = NominatimClient::new(
        &settings.geocoder_url,
        &settings.user_agent,
        settings.request_timeout(),
        settings.result_limit,
    )?;
    Ok(LocationResolver::new(offline, cache, geocoder, throttle))
}

fn print_unmatched(conn: &Connection, limit: usize) -> Result<()> {
    if limit == 0 {
        return Ok(());
    }
    let rows = db::top_unmatched_durations(conn, limit)?;
    if rows.is_empty() {
        return Ok(());
    }
    println!("\n--- Most common unmatched ---");
    for (raw, n) in rows {
        println!("{:>6}  {:?}", n, raw);
    }
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
