use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::db::{self, DurationRow, LocationRow, ReportPlace};
use crate::duration::DurationParser;
use crate::location::{CacheStore, Coverage, GeoError, Geocoder, LocationResolver, OfflineTable};

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

// ── Durations ──

#[derive(Debug, Default, PartialEq)]
pub struct DurationStats {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
}

/// Parse every `(report_id, raw)` pair and store the outcome, unmatched ones
/// with NULL seconds.
pub fn classify_durations(
    conn: &Connection,
    parser: &DurationParser,
    pending: &[(i64, String)],
) -> Result<DurationStats> {
    let pb = progress_bar(pending.len());
    let mut stats = DurationStats::default();

    for chunk in pending.chunks(500) {
        let rows: Vec<DurationRow> = chunk
            .par_iter()
            .map(|(report_id, raw)| {
                let seconds = match parser.parse(raw) {
                    Ok(parsed) => Some(parsed.seconds()),
                    Err(no_match) => {
                        debug!("{}", no_match);
                        None
                    }
                };
                DurationRow {
                    report_id: *report_id,
                    raw: raw.clone(),
                    seconds,
                }
            })
            .collect();

        let matched = rows.iter().filter(|r| r.seconds.is_some()).count();
        stats.total += rows.len();
        stats.matched += matched;
        stats.unmatched += rows.len() - matched;
        db::save_durations(conn, &rows)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(stats)
}

// ── Locations ──

#[derive(Debug, Default, PartialEq)]
pub struct LocateStats {
    pub total: usize,
    pub located: usize,
    pub missing: usize,
    pub unresolvable: usize,
    pub fetched: usize,
}

/// Resolve report places one at a time. Progress and the lookup cache are
/// flushed every `save_every` reports and before a transport error is
/// returned, so a rerun picks up where this one stopped.
pub fn locate_reports<G: Geocoder>(
    conn: &Connection,
    resolver: &mut LocationResolver<G>,
    store: &dyn CacheStore,
    places: &[ReportPlace],
    save_every: usize,
) -> Result<LocateStats> {
    let save_every = save_every.max(1);
    let pb = progress_bar(places.len());
    let mut stats = LocateStats::default();
    let mut pending: Vec<LocationRow> = Vec::new();

    for (i, place) in places.iter().enumerate() {
        let row = match resolver.resolve_messy(&place.city, &place.state) {
            Ok(res) => {
                if res.fetched {
                    stats.fetched += 1;
                }
                if res.result.longitude.is_some() {
                    stats.located += 1;
                } else {
                    stats.missing += 1;
                }
                LocationRow {
                    report_id: place.report_id,
                    matched_city: Some(res.city),
                    longitude: res.result.longitude,
                    latitude: res.result.latitude,
                    confidence: res.result.confidence.as_i8(),
                    error: None,
                }
            }
            Err(err @ GeoError::Unresolvable(_)) => {
                stats.unresolvable += 1;
                debug!("Report {}: {}", place.report_id, err);
                LocationRow {
                    report_id: place.report_id,
                    matched_city: None,
                    longitude: None,
                    latitude: None,
                    confidence: -1,
                    error: Some(err.to_string()),
                }
            }
            Err(err) => {
                warn!("Stopping at report {}: {}", place.report_id, err);
                db::save_locations(conn, &pending)?;
                store.save(resolver.cache())?;
                pb.abandon();
                return Err(err.into());
            }
        };
        pending.push(row);
        stats.total += 1;
        pb.inc(1);

        if (i + 1) % save_every == 0 {
            db::save_locations(conn, &pending)?;
            pending.clear();
            store.save(resolver.cache())?;
        }
    }

    db::save_locations(conn, &pending)?;
    store.save(resolver.cache())?;
    pb.finish_and_clear();
    info!(
        "Located {} of {} reports ({} lookups)",
        stats.located, stats.total, stats.fetched
    );
    Ok(stats)
}

// ── Coverage ──

#[derive(Debug, Default, PartialEq)]
pub struct CoverageStats {
    pub found: usize,
    pub name_only: usize,
    pub not_found: usize,
}

/// How many reports the offline table alone can place.
pub fn coverage(table: &OfflineTable, places: &[(String, String, usize)]) -> CoverageStats {
    let mut stats = CoverageStats::default();
    for (city, state, reports) in places {
        match table.classify(city, state) {
            Coverage::Found => stats.found += reports,
            Coverage::NameOnly => stats.name_only += reports,
            Coverage::NotFound => stats.not_found += reports,
        }
    }
    stats
}
