pub mod cache;
pub mod error;
pub mod geocoder;
pub mod normalize;
pub mod offline;
pub mod rank;
pub mod throttle;

pub use cache::{CacheStore, JsonCacheFile, LookupCache, SqliteCacheStore};
pub use error::GeoError;
pub use geocoder::{Geocoder, NominatimClient};
pub use offline::{Coverage, OfflineTable};
pub use throttle::Throttle;

use serde::{Deserialize, Serialize};
use tracing::debug;

use normalize::{is_well_formed, split_slash, strip_parenthetical};

/// Nominatim `type` of a search hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceKind {
    City,
    Administrative,
    #[serde(other)]
    Other,
}

impl PlaceKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "city" => PlaceKind::City,
            "administrative" => PlaceKind::Administrative,
            _ => PlaceKind::Other,
        }
    }

    /// Kinds worth keeping in the lookup cache.
    pub fn is_settlement(self) -> bool {
        matches!(self, PlaceKind::City | PlaceKind::Administrative)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoCandidate {
    pub country_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub kind: PlaceKind,
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    Missing,
    FirstResult,
    UsCity,
    RegionMatch,
    Certain,
}

impl Confidence {
    /// Numeric tier as stored in the `locations` table, -1 through 3.
    pub fn as_i8(self) -> i8 {
        match self {
            Confidence::Missing => -1,
            Confidence::FirstResult => 0,
            Confidence::UsCity => 1,
            Confidence::RegionMatch => 2,
            Confidence::Certain => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoResult {
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub confidence: Confidence,
}

impl GeoResult {
    pub fn missing() -> Self {
        Self {
            longitude: None,
            latitude: None,
            confidence: Confidence::Missing,
        }
    }

    pub fn at(candidate: &GeoCandidate, confidence: Confidence) -> Self {
        Self {
            longitude: Some(candidate.longitude),
            latitude: Some(candidate.latitude),
            confidence,
        }
    }
}

/// Outcome of one resolver call.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The city string that was actually looked up.
    pub city: String,
    pub result: GeoResult,
    /// Whether the geocoder was called while producing this result.
    pub fetched: bool,
}

/// Offline table first, then the lookup cache, then the geocoder.
///
/// Owns its cache; persist it with [`CacheStore::save`] on [`Self::cache`]
/// every so often, nothing is saved implicitly.
pub struct LocationResolver<G: Geocoder> {
    offline: OfflineTable,
    cache: LookupCache,
    geocoder: G,
    throttle: Throttle,
}

impl<G: Geocoder> LocationResolver<G> {
    pub fn new(offline: OfflineTable, cache: LookupCache, geocoder: G, throttle: Throttle) -> Self {
        Self {
            offline,
            cache,
            geocoder,
            throttle,
        }
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    pub fn into_cache(self) -> LookupCache {
        self.cache
    }

    /// Resolve `city` as given. Never returns `GeoError::Unresolvable`; a city
    /// nobody knows comes back as `Confidence::Missing`.
    pub fn resolve(&mut self, city: &str, region: &str) -> Result<Resolution, GeoError> {
        if let Some(coords) = self.offline.get(city, region) {
            return Ok(Resolution {
                city: city.to_string(),
                result: GeoResult {
                    longitude: Some(coords.longitude),
                    latitude: Some(coords.latitude),
                    confidence: Confidence::Certain,
                },
                fetched: false,
            });
        }

        let fetched = self.ensure_cached(city)?;
        let result = self
            .cache
            .get(city)
            .map_or_else(GeoResult::missing, |candidates| rank::rank(candidates, region));
        Ok(Resolution {
            city: city.to_string(),
            result,
            fetched,
        })
    }

    /// Like [`Self::resolve`], but tries to clean up noisy city strings first:
    /// the raw string, then without its `(...)` note, then each side of a `/`.
    /// Fails with `GeoError::Unresolvable` when none of those is fit to look up.
    pub fn resolve_messy(&mut self, city: &str, region: &str) -> Result<Resolution, GeoError> {
        if is_well_formed(city) {
            return self.resolve(city, region);
        }
        if let Some(stripped) = strip_parenthetical(city) {
            if is_well_formed(stripped) {
                return self.resolve(stripped, region);
            }
        }
        if let Some((first, second)) = split_slash(city) {
            let first = self.resolve_half(first, region)?;
            let second = self.resolve_half(second, region)?;
            let best = match (first, second) {
                (Some(a), Some(b)) => {
                    let fetched = a.fetched || b.fetched;
                    let mut best = if a.result.confidence > b.result.confidence { a } else { b };
                    best.fetched = fetched;
                    Some(best)
                }
                (a, b) => a.or(b),
            };
            if let Some(best) = best {
                return Ok(best);
            }
        }
        Err(GeoError::Unresolvable(city.to_string()))
    }

    fn resolve_half(&mut self, city: &str, region: &str) -> Result<Option<Resolution>, GeoError> {
        match self.resolve_messy(city, region) {
            Ok(resolution) => Ok(Some(resolution)),
            Err(GeoError::Unresolvable(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Fetch and cache `city` unless it is cached already. Returns whether a
    /// fetch happened.
    fn ensure_cached(&mut self, city: &str) -> Result<bool, GeoError> {
        if self.cache.contains(city) {
            return Ok(false);
        }
        self.throttle.wait();
        let mut candidates = self.geocoder.fetch_candidates(city)?;
        candidates.retain(|c| c.kind.is_settlement());
        debug!("Cached {} candidates for {:?}", candidates.len(), city);
        self.cache.insert_if_absent(city, candidates);
        Ok(true)
    }
}
