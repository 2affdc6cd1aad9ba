use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use super::{GeoCandidate, GeoError, PlaceKind};

pub const NOMINATIM_SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";

/// Online lookup of a bare city name. Implementations do not retry.
pub trait Geocoder {
    fn fetch_candidates(&mut self, city: &str) -> Result<Vec<GeoCandidate>, GeoError>;
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    #[serde(rename = "type", default)]
    kind: String,
    lon: String,
    lat: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    address: NominatimAddress,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    #[serde(default)]
    country_code: String,
    #[serde(default)]
    state: Option<String>,
}

impl NominatimPlace {
    fn into_candidate(self) -> Result<GeoCandidate, GeoError> {
        let coord = |name: &str, raw: &str| {
            raw.trim()
                .parse::<f64>()
                .map_err(|_| GeoError::Malformed(format!("{} {:?} is not a number", name, raw)))
        };
        Ok(GeoCandidate {
            longitude: coord("lon", &self.lon)?,
            latitude: coord("lat", &self.lat)?,
            country_code: self.address.country_code,
            state: self.address.state,
            kind: PlaceKind::from_tag(&self.kind),
            display_name: self.display_name,
        })
    }
}

/// Decode a Nominatim `format=json&addressdetails=1` search response.
pub fn parse_response(body: &str) -> Result<Vec<GeoCandidate>, GeoError> {
    let places: Vec<NominatimPlace> = serde_json::from_str(body)?;
    places.into_iter().map(NominatimPlace::into_candidate).collect()
}

/// Blocking client for the OpenStreetMap Nominatim search API.
pub struct NominatimClient {
    client: Client,
    base_url: String,
    limit: u32,
}

impl NominatimClient {
    pub fn new(
        base_url: &str,
        user_agent: &str,
        timeout: Duration,
        limit: u32,
    ) -> Result<Self, GeoError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            limit,
        })
    }
}

impl Geocoder for NominatimClient {
    fn fetch_candidates(&mut self, city: &str) -> Result<Vec<GeoCandidate>, GeoError> {
        let limit = self.limit.to_string();
        debug!("Geocoding {:?}", city);
        let body = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", city),
                ("addressdetails", "1"),
                ("format", "json"),
                ("limit", limit.as_str()),
            ])
            .send()?
            .error_for_status()?
            .text()?;
        parse_response(&body)
    }
}
