use std::collections::{HashMap, HashSet};

use anyhow::{bail, Context, Result};

use crate::csv;
use crate::db::CityRow;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// How a report's place relates to the offline table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// Same city in the same state.
    Found,
    /// The city name exists, but only in other states.
    NameOnly,
    NotFound,
}

/// Known (city, state) coordinates, consulted before any online lookup.
#[derive(Debug, Default)]
pub struct OfflineTable {
    exact: HashMap<(String, String), Coordinates>,
    folded: HashSet<(String, String)>,
    names: HashSet<String>,
}

impl OfflineTable {
    pub fn from_rows(rows: impl IntoIterator<Item = CityRow>) -> Self {
        let mut table = Self::default();
        for row in rows {
            let city_key = fold_city(&row.city);
            table.names.insert(city_key.clone());
            table.folded.insert((city_key, row.state_id.to_uppercase()));
            table.exact.insert(
                (row.city, row.state_id),
                Coordinates {
                    latitude: row.lat,
                    longitude: row.lng,
                },
            );
        }
        table
    }

    /// Exact lookup, case as given.
    pub fn get(&self, city: &str, region: &str) -> Option<Coordinates> {
        self.exact
            .get(&(city.to_string(), region.to_string()))
            .copied()
    }

    /// Case-insensitive classification used for coverage reports.
    pub fn classify(&self, city: &str, region: &str) -> Coverage {
        let city_key = fold_city(city);
        if self.folded.contains(&(city_key.clone(), region.to_uppercase())) {
            Coverage::Found
        } else if self.names.contains(&city_key) {
            Coverage::NameOnly
        } else {
            Coverage::NotFound
        }
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }
}

fn fold_city(city: &str) -> String {
    city.trim().to_lowercase()
}

/// Read a simplemaps-style `uscities` CSV (`city`, `state_id`, `lat`, `lng` columns).
pub fn parse_cities_csv(text: &str) -> Result<Vec<CityRow>> {
    let mut rows = csv::parse_rows(text, ',').into_iter();
    let Some(headers) = rows.next() else {
        bail!("City table is empty");
    };
    let col = |name: &str| {
        csv::column(&headers, name).with_context(|| format!("City table has no {:?} column", name))
    };
    let (city, state, lat, lng) = (col("city")?, col("state_id")?, col("lat")?, col("lng")?);

    rows.enumerate()
        .map(|(i, row)| -> Result<CityRow> {
            let field = |idx: usize| row.get(idx).map(String::as_str).unwrap_or("");
            let coord = |idx: usize| {
                field(idx)
                    .trim()
                    .parse::<f64>()
                    .with_context(|| format!("Bad coordinate {:?} on data row {}", field(idx), i + 1))
            };
            Ok(CityRow {
                city: field(city).to_string(),
                state_id: field(state).to_string(),
                lat: coord(lat)?,
                lng: coord(lng)?,
            })
        })
        .collect()
}
