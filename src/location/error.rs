#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    /// The lookup service could not be reached or answered with an error status.
    #[error("Geocoding request failed: {0}")]
    Fetch(String),

    /// The lookup service answered, but not with a usable candidate list.
    #[error("Malformed geocoding response: {0}")]
    Malformed(String),

    /// No normalization of the raw city string was fit to look up.
    #[error("Cannot resolve city {0:?}")]
    Unresolvable(String),
}

impl GeoError {
    pub fn is_transport(&self) -> bool {
        matches!(self, GeoError::Fetch(_) | GeoError::Malformed(_))
    }
}

impl From<reqwest::Error> for GeoError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GeoError::Malformed(err.to_string())
        } else {
            GeoError::Fetch(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GeoError {
    fn from(err: serde_json::Error) -> Self {
        GeoError::Malformed(err.to_string())
    }
}
