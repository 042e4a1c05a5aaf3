use serde::Deserialize;
use std::time::Duration;
use std::time::Instant;
use tracing::debug;
use tracing::warn;

use crate::config::LocationConfig;
use crate::PlateError;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Where the camera is. Failures are the caller's to absorb.
pub trait LocationProvider {
    fn current_location(&mut self) -> Result<Location>;
}

/// A fixed address.
#[derive(Debug, Clone)]
pub struct StaticLocation {
    location: Location,
}

impl StaticLocation {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            location: Location {
                address: address.into(),
                latitude: 0.0,
                longitude: 0.0,
            },
        }
    }

    pub fn from_config(config: &LocationConfig) -> Self {
        Self {
            location: Location {
                address: config.address.clone(),
                latitude: config.latitude,
                longitude: config.longitude,
            },
        }
    }
}

impl LocationProvider for StaticLocation {
    fn current_location(&mut self) -> Result<Location> {
        Ok(self.location.clone())
    }
}

/// LocationIQ reverse geocoding reply; coordinates come back as strings.
#[derive(Debug, Deserialize)]
struct ReverseReply {
    display_name: Option<String>,
    lat: Option<String>,
    lon: Option<String>,
    error: Option<String>,
}

impl ReverseReply {
    fn into_location(self, latitude: f64, longitude: f64) -> Result<Location> {
        if let Some(error) = self.error {
            return Err(PlateError::Http(format!("geocoder: {error}")));
        }
        let address = self
            .display_name
            .ok_or_else(|| PlateError::Http("geocoder reply has no display_name".to_string()))?;
        Ok(Location {
            address,
            latitude: self.lat.and_then(|v| v.parse().ok()).unwrap_or(latitude),
            longitude: self.lon.and_then(|v| v.parse().ok()).unwrap_or(longitude),
        })
    }
}

/// Reverse-geocodes the configured coordinates and caches the answer for
/// `refresh_secs`. A failed refresh keeps serving the stale answer.
pub struct LocationIqProvider {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    latitude: f64,
    longitude: f64,
    refresh: Duration,
    cached: Option<(Location, Instant)>,
}

impl LocationIqProvider {
    pub fn new(config: &LocationConfig, api_key: impl Into<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(10))
                .build(),
            endpoint: config.endpoint.clone(),
            api_key: api_key.into(),
            latitude: config.latitude,
            longitude: config.longitude,
            refresh: Duration::from_secs(config.refresh_secs),
            cached: None,
        }
    }

    fn fetch(&self) -> Result<Location> {
        let response = self
            .agent
            .get(&self.endpoint)
            .query("key", &self.api_key)
            .query("lat", &self.latitude.to_string())
            .query("lon", &self.longitude.to_string())
            .query("format", "json")
            .call();

        let reply: ReverseReply = match response {
            Ok(response) => response
                .into_json()
                .map_err(|e| PlateError::Http(format!("geocoder reply: {e}")))?,
            Err(ureq::Error::Status(code, response)) => {
                let reply = response.into_json::<ReverseReply>().ok();
                let reason = reply.and_then(|r| r.error).unwrap_or_default();
                return Err(PlateError::Http(format!("geocoder returned {code}: {reason}")));
            }
            Err(e) => return Err(PlateError::Http(format!("geocoder request failed: {e}"))),
        };

        reply.into_location(self.latitude, self.longitude)
    }

    fn is_fresh(&self) -> bool {
        self.cached
            .as_ref()
            .is_some_and(|(_, fetched)| fetched.elapsed() < self.refresh)
    }
}

impl LocationProvider for LocationIqProvider {
    fn current_location(&mut self) -> Result<Location> {
        if self.is_fresh() {
            if let Some((location, _)) = &self.cached {
                return Ok(location.clone());
            }
        }

        match self.fetch() {
            Ok(location) => {
                debug!(address = %location.address, "location refreshed");
                self.cached = Some((location.clone(), Instant::now()));
                Ok(location)
            }
            Err(e) => match &self.cached {
                Some((stale, _)) => {
                    warn!(error = %e, "location refresh failed, using cached address");
                    Ok(stale.clone())
                }
                None => Err(e),
            },
        }
    }
}
