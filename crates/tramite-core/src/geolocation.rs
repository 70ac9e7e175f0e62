//! Applicant Position
//!
//! Obtaining the user's coordinate is the only suspending operation in the
//! engine. It always completes: a slow, failing or absent source yields the
//! configured fallback coordinate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::catalog::Coordinate;

/// Mexico City, Zócalo
pub const DEFAULT_FALLBACK: Coordinate = Coordinate::new(19.4326, -99.1332);

#[derive(Debug, Error)]
pub enum GeolocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Position unavailable: {0}")]
    Unavailable(String),
}

/// Something that can report where the applicant is
#[async_trait]
pub trait CoordinateSource: Send + Sync {
    async fn current_position(&self) -> Result<Coordinate, GeolocationError>;
}

/// Source that always reports the same coordinate
#[derive(Debug, Clone, Copy)]
pub struct FixedSource(pub Coordinate);

#[async_trait]
impl CoordinateSource for FixedSource {
    async fn current_position(&self) -> Result<Coordinate, GeolocationError> {
        Ok(self.0)
    }
}

/// Timeout and fallback for position lookups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeolocationSettings {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_fallback")]
    pub fallback: Coordinate,
    #[serde(default = "default_fallback_label")]
    pub fallback_label: String,
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_fallback() -> Coordinate {
    DEFAULT_FALLBACK
}

fn default_fallback_label() -> String {
    "Ciudad de México (centro)".to_string()
}

impl Default for GeolocationSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            fallback: default_fallback(),
            fallback_label: default_fallback_label(),
        }
    }
}

impl GeolocationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Where a resolved position came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionOrigin {
    Device,
    Fallback,
}

/// The applicant's position and its origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedPosition {
    pub coordinate: Coordinate,
    pub origin: PositionOrigin,
}

/// Ask the source for a position, bounded by the configured timeout
pub async fn locate(
    source: Option<&dyn CoordinateSource>,
    settings: &GeolocationSettings,
) -> ResolvedPosition {
    let fallback = ResolvedPosition {
        coordinate: settings.fallback,
        origin: PositionOrigin::Fallback,
    };

    let Some(source) = source else {
        warn!("No coordinate source, using {}", settings.fallback_label);
        return fallback;
    };

    match tokio::time::timeout(settings.timeout(), source.current_position()).await {
        Ok(Ok(coordinate)) => ResolvedPosition {
            coordinate,
            origin: PositionOrigin::Device,
        },
        Ok(Err(e)) => {
            warn!("Geolocation failed ({}), using {}", e, settings.fallback_label);
            fallback
        }
        Err(_) => {
            warn!(
                "Geolocation timed out after {} ms, using {}",
                settings.timeout_ms, settings.fallback_label
            );
            fallback
        }
    }
}
