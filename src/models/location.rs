use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, AppError> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(AppError::Internal(format!(
                "coordinates out of range: {latitude}, {longitude}"
            )));
        }

        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// Value stored at `drivers/{driverId}` in the realtime store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverLocation {
    pub latitude: f64,
    pub longitude: f64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

impl DriverLocation {
    pub fn at(point: GeoPoint, updated_at: i64) -> Self {
        Self {
            latitude: point.latitude,
            longitude: point.longitude,
            updated_at,
        }
    }
}
