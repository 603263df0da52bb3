use async_trait::async_trait;
use tracing::warn;

use crate::error::AppError;
use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    Balanced,
    High,
}

/// Platform positioning service.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn request_foreground_permission(&self) -> PermissionStatus;

    async fn current_position(&self, accuracy: Accuracy) -> Result<GeoPoint, AppError>;
}

/// Single-shot location lookup. Each call asks for permission, then takes
/// one high-accuracy fix; repeated reporting is the caller's timer.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_location(&self) -> Result<GeoPoint, AppError>;
}

pub struct DeviceLocation<S> {
    source: S,
}

impl<S: PositionSource> DeviceLocation<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<S: PositionSource> LocationProvider for DeviceLocation<S> {
    async fn current_location(&self) -> Result<GeoPoint, AppError> {
        match self.source.request_foreground_permission().await {
            PermissionStatus::Granted => self.source.current_position(Accuracy::High).await,
            status => {
                warn!(?status, "location permission not granted");
                Err(AppError::PermissionDenied)
            }
        }
    }
}

/// Position source for headless runs: a configured coordinate, or a denied
/// permission when none was configured.
pub struct FixedPosition {
    point: Option<GeoPoint>,
}

impl FixedPosition {
    pub fn new(point: Option<GeoPoint>) -> Self {
        Self { point }
    }
}

#[async_trait]
impl PositionSource for FixedPosition {
    async fn request_foreground_permission(&self) -> PermissionStatus {
        if self.point.is_some() {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }

    async fn current_position(&self, _accuracy: Accuracy) -> Result<GeoPoint, AppError> {
        self.point.ok_or(AppError::PermissionDenied)
    }
}
