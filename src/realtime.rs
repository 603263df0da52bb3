use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::AppError;
use crate::models::location::{DriverLocation, GeoPoint};

/// Keyed, last-write-wins store. `set` replaces whatever lives at `path`.
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    async fn set(&self, path: &str, value: Value) -> Result<(), AppError>;
}

/// Realtime database reached over its REST surface: `PUT {root}/{path}.json`
/// overwrites the node.
pub struct RestRealtimeStore {
    http: Client,
    root: String,
    auth: Option<String>,
}

impl RestRealtimeStore {
    pub fn new(
        root: impl Into<String>,
        auth: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            root: root.into().trim_end_matches('/').to_string(),
            auth,
        })
    }
}

#[async_trait]
impl RealtimeStore for RestRealtimeStore {
    async fn set(&self, path: &str, value: Value) -> Result<(), AppError> {
        let url = format!("{}/{}.json", self.root, path.trim_matches('/'));
        let mut request = self.http.put(&url).json(&value);
        if let Some(auth) = &self.auth {
            request = request.query(&[("auth", auth)]);
        }

        let response = request
            .send()
            .await
            .map_err(|err| AppError::Realtime(format!("write to {path} failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Realtime(format!(
                "write to {path} rejected with HTTP {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRealtimeStore {
    nodes: DashMap<String, Value>,
}

impl MemoryRealtimeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.nodes.get(path).map(|node| node.value().clone())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[async_trait]
impl RealtimeStore for MemoryRealtimeStore {
    async fn set(&self, path: &str, value: Value) -> Result<(), AppError> {
        self.nodes.insert(path.trim_matches('/').to_string(), value);
        Ok(())
    }
}

/// Characters that would nest the node or are illegal in a realtime key.
const FORBIDDEN_KEY_CHARS: [char; 6] = ['/', '.', '#', '$', '[', ']'];

pub fn driver_path(driver_id: &str) -> Result<String, AppError> {
    let key = driver_id.trim();
    if key.is_empty() {
        return Err(AppError::Realtime("driver id is missing".to_string()));
    }
    if key.contains(FORBIDDEN_KEY_CHARS) {
        return Err(AppError::Realtime(format!(
            "driver id {driver_id:?} is not a valid realtime key"
        )));
    }
    Ok(format!("drivers/{key}"))
}

/// Writes a driver's live position. Each call is independent: no retries,
/// no batching, the newest write replaces the record.
#[derive(Clone)]
pub struct LocationPublisher {
    store: Arc<dyn RealtimeStore>,
}

impl LocationPublisher {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self { store }
    }

    pub async fn publish(&self, driver_id: &str, point: GeoPoint) -> Result<DriverLocation, AppError> {
        let path = driver_path(driver_id)?;
        let record = DriverLocation::at(point, Utc::now().timestamp_millis());
        let value = serde_json::to_value(&record)
            .map_err(|err| AppError::Internal(format!("failed to encode location: {err}")))?;

        self.store.set(&path, value).await?;
        debug!(
            driver_id,
            latitude = record.latitude,
            longitude = record.longitude,
            "driver location published"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{LocationPublisher, MemoryRealtimeStore, driver_path};
    use crate::models::location::GeoPoint;

    #[tokio::test]
    async fn publish_overwrites_previous_record() {
        let store = Arc::new(MemoryRealtimeStore::new());
        let publisher = LocationPublisher::new(store.clone());

        publisher
            .publish("9", GeoPoint::new(-6.20, 106.81).unwrap())
            .await
            .unwrap();
        let second = publisher
            .publish("9", GeoPoint::new(-6.21, 106.82).unwrap())
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        let node = store.get("drivers/9").unwrap();
        assert_eq!(node["latitude"], -6.21);
        assert_eq!(node["longitude"], 106.82);
        assert_eq!(node["updated_at"], second.updated_at);
    }

    #[tokio::test]
    async fn empty_driver_id_is_rejected() {
        let store = Arc::new(MemoryRealtimeStore::new());
        let publisher = LocationPublisher::new(store.clone());

        assert!(publisher.publish(" ", GeoPoint::new(0.0, 0.0).unwrap()).await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn ids_that_would_escape_the_driver_node_are_rejected() {
        let store = Arc::new(MemoryRealtimeStore::new());
        let publisher = LocationPublisher::new(store.clone());
        let point = GeoPoint::new(-6.2, 106.8).unwrap();

        for bad in ["7/x", "7.5", "a#b", "$x", "[1]", "x]"] {
            assert!(publisher.publish(bad, point).await.is_err(), "{bad} accepted");
        }
        assert!(store.is_empty());
        assert_eq!(driver_path("42").unwrap(), "drivers/42");
    }
}
