use std::sync::Arc;

use crate::api::ApiClient;
use crate::config::Config;
use crate::engine::lifecycle::{DeferredProofSink, DeliveryFlow};
use crate::engine::poller::{OrderPoller, PollerDeps};
use crate::error::AppError;
use crate::location::{DeviceLocation, FixedPosition, LocationProvider};
use crate::media::{FixedPhoto, PhotoSource};
use crate::observability::metrics::Metrics;
use crate::realtime::{LocationPublisher, RealtimeStore, RestRealtimeStore};
use crate::session::SessionStore;
use crate::storage::{FileStorage, KeyValueStorage};

/// Everything the screens share, built once at start and handed out
/// explicitly.
pub struct AppContext {
    pub config: Config,
    pub session: Arc<SessionStore>,
    pub api: ApiClient,
    pub publisher: LocationPublisher,
    pub location: Arc<dyn LocationProvider>,
    pub photos: Arc<dyn PhotoSource>,
    pub proofs: Arc<DeferredProofSink>,
    pub metrics: Metrics,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let storage = Arc::new(FileStorage::new(config.session_file.clone()));
        let realtime = Arc::new(RestRealtimeStore::new(
            config.realtime_db_url.clone(),
            config.realtime_auth.clone(),
            config.request_timeout,
        )?);
        let location = Arc::new(DeviceLocation::new(FixedPosition::new(config.fixed_position)));

        Self::with_parts(config, storage, realtime, location)
    }

    pub fn with_parts(
        config: Config,
        storage: Arc<dyn KeyValueStorage>,
        realtime: Arc<dyn RealtimeStore>,
        location: Arc<dyn LocationProvider>,
    ) -> Result<Self, AppError> {
        let metrics = Metrics::new();
        let session = Arc::new(SessionStore::new(storage));
        let api = ApiClient::new(
            config.api_base_url.clone(),
            config.request_timeout,
            session.clone(),
            metrics.clone(),
        )?;

        let photos = Arc::new(FixedPhoto::new(config.proof_photo.clone()));

        Ok(Self {
            config,
            session,
            api,
            publisher: LocationPublisher::new(realtime),
            location,
            photos,
            proofs: Arc::new(DeferredProofSink::new()),
            metrics,
        })
    }

    pub fn order_poller(&self) -> OrderPoller {
        OrderPoller::new(
            PollerDeps {
                feed: Arc::new(self.api.clone()),
                location: self.location.clone(),
                publisher: self.publisher.clone(),
                session: self.session.clone(),
                metrics: self.metrics.clone(),
            },
            self.config.poll_interval,
        )
    }

    pub fn delivery_flow(&self) -> DeliveryFlow {
        DeliveryFlow::new(
            Arc::new(self.api.clone()),
            self.photos.clone(),
            self.proofs.clone(),
        )
    }
}
