use std::error::Error as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::engine::lifecycle::OrderDetailSource;
use crate::engine::poller::OrderFeed;
use crate::error::{AppError, ValidationError};
use crate::models::location::GeoPoint;
use crate::models::order::{Order, OrderDetail, OrderId, OrderListEnvelope};
use crate::models::session::{Role, Session};
use crate::observability::metrics::Metrics;
use crate::session::SessionStore;

/// HTTP client for the dispatch backend. Credentials are read from the
/// injected [`SessionStore`] at send time, never cached here.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    session: Arc<SessionStore>,
    metrics: Metrics,
}

struct ApiResponse {
    status: StatusCode,
    payload: Value,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user: Option<Value>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        session: Arc<SessionStore>,
        metrics: Metrics,
    ) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
            metrics,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Logs in and persists the session before returning, so the next call
    /// on this client is already authenticated.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, AppError> {
        if username.trim().is_empty() || password.trim().is_empty() {
            return Err(ValidationError::MissingCredentials.into());
        }

        info!(username, base_url = %self.base_url, "attempting login");

        let body = json!({ "username": username, "password": password });
        let response = self
            .send(Method::POST, "/api/login", Some(&body), "login")
            .await
            .map_err(|err| match err {
                AppError::Unauthorized(_) => {
                    AppError::Unauthorized("wrong username or password".to_string())
                }
                other => other,
            })?;

        let succeeded = response.payload.get("success").and_then(Value::as_bool) == Some(true);
        if response.status != StatusCode::OK || !succeeded {
            warn!(status = %response.status, "login rejected");
            return Err(AppError::Application {
                message: payload_message(&response.payload).unwrap_or_else(|| "login failed".into()),
            });
        }

        let login: LoginResponse = serde_json::from_value(response.payload)
            .map_err(|err| AppError::Decode(format!("login response: {err}")))?;
        let user = login.user.unwrap_or_else(|| Value::Object(Default::default()));

        let raw_role = user
            .get("peran")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let Some(role) = Role::parse(&raw_role) else {
            if let Err(err) = self.session.clear().await {
                warn!(error = %err, "failed to clear session after unrecognized role");
            }
            return Err(AppError::UnrecognizedRole(raw_role));
        };

        let token = login
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::MalformedPayload("login response has no token".into()))?;

        let driver_id = match user.get("id") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        };

        let session = Session {
            token,
            role,
            driver_id,
            raw_user_data: user,
        };
        self.session.set(session.clone()).await?;

        info!(role = %session.role, driver_id = %session.driver_id, "login succeeded");
        Ok(session)
    }

    /// Tells the backend, then wipes the local session whatever the backend
    /// answered.
    pub async fn logout(&self) -> Result<(), AppError> {
        if self.session.is_authenticated() {
            if let Err(err) = self.send(Method::POST, "/api/logout", None, "logout").await {
                warn!(error = %err, "logout request failed; clearing local session anyway");
            }
        }
        self.session.clear().await
    }

    pub async fn driver_orders(&self) -> Result<Vec<Order>, AppError> {
        let response = self
            .send(Method::GET, "/api/driver/pesanan", None, "driver_orders")
            .await?;

        let envelope: OrderListEnvelope = serde_json::from_value(response.payload)
            .map_err(|err| AppError::Decode(format!("order list: {err}")))?;
        let orders = envelope.pesanan.unwrap_or_default();

        debug!(count = orders.len(), "driver orders fetched");
        Ok(orders)
    }

    pub async fn order_detail(&self, id: &OrderId) -> Result<OrderDetail, AppError> {
        if id.as_str().trim().is_empty() {
            return Err(ValidationError::MissingOrderId.into());
        }

        let path = format!("/api/driver/pesanan/{id}");
        let response = self.send(Method::GET, &path, None, "order_detail").await?;
        OrderDetail::from_envelope(id, response.payload)
    }

    /// Shipment history as the backend returns it.
    pub async fn driver_shipments(&self) -> Result<Value, AppError> {
        let response = self
            .send(Method::GET, "/api/driver/pengiriman", None, "driver_shipments")
            .await?;
        Ok(response.payload)
    }

    pub async fn assign_driver(&self, driver_id: i64, order_id: i64) -> Result<Value, AppError> {
        let body = json!({ "driver_id": driver_id, "pesanan_id": order_id });
        let response = self
            .send(Method::POST, "/api/admin/assign-driver", Some(&body), "assign_driver")
            .await?;
        Ok(response.payload)
    }

    /// Reports a position through the backend rather than the realtime store.
    pub async fn report_location(&self, point: GeoPoint) -> Result<Value, AppError> {
        let body = json!({ "latitude": point.latitude, "longitude": point.longitude });
        let response = self
            .send(Method::POST, "/driver/lokasi", Some(&body), "report_location")
            .await?;
        Ok(response.payload)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        endpoint: &'static str,
    ) -> Result<ApiResponse, AppError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(ACCEPT, "application/json");

        if let Some(session) = self.session.get_all() {
            request = request.bearer_auth(&session.token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let start = Instant::now();
        let result = exchange(request).await;
        let elapsed = start.elapsed().as_secs_f64();

        self.metrics
            .api_request_latency_seconds
            .with_label_values(&[endpoint])
            .observe(elapsed);
        let outcome = if result.is_ok() { "success" } else { "error" };
        self.metrics
            .api_requests_total
            .with_label_values(&[endpoint, outcome])
            .inc();

        if let Err(err) = &result {
            warn!(%method, url = %url, error = %err, "api request failed");
        }
        result
    }
}

async fn exchange(request: reqwest::RequestBuilder) -> Result<ApiResponse, AppError> {
    let response = request.send().await.map_err(classify_transport)?;
    let status = response.status();

    if status.is_server_error() {
        return Err(AppError::Server {
            status: status.as_u16(),
        });
    }

    let text = response.text().await.map_err(classify_transport)?;
    let payload: Option<Value> = if text.trim().is_empty() {
        Some(Value::Null)
    } else {
        serde_json::from_str(&text).ok()
    };

    if status == StatusCode::UNAUTHORIZED {
        let message = payload
            .as_ref()
            .and_then(payload_message)
            .unwrap_or_else(|| "session expired, please log in again".to_string());
        return Err(AppError::Unauthorized(message));
    }

    let payload = payload.ok_or_else(|| {
        AppError::Decode(format!("HTTP {status} response is not JSON"))
    })?;

    let flagged_failure = payload.get("success").and_then(Value::as_bool) == Some(false);
    if flagged_failure || !status.is_success() {
        let message = payload_message(&payload)
            .unwrap_or_else(|| format!("request failed with HTTP {}", status.as_u16()));
        return Err(AppError::Application { message });
    }

    Ok(ApiResponse { status, payload })
}

fn payload_message(payload: &Value) -> Option<String> {
    payload
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

fn classify_transport(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        return AppError::NoResponse("connection timed out".to_string());
    }
    if err.is_decode() {
        return AppError::Decode(err.to_string());
    }
    if err.is_builder() {
        return AppError::Internal(format!("invalid request: {err}"));
    }
    if err.is_connect() {
        if is_dns_failure(&err) {
            return AppError::NoResponse(format!("server not found: {err}"));
        }
        return AppError::NoResponse(format!("server unreachable: {err}"));
    }
    AppError::NoResponse(err.to_string())
}

fn is_dns_failure(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string().to_lowercase();
        if text.contains("dns") || text.contains("lookup") || text.contains("resolve") {
            return true;
        }
        source = inner.source();
    }
    false
}

#[async_trait]
impl OrderFeed for ApiClient {
    async fn assigned_orders(&self) -> Result<Vec<Order>, AppError> {
        self.driver_orders().await
    }
}

#[async_trait]
impl OrderDetailSource for ApiClient {
    async fn order_detail(&self, id: &OrderId) -> Result<OrderDetail, AppError> {
        ApiClient::order_detail(self, id).await
    }
}
