use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use moya_driver::config::Config;
use moya_driver::engine::launch::DriverTab;
use moya_driver::engine::lifecycle::DeliveryStage;
use moya_driver::error::{AppError, ErrorKind, ValidationError};
use moya_driver::location::{DeviceLocation, FixedPosition};
use moya_driver::models::location::GeoPoint;
use moya_driver::models::order::{OrderId, StatusBucket};
use moya_driver::models::session::{Role, SESSION_KEYS};
use moya_driver::realtime::{LocationPublisher, MemoryRealtimeStore, RestRealtimeStore};
use moya_driver::state::AppContext;
use moya_driver::storage::{KeyValueStorage, MemoryStorage};

#[derive(Clone, Default)]
struct Backend {
    calls: Arc<Mutex<Vec<(String, Option<String>)>>>,
    realtime_writes: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
}

impl Backend {
    fn record(&self, path: &str, headers: &HeaderMap) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.calls.lock().unwrap().push((path.to_string(), auth));
    }

    fn calls_to(&self, path: &str) -> Vec<Option<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, auth)| auth.clone())
            .collect()
    }
}

async fn login(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    backend.record("/api/login", &headers);

    match (body["username"].as_str(), body["password"].as_str()) {
        (Some("budi"), Some("rahasia")) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "token": "tok-123",
                "user": { "id": 7, "peran": "driver", "username": "budi", "nama_lengkap": "Budi Santoso" }
            })),
        ),
        (Some("admin"), _) => (
            StatusCode::OK,
            Json(json!({ "success": true, "token": "tok-admin", "user": { "id": 1, "peran": "admin" } })),
        ),
        (Some("frozen"), _) => (
            StatusCode::OK,
            Json(json!({ "success": false, "message": "Akun dinonaktifkan" })),
        ),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "Invalid credentials" })),
        ),
    }
}

async fn driver_orders(State(backend): State<Backend>, headers: HeaderMap) -> Json<Value> {
    backend.record("/api/driver/pesanan", &headers);
    Json(json!({
        "pesanan": [
            {
                "id": 1,
                "status": "Sedang_Proses",
                "pelanggan": { "nama_lengkap": "Sari", "nomor_telepon": "0813", "alamat": "Jl. Melati 2" },
                "jumlah_pesanan": 9
            },
            { "id": "2", "status": "baru", "jumlah_pesanan": "3" }
        ]
    }))
}

async fn order_detail(
    State(backend): State<Backend>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    backend.record("/api/driver/pesanan/:id", &headers);

    match id.as_str() {
        "1" => (
            StatusCode::OK,
            Json(json!({ "pesanan": {
                "id": 1,
                "status": "proses",
                "pelanggan": { "nama_lengkap": "Sari", "nomor_telepon": "0813", "alamat": "Jl. Melati 2" },
                "jumlah_pesanan": 9
            }})),
        ),
        "2" => (
            StatusCode::OK,
            Json(json!({ "data": { "pesanan": {
                "id": 2,
                "pelanggan": { "nama_lengkap": "Andi" },
                "jumlah_pesanan": "3"
            }}})),
        ),
        "3" => (
            StatusCode::OK,
            Json(json!({ "pesanan": { "id": 3, "jumlah_pesanan": 1 } })),
        ),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Pesanan tidak ditemukan" })),
        ),
    }
}

async fn logout(State(backend): State<Backend>, headers: HeaderMap) -> Json<Value> {
    backend.record("/api/logout", &headers);
    Json(json!({ "success": true }))
}

async fn shipments() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

async fn assign_driver(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({ "success": true, "assigned": body }))
}

async fn realtime_put(
    State(backend): State<Backend>,
    Path(node): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    backend
        .realtime_writes
        .lock()
        .unwrap()
        .push((node, query.get("auth").cloned(), body.clone()));
    Json(body)
}

async fn spawn_backend() -> (String, Backend) {
    let backend = Backend::default();
    let app = Router::new()
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/driver/pesanan", get(driver_orders))
        .route("/api/driver/pesanan/:id", get(order_detail))
        .route("/api/driver/pengiriman", get(shipments))
        .route("/api/admin/assign-driver", post(assign_driver))
        .route("/drivers/:node", put(realtime_put))
        .with_state(backend.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), backend)
}

fn context(base_url: &str) -> (AppContext, Arc<MemoryStorage>, Arc<MemoryRealtimeStore>) {
    let storage = Arc::new(MemoryStorage::new());
    let realtime = Arc::new(MemoryRealtimeStore::new());
    let position = GeoPoint::new(-6.2, 106.8).unwrap();
    let location = Arc::new(DeviceLocation::new(FixedPosition::new(Some(position))));

    let config = Config {
        api_base_url: base_url.to_string(),
        request_timeout: Duration::from_secs(5),
        proof_photo: Some("file:///bukti-1.jpg".to_string()),
        ..Config::default()
    };

    let ctx = AppContext::with_parts(config, storage.clone(), realtime.clone(), location).unwrap();
    (ctx, storage, realtime)
}

#[tokio::test]
async fn login_persists_session_and_authenticates_next_call() {
    let (base, backend) = spawn_backend().await;
    let (ctx, storage, _) = context(&base);

    let session = ctx.api.login("budi", "rahasia").await.unwrap();
    assert_eq!(session.role, Role::Driver);
    assert_eq!(session.driver_id, "7");

    let stored = storage.multi_get(&SESSION_KEYS).await.unwrap();
    assert_eq!(stored[0].as_deref(), Some("tok-123"));
    assert_eq!(stored[1].as_deref(), Some("driver"));
    assert_eq!(stored[2].as_deref(), Some("7"));
    assert!(stored[3].as_deref().unwrap().contains("Budi Santoso"));

    let orders = ctx.api.driver_orders().await.unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].bucket(), StatusBucket::InProgress);
    assert_eq!(orders[1].bucket(), StatusBucket::NotStarted);
    assert_eq!(orders[1].quantity_packs, 3);

    assert_eq!(
        backend.calls_to("/api/driver/pesanan"),
        vec![Some("Bearer tok-123".to_string())]
    );
}

#[tokio::test]
async fn invalid_login_never_persists_anything() {
    let (base, _backend) = spawn_backend().await;
    let (ctx, storage, _) = context(&base);

    let err = ctx.api.login("budi", "salah").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(err.user_message(), "wrong username or password");

    let err = ctx.api.login("frozen", "x").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Application);
    assert_eq!(err.user_message(), "Akun dinonaktifkan");

    assert!(storage.is_empty());
    assert!(ctx.session.get_all().is_none());
}

#[tokio::test]
async fn blank_credentials_are_rejected_before_any_request() {
    let (base, backend) = spawn_backend().await;
    let (ctx, _, _) = context(&base);

    let err = ctx.api.login("  ", "rahasia").await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Validation(ValidationError::MissingCredentials)
    ));
    assert!(backend.calls_to("/api/login").is_empty());
}

#[tokio::test]
async fn unrecognized_role_leaves_a_clean_slate() {
    let (base, _backend) = spawn_backend().await;
    let (ctx, storage, _) = context(&base);

    ctx.api.login("budi", "rahasia").await.unwrap();
    let err = ctx.api.login("admin", "x").await.unwrap_err();

    assert!(matches!(err, AppError::UnrecognizedRole(ref role) if role == "admin"));
    assert!(storage.is_empty());
    assert!(ctx.session.get_all().is_none());
}

#[tokio::test]
async fn logout_clears_session_and_later_calls_go_unauthenticated() {
    let (base, backend) = spawn_backend().await;
    let (ctx, storage, _) = context(&base);

    ctx.api.login("budi", "rahasia").await.unwrap();
    ctx.api.logout().await.unwrap();

    assert!(storage.is_empty());
    assert_eq!(
        backend.calls_to("/api/logout"),
        vec![Some("Bearer tok-123".to_string())]
    );

    ctx.api.driver_orders().await.unwrap();
    assert_eq!(backend.calls_to("/api/driver/pesanan"), vec![None]);
}

#[tokio::test]
async fn detail_without_customer_routes_to_error_state() {
    let (base, _backend) = spawn_backend().await;
    let (ctx, _, _) = context(&base);
    ctx.api.login("budi", "rahasia").await.unwrap();

    let mut flow = ctx.delivery_flow();
    flow.select(OrderId::new("3")).await.unwrap();
    match flow.stage() {
        DeliveryStage::DetailUnavailable { order_id, message, .. } => {
            assert_eq!(order_id.as_str(), "3");
            assert!(!message.is_empty());
        }
        other => panic!("unexpected stage {other:?}"),
    }

    flow.back().unwrap();
    flow.select(OrderId::new("2")).await.unwrap();
    match flow.stage() {
        DeliveryStage::ViewingDetail { detail } => {
            assert_eq!(detail.customer.display_name(), "Andi");
            assert_eq!(detail.customer.display_address(), "-");
            assert_eq!(detail.quantity_packs, 3);
        }
        other => panic!("unexpected stage {other:?}"),
    }
}

#[tokio::test]
async fn not_found_detail_carries_server_message() {
    let (base, _backend) = spawn_backend().await;
    let (ctx, _, _) = context(&base);

    let err = ctx.api.order_detail(&OrderId::new("404")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Application);
    assert_eq!(err.user_message(), "Pesanan tidak ditemukan");
}

#[tokio::test]
async fn delivery_completes_end_to_end() {
    let (base, _backend) = spawn_backend().await;
    let (ctx, _, _) = context(&base);
    ctx.api.login("budi", "rahasia").await.unwrap();

    let mut flow = ctx.delivery_flow();
    flow.select(OrderId::new("1")).await.unwrap();
    flow.mark_arrived().unwrap();
    assert!(flow.attach_photo().await.unwrap());
    flow.set_quantity("9").unwrap();
    flow.request_completion().unwrap();
    flow.confirm().await.unwrap();

    assert_eq!(flow.stage().next_tab(), Some(DriverTab::History));

    let pending = ctx.proofs.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].order_id.as_str(), "1");
    assert_eq!(pending[0].proof.photo_local_reference, "file:///bukti-1.jpg");
}

#[tokio::test]
async fn server_errors_are_not_parsed_as_payloads() {
    let (base, _backend) = spawn_backend().await;
    let (ctx, _, _) = context(&base);

    let err = ctx.api.driver_shipments().await.unwrap_err();
    assert!(matches!(err, AppError::Server { status: 503 }));
    assert_eq!(err.kind(), ErrorKind::Unknown);
}

#[tokio::test]
async fn assign_driver_returns_backend_payload() {
    let (base, _backend) = spawn_backend().await;
    let (ctx, _, _) = context(&base);

    let result = ctx.api.assign_driver(7, 12).await.unwrap();
    assert_eq!(result["assigned"]["driver_id"], 7);
    assert_eq!(result["assigned"]["pesanan_id"], 12);
}

#[tokio::test]
async fn unreachable_server_is_no_response() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (ctx, _, _) = context(&format!("http://{addr}"));
    let err = ctx.api.driver_orders().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoResponse);
}

#[tokio::test]
async fn realtime_rest_store_overwrites_driver_node() {
    let (base, backend) = spawn_backend().await;
    let store = RestRealtimeStore::new(&base, Some("secret".into()), Duration::from_secs(5)).unwrap();
    let publisher = LocationPublisher::new(Arc::new(store));

    let record = publisher
        .publish("7", GeoPoint::new(-6.9, 107.6).unwrap())
        .await
        .unwrap();

    let writes = backend.realtime_writes.lock().unwrap().clone();
    assert_eq!(writes.len(), 1);
    let (node, auth, body) = &writes[0];
    assert_eq!(node, "7.json");
    assert_eq!(auth.as_deref(), Some("secret"));
    assert_eq!(body["latitude"], -6.9);
    assert_eq!(body["longitude"], 107.6);
    assert_eq!(body["updated_at"], record.updated_at);
}

#[tokio::test]
async fn poller_publishes_location_and_shows_orders() {
    let (base, _backend) = spawn_backend().await;
    let (ctx, _, realtime) = context(&base);
    ctx.api.login("budi", "rahasia").await.unwrap();

    let poller = ctx.order_poller().start();
    let mut board = poller.subscribe();
    tokio::time::timeout(Duration::from_secs(5), board.wait_for(|b| b.generation >= 1))
        .await
        .unwrap()
        .unwrap();

    let snapshot = poller.board();
    assert!(!snapshot.loading);
    assert_eq!(snapshot.orders.len(), 2);
    assert!(snapshot.last_error.is_none());

    let node = realtime.get("drivers/7").unwrap();
    assert_eq!(node["latitude"], -6.2);

    poller.shutdown().await;
}
