/**
 * API REST CONSOLE LASER - Interface opérateur
 *
 * RÔLE :
 * Expose l'état miroir des lasers et les commandes opérateur.
 * C'est ici que les saisies opérateur sont bornées avant d'atteindre le dispatcher.
 *
 * FONCTIONNEMENT :
 * - Routes : /health, /devices, /power-limit, /session
 * - Lectures directes du registry (verrou court, jamais tenu sur un await)
 * - Commandes détachées : réponse 202, l'effet arrive plus tard via le stream
 *
 * SÉCURITÉ :
 * - Header x-api-key obligatoire sur toutes routes sauf /health
 */

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use laser_core::{
    CommandDispatcher, CommandHandle, Device, DeviceRegistry, Flags, HeadInfo, Session, Shared,
    Signal,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

const STALE_AFTER: Duration = Duration::seconds(5);

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Mutex<Session>>,
    pub registry: Shared<DeviceRegistry>,
    pub dispatcher: CommandDispatcher,
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(session: Session, api_key: Option<String>) -> Self {
        Self {
            registry: session.registry(),
            dispatcher: session.dispatcher().clone(),
            session: Arc::new(Mutex::new(session)),
            api_key,
        }
    }
}

#[derive(Serialize)]
struct DeviceView {
    head: HeadInfo,
    flags: Flags,
    power_limit: f64,
    signals: BTreeMap<&'static str, Option<f64>>,
    last_update: Option<String>, // RFC3339
    stale: bool,                 // true si > 5s sans push
    stale_for_seconds: Option<i64>,
}

fn to_view(d: &Device) -> DeviceView {
    let now = OffsetDateTime::now_utc();
    let age = d.last_update.map(|t| now - t);

    DeviceView {
        head: d.head.clone(),
        flags: d.flags,
        power_limit: d.power_limit,
        signals: Signal::ALL.iter().map(|s| (s.as_str(), d.latest(*s))).collect(),
        last_update: d.last_update.and_then(|t| t.format(&Rfc3339).ok()),
        stale: age.map(|a| a > STALE_AFTER).unwrap_or(true),
        stale_for_seconds: age.map(|a| a.whole_seconds().max(0)),
    }
}

#[derive(Debug, Deserialize)]
struct ValueBody {
    value: f64,
}

async fn require_api_key(
    State(app): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Health check toujours accessible
    if req.uri().path().starts_with("/health") {
        return Ok(next.run(req).await);
    }

    let Some(expected) = app.api_key.as_deref() else {
        error!("[console] SECURITY: LASER_CONSOLE_API_KEY not set - API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        warn!("[console] rejected request to {} (bad api key)", req.uri().path());
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/devices", get(get_devices))
        .route("/devices/{serial}", get(get_device))
        .route("/devices/{serial}/history/{signal}", get(get_history))
        .route("/devices/{serial}/enable", post(enable))
        .route("/devices/{serial}/disable", post(disable))
        .route("/devices/{serial}/remote/toggle", post(toggle_remote))
        .route("/devices/{serial}/power", post(set_power))
        .route("/power-limit", put(set_power_limit))
        .route("/session", get(get_session))
        .route("/session/start", post(start_session))
        .route("/session/stop", post(stop_session))
        .with_state(app_state.clone())
        .layer(middleware::from_fn_with_state(app_state, require_api_key))
}

// GET /devices (liste)
async fn get_devices(State(app): State<AppState>) -> Json<Vec<DeviceView>> {
    let list: Vec<DeviceView> = app.registry.lock().devices().map(to_view).collect();
    Json(list)
}

// GET /devices/{serial} (détail)
async fn get_device(
    State(app): State<AppState>,
    Path(serial): Path<String>,
) -> Result<Json<DeviceView>, StatusCode> {
    let registry = app.registry.lock();
    let Some(d) = registry.get(&serial) else { return Err(StatusCode::NOT_FOUND); };
    Ok(Json(to_view(d)))
}

// GET /devices/{serial}/history/{signal} (série pour les graphes)
async fn get_history(
    State(app): State<AppState>,
    Path((serial, signal)): Path<(String, String)>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let signal: Signal = signal
        .parse()
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(json!({ "error": format!("{e}") }))))?;

    let registry = app.registry.lock();
    let Some(d) = registry.get(&serial) else {
        return Err((StatusCode::NOT_FOUND, Json(json!({ "error": "unknown device" }))));
    };
    Ok(Json(json!({
        "serial": serial,
        "signal": signal,
        "samples": d.history(signal).to_vec(),
    })))
}

fn accepted(handle: CommandHandle) -> (StatusCode, Json<Value>) {
    let requests: Vec<String> = handle.requests().iter().map(|r| r.to_string()).collect();
    handle.detach();
    (StatusCode::ACCEPTED, Json(json!({ "ok": true, "requests": requests })))
}

fn known(app: &AppState, serial: &str) -> Result<(), StatusCode> {
    if app.registry.lock().contains(serial) {
        Ok(())
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

// POST /devices/{serial}/enable
async fn enable(
    State(app): State<AppState>,
    Path(serial): Path<String>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    known(&app, &serial)?;
    Ok(accepted(app.dispatcher.enable(&serial)))
}

// POST /devices/{serial}/disable
async fn disable(
    State(app): State<AppState>,
    Path(serial): Path<String>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    known(&app, &serial)?;
    Ok(accepted(app.dispatcher.disable(&serial)))
}

// POST /devices/{serial}/remote/toggle
async fn toggle_remote(
    State(app): State<AppState>,
    Path(serial): Path<String>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    known(&app, &serial)?;
    Ok(accepted(app.dispatcher.toggle_remote_control(&serial)))
}

// POST /devices/{serial}/power {"value": mW}
async fn set_power(
    State(app): State<AppState>,
    Path(serial): Path<String>,
    Json(body): Json<ValueBody>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let limit = app
        .registry
        .lock()
        .get(&serial)
        .map(|d| d.power_limit)
        .ok_or_else(|| (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown device" }))))?;

    if !body.value.is_finite() || body.value < 0.0 || body.value > limit {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("power must be within [0, {limit}]") })),
        ));
    }
    Ok(accepted(app.dispatcher.set_power(&serial, body.value)))
}

// PUT /power-limit {"value": mW} (local uniquement)
async fn set_power_limit(
    State(app): State<AppState>,
    Json(body): Json<ValueBody>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !body.value.is_finite() || body.value < 0.0 {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "power limit must be a non-negative number" })),
        ));
    }
    app.dispatcher.set_power_limit(body.value);
    Ok(Json(json!({ "power_limit": body.value })))
}

// GET /session
async fn get_session(State(app): State<AppState>) -> Json<Value> {
    let session = app.session.lock().await;
    Json(json!({
        "state": session.state(),
        "stream": session.stream_state(),
        "devices": app.registry.lock().len(),
    }))
}

// POST /session/start
async fn start_session(State(app): State<AppState>) -> (StatusCode, Json<Value>) {
    let mut session = app.session.lock().await;
    match session.start().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "state": session.state(), "stream": session.stream_state() })),
        ),
        Err(e) => {
            error!("[console] session start failed: {}", e);
            (StatusCode::BAD_GATEWAY, Json(json!({ "error": e.to_string() })))
        }
    }
}

// POST /session/stop
async fn stop_session(State(app): State<AppState>) -> Json<Value> {
    let mut session = app.session.lock().await;
    let outcomes = session.stop().await;
    let failed: Vec<String> = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().err().map(|e| format!("{}: {}", o.request, e)))
        .collect();
    info!("[console] session stopped via API ({} commands, {} failed)", outcomes.len(), failed.len());

    Json(json!({
        "state": session.state(),
        "commands": outcomes.len(),
        "failed": failed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use laser_core::{Command, CommandValue, SessionConfig};
    use laser_devkit::{DeviceRecordBuilder, MockDeviceApi, MockStreamConnector};
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    async fn started_app() -> (Router, AppState, MockDeviceApi) {
        let api = MockDeviceApi::with_devices(vec![
            DeviceRecordBuilder::new("A")
                .software_switch(true)
                .remote_control(false)
                .signal(Signal::Power, 12.0)
                .build(),
            DeviceRecordBuilder::new("B").build(),
        ]);
        let mut session = Session::new(
            Arc::new(api.clone()),
            Arc::new(MockStreamConnector::new()),
            &SessionConfig {
                power_limit: 100.0,
                ..Default::default()
            },
        );
        session.start().await.unwrap();

        let state = AppState::new(session, Some(KEY.to_string()));
        (build_router(state.clone()), state, api)
    }

    fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-api-key", KEY)
            .header("content-type", "application/json");
        match body {
            Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn wait_sent(api: &MockDeviceApi, count: usize) {
        for _ in 0..100 {
            if api.sent_commands().len() >= count {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_health_is_open_and_devices_need_key() {
        let (app, _, _) = started_app().await;

        let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
        assert_eq!(app.clone().oneshot(health).await.unwrap().status(), StatusCode::OK);

        let anonymous = Request::builder().uri("/devices").body(Body::empty()).unwrap();
        assert_eq!(app.clone().oneshot(anonymous).await.unwrap().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_api_key_config_denies_access() {
        let (_, state, _) = started_app().await;
        let app = build_router(AppState { api_key: None, ..state });

        let (status, _) = send(&app, request("GET", "/devices", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_device_views() {
        let (app, _, _) = started_app().await;

        let (status, body) = send(&app, request("GET", "/devices", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (status, body) = send(&app, request("GET", "/devices/A", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["head"]["serial"], "A");
        assert_eq!(body["head"]["type"], "MiniX");
        assert_eq!(body["flags"]["softwareSwitch"], true);
        assert_eq!(body["signals"]["power"], 12.0);
        assert_eq!(body["signals"]["lddCurrent"], Value::Null);
        assert_eq!(body["power_limit"], 100.0);
        assert_eq!(body["stale"], false);

        let (status, _) = send(&app, request("GET", "/devices/Z", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_history_route() {
        let (app, _, _) = started_app().await;

        let (status, body) = send(&app, request("GET", "/devices/A/history/power", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["samples"], json!([12.0]));
        assert_eq!(body["signal"], "power");

        let (status, _) = send(&app, request("GET", "/devices/A/history/wavelength", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_disable_route_sends_remote_first() {
        let (app, _, api) = started_app().await;

        let (status, body) = send(&app, request("POST", "/devices/A/disable", None)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["requests"], json!(["remote(A, true)", "disable(A)"]));

        wait_sent(&api, 2).await;
        assert_eq!(
            api.sent_commands(),
            vec![
                ("A".to_string(), Command::Remote, Some(CommandValue::Bool(true))),
                ("A".to_string(), Command::Disable, None),
            ]
        );
    }

    #[tokio::test]
    async fn test_power_is_bounded_by_limit() {
        let (app, _, api) = started_app().await;

        let (status, _) = send(&app, request("POST", "/devices/A/power", Some(json!({"value": 150.0})))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, request("POST", "/devices/A/power", Some(json!({"value": -1.0})))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, request("POST", "/devices/Z/power", Some(json!({"value": 1.0})))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, request("POST", "/devices/A/power", Some(json!({"value": 42.0})))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        wait_sent(&api, 1).await;
        assert_eq!(
            api.sent_commands(),
            vec![("A".to_string(), Command::Power, Some(CommandValue::Number(42.0)))]
        );
    }

    #[tokio::test]
    async fn test_power_limit_route() {
        let (app, state, api) = started_app().await;

        let (status, _) = send(&app, request("PUT", "/power-limit", Some(json!({"value": -5.0})))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, request("PUT", "/power-limit", Some(json!({"value": 200.0})))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["power_limit"], 200.0);
        assert_eq!(state.registry.lock().get("B").unwrap().power_limit, 200.0);

        let (status, _) = send(&app, request("POST", "/devices/A/power", Some(json!({"value": 150.0})))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        wait_sent(&api, 1).await;
    }

    #[tokio::test]
    async fn test_session_stop_and_restart() {
        let (app, state, api) = started_app().await;

        let (status, body) = send(&app, request("POST", "/session/stop", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "stopped");
        assert_eq!(body["commands"], 6);
        assert!(state.registry.lock().is_empty());
        assert_eq!(api.sent_for("A").len(), 3);

        let (status, _) = send(&app, request("POST", "/devices/A/enable", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, request("POST", "/session/start", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "running");
        assert_eq!(body["stream"], "open");
        assert_eq!(state.registry.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_session_start_reports_discovery_failure() {
        let (app, _, api) = started_app().await;
        send(&app, request("POST", "/session/stop", None)).await;
        api.fail_discovery("device server down");

        let (status, body) = send(&app, request("POST", "/session/start", None)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("device server down"));

        let (_, body) = send(&app, request("GET", "/session", None)).await;
        assert_eq!(body["state"], "stopped");
        assert_eq!(body["stream"], "closed");
    }
}
