//! HTTP API Server
//!
//! REST API for status snapshots and operator overrides.

use std::sync::Arc;
use axum::{
    extract::{State, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::state::{ClusterArbiter, ClusterRole, ClusterStatus, ElectionPolicy};
use crate::error::{Error, Result};

/// Shared application state
pub struct AppState {
    /// Serial of this node, for logging
    pub node_serial: String,
    /// The arbiter being exposed
    pub arbiter: Arc<ClusterArbiter>,
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, node_serial: String, arbiter: Arc<ClusterArbiter>) -> Self {
        let state = Arc::new(AppState { node_serial, arbiter });
        Self { config, state }
    }

    /// Get the state for sharing with other components
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Create the router
    pub fn create_router(state: Arc<AppState>) -> Router {
        Router::new()
            // Status and info
            .route("/status", get(handle_status))
            .route("/health", get(handle_health))
            // Admin operations
            .route("/admin/role", post(handle_force_role))
            .route("/admin/recovery", post(handle_recovery))
            .route("/admin/resolve", post(handle_resolve))
            .with_state(state)
    }

    /// Start the HTTP server
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return Ok(());
        }

        let mut app = Self::create_router(Arc::clone(&self.state)).layer(TraceLayer::new_for_http());
        if self.config.cors_enabled {
            app = app.layer(CorsLayer::permissive());
        }

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Request/Response Types ============

/// Force role request
#[derive(Debug, Deserialize, Serialize)]
pub struct ForceRoleRequest {
    pub role: String,
}

/// Recovery settings request
#[derive(Debug, Deserialize, Serialize)]
pub struct RecoveryRequest {
    pub enabled: bool,
    #[serde(default)]
    pub policy: Option<ElectionPolicy>,
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub local_role: ClusterRole,
    pub heartbeat_up: bool,
    pub split_brain_detected: bool,
}

/// Resolver response
#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub resolution: String,
    pub status: ClusterStatus,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Arbiter error rendered as JSON
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
            code: self.0.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ============ Handlers ============

async fn handle_status(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<ClusterStatus>, ApiError> {
    Ok(Json(state.arbiter.get_status()?))
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    match state.arbiter.get_status() {
        Ok(status) => {
            let healthy = !status.split_brain_detected;
            let code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
            (
                code,
                Json(HealthResponse {
                    healthy,
                    local_role: status.local_role,
                    heartbeat_up: status.heartbeat_up,
                    split_brain_detected: status.split_brain_detected,
                }),
            )
                .into_response()
        }
        Err(e) => ApiError(e).into_response(),
    }
}

async fn handle_force_role(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForceRoleRequest>,
) -> std::result::Result<Json<ClusterStatus>, ApiError> {
    let role = ClusterRole::parse(&req.role)?;
    tracing::info!("Operator requested role {} on node {} via API", role, state.node_serial);

    state.arbiter.force_role(role)?;
    Ok(Json(state.arbiter.get_status()?))
}

async fn handle_recovery(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecoveryRequest>,
) -> std::result::Result<Json<ClusterStatus>, ApiError> {
    if let Some(policy) = req.policy {
        state.arbiter.set_election_policy(policy)?;
    }
    state.arbiter.set_auto_recovery(req.enabled)?;
    Ok(Json(state.arbiter.get_status()?))
}

async fn handle_resolve(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<ResolveResponse>, ApiError> {
    let resolution = state.arbiter.resolve_now()?;
    Ok(Json(ResolveResponse {
        resolution: format!("{:?}", resolution),
        status: state.arbiter.get_status()?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::heartbeat::{HeartbeatMessage, HeartbeatSender};
    use crate::plane::{LoggingNetworkPlane, RoleActuator};
    use crate::state::{BoundedSerial, Collaborators};
    use crate::uptime::{PeerUptime, SystemUptime};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct NullSender;

    impl HeartbeatSender for NullSender {
        fn send(&self, _msg: HeartbeatMessage) {}
    }

    fn app(initialized: bool) -> (Router, Arc<ClusterArbiter>) {
        let arbiter = Arc::new(ClusterArbiter::new(Collaborators {
            actuator: RoleActuator::new(Arc::new(LoggingNetworkPlane)),
            sender: Arc::new(NullSender),
            uptime: Arc::new(SystemUptime::new(Arc::new(PeerUptime::new()))),
            clock: Arc::new(SystemClock),
        }));
        if initialized {
            arbiter.init(42, "SN1000").unwrap();
        }
        let state = Arc::new(AppState {
            node_serial: "SN1000".to_string(),
            arbiter: Arc::clone(&arbiter),
        });
        (HttpServer::create_router(state), arbiter)
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let (app, _) = app(true);
        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let status: ClusterStatus = json(response).await;
        assert_eq!(status.cluster_id, 42);
        assert_eq!(status.local_role, ClusterRole::Init);
        assert_eq!(status.local_serial, BoundedSerial::new("SN1000"));
    }

    #[tokio::test]
    async fn test_status_before_init() {
        let (app, _) = app(false);
        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let error: ErrorResponse = json(response).await;
        assert_eq!(error.code, "NOT_INITIALIZED");
    }

    #[tokio::test]
    async fn test_force_role_endpoint() {
        let (app, arbiter) = app(true);
        let response = app
            .oneshot(post("/admin/role", serde_json::json!({ "role": "active" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let status: ClusterStatus = json(response).await;
        assert_eq!(status.local_role, ClusterRole::Active);
        assert_eq!(arbiter.get_status().unwrap().local_role, ClusterRole::Active);
    }

    #[tokio::test]
    async fn test_force_role_rejects_split() {
        let (app, arbiter) = app(true);
        let response = app
            .oneshot(post("/admin/role", serde_json::json!({ "role": "split" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(arbiter.get_status().unwrap().local_role, ClusterRole::Init);
    }

    #[tokio::test]
    async fn test_recovery_endpoint() {
        let (app, arbiter) = app(true);
        let response = app
            .oneshot(post(
                "/admin/recovery",
                serde_json::json!({ "enabled": true, "policy": "uptime" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let status = arbiter.get_status().unwrap();
        assert!(status.auto_recovery_enabled);
        assert_eq!(status.election_policy, ElectionPolicy::Uptime);
    }

    #[tokio::test]
    async fn test_health_reports_split_brain() {
        let (app, arbiter) = app(true);
        arbiter.force_role(ClusterRole::Active).unwrap();
        arbiter
            .receive(&HeartbeatMessage {
                cluster_id: 42,
                sender_role: ClusterRole::Active,
                sender_serial: BoundedSerial::new("SN2000"),
                timestamp: chrono::Utc::now(),
            })
            .unwrap();
        arbiter.tick().unwrap();

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let health: HealthResponse = json(response).await;
        assert!(!health.healthy);
        assert!(health.split_brain_detected);
    }

    #[tokio::test]
    async fn test_resolve_endpoint() {
        let (app, arbiter) = app(true);
        arbiter.force_role(ClusterRole::Active).unwrap();
        arbiter
            .receive(&HeartbeatMessage {
                cluster_id: 42,
                sender_role: ClusterRole::Active,
                sender_serial: BoundedSerial::new("SN0500"),
                timestamp: chrono::Utc::now(),
            })
            .unwrap();
        // Manual recovery: the tick raises the split and leaves it outstanding
        arbiter.tick().unwrap();
        assert!(arbiter.get_status().unwrap().split_brain_detected);

        let response = app
            .oneshot(post("/admin/resolve", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: ResolveResponse = json(response).await;
        assert_eq!(body.resolution, "Demoted");
        assert_eq!(body.status.local_role, ClusterRole::Standby);
        assert!(!body.status.split_brain_detected);
    }

    #[tokio::test]
    async fn test_resolve_endpoint_without_split() {
        let (app, arbiter) = app(true);
        arbiter.force_role(ClusterRole::Active).unwrap();
        arbiter
            .receive(&HeartbeatMessage {
                cluster_id: 42,
                sender_role: ClusterRole::Standby,
                sender_serial: BoundedSerial::new("SN0500"),
                timestamp: chrono::Utc::now(),
            })
            .unwrap();

        let response = app
            .oneshot(post("/admin/resolve", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: ResolveResponse = json(response).await;
        assert_eq!(body.resolution, "NoSplit");
        assert_eq!(body.status.local_role, ClusterRole::Active);
        assert_eq!(arbiter.get_status().unwrap().local_role, ClusterRole::Active);
    }
}
