//! The activation HTTP endpoint (§6): `POST /` accepting one MPC activation
//! request per call. Request/body encoding is the concern of this module
//! alone — `PlayerCoordinator` never sees HTTP types.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use ephemeral_core::{ActivationConfig, CoordError, GameId, Pod};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::service::{ActivationRequest, PlayerCoordinator};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    coordinator: Arc<PlayerCoordinator>,
}

impl AppState {
    /// Build the state for one running Activation instance.
    pub fn new(config: ActivationConfig, pod: Option<Pod>, ip: String) -> Self {
        Self {
            coordinator: Arc::new(PlayerCoordinator::new(config, pod, ip)),
        }
    }
}

/// The router this service serves: one route, `POST /`.
pub fn build_router(state: AppState) -> Router {
    Router::new().route("/", post(activate)).with_state(state)
}

#[derive(Debug, Deserialize)]
struct OutputSpec {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ActivationHttpRequest {
    #[serde(rename = "gameID")]
    game_id: String,
    code: Option<String>,
    #[serde(rename = "amphoraParams")]
    amphora_params: Option<Vec<String>>,
    #[serde(rename = "secretParams")]
    secret_params: Option<Vec<String>>,
    output: OutputSpec,
}

#[derive(Debug, Deserialize, Default)]
struct ActivateQuery {
    #[serde(default)]
    compile: bool,
}

#[derive(Debug, Serialize)]
struct ActivationHttpResponse {
    response: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ActivationHttpError {
    error: String,
}

async fn activate(
    State(state): State<AppState>,
    Query(query): Query<ActivateQuery>,
    body: Result<Json<ActivationHttpRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return json_rejection_response(rejection),
    };

    if request.amphora_params.is_some() == request.secret_params.is_some() {
        return validation_error("exactly one of amphoraParams or secretParams must be set");
    }
    let game_id = match GameId::parse(&request.game_id) {
        Ok(id) => id,
        Err(err) => return validation_error(format!("invalid gameID: {err}")),
    };
    if !matches!(
        request.output.kind.as_str(),
        "PLAINTEXT" | "SECRETSHARE" | "AMPHORASECRET"
    ) {
        return validation_error(format!("unknown output type {:?}", request.output.kind));
    }

    if query.compile && request.code.as_deref().unwrap_or_default().trim().is_empty() {
        return compilation_error("compile=true requires non-empty code");
    }

    let program_path = match stage_program(&request) {
        Ok(path) => path,
        Err(err) => return coordination_error(err),
    };

    let activation = ActivationRequest { game_id, program_path };
    match state.coordinator.run(activation).await {
        Ok(outcome) if outcome.success => (
            StatusCode::OK,
            Json(ActivationHttpResponse { response: Vec::new() }),
        )
            .into_response(),
        Ok(_) => coordination_error(CoordError::runtime("MPC runtime reported failure")),
        Err(err) => coordination_error(err),
    }
}

/// Write the submitted program to a scratch file the MPC runtime can be
/// pointed at. Staging the actual secret-share inputs is Amphora's job
/// (out of scope); this only persists `code` for the runtime invocation.
fn stage_program(request: &ActivationHttpRequest) -> Result<std::path::PathBuf, CoordError> {
    let code = request.code.as_deref().unwrap_or_default();
    let path = std::env::temp_dir().join(format!("ephemeral-program-{}.mpc", uuid::Uuid::new_v4()));
    std::fs::write(&path, code).map_err(CoordError::from)?;
    Ok(path)
}

fn json_rejection_response(rejection: JsonRejection) -> Response {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Json(ActivationHttpError {
                error: "Content-Type must be application/json".to_string(),
            }),
        )
            .into_response(),
        other => validation_error(other.to_string()),
    }
}

fn validation_error(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ActivationHttpError { error: message.into() }),
    )
        .into_response()
}

fn compilation_error(message: impl Into<String>) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ActivationHttpError { error: message.into() }),
    )
        .into_response()
}

fn coordination_error(err: CoordError) -> Response {
    tracing::warn!(%err, "activation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ActivationHttpError { error: err.to_string() }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use ephemeral_core::{ConfigDuration, SpdzParameters, TupleStoreConfig};
    use std::collections::HashMap;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_config() -> ActivationConfig {
        ActivationConfig {
            player_id: 0,
            http_address: "127.0.0.1:0".to_string(),
            discovery_address: "http://127.0.0.1:1".to_string(),
            mpc_runtime_path: "/bin/true".to_string(),
            spdz: SpdzParameters {
                prime: "7".to_string(),
                r_inv: "1".to_string(),
                mac_keys: HashMap::new(),
            },
            tuple_store: TupleStoreConfig {
                endpoint: "http://127.0.0.1:1".to_string(),
                batch_size: 1,
            },
            peer_connect_timeout: ConfigDuration::from_duration(Duration::from_secs(1)),
            runtime_exit_timeout: ConfigDuration::from_duration(Duration::from_secs(1)),
            peer_proxy_base_port: 40000,
        }
    }

    fn router() -> Router {
        build_router(AppState::new(test_config(), None, "127.0.0.1".to_string()))
    }

    #[tokio::test]
    async fn non_json_content_type_is_rejected_with_415() {
        let response = router()
            .oneshot(
                Request::post("/")
                    .header("content-type", "text/plain")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn get_is_rejected_with_405() {
        let response = router()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn both_param_kinds_set_is_a_validation_error() {
        let body = serde_json::json!({
            "gameID": GameId::new().to_string(),
            "amphoraParams": ["00000000-0000-0000-0000-000000000000"],
            "secretParams": ["AAAA"],
            "output": {"type": "PLAINTEXT"}
        });
        let response = router()
            .oneshot(
                Request::post("/")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_game_id_is_a_validation_error() {
        let body = serde_json::json!({
            "gameID": "not-a-uuid",
            "secretParams": ["AAAA"],
            "output": {"type": "PLAINTEXT"}
        });
        let response = router()
            .oneshot(
                Request::post("/")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn compile_requested_with_no_code_is_a_compilation_failure() {
        let body = serde_json::json!({
            "gameID": GameId::new().to_string(),
            "secretParams": ["AAAA"],
            "output": {"type": "PLAINTEXT"}
        });
        let response = router()
            .oneshot(
                Request::post("/?compile=true")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
