use std::time::Duration;

use axum::extract::State;
use axum::{Json, Router, http::StatusCode, routing::post};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::data::{SchedulingParameters, TeamSchedule};
use crate::error::SchedulerError;
use crate::search::CancelToken;
use crate::solver::{self, Backend, SolveOptions, SolveOutcome};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(60);

/// Settings shared by every request.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    /// Applied to requests that do not set `timeLimitMs`.
    pub default_time_limit: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_time_limit: DEFAULT_TIME_LIMIT,
        }
    }
}

impl ServerConfig {
    /// Reads `SCHEDULER_TIME_LIMIT_MS`, falling back to the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var("SCHEDULER_TIME_LIMIT_MS") {
            match value.parse::<u64>() {
                Ok(ms) => config.default_time_limit = Duration::from_millis(ms),
                Err(e) => warn!("Ignoring SCHEDULER_TIME_LIMIT_MS={value}: {e}"),
            }
        }
        config
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLimits {
    pub node_limit: Option<u64>,
    pub time_limit_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveRequest {
    pub parameters: SchedulingParameters,
    #[serde(default)]
    pub limits: RequestLimits,
    #[serde(default)]
    pub backend: Backend,
}

impl SolveRequest {
    fn options(&self, config: &ServerConfig) -> SolveOptions {
        let time_limit = self
            .limits
            .time_limit_ms
            .map_or(config.default_time_limit, Duration::from_millis);
        let mut options = SolveOptions::default()
            .with_backend(self.backend)
            .with_time_limit(time_limit);
        if let Some(nodes) = self.limits.node_limit {
            options = options.with_node_limit(nodes);
        }
        options
    }
}

/// Cancels the search when the request future is dropped, e.g. because the
/// client went away.
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SolveResponse {
    Solved {
        objective: i64,
        optimal: bool,
        nodes: u64,
        elapsed_ms: u64,
        teams: Vec<TeamSchedule>,
    },
    Infeasible {
        nodes: u64,
        elapsed_ms: u64,
        /// False when a limit stopped the search before it could prove
        /// infeasibility.
        exhausted: bool,
    },
}

impl From<SolveOutcome> for SolveResponse {
    fn from(outcome: SolveOutcome) -> Self {
        match outcome {
            SolveOutcome::Solved {
                schedule,
                objective,
                optimal,
                stats,
            } => SolveResponse::Solved {
                objective,
                optimal,
                nodes: stats.nodes,
                elapsed_ms: stats.elapsed.as_millis() as u64,
                teams: schedule.into_values().collect(),
            },
            SolveOutcome::Infeasible { stats } => SolveResponse::Infeasible {
                nodes: stats.nodes,
                elapsed_ms: stats.elapsed.as_millis() as u64,
                exhausted: stats.exhausted,
            },
        }
    }
}

async fn solve_handler(
    State(config): State<ServerConfig>,
    Json(request): Json<SolveRequest>,
) -> Result<Json<SolveResponse>, (StatusCode, String)> {
    let cancel = CancelToken::new();
    let _guard = CancelOnDrop(cancel.clone());
    let options = request.options(&config).with_cancel(cancel);
    // the search blocks for its whole budget
    let result = tokio::task::spawn_blocking(move || solver::solve(&request.parameters, &options))
        .await
        .map_err(|e| {
            error!("Solver task failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    match result {
        Ok(outcome) => Ok(Json(outcome.into())),
        Err(e @ SchedulerError::InconsistentParameters(_)) => {
            Err((StatusCode::BAD_REQUEST, e.to_string()))
        }
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

pub fn router(config: ServerConfig) -> Router {
    Router::new()
        .route("/v1/schedule/solve", post(solve_handler))
        .with_state(config)
}

pub async fn run_server(addr: &str, config: ServerConfig) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(
        "Server running at http://{} (default time limit {:?})",
        listener.local_addr()?,
        config.default_time_limit
    );

    axum::serve(listener, router(config)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn parameters(max_slots: usize) -> Value {
        json!({
            "judgingGroups": [{"id": 1, "teamCount": 1}],
            "categories": [{"name": "Robot Design", "durationSlots": 2}],
            "numTables": 1,
            "performanceDurationSlots": 1,
            "numRounds": 1,
            "changetimeSlots": 1,
            "maxSlots": max_slots,
            "slotMinutes": 10,
            "performanceWarmupMinutes": 0
        })
    }

    async fn send_with(config: ServerConfig, body: Value) -> (StatusCode, Vec<u8>) {
        let response = router(config)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/schedule/solve")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn send(body: Value) -> (StatusCode, Vec<u8>) {
        send_with(ServerConfig::default(), body).await
    }

    async fn post_json(body: Value) -> (StatusCode, Value) {
        let (status, bytes) = send(body).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn solves_a_single_team() {
        let (status, body) = post_json(json!({
            "parameters": parameters(6),
            "limits": {"nodeLimit": 10000}
        }))
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "solved");
        let team = &body["teams"][0];
        assert_eq!(team["name"], "Team 1");
        assert_eq!(team["subjective"][0]["categoryName"], "Robot Design");
        assert_eq!(team["performance"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn reports_infeasible_horizon() {
        let (status, body) = post_json(json!({ "parameters": parameters(1) })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "infeasible");
        assert_eq!(body["exhausted"], true);
    }

    #[tokio::test]
    async fn requests_without_limits_use_the_default_time_limit() {
        // ten two-slot sessions with one judge cannot fit in 19 slots, and
        // the search has to try every ordering to prove it
        let body = json!({
            "parameters": {
                "judgingGroups": [{"id": 1, "teamCount": 10}],
                "categories": [{"name": "Core Values", "durationSlots": 2}],
                "numTables": 0,
                "performanceDurationSlots": 1,
                "numRounds": 0,
                "changetimeSlots": 0,
                "maxSlots": 19,
                "performanceWarmupMinutes": 0
            }
        });
        let config = ServerConfig {
            default_time_limit: Duration::from_millis(200),
        };

        let started = std::time::Instant::now();
        let (status, bytes) = send_with(config, body).await;
        let body: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "infeasible");
        assert_eq!(body["exhausted"], false);
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn dropping_the_guard_cancels_the_search() {
        let token = CancelToken::new();
        let guard = CancelOnDrop(token.clone());
        assert!(!token.is_cancelled());
        drop(guard);
        assert!(token.is_cancelled());
    }

    #[test]
    fn explicit_time_limit_overrides_the_default() {
        let request: SolveRequest = serde_json::from_value(json!({
            "parameters": parameters(6),
            "limits": {"timeLimitMs": 1500, "nodeLimit": 7}
        }))
        .unwrap();
        let options = request.options(&ServerConfig::default());
        assert_eq!(options.limits.time_limit, Some(Duration::from_millis(1500)));
        assert_eq!(options.limits.node_limit, Some(7));

        let request: SolveRequest =
            serde_json::from_value(json!({ "parameters": parameters(6) })).unwrap();
        let options = request.options(&ServerConfig::default());
        assert_eq!(options.limits.time_limit, Some(DEFAULT_TIME_LIMIT));
        assert_eq!(options.limits.node_limit, None);
    }

    #[tokio::test]
    async fn rejects_oversized_models() {
        let mut params = parameters(6);
        params["maxSlots"] = json!(1_000_000_000_000u64);
        let (status, bytes) = send(json!({ "parameters": params })).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("variables"), "{text}");
    }

    #[tokio::test]
    async fn rejects_inconsistent_parameters() {
        let mut params = parameters(6);
        params["slotMinutes"] = json!(0);
        let (status, bytes) = send(json!({ "parameters": params })).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("inconsistent parameters"), "{text}");
    }
}
