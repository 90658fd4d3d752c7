//! Request handlers: task streaming, log following, stats, feedback.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use stream_event::EnvelopeState;
use uuid::Uuid;

use forge::logfab::{LogFilter, LogLevel, LogSource};
use forge::{FeedbackRequest, LogEvent, LogStreamAdapter, TaskRequest};

use crate::app::AppState;

/// Runs a task and streams its events. Request validation failures surface
/// as a terminal `error` event on the stream itself, so the response is
/// always 200 with an event stream.
pub async fn stream_task(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TaskRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.engine.run(request);
    let mut envelope = EnvelopeState::new(Uuid::new_v4().to_string());
    let stream = rx.into_stream().map(move |event| {
        let data = envelope
            .to_json(&event)
            .unwrap_or_else(|_| json!({"type": "error", "kind": "internal_invariant"}));
        Ok(Event::default()
            .event(event.type_name())
            .data(data.to_string()))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Default, Deserialize)]
pub struct LogStreamQuery {
    pub task_id: Option<String>,
    pub level: Option<String>,
    pub source: Option<String>,
    pub stage: Option<String>,
}

fn parse_source(s: &str) -> Option<LogSource> {
    match s {
        "agent" => Some(LogSource::Agent),
        "system" => Some(LogSource::System),
        "ui" => Some(LogSource::Ui),
        "tool" => Some(LogSource::Tool),
        "validator" => Some(LogSource::Validator),
        "infrastructure" => Some(LogSource::Infrastructure),
        _ => None,
    }
}

/// Live log follow with replay, filtered by task/level/source/stage.
pub async fn stream_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogStreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let adapter =
        LogStreamAdapter::new(&state.ctx.logs).map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    let filter = LogFilter {
        task_id: query.task_id,
        level: query.level.as_deref().map(LogLevel::parse_or_info),
        source: query.source.as_deref().and_then(parse_source),
        stage: query.stage,
    };
    let stream = adapter.stream(filter).map(|event: LogEvent| {
        Ok(Event::default()
            .event("log")
            .data(event.to_value().to_string()))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    let governor = state.ctx.governor.stats();
    let recent_tool_calls = state.ctx.trace.recent(20);
    Json(json!({
        "governor": governor,
        "recent_tool_calls": recent_tool_calls,
    }))
}

pub async fn models(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    match state.ctx.llm.list_models().await {
        Ok(models) => Ok(Json(json!({
            "models": models
                .into_iter()
                .map(|m| json!({"name": m.name, "size_bytes": m.size_bytes}))
                .collect::<Vec<_>>(),
        }))),
        Err(e) => Err((StatusCode::BAD_GATEWAY, e.to_string())),
    }
}

/// Records user feedback on a finished task.
pub async fn feedback(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let request = request
        .validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    state.ctx.logs.emit(
        LogEvent::info(format!(
            "feedback '{}' for task {:?}",
            request.feedback, request.task_id
        ))
        .source(LogSource::Ui),
    );
    Ok(Json(json!({"status": "ok", "positive": request.is_positive()})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use forge::{LlmRuntime, MockLlm, ServiceContextBuilder};
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    fn test_router() -> axum::Router {
        let mut settings = config::Settings::default();
        settings.pacing.default_delay_ms = 0;
        settings.pacing.critical_delay_ms = 0;
        let ctx = ServiceContextBuilder::new(config::ConfigHandle::fixed(settings))
            .llm(Arc::new(MockLlm::fixed("Hello from the mock!")) as Arc<dyn LlmRuntime>)
            .build();
        crate::app::router(ctx)
    }

    #[tokio::test]
    async fn task_stream_ends_with_final_result() {
        let app = test_router();
        let body = serde_json::to_string(&serde_json::json!({
            "task": "привет",
            "mode": "auto"
        }))
        .unwrap();
        let response = app
            .oneshot(
                Request::post("/api/tasks/stream")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("event: stage_start"));
        assert!(text.contains("event: final_result"));
        assert!(text.contains("\"task_id\""));
    }

    #[tokio::test]
    async fn invalid_task_surfaces_error_event_on_stream() {
        let app = test_router();
        let body = serde_json::to_string(&serde_json::json!({
            "task": "run subprocess now"
        }))
        .unwrap();
        let response = app
            .oneshot(
                Request::post("/api/tasks/stream")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("event: error"));
        assert!(text.contains("invalid_request"));
    }

    #[tokio::test]
    async fn stats_endpoint_reports_governor() {
        let app = test_router();
        let response = app
            .oneshot(Request::get("/api/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["governor"]["active_agents"], 0);
    }

    #[tokio::test]
    async fn feedback_rejects_unknown_values() {
        let app = test_router();
        let body = serde_json::to_string(&serde_json::json!({
            "task": "some task",
            "feedback": "amazing"
        }))
        .unwrap();
        let response = app
            .oneshot(
                Request::post("/api/feedback")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn feedback_accepts_positive() {
        let app = test_router();
        let body = serde_json::to_string(&serde_json::json!({
            "task": "some task",
            "feedback": "positive"
        }))
        .unwrap();
        let response = app
            .oneshot(
                Request::post("/api/feedback")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
