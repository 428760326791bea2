//! HTTP/SSE surface: the chatbot endpoint the browser client talks to.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_stream::stream;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::client::{self, ChatClient};
use crate::config::Config;
use crate::core::driver::{EVENT_CHANNEL_CAPACITY, TurnDriver};
use crate::core::events::Event;
use crate::core::frame::OutputFramer;
use crate::core::turn_log::TurnLog;
use crate::docs::DocsClient;
use crate::models::IncomingTurn;
use crate::prompts;
use crate::tools::ToolRegistry;

pub const MISSING_API_KEY_MESSAGE: &str =
    "Groq API key is required. Please configure your API key in the settings.";

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Shared across requests: one connection pool serves every run.
#[derive(Clone)]
pub struct ApiState {
    config: Arc<Config>,
    http_client: reqwest::Client,
    docs: Arc<DocsClient>,
}

impl ApiState {
    pub fn new(config: Config) -> Result<Self> {
        let http_client = client::build_http_client(config.request_timeout())?;
        let docs = Arc::new(DocsClient::new(http_client.clone(), &config.docs_url()));
        Ok(Self {
            config: Arc::new(config),
            http_client,
            docs,
        })
    }
}

/// Body of `POST /api/chatbot`. Accepts the browser client's field names and
/// the shorter aliases.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatbotRequest {
    #[serde(default, alias = "credential")]
    groq_api_key: Option<String>,
    #[serde(default, alias = "modelName")]
    groq_model: Option<String>,
    #[serde(default, alias = "turns")]
    messages: Option<Vec<IncomingTurn>>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

/// Bind and serve until the process is stopped.
pub async fn run_http_server(config: Config) -> Result<()> {
    let addr = config.bind_addr()?;
    let app = build_router(ApiState::new(config)?);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(%addr, "CodeWizard listening on http://{addr}");
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow!("HTTP server error: {e}"))
}

pub fn build_router(state: ApiState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins());
    Router::new()
        .route("/health", get(health))
        .route("/api/chatbot", post(chatbot))
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "codewizard",
    })
}

async fn chatbot(
    State(state): State<ApiState>,
    payload: Result<Json<ChatbotRequest>, JsonRejection>,
) -> Result<Sse<impl futures_util::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let Json(req) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    let Some(api_key) = req.groq_api_key.filter(|key| !key.trim().is_empty()) else {
        return Err(ApiError::bad_request(MISSING_API_KEY_MESSAGE));
    };
    let model = req
        .groq_model
        .filter(|model| !model.trim().is_empty())
        .unwrap_or_else(|| state.config.default_model().to_string());

    let client = ChatClient::new(
        state.http_client.clone(),
        &state.config.chat_base_url(),
        &api_key,
    )
    .map_err(|e| ApiError::bad_request(format!("{e:#}")))?;
    let registry = ToolRegistry::for_credential(Some(&api_key), &state.docs);
    let log = TurnLog::seed(prompts::system_prompt(), req.messages.unwrap_or_default());

    let (tx_event, rx_event) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let driver = TurnDriver::new(client, registry, model, tx_event, cancel.clone());
    tokio::spawn(driver.run(log));

    Ok(Sse::new(frame_stream(rx_event, cancel)).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keepalive"),
    ))
}

/// Frame driver events until a terminal frame. Dropping the stream (client
/// disconnect) cancels the run.
fn frame_stream(
    mut rx_event: mpsc::Receiver<Event>,
    cancel: CancellationToken,
) -> impl futures_util::Stream<Item = Result<SseEvent, Infallible>> {
    let guard = cancel.drop_guard();
    stream! {
        let _guard = guard;
        let mut framer = OutputFramer::new();
        while let Some(event) = rx_event.recv().await {
            let Some(payload) = framer.frame(&event) else {
                break;
            };
            yield Ok(SseEvent::default().data(payload));
            if framer.is_closed() {
                break;
            }
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::net::SocketAddr;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn spawn_test_server(
        config: Config,
    ) -> Result<Option<(SocketAddr, tokio::task::JoinHandle<()>)>> {
        let app = build_router(ApiState::new(config)?);
        let listener = match TcpListener::bind("127.0.0.1:0").await {
            Ok(listener) => listener,
            Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Some((addr, handle)))
    }

    fn config_for(model: &MockServer, docs: &MockServer) -> Config {
        Config {
            chat_base_url: Some(model.uri()),
            docs_url: Some(docs.uri()),
            request_timeout_secs: Some(5),
            ..Config::default()
        }
    }

    fn text_reply(text: &str) -> Value {
        json!({
            "choices": [{
                "finish_reason": "stop",
                "message": {"role": "assistant", "content": text}
            }]
        })
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() -> Result<()> {
        let Some((addr, handle)) = spawn_test_server(Config::default()).await? else {
            return Ok(());
        };
        let health: Value = reqwest::Client::new()
            .get(format!("http://{addr}/health"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        assert_eq!(health, json!({"status": "ok", "service": "codewizard"}));
        handle.abort();
        Ok(())
    }

    #[tokio::test]
    async fn missing_or_blank_key_is_rejected_before_any_call() -> Result<()> {
        let model = MockServer::start().await;
        let docs = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("x")))
            .expect(0)
            .mount(&model)
            .await;
        let Some((addr, handle)) = spawn_test_server(config_for(&model, &docs)).await? else {
            return Ok(());
        };
        let client = reqwest::Client::new();

        for body in [
            json!({"messages": [{"role": "user", "content": "hi"}]}),
            json!({"groqApiKey": "   ", "messages": []}),
        ] {
            let resp = client
                .post(format!("http://{addr}/api/chatbot"))
                .json(&body)
                .send()
                .await?;
            assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
            let err: Value = resp.json().await?;
            assert_eq!(err, json!({"error": MISSING_API_KEY_MESSAGE}));
        }
        handle.abort();
        Ok(())
    }

    #[tokio::test]
    async fn plain_answer_streams_frames_then_done() -> Result<()> {
        let model = MockServer::start().await;
        let docs = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "model": "moonshotai/kimi-k2-instruct",
                "tool_choice": "auto",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("It is 4")))
            .expect(1)
            .mount(&model)
            .await;
        let Some((addr, handle)) = spawn_test_server(config_for(&model, &docs)).await? else {
            return Ok(());
        };

        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/api/chatbot"))
            .json(&json!({
                "groqApiKey": "gsk_test",
                "messages": [
                    {"role": "system", "content": "dropped"},
                    {"role": "user", "content": "What is 2+2?"}
                ]
            }))
            .send()
            .await?;
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(
            resp.headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok()),
            Some("text/event-stream")
        );
        let body = resp.text().await?;
        assert_eq!(
            body,
            concat!(
                "data: {\"choices\":[{\"delta\":{\"content\":\"It\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\" is\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\" 4\"}}]}\n\n",
                "data: [DONE]\n\n",
            )
        );

        let requests = model.received_requests().await.unwrap_or_default();
        let sent: Value = serde_json::from_slice(&requests[0].body)?;
        let roles: Vec<&str> = sent["messages"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|m| m["role"].as_str())
            .collect();
        assert_eq!(roles, vec!["system", "user"]);
        assert_eq!(sent["tools"].as_array().map(Vec::len), Some(2));
        handle.abort();
        Ok(())
    }

    #[tokio::test]
    async fn short_field_names_are_accepted() -> Result<()> {
        let model = MockServer::start().await;
        let docs = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"model": "llama-3.3-70b-versatile"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("ok")))
            .expect(1)
            .mount(&model)
            .await;
        let Some((addr, handle)) = spawn_test_server(config_for(&model, &docs)).await? else {
            return Ok(());
        };

        let body = reqwest::Client::new()
            .post(format!("http://{addr}/api/chatbot"))
            .json(&json!({
                "credential": "gsk_test",
                "modelName": "llama-3.3-70b-versatile",
                "turns": [{"role": "user", "content": "hi"}]
            }))
            .send()
            .await?
            .text()
            .await?;
        assert!(body.ends_with("data: [DONE]\n\n"), "{body}");
        handle.abort();
        Ok(())
    }

    #[tokio::test]
    async fn history_entries_without_a_role_are_dropped() -> Result<()> {
        let model = MockServer::start().await;
        let docs = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("ok")))
            .expect(1)
            .mount(&model)
            .await;
        let Some((addr, handle)) = spawn_test_server(config_for(&model, &docs)).await? else {
            return Ok(());
        };

        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/api/chatbot"))
            .json(&json!({
                "groqApiKey": "gsk_test",
                "messages": [
                    {"content": "no role"},
                    {"role": 3, "content": "numeric role"},
                    {"role": "user", "content": "hi"}
                ]
            }))
            .send()
            .await?;
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert!(resp.text().await?.ends_with("data: [DONE]\n\n"));

        let requests = model.received_requests().await.unwrap_or_default();
        let sent: Value = serde_json::from_slice(&requests[0].body)?;
        assert_eq!(sent["messages"].as_array().map(Vec::len), Some(2));
        assert_eq!(sent["messages"][1], json!({"role": "user", "content": "hi"}));
        handle.abort();
        Ok(())
    }

    #[tokio::test]
    async fn each_request_authenticates_with_its_own_key() -> Result<()> {
        let model = MockServer::start().await;
        let docs = MockServer::start().await;
        for key in ["gsk_first", "gsk_second"] {
            Mock::given(method("POST"))
                .and(header("authorization", format!("Bearer {key}").as_str()))
                .respond_with(ResponseTemplate::new(200).set_body_json(text_reply(key)))
                .expect(1)
                .mount(&model)
                .await;
        }
        let Some((addr, handle)) = spawn_test_server(config_for(&model, &docs)).await? else {
            return Ok(());
        };

        let client = reqwest::Client::new();
        for key in ["gsk_first", "gsk_second"] {
            let body = client
                .post(format!("http://{addr}/api/chatbot"))
                .json(&json!({"groqApiKey": key, "messages": [{"role": "user", "content": "hi"}]}))
                .send()
                .await?
                .text()
                .await?;
            let expected = json!({"choices": [{"delta": {"content": key}}]});
            assert!(body.starts_with(&format!("data: {expected}\n\n")), "{body}");
        }
        handle.abort();
        Ok(())
    }

    #[tokio::test]
    async fn upstream_failure_is_one_error_frame() -> Result<()> {
        let model = MockServer::start().await;
        let docs = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Invalid API Key"}
            })))
            .mount(&model)
            .await;
        let Some((addr, handle)) = spawn_test_server(config_for(&model, &docs)).await? else {
            return Ok(());
        };

        let body = reqwest::Client::new()
            .post(format!("http://{addr}/api/chatbot"))
            .json(&json!({"groqApiKey": "bad", "messages": [{"role": "user", "content": "hi"}]}))
            .send()
            .await?
            .text()
            .await?;
        assert_eq!(body, "data: {\"error\":\"Invalid API Key\"}\n\n");
        handle.abort();
        Ok(())
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() -> Result<()> {
        let Some((addr, handle)) = spawn_test_server(Config::default()).await? else {
            return Ok(());
        };
        let resp = reqwest::Client::new()
            .request(reqwest::Method::OPTIONS, format!("http://{addr}/api/chatbot"))
            .header("origin", "http://localhost:3000")
            .header("access-control-request-method", "POST")
            .send()
            .await?;
        assert_eq!(
            resp.headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("http://localhost:3000")
        );
        handle.abort();
        Ok(())
    }

    #[tokio::test]
    async fn dropping_the_stream_cancels_the_run() {
        let (_tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let stream = frame_stream(rx, cancel.clone());
        assert!(!cancel.is_cancelled());
        drop(stream);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn stream_stops_after_terminal_frame() {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tx.send(Event::text("hi")).await.unwrap();
        tx.send(Event::error("boom")).await.unwrap();
        tx.send(Event::text("late")).await.unwrap();

        let frames: Vec<_> = frame_stream(rx, CancellationToken::new()).collect().await;
        assert_eq!(frames.len(), 2);
    }
}
