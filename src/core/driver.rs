//! Turn driver: the model-call / tool-execution state machine for one run.
//!
//! A run moves through four phases, driven by a single loop in [`TurnDriver::run`]:
//!
//! - `Requesting`: send the turn log to the model
//! - `Deciding`: record the reply, stream its text, branch on the finish reason
//! - `ExecutingTools`: run requested calls in order, recording every result
//! - `Terminal`: emit the final event and stop
//!
//! Every event leaves through a bounded channel. A closed channel or a
//! cancelled token abandons the run without emitting anything further.

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::client::ChatClient;
use crate::models::{ChatRequest, Choice, ToolCallRequest, ToolDefinition, Turn};
use crate::tools::{ToolError, ToolRegistry, display_name};

use super::events::{Event, ToolInvocation};
use super::turn_log::TurnLog;

/// Maximum model calls per run. The response to the last allowed call may
/// still request tools; those run, and then the run ends capped.
pub const MAX_MODEL_CALLS: u32 = 5;

/// Message of the terminal error emitted when the cap is reached.
pub const ITERATION_CAP_MESSAGE: &str = "Max tool call iterations reached";

/// Capacity of the driver → renderer event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model answered without requesting tools.
    Completed,
    /// The model endpoint failed or returned an unusable body.
    Failed(String),
    /// The model was still requesting tools after the last allowed call.
    IterationCapped,
    /// The consumer went away or the run was cancelled.
    Abandoned,
}

/// Summary returned when a run stops.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub model_calls: u32,
    pub log: TurnLog,
}

enum Phase {
    Requesting,
    Deciding(Choice),
    ExecutingTools(Vec<ToolCallRequest>),
    Terminal(RunOutcome),
}

/// Marker for "stop now, emit nothing": the consumer is gone.
struct Abandoned;

struct RunState {
    log: TurnLog,
    model_calls: u32,
    /// Whether the invocation notice for the current model response was sent.
    notice_sent: bool,
}

/// Drives one run. Owns the turn log for the run's whole lifetime; the tool
/// registry and the model client only ever see it by shared reference.
pub struct TurnDriver {
    client: ChatClient,
    registry: ToolRegistry,
    tools: Vec<ToolDefinition>,
    model: String,
    tx_event: mpsc::Sender<Event>,
    cancel: CancellationToken,
}

impl TurnDriver {
    pub fn new(
        client: ChatClient,
        registry: ToolRegistry,
        model: impl Into<String>,
        tx_event: mpsc::Sender<Event>,
        cancel: CancellationToken,
    ) -> Self {
        let tools = registry.to_api_tools();
        Self {
            client,
            registry,
            tools,
            model: model.into(),
            tx_event,
            cancel,
        }
    }

    /// Run to a terminal state, consuming the driver.
    pub async fn run(self, log: TurnLog) -> RunReport {
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id, model = %self.model);
        self.run_inner(log).instrument(span).await
    }

    async fn run_inner(self, log: TurnLog) -> RunReport {
        tracing::info!(
            turns = log.messages().len(),
            tools = ?self.registry.names(),
            "Starting run"
        );
        let mut state = RunState {
            log,
            model_calls: 0,
            notice_sent: false,
        };

        let mut phase = Phase::Requesting;
        let outcome = loop {
            let step = match phase {
                Phase::Requesting => self.request(&mut state).await,
                Phase::Deciding(choice) => self.decide(&mut state, choice).await,
                Phase::ExecutingTools(calls) => self.execute_tools(&mut state, calls).await,
                Phase::Terminal(outcome) => break self.finish(outcome).await,
            };
            phase = step.unwrap_or(Phase::Terminal(RunOutcome::Abandoned));
        };

        tracing::info!(
            ?outcome,
            model_calls = state.model_calls,
            appended = state.log.run_turns().len(),
            "Run finished"
        );
        RunReport {
            outcome,
            model_calls: state.model_calls,
            log: state.log,
        }
    }

    async fn request(&self, state: &mut RunState) -> Result<Phase, Abandoned> {
        if self.cancel.is_cancelled() {
            return Err(Abandoned);
        }
        state.model_calls += 1;
        tracing::debug!(call = state.model_calls, "Requesting model response");

        let request = ChatRequest::new(&self.model, state.log.messages(), &self.tools);
        let response = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(Abandoned),
            response = self.client.create_completion(&request) => response,
        };

        match response {
            Ok(mut completion) => {
                // `create_completion` rejects empty choice lists.
                let choice = completion.choices.swap_remove(0);
                Ok(Phase::Deciding(choice))
            }
            Err(err) => {
                tracing::warn!(error = %err, "Model call failed");
                Ok(Phase::Terminal(RunOutcome::Failed(err.to_string())))
            }
        }
    }

    async fn decide(&self, state: &mut RunState, choice: Choice) -> Result<Phase, Abandoned> {
        state.notice_sent = false;
        let requests_tools = choice.requests_tools();
        let message = choice.message;
        let text = message.text_content().to_string();
        let calls = if requests_tools {
            message.tool_calls.clone()
        } else {
            Vec::new()
        };
        state.log.append(message);

        if !text.trim().is_empty() {
            for token in split_tokens(&text) {
                self.emit(Event::text(token)).await?;
            }
        }

        if requests_tools {
            tracing::debug!(calls = calls.len(), "Model requested tools");
            Ok(Phase::ExecutingTools(calls))
        } else {
            Ok(Phase::Terminal(RunOutcome::Completed))
        }
    }

    async fn execute_tools(
        &self,
        state: &mut RunState,
        calls: Vec<ToolCallRequest>,
    ) -> Result<Phase, Abandoned> {
        if !state.notice_sent {
            let notice = calls.iter().map(invocation).collect();
            self.emit(Event::ToolInvocation { calls: notice }).await?;
            state.notice_sent = true;
        }

        for call in &calls {
            let result = self.execute_one(call).await?;
            let name = display_name(call.name()).to_string();
            let (event, recorded) = match result {
                Ok(value) => (
                    Event::ToolResult {
                        name,
                        content: display_content(&value),
                        is_error: false,
                    },
                    value.to_string(),
                ),
                Err(err) => {
                    tracing::warn!(tool = call.name(), error = %err, "Tool call failed");
                    (
                        Event::ToolResult {
                            name,
                            content: format!("Error: {err}"),
                            is_error: true,
                        },
                        json!({ "error": err.to_string() }).to_string(),
                    )
                }
            };
            self.emit(event).await?;
            state
                .log
                .append(Turn::tool(call.id.clone(), call.name(), recorded));
        }

        if state.model_calls >= MAX_MODEL_CALLS {
            Ok(Phase::Terminal(RunOutcome::IterationCapped))
        } else {
            Ok(Phase::Requesting)
        }
    }

    async fn execute_one(
        &self,
        call: &ToolCallRequest,
    ) -> Result<Result<Value, ToolError>, Abandoned> {
        let Some(tool) = self.registry.get(call.name()) else {
            return Ok(Err(ToolError::unknown_tool(call.name())));
        };
        let input = match call.parse_arguments() {
            Ok(input) => input,
            Err(err) => return Ok(Err(ToolError::invalid_input(err.to_string()))),
        };
        tracing::debug!(tool = call.name(), call_id = %call.id, "Executing tool");
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Abandoned),
            result = tool.execute(input) => Ok(result),
        }
    }

    async fn finish(&self, outcome: RunOutcome) -> RunOutcome {
        let event = match &outcome {
            RunOutcome::Completed => Event::Done,
            RunOutcome::Failed(message) => Event::error(message.clone()),
            RunOutcome::IterationCapped => Event::error(ITERATION_CAP_MESSAGE),
            RunOutcome::Abandoned => return outcome,
        };
        match self.emit(event).await {
            Ok(()) => outcome,
            Err(Abandoned) => RunOutcome::Abandoned,
        }
    }

    async fn emit(&self, event: Event) -> Result<(), Abandoned> {
        if self.cancel.is_cancelled() {
            return Err(Abandoned);
        }
        self.tx_event.send(event).await.map_err(|_| {
            tracing::debug!("Event channel closed; abandoning run");
            Abandoned
        })
    }
}

/// Split assistant text into stream fragments. Concatenating the fragments
/// reproduces the text exactly.
pub fn split_tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(' ').enumerate().map(|(index, word)| {
        if index == 0 {
            word.to_string()
        } else {
            format!(" {word}")
        }
    })
}

/// Display copy of a tool result: non-empty `documentation` text when present,
/// otherwise the pretty-printed value.
#[must_use]
pub fn display_content(value: &Value) -> String {
    value
        .get("documentation")
        .and_then(Value::as_str)
        .filter(|doc| !doc.is_empty())
        .map_or_else(
            || serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
            str::to_string,
        )
}

fn invocation(call: &ToolCallRequest) -> ToolInvocation {
    let args = call
        .parse_arguments()
        .unwrap_or_else(|_| Value::String(call.function.arguments.clone()));
    ToolInvocation {
        name: display_name(call.name()).to_string(),
        args,
    }
}
