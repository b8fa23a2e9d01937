//! Agent runner — the turn loop that drives one run to a terminal state.
//!
//! Entry point: [`run_agent`] spawns the async loop and returns the
//! trace id plus a bounded channel of client-facing
//! [`AgentStreamEvent`]s. One run walks
//! `PreparingTurn → Streaming → DispatchingTools → …` until the model
//! stops, a budget vetoes, the turn cap is hit, an approval blocks, the
//! caller cancels, or failover is exhausted.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;

use nx_domain::config::{AgentConfig, FailoverPolicy, Project, PruningStrategy};
use nx_domain::error::{Error, Result};
use nx_domain::id::{SessionId, ToolCallId, TraceId};
use nx_domain::message::{Message, Role, ToolCall, ToolDefinition};
use nx_domain::stream::{AgentStreamEvent, ChatEvent, StopReason, Usage};
use nx_domain::trace::{TraceEventKind, TraceStatus};
use nx_providers::{build_provider, cost_for, ChatParams, LlmProvider};
use nx_sessions::{prune_token_based, prune_turn_based, StoredMessage};

use crate::state::AppState;

use super::cancel::CancelToken;
use super::compact;
use super::registry::{ToolContext, ToolPermissions};
use super::trace::TraceRecorder;
use super::usage::UsageRecord;

/// Tokens reserved for the response when pruning token-based history.
const RESERVE_TOKENS: u32 = 2_048;

/// Client-facing channel capacity; back-pressure point for slow readers.
const EVENT_CHANNEL_CAPACITY: usize = 64;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run input
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input to one agent run.
pub struct RunRequest {
    pub project: Project,
    pub session_id: SessionId,
    pub user_message: String,
    /// Runtime variables for `{{name}}` prompt substitution.
    pub variables: HashMap<String, String>,
}

struct RunOutcome {
    status: TraceStatus,
    final_content: String,
    total_usage: Usage,
    turns: u32,
}

impl RunOutcome {
    fn terminal(status: TraceStatus, final_content: String, total_usage: Usage, turns: u32) -> Self {
        Self {
            status,
            final_content,
            total_usage,
            turns,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_agent — the public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Start one agent run. Returns the trace id and the event receiver;
/// the caller reads events as they arrive (WebSocket relay) or drains
/// them (scheduled tasks). Cancellation goes through
/// `state.cancel_map` keyed by the returned trace id.
pub fn run_agent(
    state: AppState,
    req: RunRequest,
) -> (TraceId, mpsc::Receiver<AgentStreamEvent>) {
    let (tx, rx) = mpsc::channel::<AgentStreamEvent>(EVENT_CHANNEL_CAPACITY);

    let recorder = Arc::new(TraceRecorder::new(
        req.project.id.clone(),
        req.session_id.clone(),
    ));
    let trace_id = recorder.trace_id().clone();
    let cancel = state.cancel_map.register(&trace_id);

    let span = tracing::info_span!(
        "agent_run",
        trace_id = %trace_id,
        project_id = %req.project.id,
        session_id = %req.session_id,
    );
    let task_trace_id = trace_id.clone();
    tokio::spawn(tracing::Instrument::instrument(
        async move {
            let _ = tx
                .send(AgentStreamEvent::AgentStart {
                    trace_id: task_trace_id.clone(),
                })
                .await;

            let outcome = match run_inner(&state, &req, &recorder, &tx, &cancel).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    recorder.append(
                        TraceEventKind::Error,
                        json!({ "code": e.code(), "message": e.to_string() }),
                    );
                    let _ = tx.send(AgentStreamEvent::from_error(&e)).await;
                    RunOutcome::terminal(TraceStatus::Failed, String::new(), Usage::default(), 0)
                }
            };

            finalize_run(&state, &req, &recorder, &tx, outcome).await;
            state.cancel_map.remove(&task_trace_id);
        },
        span,
    ));

    (trace_id, rx)
}

/// Post-run bookkeeping: alert check, compaction, message persistence,
/// trace flush, and the final `agent_complete` event.
async fn finalize_run(
    state: &AppState,
    req: &RunRequest,
    recorder: &Arc<TraceRecorder>,
    tx: &mpsc::Sender<AgentStreamEvent>,
    outcome: RunOutcome,
) {
    let config = &req.project.config;

    // An aborted run gets no further events on its trace.
    if outcome.status != TraceStatus::Aborted {
        if let Some(alert) = state.cost_guard.alert_status(&req.project.id, &config.cost) {
            recorder.append(TraceEventKind::CostAlert, json!(alert));
        }

        if compact::should_compact(outcome.turns, &config.memory) {
            let history = session_history(state, &req.session_id);
            match compaction_provider(config) {
                Ok(provider) => {
                    match compact::run_compaction(
                        provider.as_ref(),
                        &state.memory,
                        &req.project.id,
                        &history,
                    )
                    .await
                    {
                        Ok(summary) if !summary.is_empty() => {
                            recorder.append(
                                TraceEventKind::Compaction,
                                json!({ "summary_chars": summary.len() }),
                            );
                            recorder.append(
                                TraceEventKind::MemoryStore,
                                json!({ "category": "session_summary" }),
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "compaction failed, continuing");
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "compaction provider unavailable"),
            }
        }
    }

    // Persist the outermost user/assistant pair with the trace id.
    let trace_id = recorder.trace_id().clone();
    state.sessions.append_message(
        &req.session_id,
        Role::User,
        req.user_message.clone(),
        None,
        Some(trace_id.clone()),
    );
    if !outcome.final_content.is_empty() {
        state.sessions.append_message(
            &req.session_id,
            Role::Assistant,
            outcome.final_content.clone(),
            Some(outcome.total_usage.clone()),
            Some(trace_id.clone()),
        );
    }

    let trace = recorder.flush(outcome.status);
    state.traces.insert(trace);

    let _ = tx
        .send(AgentStreamEvent::AgentComplete {
            trace_id,
            content: outcome.final_content,
            status: outcome.status,
        })
        .await;
}

fn session_history(state: &AppState, session_id: &SessionId) -> Vec<Message> {
    state
        .sessions
        .messages(session_id)
        .iter()
        .map(stored_to_message)
        .collect()
}

fn stored_to_message(stored: &StoredMessage) -> Message {
    Message {
        role: stored.role,
        content: nx_domain::message::MessageContent::Text(stored.content.clone()),
    }
}

fn compaction_provider(config: &AgentConfig) -> Result<Arc<dyn LlmProvider>> {
    build_provider(&config.primary_provider)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_inner — the turn loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_inner(
    state: &AppState,
    req: &RunRequest,
    recorder: &Arc<TraceRecorder>,
    tx: &mpsc::Sender<AgentStreamEvent>,
    cancel: &CancelToken,
) -> Result<RunOutcome> {
    let project = &req.project;
    let config = &project.config;
    let permissions = ToolPermissions::from_ids(config.allowed_tools.iter().cloned());

    // ── Phase 1: memory, tools, prompt ────────────────────────────────
    let memories = state
        .memory
        .retrieve(&project.id, &req.user_message, &config.memory, None, None)
        .await?;
    recorder.append(
        TraceEventKind::MemoryRetrieval,
        json!({ "count": memories.len(), "top_k": config.memory.top_k }),
    );

    let tool_defs = state.tools.definitions_for(&permissions);
    let resolved = super::prompt::resolve_prompt(
        &state.prompts,
        &project.id,
        &tool_defs,
        &memories,
        &req.variables,
    )?;
    recorder.set_snapshot(resolved.snapshot.clone());

    // ── Phase 2: providers ────────────────────────────────────────────
    let primary = build_provider(&config.primary_provider)?;
    let fallback = match &config.fallback_provider {
        Some(spec) => match build_provider(spec) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(error = %e, "fallback provider unavailable");
                None
            }
        },
        None => None,
    };
    let mut active: Arc<dyn LlmProvider> = primary.clone();
    let mut failover_attempts: u32 = 0;

    // ── Phase 3: conversation history ─────────────────────────────────
    let history = session_history(state, &req.session_id);
    let pruned = match config.memory.pruning {
        PruningStrategy::TurnBased => {
            prune_turn_based(&history, config.memory.max_turns_in_context)
        }
        PruningStrategy::TokenBased => prune_token_based(
            &history,
            |msgs| active.count_tokens(msgs),
            RESERVE_TOKENS,
            active.context_window(),
        ),
    };

    let mut messages = Vec::with_capacity(pruned.len() + 2);
    messages.push(Message::system(&resolved.system_prompt));
    messages.extend(pruned);
    messages.push(Message::user(&req.user_message));

    // ── Phase 4: the turn loop ────────────────────────────────────────
    let mut total_usage = Usage::default();
    let mut turn: u32 = 0;

    loop {
        if turn >= config.cost.max_turns_per_session {
            return Ok(RunOutcome::terminal(
                TraceStatus::MaxTurns,
                String::new(),
                total_usage,
                turn,
            ));
        }
        turn += 1;

        if cancel.is_cancelled() {
            return Ok(RunOutcome::terminal(
                TraceStatus::Aborted,
                String::new(),
                total_usage,
                turn - 1,
            ));
        }

        // Cost precheck. A veto means no llm_request for this turn.
        let estimated = active.count_tokens(&messages);
        match state
            .cost_guard
            .precheck(&project.id, &config.cost, estimated)
        {
            Ok(_permit) => {
                recorder.append(
                    TraceEventKind::CostCheck,
                    json!({ "allowed": true, "estimated_input_tokens": estimated }),
                );
            }
            Err(veto) => {
                recorder.append(
                    TraceEventKind::CostCheck,
                    json!({
                        "allowed": false,
                        "code": veto.code(),
                        "message": veto.to_string(),
                    }),
                );
                let _ = tx.send(AgentStreamEvent::from_error(&veto)).await;
                return Ok(RunOutcome::terminal(
                    TraceStatus::BudgetExceeded,
                    String::new(),
                    total_usage,
                    turn - 1,
                ));
            }
        }

        // Streaming LLM call, with failover on classified errors.
        let turn_start = chrono::Utc::now();
        let streamed = loop {
            recorder.append(
                TraceEventKind::LlmRequest,
                json!({
                    "turn": turn,
                    "provider": active.provider_id(),
                    "model": active.model(),
                    "message_count": messages.len(),
                }),
            );

            match stream_one_response(
                active.as_ref(),
                &messages,
                &tool_defs,
                config,
                tx,
                cancel,
            )
            .await
            {
                Ok(outcome) => break outcome,
                Err(e) => {
                    if should_failover(&e, &config.failover, failover_attempts, fallback.is_some())
                    {
                        failover_attempts += 1;
                        let next = fallback.clone().expect("checked in should_failover");
                        recorder.append(
                            TraceEventKind::Failover,
                            json!({
                                "from": active.provider_id(),
                                "to": next.provider_id(),
                                "reason": e.code(),
                                "attempt": failover_attempts,
                            }),
                        );
                        tracing::warn!(
                            reason = e.code(),
                            attempt = failover_attempts,
                            "provider failover"
                        );
                        active = next;
                        continue;
                    }
                    recorder.append(
                        TraceEventKind::Error,
                        json!({ "code": e.code(), "message": e.to_string() }),
                    );
                    let _ = tx.send(AgentStreamEvent::from_error(&e)).await;
                    return Ok(RunOutcome::terminal(
                        TraceStatus::Failed,
                        String::new(),
                        total_usage,
                        turn,
                    ));
                }
            }
        };

        if streamed.cancelled {
            return Ok(RunOutcome::terminal(
                TraceStatus::Aborted,
                streamed.text,
                total_usage,
                turn,
            ));
        }

        // Record the response and its usage.
        let turn_ms = (chrono::Utc::now() - turn_start).num_milliseconds().max(0) as u64;
        recorder.append_with_duration(
            TraceEventKind::LlmResponse,
            json!({
                "model": active.model(),
                "stop_reason": streamed.stop_reason,
                "usage": streamed.usage,
            }),
            turn_ms,
        );
        total_usage.add(&streamed.usage);
        state.cost_guard.record(UsageRecord::new(
            project.id.clone(),
            req.session_id.clone(),
            recorder.trace_id().clone(),
            active.provider_id(),
            active.model(),
            &streamed.usage,
            cost_for(active.model(), &streamed.usage),
        ));

        // No tool calls: the model is done.
        if streamed.stop_reason != StopReason::ToolUse || streamed.tool_calls.is_empty() {
            return Ok(RunOutcome::terminal(
                TraceStatus::Completed,
                streamed.text,
                total_usage,
                turn,
            ));
        }

        // ── Tool dispatch ─────────────────────────────────────────────
        messages.push(Message::assistant_with_tool_calls(
            &streamed.text,
            &streamed.tool_calls,
        ));

        let dispatch = dispatch_tools(
            state,
            req,
            recorder,
            tx,
            cancel,
            &permissions,
            &streamed.tool_calls,
            &mut messages,
        )
        .await?;

        match dispatch {
            DispatchOutcome::Continue => {
                let _ = tx.send(AgentStreamEvent::TurnComplete { turn }).await;
            }
            DispatchOutcome::Terminal(status) => {
                return Ok(RunOutcome::terminal(status, streamed.text, total_usage, turn));
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream consumption
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct StreamedResponse {
    text: String,
    tool_calls: Vec<ToolCall>,
    usage: Usage,
    stop_reason: StopReason,
    cancelled: bool,
}

/// Open one provider stream and consume it, wearing three hats at once:
/// relay client-facing events, reassemble tool-use inputs by id, and
/// capture the final usage for the trace.
async fn stream_one_response(
    provider: &dyn LlmProvider,
    messages: &[Message],
    tool_defs: &[ToolDefinition],
    config: &AgentConfig,
    tx: &mpsc::Sender<AgentStreamEvent>,
    cancel: &CancelToken,
) -> Result<StreamedResponse> {
    let params = ChatParams {
        messages: messages.to_vec(),
        tools: tool_defs.to_vec(),
        temperature: config.primary_provider.temperature,
        max_tokens: Some(config.cost.max_tokens_per_turn),
        timeout_ms: Some(config.failover.timeout_ms),
    };

    let mut stream = provider.chat(params).await?;

    let mut text = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    // id -> (name, partial json) for providers that never send ToolUseEnd.
    let mut pending: HashMap<String, (String, String)> = HashMap::new();
    let mut usage = Usage::default();
    let mut stop_reason = StopReason::EndTurn;
    let mut cancelled = false;

    while let Some(item) = stream.next().await {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        match item? {
            ChatEvent::ContentDelta { text: delta } => {
                let _ = tx
                    .send(AgentStreamEvent::ContentDelta {
                        text: delta.clone(),
                    })
                    .await;
                text.push_str(&delta);
            }
            ChatEvent::ToolUseStart { id, name } => {
                let _ = tx
                    .send(AgentStreamEvent::ToolUseStart {
                        call_id: id.clone(),
                        tool_name: name.clone(),
                    })
                    .await;
                pending.insert(id, (name, String::new()));
            }
            ChatEvent::ToolUseDelta { id, partial_json } => {
                if let Some((_, buf)) = pending.get_mut(&id) {
                    buf.push_str(&partial_json);
                }
            }
            ChatEvent::ToolUseEnd { id, name, input } => {
                pending.remove(&id);
                tool_calls.push(ToolCall {
                    call_id: ToolCallId::from(id),
                    tool_name: name,
                    arguments: input,
                });
            }
            ChatEvent::MessageStart { .. } => {}
            ChatEvent::MessageEnd {
                stop_reason: reason,
                usage: final_usage,
            } => {
                stop_reason = reason;
                usage = final_usage;
            }
            ChatEvent::Error { message } => {
                return Err(Error::ProviderUnknown {
                    provider: provider.provider_id().to_owned(),
                    message,
                });
            }
        }
    }

    // Assemble calls that came through start/delta but never ended.
    for (id, (name, buf)) in pending.drain() {
        let arguments = serde_json::from_str(&buf)
            .unwrap_or(serde_json::Value::Object(Default::default()));
        tool_calls.push(ToolCall {
            call_id: ToolCallId::from(id),
            tool_name: name,
            arguments,
        });
    }

    Ok(StreamedResponse {
        text,
        tool_calls,
        usage,
        stop_reason,
        cancelled,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum DispatchOutcome {
    Continue,
    Terminal(TraceStatus),
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_tools(
    state: &AppState,
    req: &RunRequest,
    recorder: &Arc<TraceRecorder>,
    tx: &mpsc::Sender<AgentStreamEvent>,
    cancel: &CancelToken,
    permissions: &ToolPermissions,
    tool_calls: &[ToolCall],
    messages: &mut Vec<Message>,
) -> Result<DispatchOutcome> {
    let config = &req.project.config;
    let max_calls = config.cost.max_tool_calls_per_turn as usize;
    let mut dispatched = 0usize;

    for call in tool_calls {
        if cancel.is_cancelled() {
            return Ok(DispatchOutcome::Terminal(TraceStatus::Aborted));
        }

        // The cap counts blocked calls too; past it, stop dispatching
        // and tell the model why.
        if dispatched >= max_calls {
            let note = format!(
                "Tool call limit reached ({max_calls} per turn); remaining calls were not executed."
            );
            messages.push(Message::system(&note));
            tracing::warn!(max_calls, "tool call cap reached this turn");
            break;
        }
        dispatched += 1;

        // A hallucinated tool never opens a tool_call event.
        if !state.tools.has(&call.tool_name) {
            recorder.append(
                TraceEventKind::ToolHallucination,
                json!({ "tool_name": call.tool_name, "call_id": call.call_id }),
            );
            let content = format!("Unknown tool: {}", call.tool_name);
            feed_back_error(tx, messages, call, &content).await;
            continue;
        }

        let call_event = recorder.append(
            TraceEventKind::ToolCall,
            json!({
                "tool_id": call.tool_name,
                "call_id": call.call_id,
                "input": crate::redact::redact(&call.arguments),
            }),
        );

        let ctx = ToolContext {
            project_id: req.project.id.clone(),
            session_id: req.session_id.clone(),
            trace_id: recorder.trace_id().clone(),
            permissions: permissions.clone(),
            memory_config: config.memory.clone(),
            secrets: Some(state.secrets.clone()),
            memory: Some(state.memory.clone()),
            approvals: Some(state.approvals.clone()),
            bus: Some(state.bus.clone()),
            recorder: Some(recorder.clone()),
            parent_event_id: Some(call_event),
        };

        match state
            .tools
            .resolve(&call.tool_name, &call.arguments, &ctx)
            .await
        {
            Ok(result) => {
                let content = if result.success {
                    serde_json::to_string(&result.output).unwrap_or_default()
                } else {
                    result
                        .error
                        .clone()
                        .unwrap_or_else(|| "tool failed".to_owned())
                };
                recorder.append_child(
                    TraceEventKind::ToolResult,
                    json!({
                        "call_id": call.call_id,
                        "success": result.success,
                        "error": result.error,
                    }),
                    result.duration_ms,
                    call_event,
                );
                let _ = tx
                    .send(AgentStreamEvent::ToolResult {
                        call_id: call.call_id.as_str().to_owned(),
                        tool_name: call.tool_name.clone(),
                        content: content.clone(),
                        is_error: !result.success,
                    })
                    .await;
                messages.push(Message::tool_result(
                    call.call_id.as_str(),
                    &content,
                    !result.success,
                ));
            }
            Err(Error::ApprovalPending { approval_id }) => {
                // The registry opened the request and recorded
                // approval_requested; pair the open tool_call and park
                // the run. A later run resumes from here once approved.
                recorder.append_child(
                    TraceEventKind::ToolBlocked,
                    json!({
                        "call_id": call.call_id,
                        "reason": "HUMAN_APPROVAL_PENDING",
                        "approval_id": approval_id,
                    }),
                    0,
                    call_event,
                );
                return Ok(DispatchOutcome::Terminal(TraceStatus::HumanApprovalPending));
            }
            Err(e @ (Error::ToolNotAllowed { .. } | Error::Validation { .. })) => {
                // tool_blocked was recorded by the registry; the model
                // gets an error result and may recover.
                let content = format!("Tool call blocked ({}): {e}", e.code());
                feed_back_error(tx, messages, call, &content).await;
            }
            Err(e) => {
                recorder.append_child(
                    TraceEventKind::ToolBlocked,
                    json!({ "call_id": call.call_id, "reason": e.code() }),
                    0,
                    call_event,
                );
                let content = format!("Tool dispatch failed ({}): {e}", e.code());
                feed_back_error(tx, messages, call, &content).await;
            }
        }
    }

    Ok(DispatchOutcome::Continue)
}

async fn feed_back_error(
    tx: &mpsc::Sender<AgentStreamEvent>,
    messages: &mut Vec<Message>,
    call: &ToolCall,
    content: &str,
) {
    let _ = tx
        .send(AgentStreamEvent::ToolResult {
            call_id: call.call_id.as_str().to_owned(),
            tool_name: call.tool_name.clone(),
            content: content.to_owned(),
            is_error: true,
        })
        .await;
    messages.push(Message::tool_result(call.call_id.as_str(), content, true));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Failover policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn should_failover(
    error: &Error,
    policy: &FailoverPolicy,
    attempts: u32,
    has_fallback: bool,
) -> bool {
    if !has_fallback || attempts >= policy.max_retries {
        return false;
    }
    match error {
        Error::ProviderRateLimit { .. } => policy.on_rate_limit,
        Error::ProviderServerError { .. } => policy.on_server_error,
        Error::ProviderTimeout { .. } => policy.on_timeout,
        _ => false,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(on_timeout: bool, max_retries: u32) -> FailoverPolicy {
        FailoverPolicy {
            on_rate_limit: true,
            on_server_error: true,
            on_timeout,
            timeout_ms: 1000,
            max_retries,
        }
    }

    fn timeout_err() -> Error {
        Error::ProviderTimeout {
            provider: "anthropic".into(),
            message: "deadline".into(),
        }
    }

    #[test]
    fn timeout_failover_honors_policy_flag() {
        assert!(should_failover(&timeout_err(), &policy(true, 1), 0, true));
        // onTimeout = false: the fallback is never invoked.
        assert!(!should_failover(&timeout_err(), &policy(false, 1), 0, true));
    }

    #[test]
    fn failover_requires_fallback_and_retry_budget() {
        assert!(!should_failover(&timeout_err(), &policy(true, 1), 0, false));
        assert!(!should_failover(&timeout_err(), &policy(true, 1), 1, true));
    }

    #[test]
    fn unclassified_errors_never_fail_over() {
        let err = Error::ProviderUnknown {
            provider: "anthropic".into(),
            message: "weird".into(),
        };
        assert!(!should_failover(&err, &policy(true, 3), 0, true));

        let err = Error::Internal("bug".into());
        assert!(!should_failover(&err, &policy(true, 3), 0, true));
    }

    #[test]
    fn rate_limit_and_server_error_follow_flags() {
        let rate = Error::ProviderRateLimit {
            provider: "p".into(),
            message: "429".into(),
        };
        let server = Error::ProviderServerError {
            provider: "p".into(),
            message: "500".into(),
        };
        let mut p = policy(false, 2);
        assert!(should_failover(&rate, &p, 0, true));
        assert!(should_failover(&server, &p, 1, true));
        p.on_rate_limit = false;
        p.on_server_error = false;
        assert!(!should_failover(&rate, &p, 0, true));
        assert!(!should_failover(&server, &p, 0, true));
    }
}
