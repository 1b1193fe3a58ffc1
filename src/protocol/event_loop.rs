//! Command serving. A stopped, attended thread runs this loop in blocking
//! mode until a command resumes it; running threads drain already-arrived
//! commands through the same loop in poll mode (zero timeout, no blocking).

use crate::debugger::error::Error;
use crate::debugger::runtime::{FrameRef, VarScope};
use crate::debugger::step::StopInfo;
use crate::debugger::thread::{ThreadExecutionState, ThreadHandle};
use crate::debugger::variable::{list_variables, Value, VariableEntry};
use crate::debugger::Debugger;
use crate::protocol::{IncomingMessage, OutgoingMessage, ThreadDescriptor};
use serde_json::Value as Json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Block on the transport until a command arrives (stopped thread).
    Blocking,
    /// Drain already-arrived commands only (running thread, poll gate).
    Poll,
}

/// Why the loop returned control to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopOutcome {
    /// A command resumed execution; `state.stop` holds the new target.
    Resume,
    /// Attention moved to another thread; the caller must park and re-serve
    /// once it gets attention back.
    Yield,
    /// Nothing left to drain (poll mode only).
    Idle,
}

pub(crate) fn run(
    debugger: &Debugger,
    handle: &ThreadHandle,
    state: &mut ThreadExecutionState,
    mode: WaitMode,
) -> Result<LoopOutcome, Error> {
    loop {
        let message = match mode {
            WaitMode::Blocking => {
                let mut rx = debugger
                    .transport_rx
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                Some(rx.recv_blocking()?)
            }
            WaitMode::Poll => {
                // never contend with a blocking reader
                let Ok(mut rx) = debugger.transport_rx.try_lock() else {
                    return Ok(LoopOutcome::Idle);
                };
                rx.try_recv()?
            }
        };
        let Some(message) = message else {
            return Ok(LoopOutcome::Idle);
        };

        log::debug!(target: "debugger", "thread {}: command {message:?}", handle.id);
        if let Some(outcome) = handle_command(debugger, handle, state, mode, message)? {
            return Ok(outcome);
        }
    }
}

fn handle_command(
    debugger: &Debugger,
    handle: &ThreadHandle,
    state: &mut ThreadExecutionState,
    mode: WaitMode,
    message: IncomingMessage,
) -> Result<Option<LoopOutcome>, Error> {
    // while running free, only quit and input delivery act on execution
    if mode == WaitMode::Poll
        && message.resumes_execution()
        && !matches!(
            message,
            IncomingMessage::RequestStepQuit {} | IncomingMessage::RequestStdin { .. }
        )
    {
        log::warn!(target: "debugger", "debuggee is running, ignored: {message:?}");
        return Ok(None);
    }

    match message {
        IncomingMessage::RequestBreakpoint {
            filename,
            line,
            temporary,
            condition,
            set_breakpoint,
        } => {
            if set_breakpoint {
                debugger.set_breakpoint(&filename, line, temporary, condition);
            } else {
                debugger.remove_breakpoint(&filename, line);
            }
            Ok(None)
        }

        IncomingMessage::RequestBreakpointState {
            filename,
            line,
            enabled,
            ignore_count,
        } => {
            let mut known = true;
            if let Some(enabled) = enabled {
                known &= debugger.set_breakpoint_enabled(&filename, line, enabled);
            }
            if let Some(count) = ignore_count {
                known &= debugger.set_breakpoint_ignore_count(&filename, line, count);
            }
            if !known {
                log::warn!(target: "debugger", "no breakpoint at {filename}:{line}");
            }
            Ok(None)
        }

        IncomingMessage::RequestWatch {
            condition,
            temporary,
            mode: watch_mode,
            set_watch,
        } => {
            if set_watch {
                debugger.set_watch(&condition, temporary, watch_mode);
            } else {
                debugger.remove_watch(&condition);
            }
            Ok(None)
        }

        IncomingMessage::RequestWatchState {
            condition,
            enabled,
            ignore_count,
        } => {
            let mut known = true;
            if let Some(enabled) = enabled {
                known &= debugger.set_watch_enabled(&condition, enabled);
            }
            if let Some(count) = ignore_count {
                known &= debugger.set_watch_ignore_count(&condition, count);
            }
            if !known {
                log::warn!(target: "debugger", "no watch on `{condition}`");
            }
            Ok(None)
        }

        IncomingMessage::RequestCallTrace { trace } => {
            debugger.set_call_trace(trace);
            Ok(None)
        }

        IncomingMessage::RequestStep {} => {
            state.stop = StopInfo::step_into();
            Ok(Some(LoopOutcome::Resume))
        }
        IncomingMessage::RequestStepOver {} => Ok(resume_from_frame(state, StopInfo::step_over)),
        IncomingMessage::RequestStepOut {} => Ok(resume_from_frame(state, StopInfo::step_out)),
        IncomingMessage::RequestContinue {} => {
            state.stop = StopInfo::continue_run();
            Ok(Some(LoopOutcome::Resume))
        }
        IncomingMessage::RequestContinueUntil { new_line } => Ok(resume_from_frame(
            state,
            |frame| StopInfo::until(frame, new_line),
        )),

        IncomingMessage::RequestStepQuit {} => {
            debugger.request_quit();
            Ok(Some(LoopOutcome::Resume))
        }

        IncomingMessage::RequestStdin { text } => {
            debugger.store_pending_input(text);
            match mode {
                WaitMode::Blocking => Ok(Some(LoopOutcome::Resume)),
                WaitMode::Poll => Ok(None),
            }
        }

        IncomingMessage::RequestStack {} => {
            let stack = debugger.render_stack(&state.frames, false);
            debugger.send(&OutgoingMessage::ResponseStack { stack })?;
            Ok(None)
        }

        IncomingMessage::RequestVariables {
            frame_number,
            scope,
            filters,
        } => {
            let variables = target_frame(state, frame_number)
                .and_then(|frame| list_variables(&frame, scope, &filters))
                .unwrap_or_else(|e| {
                    log::warn!(target: "debugger", "variable listing failed: {e:#}");
                    vec![]
                });
            debugger.send(&OutgoingMessage::ResponseVariables { variables })?;
            Ok(None)
        }

        IncomingMessage::RequestVariable {
            frame_number,
            scope,
            path,
        } => {
            let children = drill_down(debugger, state, frame_number, scope, &path)
                .unwrap_or_else(|e| {
                    log::warn!(target: "debugger", "drill-down `{path}` failed: {e:#}");
                    vec![]
                });
            debugger.send(&OutgoingMessage::ResponseVariable { path, children })?;
            Ok(None)
        }

        IncomingMessage::RequestEnvironment {
            frame_number,
            scope,
            name,
            value,
        } => {
            match target_frame(state, frame_number) {
                Ok(frame) => {
                    if !frame.set_var(scope, &name, json_to_value(value)) {
                        log::warn!(target: "debugger", "runtime refused rebinding of `{name}`");
                    }
                }
                Err(e) => log::warn!(target: "debugger", "environment edit failed: {e:#}"),
            }
            Ok(None)
        }

        IncomingMessage::RequestThreadList {} => {
            let attended = debugger.coordinator.attended();
            let threads = debugger
                .coordinator
                .threads_snapshot()
                .iter()
                .map(|h| ThreadDescriptor {
                    id: h.id,
                    name: h.name.clone(),
                    stopped: h.is_stopped(),
                    attended: attended == Some(h.id),
                })
                .collect();
            debugger.send(&OutgoingMessage::ResponseThreads { threads })?;
            Ok(None)
        }

        IncomingMessage::RequestThreadSet { thread_id } => {
            if thread_id == handle.id {
                return Ok(None);
            }
            match debugger.coordinator.transfer_attention(thread_id) {
                Ok(()) => Ok(match mode {
                    WaitMode::Blocking => Some(LoopOutcome::Yield),
                    WaitMode::Poll => None,
                }),
                Err(e) => {
                    log::warn!(target: "debugger", "thread switch failed: {e:#}");
                    Ok(None)
                }
            }
        }
    }
}

/// Resume with a stepping target derived from the innermost stopped frame.
fn resume_from_frame(
    state: &mut ThreadExecutionState,
    make_stop: impl FnOnce(&FrameRef) -> StopInfo,
) -> Option<LoopOutcome> {
    match state.frames.first().cloned() {
        Some(frame) => {
            state.stop = make_stop(&frame);
            Some(LoopOutcome::Resume)
        }
        None => {
            log::warn!(target: "debugger", "stepping command without a stopped frame ignored");
            None
        }
    }
}

fn target_frame(state: &ThreadExecutionState, frame_number: u32) -> Result<FrameRef, Error> {
    state
        .frames
        .get(frame_number as usize)
        .cloned()
        .ok_or(Error::FrameNotFound(frame_number))
}

fn drill_down(
    debugger: &Debugger,
    state: &mut ThreadExecutionState,
    frame_number: u32,
    scope: VarScope,
    path: &str,
) -> Result<Vec<VariableEntry>, Error> {
    let frame = target_frame(state, frame_number)?;
    let resolvers = debugger
        .resolvers
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let value = resolvers.resolve_path(&frame, scope, path, &mut state.drill_cache)?;
    Ok(resolvers
        .children(&value)
        .into_iter()
        .map(|(name, child)| VariableEntry::new(name, &child))
        .collect())
}

/// Protocol JSON to engine value, for environment edits.
fn json_to_value(json: Json) -> Value {
    match json {
        Json::Null => Value::Unit,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::Str(s),
        Json::Array(items) => Value::List(items.into_iter().map(json_to_value).collect()),
        Json::Object(fields) => Value::Map(
            fields
                .into_iter()
                .map(|(k, v)| (Value::Str(k), json_to_value(v)))
                .collect(),
        ),
    }
}
