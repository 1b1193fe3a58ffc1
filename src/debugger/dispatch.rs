//! Event dispatch: the per-event decision procedure that turns runtime
//! instrumentation events into stops, reports and tracing verdicts. This is
//! where a debuggee thread blocks while the controller inspects it.

use crate::debugger::breakpoint::BreakHit;
use crate::debugger::error::Error;
use crate::debugger::runtime::{
    Continuation, ExceptionInfo, ExecutionObserver, FrameRef, ThreadId, TraceEvent,
};
use crate::debugger::step::{LineThreshold, StopInfo};
use crate::debugger::thread::{ThreadExecutionState, ThreadHandle};
use crate::debugger::watch::WatchHit;
use crate::debugger::Debugger;
use crate::protocol::event_loop::{self, LoopOutcome, WaitMode};
use crate::protocol::OutgoingMessage;
use std::sync::atomic::Ordering;

/// What a stop reports to the controller before command serving begins.
enum StopNotify {
    Line,
    Exception { type_name: String, message: String },
}

/// Does the thread's stepping state make this frame/line a stop?
fn stop_here(stop: &StopInfo, frame: &FrameRef) -> bool {
    if let Some(stop_frame) = stop.stop_frame {
        if stop_frame == frame.id() {
            return stop.line_qualifies(frame.line());
        }
    }
    if stop.trace_everywhere {
        return true;
    }
    stop.return_frame == Some(frame.id())
}

impl ExecutionObserver for Debugger {
    fn on_event(
        &self,
        thread: ThreadId,
        frame: &FrameRef,
        event: TraceEvent,
    ) -> Result<Continuation, Error> {
        if self.has_exited() {
            return Err(Error::SessionTerminated);
        }
        let Some(handle) = self.coordinator.handle(thread) else {
            log::warn!(target: "debugger", "event {event} on unregistered thread {thread}");
            return Ok(Continuation::Trace);
        };
        let mut state = handle.state();
        self.poll_gate(&handle, &mut state)?;
        match event {
            TraceEvent::Line | TraceEvent::Instruction => {
                self.dispatch_line(&handle, &mut state, frame)
            }
            TraceEvent::Call => self.dispatch_call(&handle, &mut state, frame),
            TraceEvent::Return => self.dispatch_return(&handle, &mut state, frame),
            TraceEvent::Exception(info) => {
                self.dispatch_exception(&handle, &mut state, frame, &info)
            }
        }
    }

    fn on_thread_start(&self, thread: ThreadId, name: &str) {
        log::debug!(target: "debugger", "thread {thread} ({name}) started");
        self.coordinator.register_thread(thread, name);
    }

    fn on_thread_exit(&self, thread: ThreadId) {
        log::debug!(target: "debugger", "thread {thread} exited");
        self.coordinator.remove_thread(thread);
    }
}

impl Debugger {
    /// Command draining while the debuggee runs free. The timer arms a flag
    /// twice a second; the first running thread past this gate drains the
    /// socket. Skipped while some stopped thread serves the command stream.
    fn poll_gate(
        &self,
        handle: &ThreadHandle,
        state: &mut ThreadExecutionState,
    ) -> Result<(), Error> {
        if self.coordinator.quit_requested() {
            return Err(Error::Quit);
        }
        if !self.coordinator.take_poll() {
            return Ok(());
        }
        if self.coordinator.attended().is_some() {
            return Ok(());
        }
        event_loop::run(self, handle, state, WaitMode::Poll)?;
        if self.coordinator.quit_requested() {
            return Err(Error::Quit);
        }
        Ok(())
    }

    fn dispatch_line(
        &self,
        handle: &ThreadHandle,
        state: &mut ThreadExecutionState,
        frame: &FrameRef,
    ) -> Result<Continuation, Error> {
        let code = frame.code();
        if self.coordinator.file_is_internal(&code.filename) {
            return Ok(Continuation::Trace);
        }

        let stop = if stop_here(&state.stop, frame) {
            true
        } else if let Some(hit) = self.break_here(frame) {
            if hit.auto_delete {
                self.remove_breakpoint(&code.filename, frame.line());
            }
            true
        } else if let Some(hit) = self.watch_match(handle.id, frame) {
            if hit.auto_delete {
                self.remove_watch(&hit.condition);
            }
            true
        } else {
            false
        };

        if stop {
            self.stop_and_wait(handle, state, frame, StopNotify::Line)?;
        }
        Ok(Continuation::Trace)
    }

    /// A new frame was entered. Returns the tracing verdict for that frame:
    /// line events are delivered only when something inside the frame could
    /// possibly stop (or call tracing wants its returns observed).
    fn dispatch_call(
        &self,
        handle: &ThreadHandle,
        state: &mut ThreadExecutionState,
        frame: &FrameRef,
    ) -> Result<Continuation, Error> {
        state.depth += 1;
        if state.depth > self.coordinator.recursion_limit {
            return self.report_recursion_overflow(handle, frame, state);
        }

        let code = frame.code();
        if self.coordinator.file_is_internal(&code.filename) {
            return Ok(Continuation::Stop);
        }

        let calltrace = self.calltrace.load(Ordering::SeqCst);
        if calltrace {
            self.emit_call_trace("call", frame)?;
        }

        let keep_tracing = stop_here(&state.stop, frame)
            || calltrace
            || self
                .breakpoints
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .code_has_breakpoint(code)
            || !self
                .watches
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .is_empty()
            || (state.stop.is_stepping() && code.is_suspendable());
        Ok(if keep_tracing {
            Continuation::Trace
        } else {
            Continuation::Stop
        })
    }

    /// The frame is about to return. A returning stop-target frame clears
    /// the stepping target so the caller's next line is the stop -- unless
    /// the frame is a generator/coroutine body, whose "return" may be a
    /// suspension that will be stepped back into. A returning return-target
    /// frame stops right here: it will never execute another line, so the
    /// pending step (out or over) would otherwise be lost in a tail call.
    fn dispatch_return(
        &self,
        handle: &ThreadHandle,
        state: &mut ThreadExecutionState,
        frame: &FrameRef,
    ) -> Result<Continuation, Error> {
        state.depth = state.depth.saturating_sub(1);

        if self.calltrace.load(Ordering::SeqCst) {
            self.emit_call_trace("return", frame)?;
        }

        if frame.code().is_suspendable() || state.stop.threshold == LineThreshold::Never {
            return Ok(Continuation::Trace);
        }

        if state.stop.stop_frame == Some(frame.id()) {
            state.stop = StopInfo::cleared_after_return();
        } else if state.stop.return_frame == Some(frame.id()) {
            if self.coordinator.file_is_internal(&frame.code().filename) {
                state.stop = StopInfo::cleared_after_return();
            } else {
                self.stop_and_wait(handle, state, frame, StopNotify::Line)?;
            }
        }
        Ok(Continuation::Trace)
    }

    /// An exception is propagating through the frame. Exhaustion signals of
    /// suspendable frames are control flow, not errors: raised without a
    /// traceback inside the stepped frame they are suppressed, while the
    /// exhaustion that terminates a generator the controller is stepping
    /// *through* (delegation, stop frame elsewhere) is reported.
    fn dispatch_exception(
        &self,
        handle: &ThreadHandle,
        state: &mut ThreadExecutionState,
        frame: &FrameRef,
        info: &ExceptionInfo,
    ) -> Result<Continuation, Error> {
        if self.coordinator.file_is_internal(&frame.code().filename) {
            return Ok(Continuation::Trace);
        }

        let report = if stop_here(&state.stop, frame) {
            !(frame.code().is_suspendable() && info.exhaustion && !info.has_traceback)
        } else {
            state.stop.stop_frame.is_some()
                && state.stop.stop_frame != Some(frame.id())
                && state.stop.stop_frame_suspendable
                && info.exhaustion
        };

        if report {
            state.in_exception = true;
            let notify = StopNotify::Exception {
                type_name: info.type_name.clone(),
                message: info.message.clone(),
            };
            let served = self.stop_and_wait(handle, state, frame, notify);
            state.in_exception = false;
            served?;
        }
        Ok(Continuation::Trace)
    }

    fn break_here(&self, frame: &FrameRef) -> Option<BreakHit> {
        let code = frame.code();
        let mut registry = self
            .breakpoints
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !registry.file_has_breakpoints(&code.filename) {
            return None;
        }
        registry.effective(&code.filename, frame.line(), frame)
    }

    fn watch_match(&self, thread: ThreadId, frame: &FrameRef) -> Option<WatchHit> {
        let mut watches = self
            .watches
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if watches.is_empty() {
            return None;
        }
        watches.first_match(thread, frame)
    }

    /// Park the thread: report the stop, then serve controller commands
    /// until one resumes execution. Attention may move to other stopped
    /// threads and back; each re-acquisition re-announces the stop.
    fn stop_and_wait(
        &self,
        handle: &ThreadHandle,
        state: &mut ThreadExecutionState,
        frame: &FrameRef,
        notify: StopNotify,
    ) -> Result<(), Error> {
        state.frames = self.collect_frames(frame, state.skip_frames);
        state.drill_cache.clear();
        handle.set_stopped(true);

        let served = self.serve_stop(handle, state, &notify);

        handle.set_stopped(false);
        state.frames.clear();
        state.drill_cache.clear();
        state.skip_frames = 0;
        self.coordinator.release_attention(handle.id);

        served?;
        if self.coordinator.quit_requested() {
            return Err(Error::Quit);
        }
        Ok(())
    }

    fn serve_stop(
        &self,
        handle: &ThreadHandle,
        state: &mut ThreadExecutionState,
        notify: &StopNotify,
    ) -> Result<(), Error> {
        loop {
            self.coordinator.acquire_attention(handle.id)?;

            let stack = self.render_stack(&state.frames, true);
            let report = match notify {
                StopNotify::Line => OutgoingMessage::ResponseLine {
                    stack,
                    thread_name: handle.name.clone(),
                },
                StopNotify::Exception { type_name, message } => {
                    OutgoingMessage::ResponseException {
                        exception_type: type_name.clone(),
                        message: message.clone(),
                        stack,
                        thread_name: handle.name.clone(),
                    }
                }
            };
            self.send(&report)?;

            match event_loop::run(self, handle, state, WaitMode::Blocking)? {
                LoopOutcome::Resume => return Ok(()),
                LoopOutcome::Yield | LoopOutcome::Idle => continue,
            }
        }
    }

    fn report_recursion_overflow(
        &self,
        handle: &ThreadHandle,
        frame: &FrameRef,
        state: &mut ThreadExecutionState,
    ) -> Result<Continuation, Error> {
        let limit = self.coordinator.recursion_limit;
        // hide the frame that crossed the limit from the report
        state.skip_frames = 1;
        let frames = self.collect_frames(frame, state.skip_frames);
        let report = OutgoingMessage::ResponseException {
            exception_type: "RecursionError".to_string(),
            message: format!("maximum debug recursion depth {limit} exceeded"),
            stack: self.render_stack(&frames, false),
            thread_name: handle.name.clone(),
        };
        crate::weak_error!(self.send(&report), "recursion overflow report failed:");
        Err(Error::RecursionOverflow {
            limit,
            skip_frames: state.skip_frames,
        })
    }

    fn emit_call_trace(&self, event: &str, frame: &FrameRef) -> Result<(), Error> {
        if self.coordinator.file_is_internal(&frame.code().filename) {
            return Ok(());
        }
        let describe = |f: &FrameRef| {
            let code = f.code();
            format!("{}:{} ({})", code.filename, f.line(), code.function)
        };
        let from = match frame.parent() {
            Some(parent) => describe(&parent),
            None => "<root>".to_string(),
        };
        self.send(&OutgoingMessage::CallTrace {
            event: event.to_string(),
            from,
            to: describe(frame),
        })
    }
}
