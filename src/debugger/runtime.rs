//! Adapter surface between the engine and a host runtime's instrumentation
//! mechanism. The runtime implements [`FrameView`] for its activation records
//! and drives the engine by feeding every instrumentation event into an
//! [`ExecutionObserver`] installed at session start. No ambient global trace
//! state exists on the engine side.

use crate::debugger::error::Error;
use crate::debugger::variable::Value;
use std::sync::Arc;

/// Identifier of a debuggee execution thread, assigned by the runtime.
pub type ThreadId = u64;

/// Identifier of a single activation record, stable for the lifetime of the
/// activation. Two handles to the same live activation compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u64);

/// Static description of a code object (a function body as compiled by the
/// runtime), shared by every activation of that function.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeInfo {
    /// Source file the code object was compiled from.
    pub filename: String,
    /// Function (or method) name.
    pub function: String,
    /// First source line of the function definition.
    pub first_line: u32,
    /// Declared parameter names, in order.
    pub arg_names: Vec<String>,
    /// Lines that carry executable statements. Used to decide statically
    /// whether a breakpoint can ever fire inside this code object.
    pub executable_lines: Vec<u32>,
    pub generator: bool,
    pub coroutine: bool,
}

impl CodeInfo {
    /// True for code objects whose activation can suspend and be re-entered
    /// (generator or coroutine bodies).
    pub fn is_suspendable(&self) -> bool {
        self.generator || self.coroutine
    }
}

/// Expression evaluation failure inside a frame scope.
///
/// Breakpoint and watch conditions that fail to evaluate are treated as
/// non-matches and never surface to the controller.
#[derive(Debug, Clone, thiserror::Error)]
#[error("evaluation error: {0}")]
pub struct EvalError(pub String);

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum_macros::Display,
    strum_macros::EnumString,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VarScope {
    Local,
    Global,
}

/// Opaque handle to one activation record of the debuggee.
///
/// A handle stays valid while its thread is stopped; the engine rebuilds all
/// frame chains on each stop and never retains handles across a resume.
pub trait FrameView: Send + Sync {
    fn id(&self) -> FrameId;
    fn code(&self) -> &CodeInfo;
    /// Line currently executing (about to execute, for a `line` event).
    fn line(&self) -> u32;
    fn parent(&self) -> Option<FrameRef>;

    /// Binding names visible in the given scope, in runtime order.
    fn names(&self, scope: VarScope) -> Vec<String>;
    fn get_var(&self, scope: VarScope, name: &str) -> Option<Value>;
    /// Rebind a name in the frame scope. Returns false if the runtime
    /// refuses the edit.
    fn set_var(&self, scope: VarScope, name: &str, value: Value) -> bool;

    /// Evaluate a boolean/value expression in the frame's variable scope.
    fn eval(&self, expr: &str) -> Result<Value, EvalError>;

    /// Re-install the trace callback on this frame. Called for each frame of
    /// a reported stack so the whole visible chain stays instrumented after
    /// a break.
    fn reinstall_trace(&self) {}
}

pub type FrameRef = Arc<dyn FrameView>;

/// Exception details delivered with a `TraceEvent::Exception`.
#[derive(Debug, Clone)]
pub struct ExceptionInfo {
    /// Runtime type name of the raised exception.
    pub type_name: String,
    pub message: String,
    /// False when the exception was raised without an attached traceback
    /// (freshly constructed control-flow signal).
    pub has_traceback: bool,
    /// Set by the runtime for its iterator/generator exhaustion signals
    /// (`StopIteration`/`GeneratorExit` equivalents). The engine suppresses
    /// such exceptions when they are delegation artifacts, see dispatch.
    pub exhaustion: bool,
}

/// One instrumentation event on a thread.
#[derive(Debug, Clone, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TraceEvent {
    /// A new source line is about to execute.
    Line,
    /// A single instruction is about to execute (opcode-level tracing).
    Instruction,
    /// A new frame was entered (including generator/coroutine re-entry).
    Call,
    /// The frame is about to return.
    Return,
    Exception(ExceptionInfo),
}

/// Verdict returned to the runtime for every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Keep delivering events for this frame.
    Trace,
    /// Stop tracing this frame; untraced frames impose no per-line overhead.
    Stop,
}

/// The engine-side consumer of instrumentation events. Installed into the
/// runtime adapter at session start; one observer serves all threads.
pub trait ExecutionObserver: Send + Sync {
    /// Dispatch one event. A fatal `Err` (see [`Error::is_fatal`]) means the
    /// runtime must abort execution of the debuggee program; in particular
    /// [`Error::Quit`] is the controller-requested termination signal.
    fn on_event(
        &self,
        thread: ThreadId,
        frame: &FrameRef,
        event: TraceEvent,
    ) -> Result<Continuation, Error>;

    /// A debuggee thread started executing under the debugger.
    fn on_thread_start(&self, thread: ThreadId, name: &str);

    /// A debuggee thread terminated.
    fn on_thread_exit(&self, thread: ThreadId);
}
