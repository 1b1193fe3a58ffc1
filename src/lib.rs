//! `linehook` is an embeddable remote line-debugging engine.
//!
//! A host language runtime installs the engine's [`ExecutionObserver`] into
//! its instrumentation mechanism and, from then on, every line/call/return/
//! exception event flows through the trace dispatch state machine. The engine
//! decides whether to let the debuggee run free, keep tracing, or suspend the
//! executing thread and serve a controlling front-end over a stream socket
//! (newline-delimited JSON `{method, params}` messages).
//!
//! The crate never owns the interpreter: frames are opaque handles behind the
//! [`FrameView`] trait and expression evaluation is delegated back to the
//! runtime.
//!
//! [`ExecutionObserver`]: debugger::runtime::ExecutionObserver
//! [`FrameView`]: debugger::runtime::FrameView

pub mod debugger;
pub mod protocol;

pub use debugger::{Config, Debugger};
pub use debugger::error::Error;
