use crate::debugger::runtime::{EvalError, ThreadId};
use crate::protocol::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    RegEx(#[from] regex::Error),

    // --------------------------------- control signals -------------------------------------------
    #[error("quit requested by controller")]
    Quit,
    #[error("recursion limit {limit} exceeded")]
    RecursionOverflow { limit: u32, skip_frames: usize },

    // --------------------------------- debugger entity not found----------------------------------
    #[error("frame number {0} not found")]
    FrameNotFound(u32),
    #[error("thread {0} not found")]
    ThreadNotFound(ThreadId),
    #[error("thread {0} is not stopped")]
    ThreadNotStopped(ThreadId),
    #[error("variable `{0}` not found in frame scope")]
    VariableNotFound(String),

    // --------------------------------- introspection errors --------------------------------------
    #[error("access path error: {0}")]
    Path(String),
    #[error("value has no child `{0}`")]
    Unresolvable(String),
    #[error(transparent)]
    Eval(#[from] EvalError),

    // --------------------------------- session state errors --------------------------------------
    #[error("session already terminated")]
    SessionTerminated,

    // --------------------------------- transport errors ------------------------------------------
    #[error(transparent)]
    Transport(#[from] TransportError),

    // --------------------------------- third party errors ----------------------------------------
    #[error("hook: {0}")]
    Hook(anyhow::Error),
}

impl Error {
    /// Return a hint to the runtime adapter - continue debugging after error
    /// or tear the whole session down.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::IO(_) => false,
            Error::RegEx(_) => false,
            Error::FrameNotFound(_) => false,
            Error::ThreadNotFound(_) => false,
            Error::ThreadNotStopped(_) => false,
            Error::VariableNotFound(_) => false,
            Error::Path(_) => false,
            Error::Unresolvable(_) => false,
            Error::Eval(_) => false,
            Error::Hook(_) => false,

            // currently fatal errors
            Error::Quit => true,
            Error::RecursionOverflow { .. } => true,
            Error::SessionTerminated => true,
            Error::Transport(_) => true,
        }
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
