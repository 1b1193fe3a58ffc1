//! Debugging engine core: session object, registries, thread coordination
//! and trace dispatch. The engine is embedded next to a host runtime: the
//! runtime feeds instrumentation events into the [`Debugger`] (which is the
//! session's [`runtime::ExecutionObserver`]) and a front-end controls it
//! over a [`crate::protocol::transport::Transport`].

pub mod breakpoint;
mod dispatch;
pub mod error;
pub mod frame;
pub mod runtime;
pub mod step;
pub(crate) mod thread;
pub mod variable;
pub mod watch;

use crate::debugger::breakpoint::{Breakpoint, BreakpointRegistry};
use crate::debugger::error::Error;
use crate::debugger::thread::Coordinator;
use crate::debugger::variable::ResolverRegistry;
use crate::debugger::watch::{Watch, WatchMode, WatchRegistry};
use crate::protocol::transport::{Transport, TransportRx, TransportTx};
use crate::protocol::OutgoingMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread as os_thread;
use std::time::Duration;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Source path prefixes considered debugger-internal: frames from these
    /// files never stop and are cut from reported stacks.
    pub skip_prefixes: Vec<String>,
    /// Call depth at which a session is terminated with a recursion report.
    pub recursion_limit: u32,
    /// Period of the poll gate timer (command draining while running free).
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            skip_prefixes: vec![],
            recursion_limit: 64,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// One remote debugging session.
///
/// Shared by every debuggee thread; all methods take `&self`. Created with
/// [`Debugger::new`] and installed into the runtime as the session's
/// execution observer.
pub struct Debugger {
    session_id: String,
    program: String,
    pub(crate) coordinator: Arc<Coordinator>,
    /// Receive half; held across a blocking wait by the attended thread.
    pub(crate) transport_rx: Mutex<Box<dyn TransportRx>>,
    /// Send half; its own lock, so reports from running threads never queue
    /// behind a reader blocked on the next command.
    transport_tx: Mutex<Box<dyn TransportTx>>,
    pub(crate) breakpoints: Mutex<BreakpointRegistry>,
    pub(crate) watches: Mutex<WatchRegistry>,
    pub(crate) resolvers: Mutex<ResolverRegistry>,
    /// Call/return tracing toggle (`RequestCallTrace`).
    pub(crate) calltrace: AtomicBool,
    exited: AtomicBool,
    pending_input: Mutex<Option<String>>,
    poll_timer: Mutex<Option<os_thread::JoinHandle<()>>>,
}

impl Debugger {
    pub fn new(transport: Transport, program: impl Into<String>, config: Config) -> Arc<Self> {
        let coordinator = Arc::new(Coordinator::new(
            config.skip_prefixes,
            config.recursion_limit,
        ));
        let poll_timer = spawn_poll_timer(coordinator.clone(), config.poll_interval);
        Arc::new(Debugger {
            session_id: uuid::Uuid::new_v4().to_string(),
            program: program.into(),
            coordinator,
            transport_rx: Mutex::new(transport.rx),
            transport_tx: Mutex::new(transport.tx),
            breakpoints: Mutex::default(),
            watches: Mutex::default(),
            resolvers: Mutex::new(ResolverRegistry::default()),
            calltrace: AtomicBool::new(false),
            exited: AtomicBool::new(false),
            pending_input: Mutex::new(None),
            poll_timer: Mutex::new(Some(poll_timer)),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    // ------------------------------------------------------------------------------------------
    // breakpoints and watches

    pub fn set_breakpoint(
        &self,
        file: &str,
        line: u32,
        temporary: bool,
        condition: Option<String>,
    ) -> Breakpoint {
        self.breakpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set(file, line, temporary, condition)
    }

    pub fn remove_breakpoint(&self, file: &str, line: u32) -> Option<Breakpoint> {
        self.breakpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear(file, line)
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.breakpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    /// Returns false when no breakpoint exists at the location.
    pub fn set_breakpoint_enabled(&self, file: &str, line: u32, enabled: bool) -> bool {
        self.breakpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_enabled(file, line, enabled)
    }

    pub fn set_breakpoint_ignore_count(&self, file: &str, line: u32, count: u32) -> bool {
        self.breakpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_ignore_count(file, line, count)
    }

    pub fn set_watch(&self, condition: &str, temporary: bool, mode: WatchMode) -> Watch {
        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set(condition, temporary, mode)
            .clone()
    }

    pub fn remove_watch(&self, condition: &str) -> Option<Watch> {
        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear(condition)
    }

    pub fn watches(&self) -> Vec<Watch> {
        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    pub fn set_watch_enabled(&self, condition: &str, enabled: bool) -> bool {
        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_enabled(condition, enabled)
    }

    pub fn set_watch_ignore_count(&self, condition: &str, count: u32) -> bool {
        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_ignore_count(condition, count)
    }

    /// Register a drill-down resolver for a host value type, replacing any
    /// previous registration for the same tag.
    pub fn register_resolver(
        &self,
        tag: impl Into<String>,
        resolver: Box<dyn variable::VariableResolver>,
    ) {
        self.resolvers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .register(tag, resolver)
    }

    pub fn set_call_trace(&self, enabled: bool) {
        self.calltrace.store(enabled, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------------------------------
    // session lifecycle

    /// Ask every debuggee thread to abort. Running threads observe the flag
    /// at their next event; parked threads are woken.
    pub fn request_quit(&self) {
        self.coordinator.request_quit();
    }

    /// Input text delivered with `RequestStdin`, consumed by the runtime's
    /// input shim.
    pub fn take_pending_input(&self) -> Option<String> {
        self.pending_input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub(crate) fn store_pending_input(&self, text: String) {
        *self
            .pending_input
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(text);
    }

    /// Report debuggee termination. Sends `ResponseExit` exactly once no
    /// matter how many times (or from how many threads) it is called, then
    /// tears the session down.
    pub fn program_exited(&self, status: i32, message: &str) {
        if self.exited.swap(true, Ordering::SeqCst) {
            return;
        }
        let exit = OutgoingMessage::ResponseExit {
            status,
            message: message.to_string(),
            program: self.program.clone(),
        };
        crate::weak_error!(self.send_unconditional(&exit), "exit report failed:");
        self.coordinator.request_quit();
        self.shutdown();
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Stop the poll timer. Idempotent; also called from `program_exited`.
    pub fn shutdown(&self) {
        self.coordinator.request_shutdown();
        let timer = self
            .poll_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(timer) = timer {
            let _ = timer.join();
        }
    }

    // ------------------------------------------------------------------------------------------
    // outgoing traffic

    /// Send a message to the front-end. Stop notifications are suppressed
    /// once a quit was requested or the program exited, so `ResponseExit` is
    /// always the last execution report on the stream.
    pub(crate) fn send(&self, message: &OutgoingMessage) -> Result<(), Error> {
        let stop_report = matches!(
            message,
            OutgoingMessage::ResponseLine { .. } | OutgoingMessage::ResponseException { .. }
        );
        if stop_report && (self.coordinator.quit_requested() || self.has_exited()) {
            return Ok(());
        }
        self.send_unconditional(message)
    }

    fn send_unconditional(&self, message: &OutgoingMessage) -> Result<(), Error> {
        self.transport_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(message, &self.session_id)?;
        Ok(())
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The timer only holds the coordinator, never the session itself, so a
/// dropped `Debugger` is not kept alive by its own timer thread.
fn spawn_poll_timer(
    coordinator: Arc<Coordinator>,
    interval: Duration,
) -> os_thread::JoinHandle<()> {
    os_thread::spawn(move || loop {
        os_thread::sleep(interval);
        if coordinator.is_shutdown() {
            break;
        }
        coordinator.set_poll();
    })
}
