//! Per-thread execution state and the coordinator arbitrating which thread
//! holds the controller's attention. Only one debuggee thread may have its
//! stack and variables inspectable at a time; switching attention is an
//! explicit command that must find the target thread already stopped.

use crate::debugger::error::Error;
use crate::debugger::runtime::{FrameRef, ThreadId};
use crate::debugger::step::StopInfo;
use crate::debugger::variable::Value;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

/// Capacity of the memoized debugger-internal path filter.
const SKIP_CACHE_CAPACITY: usize = 512;

/// How often a parked thread re-checks the quit flag.
const PARK_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Mutable state of one debuggee thread, touched only by that thread itself
/// (the handle-level `stopped` flag is what other threads may inspect).
pub struct ThreadExecutionState {
    pub stop: StopInfo,
    /// Frame chain of the current stop, innermost first. Rebuilt on each
    /// stop, cleared on resume; indexes are the protocol's frame numbers.
    pub frames: Vec<FrameRef>,
    pub in_exception: bool,
    /// Recursion guard counter, maintained on call/return events.
    pub depth: u32,
    /// Stack frames to hide from the next report (recursion overflow hint).
    pub skip_frames: usize,
    /// Drill-down memoization for the current stop.
    pub drill_cache: HashMap<String, Value>,
}

impl ThreadExecutionState {
    fn new(stop: StopInfo) -> Self {
        ThreadExecutionState {
            stop,
            frames: vec![],
            in_exception: false,
            depth: 0,
            skip_frames: 0,
            drill_cache: HashMap::new(),
        }
    }
}

pub struct ThreadHandle {
    pub id: ThreadId,
    pub name: String,
    stopped: AtomicBool,
    state: Mutex<ThreadExecutionState>,
}

impl ThreadHandle {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub(crate) fn set_stopped(&self, stopped: bool) {
        self.stopped.store(stopped, Ordering::SeqCst);
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ThreadExecutionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) struct Coordinator {
    threads: RwLock<HashMap<ThreadId, std::sync::Arc<ThreadHandle>>>,
    attention: Mutex<Option<ThreadId>>,
    attention_changed: Condvar,
    quit: AtomicBool,
    poll: AtomicBool,
    shutdown: AtomicBool,
    any_thread_seen: AtomicBool,
    skip_prefixes: Vec<String>,
    skip_cache: Mutex<LruCache<String, bool>>,
    pub(crate) recursion_limit: u32,
}

impl Coordinator {
    pub(crate) fn new(skip_prefixes: Vec<String>, recursion_limit: u32) -> Self {
        let capacity = NonZeroUsize::new(SKIP_CACHE_CAPACITY).expect("non-zero capacity");
        Coordinator {
            threads: RwLock::default(),
            attention: Mutex::new(None),
            attention_changed: Condvar::new(),
            quit: AtomicBool::new(false),
            poll: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            any_thread_seen: AtomicBool::new(false),
            skip_prefixes,
            skip_cache: Mutex::new(LruCache::new(capacity)),
            recursion_limit,
        }
    }

    /// Register a starting thread. The first thread of the session begins in
    /// single-step mode so the session stops at the program's first line;
    /// later threads run free until they hit a breakpoint or watch.
    pub(crate) fn register_thread(&self, id: ThreadId, name: &str) -> std::sync::Arc<ThreadHandle> {
        let initial = if self.any_thread_seen.swap(true, Ordering::SeqCst) {
            StopInfo::continue_run()
        } else {
            StopInfo::step_into()
        };
        let handle = std::sync::Arc::new(ThreadHandle {
            id,
            name: name.to_string(),
            stopped: AtomicBool::new(false),
            state: Mutex::new(ThreadExecutionState::new(initial)),
        });
        self.threads
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handle.clone());
        handle
    }

    pub(crate) fn remove_thread(&self, id: ThreadId) {
        self.threads
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        self.release_attention(id);
    }

    pub(crate) fn handle(&self, id: ThreadId) -> Option<std::sync::Arc<ThreadHandle>> {
        self.threads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub(crate) fn threads_snapshot(&self) -> Vec<std::sync::Arc<ThreadHandle>> {
        let mut all: Vec<_> = self
            .threads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by_key(|h| h.id);
        all
    }

    pub(crate) fn attended(&self) -> Option<ThreadId> {
        *self.attention.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until this thread holds the attention token. Parked threads
    /// re-check the quit flag periodically so a quit reaches them even when
    /// the controller never attends them again.
    pub(crate) fn acquire_attention(&self, id: ThreadId) -> Result<(), Error> {
        let mut attention = self.attention.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.quit_requested() {
                return Err(Error::Quit);
            }
            match *attention {
                None => {
                    *attention = Some(id);
                    return Ok(());
                }
                Some(owner) if owner == id => return Ok(()),
                Some(_) => {
                    let (guard, _) = self
                        .attention_changed
                        .wait_timeout(attention, PARK_CHECK_INTERVAL)
                        .unwrap_or_else(PoisonError::into_inner);
                    attention = guard;
                }
            }
        }
    }

    /// Drop the attention token if this thread holds it, waking parked
    /// stopped threads so the next one can claim it.
    pub(crate) fn release_attention(&self, id: ThreadId) {
        let mut attention = self.attention.lock().unwrap_or_else(PoisonError::into_inner);
        if *attention == Some(id) {
            *attention = None;
            self.attention_changed.notify_all();
        }
    }

    /// Hand the attention token to another, already stopped, thread.
    pub(crate) fn transfer_attention(&self, to: ThreadId) -> Result<(), Error> {
        let target = self.handle(to).ok_or(Error::ThreadNotFound(to))?;
        if !target.is_stopped() {
            return Err(Error::ThreadNotStopped(to));
        }
        let mut attention = self.attention.lock().unwrap_or_else(PoisonError::into_inner);
        *attention = Some(to);
        self.attention_changed.notify_all();
        Ok(())
    }

    pub(crate) fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
        self.attention_changed.notify_all();
    }

    pub(crate) fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    pub(crate) fn set_poll(&self) {
        self.poll.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_poll(&self) -> bool {
        self.poll.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Memoized per-filename check of the debugger-internal path filter.
    pub(crate) fn file_is_internal(&self, filename: &str) -> bool {
        if self.skip_prefixes.is_empty() {
            return false;
        }
        let mut cache = self.skip_cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = cache.get(filename) {
            return *hit;
        }
        let internal = self
            .skip_prefixes
            .iter()
            .any(|prefix| filename.starts_with(prefix.as_str()));
        cache.put(filename.to_string(), internal);
        internal
    }
}
