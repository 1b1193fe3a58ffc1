//! Watch expressions: conditions evaluated against every stop-candidate
//! frame, in registration order, short-circuiting on first match.

use crate::debugger::runtime::{FrameRef, ThreadId};
use crate::debugger::variable::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// When a watch fires, assuming its expression evaluates at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WatchMode {
    /// Every evaluation where the expression is truthy.
    #[default]
    Always,
    /// The expression transitions from unevaluable to evaluable.
    OnCreation,
    /// The value differs from the last observed one. The first evaluation
    /// only establishes the baseline and never fires.
    OnChange,
}

/// Evaluation context for baselines: one last-observed value per thread and
/// code identity, so recursion depth does not split contexts.
type WatchContext = (ThreadId, String, u32);

#[derive(Debug, Clone, Default)]
struct Baseline {
    value: Option<Value>,
    evaluated: bool,
    existed: bool,
}

#[derive(Debug, Clone)]
pub struct Watch {
    pub number: u32,
    pub condition: String,
    pub enabled: bool,
    pub temporary: bool,
    pub ignore_count: u32,
    pub hits: u32,
    pub mode: WatchMode,
}

/// Internal entry: the public `Watch` plus per-context baselines.
#[derive(Debug, Clone)]
struct WatchState {
    watch: Watch,
    baselines: HashMap<WatchContext, Baseline>,
}

/// A firing watch, as seen by the dispatch routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchHit {
    pub number: u32,
    pub condition: String,
    pub auto_delete: bool,
}

/// Registration-order watch registry, keyed by condition text.
#[derive(Default)]
pub struct WatchRegistry {
    watches: IndexMap<String, WatchState>,
    next_number: u32,
}

impl WatchRegistry {
    /// Create a watch, replacing any previous one with the same condition
    /// text (baselines reset).
    pub fn set(&mut self, condition: &str, temporary: bool, mode: WatchMode) -> &Watch {
        self.next_number += 1;
        let state = WatchState {
            watch: Watch {
                number: self.next_number,
                condition: condition.to_string(),
                enabled: true,
                temporary,
                ignore_count: 0,
                hits: 0,
                mode,
            },
            baselines: HashMap::new(),
        };
        // shift_remove keeps registration order for the re-added entry
        self.watches.shift_remove(condition);
        &self
            .watches
            .entry(condition.to_string())
            .or_insert(state)
            .watch
    }

    /// Removing an unknown watch is a no-op.
    pub fn clear(&mut self, condition: &str) -> Option<Watch> {
        self.watches.shift_remove(condition).map(|s| s.watch)
    }

    pub fn set_enabled(&mut self, condition: &str, enabled: bool) -> bool {
        match self.watches.get_mut(condition) {
            Some(state) => {
                state.watch.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn set_ignore_count(&mut self, condition: &str, count: u32) -> bool {
        match self.watches.get_mut(condition) {
            Some(state) => {
                state.watch.ignore_count = count;
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Watch> {
        self.watches.values().map(|s| s.watch.clone()).collect()
    }

    /// Evaluate watches against a stop-candidate frame, in registration
    /// order, short-circuiting on the first match. Evaluation errors count
    /// as non-matches (but feed the `OnCreation` baseline).
    pub fn first_match(&mut self, thread: ThreadId, frame: &FrameRef) -> Option<WatchHit> {
        let code = frame.code();
        let context: WatchContext = (thread, code.filename.clone(), code.first_line);

        for state in self.watches.values_mut() {
            if !state.watch.enabled {
                continue;
            }
            let baseline = state.baselines.entry(context.clone()).or_default();
            let outcome = frame.eval(&state.watch.condition);
            let first_evaluation = !baseline.evaluated;
            baseline.evaluated = true;

            let candidate = match outcome {
                Err(_) => {
                    baseline.existed = false;
                    baseline.value = None;
                    false
                }
                Ok(value) => {
                    let fired = match state.watch.mode {
                        WatchMode::Always => value.is_truthy(),
                        WatchMode::OnCreation => !first_evaluation && !baseline.existed,
                        WatchMode::OnChange => {
                            !first_evaluation && baseline.value.as_ref() != Some(&value)
                        }
                    };
                    baseline.existed = true;
                    baseline.value = Some(value);
                    fired
                }
            };
            if !candidate {
                continue;
            }

            state.watch.hits += 1;
            if state.watch.ignore_count > 0 {
                state.watch.ignore_count -= 1;
                continue;
            }
            return Some(WatchHit {
                number: state.watch.number,
                condition: state.watch.condition.clone(),
                auto_delete: state.watch.temporary,
            });
        }
        None
    }
}
