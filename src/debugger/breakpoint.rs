//! Spatial breakpoint registry: pure data structure, no I/O. Keyed by
//! (canonic file, line); at most one active breakpoint per key.

use crate::debugger::runtime::{CodeInfo, FrameRef};
use crate::muted_error;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Breakpoint representation.
#[derive(Debug, Clone, PartialEq)]
pub struct Breakpoint {
    /// Monotonically assigned number, for diagnostics and dumps.
    pub number: u32,
    pub file: String,
    pub line: u32,
    pub enabled: bool,
    /// Self-deletes the first time it actually fires.
    pub temporary: bool,
    /// Skip this many hits before stopping.
    pub ignore_count: u32,
    /// Hits so far (condition-true hits only).
    pub hits: u32,
    /// Boolean expression evaluated in the frame scope; an evaluation error
    /// counts as "condition false".
    pub condition: Option<String>,
}

/// A firing breakpoint, as seen by the dispatch routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakHit {
    pub number: u32,
    /// Safe to auto-delete: the breakpoint is temporary and actually fired.
    pub auto_delete: bool,
}

#[derive(Default)]
pub struct BreakpointRegistry {
    by_location: HashMap<(String, u32), Breakpoint>,
    /// Memoized `(file, code first line) -> code object contains a breakpoint
    /// line`. Invalidated per file on every mutating operation.
    code_cache: HashMap<(String, u32), bool>,
    canonic_cache: HashMap<String, String>,
    next_number: u32,
}

impl BreakpointRegistry {
    /// Normalized form of a source path, cached per raw string. Runtime
    /// pseudo-files (`<stdin>` style) pass through untouched.
    pub fn canonic(&mut self, file: &str) -> String {
        if let Some(hit) = self.canonic_cache.get(file) {
            return hit.clone();
        }
        let canonic = canonic_path(file);
        self.canonic_cache.insert(file.to_string(), canonic.clone());
        canonic
    }

    /// Create a breakpoint, replacing any previous one at the same key.
    pub fn set(
        &mut self,
        file: &str,
        line: u32,
        temporary: bool,
        condition: Option<String>,
    ) -> Breakpoint {
        let file = self.canonic(file);
        self.invalidate_code_cache(&file);
        self.next_number += 1;
        let brkpt = Breakpoint {
            number: self.next_number,
            file: file.clone(),
            line,
            enabled: true,
            temporary,
            ignore_count: 0,
            hits: 0,
            condition,
        };
        self.by_location.insert((file, line), brkpt.clone());
        brkpt
    }

    /// Remove the breakpoint at the key. Clearing a breakpoint that was never
    /// set is a no-op.
    pub fn clear(&mut self, file: &str, line: u32) -> Option<Breakpoint> {
        let file = self.canonic(file);
        self.invalidate_code_cache(&file);
        self.by_location.remove(&(file, line))
    }

    pub fn get(&mut self, file: &str, line: u32) -> Option<&Breakpoint> {
        let file = self.canonic(file);
        self.by_location.get(&(file, line))
    }

    /// Enable or disable without touching the rest of the breakpoint state.
    pub fn set_enabled(&mut self, file: &str, line: u32, enabled: bool) -> bool {
        let file = self.canonic(file);
        match self.by_location.get_mut(&(file, line)) {
            Some(brkpt) => {
                brkpt.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn set_ignore_count(&mut self, file: &str, line: u32, count: u32) -> bool {
        let file = self.canonic(file);
        match self.by_location.get_mut(&(file, line)) {
            Some(brkpt) => {
                brkpt.ignore_count = count;
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_location.is_empty()
    }

    /// Fast per-file pre-check used on every line event.
    pub fn file_has_breakpoints(&mut self, file: &str) -> bool {
        let file = self.canonic(file);
        self.by_location.keys().any(|(f, _)| *f == file)
    }

    /// First enabled breakpoint at the key whose ignore count is exhausted
    /// and whose condition (if any) evaluates truthy in the frame scope.
    pub fn effective(&mut self, file: &str, line: u32, frame: &FrameRef) -> Option<BreakHit> {
        let file = self.canonic(file);
        let brkpt = self.by_location.get_mut(&(file, line))?;
        if !brkpt.enabled {
            return None;
        }
        if let Some(condition) = &brkpt.condition {
            let truthy = muted_error!(frame.eval(condition), "breakpoint condition:")
                .map(|v| v.is_truthy())
                .unwrap_or(false);
            if !truthy {
                return None;
            }
        }
        brkpt.hits += 1;
        if brkpt.ignore_count > 0 {
            brkpt.ignore_count -= 1;
            return None;
        }
        Some(BreakHit {
            number: brkpt.number,
            auto_delete: brkpt.temporary,
        })
    }

    /// Memoized: does this code object statically contain a breakpoint line?
    /// Used to skip tracing of calls into functions of no interest.
    pub fn code_has_breakpoint(&mut self, code: &CodeInfo) -> bool {
        let file = self.canonic(&code.filename);
        let key = (file.clone(), code.first_line);
        if let Some(hit) = self.code_cache.get(&key) {
            return *hit;
        }
        let result = code
            .executable_lines
            .iter()
            .any(|line| self.by_location.contains_key(&(file.clone(), *line)));
        self.code_cache.insert(key, result);
        result
    }

    /// Current breakpoints, ordered by number.
    pub fn snapshot(&self) -> Vec<Breakpoint> {
        let mut all: Vec<_> = self.by_location.values().cloned().collect();
        all.sort_by_key(|b| b.number);
        all
    }

    fn invalidate_code_cache(&mut self, file: &str) {
        self.code_cache.retain(|(f, _), _| f != file);
    }
}

fn canonic_path(file: &str) -> String {
    if file.starts_with('<') && file.ends_with('>') {
        return file.to_string();
    }
    // lexical normalization only: never touch the filesystem here
    let mut normalized = PathBuf::new();
    for component in Path::new(file).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other),
        }
    }
    normalized.to_string_lossy().into_owned()
}
