//! Per-thread stepping state and its transition table. The dispatch routine
//! consults [`StopInfo`] on every event; stepping commands replace it
//! wholesale.

use crate::debugger::runtime::{FrameId, FrameRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum StepMode {
    None,
    Into,
    Over,
    Out,
    Until,
    Continue,
}

/// Line threshold applied inside the designated stop frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineThreshold {
    /// Any reached line qualifies.
    AnyLine,
    /// Never stop on a line (continue mode sentinel).
    Never,
    /// Stop once the reached line is >= the recorded line.
    AtOrAfter(u32),
}

/// The stepping target state of one thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopInfo {
    pub mode: StepMode,
    /// Frame in which the line threshold applies.
    pub stop_frame: Option<FrameId>,
    /// True when the stop frame is a generator/coroutine body; needed for
    /// exhaustion reporting while stepping a suspended generator.
    pub stop_frame_suspendable: bool,
    /// Frame whose re-entry (after a callee returns to it) is a stop.
    pub return_frame: Option<FrameId>,
    pub threshold: LineThreshold,
    /// Stop on any line of any (non-internal) frame.
    pub trace_everywhere: bool,
}

impl Default for StopInfo {
    fn default() -> Self {
        StopInfo {
            mode: StepMode::None,
            stop_frame: None,
            stop_frame_suspendable: false,
            return_frame: None,
            threshold: LineThreshold::Never,
            trace_everywhere: false,
        }
    }
}

impl StopInfo {
    pub fn step_into() -> Self {
        StopInfo {
            mode: StepMode::Into,
            stop_frame: None,
            stop_frame_suspendable: false,
            return_frame: None,
            threshold: LineThreshold::AnyLine,
            trace_everywhere: true,
        }
    }

    /// Stop at a line in the current frame at or past the line the step was
    /// issued from, or in the caller once the frame returns.
    pub fn step_over(frame: &FrameRef) -> Self {
        StopInfo {
            mode: StepMode::Over,
            stop_frame: Some(frame.id()),
            stop_frame_suspendable: frame.code().is_suspendable(),
            return_frame: frame.parent().map(|p| p.id()),
            threshold: LineThreshold::AtOrAfter(frame.line()),
            trace_everywhere: false,
        }
    }

    pub fn step_out(frame: &FrameRef) -> Self {
        StopInfo {
            mode: StepMode::Out,
            stop_frame: None,
            stop_frame_suspendable: false,
            return_frame: frame.parent().map(|p| p.id()),
            threshold: LineThreshold::AnyLine,
            trace_everywhere: false,
        }
    }

    pub fn continue_run() -> Self {
        StopInfo {
            mode: StepMode::Continue,
            stop_frame: None,
            stop_frame_suspendable: false,
            return_frame: None,
            threshold: LineThreshold::Never,
            trace_everywhere: false,
        }
    }

    pub fn until(frame: &FrameRef, line: u32) -> Self {
        StopInfo {
            mode: StepMode::Until,
            stop_frame: Some(frame.id()),
            stop_frame_suspendable: frame.code().is_suspendable(),
            return_frame: Some(frame.id()),
            threshold: LineThreshold::AtOrAfter(line),
            trace_everywhere: false,
        }
    }

    /// After a targeted frame returned: clear targeting so the caller is the
    /// next stop candidate.
    pub fn cleared_after_return() -> Self {
        StopInfo {
            mode: StepMode::Into,
            ..StopInfo::step_into()
        }
    }

    /// A stepping operation (not plain continue) is in flight.
    pub fn is_stepping(&self) -> bool {
        self.threshold != LineThreshold::Never
    }

    /// Does a reached line inside the stop frame satisfy the threshold?
    pub fn line_qualifies(&self, line: u32) -> bool {
        match self.threshold {
            LineThreshold::AnyLine => true,
            LineThreshold::Never => false,
            LineThreshold::AtOrAfter(target) => line >= target,
        }
    }
}
