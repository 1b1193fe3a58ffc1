//! Stack collection and rendering for stop reports and `RequestStack`.

use crate::debugger::runtime::FrameRef;
use crate::debugger::variable::format_arguments;
use crate::debugger::Debugger;
use serde::{Deserialize, Serialize};

/// One rendered stack frame as reported to the controller. Frame number 0 is
/// the innermost visible frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackEntry {
    pub file: String,
    pub line: u32,
    pub function: String,
    /// `name=value, ...` rendering of the frame's arguments.
    pub arguments: String,
}

impl StackEntry {
    fn from_frame(frame: &FrameRef) -> Self {
        let code = frame.code();
        StackEntry {
            file: code.filename.clone(),
            line: frame.line(),
            function: code.function.clone(),
            arguments: format_arguments(frame),
        }
    }
}

impl Debugger {
    /// Collect the frame chain from `innermost` outwards, dropping
    /// `skip` innermost frames and cutting the chain at the first
    /// debugger-internal frame. At least one frame always survives so a stop
    /// is never reported with an empty stack.
    pub(crate) fn collect_frames(&self, innermost: &FrameRef, skip: usize) -> Vec<FrameRef> {
        let mut chain = vec![];
        let mut next = Some(innermost.clone());
        while let Some(frame) = next {
            next = frame.parent();
            chain.push(frame);
        }

        let skip = skip.min(chain.len().saturating_sub(1));
        let mut visible: Vec<FrameRef> = chain
            .into_iter()
            .skip(skip)
            .take_while(|f| !self.coordinator.file_is_internal(&f.code().filename))
            .collect();
        if visible.is_empty() {
            visible.push(innermost.clone());
        }
        visible
    }

    /// Render a collected chain innermost first. When `reinstall` is set the
    /// trace callback is re-installed on every rendered frame so the whole
    /// visible chain stays instrumented after the stop.
    pub(crate) fn render_stack(&self, frames: &[FrameRef], reinstall: bool) -> Vec<StackEntry> {
        frames
            .iter()
            .map(|frame| {
                if reinstall {
                    frame.reinstall_trace();
                }
                StackEntry::from_frame(frame)
            })
            .collect()
    }
}
