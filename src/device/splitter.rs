// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Cuts the recorded stream into submissions.

Every submission costs a fixed amount of CPU and device overhead, so bigger is cheaper,
but a stream that grows without bound risks filling before a safe cut point comes along.
The front end calls [super::DeviceContext::maybe_split] at points where closing is
cheap (e.g. right before a render-target change; never mid-draw), and
[super::DeviceContext::force_split] when it needs the work actually on the device
(end of frame, or before a CPU wait).

Each submission ends with an end-of-pipe write of its index to a label, so the CPU can
tell which submissions have retired.
*/

use crate::device::stream::{CacheAction, CommandStream, EventKind, Submission};
use crate::fence::FenceGate;
use crate::fence::Label;

/// Whether a stream of `current_encoded_size` bytes should be cut.
pub fn should_split(current_encoded_size: usize, threshold_bytes: usize) -> bool {
    current_encoded_size >= threshold_bytes
}

#[derive(Debug)]
pub struct SubmissionSplitter {
    label: Label,
    submitted: u64,
}

impl SubmissionSplitter {
    pub fn new(label: Label) -> Self {
        SubmissionSplitter { label, submitted: 0 }
    }

    /// The label each submission's index is written to.
    pub fn label(&self) -> &Label {
        &self.label
    }

    /// Index of the most recent submission.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Closes the stream into a submission.  Empty streams are left alone.
    pub fn cut(&mut self, stream: &mut CommandStream) -> Option<Submission> {
        if stream.is_empty() {
            return None;
        }
        self.submitted += 1;
        FenceGate::new(&self.label, self.submitted).encode_signal(stream, EventKind::BottomOfPipe, CacheAction::None);
        let (commands, encoded_bytes) = stream.take();
        Some(Submission {
            index: self.submitted,
            commands,
            encoded_bytes,
        })
    }
}
