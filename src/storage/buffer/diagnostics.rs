//! Human-readable dump of the frame descriptor table.

use std::fmt;

use super::frame::{FrameId, FrameSnapshot};

/// Every frame's descriptor, copied under the state lock.
///
/// `Display` prints one line per frame followed by the number of valid
/// frames.
#[derive(Debug, Clone)]
pub struct PoolDiagnostics {
    frames: Vec<FrameSnapshot>,
    clock_hand: FrameId,
}

impl PoolDiagnostics {
    pub(super) fn new(frames: Vec<FrameSnapshot>, clock_hand: FrameId) -> Self {
        Self { frames, clock_hand }
    }

    pub fn frames(&self) -> &[FrameSnapshot] {
        &self.frames
    }

    /// Frame the clock hand points at; the next sweep starts after it.
    pub fn clock_hand(&self) -> FrameId {
        self.clock_hand
    }

    /// Frames that hold a page.
    pub fn valid_frames(&self) -> usize {
        self.frames.iter().filter(|s| s.occupant.is_some()).count()
    }

    pub fn pinned_frames(&self) -> usize {
        self.frames
            .iter()
            .filter(|s| s.occupant.as_ref().is_some_and(|o| o.pin_count > 0))
            .count()
    }

    pub fn dirty_frames(&self) -> usize {
        self.frames
            .iter()
            .filter(|s| s.occupant.as_ref().is_some_and(|o| o.dirty))
            .count()
    }
}

impl fmt::Display for PoolDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for snapshot in &self.frames {
            match &snapshot.occupant {
                None => writeln!(f, "frame {}: empty", snapshot.frame_id)?,
                Some(o) => writeln!(
                    f,
                    "frame {}: file={} ({}) page={} pin={} ref={} dirty={} io={:?}",
                    snapshot.frame_id,
                    o.file_name,
                    o.file_id,
                    o.page_no,
                    o.pin_count,
                    o.ref_bit as u8,
                    o.dirty as u8,
                    o.io
                )?,
            }
        }
        write!(f, "valid frames: {}", self.valid_frames())
    }
}
