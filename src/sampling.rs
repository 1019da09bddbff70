//! Frame sampling: duplicate suppression and down-sampling.
//!
//! The game can emit the same overall frame more than once (retransmits, a
//! paused simulation) and runs far faster than dashboards need. The filter
//! drops repeats of the last accepted frame and keeps one frame in every `N`.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;


use crate::RelayError;

/// Sampling interval `N`: accept frames whose id is a multiple of `N`.
///
/// Never zero. `N = 1` disables down-sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInterval(NonZeroU32);

impl SampleInterval {
    /// Keep every frame.
    pub const EVERY_FRAME: Self = Self(NonZeroU32::MIN);

    /// Every other frame.
    pub const DEFAULT: Self = match NonZeroU32::new(2) {
        Some(n) => Self(n),
        None => unreachable!(),
    };

    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl Default for SampleInterval {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for SampleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SampleInterval {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u32 = s
            .trim()
            .parse()
            .map_err(|e| RelayError::config("sample_every_n_frames", format!("{s:?}: {e}")))?;
        Self::new(n).ok_or_else(|| RelayError::config("sample_every_n_frames", "must be at least 1"))
    }
}

/// Outcome of evaluating one frame id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleDecision {
    Accept,
    /// Same overall frame id as the last accepted packet
    Duplicate,
    /// Frame id is not a multiple of the interval
    OffCadence,
}

impl SampleDecision {
    pub fn is_accept(self) -> bool {
        matches!(self, SampleDecision::Accept)
    }
}

/// Stateful frame sampler owned by the ingestion driver.
#[derive(Debug, Clone)]
pub struct SamplingFilter {
    interval: SampleInterval,
    /// `None` until the first frame is accepted
    last_accepted: Option<u32>,
}

impl SamplingFilter {
    pub fn new(interval: SampleInterval) -> Self {
        Self { interval, last_accepted: None }
    }

    pub fn interval(&self) -> SampleInterval {
        self.interval
    }

    /// Last accepted overall frame id, if any frame was accepted yet.
    pub fn last_accepted(&self) -> Option<u32> {
        self.last_accepted
    }

    /// Decide on a frame and record it when accepted.
    ///
    /// Duplicate check first, then cadence. The very first frame skips the
    /// duplicate check but still has to land on the cadence.
    pub fn evaluate(&mut self, overall_frame_id: u32) -> SampleDecision {
        if self.last_accepted == Some(overall_frame_id) {
            return SampleDecision::Duplicate;
        }
        if overall_frame_id % self.interval.get() != 0 {
            return SampleDecision::OffCadence;
        }
        self.last_accepted = Some(overall_frame_id);
        SampleDecision::Accept
    }

    /// Boolean form of [`evaluate`](Self::evaluate).
    pub fn should_accept(&mut self, overall_frame_id: u32) -> bool {
        self.evaluate(overall_frame_id).is_accept()
    }

    /// Forget the last accepted frame; the next frame is treated as the first.
    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

impl Default for SamplingFilter {
    fn default() -> Self {
        Self::new(SampleInterval::default())
    }
}
