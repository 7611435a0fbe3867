// ABOUTME: Synchronized audio scheduling for timed playback
// ABOUTME: Frame queue, drift correction tiers, and sink dispatch

/// Scheduler implementation
pub mod audio_scheduler;
/// Correction tier thresholds and selection
pub mod correction;

pub use audio_scheduler::{AudioScheduler, HEADROOM_SECONDS};
pub use correction::{CorrectionMethod, CorrectionMode, CorrectionThresholds};
