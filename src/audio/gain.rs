// ABOUTME: Lock-free volume/mute control shared with the audio callback
// ABOUTME: Hardware volume delegation trait for external mixers

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Lock-free gain stage. The render callback reads it every buffer; the
/// protocol engine writes it on volume/mute commands.
#[derive(Debug)]
pub struct GainControl {
    gain_bits: AtomicU32,
    muted: AtomicBool,
}

impl GainControl {
    /// Create a gain control at unity, unmuted.
    pub fn new() -> Self {
        Self {
            gain_bits: AtomicU32::new(1.0f32.to_bits()),
            muted: AtomicBool::new(false),
        }
    }

    /// Set the linear gain (0.0..=1.0).
    pub fn set_gain(&self, gain: f32) {
        self.gain_bits
            .store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Set the mute flag.
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// Effective gain to apply to samples: 0.0 when muted.
    pub fn effective_gain(&self) -> f32 {
        if self.muted.load(Ordering::Relaxed) {
            0.0
        } else {
            f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
        }
    }
}

impl Default for GainControl {
    fn default() -> Self {
        Self::new()
    }
}

/// External volume delegation. When a session is configured for hardware
/// volume the software gain stays at unity and volume/mute commands are
/// routed here instead; the current values are read back when assembling
/// `client/state`.
pub trait VolumeControl {
    /// Apply a volume level, 0..=100.
    fn set_volume(&mut self, volume: u8);
    /// Apply a mute flag.
    fn set_muted(&mut self, muted: bool);
    /// Current volume level, 0..=100.
    fn volume(&self) -> u8;
    /// Current mute flag.
    fn muted(&self) -> bool;
}
