use crate::protocol::{MAX_OVERFLOW_MODULUS, MAX_VALUE};

/// Corrected copy of one timestamp channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjusted {
    pub values: Vec<i64>,
    /// Counter wraps detected in this channel.
    pub overflows: u32,
}

/// Shifts raw device timestamps onto a common origin and undoes 32-bit
/// counter wraparound.
///
/// Every channel of a session is adjusted against the same origin: the first
/// DAQ sync timestamp. A wrap is assumed whenever a value is smaller than the
/// one before it, so at most one wrap can be recovered between consecutive
/// samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciler {
    initial_time: u32,
    modulus: u64,
}

impl Reconciler {
    pub fn new(initial_time: u32) -> Self {
        Self {
            initial_time,
            modulus: MAX_VALUE,
        }
    }

    /// Origin taken from the first DAQ sync pulse. `None` when the session
    /// recorded no sync pulse, in which case nothing can be aligned.
    pub fn from_daq_sync(daq_sync: &[u32]) -> Option<Self> {
        daq_sync.first().copied().map(Self::new)
    }

    /// Use `modulus` per detected wrap, clamped to `1..=2^32`.
    pub fn with_modulus(mut self, modulus: u64) -> Self {
        let clamped = modulus.clamp(1, MAX_OVERFLOW_MODULUS);
        if clamped != modulus {
            log::warn!("Overflow modulus {} out of range, using {}", modulus, clamped);
        }
        self.modulus = clamped;
        self
    }

    pub fn initial_time(&self) -> u32 {
        self.initial_time
    }

    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    /// Adjust one channel. Length and order are preserved.
    pub fn adjust(&self, channel: &[u32]) -> Adjusted {
        let origin = i64::from(self.initial_time);
        let modulus = i64::try_from(self.modulus).unwrap_or(i64::MAX);
        let mut previous = 0u32;
        let mut overflows = 0u32;

        let values = channel
            .iter()
            .map(|&v| {
                if previous > v {
                    overflows += 1;
                }
                previous = v;
                let shift = i64::from(overflows).saturating_mul(modulus);
                (i64::from(v) - origin).saturating_add(shift)
            })
            .collect();

        Adjusted { values, overflows }
    }
}
