//! Simulated onboard sensor clocks.
//!
//! Sensor events carry a device-side timestamp. Most controllers do not ship
//! a usable wall clock, so the decoders synthesize one: either a fixed step
//! per sensor packet, or an accumulation of the device's own delta counter.

/// Nanosecond clock advanced by the decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct SensorClock {
    timestamp_ns: u64,
}

impl SensorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by a fixed per-packet step and return the new timestamp.
    pub fn tick(&mut self, step_ns: u64) -> u64 {
        self.timestamp_ns = self.timestamp_ns.saturating_add(step_ns);
        self.timestamp_ns
    }

    /// Advance by a device-reported microsecond delta.
    pub fn add_micros(&mut self, delta_us: u64) -> u64 {
        self.timestamp_ns = self
            .timestamp_ns
            .saturating_add(delta_us.saturating_mul(1_000));
        self.timestamp_ns
    }

    pub fn now_ns(&self) -> u64 {
        self.timestamp_ns
    }
}

/// Clock fed by an absolute 32-bit microsecond counter that wraps.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceClockUs {
    last: Option<u32>,
    inner: SensorClock,
}

impl DeviceClockUs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in the device's current counter value and return the accumulated
    /// nanosecond timestamp. The first sample establishes the epoch and
    /// contributes no delta; wraparound is handled explicitly.
    pub fn advance(&mut self, now_us: u32) -> u64 {
        let delta = match self.last {
            None => 0,
            Some(last) if now_us >= last => now_us - last,
            Some(last) => (u32::MAX - last).saturating_add(now_us).saturating_add(1),
        };
        self.last = Some(now_us);
        self.inner.add_micros(u64::from(delta))
    }

    pub fn now_ns(&self) -> u64 {
        self.inner.now_ns()
    }
}

/// Step for sensor streams that tick at 125 Hz.
pub const STEP_125HZ_NS: u64 = 1_000_000_000 / 125;

/// Step for sensor streams that tick at 75 Hz.
pub const STEP_75HZ_NS: u64 = 1_000_000_000 / 75;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_step_accumulates() {
        let mut clock = SensorClock::new();
        assert_eq!(clock.tick(STEP_125HZ_NS), 8_000_000);
        assert_eq!(clock.tick(STEP_125HZ_NS), 16_000_000);
        assert_eq!(clock.now_ns(), 16_000_000);
    }

    #[test]
    fn test_micros_accumulate() {
        let mut clock = SensorClock::new();
        assert_eq!(clock.add_micros(4032), 4_032_000);
        assert_eq!(clock.add_micros(4032), 8_064_000);
    }

    #[test]
    fn test_device_clock_first_sample_is_epoch() {
        let mut clock = DeviceClockUs::new();
        assert_eq!(clock.advance(1_000_000), 0);
        assert_eq!(clock.advance(1_004_032), 4_032_000);
    }

    #[test]
    fn test_device_clock_wraparound() {
        let mut clock = DeviceClockUs::new();
        assert_eq!(clock.advance(u32::MAX - 5), 0);
        // 6 ticks to wrap (5 remaining + the zero crossing), then 4 more.
        assert_eq!(clock.advance(4), 10_000);
    }
}
