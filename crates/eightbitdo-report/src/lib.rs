//! 8BitDo gamepad input report parsing primitives.
//!
//! This crate is intentionally small and I/O-free so driver crates can
//! consume capture-validated parsing logic without pulling runtime concerns.

#![deny(static_mut_refs)]

/// Report IDs and byte offsets for modern-format input reports.
///
/// Current firmware ships this layout over both USB and Bluetooth. Reports
/// are 12 bytes on older firmware; firmware that adds battery and motion
/// data extends the same layout to 34 bytes.
pub mod modern {
    pub const REPORT_ID_USB: u8 = 0x03;
    pub const REPORT_ID_BT: u8 = 0x01;
    pub const HAT: usize = 1;
    pub const LEFT_X: usize = 2;
    pub const LEFT_Y: usize = 3;
    pub const RIGHT_X: usize = 4;
    pub const RIGHT_Y: usize = 5;
    pub const TRIGGER_RIGHT: usize = 6;
    pub const TRIGGER_LEFT: usize = 7;
    pub const BUTTONS_LOW: usize = 8;
    pub const BUTTONS_HIGH: usize = 9;
    pub const BUTTONS_EXT: usize = 10;
    pub const POWER: usize = 14;
    pub const SENSORS: usize = 15;
    pub const SENSOR_WORDS: usize = 6;

    /// Minimum bytes for a decodable report (through the extended button byte).
    pub const MIN_REPORT_LEN: usize = BUTTONS_EXT + 1;
    /// Minimum bytes for a report carrying the battery status byte.
    pub const POWER_REPORT_LEN: usize = POWER + 1;
    /// Minimum bytes for a report carrying the six motion sample words.
    pub const SENSOR_REPORT_LEN: usize = SENSORS + SENSOR_WORDS * 2;

    /// Button bit masks within the byte at [`BUTTONS_LOW`].
    pub mod buttons_low {
        pub const SOUTH: u8 = 0x01;
        pub const EAST: u8 = 0x02;
        pub const PR: u8 = 0x04;
        pub const WEST: u8 = 0x08;
        pub const NORTH: u8 = 0x10;
        pub const PL: u8 = 0x20;
        pub const LEFT_SHOULDER: u8 = 0x40;
        pub const RIGHT_SHOULDER: u8 = 0x80;
    }

    /// Button bit masks within the byte at [`BUTTONS_HIGH`].
    pub mod buttons_high {
        pub const BACK: u8 = 0x04;
        pub const START: u8 = 0x08;
        pub const GUIDE: u8 = 0x10;
        pub const LEFT_STICK: u8 = 0x20;
        pub const RIGHT_STICK: u8 = 0x40;
    }

    /// Button bit masks within the byte at [`BUTTONS_EXT`].
    pub mod buttons_ext {
        pub const L4: u8 = 0x01;
        pub const R4: u8 = 0x02;
    }
}

/// Byte offsets for legacy-format input reports.
///
/// Early firmware ships a fixed 9-byte report with no report ID; the packet
/// length is the only discriminator between the two families.
pub mod legacy {
    pub const BUTTONS_LOW: usize = 0;
    pub const BUTTONS_HIGH: usize = 1;
    pub const HAT: usize = 2;
    pub const LEFT_X: usize = 3;
    pub const LEFT_Y: usize = 4;
    pub const RIGHT_X: usize = 5;
    pub const RIGHT_Y: usize = 6;
    pub const TRIGGER_LEFT: usize = 7;
    pub const TRIGGER_RIGHT: usize = 8;

    /// Exact report length; legacy reports are fixed-size.
    pub const REPORT_LEN: usize = TRIGGER_RIGHT + 1;

    /// Button bit masks within the byte at [`BUTTONS_LOW`].
    pub mod buttons_low {
        pub const SOUTH: u8 = 0x01;
        pub const EAST: u8 = 0x02;
        pub const WEST: u8 = 0x08;
        pub const NORTH: u8 = 0x10;
        pub const LEFT_SHOULDER: u8 = 0x40;
        pub const RIGHT_SHOULDER: u8 = 0x80;
    }

    /// Button bit masks within the byte at [`BUTTONS_HIGH`].
    pub mod buttons_high {
        pub const BACK: u8 = 0x04;
        pub const START: u8 = 0x08;
        pub const GUIDE: u8 = 0x10;
        pub const LEFT_STICK: u8 = 0x20;
        pub const RIGHT_STICK: u8 = 0x40;
    }
}

/// Raw byte value of a stick axis at physical center, in both families.
pub const STICK_NEUTRAL: u8 = 0x7F;

/// Lightweight parsed view over a modern-format input report.
#[derive(Debug, Clone, Copy)]
pub struct RawModernReport<'a> {
    report: &'a [u8],
}

impl<'a> RawModernReport<'a> {
    /// Construct a borrowed report view without validation.
    ///
    /// Prefer [`parse_modern_report`] when report ID/length validation is required.
    pub fn new(report: &'a [u8]) -> Self {
        Self { report }
    }

    pub fn report_id(&self) -> u8 {
        self.report.first().copied().unwrap_or(0)
    }

    pub fn report_bytes(&self) -> &'a [u8] {
        self.report
    }

    pub fn byte(&self, offset: usize) -> Option<u8> {
        self.report.get(offset).copied()
    }

    pub fn byte_or_zero(&self, offset: usize) -> u8 {
        self.byte(offset).unwrap_or(0)
    }

    /// Little-endian `i16` motion word at `index` within the sensor block.
    ///
    /// Words 0..=2 are accelerometer samples, words 3..=5 gyroscope samples,
    /// both in the hardware's own axis convention.
    pub fn sensor_word(&self, index: usize) -> Option<i16> {
        if index >= modern::SENSOR_WORDS {
            return None;
        }
        let start = modern::SENSORS + index * 2;
        if self.report.len() < start.saturating_add(2) {
            return None;
        }
        Some(i16::from_le_bytes([self.report[start], self.report[start + 1]]))
    }
}

/// Raw stick axis bytes from either report family; 0x7F is physical center.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StickBytesRaw {
    pub left_x: u8,
    pub left_y: u8,
    pub right_x: u8,
    pub right_y: u8,
}

/// Raw motion sample words split into accelerometer and gyroscope triples.
///
/// Values are in the hardware's own axis convention; consumers apply scale
/// and remap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorWordsRaw {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
}

/// Raw modern-format input sample extracted from a single report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModernInputRaw {
    pub buttons_low: u8,
    pub buttons_high: u8,
    pub buttons_ext: u8,
    pub hat: u8,
    pub sticks: StickBytesRaw,
    pub trigger_left: u8,
    pub trigger_right: u8,
    /// Battery status byte; absent on the short 12-byte firmware reports.
    pub power: Option<u8>,
    /// Motion words; absent unless the firmware ships the long report.
    pub sensors: Option<SensorWordsRaw>,
}

/// Raw legacy-format input sample extracted from a single 9-byte report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyInputRaw {
    pub buttons_low: u8,
    pub buttons_high: u8,
    pub hat: u8,
    pub sticks: StickBytesRaw,
    pub trigger_left: u8,
    pub trigger_right: u8,
}

/// Parse a modern-format report into a lightweight borrowed view.
///
/// Returns `None` unless:
/// - report ID is `modern::REPORT_ID_USB` or `modern::REPORT_ID_BT`
/// - report length is at least `modern::MIN_REPORT_LEN`
pub fn parse_modern_report(report: &[u8]) -> Option<RawModernReport<'_>> {
    let id = report.first().copied()?;
    if id != modern::REPORT_ID_USB && id != modern::REPORT_ID_BT {
        return None;
    }
    if report.len() < modern::MIN_REPORT_LEN {
        return None;
    }
    Some(RawModernReport::new(report))
}

fn parse_sensor_words_from_report(report: &RawModernReport<'_>) -> Option<SensorWordsRaw> {
    let mut words = [0i16; modern::SENSOR_WORDS];
    for (index, word) in words.iter_mut().enumerate() {
        *word = report.sensor_word(index)?;
    }
    Some(SensorWordsRaw {
        accel: [words[0], words[1], words[2]],
        gyro: [words[3], words[4], words[5]],
    })
}

/// Parse a full modern-format input report.
///
/// Battery and motion fields come back `None` when the report is too short
/// to carry them; short reports are otherwise valid (older firmware).
pub fn parse_modern_input(report: &[u8]) -> Option<ModernInputRaw> {
    let report = parse_modern_report(report)?;
    Some(ModernInputRaw {
        buttons_low: report.byte_or_zero(modern::BUTTONS_LOW),
        buttons_high: report.byte_or_zero(modern::BUTTONS_HIGH),
        buttons_ext: report.byte_or_zero(modern::BUTTONS_EXT),
        hat: report.byte_or_zero(modern::HAT),
        sticks: StickBytesRaw {
            left_x: report.byte_or_zero(modern::LEFT_X),
            left_y: report.byte_or_zero(modern::LEFT_Y),
            right_x: report.byte_or_zero(modern::RIGHT_X),
            right_y: report.byte_or_zero(modern::RIGHT_Y),
        },
        trigger_left: report.byte_or_zero(modern::TRIGGER_LEFT),
        trigger_right: report.byte_or_zero(modern::TRIGGER_RIGHT),
        power: report.byte(modern::POWER),
        sensors: parse_sensor_words_from_report(&report),
    })
}

/// Parse a legacy-format input report.
///
/// Legacy reports carry no report ID; the fixed 9-byte length is the only
/// discriminator, so the length must match exactly.
pub fn parse_legacy_input(report: &[u8]) -> Option<LegacyInputRaw> {
    if report.len() != legacy::REPORT_LEN {
        return None;
    }
    Some(LegacyInputRaw {
        buttons_low: report[legacy::BUTTONS_LOW],
        buttons_high: report[legacy::BUTTONS_HIGH],
        hat: report[legacy::HAT],
        sticks: StickBytesRaw {
            left_x: report[legacy::LEFT_X],
            left_y: report[legacy::LEFT_Y],
            right_x: report[legacy::RIGHT_X],
            right_y: report[legacy::RIGHT_Y],
        },
        trigger_left: report[legacy::TRIGGER_LEFT],
        trigger_right: report[legacy::TRIGGER_RIGHT],
    })
}

/// Split the battery status byte into (externally-powered, level) parts.
///
/// Bit 7 set means the controller is drawing external power; the low seven
/// bits are a 0-100 charge level. Firmware reports a full battery as level
/// 100 regardless of the charge bit.
pub fn split_power_byte(power: u8) -> (bool, u8) {
    ((power & 0x80) != 0, power & 0x7F)
}
