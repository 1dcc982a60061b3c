//! Axis affine transforms shared by the fixed-report decoders.
//!
//! Every byte-to-`i16` mapping the protocols need lives here so the
//! boundary behavior (neutral snap, endpoint exactness, clamping) is decided
//! once. All transforms are monotone non-decreasing and hit the exact
//! endpoints `-32768` and `32767`.

/// Map an unsigned stick byte onto the full signed range.
///
/// `0x7F` is the wire-level neutral and maps to exactly `0`; every other
/// value goes through the affine map `v * 257 - 32768`, so `0x00` is
/// `-32768` and `0xFF` is `32767`.
pub fn stick_from_u8(value: u8) -> i16 {
    if value == 0x7F {
        0
    } else {
        trigger_from_u8(value)
    }
}

/// Map an unsigned trigger byte onto the full signed range.
///
/// `v * 257 - 32768`: released (`0x00`) is `-32768`, fully pulled (`0xFF`)
/// is exactly `32767`.
pub fn trigger_from_u8(value: u8) -> i16 {
    let mapped = i32::from(value) * 257 - 32768;
    mapped as i16
}

/// Map a 10-bit trigger value onto the full signed range.
///
/// Out-of-range input clamps to `0..=1023` first. The affine map
/// `(v - 512) * 64` tops out at `32704`, which snaps to `32767` so a fully
/// pulled trigger reads as saturated.
pub fn trigger_from_10bit(value: u16) -> i16 {
    let clamped = i32::from(value.min(1023));
    let mapped = (clamped - 512) * 64;
    if mapped == 32704 { 32767 } else { mapped as i16 }
}

/// Linear remap of `value` from `[from_min, from_max]` to `[to_min, to_max]`.
pub fn remap(value: f32, from_min: f32, from_max: f32, to_min: f32, to_max: f32) -> f32 {
    to_min + (to_max - to_min) * (value - from_min) / (from_max - from_min)
}

/// Clamp a float to the signed 16-bit range and truncate.
pub fn clamp_to_i16(value: f32) -> i16 {
    value.clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_trigger_endpoints() {
        assert_eq!(trigger_from_u8(0x00), -32768);
        assert_eq!(trigger_from_u8(0xFF), 32767);
    }

    #[test]
    fn test_stick_neutral_snaps_to_zero() {
        assert_eq!(stick_from_u8(0x7F), 0);
        assert_eq!(stick_from_u8(0x00), -32768);
        assert_eq!(stick_from_u8(0xFF), 32767);
    }

    #[test]
    fn test_stick_stays_monotone_around_neutral() {
        assert!(stick_from_u8(0x7E) < 0);
        assert!(stick_from_u8(0x80) > 0);
    }

    #[test]
    fn test_10bit_trigger_endpoints_and_snap() {
        assert_eq!(trigger_from_10bit(0), -32768);
        assert_eq!(trigger_from_10bit(512), 0);
        assert_eq!(trigger_from_10bit(1023), 32767);
        assert_eq!(trigger_from_10bit(1022), 32640);
    }

    #[test]
    fn test_10bit_trigger_clamps_wild_input() {
        assert_eq!(trigger_from_10bit(0xFFFF), 32767);
        assert_eq!(trigger_from_10bit(1024), 32767);
    }

    #[test]
    fn test_remap_basics() {
        let mid = remap(0.5, 0.0, 1.0, -1.0, 1.0);
        assert!((mid - 0.0).abs() < f32::EPSILON);
        let top = remap(255.0, 0.0, 255.0, -32768.0, 32767.0);
        assert!((top - 32767.0).abs() < 0.5);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(256))]

        #[test]
        fn prop_trigger_from_u8_monotone(a in 0u8..=255, b in 0u8..=255) {
            if a <= b {
                prop_assert!(trigger_from_u8(a) <= trigger_from_u8(b));
            }
        }

        #[test]
        fn prop_stick_from_u8_monotone(a in 0u8..=255, b in 0u8..=255) {
            if a <= b {
                prop_assert!(stick_from_u8(a) <= stick_from_u8(b));
            }
        }

        #[test]
        fn prop_trigger_from_10bit_monotone(a in 0u16..=1023, b in 0u16..=1023) {
            if a <= b {
                prop_assert!(trigger_from_10bit(a) <= trigger_from_10bit(b));
            }
        }

        #[test]
        fn prop_clamp_to_i16_in_range(v in -1.0e6f32..1.0e6f32) {
            let clamped = clamp_to_i16(v);
            prop_assert!(i32::from(clamped) >= i32::from(i16::MIN));
            prop_assert!(i32::from(clamped) <= i32::from(i16::MAX));
        }
    }
}
