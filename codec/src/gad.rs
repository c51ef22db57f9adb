//! GAD velocity binary codec.
//!
//! Encodes a navigation vector into the fixed-layout velocity structure used
//! by the downstream device-management protocol: six fields packed MSB-first
//! into 6 bytes, rendered as a 12-character upper-case hex string.
//!
//! Field layout (45 used bits, left-aligned, 3 trailing zero bits):
//!
//! | field                  | bits | range  |
//! |------------------------|------|--------|
//! | horizontal speed, km/h | 11   | 0..2047|
//! | bearing, degrees       | 9    | 0..359 |
//! | vertical speed, km/h   | 8    | 0..255 |
//! | vertical direction up  | 1    |        |
//! | horizontal uncertainty | 8    | 0..255 |
//! | vertical uncertainty   | 8    | 0..255 |
//!
//! Encoding never fails: out-of-range inputs are clamped into their declared
//! field ranges.

/// Packed navigation velocity. Transient, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GadVelocity {
    /// Horizontal speed in km/h, 11-bit field
    pub horizontal_speed: u16,
    /// Bearing in degrees, 9-bit field
    pub bearing: u16,
    /// Vertical speed in km/h, 8-bit field
    pub vertical_speed: u8,
    /// True = up
    pub vertical_direction_up: bool,
    /// 0 means "unknown"
    pub horizontal_uncertainty: u8,
    /// 0 means "unknown"
    pub vertical_uncertainty: u8,
}

impl GadVelocity {
    /// Build a velocity from raw navigation inputs.
    ///
    /// `speed` is ground speed in m/s (negative values clamp to 0), `course`
    /// is the course over ground in radians (absent defaults to bearing 0),
    /// `vertical_speed` is in m/s with the direction fixed to "up" for this
    /// domain. Uncertainties are left at "unknown".
    pub fn from_navigation(speed: f64, course: Option<f64>, vertical_speed: f64) -> Self {
        let horizontal_speed = clamp_u16((speed * 3.6).round(), 2047);

        let bearing = match course {
            Some(rad) => {
                let degrees = normalize_degrees(rad.to_degrees());
                clamp_u16(degrees.round(), 359)
            }
            None => 0,
        };

        let vertical = clamp_u16((vertical_speed.abs() * 3.6).round(), 255) as u8;

        Self {
            horizontal_speed,
            bearing,
            vertical_speed: vertical,
            vertical_direction_up: true,
            horizontal_uncertainty: 0,
            vertical_uncertainty: 0,
        }
    }

    /// Pack the six fields MSB-first into the 6-byte wire buffer.
    pub fn encode(&self) -> [u8; 6] {
        // Fields are masked to their declared widths; construction already
        // clamps, the mask keeps hand-built values in range too.
        let mut bits: u64 = 0;
        bits |= (self.horizontal_speed as u64 & 0x7FF) << 37;
        bits |= (self.bearing as u64 & 0x1FF) << 28;
        bits |= (self.vertical_speed as u64) << 20;
        bits |= (self.vertical_direction_up as u64) << 19;
        bits |= (self.horizontal_uncertainty as u64) << 11;
        bits |= (self.vertical_uncertainty as u64) << 3;

        [
            (bits >> 40) as u8,
            (bits >> 32) as u8,
            (bits >> 24) as u8,
            (bits >> 16) as u8,
            (bits >> 8) as u8,
            bits as u8,
        ]
    }

    /// The packed buffer as a 12-character upper-case hex string.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.encode())
    }
}

fn clamp_u16(value: f64, max: u16) -> u16 {
    if value <= 0.0 {
        0
    } else if value >= max as f64 {
        max
    } else {
        value as u16
    }
}

// Wraps any angle into [0, 360).
fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees % 360.0;
    if wrapped < 0.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_vector() {
        // 10 m/s at course pi/2 rad
        let v = GadVelocity::from_navigation(10.0, Some(std::f64::consts::FRAC_PI_2), 0.0);
        assert_eq!(v.horizontal_speed, 36);
        assert_eq!(v.bearing, 90);
        assert_eq!(v.vertical_speed, 0);
        assert!(v.vertical_direction_up);
        assert_eq!(v.horizontal_uncertainty, 0);
        assert_eq!(v.vertical_uncertainty, 0);
        assert_eq!(v.to_hex(), "0485A0080000");
    }

    #[test]
    fn test_encoding_is_pure() {
        let v = GadVelocity::from_navigation(10.0, Some(std::f64::consts::FRAC_PI_2), 0.0);
        assert_eq!(v.to_hex(), v.to_hex());
        assert_eq!(
            v,
            GadVelocity::from_navigation(10.0, Some(std::f64::consts::FRAC_PI_2), 0.0)
        );
    }

    #[test]
    fn test_horizontal_speed_conversion_and_clamp() {
        for (mps, expected) in [(0.0, 0), (27.78, 100), (500.0, 1800), (1000.0, 2047)] {
            let v = GadVelocity::from_navigation(mps, None, 0.0);
            assert_eq!(v.horizontal_speed, expected, "speed {} m/s", mps);
        }
        // Negative speed clamps to 0 rather than being rejected
        assert_eq!(GadVelocity::from_navigation(-3.0, None, 0.0).horizontal_speed, 0);
    }

    #[test]
    fn test_absent_course_defaults_to_zero_bearing() {
        let v = GadVelocity::from_navigation(5.0, None, 0.0);
        assert_eq!(v.bearing, 0);
    }

    #[test]
    fn test_bearing_normalization() {
        use std::f64::consts::{FRAC_PI_2, PI};

        // -pi/2 wraps to 270 degrees
        let v = GadVelocity::from_navigation(1.0, Some(-FRAC_PI_2), 0.0);
        assert_eq!(v.bearing, 270);

        // One full turn plus pi is just pi
        let v = GadVelocity::from_navigation(1.0, Some(3.0 * PI), 0.0);
        assert_eq!(v.bearing, 180);
    }

    #[test]
    fn test_bearing_rounding_stays_in_field() {
        // 359.6 degrees rounds to 360, which must clamp back into the field
        let rad = 359.6_f64.to_radians();
        let v = GadVelocity::from_navigation(1.0, Some(rad), 0.0);
        assert_eq!(v.bearing, 359);
    }

    #[test]
    fn test_vertical_speed_absolute_and_clamped() {
        let v = GadVelocity::from_navigation(0.0, None, -10.0);
        assert_eq!(v.vertical_speed, 36);
        assert!(v.vertical_direction_up);

        let v = GadVelocity::from_navigation(0.0, None, 1000.0);
        assert_eq!(v.vertical_speed, 255);
    }

    #[test]
    fn test_packing_field_boundaries() {
        // All-max fields exercise every bit of the layout
        let v = GadVelocity {
            horizontal_speed: 2047,
            bearing: 359,
            vertical_speed: 255,
            vertical_direction_up: true,
            horizontal_uncertainty: 255,
            vertical_uncertainty: 255,
        };
        let bytes = v.encode();
        // 11 ones | 101100111 | 8 ones | 1 | 8 ones | 8 ones | 000
        assert_eq!(bytes, [0xFF, 0xF6, 0x7F, 0xFF, 0xFF, 0xF8]);
        // Trailing 3 bits are always zero
        assert_eq!(bytes[5] & 0x07, 0);
    }

    #[test]
    fn test_hex_is_twelve_uppercase_chars() {
        let hex = GadVelocity::from_navigation(12.5, Some(1.0), 0.0).to_hex();
        assert_eq!(hex.len(), 12);
        assert!(hex.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }
}
