//! Audio frame type.

/// A stereo audio frame (16-bit integer).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    pub left: i16,
    pub right: i16,
}

impl Frame {
    /// Create a silent frame.
    pub const fn silence() -> Self {
        Self { left: 0, right: 0 }
    }

    /// Convert a float pair at ±1.0 full scale, clipping out-of-range input.
    pub fn from_f32(left: f32, right: f32) -> Self {
        Self {
            left: to_i16(left),
            right: to_i16(right),
        }
    }

    /// Both sides as floats at ±1.0 full scale.
    pub fn to_f32(self) -> (f32, f32) {
        (self.left as f32 / 32768.0, self.right as f32 / 32768.0)
    }
}

fn to_i16(value: f32) -> i16 {
    if value.is_nan() {
        return 0;
    }
    (value * 32768.0).clamp(-32768.0, 32767.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_conversion_clips() {
        assert_eq!(Frame::from_f32(2.0, -2.0), Frame { left: 32767, right: -32768 });
        assert_eq!(Frame::from_f32(0.5, f32::NAN), Frame { left: 16384, right: 0 });
        assert_eq!(Frame::silence().to_f32(), (0.0, 0.0));
    }
}
