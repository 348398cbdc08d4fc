//! # Waveform Generation
//!
//! The eight OPL waveforms, computed in the log domain. A phase is looked up
//! in the quarter log-sine table, the operator attenuation is added, and the
//! sum is turned back into a linear amplitude through the exponent table.
//! Negative half periods are produced by inverting the result.

use crate::tables::wave_tables;

/// Attenuation that shifts the exponent result fully out, i.e. silence
const MUTE: u32 = 0x1000;

/// Operator waveform, selected by register 0xE0.
///
/// OPL2 chips only know the first four shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    #[default]
    Sine,
    HalfSine,
    AbsSine,
    /// Rising quarter sine repeated twice per period
    PulseSine,
    /// Double speed sine, silent second half
    SineEven,
    /// Double speed absolute sine, silent second half
    AbsSineEven,
    Square,
    /// Exponential ramp shaped square
    DerivedSquare,
}

impl Waveform {
    pub const ALL: [Waveform; 8] = [
        Waveform::Sine,
        Waveform::HalfSine,
        Waveform::AbsSine,
        Waveform::PulseSine,
        Waveform::SineEven,
        Waveform::AbsSineEven,
        Waveform::Square,
        Waveform::DerivedSquare,
    ];

    /// Decode register 0xE0 after masking to the waveforms the chip allows
    pub fn from_register(value: u8, mask: u8) -> Self {
        Self::ALL[(value & mask & 0x7) as usize]
    }

    /// Produce one signed sample.
    ///
    /// # Arguments
    ///
    /// * `phase` - Waveform position, only the low 10 bits are used
    /// * `attenuation` - Envelope units (0.1875 dB steps), 511 is silent
    pub fn sample(self, phase: u32, attenuation: i32) -> i32 {
        let tables = wave_tables();
        let phase = phase & 0x3ff;
        let env = (attenuation.clamp(0, 0x1ff) as u32) << 3;

        // quarter wave index, mirrored on the falling quarter
        let quarter = |p: u32| -> u32 {
            if p & 0x100 != 0 {
                tables.log_sin[((p & 0xff) ^ 0xff) as usize] as u32
            } else {
                tables.log_sin[(p & 0xff) as usize] as u32
            }
        };
        // the same quarter wave at double speed
        let doubled = |p: u32| -> u32 {
            if p & 0x80 != 0 {
                tables.log_sin[(((p ^ 0xff) << 1) & 0xff) as usize] as u32
            } else {
                tables.log_sin[((p << 1) & 0xff) as usize] as u32
            }
        };

        let (log, negative) = match self {
            Waveform::Sine => (quarter(phase), phase & 0x200 != 0),
            Waveform::HalfSine => {
                if phase & 0x200 != 0 {
                    (MUTE, false)
                } else {
                    (quarter(phase), false)
                }
            }
            Waveform::AbsSine => (quarter(phase), false),
            Waveform::PulseSine => {
                if phase & 0x100 != 0 {
                    (MUTE, false)
                } else {
                    (tables.log_sin[(phase & 0xff) as usize] as u32, false)
                }
            }
            Waveform::SineEven => {
                let negative = phase & 0x300 == 0x100;
                if phase & 0x200 != 0 {
                    (MUTE, negative)
                } else {
                    (doubled(phase), negative)
                }
            }
            Waveform::AbsSineEven => {
                if phase & 0x200 != 0 {
                    (MUTE, false)
                } else {
                    (doubled(phase), false)
                }
            }
            Waveform::Square => (0, phase & 0x200 != 0),
            Waveform::DerivedSquare => {
                if phase & 0x200 != 0 {
                    (((phase & 0x1ff) ^ 0x1ff) << 3, true)
                } else {
                    (phase << 3, false)
                }
            }
        };

        let out = exp_level(log + env);
        if negative { !out } else { out }
    }
}

/// Convert a log-domain level to a linear amplitude
#[inline]
fn exp_level(level: u32) -> i32 {
    let level = level.min(0x1fff);
    let exp = wave_tables().exp[(level & 0xff) as usize] as i32;
    (exp << 1) >> (level >> 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_peaks_and_symmetry() {
        let peak = Waveform::Sine.sample(0x100, 0);
        assert!(peak > 4000 && peak <= 4084);
        // the second half mirrors the first with the inverted sign
        assert_eq!(Waveform::Sine.sample(0x300, 0), !peak);
        assert!(Waveform::Sine.sample(0x40, 0) > 0);
        assert!(Waveform::Sine.sample(0x240, 0) < 0);
    }

    #[test]
    fn attenuation_halves_per_six_db() {
        let full = Waveform::Sine.sample(0x100, 0);
        // 32 envelope steps of 0.1875 dB are 6 dB
        let half = Waveform::Sine.sample(0x100, 32);
        assert!((full / 2 - half).abs() <= 2);
        assert_eq!(Waveform::Sine.sample(0x100, 511), 0);
    }

    #[test]
    fn half_and_abs_sine() {
        assert_eq!(Waveform::HalfSine.sample(0x300, 0), 0);
        assert!(Waveform::HalfSine.sample(0x100, 0) > 0);
        assert_eq!(
            Waveform::AbsSine.sample(0x300, 0),
            Waveform::AbsSine.sample(0x100, 0)
        );
    }

    #[test]
    fn pulse_sine_only_rises() {
        assert!(Waveform::PulseSine.sample(0x80, 0) > 0);
        assert_eq!(Waveform::PulseSine.sample(0x180, 0), 0);
        assert!(Waveform::PulseSine.sample(0x280, 0) > 0);
    }

    #[test]
    fn opl3_waveforms() {
        // double speed sine completes a period in the first half
        assert!(Waveform::SineEven.sample(0x80, 0) > 4000);
        assert!(Waveform::SineEven.sample(0x180, 0) < -4000);
        assert!(Waveform::AbsSineEven.sample(0x180, 0) > 4000);
        assert!(Waveform::AbsSineEven.sample(0x280, 0).abs() <= 1);

        let square = Waveform::Square.sample(0x010, 0);
        assert_eq!(square, 4084);
        assert_eq!(Waveform::Square.sample(0x210, 0), !square);

        // derived square decays away from the start of each half
        let start = Waveform::DerivedSquare.sample(0x000, 0);
        let later = Waveform::DerivedSquare.sample(0x080, 0);
        assert!(start > later && later > 0);
        assert!(Waveform::DerivedSquare.sample(0x3ff, 0) < 0);
    }

    #[test]
    fn register_mask() {
        assert_eq!(Waveform::from_register(0x07, 0x7), Waveform::DerivedSquare);
        assert_eq!(Waveform::from_register(0x07, 0x3), Waveform::PulseSine);
        assert_eq!(Waveform::from_register(0x07, 0x0), Waveform::Sine);
    }
}
