//! # Lookup Tables
//!
//! Fixed hardware tables shared by every chip, and the per-chip rate tables
//! that resample the chip's timing to the configured output rate.

use std::f64::consts::PI;
use std::sync::OnceLock;

use crate::{ENV_MAX, LFO_SH, OPL_RATE, RATE_MASK, RATE_SH, WAVE_SH};

/// Number of steps in the tremolo triangle
pub const TREMOLO_TABLE: usize = 52;

/// How much to subtract from the octave base for the key scale level
static KSL_CREATE_TABLE: [u8; 16] = [64, 32, 24, 19, 16, 12, 11, 10, 8, 6, 5, 4, 3, 2, 1, 0];

/// Frequency multipliers doubled, so that 0 maps to 0.5
pub static FREQ_CREATE_TABLE: [u8; 16] = [1, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 20, 24, 24, 30, 30];

/// Samples the chip takes to complete an attack at each rate step
static ATTACK_SAMPLES_TABLE: [u8; 13] = [69, 55, 46, 40, 35, 29, 23, 20, 19, 15, 11, 10, 9];

/// Envelope increase per step for decay and release
static ENVELOPE_INCREASE_TABLE: [u8; 13] = [4, 5, 6, 7, 8, 10, 12, 14, 16, 20, 24, 28, 32];

/// Vibrato LFO shape.
///
/// The lower bits are the shift of the operator vibrato value, the top bit is
/// shifted out to give -1 or 0 for negation. With the largest input of 7 this
/// gives 3, 7, 3, 0, -3, -7, -3, 0.
pub static VIBRATO_TABLE: [i8; 8] = [1, 0, 1, 30, -127, -128, -127, -98];

/// Key scale level shift for each KSL setting: off, 3, 1.5 and 6 dB/oct
pub static KSL_SHIFT_TABLE: [u8; 4] = [31, 1, 2, 0];

const fn build_tremolo() -> [u8; TREMOLO_TABLE] {
    let mut table = [0u8; TREMOLO_TABLE];
    let mut i = 0;
    while i < TREMOLO_TABLE / 2 {
        table[i] = i as u8;
        table[TREMOLO_TABLE - 1 - i] = i as u8;
        i += 1;
    }
    table
}

/// Tremolo triangle, rising then falling
pub static TREMOLO_TABLE_DATA: [u8; TREMOLO_TABLE] = build_tremolo();

/// Quarter of a log-sine wave and the matching exponent table.
///
/// Attenuation is added in the log domain and converted back to linear
/// amplitude by a single exponent lookup, as the hardware does.
#[derive(Debug)]
pub struct WaveTables {
    /// `-log2(sin(x))` in 1/256 steps over the first quarter period
    pub log_sin: [u16; 256],
    /// `2^(1 - x/256)` scaled to 11 bits, indexed by the fractional part
    pub exp: [u16; 256],
}

static WAVE_TABLES: OnceLock<WaveTables> = OnceLock::new();
static KSL_TABLE: OnceLock<[u8; 8 * 16]> = OnceLock::new();

/// Returns the shared log-sine/exponent tables, building them on first use
pub fn wave_tables() -> &'static WaveTables {
    WAVE_TABLES.get_or_init(|| {
        let mut log_sin = [0u16; 256];
        let mut exp = [0u16; 256];
        for i in 0..256 {
            let angle = (i as f64 + 0.5) * (PI / 512.0);
            log_sin[i] = (-angle.sin().log2() * 256.0).round() as u16;
            exp[i] = (2.0_f64.powf((255 - i) as f64 / 256.0) * 1024.0).round() as u16;
        }
        WaveTables { log_sin, exp }
    })
}

/// Returns the key scale level base table indexed by `block << 4 | fnum >> 6`
pub fn ksl_table() -> &'static [u8; 8 * 16] {
    KSL_TABLE.get_or_init(|| {
        let mut table = [0u8; 8 * 16];
        for oct in 0..8 {
            let base = (oct * 8) as i32;
            for i in 0..16 {
                let val = (base - KSL_CREATE_TABLE[i] as i32).max(0);
                // *4 to match the attenuation range
                table[oct * 16 + i] = (val * 4) as u8;
            }
        }
        table
    })
}

/// Initialise the shared tables up front instead of on the first sample
pub fn init_tables() {
    wave_tables();
    ksl_table();
}

/// Splits a 0..76 rate index into an increase table index and a shift
fn envelope_select(val: u8) -> (usize, u32) {
    if val < 13 * 4 {
        // rate 0 - 12
        ((val & 3) as usize, 12 - (val >> 2) as u32)
    } else if val < 15 * 4 {
        // rate 13 - 14
        ((val - 12 * 4) as usize, 0)
    } else {
        // rate 15 and up
        (12, 0)
    }
}

/// Rate tables derived from the output sample rate.
///
/// The chip counts time in 49716 Hz ticks; every step here is rescaled by
/// `OPL_RATE / sample_rate` so envelopes, vibrato, tremolo, noise and timers
/// keep their real-time speed at any output rate.
#[derive(Debug, Clone)]
pub struct RateTables {
    /// Chip samples per output sample
    pub scale: f64,
    /// Phase increment for each frequency multiplier
    pub freq_mul: [u32; 16],
    /// Rates for decay and release
    pub linear_rates: [u32; 76],
    /// Best matching attack rates
    pub attack_rates: [u32; 76],
    /// LFO counter increment per output sample
    pub lfo_add: u32,
    /// Noise counter increment per output sample
    pub noise_add: u32,
}

impl RateTables {
    pub fn new(sample_rate: u32) -> Self {
        let scale = OPL_RATE / sample_rate as f64;

        let freq_scale = (0.5 + scale * (1u32 << (WAVE_SH - 1 - 10)) as f64) as u32;
        let mut freq_mul = [0u32; 16];
        for (mul, create) in freq_mul.iter_mut().zip(FREQ_CREATE_TABLE.iter()) {
            *mul = freq_scale * *create as u32;
        }

        let mut linear_rates = [0u32; 76];
        for (i, rate) in linear_rates.iter_mut().enumerate() {
            let (index, shift) = envelope_select(i as u8);
            let shift = RATE_SH - shift - 3;
            *rate = (scale * ((ENVELOPE_INCREASE_TABLE[index] as u32) << shift) as f64) as u32;
        }

        // Attack rate 0 never advances, so its four entries stay empty
        let mut attack_rates = [0u32; 76];
        for (i, rate) in attack_rates.iter_mut().enumerate().take(62).skip(4) {
            *rate = best_attack_add(scale, i as u8);
        }
        for rate in attack_rates.iter_mut().skip(62) {
            *rate = 8 << RATE_SH;
        }

        let lfo_add = (0.5 + scale * (1u32 << LFO_SH) as f64) as u32;

        Self {
            scale,
            freq_mul,
            linear_rates,
            attack_rates,
            lfo_add,
            noise_add: lfo_add,
        }
    }
}

/// Searches the attack increment whose curve takes as many output samples as
/// the chip's attack at this rate.
///
/// The attack curve is exponential and stepped, so rescaling the chip's
/// increment is not exact; a few rounds of correction find the closest match.
fn best_attack_add(scale: f64, rate: u8) -> u32 {
    let (index, shift) = envelope_select(rate);
    // Amount of samples the attack takes on the chip
    let chip_samples =
        ((((ATTACK_SAMPLES_TABLE[index] as u32) << shift) as f64 / scale) as u32).max(1);

    let mut guess_add =
        (scale * ((ENVELOPE_INCREASE_TABLE[index] as u32) << (RATE_SH - shift - 3)) as f64) as u32;
    let mut best_add = guess_add;
    let mut best_diff = 1u32 << 30;

    for _ in 0..16 {
        let mut volume = ENV_MAX;
        let mut samples = 0u32;
        let mut count = 0u32;
        while volume > 0 && samples < chip_samples * 2 {
            count = count.wrapping_add(guess_add);
            let change = (count >> RATE_SH) as i32;
            count &= RATE_MASK;
            if change != 0 {
                volume += (!volume * change) >> 3;
            }
            samples += 1;
        }

        let diff = chip_samples as i32 - samples as i32;
        let abs_diff = diff.unsigned_abs();
        if abs_diff < best_diff {
            best_diff = abs_diff;
            best_add = guess_add;
            if best_diff == 0 {
                break;
            }
        }

        let mul = (((chip_samples as i64 - diff as i64) << 12) / chip_samples as i64) as u64;
        if diff < 0 {
            guess_add = ((guess_add as u64 * mul) >> 12) as u32;
            guess_add = guess_add.saturating_add(1);
        } else if diff > 0 {
            guess_add = ((guess_add as u64 * mul) >> 12) as u32;
            guess_add = guess_add.saturating_sub(1);
        }
    }
    best_add
}
