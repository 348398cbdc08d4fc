//! # OPL2/OPL3 Emulator
//!
//! A Rust emulation of the Yamaha YM3812 (OPL2) and YMF262 (OPL3) FM sound
//! chips. The chip is driven the same way as the hardware: the host writes
//! `(register, value)` byte pairs and pulls PCM frames out of it.
//!
//! ## Features
//!
//! - Full OPL2 register map plus the OPL3 second bank, 4-operator channel
//!   pairs, stereo panning and the eight OPL3 waveforms
//! - Rhythm mode with the five percussion voices and the noise generator
//! - Timers, status register and CSM auto key-on
//! - Integer-only synthesis: log-sine/exponent waveform tables, table driven
//!   envelope rates, so identical input always produces identical output
//! - Every timing constant is derived from the configured output rate
//!
//! ## Architecture
//!
//! - **Chip**: owns all channels and global registers, decodes register
//!   writes and renders sample blocks
//! - **Channel**: two operators (or a pair of channels in 4-op mode) combined
//!   in FM or additive topologies, with feedback and panning
//! - **Operator**: phase generator + envelope generator + waveform lookup
//!
//! ## Usage
//!
//! ```rust
//! use opl3_emulator::{Chip, ChipConfig};
//!
//! let mut chip = Chip::new(ChipConfig::opl2(44100)).unwrap();
//!
//! chip.write(0x20, 0x01); // modulator: multiplier 1
//! chip.write(0x23, 0x01); // carrier: multiplier 1
//! chip.write(0x40, 0x10); // modulator level
//! chip.write(0x43, 0x00); // carrier at full volume
//! chip.write(0x60, 0xF0); // fast attack
//! chip.write(0x63, 0xF0);
//! chip.write(0x80, 0x77); // sustain/release
//! chip.write(0x83, 0x77);
//! chip.write(0xA0, 0x98); // f-number low byte
//! chip.write(0xB0, 0x31); // key on, block 4
//!
//! let mut output = vec![0i16; 1024];
//! chip.generate(&mut output, 1024).unwrap();
//! ```
//!
//! ## Register Reference
//!
//! - `0x01`: Waveform select enable
//! - `0x02-0x04`: Timers and IRQ control
//! - `0x08`: CSM mode and note select
//! - `0x20-0x35`: Operator parameters (AM/VIB/EG/KSR/MULT)
//! - `0x40-0x55`: Operator volume (KSL/TL)
//! - `0x60-0x75`: Operator envelope (AR/DR)
//! - `0x80-0x95`: Operator sustain/release (SL/RR)
//! - `0xA0-0xA8`: Channel frequency low byte
//! - `0xB0-0xB8`: Channel frequency high byte + key on/off
//! - `0xBD`: LFO depth, rhythm mode and percussion keys
//! - `0xC0-0xC8`: Channel feedback, connection and OPL3 panning
//! - `0xE0-0xF5`: Operator waveform select
//! - `0x104`/`0x105` (bank 1): 4-op connection mask and OPL3 enable

pub mod channel;
pub mod chip;
pub mod config;
pub mod envelope;
pub mod error;
pub mod lfo;
pub mod mixer;
pub mod operator;
pub mod phase;
pub mod register;
pub mod rhythm;
pub mod tables;
pub mod timer;
pub mod waveform;

pub use channel::{ChannelRole, FourOpAlgorithm, SynthMode};
pub use config::{ChipConfig, ChipMode, SampleFormat};
pub use envelope::EnvelopeStage;
pub use error::{OplError, Result};
pub use register::{Bank, Register};
pub use rhythm::Percussion;
pub use waveform::Waveform;

use envelope::Envelope;
use lfo::Lfo;
use phase::PhaseGenerator;
use rhythm::Noise;
use tables::RateTables;
use timer::Timers;

/// The base OPL sample rate in Hz (14.31818 MHz master clock / 288)
pub const OPL_RATE: f64 = 14_318_180.0 / 288.0;

/// Channels available in OPL2 mode
pub const OPL2_CHANNELS: usize = 9;
/// Channels available in OPL3 mode
pub const OPL3_CHANNELS: usize = 18;

/// Phase accumulator shift: the top 10 bits index the waveform
const WAVE_SH: u32 = 22;

/// LFO and noise counters run at chip rate with this many fraction bits
const LFO_SH: u32 = WAVE_SH - 10;
/// The LFO steps every 256 chip samples
const LFO_MAX: u32 = 256 << LFO_SH;

/// Envelope attenuation resolution in bits
const ENV_BITS: u32 = 9;
/// Loudest envelope level
const ENV_MIN: i32 = 0;
/// Fully attenuated envelope level
const ENV_MAX: i32 = 511;
/// Attenuation at which an operator is inaudible
const ENV_LIMIT: i32 = (12 * 256) >> 3;

/// Envelope rate counter fraction bits
const RATE_SH: u32 = 24;
const RATE_MASK: u32 = (1 << RATE_SH) - 1;

/// Bit position of the key scale level base inside channel data
const SHIFT_KSLBASE: u32 = 16;
/// Bit position of the key code inside channel data
const SHIFT_KEYCODE: u32 = 24;

const MASK_KSR: u8 = 0x10;
const MASK_SUSTAIN: u8 = 0x20;
const MASK_VIBRATO: u8 = 0x40;
const MASK_TREMOLO: u8 = 0x80;

/// Key-on sources, an operator sounds while any of them is held
const KEY_NORMAL: u8 = 0x1;
const KEY_RHYTHM: u8 = 0x2;
const KEY_CSM: u8 = 0x4;

/// Largest number of frames rendered in one pass over the channels
const MIX_BLOCK: usize = 512;

/// Checks if an envelope value represents silence
pub fn env_silent(x: i32) -> bool {
    x >= ENV_LIMIT
}

/// A single FM operator: phase generator, envelope generator and waveform.
#[derive(Debug, Clone)]
pub struct Operator {
    envelope: Envelope,
    phase: PhaseGenerator,
    waveform: Waveform,
    /// Frequency, block, key code and KSL base shared from the channel
    chan_data: u32,
    /// Total level plus key scale level
    total_level: i32,
    /// Total level with tremolo applied for the current block
    current_level: i32,
    /// Active key-on sources
    key_on: u8,
    reg20: u8,
    reg40: u8,
    reg60: u8,
    reg80: u8,
    reg_e0: u8,
}

impl Default for Operator {
    fn default() -> Self {
        Self {
            envelope: Envelope::default(),
            phase: PhaseGenerator::default(),
            waveform: Waveform::Sine,
            chan_data: 0,
            total_level: 0,
            current_level: 0,
            key_on: 0,
            reg20: 0,
            reg40: 0,
            reg60: 0,
            reg80: 0,
            reg_e0: 0,
        }
    }
}

/// Whether a channel takes part in an OPL3 4-operator pair.
///
/// The payload is the bit of register 0x104 that enables the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pairing {
    #[default]
    Single,
    Primary(u8),
    Secondary(u8),
}

/// One FM voice holding two operators.
#[derive(Debug, Clone)]
pub struct Channel {
    op: [Operator; 2],
    synth: SynthMode,
    role: ChannelRole,
    pairing: Pairing,
    /// F-number (bits 0-9), block (bits 10-12), KSL base and key code
    chan_data: u32,
    /// Last two outputs of the first operator, for feedback
    old: [i32; 2],
    /// Feedback as a right shift of the summed outputs, 31 disables it
    feedback: u8,
    reg_b0: u8,
    reg_c0: u8,
    left: bool,
    right: bool,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            op: [Operator::default(), Operator::default()],
            synth: SynthMode::Fm,
            role: ChannelRole::Melodic,
            pairing: Pairing::Single,
            chan_data: 0,
            old: [0, 0],
            feedback: 31,
            reg_b0: 0,
            reg_c0: 0,
            left: true,
            right: true,
        }
    }
}

/// The complete state of one emulated chip.
///
/// A `Chip` owns every channel and operator; nothing is shared between chips.
#[derive(Debug, Clone)]
pub struct Chip {
    config: ChipConfig,
    rates: RateTables,
    lfo: Lfo,
    noise: Noise,
    timers: Timers,
    channels: [Channel; OPL3_CHANNELS],
    /// Interleaved stereo accumulator for one block
    mix: Vec<i32>,
    /// Register 0x104: four operator pair enables
    reg104: u8,
    /// Register 0x08: CSM and note select
    reg08: u8,
    /// Register 0xBD: LFO depths, rhythm mode and percussion keys
    reg_bd: u8,
    /// Register 0x01 bit 5
    waveform_select: bool,
    /// Register 0x105 bit 0
    opl3_active: bool,
    /// A CSM key-on is held and must be released after one sample
    csm_key_held: bool,
    /// Output frames generated since construction or reset
    ticks: u64,
}
