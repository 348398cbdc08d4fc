//! # Rhythm Mode
//!
//! Register 0xBD bit 5 turns channels 6, 7 and 8 into five percussion
//! voices. Each voice has its own key bit in 0xBD, separate from the
//! channels' own key-on. The hi-hat, snare and cymbal don't use their
//! operators' phase directly: they combine phase bits of the hi-hat and
//! cymbal operators with a shared noise generator.

use log::debug;

use crate::lfo::Lfo;
use crate::{Channel, ChannelRole, Chip, KEY_RHYTHM, LFO_SH, env_silent};

/// The five rhythm mode voices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Percussion {
    BassDrum,
    Snare,
    TomTom,
    Cymbal,
    HiHat,
}

impl Percussion {
    pub const ALL: [Percussion; 5] = [
        Percussion::BassDrum,
        Percussion::Snare,
        Percussion::TomTom,
        Percussion::Cymbal,
        Percussion::HiHat,
    ];

    /// Key bit in register 0xBD
    pub fn mask(self) -> u8 {
        match self {
            Percussion::BassDrum => 0x10,
            Percussion::Snare => 0x08,
            Percussion::TomTom => 0x04,
            Percussion::Cymbal => 0x02,
            Percussion::HiHat => 0x01,
        }
    }

    /// `(channel, slot)` of every operator the voice keys
    pub fn operators(self) -> &'static [(usize, usize)] {
        match self {
            Percussion::BassDrum => &[(6, 0), (6, 1)],
            Percussion::Snare => &[(7, 1)],
            Percussion::TomTom => &[(8, 0)],
            Percussion::Cymbal => &[(8, 1)],
            Percussion::HiHat => &[(7, 0)],
        }
    }
}

/// 23 bit noise LFSR stepped at the chip rate
#[derive(Debug, Clone)]
pub struct Noise {
    value: u32,
    counter: u32,
    add: u32,
}

impl Noise {
    pub fn new(add: u32) -> Self {
        Self {
            value: 1,
            counter: 0,
            add,
        }
    }

    /// Advance by one output sample and return the register
    pub fn forward(&mut self) -> u32 {
        self.counter += self.add;
        let count = self.counter >> LFO_SH;
        self.counter &= (1 << LFO_SH) - 1;
        for _ in 0..count {
            self.value ^= 0x0080_0302 & 0u32.wrapping_sub(self.value & 1);
            self.value >>= 1;
        }
        self.value
    }
}

/// Render the five percussion voices from channels 6, 7 and 8.
///
/// Voices are rendered at double amplitude and panned by the channel that
/// owns their operators.
pub(crate) fn generate_percussion(
    channels: &mut [Channel],
    noise: &mut Noise,
    lfo: &Lfo,
    samples: usize,
    mix: &mut [i32],
) {
    let [bass, hat_snare, tom_cymbal] = channels else {
        return;
    };
    for op in bass
        .op
        .iter_mut()
        .chain(hat_snare.op.iter_mut())
        .chain(tom_cymbal.op.iter_mut())
    {
        op.prepare(lfo);
    }

    for frame in mix.chunks_exact_mut(2).take(samples) {
        // bass drum, the first operator is skipped in additive mode
        let out0 = bass.forward_first();
        let modulation = if bass.reg_c0 & 1 != 0 { 0 } else { out0 };
        let bass_drum = bass.op[1].get_sample(modulation);

        let noise_bit = noise.forward() & 1;
        let c2 = hat_snare.op[0].forward_wave();
        let c5 = tom_cymbal.op[1].forward_wave();
        let phase_bit = if (((c2 & 0x88) ^ ((c2 << 5) & 0x80)) | ((c5 ^ (c5 << 2)) & 0x20)) != 0 {
            0x02
        } else {
            0x00
        };

        let mut hat_snare_out = 0;
        // hi-hat
        let volume = hat_snare.op[0].forward_volume();
        if !env_silent(volume) {
            let index = (phase_bit << 8) | (0x34 << (phase_bit ^ (noise_bit << 1)));
            hat_snare_out += hat_snare.op[0].get_wave(index, volume);
        }
        // snare drum
        let volume = hat_snare.op[1].forward_volume();
        if !env_silent(volume) {
            let index = (0x100 + (c2 & 0x100)) ^ (noise_bit << 8);
            hat_snare_out += hat_snare.op[1].get_wave(index, volume);
        }

        let mut tom_cymbal_out = tom_cymbal.op[0].get_sample(0);
        // top cymbal
        let volume = tom_cymbal.op[1].forward_volume();
        if !env_silent(volume) {
            let index = (1 + phase_bit) << 8;
            tom_cymbal_out += tom_cymbal.op[1].get_wave(index, volume);
        }

        bass.pan(frame, bass_drum << 1);
        hat_snare.pan(frame, hat_snare_out << 1);
        tom_cymbal.pan(frame, tom_cymbal_out << 1);
    }
}

impl Chip {
    /// Register 0xBD: LFO depths, rhythm enable and percussion keys
    pub(crate) fn write_bd(&mut self, val: u8) {
        let change = self.reg_bd ^ val;
        if change == 0 {
            return;
        }
        self.reg_bd = val;
        self.lfo.set_depth(val);

        if val & 0x20 != 0 {
            if change & 0x20 != 0 {
                debug!("OPL rhythm mode enabled");
                self.set_rhythm_roles(true);
            }
            for voice in Percussion::ALL {
                let keyed = val & voice.mask() != 0;
                for &(channel, slot) in voice.operators() {
                    let op = &mut self.channels[channel].op[slot];
                    if keyed {
                        op.key_on(KEY_RHYTHM);
                    } else {
                        op.key_off(KEY_RHYTHM);
                    }
                }
            }
        } else if change & 0x20 != 0 {
            debug!("OPL rhythm mode disabled");
            self.set_rhythm_roles(false);
            for channel in &mut self.channels[6..9] {
                channel.key_off_ops(KEY_RHYTHM);
            }
        }
    }

    fn set_rhythm_roles(&mut self, enabled: bool) {
        let roles = if enabled {
            [
                ChannelRole::BassDrum,
                ChannelRole::HiHatSnare,
                ChannelRole::TomCymbal,
            ]
        } else {
            [ChannelRole::Melodic; 3]
        };
        for (index, role) in (6..9).zip(roles) {
            self.channels[index].role = role;
            self.update_synth(index);
        }
    }

    pub fn rhythm_enabled(&self) -> bool {
        self.reg_bd & 0x20 != 0
    }
}
