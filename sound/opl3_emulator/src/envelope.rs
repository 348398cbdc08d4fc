//! # Envelope Generator
//!
//! Per operator attenuation state machine. Attack follows the chip's
//! exponential curve, decay and release step linearly in the log domain,
//! and every rate is a table lookup so the stepped hardware timing survives
//! resampling.

use crate::tables::RateTables;
use crate::{ENV_MAX, ENV_MIN, RATE_MASK, RATE_SH, env_silent};

/// Envelope generator stage
///
/// The discriminants index the frozen-stage bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EnvelopeStage {
    Off = 0,
    Release = 1,
    Sustain = 2,
    Decay = 3,
    Attack = 4,
}

impl EnvelopeStage {
    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

#[derive(Debug, Clone)]
pub struct Envelope {
    stage: EnvelopeStage,
    /// Current attenuation, `ENV_MIN` is loudest
    volume: i32,
    /// Fractional rate accumulator
    rate_index: u32,
    /// Bit per stage that can't progress because its rate is zero
    rate_zero: u8,
    attack_add: u32,
    decay_add: u32,
    release_add: u32,
    sustain_level: i32,
    /// EG-type: hold the sustain level until key-off
    sustain_hold: bool,
    /// Key scale rate offset added to every rate index
    ksr: u8,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            stage: EnvelopeStage::Off,
            volume: ENV_MAX,
            rate_index: 0,
            // all rate registers power up at zero
            rate_zero: 0x1f,
            attack_add: 0,
            decay_add: 0,
            release_add: 0,
            sustain_level: ENV_MAX,
            sustain_hold: false,
            ksr: 0,
        }
    }
}

impl Envelope {
    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn volume(&self) -> i32 {
        self.volume
    }

    /// True when the current stage can't move the volume
    pub fn frozen(&self) -> bool {
        self.rate_zero & self.stage.bit() != 0
    }

    /// An operator is silent when it is inaudible and will stay that way
    pub fn silent(&self, total_level: i32) -> bool {
        env_silent(total_level + self.volume) && self.frozen()
    }

    /// Look up the rate step for a 4 bit rate register, `None` for rate 0
    fn rate(&self, table: &[u32; 76], rate: u8) -> Option<u32> {
        if rate == 0 {
            None
        } else {
            Some(table[((rate << 2) + self.ksr) as usize])
        }
    }

    fn set_rate_zero(&mut self, stage: EnvelopeStage, zero: bool) {
        if zero {
            self.rate_zero |= stage.bit();
        } else {
            self.rate_zero &= !stage.bit();
        }
    }

    pub fn set_attack(&mut self, rates: &RateTables, rate: u8) {
        let add = self.rate(&rates.attack_rates, rate);
        self.attack_add = add.unwrap_or(0);
        self.set_rate_zero(EnvelopeStage::Attack, add.is_none());
    }

    pub fn set_decay(&mut self, rates: &RateTables, rate: u8) {
        let add = self.rate(&rates.linear_rates, rate);
        self.decay_add = add.unwrap_or(0);
        self.set_rate_zero(EnvelopeStage::Decay, add.is_none());
    }

    pub fn set_release(&mut self, rates: &RateTables, rate: u8) {
        let add = self.rate(&rates.linear_rates, rate);
        self.release_add = add.unwrap_or(0);
        self.set_rate_zero(EnvelopeStage::Release, add.is_none());
        self.update_sustain_zero();
    }

    /// Select sustained (true) or percussive envelope
    pub fn set_sustain_hold(&mut self, hold: bool) {
        self.sustain_hold = hold;
        self.update_sustain_zero();
    }

    /// A percussive sustain runs at the release rate
    fn update_sustain_zero(&mut self) {
        let frozen = self.sustain_hold || self.release_add == 0;
        self.set_rate_zero(EnvelopeStage::Sustain, frozen);
    }

    /// Sustain level from register 0x80, level 15 maps to the bottom of the range
    pub fn set_sustain_level(&mut self, value: u8) {
        let mut sustain = (value >> 4) as i32;
        sustain |= (sustain + 1) & 0x10;
        self.sustain_level = sustain << 4;
    }

    /// Change the key scale rate offset, returns true when the rates must be
    /// looked up again
    pub fn set_ksr(&mut self, ksr: u8) -> bool {
        if self.ksr == ksr {
            return false;
        }
        self.ksr = ksr;
        true
    }

    pub fn key_on(&mut self) {
        self.rate_index = 0;
        self.stage = EnvelopeStage::Attack;
    }

    pub fn key_off(&mut self) {
        if self.stage == EnvelopeStage::Off {
            return;
        }
        if self.volume >= ENV_MAX {
            self.volume = ENV_MAX;
            self.stage = EnvelopeStage::Off;
        } else {
            self.stage = EnvelopeStage::Release;
        }
    }

    fn rate_forward(&mut self, add: u32) -> i32 {
        self.rate_index += add;
        let steps = (self.rate_index >> RATE_SH) as i32;
        self.rate_index &= RATE_MASK;
        steps
    }

    /// Advance one sample and return the new attenuation
    pub fn forward(&mut self) -> i32 {
        let mut vol = self.volume;
        match self.stage {
            EnvelopeStage::Off => return ENV_MAX,
            EnvelopeStage::Attack => {
                let change = self.rate_forward(self.attack_add);
                if change == 0 {
                    return vol;
                }
                vol += (!vol * change) >> 3;
                if vol < ENV_MIN {
                    self.volume = ENV_MIN;
                    self.rate_index = 0;
                    self.stage = EnvelopeStage::Decay;
                    return ENV_MIN;
                }
            }
            EnvelopeStage::Decay => {
                vol += self.rate_forward(self.decay_add);
                if vol >= self.sustain_level {
                    if vol >= ENV_MAX {
                        self.volume = ENV_MAX;
                        self.stage = EnvelopeStage::Off;
                        return ENV_MAX;
                    }
                    self.rate_index = 0;
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain if self.sustain_hold => return vol,
            EnvelopeStage::Sustain | EnvelopeStage::Release => {
                vol += self.rate_forward(self.release_add);
                if vol >= ENV_MAX {
                    self.volume = ENV_MAX;
                    self.stage = EnvelopeStage::Off;
                    return ENV_MAX;
                }
            }
        }
        self.volume = vol;
        vol
    }
}
