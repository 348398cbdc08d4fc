//! Chip wide low frequency oscillator driving vibrato and tremolo.
//!
//! The LFO steps once every 256 chip samples. Tremolo walks a 52 step
//! triangle (about 3.7 Hz), vibrato an 8 step shape read four times slower
//! (about 6.1 Hz). Between steps the values are constant, so rendering is
//! split at LFO steps and operators apply the values once per block.

use crate::tables::{TREMOLO_TABLE, TREMOLO_TABLE_DATA, VIBRATO_TABLE};
use crate::{LFO_MAX, MASK_TREMOLO, MASK_VIBRATO};

#[derive(Debug, Clone)]
pub struct Lfo {
    counter: u32,
    add: u32,
    vibrato_index: u8,
    tremolo_index: u8,
    /// 0 for the deep (14 cent) vibrato, 1 for 7 cent
    vibrato_strength: u8,
    /// 0 for the deep (4.8 dB) tremolo, 2 for 1 dB
    tremolo_strength: u8,
    vibrato_sign: i32,
    vibrato_shift: u8,
    tremolo_value: u8,
}

impl Lfo {
    pub fn new(add: u32) -> Self {
        let mut lfo = Self {
            counter: 0,
            add,
            vibrato_index: 0,
            tremolo_index: 0,
            vibrato_strength: 1,
            tremolo_strength: 2,
            vibrato_sign: 0,
            vibrato_shift: 0,
            tremolo_value: 0,
        };
        lfo.latch();
        lfo
    }

    /// Depth bits from register 0xBD
    pub fn set_depth(&mut self, reg_bd: u8) {
        self.vibrato_strength = if reg_bd & MASK_VIBRATO != 0 { 0 } else { 1 };
        self.tremolo_strength = if reg_bd & MASK_TREMOLO != 0 { 0 } else { 2 };
        self.latch();
    }

    /// Refresh the values operators read for the current step
    fn latch(&mut self) {
        let vibrato = VIBRATO_TABLE[(self.vibrato_index >> 2) as usize];
        self.vibrato_sign = (vibrato >> 7) as i32;
        self.vibrato_shift = (vibrato & 7) as u8 + self.vibrato_strength;
        self.tremolo_value = TREMOLO_TABLE_DATA[self.tremolo_index as usize] >> self.tremolo_strength;
    }

    /// Latch the current values and advance the counter.
    ///
    /// Returns how many of `samples` can be rendered before the LFO steps,
    /// at least one.
    pub fn forward(&mut self, samples: u32) -> u32 {
        self.latch();

        let todo = LFO_MAX - self.counter;
        let count = todo.div_ceil(self.add);
        if count > samples {
            self.counter += samples * self.add;
            samples
        } else {
            self.counter += count * self.add;
            self.counter &= LFO_MAX - 1;
            self.vibrato_index = (self.vibrato_index + 1) & 31;
            if (self.tremolo_index as usize) + 1 < TREMOLO_TABLE {
                self.tremolo_index += 1;
            } else {
                self.tremolo_index = 0;
            }
            count
        }
    }

    /// Tremolo attenuation for the current block
    pub fn tremolo(&self) -> u8 {
        self.tremolo_value
    }

    pub fn vibrato_shift(&self) -> u8 {
        self.vibrato_shift
    }

    /// -1 when the vibrato bends down, else 0
    pub fn vibrato_sign(&self) -> i32 {
        self.vibrato_sign
    }
}
