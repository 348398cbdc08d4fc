use crate::lfo::Lfo;
use crate::tables::{RateTables, ksl_table};
use crate::{Channel, Operator, Pairing, SHIFT_KEYCODE, SHIFT_KSLBASE};

/// Feedback shift meaning "no feedback"
pub(crate) const FEEDBACK_OFF: u8 = 31;

/// How the four operators of an OPL3 channel pair are connected.
///
/// Picked by the connection bits of both channels' 0xC0 registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FourOpAlgorithm {
    /// 1 → 2 → 3 → 4
    FmFm,
    /// 1 + (2 → 3 → 4)
    AmFm,
    /// (1 → 2) + (3 → 4)
    FmAm,
    /// 1 + (2 → 3) + 4
    AmAm,
}

impl FourOpAlgorithm {
    pub fn from_connections(primary_c0: u8, secondary_c0: u8) -> Self {
        match (primary_c0 & 1) | ((secondary_c0 & 1) << 1) {
            0 => FourOpAlgorithm::FmFm,
            1 => FourOpAlgorithm::AmFm,
            2 => FourOpAlgorithm::FmAm,
            _ => FourOpAlgorithm::AmAm,
        }
    }
}

/// Synthesis topology currently used by a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthMode {
    /// Operator 1 modulates operator 2
    Fm,
    /// Both operators are summed
    Am,
    /// Four operators over a channel pair, set on both members
    FourOp(FourOpAlgorithm),
    /// Rendered by the rhythm unit
    Percussion,
}

/// What a channel is used for, resolved when rhythm mode toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Melodic,
    /// Channel 6, both operators form the bass drum
    BassDrum,
    /// Channel 7, operator 1 is the hi-hat, operator 2 the snare
    HiHatSnare,
    /// Channel 8, operator 1 is the tom-tom, operator 2 the top cymbal
    TomCymbal,
}

/// Pack frequency and block (register bits) together with the derived key
/// code and key scale level base
pub(crate) fn expand_chan_data(data: u32, note_select: bool) -> u32 {
    let data = data & 0x1fff;
    let ksl_base = ksl_table()[(data >> 6) as usize] as u32;
    let mut key_code = (data & 0x1c00) >> 9;
    if note_select {
        key_code |= (data & 0x100) >> 8;
    } else {
        key_code |= (data & 0x200) >> 9;
    }
    data | (key_code << SHIFT_KEYCODE) | (ksl_base << SHIFT_KSLBASE)
}

impl Channel {
    /// Frequency number and block exactly as written, 13 bits
    pub(crate) fn frequency_data(&self) -> u32 {
        self.chan_data & 0x1fff
    }

    pub(crate) fn set_chan_data(&mut self, rates: &RateTables, data: u32) {
        self.chan_data = data;
        for op in self.op.iter_mut() {
            op.set_chan_data(rates, data);
        }
    }

    /// Register 0xC0 feedback bits, returns true if the connection changed
    pub(crate) fn write_c0(&mut self, val: u8) -> bool {
        let change = self.reg_c0 ^ val;
        self.reg_c0 = val;
        let feedback = (val >> 1) & 7;
        self.feedback = if feedback != 0 { 9 - feedback } else { FEEDBACK_OFF };
        change != 0
    }

    pub(crate) fn key_on_ops(&mut self, mask: u8) {
        for op in self.op.iter_mut() {
            op.key_on(mask);
        }
    }

    pub(crate) fn key_off_ops(&mut self, mask: u8) {
        for op in self.op.iter_mut() {
            op.key_off(mask);
        }
    }

    /// Phase modulation the first operator feeds back into itself
    #[inline]
    pub(crate) fn feedback_input(&self) -> i32 {
        if self.feedback == FEEDBACK_OFF {
            0
        } else {
            (self.old[0] + self.old[1]) >> self.feedback
        }
    }

    /// Step the first operator, returning its previous output.
    ///
    /// The chip's feedback path delays the first operator by one sample.
    #[inline]
    pub(crate) fn forward_first(&mut self) -> i32 {
        let modulation = self.feedback_input();
        self.old[0] = self.old[1];
        self.old[1] = self.op[0].get_sample(modulation);
        self.old[0]
    }

    #[inline]
    pub(crate) fn pan(&self, frame: &mut [i32], sample: i32) {
        if self.left {
            frame[0] += sample;
        }
        if self.right {
            frame[1] += sample;
        }
    }

    /// Render a two operator channel into the interleaved stereo `mix`
    ///
    /// # Arguments
    ///
    /// * `lfo` - LFO values for this block
    /// * `samples` - frames to render
    /// * `mix` - stereo accumulator, at least `samples * 2` long
    pub(crate) fn generate(&mut self, lfo: &Lfo, samples: usize, mix: &mut [i32]) {
        let additive = self.synth == SynthMode::Am;
        let silent = if additive {
            self.op[0].silent() && self.op[1].silent()
        } else {
            self.op[1].silent()
        };
        if silent {
            self.old = [0, 0];
            return;
        }

        self.op[0].prepare(lfo);
        self.op[1].prepare(lfo);
        for frame in mix.chunks_exact_mut(2).take(samples) {
            let out0 = self.forward_first();
            let sample = if additive {
                out0 + self.op[1].get_sample(0)
            } else {
                self.op[1].get_sample(out0)
            };
            self.pan(frame, sample);
        }
    }

    /// Render an OPL3 four operator pair, `self` being the primary channel.
    ///
    /// The pair uses the primary's feedback and panning.
    pub(crate) fn generate_four_op(
        &mut self,
        second: &mut Channel,
        lfo: &Lfo,
        samples: usize,
        mix: &mut [i32],
    ) {
        use FourOpAlgorithm::*;

        let SynthMode::FourOp(algorithm) = self.synth else {
            return;
        };
        let silent = match algorithm {
            FmFm => second.op[1].silent(),
            AmFm => self.op[0].silent() && second.op[1].silent(),
            FmAm => self.op[1].silent() && second.op[1].silent(),
            AmAm => self.op[0].silent() && second.op[0].silent() && second.op[1].silent(),
        };
        if silent {
            self.old = [0, 0];
            return;
        }

        self.op[0].prepare(lfo);
        self.op[1].prepare(lfo);
        second.op[0].prepare(lfo);
        second.op[1].prepare(lfo);
        for frame in mix.chunks_exact_mut(2).take(samples) {
            let out0 = self.forward_first();
            let sample = match algorithm {
                FmFm => {
                    let next = self.op[1].get_sample(out0);
                    let next = second.op[0].get_sample(next);
                    second.op[1].get_sample(next)
                }
                AmFm => {
                    let next = self.op[1].get_sample(0);
                    let next = second.op[0].get_sample(next);
                    out0 + second.op[1].get_sample(next)
                }
                FmAm => {
                    let first = self.op[1].get_sample(out0);
                    let next = second.op[0].get_sample(0);
                    first + second.op[1].get_sample(next)
                }
                AmAm => {
                    let next = self.op[1].get_sample(0);
                    out0 + second.op[0].get_sample(next) + second.op[1].get_sample(0)
                }
            };
            self.pan(frame, sample);
        }
    }

    /// Operator by slot, 0 is the modulator, 1 the carrier
    pub fn operator(&self, slot: usize) -> Option<&Operator> {
        self.op.get(slot)
    }

    pub fn frequency_number(&self) -> u16 {
        (self.chan_data & 0x3ff) as u16
    }

    pub fn block(&self) -> u8 {
        ((self.chan_data >> 10) & 0x7) as u8
    }

    /// Key-on bit of register 0xB0
    pub fn key_on(&self) -> bool {
        self.reg_b0 & 0x20 != 0
    }

    /// Feedback register value, 0-7
    pub fn feedback(&self) -> u8 {
        (self.reg_c0 >> 1) & 7
    }

    pub fn synth(&self) -> SynthMode {
        self.synth
    }

    pub fn role(&self) -> ChannelRole {
        self.role
    }

    pub fn pairing(&self) -> Pairing {
        self.pairing
    }

    pub fn left(&self) -> bool {
        self.left
    }

    pub fn right(&self) -> bool {
        self.right
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KEY_NORMAL;

    fn carrier_patch(ch: &mut Channel, rates: &RateTables) {
        for op in ch.op.iter_mut() {
            op.init(rates);
            op.write_20(rates, 0x21);
            op.write_60(rates, 0xF0);
            op.write_80(rates, 0x0F);
        }
        // modulator quiet, carrier loud
        ch.op[0].write_40(0x3f);
        ch.op[1].write_40(0x00);
        ch.set_chan_data(rates, expand_chan_data(0x157 | (4 << 10), false));
    }

    #[test]
    fn feedback_register() {
        let mut ch = Channel::default();
        ch.write_c0(0x0E);
        assert_eq!(ch.feedback(), 7);
        assert_eq!(ch.feedback, 2);
        ch.write_c0(0x00);
        assert_eq!(ch.feedback, FEEDBACK_OFF);
        ch.old = [1000, 1000];
        assert_eq!(ch.feedback_input(), 0);
    }

    #[test]
    fn key_code_and_note_select() {
        // block 4, fnum bit 9 set, bit 8 clear
        let data = 0x200 | (4 << 10);
        assert_eq!(expand_chan_data(data, false) >> SHIFT_KEYCODE, 9);
        assert_eq!(expand_chan_data(data, true) >> SHIFT_KEYCODE, 8);
    }

    #[test]
    fn silent_channel_writes_nothing() {
        let rates = RateTables::new(49716);
        let mut ch = Channel::default();
        let mut mix = vec![0; 64];
        ch.generate(&Lfo::new(rates.lfo_add), 32, &mut mix);
        assert!(mix.iter().all(|&s| s == 0));
    }

    #[test]
    fn keyed_channel_fills_both_sides() {
        let rates = RateTables::new(49716);
        let mut ch = Channel::default();
        carrier_patch(&mut ch, &rates);
        ch.key_on_ops(KEY_NORMAL);

        let mut mix = vec![0; 1024];
        ch.generate(&Lfo::new(rates.lfo_add), 512, &mut mix);
        assert!(mix.iter().any(|&s| s != 0));
        assert!(mix.chunks_exact(2).all(|f| f[0] == f[1]));
    }

    #[test]
    fn panning_masks_sides() {
        let rates = RateTables::new(49716);
        let mut ch = Channel::default();
        carrier_patch(&mut ch, &rates);
        ch.left = false;
        ch.key_on_ops(KEY_NORMAL);

        let mut mix = vec![0; 1024];
        ch.generate(&Lfo::new(rates.lfo_add), 512, &mut mix);
        assert!(mix.chunks_exact(2).all(|f| f[0] == 0));
        assert!(mix.chunks_exact(2).any(|f| f[1] != 0));
    }

    #[test]
    fn four_op_algorithms() {
        assert_eq!(FourOpAlgorithm::from_connections(0, 0), FourOpAlgorithm::FmFm);
        assert_eq!(FourOpAlgorithm::from_connections(1, 0), FourOpAlgorithm::AmFm);
        assert_eq!(FourOpAlgorithm::from_connections(0, 1), FourOpAlgorithm::FmAm);
        assert_eq!(FourOpAlgorithm::from_connections(0x31, 0x01), FourOpAlgorithm::AmAm);
    }

    #[test]
    fn four_op_am_am_sums_carriers() {
        let rates = RateTables::new(49716);
        let mut first = Channel::default();
        let mut second = Channel::default();
        carrier_patch(&mut first, &rates);
        carrier_patch(&mut second, &rates);
        first.synth = SynthMode::FourOp(FourOpAlgorithm::AmAm);
        // only the last operator is keyed
        second.op[1].key_on(KEY_NORMAL);

        let mut mix = vec![0; 512];
        first.generate_four_op(&mut second, &Lfo::new(rates.lfo_add), 256, &mut mix);
        assert!(mix.iter().any(|&s| s != 0));
        assert_eq!(first.operator(0).map(|op| op.is_keyed()), Some(false));
    }
}
