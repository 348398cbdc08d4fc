use crate::lfo::Lfo;
use crate::tables::{KSL_SHIFT_TABLE, RateTables};
use crate::{
    ENV_BITS, EnvelopeStage, MASK_KSR, MASK_SUSTAIN, MASK_TREMOLO, MASK_VIBRATO, Operator,
    SHIFT_KEYCODE, SHIFT_KSLBASE, Waveform, env_silent,
};

impl Operator {
    /// Bind a power-on operator to the chip's rate tables
    pub(crate) fn init(&mut self, rates: &RateTables) {
        self.phase.set_multiplier(rates.freq_mul[(self.reg20 & 0x0f) as usize]);
        self.update_frequency();
    }

    /// Register 0x20: tremolo, vibrato, EG-type, KSR and multiplier
    pub fn write_20(&mut self, rates: &RateTables, val: u8) {
        let change = self.reg20 ^ val;
        if change == 0 {
            return;
        }
        self.reg20 = val;

        if change & MASK_KSR != 0 {
            self.update_rates(rates);
        }
        self.envelope.set_sustain_hold(val & MASK_SUSTAIN != 0);
        if change & (0x0f | MASK_VIBRATO) != 0 {
            self.phase.set_multiplier(rates.freq_mul[(val & 0x0f) as usize]);
            self.update_frequency();
        }
    }

    /// Register 0x40: key scale level and total level
    pub fn write_40(&mut self, val: u8) {
        if self.reg40 == val {
            return;
        }
        self.reg40 = val;
        self.update_attenuation();
    }

    /// Register 0x60: attack and decay rates
    pub fn write_60(&mut self, rates: &RateTables, val: u8) {
        let change = self.reg60 ^ val;
        self.reg60 = val;
        if change & 0x0f != 0 {
            self.envelope.set_decay(rates, val & 0x0f);
        }
        if change & 0xf0 != 0 {
            self.envelope.set_attack(rates, val >> 4);
        }
    }

    /// Register 0x80: sustain level and release rate
    pub fn write_80(&mut self, rates: &RateTables, val: u8) {
        let change = self.reg80 ^ val;
        if change == 0 {
            return;
        }
        self.reg80 = val;
        self.envelope.set_sustain_level(val);
        if change & 0x0f != 0 {
            self.envelope.set_release(rates, val & 0x0f);
        }
    }

    /// Register 0xE0: waveform select, limited by what the chip currently allows
    pub fn write_e0(&mut self, val: u8, mask: u8) {
        self.reg_e0 = val;
        self.waveform = Waveform::from_register(val, mask);
    }

    /// Re-apply the stored waveform after the allowed set changed
    pub fn set_waveform_mask(&mut self, mask: u8) {
        self.waveform = Waveform::from_register(self.reg_e0, mask);
    }

    /// Take over new frequency, key code and KSL data from the channel
    pub(crate) fn set_chan_data(&mut self, rates: &RateTables, data: u32) {
        let change = self.chan_data ^ data;
        self.chan_data = data;
        self.update_frequency();
        if change & (0xff << SHIFT_KSLBASE) != 0 {
            self.update_attenuation();
        }
        if change & (0xff << SHIFT_KEYCODE) != 0 {
            self.update_rates(rates);
        }
    }

    fn update_frequency(&mut self) {
        let fnum = self.chan_data & 0x3ff;
        let block = (self.chan_data >> 10) & 0x7;
        self.phase.update(fnum, block, self.reg20 & MASK_VIBRATO != 0);
    }

    fn update_attenuation(&mut self) {
        let ksl_base = ((self.chan_data >> SHIFT_KSLBASE) & 0xff) as i32;
        let tl = (self.reg40 & 0x3f) as i32;
        let ksl_shift = KSL_SHIFT_TABLE[(self.reg40 >> 6) as usize];
        // total level steps are 0.75 dB, four envelope steps
        self.total_level = (tl << (ENV_BITS - 7)) + (ksl_base >> ksl_shift);
    }

    fn update_rates(&mut self, rates: &RateTables) {
        let mut ksr = ((self.chan_data >> SHIFT_KEYCODE) & 0xff) as u8;
        if self.reg20 & MASK_KSR == 0 {
            ksr >>= 2;
        }
        if !self.envelope.set_ksr(ksr) {
            return;
        }
        self.envelope.set_attack(rates, self.reg60 >> 4);
        self.envelope.set_decay(rates, self.reg60 & 0x0f);
        self.envelope.set_release(rates, self.reg80 & 0x0f);
    }

    /// Add a key-on source; the first one restarts phase and envelope
    pub fn key_on(&mut self, mask: u8) {
        if self.key_on == 0 {
            self.phase.reset();
            self.envelope.key_on();
        }
        self.key_on |= mask;
    }

    /// Drop a key-on source; releasing the last one starts the release
    pub fn key_off(&mut self, mask: u8) {
        self.key_on &= !mask;
        if self.key_on == 0 {
            self.envelope.key_off();
        }
    }

    /// Latch the LFO state for the next block
    pub fn prepare(&mut self, lfo: &Lfo) {
        self.current_level = self.total_level;
        if self.reg20 & MASK_TREMOLO != 0 {
            self.current_level += lfo.tremolo() as i32;
        }
        self.phase.prepare(lfo);
    }

    /// Step the envelope and return the full attenuation
    #[inline]
    pub fn forward_volume(&mut self) -> i32 {
        self.current_level + self.envelope.forward()
    }

    /// Step the phase and return the 10 bit waveform position
    #[inline]
    pub fn forward_wave(&mut self) -> u32 {
        self.phase.forward()
    }

    #[inline]
    pub fn get_wave(&self, index: u32, volume: i32) -> i32 {
        self.waveform.sample(index, volume)
    }

    /// Render one sample with the given phase modulation
    #[inline]
    pub fn get_sample(&mut self, modulation: i32) -> i32 {
        let volume = self.forward_volume();
        let index = self.forward_wave();
        if env_silent(volume) {
            0
        } else {
            self.get_wave(index.wrapping_add(modulation as u32), volume)
        }
    }

    /// The operator is inaudible and its envelope can't change that
    pub fn silent(&self) -> bool {
        self.envelope.silent(self.total_level)
    }

    pub fn envelope_stage(&self) -> EnvelopeStage {
        self.envelope.stage()
    }

    /// Envelope attenuation without total level, 0 loudest to 511
    pub fn envelope_level(&self) -> i32 {
        self.envelope.volume()
    }

    /// Total level plus key scale level, in envelope units
    pub fn total_level(&self) -> i32 {
        self.total_level
    }

    /// 10 bit waveform position
    pub fn phase(&self) -> u16 {
        self.phase.phase()
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn is_keyed(&self) -> bool {
        self.key_on != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ENV_MAX, KEY_NORMAL, KEY_RHYTHM, tables::ksl_table};

    fn chan_data(fnum: u32, block: u32) -> u32 {
        let data = fnum | (block << 10);
        let key_code = ((data & 0x1c00) >> 9) | ((data & 0x200) >> 9);
        let ksl = ksl_table()[(data >> 6) as usize] as u32;
        data | (key_code << SHIFT_KEYCODE) | (ksl << SHIFT_KSLBASE)
    }

    fn loud_operator(rates: &RateTables) -> Operator {
        let mut op = Operator::default();
        op.write_20(rates, 0x21);
        op.write_40(0x00);
        op.write_60(rates, 0xF0);
        op.write_80(rates, 0x0F);
        op.set_chan_data(rates, chan_data(0x157, 4));
        op
    }

    #[test]
    fn key_on_sounds() {
        let rates = RateTables::new(49716);
        let mut op = loud_operator(&rates);
        op.prepare(&Lfo::new(rates.lfo_add));
        op.key_on(KEY_NORMAL);
        let peak = (0..512).map(|_| op.get_sample(0).abs()).max().unwrap();
        assert!(peak > 4000);
        assert_eq!(op.envelope_stage(), EnvelopeStage::Sustain);
        assert!(!op.silent());
    }

    #[test]
    fn key_sources_combine() {
        let rates = RateTables::new(49716);
        let mut op = loud_operator(&rates);
        op.key_on(KEY_NORMAL);
        op.key_on(KEY_RHYTHM);
        op.key_off(KEY_NORMAL);
        assert!(op.is_keyed());
        assert_eq!(op.envelope_stage(), EnvelopeStage::Attack);
        op.key_off(KEY_RHYTHM);
        assert!(!op.is_keyed());
    }

    #[test]
    fn key_on_restarts_phase() {
        let rates = RateTables::new(49716);
        let mut op = loud_operator(&rates);
        op.prepare(&Lfo::new(rates.lfo_add));
        op.key_on(KEY_NORMAL);
        for _ in 0..37 {
            op.get_sample(0);
        }
        assert_ne!(op.phase(), 0);
        op.key_off(KEY_NORMAL);
        op.key_on(KEY_NORMAL);
        assert_eq!(op.phase(), 0);
    }

    #[test]
    fn total_level_and_ksl() {
        let rates = RateTables::new(49716);
        let mut op = Operator::default();
        op.set_chan_data(&rates, chan_data(0x3ff, 7));
        op.write_40(0x3f);
        assert_eq!(op.total_level(), 63 << 2);
        // 6 dB/oct key scaling adds the full KSL base
        op.write_40(0xC0);
        assert_eq!(op.total_level(), ksl_table()[7 * 16 + 15] as i32);
        // 3 dB/oct adds half of it
        op.write_40(0x40);
        assert_eq!(op.total_level(), (ksl_table()[7 * 16 + 15] >> 1) as i32);
    }

    #[test]
    fn max_total_level_is_quiet() {
        let rates = RateTables::new(49716);
        let mut op = loud_operator(&rates);
        op.write_40(0x3f);
        op.prepare(&Lfo::new(rates.lfo_add));
        op.key_on(KEY_NORMAL);
        // 63 * 0.75 dB leaves the carrier audible but quiet
        let peak = (0..512).map(|_| op.get_sample(0).abs()).max().unwrap();
        assert!(peak > 0 && peak < 64);
        assert!(op.envelope_level() < ENV_MAX);
    }

    #[test]
    fn waveform_mask_reapplies() {
        let mut op = Operator::default();
        op.write_e0(0x06, 0x0);
        assert_eq!(op.waveform(), Waveform::Sine);
        op.set_waveform_mask(0x7);
        assert_eq!(op.waveform(), Waveform::Square);
        op.set_waveform_mask(0x3);
        assert_eq!(op.waveform(), Waveform::AbsSine);
    }
}
