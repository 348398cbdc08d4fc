use log::{debug, trace};

use crate::channel::expand_chan_data;
use crate::register::{self, ChannelRegister, OperatorRegister};
use crate::rhythm;
use crate::tables;
use crate::{
    Bank, Channel, ChannelRole, Chip, ChipConfig, ChipMode, FourOpAlgorithm, KEY_CSM, KEY_NORMAL,
    Lfo, MIX_BLOCK, Noise, OPL2_CHANNELS, OPL3_CHANNELS, OplError, Pairing, RateTables, Register,
    Result, SynthMode, Timers, mixer,
};

/// The 0x104 bit of the four operator pair a channel can join, and whether
/// the channel is the pair's first half
fn pair_slot(index: usize) -> Option<(u8, bool)> {
    match index {
        0..=2 => Some((1 << index, true)),
        3..=5 => Some((1 << (index - 3), false)),
        9..=11 => Some((1 << (index - 6), true)),
        12..=14 => Some((1 << (index - 9), false)),
        _ => None,
    }
}

impl Chip {
    /// Create a chip in its power-on state.
    ///
    /// # Arguments
    ///
    /// * `config` - Output rate, OPL2 (1 channel) or OPL3 (2 channels), and
    ///   the byte sample size
    ///
    /// # Returns
    ///
    /// `InvalidConfiguration` if the rate or layout is unsupported
    pub fn new(config: ChipConfig) -> Result<Self> {
        config.validate()?;
        tables::init_tables();
        let rates = RateTables::new(config.sample_rate);
        let chip = Self::build(config, rates);
        debug!(
            "Created {:?} emulator at {} Hz",
            chip.mode(),
            chip.config.sample_rate
        );
        Ok(chip)
    }

    /// Create a chip from an output rate and channel count, 1 for an OPL2
    /// and 2 for an OPL3
    pub fn with_channels(sample_rate: u32, channels: u8) -> Result<Self> {
        Self::new(ChipConfig {
            sample_rate,
            channels,
            ..ChipConfig::default()
        })
    }

    fn build(config: ChipConfig, rates: RateTables) -> Self {
        let mut channels: [Channel; OPL3_CHANNELS] = Default::default();
        for op in channels.iter_mut().flat_map(|ch| ch.op.iter_mut()) {
            op.init(&rates);
        }
        Self {
            lfo: Lfo::new(rates.lfo_add),
            noise: Noise::new(rates.noise_add),
            timers: Timers::new(rates.scale),
            config,
            rates,
            channels,
            mix: vec![0; MIX_BLOCK * 2],
            reg104: 0,
            reg08: 0,
            reg_bd: 0,
            waveform_select: false,
            opl3_active: false,
            csm_key_held: false,
            ticks: 0,
        }
    }

    /// Return to the power-on state, keeping the configuration
    pub fn reset(&mut self) {
        *self = Self::build(self.config.clone(), self.rates.clone());
        debug!("Reset {:?} emulator", self.mode());
    }

    /// Write a bank 0 register
    pub fn write(&mut self, address: u8, value: u8) {
        self.write_bank(Bank::Low, address, value);
    }

    /// Write a register with the bank in bit 8 of `address`
    pub fn write_reg(&mut self, address: u16, value: u8) {
        self.write_bank(Bank::from(address), (address & 0xff) as u8, value);
    }

    /// Write a register. Addresses without a function are ignored.
    pub fn write_bank(&mut self, bank: Bank, address: u8, value: u8) {
        if bank == Bank::High && self.mode() == ChipMode::Opl2 {
            trace!("Ignored high bank write {address:#04x} on an OPL2");
            return;
        }
        match register::decode(bank, address) {
            Some(register) => self.apply(register, value),
            None => trace!("Ignored write {value:#04x} to unused register {bank:?} {address:#04x}"),
        }
    }

    fn apply(&mut self, register: Register, val: u8) {
        match register {
            Register::Test => {
                let enabled = val & 0x20 != 0;
                if enabled != self.waveform_select {
                    self.waveform_select = enabled;
                    self.update_waveform_masks();
                }
            }
            Register::Timer1 => self.timers.set_t1_reload(val),
            Register::Timer2 => self.timers.set_t2_reload(val),
            Register::TimerControl => self.timers.write_control(val),
            Register::Keyboard => {
                if (self.reg08 ^ val) & 0x80 != 0 {
                    debug!("OPL CSM mode {}", if val & 0x80 != 0 { "on" } else { "off" });
                }
                self.reg08 = val;
            }
            Register::Rhythm => self.write_bd(val),
            Register::FourOpEnable => {
                let mask = val & 0x3f;
                if mask != self.reg104 {
                    debug!("OPL3 four operator mask {mask:#04x}");
                    self.reg104 = mask;
                    self.update_all_synths();
                }
            }
            Register::Opl3Enable => {
                let active = val & 0x01 != 0;
                if active != self.opl3_active {
                    debug!("OPL3 mode {}", if active { "enabled" } else { "disabled" });
                    self.opl3_active = active;
                    self.update_waveform_masks();
                    self.update_all_synths();
                }
            }
            Register::Channel { channel, kind } => match kind {
                ChannelRegister::FrequencyLow => self.write_a0(channel, val),
                ChannelRegister::KeyBlock => self.write_b0(channel, val),
                ChannelRegister::FeedbackConnection => self.write_c0(channel, val),
            },
            Register::Operator {
                channel,
                slot,
                kind,
            } => {
                let mask = self.waveform_mask();
                let rates = &self.rates;
                let op = &mut self.channels[channel].op[slot];
                match kind {
                    OperatorRegister::Flags => op.write_20(rates, val),
                    OperatorRegister::Level => op.write_40(val),
                    OperatorRegister::AttackDecay => op.write_60(rates, val),
                    OperatorRegister::SustainRelease => op.write_80(rates, val),
                    OperatorRegister::Waveform => op.write_e0(val, mask),
                }
            }
        }
    }

    fn write_a0(&mut self, index: usize, val: u8) {
        if let Pairing::Secondary(_) = self.channels[index].pairing {
            trace!("Ignored frequency write to paired channel {index}");
            return;
        }
        let data = (self.channels[index].frequency_data() & 0x1f00) | val as u32;
        self.set_frequency(index, data);
    }

    fn write_b0(&mut self, index: usize, val: u8) {
        if let Pairing::Secondary(_) = self.channels[index].pairing {
            trace!("Ignored key/block write to paired channel {index}");
            return;
        }
        let data = (self.channels[index].frequency_data() & 0xff) | ((val as u32 & 0x1f) << 8);
        self.set_frequency(index, data);

        let channel = &mut self.channels[index];
        let change = (channel.reg_b0 ^ val) & 0x20 != 0;
        channel.reg_b0 = val;
        if !change {
            return;
        }
        let paired = matches!(channel.pairing, Pairing::Primary(_));
        let keyed = val & 0x20 != 0;
        let last = if paired { index + 3 } else { index };
        if paired {
            // the secondary's key bit tracks the pair so a later split keys it off
            let second = &mut self.channels[index + 3];
            second.reg_b0 = (second.reg_b0 & !0x20) | (val & 0x20);
        }
        for index in (index..=last).step_by(3) {
            if keyed {
                self.channels[index].key_on_ops(KEY_NORMAL);
            } else {
                self.channels[index].key_off_ops(KEY_NORMAL);
            }
        }
    }

    fn write_c0(&mut self, index: usize, val: u8) {
        if !self.channels[index].write_c0(val) {
            return;
        }
        self.update_synth(index);
        if let Some((_, primary)) = pair_slot(index) {
            self.update_synth(if primary { index + 3 } else { index - 3 });
        }
    }

    /// Apply new f-number/block bits to a channel and, when it leads a four
    /// operator pair, to its partner
    fn set_frequency(&mut self, index: usize, data: u32) {
        if data == self.channels[index].frequency_data() {
            return;
        }
        let full = expand_chan_data(data, self.reg08 & 0x40 != 0);
        self.channels[index].set_chan_data(&self.rates, full);
        if let Pairing::Primary(_) = self.channels[index].pairing {
            self.channels[index + 3].set_chan_data(&self.rates, full);
        }
    }

    /// Resolve pairing, synthesis mode and panning of one channel
    pub(crate) fn update_synth(&mut self, index: usize) {
        let pairing = match pair_slot(index) {
            Some((bit, primary)) if self.opl3_active && self.reg104 & bit != 0 => {
                if primary {
                    Pairing::Primary(bit)
                } else {
                    Pairing::Secondary(bit)
                }
            }
            _ => Pairing::Single,
        };
        let synth = match pairing {
            Pairing::Primary(_) => SynthMode::FourOp(FourOpAlgorithm::from_connections(
                self.channels[index].reg_c0,
                self.channels[index + 3].reg_c0,
            )),
            Pairing::Secondary(_) => SynthMode::FourOp(FourOpAlgorithm::from_connections(
                self.channels[index - 3].reg_c0,
                self.channels[index].reg_c0,
            )),
            Pairing::Single if self.channels[index].role != ChannelRole::Melodic => {
                SynthMode::Percussion
            }
            Pairing::Single if self.channels[index].reg_c0 & 0x01 != 0 => SynthMode::Am,
            Pairing::Single => SynthMode::Fm,
        };

        let channel = &mut self.channels[index];
        channel.pairing = pairing;
        channel.synth = synth;
        if self.opl3_active {
            channel.left = channel.reg_c0 & 0x10 != 0;
            channel.right = channel.reg_c0 & 0x20 != 0;
        } else {
            channel.left = true;
            channel.right = true;
        }
    }

    fn update_all_synths(&mut self) {
        for index in 0..OPL3_CHANNELS {
            self.update_synth(index);
        }
    }

    /// Waveforms selectable through 0xE0
    fn waveform_mask(&self) -> u8 {
        if self.opl3_active {
            0x07
        } else if self.waveform_select {
            0x03
        } else {
            0x00
        }
    }

    fn update_waveform_masks(&mut self) {
        let mask = self.waveform_mask();
        for op in self.channels.iter_mut().flat_map(|ch| ch.op.iter_mut()) {
            op.set_waveform_mask(mask);
        }
    }

    fn csm_enabled(&self) -> bool {
        self.reg08 & 0x80 != 0
    }

    /// Key every melodic bank 0 channel on or off from the CSM source
    fn csm_key(&mut self, on: bool) {
        for channel in &mut self.channels[..OPL2_CHANNELS] {
            if channel.role != ChannelRole::Melodic {
                continue;
            }
            if on {
                channel.key_on_ops(KEY_CSM);
            } else {
                channel.key_off_ops(KEY_CSM);
            }
        }
    }

    /// Samples per output frame
    fn output_width(&self) -> usize {
        self.config.channels as usize
    }

    /// Render up to `remaining` frames into the mix buffer.
    ///
    /// Blocks end early at LFO steps and timer 1 overflows in CSM mode so
    /// both take effect on the exact sample.
    fn render_block(&mut self, remaining: usize) -> usize {
        let mut limit = remaining.min(MIX_BLOCK);
        if self.csm_key_held {
            limit = 1;
        } else if self.csm_enabled() {
            if let Some(until) = self.timers.samples_until_t1() {
                limit = limit.min(until.max(1));
            }
        }

        let samples = self.lfo.forward(limit as u32) as usize;
        self.mix[..samples * 2].fill(0);
        self.render_channels(samples);

        let t1_overflow = self.timers.advance(samples);
        if self.csm_key_held {
            self.csm_key(false);
            self.csm_key_held = false;
        }
        if t1_overflow && self.csm_enabled() {
            self.csm_key(true);
            self.csm_key_held = true;
        }
        self.ticks += samples as u64;
        samples
    }

    fn render_channels(&mut self, samples: usize) {
        let count = if self.opl3_active {
            OPL3_CHANNELS
        } else {
            OPL2_CHANNELS
        };
        let mix = &mut self.mix[..samples * 2];
        for index in 0..count {
            let channel = &self.channels[index];
            match (channel.role, channel.pairing) {
                (ChannelRole::BassDrum, _) => rhythm::generate_percussion(
                    &mut self.channels[6..9],
                    &mut self.noise,
                    &self.lfo,
                    samples,
                    mix,
                ),
                (ChannelRole::HiHatSnare | ChannelRole::TomCymbal, _)
                | (_, Pairing::Secondary(_)) => {}
                (_, Pairing::Primary(_)) => {
                    let (head, tail) = self.channels.split_at_mut(index + 3);
                    head[index].generate_four_op(&mut tail[0], &self.lfo, samples, mix);
                }
                (_, Pairing::Single) => self.channels[index].generate(&self.lfo, samples, mix),
            }
        }
    }

    /// Fill `out` with `frames` frames of signed 16 bit PCM.
    ///
    /// An OPL2 writes one sample per frame, an OPL3 interleaved left/right
    /// pairs.
    pub fn generate(&mut self, out: &mut [i16], frames: usize) -> Result<()> {
        let width = self.output_width();
        let needed = frames.checked_mul(width).unwrap_or(usize::MAX);
        if out.len() < needed {
            return Err(OplError::BufferTooSmall {
                needed,
                available: out.len(),
            });
        }
        let mut done = 0;
        while done < frames {
            let samples = self.render_block(frames - done);
            mixer::write_i16(
                &self.mix[..samples * 2],
                &mut out[done * width..(done + samples) * width],
                width,
            );
            done += samples;
        }
        Ok(())
    }

    /// Fill `out` with `frames` frames encoded in the configured sample size
    pub fn generate_bytes(&mut self, out: &mut [u8], frames: usize) -> Result<()> {
        let format = self.config.sample_format();
        let width = self.output_width();
        let stride = width * format.bytes();
        let needed = frames.checked_mul(stride).unwrap_or(usize::MAX);
        if out.len() < needed {
            return Err(OplError::BufferTooSmall {
                needed,
                available: out.len(),
            });
        }
        let mut done = 0;
        while done < frames {
            let samples = self.render_block(frames - done);
            mixer::write_bytes(
                &self.mix[..samples * 2],
                &mut out[done * stride..(done + samples) * stride],
                width,
                format,
            );
            done += samples;
        }
        Ok(())
    }

    /// Status register: IRQ and timer flags. An OPL2 also reports its
    /// constant low bits, the usual OPL2/OPL3 detection signature.
    pub fn read_status(&self) -> u8 {
        let status = self.timers.status();
        match self.mode() {
            ChipMode::Opl2 => status | 0x06,
            ChipMode::Opl3 => status,
        }
    }

    /// A channel of this chip, 0-8 for an OPL2 and 0-17 for an OPL3
    pub fn channel(&self, index: usize) -> Option<&Channel> {
        let count = match self.mode() {
            ChipMode::Opl2 => OPL2_CHANNELS,
            ChipMode::Opl3 => OPL3_CHANNELS,
        };
        self.channels[..count].get(index)
    }

    pub fn is_opl3_active(&self) -> bool {
        self.opl3_active
    }

    /// Frames generated since construction or the last reset
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn config(&self) -> &ChipConfig {
        &self.config
    }

    pub fn mode(&self) -> ChipMode {
        self.config.mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EnvelopeStage;

    fn opl3() -> Chip {
        Chip::new(ChipConfig::opl3(49716)).unwrap()
    }

    #[test]
    fn rejects_bad_config() {
        assert!(matches!(
            Chip::with_channels(1000, 2),
            Err(OplError::InvalidConfiguration(_))
        ));
        assert!(Chip::with_channels(44100, 0).is_err());
        assert_eq!(Chip::with_channels(44100, 1).unwrap().mode(), ChipMode::Opl2);
    }

    #[test]
    fn pair_slots() {
        assert_eq!(pair_slot(0), Some((0x01, true)));
        assert_eq!(pair_slot(5), Some((0x04, false)));
        assert_eq!(pair_slot(9), Some((0x08, true)));
        assert_eq!(pair_slot(14), Some((0x20, false)));
        assert_eq!(pair_slot(6), None);
        assert_eq!(pair_slot(17), None);
    }

    #[test]
    fn four_op_pairing_needs_opl3_mode() {
        let mut chip = opl3();
        chip.write_reg(0x104, 0x01);
        assert_eq!(chip.channels[0].pairing, Pairing::Single);

        chip.write_reg(0x105, 0x01);
        assert_eq!(chip.channels[0].pairing, Pairing::Primary(0x01));
        assert_eq!(chip.channels[3].pairing, Pairing::Secondary(0x01));
        assert_eq!(
            chip.channels[0].synth,
            SynthMode::FourOp(FourOpAlgorithm::FmFm)
        );

        chip.write(0xC3, 0x01);
        assert_eq!(
            chip.channels[0].synth,
            SynthMode::FourOp(FourOpAlgorithm::FmAm)
        );
    }

    #[test]
    fn paired_channel_follows_primary() {
        let mut chip = opl3();
        chip.write_reg(0x105, 0x01);
        chip.write_reg(0x104, 0x01);

        // writes to the second half are ignored
        chip.write(0xA3, 0x55);
        assert_eq!(chip.channels[3].frequency_number(), 0);

        chip.write(0xA0, 0x57);
        chip.write(0xB0, 0x31);
        assert_eq!(chip.channels[3].frequency_number(), 0x157);
        assert_eq!(chip.channels[3].block(), 4);
        assert!(chip.channels[3].op[0].is_keyed());
        assert!(chip.channels[3].op[1].is_keyed());

        chip.write(0xB0, 0x11);
        assert!(!chip.channels[3].op[1].is_keyed());
    }

    #[test]
    fn split_pair_keys_off_second_half() {
        let mut chip = opl3();
        chip.write_reg(0x105, 0x01);
        chip.write_reg(0x104, 0x01);
        chip.write(0xA0, 0x57);
        chip.write(0xB0, 0x31);
        assert!(chip.channels[3].key_on());

        chip.write_reg(0x104, 0x00);
        assert_eq!(chip.channels[3].pairing, Pairing::Single);
        chip.write(0xB0, 0x11);
        chip.write(0xB3, 0x11);
        assert!(!chip.channels[0].op[1].is_keyed());
        assert!(!chip.channels[3].op[0].is_keyed());
        assert!(!chip.channels[3].op[1].is_keyed());
    }

    #[test]
    fn huge_frame_count_is_an_error() {
        let mut chip = opl3();
        let mut out = [0i16; 16];
        assert!(matches!(
            chip.generate(&mut out, usize::MAX / 2 + 1),
            Err(OplError::BufferTooSmall { available: 16, .. })
        ));
        let mut bytes = [0u8; 16];
        assert!(matches!(
            chip.generate_bytes(&mut bytes, usize::MAX / 2),
            Err(OplError::BufferTooSmall { available: 16, .. })
        ));
        assert_eq!(chip.ticks, 0);
    }

    #[test]
    fn panning_only_in_opl3_mode() {
        let mut chip = opl3();
        chip.write(0xC0, 0x20);
        assert!(chip.channels[0].left() && chip.channels[0].right());
        chip.write_reg(0x105, 0x01);
        assert!(!chip.channels[0].left() && chip.channels[0].right());
    }

    #[test]
    fn waveform_select() {
        let mut chip = Chip::new(ChipConfig::opl2(44100)).unwrap();
        chip.write(0xE0, 0x03);
        assert_eq!(chip.channels[0].op[0].waveform(), crate::Waveform::Sine);
        chip.write(0x01, 0x20);
        assert_eq!(chip.channels[0].op[0].waveform(), crate::Waveform::PulseSine);

        let mut chip = opl3();
        chip.write(0xE0, 0x07);
        chip.write_reg(0x105, 0x01);
        assert_eq!(
            chip.channels[0].op[0].waveform(),
            crate::Waveform::DerivedSquare
        );
    }

    #[test]
    fn high_bank_ignored_on_opl2() {
        let mut chip = Chip::new(ChipConfig::opl2(44100)).unwrap();
        chip.write_reg(0x105, 0x01);
        assert!(!chip.is_opl3_active());
        assert!(chip.channel(9).is_none());
    }

    #[test]
    fn rhythm_mode_roles() {
        let mut chip = opl3();
        chip.write(0xBD, 0x20);
        assert!(chip.rhythm_enabled());
        assert_eq!(chip.channels[6].role(), ChannelRole::BassDrum);
        assert_eq!(chip.channels[8].synth(), SynthMode::Percussion);

        chip.write(0xBD, 0x31);
        assert!(chip.channels[6].op[1].is_keyed());
        assert!(chip.channels[7].op[0].is_keyed());
        assert!(!chip.channels[7].op[1].is_keyed());

        chip.write(0xBD, 0x00);
        assert_eq!(chip.channels[6].role(), ChannelRole::Melodic);
        assert_eq!(chip.channels[6].synth(), SynthMode::Fm);
        assert!(!chip.channels[6].op[0].is_keyed());
    }

    #[test]
    fn reset_restores_power_on() {
        let mut chip = opl3();
        let fresh = format!("{chip:?}");
        chip.write_reg(0x105, 0x01);
        chip.write(0x63, 0xF0);
        chip.write(0xB0, 0x31);
        let mut out = vec![0i16; 256];
        chip.generate(&mut out, 128).unwrap();
        chip.reset();
        assert_eq!(format!("{chip:?}"), fresh);
        assert_eq!(chip.ticks(), 0);
    }

    #[test]
    fn csm_keys_on_timer_overflow() {
        let mut chip = Chip::new(ChipConfig::opl2(49716)).unwrap();
        chip.write(0x02, 0xF0);
        chip.write(0x08, 0x80);
        chip.write(0x04, 0x01);

        // 16 counts of 4 chip samples each
        let mut out = vec![0i16; 64];
        chip.generate(&mut out, 64).unwrap();
        assert!(chip.csm_key_held);
        assert_eq!(chip.channels[0].op[0].envelope_stage(), EnvelopeStage::Attack);

        chip.generate(&mut out, 1).unwrap();
        assert!(!chip.csm_key_held);
        assert!(!chip.channels[0].op[0].is_keyed());
    }
}
