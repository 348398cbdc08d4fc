//! # Register Decoder
//!
//! Maps a `(bank, address)` pair to the state it controls. This is a pure
//! function of the address; the chip applies the value.
//!
//! Operator registers use the chip's slot layout: offsets 0x00-0x15 with
//! holes at 0x06, 0x07, 0x0E and 0x0F. Within each group of eight, offsets
//! 0-2 are the modulators of three consecutive channels and 3-5 their
//! carriers.

/// Register bank, selected by bit 8 of the address on an OPL3
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bank {
    /// OPL2 compatible registers, channels 0-8
    Low,
    /// OPL3 only, channels 9-17 plus 0x104/0x105
    High,
}

impl Bank {
    fn channel_base(self) -> usize {
        match self {
            Bank::Low => 0,
            Bank::High => 9,
        }
    }
}

impl From<u16> for Bank {
    fn from(address: u16) -> Self {
        if address & 0x100 != 0 {
            Bank::High
        } else {
            Bank::Low
        }
    }
}

/// Per channel register groups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRegister {
    /// 0xA0: f-number low byte
    FrequencyLow,
    /// 0xB0: key-on, block and f-number high bits
    KeyBlock,
    /// 0xC0: panning, feedback and connection
    FeedbackConnection,
}

/// Per operator register groups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorRegister {
    /// 0x20: tremolo, vibrato, EG-type, KSR, multiplier
    Flags,
    /// 0x40: key scale level and total level
    Level,
    /// 0x60: attack and decay rate
    AttackDecay,
    /// 0x80: sustain level and release rate
    SustainRelease,
    /// 0xE0: waveform select
    Waveform,
}

/// A decoded register address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// 0x01: waveform select enable
    Test,
    /// 0x02
    Timer1,
    /// 0x03
    Timer2,
    /// 0x04: timer start, mask and IRQ reset
    TimerControl,
    /// 0x08: CSM and note select
    Keyboard,
    /// 0xBD: LFO depth and rhythm mode
    Rhythm,
    /// 0x104: four operator pair enables
    FourOpEnable,
    /// 0x105: OPL3 mode
    Opl3Enable,
    Channel {
        channel: usize,
        kind: ChannelRegister,
    },
    Operator {
        channel: usize,
        slot: usize,
        kind: OperatorRegister,
    },
}

/// Channel and slot addressed by an operator offset, `None` for the holes
fn operator_slot(offset: u8) -> Option<(usize, usize)> {
    let column = (offset & 0x07) as usize;
    let row = (offset >> 3) as usize;
    if column > 5 || row > 2 {
        return None;
    }
    Some((row * 3 + column % 3, column / 3))
}

/// Decode one register address.
///
/// Returns `None` for addresses with no function, which the chip ignores.
pub fn decode(bank: Bank, address: u8) -> Option<Register> {
    let global = match (bank, address) {
        (Bank::Low, 0x01) => Some(Register::Test),
        (Bank::Low, 0x02) => Some(Register::Timer1),
        (Bank::Low, 0x03) => Some(Register::Timer2),
        (Bank::Low, 0x04) => Some(Register::TimerControl),
        (Bank::Low, 0x08) => Some(Register::Keyboard),
        (Bank::Low, 0xBD) => Some(Register::Rhythm),
        (Bank::High, 0x04) => Some(Register::FourOpEnable),
        (Bank::High, 0x05) => Some(Register::Opl3Enable),
        _ => None,
    };
    if global.is_some() {
        return global;
    }

    let kind = match address & 0xE0 {
        0x20 => OperatorRegister::Flags,
        0x40 => OperatorRegister::Level,
        0x60 => OperatorRegister::AttackDecay,
        0x80 => OperatorRegister::SustainRelease,
        0xE0 => OperatorRegister::Waveform,
        _ => {
            let kind = match address & 0xF0 {
                0xA0 => ChannelRegister::FrequencyLow,
                0xB0 => ChannelRegister::KeyBlock,
                0xC0 => ChannelRegister::FeedbackConnection,
                _ => return None,
            };
            let channel = (address & 0x0F) as usize;
            if channel > 8 {
                return None;
            }
            return Some(Register::Channel {
                channel: channel + bank.channel_base(),
                kind,
            });
        }
    };
    let (channel, slot) = operator_slot(address & 0x1F)?;
    Some(Register::Operator {
        channel: channel + bank.channel_base(),
        slot,
        kind,
    })
}

impl Register {
    /// The bank and address that decode to this register
    pub fn address(&self) -> (Bank, u8) {
        let split = |channel: usize| {
            if channel >= 9 {
                (Bank::High, channel - 9)
            } else {
                (Bank::Low, channel)
            }
        };
        match *self {
            Register::Test => (Bank::Low, 0x01),
            Register::Timer1 => (Bank::Low, 0x02),
            Register::Timer2 => (Bank::Low, 0x03),
            Register::TimerControl => (Bank::Low, 0x04),
            Register::Keyboard => (Bank::Low, 0x08),
            Register::Rhythm => (Bank::Low, 0xBD),
            Register::FourOpEnable => (Bank::High, 0x04),
            Register::Opl3Enable => (Bank::High, 0x05),
            Register::Channel { channel, kind } => {
                let (bank, channel) = split(channel);
                let base = match kind {
                    ChannelRegister::FrequencyLow => 0xA0,
                    ChannelRegister::KeyBlock => 0xB0,
                    ChannelRegister::FeedbackConnection => 0xC0,
                };
                (bank, base + channel as u8)
            }
            Register::Operator {
                channel,
                slot,
                kind,
            } => {
                let (bank, channel) = split(channel);
                let offset = (channel / 3) * 8 + channel % 3 + slot * 3;
                let base = match kind {
                    OperatorRegister::Flags => 0x20,
                    OperatorRegister::Level => 0x40,
                    OperatorRegister::AttackDecay => 0x60,
                    OperatorRegister::SustainRelease => 0x80,
                    OperatorRegister::Waveform => 0xE0,
                };
                (bank, base + offset as u8)
            }
        }
    }
}
