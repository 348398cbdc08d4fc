//! Chip construction parameters, loadable from and savable to RON.

use log::warn;
use nanoserde::{DeRon, SerRon};

use crate::{OplError, Result};

/// Lowest accepted output rate in Hz
pub const MIN_SAMPLE_RATE: u32 = 8000;
/// Highest accepted output rate in Hz
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Which chip is emulated, picked by the number of output channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipMode {
    /// YM3812: 9 channels, 4 waveforms, mono output
    Opl2,
    /// YMF262: 18 channels, 8 waveforms, stereo output
    Opl3,
}

/// Layout of one sample in the byte output path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Unsigned 8 bit, centred on 128
    U8,
    /// Signed 16 bit little endian
    S16Le,
}

impl SampleFormat {
    pub fn bytes(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16Le => 2,
        }
    }
}

/// Construction parameters for a [`crate::Chip`].
///
/// Kept to plain integers so the RON form stays readable:
///
/// ```text
/// (sample_rate:44100,channels:2,sample_size:2)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, DeRon, SerRon)]
pub struct ChipConfig {
    /// Output rate in Hz
    pub sample_rate: u32,
    /// 1 emulates an OPL2, 2 an OPL3
    pub channels: u8,
    /// Bytes per sample for [`crate::Chip::generate_bytes`], 1 or 2
    pub sample_size: u8,
}

impl Default for ChipConfig {
    fn default() -> Self {
        Self {
            sample_rate: crate::OPL_RATE.round() as u32,
            channels: 2,
            sample_size: 2,
        }
    }
}

impl ChipConfig {
    /// A mono OPL2 at the given rate with 16 bit samples
    pub fn opl2(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            sample_size: 2,
        }
    }

    /// A stereo OPL3 at the given rate with 16 bit samples
    pub fn opl3(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 2,
            sample_size: 2,
        }
    }

    pub fn with_sample_size(mut self, sample_size: u8) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Rejects rates and layouts the chip can't render
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            warn!("Rejected OPL sample rate {}", self.sample_rate);
            return Err(OplError::InvalidConfiguration(format!(
                "sample rate {} outside {}..={}",
                self.sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
            )));
        }
        if !matches!(self.channels, 1 | 2) {
            warn!("Rejected OPL channel count {}", self.channels);
            return Err(OplError::InvalidConfiguration(format!(
                "{} output channels, expected 1 (OPL2) or 2 (OPL3)",
                self.channels
            )));
        }
        if !matches!(self.sample_size, 1 | 2) {
            warn!("Rejected OPL sample size {}", self.sample_size);
            return Err(OplError::InvalidConfiguration(format!(
                "{} byte samples, expected 1 or 2",
                self.sample_size
            )));
        }
        Ok(())
    }

    pub fn mode(&self) -> ChipMode {
        if self.channels == 1 {
            ChipMode::Opl2
        } else {
            ChipMode::Opl3
        }
    }

    pub fn sample_format(&self) -> SampleFormat {
        if self.sample_size == 1 {
            SampleFormat::U8
        } else {
            SampleFormat::S16Le
        }
    }

    /// Parse and validate a RON config
    pub fn from_ron(data: &str) -> Result<Self> {
        let config =
            ChipConfig::deserialize_ron(data).map_err(|e| OplError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_ron(&self) -> String {
        self.serialize_ron()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_native_opl3() {
        let config = ChipConfig::default();
        assert_eq!(config.sample_rate, 49716);
        assert_eq!(config.mode(), ChipMode::Opl3);
        assert_eq!(config.sample_format(), SampleFormat::S16Le);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(ChipConfig::opl2(0).validate().is_err());
        assert!(ChipConfig::opl2(7999).validate().is_err());
        assert!(ChipConfig::opl3(192_001).validate().is_err());
        assert!(ChipConfig::opl3(192_000).validate().is_ok());

        let mut config = ChipConfig::opl3(44100);
        config.channels = 3;
        assert!(matches!(
            config.validate(),
            Err(OplError::InvalidConfiguration(_))
        ));

        let config = ChipConfig::opl2(44100).with_sample_size(4);
        assert!(config.validate().is_err());
    }

    #[test]
    fn ron_round_trip() {
        let config = ChipConfig::opl2(22050).with_sample_size(1);
        let ron = config.to_ron();
        let parsed = ChipConfig::from_ron(&ron).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.sample_format(), SampleFormat::U8);
        assert_eq!(parsed.mode(), ChipMode::Opl2);
    }

    #[test]
    fn ron_errors() {
        assert!(matches!(
            ChipConfig::from_ron("(sample_rate:"),
            Err(OplError::Config(_))
        ));
        assert!(matches!(
            ChipConfig::from_ron("(sample_rate:100,channels:2,sample_size:2)"),
            Err(OplError::InvalidConfiguration(_))
        ));
    }
}
