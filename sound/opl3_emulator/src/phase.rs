use crate::WAVE_SH;
use crate::lfo::Lfo;

/// Per operator phase accumulator.
///
/// The top 10 bits of `index` are the waveform position. The step is
/// `(fnum << block) * multiplier`, with the multiplier already scaled to the
/// output rate, and wraps freely since only the phase matters.
#[derive(Debug, Clone, Default)]
pub struct PhaseGenerator {
    index: u32,
    /// Step from frequency and multiplier
    add: u32,
    /// Step in use for the current block, `add` plus vibrato
    current: u32,
    /// Scaled frequency multiplier from register 0x20
    multiplier: u32,
    /// Top three f-number bits, the vibrato depth of this note
    vib_strength: u8,
    /// Full scale vibrato offset for this note
    vibrato: u32,
}

impl PhaseGenerator {
    pub fn set_multiplier(&mut self, multiplier: u32) {
        self.multiplier = multiplier;
    }

    /// Recompute the step for a new frequency
    ///
    /// # Arguments
    ///
    /// * `fnum` - 10 bit frequency number
    /// * `block` - octave, 0-7
    /// * `vibrato` - the operator takes part in the vibrato LFO
    pub fn update(&mut self, fnum: u32, block: u32, vibrato: bool) {
        self.add = (fnum << block).wrapping_mul(self.multiplier);
        if vibrato {
            self.vib_strength = (fnum >> 7) as u8;
            self.vibrato = ((self.vib_strength as u32) << block).wrapping_mul(self.multiplier);
        } else {
            self.vib_strength = 0;
            self.vibrato = 0;
        }
    }

    /// Apply the vibrato LFO for the next block of samples
    pub fn prepare(&mut self, lfo: &Lfo) {
        self.current = self.add;
        let shift = lfo.vibrato_shift() as u32;
        if (self.vib_strength as u32) >> shift != 0 {
            let neg = lfo.vibrato_sign();
            let add = (self.vibrato >> shift) as i32;
            let add = (add ^ neg) - neg;
            self.current = self.current.wrapping_add(add as u32);
        }
    }

    /// Step and return the 10 bit waveform position
    #[inline]
    pub fn forward(&mut self) -> u32 {
        self.index = self.index.wrapping_add(self.current);
        self.index >> WAVE_SH
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn phase(&self) -> u16 {
        (self.index >> WAVE_SH) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::RateTables;

    #[test]
    fn step_doubles_per_block() {
        let rates = RateTables::new(49716);
        let mut phase = PhaseGenerator::default();
        phase.set_multiplier(rates.freq_mul[1]);
        phase.update(0x157, 4, false);
        let low = phase.add;
        phase.update(0x157, 5, false);
        assert_eq!(phase.add, low * 2);
    }

    #[test]
    fn period_matches_frequency() {
        // fnum 0x200 block 4, multiplier 1: 49716 * 512 / 2^16 = 388 Hz
        let rates = RateTables::new(49716);
        let mut phase = PhaseGenerator::default();
        phase.set_multiplier(rates.freq_mul[1]);
        phase.update(0x200, 4, false);
        phase.prepare(&Lfo::new(rates.lfo_add));

        let mut wraps = 0;
        let mut last = 0;
        for _ in 0..49716 {
            let pos = phase.forward();
            if pos < last {
                wraps += 1;
            }
            last = pos;
        }
        assert!((386..=390).contains(&wraps), "{wraps} periods");
    }

    #[test]
    fn reset_restarts_phase() {
        let rates = RateTables::new(49716);
        let mut phase = PhaseGenerator::default();
        phase.set_multiplier(rates.freq_mul[2]);
        phase.update(0x300, 6, true);
        phase.prepare(&Lfo::new(rates.lfo_add));
        for _ in 0..100 {
            phase.forward();
        }
        assert_ne!(phase.phase(), 0);
        phase.reset();
        assert_eq!(phase.phase(), 0);
    }
}
