//! The two chip timers and the status register.
//!
//! Timer 1 counts in 80 µs steps (4 chip samples), timer 2 in 320 µs steps
//! (16 chip samples). Both count up from their reload value and flag an
//! overflow at 256. Time only passes while samples are generated.

/// Fraction bits of the timer counters
const TIMER_SH: u32 = 16;

#[derive(Debug, Clone)]
pub struct Timer {
    /// Chip samples per count
    period: u64,
    reload: u8,
    running: bool,
    masked: bool,
    overflow: bool,
    /// Chip time left until overflow, fixed point
    remaining: u64,
}

impl Timer {
    fn new(period: u64) -> Self {
        Self {
            period,
            reload: 0,
            running: false,
            masked: false,
            overflow: false,
            remaining: 0,
        }
    }

    fn span(&self) -> u64 {
        ((256 - self.reload as u64) * self.period) << TIMER_SH
    }

    fn start(&mut self) {
        if !self.running {
            self.running = true;
            self.remaining = self.span();
        }
    }

    /// Returns the number of overflows during `elapsed` fixed point chip time
    fn advance(&mut self, mut elapsed: u64) -> u32 {
        if !self.running {
            return 0;
        }
        let mut overflows = 0;
        while elapsed >= self.remaining {
            elapsed -= self.remaining;
            self.remaining = self.span();
            overflows += 1;
        }
        self.remaining -= elapsed;
        if overflows > 0 && !self.masked {
            self.overflow = true;
        }
        overflows
    }

    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    pub fn running(&self) -> bool {
        self.running
    }
}

#[derive(Debug, Clone)]
pub struct Timers {
    pub t1: Timer,
    pub t2: Timer,
    /// Chip time per output sample, fixed point
    step: u64,
}

impl Timers {
    pub fn new(scale: f64) -> Self {
        Self {
            t1: Timer::new(4),
            t2: Timer::new(16),
            step: (scale * (1u64 << TIMER_SH) as f64).round() as u64,
        }
    }

    /// Register 0x02
    pub fn set_t1_reload(&mut self, val: u8) {
        self.t1.reload = val;
    }

    /// Register 0x03
    pub fn set_t2_reload(&mut self, val: u8) {
        self.t2.reload = val;
    }

    /// Register 0x04: IRQ reset, masks and start bits
    pub fn write_control(&mut self, val: u8) {
        if val & 0x80 != 0 {
            self.t1.overflow = false;
            self.t2.overflow = false;
            return;
        }
        self.t1.masked = val & 0x40 != 0;
        self.t2.masked = val & 0x20 != 0;
        if val & 0x01 != 0 {
            self.t1.start();
        } else {
            self.t1.running = false;
        }
        if val & 0x02 != 0 {
            self.t2.start();
        } else {
            self.t2.running = false;
        }
    }

    /// Advance both timers by `samples` output samples, returning true if
    /// timer 1 overflowed
    pub fn advance(&mut self, samples: usize) -> bool {
        let elapsed = self.step * samples as u64;
        self.t2.advance(elapsed);
        self.t1.advance(elapsed) > 0
    }

    /// Output samples until timer 1 overflows, `None` while it is stopped
    pub fn samples_until_t1(&self) -> Option<usize> {
        if !self.t1.running || self.step == 0 {
            return None;
        }
        Some(self.t1.remaining.div_ceil(self.step) as usize)
    }

    /// Status bits: 7 IRQ, 6 timer 1, 5 timer 2
    pub fn status(&self) -> u8 {
        let mut status = 0;
        if self.t1.overflow {
            status |= 0x40;
        }
        if self.t2.overflow {
            status |= 0x20;
        }
        if status != 0 {
            status |= 0x80;
        }
        status
    }
}
