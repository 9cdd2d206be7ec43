//! Native implementations of the IEC standard function blocks. Each
//! instance is invoked at most once per statement execution and reads the
//! clock sample taken at scan start.

use plx_core::stdfb::StdFb;
use plx_core::time::IecDuration;
use plx_core::value::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerMode {
    /// On-delay: Q rises after IN has been true for PT.
    Ton,
    /// Off-delay: Q falls after IN has been false for PT.
    Tof,
    /// Pulse: Q true for exactly PT from a rising edge of IN.
    Tp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerState {
    pub mode: TimerMode,
    pub input: bool,
    pub q: bool,
    pub pt_ns: i64,
    pub et_ns: i64,
    start_ns: Option<i64>,
}

impl TimerState {
    pub fn new(mode: TimerMode) -> Self {
        Self {
            mode,
            input: false,
            q: false,
            pt_ns: 0,
            et_ns: 0,
            start_ns: None,
        }
    }

    pub fn invoke(&mut self, input: Option<bool>, pt: Option<IecDuration>, now_ns: i64) {
        let input = input.unwrap_or(self.input);
        if let Some(pt) = pt {
            self.pt_ns = pt.as_nanos();
        }
        match self.mode {
            TimerMode::Ton => {
                if input {
                    if !self.input {
                        self.start_ns = Some(now_ns);
                    }
                    if let Some(start) = self.start_ns {
                        let elapsed = now_ns - start;
                        self.et_ns = elapsed.min(self.pt_ns);
                        self.q = elapsed >= self.pt_ns;
                    }
                } else {
                    self.start_ns = None;
                    self.et_ns = 0;
                    self.q = false;
                }
            }
            TimerMode::Tof => {
                if input {
                    self.start_ns = None;
                    self.et_ns = 0;
                    self.q = true;
                } else {
                    if self.input {
                        self.start_ns = Some(now_ns);
                    }
                    if let Some(start) = self.start_ns {
                        let elapsed = now_ns - start;
                        self.et_ns = elapsed.min(self.pt_ns);
                        if elapsed >= self.pt_ns {
                            self.q = false;
                        }
                    }
                }
            }
            TimerMode::Tp => {
                if input && !self.input && self.start_ns.is_none() {
                    self.start_ns = Some(now_ns);
                }
                if let Some(start) = self.start_ns {
                    let elapsed = now_ns - start;
                    if elapsed < self.pt_ns {
                        self.q = true;
                        self.et_ns = elapsed;
                    } else {
                        self.q = false;
                        self.et_ns = self.pt_ns;
                        // The pulse is over; re-arm once IN is low again.
                        if !input {
                            self.start_ns = None;
                        }
                    }
                } else {
                    self.q = false;
                }
            }
        }
        self.input = input;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrigState {
    pub rising: bool,
    pub q: bool,
    prev: bool,
}

impl TrigState {
    pub fn new(rising: bool) -> Self {
        Self {
            rising,
            q: false,
            prev: false,
        }
    }

    pub fn invoke(&mut self, clk: Option<bool>) {
        let clk = clk.unwrap_or(self.prev);
        self.q = if self.rising {
            clk && !self.prev
        } else {
            !clk && self.prev
        };
        self.prev = clk;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    pub up: bool,
    pub cv: i64,
    pub pv: i64,
    pub q: bool,
    prev_clk: bool,
}

impl CounterState {
    pub fn new(up: bool) -> Self {
        Self {
            up,
            cv: 0,
            pv: 0,
            q: false,
            prev_clk: false,
        }
    }

    /// `gate` is R for CTU and LD for CTD; it dominates the clock.
    pub fn invoke(&mut self, clk: Option<bool>, gate: Option<bool>, pv: Option<i64>) {
        let clk = clk.unwrap_or(self.prev_clk);
        if let Some(pv) = pv {
            self.pv = pv;
        }
        if self.up {
            if gate.unwrap_or(false) {
                self.cv = 0;
            } else if clk && !self.prev_clk && self.cv < self.pv {
                self.cv += 1;
            }
            self.q = self.cv >= self.pv;
        } else {
            if gate.unwrap_or(false) {
                self.cv = self.pv;
            } else if clk && !self.prev_clk && self.cv > 0 {
                self.cv -= 1;
            }
            self.q = self.cv <= 0;
        }
        self.prev_clk = clk;
    }
}

/// State of one standard FB instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StdFbState {
    Timer(TimerState),
    Trig(TrigState),
    Counter(CounterState),
}

impl StdFbState {
    pub fn new(kind: StdFb) -> Self {
        match kind {
            StdFb::Ton => StdFbState::Timer(TimerState::new(TimerMode::Ton)),
            StdFb::Tof => StdFbState::Timer(TimerState::new(TimerMode::Tof)),
            StdFb::Tp => StdFbState::Timer(TimerState::new(TimerMode::Tp)),
            StdFb::RTrig => StdFbState::Trig(TrigState::new(true)),
            StdFb::FTrig => StdFbState::Trig(TrigState::new(false)),
            StdFb::Ctu => StdFbState::Counter(CounterState::new(true)),
            StdFb::Ctd => StdFbState::Counter(CounterState::new(false)),
        }
    }

    /// Read an output (or latched input) pin by name.
    pub fn pin(&self, name: &str) -> Option<Value> {
        match self {
            StdFbState::Timer(t) => match name {
                "Q" => Some(Value::Bool(t.q)),
                "ET" => Some(Value::Time(IecDuration::from_nanos(t.et_ns))),
                "IN" => Some(Value::Bool(t.input)),
                "PT" => Some(Value::Time(IecDuration::from_nanos(t.pt_ns))),
                _ => None,
            },
            StdFbState::Trig(t) => match name {
                "Q" => Some(Value::Bool(t.q)),
                _ => None,
            },
            StdFbState::Counter(c) => match name {
                "Q" => Some(Value::Bool(c.q)),
                "CV" => Some(Value::Int(c.cv as i16)),
                "PV" => Some(Value::Int(c.pv as i16)),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: i64 = 1_000_000_000;

    #[test]
    fn ton_waits_for_preset() {
        let mut t = TimerState::new(TimerMode::Ton);
        t.invoke(Some(true), Some(IecDuration::from_seconds(5)), 0);
        assert!(!t.q);
        t.invoke(Some(true), None, 5 * SEC);
        assert!(t.q);
        t.invoke(Some(false), None, 6 * SEC);
        assert!(!t.q);
    }

    #[test]
    fn ton_zero_preset_fires_same_scan() {
        let mut t = TimerState::new(TimerMode::Ton);
        t.invoke(Some(true), Some(IecDuration::ZERO), 42);
        assert!(t.q);
    }

    #[test]
    fn tof_holds_through_dropout() {
        let mut t = TimerState::new(TimerMode::Tof);
        t.invoke(Some(true), Some(IecDuration::from_seconds(3)), 0);
        assert!(t.q);
        t.invoke(Some(false), None, SEC);
        assert!(t.q);
        t.invoke(Some(false), None, 4 * SEC);
        assert!(!t.q);
    }

    #[test]
    fn tp_is_not_retriggerable() {
        let mut t = TimerState::new(TimerMode::Tp);
        t.invoke(Some(true), Some(IecDuration::from_seconds(2)), 0);
        assert!(t.q);
        // A second rising edge during the pulse does not extend it.
        t.invoke(Some(false), None, SEC);
        assert!(t.q);
        t.invoke(Some(true), None, 3 * SEC / 2);
        assert!(t.q);
        t.invoke(Some(true), None, 3 * SEC);
        assert!(!t.q);
    }

    #[test]
    fn rtrig_single_pulse() {
        let mut t = TrigState::new(true);
        t.invoke(Some(false));
        assert!(!t.q);
        t.invoke(Some(true));
        assert!(t.q);
        t.invoke(Some(true));
        assert!(!t.q);
    }

    #[test]
    fn ctu_clamps_and_resets() {
        let mut c = CounterState::new(true);
        for _ in 0..5 {
            c.invoke(Some(true), Some(false), Some(3));
            c.invoke(Some(false), Some(false), None);
        }
        assert_eq!(c.cv, 3);
        assert!(c.q);
        c.invoke(Some(false), Some(true), None);
        assert_eq!(c.cv, 0);
        assert!(!c.q);
    }

    #[test]
    fn ctd_counts_down_from_load() {
        let mut c = CounterState::new(false);
        c.invoke(Some(false), Some(true), Some(2));
        assert_eq!(c.cv, 2);
        assert!(!c.q);
        c.invoke(Some(true), Some(false), None);
        c.invoke(Some(false), Some(false), None);
        c.invoke(Some(true), Some(false), None);
        assert_eq!(c.cv, 0);
        assert!(c.q);
    }
}
