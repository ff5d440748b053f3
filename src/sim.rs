//! Logic simulator
//!
//! Step-wise behavioral evaluation of a [`LogicList`], used as the test
//! oracle: the observable output sequence must be identical before and
//! after optimization for the same input schedule.
//!
//! Per step: every external input takes its scheduled value (0 when the
//! schedule is silent), every FF output takes its previous-step input
//! value (the initial value on step 0), and combinational outputs are
//! evaluated by memoized recursive LUT evaluation. A signal with no
//! driver resolves to ⊥ (`None`) and ⊥ propagates through tables.
//!
//! The simulated list must be valid; simulation starts with a
//! validation run and refuses broken input.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::logic::{Def, LogicError, LogicList, SignalId, UseDef, ValidateFlags};

/// A simulated signal value: `Some(v)` or ⊥.
pub type Tri = Option<bool>;

/// Errors surfaced by the simulator.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Logic(#[from] LogicError),
    #[error("{signal} observed two distinct values in step {step}")]
    Conflict { signal: SignalId, step: usize },
}

/// Per-step values for the external inputs. Unspecified (input, step)
/// pairs default to 0.
#[derive(Clone, Debug, Default)]
pub struct InputSchedule {
    values: BTreeMap<SignalId, Vec<bool>>,
}

impl InputSchedule {
    /// Empty schedule: every input is 0 on every step.
    pub fn new() -> Self {
        InputSchedule::default()
    }

    /// Drive `signal` with `values[t]` on step `t` (0 past the end).
    pub fn drive(&mut self, signal: SignalId, values: Vec<bool>) {
        self.values.insert(signal, values);
    }

    /// The scheduled value for a given step.
    pub fn value(&self, signal: SignalId, step: usize) -> bool {
        self.values
            .get(&signal)
            .and_then(|v| v.get(step))
            .copied()
            .unwrap_or(false)
    }
}

/// The full signal history of a simulation run: one dense value vector
/// per step, indexed by signal id.
#[derive(Clone, Debug)]
pub struct History {
    steps: Vec<Vec<Tri>>,
}

impl History {
    /// Number of simulated steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when no steps were simulated.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Value of `signal` at `step`.
    pub fn value(&self, step: usize, signal: SignalId) -> Tri {
        self.steps[step][signal.0]
    }

    /// The whole trace of one signal.
    pub fn signal_trace(&self, signal: SignalId) -> Vec<Tri> {
        self.steps.iter().map(|s| s[signal.0]).collect()
    }

    /// Trace of the signal carrying an external-facing label.
    pub fn special_trace(&self, logic: &LogicList, name: &str) -> Option<Vec<Tri>> {
        logic.find_special(name).map(|s| self.signal_trace(s))
    }

    /// Read a little-endian unsigned value from bits labelled
    /// `{prefix}0..{prefix}{width-1}`. `None` when a bit is missing
    /// from the design or reads as ⊥.
    pub fn unsigned_value(
        &self,
        logic: &LogicList,
        prefix: &str,
        width: usize,
        step: usize,
    ) -> Option<u64> {
        let mut value = 0u64;
        for i in 0..width {
            let signal = logic.find_special(&format!("{prefix}{i}"))?;
            match self.value(step, signal) {
                Some(true) => value |= 1 << i,
                Some(false) => {}
                None => return None,
            }
        }
        Some(value)
    }

    /// The observable behavior: per labelled external output, its full
    /// trace. This is what optimization must preserve.
    pub fn observable(&self, logic: &LogicList) -> BTreeMap<String, Vec<Tri>> {
        let mut out = BTreeMap::new();
        for &s in &logic.external_outputs {
            if let Some(name) = &logic.signal(s).special_name {
                out.insert(name.clone(), self.signal_trace(s));
            }
        }
        out
    }

    /// Waveform rendering: one row per live signal (with driver/boundary
    /// flags), one column per step, `z` for ⊥.
    pub fn render(&self, logic: &LogicList) -> String {
        let use_def = UseDef::build(logic);
        let mut rows: Vec<(String, SignalId)> = Vec::new();
        for s in logic.live_signals() {
            let mut flags = String::new();
            match use_def.def(s) {
                Some(Def::Ff(_)) => flags.push('F'),
                Some(Def::Lut(_)) => flags.push('L'),
                Some(Def::ExternalInput) => flags.push('I'),
                None => {}
            }
            if logic.external_outputs.contains(&s) {
                flags.push('O');
            }
            rows.push((format!("{} {}", logic.describe(s), flags), s));
        }
        let width = rows.iter().map(|(n, _)| n.len()).max().unwrap_or(0);

        let mut out = String::new();
        // Time markers every 8 steps.
        let _ = write!(out, "{:width$}  ", "");
        for t in 0..self.len() {
            if t % 8 == 0 {
                let _ = write!(out, "|{t:<7}");
            }
        }
        out.push('\n');
        for (name, s) in rows {
            let _ = write!(out, "{name:width$}: ");
            for t in 0..self.len() {
                out.push(match self.value(t, s) {
                    Some(true) => '1',
                    Some(false) => '0',
                    None => 'z',
                });
            }
            out.push('\n');
        }
        out
    }
}

/// Run `steps` steps of the design under the given input schedule.
pub fn simulate(
    logic: &LogicList,
    schedule: &InputSchedule,
    steps: usize,
) -> Result<History, SimError> {
    logic.validate(ValidateFlags::default())?;
    let use_def = UseDef::build(logic);
    let n = logic.signal_len();

    let mut history: Vec<Vec<Tri>> = Vec::with_capacity(steps);

    for t in 0..steps {
        // None = not computed yet in this step.
        let mut state: Vec<Option<Tri>> = vec![None; n];

        for &s in &logic.external_inputs {
            assign(&mut state, s, Some(schedule.value(s, t)), t)?;
        }
        for ff in &logic.ffs {
            let value = match history.last() {
                None => Some(ff.init),
                Some(prev) => prev[ff.input.0],
            };
            assign(&mut state, ff.output, value, t)?;
        }
        for lut in &logic.luts {
            eval(logic, &use_def, &mut state, lut.output);
        }

        history.push(state.into_iter().map(|c| c.flatten()).collect());
    }

    Ok(History { steps: history })
}

fn assign(
    state: &mut [Option<Tri>],
    signal: SignalId,
    value: Tri,
    step: usize,
) -> Result<(), SimError> {
    match state[signal.0] {
        Some(existing) if existing != value => Err(SimError::Conflict { signal, step }),
        _ => {
            state[signal.0] = Some(value);
            Ok(())
        }
    }
}

/// Memoized recursive evaluation on the current step. Termination is
/// guaranteed by the combinational-cycle check in validation.
fn eval(
    logic: &LogicList,
    use_def: &UseDef,
    state: &mut Vec<Option<Tri>>,
    signal: SignalId,
) -> Tri {
    if let Some(value) = state[signal.0] {
        return value;
    }
    let value: Tri = match use_def.def(signal) {
        Some(Def::Lut(i)) => {
            let lut = &logic.luts[i];
            let mut values = Vec::with_capacity(lut.inputs.len());
            let mut known = true;
            for &input in &lut.inputs {
                match eval(logic, use_def, state, input) {
                    Some(v) => values.push(v),
                    None => {
                        known = false;
                        break;
                    }
                }
            }
            if known {
                Some(lut.eval(&values))
            } else {
                None
            }
        }
        // FFs and external inputs were assigned up front; anything else
        // is undriven and reads as high impedance.
        _ => None,
    };
    state[signal.0] = Some(value);
    value
}
