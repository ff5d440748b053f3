//! Logic IR: signals, lookup tables, flip-flops
//!
//! The gate-level intermediate representation. A [`LogicList`] owns flat
//! arrays of signals, LUTs and FFs; everything refers to everything else
//! through [`SignalId`] indices, so the naturally cyclic graph (FF loops
//! are legal) needs no object cross-references. Passes operate on ids and
//! delete by filtering the arrays; removed signals stay in the signal
//! array as dead entries so the ids of the survivors never move.
//!
//! ## Invariants (checked by [`LogicList::validate`])
//!
//! - Every signal referenced by a LUT, FF, external marker or staged
//!   connection is in bounds and alive.
//! - Every signal has at most one driver: one LUT output, one FF output,
//!   or an external-input mark.
//! - The subgraph induced by LUT inputs → outputs is acyclic. FFs break
//!   cycles and do not participate in the check.
//! - `table.len() == 2^inputs.len()` for every LUT; table indexing is
//!   little-endian (the entry at index Σᵢ bᵢ·2ⁱ is the output when
//!   `inputs[i] = bᵢ`).
//! - Validation and optimization fail fast while a builder scope is open.
//!
//! Signal identifiers are indices into the owning list, so uniqueness is
//! structural; the remaining hazard is using an id from a different list,
//! which the bounds/liveness checks catch in practice.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::fmt;

use crate::canon::canonicalize;

/// Index of a signal in its owning [`LogicList`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalId(pub usize);

impl SignalId {
    /// Access the underlying index.
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signal({})", self.0)
    }
}

/// Per-signal attributes. The id itself is the position in the array.
#[derive(Clone, Debug)]
pub struct SignalInfo {
    /// Free-form debug names accumulated through merges.
    pub debug_names: BTreeSet<String>,
    /// External-facing label, reserved for signals visible at the
    /// boundary of the design. Survives optimization.
    pub special_name: Option<String>,
    alive: bool,
}

impl SignalInfo {
    fn new(debug_name: Option<&str>) -> Self {
        let mut debug_names = BTreeSet::new();
        if let Some(name) = debug_name {
            debug_names.insert(name.to_owned());
        }
        SignalInfo { debug_names, special_name: None, alive: true }
    }

    /// Whether the signal still exists (merged/deleted signals stay in
    /// the array as dead entries).
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.alive
    }
}

/// Combinational lookup table: `output = table[Σᵢ inputs[i]·2ⁱ]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lut {
    /// The driven signal.
    pub output: SignalId,
    /// Ordered inputs, lowest index = least significant table bit.
    pub inputs: Vec<SignalId>,
    /// `2^inputs.len()` entries, little-endian indexed.
    pub table: Vec<bool>,
}

impl Lut {
    /// Evaluate the table for fully known input values.
    /// Length mismatches are a structural error caught by validation.
    pub fn eval(&self, values: &[bool]) -> bool {
        let mut index = 0usize;
        for (i, &v) in values.iter().enumerate() {
            if v {
                index |= 1 << i;
            }
        }
        self.table[index]
    }
}

/// Edge-triggered D flip-flop with a simulation-time initial value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ff {
    /// Output value on the very first simulation step.
    pub init: bool,
    /// Sampled signal.
    pub input: SignalId,
    /// The driven signal.
    pub output: SignalId,
}

/// Structural errors surfaced by validation.
#[derive(Debug, thiserror::Error)]
pub enum LogicError {
    #[error("validation requested while {0} builder scope(s) are still open")]
    BuilderOpen(usize),
    #[error("{context} references {signal}, which does not exist in this list")]
    DanglingSignal { signal: SignalId, context: &'static str },
    #[error("{signal} has more than one driver")]
    MultipleDrivers { signal: SignalId },
    #[error("{signal} is marked as external input but is driven by a component")]
    DrivenExternalInput { signal: SignalId },
    #[error("LUT #{lut} has {inputs} input(s) but a table of {table} entries")]
    TableSize { lut: usize, inputs: usize, table: usize },
    #[error("combinational cycle through {}", format_cycle(.path))]
    CombinationalCycle { path: Vec<SignalId> },
}

fn format_cycle(path: &[SignalId]) -> String {
    let mut out = String::new();
    for (i, s) in path.iter().enumerate() {
        if i > 0 {
            out.push_str(" -> ");
        }
        out.push_str(&s.to_string());
    }
    out
}

/// Which non-fatal diagnostics [`LogicList::validate`] should collect.
#[derive(Copy, Clone, Debug, Default)]
pub struct ValidateFlags {
    /// Report signals that are driven but never used.
    pub warn_unused: bool,
    /// Report signals that are used but never driven.
    pub warn_undriven: bool,
    /// Report signals connected to nothing at all.
    pub warn_unconnected: bool,
}

impl ValidateFlags {
    /// Enable every warning category.
    pub fn all() -> Self {
        ValidateFlags { warn_unused: true, warn_undriven: true, warn_unconnected: true }
    }
}

/// Non-fatal findings from a validation run.
#[derive(Clone, Debug, Default)]
pub struct ValidateReport {
    /// Driven but never used (requires `warn_unused`).
    pub unused: Vec<SignalId>,
    /// Used but never driven (requires `warn_undriven`).
    pub undriven: Vec<SignalId>,
    /// Neither driven nor used (requires `warn_unconnected`).
    pub unconnected: Vec<SignalId>,
}

/// The single definition of a signal, if any.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Def {
    /// Driven by the LUT at this index.
    Lut(usize),
    /// Driven by the FF at this index.
    Ff(usize),
    /// Assigned from outside the design each step.
    ExternalInput,
}

/// One consumer of a signal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Use {
    /// The LUT at this index reads the signal.
    Lut(usize),
    /// The FF at this index samples the signal.
    Ff(usize),
    /// The signal is observed at the design boundary.
    ExternalOutput,
}

/// Dense def/use indices over a [`LogicList`], rebuilt at the start of a
/// pass rather than maintained incrementally.
#[derive(Clone, Debug)]
pub struct UseDef {
    defs: Vec<Option<Def>>,
    users: Vec<Vec<Use>>,
}

impl UseDef {
    /// Build the indices. Assumes a validated list (in particular, at
    /// most one driver per signal; a later driver silently wins here, so
    /// run [`LogicList::validate`] first when that matters).
    pub fn build(logic: &LogicList) -> UseDef {
        let n = logic.signal_len();
        let mut defs: Vec<Option<Def>> = vec![None; n];
        let mut users: Vec<Vec<Use>> = vec![Vec::new(); n];

        for &s in &logic.external_inputs {
            defs[s.0] = Some(Def::ExternalInput);
        }
        for &s in &logic.external_outputs {
            users[s.0].push(Use::ExternalOutput);
        }
        for (i, lut) in logic.luts.iter().enumerate() {
            defs[lut.output.0] = Some(Def::Lut(i));
            for &input in &lut.inputs {
                users[input.0].push(Use::Lut(i));
            }
        }
        for (i, ff) in logic.ffs.iter().enumerate() {
            defs[ff.output.0] = Some(Def::Ff(i));
            users[ff.input.0].push(Use::Ff(i));
        }

        UseDef { defs, users }
    }

    /// The unique driver of `signal`, if any.
    #[inline]
    pub fn def(&self, signal: SignalId) -> Option<Def> {
        self.defs[signal.0]
    }

    /// All consumers of `signal`.
    #[inline]
    pub fn users(&self, signal: SignalId) -> &[Use] {
        &self.users[signal.0]
    }
}

/// Ordered collection of signals, LUTs and FFs plus the external
/// input/output marks and any deferred connections still to resolve.
#[derive(Debug, Default)]
pub struct LogicList {
    signals: Vec<SignalInfo>,
    /// Combinational components.
    pub luts: Vec<Lut>,
    /// Sequential components.
    pub ffs: Vec<Ff>,
    /// Signals assigned from outside the design.
    pub external_inputs: BTreeSet<SignalId>,
    /// Signals observed at the design boundary.
    pub external_outputs: BTreeSet<SignalId>,
    pub(crate) connections: Vec<(SignalId, SignalId)>,
    pub(crate) open_builders: usize,
}

impl LogicList {
    /// Empty list.
    pub fn new() -> Self {
        LogicList::default()
    }

    // ------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------

    /// Allocate a fresh anonymous signal.
    pub fn new_signal(&mut self) -> SignalId {
        self.new_signal_named(None)
    }

    /// Allocate a fresh signal with an optional debug name.
    pub fn new_signal_named(&mut self, debug_name: Option<&str>) -> SignalId {
        let id = SignalId(self.signals.len());
        self.signals.push(SignalInfo::new(debug_name));
        id
    }

    /// Length of the signal array, including dead entries. Useful for
    /// sizing dense per-signal tables.
    #[inline]
    pub fn signal_len(&self) -> usize {
        self.signals.len()
    }

    /// Number of live signals.
    pub fn live_signal_count(&self) -> usize {
        self.signals.iter().filter(|s| s.alive).count()
    }

    /// Attribute access. Dead signals remain addressable so diagnostics
    /// can still name them.
    #[inline]
    pub fn signal(&self, id: SignalId) -> &SignalInfo {
        &self.signals[id.0]
    }

    /// Mutable attribute access.
    #[inline]
    pub fn signal_mut(&mut self, id: SignalId) -> &mut SignalInfo {
        &mut self.signals[id.0]
    }

    /// Whether `id` is in bounds and alive.
    #[inline]
    pub fn is_live(&self, id: SignalId) -> bool {
        self.signals.get(id.0).map(|s| s.alive).unwrap_or(false)
    }

    /// Iterate over the ids of all live signals.
    pub fn live_signals(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.signals
            .iter()
            .enumerate()
            .filter(|(_, s)| s.alive)
            .map(|(i, _)| SignalId(i))
    }

    /// Find the live signal carrying this external-facing label.
    pub fn find_special(&self, name: &str) -> Option<SignalId> {
        self.live_signals()
            .find(|&s| self.signal(s).special_name.as_deref() == Some(name))
    }

    /// Human-readable name for diagnostics: the special name, else the
    /// first debug name, else the bare id.
    pub fn describe(&self, id: SignalId) -> String {
        let info = &self.signals[id.0];
        if let Some(name) = &info.special_name {
            return format!("\"{name}\"");
        }
        if let Some(name) = info.debug_names.iter().next() {
            return format!("Signal({}, \"{name}\")", id.0);
        }
        id.to_string()
    }

    pub(crate) fn kill_signal(&mut self, id: SignalId) {
        self.signals[id.0].alive = false;
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Append a LUT. Table arity is enforced by validation.
    pub fn push_lut(&mut self, lut: Lut) {
        self.luts.push(lut);
    }

    /// Create a fresh output signal driven by a new LUT over `inputs`.
    pub fn new_lut(&mut self, inputs: Vec<SignalId>, table: Vec<bool>) -> SignalId {
        let output = self.new_signal();
        self.push_lut(Lut { output, inputs, table });
        output
    }

    /// Append a FF.
    pub fn push_ff(&mut self, ff: Ff) {
        self.ffs.push(ff);
    }

    /// Create a fresh output signal driven by a new FF sampling `input`.
    pub fn new_ff(&mut self, input: SignalId, init: bool) -> SignalId {
        let output = self.new_signal();
        self.push_ff(Ff { init, input, output });
        output
    }

    /// Mark a signal as assigned from outside the design.
    pub fn mark_external_input(&mut self, signal: SignalId) {
        self.external_inputs.insert(signal);
    }

    /// Mark a signal as observed at the design boundary.
    pub fn mark_external_output(&mut self, signal: SignalId) {
        self.external_outputs.insert(signal);
    }

    // ------------------------------------------------------------------
    // Deferred connections & signal merging
    // ------------------------------------------------------------------

    /// Stage a connection to be resolved at builder scope close (or, if
    /// it survives until lowering, turned into a netlist bridge).
    pub fn stage_connection(&mut self, a: SignalId, b: SignalId) {
        self.connections.push((a, b));
    }

    /// Staged connections not yet resolved.
    pub fn pending_connections(&self) -> &[(SignalId, SignalId)] {
        &self.connections
    }

    /// Rewrite every reference to `merge` into `keep`: LUT inputs and
    /// outputs, FF inputs and outputs, external marks and staged
    /// connections. Debug names are unioned, the external label is kept
    /// from `keep` when both carry one, and `merge` dies. Merging a
    /// signal into itself is a no-op.
    pub fn merge_signals(&mut self, keep: SignalId, merge: SignalId) {
        if keep == merge {
            return;
        }

        let rewrite = |s: &mut SignalId| {
            if *s == merge {
                *s = keep;
            }
        };
        for lut in &mut self.luts {
            rewrite(&mut lut.output);
            for input in &mut lut.inputs {
                rewrite(input);
            }
        }
        for ff in &mut self.ffs {
            rewrite(&mut ff.input);
            rewrite(&mut ff.output);
        }
        for (a, b) in &mut self.connections {
            rewrite(a);
            rewrite(b);
        }
        if self.external_inputs.remove(&merge) {
            self.external_inputs.insert(keep);
        }
        if self.external_outputs.remove(&merge) {
            self.external_outputs.insert(keep);
        }

        let names = std::mem::take(&mut self.signals[merge.0].debug_names);
        self.signals[keep.0].debug_names.extend(names);
        if self.signals[keep.0].special_name.is_none() {
            let taken = self.signals[merge.0].special_name.take();
            self.signals[keep.0].special_name = taken;
        }
        self.signals[merge.0].alive = false;
    }

    /// Resolve all staged connections: pick, per equivalence class, the
    /// member with the smallest id as canonical and merge the rest into
    /// it. Returns the number of merged signals.
    pub fn resolve_connections(&mut self) -> usize {
        if self.connections.is_empty() {
            return 0;
        }
        let pairs = std::mem::take(&mut self.connections);
        let best = canonicalize(&pairs, |a, b| a.0 < b.0);
        let count = best.len();
        for (merge, keep) in best {
            self.merge_signals(keep, merge);
        }
        count
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Check every structural invariant and, under `flags`, collect the
    /// connectivity warnings. Fails fast on the first violation.
    pub fn validate(&self, flags: ValidateFlags) -> Result<ValidateReport, LogicError> {
        if self.open_builders > 0 {
            return Err(LogicError::BuilderOpen(self.open_builders));
        }

        let check = |signal: SignalId, context: &'static str| {
            if self.is_live(signal) {
                Ok(())
            } else {
                Err(LogicError::DanglingSignal { signal, context })
            }
        };

        for (i, lut) in self.luts.iter().enumerate() {
            if lut.table.len() != 1usize << lut.inputs.len() {
                return Err(LogicError::TableSize {
                    lut: i,
                    inputs: lut.inputs.len(),
                    table: lut.table.len(),
                });
            }
            check(lut.output, "LUT output")?;
            for &input in &lut.inputs {
                check(input, "LUT input")?;
            }
        }
        for ff in &self.ffs {
            check(ff.input, "FF input")?;
            check(ff.output, "FF output")?;
        }
        for &s in &self.external_inputs {
            check(s, "external input mark")?;
        }
        for &s in &self.external_outputs {
            check(s, "external output mark")?;
        }
        for &(a, b) in &self.connections {
            check(a, "staged connection")?;
            check(b, "staged connection")?;
        }

        // At most one driver per signal; external inputs have none.
        let mut driver_count = vec![0usize; self.signals.len()];
        for lut in &self.luts {
            driver_count[lut.output.0] += 1;
        }
        for ff in &self.ffs {
            driver_count[ff.output.0] += 1;
        }
        for (i, &count) in driver_count.iter().enumerate() {
            let signal = SignalId(i);
            if count > 0 && self.external_inputs.contains(&signal) {
                return Err(LogicError::DrivenExternalInput { signal });
            }
            if count > 1 {
                return Err(LogicError::MultipleDrivers { signal });
            }
        }

        self.check_combinational_cycles()?;

        // Non-fatal connectivity diagnostics.
        let mut report = ValidateReport::default();
        if flags.warn_unused || flags.warn_undriven || flags.warn_unconnected {
            let use_def = UseDef::build(self);
            for s in self.live_signals() {
                let driven = use_def.def(s).is_some();
                let used = !use_def.users(s).is_empty();
                if flags.warn_undriven && used && !driven {
                    tracing::warn!("{} is used but never driven", self.describe(s));
                    report.undriven.push(s);
                }
                if flags.warn_unused && driven && !used {
                    tracing::warn!("{} is driven but never used", self.describe(s));
                    report.unused.push(s);
                }
                if flags.warn_unconnected && !driven && !used {
                    tracing::warn!("{} is not connected to anything", self.describe(s));
                    report.unconnected.push(s);
                }
            }
        }
        Ok(report)
    }

    /// DFS over the LUT-induced signal graph. FFs break cycles by
    /// construction and are ignored.
    fn check_combinational_cycles(&self) -> Result<(), LogicError> {
        const WHITE: u8 = 0;
        const GREY: u8 = 1;
        const BLACK: u8 = 2;

        let mut def_lut: Vec<Option<usize>> = vec![None; self.signals.len()];
        for (i, lut) in self.luts.iter().enumerate() {
            def_lut[lut.output.0] = Some(i);
        }

        let mut color = vec![WHITE; self.signals.len()];
        let mut path: Vec<SignalId> = Vec::new();

        fn visit(
            logic: &LogicList,
            def_lut: &[Option<usize>],
            color: &mut [u8],
            path: &mut Vec<SignalId>,
            signal: SignalId,
        ) -> Result<(), LogicError> {
            match color[signal.0] {
                BLACK => return Ok(()),
                GREY => {
                    // Back edge: report the cycle segment of the path.
                    let start = path.iter().position(|&s| s == signal).unwrap_or(0);
                    let mut cycle: Vec<SignalId> = path[start..].to_vec();
                    cycle.push(signal);
                    return Err(LogicError::CombinationalCycle { path: cycle });
                }
                _ => {}
            }
            color[signal.0] = GREY;
            path.push(signal);
            if let Some(li) = def_lut[signal.0] {
                for &input in &logic.luts[li].inputs {
                    visit(logic, def_lut, color, path, input)?;
                }
            }
            path.pop();
            color[signal.0] = BLACK;
            Ok(())
        }

        for lut in &self.luts {
            visit(self, &def_lut, &mut color, &mut path, lut.output)?;
        }
        Ok(())
    }
}

impl fmt::Display for LogicList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "LogicList(")?;
        writeln!(f, "  signals: [")?;
        for s in self.live_signals() {
            write!(f, "    {}", self.describe(s))?;
            if self.external_inputs.contains(&s) {
                write!(f, " in")?;
            }
            if self.external_outputs.contains(&s) {
                write!(f, " out")?;
            }
            writeln!(f)?;
        }
        writeln!(f, "  ],")?;
        writeln!(f, "  luts: [")?;
        for lut in &self.luts {
            let inputs: Vec<String> = lut.inputs.iter().map(|&i| self.describe(i)).collect();
            writeln!(
                f,
                "    {} = LUT([{}], {:?})",
                self.describe(lut.output),
                inputs.join(", "),
                lut.table
            )?;
        }
        writeln!(f, "  ],")?;
        writeln!(f, "  ffs: [")?;
        for ff in &self.ffs {
            writeln!(
                f,
                "    {} = FF({}, init={})",
                self.describe(ff.output),
                self.describe(ff.input),
                ff.init
            )?;
        }
        writeln!(f, "  ],")?;
        write!(f, ")")
    }
}
