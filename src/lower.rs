//! Lowering: logic IR → transistor netlist
//!
//! A one-pass, zero-optimization code generator. Every live signal
//! becomes a wire (names carried over); every LUT becomes a resistor
//! pull-up plus one NMOS series stack per false table row; every FF
//! becomes a master-slave pair of SR-style latches. Redundancy left
//! behind (bridges, duplicate inverters across components) is the
//! netlist optimizer's problem.
//!
//! Pulldown synthesis follows the table convention of the logic IR: the
//! stack for row `b₀…b_{k−1}` is gated, level by level, on `inputs[i]`
//! when `bᵢ = 1` and on a lazily created inverted copy when `bᵢ = 0`.
//! Inverted copies are cached per LUT so one input is never inverted
//! twice within a gate. An empty input list yields a bare pull-up for
//! `[true]` and a ground tie for `[false]`.
//!
//! The FF initial value is not modeled electrically; behavior at the
//! register level is covered by the logic simulator.

#![forbid(unsafe_code)]

use crate::logic::{Ff, LogicError, LogicList, Lut, SignalId, ValidateFlags};
use crate::net::{Component, NetList, WireId};

/// A lowered netlist plus the signal → wire correspondence, needed by
/// anything that wires up the design boundary afterwards (indicator
/// LEDs, port-aware emitters). The map refers to pre-coalescing wire
/// ids: use it before running the netlist optimizer.
pub struct LoweredDesign {
    /// The generated netlist.
    pub net: NetList,
    signal_wire: Vec<WireId>,
}

impl LoweredDesign {
    /// The wire a live signal was lowered to.
    pub fn wire_for(&self, signal: SignalId) -> Option<WireId> {
        let wire = *self.signal_wire.get(signal.0)?;
        if wire.0 == usize::MAX {
            None
        } else {
            Some(wire)
        }
    }
}

/// Lower a validated logic list to a netlist. Staged connections the
/// logic IR still carries become bridges.
pub fn lower(logic: &LogicList) -> Result<NetList, LogicError> {
    Ok(lower_design(logic)?.net)
}

/// [`lower`], also returning the signal → wire map.
pub fn lower_design(logic: &LogicList) -> Result<LoweredDesign, LogicError> {
    logic.validate(ValidateFlags::default())?;

    let mut cx = Lowering {
        net: NetList::new(),
        signal_wire: vec![WireId(usize::MAX); logic.signal_len()],
        clk_inv: None,
    };

    for s in logic.live_signals() {
        let wire = cx.net.new_wire();
        let info = logic.signal(s);
        cx.net.wire_mut(wire).debug_names = info.debug_names.clone();
        cx.net.wire_mut(wire).special_name = info.special_name.clone();
        cx.signal_wire[s.0] = wire;
    }

    for lut in &logic.luts {
        cx.lower_lut(lut);
    }
    for ff in &logic.ffs {
        cx.lower_ff(ff);
    }
    for &(a, b) in logic.pending_connections() {
        let (a, b) = (cx.signal_wire[a.0], cx.signal_wire[b.0]);
        cx.net.connect(a, b);
    }

    Ok(LoweredDesign { net: cx.net, signal_wire: cx.signal_wire })
}

/// Attach one indicator LED (anode on the signal wire, cathode on GND)
/// to every external output. Run before the netlist optimizer, while
/// the design's wire map is current. Returns the number of LEDs added.
pub fn attach_output_leds(logic: &LogicList, design: &mut LoweredDesign) -> usize {
    let mut count = 0usize;
    for &s in &logic.external_outputs {
        if let Some(wire) = design.wire_for(s) {
            let gnd = design.net.gnd;
            design.net.push_component(Component::Led { high: wire, low: gnd });
            count += 1;
        }
    }
    count
}

struct Lowering {
    net: NetList,
    /// Live signal id → wire id (dead entries hold a poison value that a
    /// validated list never references).
    signal_wire: Vec<WireId>,
    /// Shared inverse of the clock, created on first FF.
    clk_inv: Option<WireId>,
}

impl Lowering {
    fn lower_lut(&mut self, lut: &Lut) {
        let inputs: Vec<WireId> = lut.inputs.iter().map(|&s| self.signal_wire[s.0]).collect();
        let gate_output = self.gate_table(&lut.table, &inputs);
        let wire_output = self.signal_wire[lut.output.0];
        self.net.connect(wire_output, gate_output);
    }

    /// Pull-up resistor plus one pulldown stack per false row.
    fn gate_table(&mut self, table: &[bool], inputs: &[WireId]) -> WireId {
        let mut inverted: Vec<Option<WireId>> = vec![None; inputs.len()];
        let output = self.net.new_wire();

        for (bits, &value) in table.iter().enumerate() {
            if value {
                // The resistor pulls high; nothing to build for this row.
                continue;
            }
            let mut curr = output;
            for i in 0..inputs.len() {
                let level = bits >> i & 1 != 0;
                let gate = self.input_wire(inputs, &mut inverted, i, level);
                let next = self.net.new_wire();
                self.net.push_component(Component::Nmos { gate, up: curr, down: next });
                curr = next;
            }
            self.net.connect(curr, self.net.gnd);
        }

        self.net.push_component(Component::Resistor { a: self.net.vdd, b: output });
        output
    }

    /// The wire to gate a stack level on: the input itself for a 1
    /// level, its cached inverse for a 0 level.
    fn input_wire(
        &mut self,
        inputs: &[WireId],
        inverted: &mut [Option<WireId>],
        index: usize,
        level: bool,
    ) -> WireId {
        if level {
            inputs[index]
        } else if let Some(inv) = inverted[index] {
            inv
        } else {
            let inv = self.gate_not(inputs[index]);
            inverted[index] = Some(inv);
            inv
        }
    }

    fn gate_not(&mut self, input: WireId) -> WireId {
        let output = self.net.new_wire();
        self.net.push_component(Component::Nmos { gate: input, up: output, down: self.net.gnd });
        self.net.push_component(Component::Resistor { a: self.net.vdd, b: output });
        output
    }

    /// Master-slave D flip-flop: the master latch is made transparent by
    /// CLK, the slave by ¬CLK (shared across all FFs).
    fn lower_ff(&mut self, ff: &Ff) {
        let d = self.signal_wire[ff.input.0];
        let d_inv = self.gate_not(d);
        let clk = self.net.clk;
        let clk_inv = match self.clk_inv {
            Some(w) => w,
            None => {
                let w = self.gate_not(clk);
                self.clk_inv = Some(w);
                w
            }
        };

        let (master_q, master_q_inv) = self.latch(clk, d, d_inv);
        let (slave_q, _slave_q_inv) = self.latch(clk_inv, master_q, master_q_inv);

        let wire_output = self.signal_wire[ff.output.0];
        self.net.connect(wire_output, slave_q);
    }

    /// SR-style latch: two cross-coupled inverters sharing a pull node
    /// that an NMOS grounds while `enable` is high, plus two write
    /// transistors gated on `d` and `¬d`.
    fn latch(&mut self, enable: WireId, d: WireId, d_inv: WireId) -> (WireId, WireId) {
        let q = self.net.new_wire();
        let q_inv = self.net.new_wire();
        let pull = self.net.new_wire();

        self.net.push_component(Component::Nmos { gate: enable, up: pull, down: self.net.gnd });
        self.net.push_component(Component::Resistor { a: self.net.vdd, b: q });
        self.net.push_component(Component::Resistor { a: self.net.vdd, b: q_inv });
        self.net.push_component(Component::Nmos { gate: q, up: q_inv, down: pull });
        self.net.push_component(Component::Nmos { gate: q_inv, up: q, down: pull });
        self.net.push_component(Component::Nmos { gate: d, up: q_inv, down: pull });
        self.net.push_component(Component::Nmos { gate: d_inv, up: q, down: pull });

        (q, q_inv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::LogicBuilder;

    fn counts(net: &NetList, kind: &str) -> usize {
        net.component_counts().get(kind).copied().unwrap_or(0)
    }

    #[test]
    fn constant_true_lut_is_a_bare_pull_up() {
        let mut logic = LogicList::new();
        let one = logic.new_lut(Vec::new(), vec![true]);
        logic.mark_external_output(one);

        let net = lower(&logic).unwrap();
        assert_eq!(counts(&net, "Resistor"), 1);
        assert_eq!(counts(&net, "Nmos"), 0);
        // Only the signal-to-gate-output bridge.
        assert_eq!(counts(&net, "Bridge"), 1);
    }

    #[test]
    fn constant_false_lut_ties_to_ground() {
        let mut logic = LogicList::new();
        let zero = logic.new_lut(Vec::new(), vec![false]);
        logic.mark_external_output(zero);

        let net = lower(&logic).unwrap();
        assert_eq!(counts(&net, "Resistor"), 1);
        assert_eq!(counts(&net, "Nmos"), 0);
        // Output bridge plus the zero-length stack tied to gnd.
        assert_eq!(counts(&net, "Bridge"), 2);
    }

    #[test]
    fn not_gate_is_one_transistor_and_one_resistor() {
        let mut logic = LogicList::new();
        let a = logic.new_signal_named(Some("a"));
        logic.mark_external_input(a);
        let out = logic.new_lut(vec![a], vec![true, false]);
        logic.mark_external_output(out);

        let net = lower(&logic).unwrap();
        assert_eq!(counts(&net, "Nmos"), 1);
        assert_eq!(counts(&net, "Resistor"), 1);
        assert_eq!(counts(&net, "Bridge"), 2);
        net.validate().unwrap();
    }

    #[test]
    fn and_gate_reuses_cached_inverters() {
        // AND over two inputs has three false rows; inputs 0 and 1 are
        // each inverted exactly once despite appearing in two stacks.
        let mut logic = LogicList::new();
        let mut b = LogicBuilder::new(&mut logic);
        let x = b.new_bit("x");
        let y = b.new_bit("y");
        b.mark_input(x);
        b.mark_input(y);
        let anded = b.and2(x, y);
        b.mark_output(anded);
        b.finish();

        let net = lower(&logic).unwrap();
        // 3 stacks × 2 transistors + 2 inverters.
        assert_eq!(counts(&net, "Nmos"), 8);
        // Pull-up + 2 inverter pull-ups.
        assert_eq!(counts(&net, "Resistor"), 3);
        // 3 stack-to-gnd ties + 1 output bridge.
        assert_eq!(counts(&net, "Bridge"), 4);
        net.validate().unwrap();
    }

    #[test]
    fn ff_lowers_to_master_slave_latches() {
        let mut logic = LogicList::new();
        let mut b = LogicBuilder::new(&mut logic);
        let d = b.new_bit("d");
        b.mark_input(d);
        let q = b.delay(d, false);
        b.mark_output(q);
        b.finish();

        let net = lower(&logic).unwrap();
        // Per latch: enable + 2 cross-coupled + 2 write = 5 NMOS, 2 R.
        // Plus the D inverter and the shared clock inverter.
        assert_eq!(counts(&net, "Nmos"), 2 * 5 + 2);
        assert_eq!(counts(&net, "Resistor"), 2 * 2 + 2);
        assert_eq!(counts(&net, "Bridge"), 1);
        net.validate().unwrap();
    }

    #[test]
    fn clock_inverter_is_shared_between_ffs() {
        let mut logic = LogicList::new();
        let mut b = LogicBuilder::new(&mut logic);
        let d = b.new_bit("d");
        b.mark_input(d);
        let q0 = b.delay(d, false);
        let q1 = b.delay(q0, false);
        b.mark_output(q1);
        b.finish();

        let net = lower(&logic).unwrap();
        // Two FFs: 2×(10 latch + 1 D-inv) NMOS plus ONE clock inverter.
        assert_eq!(counts(&net, "Nmos"), 2 * 11 + 1);
        net.validate().unwrap();
    }

    #[test]
    fn names_are_carried_onto_wires() {
        let mut logic = LogicList::new();
        let a = logic.new_signal_named(Some("data_in"));
        logic.mark_external_input(a);
        logic.signal_mut(a).special_name = Some("a_port".to_owned());
        let out = logic.new_lut(vec![a], vec![true, false]);
        logic.mark_external_output(out);

        let net = lower(&logic).unwrap();
        let named = (0..net.wire_len())
            .map(WireId)
            .find(|&w| net.wire(w).special_name.as_deref() == Some("a_port"))
            .expect("port label must survive lowering");
        assert!(net.wire(named).debug_names.contains("data_in"));
    }

    #[test]
    fn output_leds_land_on_the_output_wires() {
        let mut logic = LogicList::new();
        let a = logic.new_signal_named(Some("a"));
        logic.mark_external_input(a);
        let out = logic.new_lut(vec![a], vec![true, false]);
        logic.mark_external_output(out);

        let mut design = lower_design(&logic).unwrap();
        let out_wire = design.wire_for(out).unwrap();
        assert_eq!(attach_output_leds(&logic, &mut design), 1);

        let led = design
            .net
            .components
            .iter()
            .find(|c| matches!(c, Component::Led { .. }))
            .unwrap();
        assert!(matches!(*led, Component::Led { high, low }
            if high == out_wire && low == design.net.gnd));

        // Coalescing must keep the LED attached to the (possibly
        // renamed) output net.
        crate::net_opt::optimize(&mut design.net);
        assert_eq!(counts(&design.net, "Led"), 1);
        design.net.validate().unwrap();
    }

    #[test]
    fn wire_map_skips_dead_signals() {
        let mut logic = LogicList::new();
        let a = logic.new_signal();
        let gone = logic.new_signal();
        logic.kill_signal(gone);
        logic.mark_external_input(a);
        logic.mark_external_output(a);

        let design = lower_design(&logic).unwrap();
        assert!(design.wire_for(a).is_some());
        assert!(design.wire_for(gone).is_none());
        assert!(design.wire_for(SignalId(99)).is_none());
    }

    #[test]
    fn staged_connections_become_bridges() {
        let mut logic = LogicList::new();
        let a = logic.new_signal();
        let b = logic.new_signal();
        logic.mark_external_input(a);
        logic.mark_external_output(b);
        logic.stage_connection(a, b);

        let net = lower(&logic).unwrap();
        assert_eq!(counts(&net, "Bridge"), 1);
    }
}
