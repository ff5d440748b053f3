//! Netlist optimizer
//!
//! Runs to a fixed point; the only pass so far is bridge coalescing.
//! Every bridge is drained from the component list, the bridged wires
//! are grouped into equivalence classes, and each class is rewritten to
//! its smallest-id member (the reserved globals hold ids 0..2, so a
//! net bridged to a rail collapses onto the rail).

#![forbid(unsafe_code)]

use crate::canon::canonicalize;
use crate::net::{Component, NetList};

/// Run every pass until none of them reports a change.
pub fn optimize(net: &mut NetList) {
    loop {
        let mut changed = false;
        changed |= coalesce_bridges(net) > 0;
        if !changed {
            break;
        }
    }
}

/// Remove every bridge and rewrite the induced wire equivalences to
/// their canonical members. Returns the number of rewritten ports.
pub fn coalesce_bridges(net: &mut NetList) -> usize {
    let mut pairs = Vec::new();
    net.components.retain(|component| match *component {
        Component::Bridge { a, b } => {
            pairs.push((a, b));
            false
        }
        _ => true,
    });
    if pairs.is_empty() {
        return 0;
    }

    let best = canonicalize(&pairs, |a, b| a.0 < b.0);
    let mut count = 0usize;
    for (old, new) in best {
        count += net.replace_wire(old, new);
    }
    tracing::debug!(bridges = pairs.len(), rewritten = count, "coalesced bridges");
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::designs::build_counter;
    use crate::logic::LogicList;
    use crate::lower::lower;
    use crate::net::WireId;

    #[test]
    fn bridges_are_removed_and_ports_rewritten() {
        let mut net = NetList::new();
        let a = net.new_wire_named("a");
        let b = net.new_wire_named("b");
        let out = net.new_wire();
        net.push_component(Component::Nmos { gate: b, up: out, down: net.gnd });
        net.connect(a, b);

        optimize(&mut net);
        assert_eq!(net.components.len(), 1);
        // a has the smaller id and wins.
        assert!(matches!(net.components[0], Component::Nmos { gate, .. } if gate == a));
        assert!(net.wire(a).debug_names.contains("b"));
    }

    #[test]
    fn rails_always_win_coalescing() {
        let mut net = NetList::new();
        let w = net.new_wire();
        let v = net.new_wire();
        net.push_component(Component::Resistor { a: net.vdd, b: w });
        net.connect(w, v);
        net.connect(v, net.gnd);

        optimize(&mut net);
        assert!(matches!(
            net.components[0],
            Component::Resistor { a, b } if a == net.vdd && b == net.gnd
        ));
    }

    #[test]
    fn bridge_chains_collapse_in_one_pass() {
        let mut net = NetList::new();
        let wires: Vec<WireId> = (0..5).map(|_| net.new_wire()).collect();
        for pair in wires.windows(2) {
            net.connect(pair[0], pair[1]);
        }
        net.push_component(Component::Led { high: wires[4], low: net.gnd });

        optimize(&mut net);
        assert_eq!(net.components.len(), 1);
        assert!(matches!(
            net.components[0],
            Component::Led { high, .. } if high == wires[0]
        ));
    }

    #[test]
    fn lowered_netlist_shrinks_but_never_grows() {
        // Monotonicity: optimizing the lowered counter only removes
        // components.
        let mut logic = LogicList::new();
        build_counter(&mut logic, 4);
        let mut net = lower(&logic).unwrap();
        let before = net.components.len();

        optimize(&mut net);
        let after = net.components.len();
        assert!(after <= before);
        assert!(net.components.iter().all(|c| !matches!(c, Component::Bridge { .. })));
        net.validate().unwrap();
    }

    #[test]
    fn idle_netlist_is_untouched() {
        let mut net = NetList::new();
        let w = net.new_wire();
        net.push_component(Component::Resistor { a: net.vdd, b: w });
        assert_eq!(coalesce_bridges(&mut net), 0);
        assert_eq!(net.components.len(), 1);
    }
}
