//! Netlist IR: wires and physical components
//!
//! The transistor-level representation produced by lowering. A
//! [`NetList`] owns flat arrays of wires and components; components are
//! a closed sum type and refer to wires by [`WireId`]. Three reserved
//! global wires exist per netlist (`vdd`, `gnd`, `clk`); they are
//! referenced like any other wire but are excluded from placement.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Index of a wire in its owning [`NetList`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WireId(pub usize);

impl WireId {
    /// Access the underlying index.
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wire({})", self.0)
    }
}

/// Per-wire attributes; the id is the position in the array.
#[derive(Clone, Debug, Default)]
pub struct WireInfo {
    /// Free-form debug names accumulated through coalescing.
    pub debug_names: BTreeSet<String>,
    /// External-facing label (`vdd`, `gnd`, `clk`, or a design port).
    pub special_name: Option<String>,
}

/// Schematic-placement hint for a port.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PortHint {
    /// Points up in the schematic symbol.
    North,
    /// Points down.
    South,
    /// Points left.
    West,
}

/// One connection point of a component.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Port {
    /// Port name within the component.
    pub name: &'static str,
    /// Optional directional hint for the emitter.
    pub hint: Option<PortHint>,
    /// The attached wire.
    pub wire: WireId,
}

/// A physical component. Closed set of variants; dispatch by tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Component {
    /// Two-terminal resistor.
    Resistor {
        /// First terminal.
        a: WireId,
        /// Second terminal.
        b: WireId,
    },
    /// N-channel MOSFET; `up` is the drain, `down` the source.
    Nmos {
        /// Gate.
        gate: WireId,
        /// Drain.
        up: WireId,
        /// Source.
        down: WireId,
    },
    /// P-channel MOSFET; `up` is the source, `down` the drain.
    Pmos {
        /// Gate.
        gate: WireId,
        /// Source.
        up: WireId,
        /// Drain.
        down: WireId,
    },
    /// Zero-ohm connection, removed by the netlist optimizer.
    Bridge {
        /// First terminal.
        a: WireId,
        /// Second terminal.
        b: WireId,
    },
    /// Indicator LED; `high` is the anode.
    Led {
        /// Anode, positive.
        high: WireId,
        /// Cathode, negative.
        low: WireId,
    },
}

impl Component {
    /// Variant name, also the key of the component-cost table.
    pub fn kind(&self) -> &'static str {
        match self {
            Component::Resistor { .. } => "Resistor",
            Component::Nmos { .. } => "Nmos",
            Component::Pmos { .. } => "Pmos",
            Component::Bridge { .. } => "Bridge",
            Component::Led { .. } => "Led",
        }
    }

    /// Ordered ports of this component.
    pub fn ports(&self) -> Vec<Port> {
        match *self {
            Component::Resistor { a, b } => vec![
                Port { name: "a", hint: None, wire: a },
                Port { name: "b", hint: None, wire: b },
            ],
            Component::Nmos { gate, up, down } | Component::Pmos { gate, up, down } => vec![
                Port { name: "gate", hint: Some(PortHint::West), wire: gate },
                Port { name: "up", hint: Some(PortHint::North), wire: up },
                Port { name: "down", hint: Some(PortHint::South), wire: down },
            ],
            Component::Bridge { a, b } => vec![
                Port { name: "a", hint: None, wire: a },
                Port { name: "b", hint: None, wire: b },
            ],
            Component::Led { high, low } => vec![
                Port { name: "high", hint: Some(PortHint::North), wire: high },
                Port { name: "low", hint: Some(PortHint::South), wire: low },
            ],
        }
    }

    /// Rewrite every wire reference through `f`.
    pub fn map_wires(&mut self, mut f: impl FnMut(WireId) -> WireId) {
        match self {
            Component::Resistor { a, b }
            | Component::Bridge { a, b } => {
                *a = f(*a);
                *b = f(*b);
            }
            Component::Nmos { gate, up, down } | Component::Pmos { gate, up, down } => {
                *gate = f(*gate);
                *up = f(*up);
                *down = f(*down);
            }
            Component::Led { high, low } => {
                *high = f(*high);
                *low = f(*low);
            }
        }
    }
}

/// Wire-reference errors surfaced by [`NetList::validate`].
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("component #{component} references {wire}, which does not exist")]
    DanglingWire { component: usize, wire: WireId },
}

/// Ordered wires and components plus the three reserved globals.
#[derive(Debug)]
pub struct NetList {
    wires: Vec<WireInfo>,
    /// All components in creation order.
    pub components: Vec<Component>,
    /// Supply rail.
    pub vdd: WireId,
    /// Ground rail.
    pub gnd: WireId,
    /// Clock distribution net.
    pub clk: WireId,
}

impl NetList {
    /// Empty netlist with the three global wires created up front (so
    /// they always hold the smallest ids and survive coalescing).
    pub fn new() -> Self {
        let mut net = NetList {
            wires: Vec::new(),
            components: Vec::new(),
            vdd: WireId(0),
            gnd: WireId(0),
            clk: WireId(0),
        };
        net.vdd = net.new_global("vdd");
        net.gnd = net.new_global("gnd");
        net.clk = net.new_global("clk");
        net
    }

    fn new_global(&mut self, name: &str) -> WireId {
        let id = self.new_wire();
        self.wires[id.0].special_name = Some(name.to_owned());
        id
    }

    /// Allocate a fresh anonymous wire.
    pub fn new_wire(&mut self) -> WireId {
        let id = WireId(self.wires.len());
        self.wires.push(WireInfo::default());
        id
    }

    /// Allocate a fresh wire with a debug name.
    pub fn new_wire_named(&mut self, debug_name: &str) -> WireId {
        let id = self.new_wire();
        self.wires[id.0].debug_names.insert(debug_name.to_owned());
        id
    }

    /// Number of wires, including ones no component references.
    #[inline]
    pub fn wire_len(&self) -> usize {
        self.wires.len()
    }

    /// Attribute access.
    #[inline]
    pub fn wire(&self, id: WireId) -> &WireInfo {
        &self.wires[id.0]
    }

    /// Mutable attribute access.
    #[inline]
    pub fn wire_mut(&mut self, id: WireId) -> &mut WireInfo {
        &mut self.wires[id.0]
    }

    /// Whether `id` is one of the reserved global wires.
    #[inline]
    pub fn is_global(&self, id: WireId) -> bool {
        id == self.vdd || id == self.gnd || id == self.clk
    }

    /// Append a component.
    pub fn push_component(&mut self, component: Component) {
        self.components.push(component);
    }

    /// Stage a zero-ohm connection between two wires, coalesced away by
    /// the netlist optimizer.
    pub fn connect(&mut self, a: WireId, b: WireId) {
        self.push_component(Component::Bridge { a, b });
    }

    /// Rewrite every port referring to `old` into `new`, unioning the
    /// wire names. Returns the number of rewritten ports.
    pub fn replace_wire(&mut self, old: WireId, new: WireId) -> usize {
        if old == new {
            return 0;
        }
        let mut count = 0usize;
        for component in &mut self.components {
            component.map_wires(|w| {
                if w == old {
                    count += 1;
                    new
                } else {
                    w
                }
            });
        }
        let names = std::mem::take(&mut self.wires[old.0].debug_names);
        self.wires[new.0].debug_names.extend(names);
        if self.wires[new.0].special_name.is_none() {
            let taken = self.wires[old.0].special_name.take();
            self.wires[new.0].special_name = taken;
        }
        count
    }

    /// Check that every referenced wire exists.
    pub fn validate(&self) -> Result<(), NetError> {
        for (i, component) in self.components.iter().enumerate() {
            for port in component.ports() {
                if port.wire.0 >= self.wires.len() {
                    return Err(NetError::DanglingWire { component: i, wire: port.wire });
                }
            }
        }
        Ok(())
    }

    /// Component counts by variant, for reporting.
    pub fn component_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for component in &self.components {
            *counts.entry(component.kind()).or_insert(0) += 1;
        }
        counts
    }

    /// Total cost of the netlist under a per-variant unit-cost table.
    /// Variants missing from the table cost nothing.
    pub fn total_cost(&self, unit_costs: &BTreeMap<&str, f64>) -> f64 {
        self.component_counts()
            .iter()
            .map(|(kind, count)| unit_costs.get(kind).copied().unwrap_or(0.0) * *count as f64)
            .sum()
    }
}

impl Default for NetList {
    fn default() -> Self {
        NetList::new()
    }
}

impl fmt::Display for NetList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "NetList(")?;
        writeln!(f, "  wires=[")?;
        for (i, wire) in self.wires.iter().enumerate() {
            write!(f, "    Wire({i}")?;
            if let Some(name) = &wire.special_name {
                write!(f, ", {name}")?;
            }
            if !wire.debug_names.is_empty() {
                write!(f, ", debug={:?}", wire.debug_names)?;
            }
            writeln!(f, "),")?;
        }
        writeln!(f, "  ],")?;
        writeln!(f, "  components=[")?;
        for component in &self.components {
            writeln!(f, "    {component:?},")?;
        }
        writeln!(f, "  ],")?;
        write!(f, ")")
    }
}
