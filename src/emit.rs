//! Emission interface: placed netlist → schematic document
//!
//! The core hands the emitter a netlist plus the grid mapping component
//! index → (x, y); everything downstream of that is replaceable. This
//! module provides the default emitter: an affine map from grid cells to
//! physical coordinates and a serde document written as JSON.

#![forbid(unsafe_code)]

use std::io;

use serde::{Deserialize, Serialize};

use crate::net::{NetList, WireId};
use crate::place::Grid;

/// Base schematic grid pitch in physical units.
pub const GRID_PITCH: f64 = 1.27;
/// Margin around the component field, in pitch units.
pub const COMPONENT_MARGIN: f64 = 40.0;
/// Cell-to-cell spacing, in pitch units.
pub const COMPONENT_DISTANCE: f64 = 20.0;

/// One wire of the emitted design.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireDoc {
    /// Stable wire id.
    pub id: usize,
    /// Display label (external label or a generated `wire_{id}`).
    pub name: String,
}

/// One port of an emitted component.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PortDoc {
    /// Port name within the component.
    pub name: String,
    /// Referenced wire id.
    pub wire: usize,
}

/// One placed component.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComponentDoc {
    /// Variant name (`Nmos`, `Resistor`, ...).
    pub kind: String,
    /// Physical x coordinate.
    pub x: f64,
    /// Physical y coordinate.
    pub y: f64,
    /// Ordered ports with wire references.
    pub ports: Vec<PortDoc>,
}

/// The full emitted schematic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchematicDoc {
    /// All wires, including the global rails.
    pub wires: Vec<WireDoc>,
    /// All components with physical positions.
    pub components: Vec<ComponentDoc>,
}

/// Display label for a wire: the external label when present, else a
/// generated name from the id.
pub fn wire_label(net: &NetList, wire: WireId) -> String {
    match &net.wire(wire).special_name {
        Some(name) => name.clone(),
        None => format!("wire_{}", wire.0),
    }
}

/// Affine grid-to-physical map: `pitch × (margin + cell × distance)`.
pub fn physical(x: usize, y: usize) -> (f64, f64) {
    (
        GRID_PITCH * (COMPONENT_MARGIN + x as f64 * COMPONENT_DISTANCE),
        GRID_PITCH * (COMPONENT_MARGIN + y as f64 * COMPONENT_DISTANCE),
    )
}

/// Build the schematic document for a placed netlist.
pub fn document(net: &NetList, grid: &Grid) -> SchematicDoc {
    let wires = (0..net.wire_len())
        .map(|i| WireDoc { id: i, name: wire_label(net, WireId(i)) })
        .collect();

    let components = net
        .components
        .iter()
        .enumerate()
        .map(|(ci, component)| {
            let (gx, gy) = grid.position(ci);
            let (x, y) = physical(gx, gy);
            ComponentDoc {
                kind: component.kind().to_owned(),
                x,
                y,
                ports: component
                    .ports()
                    .iter()
                    .map(|p| PortDoc { name: p.name.to_owned(), wire: p.wire.0 })
                    .collect(),
            }
        })
        .collect();

    SchematicDoc { wires, components }
}

/// Write the document as pretty-printed JSON.
pub fn write_json(doc: &SchematicDoc, writer: impl io::Write) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(writer, doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::Component;
    use crate::place::{place, PlaceConfig};

    fn tiny_net() -> NetList {
        let mut net = NetList::new();
        let w = net.new_wire_named("mid");
        net.wire_mut(w).special_name = Some("mid".to_owned());
        net.push_component(Component::Resistor { a: net.vdd, b: w });
        net.push_component(Component::Nmos { gate: w, up: w, down: net.gnd });
        net
    }

    #[test]
    fn physical_map_is_affine() {
        let (x0, y0) = physical(0, 0);
        let (x1, y1) = physical(1, 2);
        assert!((x0 - GRID_PITCH * COMPONENT_MARGIN).abs() < 1e-9);
        assert!((x1 - x0 - GRID_PITCH * COMPONENT_DISTANCE).abs() < 1e-9);
        assert!((y1 - y0 - 2.0 * GRID_PITCH * COMPONENT_DISTANCE).abs() < 1e-9);
    }

    #[test]
    fn document_covers_every_component_and_wire() {
        let net = tiny_net();
        let grid = place(&net, &PlaceConfig { iterations: 10, ..PlaceConfig::default() }).unwrap();
        let doc = document(&net, &grid);

        assert_eq!(doc.wires.len(), net.wire_len());
        assert_eq!(doc.components.len(), net.components.len());
        assert_eq!(doc.wires[0].name, "vdd");
        assert_eq!(doc.wires[3].name, "mid");
        assert_eq!(doc.components[0].kind, "Resistor");
        assert_eq!(doc.components[0].ports.len(), 2);
    }

    #[test]
    fn full_pipeline_emits_a_placed_schematic() {
        use crate::logic::{LogicList, ValidateFlags};

        let mut logic = LogicList::new();
        crate::designs::build_shifter(&mut logic);
        logic.validate(ValidateFlags::default()).unwrap();
        crate::logic_opt::optimize(&mut logic).unwrap();

        let mut net = crate::lower::lower(&logic).unwrap();
        crate::net_opt::optimize(&mut net);
        net.validate().unwrap();

        let grid = place(&net, &PlaceConfig { iterations: 2000, ..PlaceConfig::default() })
            .unwrap();
        let doc = document(&net, &grid);

        assert_eq!(doc.components.len(), net.components.len());
        // Port labels survive all the way to the document.
        assert!(doc.wires.iter().any(|w| w.name == "y0"));
        assert!(doc.wires.iter().any(|w| w.name == "clk"));
        // Every component sits inside the physical field.
        let (origin, _) = physical(0, 0);
        for c in &doc.components {
            assert!(c.x >= origin && c.y >= origin);
        }
    }

    #[test]
    fn json_round_trips() {
        let net = tiny_net();
        let grid = place(&net, &PlaceConfig { iterations: 10, ..PlaceConfig::default() }).unwrap();
        let doc = document(&net, &grid);

        let mut buf = Vec::new();
        write_json(&doc, &mut buf).unwrap();
        let back: SchematicDoc = serde_json::from_slice(&buf).unwrap();
        assert_eq!(back.wires.len(), doc.wires.len());
        assert_eq!(back.components.len(), doc.components.len());
        assert_eq!(back.components[1].kind, "Nmos");
    }
}
