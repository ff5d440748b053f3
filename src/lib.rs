//! Crate root: public surface and pipeline-wide invariants
//!
//! `gatesynth` turns a gate-level logic description into a placed
//! netlist of discrete transistors and resistors:
//!
//! ```text
//! (builder) → LogicList → [logic optimizer, fixed point]
//!                       → lowering
//!                       → NetList  → [net optimizer, fixed point]
//!                       → Grid placement (simulated annealing)
//!                       → (emitter)
//! ```
//!
//! ## Invariants
//!
//! - **Identity by index.** Signals and wires are integer ids into flat
//!   arrays owned by their list; the cyclic logic graph (FF loops are
//!   legal) carries no object cross-references. Deleted signals stay as
//!   dead array entries so surviving ids never move.
//! - **Single driver.** Every signal has at most one driver (LUT
//!   output, FF output, or external-input mark); the LUT-induced
//!   subgraph is acyclic. [`LogicList::validate`] enforces both and
//!   every optimizer pass preserves them.
//! - **Behavior preservation.** For any input schedule, the observable
//!   output sequence of [`sim::simulate`] is identical before and after
//!   [`logic_opt::optimize`]. The simulator is the test oracle.
//! - **Cost-cache coherence.** The placement grid maintains per-wire
//!   HPWL costs and their total incrementally; the cache always equals
//!   a fresh recomputation ([`Grid::check_consistency`]).
//! - **Determinism.** The annealer's seeded RNG is the only stateful
//!   primitive; the whole pipeline is single-threaded and synchronous.
//!
//! Failures are precise per-module errors; validators fail fast,
//! warnings go through `tracing`.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Typed construction surface staged on top of the logic IR.
pub mod builder;
/// Pairwise canonicalization shared by the merge-style passes.
pub mod canon;
/// Built-in demo designs for the CLI and the end-to-end tests.
pub mod designs;
/// Default emitter: affine placement map and JSON schematic document.
pub mod emit;
/// Three-valued constant lattice.
pub mod lattice;
/// Logic IR (signals, LUTs, FFs) and its validator.
pub mod logic;
/// Logic optimizer: const-prop, DCE, dedup, peephole to fixed point.
pub mod logic_opt;
/// Lowering from logic IR to the transistor netlist.
pub mod lower;
/// Netlist IR (wires, components) and its validator.
pub mod net;
/// Netlist optimizer: bridge coalescing to fixed point.
pub mod net_opt;
/// Simulated-annealing grid placement with cached HPWL costs.
pub mod place;
/// Logic simulator, the behavioral test oracle.
pub mod sim;

// ============================================================================
// Canonical re-exports
// ============================================================================

pub use crate::builder::{Bit, BitVec, BuilderError, LogicBuilder, Unsigned};
pub use crate::lattice::Lattice;
pub use crate::logic::{
    Ff, LogicError, LogicList, Lut, SignalId, ValidateFlags, ValidateReport,
};
pub use crate::net::{Component, NetError, NetList, WireId};
pub use crate::place::{CostModel, Grid, PlaceConfig, PlaceError, ProposalStrategy};
pub use crate::sim::{History, InputSchedule, SimError};
