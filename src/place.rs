//! Placement engine
//!
//! Assigns every netlist component to a cell of a square grid and
//! shrinks the total estimated wirelength by simulated annealing over
//! random cell swaps.
//!
//! ## Cost model
//!
//! Global wires (`vdd`, `gnd`, `clk`) connect everywhere and are
//! excluded. For every other wire the default cost is the half
//! perimeter of the bounding box of its attached components (HPWL); a
//! Manhattan minimum-spanning-tree model is selectable when a closer
//! wirelength estimate is worth the extra evaluation cost. Wires
//! touching at most one component cost nothing. Per-wire costs and
//! their sum are cached and maintained incrementally: a proposed swap
//! recomputes only the wires touched by the two moved occupants.
//!
//! ## Search
//!
//! A proposal picks two grid cells (uniformly at random by default, or
//! biased toward components on expensive wires) and swaps their
//! contents; swapping a component into an empty cell is allowed. A swap
//! that lowers the total is accepted; otherwise it is accepted with
//! probability `temperature` (0 in the default configuration, i.e.
//! strict greedy descent) and undone on rejection, leaving the cost
//! cache untouched. The run is deterministic for a fixed seed.
//!
//! The `validate-placement` feature re-checks the full cache/grid
//! consistency at every progress checkpoint; a final check always runs.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::net::NetList;

/// Sentinel for an unoccupied grid cell.
pub const GRID_EMPTY: usize = usize::MAX;

/// Inconsistencies found by [`Grid::check_consistency`].
#[derive(Debug, thiserror::Error)]
pub enum PlaceError {
    #[error("component {component} claims cell {cell}, which holds {found:?}")]
    PositionMismatch { component: usize, cell: usize, found: Option<usize> },
    #[error("cell {cell} holds component {component} but no component claims it")]
    GhostOccupant { cell: usize, component: usize },
    #[error("wire {wire} cost cache holds {cached}, recomputation gives {actual}")]
    WireCostMismatch { wire: usize, cached: u64, actual: u64 },
    #[error("total cost cache holds {cached}, recomputation gives {actual}")]
    TotalCostMismatch { cached: u64, actual: u64 },
}

/// How proposal cells are picked.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProposalStrategy {
    /// Both cells uniformly at random.
    UniformRandom,
    /// First cell: a component on a wire drawn with probability
    /// proportional to its cached cost; second cell uniform. Falls back
    /// to uniform while every wire is free.
    LongWireBiased,
}

/// Per-wire cost function.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CostModel {
    /// Bounding-box width + height of the attached components. Cheap
    /// and the default.
    HalfPerimeter,
    /// Length of a minimum spanning tree over the attached components
    /// under Manhattan distance. Closer to routed wire length, more
    /// expensive to evaluate.
    SpanningTree,
}

/// Annealing parameters.
#[derive(Copy, Clone, Debug)]
pub struct PlaceConfig {
    /// Number of proposals to evaluate.
    pub iterations: usize,
    /// Probability of accepting a non-improving swap.
    pub temperature: f64,
    /// RNG seed; runs are deterministic per seed.
    pub seed: u64,
    /// Proposal picker.
    pub strategy: ProposalStrategy,
    /// Per-wire cost function.
    pub cost_model: CostModel,
}

impl Default for PlaceConfig {
    fn default() -> Self {
        PlaceConfig {
            iterations: 10_000,
            temperature: 0.0,
            seed: 0,
            strategy: ProposalStrategy::UniformRandom,
            cost_model: CostModel::HalfPerimeter,
        }
    }
}

/// Square placement grid with incrementally maintained wire costs.
#[derive(Debug)]
pub struct Grid {
    size: usize,
    cost_model: CostModel,
    /// Cell → component index or [`GRID_EMPTY`].
    cells: Vec<usize>,
    /// Component index → cell.
    component_pos: Vec<usize>,
    /// Wire → attached components, globals excluded.
    wire_components: Vec<Vec<usize>>,
    /// Component → attached wires, globals excluded.
    component_wires: Vec<Vec<usize>>,
    wire_cost: Vec<u64>,
    total_cost: u64,
}

impl Grid {
    /// Build the derived indices and place every component at a random
    /// distinct cell of a ⌈√n⌉-sided grid, costed by HPWL.
    pub fn new(net: &NetList, rng: &mut StdRng) -> Grid {
        Grid::with_cost_model(net, CostModel::HalfPerimeter, rng)
    }

    /// [`Grid::new`] with an explicit per-wire cost function.
    pub fn with_cost_model(net: &NetList, cost_model: CostModel, rng: &mut StdRng) -> Grid {
        let n = net.components.len();

        let mut wire_components: Vec<Vec<usize>> = vec![Vec::new(); net.wire_len()];
        let mut component_wires: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (ci, component) in net.components.iter().enumerate() {
            for port in component.ports() {
                if net.is_global(port.wire) {
                    continue;
                }
                wire_components[port.wire.0].push(ci);
                component_wires[ci].push(port.wire.0);
            }
        }

        let mut size = 0usize;
        while size * size < n {
            size += 1;
        }

        let mut cells = vec![GRID_EMPTY; size * size];
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);
        let mut component_pos = vec![0usize; n];
        for (ci, &cell) in order.iter().enumerate() {
            cells[cell] = ci;
            component_pos[ci] = cell;
        }

        let wire_count = wire_components.len();
        let mut grid = Grid {
            size,
            cost_model,
            cells,
            component_pos,
            wire_components,
            component_wires,
            wire_cost: Vec::new(),
            total_cost: 0,
        };
        let costs: Vec<u64> = (0..wire_count).map(|wi| grid.compute_wire_cost(wi)).collect();
        grid.total_cost = costs.iter().sum();
        grid.wire_cost = costs;
        grid
    }

    /// Side length of the grid.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of placed components.
    #[inline]
    pub fn component_count(&self) -> usize {
        self.component_pos.len()
    }

    /// Cached total cost.
    #[inline]
    pub fn total_cost(&self) -> u64 {
        self.total_cost
    }

    /// Grid coordinates of a component, in `[0, size)²`.
    #[inline]
    pub fn position(&self, component: usize) -> (usize, usize) {
        self.cell_to_xy(self.component_pos[component])
    }

    #[inline]
    fn cell_to_xy(&self, cell: usize) -> (usize, usize) {
        (cell % self.size, cell / self.size)
    }

    /// Cost of one wire at the current placement under the configured
    /// model.
    fn compute_wire_cost(&self, wire: usize) -> u64 {
        match self.cost_model {
            CostModel::HalfPerimeter => self.half_perimeter_cost(wire),
            CostModel::SpanningTree => self.spanning_tree_cost(wire),
        }
    }

    /// Bounding-box half perimeter of the attached components.
    fn half_perimeter_cost(&self, wire: usize) -> u64 {
        let components = &self.wire_components[wire];
        if components.len() <= 1 {
            return 0;
        }
        let (mut min_x, mut min_y) = (usize::MAX, usize::MAX);
        let (mut max_x, mut max_y) = (0usize, 0usize);
        for &ci in components {
            let (x, y) = self.cell_to_xy(self.component_pos[ci]);
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        ((max_x - min_x) + (max_y - min_y)) as u64
    }

    /// Minimum-spanning-tree length over the attached components under
    /// Manhattan distance (Prim, fine for the small nets a wire has).
    fn spanning_tree_cost(&self, wire: usize) -> u64 {
        let components = &self.wire_components[wire];
        if components.len() <= 1 {
            return 0;
        }
        let mut todo: Vec<usize> = components[1..].to_vec();
        let mut done: Vec<usize> = vec![components[0]];
        let mut total = 0u64;

        while !todo.is_empty() {
            let mut best_cost = u64::MAX;
            let mut best_at = 0usize;
            for (at, &ci) in todo.iter().enumerate() {
                for &di in &done {
                    let cost = self.manhattan(ci, di);
                    if cost < best_cost {
                        best_cost = cost;
                        best_at = at;
                    }
                }
            }
            total += best_cost;
            done.push(todo.swap_remove(best_at));
        }
        total
    }

    fn manhattan(&self, a: usize, b: usize) -> u64 {
        let (ax, ay) = self.cell_to_xy(self.component_pos[a]);
        let (bx, by) = self.cell_to_xy(self.component_pos[b]);
        (ax.abs_diff(bx) + ay.abs_diff(by)) as u64
    }

    /// Recompute the total cost from scratch (for checks and tests).
    pub fn recompute_total_cost(&self) -> u64 {
        (0..self.wire_components.len()).map(|wi| self.compute_wire_cost(wi)).sum()
    }

    /// Swap two cells without touching the cost cache. Refuses the
    /// degenerate cases (same cell, both empty).
    fn swap_cells_leave_cost(&mut self, a: usize, b: usize) -> bool {
        if a == b {
            return false;
        }
        let ca = self.cells[a];
        let cb = self.cells[b];
        if ca == cb {
            // Only possible when both are empty.
            return false;
        }
        self.cells[a] = cb;
        self.cells[b] = ca;
        if ca != GRID_EMPTY {
            self.component_pos[ca] = b;
        }
        if cb != GRID_EMPTY {
            self.component_pos[cb] = a;
        }
        true
    }

    /// Propose swapping cells `a` and `b`: recompute the costs of the
    /// wires touched by either occupant, accept on improvement (or with
    /// probability `temperature`), undo otherwise. Returns whether the
    /// swap was kept; on rejection the cost cache is untouched.
    pub fn try_swap(
        &mut self,
        a: usize,
        b: usize,
        temperature: f64,
        rng: &mut StdRng,
    ) -> bool {
        if !self.swap_cells_leave_cost(a, b) {
            return false;
        }

        let mut affected: Vec<usize> = Vec::new();
        for cell in [a, b] {
            let ci = self.cells[cell];
            if ci != GRID_EMPTY {
                affected.extend_from_slice(&self.component_wires[ci]);
            }
        }
        affected.sort_unstable();
        affected.dedup();

        let mut delta = 0i64;
        let mut new_costs = Vec::with_capacity(affected.len());
        for &wi in &affected {
            let cost = self.compute_wire_cost(wi);
            delta += cost as i64 - self.wire_cost[wi] as i64;
            new_costs.push(cost);
        }
        let new_total = (self.total_cost as i64 + delta) as u64;

        if new_total < self.total_cost || rng.gen::<f64>() < temperature {
            self.total_cost = new_total;
            for (&wi, &cost) in affected.iter().zip(&new_costs) {
                self.wire_cost[wi] = cost;
            }
            true
        } else {
            self.swap_cells_leave_cost(a, b);
            false
        }
    }

    fn pick_uniform(&self, rng: &mut StdRng) -> (usize, usize) {
        let area = self.cells.len();
        (rng.gen_range(0..area), rng.gen_range(0..area))
    }

    fn pick_long_wire(&self, rng: &mut StdRng) -> (usize, usize) {
        let weights = self.wire_cost.iter().map(|&c| c as f64);
        let Ok(by_cost) = WeightedIndex::new(weights) else {
            // Every wire is free; nothing to bias on.
            return self.pick_uniform(rng);
        };
        let wi = by_cost.sample(rng);
        let components = &self.wire_components[wi];
        let ci = components[rng.gen_range(0..components.len())];
        let a = self.component_pos[ci];
        let b = rng.gen_range(0..self.cells.len());
        (a, b)
    }

    /// One annealing step under the given strategy.
    pub fn step(
        &mut self,
        strategy: ProposalStrategy,
        temperature: f64,
        rng: &mut StdRng,
    ) -> bool {
        let (a, b) = match strategy {
            ProposalStrategy::UniformRandom => self.pick_uniform(rng),
            ProposalStrategy::LongWireBiased => self.pick_long_wire(rng),
        };
        self.try_swap(a, b, temperature, rng)
    }

    /// Verify that the grid and the position table agree bidirectionally
    /// and that every cached cost matches a fresh recomputation.
    pub fn check_consistency(&self) -> Result<(), PlaceError> {
        for (ci, &cell) in self.component_pos.iter().enumerate() {
            if self.cells.get(cell).copied() != Some(ci) {
                return Err(PlaceError::PositionMismatch {
                    component: ci,
                    cell,
                    found: self.cells.get(cell).copied().filter(|&c| c != GRID_EMPTY),
                });
            }
        }
        for (cell, &ci) in self.cells.iter().enumerate() {
            if ci != GRID_EMPTY && self.component_pos[ci] != cell {
                return Err(PlaceError::GhostOccupant { cell, component: ci });
            }
        }
        let mut sum = 0u64;
        for wi in 0..self.wire_components.len() {
            let actual = self.compute_wire_cost(wi);
            if actual != self.wire_cost[wi] {
                return Err(PlaceError::WireCostMismatch {
                    wire: wi,
                    cached: self.wire_cost[wi],
                    actual,
                });
            }
            sum += actual;
        }
        if sum != self.total_cost {
            return Err(PlaceError::TotalCostMismatch { cached: self.total_cost, actual: sum });
        }
        Ok(())
    }
}

const CHECKPOINT: usize = 1000;

/// Place a netlist: random initial assignment, then `iterations`
/// annealing steps. Deterministic for a fixed seed.
pub fn place(net: &NetList, config: &PlaceConfig) -> Result<Grid, PlaceError> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut grid = Grid::with_cost_model(net, config.cost_model, &mut rng);
    tracing::debug!(
        components = grid.component_count(),
        grid = grid.size(),
        cost = grid.total_cost(),
        "initial placement"
    );
    if grid.component_count() == 0 {
        return Ok(grid);
    }

    let mut accepted = 0usize;
    for i in 0..config.iterations {
        if grid.step(config.strategy, config.temperature, &mut rng) {
            accepted += 1;
        }
        if (i + 1) % CHECKPOINT == 0 {
            tracing::debug!(
                step = i + 1,
                cost = grid.total_cost(),
                accept_rate = accepted as f64 / CHECKPOINT as f64,
                "annealing progress"
            );
            accepted = 0;
            #[cfg(feature = "validate-placement")]
            grid.check_consistency()?;
        }
    }

    grid.check_consistency()?;
    Ok(grid)
}
