//! Logic optimizer
//!
//! Runs {connection resolution, constant propagation, dead code
//! elimination, structural deduplication, peephole} to a fixed point:
//! the driver loops until no pass reports a change.
//!
//! ## Constant propagation
//!
//! Three-valued dataflow over [`Lattice`]. Initial state: external
//! inputs are `Overdef`, FF outputs start at `Def(init)`, everything
//! else is `Undef`. The worklist holds LUTs and FFs; a LUT is evaluated
//! by merging the output bit of every table row whose input pattern is
//! compatible with the current lattice (short-circuiting to `Overdef` as
//! soon as two distinct constants appear), a FF forwards the lattice
//! value of its input. Rewrites happen only at the fixed point: constant
//! inputs are folded out of LUT tables (a table restricted to zero
//! inputs is a constant), constant FFs are replaced by zero-input
//! constant LUTs, and `Undef` outputs are reported as warnings.
//!
//! ## The other passes
//!
//! - DCE: backward reachability from the external outputs and inputs;
//!   everything unreached is deleted.
//! - Dedup: LUTs with identical (ordered inputs, table) and FFs with
//!   identical (input, init) collapse onto the first member; the pass
//!   iterates internally so rewired consumers that become identical in
//!   turn are collapsed too (running it twice equals running it once).
//! - Peephole: the identity buffer (`[false, true]` over one input) is
//!   removed and its output merged into its input. Further rewrites plug
//!   into the same pass.

#![forbid(unsafe_code)]

use std::collections::{HashMap, VecDeque};

use crate::lattice::Lattice;
use crate::logic::{Def, LogicError, LogicList, Lut, SignalId, Use, UseDef};

/// Run all passes to a fixed point. Fails fast while a builder scope is
/// still open; the passes themselves preserve every structural
/// invariant.
pub fn optimize(logic: &mut LogicList) -> Result<(), LogicError> {
    if logic.open_builders > 0 {
        return Err(LogicError::BuilderOpen(logic.open_builders));
    }
    loop {
        let mut changed = false;
        changed |= logic.resolve_connections() > 0;
        changed |= const_propagation(logic);
        changed |= remove_dead(logic);
        changed |= deduplicate(logic);
        changed |= peephole(logic);
        if !changed {
            break;
        }
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Constant propagation
// ----------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Comp {
    Lut(usize),
    Ff(usize),
}

/// Worklist solve followed by fixed-point rewrites. Returns whether any
/// table or component changed.
pub fn const_propagation(logic: &mut LogicList) -> bool {
    let use_def = UseDef::build(logic);

    let mut lattice = vec![Lattice::Undef; logic.signal_len()];
    for &s in &logic.external_inputs {
        lattice[s.0] = Lattice::Overdef;
    }
    for ff in &logic.ffs {
        lattice[ff.output.0] = Lattice::Def(ff.init);
    }

    let mut worklist: VecDeque<Comp> = (0..logic.luts.len())
        .map(Comp::Lut)
        .chain((0..logic.ffs.len()).map(Comp::Ff))
        .collect();

    while let Some(comp) = worklist.pop_front() {
        let (output, value) = match comp {
            Comp::Ff(i) => {
                let ff = &logic.ffs[i];
                (ff.output, lattice[ff.input.0])
            }
            Comp::Lut(i) => {
                let lut = &logic.luts[i];
                (lut.output, eval_lut_lattice(lut, &lattice))
            }
        };
        let merged = lattice[output.0].merge(value);
        if merged != lattice[output.0] {
            lattice[output.0] = merged;
            for &user in use_def.users(output) {
                match user {
                    Use::Lut(i) => worklist.push_back(Comp::Lut(i)),
                    Use::Ff(i) => worklist.push_back(Comp::Ff(i)),
                    Use::ExternalOutput => {}
                }
            }
        }
    }

    apply_lattice(logic, &lattice)
}

/// Merge the output bit of every table row compatible with the current
/// lattice. An `Undef` input leaves every row incompatible, so the
/// result stays `Undef`.
fn eval_lut_lattice(lut: &Lut, lattice: &[Lattice]) -> Lattice {
    let mut result = Lattice::Undef;
    for (row, &out) in lut.table.iter().enumerate() {
        let compatible = lut
            .inputs
            .iter()
            .enumerate()
            .all(|(i, &input)| lattice[input.0].can_be(row >> i & 1 != 0));
        if !compatible {
            continue;
        }
        result = result.merge(Lattice::Def(out));
        if result.is_overdef() {
            break;
        }
    }
    result
}

fn apply_lattice(logic: &mut LogicList, lattice: &[Lattice]) -> bool {
    let mut changed = false;

    // Fold constant inputs out of every table. A fully folded table has
    // zero inputs and one entry: a constant.
    for lut in &mut logic.luts {
        let consts: Vec<Option<bool>> =
            lut.inputs.iter().map(|&input| lattice[input.0].as_def()).collect();
        if consts.iter().all(|c| c.is_none()) {
            continue;
        }
        let kept: Vec<usize> =
            (0..lut.inputs.len()).filter(|&i| consts[i].is_none()).collect();

        let mut fixed = 0usize;
        for (pos, c) in consts.iter().enumerate() {
            if *c == Some(true) {
                fixed |= 1 << pos;
            }
        }
        let mut new_table = Vec::with_capacity(1usize << kept.len());
        for row in 0..1usize << kept.len() {
            let mut index = fixed;
            for (j, &pos) in kept.iter().enumerate() {
                if row >> j & 1 != 0 {
                    index |= 1 << pos;
                }
            }
            new_table.push(lut.table[index]);
        }
        let new_inputs: Vec<SignalId> = kept.iter().map(|&pos| lut.inputs[pos]).collect();
        lut.inputs = new_inputs;
        lut.table = new_table;
        changed = true;
    }

    // FFs whose output settled on a constant become constant LUTs
    // driving the same signal.
    let const_ffs: Vec<(usize, SignalId, bool)> = logic
        .ffs
        .iter()
        .enumerate()
        .filter_map(|(i, ff)| lattice[ff.output.0].as_def().map(|v| (i, ff.output, v)))
        .collect();
    for &(i, output, value) in const_ffs.iter().rev() {
        logic.ffs.remove(i);
        logic.push_lut(Lut { output, inputs: Vec::new(), table: vec![value] });
        tracing::debug!(
            signal = %logic.describe(output),
            value,
            "constant flip-flop replaced by constant LUT"
        );
        changed = true;
    }

    // Components stuck at ⊥ are suspicious but legal; the surrounding
    // passes may still make them dead.
    for lut in &logic.luts {
        if lattice[lut.output.0].is_undef() {
            tracing::warn!("{} never receives a defined value", logic.describe(lut.output));
        }
    }
    for ff in &logic.ffs {
        if lattice[ff.output.0].is_undef() {
            tracing::warn!("{} never receives a defined value", logic.describe(ff.output));
        }
    }

    changed
}

// ----------------------------------------------------------------------
// Dead code elimination
// ----------------------------------------------------------------------

/// Backward reachability from {external outputs ∪ external inputs};
/// unreached LUTs, FFs and signals are deleted. Returns whether the
/// total count decreased.
pub fn remove_dead(logic: &mut LogicList) -> bool {
    let n = logic.signal_len();
    let use_def = UseDef::build(logic);

    // Staged connections (normally resolved before this pass runs) keep
    // both endpoints alive together.
    let mut linked: HashMap<usize, Vec<usize>> = HashMap::new();
    for &(a, b) in logic.pending_connections() {
        linked.entry(a.0).or_default().push(b.0);
        linked.entry(b.0).or_default().push(a.0);
    }

    let mut live = vec![false; n];
    let mut worklist: Vec<SignalId> = Vec::new();
    for &s in logic.external_outputs.iter().chain(logic.external_inputs.iter()) {
        if !live[s.0] {
            live[s.0] = true;
            worklist.push(s);
        }
    }

    while let Some(s) = worklist.pop() {
        let mark = |id: SignalId, live: &mut Vec<bool>, worklist: &mut Vec<SignalId>| {
            if !live[id.0] {
                live[id.0] = true;
                worklist.push(id);
            }
        };
        match use_def.def(s) {
            Some(Def::Lut(i)) => {
                for &input in &logic.luts[i].inputs {
                    mark(input, &mut live, &mut worklist);
                }
            }
            Some(Def::Ff(i)) => {
                let input = logic.ffs[i].input;
                mark(input, &mut live, &mut worklist);
            }
            _ => {}
        }
        if let Some(partners) = linked.get(&s.0) {
            for &p in partners {
                mark(SignalId(p), &mut live, &mut worklist);
            }
        }
    }

    let before =
        logic.luts.len() + logic.ffs.len() + logic.live_signal_count();
    logic.luts.retain(|lut| live[lut.output.0]);
    logic.ffs.retain(|ff| live[ff.output.0]);
    for i in 0..n {
        let id = SignalId(i);
        if !live[i] && logic.is_live(id) {
            logic.kill_signal(id);
        }
    }
    let after = logic.luts.len() + logic.ffs.len() + logic.live_signal_count();

    if before != after {
        tracing::debug!(removed = before - after, "dead code elimination");
    }
    before != after
}

// ----------------------------------------------------------------------
// Structural deduplication
// ----------------------------------------------------------------------

/// Collapse structurally identical LUTs and FFs onto the first member of
/// each class, rerouting every use of the duplicates' outputs. Iterates
/// internally until stable, so a second invocation is a no-op.
pub fn deduplicate(logic: &mut LogicList) -> bool {
    let mut changed = false;
    loop {
        let mut replace: Vec<(SignalId, SignalId)> = Vec::new();

        let mut seen_luts: HashMap<(Vec<SignalId>, Vec<bool>), SignalId> = HashMap::new();
        let mut dead_luts: Vec<usize> = Vec::new();
        for (i, lut) in logic.luts.iter().enumerate() {
            let key = (lut.inputs.clone(), lut.table.clone());
            if let Some(&kept) = seen_luts.get(&key) {
                replace.push((lut.output, kept));
                dead_luts.push(i);
            } else {
                seen_luts.insert(key, lut.output);
            }
        }

        let mut seen_ffs: HashMap<(SignalId, bool), SignalId> = HashMap::new();
        let mut dead_ffs: Vec<usize> = Vec::new();
        for (i, ff) in logic.ffs.iter().enumerate() {
            let key = (ff.input, ff.init);
            if let Some(&kept) = seen_ffs.get(&key) {
                replace.push((ff.output, kept));
                dead_ffs.push(i);
            } else {
                seen_ffs.insert(key, ff.output);
            }
        }

        if replace.is_empty() {
            break;
        }
        for &i in dead_luts.iter().rev() {
            logic.luts.remove(i);
        }
        for &i in dead_ffs.iter().rev() {
            logic.ffs.remove(i);
        }
        let mut rewired = 0usize;
        for &(dup, kept) in &replace {
            rewired += rewrite_uses(logic, dup, kept);
        }
        tracing::debug!(duplicates = replace.len(), rewired, "structural dedup");
        changed = true;
    }
    changed
}

/// Rewrite every *use* of `old` (LUT inputs, FF inputs, external-output
/// marks, staged connections) to `new`, leaving definitions alone.
fn rewrite_uses(logic: &mut LogicList, old: SignalId, new: SignalId) -> usize {
    let mut count = 0usize;
    for lut in &mut logic.luts {
        for input in &mut lut.inputs {
            if *input == old {
                *input = new;
                count += 1;
            }
        }
    }
    for ff in &mut logic.ffs {
        if ff.input == old {
            ff.input = new;
            count += 1;
        }
    }
    if logic.external_outputs.remove(&old) {
        logic.external_outputs.insert(new);
        // The boundary label must stay observable on the surviving net.
        if logic.signal(new).special_name.is_none() {
            let taken = logic.signal_mut(old).special_name.take();
            logic.signal_mut(new).special_name = taken;
        }
        count += 1;
    }
    for (a, b) in &mut logic.connections {
        if *a == old {
            *a = new;
            count += 1;
        }
        if *b == old {
            *b = new;
            count += 1;
        }
    }
    count
}

// ----------------------------------------------------------------------
// Peephole
// ----------------------------------------------------------------------

/// Remove identity buffers, merging the buffered output into the input.
/// New local rewrites belong in this pass.
pub fn peephole(logic: &mut LogicList) -> bool {
    let mut changed = false;
    loop {
        let buffer = logic
            .luts
            .iter()
            .position(|lut| lut.inputs.len() == 1 && lut.table[..] == [false, true]);
        let Some(i) = buffer else { break };
        let lut = logic.luts.remove(i);
        tracing::debug!(
            input = %logic.describe(lut.inputs[0]),
            output = %logic.describe(lut.output),
            "identity buffer removed"
        );
        logic.merge_signals(lut.inputs[0], lut.output);
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::LogicBuilder;
    use crate::logic::ValidateFlags;

    fn validate(logic: &LogicList) {
        logic.validate(ValidateFlags::default()).expect("invariants must hold");
    }

    #[test]
    fn identity_buffer_is_removed_and_merged() {
        let mut logic = LogicList::new();
        let mut b = LogicBuilder::new(&mut logic);
        let x = b.new_bit("x");
        b.mark_input(x);
        let buffered = b.xor(&[x]); // one-input parity = identity buffer
        b.mark_output(buffered);
        b.finish();

        assert!(peephole(&mut logic));
        assert!(logic.luts.is_empty());
        assert!(logic.external_outputs.contains(&x.0));
        assert!(!logic.is_live(buffered.0));
        validate(&logic);
        // Second run finds nothing.
        assert!(!peephole(&mut logic));
    }

    #[test]
    fn dead_register_is_removed() {
        // Two registers, only one observed (scenario: dead code).
        let mut logic = LogicList::new();
        let mut b = LogicBuilder::new(&mut logic);

        let live_in = b.new_bit("live_d");
        b.mark_input(live_in);
        let live_q = b.delay(live_in, false);
        b.mark_output(live_q);

        let dead_in = b.new_bit("dead_d");
        b.mark_input(dead_in);
        let dead_feed = b.not(dead_in);
        let _dead_q = b.delay(dead_feed, true);

        b.finish();
        validate(&logic);

        assert!(remove_dead(&mut logic));
        assert_eq!(logic.ffs.len(), 1);
        assert!(logic.luts.is_empty());
        assert_eq!(logic.ffs[0].output, live_q.0);
        validate(&logic);
        assert!(!remove_dead(&mut logic));

        // The surviving register still follows its input.
        let mut schedule = crate::sim::InputSchedule::new();
        schedule.drive(live_in.0, vec![true, false, true]);
        let history = crate::sim::simulate(&logic, &schedule, 3).unwrap();
        assert_eq!(
            history.signal_trace(live_q.0),
            vec![Some(false), Some(true), Some(false)]
        );
    }

    #[test]
    fn dedup_collapses_identical_luts_and_reroutes() {
        let mut logic = LogicList::new();
        let mut b = LogicBuilder::new(&mut logic);
        let x = b.new_bit("x");
        let y = b.new_bit("y");
        b.mark_input(x);
        b.mark_input(y);

        let and_a = b.and2(x, y);
        let and_b = b.and2(x, y);
        let down_a = b.not(and_a);
        let down_b = b.delay(and_b, false);
        b.mark_output(down_a);
        b.mark_output(down_b);
        b.finish();

        assert!(deduplicate(&mut logic));
        // One AND left; both consumers read the kept output.
        let ands: Vec<&Lut> =
            logic.luts.iter().filter(|l| l.inputs.len() == 2).collect();
        assert_eq!(ands.len(), 1);
        let kept = ands[0].output;
        let not_lut = logic.luts.iter().find(|l| l.inputs.len() == 1).unwrap();
        assert_eq!(not_lut.inputs[0], kept);
        assert_eq!(logic.ffs[0].input, kept);
        validate(&logic);

        // Confluence: a second run changes nothing.
        assert!(!deduplicate(&mut logic));
    }

    #[test]
    fn dedup_cascades_through_rewired_consumers() {
        let mut logic = LogicList::new();
        let mut b = LogicBuilder::new(&mut logic);
        let x = b.new_bit("x");
        let y = b.new_bit("y");
        b.mark_input(x);
        b.mark_input(y);

        // Two identical AND trees; the upper layer only becomes
        // identical after the lower layer is collapsed.
        let a1 = b.and2(x, y);
        let a2 = b.and2(x, y);
        let n1 = b.not(a1);
        let n2 = b.not(a2);
        b.mark_output(n1);
        b.mark_output(n2);
        b.finish();

        assert!(deduplicate(&mut logic));
        assert_eq!(logic.luts.len(), 2); // one AND, one NOT
        validate(&logic);
        assert!(!deduplicate(&mut logic));
    }

    #[test]
    fn const_prop_through_ff_eliminates_register() {
        // A register fed by constant 0 and initialized to 0: every
        // downstream use sees the constant and the register goes away.
        let mut logic = LogicList::new();
        let mut b = LogicBuilder::new(&mut logic);
        let zero = b.const_bit(false);
        let q = b.delay(zero, false);
        let out = b.not(q);
        b.mark_output(out);
        b.finish();

        optimize(&mut logic).unwrap();

        // Only constant LUTs remain; the observed output is constant 1.
        assert!(logic.ffs.is_empty());
        let out_lut = logic
            .luts
            .iter()
            .find(|l| logic.external_outputs.contains(&l.output))
            .expect("output must stay driven");
        assert!(out_lut.inputs.is_empty());
        assert_eq!(out_lut.table, vec![true]);
        validate(&logic);
    }

    #[test]
    fn const_prop_folds_constant_inputs_out_of_tables() {
        let mut logic = LogicList::new();
        let mut b = LogicBuilder::new(&mut logic);
        let x = b.new_bit("x");
        b.mark_input(x);
        let one = b.const_bit(true);
        let anded = b.and2(x, one); // x & 1 == x
        b.mark_output(anded);
        b.finish();

        assert!(const_propagation(&mut logic));
        let and_lut = logic
            .luts
            .iter()
            .find(|l| l.output == anded.0)
            .expect("AND must survive as a one-input table");
        assert_eq!(and_lut.inputs, vec![x.0]);
        assert_eq!(and_lut.table, vec![false, true]);
        validate(&logic);

        // The folded table is now an identity buffer; peephole finishes
        // the job and routes the output mark to the input.
        assert!(peephole(&mut logic));
        assert!(logic.external_outputs.contains(&x.0));
        validate(&logic);
    }

    #[test]
    fn const_prop_keeps_oscillating_register_overdef() {
        // q' = !q is a perfectly fine sequential loop; the lattice must
        // end at Overdef and nothing may be rewritten.
        let mut logic = LogicList::new();
        let mut b = LogicBuilder::new(&mut logic);
        let q = b.new_bit("q");
        let d = b.not(q);
        let q_reg = b.delay(d, false);
        b.connect(q, q_reg);
        b.mark_output(q);
        b.finish();

        assert!(!const_propagation(&mut logic));
        assert_eq!(logic.ffs.len(), 1);
        assert_eq!(logic.luts.len(), 1);
        validate(&logic);
    }

    #[test]
    fn optimizer_refuses_open_builder_scope() {
        let mut logic = LogicList::new();
        logic.open_builders = 1;
        assert!(matches!(optimize(&mut logic), Err(LogicError::BuilderOpen(1))));
    }

    /// Random valid design: LUTs only read signals created before them,
    /// so the combinational graph is acyclic by construction; FFs may
    /// read anything already present.
    fn random_design(seed: u64) -> (LogicList, Vec<crate::logic::SignalId>) {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(seed);
        let mut logic = LogicList::new();
        let mut pool: Vec<crate::logic::SignalId> = Vec::new();
        let mut inputs = Vec::new();

        for i in 0..rng.gen_range(2..5) {
            let s = logic.new_signal_named(Some(&format!("in{i}")));
            logic.mark_external_input(s);
            pool.push(s);
            inputs.push(s);
        }

        for _ in 0..rng.gen_range(10..30) {
            if rng.gen_bool(0.2) {
                let input = pool[rng.gen_range(0..pool.len())];
                pool.push(logic.new_ff(input, rng.gen_bool(0.5)));
            } else {
                let k = rng.gen_range(0..=3usize.min(pool.len()));
                let mut gate_inputs = Vec::with_capacity(k);
                for _ in 0..k {
                    gate_inputs.push(pool[rng.gen_range(0..pool.len())]);
                }
                let table = (0..1usize << k).map(|_| rng.gen_bool(0.5)).collect();
                pool.push(logic.new_lut(gate_inputs, table));
            }
        }

        // One labelled output. (Merging passes may legitimately unify
        // two observed nets into one, which would collapse two labels
        // into one; a single label keeps the comparison exact.)
        let s = pool[rng.gen_range(0..pool.len())];
        logic.mark_external_output(s);
        logic.signal_mut(s).special_name = Some("o0".to_owned());

        (logic, inputs)
    }

    #[test]
    fn optimization_preserves_behavior_on_random_designs() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        for seed in 0..20u64 {
            let (mut logic, inputs) = random_design(seed);
            validate(&logic);

            let steps = 6;
            let mut schedule = crate::sim::InputSchedule::new();
            let mut sched_rng = StdRng::seed_from_u64(seed ^ 0xDEAD);
            for &input in &inputs {
                let bits = (0..steps).map(|_| sched_rng.gen_bool(0.5)).collect();
                schedule.drive(input, bits);
            }

            let before =
                crate::sim::simulate(&logic, &schedule, steps).unwrap().observable(&logic);
            optimize(&mut logic).unwrap();
            validate(&logic);
            let after =
                crate::sim::simulate(&logic, &schedule, steps).unwrap().observable(&logic);
            assert_eq!(before, after, "seed {seed}");
        }
    }

    #[test]
    fn passes_are_idempotent_on_random_designs() {
        for seed in 0..20u64 {
            let (mut logic, _) = random_design(seed);
            optimize(&mut logic).unwrap();

            // A fixed point really is one: every pass reports no change.
            assert!(!const_propagation(&mut logic), "seed {seed}");
            assert!(!remove_dead(&mut logic), "seed {seed}");
            assert!(!deduplicate(&mut logic), "seed {seed}");
            assert!(!peephole(&mut logic), "seed {seed}");
            validate(&logic);
        }
    }

    #[test]
    fn every_pass_preserves_invariants_on_a_mixed_design() {
        let mut logic = LogicList::new();
        let mut b = LogicBuilder::new(&mut logic);
        let x = b.new_bit("x");
        b.mark_input(x);
        let one = b.const_bit(true);
        let a = b.and2(x, one);
        let o = b.or2(a, x);
        let o_dup = b.or2(a, x);
        let q = b.delay(o, false);
        let _dead = b.not(o_dup);
        b.mark_output(q);
        b.finish();
        validate(&logic);

        const_propagation(&mut logic);
        validate(&logic);
        remove_dead(&mut logic);
        validate(&logic);
        deduplicate(&mut logic);
        validate(&logic);
        peephole(&mut logic);
        validate(&logic);
        optimize(&mut logic).unwrap();
        validate(&logic);
    }
}
