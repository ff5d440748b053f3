//! Circuit construction surface
//!
//! Front-end designs talk to the logic IR exclusively through
//! [`LogicBuilder`]: a scope guard over a [`LogicList`] that creates
//! signals, gates and registers, and stages deferred connections which
//! are resolved by signal merge when the scope closes.
//!
//! The builder tracks an open-scope counter on the list; validation and
//! optimization fail fast while any scope is open. Dropping a builder
//! without calling [`LogicBuilder::finish`] closes the scope but leaves
//! the staged connections in place, to be bridged at lowering.
//!
//! Gate construction is table-based. Tables are little-endian indexed
//! like the IR; XOR uses the parity convention (`table[i]` is set when
//! `i` has an odd number of one bits). [`LogicBuilder::mux`] selects its
//! first data operand when the selector is high.
//!
//! On top of the raw [`Bit`] primitives sit [`BitVec`] and [`Unsigned`]
//! (little-endian), with ripple-carry addition, constant shifts and
//! per-bit registers.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use crate::logic::{LogicList, SignalId};

/// Width or shape errors from the typed builder surface.
#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    #[error("operand widths differ ({left} vs {right})")]
    WidthMismatch { left: usize, right: usize },
}

/// A single one-bit signal handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Bit(pub SignalId);

impl Bit {
    /// The underlying signal.
    #[inline]
    pub fn signal(self) -> SignalId {
        self.0
    }
}

/// An ordered group of bits, least significant first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitVec(pub Vec<Bit>);

impl BitVec {
    /// Number of bits.
    #[inline]
    pub fn width(&self) -> usize {
        self.0.len()
    }

    /// Bit `i` (0 = least significant).
    #[inline]
    pub fn bit(&self, i: usize) -> Bit {
        self.0[i]
    }

    /// All bits, least significant first.
    #[inline]
    pub fn bits(&self) -> &[Bit] {
        &self.0
    }
}

/// A little-endian unsigned integer over a [`BitVec`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unsigned(pub BitVec);

impl Unsigned {
    /// Number of bits.
    #[inline]
    pub fn width(&self) -> usize {
        self.0.width()
    }

    /// Bit `i` (0 = least significant).
    #[inline]
    pub fn bit(&self, i: usize) -> Bit {
        self.0.bit(i)
    }

    /// All bits, least significant first.
    #[inline]
    pub fn bits(&self) -> &[Bit] {
        self.0.bits()
    }
}

/// Build a truth table of `2^k` entries from a predicate over the input
/// pattern (little-endian: bit `i` of the pattern is input `i`).
pub fn table_from_fn(k: usize, f: impl Fn(usize) -> bool) -> Vec<bool> {
    (0..1usize << k).map(f).collect()
}

/// Scoped construction handle over a [`LogicList`].
pub struct LogicBuilder<'l> {
    logic: &'l mut LogicList,
}

impl<'l> LogicBuilder<'l> {
    /// Open a builder scope.
    pub fn new(logic: &'l mut LogicList) -> Self {
        logic.open_builders += 1;
        LogicBuilder { logic }
    }

    /// Close the scope and resolve every staged connection by signal
    /// merge (smallest id canonical).
    pub fn finish(self) {
        self.logic.resolve_connections();
        // Drop closes the scope counter.
    }

    // ------------------------------------------------------------------
    // Bit primitives
    // ------------------------------------------------------------------

    /// Fresh undriven bit with a debug name.
    pub fn new_bit(&mut self, name: &str) -> Bit {
        Bit(self.logic.new_signal_named(Some(name)))
    }

    /// Constant bit, realized as a zero-input LUT.
    pub fn const_bit(&mut self, value: bool) -> Bit {
        Bit(self.logic.new_lut(Vec::new(), vec![value]))
    }

    /// Inverter.
    pub fn not(&mut self, a: Bit) -> Bit {
        Bit(self.logic.new_lut(vec![a.0], vec![true, false]))
    }

    /// N-ary AND. Empty input reduces to constant true.
    pub fn and(&mut self, inputs: &[Bit]) -> Bit {
        let k = inputs.len();
        let table = table_from_fn(k, |bits| bits == (1usize << k) - 1);
        self.gate(inputs, table)
    }

    /// N-ary OR. Empty input reduces to constant false.
    pub fn or(&mut self, inputs: &[Bit]) -> Bit {
        let table = table_from_fn(inputs.len(), |bits| bits != 0);
        self.gate(inputs, table)
    }

    /// N-ary XOR, parity convention: output is set when an odd number of
    /// inputs are set.
    pub fn xor(&mut self, inputs: &[Bit]) -> Bit {
        let table = table_from_fn(inputs.len(), |bits| bits.count_ones() % 2 == 1);
        self.gate(inputs, table)
    }

    /// Two-input AND.
    pub fn and2(&mut self, a: Bit, b: Bit) -> Bit {
        self.and(&[a, b])
    }

    /// Two-input OR.
    pub fn or2(&mut self, a: Bit, b: Bit) -> Bit {
        self.or(&[a, b])
    }

    /// Two-input XOR.
    pub fn xor2(&mut self, a: Bit, b: Bit) -> Bit {
        self.xor(&[a, b])
    }

    /// Select `a` when `sel` is high, `b` otherwise.
    pub fn mux(&mut self, sel: Bit, a: Bit, b: Bit) -> Bit {
        let table = table_from_fn(3, |bits| {
            let s = bits & 1 != 0;
            let av = bits >> 1 & 1 != 0;
            let bv = bits >> 2 & 1 != 0;
            if s {
                av
            } else {
                bv
            }
        });
        self.gate(&[sel, a, b], table)
    }

    /// Full adder over `(a, b, carry_in)`, returning `(sum, carry_out)`.
    pub fn full_add(&mut self, a: Bit, b: Bit, c: Bit) -> (Bit, Bit) {
        let sum = self.xor(&[a, b, c]);
        let carry_table = table_from_fn(3, |bits| bits.count_ones() >= 2);
        let carry = self.gate(&[a, b, c], carry_table);
        (sum, carry)
    }

    /// Register: output follows `d` one step later, `init` on step 0.
    pub fn delay(&mut self, d: Bit, init: bool) -> Bit {
        Bit(self.logic.new_ff(d.0, init))
    }

    /// Stage a deferred connection between two bits, unified by signal
    /// merge when the scope closes.
    pub fn connect(&mut self, a: Bit, b: Bit) {
        self.logic.stage_connection(a.0, b.0);
    }

    fn gate(&mut self, inputs: &[Bit], table: Vec<bool>) -> Bit {
        let signals = inputs.iter().map(|b| b.0).collect();
        Bit(self.logic.new_lut(signals, table))
    }

    // ------------------------------------------------------------------
    // External marks
    // ------------------------------------------------------------------

    /// Mark a bit as assigned from outside the design.
    pub fn mark_input(&mut self, bit: Bit) {
        self.logic.mark_external_input(bit.0);
    }

    /// Mark a bit as observed at the design boundary.
    pub fn mark_output(&mut self, bit: Bit) {
        self.logic.mark_external_output(bit.0);
    }

    /// Attach the external-facing label to a bit.
    pub fn set_special(&mut self, bit: Bit, name: &str) {
        self.logic.signal_mut(bit.0).special_name = Some(name.to_owned());
    }

    // ------------------------------------------------------------------
    // Vectors
    // ------------------------------------------------------------------

    /// Fresh undriven vector; bits are named `{prefix}{i}`.
    pub fn new_bitvec(&mut self, width: usize, prefix: &str) -> BitVec {
        let bits = (0..width).map(|i| self.new_bit(&format!("{prefix}{i}"))).collect();
        BitVec(bits)
    }

    /// Fresh undriven unsigned integer; bits are named `{prefix}{i}`.
    pub fn new_unsigned(&mut self, width: usize, prefix: &str) -> Unsigned {
        Unsigned(self.new_bitvec(width, prefix))
    }

    /// Constant unsigned integer (little-endian bits of `value`).
    pub fn const_unsigned(&mut self, width: usize, value: u64) -> Unsigned {
        let bits = (0..width).map(|i| self.const_bit(value >> i & 1 != 0)).collect();
        Unsigned(BitVec(bits))
    }

    /// Ripple-carry addition with the carry out discarded.
    pub fn add_trunc(&mut self, a: &Unsigned, b: &Unsigned) -> Result<Unsigned, BuilderError> {
        check_width(a.width(), b.width())?;
        let mut bits = Vec::with_capacity(a.width());
        let mut carry: Option<Bit> = None;
        for i in 0..a.width() {
            let (ai, bi) = (a.bit(i), b.bit(i));
            let (sum, carry_out) = match carry {
                None => (self.xor2(ai, bi), self.and2(ai, bi)),
                Some(c) => self.full_add(ai, bi, c),
            };
            bits.push(sum);
            carry = Some(carry_out);
        }
        Ok(Unsigned(BitVec(bits)))
    }

    /// Add a small constant, truncating the carry out.
    pub fn add_const_trunc(&mut self, a: &Unsigned, value: u64) -> Unsigned {
        let b = self.const_unsigned(a.width(), value);
        self.add_trunc(a, &b).expect("constant operand has matching width")
    }

    /// Per-bit mux: `a` when `sel` is high, `b` otherwise.
    pub fn mux_unsigned(
        &mut self,
        sel: Bit,
        a: &Unsigned,
        b: &Unsigned,
    ) -> Result<Unsigned, BuilderError> {
        check_width(a.width(), b.width())?;
        let bits = (0..a.width()).map(|i| self.mux(sel, a.bit(i), b.bit(i))).collect();
        Ok(Unsigned(BitVec(bits)))
    }

    /// Left shift by a constant amount, zero-filled, width preserved.
    pub fn shl_const(&mut self, a: &Unsigned, amount: usize) -> Unsigned {
        let bits = (0..a.width())
            .map(|i| {
                if i < amount {
                    self.const_bit(false)
                } else {
                    a.bit(i - amount)
                }
            })
            .collect();
        Unsigned(BitVec(bits))
    }

    /// One register per bit; bit `i` initializes to bit `i` of `init`.
    pub fn delay_unsigned(&mut self, d: &Unsigned, init: u64) -> Unsigned {
        let bits = (0..d.width()).map(|i| self.delay(d.bit(i), init >> i & 1 != 0)).collect();
        Unsigned(BitVec(bits))
    }

    /// Stage per-bit deferred connections between equal-width values.
    pub fn connect_unsigned(&mut self, a: &Unsigned, b: &Unsigned) -> Result<(), BuilderError> {
        check_width(a.width(), b.width())?;
        for i in 0..a.width() {
            self.connect(a.bit(i), b.bit(i));
        }
        Ok(())
    }
}

impl Drop for LogicBuilder<'_> {
    fn drop(&mut self) {
        self.logic.open_builders -= 1;
    }
}

fn check_width(left: usize, right: usize) -> Result<(), BuilderError> {
    if left == right {
        Ok(())
    } else {
        Err(BuilderError::WidthMismatch { left, right })
    }
}
