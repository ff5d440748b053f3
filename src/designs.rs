//! Built-in demo designs
//!
//! Small circuits used by the CLI driver and the end-to-end tests. Every
//! boundary signal carries an external-facing label so simulation
//! results can be compared across optimization.

#![forbid(unsafe_code)]

use crate::builder::{Bit, LogicBuilder, Unsigned};
use crate::logic::LogicList;

/// Boundary handles of the bit-serial adder design.
pub struct SerialAdderIo {
    /// Operand stream `a`, least significant bit first.
    pub a: Bit,
    /// Operand stream `b`, least significant bit first.
    pub b: Bit,
    /// Sum stream, one result bit per step.
    pub sum: Bit,
}

/// Boundary handles of the shifter design.
pub struct ShifterIo {
    /// 3-bit data input `x`.
    pub x: Unsigned,
    /// 2-bit shift amount `s`.
    pub shift: Unsigned,
    /// 3-bit output `y = x << s`, zero-filled, truncated.
    pub y: Unsigned,
}

/// Free-running counter: a `bits`-wide register whose next state is its
/// current state plus one, carry discarded. The output bits are external
/// and labelled `count0..`.
pub fn build_counter(logic: &mut LogicList, bits: usize) -> Unsigned {
    let mut b = LogicBuilder::new(logic);
    let curr = b.new_unsigned(bits, "count");
    let next = b.add_const_trunc(&curr, 1);
    let reg = b.delay_unsigned(&next, 0);
    b.connect_unsigned(&curr, &reg)
        .expect("register width matches by construction");
    for i in 0..bits {
        b.mark_output(curr.bit(i));
        b.set_special(curr.bit(i), &format!("count{i}"));
    }
    b.finish();
    curr
}

/// Barrel shifter: `y = x << s` with zero fill, truncated to the input
/// width. Inputs are labelled `x0..`/`s0..`, outputs `y0..`.
pub fn build_shifter(logic: &mut LogicList) -> ShifterIo {
    let mut b = LogicBuilder::new(logic);

    let x = b.new_unsigned(3, "x");
    let shift = b.new_unsigned(2, "s");
    for i in 0..x.width() {
        b.mark_input(x.bit(i));
        b.set_special(x.bit(i), &format!("x{i}"));
    }
    for i in 0..shift.width() {
        b.mark_input(shift.bit(i));
        b.set_special(shift.bit(i), &format!("s{i}"));
    }

    // One mux layer per shift-amount bit.
    let by_one = b.shl_const(&x, 1);
    let stage0 = b
        .mux_unsigned(shift.bit(0), &by_one, &x)
        .expect("stage widths match by construction");
    let by_two = b.shl_const(&stage0, 2);
    let y = b
        .mux_unsigned(shift.bit(1), &by_two, &stage0)
        .expect("stage widths match by construction");

    for i in 0..y.width() {
        b.mark_output(y.bit(i));
        b.set_special(y.bit(i), &format!("y{i}"));
    }
    b.finish();

    ShifterIo { x, shift, y }
}

/// Bit-serial adder: one full adder plus a carry register fed back
/// through a deferred connection. Streams both operands LSB first and
/// produces one sum bit per step.
pub fn build_serial_adder(logic: &mut LogicList) -> SerialAdderIo {
    let mut b = LogicBuilder::new(logic);

    let op_a = b.new_bit("a");
    let op_b = b.new_bit("b");
    b.mark_input(op_a);
    b.mark_input(op_b);
    b.set_special(op_a, "a");
    b.set_special(op_b, "b");

    let carry = b.new_bit("carry");
    let (sum, carry_next) = b.full_add(op_a, op_b, carry);
    let carry_reg = b.delay(carry_next, false);
    b.connect(carry, carry_reg);

    b.mark_output(sum);
    b.set_special(sum, "sum");
    b.finish();

    SerialAdderIo { a: op_a, b: op_b, sum }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::ValidateFlags;

    #[test]
    fn counter_validates() {
        let mut logic = LogicList::new();
        let out = build_counter(&mut logic, 4);
        assert_eq!(out.width(), 4);
        assert!(logic.validate(ValidateFlags::default()).is_ok());
        assert_eq!(logic.ffs.len(), 4);
        assert_eq!(logic.external_outputs.len(), 4);
    }

    #[test]
    fn serial_adder_validates() {
        let mut logic = LogicList::new();
        let io = build_serial_adder(&mut logic);
        assert!(logic.validate(ValidateFlags::default()).is_ok());
        assert_eq!(logic.ffs.len(), 1);
        assert!(logic.external_outputs.contains(&io.sum.0));
    }

    #[test]
    fn shifter_validates() {
        let mut logic = LogicList::new();
        let io = build_shifter(&mut logic);
        assert_eq!(io.y.width(), 3);
        assert!(logic.validate(ValidateFlags::default()).is_ok());
        assert_eq!(logic.external_inputs.len(), 5);
        assert_eq!(logic.external_outputs.len(), 3);
    }
}
