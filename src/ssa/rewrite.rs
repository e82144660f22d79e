//! Generic algebraic rewrite rules.
//!
//! Folds an operation whose arguments are all constant literals into the
//! matching constant opcode, in place. Arithmetic wraps at the operation
//! width; unsigned variants reinterpret the stored payload; comparison
//! results become ConstBool. Callers never see a partial rewrite: either a
//! rule matches and the value is reset to a constant, or the value is left
//! untouched.

use crate::ssa::*;

/// Applies the generic rules to `v` in place. Returns whether any rule
/// matched.
pub fn rewrite_value_generic(f: &mut Func, v: ValueId) -> bool {
    let folded = {
        let val = &f.values[v];
        if val.args.len() != 2 {
            None
        } else {
            let a = &f.values[val.args[0]];
            let b = &f.values[val.args[1]];
            if a.op.is_const() && b.op.is_const() {
                fold_binary(val.op, a, b)
            } else {
                None
            }
        }
    };
    match folded {
        Some((op, aux)) => {
            f.reset_value(v, op);
            f.values[v].aux_int = aux;
            true
        }
        None => false,
    }
}

fn c8(v: i8) -> (Op, i64) {
    (Op::Const8, v as i64)
}

fn c16(v: i16) -> (Op, i64) {
    (Op::Const16, v as i64)
}

fn c32(v: i32) -> (Op, i64) {
    (Op::Const32, v as i64)
}

fn c64(v: i64) -> (Op, i64) {
    (Op::Const64, v)
}

fn cbool(v: bool) -> (Op, i64) {
    (Op::ConstBool, v as i64)
}

fn c32f(v: f32) -> (Op, i64) {
    (Op::Const32F, aux_from_f32(v))
}

fn c64f(v: f64) -> (Op, i64) {
    (Op::Const64F, aux_from_f64(v))
}

fn fold_binary(op: Op, a: &Value, b: &Value) -> Option<(Op, i64)> {
    use Op::*;
    match op {
        // add
        Add8 => Some(c8(a.aux_i8().wrapping_add(b.aux_i8()))),
        Add16 => Some(c16(a.aux_i16().wrapping_add(b.aux_i16()))),
        Add32 => Some(c32(a.aux_i32().wrapping_add(b.aux_i32()))),
        Add64 => Some(c64(a.aux_i64().wrapping_add(b.aux_i64()))),
        Add32F => Some(c32f(a.aux_f32() + b.aux_f32())),
        Add64F => Some(c64f(a.aux_f64() + b.aux_f64())),

        // sub
        Sub8 => Some(c8(a.aux_i8().wrapping_sub(b.aux_i8()))),
        Sub16 => Some(c16(a.aux_i16().wrapping_sub(b.aux_i16()))),
        Sub32 => Some(c32(a.aux_i32().wrapping_sub(b.aux_i32()))),
        Sub64 => Some(c64(a.aux_i64().wrapping_sub(b.aux_i64()))),
        Sub32F => Some(c32f(a.aux_f32() - b.aux_f32())),
        Sub64F => Some(c64f(a.aux_f64() - b.aux_f64())),

        // mul
        Mul8 => Some(c8(a.aux_i8().wrapping_mul(b.aux_i8()))),
        Mul16 => Some(c16(a.aux_i16().wrapping_mul(b.aux_i16()))),
        Mul32 => Some(c32(a.aux_i32().wrapping_mul(b.aux_i32()))),
        Mul64 => Some(c64(a.aux_i64().wrapping_mul(b.aux_i64()))),
        Mul32F => Some(c32f(a.aux_f32() * b.aux_f32())),
        Mul64F => Some(c64f(a.aux_f64() * b.aux_f64())),

        // signed div, truncating toward zero; MIN / -1 wraps
        Div8 if b.aux_i8() != 0 => Some(c8(a.aux_i8().wrapping_div(b.aux_i8()))),
        Div16 if b.aux_i16() != 0 => Some(c16(a.aux_i16().wrapping_div(b.aux_i16()))),
        Div32 if b.aux_i32() != 0 => Some(c32(a.aux_i32().wrapping_div(b.aux_i32()))),
        Div64 if b.aux_i64() != 0 => Some(c64(a.aux_i64().wrapping_div(b.aux_i64()))),

        // unsigned div
        Div8u if b.aux_u8() != 0 => Some(c8((a.aux_u8() / b.aux_u8()) as i8)),
        Div16u if b.aux_u16() != 0 => Some(c16((a.aux_u16() / b.aux_u16()) as i16)),
        Div32u if b.aux_u32() != 0 => Some(c32((a.aux_u32() / b.aux_u32()) as i32)),
        Div64u if b.aux_u64() != 0 => Some(c64((a.aux_u64() / b.aux_u64()) as i64)),

        // float div
        Div32F if b.aux_int != 0 => Some(c32f(a.aux_f32() / b.aux_f32())),
        Div64F if b.aux_int != 0 => Some(c64f(a.aux_f64() / b.aux_f64())),

        // signed mod; MIN % -1 is 0
        Mod8 if b.aux_i8() != 0 => Some(c8(a.aux_i8().wrapping_rem(b.aux_i8()))),
        Mod16 if b.aux_i16() != 0 => Some(c16(a.aux_i16().wrapping_rem(b.aux_i16()))),
        Mod32 if b.aux_i32() != 0 => Some(c32(a.aux_i32().wrapping_rem(b.aux_i32()))),
        Mod64 if b.aux_i64() != 0 => Some(c64(a.aux_i64().wrapping_rem(b.aux_i64()))),

        // unsigned mod
        Mod8u if b.aux_u8() != 0 => Some(c8((a.aux_u8() % b.aux_u8()) as i8)),
        Mod16u if b.aux_u16() != 0 => Some(c16((a.aux_u16() % b.aux_u16()) as i16)),
        Mod32u if b.aux_u32() != 0 => Some(c32((a.aux_u32() % b.aux_u32()) as i32)),
        Mod64u if b.aux_u64() != 0 => Some(c64((a.aux_u64() % b.aux_u64()) as i64)),

        // eq
        Eq8 => Some(cbool(a.aux_i8() == b.aux_i8())),
        Eq16 => Some(cbool(a.aux_i16() == b.aux_i16())),
        Eq32 => Some(cbool(a.aux_i32() == b.aux_i32())),
        Eq64 => Some(cbool(a.aux_i64() == b.aux_i64())),
        Eq32F => Some(cbool(a.aux_f32() == b.aux_f32())),
        Eq64F => Some(cbool(a.aux_f64() == b.aux_f64())),

        // less
        Less8 => Some(cbool(a.aux_i8() < b.aux_i8())),
        Less16 => Some(cbool(a.aux_i16() < b.aux_i16())),
        Less32 => Some(cbool(a.aux_i32() < b.aux_i32())),
        Less64 => Some(cbool(a.aux_i64() < b.aux_i64())),
        Less8U => Some(cbool(a.aux_u8() < b.aux_u8())),
        Less16U => Some(cbool(a.aux_u16() < b.aux_u16())),
        Less32U => Some(cbool(a.aux_u32() < b.aux_u32())),
        Less64U => Some(cbool(a.aux_u64() < b.aux_u64())),
        Less32F => Some(cbool(a.aux_f32() < b.aux_f32())),
        Less64F => Some(cbool(a.aux_f64() < b.aux_f64())),

        // less-or-equal
        Leq8 => Some(cbool(a.aux_i8() <= b.aux_i8())),
        Leq16 => Some(cbool(a.aux_i16() <= b.aux_i16())),
        Leq32 => Some(cbool(a.aux_i32() <= b.aux_i32())),
        Leq64 => Some(cbool(a.aux_i64() <= b.aux_i64())),
        Leq8U => Some(cbool(a.aux_u8() <= b.aux_u8())),
        Leq16U => Some(cbool(a.aux_u16() <= b.aux_u16())),
        Leq32U => Some(cbool(a.aux_u32() <= b.aux_u32())),
        Leq64U => Some(cbool(a.aux_u64() <= b.aux_u64())),
        Leq32F => Some(cbool(a.aux_f32() <= b.aux_f32())),
        Leq64F => Some(cbool(a.aux_f64() <= b.aux_f64())),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Pos;

    fn probe(f: &mut Func, op: Op, ty: Ty, args: &[ValueId]) -> ValueId {
        let entry = f.entry;
        let v = f.add_value(entry, op, ty, 0, Pos::none());
        f.set_args(v, args);
        v
    }

    fn setup() -> Func {
        let mut f = Func::new("fold_test");
        let b = f.add_block(BlockKind::Plain);
        f.entry = b;
        f
    }

    #[test]
    fn test_add32_folds() {
        let mut f = setup();
        let a = f.add_value(f.entry, Op::Const32, Ty::Int32, 5, Pos::none());
        let b = f.add_value(f.entry, Op::Const32, Ty::Int32, 7, Pos::none());
        let v = probe(&mut f, Op::Add32, Ty::Int32, &[a, b]);
        assert!(rewrite_value_generic(&mut f, v));
        assert_eq!(f.values[v].op, Op::Const32);
        assert_eq!(f.values[v].aux_i32(), 12);
        assert!(f.values[v].args.is_empty());
    }

    #[test]
    fn test_add8_wraps() {
        let mut f = setup();
        let a = f.add_value(f.entry, Op::Const8, Ty::Int8, 127, Pos::none());
        let b = f.add_value(f.entry, Op::Const8, Ty::Int8, 1, Pos::none());
        let v = probe(&mut f, Op::Add8, Ty::Int8, &[a, b]);
        assert!(rewrite_value_generic(&mut f, v));
        assert_eq!(f.values[v].op, Op::Const8);
        assert_eq!(f.values[v].aux_i8(), -128);
        // sub-64-bit payloads are stored sign-extended
        assert_eq!(f.values[v].aux_int, -128);
    }

    #[test]
    fn test_signed_div_truncates_toward_zero() {
        let mut f = setup();
        let a = f.add_value(f.entry, Op::Const32, Ty::Int32, -7, Pos::none());
        let b = f.add_value(f.entry, Op::Const32, Ty::Int32, 2, Pos::none());
        let v = probe(&mut f, Op::Div32, Ty::Int32, &[a, b]);
        assert!(rewrite_value_generic(&mut f, v));
        assert_eq!(f.values[v].aux_i32(), -3);
    }

    #[test]
    fn test_min_div_minus_one_wraps() {
        let mut f = setup();
        let a = f.add_value(f.entry, Op::Const64, Ty::Int64, i64::MIN, Pos::none());
        let b = f.add_value(f.entry, Op::Const64, Ty::Int64, -1, Pos::none());
        let d = probe(&mut f, Op::Div64, Ty::Int64, &[a, b]);
        assert!(rewrite_value_generic(&mut f, d));
        assert_eq!(f.values[d].aux_i64(), i64::MIN);
        let m = probe(&mut f, Op::Mod64, Ty::Int64, &[a, b]);
        assert!(rewrite_value_generic(&mut f, m));
        assert_eq!(f.values[m].aux_i64(), 0);
    }

    #[test]
    fn test_unsigned_div_reinterprets_payload() {
        let mut f = setup();
        // -1 as u8 is 255
        let a = f.add_value(f.entry, Op::Const8, Ty::Int8, -1, Pos::none());
        let b = f.add_value(f.entry, Op::Const8, Ty::Int8, 2, Pos::none());
        let v = probe(&mut f, Op::Div8u, Ty::Int8, &[a, b]);
        assert!(rewrite_value_generic(&mut f, v));
        assert_eq!(f.values[v].aux_u8(), 127);
    }

    #[test]
    fn test_div_by_zero_does_not_match() {
        let mut f = setup();
        let a = f.add_value(f.entry, Op::Const32, Ty::Int32, 10, Pos::none());
        let z = f.add_value(f.entry, Op::Const32, Ty::Int32, 0, Pos::none());
        let v = probe(&mut f, Op::Div32, Ty::Int32, &[a, z]);
        assert!(!rewrite_value_generic(&mut f, v));
        assert_eq!(f.values[v].op, Op::Div32);
    }

    #[test]
    fn test_unsigned_compare() {
        let mut f = setup();
        // -1 as u32 is the largest u32
        let a = f.add_value(f.entry, Op::Const32, Ty::Int32, -1, Pos::none());
        let b = f.add_value(f.entry, Op::Const32, Ty::Int32, 1, Pos::none());
        let signed = probe(&mut f, Op::Less32, Ty::Bool, &[a, b]);
        assert!(rewrite_value_generic(&mut f, signed));
        assert_eq!(f.values[signed].op, Op::ConstBool);
        assert!(f.values[signed].aux_bool());
        let unsigned = probe(&mut f, Op::Less32U, Ty::Bool, &[a, b]);
        assert!(rewrite_value_generic(&mut f, unsigned));
        assert!(!f.values[unsigned].aux_bool());
    }

    #[test]
    fn test_float_fold_keeps_f32_precision() {
        let mut f = setup();
        let a = f.add_value(f.entry, Op::Const32F, Ty::Float32, aux_from_f32(1.5), Pos::none());
        let b = f.add_value(f.entry, Op::Const32F, Ty::Float32, aux_from_f32(2.25), Pos::none());
        let v = probe(&mut f, Op::Mul32F, Ty::Float32, &[a, b]);
        assert!(rewrite_value_generic(&mut f, v));
        assert_eq!(f.values[v].op, Op::Const32F);
        assert_eq!(f.values[v].aux_f32(), 3.375);
    }

    #[test]
    fn test_non_constant_args_do_not_match() {
        let mut f = setup();
        let a = f.add_value(f.entry, Op::Arg, Ty::Int32, 0, Pos::none());
        let b = f.add_value(f.entry, Op::Const32, Ty::Int32, 1, Pos::none());
        let v = probe(&mut f, Op::Add32, Ty::Int32, &[a, b]);
        assert!(!rewrite_value_generic(&mut f, v));
        assert_eq!(f.values[v].op, Op::Add32);
    }

    #[test]
    fn test_unsupported_op_does_not_match() {
        let mut f = setup();
        let a = f.add_value(f.entry, Op::Const32, Ty::Int32, 3, Pos::none());
        let v = probe(&mut f, Op::Call, Ty::Int32, &[a, a]);
        assert!(!rewrite_value_generic(&mut f, v));
    }
}
