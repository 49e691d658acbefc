//! Constant propagation / folding.
//!
//! A single forward pass: every arithmetic, comparison, or conversion
//! instruction whose operands are all constants of the right kind is
//! evaluated host-side (two's-complement 32-bit for integers, IEEE-754
//! single for floats) and its uses are rewritten to the fresh constant.
//! Division by an exact zero is left in place. The dead instruction itself
//! stays behind -- removing it is dead-code elimination's job.

use opalc_ir::{ArithOp, CmpPred, Module, Opcode, ValueRef};

use crate::pass::Pass;

#[derive(Default)]
pub struct ConstPropagation;

impl Pass for ConstPropagation {
    fn name(&self) -> &'static str {
        "const-propagation"
    }

    fn run(&mut self, m: &mut Module) {
        for f in m.functions().to_vec() {
            for b in m.func(f).blocks.clone() {
                for i in m.block(b).insts.clone() {
                    let folded = match m.inst(i).opcode {
                        Opcode::IntBinary(op) => fold_int_binary(m, i, op),
                        Opcode::FloatBinary(op) => fold_float_binary(m, i, op),
                        Opcode::IntCmp(pred) => fold_int_cmp(m, i, pred),
                        Opcode::FloatCmp(pred) => fold_float_cmp(m, i, pred),
                        Opcode::SiToFp => m.inst(i).operands[0]
                            .as_const_int()
                            .map(|v| ValueRef::float(v as f32)),
                        Opcode::FpToSi => m.inst(i).operands[0]
                            .as_const_float()
                            .map(|v| ValueRef::int(v as i32)),
                        _ => None,
                    };
                    if let Some(constant) = folded {
                        m.replace_all_uses(ValueRef::Inst(i), constant);
                    }
                }
            }
        }
    }
}

fn fold_int_binary(m: &Module, i: opalc_ir::InstId, op: ArithOp) -> Option<ValueRef> {
    let lhs = m.inst(i).operands[0].as_const_int()?;
    let rhs = m.inst(i).operands[1].as_const_int()?;
    let v = match op {
        ArithOp::Add => lhs.wrapping_add(rhs),
        ArithOp::Sub => lhs.wrapping_sub(rhs),
        ArithOp::Mul => lhs.wrapping_mul(rhs),
        ArithOp::Div => {
            if rhs == 0 {
                return None;
            }
            lhs.wrapping_div(rhs)
        }
    };
    Some(ValueRef::int(v))
}

fn fold_float_binary(m: &Module, i: opalc_ir::InstId, op: ArithOp) -> Option<ValueRef> {
    let lhs = m.inst(i).operands[0].as_const_float()?;
    let rhs = m.inst(i).operands[1].as_const_float()?;
    let v = match op {
        ArithOp::Add => lhs + rhs,
        ArithOp::Sub => lhs - rhs,
        ArithOp::Mul => lhs * rhs,
        ArithOp::Div => {
            if rhs == 0.0 {
                return None;
            }
            lhs / rhs
        }
    };
    Some(ValueRef::float(v))
}

// Comparison folds produce i32 constants 0/1, matching the zext that
// lowering inserts after every comparison.

fn fold_int_cmp(m: &Module, i: opalc_ir::InstId, pred: CmpPred) -> Option<ValueRef> {
    let lhs = m.inst(i).operands[0].as_const_int()?;
    let rhs = m.inst(i).operands[1].as_const_int()?;
    Some(ValueRef::int(apply_pred(pred, lhs, rhs) as i32))
}

fn fold_float_cmp(m: &Module, i: opalc_ir::InstId, pred: CmpPred) -> Option<ValueRef> {
    let lhs = m.inst(i).operands[0].as_const_float()?;
    let rhs = m.inst(i).operands[1].as_const_float()?;
    Some(ValueRef::int(apply_pred(pred, lhs, rhs) as i32))
}

fn apply_pred<T: PartialOrd>(pred: CmpPred, lhs: T, rhs: T) -> bool {
    match pred {
        CmpPred::Eq => lhs == rhs,
        CmpPred::Ne => lhs != rhs,
        CmpPred::Lt => lhs < rhs,
        CmpPred::Le => lhs <= rhs,
        CmpPred::Gt => lhs > rhs,
        CmpPred::Ge => lhs >= rhs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opalc_ir::{Builder, TypeId};

    fn run(m: &mut Module) {
        ConstPropagation.run(m);
        m.assert_consistency();
    }

    #[test]
    fn folds_nested_integer_arithmetic() {
        let mut m = Module::new();
        let f = m.new_function("f", vec![], TypeId::I32);
        let entry = m.new_block(f, "entry");
        let mut b = Builder::at(&mut m, entry);
        let mul = b
            .create_int_binary(ArithOp::Mul, ValueRef::int(2), ValueRef::int(3))
            .unwrap();
        let add = b
            .create_int_binary(ArithOp::Add, ValueRef::int(1), mul)
            .unwrap();
        let ret = b.create_ret(add).unwrap();
        run(&mut m);
        // 2*3 folds first; the rewritten add folds in the same pass.
        assert_eq!(m.inst(ret).operands[0], ValueRef::int(7));
        // The folded instructions are left in place for DCE.
        assert_eq!(m.block(entry).insts.len(), 3);
    }

    #[test]
    fn folds_float_arithmetic_and_conversions() {
        let mut m = Module::new();
        let f = m.new_function("f", vec![], TypeId::I32);
        let entry = m.new_block(f, "entry");
        let mut b = Builder::at(&mut m, entry);
        let conv = b.create_sitofp(ValueRef::int(3)).unwrap();
        let mul = b
            .create_float_binary(ArithOp::Mul, conv, ValueRef::float(0.5))
            .unwrap();
        let back = b.create_fptosi(mul).unwrap();
        let ret = b.create_ret(back).unwrap();
        run(&mut m);
        // sitofp 3 -> 3.0; 3.0*0.5 -> 1.5; fptosi truncates toward zero.
        assert_eq!(m.inst(ret).operands[0], ValueRef::int(1));
    }

    #[test]
    fn division_by_zero_is_not_folded() {
        let mut m = Module::new();
        let f = m.new_function("f", vec![], TypeId::I32);
        let entry = m.new_block(f, "entry");
        let mut b = Builder::at(&mut m, entry);
        let div = b
            .create_int_binary(ArithOp::Div, ValueRef::int(1), ValueRef::int(0))
            .unwrap();
        let ret = b.create_ret(div).unwrap();
        run(&mut m);
        assert_eq!(m.inst(ret).operands[0], div);

        let mut m = Module::new();
        let f = m.new_function("f", vec![], TypeId::F32);
        let entry = m.new_block(f, "entry");
        let mut b = Builder::at(&mut m, entry);
        let div = b
            .create_float_binary(ArithOp::Div, ValueRef::float(1.0), ValueRef::float(0.0))
            .unwrap();
        let ret = b.create_ret(div).unwrap();
        run(&mut m);
        assert_eq!(m.inst(ret).operands[0], div);
    }

    #[test]
    fn comparisons_fold_to_i32_truth_values() {
        let mut m = Module::new();
        let f = m.new_function("f", vec![], TypeId::I32);
        let entry = m.new_block(f, "entry");
        let mut b = Builder::at(&mut m, entry);
        let lt = b
            .create_icmp(CmpPred::Lt, ValueRef::int(3), ValueRef::int(5))
            .unwrap();
        let zext = b.create_zext(lt).unwrap();
        let ret = b.create_ret(zext).unwrap();
        run(&mut m);
        // The comparison's use (the zext operand) now reads the i32 constant.
        let zext_id = zext.as_inst().unwrap();
        assert_eq!(m.inst(zext_id).operands[0], ValueRef::int(1));
        // The zext itself is untouched by this pass.
        assert_eq!(m.inst(ret).operands[0], zext);
    }

    #[test]
    fn mixed_operands_do_not_fold() {
        let mut m = Module::new();
        let f = m.new_function("f", vec![TypeId::I32], TypeId::I32);
        let entry = m.new_block(f, "entry");
        let arg = ValueRef::Arg(m.func(f).args[0]);
        let mut b = Builder::at(&mut m, entry);
        let add = b
            .create_int_binary(ArithOp::Add, arg, ValueRef::int(1))
            .unwrap();
        let ret = b.create_ret(add).unwrap();
        run(&mut m);
        assert_eq!(m.inst(ret).operands[0], add);
    }

    #[test]
    fn wrapping_semantics_for_overflow() {
        let mut m = Module::new();
        let f = m.new_function("f", vec![], TypeId::I32);
        let entry = m.new_block(f, "entry");
        let mut b = Builder::at(&mut m, entry);
        let add = b
            .create_int_binary(ArithOp::Add, ValueRef::int(i32::MAX), ValueRef::int(1))
            .unwrap();
        let ret = b.create_ret(add).unwrap();
        run(&mut m);
        assert_eq!(m.inst(ret).operands[0], ValueRef::int(i32::MIN));
    }

    #[test]
    fn pass_is_idempotent_once_folded() {
        let mut m = Module::new();
        let f = m.new_function("f", vec![], TypeId::I32);
        let entry = m.new_block(f, "entry");
        let mut b = Builder::at(&mut m, entry);
        let add = b
            .create_int_binary(ArithOp::Add, ValueRef::int(2), ValueRef::int(2))
            .unwrap();
        b.create_ret(add).unwrap();
        run(&mut m);
        let after_once: Vec<_> = m.block(entry).insts.clone();
        run(&mut m);
        assert_eq!(m.block(entry).insts, after_once);
    }
}
