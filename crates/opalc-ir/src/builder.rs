//! Insertion-point-driven instruction builder.
//!
//! The builder appends typed instructions to its current block, enforcing
//! the operand-typing invariants at construction time and registering uses
//! through the module's bookkeeping. Callers reposition the insert point
//! explicitly; lowering keeps exactly one builder alive per statement
//! sequence.

use crate::id::{BlockId, FuncId, InstId};
use crate::inst::{ArithOp, CmpPred, Opcode};
use crate::module::Module;
use crate::types::{Ty, TypeId};
use crate::value::ValueRef;
use crate::IrError;

/// Instruction factory positioned at a basic block.
pub struct Builder<'m> {
    m: &'m mut Module,
    block: Option<BlockId>,
}

impl<'m> Builder<'m> {
    pub fn new(m: &'m mut Module) -> Self {
        Builder { m, block: None }
    }

    /// A builder already positioned at `block`.
    pub fn at(m: &'m mut Module, block: BlockId) -> Self {
        Builder {
            m,
            block: Some(block),
        }
    }

    pub fn module(&self) -> &Module {
        self.m
    }

    pub fn module_mut(&mut self) -> &mut Module {
        self.m
    }

    pub fn insert_block(&self) -> Option<BlockId> {
        self.block
    }

    pub fn set_insert_point(&mut self, block: BlockId) {
        self.block = Some(block);
    }

    fn cur(&self) -> Result<BlockId, IrError> {
        self.block.ok_or(IrError::NoInsertPoint)
    }

    fn cur_func(&self) -> Result<FuncId, IrError> {
        Ok(self.m.block(self.cur()?).parent)
    }

    fn expect_ty(&self, val: ValueRef, expected: TypeId) -> Result<(), IrError> {
        let found = self.m.type_of(val);
        if found != expected {
            return Err(IrError::TypeMismatch {
                expected: self.m.types.name(expected),
                found: self.m.types.name(found),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Memory
    // -----------------------------------------------------------------------

    /// Allocates a stack slot of type `ty` in the current function's entry
    /// block (inserted ahead of the entry terminator if one exists) and
    /// returns the pointer.
    pub fn create_alloca(&mut self, ty: TypeId) -> Result<ValueRef, IrError> {
        let func = self.cur_func()?;
        let entry = self
            .m
            .func(func)
            .entry()
            .ok_or(IrError::NoInsertPoint)?;
        let ptr_ty = self.m.types.ptr_to(ty);
        let id = self
            .m
            .build_inst_before_terminator(entry, Opcode::Alloca, ptr_ty, vec![]);
        Ok(ValueRef::Inst(id))
    }

    /// Loads through a pointer to a scalar or pointer slot.
    pub fn create_load(&mut self, ptr: ValueRef) -> Result<ValueRef, IrError> {
        let ptr_ty = self.m.type_of(ptr);
        let pointee = self.m.types.pointee(ptr_ty).ok_or_else(|| {
            IrError::InvalidOperand {
                reason: format!("load through non-pointer {}", self.m.types.name(ptr_ty)),
            }
        })?;
        if matches!(self.m.types.get(pointee), Ty::Array { .. } | Ty::Void | Ty::Func { .. }) {
            return Err(IrError::InvalidOperand {
                reason: format!("load of non-scalar {}", self.m.types.name(pointee)),
            });
        }
        let block = self.cur()?;
        let id = self.m.build_inst(block, Opcode::Load, pointee, vec![ptr]);
        Ok(ValueRef::Inst(id))
    }

    /// Stores `val` through `ptr`; the value type must match the pointee.
    pub fn create_store(&mut self, val: ValueRef, ptr: ValueRef) -> Result<InstId, IrError> {
        let ptr_ty = self.m.type_of(ptr);
        let pointee = self.m.types.pointee(ptr_ty).ok_or_else(|| {
            IrError::InvalidOperand {
                reason: format!("store through non-pointer {}", self.m.types.name(ptr_ty)),
            }
        })?;
        self.expect_ty(val, pointee)?;
        let block = self.cur()?;
        Ok(self
            .m
            .build_inst(block, Opcode::Store, TypeId::VOID, vec![val, ptr]))
    }

    // -----------------------------------------------------------------------
    // Arithmetic & comparison
    // -----------------------------------------------------------------------

    pub fn create_int_binary(
        &mut self,
        op: ArithOp,
        lhs: ValueRef,
        rhs: ValueRef,
    ) -> Result<ValueRef, IrError> {
        self.expect_ty(lhs, TypeId::I32)?;
        self.expect_ty(rhs, TypeId::I32)?;
        let block = self.cur()?;
        let id = self
            .m
            .build_inst(block, Opcode::IntBinary(op), TypeId::I32, vec![lhs, rhs]);
        Ok(ValueRef::Inst(id))
    }

    pub fn create_float_binary(
        &mut self,
        op: ArithOp,
        lhs: ValueRef,
        rhs: ValueRef,
    ) -> Result<ValueRef, IrError> {
        self.expect_ty(lhs, TypeId::F32)?;
        self.expect_ty(rhs, TypeId::F32)?;
        let block = self.cur()?;
        let id = self
            .m
            .build_inst(block, Opcode::FloatBinary(op), TypeId::F32, vec![lhs, rhs]);
        Ok(ValueRef::Inst(id))
    }

    pub fn create_icmp(
        &mut self,
        pred: CmpPred,
        lhs: ValueRef,
        rhs: ValueRef,
    ) -> Result<ValueRef, IrError> {
        self.expect_ty(lhs, TypeId::I32)?;
        self.expect_ty(rhs, TypeId::I32)?;
        let block = self.cur()?;
        let id = self
            .m
            .build_inst(block, Opcode::IntCmp(pred), TypeId::I1, vec![lhs, rhs]);
        Ok(ValueRef::Inst(id))
    }

    pub fn create_fcmp(
        &mut self,
        pred: CmpPred,
        lhs: ValueRef,
        rhs: ValueRef,
    ) -> Result<ValueRef, IrError> {
        self.expect_ty(lhs, TypeId::F32)?;
        self.expect_ty(rhs, TypeId::F32)?;
        let block = self.cur()?;
        let id = self
            .m
            .build_inst(block, Opcode::FloatCmp(pred), TypeId::I1, vec![lhs, rhs]);
        Ok(ValueRef::Inst(id))
    }

    // -----------------------------------------------------------------------
    // Conversions
    // -----------------------------------------------------------------------

    pub fn create_sitofp(&mut self, val: ValueRef) -> Result<ValueRef, IrError> {
        self.expect_ty(val, TypeId::I32)?;
        let block = self.cur()?;
        let id = self
            .m
            .build_inst(block, Opcode::SiToFp, TypeId::F32, vec![val]);
        Ok(ValueRef::Inst(id))
    }

    pub fn create_fptosi(&mut self, val: ValueRef) -> Result<ValueRef, IrError> {
        self.expect_ty(val, TypeId::F32)?;
        let block = self.cur()?;
        let id = self
            .m
            .build_inst(block, Opcode::FpToSi, TypeId::I32, vec![val]);
        Ok(ValueRef::Inst(id))
    }

    /// Widens an `i1` comparison result to `i32`.
    pub fn create_zext(&mut self, val: ValueRef) -> Result<ValueRef, IrError> {
        self.expect_ty(val, TypeId::I1)?;
        let block = self.cur()?;
        let id = self.m.build_inst(block, Opcode::Zext, TypeId::I32, vec![val]);
        Ok(ValueRef::Inst(id))
    }

    // -----------------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------------

    pub fn create_br(&mut self, target: BlockId) -> Result<InstId, IrError> {
        let block = self.cur()?;
        Ok(self.m.build_br(block, target))
    }

    pub fn create_cond_br(
        &mut self,
        cond: ValueRef,
        then: BlockId,
        els: BlockId,
    ) -> Result<InstId, IrError> {
        self.expect_ty(cond, TypeId::I1)?;
        let block = self.cur()?;
        Ok(self.m.build_inst(
            block,
            Opcode::CondBr,
            TypeId::VOID,
            vec![cond, ValueRef::Block(then), ValueRef::Block(els)],
        ))
    }

    pub fn create_ret(&mut self, val: ValueRef) -> Result<InstId, IrError> {
        let func = self.cur_func()?;
        self.expect_ty(val, self.m.func(func).ret)?;
        let block = self.cur()?;
        Ok(self.m.build_inst(block, Opcode::Ret, TypeId::VOID, vec![val]))
    }

    pub fn create_ret_void(&mut self) -> Result<InstId, IrError> {
        let func = self.cur_func()?;
        let ret = self.m.func(func).ret;
        if ret != TypeId::VOID {
            return Err(IrError::TypeMismatch {
                expected: self.m.types.name(ret),
                found: "void".into(),
            });
        }
        let block = self.cur()?;
        Ok(self.m.build_inst(block, Opcode::Ret, TypeId::VOID, vec![]))
    }

    // -----------------------------------------------------------------------
    // Calls, addressing, φ
    // -----------------------------------------------------------------------

    pub fn create_call(
        &mut self,
        callee: FuncId,
        args: Vec<ValueRef>,
    ) -> Result<ValueRef, IrError> {
        let func = self.m.func(callee);
        if func.arity() != args.len() {
            return Err(IrError::ArityMismatch {
                callee: func.name.clone(),
                expected: func.arity(),
                found: args.len(),
            });
        }
        let param_tys: Vec<TypeId> = func.args.iter().map(|&a| self.m.arg(a).ty).collect();
        let ret = func.ret;
        for (&arg, ty) in args.iter().zip(param_tys) {
            self.expect_ty(arg, ty)?;
        }
        let block = self.cur()?;
        let mut operands = vec![ValueRef::Func(callee)];
        operands.extend(args);
        let id = self.m.build_inst(block, Opcode::Call, ret, operands);
        Ok(ValueRef::Inst(id))
    }

    /// Address arithmetic. Two forms, matching how arrays and decayed
    /// pointers are addressed:
    /// - pointer to array + `[0, idx]` -> pointer to element;
    /// - pointer to scalar/pointer + `[idx]` -> same pointer type.
    pub fn create_gep(
        &mut self,
        ptr: ValueRef,
        indices: Vec<ValueRef>,
    ) -> Result<ValueRef, IrError> {
        let ptr_ty = self.m.type_of(ptr);
        let pointee = self.m.types.pointee(ptr_ty).ok_or_else(|| {
            IrError::InvalidOperand {
                reason: format!(
                    "getelementptr on non-pointer {}",
                    self.m.types.name(ptr_ty)
                ),
            }
        })?;
        for &idx in &indices {
            self.expect_ty(idx, TypeId::I32)?;
        }
        let result_ty = if let Some(elem) = self.m.types.array_elem(pointee) {
            if indices.len() != 2 {
                return Err(IrError::InvalidOperand {
                    reason: format!(
                        "array getelementptr takes 2 indices, found {}",
                        indices.len()
                    ),
                });
            }
            self.m.types.ptr_to(elem)
        } else {
            if indices.len() != 1 {
                return Err(IrError::InvalidOperand {
                    reason: format!(
                        "pointer getelementptr takes 1 index, found {}",
                        indices.len()
                    ),
                });
            }
            ptr_ty
        };
        let block = self.cur()?;
        let mut operands = vec![ptr];
        operands.extend(indices);
        let id = self
            .m
            .build_inst(block, Opcode::GetElementPtr, result_ty, operands);
        Ok(ValueRef::Inst(id))
    }

    /// A φ combining `pairs` of (value, predecessor). All values must share
    /// the result type.
    pub fn create_phi(
        &mut self,
        ty: TypeId,
        pairs: Vec<(ValueRef, BlockId)>,
    ) -> Result<ValueRef, IrError> {
        for &(val, _) in &pairs {
            self.expect_ty(val, ty)?;
        }
        let block = self.cur()?;
        let mut operands = Vec::with_capacity(pairs.len() * 2);
        for (val, pred) in pairs {
            operands.push(val);
            operands.push(ValueRef::Block(pred));
        }
        let id = self.m.build_inst(block, Opcode::Phi, ty, operands);
        Ok(ValueRef::Inst(id))
    }
}
