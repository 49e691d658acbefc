//! AST → IR lowering.
//!
//! Walks the AST with a scoped symbol table, driving the builder to produce
//! SSA-shaped basic blocks. Source-level multiple assignment becomes
//! `alloca`+`store`/`load`; mixed int/float operands promote the integer
//! side to float; comparisons widen their `i1` to `i32` so they behave as
//! C-like truth values; array subscripts emit a negative-index runtime
//! check branching to the `neg_idx_except` helper.

use opalc_ir::{ArithOp, Builder, CmpPred, Constant, FuncId, Module, TypeId, ValueRef};

use crate::ast::{
    AstType, BinOp, Block, Decl, Expr, FuncDecl, Program, RelOp, Stmt, VarAccess, VarDecl,
};
use crate::error::LowerError;
use crate::scope::ScopeStack;

/// The runtime library: symbols resolved at link time, declared up front so
/// programs can call them and the inliner can recognize them by name.
/// Signatures: (name, params, return).
fn runtime_library(m: &mut Module) -> Vec<(&'static str, Vec<TypeId>, TypeId)> {
    let i32p = m.types.ptr_to(TypeId::I32);
    let f32p = m.types.ptr_to(TypeId::F32);
    vec![
        ("getint", vec![], TypeId::I32),
        ("getch", vec![], TypeId::I32),
        ("getfloat", vec![], TypeId::F32),
        ("getarray", vec![i32p], TypeId::I32),
        ("getfarray", vec![f32p], TypeId::I32),
        ("putint", vec![TypeId::I32], TypeId::VOID),
        ("putch", vec![TypeId::I32], TypeId::VOID),
        ("putfloat", vec![TypeId::F32], TypeId::VOID),
        ("putarray", vec![TypeId::I32, i32p], TypeId::VOID),
        ("putfarray", vec![TypeId::I32, f32p], TypeId::VOID),
        ("memset_int", vec![i32p, TypeId::I32, TypeId::I32], TypeId::VOID),
        ("memset_float", vec![f32p, TypeId::F32, TypeId::I32], TypeId::VOID),
        ("_sysy_starttime", vec![TypeId::I32], TypeId::VOID),
        ("_sysy_stoptime", vec![TypeId::I32], TypeId::VOID),
        ("neg_idx_except", vec![], TypeId::VOID),
    ]
}

/// Lowers a program to an IR module.
pub fn lower_program(program: &Program) -> Result<Module, LowerError> {
    let mut lowering = Lowering::new();
    lowering.program(program)?;
    Ok(lowering.m)
}

struct Lowering {
    m: Module,
    scope: ScopeStack,
    /// Current function and insertion block while inside a body.
    func: Option<FuncId>,
    block: Option<opalc_ir::BlockId>,
}

impl Lowering {
    fn new() -> Self {
        Lowering {
            m: Module::new(),
            scope: ScopeStack::new(),
            func: None,
            block: None,
        }
    }

    /// A builder positioned at the current insertion block.
    fn at(&mut self) -> Builder<'_> {
        let block = self.block.expect("no insertion block while lowering a body");
        Builder::at(&mut self.m, block)
    }

    fn terminated(&self) -> bool {
        self.block.is_some_and(|b| self.m.is_terminated(b))
    }

    fn scalar_ty(&self, ty: AstType, name: &str) -> Result<TypeId, LowerError> {
        match ty {
            AstType::Int => Ok(TypeId::I32),
            AstType::Float => Ok(TypeId::F32),
            AstType::Void => Err(LowerError::VoidType { name: name.into() }),
        }
    }

    fn program(&mut self, program: &Program) -> Result<(), LowerError> {
        for (name, params, ret) in runtime_library(&mut self.m) {
            let f = self.m.new_function(name, params, ret);
            self.scope.declare(name, ValueRef::Func(f));
        }
        for decl in &program.decls {
            match decl {
                Decl::Var(v) => self.global_var(v)?,
                Decl::Func(f) => self.function(f)?,
            }
        }
        Ok(())
    }

    fn global_var(&mut self, decl: &VarDecl) -> Result<(), LowerError> {
        let base = self.scalar_ty(decl.ty, &decl.name)?;
        let ty = match decl.len {
            Some(len) => self.m.types.array_of(base, len),
            None => base,
        };
        let g = self.m.new_global(&decl.name, ty, Constant::Zero(ty));
        self.scope.declare(&decl.name, ValueRef::Global(g));
        Ok(())
    }

    fn function(&mut self, decl: &FuncDecl) -> Result<(), LowerError> {
        let ret = match decl.ret {
            AstType::Int => TypeId::I32,
            AstType::Float => TypeId::F32,
            AstType::Void => TypeId::VOID,
        };
        let mut param_tys = Vec::with_capacity(decl.params.len());
        for p in &decl.params {
            let base = self.scalar_ty(p.ty, &p.name)?;
            param_tys.push(if p.is_array {
                self.m.types.ptr_to(base)
            } else {
                base
            });
        }
        let f = self.m.new_function(&decl.name, param_tys.clone(), ret);
        self.scope.declare(&decl.name, ValueRef::Func(f));
        self.func = Some(f);
        let entry = self.m.new_block(f, "entry");
        self.block = Some(entry);

        self.scope.enter();
        // Every parameter is spilled to an alloca; all accesses go through it.
        let args = self.m.func(f).args.clone();
        for (i, p) in decl.params.iter().enumerate() {
            let slot = self.at().create_alloca(param_tys[i])?;
            self.at().create_store(ValueRef::Arg(args[i]), slot)?;
            self.scope.declare(&p.name, slot);
        }

        self.compound(&decl.body)?;
        if !self.terminated() {
            self.default_ret()?;
        }
        self.scope.exit();
        self.func = None;
        self.block = None;
        Ok(())
    }

    /// The default terminator for a body that falls off the end, and for the
    /// trap path of the negative-index check.
    fn default_ret(&mut self) -> Result<(), LowerError> {
        let ret = self.m.func(self.func.expect("inside a function")).ret;
        if ret == TypeId::VOID {
            self.at().create_ret_void()?;
        } else if ret == TypeId::F32 {
            self.at().create_ret(ValueRef::float(0.0))?;
        } else {
            self.at().create_ret(ValueRef::int(0))?;
        }
        Ok(())
    }

    fn compound(&mut self, block: &Block) -> Result<(), LowerError> {
        self.scope.enter();
        for decl in &block.decls {
            self.local_var(decl)?;
        }
        for stmt in &block.stmts {
            self.stmt(stmt)?;
            if self.terminated() {
                break;
            }
        }
        self.scope.exit();
        Ok(())
    }

    fn local_var(&mut self, decl: &VarDecl) -> Result<(), LowerError> {
        let base = self.scalar_ty(decl.ty, &decl.name)?;
        let ty = match decl.len {
            Some(len) => self.m.types.array_of(base, len),
            None => base,
        };
        let slot = self.at().create_alloca(ty)?;
        self.scope.declare(&decl.name, slot);
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), LowerError> {
        match stmt {
            Stmt::Expr(Some(e)) => {
                self.expr(e)?;
                Ok(())
            }
            Stmt::Expr(None) => Ok(()),
            Stmt::Compound(b) => self.compound(b),
            Stmt::If {
                cond,
                then,
                otherwise,
            } => self.if_stmt(cond, then, otherwise.as_deref()),
            Stmt::While { cond, body } => self.while_stmt(cond, body),
            Stmt::Return(e) => self.return_stmt(e.as_ref()),
        }
    }

    fn if_stmt(
        &mut self,
        cond: &Expr,
        then: &Stmt,
        otherwise: Option<&Stmt>,
    ) -> Result<(), LowerError> {
        let v = self.expr(cond)?;
        let flag = self.truthy(v)?;
        let f = self.func.expect("inside a function");
        let then_bb = self.m.new_block(f, "");
        let else_bb = self.m.new_block(f, "");
        let end_bb = self.m.new_block(f, "");

        if otherwise.is_some() {
            self.at().create_cond_br(flag, then_bb, else_bb)?;
        } else {
            self.at().create_cond_br(flag, then_bb, end_bb)?;
        }

        self.block = Some(then_bb);
        self.stmt(then)?;
        if !self.terminated() {
            self.at().create_br(end_bb)?;
        }

        if let Some(otherwise) = otherwise {
            self.block = Some(else_bb);
            self.stmt(otherwise)?;
            if !self.terminated() {
                self.at().create_br(end_bb)?;
            }
        } else {
            self.m.erase_block(else_bb);
        }

        self.block = Some(end_bb);
        Ok(())
    }

    fn while_stmt(&mut self, cond: &Expr, body: &Stmt) -> Result<(), LowerError> {
        let f = self.func.expect("inside a function");
        let cond_bb = self.m.new_block(f, "");
        let body_bb = self.m.new_block(f, "");
        let end_bb = self.m.new_block(f, "");

        if !self.terminated() {
            self.at().create_br(cond_bb)?;
        }

        self.block = Some(cond_bb);
        let v = self.expr(cond)?;
        let flag = self.truthy(v)?;
        self.at().create_cond_br(flag, body_bb, end_bb)?;

        self.block = Some(body_bb);
        self.stmt(body)?;
        if !self.terminated() {
            self.at().create_br(cond_bb)?;
        }

        self.block = Some(end_bb);
        Ok(())
    }

    fn return_stmt(&mut self, expr: Option<&Expr>) -> Result<(), LowerError> {
        match expr {
            None => {
                self.at().create_ret_void()?;
            }
            Some(e) => {
                let v = self.expr(e)?;
                let ret = self.m.func(self.func.expect("inside a function")).ret;
                let vt = self.m.type_of(v);
                let v = if ret == TypeId::I32 && vt != TypeId::I32 {
                    self.at().create_fptosi(v)?
                } else if ret == TypeId::F32 && vt != TypeId::F32 {
                    self.at().create_sitofp(v)?
                } else {
                    v
                };
                self.at().create_ret(v)?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn expr(&mut self, expr: &Expr) -> Result<ValueRef, LowerError> {
        match expr {
            Expr::Int(v) => Ok(ValueRef::int(*v)),
            Expr::Float(v) => Ok(ValueRef::float(*v)),
            Expr::Var(access) => self.var_access(access, false),
            Expr::Assign { target, value } => {
                let value = self.expr(value)?;
                let ptr = self.var_access(target, true)?;
                let pointee = self
                    .m
                    .types
                    .pointee(self.m.type_of(ptr))
                    .expect("assignment target is always a pointer");
                let vt = self.m.type_of(value);
                let value = if vt != pointee {
                    if vt == TypeId::I32 {
                        self.at().create_sitofp(value)?
                    } else if vt == TypeId::F32 {
                        self.at().create_fptosi(value)?
                    } else {
                        value
                    }
                } else {
                    value
                };
                self.at().create_store(value, ptr)?;
                Ok(value)
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = self.expr(lhs)?;
                let r = self.expr(rhs)?;
                let (l, r, is_int) = self.unify_numeric(l, r)?;
                let op = match op {
                    BinOp::Add => ArithOp::Add,
                    BinOp::Sub => ArithOp::Sub,
                    BinOp::Mul => ArithOp::Mul,
                    BinOp::Div => ArithOp::Div,
                };
                if is_int {
                    Ok(self.at().create_int_binary(op, l, r)?)
                } else {
                    Ok(self.at().create_float_binary(op, l, r)?)
                }
            }
            Expr::Compare { op, lhs, rhs } => {
                let l = self.expr(lhs)?;
                let r = self.expr(rhs)?;
                let (l, r, is_int) = self.unify_numeric(l, r)?;
                let pred = match op {
                    RelOp::Lt => CmpPred::Lt,
                    RelOp::Le => CmpPred::Le,
                    RelOp::Gt => CmpPred::Gt,
                    RelOp::Ge => CmpPred::Ge,
                    RelOp::Eq => CmpPred::Eq,
                    RelOp::Ne => CmpPred::Ne,
                };
                let flag = if is_int {
                    self.at().create_icmp(pred, l, r)?
                } else {
                    self.at().create_fcmp(pred, l, r)?
                };
                // C-like truth value.
                Ok(self.at().create_zext(flag)?)
            }
            Expr::Call { callee, args } => self.call(callee, args),
        }
    }

    fn call(&mut self, callee: &str, args: &[Expr]) -> Result<ValueRef, LowerError> {
        let target = self
            .scope
            .lookup(callee)
            .ok_or_else(|| LowerError::UnknownIdentifier {
                name: callee.into(),
            })?;
        let Some(f) = target.as_func() else {
            return Err(LowerError::NotAFunction {
                name: callee.into(),
            });
        };
        let params: Vec<TypeId> = {
            let func = self.m.func(f);
            func.args.iter().map(|&a| self.m.arg(a).ty).collect()
        };
        if params.len() != args.len() {
            return Err(LowerError::ArityMismatch {
                callee: callee.into(),
                expected: params.len(),
                found: args.len(),
            });
        }
        let mut actuals = Vec::with_capacity(args.len());
        for (arg, &pty) in args.iter().zip(&params) {
            let v = self.expr(arg)?;
            let vt = self.m.type_of(v);
            // Pointers pass through unchanged (array arguments); scalars
            // convert to the parameter type.
            let v = if !self.m.types.is_ptr(vt) && vt != pty {
                if vt == TypeId::I32 {
                    self.at().create_sitofp(v)?
                } else if vt == TypeId::F32 {
                    self.at().create_fptosi(v)?
                } else {
                    v
                }
            } else {
                v
            };
            actuals.push(v);
        }
        Ok(self.at().create_call(f, actuals)?)
    }

    /// Lowers a variable use. `lval` selects address-of (assignment target)
    /// versus loaded-value mode.
    fn var_access(&mut self, access: &VarAccess, lval: bool) -> Result<ValueRef, LowerError> {
        let var = self
            .scope
            .lookup(&access.name)
            .ok_or_else(|| LowerError::UnknownIdentifier {
                name: access.name.clone(),
            })?;
        if var.as_func().is_some() {
            return Err(LowerError::FunctionAsValue {
                name: access.name.clone(),
            });
        }

        let Some(index) = &access.index else {
            if lval {
                return Ok(var);
            }
            let pointee = self
                .m
                .types
                .pointee(self.m.type_of(var))
                .expect("variables are always pointers");
            // Arrays decay to a pointer to their first element.
            return if self.m.types.is_array(pointee) {
                Ok(self
                    .at()
                    .create_gep(var, vec![ValueRef::int(0), ValueRef::int(0)])?)
            } else {
                Ok(self.at().create_load(var)?)
            };
        };

        // Subscripted access: evaluate the index, trap on negative values.
        let idx = self.expr(index)?;
        let idx = if self.m.type_of(idx) == TypeId::F32 {
            self.at().create_fptosi(idx)?
        } else {
            idx
        };
        let f = self.func.expect("inside a function");
        let normal_bb = self.m.new_block(f, "");
        let except_bb = self.m.new_block(f, "");
        let is_neg = self.at().create_icmp(CmpPred::Lt, idx, ValueRef::int(0))?;
        self.at().create_cond_br(is_neg, except_bb, normal_bb)?;

        self.block = Some(except_bb);
        let handler = self
            .scope
            .lookup("neg_idx_except")
            .and_then(|v| v.as_func())
            .ok_or_else(|| LowerError::UnknownIdentifier {
                name: "neg_idx_except".into(),
            })?;
        self.at().create_call(handler, vec![])?;
        self.default_ret()?;

        self.block = Some(normal_bb);
        let pointee = self
            .m
            .types
            .pointee(self.m.type_of(var))
            .expect("variables are always pointers");
        let elem_ptr = if self.m.types.is_ptr(pointee) {
            // A pointer parameter spilled to its alloca: load the pointer,
            // then index through it.
            let base = self.at().create_load(var)?;
            self.at().create_gep(base, vec![idx])?
        } else if self.m.types.is_array(pointee) {
            // A local or global array: index within the aggregate.
            self.at().create_gep(var, vec![ValueRef::int(0), idx])?
        } else {
            // A plain element pointer.
            self.at().create_gep(var, vec![idx])?
        };
        if lval {
            Ok(elem_ptr)
        } else {
            Ok(self.at().create_load(elem_ptr)?)
        }
    }

    /// Canonical numeric promotion: when the operand types disagree in
    /// {i32, f32}, the integer side converts to float.
    fn unify_numeric(
        &mut self,
        l: ValueRef,
        r: ValueRef,
    ) -> Result<(ValueRef, ValueRef, bool), LowerError> {
        let lt = self.m.type_of(l);
        let rt = self.m.type_of(r);
        if lt == rt {
            return Ok((l, r, rt == TypeId::I32));
        }
        let l = if lt == TypeId::I32 {
            self.at().create_sitofp(l)?
        } else {
            l
        };
        let r = if rt == TypeId::I32 {
            self.at().create_sitofp(r)?
        } else {
            r
        };
        Ok((l, r, false))
    }

    /// Branch condition: compare against the zero of the value's family.
    fn truthy(&mut self, v: ValueRef) -> Result<ValueRef, LowerError> {
        if self.m.type_of(v) == TypeId::F32 {
            Ok(self.at().create_fcmp(CmpPred::Ne, v, ValueRef::float(0.0))?)
        } else {
            Ok(self.at().create_icmp(CmpPred::Ne, v, ValueRef::int(0))?)
        }
    }
}
