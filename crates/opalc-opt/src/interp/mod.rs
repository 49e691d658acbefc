//! Reference interpreter for the IR.
//!
//! Executes a module directly: block-by-block walk per call frame, a cell
//! array per alloca/global for memory, queued inputs and captured outputs
//! for the runtime I/O intrinsics. It exists to state semantic-preservation
//! properties of the passes as executable tests (and to back `opalc run`);
//! a step budget and a recursion cap keep runaway programs bounded.
//!
//! # Usage
//!
//! ```ignore
//! let mut interp = Interp::new(&module, InterpConfig::default());
//! let result = interp.run("main", vec![])?;
//! // interp.output holds everything put* produced.
//! ```

pub mod error;
pub mod value;

pub use error::RuntimeError;
pub use value::{MemKey, Pointer, Value};

use std::collections::{HashMap, VecDeque};

use opalc_ir::{BlockId, FuncId, Module, Opcode, Ty, TypeId, ValueRef};

/// Knobs for one interpreter instance.
#[derive(Debug, Clone)]
pub struct InterpConfig {
    /// Values handed out by `getint`/`getch`/`getfloat`/`getarray`.
    pub inputs: VecDeque<Value>,
    /// Total instruction budget across all calls.
    pub step_limit: u64,
    pub max_depth: usize,
}

impl Default for InterpConfig {
    fn default() -> Self {
        InterpConfig {
            inputs: VecDeque::new(),
            step_limit: 1_000_000,
            max_depth: 256,
        }
    }
}

/// The interpreter: module reference plus execution state.
pub struct Interp<'m> {
    m: &'m Module,
    inputs: VecDeque<Value>,
    steps_left: u64,
    max_depth: usize,
    depth: usize,
    memory: HashMap<MemKey, Vec<Value>>,
    next_stack_slot: usize,
    /// Everything the put* intrinsics emitted, in order.
    pub output: Vec<Value>,
    /// Set when `neg_idx_except` fires.
    pub trapped: bool,
}

impl<'m> Interp<'m> {
    pub fn new(m: &'m Module, config: InterpConfig) -> Self {
        let mut memory = HashMap::new();
        for &g in m.globals() {
            let cells = zero_cells(m, m.global(g).ty);
            memory.insert(MemKey::Global(g), cells);
        }
        Interp {
            m,
            inputs: config.inputs,
            steps_left: config.step_limit,
            max_depth: config.max_depth,
            depth: 0,
            memory,
            next_stack_slot: 0,
            output: Vec::new(),
            trapped: false,
        }
    }

    /// Runs a function by name.
    pub fn run(&mut self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let f = self
            .m
            .find_function(name)
            .ok_or_else(|| RuntimeError::FunctionNotFound { name: name.into() })?;
        self.call(f, args)
    }

    fn call(&mut self, f: FuncId, args: Vec<Value>) -> Result<Value, RuntimeError> {
        if self.m.func(f).is_declaration() {
            let name = self.m.func(f).name.clone();
            return self.intrinsic(&name, args);
        }
        if self.depth >= self.max_depth {
            return Err(RuntimeError::RecursionLimitExceeded {
                limit: self.max_depth,
            });
        }
        self.depth += 1;
        let result = self.exec_body(f, args);
        self.depth -= 1;
        result
    }

    fn exec_body(&mut self, f: FuncId, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let m = self.m;
        let mut env: HashMap<ValueRef, Value> = HashMap::new();
        for (&a, v) in m.func(f).args.iter().zip(args) {
            env.insert(ValueRef::Arg(a), v);
        }
        let mut block = m.func(f).entry().ok_or_else(|| RuntimeError::Internal {
            message: format!("function '{}' has no body", m.func(f).name),
        })?;
        let mut prev: Option<BlockId> = None;

        loop {
            let insts = &m.block(block).insts;

            // φ-nodes read their inputs before any of them writes, so φs
            // that reference each other see the previous iteration's values.
            let mut idx = 0;
            let mut phi_writes = Vec::new();
            while idx < insts.len() && m.inst(insts[idx]).is_phi() {
                let i = insts[idx];
                let pred = prev.ok_or_else(|| RuntimeError::Internal {
                    message: "phi in entry block".into(),
                })?;
                let (val, _) = m
                    .inst(i)
                    .phi_pairs()
                    .into_iter()
                    .find(|&(_, b)| b == pred)
                    .ok_or_else(|| RuntimeError::Internal {
                        message: "phi has no input for predecessor".into(),
                    })?;
                let v = self.operand(&env, val)?;
                phi_writes.push((i, v));
                idx += 1;
            }
            for (i, v) in phi_writes {
                env.insert(ValueRef::Inst(i), v);
            }

            let mut next: Option<BlockId> = None;
            for &i in &insts[idx..] {
                if self.steps_left == 0 {
                    return Err(RuntimeError::StepLimitExceeded);
                }
                self.steps_left -= 1;
                let inst = m.inst(i);
                match inst.opcode {
                    Opcode::Alloca => {
                        let pointee = m.types.pointee(inst.ty).expect("alloca yields a pointer");
                        let cells = zero_cells(m, pointee);
                        let slot = self.next_stack_slot;
                        self.next_stack_slot += 1;
                        self.memory.insert(MemKey::Stack(slot), cells);
                        env.insert(
                            ValueRef::Inst(i),
                            Value::Ptr(Pointer {
                                key: MemKey::Stack(slot),
                                offset: 0,
                            }),
                        );
                    }
                    Opcode::Load => {
                        let p = as_ptr(self.operand(&env, inst.operands[0])?)?;
                        let v = self.read(p)?;
                        env.insert(ValueRef::Inst(i), v);
                    }
                    Opcode::Store => {
                        let v = self.operand(&env, inst.operands[0])?;
                        let p = as_ptr(self.operand(&env, inst.operands[1])?)?;
                        self.write(p, v)?;
                    }
                    Opcode::IntBinary(op) => {
                        let a = as_int(self.operand(&env, inst.operands[0])?)?;
                        let b = as_int(self.operand(&env, inst.operands[1])?)?;
                        let v = match op {
                            opalc_ir::ArithOp::Add => a.wrapping_add(b),
                            opalc_ir::ArithOp::Sub => a.wrapping_sub(b),
                            opalc_ir::ArithOp::Mul => a.wrapping_mul(b),
                            opalc_ir::ArithOp::Div => {
                                if b == 0 {
                                    return Err(RuntimeError::DivideByZero);
                                }
                                a.wrapping_div(b)
                            }
                        };
                        env.insert(ValueRef::Inst(i), Value::Int(v));
                    }
                    Opcode::FloatBinary(op) => {
                        let a = as_float(self.operand(&env, inst.operands[0])?)?;
                        let b = as_float(self.operand(&env, inst.operands[1])?)?;
                        let v = match op {
                            opalc_ir::ArithOp::Add => a + b,
                            opalc_ir::ArithOp::Sub => a - b,
                            opalc_ir::ArithOp::Mul => a * b,
                            opalc_ir::ArithOp::Div => a / b,
                        };
                        env.insert(ValueRef::Inst(i), Value::Float(v));
                    }
                    Opcode::IntCmp(pred) => {
                        let a = as_int(self.operand(&env, inst.operands[0])?)?;
                        let b = as_int(self.operand(&env, inst.operands[1])?)?;
                        env.insert(ValueRef::Inst(i), Value::Int(cmp(pred, a, b) as i32));
                    }
                    Opcode::FloatCmp(pred) => {
                        let a = as_float(self.operand(&env, inst.operands[0])?)?;
                        let b = as_float(self.operand(&env, inst.operands[1])?)?;
                        env.insert(ValueRef::Inst(i), Value::Int(cmp(pred, a, b) as i32));
                    }
                    Opcode::SiToFp => {
                        let a = as_int(self.operand(&env, inst.operands[0])?)?;
                        env.insert(ValueRef::Inst(i), Value::Float(a as f32));
                    }
                    Opcode::FpToSi => {
                        let a = as_float(self.operand(&env, inst.operands[0])?)?;
                        env.insert(ValueRef::Inst(i), Value::Int(a as i32));
                    }
                    Opcode::Zext => {
                        let v = self.operand(&env, inst.operands[0])?;
                        env.insert(ValueRef::Inst(i), v);
                    }
                    Opcode::GetElementPtr => {
                        let base = as_ptr(self.operand(&env, inst.operands[0])?)?;
                        // The first index of the two-index (array) form is
                        // always the zero aggregate index; the last index is
                        // the element step either way.
                        let last = *inst.operands.last().expect("gep has indices");
                        let step = as_int(self.operand(&env, last)?)?;
                        env.insert(
                            ValueRef::Inst(i),
                            Value::Ptr(Pointer {
                                key: base.key,
                                offset: base.offset + step as i64,
                            }),
                        );
                    }
                    Opcode::Call => {
                        let callee = inst.callee().ok_or_else(|| RuntimeError::Internal {
                            message: "call without function operand".into(),
                        })?;
                        let mut argv = Vec::with_capacity(inst.operands.len() - 1);
                        for &op in &inst.operands[1..] {
                            argv.push(self.operand(&env, op)?);
                        }
                        let v = self.call(callee, argv)?;
                        if inst.ty != TypeId::VOID {
                            env.insert(ValueRef::Inst(i), v);
                        }
                    }
                    Opcode::Phi => {
                        return Err(RuntimeError::Internal {
                            message: "phi past the block head".into(),
                        });
                    }
                    Opcode::Br => {
                        next = inst.operands[0].as_block();
                    }
                    Opcode::CondBr => {
                        let c = as_int(self.operand(&env, inst.operands[0])?)?;
                        next = if c != 0 {
                            inst.operands[1].as_block()
                        } else {
                            inst.operands[2].as_block()
                        };
                    }
                    Opcode::Ret => {
                        return match inst.operands.first() {
                            Some(&v) => self.operand(&env, v),
                            None => Ok(Value::Unit),
                        };
                    }
                }
                if next.is_some() {
                    break;
                }
            }
            match next {
                Some(b) => {
                    prev = Some(block);
                    block = b;
                }
                None => {
                    return Err(RuntimeError::Internal {
                        message: "control fell off the end of a block".into(),
                    })
                }
            }
        }
    }

    fn operand(
        &self,
        env: &HashMap<ValueRef, Value>,
        v: ValueRef,
    ) -> Result<Value, RuntimeError> {
        match v {
            ValueRef::Const(opalc_ir::Constant::Int(x)) => Ok(Value::Int(x)),
            ValueRef::Const(opalc_ir::Constant::Float(x)) => Ok(Value::Float(x)),
            ValueRef::Const(opalc_ir::Constant::Zero(t)) => Ok(zero_scalar(self.m, t)),
            ValueRef::Global(g) => Ok(Value::Ptr(Pointer {
                key: MemKey::Global(g),
                offset: 0,
            })),
            ValueRef::Arg(_) | ValueRef::Inst(_) => {
                env.get(&v).copied().ok_or_else(|| RuntimeError::Internal {
                    message: format!("use of undefined value {:?}", v),
                })
            }
            ValueRef::Func(_) | ValueRef::Block(_) => Err(RuntimeError::Internal {
                message: "function or block in value position".into(),
            }),
        }
    }

    fn read(&self, p: Pointer) -> Result<Value, RuntimeError> {
        let cells = self.memory.get(&p.key).ok_or_else(|| RuntimeError::Internal {
            message: "dangling pointer".into(),
        })?;
        if p.offset < 0 || p.offset as usize >= cells.len() {
            return Err(RuntimeError::OutOfBounds {
                offset: p.offset,
                size: cells.len(),
            });
        }
        Ok(cells[p.offset as usize])
    }

    fn write(&mut self, p: Pointer, v: Value) -> Result<(), RuntimeError> {
        let cells = self
            .memory
            .get_mut(&p.key)
            .ok_or_else(|| RuntimeError::Internal {
                message: "dangling pointer".into(),
            })?;
        if p.offset < 0 || p.offset as usize >= cells.len() {
            return Err(RuntimeError::OutOfBounds {
                offset: p.offset,
                size: cells.len(),
            });
        }
        cells[p.offset as usize] = v;
        Ok(())
    }

    fn pop_input(&mut self) -> Result<Value, RuntimeError> {
        self.inputs.pop_front().ok_or(RuntimeError::InputExhausted)
    }

    /// The runtime library, executed in-process.
    fn intrinsic(&mut self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match name {
            "getint" | "getch" => {
                let v = self.pop_input()?;
                Ok(Value::Int(as_int(v)?))
            }
            "getfloat" => {
                let v = self.pop_input()?;
                Ok(Value::Float(as_float(v)?))
            }
            "getarray" | "getfarray" => {
                let p = as_ptr(args[0])?;
                let n = as_int(self.pop_input()?)?;
                for k in 0..n {
                    let v = self.pop_input()?;
                    self.write(at(p, k), v)?;
                }
                Ok(Value::Int(n))
            }
            "putint" | "putch" | "putfloat" => {
                self.output.push(args[0]);
                Ok(Value::Unit)
            }
            "putarray" | "putfarray" => {
                let n = as_int(args[0])?;
                let p = as_ptr(args[1])?;
                self.output.push(Value::Int(n));
                for k in 0..n {
                    let v = self.read(at(p, k))?;
                    self.output.push(v);
                }
                Ok(Value::Unit)
            }
            "memset_int" | "memset_float" => {
                let p = as_ptr(args[0])?;
                let v = args[1];
                let n = as_int(args[2])?;
                for k in 0..n {
                    self.write(at(p, k), v)?;
                }
                Ok(Value::Unit)
            }
            "_sysy_starttime" | "_sysy_stoptime" => Ok(Value::Unit),
            "neg_idx_except" => {
                self.trapped = true;
                Ok(Value::Unit)
            }
            other => Err(RuntimeError::Internal {
                message: format!("call to unresolved external '{}'", other),
            }),
        }
    }
}

fn at(p: Pointer, k: i32) -> Pointer {
    Pointer {
        key: p.key,
        offset: p.offset + k as i64,
    }
}

fn cmp<T: PartialOrd>(pred: opalc_ir::CmpPred, a: T, b: T) -> bool {
    use opalc_ir::CmpPred::*;
    match pred {
        Eq => a == b,
        Ne => a != b,
        Lt => a < b,
        Le => a <= b,
        Gt => a > b,
        Ge => a >= b,
    }
}

fn zero_scalar(m: &Module, t: TypeId) -> Value {
    if m.types.is_float(t) {
        Value::Float(0.0)
    } else {
        Value::Int(0)
    }
}

fn zero_cells(m: &Module, ty: TypeId) -> Vec<Value> {
    match m.types.get(ty) {
        Ty::Array { elem, len } => vec![zero_scalar(m, *elem); *len as usize],
        Ty::Ptr(_) => vec![Value::Unit],
        _ => vec![zero_scalar(m, ty)],
    }
}

fn as_int(v: Value) -> Result<i32, RuntimeError> {
    match v {
        Value::Int(x) => Ok(x),
        other => Err(RuntimeError::TypeMismatch {
            expected: "int",
            got: other.type_name(),
        }),
    }
}

fn as_float(v: Value) -> Result<f32, RuntimeError> {
    match v {
        Value::Float(x) => Ok(x),
        other => Err(RuntimeError::TypeMismatch {
            expected: "float",
            got: other.type_name(),
        }),
    }
}

fn as_ptr(v: Value) -> Result<Pointer, RuntimeError> {
    match v {
        Value::Ptr(p) => Ok(p),
        other => Err(RuntimeError::TypeMismatch {
            expected: "pointer",
            got: other.type_name(),
        }),
    }
}
