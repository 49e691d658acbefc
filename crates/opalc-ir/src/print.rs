//! Textual IR rendering.
//!
//! LLVM-flavored, deterministic output: arguments and value-producing
//! instructions are numbered `%0, %1, ...` per function in program order,
//! blocks print their label (or a positional `bbN` label when unnamed).
//! Exists for debugging, snapshot tests, and the CLI's `build` output.

use std::collections::HashMap;
use std::fmt;

use crate::id::{BlockId, FuncId};
use crate::inst::Opcode;
use crate::module::Module;
use crate::types::TypeId;
use crate::value::{Constant, ValueRef};

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &g in self.globals() {
            let global = self.global(g);
            writeln!(
                f,
                "@{} = global {} {}",
                global.name,
                self.types.name(global.ty),
                const_str(&global.init)
            )?;
        }
        if !self.globals().is_empty() {
            writeln!(f)?;
        }
        for (i, &func) in self.functions().iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write_function(f, self, func)?;
        }
        Ok(())
    }
}

fn const_str(c: &Constant) -> String {
    match c {
        Constant::Int(v) => v.to_string(),
        Constant::Float(v) => format!("{:?}", v),
        Constant::Zero(_) => "zeroinitializer".into(),
    }
}

fn write_function(f: &mut fmt::Formatter<'_>, m: &Module, id: FuncId) -> fmt::Result {
    let func = m.func(id);
    let param_tys: Vec<String> = func.args.iter().map(|&a| m.types.name(m.arg(a).ty)).collect();
    if func.is_declaration() {
        return writeln!(
            f,
            "declare {} @{}({})",
            m.types.name(func.ret),
            func.name,
            param_tys.join(", ")
        );
    }

    // Number arguments first, then every value-producing instruction, in
    // program order.
    let mut names: HashMap<ValueRef, String> = HashMap::new();
    let mut counter = 0usize;
    for &a in &func.args {
        names.insert(ValueRef::Arg(a), format!("%{}", counter));
        counter += 1;
    }
    for &b in &func.blocks {
        for &i in &m.block(b).insts {
            if m.inst(i).ty != TypeId::VOID {
                names.insert(ValueRef::Inst(i), format!("%{}", counter));
                counter += 1;
            }
        }
    }
    let block_label = |b: BlockId| -> String {
        let bb = m.block(b);
        if bb.name.is_empty() {
            let pos = func.blocks.iter().position(|&x| x == b).unwrap_or(0);
            format!("bb{}", pos)
        } else {
            bb.name.clone()
        }
    };
    let val_name = |v: ValueRef| -> String {
        match v {
            ValueRef::Const(c) => const_str(&c),
            ValueRef::Global(g) => format!("@{}", m.global(g).name),
            ValueRef::Func(callee) => format!("@{}", m.func(callee).name),
            ValueRef::Block(b) => format!("%{}", block_label(b)),
            other => names.get(&other).cloned().unwrap_or_else(|| "%?".into()),
        }
    };
    let val_typed = |v: ValueRef| -> String {
        match v {
            ValueRef::Block(b) => format!("label %{}", block_label(b)),
            other => format!("{} {}", m.types.name(m.type_of(other)), val_name(other)),
        }
    };

    let params: Vec<String> = func
        .args
        .iter()
        .map(|&a| format!("{} {}", m.types.name(m.arg(a).ty), val_name(ValueRef::Arg(a))))
        .collect();
    writeln!(
        f,
        "define {} @{}({}) {{",
        m.types.name(func.ret),
        func.name,
        params.join(", ")
    )?;

    for &b in &func.blocks {
        writeln!(f, "{}:", block_label(b))?;
        for &i in &m.block(b).insts {
            let inst = m.inst(i);
            let mut line = String::from("  ");
            if inst.ty != TypeId::VOID {
                line.push_str(&format!("{} = ", val_name(ValueRef::Inst(i))));
            }
            match inst.opcode {
                Opcode::Alloca => {
                    let pointee = m.types.pointee(inst.ty).unwrap_or(TypeId::VOID);
                    line.push_str(&format!("alloca {}", m.types.name(pointee)));
                }
                Opcode::Call => {
                    let callee = inst.operands[0];
                    let args: Vec<String> =
                        inst.operands[1..].iter().map(|&v| val_typed(v)).collect();
                    line.push_str(&format!(
                        "call {} {}({})",
                        m.types.name(inst.ty),
                        val_name(callee),
                        args.join(", ")
                    ));
                }
                Opcode::Phi => {
                    let pairs: Vec<String> = inst
                        .operands
                        .chunks(2)
                        .map(|pair| {
                            format!("[ {}, {} ]", val_name(pair[0]), val_name(pair[1]))
                        })
                        .collect();
                    line.push_str(&format!(
                        "phi {} {}",
                        m.types.name(inst.ty),
                        pairs.join(", ")
                    ));
                }
                Opcode::Ret if inst.operands.is_empty() => {
                    line.push_str("ret void");
                }
                opcode => {
                    let operands: Vec<String> =
                        inst.operands.iter().map(|&v| val_typed(v)).collect();
                    line.push_str(&format!("{} {}", opcode, operands.join(", ")));
                }
            }
            writeln!(f, "{}", line)?;
        }
    }
    writeln!(f, "}}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::inst::{ArithOp, CmpPred};

    #[test]
    fn prints_a_small_function() {
        let mut m = Module::new();
        let f = m.new_function("clamp_add", vec![TypeId::I32], TypeId::I32);
        let arg = ValueRef::Arg(m.func(f).args[0]);
        let entry = m.new_block(f, "entry");
        let pos = m.new_block(f, "");
        let end = m.new_block(f, "");

        let mut b = Builder::at(&mut m, entry);
        let flag = b.create_icmp(CmpPred::Gt, arg, ValueRef::int(0)).unwrap();
        b.create_cond_br(flag, pos, end).unwrap();
        b.set_insert_point(pos);
        let sum = b
            .create_int_binary(ArithOp::Add, arg, ValueRef::int(1))
            .unwrap();
        b.create_ret(sum).unwrap();
        b.set_insert_point(end);
        b.create_ret(ValueRef::int(0)).unwrap();

        let text = m.to_string();
        insta::assert_snapshot!(text, @r###"
        define i32 @clamp_add(i32 %0) {
        entry:
          %1 = icmp gt i32 %0, i32 0
          cond_br i1 %1, label %bb1, label %bb2
        bb1:
          %2 = add i32 %0, i32 1
          ret i32 %2
        bb2:
          ret i32 0
        }
        "###);
    }

    #[test]
    fn prints_globals_and_declarations() {
        let mut m = Module::new();
        let arr = m.types.array_of(TypeId::F32, 4);
        m.new_global("scale", TypeId::F32, Constant::Zero(TypeId::F32));
        m.new_global("table", arr, Constant::Zero(arr));
        m.new_function("getint", vec![], TypeId::I32);

        let text = m.to_string();
        insta::assert_snapshot!(text, @r###"
        @scale = global f32 zeroinitializer
        @table = global [4 x f32] zeroinitializer

        declare i32 @getint()
        "###);
    }
}
