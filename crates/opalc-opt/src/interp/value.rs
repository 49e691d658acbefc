//! Runtime value representation for the reference interpreter.

use opalc_ir::GlobalId;

/// The base object a pointer addresses: a global's storage or one stack
/// allocation (numbered per `alloca` execution, so recursion gets fresh
/// slots).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemKey {
    Global(GlobalId),
    Stack(usize),
}

/// A typed address: base object plus element offset. Offsets go negative
/// when address arithmetic does (the access check catches them).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pointer {
    pub key: MemKey,
    pub offset: i64,
}

/// A runtime value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    Ptr(Pointer),
    Unit,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Ptr(_) => "pointer",
            Value::Unit => "unit",
        }
    }
}
