//! Analyses consumed by the transform passes: function purity and the
//! natural loop forest.

pub mod func_info;
pub mod loops;

pub use func_info::FuncInfo;
pub use loops::{Loop, LoopForest, LoopId};
