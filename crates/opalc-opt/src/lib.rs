//! Analyses, transform passes, and the reference interpreter for the opalc
//! middle-end.
//!
//! The pipeline is caller-assembled: register passes on a
//! [`PassManager`] in the order you want and run it over a module.
//!
//! ```ignore
//! let mut pm = PassManager::new();
//! pm.register(ConstPropagation);
//! pm.register(DeadCode);
//! pm.register(FunctionInline::default());
//! pm.register(LoopInvariantCodeMotion);
//! pm.run(&mut module);
//! ```

pub mod analysis;
pub mod interp;
pub mod pass;
pub mod transform;

// Re-export commonly used types
pub use analysis::{FuncInfo, Loop, LoopForest, LoopId};
pub use interp::{Interp, InterpConfig, RuntimeError};
pub use pass::{Pass, PassManager};
pub use transform::{ConstPropagation, DeadCode, FunctionInline, LoopInvariantCodeMotion};
