//! The transform passes: constant folding, dead-code elimination, function
//! inlining, and loop-invariant code motion.

pub mod const_fold;
pub mod dead_code;
pub mod inline;
pub mod licm;

pub use const_fold::ConstPropagation;
pub use dead_code::DeadCode;
pub use inline::FunctionInline;
pub use licm::LoopInvariantCodeMotion;
