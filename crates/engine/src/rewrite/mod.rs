//! Source-to-source passes: variable renaming and join rewriting.
pub mod optimizer;
pub mod rename;

pub use optimizer::{OptimizeOutcome, Phase, Rejection, optimize};
pub use rename::{Renamer, rename};
