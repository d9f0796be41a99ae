//! Dosage strength parsing and cross-dosage equivalence.

mod equivalence;
mod parser;

pub use equivalence::*;
pub use parser::*;
