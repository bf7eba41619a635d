//! Domain models for the PCOS screening system.

mod analysis;
mod record;

pub use analysis::*;
pub use record::*;
