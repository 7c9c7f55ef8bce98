//! Bitcoin script: parsing, building, signature hashing and evaluation.

mod base;
mod builder;
mod error;
mod flags;
mod interpreter;
pub mod num;
mod op;
mod sighash;

pub use base::*;
pub use builder::*;
pub use error::*;
pub use flags::*;
pub use interpreter::*;
pub use op::*;
pub use sighash::*;
