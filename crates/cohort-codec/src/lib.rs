// Author: Lukas Bower
// Purpose: Provide cohort coordination wire types and codec primitives.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Wire types and codec primitives for the cohort checkpoint-coordination
//! protocol. Every other cohort component builds messages and parses replies
//! through this crate.

mod codec;
mod types;

pub use codec::{decode, decode_header, encode, parse_cstr, parse_cstrs, push_cstr};
pub use types::*;
