//! Byte-level access to IL streams.
//!
//! - [`parser::Parser`] reads opcodes and operands from a method body
//! - [`io`] provides the endian-aware primitives shared with the IL encoder

pub mod io;
pub mod parser;
