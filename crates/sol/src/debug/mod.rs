//! Runtime inspection of the interpreter.
//!
//! This module is the host-facing debug API and the machinery behind it:
//!
//! - `lineinfo` - decode the compressed pc-to-line table
//! - `frames` - walk activation records, read and write locals
//! - `symexec` - recover names for registers and called functions
//! - `info` - assemble [`DebugInfo`] records on request
//!
//! All entry points take the interpreter state by reference; exclusive
//! access is the locking discipline, so every query observes a consistent
//! frame chain. Everything here is reentrant from hook callbacks.

pub use info::{DebugInfo, ID_SIZE, chunk_id};
pub use lineinfo::{changed_line, get_func_line};
pub use symexec::{NameKind, basic_get_obj_name, find_set_reg, func_name_from_call, func_name_from_code, get_obj_name};

mod frames;
mod info;
mod lineinfo;
pub(crate) mod symexec;
