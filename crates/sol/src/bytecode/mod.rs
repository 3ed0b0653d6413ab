//! Bytecode representation.
//!
//! This module contains the instruction set, the compiled function
//! prototype, and the builder the compiler backend uses to assemble
//! prototypes.
//!
//! # Module Structure
//!
//! - `op` - tagged instruction enum and opcode predicates
//! - `proto` - function prototypes, line tables, variable descriptors
//! - `builder` - ProtoBuilder for emitting instructions and line info

pub use builder::ProtoBuilder;
pub use op::Instr;
pub use proto::{ABSLINEINFO, AbsLineInfo, LIMLINEDIFF, LocalVar, MAXIWTHABS, Proto, UpvalDesc};

mod builder;
mod op;
mod proto;
