//! Builder for assembling prototypes.
//!
//! `ProtoBuilder` is the emission surface the compiler backend uses to
//! produce a [`Proto`]: it appends instructions, tracks the current source
//! line, and maintains the compressed line table as it goes.
//!
//! # Usage
//!
//! ```ignore
//! let mut builder = ProtoBuilder::new(10);
//! builder.set_line(10);
//! builder.emit(Instr::LoadNil { a: 0, b: 0 });
//! builder.set_line(11);
//! builder.emit(Instr::Return0);
//! let proto = builder.build();
//! ```

use crate::{
    intern::StringId,
    value::Value,
};

use super::{
    op::Instr,
    proto::{ABSLINEINFO, AbsLineInfo, LIMLINEDIFF, LocalVar, MAXIWTHABS, Proto, UpvalDesc},
};

/// Builder for emitting instructions and assembling a [`Proto`].
///
/// Handles line-table compression: per-instruction deltas as signed bytes,
/// with an absolute anchor (and the [`ABSLINEINFO`] sentinel in the delta
/// stream) whenever a delta overflows [`LIMLINEDIFF`] or [`MAXIWTHABS`]
/// instructions have been emitted since the last anchor.
#[derive(Debug)]
pub struct ProtoBuilder {
    code: Vec<Instr>,
    constants: Vec<Value>,
    upvalues: Vec<UpvalDesc>,
    locvars: Vec<LocalVar>,
    /// Parameter names; turned into whole-function locals at build time.
    params: Vec<StringId>,
    lineinfo: Vec<i8>,
    abslineinfo: Vec<AbsLineInfo>,
    /// Line for subsequently emitted instructions.
    current_line: i32,
    /// Last line saved into the line table.
    previous_line: i32,
    /// Instructions emitted since the last absolute anchor.
    iwthabs: usize,
    linedefined: i32,
    lastlinedefined: i32,
    is_vararg: bool,
    maxstacksize: u8,
    source: Option<StringId>,
    strip: bool,
}

impl ProtoBuilder {
    /// Creates a builder for a function defined at `linedefined` (0 for a
    /// main chunk).
    #[must_use]
    pub fn new(linedefined: i32) -> Self {
        Self {
            code: Vec::new(),
            constants: Vec::new(),
            upvalues: Vec::new(),
            locvars: Vec::new(),
            params: Vec::new(),
            lineinfo: Vec::new(),
            abslineinfo: Vec::new(),
            current_line: linedefined,
            previous_line: linedefined,
            iwthabs: 0,
            linedefined,
            lastlinedefined: linedefined,
            is_vararg: false,
            maxstacksize: 8,
            source: None,
            strip: false,
        }
    }

    /// Sets the source line for subsequently emitted instructions.
    pub fn set_line(&mut self, line: i32) {
        self.current_line = line;
        if line > self.lastlinedefined {
            self.lastlinedefined = line;
        }
    }

    /// Emits one instruction at the current line.
    pub fn emit(&mut self, instr: Instr) {
        self.save_line_info(self.current_line);
        self.code.push(instr);
    }

    /// Records the line of the instruction about to be emitted.
    fn save_line_info(&mut self, line: i32) {
        let linedif = line - self.previous_line;
        let pc = self.code.len();
        let force_abs = linedif.abs() >= LIMLINEDIFF || {
            let seen = self.iwthabs;
            self.iwthabs += 1;
            seen >= MAXIWTHABS
        };
        if force_abs {
            self.abslineinfo.push(AbsLineInfo { pc, line });
            self.lineinfo.push(ABSLINEINFO);
            self.iwthabs = 1;
        } else {
            self.lineinfo.push(linedif as i8);
        }
        self.previous_line = line;
    }

    /// Appends a constant and returns its pool index.
    pub fn add_const(&mut self, value: Value) -> u32 {
        let index = u32::try_from(self.constants.len()).expect("constant pool overflow");
        self.constants.push(value);
        index
    }

    /// Declares a parameter. Parameters are locals live over the whole
    /// function, numbered before any other local.
    pub fn add_param(&mut self, name: StringId) {
        self.params.push(name);
    }

    /// Declares a named local live over `start_pc..end_pc`.
    ///
    /// Locals must be declared in source order: the debug API numbers live
    /// variables by their position in this table.
    pub fn add_local(&mut self, name: StringId, start_pc: usize, end_pc: usize) {
        self.locvars.push(LocalVar { name, start_pc, end_pc });
    }

    /// Declares an upvalue and returns its index.
    pub fn add_upvalue(&mut self, name: Option<StringId>) -> u8 {
        let index = u8::try_from(self.upvalues.len()).expect("too many upvalues");
        self.upvalues.push(UpvalDesc { name, in_stack: false, index });
        index
    }

    /// Marks the function as variadic.
    pub fn set_vararg(&mut self) {
        self.is_vararg = true;
    }

    /// Sets the register count the function needs.
    pub fn set_max_stack(&mut self, maxstacksize: u8) {
        self.maxstacksize = maxstacksize;
    }

    /// Sets the source identifier.
    pub fn set_source(&mut self, source: StringId) {
        self.source = Some(source);
    }

    /// Sets the last line of the definition explicitly.
    pub fn set_last_line(&mut self, line: i32) {
        self.lastlinedefined = line;
    }

    /// Drops line information from the built prototype, as `strip` mode
    /// does for distributed chunks.
    pub fn strip_line_info(&mut self) {
        self.strip = true;
    }

    /// Number of instructions emitted so far.
    #[must_use]
    pub fn pc(&self) -> usize {
        self.code.len()
    }

    /// Finalizes the prototype.
    #[must_use]
    pub fn build(self) -> Proto {
        let end = self.code.len();
        let mut locvars: Vec<LocalVar> =
            self.params.iter().map(|&name| LocalVar { name, start_pc: 0, end_pc: end }).collect();
        locvars.extend(self.locvars);
        let (lineinfo, abslineinfo) = if self.strip {
            (None, Vec::new())
        } else {
            (Some(self.lineinfo), self.abslineinfo)
        };
        Proto {
            code: self.code,
            k: self.constants,
            upvalues: self.upvalues,
            locvars,
            lineinfo,
            abslineinfo,
            linedefined: self.linedefined,
            lastlinedefined: self.lastlinedefined,
            numparams: u8::try_from(self.params.len()).expect("too many parameters"),
            is_vararg: self.is_vararg,
            maxstacksize: self.maxstacksize,
            source: self.source,
        }
    }
}
