//! Debug-info assembly.
//!
//! [`Vm::get_info`] fills a caller-allocated [`DebugInfo`] record from a
//! frame handle (obtained via [`Vm::get_stack`]) or from a function value
//! popped off the stack (tag string starting with `'>'`). The tag string
//! selects which field groups are written; unknown tags make the call
//! report failure but do not stop the recognized ones from being processed.

use ahash::AHashSet;

use crate::{
    bytecode::Instr,
    state::{CallStatus, Vm},
    value::Value,
};

use super::{
    lineinfo::{get_func_line, next_line},
    symexec::get_func_name,
};

/// Maximum size of a printable source identifier.
pub const ID_SIZE: usize = 60;

/// A debug-info record.
///
/// Line numbers use `-1` for "not available" (native functions, stripped
/// debug info). `namewhat` is `""` when no name was recovered.
#[derive(Debug, Clone, Default)]
pub struct DebugInfo {
    /// Source identifier of the function's chunk.
    pub source: Option<String>,
    /// Printable form of `source`, at most [`ID_SIZE`] characters.
    pub short_src: String,
    /// `"Sol"`, `"main"`, or `"C"`.
    pub what: &'static str,
    pub linedefined: i32,
    pub lastlinedefined: i32,
    pub currentline: i32,
    /// Recovered name of the function, if any.
    pub name: Option<String>,
    /// Kind of the recovered name (`"local"`, `"global"`, `"method"`, ...).
    pub namewhat: &'static str,
    /// Number of upvalues.
    pub nups: u32,
    /// Number of declared parameters (0 for native functions).
    pub nparams: u32,
    pub isvararg: bool,
    pub istailcall: bool,
    /// First transferred value and count, when transfer info is present.
    pub ftransfer: u32,
    pub ntransfer: u32,
    /// The function value itself (tag `'f'`).
    pub func: Option<Value>,
    /// The set of source lines with code in them (tag `'L'`); `None` for
    /// native functions.
    pub activelines: Option<AHashSet<i32>>,
    /// Opaque frame handle.
    pub(crate) i_ci: Option<usize>,
}

/// Collapses a source identifier into a printable string of at most
/// [`ID_SIZE`] characters.
///
/// `=name` sources print verbatim (truncated), `@file` sources keep their
/// tail behind a `...` prefix, and literal chunks print as
/// `[string "..."]` cut at the first newline.
#[must_use]
pub fn chunk_id(source: &str) -> String {
    const RETS: &str = "...";
    const PRE: &str = "[string \"";
    const POS: &str = "\"]";
    if let Some(rest) = source.strip_prefix('=') {
        rest.chars().take(ID_SIZE - 1).collect()
    } else if let Some(rest) = source.strip_prefix('@') {
        let len = rest.chars().count();
        if len <= ID_SIZE - 1 {
            rest.to_owned()
        } else {
            let keep = ID_SIZE - 1 - RETS.len();
            let tail: String = rest.chars().skip(len - keep).collect();
            format!("{RETS}{tail}")
        }
    } else {
        let budget = ID_SIZE - PRE.len() - RETS.len() - POS.len() - 1;
        let first_line = source.split('\n').next().unwrap_or("");
        let multiline = first_line.len() != source.len();
        if !multiline && source.chars().count() < budget {
            format!("{PRE}{source}{POS}")
        } else {
            let head: String = first_line.chars().take(budget).collect();
            format!("{PRE}{head}{RETS}{POS}")
        }
    }
}

/// Fills the `'S'` fields from a function value.
fn func_info(vm: &Vm, ar: &mut DebugInfo, func: &Value) {
    if let Value::Closure(closure) = func {
        let proto = &closure.proto;
        let source = match proto.source {
            Some(id) => vm.interns().get(id).to_owned(),
            None => "=?".to_owned(),
        };
        ar.what = if proto.is_main() { "main" } else { "Sol" };
        ar.linedefined = proto.linedefined;
        ar.lastlinedefined = proto.lastlinedefined;
        ar.short_src = chunk_id(&source);
        ar.source = Some(source);
    } else {
        ar.source = Some("=[C]".to_owned());
        ar.short_src = chunk_id("=[C]");
        ar.linedefined = -1;
        ar.lastlinedefined = -1;
        ar.what = "C";
    }
}

/// Builds the `'L'` set: every source line holding at least one
/// instruction. Vararg functions skip the relocation prelude, which
/// carries the call hook instead of real user code.
fn collect_valid_lines(ar: &mut DebugInfo, func: &Value) {
    let Value::Closure(closure) = func else {
        ar.activelines = None;
        return;
    };
    let proto = &closure.proto;
    let mut lines = AHashSet::new();
    if proto.lineinfo.is_some() {
        let mut currentline = proto.linedefined;
        let mut start = 0;
        if proto.is_vararg {
            debug_assert!(matches!(proto.code.first(), Some(Instr::VarargPrep { .. })));
            currentline = next_line(proto, currentline, 0);
            start = 1;
        }
        for pc in start..proto.code.len() {
            currentline = next_line(proto, currentline, pc);
            lines.insert(currentline);
        }
    }
    ar.activelines = Some(lines);
}

fn aux_get_info(vm: &Vm, what: &str, ar: &mut DebugInfo, func: &Value, ci: Option<usize>) -> bool {
    let mut status = true;
    for tag in what.chars() {
        match tag {
            'S' => func_info(vm, ar, func),
            'l' => {
                ar.currentline = match ci {
                    Some(ci) if vm.frame(ci).is_script() => {
                        let proto = vm.frame_proto(ci).expect("script frame has a prototype");
                        get_func_line(&proto, vm.frame(ci).current_pc())
                    }
                    _ => -1,
                };
            }
            'u' => {
                if let Value::Closure(closure) = func {
                    ar.nups = u32::try_from(closure.upvals.len()).expect("upvalue count fits u32");
                    ar.isvararg = closure.proto.is_vararg;
                    ar.nparams = u32::from(closure.proto.numparams);
                } else {
                    ar.nups = 0;
                    ar.isvararg = true;
                    ar.nparams = 0;
                }
            }
            't' => {
                ar.istailcall = ci.is_some_and(|ci| vm.frame(ci).callstatus().contains(CallStatus::TAIL));
            }
            'n' => match ci.and_then(|ci| get_func_name(vm, ci)) {
                Some((kind, name)) => {
                    ar.namewhat = kind;
                    ar.name = Some(name.into_owned());
                }
                None => {
                    ar.namewhat = "";
                    ar.name = None;
                }
            },
            'r' => match ci.and_then(|ci| vm.frame(ci).transfer()) {
                Some(transfer) => {
                    ar.ftransfer = transfer.first;
                    ar.ntransfer = transfer.count;
                }
                None => {
                    ar.ftransfer = 0;
                    ar.ntransfer = 0;
                }
            },
            'f' | 'L' => {} // handled by get_info
            _ => status = false,
        }
    }
    status
}

impl Vm {
    /// Fills `ar` according to the tag string `what`.
    ///
    /// Tags: `S` (source), `l` (current line), `u` (upvalues/params), `t`
    /// (tail call), `n` (name), `r` (transfer info), `f` (the function
    /// value), `L` (active lines). A leading `'>'` pops the subject
    /// function from the stack instead of reading it from `ar`'s frame.
    ///
    /// Returns false when `what` contains an unknown tag; recognized tags
    /// are processed either way.
    ///
    /// # Panics
    /// Panics when `'>'` is used with a non-function at the stack top, or
    /// when `ar` holds no frame handle in frame mode.
    pub fn get_info(&mut self, what: &str, ar: &mut DebugInfo) -> bool {
        let (func, ci, tags) = if let Some(tags) = what.strip_prefix('>') {
            let func = self.pop_value();
            assert!(func.is_function(), "function expected");
            (func, None, tags)
        } else {
            let ci = ar.i_ci.expect("DebugInfo must come from get_stack or a hook event");
            let func = self.slot(self.frame(ci).func_slot()).clone();
            debug_assert!(func.is_function());
            (func, Some(ci), what)
        };
        let status = aux_get_info(self, tags, ar, &func, ci);
        if tags.contains('L') {
            collect_valid_lines(ar, &func);
        }
        if tags.contains('f') {
            ar.func = Some(func);
        }
        status
    }
}
