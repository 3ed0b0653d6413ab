//! Symbolic execution over bytecode.
//!
//! Given a prototype, a current pc, and a register, these routines
//! reconstruct a best-effort name and kind for whatever value lives in the
//! register: a named local, an upvalue, a string constant, a table field, a
//! global, or a method. The result feeds error messages ("attempt to call a
//! nil value (global 'prnt')") and the `n` field of debug-info queries.
//!
//! The core is [`find_set_reg`]: a forward scan over `code[0..lastpc)`
//! tracking the last instruction that provably wrote the register. Writes
//! inside a conditionally executed region (before a forward jump target)
//! cannot be attributed and are discarded. "Unknown" is always an
//! acceptable answer, reported as `None` or a `"?"` placeholder name.

use std::borrow::Cow;

use crate::{
    bytecode::{Instr, Proto},
    intern::{Interns, MetaMethod},
    state::{CallStatus, Vm},
};

/// A recovered name: its kind (fixed vocabulary: `"local"`, `"upvalue"`,
/// `"constant"`, `"field"`, `"global"`, `"method"`, `"for iterator"`,
/// `"hook"`, `"metamethod"`) and the name itself.
pub type NameKind = (&'static str, Cow<'static, str>);

/// The declared name of upvalue `uv`, or `"?"` when debug info is stripped.
pub(crate) fn upval_name(p: &Proto, interns: &Interns, uv: usize) -> Cow<'static, str> {
    match p.upvalues.get(uv).and_then(|desc| desc.name) {
        Some(id) => Cow::Owned(interns.get(id).to_owned()),
        None => Cow::Borrowed("?"),
    }
}

/// The text of string constant `c`, or `"?"` for non-string constants.
fn kname(p: &Proto, interns: &Interns, c: u32) -> Cow<'static, str> {
    match p.k.get(c as usize) {
        Some(crate::value::Value::Str(id)) => Cow::Owned(interns.get(*id).to_owned()),
        _ => Cow::Borrowed("?"),
    }
}

/// The name of register `c` at `pc`, accepted only when it resolves to a
/// string constant.
fn rname(p: &Proto, interns: &Interns, pc: usize, c: u32) -> Cow<'static, str> {
    let mut pc = Some(pc);
    match basic_get_obj_name(p, interns, &mut pc, u8::try_from(c).unwrap_or(u8::MAX)) {
        Some(("constant", name)) => name,
        _ => Cow::Borrowed("?"),
    }
}

/// Key name for an instruction whose `k` flag selects between a constant
/// and a register key.
fn rkname(p: &Proto, interns: &Interns, pc: usize, c: u8, k: bool) -> Cow<'static, str> {
    if k {
        kname(p, interns, u32::from(c))
    } else {
        rname(p, interns, pc, u32::from(c))
    }
}

/// Writes before a pending forward-jump target sit in conditional code and
/// cannot be attributed.
fn filter_pc(pc: usize, jmptarget: usize) -> Option<usize> {
    if pc < jmptarget { None } else { Some(pc) }
}

/// Finds the last instruction before `lastpc` that provably wrote `reg`.
///
/// Returns `None` when the origin is unknown: the register was never
/// written in the scanned range, or the write sits in a conditional region
/// the scan cannot prove executed.
#[must_use]
pub fn find_set_reg(p: &Proto, lastpc: usize, reg: u8) -> Option<usize> {
    let mut lastpc = lastpc;
    if p.code.get(lastpc).is_some_and(Instr::test_mm_mode) {
        // a metamethod follow-up has not run yet; the faulting instruction
        // is the one before it
        lastpc = lastpc.checked_sub(1)?;
    }
    let mut setreg: Option<usize> = None;
    let mut jmptarget = 0usize;
    for pc in 0..lastpc {
        let instr = &p.code[pc];
        let change = match *instr {
            Instr::LoadNil { a, b } => {
                // sets registers a..=a+b
                u32::from(a) <= u32::from(reg) && u32::from(reg) <= u32::from(a) + u32::from(b)
            }
            Instr::TForCall { a, .. } => reg >= a.saturating_add(2),
            Instr::Call { a, .. } | Instr::TailCall { a, .. } => reg >= a,
            Instr::Jmp { sj } => {
                let dest = i64::try_from(pc).expect("pc fits i64") + 1 + i64::from(sj);
                // jumps within the scan window extend the conditional region
                if dest >= 0 {
                    let dest = usize::try_from(dest).expect("non-negative");
                    if dest <= lastpc && dest > jmptarget {
                        jmptarget = dest;
                    }
                }
                false
            }
            _ => instr.test_a_mode() && instr.arg_a() == Some(reg),
        };
        if change {
            setreg = filter_pc(pc, jmptarget);
        }
    }
    setreg
}

/// Name resolution for locals, upvalues, and constants.
///
/// Tries the local-variable table at `*ppc` first, then symbolically
/// executes to the instruction that wrote `reg` and names its source.
/// `*ppc` is left at that instruction so [`get_obj_name`] can extend the
/// dispatch to table accesses.
pub fn basic_get_obj_name(p: &Proto, interns: &Interns, ppc: &mut Option<usize>, reg: u8) -> Option<NameKind> {
    basic_name_rec(p, interns, ppc, reg, 0)
}

fn basic_name_rec(
    p: &Proto,
    interns: &Interns,
    ppc: &mut Option<usize>,
    reg: u8,
    depth: usize,
) -> Option<NameKind> {
    if depth > p.code.len() {
        return None;
    }
    let pc = (*ppc)?;
    if let Some(id) = p.local_name(u32::from(reg) + 1, pc) {
        return Some(("local", Cow::Owned(interns.get(id).to_owned())));
    }
    *ppc = find_set_reg(p, pc, reg);
    let setpc = (*ppc)?;
    match p.code[setpc] {
        // the value was moved from a lower register and keeps its origin
        Instr::Move { a, b } if b < a => basic_name_rec(p, interns, ppc, b, depth + 1),
        Instr::GetUpval { b, .. } => Some(("upvalue", upval_name(p, interns, usize::from(b)))),
        Instr::LoadK { bx, .. } => Some(("constant", kname(p, interns, bx))),
        Instr::LoadKx { .. } => match p.code.get(setpc + 1) {
            Some(Instr::ExtraArg { ax }) => Some(("constant", kname(p, interns, *ax))),
            _ => Some(("constant", Cow::Borrowed("?"))),
        },
        _ => None,
    }
}

/// Classifies a table access as `"global"` when the indexed table is the
/// `_ENV` upvalue or a variable named `_ENV`, else `"field"`.
fn table_access_kind(p: &Proto, interns: &Interns, pc: usize, t: u8, is_upval: bool) -> &'static str {
    let name: Option<Cow<'static, str>> = if is_upval {
        Some(upval_name(p, interns, usize::from(t)))
    } else {
        let mut pc = Some(pc);
        basic_get_obj_name(p, interns, &mut pc, t).map(|(_, name)| name)
    };
    if name.as_deref() == Some("_ENV") { "global" } else { "field" }
}

/// Full name resolution for the value in `reg` at `lastpc`.
///
/// Extends [`basic_get_obj_name`] with the table-access instructions, so
/// values fetched from tables report as fields, globals, or methods.
#[must_use]
pub fn get_obj_name(p: &Proto, interns: &Interns, lastpc: usize, reg: u8) -> Option<NameKind> {
    let mut pc = Some(lastpc);
    if let Some(found) = basic_get_obj_name(p, interns, &mut pc, reg) {
        return Some(found);
    }
    let setpc = pc?;
    match p.code[setpc] {
        Instr::GetTabUp { b, c, .. } => {
            Some((table_access_kind(p, interns, setpc, b, true), kname(p, interns, u32::from(c))))
        }
        Instr::GetTable { b, c, .. } => {
            Some((table_access_kind(p, interns, setpc, b, false), rname(p, interns, setpc, u32::from(c))))
        }
        Instr::GetI { .. } => Some(("field", Cow::Borrowed("integer index"))),
        Instr::GetField { b, c, .. } => {
            Some((table_access_kind(p, interns, setpc, b, false), kname(p, interns, u32::from(c))))
        }
        Instr::Self_ { c, k, .. } => Some(("method", rkname(p, interns, setpc, c, k))),
        _ => None,
    }
}

/// Names the function being called by the instruction at `pc`.
///
/// Calls through metamethods report the metamethod's event name; the
/// generic `for` iterator call reports as `"for iterator"`.
#[must_use]
pub fn func_name_from_code(p: &Proto, interns: &Interns, pc: usize) -> Option<NameKind> {
    let tag = match p.code[pc] {
        Instr::Call { a, .. } | Instr::TailCall { a, .. } => return get_obj_name(p, interns, pc, a),
        Instr::TForCall { .. } => return Some(("for iterator", Cow::Borrowed("for iterator"))),
        Instr::Self_ { .. }
        | Instr::GetTabUp { .. }
        | Instr::GetTable { .. }
        | Instr::GetI { .. }
        | Instr::GetField { .. } => MetaMethod::Index,
        Instr::SetTabUp { .. } | Instr::SetTable { .. } | Instr::SetI { .. } | Instr::SetField { .. } => {
            MetaMethod::NewIndex
        }
        Instr::MmBin { tag, .. } | Instr::MmBinI { tag, .. } | Instr::MmBinK { tag, .. } => tag,
        Instr::Unm { .. } => MetaMethod::Unm,
        Instr::BNot { .. } => MetaMethod::BNot,
        Instr::Len { .. } => MetaMethod::Len,
        Instr::Concat { .. } => MetaMethod::Concat,
        Instr::Eq { .. } => MetaMethod::Eq,
        Instr::Lt { .. } | Instr::LtI { .. } | Instr::GtI { .. } => MetaMethod::Lt,
        Instr::Le { .. } | Instr::LeI { .. } | Instr::GeI { .. } => MetaMethod::Le,
        Instr::Close { .. } | Instr::Return { .. } => MetaMethod::Close,
        _ => return None,
    };
    Some(("metamethod", Cow::Borrowed(tag.without_prefix())))
}

/// Names the function running in frame `ci`, judged from its call site.
///
/// Functions invoked by a hook or a finalizer have fixed names; script
/// callers delegate to the instruction that performed the call.
#[must_use]
pub fn func_name_from_call(vm: &Vm, ci: usize) -> Option<NameKind> {
    let frame = vm.frame(ci);
    if frame.callstatus().contains(CallStatus::HOOKED) {
        return Some(("hook", Cow::Borrowed("?")));
    }
    if frame.callstatus().contains(CallStatus::FIN) {
        return Some(("metamethod", Cow::Borrowed("__gc")));
    }
    if frame.is_script() {
        let proto = vm.frame_proto(ci)?;
        func_name_from_code(&proto, vm.interns(), frame.current_pc())
    } else {
        None
    }
}

/// Names the function of frame `ci` as seen from its caller. Tail calls
/// erase the caller, so they yield no name.
pub(crate) fn get_func_name(vm: &Vm, ci: usize) -> Option<NameKind> {
    if ci == 0 || vm.frame(ci).callstatus().contains(CallStatus::TAIL) {
        return None;
    }
    func_name_from_call(vm, ci - 1)
}
