#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "register and pc narrowing is bounds-checked")]
#![expect(clippy::float_cmp, reason = "value equality and integer coercion need exact comparisons")]

mod bytecode;
mod debug;
mod error;
mod intern;
mod state;
mod trace;
mod value;

pub use crate::{
    bytecode::{ABSLINEINFO, AbsLineInfo, Instr, LIMLINEDIFF, LocalVar, MAXIWTHABS, Proto, ProtoBuilder, UpvalDesc},
    debug::{
        DebugInfo, ID_SIZE, NameKind, basic_get_obj_name, changed_line, chunk_id, find_set_reg,
        func_name_from_call, func_name_from_code, get_func_line, get_obj_name,
    },
    error::{RunError, RunResult, VarSite},
    intern::{Interns, MetaMethod, StringId},
    state::{CallStatus, Frame, FrameKind, HookMask, MIN_STACK, ThreadStatus, Transfer, Vm},
    trace::{Hook, HookControl, HookEvent, HookEventCode},
    value::{Closure, NativeFn, Table, Value},
};
