//! Runtime error construction.
//!
//! The constructors here build the enriched messages the interpreter raises
//! for type, call, arithmetic, comparison, and concatenation failures. Each
//! returns a [`RunError`] for the caller to propagate with `?` or `return
//! Err(..)`; the protected-call driver that eventually catches it is a
//! separate subsystem.
//!
//! Messages follow a fixed shape relied on by tooling:
//!
//! ```text
//! file.sol:12: attempt to perform arithmetic on a nil value (local 'y')
//! ```
//!
//! The `file:line:` prefix comes from [`Vm::run_error`], and the variable
//! description comes from [`Vm::var_info`], which consults the symbolic
//! executor to name the offending value.

use std::borrow::Cow;

use crate::{
    debug::{chunk_id, get_func_line},
    debug::symexec::{func_name_from_call, get_obj_name, upval_name},
    intern::StringId,
    state::Vm,
    value::Value,
};

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// An error unwinding out of the interpreter core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// A runtime error carrying its (handler-transformed) message.
    Runtime(String),
    /// A hook requested a coroutine yield; not an error, but it unwinds the
    /// same way and is consumed by the resume machinery.
    Yield,
}

impl RunError {
    /// The message of a runtime error; yields have none.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Runtime(msg) => Some(msg),
            Self::Yield => None,
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Runtime(msg) => f.write_str(msg),
            Self::Yield => f.write_str("yield"),
        }
    }
}

impl std::error::Error for RunError {}

/// Where the interpreter found an offending operand.
///
/// The dispatch loop knows where each operand came from; passing that
/// location here replaces the pointer-identity scan a C implementation
/// performs over the upvalue storage and the stack window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarSite {
    /// An absolute stack slot.
    Slot(usize),
    /// An upvalue index of the running closure.
    Upvalue(usize),
    /// A constant operand, or a value that never lived in the frame.
    None,
}

fn format_var_info(kindname: Option<(&'static str, Cow<'_, str>)>) -> String {
    match kindname {
        Some((kind, name)) => format!(" ({kind} '{name}')"),
        None => String::new(),
    }
}

impl Vm {
    /// Describes the variable holding the blamed value, e.g. `" (local 'x')"`.
    ///
    /// Empty when the current frame is native, when the site lies outside
    /// the frame's active window, or when symbolic execution finds no name.
    #[must_use]
    pub fn var_info(&self, site: VarSite) -> String {
        let ci = self.current_ci();
        let frame = self.frame(ci);
        if !frame.is_script() {
            return String::new();
        }
        let Some(proto) = self.frame_proto(ci) else {
            return String::new();
        };
        let kindname = match site {
            VarSite::Upvalue(idx) => Some(("upvalue", upval_name(&proto, self.interns(), idx))),
            VarSite::Slot(slot) if slot > frame.func_slot() && slot < frame.top_slot() => {
                let reg = u8::try_from(slot - frame.func_slot() - 1).ok();
                reg.and_then(|reg| get_obj_name(&proto, self.interns(), frame.current_pc(), reg))
            }
            _ => None,
        };
        format_var_info(kindname)
    }

    fn type_error_extra(&mut self, o: &Value, op: &str, extra: &str) -> RunError {
        let t = o.type_name();
        self.run_error(format!("attempt to {op} a {t} value{extra}"))
    }

    /// Error for applying `op` to a value of the wrong type.
    pub fn type_error(&mut self, o: &Value, op: &str, site: VarSite) -> RunError {
        let extra = self.var_info(site);
        self.type_error_extra(o, op, &extra)
    }

    /// Error for calling a non-callable value. Prefers the call-site name
    /// of the callee; falls back to describing the value's variable.
    pub fn call_error(&mut self, o: &Value, site: VarSite) -> RunError {
        let ci = self.current_ci();
        let extra = match func_name_from_call(self, ci) {
            Some((kind, name)) => format!(" ({kind} '{name}')"),
            None => self.var_info(site),
        };
        self.type_error_extra(o, "call", &extra)
    }

    /// Error for a non-numeric `for` loop control value; `what` is
    /// `"initial value"`, `"limit"`, or `"step"`.
    pub fn for_error(&mut self, o: &Value, what: &str) -> RunError {
        self.run_error(format!("bad 'for' {what} (number expected, got {})", o.type_name()))
    }

    /// Error for concatenating a value that is neither string nor number.
    /// Whichever operand is invalid gets the blame.
    pub fn concat_error(&mut self, p1: (&Value, VarSite), p2: (&Value, VarSite)) -> RunError {
        let (bad, site) = if p1.0.coerces_to_string() { p2 } else { p1 };
        self.type_error(bad, "concatenate", site)
    }

    /// Error for an arithmetic or bitwise operation on a non-numeric
    /// operand; `msg` names the operation, e.g. `"perform arithmetic on"`.
    pub fn opint_error(&mut self, p1: (&Value, VarSite), p2: (&Value, VarSite), msg: &str) -> RunError {
        let (bad, site) = if p1.0.is_number() { p2 } else { p1 };
        self.type_error(bad, msg, site)
    }

    /// Error for a number without an exact integer representation, raised
    /// by operations requiring integer operands.
    pub fn toint_error(&mut self, p1: (&Value, VarSite), p2: (&Value, VarSite)) -> RunError {
        let (_, site) = if p1.0.to_integer().is_none() { p1 } else { p2 };
        let extra = self.var_info(site);
        self.run_error(format!("number{extra} has no integer representation"))
    }

    /// Error for an order comparison between incompatible values.
    pub fn order_error(&mut self, p1: &Value, p2: &Value) -> RunError {
        let t1 = p1.type_name();
        let t2 = p2.type_name();
        if t1 == t2 {
            self.run_error(format!("attempt to compare two {t1} values"))
        } else {
            self.run_error(format!("attempt to compare {t1} with {t2}"))
        }
    }

    /// Prefixes `msg` with `source:line: `, using `"?"` when the source is
    /// unavailable.
    #[must_use]
    pub fn add_info(&self, msg: &str, source: Option<StringId>, line: i32) -> String {
        let ident = match source {
            Some(id) => chunk_id(self.interns().get(id)),
            None => "?".to_owned(),
        };
        format!("{ident}:{line}: {msg}")
    }

    /// Raises a runtime error: prefixes the message with the current
    /// source position when a script frame is running, then routes it
    /// through the installed message handler.
    pub fn run_error(&mut self, msg: impl Into<String>) -> RunError {
        let mut msg = msg.into();
        let ci = self.current_ci();
        if self.frame(ci).is_script() {
            if let Some(proto) = self.frame_proto(ci) {
                let line = get_func_line(&proto, self.frame(ci).current_pc());
                msg = self.add_info(&msg, proto.source, line);
            }
        }
        self.error_msg(msg)
    }

    /// Final step of error raising: runs the installed message handler (if
    /// any) on the message, then produces the unwinding error.
    ///
    /// The handler slot must hold a native function; running a script
    /// handler requires the dispatch loop, which drives this path through
    /// the protected-call machinery instead. The handler may not yield.
    pub(crate) fn error_msg(&mut self, msg: String) -> RunError {
        let Some(errfunc) = self.errfunc else {
            return RunError::Runtime(msg);
        };
        let Value::Native(handler) = *self.slot(errfunc) else {
            return RunError::Runtime(msg);
        };
        let handler_slot = self.stack_len();
        let msg_id = self.interns_mut().intern(&msg);
        self.push_value(Value::Native(handler));
        self.push_value(Value::Str(msg_id));
        self.push_native_frame(1);
        match handler(self) {
            Ok(nres) => {
                if let Err(err) = self.pop_frame(nres) {
                    return err;
                }
                let result = if nres == 0 { Value::Nil } else { self.slot(handler_slot).clone() };
                self.set_top(handler_slot);
                RunError::Runtime(result.to_display(self.interns()))
            }
            Err(err) => {
                // unwind the handler frame by hand; its error escalates to
                // the interpreter's double-fault handling
                self.frames.pop();
                self.set_top(handler_slot);
                match err {
                    RunError::Yield => {
                        RunError::Runtime("attempt to yield across a native call boundary".to_owned())
                    }
                    other => other,
                }
            }
        }
    }
}
