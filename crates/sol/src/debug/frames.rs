//! Frame walking and local-variable access.
//!
//! Host-facing entry points for enumerating activation records and reading
//! or writing the variables of a live frame. Slots without a symbolic name
//! still resolve inside the frame's active window, reported with the
//! generic `"(temporary)"` / `"(C temporary)"` placeholders.

use std::borrow::Cow;

use crate::{
    state::Vm,
    value::Value,
};

use super::DebugInfo;

impl Vm {
    /// Returns a handle for the frame `level` calls below the current one
    /// (level 0), or `None` when the chain is exhausted. The base sentinel
    /// is never returned.
    #[must_use]
    pub fn get_stack(&self, level: usize) -> Option<DebugInfo> {
        if level >= self.depth() {
            return None;
        }
        Some(DebugInfo { i_ci: Some(self.current_ci() - level), ..DebugInfo::default() })
    }

    /// Resolves vararg `n` (negative) of a vararg frame to its slot below
    /// the function.
    fn find_vararg(&self, ci: usize, n: i64) -> Option<(Cow<'static, str>, usize)> {
        let proto = self.frame_proto(ci)?;
        if !proto.is_vararg {
            return None;
        }
        let frame = self.frame(ci);
        let nextra = i64::try_from(frame.nextraargs()).expect("nextraargs fits i64");
        if n >= -nextra {
            let pos = i64::try_from(frame.func_slot()).expect("slot fits i64") - nextra - (n + 1);
            Some((Cow::Borrowed("(vararg)"), usize::try_from(pos).expect("vararg slot is on the stack")))
        } else {
            None
        }
    }

    /// Resolves local `n` of frame `ci` to a name and an absolute stack
    /// slot. Positive `n` counts locals; negative `n` counts varargs.
    #[must_use]
    pub fn find_local(&self, ci: usize, n: i32) -> Option<(Cow<'static, str>, usize)> {
        let frame = self.frame(ci);
        let base = frame.func_slot() + 1;
        let mut name: Option<Cow<'static, str>> = None;
        if frame.is_script() {
            if n < 0 {
                return self.find_vararg(ci, i64::from(n));
            }
            let proto = self.frame_proto(ci)?;
            if let Some(id) = proto.local_name(u32::try_from(n).expect("checked non-negative"), frame.current_pc())
            {
                name = Some(Cow::Owned(self.interns().get(id).to_owned()));
            }
        }
        if name.is_none() {
            // no symbolic name, but any slot in the frame's active region
            // is still addressable
            let limit = if ci == self.current_ci() { self.stack_len() } else { self.frame(ci + 1).func_slot() };
            let in_frame = n > 0
                && i64::try_from(limit).expect("fits i64") - i64::try_from(base).expect("fits i64")
                    >= i64::from(n);
            if !in_frame {
                return None;
            }
            name = Some(if frame.is_script() {
                Cow::Borrowed("(temporary)")
            } else {
                Cow::Borrowed("(C temporary)")
            });
        }
        let n = usize::try_from(n).expect("positive here");
        Some((name.expect("resolved above"), base + n - 1))
    }

    /// Reads local `n` of the frame behind `ar`, pushing its value and
    /// returning its name.
    ///
    /// With `ar == None` the value at the stack top is inspected instead:
    /// for a script function this names parameter `n` (the variables live
    /// at the function start) and pushes nothing.
    pub fn get_local(&mut self, ar: Option<&DebugInfo>, n: i32) -> Option<Cow<'static, str>> {
        match ar {
            None => {
                let Value::Closure(closure) = self.slot(self.stack_len() - 1) else {
                    return None;
                };
                let id = closure.proto.local_name(u32::try_from(n).ok()?, 0)?;
                Some(Cow::Owned(self.interns().get(id).to_owned()))
            }
            Some(ar) => {
                let ci = ar.i_ci?;
                let (name, pos) = self.find_local(ci, n)?;
                let value = self.slot(pos).clone();
                self.push_value(value);
                Some(name)
            }
        }
    }

    /// Writes the value at the stack top into local `n` of the frame behind
    /// `ar`, returning its name. The value is popped only on success.
    pub fn set_local(&mut self, ar: &DebugInfo, n: i32) -> Option<Cow<'static, str>> {
        let ci = ar.i_ci?;
        let (name, pos) = self.find_local(ci, n)?;
        let value = self.pop_value();
        self.set_slot(pos, value);
        Some(name)
    }
}
