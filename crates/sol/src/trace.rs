//! Execution tracing and user hooks.
//!
//! The dispatch loop reports to this engine at two points: function entry
//! ([`Vm::trace_call`]) and, for frames whose `trap` flag is set, every
//! instruction boundary ([`Vm::trace_exec`]). The engine decides which
//! user-visible events fire (call, return, line, and count hooks) and
//! dispatches them through the installed [`Hook`] callback.
//!
//! Within one instruction boundary at most one count hook and one line
//! hook fire, count first. A hook may request a yield; the request is
//! latched in the frame's `HOOKYIELD` bit and consumed exactly once when
//! the interpreter resumes, so the hook does not fire again for the
//! instruction it interrupted.

use crate::{
    debug::{DebugInfo, changed_line, get_func_line},
    error::{RunError, RunResult},
    state::{CallStatus, FrameKind, HookMask, MIN_STACK, ThreadStatus, Vm},
};

/// The kind of event a hook is invoked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEventCode {
    Call,
    Ret,
    Line,
    Count,
    TailCall,
}

/// What a hook callback asks the interpreter to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookControl {
    Continue,
    /// Suspend the coroutine; the interpreter unwinds with
    /// [`RunError::Yield`] and re-enters at the interrupted instruction.
    Yield,
}

/// Event data passed to a hook callback.
#[derive(Debug, Clone, Copy)]
pub struct HookEvent {
    pub code: HookEventCode,
    /// New line for line events, -1 otherwise.
    pub currentline: i32,
    /// Frame the event occurred in.
    pub frame: usize,
    /// First transferred value (relative to the function slot) for call
    /// and return events.
    pub ftransfer: u32,
    /// Number of transferred values.
    pub ntransfer: u32,
}

impl HookEvent {
    /// A [`DebugInfo`] handle for the event's frame, ready for
    /// [`Vm::get_info`].
    #[must_use]
    pub fn frame_info(&self) -> DebugInfo {
        DebugInfo { i_ci: Some(self.frame), ..DebugInfo::default() }
    }
}

/// A user-installed hook callback.
///
/// The callback receives the interpreter state and may use the full debug
/// API, including installing a different hook. Hooks do not nest: while a
/// hook runs, further hook dispatch is disabled.
pub type Hook = Box<dyn FnMut(&mut Vm, &HookEvent) -> RunResult<HookControl>>;

impl Vm {
    /// Installs `func` as the hook, called for the events in `mask`;
    /// `count` is the instruction period of count hooks. Passing no
    /// function or an empty mask turns hooks off. Every live script frame
    /// is re-armed so the dispatch loop starts consulting the engine.
    pub fn set_hook(&mut self, func: Option<Hook>, mask: HookMask, count: i32) {
        let (func, mask) = if func.is_none() || mask.is_empty() {
            (None, HookMask::empty())
        } else {
            (func, mask)
        };
        self.hook = func;
        self.hook_swapped = true;
        self.basehookcount = count;
        self.hookcount = self.basehookcount;
        self.hookmask = mask;
        if !mask.is_empty() {
            self.set_traps();
        }
    }

    /// The installed hook callback, if any.
    #[must_use]
    pub fn get_hook(&self) -> Option<&Hook> {
        self.hook.as_ref()
    }

    #[must_use]
    pub fn get_hook_mask(&self) -> HookMask {
        self.hookmask
    }

    /// The configured count-hook period.
    #[must_use]
    pub fn get_hook_count(&self) -> i32 {
        self.basehookcount
    }

    /// Arms the trap flag on every script frame in the chain.
    fn set_traps(&mut self) {
        for frame in &mut self.frames {
            if frame.kind == FrameKind::Script {
                frame.trap = true;
            }
        }
    }

    /// Dispatches one hook event through the installed callback.
    ///
    /// Preserves the stack top and the frame's top slot around the call,
    /// marks the frame `HOOKED` (so functions the hook calls can be named
    /// as such), publishes transfer info, and guarantees the callback
    /// [`MIN_STACK`] free slots. A yield request is recorded in the
    /// interpreter status for the caller to act on.
    pub(crate) fn call_hook(
        &mut self,
        code: HookEventCode,
        line: i32,
        ftransfer: u32,
        ntransfer: u32,
    ) -> RunResult<()> {
        if !self.allowhook {
            return Ok(());
        }
        let Some(mut hook) = self.hook.take() else {
            return Ok(());
        };
        let ci = self.current_ci();
        let saved_top = self.stack_len();
        let saved_ci_top = self.frame(ci).top_slot();
        let saved_transfer = self.frame(ci).transfer();
        if ntransfer != 0 {
            self.frames[ci].transfer = Some(crate::state::Transfer { first: ftransfer, count: ntransfer });
        }
        if self.frames[ci].is_script() && self.stack_len() < self.frames[ci].top_slot {
            let frame_top = self.frames[ci].top_slot;
            self.set_top(frame_top);
        }
        if self.frames[ci].top_slot < self.stack_len() + MIN_STACK {
            self.frames[ci].top_slot = self.stack_len() + MIN_STACK;
        }
        self.allowhook = false;
        self.frames[ci].callstatus.insert(CallStatus::HOOKED);
        let event = HookEvent { code, currentline: line, frame: ci, ftransfer, ntransfer };
        self.hook_swapped = false;
        let result = hook(self, &event);
        if !self.hook_swapped {
            self.hook = Some(hook);
        }
        self.allowhook = true;
        self.frames[ci].callstatus.remove(CallStatus::HOOKED);
        self.frames[ci].top_slot = saved_ci_top;
        self.frames[ci].transfer = saved_transfer;
        self.set_top(saved_top);
        match result? {
            HookControl::Continue => {}
            HookControl::Yield => self.status = ThreadStatus::Yield,
        }
        Ok(())
    }

    /// Fires the call (or tail-call) hook for the current script frame and
    /// resets the line-tracking pc for the new function.
    ///
    /// The saved pc is bumped over the first instruction for the duration
    /// of the hook, matching what the hook observes at any later
    /// instruction boundary.
    pub fn hook_call(&mut self) -> RunResult<()> {
        self.oldpc = 0;
        if self.hookmask.contains(HookMask::CALL) {
            let ci = self.current_ci();
            let code = if self.frame(ci).callstatus().contains(CallStatus::TAIL) {
                HookEventCode::TailCall
            } else {
                HookEventCode::Call
            };
            let nparams =
                u32::from(self.frame_proto(ci).expect("call hook fires on script frames").numparams);
            self.frames[ci].savedpc += 1;
            let result = self.call_hook(code, -1, 1, nparams);
            self.frames[ci].savedpc -= 1;
            result?;
        }
        Ok(())
    }

    /// Fires the return hook for the current frame and rebases the
    /// line-tracking pc onto the caller. Called while the frame is still
    /// linked, with the `nres` results on top of the stack.
    pub(crate) fn ret_hook(&mut self, nres: usize) -> RunResult<()> {
        if self.hookmask.contains(HookMask::RET) {
            let ci = self.current_ci();
            let firstres = self.stack_len() - nres;
            let mut delta = 0;
            if self.frames[ci].is_script() {
                let proto = self.frame_proto(ci).expect("script frame has a prototype");
                if proto.is_vararg {
                    delta = self.frames[ci].nextraargs + usize::from(proto.numparams) + 1;
                }
            }
            // report transfers relative to the virtual function slot the
            // frame actually ran with
            self.frames[ci].func_slot += delta;
            let ftransfer = u32::try_from(firstres - self.frames[ci].func_slot).expect("results above func");
            let result = self.call_hook(
                HookEventCode::Ret,
                -1,
                ftransfer,
                u32::try_from(nres).expect("result count fits u32"),
            );
            self.frames[ci].func_slot -= delta;
            result?;
        }
        if self.frames.len() >= 2 {
            let caller = &self.frames[self.frames.len() - 2];
            if caller.is_script() {
                self.oldpc = caller.current_pc();
            }
        }
        Ok(())
    }

    /// Function-entry tracing. Arms the frame's trap flag and, when the
    /// frame sits at its first instruction, fires the call hook. Vararg
    /// functions are skipped here: their prelude instruction fires the hook
    /// instead (via [`Vm::hook_call`] from the dispatch loop). Frames
    /// resuming from a hook-induced yield are also skipped.
    ///
    /// Returns false when hook dispatch is deferred to the prelude.
    pub fn trace_call(&mut self) -> RunResult<bool> {
        let ci = self.current_ci();
        let proto = self.frame_proto(ci).expect("trace_call on a script frame");
        self.frames[ci].trap = true;
        if self.frames[ci].savedpc == 0 {
            if proto.is_vararg {
                return Ok(false);
            } else if !self.frames[ci].callstatus().contains(CallStatus::HOOKYIELD) {
                self.hook_call()?;
                if self.status == ThreadStatus::Yield {
                    self.frames[ci].callstatus.insert(CallStatus::HOOKYIELD);
                    return Err(RunError::Yield);
                }
            }
        }
        Ok(true)
    }

    /// Instruction-boundary tracing for the current frame, called with the
    /// pc about to execute.
    ///
    /// Returns whether the trap flag must stay on. Count hooks fire when
    /// the live countdown reaches zero; line hooks fire on line changes and
    /// on backward jumps. A yield requested by either hook restores the pc,
    /// latches `HOOKYIELD`, and unwinds with [`RunError::Yield`].
    pub fn trace_exec(&mut self, pc: usize) -> RunResult<bool> {
        let ci = self.current_ci();
        let mask = self.hookmask;
        let proto = self.frame_proto(ci).expect("trace_exec on a script frame");
        if !mask.intersects(HookMask::LINE | HookMask::COUNT) {
            self.frames[ci].trap = false;
            return Ok(false);
        }
        self.frames[ci].savedpc = pc + 1;
        let mut counthook = false;
        if mask.contains(HookMask::COUNT) {
            self.hookcount -= 1;
            if self.hookcount == 0 {
                self.hookcount = self.basehookcount;
                counthook = true;
            }
        }
        if !counthook && !mask.contains(HookMask::LINE) {
            return Ok(true); // no line hook and count not reached
        }
        if self.frames[ci].callstatus().contains(CallStatus::HOOKYIELD) {
            // hook yielded at this instruction last time; don't repeat it
            self.frames[ci].callstatus.remove(CallStatus::HOOKYIELD);
            return Ok(true);
        }
        if !proto.code[pc].reads_top() {
            let frame_top = self.frames[ci].top_slot;
            self.set_top(frame_top);
        }
        if counthook {
            self.call_hook(HookEventCode::Count, -1, 0, 0)?;
        }
        if mask.contains(HookMask::LINE) {
            // oldpc may be stale after returns; use zero in that case
            let oldpc = if self.oldpc < proto.code.len() { self.oldpc } else { 0 };
            if pc <= oldpc || changed_line(&proto, oldpc, pc) {
                let newline = get_func_line(&proto, pc);
                self.call_hook(HookEventCode::Line, newline, 0, 0)?;
            }
            self.oldpc = pc;
        }
        if self.status == ThreadStatus::Yield {
            if counthook {
                self.hookcount = 1; // undo the decrement to zero
            }
            self.frames[ci].savedpc = pc; // resume will advance it again
            self.frames[ci].callstatus.insert(CallStatus::HOOKYIELD);
            return Err(RunError::Yield);
        }
        Ok(true)
    }
}
