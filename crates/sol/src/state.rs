//! Interpreter state: the value stack, the frame chain, and hook state.
//!
//! `Vm` owns everything the debug core inspects: the contiguous value stack,
//! the chain of activation records (a vector; index `i - 1` is the caller of
//! frame `i`, and `frames[0]` is the base sentinel representing the host),
//! the string interner, and the process-wide hook configuration.
//!
//! The dispatch loop itself lives elsewhere; it drives this state through
//! the frame lifecycle primitives here (`push_script_frame`, `pop_frame`)
//! and the tracing entry points in [`crate::trace`]. Exclusive access
//! (`&mut Vm`) is the interpreter lock the host API acquires.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::{
    bytecode::Proto,
    error::{RunResult, VarSite},
    intern::Interns,
    trace::Hook,
    value::{Closure, Value},
};

/// Minimum number of free stack slots guaranteed to a native function or a
/// hook callback.
pub const MIN_STACK: usize = 20;

/// Which flavor of function a frame is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// A script function with a prototype and a saved program counter.
    Script,
    /// A native function.
    Native,
}

/// Per-frame status bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallStatus(u8);

impl CallStatus {
    /// The frame was entered through a tail call; its caller is gone.
    pub const TAIL: Self = Self(1 << 0);
    /// The frame is currently running a hook callback.
    pub const HOOKED: Self = Self(1 << 1);
    /// The frame is running a finalizer.
    pub const FIN: Self = Self(1 << 2);
    /// A hook fired from this frame yielded; consume on resume.
    pub const HOOKYIELD: Self = Self(1 << 3);

    /// True when all bits of `flag` are set.
    #[must_use]
    pub fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub(crate) fn insert(&mut self, flag: Self) {
        self.0 |= flag.0;
    }

    pub(crate) fn remove(&mut self, flag: Self) {
        self.0 &= !flag.0;
    }
}

/// Bitset of hook events the interpreter must report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HookMask(u8);

impl HookMask {
    pub const CALL: Self = Self(1 << 0);
    pub const RET: Self = Self(1 << 1);
    pub const LINE: Self = Self(1 << 2);
    pub const COUNT: Self = Self(1 << 3);

    /// The empty mask.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when all bits of `flag` are set.
    #[must_use]
    pub fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    /// True when any bit of `flag` is set.
    #[must_use]
    pub fn intersects(self, flag: Self) -> bool {
        self.0 & flag.0 != 0
    }
}

impl std::ops::BitOr for HookMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Values transferred into or out of a frame at a call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    /// Offset of the first transferred value, relative to the function slot.
    pub first: u32,
    /// Number of transferred values.
    pub count: u32,
}

/// Interpreter status with respect to coroutine suspension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadStatus {
    #[default]
    Ok,
    /// A hook requested a yield; latched until the host resumes.
    Yield,
}

/// One activation record.
///
/// `savedpc`, `nextraargs`, and `trap` are meaningful for script frames
/// only. `savedpc` is the index of the next instruction to execute, so the
/// currently executing instruction is `savedpc - 1`.
#[derive(Debug)]
pub struct Frame {
    pub(crate) kind: FrameKind,
    /// Stack slot holding the function being executed.
    pub(crate) func_slot: usize,
    /// One past the last stack slot belonging to this frame.
    pub(crate) top_slot: usize,
    pub(crate) savedpc: usize,
    /// Number of extra (vararg) arguments stored below `func_slot`.
    pub(crate) nextraargs: usize,
    /// When set, the dispatch loop consults the hook engine each instruction.
    pub(crate) trap: bool,
    pub(crate) callstatus: CallStatus,
    pub(crate) transfer: Option<Transfer>,
}

impl Frame {
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    #[must_use]
    pub fn is_script(&self) -> bool {
        self.kind == FrameKind::Script
    }

    #[must_use]
    pub fn func_slot(&self) -> usize {
        self.func_slot
    }

    #[must_use]
    pub fn top_slot(&self) -> usize {
        self.top_slot
    }

    #[must_use]
    pub fn savedpc(&self) -> usize {
        self.savedpc
    }

    /// Index of the currently executing instruction.
    ///
    /// Before the first instruction runs this reports 0 rather than an
    /// out-of-band value; parameters are already live there.
    #[must_use]
    pub fn current_pc(&self) -> usize {
        self.savedpc.saturating_sub(1)
    }

    /// Advances the saved program counter. Called by the dispatch loop as it
    /// executes; the debug core reads the result through `current_pc`.
    pub fn set_savedpc(&mut self, savedpc: usize) {
        self.savedpc = savedpc;
    }

    #[must_use]
    pub fn nextraargs(&self) -> usize {
        self.nextraargs
    }

    #[must_use]
    pub fn trap(&self) -> bool {
        self.trap
    }

    #[must_use]
    pub fn callstatus(&self) -> CallStatus {
        self.callstatus
    }

    #[must_use]
    pub fn transfer(&self) -> Option<Transfer> {
        self.transfer
    }

    /// Marks the frame as entered through a tail call. Tail calls opacify
    /// the caller, so name recovery for this frame is disabled.
    pub fn mark_tail_call(&mut self) {
        self.callstatus.insert(CallStatus::TAIL);
    }

    /// Marks the frame as running a finalizer.
    pub fn mark_finalizer(&mut self) {
        self.callstatus.insert(CallStatus::FIN);
    }
}

/// The interpreter state.
pub struct Vm {
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: SmallVec<[Frame; 8]>,
    pub(crate) interns: Interns,
    pub(crate) hook: Option<Hook>,
    /// Set by `set_hook` so an in-flight hook dispatch knows not to
    /// reinstall the callback it took out.
    pub(crate) hook_swapped: bool,
    /// Cleared while a hook runs; hooks cannot hook themselves.
    pub(crate) allowhook: bool,
    pub(crate) hookmask: HookMask,
    pub(crate) basehookcount: i32,
    pub(crate) hookcount: i32,
    /// pc of the last line-hook dispatch, for back-edge detection. May be
    /// stale after returns; readers clamp it to the current code range.
    pub(crate) oldpc: usize,
    pub(crate) status: ThreadStatus,
    /// Stack slot of the installed error-message handler.
    pub(crate) errfunc: Option<usize>,
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("stack", &self.stack.len())
            .field("frames", &self.frames.len())
            .field("hookmask", &self.hookmask)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Creates a fresh state with an empty interner and the base frame.
    #[must_use]
    pub fn new() -> Self {
        Self::from_interns(Interns::new())
    }

    /// Creates a fresh state around an interner populated by the compiler.
    #[must_use]
    pub fn from_interns(interns: Interns) -> Self {
        let mut frames = SmallVec::new();
        frames.push(Frame {
            kind: FrameKind::Native,
            func_slot: 0,
            top_slot: 1 + MIN_STACK,
            savedpc: 0,
            nextraargs: 0,
            trap: false,
            callstatus: CallStatus::default(),
            transfer: None,
        });
        Self {
            stack: vec![Value::Nil],
            frames,
            interns,
            hook: None,
            hook_swapped: false,
            allowhook: true,
            hookmask: HookMask::empty(),
            basehookcount: 0,
            hookcount: 0,
            oldpc: 0,
            status: ThreadStatus::default(),
            errfunc: None,
        }
    }

    #[must_use]
    pub fn interns(&self) -> &Interns {
        &self.interns
    }

    pub fn interns_mut(&mut self) -> &mut Interns {
        &mut self.interns
    }

    #[must_use]
    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    /// Host-side resume: clears a yield latched by a hook. The next
    /// `trace_exec`/`trace_call` continues where the interpreter stopped.
    pub fn resume(&mut self) {
        self.status = ThreadStatus::Ok;
    }

    /// Installs or clears the error-message handler slot. The handler is
    /// invoked by the error constructors before the error unwinds.
    pub fn set_errfunc(&mut self, slot: Option<usize>) {
        self.errfunc = slot;
    }

    #[must_use]
    pub fn errfunc(&self) -> Option<usize> {
        self.errfunc
    }

    // === Stack primitives ===

    #[must_use]
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub fn push_value(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Pops the top of the stack.
    ///
    /// # Panics
    /// Panics if the stack is empty; callers own the push/pop discipline.
    pub fn pop_value(&mut self) -> Value {
        self.stack.pop().expect("pop from empty stack")
    }

    #[must_use]
    pub fn slot(&self, slot: usize) -> &Value {
        &self.stack[slot]
    }

    pub fn set_slot(&mut self, slot: usize, value: Value) {
        self.stack[slot] = value;
    }

    /// Sets the stack top, padding with nils or truncating as needed.
    pub fn set_top(&mut self, top: usize) {
        if top > self.stack.len() {
            self.stack.resize(top, Value::Nil);
        } else {
            self.stack.truncate(top);
        }
    }

    // === Frame chain ===

    /// Number of frames above the base sentinel.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    pub(crate) fn current_ci(&self) -> usize {
        self.frames.len() - 1
    }

    #[must_use]
    pub fn frame(&self, ci: usize) -> &Frame {
        &self.frames[ci]
    }

    pub fn frame_mut(&mut self, ci: usize) -> &mut Frame {
        &mut self.frames[ci]
    }

    #[must_use]
    pub fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame chain is never empty")
    }

    pub fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame chain is never empty")
    }

    /// The closure executing in frame `ci`, if it is a script frame.
    #[must_use]
    pub fn frame_closure(&self, ci: usize) -> Option<Rc<Closure>> {
        match &self.stack[self.frames[ci].func_slot] {
            Value::Closure(c) => Some(c.clone()),
            _ => None,
        }
    }

    /// The prototype executing in frame `ci`, if it is a script frame.
    #[must_use]
    pub fn frame_proto(&self, ci: usize) -> Option<Rc<Proto>> {
        self.frame_closure(ci).map(|c| c.proto.clone())
    }

    /// Activates a call to the closure sitting `nargs` slots below the top.
    ///
    /// Missing fixed parameters are padded with nil. For vararg functions
    /// this performs the prelude relocation: the function and its fixed
    /// parameters are copied above the arguments so the extras end up below
    /// the (new) function slot, and `nextraargs` records how many there are.
    ///
    /// Returns the new frame's index, or a call error if the slot does not
    /// hold a script function.
    pub fn push_script_frame(&mut self, nargs: usize) -> RunResult<usize> {
        let mut func_slot = self.stack.len() - nargs - 1;
        let Some(proto) = (match &self.stack[func_slot] {
            Value::Closure(c) => Some(c.proto.clone()),
            _ => None,
        }) else {
            let func = self.stack[func_slot].clone();
            return Err(self.call_error(&func, VarSite::Slot(func_slot)));
        };
        let mut nargs = nargs;
        while nargs < usize::from(proto.numparams) {
            self.stack.push(Value::Nil);
            nargs += 1;
        }
        let mut nextraargs = 0;
        if proto.is_vararg {
            nextraargs = nargs - usize::from(proto.numparams);
            let actual = nargs;
            let func = self.stack[func_slot].clone();
            self.stack.push(func);
            for i in 1..=usize::from(proto.numparams) {
                let param = std::mem::take(&mut self.stack[func_slot + i]);
                self.stack.push(param);
            }
            func_slot += actual + 1;
        }
        let top_slot = func_slot + 1 + usize::from(proto.maxstacksize);
        self.set_top(top_slot);
        self.frames.push(Frame {
            kind: FrameKind::Script,
            func_slot,
            top_slot,
            savedpc: 0,
            nextraargs,
            trap: !self.hookmask.is_empty(),
            callstatus: CallStatus::default(),
            transfer: None,
        });
        Ok(self.current_ci())
    }

    /// Activates a call to the native function sitting `nargs` slots below
    /// the top. Returns the new frame's index.
    pub fn push_native_frame(&mut self, nargs: usize) -> usize {
        let func_slot = self.stack.len() - nargs - 1;
        self.frames.push(Frame {
            kind: FrameKind::Native,
            func_slot,
            top_slot: self.stack.len() + MIN_STACK,
            savedpc: 0,
            nextraargs: 0,
            trap: false,
            callstatus: CallStatus::default(),
            transfer: None,
        });
        self.current_ci()
    }

    /// Returns from the current frame with the top `nres` stack values as
    /// results: fires the return hook if hooks are armed, relocates the
    /// results to the function slot, and unlinks the frame.
    pub fn pop_frame(&mut self, nres: usize) -> RunResult<()> {
        let ci = self.current_ci();
        assert!(ci > 0, "cannot pop the base frame");
        // the return instruction restores the pre-vararg function slot
        // before the frame unwinds
        if self.frames[ci].is_script() {
            if let Some(proto) = self.frame_proto(ci) {
                if proto.is_vararg {
                    let delta = self.frames[ci].nextraargs + usize::from(proto.numparams) + 1;
                    self.frames[ci].func_slot -= delta;
                }
            }
        }
        let hook_result = if self.hookmask.is_empty() { Ok(()) } else { self.ret_hook(nres) };
        let func_slot = self.frames[ci].func_slot;
        let first = self.stack.len() - nres;
        if func_slot != first {
            for i in 0..nres {
                self.stack[func_slot + i] = std::mem::take(&mut self.stack[first + i]);
            }
        }
        self.stack.truncate(func_slot + nres);
        self.frames.pop();
        hook_result
    }
}
