//! Line-info decoding.
//!
//! Maps a program counter to a source line using the compressed table in
//! the prototype: a stream of signed per-instruction deltas punctuated by
//! absolute `(pc, line)` anchors. See [`crate::bytecode::Proto`] for the
//! format invariants.

use crate::bytecode::{ABSLINEINFO, MAXIWTHABS, Proto};

/// Finds the anchor governing `pc`: its pc (or -1 for the function start)
/// and its line.
fn get_base_line(p: &Proto, pc: usize) -> (isize, i32) {
    if p.abslineinfo.is_empty() || pc < p.abslineinfo[0].pc {
        (-1, p.linedefined)
    } else {
        // pc / MAXIWTHABS - 1 is a lower bound for the correct anchor;
        // advance linearly from there
        let mut i = (pc / MAXIWTHABS).saturating_sub(1).min(p.abslineinfo.len() - 1);
        while i + 1 < p.abslineinfo.len() && p.abslineinfo[i + 1].pc <= pc {
            i += 1;
        }
        (isize::try_from(p.abslineinfo[i].pc).expect("pc fits isize"), p.abslineinfo[i].line)
    }
}

/// Returns the source line of the instruction at `pc`, or -1 when the
/// prototype carries no line information.
#[must_use]
pub fn get_func_line(p: &Proto, pc: usize) -> i32 {
    let Some(lineinfo) = &p.lineinfo else {
        return -1;
    };
    let (mut basepc, mut baseline) = get_base_line(p, pc);
    let pc = isize::try_from(pc).expect("pc fits isize");
    while basepc < pc {
        basepc += 1;
        let delta = lineinfo[usize::try_from(basepc).expect("non-negative")];
        debug_assert!(delta != ABSLINEINFO, "anchor estimate must not walk over a sentinel");
        baseline += i32::from(delta);
    }
    baseline
}

/// Whether the line changed between two pcs of the same function, with
/// `oldpc < newpc`.
///
/// Fast path for the trace engine: when the pcs are close and no absolute
/// anchor lies in the walked range, the deltas are summed directly.
/// Otherwise the answer comes from two absolute queries.
#[must_use]
pub fn changed_line(p: &Proto, oldpc: usize, newpc: usize) -> bool {
    debug_assert!(oldpc < newpc);
    let Some(lineinfo) = &p.lineinfo else {
        return false;
    };
    if newpc - oldpc < MAXIWTHABS / 2 {
        let mut delta = 0i32;
        let mut pc = oldpc;
        loop {
            pc += 1;
            let entry = lineinfo[pc];
            if entry == ABSLINEINFO {
                break;
            }
            delta += i32::from(entry);
            if pc == newpc {
                return delta != 0;
            }
        }
    }
    get_func_line(p, oldpc) != get_func_line(p, newpc)
}

/// The line of instruction `pc`, given the line of the previous
/// instruction. Cheap when the delta is inline; falls back to an absolute
/// query on the anchor sentinel.
pub(crate) fn next_line(p: &Proto, currentline: i32, pc: usize) -> i32 {
    let lineinfo = p.lineinfo.as_ref().expect("caller checked for line info");
    if lineinfo[pc] == ABSLINEINFO {
        get_func_line(p, pc)
    } else {
        currentline + i32::from(lineinfo[pc])
    }
}
