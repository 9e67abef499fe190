// signal.rs
// Per-process pending/blocked signal sets and trap-return delivery.
// Entirely new relative to the teacher (sgmarz-osblog never grew a
// signal subsystem); grounded on the trap-return hook the teacher's
// m_trap calls into for rescheduling (trap.rs), generalized into a
// second hook that runs on the same return-to-user path, and on the
// xv6-family sigframe/sigreturn idiom for how handler entry rewrites
// a saved trap frame.

use crate::cpu::TrapFrame;
use crate::proc;

pub const NSIG: usize = crate::config::NSIG;

pub const SIGHUP: usize = 1;
pub const SIGINT: usize = 2;
pub const SIGQUIT: usize = 3;
pub const SIGILL: usize = 4;
pub const SIGTRAP: usize = 5;
pub const SIGABRT: usize = 6;
pub const SIGFPE: usize = 8;
pub const SIGKILL: usize = 9;
pub const SIGSEGV: usize = 11;
pub const SIGPIPE: usize = 13;
pub const SIGALRM: usize = 14;
pub const SIGTERM: usize = 15;
pub const SIGCHLD: usize = 17;
pub const SIGCONT: usize = 18;
pub const SIGSTOP: usize = 19;

fn is_unblockable(signo: usize) -> bool {
    signo == SIGKILL || signo == SIGSTOP
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Disposition {
    Default,
    Ignore,
    User { entry: usize, mask: u64, flags: usize },
}

/// Saved on the user stack across a handler invocation so `sigreturn`
/// can restore exactly the state the signal interrupted (spec 4.G).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SigFrame {
    pub saved: TrapFrame,
    pub saved_blocked: u64,
    pub trampoline_return: usize,
}

pub struct SignalState {
    pending: u64,
    blocked: u64,
    handlers: [Disposition; NSIG],
}

impl SignalState {
    pub const fn new() -> Self {
        SignalState { pending: 0, blocked: 0, handlers: [Disposition::Default; NSIG] }
    }

    fn bit(signo: usize) -> u64 {
        1u64 << (signo - 1)
    }

    pub fn set_pending(&mut self, signo: usize) {
        self.pending |= Self::bit(signo);
    }

    pub fn clear_pending(&mut self, signo: usize) {
        self.pending &= !Self::bit(signo);
    }

    pub fn is_pending(&self, signo: usize) -> bool {
        self.pending & Self::bit(signo) != 0
    }

    pub fn set_handler(&mut self, signo: usize, disp: Disposition) -> Result<(), crate::errno::Errno> {
        if signo == 0 || signo > NSIG {
            return Err(crate::errno::Errno::Einval);
        }
        if is_unblockable(signo) {
            return Err(crate::errno::Errno::Einval);
        }
        self.handlers[signo - 1] = disp;
        Ok(())
    }

    pub fn handler(&self, signo: usize) -> Disposition {
        self.handlers[signo - 1]
    }

    pub fn block_mask(&mut self, mask: u64) {
        self.blocked |= mask;
    }

    pub fn set_blocked(&mut self, mask: u64) {
        self.blocked = mask;
    }

    pub fn blocked(&self) -> u64 {
        self.blocked
    }

    /// Lowest-numbered signal that is pending and not blocked, or
    /// None. SIGKILL/SIGSTOP ignore the blocked mask entirely.
    fn next_deliverable(&self) -> Option<usize> {
        let deliverable = self.pending & !self.blocked;
        let unblockable_pending = self.pending & (Self::bit(SIGKILL) | Self::bit(SIGSTOP));
        let candidates = deliverable | unblockable_pending;
        if candidates == 0 {
            return None;
        }
        Some(candidates.trailing_zeros() as usize + 1)
    }

    /// Resets every USER disposition back to DEFAULT, as execve
    /// requires (spec 4.E); IGNORE dispositions survive.
    pub fn reset_on_exec(&mut self) {
        for h in self.handlers.iter_mut() {
            if let Disposition::User { .. } = h {
                *h = Disposition::Default;
            }
        }
    }

    pub fn clear_pending_all(&mut self) {
        self.pending = 0;
    }
}

pub fn raise(signo: usize, pid: usize) -> Result<(), crate::errno::Errno> {
    if signo == 0 || signo > NSIG {
        return Err(crate::errno::Errno::Einval);
    }
    proc::with_pcb(pid, |pcb| {
        let disp = pcb.sig.handler(signo);
        if !is_unblockable(signo) && disp == Disposition::Ignore {
            return;
        }
        pcb.sig.set_pending(signo);
    })
    .ok_or(crate::errno::Errno::Einval)
}

const SIGFRAME_SIZE: usize = core::mem::size_of::<SigFrame>();

/// Runs on every return-to-user path (spec 4.G): if the about-to-run
/// process has a deliverable signal, either perform its default
/// action or rewrite `frame` to enter the user handler.
pub fn deliver_pending(frame: *mut TrapFrame) {
    let pid = unsafe { (*frame).pid };
    proc::with_pcb(pid, |pcb| {
        let signo = match pcb.sig.next_deliverable() {
            Some(s) => s,
            None => return,
        };
        let disp = pcb.sig.handler(signo);
        match disp {
            _ if is_unblockable(signo) => {
                pcb.sig.clear_pending(signo);
                proc::terminate_by_signal(pcb, signo);
            }
            Disposition::Ignore => {
                pcb.sig.clear_pending(signo);
            }
            Disposition::Default => {
                pcb.sig.clear_pending(signo);
                if signo == SIGCHLD || signo == SIGCONT {
                    // default action is "ignore" for these two
                    return;
                }
                proc::terminate_by_signal(pcb, signo);
            }
            Disposition::User { entry, mask, flags: _ } => {
                inject_handler(pcb, frame, signo, entry, mask);
            }
        }
    });
}

fn inject_handler(pcb: &mut proc::Pcb, frame: *mut TrapFrame, signo: usize, entry: usize, mask: u64) {
    use crate::cpu::Registers;
    let tf = unsafe { &mut *frame };
    let new_sp = tf.reg(Registers::Sp).wrapping_sub(SIGFRAME_SIZE) & !0xf;
    let sigframe = SigFrame {
        saved: *tf,
        saved_blocked: pcb.sig.blocked(),
        trampoline_return: pcb.sigreturn_trampoline,
    };
    if crate::vm::translate(unsafe { &*pcb.root }, new_sp).is_err() {
        // No mapped stack room for the sigframe: treat as SIGSEGV
        // rather than corrupting unmapped memory.
        pcb.sig.clear_pending(signo);
        proc::terminate_by_signal(pcb, SIGSEGV);
        return;
    }
    unsafe {
        core::ptr::write(new_sp as *mut SigFrame, sigframe);
    }
    tf.set_reg(Registers::Sp, new_sp);
    tf.set_reg(Registers::A0, signo);
    tf.set_reg(Registers::Ra, pcb.sigreturn_trampoline);
    tf.sepc = entry;
    pcb.sig.clear_pending(signo);
    pcb.sig.block_mask(mask | (1u64 << (signo - 1)));
}

/// sigreturn(2): pulls the SigFrame back off the user stack the
/// handler is currently running on and restores the interrupted
/// trap frame and blocked mask verbatim.
pub fn sigreturn(pid: usize, frame: *mut TrapFrame) -> Result<usize, crate::errno::Errno> {
    use crate::cpu::Registers;
    let tf = unsafe { &mut *frame };
    let sp = tf.reg(Registers::Sp);
    let sigframe = unsafe { core::ptr::read(sp as *const SigFrame) };
    proc::with_pcb(pid, |pcb| {
        pcb.sig.set_blocked(sigframe.saved_blocked);
    });
    *tf = sigframe.saved;
    Ok(tf.reg(Registers::A0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_numbered_pending_signal_wins() {
        let mut s = SignalState::new();
        s.set_pending(5);
        s.set_pending(2);
        s.set_pending(9);
        assert_eq!(s.next_deliverable(), Some(2));
    }

    #[test]
    fn blocked_signal_is_not_deliverable() {
        let mut s = SignalState::new();
        s.set_pending(2);
        s.block_mask(1 << 1); // block signal 2
        assert_eq!(s.next_deliverable(), None);
    }

    #[test]
    fn sigkill_ignores_blocked_mask() {
        let mut s = SignalState::new();
        s.set_pending(SIGKILL);
        s.set_blocked(u64::MAX);
        assert_eq!(s.next_deliverable(), Some(SIGKILL));
    }

    #[test]
    fn set_handler_rejects_sigkill_and_sigstop() {
        let mut s = SignalState::new();
        assert!(s.set_handler(SIGKILL, Disposition::Ignore).is_err());
        assert!(s.set_handler(SIGSTOP, Disposition::Ignore).is_err());
    }

    #[test]
    fn reset_on_exec_clears_user_handlers_but_not_ignore() {
        let mut s = SignalState::new();
        s.set_handler(SIGINT, Disposition::User { entry: 0x1000, mask: 0, flags: 0 }).unwrap();
        s.set_handler(SIGPIPE, Disposition::Ignore).unwrap();
        s.reset_on_exec();
        assert_eq!(s.handler(SIGINT), Disposition::Default);
        assert_eq!(s.handler(SIGPIPE), Disposition::Ignore);
    }
}
