// trap.rs
// Trap dispatch. Adapted from the teacher's m_trap: same "single
// dispatcher keyed on cause, delegate to scheduler/syscall/plic"
// shape, rearchitected from machine mode to supervisor mode per spec
// 4.D/9 -- scause/stval/sepc/sstatus instead of mcause/mtval/mepc/
// mstatus, and a signal-delivery check on every return-to-user path
// instead of the teacher's bare reschedule.

use crate::cpu::{self, TrapFrame};
use crate::{clint, plic, proc, sched, signal, syscall, vm};

#[no_mangle]
/// Entry point reached from the assembly trap vector with interrupts
/// disabled and the MMU still on the interrupted address space. Runs
/// entirely against the trap frame saved in sscratch.
///
/// Returns the address of the TrapFrame the assembly trampoline
/// should install into sscratch and sret into -- the same frame with
/// sepc advanced, for a syscall that doesn't reschedule, or a
/// different process's frame when one is. The trampoline never reads
/// `sepc` out-of-band; every return path writes it into the returned
/// frame before handing back here.
extern "C" fn s_trap(sepc: usize, stval: usize, scause: usize, hart: usize, frame: *mut TrapFrame) -> usize {
    let is_interrupt = scause & cpu::SCAUSE_INTERRUPT_BIT != 0;
    let cause_num = scause & !cpu::SCAUSE_INTERRUPT_BIT;

    if is_interrupt {
        match cause_num {
            1 => frame as usize, // inter-hart IPI: no-op on this single-hart target
            5 => {
                clint::schedule_next_tick();
                resume(sched::schedule_or_keep(frame as usize))
            }
            9 => {
                plic::handle_interrupt();
                frame as usize
            }
            _ => panic!("unhandled interrupt cause {} at hart {}", cause_num, hart),
        }
    } else {
        match cause_num {
            cpu::SCAUSE_ECALL_FROM_U => {
                let frame_ref = unsafe { &mut *frame };
                syscall::do_syscall(frame_ref, sepc);
                resume(frame as usize)
            }
            cpu::SCAUSE_INSTR_PAGE_FAULT | cpu::SCAUSE_LOAD_PAGE_FAULT | cpu::SCAUSE_STORE_PAGE_FAULT => {
                let pid = unsafe { (*frame).pid };
                log::debug!("page fault pid={} pc=0x{:x} addr=0x{:x} cause={}", pid, sepc, stval, cause_num);
                resume(deliver_fault(frame, pid, signal::SIGSEGV))
            }
            2 => {
                let pid = unsafe { (*frame).pid };
                log::debug!("illegal instruction pid={} pc=0x{:x}", pid, sepc);
                resume(deliver_fault(frame, pid, signal::SIGILL))
            }
            _ => panic!("unhandled exception cause {} at hart {} pc=0x{:x} tval=0x{:x}", cause_num, hart, sepc, stval),
        }
    }
}

/// Raises `signo` against the faulting process and resolves it
/// synchronously rather than waiting for its next return-to-user turn
/// (spec 8 S4: a SIGSEGV's default disposition has to actually kill
/// the process, not just mark it pending forever on a process that's
/// never re-enqueued). A user handler leaves the process runnable and
/// its rewritten frame is what gets resumed; the default/fatal path
/// zombifies it, so the caller falls back to scheduling someone else.
fn deliver_fault(frame: *mut TrapFrame, pid: usize, signo: usize) -> usize {
    let _ = signal::raise(signo, pid);
    signal::deliver_pending(frame);
    let alive = proc::with_pcb(pid, |pcb| pcb.state != proc::ProcState::Zombie).unwrap_or(false);
    if alive {
        frame as usize
    } else {
        sched::schedule()
    }
}

/// Runs the signal-delivery check on the frame about to resume to
/// user mode (spec 4.G): a pending, unblocked signal rewrites sepc
/// and the user stack to enter the handler instead of resuming
/// straight-line execution. `next` of 0 means no runnable process
/// (the idle loop); callers must not dereference it.
///
/// Also re-points satp at the resuming process's root. Every process
/// root carries its own copy of the kernel's upper half (vm 9), so
/// this is safe to do before the assembly trampoline restores
/// registers and sret's -- the kernel mappings the trampoline itself
/// runs under stay resident across the switch.
fn resume(next: usize) -> usize {
    if next != 0 {
        signal::deliver_pending(next as *mut TrapFrame);
        let pid = unsafe { (*(next as *const TrapFrame)).pid };
        proc::with_pcb(pid, |pcb| vm::activate(pcb.root));
    }
    next
}
