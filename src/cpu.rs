// cpu.rs
// CPU register access and the trap frame layout. Adapted from the
// teacher's cpu.rs: same Registers enum and TrapFrame-in-sscratch
// design, but rebuilt for S-mode (sscratch/sepc/sstatus, not
// mscratch/mepc/mstatus) and stable core::arch::asm! rather than the
// removed llvm_asm! macro.

pub const FREQ: u64 = 10_000_000;
pub const TIMESLICE_CYCLES: u64 = FREQ / 100;

#[repr(usize)]
#[allow(dead_code)]
pub enum Registers {
    Zero = 0,
    Ra,
    Sp,
    Gp,
    Tp,
    T0,
    T1,
    T2,
    S0,
    S1,
    A0, /* 10 */
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
    A7,
    S2,
    S3,
    S4, /* 20 */
    S5,
    S6,
    S7,
    S8,
    S9,
    S10,
    S11,
    T3,
    T4,
    T5, /* 30 */
    T6,
}

/// The trap frame lives in sscratch while a hart runs user code and
/// holds every general-purpose register plus the pieces of
/// supervisor-mode state needed to resume the interrupted context
/// (spec 4.D). 31 GPRs (x1-x31; x0 is hardwired zero and never
/// saved) + sepc + sstatus + pid = 34 usize words = 272 bytes, the
/// exact size spec 8.2 pins down. The assembly trap vector addresses
/// every field below by its byte offset (asm.rs), so reordering these
/// without updating that offset table is a silent miscompile.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct TrapFrame {
    pub regs: [usize; 31], // x1 (ra) .. x31 (t6), index 0 == x1
    pub sepc: usize,
    pub sstatus: usize,
    pub pid: usize,
}

const _: () = assert!(core::mem::size_of::<TrapFrame>() == 272);

impl TrapFrame {
    pub const fn zero() -> Self {
        TrapFrame { regs: [0; 31], sepc: 0, sstatus: 0, pid: 0 }
    }

    pub fn reg(&self, r: Registers) -> usize {
        let idx = r as usize;
        if idx == 0 { 0 } else { self.regs[idx - 1] }
    }

    pub fn set_reg(&mut self, r: Registers, val: usize) {
        let idx = r as usize;
        if idx != 0 {
            self.regs[idx - 1] = val;
        }
    }
}

#[cfg(target_arch = "riscv64")]
pub mod csr {
    pub fn sscratch_write(val: usize) {
        unsafe { core::arch::asm!("csrw sscratch, {0}", in(reg) val) }
    }

    pub fn sscratch_read() -> usize {
        let rval: usize;
        unsafe { core::arch::asm!("csrr {0}, sscratch", out(reg) rval) }
        rval
    }

    pub fn sscratch_swap(to: usize) -> usize {
        let from: usize;
        unsafe { core::arch::asm!("csrrw {0}, sscratch, {1}", out(reg) from, in(reg) to) }
        from
    }

    pub fn sepc_write(val: usize) {
        unsafe { core::arch::asm!("csrw sepc, {0}", in(reg) val) }
    }

    pub fn sepc_read() -> usize {
        let rval: usize;
        unsafe { core::arch::asm!("csrr {0}, sepc", out(reg) rval) }
        rval
    }

    pub fn stvec_write(val: usize) {
        unsafe { core::arch::asm!("csrw stvec, {0}", in(reg) val) }
    }

    pub fn sstatus_read() -> usize {
        let rval: usize;
        unsafe { core::arch::asm!("csrr {0}, sstatus", out(reg) rval) }
        rval
    }

    pub fn sstatus_write(val: usize) {
        unsafe { core::arch::asm!("csrw sstatus, {0}", in(reg) val) }
    }

    pub fn sie_write(val: usize) {
        unsafe { core::arch::asm!("csrw sie, {0}", in(reg) val) }
    }
}

#[cfg(not(target_arch = "riscv64"))]
pub mod csr {
    pub fn sscratch_write(_val: usize) {}
    pub fn sscratch_read() -> usize {
        0
    }
    pub fn sscratch_swap(_to: usize) -> usize {
        0
    }
    pub fn sepc_write(_val: usize) {}
    pub fn sepc_read() -> usize {
        0
    }
    pub fn stvec_write(_val: usize) {}
    pub fn sstatus_read() -> usize {
        0
    }
    pub fn sstatus_write(_val: usize) {}
    pub fn sie_write(_val: usize) {}
}

/// sstatus bit positions this kernel cares about (spec 4.D).
pub const SSTATUS_SPP: usize = 1 << 8; // previous privilege: 1 = S, 0 = U
pub const SSTATUS_SPIE: usize = 1 << 5; // interrupt-enable to restore on sret
pub const SSTATUS_SIE: usize = 1 << 1;

/// sie/sip bit positions.
pub const SIE_SSIE: usize = 1 << 1; // software interrupt (IPI)
pub const SIE_STIE: usize = 1 << 5; // timer interrupt
pub const SIE_SEIE: usize = 1 << 9; // external interrupt (PLIC)

/// scause values this kernel dispatches on (spec 4.D).
pub const SCAUSE_INTERRUPT_BIT: usize = 1 << 63;
pub const SCAUSE_ECALL_FROM_U: usize = 8;
pub const SCAUSE_ECALL_FROM_S: usize = 9;
pub const SCAUSE_INSTR_PAGE_FAULT: usize = 12;
pub const SCAUSE_LOAD_PAGE_FAULT: usize = 13;
pub const SCAUSE_STORE_PAGE_FAULT: usize = 15;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reg_zero_is_always_zero() {
        let mut tf = TrapFrame::zero();
        tf.set_reg(Registers::Zero, 0xdead);
        assert_eq!(tf.reg(Registers::Zero), 0);
    }

    #[test]
    fn reg_a0_round_trips_through_regs_array() {
        let mut tf = TrapFrame::zero();
        tf.set_reg(Registers::A0, 42);
        assert_eq!(tf.reg(Registers::A0), 42);
        assert_eq!(tf.regs[Registers::A0 as usize - 1], 42);
    }

    #[test]
    fn trap_frame_is_272_bytes() {
        assert_eq!(core::mem::size_of::<TrapFrame>(), 272);
    }
}
