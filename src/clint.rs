// clint.rs
// Core-Local Interruptor: the mtime/mtimecmp timer QEMU virt exposes.
// Not present in the teacher's pack as a standalone module -- the
// teacher inlines MMIO_MTIMECMP/MMIO_MTIME as two bare pointers at
// the bottom of trap.rs. Pulled out here because S-mode reads mtime
// through a CSR (`time`) rather than MMIO, while mtimecmp itself stays
// memory-mapped, so the two addressing modes no longer belong next to
// each other.

use crate::config::CLINT_ADDR;
use crate::cpu::TIMESLICE_CYCLES;

const MTIMECMP_OFFSET: usize = 0x4000;

fn mtimecmp_ptr(hart: usize) -> *mut u64 {
    (CLINT_ADDR + MTIMECMP_OFFSET + hart * 8) as *mut u64
}

#[cfg(target_arch = "riscv64")]
pub fn read_time() -> u64 {
    let t: u64;
    unsafe { core::arch::asm!("csrr {0}, time", out(reg) t) }
    t
}

#[cfg(not(target_arch = "riscv64"))]
pub fn read_time() -> u64 {
    0
}

/// Arm the next timer interrupt `TIMESLICE_CYCLES` from now on hart 0
/// (this kernel is single-hart per spec Non-goals).
pub fn schedule_next_tick() {
    let next = read_time().wrapping_add(TIMESLICE_CYCLES);
    unsafe { mtimecmp_ptr(0).write_volatile(next) };
}

/// Monotonic (seconds, nanoseconds) since boot, derived from the same
/// `mtime` the scheduler tick already reads (spec 4.E/§2's `gettime`:
/// "monotonic nanoseconds since boot derived from the CLINT mtime
/// register"). `cpu::FREQ` divides `1_000_000_000` evenly on QEMU
/// virt's 10 MHz CLINT, so this stays exact instead of accumulating
/// rounding error tick over tick.
pub fn monotonic_timespec() -> (u64, u64) {
    let ticks = read_time();
    let secs = ticks / crate::cpu::FREQ;
    let nanos_per_tick = 1_000_000_000 / crate::cpu::FREQ;
    let nanos = (ticks % crate::cpu::FREQ) * nanos_per_tick;
    (secs, nanos)
}
