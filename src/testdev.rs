// testdev.rs
// The QEMU `virt` "sifive_test" finisher device: a single MMIO word
// that, when written, shuts the emulator down and reports a status
// code to the host. Not part of the teacher's pack (it targets real
// boot-to-shell operation, not CI); written fresh since the in-kernel
// test harness (test.rs) needs a way to signal PASS/FAIL and exit
// without a human watching the serial console.

use crate::config::TEST_DEVICE_ADDR;

const FINISHER_FAIL: u32 = 0x3333;
const FINISHER_PASS: u32 = 0x5555;
const FINISHER_RESET: u32 = 0x7777;

fn write(value: u32) -> ! {
    unsafe { (TEST_DEVICE_ADDR as *mut u32).write_volatile(value) };
    loop {
        #[cfg(target_arch = "riscv64")]
        unsafe {
            core::arch::asm!("wfi")
        }
    }
}

/// Exit QEMU reporting success. Never returns.
pub fn exit_success() -> ! {
    write(FINISHER_PASS)
}

/// Exit QEMU reporting failure, encoding `code` in the upper 16 bits
/// the way the sifive_test device's FAIL encoding does.
pub fn exit_failure(code: u16) -> ! {
    write(FINISHER_FAIL | ((code as u32) << 16))
}

pub fn reset() -> ! {
    write(FINISHER_RESET)
}
