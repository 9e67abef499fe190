// test.rs
// In-kernel integration harness for spec 8's numbered scenarios. The
// teacher's test.rs gets away with a plain `extern "C" fn make_syscall`
// called straight from kernel-privileged code -- its process model
// never actually separates U-mode from S-mode, so a "test process" is
// just another kernel function. This kernel's Sv39 split is real, so
// the only way to exercise a scenario end to end (a null-pointer
// dereference actually raising a page fault in U-mode, a real SRET/
// ECALL round trip) is to hand-assemble a handful of instructions,
// map them into a freshly spawned process's own address space
// (proc::spawn_raw), and let the normal scheduler/trap path run them.
//
// The encoder itself lives in rvasm.rs (shared with proc::init's own
// built-in init program); this module only arranges those words into
// the three scenario programs below. Actually spawning and running a
// program only makes sense once real traps exist, so `run_self_tests`
// is riscv64-only and wired to `kinit` behind the `qemu-selftest`
// feature rather than running on every boot.

use crate::rvasm::{addi, auipc, beq, ecall, jal, ld, li, reg, words_to_bytes, LOAD};
use crate::syscall::{SYS_EXIT, SYS_FORK, SYS_WAIT4, SYS_WRITE};
use alloc::vec::Vec;

/// Scenario S1: writes `msg` to fd 1, then exits 0. `a1` is computed
/// with auipc+addi rather than a fixed load address since the whole
/// blob -- code and string both -- gets mapped as a single page
/// wherever `proc::spawn_raw` puts it.
pub fn hello_world_program(msg: &[u8]) -> Vec<u8> {
    let data_off: i32 = 10 * 4; // byte distance from the auipc at word 0 to word 10
    let words = [
        auipc(reg::A1, 0),
        addi(reg::A1, reg::A1, data_off),
        li(reg::A0, 1),
        li(reg::A2, msg.len() as i32),
        li(reg::A7, SYS_WRITE as i32),
        ecall(),
        li(reg::A7, SYS_EXIT as i32),
        li(reg::A0, 0),
        ecall(),
        jal(0, 0), // unreachable self-loop, defensive
    ];
    let mut bytes = words_to_bytes(&words);
    bytes.extend_from_slice(msg);
    bytes
}

/// Scenario S2: fork(), child exits 42, parent wait4()s for any child
/// and exits 0. Exercises a real fork + the trap-return path handing
/// two distinct trap frames back and forth through the scheduler.
pub fn fork_exit_program() -> Vec<u8> {
    let words = [
        /* 0 */ li(reg::A7, SYS_FORK as i32),
        /* 1 */ ecall(),
        /* 2 */ beq(reg::A0, reg::ZERO, 10 * 4), // to child at word 12
        /* 3 */ li(reg::A0, -1),
        /* 4 */ addi(reg::A1, reg::ZERO, 0),
        /* 5 */ addi(reg::A2, reg::ZERO, 0),
        /* 6 */ li(reg::A7, SYS_WAIT4 as i32),
        /* 7 */ ecall(),
        /* 8 */ li(reg::A7, SYS_EXIT as i32),
        /* 9 */ li(reg::A0, 0),
        /* 10 */ ecall(),
        /* 11 */ jal(0, 0),
        // child: word 12
        /* 12 */ li(reg::A7, SYS_EXIT as i32),
        /* 13 */ li(reg::A0, 42),
        /* 14 */ ecall(),
        /* 15 */ jal(0, 0),
    ];
    words_to_bytes(&words)
}

/// Scenario S4: dereferences a null pointer, which must raise a page
/// fault that `trap.rs` turns into SIGSEGV (default disposition: kill
/// the process). The exit/self-loop after it only matter if delivery
/// is somehow suppressed.
pub fn null_deref_program() -> Vec<u8> {
    let words = [
        ld(reg::A0, reg::ZERO, 0),
        li(reg::A7, SYS_EXIT as i32),
        li(reg::A0, 99),
        ecall(),
        jal(0, 0),
    ];
    words_to_bytes(&words)
}

/// Spawns the hand-assembled S1/S2/S4 programs onto the ready queue.
/// Called from `kinit` only under the `qemu-selftest` feature; PASS/
/// FAIL itself isn't observed here -- each program's own exit code,
/// read back by whichever process ends up `wait4`-ing it, is the
/// observable result an external harness greps the UART log for.
#[cfg(target_arch = "riscv64")]
pub fn run_self_tests() {
    let _ = crate::proc::spawn_raw("selftest-hello", &hello_world_program(b"hello, world\n"), 0);
    let _ = crate::proc::spawn_raw("selftest-fork", &fork_exit_program(), 0);
    let _ = crate::proc::spawn_raw("selftest-sigsegv", &null_deref_program(), 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_i_imm(word: u32) -> i32 {
        (word as i32) >> 20
    }

    #[test]
    fn hello_world_program_places_string_right_after_ten_words() {
        let msg = b"hi\n";
        let program = hello_world_program(msg);
        assert_eq!(&program[40..40 + msg.len()], msg);
        // auipc a1, 0 followed by addi a1, a1, 40 must land exactly on
        // that offset for any entry address the blob is mapped at.
        let addi_word = u32::from_le_bytes(program[4..8].try_into().unwrap());
        assert_eq!(decode_i_imm(addi_word), 40);
    }

    #[test]
    fn fork_exit_program_branch_lands_on_child_exit_code() {
        let program = fork_exit_program();
        let branch_word = u32::from_le_bytes(program[8..12].try_into().unwrap());
        let b12 = (branch_word >> 31) & 1;
        let b11 = (branch_word >> 7) & 1;
        let b10_5 = (branch_word >> 25) & 0x3f;
        let b4_1 = (branch_word >> 8) & 0xf;
        let offset = (b12 << 12) | (b11 << 11) | (b10_5 << 5) | (b4_1 << 1);
        // branch sits at word index 2 (byte 8); child label at word 12 (byte 48).
        assert_eq!(8 + offset as usize, 48);
        let child_exit_code = u32::from_le_bytes(program[52..56].try_into().unwrap());
        assert_eq!(decode_i_imm(child_exit_code), 42);
    }

    #[test]
    fn null_deref_program_loads_from_address_zero() {
        let program = null_deref_program();
        let ld_word = u32::from_le_bytes(program[0..4].try_into().unwrap());
        assert_eq!(ld_word & 0x7f, LOAD);
        assert_eq!((ld_word >> 15) & 0x1f, reg::ZERO);
        assert_eq!(decode_i_imm(ld_word), 0);
    }

    #[test]
    fn programs_fit_in_a_single_page() {
        assert!(hello_world_program(b"short").len() <= crate::config::PAGE_SIZE);
        assert!(fork_exit_program().len() <= crate::config::PAGE_SIZE);
        assert!(null_deref_program().len() <= crate::config::PAGE_SIZE);
    }
}
