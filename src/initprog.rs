// initprog.rs
// The program pid 0 actually runs. SPEC_FULL §2's "minimal in-kernel
// CLI boot path" calls for a built-in init that mounts root (already
// done by the time `proc::init` maps this in -- `kinit` calls
// `block::probe()` first), forks the requested ELF program, and reaps
// orphans via `waitpid(-1, ...)` forever. Since this kernel's Sv39
// split means pid 0 is a real U-mode process like any other -- not a
// bare kernel function the way the teacher's init is -- that behavior
// has to exist as actual user-mode machine code, hand-assembled with
// `rvasm` the same way test.rs builds its scenario programs.

use crate::rvasm::{addi, auipc, beq, ecall, jal, li, reg, words_to_bytes};
use crate::syscall::{SYS_EXECVE, SYS_EXIT, SYS_FORK, SYS_WAIT4};
use alloc::vec::Vec;

/// Builds init's machine code: fork(); child execve()s `path` with an
/// empty argv, parent loops `wait4(-1, NULL, 0)` forever. Never
/// reaches its own `exit` on the parent side, matching spec.md's "pid
/// 0 never exits" invariant structurally rather than by a runtime
/// guard alone.
pub fn program(path: &str) -> Vec<u8> {
    let mut path_bytes = path.as_bytes().to_vec();
    path_bytes.push(0);

    let words = [
        /* 0 */ li(reg::A7, SYS_FORK as i32),
        /* 1 */ ecall(),
        /* 2 */ beq(reg::A0, reg::ZERO, 6 * 4), // fork() == 0 in the child -> word 8
        // parent: reap forever, word 3
        /* 3 */ li(reg::A0, -1),
        /* 4 */ li(reg::A1, 0),
        /* 5 */ li(reg::A7, SYS_WAIT4 as i32),
        /* 6 */ ecall(),
        /* 7 */ jal(0, -4 * 4), // back to word 3
        // child: word 8
        /* 8 */ auipc(reg::A0, 0),
        /* 9 */ addi(reg::A0, reg::A0, 0), // patched below once the path offset is known
        /* 10 */ auipc(reg::A1, 0),
        /* 11 */ addi(reg::A1, reg::A1, 0), // patched below once the argv offset is known
        /* 12 */ li(reg::A7, SYS_EXECVE as i32),
        /* 13 */ ecall(),
        // only reached if execve failed
        /* 14 */ li(reg::A7, SYS_EXIT as i32),
        /* 15 */ li(reg::A0, 1),
        /* 16 */ ecall(),
        /* 17 */ jal(0, 0),
    ];
    let mut words = words;

    let code_len = (words.len() * 4) as i32;
    let path_word_addr = 8 * 4; // auipc a0 at word 8
    let path_offset = code_len - path_word_addr;
    words[9] = addi(reg::A0, reg::A0, path_offset);

    let argv_word_addr = 10 * 4; // auipc a1 at word 10
    let argv_byte_offset = (path_bytes.len() as i32 + 7) & !7; // 8-byte align the null argv slot
    let argv_offset = code_len + argv_byte_offset - argv_word_addr;
    words[11] = addi(reg::A1, reg::A1, argv_offset);

    let mut bytes = words_to_bytes(&words);
    bytes.extend_from_slice(&path_bytes);
    while bytes.len() < (code_len + argv_byte_offset) as usize {
        bytes.push(0);
    }
    bytes.extend_from_slice(&0u64.to_le_bytes()); // argv[0] = NULL
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_i_imm(word: u32) -> i32 {
        (word as i32) >> 20
    }

    fn decode_b_imm(word: u32) -> i32 {
        let b12 = (word >> 31) & 1;
        let b11 = (word >> 7) & 1;
        let b10_5 = (word >> 25) & 0x3f;
        let b4_1 = (word >> 8) & 0xf;
        ((b12 << 12) | (b11 << 11) | (b10_5 << 5) | (b4_1 << 1)) as i32
    }

    fn decode_j_imm(word: u32) -> i32 {
        let b20 = (word >> 31) & 1;
        let b19_12 = (word >> 12) & 0xff;
        let b11 = (word >> 20) & 1;
        let b10_1 = (word >> 21) & 0x3ff;
        let raw = (b20 << 20) | (b19_12 << 12) | (b11 << 11) | (b10_1 << 1);
        ((raw << 11) as i32) >> 11 // sign-extend the 21-bit field
    }

    #[test]
    fn fork_branch_lands_on_child_execve_setup() {
        let bytes = program("/sbin/init");
        let branch = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        assert_eq!(8 + decode_b_imm(branch) as usize, 32); // word 8 at byte 32
    }

    #[test]
    fn parent_loop_jal_returns_to_wait4_setup() {
        let bytes = program("/sbin/init");
        let loop_jal = u32::from_le_bytes(bytes[28..32].try_into().unwrap());
        assert_eq!(28i32 + decode_j_imm(loop_jal), 12); // word 7 at byte 28, back to word 3 at byte 12
    }

    #[test]
    fn child_path_pointer_lands_on_embedded_string() {
        let path = "/sbin/init";
        let bytes = program(path);
        let code_len = 18 * 4;
        let auipc_a0 = 8 * 4;
        let addi_a0 = u32::from_le_bytes(bytes[36..40].try_into().unwrap());
        assert_eq!(auipc_a0 + decode_i_imm(addi_a0) as usize, code_len);
        assert_eq!(&bytes[code_len..code_len + path.len()], path.as_bytes());
        assert_eq!(bytes[code_len + path.len()], 0);
    }

    #[test]
    fn child_argv_pointer_lands_on_null_terminator() {
        let path = "/sbin/init";
        let bytes = program(path);
        let code_len = 18 * 4;
        let auipc_a1 = 10 * 4;
        let addi_a1 = u32::from_le_bytes(bytes[44..48].try_into().unwrap());
        let argv_addr = auipc_a1 + decode_i_imm(addi_a1) as usize;
        let argv_word = u64::from_le_bytes(bytes[argv_addr..argv_addr + 8].try_into().unwrap());
        assert_eq!(argv_word, 0);
    }

    #[test]
    fn program_fits_in_a_single_page() {
        assert!(program("/sbin/init").len() <= crate::config::PAGE_SIZE);
        assert!(program("/a/much/longer/path/to/an/init/binary").len() <= crate::config::PAGE_SIZE);
    }
}
