// rvasm.rs
// Minimal RV64I word encoder. Pulled out of test.rs (spec 8's
// hand-assembled self-test programs were the first thing that needed
// one) once `proc::init`'s own built-in init program needed the same
// handful of instruction forms -- nothing architecture-specific beyond
// ordinary RV64I encodings, so it's plain, host-testable arithmetic
// shared by both callers instead of duplicated between them.

pub mod reg {
    pub const ZERO: u32 = 0;
    pub const A0: u32 = 10;
    pub const A1: u32 = 11;
    pub const A2: u32 = 12;
    pub const A7: u32 = 17;
}

pub const OP_IMM: u32 = 0x13;
pub const AUIPC: u32 = 0x17;
pub const LOAD: u32 = 0x03;
pub const BRANCH: u32 = 0x63;
pub const JAL: u32 = 0x6f;
pub const SYSTEM: u32 = 0x73;

fn i_type(opcode: u32, funct3: u32, rd: u32, rs1: u32, imm: i32) -> u32 {
    let imm12 = (imm as u32) & 0xfff;
    (imm12 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

fn u_type(opcode: u32, rd: u32, imm20: i32) -> u32 {
    ((imm20 as u32) << 12) | (rd << 7) | opcode
}

fn b_type(opcode: u32, funct3: u32, rs1: u32, rs2: u32, imm: i32) -> u32 {
    let imm = imm as u32;
    let b12 = (imm >> 12) & 1;
    let b11 = (imm >> 11) & 1;
    let b10_5 = (imm >> 5) & 0x3f;
    let b4_1 = (imm >> 1) & 0xf;
    (b12 << 31) | (b10_5 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (b4_1 << 8) | (b11 << 7) | opcode
}

fn j_type(opcode: u32, rd: u32, imm: i32) -> u32 {
    let imm = imm as u32;
    let b20 = (imm >> 20) & 1;
    let b19_12 = (imm >> 12) & 0xff;
    let b11 = (imm >> 11) & 1;
    let b10_1 = (imm >> 1) & 0x3ff;
    (b20 << 31) | (b10_1 << 21) | (b11 << 20) | (b19_12 << 12) | (rd << 7) | opcode
}

pub fn addi(rd: u32, rs1: u32, imm: i32) -> u32 {
    i_type(OP_IMM, 0, rd, rs1, imm)
}

pub fn li(rd: u32, imm: i32) -> u32 {
    addi(rd, reg::ZERO, imm)
}

pub fn auipc(rd: u32, imm20: i32) -> u32 {
    u_type(AUIPC, rd, imm20)
}

pub fn ld(rd: u32, rs1: u32, imm: i32) -> u32 {
    i_type(LOAD, 0b011, rd, rs1, imm)
}

pub fn beq(rs1: u32, rs2: u32, imm: i32) -> u32 {
    b_type(BRANCH, 0, rs1, rs2, imm)
}

pub fn jal(rd: u32, imm: i32) -> u32 {
    j_type(JAL, rd, imm)
}

pub fn ecall() -> u32 {
    i_type(SYSTEM, 0, 0, 0, 0)
}

pub fn words_to_bytes(words: &[u32]) -> alloc::vec::Vec<u8> {
    let mut out = alloc::vec::Vec::with_capacity(words.len() * 4);
    for w in words {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_i_imm(word: u32) -> i32 {
        (word as i32) >> 20
    }

    #[test]
    fn addi_round_trips_immediate() {
        let w = addi(reg::A1, reg::ZERO, 40);
        assert_eq!(w & 0x7f, OP_IMM);
        assert_eq!((w >> 7) & 0x1f, reg::A1);
        assert_eq!((w >> 15) & 0x1f, reg::ZERO);
        assert_eq!(decode_i_imm(w), 40);
    }

    #[test]
    fn addi_encodes_negative_immediate() {
        let w = addi(reg::A0, reg::ZERO, -1);
        assert_eq!(decode_i_imm(w), -1);
    }

    #[test]
    fn beq_offset_round_trips() {
        let w = beq(reg::A0, reg::ZERO, 28);
        let b12 = (w >> 31) & 1;
        let b11 = (w >> 7) & 1;
        let b10_5 = (w >> 25) & 0x3f;
        let b4_1 = (w >> 8) & 0xf;
        let decoded = (b12 << 12) | (b11 << 11) | (b10_5 << 5) | (b4_1 << 1);
        assert_eq!(decoded, 28);
        assert_eq!((w >> 15) & 0x1f, reg::A0);
        assert_eq!((w >> 20) & 0x1f, reg::ZERO);
    }

    #[test]
    fn jal_self_loop_has_zero_offset() {
        let w = jal(0, 0);
        assert_eq!(w & 0x7f, JAL);
        assert_eq!((w >> 7) & 0x1f, 0);
    }
}
