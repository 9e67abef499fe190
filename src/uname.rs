// uname.rs
// `uname(2)`'s data table (SPEC_FULL §2): spec.md names this only as
// "peripheral... contracts follow their names" (spec 4.E), so the
// fields and their conventional POSIX 65-byte layout (glibc's `struct
// utsname`) are what this module fills in, not anything borrowed from
// the teacher -- sgmarz-osblog never implements `uname`.

use alloc::string::ToString;

pub const FIELD_LEN: usize = 65;
const FIELD_COUNT: usize = 6; // sysname, nodename, release, version, machine, domainname
pub const UTSNAME_SIZE: usize = FIELD_LEN * FIELD_COUNT;

const SYSNAME: &str = "rvkernel";
const NODENAME: &str = "rvkernel";
const RELEASE: &str = env!("CARGO_PKG_VERSION");
const VERSION: &str = "rv64gc/sv39 preemptive kernel";
const MACHINE: &str = "riscv64";
const DOMAINNAME: &str = "(none)";

fn write_field(buf: &mut [u8; UTSNAME_SIZE], slot: usize, s: &str) {
    let start = slot * FIELD_LEN;
    let bytes = s.as_bytes();
    let n = bytes.len().min(FIELD_LEN - 1);
    buf[start..start + n].copy_from_slice(&bytes[..n]);
    // remaining bytes, including the one at start+n, stay zero (NUL)
}

/// Fills in a `struct utsname`-shaped buffer: six NUL-padded 65-byte
/// fields back to back, exactly as glibc lays it out, so nothing on
/// the other end needs a kernel-specific parser.
pub fn fill() -> [u8; UTSNAME_SIZE] {
    let mut buf = [0u8; UTSNAME_SIZE];
    write_field(&mut buf, 0, SYSNAME);
    write_field(&mut buf, 1, NODENAME);
    write_field(&mut buf, 2, RELEASE);
    write_field(&mut buf, 3, VERSION);
    write_field(&mut buf, 4, MACHINE);
    write_field(&mut buf, 5, DOMAINNAME);
    buf
}

#[allow(dead_code)]
fn field_as_string(buf: &[u8; UTSNAME_SIZE], slot: usize) -> alloc::string::String {
    let start = slot * FIELD_LEN;
    let end = buf[start..start + FIELD_LEN].iter().position(|&b| b == 0).map(|p| start + p).unwrap_or(start + FIELD_LEN);
    core::str::from_utf8(&buf[start..end]).unwrap_or("").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sysname_and_machine_round_trip() {
        let buf = fill();
        assert_eq!(field_as_string(&buf, 0), SYSNAME);
        assert_eq!(field_as_string(&buf, 4), MACHINE);
    }

    #[test]
    fn fields_are_nul_padded_not_garbage() {
        let buf = fill();
        let sysname_start = 0;
        let sysname_end = sysname_start + SYSNAME.len();
        assert_eq!(buf[sysname_end], 0);
        assert!(buf[sysname_end..FIELD_LEN].iter().all(|&b| b == 0));
    }

    #[test]
    fn total_size_matches_six_glibc_style_fields() {
        assert_eq!(UTSNAME_SIZE, 65 * 6);
    }
}
