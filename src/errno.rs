// errno.rs
// The stable errno taxonomy (spec 6) and the internal KError type
// syscalls are implemented in terms of. Every fallible in-kernel
// operation returns Result<T, KError>; the syscall dispatcher is the
// only place that converts a KError into the (-1, errno) ABI spec
// 4.E and 7 describe.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    Einval = 1,
    Enoent = 2,
    Ebadf = 3,
    Emfile = 4,
    Enomem = 5,
    Efault = 6,
    Eacces = 7,
    Eexist = 8,
    Enotempty = 9,
    Enotdir = 10,
    Eagain = 11,
    Epipe = 12,
    Echild = 13,
    Erange = 14,
    EfsCorrupt = 15,
    EfsBadino = 16,
    EfsNoblk = 17,
    EfsNoinode = 18,
    EfsBadblk = 19,
    EfsNotmnt = 20,
    EelfMagic = 21,
    EelfUnsupported = 22,
}

pub type KError = Errno;

/// Marshal a kernel Result into the classic `a0 == -1` + per-process
/// errno convention (spec 4.E). Callers store the returned errno into
/// the process before returning -1 through the trap frame.
pub fn to_abi(result: Result<usize, Errno>) -> (isize, Option<Errno>) {
    match result {
        Ok(v) => (v as isize, None),
        Err(e) => (-1, Some(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_has_no_errno() {
        assert_eq!(to_abi(Ok(42)), (42, None));
    }

    #[test]
    fn err_is_minus_one_with_errno() {
        assert_eq!(to_abi(Err(Errno::Efault)), (-1, Some(Errno::Efault)));
    }
}
