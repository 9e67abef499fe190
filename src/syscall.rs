// syscall.rs
// Syscall dispatch (spec 4.E). The teacher's syscall.rs already shows
// the shape -- a7 selects the operation, a0..a5 are arguments, the
// frame's a0 gets the result and sepc advances by 4 -- and its large
// commented-out Linux RISC-V syscall table is the grounding source for
// every number below that the teacher's dispatcher itself implements.
// Numbers for operations this kernel has but the teacher's table
// doesn't (fork, wait4, pipe, sigreturn, sigaction, rmdir, kill,
// sched_yield, getppid) are the real Linux riscv64 numbers for those
// names where one exists; `rmdir` has none on riscv64 (folded into
// unlinkat there) so it's placed adjacent to `mkdir`'s legacy slot --
// see DESIGN.md.

use crate::config::{KERNEL_VIRT_BASE, MAX_ARGC, MAX_PATH};
use crate::cpu::{Registers, TrapFrame};
use crate::errno::Errno;
use crate::fd::{Handle, OpenFlags};
use crate::proc::{self, Vma, VmaFlags};
use crate::{fs, pipe, signal};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

pub const SYS_GETCWD: usize = 17;
pub const SYS_DUP: usize = 23;
pub const SYS_CHDIR: usize = 49;
pub const SYS_OPEN: usize = 1024;
pub const SYS_CLOSE: usize = 57;
pub const SYS_GETDENTS: usize = 61;
pub const SYS_LSEEK: usize = 62;
pub const SYS_READ: usize = 63;
pub const SYS_WRITE: usize = 64;
pub const SYS_UNLINK: usize = 1026;
pub const SYS_RMDIR: usize = 1028;
pub const SYS_MKDIR: usize = 1030;
pub const SYS_STAT: usize = 1038;
pub const SYS_EXIT: usize = 93;
pub const SYS_EXIT_GROUP: usize = 94;
pub const SYS_KILL: usize = 129;
pub const SYS_RT_SIGACTION: usize = 134;
pub const SYS_RT_SIGRETURN: usize = 139;
pub const SYS_SCHED_YIELD: usize = 124;
pub const SYS_GETPID: usize = 172;
pub const SYS_GETPPID: usize = 173;
/// Not a real Linux riscv64 number -- spec 4.E's "errno readable via a
/// dedicated syscall" has no Linux equivalent since Linux threads
/// errno through libc's TLS, not the kernel; placed in the same
/// unused-on-riscv64 block as SYS_getmainvars (2011).
pub const SYS_GETERRNO: usize = 2012;
pub const SYS_BRK: usize = 214;
pub const SYS_MUNMAP: usize = 215;
pub const SYS_MMAP: usize = 222;
pub const SYS_WAIT4: usize = 260;
pub const SYS_PIPE: usize = 59;
pub const SYS_FORK: usize = 220;
pub const SYS_EXECVE: usize = 221;
pub const SYS_UNAME: usize = 160;
/// Real Linux riscv64 `clock_gettime` slot; this kernel only ever
/// answers with the monotonic CLINT-derived clock regardless of which
/// `clockid_t` is passed (spec Non-goals: no wall-clock/RTC).
pub const SYS_GETTIME: usize = 113;
pub const SYS_POWEROFF: usize = 2100;
pub const SYS_REBOOT: usize = 2101;

/// Spec 4.E's exact four-condition validation of a user pointer range
/// against the calling process's VMA list. Pure and host-testable --
/// taking the VMA slice directly instead of a Pcb keeps it free of the
/// proc module's global lock.
fn validate_user_range(vmas: &[Vma], ptr: usize, len: usize, required: VmaFlags) -> bool {
    if ptr == 0 {
        return false;
    }
    let end = match ptr.checked_add(len) {
        Some(e) => e,
        None => return false,
    };
    if end > KERNEL_VIRT_BASE {
        return false;
    }
    vmas.iter().any(|v| v.contains(ptr, len) && v.flags.contains(required))
}

fn check_range(pid: usize, ptr: usize, len: usize, required: VmaFlags) -> Result<(), Errno> {
    let ok = proc::with_pcb(pid, |pcb| validate_user_range(&pcb.vmas, ptr, len, required)).unwrap_or(false);
    if ok {
        Ok(())
    } else {
        Err(Errno::Efault)
    }
}

fn read_user_bytes(pid: usize, ptr: usize, len: usize) -> Result<Vec<u8>, Errno> {
    check_range(pid, ptr, len, VmaFlags::R)?;
    let mut out = alloc::vec![0u8; len];
    unsafe { core::ptr::copy_nonoverlapping(ptr as *const u8, out.as_mut_ptr(), len) };
    Ok(out)
}

fn write_user_bytes(pid: usize, ptr: usize, data: &[u8]) -> Result<(), Errno> {
    check_range(pid, ptr, data.len(), VmaFlags::W)?;
    unsafe { core::ptr::copy_nonoverlapping(data.as_ptr(), ptr as *mut u8, data.len()) };
    Ok(())
}

fn read_user_string(pid: usize, ptr: usize, max: usize) -> Result<String, Errno> {
    check_range(pid, ptr, 1, VmaFlags::R)?;
    let mut bytes = Vec::new();
    for i in 0..max {
        let byte = unsafe { *((ptr + i) as *const u8) };
        if byte == 0 {
            return String::from_utf8(bytes).map_err(|_| Errno::Einval);
        }
        bytes.push(byte);
    }
    Err(Errno::Einval)
}

fn set_result(tf: &mut TrapFrame, result: Result<usize, Errno>) {
    match result {
        Ok(v) => tf.set_reg(Registers::A0, v),
        Err(e) => {
            tf.set_reg(Registers::A0, usize::MAX);
            let pid = tf.pid;
            proc::with_pcb(pid, |pcb| pcb.last_errno = e as i32);
        }
    }
}

/// Entry point from trap.rs: reads a7/a0..a5 out of the trap frame,
/// dispatches, writes the result into a0, and advances `sepc` past the
/// ecall (spec 4.E) -- except on a successful execve, which has
/// already rewritten `sepc` to the new image's entry point and must
/// not have that clobbered.
pub fn do_syscall(tf: &mut TrapFrame, sepc: usize) {
    let pid = tf.pid;
    let num = tf.reg(Registers::A7);
    let a0 = tf.reg(Registers::A0);
    let a1 = tf.reg(Registers::A1);
    let a2 = tf.reg(Registers::A2);
    let a3 = tf.reg(Registers::A3);
    let result = dispatch(pid, tf, num, a0, a1, a2, a3);
    let execve_succeeded = num == SYS_EXECVE && result.is_ok();
    if !execve_succeeded {
        set_result(tf, result);
        tf.sepc = sepc + 4;
    }
}

fn dispatch(pid: usize, tf: &mut TrapFrame, num: usize, a0: usize, a1: usize, a2: usize, _a3: usize) -> Result<usize, Errno> {
    match num {
        SYS_EXIT | SYS_EXIT_GROUP => {
            proc::exit_current(a0 as i32);
            Ok(0)
        }
        SYS_GETPID => Ok(pid),
        SYS_GETPPID => Ok(proc::ppid_of(pid)),
        SYS_GETERRNO => Ok(proc::with_pcb(pid, |pcb| pcb.last_errno as usize).unwrap_or(0)),
        SYS_SCHED_YIELD => {
            crate::sched::yield_now();
            Ok(0)
        }
        SYS_FORK => proc::fork(),
        SYS_EXECVE => {
            let path = read_user_string(pid, a0, MAX_PATH)?;
            let argv = read_argv(pid, a1)?;
            let refs: Vec<&str> = argv.iter().map(String::as_str).collect();
            proc::exec(&path, &refs)?;
            Ok(0)
        }
        SYS_WAIT4 => do_wait4(pid, a0, a1),
        SYS_KILL => {
            signal::raise(a1, a0)?;
            Ok(0)
        }
        SYS_RT_SIGACTION => do_sigaction(pid, a0, a1),
        SYS_RT_SIGRETURN => signal::sigreturn(pid, tf as *mut TrapFrame),
        SYS_OPEN => do_open(pid, a0, a1),
        SYS_CLOSE => fs::close(pid, a0).map(|_| 0),
        SYS_READ => do_read(pid, a0, a1, a2),
        SYS_WRITE => do_write(pid, a0, a1, a2),
        SYS_LSEEK => fs::lseek(pid, a0, a1 as i64, a2 as i32).map(|v| v as usize),
        SYS_STAT => do_stat(pid, a0, a1),
        SYS_MKDIR => {
            let path = read_user_string(pid, a0, MAX_PATH)?;
            fs::mkdir(pid, &path).map(|_| 0)
        }
        SYS_UNLINK => {
            let path = read_user_string(pid, a0, MAX_PATH)?;
            fs::unlink(pid, &path).map(|_| 0)
        }
        SYS_RMDIR => {
            let path = read_user_string(pid, a0, MAX_PATH)?;
            fs::rmdir(pid, &path).map(|_| 0)
        }
        SYS_GETDENTS => do_getdents(pid, a0, a1, a2),
        SYS_CHDIR => {
            let path = read_user_string(pid, a0, MAX_PATH)?;
            fs::chdir(pid, &path).map(|_| 0)
        }
        SYS_GETCWD => do_getcwd(pid, a0, a1),
        SYS_PIPE => do_pipe(pid, a0),
        SYS_BRK => proc::grow_heap(pid, a0 as isize),
        SYS_MMAP | SYS_MUNMAP => Err(Errno::Einval), // spec Non-goals: no general mmap beyond brk
        SYS_UNAME => do_uname(pid, a0),
        SYS_GETTIME => do_gettime(pid, a1),
        SYS_POWEROFF => crate::testdev::exit_success(),
        SYS_REBOOT => crate::testdev::reset(),
        _ => Err(Errno::Einval),
    }
}

fn read_argv(pid: usize, argv_ptr: usize) -> Result<Vec<String>, Errno> {
    let mut out = Vec::new();
    for i in 0..MAX_ARGC {
        let slot = read_user_bytes(pid, argv_ptr + i * 8, 8)?;
        let ptr = usize::from_le_bytes(slot.try_into().unwrap());
        if ptr == 0 {
            return Ok(out);
        }
        out.push(read_user_string(pid, ptr, MAX_PATH)?);
    }
    Err(Errno::Einval)
}

fn do_wait4(pid: usize, target: usize, status_out: usize) -> Result<usize, Errno> {
    let target = if target as isize == -1 { None } else { Some(target) };
    loop {
        match proc::try_wait(pid, target) {
            proc::WaitOutcome::Reaped { pid: child, status } => {
                if status_out != 0 {
                    write_user_bytes(pid, status_out, &status.to_le_bytes())?;
                }
                return Ok(child);
            }
            proc::WaitOutcome::NoChildren => return Err(Errno::Echild),
            proc::WaitOutcome::NoneYet => {
                crate::sched::yield_now();
            }
        }
    }
}

fn do_sigaction(pid: usize, signo: usize, handler: usize) -> Result<usize, Errno> {
    use crate::signal::Disposition;
    let disp = match handler {
        0 => Disposition::Default,
        1 => Disposition::Ignore,
        entry => Disposition::User { entry, mask: 0, flags: 0 },
    };
    proc::with_pcb(pid, |pcb| pcb.sig.set_handler(signo, disp)).ok_or(Errno::Einval)??;
    Ok(0)
}

fn do_open(pid: usize, path_ptr: usize, flags_bits: usize) -> Result<usize, Errno> {
    let path = read_user_string(pid, path_ptr, MAX_PATH)?;
    let flags = OpenFlags {
        read: flags_bits & 0b001 != 0 || flags_bits & 0b11 == 0,
        write: flags_bits & 0b010 != 0,
        append: flags_bits & 0b1000 != 0,
        create: flags_bits & 0b1_0000_0000 != 0,
    };
    fs::open(pid, &path, flags)
}

fn do_read(pid: usize, fd: usize, buf_ptr: usize, len: usize) -> Result<usize, Errno> {
    check_range(pid, buf_ptr, len, VmaFlags::W)?;
    let mut buf = alloc::vec![0u8; len];
    let n = fs::read(pid, fd, &mut buf)?;
    write_user_bytes(pid, buf_ptr, &buf[..n])?;
    Ok(n)
}

fn do_write(pid: usize, fd: usize, buf_ptr: usize, len: usize) -> Result<usize, Errno> {
    let buf = read_user_bytes(pid, buf_ptr, len)?;
    fs::write(pid, fd, &buf)
}

fn do_stat(pid: usize, path_ptr: usize, stat_out: usize) -> Result<usize, Errno> {
    let path = read_user_string(pid, path_ptr, MAX_PATH)?;
    let st = fs::stat(pid, &path)?;
    let mut buf = [0u8; 24];
    buf[0..4].copy_from_slice(&st.mode.to_le_bytes());
    buf[4..8].copy_from_slice(&(st.is_dir as u32).to_le_bytes());
    buf[8..16].copy_from_slice(&st.size.to_le_bytes());
    buf[16..20].copy_from_slice(&st.uid.to_le_bytes());
    buf[20..24].copy_from_slice(&st.gid.to_le_bytes());
    write_user_bytes(pid, stat_out, &buf)?;
    Ok(0)
}

fn do_uname(pid: usize, buf_ptr: usize) -> Result<usize, Errno> {
    let buf = crate::uname::fill();
    write_user_bytes(pid, buf_ptr, &buf)?;
    Ok(0)
}

/// `clock_gettime`-shaped: writes a `struct timespec { tv_sec, tv_nsec
/// }` (two `i64`s) to `tp_ptr`, sourced from `clint::monotonic_timespec`
/// (spec §2's "gettime wall-clock reader" -- monotonic since boot, not
/// an RTC this kernel has no driver for).
fn do_gettime(pid: usize, tp_ptr: usize) -> Result<usize, Errno> {
    let (secs, nanos) = crate::clint::monotonic_timespec();
    let mut buf = [0u8; 16];
    buf[0..8].copy_from_slice(&(secs as i64).to_le_bytes());
    buf[8..16].copy_from_slice(&(nanos as i64).to_le_bytes());
    write_user_bytes(pid, tp_ptr, &buf)?;
    Ok(0)
}

const DT_DIR: u8 = 4;
const DT_REG: u8 = 8;

/// Serializes `fs::getdents`'s entries into the caller's buffer as
/// `linux_dirent64`-shaped records (d_ino, d_off, d_reclen, d_type,
/// NUL-terminated d_name, 8-byte aligned) -- the real `getdents(2)`
/// contract this syscall number names, not just an entry count.
/// Stops before a record that wouldn't fit in `len`, same as the real
/// syscall's "buffer too small for the next entry" behavior.
fn do_getdents(pid: usize, fd: usize, buf_ptr: usize, len: usize) -> Result<usize, Errno> {
    let entries = fs::getdents(pid, fd)?;
    let mut out = Vec::new();
    let mut d_off: u64 = 0;
    for e in &entries {
        let name = e.name.as_bytes();
        let header_len = 8 + 8 + 2 + 1; // d_ino + d_off + d_reclen + d_type
        let reclen = (header_len + name.len() + 1 + 7) & !7; // + NUL, 8-byte aligned
        if out.len() + reclen > len {
            break;
        }
        d_off += 1;
        let mut rec = alloc::vec![0u8; reclen];
        rec[0..8].copy_from_slice(&(e.inode as u64).to_le_bytes());
        rec[8..16].copy_from_slice(&d_off.to_le_bytes());
        rec[16..18].copy_from_slice(&(reclen as u16).to_le_bytes());
        rec[18] = if e.is_dir { DT_DIR } else { DT_REG };
        rec[header_len..header_len + name.len()].copy_from_slice(name);
        out.extend_from_slice(&rec);
    }
    write_user_bytes(pid, buf_ptr, &out)?;
    Ok(out.len())
}

fn do_getcwd(pid: usize, buf_ptr: usize, len: usize) -> Result<usize, Errno> {
    let cwd = fs::getcwd(pid)?;
    if cwd.len() + 1 > len {
        return Err(Errno::Erange);
    }
    let mut bytes = cwd.into_bytes();
    bytes.push(0);
    write_user_bytes(pid, buf_ptr, &bytes)?;
    Ok(bytes.len())
}

fn do_pipe(pid: usize, out_fds_ptr: usize) -> Result<usize, Errno> {
    let (r, w) = pipe::create()?;
    let (r, w) = (Arc::new(r), Arc::new(w));
    let (fd_r, fd_w) = proc::with_pcb(pid, |pcb| -> Result<(usize, usize), Errno> {
        let slot_r = pcb.fds.iter().position(|f| f.is_none()).ok_or(Errno::Emfile)?;
        pcb.fds[slot_r] = Some(crate::fd::FileDescriptor { offset: 0, handle: Handle::PipeRead(r), flags: OpenFlags { read: true, ..Default::default() } });
        let slot_w = pcb.fds.iter().position(|f| f.is_none()).ok_or(Errno::Emfile)?;
        pcb.fds[slot_w] = Some(crate::fd::FileDescriptor { offset: 0, handle: Handle::PipeWrite(w), flags: OpenFlags { write: true, ..Default::default() } });
        Ok((slot_r, slot_w))
    })
    .ok_or(Errno::Einval)??;
    write_user_bytes(pid, out_fds_ptr, &(fd_r as u32).to_le_bytes())?;
    write_user_bytes(pid, out_fds_ptr + 4, &(fd_w as u32).to_le_bytes())?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vma(start: usize, end: usize, flags: VmaFlags) -> Vma {
        Vma { start, end, flags }
    }

    #[test]
    fn null_pointer_is_rejected() {
        let vmas = [vma(0x1000, 0x2000, VmaFlags::R)];
        assert!(!validate_user_range(&vmas, 0, 8, VmaFlags::R));
    }

    #[test]
    fn overflowing_range_is_rejected() {
        let vmas = [vma(0x1000, 0x2000, VmaFlags::R)];
        assert!(!validate_user_range(&vmas, usize::MAX - 4, 8, VmaFlags::R));
    }

    #[test]
    fn range_reaching_into_kernel_half_is_rejected() {
        let vmas = [vma(KERNEL_VIRT_BASE - 0x1000, KERNEL_VIRT_BASE, VmaFlags::R | VmaFlags::W)];
        assert!(!validate_user_range(&vmas, KERNEL_VIRT_BASE - 8, 16, VmaFlags::R));
    }

    #[test]
    fn range_outside_every_vma_is_rejected() {
        let vmas = [vma(0x1000, 0x2000, VmaFlags::R)];
        assert!(!validate_user_range(&vmas, 0x5000, 8, VmaFlags::R));
    }

    #[test]
    fn range_missing_required_flag_is_rejected() {
        let vmas = [vma(0x1000, 0x2000, VmaFlags::R)];
        assert!(!validate_user_range(&vmas, 0x1000, 8, VmaFlags::W));
    }

    #[test]
    fn fully_covered_range_with_flags_is_accepted() {
        let vmas = [vma(0x1000, 0x2000, VmaFlags::R | VmaFlags::W)];
        assert!(validate_user_range(&vmas, 0x1000, 0x1000, VmaFlags::R));
    }
}
