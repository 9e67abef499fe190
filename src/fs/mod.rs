// fs/mod.rs
// VFS shim (spec 4.I). Resolves absolute paths against the mounted
// ext2 root and dispatches read/write by descriptor type: TTY to the
// UART driver, PIPE_* per 4.H, FILE to the ext2 adapter. The teacher's
// fs.rs FileSystem trait (init/open/read/write/close/stat) is the
// shape this follows, generalized from a single trait object to a
// statically-known ext2 backend since this kernel mounts exactly one
// filesystem at one root.

pub mod ext2;

use crate::config::MAX_OPEN_FILES;
use crate::errno::Errno;
use crate::fd::{FileDescriptor, Handle, OpenFlags};
use crate::proc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

#[derive(Clone, Copy, Default)]
pub struct Stat {
    pub mode: u32,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub is_dir: bool,
}

pub struct DirEntry {
    pub inode: u32,
    pub name: String,
    pub is_dir: bool,
}

/// Joins `cwd` and `path` into an absolute, `.`/`..`-resolved path.
/// Relative paths are resolved against `cwd`; this mirrors the
/// teacher's minixfs path handling but runs the `..`/`.` collapse
/// itself since the teacher's stub never implemented one.
fn resolve(cwd: &str, path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let absolute = path.starts_with('/');
    let base_parts: Vec<&str> = if absolute { Vec::new() } else { cwd.split('/').filter(|s| !s.is_empty()).collect() };
    parts.extend(base_parts);
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    let mut out = String::from("/");
    out.push_str(&parts.join("/"));
    out
}

/// Opens `path` against the calling process's cwd and installs the
/// lowest free fd in its table (spec 4.I).
pub fn open(pid: usize, path: &str, flags: OpenFlags) -> Result<usize, Errno> {
    let full = proc::with_pcb(pid, |pcb| resolve(&pcb.cwd, path)).ok_or(Errno::Einval)?;
    let inode = if flags.create {
        ext2::create_file(&full).or_else(|e| if e == Errno::Eexist { ext2::lookup(&full) } else { Err(e) })?
    } else {
        ext2::lookup(&full)?
    };
    proc::with_pcb(pid, |pcb| {
        let slot = pcb.fds.iter().position(|f| f.is_none()).ok_or(Errno::Emfile)?;
        let offset = if flags.append { ext2::stat(inode)?.size } else { 0 };
        pcb.fds[slot] = Some(FileDescriptor { offset, handle: Handle::File { inode }, flags });
        Ok(slot)
    })
    .ok_or(Errno::Einval)?
}

fn with_fd<R>(pid: usize, fd: usize, f: impl FnOnce(&mut FileDescriptor) -> Result<R, Errno>) -> Result<R, Errno> {
    if fd >= MAX_OPEN_FILES {
        return Err(Errno::Ebadf);
    }
    proc::with_pcb(pid, |pcb| match pcb.fds[fd].as_mut() {
        Some(desc) => f(desc),
        None => Err(Errno::Ebadf),
    })
    .ok_or(Errno::Einval)?
}

pub fn read(pid: usize, fd: usize, buf: &mut [u8]) -> Result<usize, Errno> {
    with_fd(pid, fd, |desc| match &desc.handle {
        Handle::Tty => Ok(crate::uart::read_bytes(buf)),
        Handle::PipeRead(end) => end.read(buf),
        Handle::PipeWrite(_) => Err(Errno::Ebadf),
        Handle::File { inode } => {
            let n = ext2::read_at(*inode, desc.offset, buf)?;
            desc.offset += n as u64;
            Ok(n)
        }
    })
}

pub fn write(pid: usize, fd: usize, buf: &[u8]) -> Result<usize, Errno> {
    with_fd(pid, fd, |desc| match &desc.handle {
        Handle::Tty => Ok(crate::uart::write_bytes(buf)),
        Handle::PipeWrite(end) => end.write(buf),
        Handle::PipeRead(_) => Err(Errno::Ebadf),
        Handle::File { inode } => {
            let n = ext2::write_at(*inode, desc.offset, buf)?;
            desc.offset += n as u64;
            Ok(n)
        }
    })
}

pub fn close(pid: usize, fd: usize) -> Result<(), Errno> {
    if fd >= MAX_OPEN_FILES {
        return Err(Errno::Ebadf);
    }
    proc::with_pcb(pid, |pcb| {
        if pcb.fds[fd].take().is_none() {
            return Err(Errno::Ebadf);
        }
        Ok(())
    })
    .ok_or(Errno::Einval)?
}

pub fn lseek(pid: usize, fd: usize, offset: i64, whence: i32) -> Result<u64, Errno> {
    with_fd(pid, fd, |desc| {
        let inode = match &desc.handle {
            Handle::File { inode } => *inode,
            _ => return Err(Errno::Einval),
        };
        let base = match whence {
            0 => 0,
            1 => desc.offset,
            2 => ext2::stat(inode)?.size,
            _ => return Err(Errno::Einval),
        };
        let new_off = (base as i64 + offset).max(0) as u64;
        desc.offset = new_off;
        Ok(new_off)
    })
}

pub fn stat(pid: usize, path: &str) -> Result<Stat, Errno> {
    let full = proc::with_pcb(pid, |pcb| resolve(&pcb.cwd, path)).ok_or(Errno::Einval)?;
    let inode = ext2::lookup(&full)?;
    ext2::stat(inode)
}

pub fn mkdir(pid: usize, path: &str) -> Result<(), Errno> {
    let full = proc::with_pcb(pid, |pcb| resolve(&pcb.cwd, path)).ok_or(Errno::Einval)?;
    ext2::mkdir(&full)
}

pub fn unlink(pid: usize, path: &str) -> Result<(), Errno> {
    let full = proc::with_pcb(pid, |pcb| resolve(&pcb.cwd, path)).ok_or(Errno::Einval)?;
    ext2::unlink(&full)
}

pub fn rmdir(pid: usize, path: &str) -> Result<(), Errno> {
    let full = proc::with_pcb(pid, |pcb| resolve(&pcb.cwd, path)).ok_or(Errno::Einval)?;
    ext2::rmdir(&full)
}

/// Lists the directory open on `fd` (spec 4.I: `getdents(fd, buf,
/// count)` takes an open descriptor like every other fd-based
/// syscall in this file, not a path -- the caller `open()`s the
/// directory itself first).
pub fn getdents(pid: usize, fd: usize) -> Result<Vec<DirEntry>, Errno> {
    let inode = with_fd(pid, fd, |desc| match &desc.handle {
        Handle::File { inode } => Ok(*inode),
        _ => Err(Errno::Enotdir),
    })?;
    ext2::read_dir(inode)
}

pub fn chdir(pid: usize, path: &str) -> Result<(), Errno> {
    let full = proc::with_pcb(pid, |pcb| resolve(&pcb.cwd, path)).ok_or(Errno::Einval)?;
    let inode = ext2::lookup(&full)?;
    let st = ext2::stat(inode)?;
    if !st.is_dir {
        return Err(Errno::Enotdir);
    }
    proc::with_pcb(pid, |pcb| pcb.cwd = full.clone()).ok_or(Errno::Einval)
}

pub fn getcwd(pid: usize) -> Result<String, Errno> {
    proc::with_pcb(pid, |pcb| pcb.cwd.to_string()).ok_or(Errno::Einval)
}

/// Reads a whole file into a `Vec<u8>` for `exec`'s sole benefit; it
/// has no fd or offset of its own, so it skips the descriptor table.
pub fn read_whole_file(path: &str) -> Result<Vec<u8>, Errno> {
    let inode = ext2::lookup(path)?;
    let st = ext2::stat(inode)?;
    let mut buf = alloc::vec![0u8; st.size as usize];
    let mut got = 0usize;
    while got < buf.len() {
        let n = ext2::read_at(inode, got as u64, &mut buf[got..])?;
        if n == 0 {
            break;
        }
        got += n;
    }
    buf.truncate(got);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_collapses_dot_and_dotdot() {
        assert_eq!(resolve("/home/user", "../etc/passwd"), "/home/etc/passwd");
        assert_eq!(resolve("/", "./bin/./sh"), "/bin/sh");
        assert_eq!(resolve("/a/b", "/etc/hosts"), "/etc/hosts");
    }

    #[test]
    fn resolve_dotdot_past_root_stays_at_root() {
        assert_eq!(resolve("/", "../../x"), "/x");
    }
}
