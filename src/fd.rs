// fd.rs
// File descriptor table entries. The teacher's fd.rs was a bare
// DescriptorType enum with no backing data; spec 3 pins down a
// concrete `{type, offset, handle, flags}` record, so this is
// rewritten around that record instead of extended in place.

use crate::pipe::{ReadEnd, WriteEnd};
use alloc::sync::Arc;

#[derive(Clone)]
pub enum Handle {
    Tty,
    File { inode: u32 },
    PipeRead(Arc<ReadEnd>),
    PipeWrite(Arc<WriteEnd>),
}

#[derive(Clone, Copy, Default)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
}

#[derive(Clone)]
pub struct FileDescriptor {
    pub offset: u64,
    pub handle: Handle,
    pub flags: OpenFlags,
}

impl FileDescriptor {
    pub fn tty(flags: OpenFlags) -> Self {
        FileDescriptor { offset: 0, handle: Handle::Tty, flags }
    }

    pub fn is_tty(&self) -> bool {
        matches!(self.handle, Handle::Tty)
    }
}
