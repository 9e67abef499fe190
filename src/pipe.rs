// pipe.rs
// Anonymous pipe IPC: a 4 KiB circular buffer with two refcounted
// ends. Entirely new relative to the teacher, whose fd.rs only lists
// DescriptorType variants with no backing IPC object; grounded on the
// teacher's console.rs ring-buffer-with-lock shape (VecDeque-free
// fixed array here, per spec 3's exact `{buffer, read_pos, write_pos,
// data_size}` record) and on spec 4.H's wraparound-as-two-copies
// algorithm.

use crate::config::PIPE_BUF_SIZE;
use crate::errno::Errno;
use alloc::sync::Arc;
use spin::Mutex;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PipeState {
    Open,
    ReadClosed,
    WriteClosed,
    Closed,
}

struct PipeInner {
    buffer: [u8; PIPE_BUF_SIZE],
    read_pos: usize,
    write_pos: usize,
    data_size: usize,
    read_refs: usize,
    write_refs: usize,
}

impl PipeInner {
    fn state(&self) -> PipeState {
        match (self.read_refs > 0, self.write_refs > 0) {
            (true, true) => PipeState::Open,
            (false, true) => PipeState::ReadClosed,
            (true, false) => PipeState::WriteClosed,
            (false, false) => PipeState::Closed,
        }
    }

    fn read(&mut self, out: &mut [u8]) -> Result<usize, Errno> {
        if self.data_size == 0 {
            return if self.write_refs == 0 { Ok(0) } else { Err(Errno::Eagain) };
        }
        let n = out.len().min(self.data_size);
        let first = n.min(PIPE_BUF_SIZE - self.read_pos);
        out[..first].copy_from_slice(&self.buffer[self.read_pos..self.read_pos + first]);
        if first < n {
            let second = n - first;
            out[first..n].copy_from_slice(&self.buffer[0..second]);
        }
        self.read_pos = (self.read_pos + n) % PIPE_BUF_SIZE;
        self.data_size -= n;
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Errno> {
        if self.read_refs == 0 {
            return Err(Errno::Epipe);
        }
        let free = PIPE_BUF_SIZE - self.data_size;
        if free == 0 {
            return Err(Errno::Eagain);
        }
        let n = data.len().min(free);
        let first = n.min(PIPE_BUF_SIZE - self.write_pos);
        self.buffer[self.write_pos..self.write_pos + first].copy_from_slice(&data[..first]);
        if first < n {
            let second = n - first;
            self.buffer[0..second].copy_from_slice(&data[first..n]);
        }
        self.write_pos = (self.write_pos + n) % PIPE_BUF_SIZE;
        self.data_size += n;
        Ok(n)
    }
}

/// A pipe end. Cloning increments the appropriate refcount; dropping
/// decrements it. The underlying buffer is freed once both refcounts
/// reach zero (spec 3).
pub struct Pipe {
    inner: Arc<Mutex<PipeInner>>,
}

pub struct ReadEnd(Pipe);
pub struct WriteEnd(Pipe);

pub fn create() -> Result<(ReadEnd, WriteEnd), Errno> {
    let inner = PipeInner {
        buffer: [0; PIPE_BUF_SIZE],
        read_pos: 0,
        write_pos: 0,
        data_size: 0,
        read_refs: 1,
        write_refs: 1,
    };
    let shared = Arc::new(Mutex::new(inner));
    Ok((ReadEnd(Pipe { inner: shared.clone() }), WriteEnd(Pipe { inner: shared })))
}

impl ReadEnd {
    pub fn read(&self, out: &mut [u8]) -> Result<usize, Errno> {
        self.0.inner.lock().read(out)
    }

    pub fn state(&self) -> PipeState {
        self.0.inner.lock().state()
    }
}

impl WriteEnd {
    pub fn write(&self, data: &[u8]) -> Result<usize, Errno> {
        self.0.inner.lock().write(data)
    }

    pub fn state(&self) -> PipeState {
        self.0.inner.lock().state()
    }
}

impl Clone for ReadEnd {
    fn clone(&self) -> Self {
        self.0.inner.lock().read_refs += 1;
        ReadEnd(Pipe { inner: self.0.inner.clone() })
    }
}

impl Clone for WriteEnd {
    fn clone(&self) -> Self {
        self.0.inner.lock().write_refs += 1;
        WriteEnd(Pipe { inner: self.0.inner.clone() })
    }
}

impl Drop for ReadEnd {
    fn drop(&mut self) {
        self.0.inner.lock().read_refs -= 1;
    }
}

impl Drop for WriteEnd {
    fn drop(&mut self) {
        self.0.inner.lock().write_refs -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let (r, w) = create().unwrap();
        assert_eq!(w.write(b"hello").unwrap(), 5);
        let mut buf = [0u8; 16];
        assert_eq!(r.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
    }

    #[test]
    fn read_empty_open_pipe_is_eagain() {
        let (r, _w) = create().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(r.read(&mut buf), Err(Errno::Eagain));
    }

    #[test]
    fn read_empty_after_write_closed_is_eof() {
        let (r, w) = create().unwrap();
        drop(w);
        let mut buf = [0u8; 4];
        assert_eq!(r.read(&mut buf), Ok(0));
        assert_eq!(r.read(&mut buf), Ok(0));
    }

    #[test]
    fn write_after_read_closed_is_epipe() {
        let (r, w) = create().unwrap();
        drop(r);
        assert_eq!(w.write(b"x"), Err(Errno::Epipe));
    }

    #[test]
    fn fill_to_eagain_then_drain_wraps_correctly() {
        let (r, w) = create().unwrap();
        let chunk = [0xABu8; PIPE_BUF_SIZE];
        assert_eq!(w.write(&chunk).unwrap(), PIPE_BUF_SIZE);
        assert_eq!(w.write(&[1]), Err(Errno::Eagain));
        let mut out = [0u8; PIPE_BUF_SIZE];
        assert_eq!(r.read(&mut out).unwrap(), PIPE_BUF_SIZE);
        assert!(out.iter().all(|&b| b == 0xAB));
        // buffer empty again, write end still open -> EAGAIN not EOF
        let mut tiny = [0u8; 1];
        assert_eq!(r.read(&mut tiny), Err(Errno::Eagain));
    }

    #[test]
    fn wraparound_write_and_read_split_across_boundary() {
        let (r, w) = create().unwrap();
        // Advance read_pos/write_pos near the end of the buffer first.
        let filler = [0u8; PIPE_BUF_SIZE - 4];
        w.write(&filler).unwrap();
        let mut sink = [0u8; PIPE_BUF_SIZE - 4];
        r.read(&mut sink).unwrap();
        // Now write 10 bytes: 4 before wrap, 6 after.
        let data: [u8; 10] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        assert_eq!(w.write(&data).unwrap(), 10);
        let mut out = [0u8; 10];
        assert_eq!(r.read(&mut out).unwrap(), 10);
        assert_eq!(out, data);
    }
}
