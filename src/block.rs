// block.rs
// Synchronous VirtIO block I/O. The teacher's block.rs drives an
// interrupt-completed request queue with a process "watcher" woken by
// PID once the device signals used; this kernel's ext2 adapter only
// ever needs one request in flight at a time; so requests are
// submitted and then polled to completion inline rather than parking
// the caller, and `handle_interrupt` just acks the device -- the poll
// loop in `submit` is what actually observes completion.
//
// Host builds (cfg(test)) swap the VirtIO transport for an in-memory
// RAM disk so the ext2 adapter above this module gets exercised by
// `cargo test` without touching real MMIO, matching the rest of the
// kernel's host-testability gating.

use crate::errno::Errno;

pub const SECTOR_SIZE: usize = 512;

#[cfg(target_arch = "riscv64")]
mod hw {
    use super::SECTOR_SIZE;
    use crate::config::PAGE_SIZE;
    use crate::errno::Errno;
    use crate::pmm;
    use crate::virtio::{self, Descriptor, Queue, DESC_F_NEXT, DESC_F_WRITE, VIRTIO_RING_SIZE};
    use core::mem::size_of;
    use spin::Mutex;

    const VIRTIO_BLK_T_IN: u32 = 0;
    const VIRTIO_BLK_T_OUT: u32 = 1;
    const VIRTIO_BLK_S_OK: u8 = 0;

    /// Wire layout of a virtio-blk request header (VirtIO 1.0 §5.2.6),
    /// matching the teacher's block.rs `Header`.
    #[repr(C)]
    struct Header {
        blktype: u32,
        reserved: u32,
        sector: u64,
    }

    #[repr(C)]
    struct Status {
        status: u8,
    }

    /// Header and status share one allocation, like the teacher's
    /// `Request` struct, so a descriptor can point straight at each
    /// field's address. The data descriptor points at the caller's
    /// own sector buffer instead of a third field here.
    #[repr(C)]
    struct Request {
        header: Header,
        status: Status,
    }

    struct Device {
        slot: usize,
        queue: *mut Queue,
        idx: u16,
        ack_used_idx: u16,
    }

    // `*mut Queue` points at a frame this driver owns exclusively and
    // only ever touches behind DEVICE's lock.
    unsafe impl Send for Device {}

    static DEVICE: Mutex<Option<Device>> = Mutex::new(None);

    pub fn probe() {
        let Some(slot) = virtio::probe_block_device() else { return };
        let base = virtio::slot_base(slot);
        let pages = (size_of::<Queue>() + PAGE_SIZE - 1) / PAGE_SIZE;
        let Some(queue_pa) = pmm::alloc_frames(pages) else {
            log::warn!("virtio-blk: out of memory for queue");
            return;
        };
        let queue = queue_pa as *mut Queue;
        let queue_pfn = (queue_pa / PAGE_SIZE) as u32;
        let ok = unsafe { virtio::init_queue(base, queue, queue_pfn) };
        if ok {
            *DEVICE.lock() = Some(Device { slot, queue, idx: 0, ack_used_idx: 0 });
        } else {
            pmm::free_frames(queue_pa, pages);
        }
    }

    /// Chains `desc` onto the ring at the next slot, mirroring the
    /// teacher's `fill_next_descriptor` (block.rs): the index advances
    /// before the write so slot 0 is never handed out as a head, and a
    /// descriptor carrying `DESC_F_NEXT` gets its `next` pointed at the
    /// slot that will be filled right after it.
    fn fill_next_descriptor(dev: &mut Device, desc: Descriptor) -> u16 {
        dev.idx = (dev.idx + 1) % VIRTIO_RING_SIZE as u16;
        let idx = dev.idx;
        unsafe {
            (*dev.queue).desc[idx as usize] = desc;
            if (*dev.queue).desc[idx as usize].flags & DESC_F_NEXT != 0 {
                (*dev.queue).desc[idx as usize].next = (idx + 1) % VIRTIO_RING_SIZE as u16;
            }
        }
        idx
    }

    /// Builds the header/data/status descriptor chain for one sector,
    /// submits it, and busy-polls the used ring to completion -- this
    /// kernel's ext2 adapter never has more than one block request in
    /// flight, so there's no watcher process to park (spec 6).
    fn submit(sector: u64, buf: &mut [u8; SECTOR_SIZE], write: bool) -> Result<(), Errno> {
        let mut guard = DEVICE.lock();
        let Some(dev) = guard.as_mut() else { return Err(Errno::EfsNotmnt) };
        let base = virtio::slot_base(dev.slot);

        let req_pa = pmm::alloc_frame().ok_or(Errno::EfsNoblk)?;
        let req = req_pa as *mut Request;
        unsafe {
            (*req).header = Header { blktype: if write { VIRTIO_BLK_T_OUT } else { VIRTIO_BLK_T_IN }, reserved: 0, sector };
            (*req).status = Status { status: 111 };
        }

        let header_desc = Descriptor { addr: req_pa as u64, len: size_of::<Header>() as u32, flags: DESC_F_NEXT, next: 0 };
        let head_idx = fill_next_descriptor(dev, header_desc);

        let data_desc =
            Descriptor { addr: buf.as_mut_ptr() as u64, len: SECTOR_SIZE as u32, flags: DESC_F_NEXT | if !write { DESC_F_WRITE } else { 0 }, next: 0 };
        fill_next_descriptor(dev, data_desc);

        let status_addr = unsafe { &(*req).status as *const Status as u64 };
        let status_desc = Descriptor { addr: status_addr, len: size_of::<Status>() as u32, flags: DESC_F_WRITE, next: 0 };
        fill_next_descriptor(dev, status_desc);

        unsafe {
            let avail_idx = (*dev.queue).avail.idx;
            (*dev.queue).avail.ring[avail_idx as usize % VIRTIO_RING_SIZE] = head_idx;
            core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
            (*dev.queue).avail.idx = avail_idx.wrapping_add(1);
            virtio::notify(base, 0);
        }

        let mut spins: u64 = 0;
        while unsafe { core::ptr::read_volatile(&(*dev.queue).used.idx) } == dev.ack_used_idx {
            spins += 1;
            if spins > 100_000_000 {
                pmm::free_frame(req_pa);
                return Err(Errno::EfsBadblk);
            }
            core::hint::spin_loop();
        }
        dev.ack_used_idx = dev.ack_used_idx.wrapping_add(1);
        unsafe { virtio::ack_interrupt(base) };

        let status = unsafe { (*req).status.status };
        pmm::free_frame(req_pa);
        if status == VIRTIO_BLK_S_OK {
            Ok(())
        } else {
            Err(Errno::EfsBadblk)
        }
    }

    pub fn read_sector(sector: u64, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), Errno> {
        submit(sector, buf, false)
    }

    pub fn write_sector(sector: u64, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), Errno> {
        submit(sector, buf, true)
    }

    pub fn handle_interrupt() {
        if let Some(dev) = DEVICE.lock().as_ref() {
            unsafe { virtio::ack_interrupt(virtio::slot_base(dev.slot)) };
        }
    }

    pub fn is_mounted() -> bool {
        DEVICE.lock().is_some()
    }
}

#[cfg(not(target_arch = "riscv64"))]
mod hw {
    use super::SECTOR_SIZE;
    use crate::errno::Errno;
    use alloc::vec::Vec;
    use spin::Mutex;

    const DISK_SECTORS: usize = 4096; // 2 MiB RAM disk, plenty for host tests

    static DISK: Mutex<Option<Vec<u8>>> = Mutex::new(None);

    pub fn probe() {
        *DISK.lock() = Some(alloc::vec![0u8; DISK_SECTORS * SECTOR_SIZE]);
    }

    pub fn read_sector(sector: u64, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), Errno> {
        let disk = DISK.lock();
        let Some(disk) = disk.as_ref() else { return Err(Errno::EfsNotmnt) };
        let off = sector as usize * SECTOR_SIZE;
        if off + SECTOR_SIZE > disk.len() {
            return Err(Errno::EfsBadblk);
        }
        buf.copy_from_slice(&disk[off..off + SECTOR_SIZE]);
        Ok(())
    }

    pub fn write_sector(sector: u64, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), Errno> {
        let mut disk = DISK.lock();
        let Some(disk) = disk.as_mut() else { return Err(Errno::EfsNotmnt) };
        let off = sector as usize * SECTOR_SIZE;
        if off + SECTOR_SIZE > disk.len() {
            return Err(Errno::EfsBadblk);
        }
        disk[off..off + SECTOR_SIZE].copy_from_slice(buf);
        Ok(())
    }

    pub fn handle_interrupt() {}

    pub fn is_mounted() -> bool {
        DISK.lock().is_some()
    }

    #[cfg(test)]
    pub fn reset() {
        *DISK.lock() = None;
    }
}

pub fn probe() {
    hw::probe();
}

pub fn read_sector(sector: u64, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), Errno> {
    hw::read_sector(sector, buf)
}

pub fn write_sector(sector: u64, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), Errno> {
    hw::write_sector(sector, buf)
}

pub fn handle_interrupt(_irq: u32) {
    hw::handle_interrupt();
}

pub fn is_mounted() -> bool {
    hw::is_mounted()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips_through_ram_disk() {
        probe();
        let mut out = [0xABu8; SECTOR_SIZE];
        write_sector(3, &mut out).unwrap();
        let mut back = [0u8; SECTOR_SIZE];
        read_sector(3, &mut back).unwrap();
        assert_eq!(back, out);
    }

    #[test]
    fn unmounted_read_is_efsnotmnt() {
        hw::reset();
        let mut buf = [0u8; SECTOR_SIZE];
        assert_eq!(read_sector(0, &mut buf), Err(Errno::EfsNotmnt));
    }
}
