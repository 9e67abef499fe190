// virtio.rs
// VirtIO MMIO transport (spec 6: external collaborator, interface
// only). Register offsets, the descriptor/avail/used ring layout, and
// the device-init handshake are carried over from the teacher's
// virtio.rs; the queue itself is generalized to a single block-device
// slot array sized off config::VIRTIO_MMIO_SLOTS instead of the
// teacher's mixed net/gpu/input/entropy device table, since this
// kernel only drives a block device.

use crate::config::{VIRTIO_MMIO_BASE, VIRTIO_MMIO_SLOTS, VIRTIO_MMIO_STRIDE};

pub const VIRTIO_RING_SIZE: usize = 1 << 6;

pub const DESC_F_NEXT: u16 = 1;
pub const DESC_F_WRITE: u16 = 2;

#[repr(C)]
pub struct Descriptor {
    pub addr: u64,
    pub len: u32,
    pub flags: u16,
    pub next: u16,
}

#[repr(C)]
pub struct Available {
    pub flags: u16,
    pub idx: u16,
    pub ring: [u16; VIRTIO_RING_SIZE],
}

#[repr(C)]
pub struct UsedElem {
    pub id: u32,
    pub len: u32,
}

#[repr(C)]
pub struct Used {
    pub flags: u16,
    pub idx: u16,
    pub ring: [UsedElem; VIRTIO_RING_SIZE],
}

#[repr(C)]
pub struct Queue {
    pub desc: [Descriptor; VIRTIO_RING_SIZE],
    pub avail: Available,
    pub used: Used,
}

#[derive(Clone, Copy)]
pub enum MmioOffset {
    MagicValue = 0x000,
    Version = 0x004,
    DeviceId = 0x008,
    HostFeatures = 0x010,
    GuestFeatures = 0x020,
    QueueSel = 0x030,
    QueueNumMax = 0x034,
    QueueNum = 0x038,
    QueueAlign = 0x03c,
    QueuePfn = 0x040,
    QueueNotify = 0x050,
    InterruptStatus = 0x060,
    InterruptAck = 0x064,
    Status = 0x070,
}

impl MmioOffset {
    fn scale32(self) -> isize {
        (self as usize / 4) as isize
    }
}

pub const STATUS_ACKNOWLEDGE: u32 = 1;
pub const STATUS_DRIVER: u32 = 2;
pub const STATUS_DRIVER_OK: u32 = 4;
pub const STATUS_FEATURES_OK: u32 = 8;

pub const MAGIC: u32 = 0x7472_6976;
pub const DEVICE_ID_BLOCK: u32 = 2;

unsafe fn reg(base: *mut u32, off: MmioOffset) -> *mut u32 {
    base.offset(off.scale32())
}

/// Negotiates features and hands the queue's physical page number to
/// the device. Matches the five-step sequence in the VirtIO 1.0 spec
/// the teacher's setup_block_device follows; the guest feature mask
/// here just clears RO/UNUSED bits since this kernel doesn't negotiate
/// indirect descriptors or event indices.
pub unsafe fn init_queue(base: *mut u32, queue: *mut Queue, queue_pfn: u32) -> bool {
    let magic = reg(base, MmioOffset::MagicValue).read_volatile();
    let device_id = reg(base, MmioOffset::DeviceId).read_volatile();
    if magic != MAGIC || device_id != DEVICE_ID_BLOCK {
        return false;
    }

    reg(base, MmioOffset::Status).write_volatile(0);
    let mut status = STATUS_ACKNOWLEDGE;
    reg(base, MmioOffset::Status).write_volatile(status);
    status |= STATUS_DRIVER;
    reg(base, MmioOffset::Status).write_volatile(status);

    let host_features = reg(base, MmioOffset::HostFeatures).read_volatile();
    reg(base, MmioOffset::GuestFeatures).write_volatile(host_features);
    status |= STATUS_FEATURES_OK;
    reg(base, MmioOffset::Status).write_volatile(status);
    if reg(base, MmioOffset::Status).read_volatile() & STATUS_FEATURES_OK == 0 {
        return false;
    }

    reg(base, MmioOffset::QueueSel).write_volatile(0);
    let max = reg(base, MmioOffset::QueueNumMax).read_volatile();
    if max == 0 || (max as usize) < VIRTIO_RING_SIZE {
        return false;
    }
    reg(base, MmioOffset::QueueNum).write_volatile(VIRTIO_RING_SIZE as u32);
    reg(base, MmioOffset::QueueAlign).write_volatile(crate::config::PAGE_SIZE as u32);
    reg(base, MmioOffset::QueuePfn).write_volatile(queue_pfn);
    // avail.idx/used.idx must start at 0 so the driver and device agree
    // on an empty ring; the caller hands us freshly allocated frames,
    // whose contents are otherwise unspecified.
    core::ptr::write_bytes(queue, 0, 1);

    status |= STATUS_DRIVER_OK;
    reg(base, MmioOffset::Status).write_volatile(status);
    true
}

pub unsafe fn notify(base: *mut u32, queue_idx: u32) {
    reg(base, MmioOffset::QueueNotify).write_volatile(queue_idx);
}

pub unsafe fn ack_interrupt(base: *mut u32) {
    let bits = reg(base, MmioOffset::InterruptStatus).read_volatile();
    reg(base, MmioOffset::InterruptAck).write_volatile(bits);
}

/// Scans the fixed MMIO window (spec 6) for a block device and
/// returns its slot index, if any. A `const`-sized slot table mirrors
/// the teacher's probe() loop over MMIO_VIRTIO_START..=END.
pub fn probe_block_device() -> Option<usize> {
    for slot in 0..VIRTIO_MMIO_SLOTS {
        let base = (VIRTIO_MMIO_BASE + slot * VIRTIO_MMIO_STRIDE) as *mut u32;
        let (magic, device_id) = unsafe { (reg(base, MmioOffset::MagicValue).read_volatile(), reg(base, MmioOffset::DeviceId).read_volatile()) };
        if magic == MAGIC && device_id == DEVICE_ID_BLOCK {
            return Some(slot);
        }
    }
    None
}

pub fn slot_base(slot: usize) -> *mut u32 {
    (VIRTIO_MMIO_BASE + slot * VIRTIO_MMIO_STRIDE) as *mut u32
}
