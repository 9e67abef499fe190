// plic.rs
// Platform Level Interrupt Controller. Kept close to the teacher's
// plic.rs -- the SiFive PLIC wiring on QEMU virt doesn't change
// between this kernel and the teacher's -- retargeted at
// config::PLIC_ADDR and this kernel's block/uart drivers instead of
// virtio/uart directly.

use crate::config::PLIC_ADDR;
use crate::{block, uart};

const PLIC_PRIORITY: usize = PLIC_ADDR;
const PLIC_PENDING: usize = PLIC_ADDR + 0x1000;
const PLIC_INT_ENABLE: usize = PLIC_ADDR + 0x2000;
const PLIC_THRESHOLD: usize = PLIC_ADDR + 0x20_0000;
const PLIC_CLAIM: usize = PLIC_ADDR + 0x20_0004;

pub const IRQ_VIRTIO_BASE: u32 = 1;
pub const IRQ_VIRTIO_COUNT: u32 = 8;
pub const IRQ_UART: u32 = 10;

/// Claim the highest-priority pending interrupt, if any. Interrupt id
/// 0 is hardwired to "nothing pending".
pub fn next() -> Option<u32> {
    let claim_no = unsafe { (PLIC_CLAIM as *const u32).read_volatile() };
    if claim_no == 0 {
        None
    } else {
        Some(claim_no)
    }
}

/// Tell the PLIC a claimed interrupt has been handled, re-arming it.
pub fn complete(id: u32) {
    unsafe { (PLIC_CLAIM as *mut u32).write_volatile(id) }
}

/// Mask any interrupt at or below `tsh` (0 = allow all, 7 = mask all).
pub fn set_threshold(tsh: u8) {
    unsafe { (PLIC_THRESHOLD as *mut u32).write_volatile((tsh & 7) as u32) }
}

pub fn enable(id: u32) {
    let bit = 1u32 << id;
    unsafe {
        let reg = PLIC_INT_ENABLE as *mut u32;
        reg.write_volatile(reg.read_volatile() | bit);
    }
}

pub fn set_priority(id: u32, prio: u8) {
    unsafe { (PLIC_PRIORITY as *mut u32).add(id as usize).write_volatile((prio & 7) as u32) }
}

pub fn is_pending(id: u32) -> bool {
    let pend = unsafe { (PLIC_PENDING as *const u32).read_volatile() };
    pend & (1 << id) != 0
}

pub fn handle_interrupt() {
    if let Some(id) = next() {
        if (IRQ_VIRTIO_BASE..IRQ_VIRTIO_BASE + IRQ_VIRTIO_COUNT).contains(&id) {
            block::handle_interrupt(id);
        } else if id == IRQ_UART {
            uart::handle_interrupt();
        } else {
            log::warn!("unknown external interrupt: {}", id);
        }
        complete(id);
    }
}
