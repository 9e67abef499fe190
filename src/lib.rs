// lib.rs
// Crate root. Split from main.rs (spec 9) purely so `cargo test --lib`
// can exercise every module on the host: main.rs's own content --
// `global_asm!`'d RISC-V -- can't compile for anything but riscv64, so
// everything that can be target-agnostic lives here and main.rs is
// left as the thin no_mangle shim the linker needs for `kinit` and the
// panic/allocator hooks to end up in the final riscv64 binary.
#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), feature(alloc_error_handler))]

extern crate alloc;

pub mod assembly;
pub mod block;
pub mod clint;
pub mod config;
pub mod cpu;
pub mod elf;
pub mod errno;
pub mod fd;
pub mod fs;
pub mod initprog;
pub mod kheap;
pub mod pipe;
pub mod plic;
pub mod pmm;
pub mod proc;
pub mod rvasm;
pub mod sched;
pub mod signal;
pub mod syscall;
#[cfg(any(test, target_arch = "riscv64"))]
pub mod test;
pub mod testdev;
pub mod trap;
pub mod uart;
pub mod uname;
pub mod virtio;
pub mod vm;

use config::{CLINT_ADDR, PLIC_ADDR, RAM_SIZE, RAM_START, SIGRETURN_TRAMPOLINE_VA, TEST_DEVICE_ADDR, UART_ADDR, VIRTIO_MMIO_BASE, VIRTIO_MMIO_SLOTS, VIRTIO_MMIO_STRIDE};
use vm::{PteFlags, Table};

#[cfg(target_arch = "riscv64")]
extern "C" {
    static _kernel_start: u8;
    static _kernel_end: u8;
}

#[cfg(not(target_arch = "riscv64"))]
static _kernel_start: u8 = 0;
#[cfg(not(target_arch = "riscv64"))]
static _kernel_end: u8 = 0;

/// Builds the kernel's own page table root: identity-mapped kernel
/// image plus every MMIO window this kernel drives (spec 4.A/9). Every
/// process root's indices 2-511 are a pointer-copy of this table
/// (vm::create_user_root), so anything missing here is invisible to
/// user processes too -- including the trap path itself mid-switch.
fn build_kernel_root() -> *mut Table {
    let pa = pmm::alloc_frame().expect("kernel root frame");
    let root = unsafe { &mut *(pa as *mut Table) };

    let kstart = unsafe { &_kernel_start as *const u8 as usize };
    let kend = unsafe { &_kernel_end as *const u8 as usize };
    vm::id_map_range(root, kstart, core::cmp::max(kend, kstart + config::PAGE_SIZE), PteFlags::R | PteFlags::W | PteFlags::X);

    vm::id_map_range(root, UART_ADDR, UART_ADDR + 0x1000, PteFlags::R | PteFlags::W);
    vm::id_map_range(root, CLINT_ADDR, CLINT_ADDR + 0x10000, PteFlags::R | PteFlags::W);
    vm::id_map_range(root, PLIC_ADDR, PLIC_ADDR + 0x40_0000, PteFlags::R | PteFlags::W);
    vm::id_map_range(root, TEST_DEVICE_ADDR, TEST_DEVICE_ADDR + 0x1000, PteFlags::R | PteFlags::W);
    vm::id_map_range(
        root,
        VIRTIO_MMIO_BASE,
        VIRTIO_MMIO_BASE + VIRTIO_MMIO_SLOTS * VIRTIO_MMIO_STRIDE,
        PteFlags::R | PteFlags::W,
    );

    root as *mut Table
}

/// Reached from assembly.rs's `_start` in S-mode with a scratch stack
/// and zeroed BSS; never returns. `#[no_mangle]` so the symbol exists
/// regardless of whether anything in main.rs references this crate by
/// name -- `_start`'s `la t0, kinit` needs it to survive dead-code
/// elimination on its own.
#[no_mangle]
pub extern "C" fn kinit() -> ! {
    let mut early_uart = uart::Uart::new(UART_ADDR);
    early_uart.init();
    uart::init_logger();
    crate::println!("booting: rv64gc/sv39, {} MiB ram at 0x{:x}", RAM_SIZE / (1024 * 1024), RAM_START);

    let kstart = unsafe { &_kernel_start as *const u8 as usize };
    let kend = unsafe { &_kernel_end as *const u8 as usize };
    pmm::init(RAM_SIZE, kstart, core::cmp::max(kend, kstart + config::PAGE_SIZE));

    let kernel_root = build_kernel_root();
    vm::activate(kernel_root);

    cpu::csr::stvec_write(assembly::trap_vector as usize);
    cpu::csr::sie_write(cpu::SIE_SSIE | cpu::SIE_STIE | cpu::SIE_SEIE);

    plic::set_threshold(0);
    plic::enable(plic::IRQ_UART);
    for irq in plic::IRQ_VIRTIO_BASE..plic::IRQ_VIRTIO_BASE + plic::IRQ_VIRTIO_COUNT {
        plic::enable(irq);
    }

    block::probe();
    if block::is_mounted() {
        log::info!("block device mounted");
    } else {
        log::warn!("no block device found, filesystem syscalls will fail");
    }

    // pid 0 is a real U-mode process under this kernel's Sv39 split,
    // so it needs real mapped, executable code -- the hand-assembled
    // fork/execve(INIT_PROGRAM_PATH)/waitpid(-1,...) loop from
    // initprog.rs, not a bare sepc value pointing at nothing.
    let init_code = initprog::program(config::INIT_PROGRAM_PATH);
    proc::init(kernel_root, &init_code, SIGRETURN_TRAMPOLINE_VA);

    #[cfg(feature = "qemu-selftest")]
    test::run_self_tests();

    clint::schedule_next_tick();

    let first = sched::schedule();
    if first == 0 {
        panic!("no runnable process at boot");
    }
    unsafe { assembly::switch_to_user(first as *const cpu::TrapFrame) }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    log::error!("kernel panic: {}", info);
    testdev::exit_failure(0xffff);
}
