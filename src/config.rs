// config.rs
// Kernel-wide tunables and the architectural memory map.
// Centralized the way the teacher keeps magic numbers local to the
// module that cares about them (cpu::FREQ, process::STACK_PAGES) --
// here they're collected once because several subsystems share them.

/// Page size in bytes. Every frame, leaf mapping, and KHEAP run is
/// measured in units of this.
pub const PAGE_SIZE: usize = 4096;

/// Physical RAM window on the QEMU `virt` machine.
pub const RAM_START: usize = 0x8000_0000;
pub const RAM_SIZE: usize = 128 * 1024 * 1024;
pub const RAM_END: usize = RAM_START + RAM_SIZE;

/// Kernel/user split: Sv39 top-level indices 0-1 are user, 2-511 are
/// kernel. KERNEL_VIRT_BASE is the first address a user pointer may
/// never reach into.
pub const KERNEL_VIRT_BASE: usize = 0x8000_0000;

/// User-space layout.
pub const USER_CODE_BASE: usize = 0x0040_0000;
pub const USER_HEAP_BASE: usize = 0x1000_0000;
pub const USER_MMAP_BASE: usize = 0x4000_0000;
pub const USER_STACK_TOP: usize = 0x7FFF_F000;
pub const USER_STACK_SIZE: usize = PAGE_SIZE * 256; // 1 MiB
pub const HEAP_STACK_GAP_MIN: usize = 1024 * 1024;

/// MMIO devices that must be identity-mapped and reachable from every
/// page table root, kernel or user.
pub const TEST_DEVICE_ADDR: usize = 0x0010_0000;
pub const UART_ADDR: usize = 0x1000_0000;
pub const CLINT_ADDR: usize = 0x0200_0000;
pub const PLIC_ADDR: usize = 0x0C00_0000;
pub const VIRTIO_MMIO_BASE: usize = 0x1000_1000;
pub const VIRTIO_MMIO_STRIDE: usize = 0x1000;
pub const VIRTIO_MMIO_SLOTS: usize = 8;

/// Scheduling.
pub const MAX_PROCS: usize = 64;
pub const TIMESLICE_TICKS: u32 = 10;
pub const KERNEL_STACK_PAGES: usize = 4;

/// Validation limits (spec 4.E).
pub const MAX_PATH: usize = 4096;
pub const MAX_ARGC: usize = 256;
pub const MAX_OPEN_FILES: usize = 64;

/// Pipe buffer size (spec 4.H / §3).
pub const PIPE_BUF_SIZE: usize = 4096;

/// Signal numbers run 1..=64 (spec 4.G).
pub const NSIG: usize = 64;

/// Fixed virtual address, identical across every process, where the
/// sigreturn trampoline (assembly::SIGRETURN_TRAMPOLINE_CODE) is
/// mapped U|R|X (spec 4.G). Below USER_CODE_BASE so a normal ELF's
/// own segments never collide with it.
pub const SIGRETURN_TRAMPOLINE_VA: usize = 0x0000_3000;

/// Path pid 0's built-in init program (`initprog.rs`) execve()s on
/// boot, baked into the initrd-style ext2 image (SPEC_FULL §2).
pub const INIT_PROGRAM_PATH: &str = "/sbin/init";
