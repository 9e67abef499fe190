// proc.rs
// Process control blocks and the lifecycle operations (fork/exec/
// exit/wait) that act on them. The teacher's process.rs owns this
// territory already -- PCB struct, a global process table behind a
// lock, per-pid lookup helpers -- but it grows a VecDeque on demand
// and never reaps. Spec 3 calls for a fixed-size table with an
// explicit UNUSED state, matching the xv6-style array-of-slots model
// instead; the PCB fields, VMA list, and fork/exit mechanics below
// are grounded on the teacher's Process/new_default/Drop for the
// page-table and stack ownership half, and on the spec's exact
// fork/exit contracts (4.F) for the rest.

use crate::config::{
    KERNEL_STACK_PAGES, MAX_OPEN_FILES, MAX_PROCS, PAGE_SIZE, SIGRETURN_TRAMPOLINE_VA, USER_STACK_SIZE, USER_STACK_TOP,
};
use crate::cpu::TrapFrame;
use crate::errno::Errno;
use crate::fd::FileDescriptor;
use crate::pmm;
use crate::signal::SignalState;
use crate::vm::{self, PteFlags, Table};
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::Mutex;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProcState {
    Unused,
    Embryo,
    Ready,
    Running,
    Sleeping,
    Stopped,
    Zombie,
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct VmaFlags: u32 {
        const R = 1 << 0;
        const W = 1 << 1;
        const X = 1 << 2;
        const U = 1 << 3;
        const SHARED = 1 << 4;
        const GROWSDOWN = 1 << 5;
    }
}

#[derive(Clone)]
pub struct Vma {
    pub start: usize,
    pub end: usize,
    pub flags: VmaFlags,
}

impl Vma {
    pub fn contains(&self, ptr: usize, len: usize) -> bool {
        ptr >= self.start && ptr.saturating_add(len) <= self.end
    }
}

/// Callee-saved registers plus the return address and stack pointer,
/// the only state a voluntary context switch needs to preserve (spec
/// 4.F): the trap-entry path already saved the caller-saved set.
#[derive(Clone, Copy, Default)]
#[repr(C)]
pub struct Context {
    pub ra: usize,
    pub sp: usize,
    pub s: [usize; 12],
}

pub struct ExitStatus {
    pub normal_code: u8,
    pub signal: Option<u8>,
}

impl ExitStatus {
    /// Packs into the classic wait(2) status word: low byte nonzero
    /// and distinguishable as "terminated by signal N" versus
    /// "exited with code N" in the next byte up (spec 7).
    pub fn pack(&self) -> u32 {
        match self.signal {
            Some(sig) => sig as u32 & 0x7f,
            None => (self.normal_code as u32) << 8,
        }
    }
}

pub struct Pcb {
    pub pid: usize,
    pub ppid: usize,
    pub state: ProcState,
    pub name: String,
    pub root: *mut Table,
    pub vmas: Vec<Vma>,
    pub heap_start: usize,
    pub heap_end: usize,
    pub kernel_stack: usize,
    pub context: Context,
    pub trap_frame: *mut TrapFrame,
    pub cwd: String,
    pub tty: usize,
    pub exit_status: Option<ExitStatus>,
    pub sig: SignalState,
    pub sigreturn_trampoline: usize,
    pub fds: [Option<FileDescriptor>; MAX_OPEN_FILES],
    pub ticks_left: u32,
    /// Set by the syscall dispatcher on every `a0 == -1` result; read
    /// back by the dedicated errno syscall (spec 4.E).
    pub last_errno: i32,
}

// Single-hart kernel: every Pcb lives behind the PROCS mutex and is
// only ever touched with interrupts masked, so the raw pointers it
// carries (root, trap_frame) never alias across a context switch.
unsafe impl Send for Pcb {}

impl Pcb {
    const fn unused() -> Self {
        Pcb {
            pid: 0,
            ppid: 0,
            state: ProcState::Unused,
            name: String::new(),
            root: core::ptr::null_mut(),
            vmas: Vec::new(),
            heap_start: 0,
            heap_end: 0,
            kernel_stack: 0,
            context: Context { ra: 0, sp: 0, s: [0; 12] },
            trap_frame: core::ptr::null_mut(),
            cwd: String::new(),
            tty: 0,
            exit_status: None,
            sig: SignalState::new(),
            sigreturn_trampoline: 0,
            fds: [const { None }; MAX_OPEN_FILES],
            ticks_left: 0,
            last_errno: 0,
        }
    }
}

lazy_static::lazy_static! {
    static ref PROCS: Mutex<Vec<Pcb>> = Mutex::new((0..MAX_PROCS).map(|_| Pcb::unused()).collect());
    static ref KERNEL_ROOT: Mutex<usize> = Mutex::new(0);
}

static NEXT_PID: AtomicUsize = AtomicUsize::new(0);
static CURRENT_PID: AtomicUsize = AtomicUsize::new(usize::MAX);

pub fn set_kernel_root(root: *mut Table) {
    *KERNEL_ROOT.lock() = root as usize;
}

fn kernel_root_ptr() -> *mut Table {
    *KERNEL_ROOT.lock() as *mut Table
}

pub fn current_pid() -> usize {
    CURRENT_PID.load(Ordering::Relaxed)
}

pub fn set_current_pid(pid: usize) {
    CURRENT_PID.store(pid, Ordering::Relaxed);
}

/// Runs `f` against the PCB for `pid`, if a slot with that pid is
/// live. Returns None if no such process exists.
pub fn with_pcb<R>(pid: usize, f: impl FnOnce(&mut Pcb) -> R) -> Option<R> {
    let mut procs = PROCS.lock();
    procs.iter_mut().find(|p| p.pid == pid && p.state != ProcState::Unused).map(f)
}

fn alloc_slot(procs: &mut Vec<Pcb>) -> Option<usize> {
    procs.iter().position(|p| p.state == ProcState::Unused)
}

/// The init process (pid 0) never exits and is created exactly once
/// at boot (spec 3 invariant). `code` is pid 0's actual machine code
/// (spec 8 Pending: `initprog::program`) -- a real Sv39 process needs
/// a real mapped, executable page at its entry point, not just a bare
/// `sepc` value, so this maps one into the fresh root the same way
/// `spawn_raw` does for the self-test harness.
pub fn init(kernel_root: *mut Table, code: &[u8], sigreturn_trampoline: usize) {
    set_kernel_root(kernel_root);
    let mut procs = PROCS.lock();
    let idx = 0;
    let root = vm::create_user_root(unsafe { &*kernel_root }).expect("create init root");
    map_sigreturn_trampoline(root);
    let vmas = map_program(root, code).expect("map init program");
    let entry = crate::config::USER_CODE_BASE;

    let (kstack, frame) = alloc_kernel_stack();
    unsafe {
        (*frame) = TrapFrame::zero();
        (*frame).sepc = entry;
        (*frame).pid = 0;
        use crate::cpu::Registers;
        (*frame).set_reg(Registers::Sp, USER_STACK_TOP & !0xf);
    }
    procs[idx] = Pcb {
        pid: 0,
        ppid: 0,
        state: ProcState::Ready,
        name: String::from("init"),
        root,
        vmas,
        heap_start: entry + PAGE_SIZE,
        heap_end: entry + PAGE_SIZE,
        kernel_stack: kstack,
        context: Context::default(),
        trap_frame: frame,
        cwd: String::from("/"),
        tty: 0,
        exit_status: None,
        sig: SignalState::new(),
        sigreturn_trampoline,
        fds: [const { None }; MAX_OPEN_FILES],
        ticks_left: crate::config::TIMESLICE_TICKS,
        last_errno: 0,
    };
    procs[idx].fds[0] = Some(FileDescriptor::tty(Default::default()));
    procs[idx].fds[1] = Some(FileDescriptor::tty(Default::default()));
    procs[idx].fds[2] = Some(FileDescriptor::tty(Default::default()));
    NEXT_PID.store(1, Ordering::Relaxed);
    drop(procs);
    crate::sched::enqueue(0);
}

/// Maps one RWX code page at `config::USER_CODE_BASE` plus the
/// standard user stack into `root`. Shared by `init` (pid 0's built-in
/// init program) and `spawn_raw` (the self-test harness's hand-
/// assembled scenarios) -- both just need a single fixed code page
/// under real Sv39 isolation, never a parsed multi-segment ELF.
fn map_program(root: *mut Table, code: &[u8]) -> Result<Vec<Vma>, Errno> {
    if code.len() > PAGE_SIZE {
        return Err(Errno::Einval);
    }
    let entry = crate::config::USER_CODE_BASE;
    let code_pa = pmm::alloc_frame().ok_or(Errno::Enomem)?;
    unsafe {
        core::ptr::write_bytes(code_pa as *mut u8, 0, PAGE_SIZE);
        core::ptr::copy_nonoverlapping(code.as_ptr(), code_pa as *mut u8, code.len());
    }
    vm::map(unsafe { &mut *root }, entry, code_pa, PteFlags::U | PteFlags::R | PteFlags::W | PteFlags::X).map_err(|_| Errno::Enomem)?;

    let mut vmas = alloc::vec![Vma { start: entry, end: entry + PAGE_SIZE, flags: VmaFlags::R | VmaFlags::W | VmaFlags::X | VmaFlags::U }];

    let stack_base = USER_STACK_TOP - USER_STACK_SIZE;
    for off in (0..USER_STACK_SIZE).step_by(PAGE_SIZE) {
        let pa = pmm::alloc_frame().ok_or(Errno::Enomem)?;
        vm::map(unsafe { &mut *root }, stack_base + off, pa, PteFlags::U | PteFlags::R | PteFlags::W).map_err(|_| Errno::Enomem)?;
    }
    vmas.push(Vma { start: stack_base, end: USER_STACK_TOP, flags: VmaFlags::R | VmaFlags::W | VmaFlags::U | VmaFlags::GROWSDOWN });
    Ok(vmas)
}

/// Allocates a process's kernel stack with its persistent trap frame
/// carved out of the top 272 bytes (spec 4.D/9: the assembly trap
/// vector derives `sscratch`'s user-mode value as `trap_frame + 272`
/// for every process alike, so this placement has to be uniform --
/// see asm.rs). The remaining bytes below the frame are the real
/// stack space the dispatcher runs on once it's saved the interrupted
/// registers into the frame.
fn alloc_kernel_stack() -> (usize, *mut TrapFrame) {
    let base = pmm::alloc_frames(KERNEL_STACK_PAGES).expect("kernel stack frames");
    let top = base + KERNEL_STACK_PAGES * PAGE_SIZE;
    let frame = (top - core::mem::size_of::<TrapFrame>()) as *mut TrapFrame;
    (base, frame)
}

lazy_static::lazy_static! {
    /// The one physical frame backing every process's sigreturn
    /// trampoline mapping, filled in from assembly.rs's linked bytes
    /// the first time any process needs it.
    static ref TRAMPOLINE_FRAME: Mutex<Option<usize>> = Mutex::new(None);
}

fn trampoline_frame() -> usize {
    let mut slot = TRAMPOLINE_FRAME.lock();
    if let Some(pa) = *slot {
        return pa;
    }
    let pa = pmm::alloc_frame().expect("trampoline frame");
    let code = crate::assembly::sigreturn_trampoline_code();
    unsafe { core::ptr::copy_nonoverlapping(code.as_ptr(), pa as *mut u8, code.len()) };
    *slot = Some(pa);
    pa
}

/// Maps the shared sigreturn trampoline page U|R|X into `root` at
/// SIGRETURN_TRAMPOLINE_VA (spec 4.G). Every user root gets this done
/// once at creation; the page is never part of a process's VMA list
/// since nothing but `ra` ever points at it.
fn map_sigreturn_trampoline(root: *mut Table) {
    let pa = trampoline_frame();
    let _ = vm::map(unsafe { &mut *root }, SIGRETURN_TRAMPOLINE_VA, pa, PteFlags::U | PteFlags::R | PteFlags::X);
}

/// Deep-copies every VMA's backing frames into the child's user
/// address space (spec 4.F: fork duplicates by copy, not
/// copy-on-write -- see the Open Question in DESIGN.md).
fn copy_vmas(parent_root: *mut Table, child_root: *mut Table, vmas: &[Vma]) -> Result<Vec<Vma>, Errno> {
    let mut out = Vec::with_capacity(vmas.len());
    for vma in vmas {
        let mut addr = vma.start;
        while addr < vma.end {
            let parent_pa = vm::translate(unsafe { &*parent_root }, addr).map_err(|_| Errno::Enomem)?;
            let child_pa = pmm::alloc_frame().ok_or(Errno::Enomem)?;
            unsafe {
                core::ptr::copy_nonoverlapping(parent_pa as *const u8, child_pa as *mut u8, PAGE_SIZE);
            }
            let flags = vma_to_pte_flags(vma.flags);
            vm::map(unsafe { &mut *child_root }, addr, child_pa, flags).map_err(|_| Errno::Enomem)?;
            addr += PAGE_SIZE;
        }
        out.push(vma.clone());
    }
    Ok(out)
}

fn vma_to_pte_flags(flags: VmaFlags) -> PteFlags {
    let mut pte = PteFlags::U;
    if flags.contains(VmaFlags::R) {
        pte |= PteFlags::R;
    }
    if flags.contains(VmaFlags::W) {
        pte |= PteFlags::W;
    }
    if flags.contains(VmaFlags::X) {
        pte |= PteFlags::X;
    }
    pte
}

/// fork(): duplicates the calling process per spec 4.F. Returns the
/// child pid to the parent's caller; the child's own a0=0 is baked
/// into its copied trap frame, observed whenever it's first
/// scheduled.
pub fn fork() -> Result<usize, Errno> {
    let parent_pid = current_pid();
    let mut procs = PROCS.lock();
    let child_idx = alloc_slot(&mut procs).ok_or(Errno::Enomem)?;
    let child_pid = NEXT_PID.fetch_add(1, Ordering::Relaxed);

    let parent_idx = procs.iter().position(|p| p.pid == parent_pid).ok_or(Errno::Einval)?;

    let child_root = vm::create_user_root(unsafe { &*kernel_root_ptr() }).map_err(|_| Errno::Enomem)?;
    map_sigreturn_trampoline(child_root);
    let child_vmas = {
        let parent = &procs[parent_idx];
        copy_vmas(parent.root, child_root, &parent.vmas)?
    };

    let (child_kstack, child_frame) = alloc_kernel_stack();
    unsafe {
        *child_frame = *procs[parent_idx].trap_frame;
        use crate::cpu::Registers;
        (*child_frame).set_reg(Registers::A0, 0);
        (*child_frame).sepc += 4;
        (*child_frame).pid = child_pid;
    }

    let parent = &procs[parent_idx];
    let mut child_sig = SignalState::new();
    for signo in 1..=crate::config::NSIG {
        let _ = child_sig.set_handler(signo, parent.sig.handler(signo));
    }
    let child = Pcb {
        pid: child_pid,
        ppid: parent_pid,
        state: ProcState::Ready,
        name: parent.name.clone(),
        root: child_root,
        vmas: child_vmas,
        heap_start: parent.heap_start,
        heap_end: parent.heap_end,
        kernel_stack: child_kstack,
        context: Context::default(),
        trap_frame: child_frame,
        cwd: parent.cwd.clone(),
        tty: parent.tty,
        exit_status: None,
        sig: child_sig,
        sigreturn_trampoline: parent.sigreturn_trampoline,
        fds: parent.fds.clone(),
        ticks_left: crate::config::TIMESLICE_TICKS,
        last_errno: 0,
    };
    procs[child_idx] = child;
    drop(procs);
    crate::sched::enqueue(child_pid);
    Ok(child_pid)
}

/// exit(status): marks the caller ZOMBIE, frees its user-half memory
/// and page table, and raises SIGCHLD on its parent (spec 4.F).
pub fn exit_current(status: i32) {
    let pid = current_pid();
    finish_exit(pid, ExitStatus { normal_code: (status & 0xff) as u8, signal: None });
}

/// Every fatal-signal path (`signal::deliver_pending`'s unblockable
/// and default-disposition arms, in turn reached from `trap.rs`'s
/// page-fault/illegal-instruction handlers) routes through here, so
/// refusing pid 0 in this one place is enough to uphold spec.md's
/// "process 0 (init) never exits" invariant everywhere a signal could
/// otherwise kill it.
pub fn terminate_by_signal(pcb: &mut Pcb, signo: usize) {
    if pcb.pid == 0 {
        log::error!("refusing to terminate init (pid 0) on signal {}", signo);
        return;
    }
    let pid = pcb.pid;
    free_address_space(pcb);
    pcb.state = ProcState::Zombie;
    pcb.exit_status = Some(ExitStatus { normal_code: 0, signal: Some(signo as u8) });
    notify_parent(pid, pcb.ppid);
}

fn finish_exit(pid: usize, status: ExitStatus) {
    let ppid = with_pcb(pid, |pcb| {
        free_address_space(pcb);
        pcb.state = ProcState::Zombie;
        pcb.exit_status = Some(status);
        pcb.ppid
    });
    if let Some(ppid) = ppid {
        notify_parent(pid, ppid);
    }
}

fn free_address_space(pcb: &mut Pcb) {
    for vma in pcb.vmas.drain(..) {
        let mut addr = vma.start;
        while addr < vma.end {
            if let Ok(pa) = vm::translate(unsafe { &*pcb.root }, addr) {
                pmm::free_frame(pa & !(PAGE_SIZE - 1));
            }
            addr += PAGE_SIZE;
        }
    }
    if !pcb.root.is_null() {
        unsafe { vm::free_user_root(pcb.root) };
        pcb.root = core::ptr::null_mut();
    }
}

fn notify_parent(child_pid: usize, ppid: usize) {
    if ppid == child_pid {
        return;
    }
    let _ = crate::signal::raise(crate::signal::SIGCHLD, ppid);
}

pub enum WaitOutcome {
    Reaped { pid: usize, status: u32 },
    NoneYet,
    NoChildren,
}

/// Single non-blocking attempt to reap a zombie child (spec 4.E); the
/// syscall dispatcher loops this with an interleaved `yield` to get
/// the documented "yields and retries" behavior.
pub fn try_wait(parent_pid: usize, target: Option<usize>) -> WaitOutcome {
    let mut procs = PROCS.lock();
    let mut saw_child = false;
    for i in 0..procs.len() {
        if procs[i].ppid != parent_pid || procs[i].state == ProcState::Unused || procs[i].pid == parent_pid {
            continue;
        }
        if let Some(want) = target {
            if procs[i].pid != want {
                continue;
            }
        }
        saw_child = true;
        if procs[i].state == ProcState::Zombie {
            let pid = procs[i].pid;
            let status = procs[i].exit_status.as_ref().map(|s| s.pack()).unwrap_or(0);
            pmm::free_frames(procs[i].kernel_stack, KERNEL_STACK_PAGES);
            procs[i] = Pcb::unused();
            return WaitOutcome::Reaped { pid, status };
        }
    }
    if saw_child {
        WaitOutcome::NoneYet
    } else {
        WaitOutcome::NoChildren
    }
}

pub fn ppid_of(pid: usize) -> usize {
    with_pcb(pid, |p| p.ppid).unwrap_or(0)
}

/// Replaces the current process's user address space with a freshly
/// parsed ELF image (spec 4.E); the ELF parse itself is delegated to
/// the elf module, an external collaborator per spec 1.
pub fn exec(path: &str, argv: &[&str]) -> Result<(), Errno> {
    let pid = current_pid();
    let image = crate::elf::load_from_path(path)?;
    with_pcb(pid, |pcb| {
        for vma in pcb.vmas.drain(..) {
            let mut addr = vma.start;
            while addr < vma.end {
                if let Ok(pa) = vm::translate(unsafe { &*pcb.root }, addr) {
                    pmm::free_frame(pa & !(PAGE_SIZE - 1));
                }
                addr += PAGE_SIZE;
            }
        }
        let new_root = vm::create_user_root(unsafe { &*kernel_root_ptr() }).expect("exec root");
        map_sigreturn_trampoline(new_root);
        unsafe { vm::free_user_root(pcb.root) };
        pcb.root = new_root;

        for seg in &image.segments {
            let flags = vma_to_pte_flags(seg.flags);
            let mut off = 0usize;
            while off < seg.memsz {
                let pa = pmm::alloc_frame().expect("exec segment frame");
                if off < seg.filesz {
                    let n = (seg.filesz - off).min(PAGE_SIZE);
                    unsafe {
                        core::ptr::copy_nonoverlapping(seg.data.as_ptr().add(off), pa as *mut u8, n);
                    }
                }
                vm::map(unsafe { &mut *pcb.root }, seg.vaddr + off, pa, flags).expect("map exec segment");
                off += PAGE_SIZE;
            }
            pcb.vmas.push(Vma { start: seg.vaddr, end: seg.vaddr + seg.memsz, flags: seg.flags });
        }

        let stack_base = USER_STACK_TOP - USER_STACK_SIZE;
        for off in (0..USER_STACK_SIZE).step_by(PAGE_SIZE) {
            let pa = pmm::alloc_frame().expect("exec stack frame");
            vm::map(unsafe { &mut *pcb.root }, stack_base + off, pa, PteFlags::U | PteFlags::R | PteFlags::W)
                .expect("map exec stack");
        }
        pcb.vmas.push(Vma { start: stack_base, end: USER_STACK_TOP, flags: VmaFlags::R | VmaFlags::W | VmaFlags::U | VmaFlags::GROWSDOWN });

        pcb.heap_start = image.heap_start;
        pcb.heap_end = image.heap_start;
        pcb.sig.reset_on_exec();

        let sp = write_argv(pcb, USER_STACK_TOP, argv);
        unsafe {
            *pcb.trap_frame = TrapFrame::zero();
            (*pcb.trap_frame).sepc = image.entry;
            use crate::cpu::Registers;
            (*pcb.trap_frame).set_reg(Registers::Sp, sp);
            (*pcb.trap_frame).pid = pid;
        }
    })
    .ok_or(Errno::Einval)
}

/// Spawns a process directly from a code blob instead of an ELF file
/// (spec 8 scenarios S1/S2/S4/S6): the in-kernel test harness hand
/// assembles a handful of instructions and needs them to run under
/// real Sv39 isolation with no filesystem involved, the same way
/// `exec` would map a `PT_LOAD` segment -- just with one fixed RWX
/// page instead of parsed program headers.
pub fn spawn_raw(name: &str, code: &[u8], ppid: usize) -> Result<usize, Errno> {
    let mut procs = PROCS.lock();
    let idx = alloc_slot(&mut procs).ok_or(Errno::Enomem)?;
    let pid = NEXT_PID.fetch_add(1, Ordering::Relaxed);

    let root = vm::create_user_root(unsafe { &*kernel_root_ptr() }).map_err(|_| Errno::Enomem)?;
    map_sigreturn_trampoline(root);
    let vmas = map_program(root, code)?;
    let entry = crate::config::USER_CODE_BASE;

    let (kstack, frame) = alloc_kernel_stack();
    unsafe {
        *frame = TrapFrame::zero();
        (*frame).sepc = entry;
        (*frame).pid = pid;
        use crate::cpu::Registers;
        (*frame).set_reg(Registers::Sp, USER_STACK_TOP & !0xf);
    }

    let mut pcb = Pcb {
        pid,
        ppid,
        state: ProcState::Ready,
        name: String::from(name),
        root,
        vmas,
        heap_start: entry + PAGE_SIZE,
        heap_end: entry + PAGE_SIZE,
        kernel_stack: kstack,
        context: Context::default(),
        trap_frame: frame,
        cwd: String::from("/"),
        tty: 0,
        exit_status: None,
        sig: SignalState::new(),
        sigreturn_trampoline: SIGRETURN_TRAMPOLINE_VA,
        fds: [const { None }; MAX_OPEN_FILES],
        ticks_left: crate::config::TIMESLICE_TICKS,
        last_errno: 0,
    };
    pcb.fds[0] = Some(FileDescriptor::tty(Default::default()));
    pcb.fds[1] = Some(FileDescriptor::tty(Default::default()));
    pcb.fds[2] = Some(FileDescriptor::tty(Default::default()));
    procs[idx] = pcb;
    drop(procs);
    crate::sched::enqueue(pid);
    Ok(pid)
}

fn write_argv(pcb: &mut Pcb, top: usize, argv: &[&str]) -> usize {
    let mut sp = top;
    for arg in argv.iter().rev() {
        sp -= arg.len() + 1;
        if let Ok(pa) = vm::translate(unsafe { &*pcb.root }, sp & !(PAGE_SIZE - 1)) {
            let page_off = sp & (PAGE_SIZE - 1);
            let dst = (pa & !(PAGE_SIZE - 1)) + page_off;
            unsafe {
                core::ptr::copy_nonoverlapping(arg.as_ptr(), dst as *mut u8, arg.len());
                *((dst + arg.len()) as *mut u8) = 0;
            }
        }
    }
    sp & !0xf
}

/// sbrk-style heap growth with the 1 MiB heap/stack gap refusal from
/// spec scenario S5.
pub fn grow_heap(pid: usize, increment: isize) -> Result<usize, Errno> {
    with_pcb(pid, |pcb| {
        let new_end = if increment >= 0 {
            pcb.heap_end.checked_add(increment as usize).ok_or(Errno::Enomem)?
        } else {
            pcb.heap_end.checked_sub((-increment) as usize).ok_or(Errno::Einval)?
        };
        let stack_bottom = USER_STACK_TOP - USER_STACK_SIZE;
        if increment > 0 && new_end + crate::config::HEAP_STACK_GAP_MIN > stack_bottom {
            return Err(Errno::Enomem);
        }
        let old_end = pcb.heap_end;
        if new_end > old_end {
            let mut addr = old_end & !(PAGE_SIZE - 1);
            if addr < old_end {
                addr += PAGE_SIZE;
            }
            while addr < new_end {
                let pa = pmm::alloc_frame().ok_or(Errno::Enomem)?;
                vm::map(unsafe { &mut *pcb.root }, addr, pa, PteFlags::U | PteFlags::R | PteFlags::W)
                    .map_err(|_| Errno::Enomem)?;
                addr += PAGE_SIZE;
            }
            pcb.vmas.push(Vma { start: old_end, end: new_end, flags: VmaFlags::R | VmaFlags::W | VmaFlags::U });
        }
        pcb.heap_end = new_end;
        Ok(old_end)
    })
    .unwrap_or(Err(Errno::Einval))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_status_pack_distinguishes_signal_from_normal_exit() {
        let normal = ExitStatus { normal_code: 42, signal: None };
        let signaled = ExitStatus { normal_code: 0, signal: Some(11) };
        assert_eq!(normal.pack(), 42 << 8);
        assert_eq!(signaled.pack(), 11);
        assert_ne!(normal.pack() & 0x7f, signaled.pack() & 0x7f);
    }

    #[test]
    fn vma_contains_respects_half_open_range() {
        let vma = Vma { start: 0x1000, end: 0x2000, flags: VmaFlags::R };
        assert!(vma.contains(0x1000, 0x1000));
        assert!(!vma.contains(0x1000, 0x1001));
        assert!(!vma.contains(0x0fff, 1));
    }

    /// Scenario S5: growing the heap to within HEAP_STACK_GAP_MIN of
    /// the stack must be refused before any frame is touched, which is
    /// exactly what makes this safe to exercise on the host -- the
    /// refusal path returns Enomem without calling pmm::alloc_frame or
    /// vm::map, neither of which are safe to run against the fake
    /// RAM_START-relative addresses a host test process has.
    #[test]
    fn grow_heap_refuses_to_close_the_stack_gap() {
        let stack_bottom = USER_STACK_TOP - USER_STACK_SIZE;
        let pid = 9001;
        {
            let mut procs = PROCS.lock();
            let idx = alloc_slot(&mut procs).expect("free slot");
            procs[idx] = Pcb::unused();
            procs[idx].pid = pid;
            procs[idx].state = ProcState::Ready;
            procs[idx].heap_end = stack_bottom - crate::config::HEAP_STACK_GAP_MIN + 1;
        }
        assert_eq!(grow_heap(pid, 4096), Err(Errno::Enomem));
        with_pcb(pid, |pcb| pcb.state = ProcState::Unused);
    }
}
