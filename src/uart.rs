// uart.rs
// NS16550a-compatible UART driver for the QEMU virt platform. Not
// present in the retrieved teacher snapshot (main.rs references
// `uart::Uart::new(addr).init()` and a `Uart::get()` read path, but
// the module itself wasn't in the pack) -- written fresh from that
// call-site contract plus the NS16550a register layout, in the same
// register-struct-over-MMIO style the teacher uses in plic.rs/virtio.rs.

use crate::config::UART_ADDR;
use alloc::collections::VecDeque;
use core::fmt;
use spin::Mutex;

const RHR_THR: usize = 0;
const IER: usize = 1;
const FCR: usize = 2;
const LCR: usize = 3;
const LSR: usize = 5;

const LSR_RX_READY: u8 = 1 << 0;
const LSR_TX_IDLE: u8 = 1 << 5;

pub struct Uart {
    base: usize,
}

impl Uart {
    pub const fn new(base: usize) -> Self {
        Uart { base }
    }

    fn reg(&self, offset: usize) -> *mut u8 {
        (self.base + offset) as *mut u8
    }

    pub fn init(&mut self) {
        unsafe {
            self.reg(LCR).write_volatile(0b11); // 8 data bits, no parity, one stop bit
            self.reg(FCR).write_volatile(0b1); // enable the transmit/receive FIFOs
            self.reg(IER).write_volatile(0b1); // enable receive-data-available interrupts
        }
    }

    pub fn put(&mut self, c: u8) {
        unsafe {
            while self.reg(LSR).read_volatile() & LSR_TX_IDLE == 0 {}
            self.reg(RHR_THR).write_volatile(c);
        }
    }

    pub fn get(&mut self) -> Option<u8> {
        unsafe {
            if self.reg(LSR).read_volatile() & LSR_RX_READY != 0 {
                Some(self.reg(RHR_THR).read_volatile())
            } else {
                None
            }
        }
    }
}

impl fmt::Write for Uart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            self.put(b);
        }
        Ok(())
    }
}

#[macro_export]
macro_rules! print {
    ($($args:tt)+) => ({
        use core::fmt::Write;
        let _ = write!($crate::uart::Uart::new($crate::config::UART_ADDR), $($args)+);
    });
}

#[macro_export]
macro_rules! println {
    () => ({ $crate::print!("\r\n") });
    ($fmt:expr) => ({ $crate::print!(concat!($fmt, "\r\n")) });
    ($fmt:expr, $($args:tt)+) => ({ $crate::print!(concat!($fmt, "\r\n"), $($args)+) });
}

const IN_BUFFER_CAP: usize = 1024;

lazy_static::lazy_static! {
    static ref IN_BUFFER: Mutex<VecDeque<u8>> = Mutex::new(VecDeque::with_capacity(IN_BUFFER_CAP));
}

/// Drain every byte the UART has buffered into the shared stdin ring,
/// waking any process blocked on console input (spec 4.I). Called
/// from plic::handle_interrupt on the UART's IRQ line.
pub fn handle_interrupt() {
    let mut uart = Uart::new(UART_ADDR);
    let mut in_buf = IN_BUFFER.lock();
    while let Some(c) = uart.get() {
        if in_buf.len() < IN_BUFFER_CAP {
            in_buf.push_back(c);
        }
    }
}

/// Pop one buffered input byte, or None if stdin is empty right now.
pub fn read_byte() -> Option<u8> {
    IN_BUFFER.lock().pop_front()
}

pub fn write_byte(c: u8) {
    Uart::new(UART_ADDR).put(c);
}

/// Fills `buf` with whatever stdin already has buffered, non-blocking
/// (spec 4.I: TTY reads never block the calling process).
pub fn read_bytes(buf: &mut [u8]) -> usize {
    let mut n = 0;
    while n < buf.len() {
        match read_byte() {
            Some(c) => {
                buf[n] = c;
                n += 1;
            }
            None => break,
        }
    }
    n
}

pub fn write_bytes(buf: &[u8]) -> usize {
    let mut uart = Uart::new(UART_ADDR);
    for &b in buf {
        uart.put(b);
    }
    buf.len()
}

/// Backs the `log` facade (spec 9 ambient stack): kernel diagnostics
/// go through `log::info!`/`warn!`/`error!` instead of bare
/// `println!`, which stays reserved for the TTY-facing console a user
/// program actually reads. This UART doubles as the sink a dedicated
/// `console.rs` would otherwise own -- one serial line, one driver.
struct KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut uart = Uart::new(UART_ADDR);
        use core::fmt::Write;
        let _ = write!(uart, "[{}] {}\r\n", record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Installs the UART-backed logger as `log`'s global sink. Idempotent
/// (`set_logger` is allowed to fail if called twice; a second call
/// from, e.g., a host test harness is a no-op).
pub fn init_logger() {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(log::LevelFilter::Info);
}
