// main.rs
// Thin entry-point shim (spec 9). Everything kinit needs -- module
// tree, panic handler, global allocator -- lives in lib.rs so it can
// also be exercised by `cargo test --lib` on the host; this binary
// crate exists only so the linker has something riscv64-only to build,
// pulling lib.rs's `#[no_mangle]` kinit/panic/allocator symbols in by
// referencing the crate.
#![no_std]
#![no_main]

extern crate rvkernel as _;
