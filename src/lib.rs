#![allow(dead_code)]
#![allow(unsafe_op_in_unsafe_fn)]
#![allow(clippy::missing_safety_doc)]

#[cfg(all(not(target_os = "linux"), not(any(clippy, test, doc))))]
compile_error!("gothook supports Linux/Android only (use cargo clippy/test/doc on host for development)");

#[cfg(all(
    not(any(target_arch = "arm", target_arch = "aarch64")),
    not(any(clippy, test, doc))
))]
compile_error!("gothook supports only 32-bit ARM and 64-bit AArch64 (use cargo clippy/test/doc on host for development)");

// ELF parsing core: dynamic section, symbol/string tables, relocation tables.
mod elf;
// Error taxonomy for the core.
mod errno;
// Page protection control and instruction-cache maintenance.
mod memory;

pub use elf::{Elf, check_elf_header};
pub use errno::Errno;
