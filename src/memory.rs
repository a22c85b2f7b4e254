// Page protection control and instruction-cache maintenance for GOT slot
// rewrites. `mprotect` is the only syscall this crate ever issues on the
// write path; see §5 of the design this crate implements ("the only system
// call that can block is mprotect, which is effectively non-blocking").

use crate::errno::Errno;
use std::mem;

pub(crate) const PROT_READ: u32 = libc::PROT_READ as u32;
pub(crate) const PROT_WRITE: u32 = libc::PROT_WRITE as u32;
pub(crate) const PROT_EXEC: u32 = libc::PROT_EXEC as u32;

fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 { 4096 } else { size as usize }
}

// Page-aligned [start, start+len) covering one word at `addr`.
pub(crate) fn page_bounds(addr: usize) -> (usize, usize) {
    let page = page_size();
    let mask = !(page - 1);
    let word_end = addr + mem::size_of::<usize>() - 1;
    let start = addr & mask;
    let end = (word_end & mask) + page;
    (start, end - start)
}

pub(crate) fn set_addr_protect(addr: usize, prot: u32) -> Result<(), Errno> {
    let (start, len) = page_bounds(addr);
    let result = unsafe { libc::mprotect(start as *mut libc::c_void, len, prot as i32) };
    if result != 0 {
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        log::error!("mprotect({start:#x}, {len:#x}, {prot:#x}) failed: errno {errno}");
        return Err(Errno::Unknown);
    }
    Ok(())
}

// ARM cacheflush syscall (number 0xF0002) over [start, end) to evict stale
// I-cache lines after a GOT write. AArch64 has no equivalent call: the
// architecture's unified memory semantics, together with the implicit
// DSB/ISB `mprotect` already performs, make data stores to
// instruction-fetchable memory visible without an explicit cache-maintenance
// instruction (see the open question in the design notes this crate
// implements — validate on target hardware if this assumption ever needs
// revisiting).
#[cfg(target_arch = "arm")]
pub(crate) fn flush_instruction_cache(start: usize, end: usize) {
    const ARM_NR_CACHEFLUSH: libc::c_long = 0xF0002;
    unsafe {
        libc::syscall(ARM_NR_CACHEFLUSH, start, end, 0);
    }
}

#[cfg(not(target_arch = "arm"))]
pub(crate) fn flush_instruction_cache(_start: usize, _end: usize) {}
