// Stable error taxonomy for the ELF/hook core. This is deliberately small:
// error-code enumeration for an outer framework is out of this crate's scope
// — these are just the failure modes the core itself can produce.

use std::fmt;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Errno {
    /// The ELF or APS2 image violated the format (bad magic, wrong
    /// class/endianness/version/type/machine, missing PT_DYNAMIC, first
    /// PT_LOAD's file offset isn't 0, bad APS2 magic, addend present in a
    /// non-RELA region, SLEB128 stream underrun).
    Format,
    /// The requested symbol was not present in either hash table, or an
    /// address fell outside every PT_LOAD segment.
    NotFound,
    /// A null/empty symbol name, null replacement address, or empty
    /// pathname was supplied.
    Invalid,
    /// `hook` was called on a view that was never successfully `init`ed.
    ElfInit,
    /// A system call (`mprotect`) failed; the raw errno is logged, not
    /// returned.
    Unknown,
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Errno::Format => "malformed ELF or APS2 relocation data",
            Errno::NotFound => "symbol or address not found",
            Errno::Invalid => "invalid argument",
            Errno::ElfInit => "hook attempted on an uninitialized ELF view",
            Errno::Unknown => "system call failed",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Errno {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_non_empty_for_every_kind() {
        for e in [
            Errno::Format,
            Errno::NotFound,
            Errno::Invalid,
            Errno::ElfInit,
            Errno::Unknown,
        ] {
            assert!(!e.to_string().is_empty());
        }
    }
}
