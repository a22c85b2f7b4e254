// Android packed relocations ("APS2"): a SLEB128 run-length/delta encoding
// for REL/RELA arrays, used to shrink shared-object file size.

use crate::errno::Errno;
use std::mem;

use super::ElfXword;

// Cursor over `[cur, end)` producing signed arbitrary-width SLEB128 values.
struct Sleb128Decoder {
    cur: *const u8,
    end: *const u8,
}

impl Sleb128Decoder {
    unsafe fn new(addr: usize, size: usize) -> Self {
        let cur = addr as *const u8;
        let end = unsafe { cur.add(size) };
        Self { cur, end }
    }

    // Reads 7 payload bits per byte until the continuation bit (0x80) is
    // clear, then sign-extends from the final byte's bit 6 if there is
    // still room in the accumulator.
    unsafe fn next(&mut self) -> Result<usize, Errno> {
        let mut value: usize = 0;
        let size = mem::size_of::<usize>() * 8;
        let mut shift = 0usize;
        let mut byte: u8;

        loop {
            if self.cur >= self.end {
                return Err(Errno::Format);
            }
            byte = unsafe { *self.cur };
            self.cur = unsafe { self.cur.add(1) };
            value |= ((byte & 0x7f) as usize) << shift;
            shift += 7;
            if (byte & 0x80) == 0 {
                break;
            }
        }

        if shift < size && (byte & 0x40) != 0 {
            value |= (!0usize) << shift;
        }

        Ok(value)
    }
}

// Iterator over the APS2 stream, yielding fully reconstructed REL/RELA
// records one group at a time.
pub(super) struct PackedRelocIterator {
    decoder: Sleb128Decoder,
    relocation_count: usize,
    group_size: usize,
    group_flags: usize,
    group_r_offset_delta: usize,
    relocation_index: usize,
    relocation_group_index: usize,
    r_offset: usize,
    r_info: usize,
    r_addend: isize,
    is_use_rela: bool,
}

// A single decoded relocation, always shaped as a RELA record (`r_addend`
// is meaningless — always 0 — when the region is plain REL).
pub(super) struct PackedReloc {
    pub(super) r_offset: usize,
    pub(super) r_info: ElfXword,
    pub(super) r_addend: isize,
}

impl PackedRelocIterator {
    const GROUPED_BY_INFO: usize = 1;
    const GROUPED_BY_OFFSET_DELTA: usize = 2;
    const GROUPED_BY_ADDEND: usize = 4;
    const GROUP_HAS_ADDEND: usize = 8;

    pub(super) unsafe fn new(addr: usize, size: usize, is_use_rela: bool) -> Result<Self, Errno> {
        let mut decoder = unsafe { Sleb128Decoder::new(addr, size) };
        let relocation_count = unsafe { decoder.next()? };
        let r_offset = unsafe { decoder.next()? };
        Ok(Self {
            decoder,
            relocation_count,
            group_size: 0,
            group_flags: 0,
            group_r_offset_delta: 0,
            relocation_index: 0,
            relocation_group_index: 0,
            r_offset,
            r_info: 0,
            r_addend: 0,
            is_use_rela,
        })
    }

    // Reads a new group header: size, flags, and whichever of offset-delta /
    // info / addend-delta the flags say are shared across the whole group.
    unsafe fn read_group_fields(&mut self) -> Result<(), Errno> {
        self.group_size = unsafe { self.decoder.next()? };
        self.group_flags = unsafe { self.decoder.next()? };

        if self.group_flags & Self::GROUP_HAS_ADDEND != 0 && !self.is_use_rela {
            return Err(Errno::Format);
        }

        if self.group_flags & Self::GROUPED_BY_OFFSET_DELTA != 0 {
            self.group_r_offset_delta = unsafe { self.decoder.next()? };
        }

        if self.group_flags & Self::GROUPED_BY_INFO != 0 {
            self.r_info = unsafe { self.decoder.next()? };
        }

        if self.group_flags & Self::GROUP_HAS_ADDEND != 0 {
            if self.group_flags & Self::GROUPED_BY_ADDEND != 0 {
                let delta = unsafe { self.decoder.next()? };
                self.r_addend = self.r_addend.wrapping_add(delta as isize);
            }
        } else {
            self.r_addend = 0;
        }

        self.relocation_group_index = 0;
        Ok(())
    }

    // Yields the next relocation, pulling a fresh group header once the
    // current group is exhausted. Returns `None` once `relocation_count`
    // entries have been emitted.
    pub(super) unsafe fn next(&mut self) -> Result<Option<PackedReloc>, Errno> {
        if self.relocation_index >= self.relocation_count {
            return Ok(None);
        }

        if self.relocation_group_index == self.group_size {
            unsafe { self.read_group_fields()? };
        }

        if self.group_flags & Self::GROUPED_BY_OFFSET_DELTA != 0 {
            self.r_offset = self.r_offset.wrapping_add(self.group_r_offset_delta);
        } else {
            let delta = unsafe { self.decoder.next()? };
            self.r_offset = self.r_offset.wrapping_add(delta);
        }

        if self.group_flags & Self::GROUPED_BY_INFO == 0 {
            self.r_info = unsafe { self.decoder.next()? };
        }

        if self.group_flags & Self::GROUP_HAS_ADDEND != 0 && self.group_flags & Self::GROUPED_BY_ADDEND == 0
        {
            let delta = unsafe { self.decoder.next()? };
            self.r_addend = self.r_addend.wrapping_add(delta as isize);
        }

        self.relocation_index += 1;
        self.relocation_group_index += 1;

        Ok(Some(PackedReloc {
            r_offset: self.r_offset,
            r_info: self.r_info as ElfXword,
            r_addend: self.r_addend,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleb128(mut value: i64, out: &mut Vec<u8>) {
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
            if !done {
                byte |= 0x80;
            }
            out.push(byte);
            if done {
                break;
            }
        }
    }

    fn uleb_like(value: u64, out: &mut Vec<u8>) {
        // group_size / relocation_count are encoded as SLEB128 too but are
        // always non-negative in well-formed streams, so a plain SLEB128
        // encoding of the value as i64 round-trips correctly.
        sleb128(value as i64, out);
    }

    #[test]
    fn single_byte_0x7f_decodes_to_negative_one() {
        let bytes = [0x7fu8];
        let mut decoder = unsafe { Sleb128Decoder::new(bytes.as_ptr() as usize, bytes.len()) };
        let value = unsafe { decoder.next() }.unwrap();
        assert_eq!(value as isize, -1);
    }

    #[test]
    fn two_bytes_decode_to_128() {
        let bytes = [0x80u8, 0x01u8];
        let mut decoder = unsafe { Sleb128Decoder::new(bytes.as_ptr() as usize, bytes.len()) };
        let value = unsafe { decoder.next() }.unwrap();
        assert_eq!(value, 128);
    }

    #[test]
    fn underrun_mid_number_is_format_error() {
        let bytes = [0x80u8]; // continuation bit set, but stream ends here
        let mut decoder = unsafe { Sleb128Decoder::new(bytes.as_ptr() as usize, bytes.len()) };
        assert_eq!(unsafe { decoder.next() }, Err(Errno::Format));
    }

    #[test]
    fn grouped_offset_delta_and_info_reconstructs_three_relocations() {
        // relocation_count = 3, initial r_offset = 0x1000
        let mut bytes = Vec::new();
        uleb_like(3, &mut bytes);
        uleb_like(0x1000, &mut bytes);
        // one group of 3, flags = OFFSET_DELTA | INFO | HAS_ADDEND | GROUPED_BY_ADDEND
        let flags = PackedRelocIterator::GROUPED_BY_OFFSET_DELTA
            | PackedRelocIterator::GROUPED_BY_INFO
            | PackedRelocIterator::GROUP_HAS_ADDEND
            | PackedRelocIterator::GROUPED_BY_ADDEND;
        uleb_like(3, &mut bytes); // group_size
        uleb_like(flags as u64, &mut bytes); // group_flags
        uleb_like(8, &mut bytes); // offset delta
        uleb_like(0x12345, &mut bytes); // r_info
        uleb_like(7, &mut bytes); // addend delta

        let mut it = unsafe {
            PackedRelocIterator::new(bytes.as_ptr() as usize, bytes.len(), true).unwrap()
        };

        for k in 0..3u64 {
            let reloc = unsafe { it.next() }.unwrap().expect("relocation");
            assert_eq!(reloc.r_offset, 0x1000 + (k as usize + 1) * 8);
            assert_eq!(reloc.r_info, 0x12345);
            assert_eq!(reloc.r_addend, 7);
        }
        assert!(unsafe { it.next() }.unwrap().is_none());
    }

    #[test]
    fn addend_in_non_rela_region_is_format_error() {
        let mut bytes = Vec::new();
        uleb_like(1, &mut bytes);
        uleb_like(0, &mut bytes);
        let flags = PackedRelocIterator::GROUP_HAS_ADDEND;
        uleb_like(1, &mut bytes);
        uleb_like(flags as u64, &mut bytes);

        let err = unsafe { PackedRelocIterator::new(bytes.as_ptr() as usize, bytes.len(), false) }
            .and_then(|mut it| unsafe { it.next() });
        assert_eq!(err, Err(Errno::Format));
    }
}
