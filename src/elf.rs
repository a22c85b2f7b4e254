// ELF parsing and PLT/GOT hook core.

use crate::errno::Errno;
use crate::memory;
use std::collections::BTreeSet;
use std::ffi::{CStr, c_char};
use std::mem;
use std::ptr;
use std::slice;

// ELF symbol hash algorithms.
mod hash;
// Android packed relocation (SLEB128) decoding.
mod packed;
// r_sym / r_type extraction from relocation entries.
mod reloc;
// ELF32 layouts and ARM constants.
mod arch32;
// ELF64 layouts and AArch64 constants.
mod arch64;

use hash::{elf_gnu_hash, elf_hash};
use packed::PackedRelocIterator;
use reloc::{elf_r_sym, elf_r_type};

#[cfg(target_pointer_width = "32")]
use arch32::{
    ELFCLASS, EXPECTED_MACHINE, ElfAddr, ElfDyn, ElfEhdr, ElfPhdr, ElfRel, ElfRela, ElfSym,
    ElfWord, ElfXword, R_GENERIC_ABS, R_GENERIC_GLOB_DAT, R_GENERIC_JUMP_SLOT,
};
#[cfg(target_pointer_width = "64")]
use arch64::{
    ELFCLASS, EXPECTED_MACHINE, ElfAddr, ElfDyn, ElfEhdr, ElfPhdr, ElfRel, ElfRela, ElfSym,
    ElfWord, ElfXword, R_GENERIC_ABS, R_GENERIC_GLOB_DAT, R_GENERIC_JUMP_SLOT,
};

// e_ident layout.
const EI_NIDENT: usize = 16;
const EI_CLASS: usize = 4;
const EI_DATA: usize = 5;
const EI_VERSION: usize = 6;

const ELFMAG: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const SELFMAG: usize = 4;

const ELFDATA2LSB: u8 = 1;
const EV_CURRENT: u8 = 1;

const ET_EXEC: u16 = 2;
const ET_DYN: u16 = 3;
const SHN_UNDEF: u16 = 0;
const PT_LOAD: u32 = 1;
const PT_DYNAMIC: u32 = 2;

// Dynamic section tags.
const DT_NULL: i64 = 0;
const DT_PLTRELSZ: i64 = 2;
const DT_HASH: i64 = 4;
const DT_STRTAB: i64 = 5;
const DT_SYMTAB: i64 = 6;
const DT_RELA: i64 = 7;
const DT_RELASZ: i64 = 8;
const DT_REL: i64 = 17;
const DT_RELSZ: i64 = 18;
const DT_PLTREL: i64 = 20;
const DT_JMPREL: i64 = 23;
const DT_GNU_HASH: i64 = 0x6fff_fef5;

// Android private packed-relocation tags.
const DT_ANDROID_REL: i64 = 0x6000_000f;
const DT_ANDROID_RELA: i64 = 0x6000_0010;
const DT_ANDROID_RELSZ: i64 = 0x6000_0011;
const DT_ANDROID_RELASZ: i64 = 0x6000_0012;

// A parsed ELF image, holding every piece of metadata `hook` needs.
pub struct Elf {
    pathname: String,
    // Runtime start address of the image.
    base_addr: usize,
    // Offset between `base_addr` and the image's link-time virtual addresses.
    bias_addr: usize,
    ehdr: *const ElfEhdr,
    phdr: *const ElfPhdr,
    dyn_section: *const ElfDyn,
    dyn_sz: usize,
    strtab: *const c_char,
    symtab: *const ElfSym,
    // .rel(a).plt address and size.
    relplt: usize,
    relplt_sz: usize,
    // .rel(a).dyn address and size.
    reldyn: usize,
    reldyn_sz: usize,
    // Android packed relocation stream address and size.
    relandroid: usize,
    relandroid_sz: usize,
    // Hash table bucket array and count.
    bucket: *const u32,
    bucket_cnt: u32,
    // Hash table chain array and count.
    chain: *const u32,
    chain_cnt: u32,
    // GNU hash bloom filter array and parameters.
    bloom: *const usize,
    bloom_sz: u32,
    bloom_shift: u32,
    // First symbol index covered by the GNU hash table.
    symoffset: u32,
    is_use_gnu_hash: bool,
    is_use_rela: bool,
}

// Safety: `Elf` only ever points into the loaded image of the shared object
// it was built from, which outlives the struct for the process lifetime.
unsafe impl Send for Elf {}
unsafe impl Sync for Elf {}

include!("elf/check_init.inc.rs");
include!("elf/api.inc.rs");
include!("elf/lookup.inc.rs");

#[cfg(test)]
mod tests {
    use super::*;

    // A single mmap'd page, writable and readable, that we hand-assemble a
    // synthetic ELF image into. `p_vaddr == p_offset == 0` for the sole
    // PT_LOAD, so `bias_addr == base_addr` and every `d_un`/`r_offset` in
    // this module is already a byte offset from the page start.
    struct Page {
        ptr: *mut u8,
        len: usize,
    }

    impl Page {
        fn new() -> Self {
            let len = 4096;
            let ptr = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            assert_ne!(ptr, libc::MAP_FAILED);
            Self { ptr: ptr as *mut u8, len }
        }

        fn base(&self) -> usize {
            self.ptr as usize
        }

        unsafe fn write<T>(&self, offset: usize, value: T) {
            assert!(offset + mem::size_of::<T>() <= self.len);
            unsafe { ptr::write_unaligned(self.ptr.add(offset) as *mut T, value) };
        }

        unsafe fn write_bytes(&self, offset: usize, bytes: &[u8]) {
            assert!(offset + bytes.len() <= self.len);
            unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.add(offset), bytes.len()) };
        }

        unsafe fn read<T: Copy>(&self, offset: usize) -> T {
            unsafe { ptr::read_unaligned(self.ptr.add(offset) as *const T) }
        }
    }

    impl Drop for Page {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.len);
            }
        }
    }

    const PHDR_LOAD_OFF: usize = 0x040;
    const PHDR_DYNAMIC_OFF: usize = 0x078;
    const DYN_OFF: usize = 0x0b0;
    // Room for up to 12 dynamic entries (0xc0 bytes) before the next table,
    // since the APS2-magic test below grows the array past the original 7.
    const STRTAB_OFF: usize = 0x170;
    const SYMTAB_OFF: usize = 0x180;
    const HASH_OFF: usize = 0x1b0;
    const RELA_PLT_OFF: usize = 0x1c8;
    const GOT_SLOT_OFF: usize = 0x1e0;
    const IMAGE_END: usize = 0x1e8;

    const PF_R: u32 = 4;

    fn ehdr(e_phnum: u16) -> ElfEhdr {
        ElfEhdr {
            e_ident: {
                let mut ident = [0u8; EI_NIDENT];
                ident[..SELFMAG].copy_from_slice(&ELFMAG);
                ident[EI_CLASS] = ELFCLASS;
                ident[EI_DATA] = ELFDATA2LSB;
                ident[EI_VERSION] = EV_CURRENT;
                ident
            },
            e_type: ET_DYN,
            e_machine: EXPECTED_MACHINE,
            e_version: EV_CURRENT as ElfWord,
            e_entry: 0,
            e_phoff: PHDR_LOAD_OFF as _,
            e_shoff: 0,
            e_flags: 0,
            e_ehsize: mem::size_of::<ElfEhdr>() as u16,
            e_phentsize: mem::size_of::<ElfPhdr>() as u16,
            e_phnum,
            e_shentsize: 0,
            e_shnum: 0,
            e_shstrndx: 0,
        }
    }

    fn phdr_load() -> ElfPhdr {
        ElfPhdr {
            p_type: PT_LOAD,
            p_offset: 0,
            p_vaddr: 0,
            p_paddr: 0,
            p_filesz: IMAGE_END as _,
            p_memsz: IMAGE_END as _,
            p_flags: PF_R as ElfWord,
            p_align: 0x1000,
        }
    }

    fn phdr_dynamic(dyn_cnt: usize) -> ElfPhdr {
        let sz = (dyn_cnt * mem::size_of::<ElfDyn>()) as _;
        ElfPhdr {
            p_type: PT_DYNAMIC,
            p_offset: DYN_OFF as _,
            p_vaddr: DYN_OFF as _,
            p_paddr: DYN_OFF as _,
            p_filesz: sz,
            p_memsz: sz,
            p_flags: PF_R as ElfWord,
            p_align: 8,
        }
    }

    fn dyn_entry(tag: i64, val: u64) -> ElfDyn {
        ElfDyn {
            d_tag: tag as _,
            d_un: val as _,
        }
    }

    // Packs (symidx, type) into r_info using this build's word-size formula,
    // the inverse of `elf_r_sym`/`elf_r_type`.
    #[cfg(target_pointer_width = "32")]
    fn pack_r_info(symidx: u32, r_type: u32) -> ElfXword {
        ((symidx << 8) | (r_type & 0xff)) as ElfXword
    }
    #[cfg(target_pointer_width = "64")]
    fn pack_r_info(symidx: u32, r_type: u32) -> ElfXword {
        (((symidx as u64) << 32) | r_type as u64) as ElfXword
    }

    // Builds an image using the classic ELF hash (DT_HASH), one exported
    // symbol "foo" at `foo_value`, and a single RELA PLT JUMP_SLOT
    // relocation pointing at the GOT slot.
    fn build_classic_hash_image(page: &Page, foo_value: u64) {
        // strtab: "\0foo\0"
        unsafe { page.write_bytes(STRTAB_OFF, b"\0foo\0") };

        // symtab[0] = STN_UNDEF null symbol, symtab[1] = "foo"
        let sym0 = ElfSym {
            st_name: 0,
            st_info: 0,
            st_other: 0,
            st_shndx: SHN_UNDEF,
            st_value: 0,
            st_size: 0,
        };
        let sym1 = ElfSym {
            st_name: 1,
            st_info: 0,
            st_other: 0,
            st_shndx: 1,
            st_value: foo_value as _,
            st_size: 0,
        };
        unsafe {
            page.write(SYMTAB_OFF, sym0);
            page.write(SYMTAB_OFF + mem::size_of::<ElfSym>(), sym1);
        }

        // DT_HASH table: nbucket=1, nchain=2, bucket=[1], chain=[0, 0].
        unsafe {
            page.write::<u32>(HASH_OFF, 1);
            page.write::<u32>(HASH_OFF + 4, 2);
            page.write::<u32>(HASH_OFF + 8, 1);
            page.write::<u32>(HASH_OFF + 12, 0);
            page.write::<u32>(HASH_OFF + 16, 0);
        }

        // .rela.plt: one JUMP_SLOT entry for symbol index 1.
        let rela = ElfRela {
            r_offset: GOT_SLOT_OFF as _,
            r_info: pack_r_info(1, R_GENERIC_JUMP_SLOT) as _,
            r_addend: 0,
        };
        unsafe { page.write(RELA_PLT_OFF, rela) };

        // GOT slot starts at null (unresolved).
        unsafe { page.write::<u64>(GOT_SLOT_OFF, 0) };

        let dyn_entries = [
            dyn_entry(DT_STRTAB, STRTAB_OFF as u64),
            dyn_entry(DT_SYMTAB, SYMTAB_OFF as u64),
            dyn_entry(DT_HASH, HASH_OFF as u64),
            dyn_entry(DT_PLTREL, DT_RELA as u64),
            dyn_entry(DT_JMPREL, RELA_PLT_OFF as u64),
            dyn_entry(DT_PLTRELSZ, mem::size_of::<ElfRela>() as u64),
            dyn_entry(DT_NULL, 0),
        ];
        for (i, entry) in dyn_entries.iter().enumerate() {
            unsafe { page.write(DYN_OFF + i * mem::size_of::<ElfDyn>(), *entry) };
        }

        unsafe {
            page.write(0, ehdr(2));
            page.write(PHDR_LOAD_OFF, phdr_load());
            page.write(PHDR_DYNAMIC_OFF, phdr_dynamic(dyn_entries.len()));
        }
    }

    fn init_classic_hash(page: &Page, foo_value: u64) -> Elf {
        build_classic_hash_image(page, foo_value);
        unsafe { Elf::init(page.base(), "test.so").expect("init should succeed") }
    }

    #[test]
    fn hook_rewrites_plt_got_slot_and_reports_old_value() {
        let page = Page::new();
        let elf = init_classic_hash(&page, 0);

        let new_func = 0x4141_4141usize as *mut libc::c_void;
        let mut old_func: *mut libc::c_void = ptr::null_mut();
        unsafe { elf.hook("foo", new_func, &mut old_func) }.expect("hook should succeed");

        let slot: u64 = unsafe { page.read(GOT_SLOT_OFF) };
        assert_eq!(slot, new_func as u64);
        assert_eq!(old_func, ptr::null_mut());
    }

    #[test]
    fn hook_is_idempotent_on_the_second_call() {
        let page = Page::new();
        let elf = init_classic_hash(&page, 0);

        let new_func = 0x4242_4242usize as *mut libc::c_void;
        let mut old_func: *mut libc::c_void = ptr::null_mut();
        unsafe { elf.hook("foo", new_func, &mut old_func) }.unwrap();
        unsafe { elf.hook("foo", new_func, &mut old_func) }.unwrap();

        assert_eq!(old_func, new_func);
        let slot: u64 = unsafe { page.read(GOT_SLOT_OFF) };
        assert_eq!(slot, new_func as u64);
    }

    #[test]
    fn hook_round_trips_back_to_the_original_value() {
        let page = Page::new();
        let original = 0x1000_0000u64;
        let elf = init_classic_hash(&page, 0);
        unsafe { page.write::<u64>(GOT_SLOT_OFF, original) };

        let new_func = 0x5353_5353usize as *mut libc::c_void;
        let mut old_func: *mut libc::c_void = ptr::null_mut();
        unsafe { elf.hook("foo", new_func, &mut old_func) }.unwrap();
        assert_eq!(old_func as u64, original);

        let mut restored: *mut libc::c_void = ptr::null_mut();
        unsafe { elf.hook("foo", old_func, &mut restored) }.unwrap();

        let slot: u64 = unsafe { page.read(GOT_SLOT_OFF) };
        assert_eq!(slot, original);
    }

    #[test]
    fn hook_on_missing_symbol_is_a_quiet_no_op() {
        let page = Page::new();
        let elf = init_classic_hash(&page, 0);

        let new_func = 0x6161_6161usize as *mut libc::c_void;
        let sentinel = 0xdead_beefusize as *mut libc::c_void;
        let mut old_func = sentinel;
        let result = unsafe { elf.hook("does_not_exist", new_func, &mut old_func) };

        assert!(result.is_ok());
        assert_eq!(old_func, sentinel);
        let slot: u64 = unsafe { page.read(GOT_SLOT_OFF) };
        assert_eq!(slot, 0);
    }

    #[test]
    fn find_export_function_returns_bias_adjusted_address() {
        let page = Page::new();
        let elf = init_classic_hash(&page, 0x55);

        let addr = elf.find_export_function("foo").expect("foo should resolve");
        assert_eq!(addr, page.base() + 0x55);
    }

    #[test]
    fn find_got_slots_locates_the_plt_slot() {
        let page = Page::new();
        let elf = init_classic_hash(&page, 0);

        let slots = unsafe { elf.find_got_slots("foo", None) }.expect("lookup should succeed");
        assert_eq!(slots, vec![page.base() + GOT_SLOT_OFF]);
    }

    #[test]
    fn hook_fails_with_elfinit_before_init() {
        let page = Page::new();
        build_classic_hash_image(&page, 0);
        let mut elf = unsafe { Elf::init(page.base(), "test.so") }.unwrap();
        elf.reset();

        let new_func = 0x7171_7171usize as *mut libc::c_void;
        let result = unsafe { elf.hook("foo", new_func, ptr::null_mut()) };
        assert_eq!(result, Err(Errno::ElfInit));
    }

    #[test]
    fn init_rejects_bad_elf_magic() {
        let page = Page::new();
        build_classic_hash_image(&page, 0);
        unsafe { page.write::<u8>(0, 0x00) };
        let result = unsafe { Elf::init(page.base(), "test.so") };
        assert_eq!(result.err(), Some(Errno::Format));
    }

    #[test]
    fn init_rejects_android_region_with_bad_aps2_magic() {
        let page = Page::new();
        build_classic_hash_image(&page, 0);

        // Repoint DT_NULL's slot to an extra DT_ANDROID_RELA entry so the
        // dynamic array stays terminated; place a 8-byte region right after
        // the image with a bad magic.
        const ANDROID_OFF: usize = IMAGE_END;
        unsafe { page.write_bytes(ANDROID_OFF, b"XXXX0000") };
        let dyn_entries = [
            dyn_entry(DT_STRTAB, STRTAB_OFF as u64),
            dyn_entry(DT_SYMTAB, SYMTAB_OFF as u64),
            dyn_entry(DT_HASH, HASH_OFF as u64),
            dyn_entry(DT_PLTREL, DT_RELA as u64),
            dyn_entry(DT_JMPREL, RELA_PLT_OFF as u64),
            dyn_entry(DT_PLTRELSZ, mem::size_of::<ElfRela>() as u64),
            dyn_entry(DT_ANDROID_RELA, ANDROID_OFF as u64),
            dyn_entry(DT_ANDROID_RELASZ, 8),
            dyn_entry(DT_NULL, 0),
        ];
        for (i, entry) in dyn_entries.iter().enumerate() {
            unsafe { page.write(DYN_OFF + i * mem::size_of::<ElfDyn>(), *entry) };
        }
        unsafe { page.write(PHDR_DYNAMIC_OFF, phdr_dynamic(dyn_entries.len())) };

        let result = unsafe { Elf::init(page.base(), "test.so") };
        assert_eq!(result.err(), Some(Errno::Format));
    }
}
