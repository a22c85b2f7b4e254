// ELF32 layouts and ARM relocation constants (target_pointer_width = "32").
//
// Field order matters here and deliberately does not track the 64-bit
// layouts in `arch64.rs`: Elf32_Phdr carries `p_flags` last, and Elf32_Sym
// carries `st_value`/`st_size` before the info/shndx bytes. Getting either
// reordered silently misreads every loaded image.

pub(super) type ElfAddr = u32;
pub(super) type ElfOff = u32;
pub(super) type ElfWord = u32;
pub(super) type ElfXword = u32;
pub(super) type ElfSword = i32;
pub(super) type ElfHalf = u16;

pub(super) const ELFCLASS: u8 = 1; // ELFCLASS32
pub(super) const EXPECTED_MACHINE: u16 = 40; // EM_ARM

// R_ARM_* relocation types relevant to PLT/GOT hooking.
pub(super) const R_GENERIC_JUMP_SLOT: u32 = 22;
pub(super) const R_GENERIC_GLOB_DAT: u32 = 21;
pub(super) const R_GENERIC_ABS: u32 = 2; // R_ARM_ABS32

#[repr(C)]
#[derive(Clone, Copy)]
pub(super) struct ElfEhdr {
    pub(super) e_ident: [u8; super::EI_NIDENT],
    pub(super) e_type: ElfHalf,
    pub(super) e_machine: ElfHalf,
    pub(super) e_version: ElfWord,
    pub(super) e_entry: ElfAddr,
    pub(super) e_phoff: ElfOff,
    pub(super) e_shoff: ElfOff,
    pub(super) e_flags: ElfWord,
    pub(super) e_ehsize: ElfHalf,
    pub(super) e_phentsize: ElfHalf,
    pub(super) e_phnum: ElfHalf,
    pub(super) e_shentsize: ElfHalf,
    pub(super) e_shnum: ElfHalf,
    pub(super) e_shstrndx: ElfHalf,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub(super) struct ElfPhdr {
    pub(super) p_type: ElfWord,
    pub(super) p_offset: ElfOff,
    pub(super) p_vaddr: ElfAddr,
    pub(super) p_paddr: ElfAddr,
    pub(super) p_filesz: ElfWord,
    pub(super) p_memsz: ElfWord,
    pub(super) p_flags: ElfWord,
    pub(super) p_align: ElfWord,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub(super) struct ElfDyn {
    pub(super) d_tag: ElfSword,
    pub(super) d_un: ElfWord,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub(super) struct ElfSym {
    pub(super) st_name: ElfWord,
    pub(super) st_value: ElfAddr,
    pub(super) st_size: ElfWord,
    pub(super) st_info: u8,
    pub(super) st_other: u8,
    pub(super) st_shndx: ElfHalf,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub(super) struct ElfRel {
    pub(super) r_offset: ElfAddr,
    pub(super) r_info: ElfXword,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub(super) struct ElfRela {
    pub(super) r_offset: ElfAddr,
    pub(super) r_info: ElfXword,
    pub(super) r_addend: ElfSword,
}

// ELF32_R_SYM / ELF32_R_TYPE: a 24-bit symbol index over an 8-bit type.
pub(super) fn r_sym(info: u64) -> u32 {
    (info >> 8) as u32
}

pub(super) fn r_type(info: u64) -> u32 {
    (info & 0xff) as u32
}
