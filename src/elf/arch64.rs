// ELF64 layouts and AArch64 relocation constants (target_pointer_width = "64").

pub(super) type ElfAddr = u64;
pub(super) type ElfOff = u64;
pub(super) type ElfWord = u32;
pub(super) type ElfXword = u64;
pub(super) type ElfSxword = i64;
pub(super) type ElfHalf = u16;

pub(super) const ELFCLASS: u8 = 2; // ELFCLASS64
pub(super) const EXPECTED_MACHINE: u16 = 183; // EM_AARCH64

// R_AARCH64_* relocation types relevant to PLT/GOT hooking.
pub(super) const R_GENERIC_JUMP_SLOT: u32 = 1026;
pub(super) const R_GENERIC_GLOB_DAT: u32 = 1025;
pub(super) const R_GENERIC_ABS: u32 = 257; // R_AARCH64_ABS64

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
    pub(super) p_flags: ElfWord,
    pub(super) p_offset: ElfOff,
    pub(super) p_vaddr: ElfAddr,
    pub(super) p_paddr: ElfAddr,
    pub(super) p_filesz: ElfXword,
    pub(super) p_memsz: ElfXword,
    pub(super) p_align: ElfXword,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub(super) struct ElfDyn {
    pub(super) d_tag: ElfSxword,
    pub(super) d_un: ElfXword,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub(super) struct ElfSym {
    pub(super) st_name: ElfWord,
    pub(super) st_info: u8,
    pub(super) st_other: u8,
    pub(super) st_shndx: ElfHalf,
    pub(super) st_value: ElfAddr,
    pub(super) st_size: ElfXword,
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
    pub(super) r_addend: ElfSxword,
}

// ELF64_R_SYM / ELF64_R_TYPE: a 32-bit symbol index over a 32-bit type.
pub(super) fn r_sym(info: u64) -> u32 {
    (info >> 32) as u32
}

pub(super) fn r_type(info: u64) -> u32 {
    (info & 0xffff_ffff) as u32
}
