// ELF header validation and `Elf` construction, spliced into elf.rs.

// Validates an in-memory ELF header: magic, class, endianness, machine.
pub unsafe fn check_elf_header(base_addr: usize) -> Result<(), Errno> {
    let ehdr = unsafe { &*(base_addr as *const ElfEhdr) };
    if ehdr.e_ident[..SELFMAG] != ELFMAG {
        return Err(Errno::Format);
    }

    let class = ehdr.e_ident[EI_CLASS];
    if class != ELFCLASS {
        return Err(Errno::Format);
    }

    if ehdr.e_ident[EI_DATA] != ELFDATA2LSB {
        return Err(Errno::Format);
    }
    if ehdr.e_ident[EI_VERSION] != EV_CURRENT {
        return Err(Errno::Format);
    }
    if ehdr.e_type != ET_EXEC && ehdr.e_type != ET_DYN {
        return Err(Errno::Format);
    }
    if ehdr.e_machine != EXPECTED_MACHINE {
        return Err(Errno::Format);
    }
    if ehdr.e_version as u8 != EV_CURRENT {
        return Err(Errno::Format);
    }

    Ok(())
}

impl Elf {
    // Parses a loaded image, pulling the symbol table, relocation tables and
    // hash table out of its dynamic section. Calling this again on an image
    // that already initialized successfully just re-parses it; there is no
    // persistent "already initialized" state to short-circuit on.
    pub unsafe fn init(base_addr: usize, pathname: &str) -> Result<Self, Errno> {
        if base_addr == 0 {
            return Err(Errno::Invalid);
        }

        unsafe { check_elf_header(base_addr)? };

        let ehdr = base_addr as *const ElfEhdr;
        let phdr = (base_addr + unsafe { (*ehdr).e_phoff } as usize) as *const ElfPhdr;
        let phdrs = unsafe { slice::from_raw_parts(phdr, (*ehdr).e_phnum as usize) };

        // Find the PT_LOAD segment with file offset 0 and derive the bias
        // (the difference between the load address and the link-time vaddr).
        let phdr0 = phdrs
            .iter()
            .find(|ph| ph.p_type == PT_LOAD && ph.p_offset == 0)
            .ok_or(Errno::Format)?;

        if base_addr < phdr0.p_vaddr as usize {
            return Err(Errno::Format);
        }
        let bias_addr = base_addr - phdr0.p_vaddr as usize;

        let dhdr = phdrs
            .iter()
            .find(|ph| ph.p_type == PT_DYNAMIC)
            .ok_or(Errno::Format)?;

        let dyn_section = (bias_addr + dhdr.p_vaddr as usize) as *const ElfDyn;
        let dyn_sz = dhdr.p_memsz as usize;

        let mut elf = Elf {
            pathname: pathname.to_string(),
            base_addr,
            bias_addr,
            ehdr,
            phdr,
            dyn_section,
            dyn_sz,
            strtab: ptr::null(),
            symtab: ptr::null(),
            relplt: 0,
            relplt_sz: 0,
            reldyn: 0,
            reldyn_sz: 0,
            relandroid: 0,
            relandroid_sz: 0,
            bucket: ptr::null(),
            bucket_cnt: 0,
            chain: ptr::null(),
            chain_cnt: 0,
            bloom: ptr::null(),
            bloom_sz: 0,
            bloom_shift: 0,
            symoffset: 0,
            is_use_gnu_hash: false,
            is_use_rela: false,
        };

        // Walk the dynamic section, pulling out every table address and size.
        let dyn_cnt = dyn_sz / mem::size_of::<ElfDyn>();
        let dyn_entries = unsafe { slice::from_raw_parts(dyn_section, dyn_cnt) };
        for dyn_entry in dyn_entries {
            match dyn_entry.d_tag as i64 {
                DT_NULL => break,
                DT_STRTAB => {
                    let ptr = (bias_addr + dyn_entry.d_un as usize) as *const c_char;
                    if (ptr as usize) < base_addr {
                        return Err(Errno::Format);
                    }
                    elf.strtab = ptr;
                }
                DT_SYMTAB => {
                    let ptr = (bias_addr + dyn_entry.d_un as usize) as *const ElfSym;
                    if (ptr as usize) < base_addr {
                        return Err(Errno::Format);
                    }
                    elf.symtab = ptr;
                }
                DT_PLTREL => {
                    elf.is_use_rela = dyn_entry.d_un as i64 == DT_RELA;
                }
                DT_JMPREL => {
                    let ptr = bias_addr + dyn_entry.d_un as usize;
                    if ptr < base_addr {
                        return Err(Errno::Format);
                    }
                    elf.relplt = ptr;
                }
                DT_PLTRELSZ => {
                    elf.relplt_sz = dyn_entry.d_un as usize;
                }
                DT_REL | DT_RELA => {
                    let ptr = bias_addr + dyn_entry.d_un as usize;
                    if ptr < base_addr {
                        return Err(Errno::Format);
                    }
                    elf.reldyn = ptr;
                }
                DT_RELSZ | DT_RELASZ => {
                    elf.reldyn_sz = dyn_entry.d_un as usize;
                }
                DT_ANDROID_REL | DT_ANDROID_RELA => {
                    let ptr = bias_addr + dyn_entry.d_un as usize;
                    if ptr < base_addr {
                        return Err(Errno::Format);
                    }
                    elf.relandroid = ptr;
                }
                DT_ANDROID_RELSZ | DT_ANDROID_RELASZ => {
                    elf.relandroid_sz = dyn_entry.d_un as usize;
                }
                DT_HASH => {
                    // Prefer GNU hash if both are present.
                    if elf.is_use_gnu_hash {
                        continue;
                    }
                    let raw = (bias_addr + dyn_entry.d_un as usize) as *const u32;
                    if (raw as usize) < base_addr {
                        return Err(Errno::Format);
                    }
                    unsafe {
                        elf.bucket_cnt = *raw;
                        elf.chain_cnt = *raw.add(1);
                        elf.bucket = raw.add(2);
                        elf.chain = elf.bucket.add(elf.bucket_cnt as usize);
                    }
                }
                DT_GNU_HASH => {
                    // Layout: nbuckets | symoffset | bloom_sz | bloom_shift | bloom[] | buckets[] | chains[]
                    let raw = (bias_addr + dyn_entry.d_un as usize) as *const u32;
                    if (raw as usize) < base_addr {
                        return Err(Errno::Format);
                    }
                    unsafe {
                        elf.bucket_cnt = *raw;
                        elf.symoffset = *raw.add(1);
                        elf.bloom_sz = *raw.add(2);
                        elf.bloom_shift = *raw.add(3);
                        elf.bloom = raw.add(4) as *const usize;
                        elf.bucket = elf.bloom.add(elf.bloom_sz as usize) as *const u32;
                        elf.chain = elf.bucket.add(elf.bucket_cnt as usize);
                    }
                    elf.is_use_gnu_hash = true;
                }
                _ => {}
            }
        }

        // Android packed relocations start with an "APS2" magic; skip it.
        if elf.relandroid != 0 {
            let rel = elf.relandroid as *const u8;
            if elf.relandroid_sz < 4 {
                return Err(Errno::Format);
            }
            let header = unsafe { slice::from_raw_parts(rel, 4) };
            if header != [b'A', b'P', b'S', b'2'] {
                log::error!("android packed relocation bad magic in {}", elf.pathname);
                return Err(Errno::Format);
            }
            elf.relandroid += 4;
            elf.relandroid_sz -= 4;
        }

        elf.check()?;

        log::info!(
            "init ok: {} ({} {} plt:{} dyn:{} android:{})",
            elf.pathname,
            if elf.is_use_rela { "RELA" } else { "REL" },
            if elf.is_use_gnu_hash {
                "GNU_HASH"
            } else {
                "ELF_HASH"
            },
            elf.relplt_sz,
            elf.reldyn_sz,
            elf.relandroid_sz
        );

        Ok(elf)
    }

    // Verifies that every field `hook`/`find_*` depends on was actually
    // populated during `init`.
    fn check(&self) -> Result<(), Errno> {
        if self.base_addr == 0
            || self.bias_addr == 0
            || self.ehdr.is_null()
            || self.phdr.is_null()
            || self.strtab.is_null()
            || self.symtab.is_null()
            || self.bucket.is_null()
            || self.chain.is_null()
        {
            return Err(Errno::Format);
        }
        if self.is_use_gnu_hash && self.bloom.is_null() {
            return Err(Errno::Format);
        }
        Ok(())
    }

    // Whether `addr` falls within some PT_LOAD segment's runtime range.
    fn is_addr_in_load_segments(&self, addr: usize) -> bool {
        let phdrs = unsafe { slice::from_raw_parts(self.phdr, (*self.ehdr).e_phnum as usize) };
        for phdr in phdrs {
            if phdr.p_type != PT_LOAD {
                continue;
            }
            let start = self.bias_addr + phdr.p_vaddr as usize;
            let end = start.saturating_add(phdr.p_memsz as usize);
            if addr >= start && addr < end {
                return true;
            }
        }
        false
    }

    // PF_R/PF_W/PF_X of the PT_LOAD segment enclosing `addr`, translated to
    // PROT_* bits. Used to derive a slot's current protection without
    // consulting /proc/self/maps.
    fn load_segment_prot(&self, addr: usize) -> Result<u32, Errno> {
        const PF_X: ElfWord = 1;
        const PF_W: ElfWord = 2;
        const PF_R: ElfWord = 4;

        let phdrs = unsafe { slice::from_raw_parts(self.phdr, (*self.ehdr).e_phnum as usize) };
        for phdr in phdrs {
            if phdr.p_type != PT_LOAD {
                continue;
            }
            let start = self.bias_addr + phdr.p_vaddr as usize;
            let end = start.saturating_add(phdr.p_memsz as usize);
            if addr >= start && addr < end {
                let mut prot = 0u32;
                if phdr.p_flags & PF_R != 0 {
                    prot |= memory::PROT_READ;
                }
                if phdr.p_flags & PF_W != 0 {
                    prot |= memory::PROT_WRITE;
                }
                if phdr.p_flags & PF_X != 0 {
                    prot |= memory::PROT_EXEC;
                }
                return Ok(prot);
            }
        }
        Err(Errno::NotFound)
    }

    // Zeroes the view. After this call every pointer field is null and
    // `hook`/`find_*` will fail with `ELFINIT` until `init` runs again.
    pub fn reset(&mut self) {
        self.pathname.clear();
        self.base_addr = 0;
        self.bias_addr = 0;
        self.ehdr = ptr::null();
        self.phdr = ptr::null();
        self.dyn_section = ptr::null();
        self.dyn_sz = 0;
        self.strtab = ptr::null();
        self.symtab = ptr::null();
        self.relplt = 0;
        self.relplt_sz = 0;
        self.reldyn = 0;
        self.reldyn_sz = 0;
        self.relandroid = 0;
        self.relandroid_sz = 0;
        self.bucket = ptr::null();
        self.bucket_cnt = 0;
        self.chain = ptr::null();
        self.chain_cnt = 0;
        self.bloom = ptr::null();
        self.bloom_sz = 0;
        self.bloom_shift = 0;
        self.symoffset = 0;
        self.is_use_gnu_hash = false;
        self.is_use_rela = false;
    }

    // Every public entry point but `init`/`reset` requires a view that has
    // successfully completed `init` and never been `reset` since.
    fn require_init(&self) -> Result<(), Errno> {
        if self.base_addr == 0 {
            return Err(Errno::ElfInit);
        }
        Ok(())
    }
}
