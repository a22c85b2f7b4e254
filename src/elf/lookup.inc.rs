// Symbol lookup and GOT slot replacement, spliced into elf.rs.

impl Elf {
    // Dispatches to the hash scheme this image actually carries.
    fn find_symidx_by_name(&self, symbol: &str) -> Result<u32, Errno> {
        if self.is_use_gnu_hash {
            self.gnu_hash_lookup(symbol)
        } else {
            self.elf_hash_lookup(symbol)
        }
    }

    // DT_HASH bucket/chain walk.
    fn elf_hash_lookup(&self, symbol: &str) -> Result<u32, Errno> {
        if self.bucket_cnt == 0 {
            return Err(Errno::NotFound);
        }
        let hash = elf_hash(symbol.as_bytes());
        let mut i = unsafe { *self.bucket.add((hash % self.bucket_cnt) as usize) };
        while i != 0 {
            if let Some(name) = unsafe { self.sym_name(i) } {
                if name == symbol {
                    log::info!("found {symbol} at symidx {i} (ELF_HASH)");
                    return Ok(i);
                }
            }
            i = unsafe { *self.chain.add(i as usize) };
        }
        Err(Errno::NotFound)
    }

    // GNU hash lookup: try the defined-symbol path first, then fall back to
    // the undefined-symbol linear scan.
    fn gnu_hash_lookup(&self, symbol: &str) -> Result<u32, Errno> {
        if let Ok(symidx) = self.gnu_hash_lookup_def(symbol) {
            return Ok(symidx);
        }
        self.gnu_hash_lookup_undef(symbol)
    }

    // Defined-symbol GNU hash lookup: bloom filter reject, bucket, chain walk.
    fn gnu_hash_lookup_def(&self, symbol: &str) -> Result<u32, Errno> {
        if self.bucket_cnt == 0 {
            return Err(Errno::NotFound);
        }
        let hash = elf_gnu_hash(symbol.as_bytes());
        let word_bits = mem::size_of::<ElfAddr>() * 8;
        let bloom_idx = (hash as usize / word_bits) % self.bloom_sz as usize;
        let word = unsafe { *self.bloom.add(bloom_idx) };
        // Two-bit bloom test: either bit missing means the symbol can't exist.
        let mask = (1usize << (hash as usize % word_bits))
            | (1usize << ((hash >> self.bloom_shift) as usize % word_bits));
        if (word & mask) != mask {
            return Err(Errno::NotFound);
        }

        let mut i = unsafe { *self.bucket.add((hash % self.bucket_cnt) as usize) };
        if i < self.symoffset {
            return Err(Errno::NotFound);
        }

        // Walk the chain: compare hash low bits, then the name; the low bit
        // of a chain entry marks the end of the chain.
        loop {
            let symname = unsafe { self.sym_name(i) };
            let symhash = unsafe { *self.chain.add((i - self.symoffset) as usize) };
            if let Some(name) = symname {
                if (hash | 1) == (symhash | 1) && name == symbol {
                    log::info!("found {symbol} at symidx {i} (GNU_HASH DEF)");
                    return Ok(i);
                }
            }
            if (symhash & 1) != 0 {
                break;
            }
            i += 1;
        }

        Err(Errno::NotFound)
    }

    // Linear scan over the undefined symbols below `symoffset` (GNU hash
    // never indexes these).
    fn gnu_hash_lookup_undef(&self, symbol: &str) -> Result<u32, Errno> {
        let mut i = 0u32;
        while i < self.symoffset {
            if let Some(name) = unsafe { self.sym_name(i) } {
                if name == symbol {
                    log::info!("found {symbol} at symidx {i} (GNU_HASH UNDEF)");
                    return Ok(i);
                }
            }
            i += 1;
        }
        Err(Errno::NotFound)
    }

    // Symbol name via the string table, or `None` if either table is absent.
    unsafe fn sym_name(&self, idx: u32) -> Option<&str> {
        if self.symtab.is_null() || self.strtab.is_null() {
            return None;
        }
        let sym = unsafe { &*self.symtab.add(idx as usize) };
        let name_ptr = unsafe { self.strtab.add(sym.st_name as usize) };
        let cstr = unsafe { CStr::from_ptr(name_ptr) };
        cstr.to_str().ok()
    }

    // Matches one relocation record's symbol index and type; on a hit,
    // rewrites the GOT slot it identifies. `r_type` is matched the same way
    // across every region: a symbol reference can legitimately surface as a
    // JUMP_SLOT in one region and a GLOB_DAT/ABS in another.
    #[allow(clippy::too_many_arguments)]
    fn find_and_replace(
        &self,
        section: &str,
        symbol: &str,
        new_func: *mut libc::c_void,
        old_func: *mut *mut libc::c_void,
        symidx: u32,
        r_offset: usize,
        r_info: ElfXword,
        found: Option<&mut bool>,
    ) -> Result<(), Errno> {
        let r_sym = elf_r_sym(r_info as u64);
        if r_sym != symidx {
            return Ok(());
        }
        let r_type = elf_r_type(r_info as u64);
        if r_type != R_GENERIC_JUMP_SLOT && r_type != R_GENERIC_GLOB_DAT && r_type != R_GENERIC_ABS {
            return Ok(());
        }

        if let Some(found) = found {
            *found = true;
        }

        log::info!("found {symbol} at {section} offset {r_offset:#x}");

        let addr = self.bias_addr + r_offset;
        if addr < self.base_addr {
            return Err(Errno::Format);
        }

        unsafe { self.replace_function(symbol, addr, new_func, old_func) }
    }

    // Overwrites a GOT slot with `new_func`, flipping the enclosing page to
    // read+write (never restored afterward, see design notes) and issuing an
    // instruction-cache flush on architectures that require one.
    unsafe fn replace_function(
        &self,
        symbol: &str,
        addr: usize,
        new_func: *mut libc::c_void,
        old_func: *mut *mut libc::c_void,
    ) -> Result<(), Errno> {
        let slot = addr as *mut *mut libc::c_void;
        let current = unsafe { ptr::read(slot) };
        if current == new_func {
            // Already hooked to this target: idempotent, still report the
            // value actually installed at this slot.
            if !old_func.is_null() {
                unsafe { *old_func = current };
            }
            return Ok(());
        }

        let old_prot = self.load_segment_prot(addr)?;
        let need_prot = (old_prot | memory::PROT_WRITE) & !memory::PROT_EXEC;
        if old_prot != need_prot {
            memory::set_addr_protect(addr, need_prot)?;
        }

        let old_addr = unsafe { ptr::read(slot) };
        if !old_func.is_null() {
            unsafe { *old_func = old_addr };
        }

        unsafe { ptr::write(slot, new_func) };

        let (page_start, page_len) = memory::page_bounds(addr);
        memory::flush_instruction_cache(page_start, page_start + page_len);

        log::info!("hook ok {slot:p}: {old_addr:p} -> {new_func:p} {symbol} {}", self.pathname);
        Ok(())
    }
}
