// Public API: PLT/GOT hooking, export lookup, GOT slot collection.

impl Elf {
    // Hooks `symbol`, scanning `.rel(a).plt`, then `.rel(a).dyn`, then the
    // Android packed relocation region, in that order.
    pub unsafe fn hook(
        &self,
        symbol: &str,
        new_func: *mut libc::c_void,
        old_func: *mut *mut libc::c_void,
    ) -> Result<(), Errno> {
        self.require_init()?;
        if symbol.is_empty() || new_func.is_null() {
            return Err(Errno::Invalid);
        }

        log::info!("hooking {symbol} in {}", self.pathname);

        let symidx = match self.find_symidx_by_name(symbol) {
            Ok(symidx) => symidx,
            Err(Errno::NotFound) => return Ok(()),
            Err(err) => return Err(err),
        };

        // .rel(a).plt: a symbol has at most one JUMP_SLOT, stop at the first.
        if self.relplt != 0 {
            let relplt_cnt = self.relplt_sz
                / if self.is_use_rela {
                    mem::size_of::<ElfRela>()
                } else {
                    mem::size_of::<ElfRel>()
                };
            let section = if self.is_use_rela { ".rela.plt" } else { ".rel.plt" };
            let mut found = false;
            if self.is_use_rela {
                let relas = unsafe { slice::from_raw_parts(self.relplt as *const ElfRela, relplt_cnt) };
                for rela in relas {
                    unsafe {
                        self.find_and_replace(
                            section,
                            symbol,
                            new_func,
                            old_func,
                            symidx,
                            rela.r_offset as usize,
                            rela.r_info as ElfXword,
                            Some(&mut found),
                        )?
                    };
                    if found {
                        break;
                    }
                }
            } else {
                let rels = unsafe { slice::from_raw_parts(self.relplt as *const ElfRel, relplt_cnt) };
                for rel in rels {
                    unsafe {
                        self.find_and_replace(
                            section,
                            symbol,
                            new_func,
                            old_func,
                            symidx,
                            rel.r_offset as usize,
                            rel.r_info as ElfXword,
                            Some(&mut found),
                        )?
                    };
                    if found {
                        break;
                    }
                }
            }
        }

        // .rel(a).dyn: GLOB_DAT / ABS may appear more than once, replace all.
        if self.reldyn != 0 {
            let reldyn_cnt = self.reldyn_sz
                / if self.is_use_rela {
                    mem::size_of::<ElfRela>()
                } else {
                    mem::size_of::<ElfRel>()
                };
            let section = if self.is_use_rela { ".rela.dyn" } else { ".rel.dyn" };
            if self.is_use_rela {
                let relas = unsafe { slice::from_raw_parts(self.reldyn as *const ElfRela, reldyn_cnt) };
                for rela in relas {
                    unsafe {
                        self.find_and_replace(
                            section,
                            symbol,
                            new_func,
                            old_func,
                            symidx,
                            rela.r_offset as usize,
                            rela.r_info as ElfXword,
                            None,
                        )?
                    };
                }
            } else {
                let rels = unsafe { slice::from_raw_parts(self.reldyn as *const ElfRel, reldyn_cnt) };
                for rel in rels {
                    unsafe {
                        self.find_and_replace(
                            section,
                            symbol,
                            new_func,
                            old_func,
                            symidx,
                            rel.r_offset as usize,
                            rel.r_info as ElfXword,
                            None,
                        )?
                    };
                }
            }
        }

        if self.relandroid != 0 {
            let section = if self.is_use_rela { ".rela.android" } else { ".rel.android" };
            let mut packed =
                unsafe { PackedRelocIterator::new(self.relandroid, self.relandroid_sz, self.is_use_rela)? };
            while let Some(reloc) = unsafe { packed.next()? } {
                unsafe {
                    self.find_and_replace(
                        section,
                        symbol,
                        new_func,
                        old_func,
                        symidx,
                        reloc.r_offset,
                        reloc.r_info,
                        None,
                    )?
                };
            }
        }

        Ok(())
    }

    // Resolves `symbol` to its runtime address, or `None` if it's undefined
    // or resolves to zero.
    pub fn find_export_function(&self, symbol: &str) -> Option<usize> {
        self.require_init().ok()?;
        let symidx = self.find_symidx_by_name(symbol).ok()?;
        unsafe {
            let sym = &*self.symtab.add(symidx as usize);
            if sym.st_shndx == SHN_UNDEF || sym.st_value == 0 {
                return None;
            }
            Some(self.bias_addr + sym.st_value as usize)
        }
    }

    // Collects every GOT slot address referencing `symbol`, optionally
    // filtered to slots currently pointing at one of `callee_addrs`.
    pub unsafe fn find_got_slots(
        &self,
        symbol: &str,
        callee_addrs: Option<&BTreeSet<usize>>,
    ) -> Result<Vec<usize>, Errno> {
        self.require_init()?;
        let symidx = match self.find_symidx_by_name(symbol) {
            Ok(value) => value,
            Err(Errno::NotFound) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        let mut slots = BTreeSet::new();

        if self.relplt != 0 {
            let relplt_cnt = self.relplt_sz
                / if self.is_use_rela {
                    mem::size_of::<ElfRela>()
                } else {
                    mem::size_of::<ElfRel>()
                };
            if self.is_use_rela {
                let relas = unsafe { slice::from_raw_parts(self.relplt as *const ElfRela, relplt_cnt) };
                for rela in relas {
                    self.collect_slot(
                        &mut slots,
                        true,
                        symidx,
                        callee_addrs,
                        rela.r_offset as usize,
                        rela.r_info as ElfXword,
                    )?;
                }
            } else {
                let rels = unsafe { slice::from_raw_parts(self.relplt as *const ElfRel, relplt_cnt) };
                for rel in rels {
                    self.collect_slot(
                        &mut slots,
                        true,
                        symidx,
                        callee_addrs,
                        rel.r_offset as usize,
                        rel.r_info as ElfXword,
                    )?;
                }
            }
        }

        if self.reldyn != 0 {
            let reldyn_cnt = self.reldyn_sz
                / if self.is_use_rela {
                    mem::size_of::<ElfRela>()
                } else {
                    mem::size_of::<ElfRel>()
                };
            if self.is_use_rela {
                let relas = unsafe { slice::from_raw_parts(self.reldyn as *const ElfRela, reldyn_cnt) };
                for rela in relas {
                    self.collect_slot(
                        &mut slots,
                        false,
                        symidx,
                        callee_addrs,
                        rela.r_offset as usize,
                        rela.r_info as ElfXword,
                    )?;
                }
            } else {
                let rels = unsafe { slice::from_raw_parts(self.reldyn as *const ElfRel, reldyn_cnt) };
                for rel in rels {
                    self.collect_slot(
                        &mut slots,
                        false,
                        symidx,
                        callee_addrs,
                        rel.r_offset as usize,
                        rel.r_info as ElfXword,
                    )?;
                }
            }
        }

        if self.relandroid != 0 {
            let mut packed =
                unsafe { PackedRelocIterator::new(self.relandroid, self.relandroid_sz, self.is_use_rela)? };
            while let Some(reloc) = unsafe { packed.next()? } {
                self.collect_slot(
                    &mut slots,
                    false,
                    symidx,
                    callee_addrs,
                    reloc.r_offset,
                    reloc.r_info,
                )?;
            }
        }

        Ok(slots.into_iter().collect())
    }

    // Matches a single relocation entry against the target symbol and adds
    // its GOT slot address to `slots` on a hit.
    fn collect_slot(
        &self,
        slots: &mut BTreeSet<usize>,
        is_plt: bool,
        symidx: u32,
        callee_addrs: Option<&BTreeSet<usize>>,
        r_offset: usize,
        r_info: ElfXword,
    ) -> Result<(), Errno> {
        let r_sym = elf_r_sym(r_info as u64);
        if r_sym != symidx {
            return Ok(());
        }

        let r_type = elf_r_type(r_info as u64);
        if r_type != R_GENERIC_JUMP_SLOT && r_type != R_GENERIC_GLOB_DAT && r_type != R_GENERIC_ABS {
            return Ok(());
        }

        let addr = self.bias_addr + r_offset;
        if addr < self.base_addr {
            return Err(Errno::Format);
        }

        if let Some(expected_addrs) = callee_addrs {
            let value = unsafe { ptr::read(addr as *const usize) };
            let matched = expected_addrs.contains(&value);
            if !matched {
                // Lazy PLT binding: the slot may still point at a resolver
                // stub inside a loaded segment rather than the real callee.
                let may_lazy_match =
                    is_plt && expected_addrs.len() == 1 && self.is_addr_in_load_segments(value);
                if !may_lazy_match {
                    return Ok(());
                }
            }
        }

        slots.insert(addr);
        Ok(())
    }
}
