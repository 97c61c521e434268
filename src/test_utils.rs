//! Helpers to build objects and raw section content in tests.

use std::mem;

use object::{
    elf,
    read::elf::FileHeader,
    write::{self, Relocation, SectionId, Symbol, SymbolId, SymbolSection},
    Architecture, BinaryFormat, Endianness, RelocationFlags, SectionKind, SymbolFlags, SymbolKind,
    SymbolScope,
};

use crate::{
    bpf_map_def,
    obj::{Object, Section},
};

/// Builds little endian eBPF relocatable objects.
pub(crate) struct ElfBuilder {
    obj: write::Object<'static>,
    maps: Option<SectionId>,
}

impl ElfBuilder {
    pub(crate) fn new() -> ElfBuilder {
        ElfBuilder {
            obj: write::Object::new(BinaryFormat::Elf, Architecture::Bpf, Endianness::Little),
            maps: None,
        }
    }

    fn add_section(&mut self, name: &str, kind: SectionKind, data: &[u8]) -> SectionId {
        let id = self
            .obj
            .add_section(Vec::new(), name.as_bytes().to_vec(), kind);
        self.obj.append_section_data(id, data, 8);
        if name == "maps" {
            self.maps = Some(id);
        }
        id
    }

    pub(crate) fn section(&mut self, name: &str, data: &[u8]) -> SectionId {
        self.add_section(name, SectionKind::Data, data)
    }

    pub(crate) fn program(&mut self, name: &str, insns: &[[u8; 8]]) -> SectionId {
        self.add_section(name, SectionKind::Text, &insns.concat())
    }

    /// Adds a global symbol `offset` bytes into the `maps` section.
    pub(crate) fn map_symbol(&mut self, name: &str, offset: u64) -> SymbolId {
        let maps = self.maps.expect("no maps section");
        self.obj.add_symbol(Symbol {
            name: name.as_bytes().to_vec(),
            value: offset,
            size: mem::size_of::<bpf_map_def>() as u64,
            kind: SymbolKind::Data,
            scope: SymbolScope::Dynamic,
            weak: false,
            section: SymbolSection::Section(maps),
            flags: SymbolFlags::None,
        })
    }

    /// Points the instruction at byte `offset` of `section` at `symbol` with
    /// an `R_BPF_64_64` relocation.
    pub(crate) fn relocation(&mut self, section: SectionId, offset: u64, symbol: SymbolId) {
        self.obj
            .add_relocation(
                section,
                Relocation {
                    offset,
                    symbol,
                    addend: 0,
                    flags: RelocationFlags::Elf {
                        r_type: elf::R_BPF_64_64,
                    },
                },
            )
            .unwrap();
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        self.obj.write().unwrap()
    }
}

/// Rewrites the header of the section `name` in the ELF image `data`, for
/// malformed objects the builder can't produce.
pub(crate) fn patch_section_header(
    data: &mut [u8],
    name: &str,
    patch: impl FnOnce(&mut elf::SectionHeader64<Endianness>, Endianness),
) {
    let index = section_index(data, name);
    let (offset, endian) = {
        let header = elf::FileHeader64::<Endianness>::parse(&*data).unwrap();
        let endian = header.endian().unwrap();
        let offset = header.e_shoff(endian) as usize
            + index * mem::size_of::<elf::SectionHeader64<Endianness>>();
        (offset, endian)
    };
    let (shdr, _) =
        object::pod::from_bytes_mut::<elf::SectionHeader64<Endianness>>(&mut data[offset..])
            .unwrap();
    patch(shdr, endian);
}

/// The index of the section `name` in the ELF image `data`.
pub(crate) fn section_index(data: &[u8], name: &str) -> usize {
    Object::parse(data)
        .unwrap()
        .sections
        .iter()
        .position(|s| s.name == name)
        .unwrap()
}

/// A standalone section, as if read at index 1 of an object.
pub(crate) fn section(name: &str, kind: u32, data: &[u8]) -> Section {
    Section {
        index: 1,
        name: name.to_string(),
        kind,
        data: data.to_vec(),
        size: data.len() as u64,
        link: 0,
        info: 0,
        flags: 0,
        entry_size: 0,
    }
}

pub(crate) fn map_def_bytes(defs: &[bpf_map_def]) -> Vec<u8> {
    defs.iter()
        .flat_map(|def| {
            [
                def.map_type,
                def.key_size,
                def.value_size,
                def.max_entries,
                def.map_flags,
            ]
        })
        .flat_map(u32::to_le_bytes)
        .collect()
}

/// First half of `r<dst> = map_fd ll`, with the immediate left for relocation.
pub(crate) fn ld_map_fd_insn(dst: u8) -> [u8; 8] {
    [0x18, dst & 0x0f, 0, 0, 0, 0, 0, 0]
}

pub(crate) fn exit_insn() -> [u8; 8] {
    [0x95, 0, 0, 0, 0, 0, 0, 0]
}
