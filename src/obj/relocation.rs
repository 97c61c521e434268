use std::{mem, os::unix::io::RawFd};

use log::debug;
use object::{
    elf::{Rel64, Sym64, SHT_SYMTAB},
    read::elf::{SectionHeader, Sym},
    Endianness,
};
use thiserror::Error;

use super::{metadata::MAP_DEF_SIZE, Object, Section};
use crate::generated::{bpf_insn, BPF_DW, BPF_IMM, BPF_LD, BPF_PSEUDO_MAP_FD};

pub(crate) const INS_SIZE: usize = mem::size_of::<bpf_insn>();

const LD_IMM64: u8 = (BPF_LD | BPF_IMM | BPF_DW) as u8;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelocationError {
    #[error("no symbol table found")]
    MissingSymbolTable,

    #[error("invalid relocation entry size `{size}`")]
    InvalidEntrySize { size: u64 },

    #[error("section {index} can't be read as a relocation or symbol table")]
    InvalidSection { index: usize },

    #[error("unknown symbol, index `{index}`")]
    UnknownSymbol { index: usize },

    #[error("invalid map index `{index}`, {count} maps were created")]
    InvalidMapIndex { index: usize, count: usize },

    #[error("invalid relocation offset `{offset}`")]
    InvalidRelocationOffset { offset: u64 },

    #[error("invalid instruction `{code:#04x}` at index `{index}` referenced by relocation")]
    InvalidRelocationInstruction { index: usize, code: u8 },
}

/// Decodes program bytecode into instructions. Trailing bytes that don't form
/// a whole instruction are dropped.
pub fn parse_instructions(data: &[u8]) -> Vec<bpf_insn> {
    data.chunks_exact(INS_SIZE)
        .map(|b| bpf_insn {
            code: b[0],
            _bitfield_1: b[1],
            off: i16::from_ne_bytes([b[2], b[3]]),
            imm: i32::from_ne_bytes([b[4], b[5], b[6], b[7]]),
        })
        .collect()
}

/// The `Elf64_Rel` entries of the relocation section `rel`.
pub(crate) fn parse_relocations<'o>(
    obj: &'o Object,
    rel: &Section,
) -> Result<&'o [Rel64<Endianness>], RelocationError> {
    if rel.entry_size != mem::size_of::<Rel64<Endianness>>() as u64 {
        return Err(RelocationError::InvalidEntrySize {
            size: rel.entry_size,
        });
    }

    let invalid = || RelocationError::InvalidSection { index: rel.index };
    let table = obj.section_table().map_err(|_| invalid())?;
    let header = table.iter().nth(rel.index).ok_or_else(invalid)?;
    match header.rel(obj.endianness, &*obj.data) {
        Ok(Some((relocations, _))) => Ok(relocations),
        Ok(None) => Ok(&[]),
        Err(_) => Err(invalid()),
    }
}

fn parse_symbols<'o>(
    obj: &'o Object,
    symtab: &Section,
) -> Result<&'o [Sym64<Endianness>], RelocationError> {
    let invalid = |_| RelocationError::InvalidSection {
        index: symtab.index,
    };
    let table = obj.section_table().map_err(invalid)?;
    let symbols = table
        .symbols(obj.endianness, &*obj.data, SHT_SYMTAB)
        .map_err(invalid)?;
    Ok(symbols.symbols())
}

/// Applies every entry of the relocation section `rel` to `insns`, pointing
/// map loads at the file descriptors in `map_fds`.
///
/// Each symbol value is a byte offset into the `maps` section, so the map
/// index is the value divided by the size of a map definition. The first bad
/// entry stops the relocation, leaving the entries before it applied.
///
/// Returns the number of patched instructions.
pub fn relocate(
    insns: &mut [bpf_insn],
    obj: &Object,
    rel: &Section,
    symtab: Option<&Section>,
    map_fds: &[RawFd],
) -> Result<usize, RelocationError> {
    let relocations = parse_relocations(obj, rel)?;
    if relocations.is_empty() {
        return Ok(0);
    }
    let symtab = symtab.ok_or(RelocationError::MissingSymbolTable)?;
    let symbols = parse_symbols(obj, symtab)?;
    let endian = obj.endianness;

    for rel in relocations {
        let offset = rel.r_offset.get(endian);
        let ins_index = (offset / INS_SIZE as u64) as usize;
        let ins = insns
            .get_mut(ins_index)
            .ok_or(RelocationError::InvalidRelocationOffset { offset })?;
        if ins.code != LD_IMM64 {
            return Err(RelocationError::InvalidRelocationInstruction {
                index: ins_index,
                code: ins.code,
            });
        }

        let sym_index = rel.r_sym(endian) as usize;
        let value = symbols
            .get(sym_index)
            .ok_or(RelocationError::UnknownSymbol { index: sym_index })?
            .st_value(endian);
        let map_index = (value / MAP_DEF_SIZE as u64) as usize;
        let fd = *map_fds
            .get(map_index)
            .ok_or(RelocationError::InvalidMapIndex {
                index: map_index,
                count: map_fds.len(),
            })?;

        debug!("relocating instruction {ins_index} to map {map_index} (fd {fd})");
        ins.set_src_reg(BPF_PSEUDO_MAP_FD as u8);
        ins.imm = fd;
    }

    Ok(relocations.len())
}
