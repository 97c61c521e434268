//! ELF object parsing.

mod metadata;
mod relocation;

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use object::{
    elf,
    read::elf::{FileHeader, SectionHeader, SectionTable},
    Endianness,
};
use thiserror::Error;

pub use metadata::{parse_license, parse_map_defs, parse_version, KernelVersion, MetadataSection};
pub use relocation::{parse_instructions, relocate, RelocationError};

pub(crate) use metadata::parse_metadata_section;

/// A relocatable eBPF object file, split into its sections.
#[derive(Debug, Clone)]
pub struct Object {
    pub(crate) endianness: Endianness,
    pub(crate) data: Vec<u8>,
    pub(crate) sections: Vec<Section>,
}

/// One section of an [`Object`], read once and never modified.
#[derive(Debug, Clone)]
pub struct Section {
    pub(crate) index: usize,
    pub(crate) name: String,
    pub(crate) kind: u32,
    pub(crate) data: Vec<u8>,
    pub(crate) size: u64,
    pub(crate) link: u32,
    pub(crate) info: u32,
    pub(crate) flags: u64,
    pub(crate) entry_size: u64,
}

impl Section {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ELF section type (`sh_type`).
    pub fn kind(&self) -> u32 {
        self.kind
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The index of the associated section, meaning depends on the section
    /// type (`sh_link`).
    pub fn link(&self) -> u32 {
        self.link
    }

    /// Extra section information (`sh_info`). For relocation sections this is
    /// the index of the section the relocations apply to.
    pub fn info(&self) -> u32 {
        self.info
    }

    pub fn flags(&self) -> u64 {
        self.flags
    }

    pub fn entry_size(&self) -> u64 {
        self.entry_size
    }
}

impl Object {
    /// Reads and parses the object file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Object, ParseError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|io_error| ParseError::FileError {
            path: path.to_owned(),
            io_error,
        })?;
        Object::parse(&data)
    }

    /// Parses an ELF64 object, validating its identification block before any
    /// section is read.
    pub fn parse(data: &[u8]) -> Result<Object, ParseError> {
        let header = elf::FileHeader64::<Endianness>::parse(data)
            .map_err(|source| ParseError::Error { source })?;
        let endianness = header
            .endian()
            .map_err(|source| ParseError::Error { source })?;
        let table = header
            .sections(endianness, data)
            .map_err(|source| ParseError::Error { source })?;

        let sections = table
            .iter()
            .enumerate()
            .map(|(index, shdr)| {
                let map_err = |source| ParseError::SectionError { index, source };
                // unnamed sections are kept so that indices stay aligned with
                // the section header table
                let name = table
                    .section_name(endianness, shdr)
                    .ok()
                    .and_then(|name| std::str::from_utf8(name).ok())
                    .unwrap_or_default()
                    .to_string();
                Ok(Section {
                    index,
                    name,
                    kind: shdr.sh_type(endianness),
                    data: shdr.data(endianness, data).map_err(map_err)?.to_vec(),
                    size: shdr.sh_size(endianness),
                    link: shdr.sh_link(endianness),
                    info: shdr.sh_info(endianness),
                    flags: shdr.sh_flags(endianness),
                    entry_size: shdr.sh_entsize(endianness),
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        Ok(Object {
            endianness,
            data: data.to_vec(),
            sections,
        })
    }

    /// The section header table of the file the object was parsed from.
    pub(crate) fn section_table(
        &self,
    ) -> Result<SectionTable<'_, elf::FileHeader64<Endianness>>, object::read::Error> {
        elf::FileHeader64::<Endianness>::parse(&*self.data)?.sections(self.endianness, &*self.data)
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// The number of entries in the section header table, including the
    /// reserved null section at index 0.
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// The symbol table of the object, if it has one.
    pub fn symbol_table(&self) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == elf::SHT_SYMTAB)
    }

    /// Returns the section at `index`.
    ///
    /// Fails with [`ParseError::EmptySection`] when the section has no name or
    /// no content; callers are expected to skip such sections.
    pub fn section_at(&self, index: usize) -> Result<&Section, ParseError> {
        let section = self
            .sections
            .get(index)
            .ok_or(ParseError::NoSuchSection { index })?;
        if section.name.is_empty() || section.size == 0 {
            return Err(ParseError::EmptySection { index });
        }
        Ok(section)
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("error parsing ELF data")]
    Error {
        #[source]
        source: object::read::Error,
    },

    #[error("error reading {}", path.display())]
    FileError {
        path: PathBuf,
        #[source]
        io_error: io::Error,
    },

    #[error("error parsing section with index {index}")]
    SectionError {
        index: usize,
        #[source]
        source: object::read::Error,
    },

    #[error("no section with index {index}")]
    NoSuchSection { index: usize },

    #[error("section {index} has no name or is empty")]
    EmptySection { index: usize },

    #[error("invalid license `{data:?}`")]
    InvalidLicense { data: Vec<u8> },

    #[error("invalid kernel version `{data:?}`")]
    InvalidKernelVersion { data: Vec<u8> },
}

/// The instrumentation point a program section targets, derived from the
/// section name prefix.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProgramKind {
    KProbe,
    KRetProbe,
    TracePoint,
    Xdp,
    PerfEvent,
    SocketFilter,
}

impl ProgramKind {
    const ALL: [ProgramKind; 6] = [
        ProgramKind::KProbe,
        ProgramKind::KRetProbe,
        ProgramKind::TracePoint,
        ProgramKind::Xdp,
        ProgramKind::PerfEvent,
        ProgramKind::SocketFilter,
    ];

    /// The literal section name prefix identifying this kind.
    pub fn prefix(&self) -> &'static str {
        use ProgramKind::*;
        match self {
            KProbe => "kprobe/",
            KRetProbe => "kretprobe/",
            TracePoint => "tracepoint/",
            Xdp => "xdp",
            PerfEvent => "perf_event",
            SocketFilter => "socket",
        }
    }

    /// Classifies a section by name, returning `None` for sections that are
    /// not programs.
    pub fn from_section_name(name: &str) -> Option<ProgramKind> {
        ProgramKind::ALL
            .into_iter()
            .find(|kind| name.starts_with(kind.prefix()))
    }
}
