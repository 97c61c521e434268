use std::{
    collections::HashSet,
    ffi::{CStr, CString},
    fs,
    os::unix::io::RawFd,
    path::Path,
};

use log::{debug, warn};
use object::elf::SHT_REL;
use thiserror::Error;

use crate::{
    generated::bpf_insn,
    maps::{create_maps, MapData, MapError, Maps},
    obj::{
        parse_instructions, parse_metadata_section, relocate, KernelVersion, MetadataSection,
        Object, ParseError, ProgramKind, RelocationError, Section,
    },
    programs::{load_and_attach, LoadOptions, LoadedProgram, ProgramError, VerifierLogLevel},
    tracefs::{DebugFs, TraceFs, KPROBE_EVENTS},
};

/// A map definition as laid out in the `maps` section.
#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct bpf_map_def {
    pub map_type: u32,
    pub key_size: u32,
    pub value_size: u32,
    pub max_entries: u32,
    pub map_flags: u32,
}

/// Builder style API for advanced loading of eBPF objects.
///
/// Loading happens in three passes over the sections of the object:
///
/// 1. The `license`, `version` and `maps` sections and the symbol table are
///    parsed, then the maps are created.
/// 2. Every relocation section is applied to the program it targets, and the
///    patched program is loaded.
/// 3. Program sections that had no relocation section are loaded as they are.
///
/// # Examples
///
/// ```no_run
/// use bpf_elf_loader::{BpfLoader, VerifierLogLevel};
///
/// let bpf = BpfLoader::new()
///     .verifier_log_level(VerifierLogLevel::VERBOSE)
///     .load_file("file.o")?;
/// for program in bpf.programs() {
///     println!("{} -> {}", program.section(), program.fd());
/// }
/// # Ok::<(), bpf_elf_loader::BpfError>(())
/// ```
pub struct BpfLoader<'a> {
    tracefs: Option<Box<dyn TraceFs + 'a>>,
    clear_kprobes: bool,
    raise_memlock: bool,
    verifier_log_level: VerifierLogLevel,
    extended_kinds: bool,
}

impl<'a> BpfLoader<'a> {
    /// Creates a new loader instance.
    pub fn new() -> BpfLoader<'a> {
        BpfLoader {
            tracefs: None,
            clear_kprobes: true,
            raise_memlock: true,
            verifier_log_level: VerifierLogLevel::default(),
            extended_kinds: false,
        }
    }

    /// Sets the control files used to register probes and look up event ids.
    ///
    /// Defaults to [`DebugFs::from_mount`].
    pub fn tracefs<T: TraceFs + 'a>(&mut self, tracefs: T) -> &mut BpfLoader<'a> {
        self.tracefs = Some(Box::new(tracefs));
        self
    }

    /// Whether to remove every registered kprobe before loading. Defaults to
    /// `true`.
    pub fn clear_kprobes(&mut self, clear: bool) -> &mut BpfLoader<'a> {
        self.clear_kprobes = clear;
        self
    }

    /// Whether to raise `RLIMIT_MEMLOCK` and retry once when the kernel
    /// refuses a program with `EPERM`. Defaults to `true`.
    pub fn raise_memlock(&mut self, raise: bool) -> &mut BpfLoader<'a> {
        self.raise_memlock = raise;
        self
    }

    /// Sets the verifier log level. The log is attached to
    /// [`ProgramError::LoadFailed`].
    ///
    /// Any level other than [`VerifierLogLevel::DISABLE`] hands the kernel a
    /// 64 KiB log buffer. The kernel rejects programs whose log doesn't fit
    /// with `ENOSPC`, so large programs that verify fine at
    /// [`VerifierLogLevel::DISABLE`] can fail at the default
    /// [`VerifierLogLevel::DEBUG`].
    pub fn verifier_log_level(&mut self, level: VerifierLogLevel) -> &mut BpfLoader<'a> {
        self.verifier_log_level = level;
        self
    }

    /// Loads `tracepoint`, `xdp`, `perf_event` and `socket` sections too.
    ///
    /// Without this only `kprobe` and `kretprobe` sections are loaded, and the
    /// other program sections fail with [`ProgramError::UnknownEvent`].
    pub fn allow_extended_kinds(&mut self) -> &mut BpfLoader<'a> {
        self.extended_kinds = true;
        self
    }

    /// Loads the object file at `path`.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<Bpf, BpfError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|io_error| ParseError::FileError {
            path: path.to_owned(),
            io_error,
        })?;
        self.load(&data)
    }

    /// Loads an object from a byte buffer.
    ///
    /// Malformed metadata sections and map creation failures abort the load.
    /// Failures to relocate, load or attach a single program don't: they are
    /// logged and collected in [`Bpf::failures`].
    pub fn load(&mut self, data: &[u8]) -> Result<Bpf, BpfError> {
        let obj = Object::parse(data)?;

        let mut default_tracefs;
        let tracefs: &mut dyn TraceFs = match &mut self.tracefs {
            Some(tracefs) => &mut **tracefs,
            None => {
                default_tracefs = DebugFs::from_mount();
                &mut default_tracefs
            }
        };

        if self.clear_kprobes {
            if let Err(e) = tracefs.clear(Path::new(KPROBE_EVENTS)) {
                warn!("failed to clear {KPROBE_EVENTS}: {e}");
            }
        }

        let mut processed = HashSet::new();
        let Metadata {
            license,
            kernel_version,
            map_defs,
            symtab,
        } = read_metadata(&obj, &mut processed)?;
        let maps = create_maps(&map_defs)?;
        let map_fds = maps.fds();

        let opts = LoadOptions {
            license: &license,
            kernel_version,
            log_level: self.verifier_log_level,
            raise_memlock: self.raise_memlock,
            extended_kinds: self.extended_kinds,
        };
        let mut state = LoadState {
            opts,
            tracefs,
            programs: Vec::new(),
            failures: Vec::new(),
        };

        for index in 1..obj.section_count() {
            let Ok(section) = obj.section_at(index) else {
                continue;
            };
            if section.kind() != SHT_REL {
                continue;
            }

            let target_index = section.info() as usize;
            let target = match obj.section_at(target_index) {
                Ok(target) if !processed.contains(&target_index) => target,
                _ => {
                    warn!(
                        "skipping relocation section {index} `{}`: target section {target_index} is missing or already loaded",
                        section.name()
                    );
                    continue;
                }
            };
            processed.insert(index);
            processed.insert(target_index);

            let mut insns = parse_instructions(target.data());
            match relocate(&mut insns, &obj, section, symtab, &map_fds) {
                Ok(count) => debug!("applied {count} relocations to `{}`", target.name()),
                Err(e) => {
                    state.fail(target, e.into());
                    continue;
                }
            }

            if let Some(kind) = ProgramKind::from_section_name(target.name()) {
                state.load_program(target, kind, &insns);
            }
        }

        for index in 1..obj.section_count() {
            if processed.contains(&index) {
                continue;
            }
            let Ok(section) = obj.section_at(index) else {
                continue;
            };
            if let Some(kind) = ProgramKind::from_section_name(section.name()) {
                processed.insert(index);
                let insns = parse_instructions(section.data());
                state.load_program(section, kind, &insns);
            }
        }

        let LoadState {
            programs, failures, ..
        } = state;
        Ok(Bpf {
            license,
            kernel_version,
            maps,
            programs,
            failures,
        })
    }
}

impl Default for BpfLoader<'_> {
    fn default() -> Self {
        BpfLoader::new()
    }
}

struct Metadata<'o> {
    license: CString,
    kernel_version: KernelVersion,
    map_defs: Vec<bpf_map_def>,
    symtab: Option<&'o Section>,
}

fn read_metadata<'o>(
    obj: &'o Object,
    processed: &mut HashSet<usize>,
) -> Result<Metadata<'o>, ParseError> {
    let mut metadata = Metadata {
        license: CString::default(),
        kernel_version: KernelVersion::default(),
        map_defs: Vec::new(),
        symtab: None,
    };

    for index in 1..obj.section_count() {
        let section = match obj.section_at(index) {
            Ok(section) => section,
            Err(e) => {
                debug!("skipping section {index}: {e}");
                continue;
            }
        };
        debug!(
            "section {index} `{}` type {} size {} link {} info {} flags {:#x}",
            section.name(),
            section.kind(),
            section.data().len(),
            section.link(),
            section.info(),
            section.flags()
        );

        match parse_metadata_section(section, obj.endianness())? {
            Some(MetadataSection::License(license)) => metadata.license = license,
            Some(MetadataSection::Version(version)) => metadata.kernel_version = version,
            Some(MetadataSection::Maps(defs)) => metadata.map_defs = defs,
            Some(MetadataSection::SymbolTable) => metadata.symtab = Some(section),
            None => continue,
        }
        processed.insert(index);
    }

    Ok(metadata)
}

struct LoadState<'l, 'a> {
    opts: LoadOptions<'l>,
    tracefs: &'a mut dyn TraceFs,
    programs: Vec<LoadedProgram>,
    failures: Vec<SectionFailure>,
}

impl LoadState<'_, '_> {
    fn load_program(&mut self, section: &Section, kind: ProgramKind, insns: &[bpf_insn]) {
        if let Err(e) = load_and_attach(
            section.name(),
            kind,
            insns,
            &self.opts,
            &mut *self.tracefs,
            &mut self.programs,
        ) {
            self.fail(section, e.into());
        }
    }

    fn fail(&mut self, section: &Section, error: BpfError) {
        warn!("section {} `{}`: {error}", section.index(), section.name());
        self.failures.push(SectionFailure {
            index: section.index(),
            section: section.name().to_string(),
            error,
        });
    }
}

/// The programs and maps loaded from an object.
///
/// File descriptors are never closed by the loader. They stay open for the
/// lifetime of the process unless the caller closes them.
#[derive(Debug)]
pub struct Bpf {
    license: CString,
    kernel_version: KernelVersion,
    maps: Maps,
    programs: Vec<LoadedProgram>,
    failures: Vec<SectionFailure>,
}

impl Bpf {
    /// Loads the object file at `path` with the default settings.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Bpf, BpfError> {
        BpfLoader::new().load_file(path)
    }

    /// Loads an object from a byte buffer with the default settings.
    pub fn load(data: &[u8]) -> Result<Bpf, BpfError> {
        BpfLoader::new().load(data)
    }

    /// The loaded programs, in load order.
    pub fn programs(&self) -> &[LoadedProgram] {
        &self.programs
    }

    pub fn program_fds(&self) -> Vec<RawFd> {
        self.programs.iter().map(|p| p.fd()).collect()
    }

    /// The perf event of each loaded program, in the same order as
    /// [`Bpf::program_fds`]. Programs that are not attached have `None`.
    pub fn event_fds(&self) -> Vec<Option<RawFd>> {
        self.programs.iter().map(|p| p.event_fd()).collect()
    }

    /// The created maps, in the order of the `maps` section.
    pub fn maps(&self) -> &[MapData] {
        self.maps.as_slice()
    }

    pub fn map_fds(&self) -> Vec<RawFd> {
        self.maps.fds()
    }

    /// The last program array map created, used for tail calls.
    pub fn prog_array_fd(&self) -> Option<RawFd> {
        self.maps.prog_array_fd()
    }

    pub fn license(&self) -> &CStr {
        &self.license
    }

    pub fn kernel_version(&self) -> KernelVersion {
        self.kernel_version
    }

    /// Sections that failed to relocate, load or attach.
    pub fn failures(&self) -> &[SectionFailure] {
        &self.failures
    }
}

/// Loads the object file at `path` with the default settings.
pub fn load_bpf_file<P: AsRef<Path>>(path: P) -> Result<Bpf, BpfError> {
    Bpf::load_file(path)
}

/// A section that could not be relocated, loaded or attached.
#[derive(Debug)]
pub struct SectionFailure {
    index: usize,
    section: String,
    error: BpfError,
}

impl SectionFailure {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn error(&self) -> &BpfError {
        &self.error
    }
}

#[derive(Debug, Error)]
pub enum BpfError {
    #[error("error parsing BPF object: {0}")]
    ParseError(#[from] ParseError),
    #[error("error relocating BPF object: {0}")]
    RelocationError(#[from] RelocationError),
    #[error("map error: {0}")]
    MapError(#[from] MapError),
    #[error("program error: {0}")]
    ProgramError(#[from] ProgramError),
}
