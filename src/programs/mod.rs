//! Program submission and attachment.
//!
//! Every program section is submitted to the kernel with the license and
//! kernel version of its object. Probe and tracepoint programs are then
//! attached to their event through a perf event counter:
//!
//! * `kprobe/<fn>` and `kretprobe/<fn>` register a dynamic probe on `<fn>`
//!   in `kprobe_events` first, see [`probe`].
//! * `tracepoint/<category>/<name>` uses the existing static tracepoint, see
//!   [`trace_point`].
//!
//! Only probe programs are recognized by default. The remaining kinds are
//! submitted only when [`BpfLoader::allow_extended_kinds`] is set, and
//! `xdp`, `perf_event` and `socket` programs are never attached.
//!
//! [`BpfLoader::allow_extended_kinds`]: crate::BpfLoader::allow_extended_kinds

mod perf_attach;
pub mod probe;
pub mod trace_point;

use std::{
    ffi::CStr,
    io,
    os::unix::io::RawFd,
    path::{Path, PathBuf},
};

use libc::{EPERM, RLIM_INFINITY};
use log::{debug, warn};
use thiserror::Error;

use crate::{
    generated::{bpf_insn, bpf_prog_type},
    obj::{KernelVersion, ProgramKind},
    sys::{bpf_load_program, getrlimit_memlock, setrlimit_memlock},
    tracefs::TraceFs,
};

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("unknown event type for program `{name}`")]
    UnknownEvent { name: String },

    #[error("the BPF_PROG_LOAD syscall for `{name}` failed: {io_error}\nVerifier output:\n{verifier_log}")]
    LoadFailed {
        name: String,
        #[source]
        io_error: io::Error,
        verifier_log: String,
    },

    #[error("failed to raise RLIMIT_MEMLOCK")]
    SetRlimitFailed {
        #[source]
        io_error: io::Error,
    },

    #[error("invalid event name `{name}`")]
    InvalidEventName { name: String },

    #[error("failed to register probe in `{}`", path.display())]
    ProbeRegisterFailed {
        path: PathBuf,
        #[source]
        io_error: io::Error,
    },

    #[error("failed to read event id from `{}`", path.display())]
    ProbeIdUnreadable {
        path: PathBuf,
        #[source]
        io_error: io::Error,
    },

    #[error("the perf_event_open syscall failed for event {id}")]
    EventOpenFailed {
        id: u32,
        #[source]
        io_error: io::Error,
    },

    #[error("`{call}` failed on perf event fd {event_fd}")]
    PerfEventAttachFailed {
        call: String,
        /// The counter that was opened but could not be enabled or bound.
        event_fd: RawFd,
        #[source]
        io_error: io::Error,
    },
}

bitflags::bitflags! {
    /// Verifier log flags passed with every program, see
    /// [`BpfLoader::verifier_log_level`](crate::BpfLoader::verifier_log_level).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct VerifierLogLevel: u32 {
        /// Sets no verifier logging.
        const DISABLE = 0;
        /// Enables debug verifier logging.
        const DEBUG = 1;
        /// Enables verbose verifier logging.
        const VERBOSE = 2 | Self::DEBUG.bits();
        /// Enables verifier stats.
        const STATS = 4;
    }
}

impl Default for VerifierLogLevel {
    fn default() -> Self {
        Self::DEBUG
    }
}

const VERIFIER_LOG_SIZE: usize = 64 * 1024;

/// Buffer the kernel writes the verifier output into.
pub(crate) struct VerifierLog {
    buf: Vec<u8>,
}

impl VerifierLog {
    fn new(level: VerifierLogLevel) -> VerifierLog {
        let size = if level.is_empty() {
            0
        } else {
            VERIFIER_LOG_SIZE
        };
        VerifierLog { buf: vec![0; size] }
    }

    fn buf(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    fn reset(&mut self) {
        if let Some(b) = self.buf.first_mut() {
            *b = 0;
        }
    }

    fn to_string_lossy(&self) -> String {
        let len = self
            .buf
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.buf.len());
        String::from_utf8_lossy(&self.buf[..len]).trim_end().to_string()
    }
}

/// A program submitted to the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedProgram {
    pub(crate) section: String,
    pub(crate) kind: ProgramKind,
    pub(crate) fd: RawFd,
    pub(crate) event_fd: Option<RawFd>,
}

impl LoadedProgram {
    /// The name of the section the program was loaded from.
    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn kind(&self) -> ProgramKind {
        self.kind
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// The perf event the program is attached to, if it was attached.
    pub fn event_fd(&self) -> Option<RawFd> {
        self.event_fd
    }
}

/// Per-object settings every program is submitted with.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoadOptions<'a> {
    pub(crate) license: &'a CStr,
    pub(crate) kernel_version: KernelVersion,
    pub(crate) log_level: VerifierLogLevel,
    pub(crate) raise_memlock: bool,
    pub(crate) extended_kinds: bool,
}

pub(crate) fn prog_type(kind: ProgramKind, extended_kinds: bool) -> Option<bpf_prog_type::Type> {
    use bpf_prog_type::*;

    match kind {
        ProgramKind::KProbe | ProgramKind::KRetProbe => Some(BPF_PROG_TYPE_KPROBE),
        _ if !extended_kinds => None,
        ProgramKind::TracePoint => Some(BPF_PROG_TYPE_TRACEPOINT),
        ProgramKind::Xdp => Some(BPF_PROG_TYPE_XDP),
        ProgramKind::PerfEvent => Some(BPF_PROG_TYPE_PERF_EVENT),
        ProgramKind::SocketFilter => Some(BPF_PROG_TYPE_SOCKET_FILTER),
    }
}

/// Submits `insns` as a program of type `prog_type`.
///
/// If the kernel answers `EPERM`, `RLIMIT_MEMLOCK` is raised to unlimited and
/// the program is submitted exactly once more.
pub(crate) fn load_program(
    name: &str,
    prog_type: bpf_prog_type::Type,
    insns: &[bpf_insn],
    opts: &LoadOptions<'_>,
) -> Result<RawFd, ProgramError> {
    let mut log_buf = VerifierLog::new(opts.log_level);
    let kernel_version = opts.kernel_version.into();
    let log_level = opts.log_level.bits();

    let mut ret = bpf_load_program(
        prog_type,
        insns,
        opts.license,
        kernel_version,
        log_level,
        log_buf.buf(),
    );
    if let Err((_, io_error)) = &ret {
        if opts.raise_memlock && io_error.raw_os_error() == Some(EPERM) {
            warn!("loading `{name}` failed with EPERM, raising RLIMIT_MEMLOCK and retrying");
            raise_memlock_rlimit()?;
            log_buf.reset();
            ret = bpf_load_program(
                prog_type,
                insns,
                opts.license,
                kernel_version,
                log_level,
                log_buf.buf(),
            );
        }
    }

    ret.map_err(|(_, io_error)| ProgramError::LoadFailed {
        name: name.to_string(),
        io_error,
        verifier_log: log_buf.to_string_lossy(),
    })
}

fn raise_memlock_rlimit() -> Result<(), ProgramError> {
    let mut rlim =
        getrlimit_memlock().map_err(|(_, io_error)| ProgramError::SetRlimitFailed { io_error })?;
    debug!("RLIMIT_MEMLOCK was {} / {}", rlim.rlim_cur, rlim.rlim_max);
    rlim.rlim_cur = RLIM_INFINITY;
    rlim.rlim_max = RLIM_INFINITY;
    setrlimit_memlock(&rlim).map_err(|(_, io_error)| ProgramError::SetRlimitFailed { io_error })
}

/// Submits the program in section `name` and attaches it to its event.
///
/// The program is pushed to `loaded` as soon as the kernel accepts it, so that
/// a failed attach still leaves the program visible to the caller. The same
/// goes for a counter that was opened but could not be enabled or bound.
pub(crate) fn load_and_attach(
    name: &str,
    kind: ProgramKind,
    insns: &[bpf_insn],
    opts: &LoadOptions<'_>,
    tracefs: &mut dyn TraceFs,
    loaded: &mut Vec<LoadedProgram>,
) -> Result<(), ProgramError> {
    let prog_type = prog_type(kind, opts.extended_kinds).ok_or_else(|| {
        ProgramError::UnknownEvent {
            name: name.to_string(),
        }
    })?;

    let fd = load_program(name, prog_type, insns, opts)?;
    debug!("loaded program `{name}` ({} instructions): fd {fd}", insns.len());
    loaded.push(LoadedProgram {
        section: name.to_string(),
        kind,
        fd,
        event_fd: None,
    });

    let attached = match kind {
        ProgramKind::KProbe | ProgramKind::KRetProbe => probe::attach(tracefs, kind, name, fd),
        ProgramKind::TracePoint => trace_point::attach(tracefs, name, fd),
        ProgramKind::Xdp | ProgramKind::PerfEvent | ProgramKind::SocketFilter => return Ok(()),
    };
    let event_fd = match &attached {
        Ok(event_fd) | Err(ProgramError::PerfEventAttachFailed { event_fd, .. }) => Some(*event_fd),
        Err(_) => None,
    };
    if let Some(program) = loaded.last_mut() {
        program.event_fd = event_fd;
    }

    attached.map(|_| ())
}

const EVENT_ID_BUF_SIZE: usize = 256;

/// Reads the decimal identifier of a trace event from `path`.
pub(crate) fn read_event_id(tracefs: &mut dyn TraceFs, path: &Path) -> Result<u32, ProgramError> {
    let unreadable = |io_error| ProgramError::ProbeIdUnreadable {
        path: path.to_owned(),
        io_error,
    };

    let mut buf = [0u8; EVENT_ID_BUF_SIZE];
    let len = tracefs.read(path, &mut buf).map_err(unreadable)?;
    if len == buf.len() {
        return Err(unreadable(io::Error::new(
            io::ErrorKind::InvalidData,
            "event id too long",
        )));
    }

    std::str::from_utf8(&buf[..len])
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .ok_or_else(|| unreadable(io::Error::new(io::ErrorKind::InvalidData, "invalid event id")))
}
