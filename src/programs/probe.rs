//! Function entry and return probes.
//!
//! A probe is registered by appending `p:p<fn> <fn>` (or `r:r<fn> <fn>` for
//! return probes) to `kprobe_events`. The kernel then exposes the new event
//! under `events/kprobes/p<fn>/id`.
use std::{
    os::unix::io::RawFd,
    path::{Path, PathBuf},
};

use log::debug;

use crate::{
    obj::ProgramKind,
    programs::{perf_attach::perf_attach, read_event_id, ProgramError},
    tracefs::{TraceFs, KPROBE_EVENTS},
};

/// Returns the probe tag of `kind`, `p` for entry and `r` for return probes.
fn probe_tag(kind: ProgramKind) -> char {
    match kind {
        ProgramKind::KRetProbe => 'r',
        _ => 'p',
    }
}

/// The line registering a probe on `fn_name` in `kprobe_events`.
pub fn probe_command(kind: ProgramKind, fn_name: &str) -> String {
    let tag = probe_tag(kind);
    format!("{tag}:{tag}{fn_name} {fn_name}")
}

/// The path of the id file of the probe event on `fn_name`.
pub fn probe_id_path(kind: ProgramKind, fn_name: &str) -> PathBuf {
    PathBuf::from(format!("events/kprobes/{}{fn_name}/id", probe_tag(kind)))
}

/// Registers a probe for the program in section `name` and attaches `prog_fd`
/// to it. Returns the perf event file descriptor.
pub(crate) fn attach(
    tracefs: &mut dyn TraceFs,
    kind: ProgramKind,
    name: &str,
    prog_fd: RawFd,
) -> Result<RawFd, ProgramError> {
    let fn_name = name
        .strip_prefix(kind.prefix())
        .filter(|fn_name| !fn_name.is_empty())
        .ok_or_else(|| ProgramError::InvalidEventName {
            name: name.to_string(),
        })?;

    let events = Path::new(KPROBE_EVENTS);
    let cmd = probe_command(kind, fn_name);
    tracefs
        .append_line(events, &cmd)
        .map_err(|io_error| ProgramError::ProbeRegisterFailed {
            path: events.to_owned(),
            io_error,
        })?;
    debug!("registered probe `{cmd}`");

    let id = read_event_id(tracefs, &probe_id_path(kind, fn_name))?;
    perf_attach(prog_fd, id)
}
