//! Perf event attachment.
use std::os::unix::io::RawFd;

use log::debug;

use crate::{
    generated::{PERF_EVENT_IOC_ENABLE, PERF_EVENT_IOC_SET_BPF},
    programs::ProgramError,
    sys::{perf_event_ioctl, perf_event_open_trace_point},
};

/// Opens a counter for the trace event `id`, enables it and binds the program
/// `prog_fd` to it. Returns the counter file descriptor.
///
/// Once the counter is open, a failing ioctl reports the counter in
/// [`ProgramError::PerfEventAttachFailed`].
pub(crate) fn perf_attach(prog_fd: RawFd, id: u32) -> Result<RawFd, ProgramError> {
    let fd = perf_event_open_trace_point(id)
        .map_err(|(_, io_error)| ProgramError::EventOpenFailed { id, io_error })?;

    let ioctl = |call: &str, request, arg| {
        perf_event_ioctl(fd, request, arg).map_err(|(_, io_error)| {
            ProgramError::PerfEventAttachFailed {
                call: call.to_owned(),
                event_fd: fd,
                io_error,
            }
        })
    };
    ioctl("PERF_EVENT_IOC_ENABLE", PERF_EVENT_IOC_ENABLE, 0)?;
    ioctl("PERF_EVENT_IOC_SET_BPF", PERF_EVENT_IOC_SET_BPF, prog_fd)?;

    debug!("attached program fd {prog_fd} to event {id}: perf fd {fd}");
    Ok(fd)
}
