//! Static tracepoints.
use std::{os::unix::io::RawFd, path::PathBuf};

use crate::{
    obj::ProgramKind,
    programs::{perf_attach::perf_attach, read_event_id, ProgramError},
    tracefs::TraceFs,
};

/// The path of the id file of the tracepoint `<category>/<name>`.
pub fn trace_point_id_path(event: &str) -> PathBuf {
    PathBuf::from(format!("events/{event}/id"))
}

/// Attaches `prog_fd` to the tracepoint named by section `name`, for example
/// `tracepoint/syscalls/sys_enter_open`. Returns the perf event file
/// descriptor.
pub(crate) fn attach(
    tracefs: &mut dyn TraceFs,
    name: &str,
    prog_fd: RawFd,
) -> Result<RawFd, ProgramError> {
    let event = name
        .strip_prefix(ProgramKind::TracePoint.prefix())
        .filter(|event| !event.is_empty())
        .ok_or_else(|| ProgramError::InvalidEventName {
            name: name.to_string(),
        })?;

    let id = read_event_id(tracefs, &trace_point_id_path(event))?;
    perf_attach(prog_fd, id)
}

#[cfg(test)]
mod tests {
    use std::{io, path::Path};

    use assert_matches::assert_matches;

    use super::*;
    use crate::{
        sys::{override_syscall, Syscall},
        tracefs::FakeTraceFs,
    };

    #[test]
    fn test_attach() {
        override_syscall(|call| match call {
            Syscall::PerfEventOpen { attr, .. } if attr.config == 612 => Ok(31),
            Syscall::PerfEventIoctl { fd: 31, .. } => Ok(0),
            _ => Err((-1, io::Error::from_raw_os_error(libc::EINVAL))),
        });
        let mut tracefs =
            FakeTraceFs::default().with_file("events/syscalls/sys_enter_open/id", "612\n");

        assert_matches!(
            attach(&mut tracefs, "tracepoint/syscalls/sys_enter_open", 5),
            Ok(31)
        );
        // tracepoints already exist, nothing is registered
        assert!(tracefs.appended.is_empty());
    }

    #[test]
    fn test_attach_invalid_event_name() {
        let mut tracefs = FakeTraceFs::default();

        assert_matches!(
            attach(&mut tracefs, "tracepoint/", 5),
            Err(ProgramError::InvalidEventName { .. })
        );
    }

    #[test]
    fn test_attach_missing_id() {
        let mut tracefs = FakeTraceFs::default();

        assert_matches!(
            attach(&mut tracefs, "tracepoint/sched/sched_switch", 5),
            Err(ProgramError::ProbeIdUnreadable { path, .. }) => {
                assert_eq!(path, Path::new("events/sched/sched_switch/id"));
            }
        );
    }
}
