use std::{mem, os::unix::io::RawFd};

use libc::c_int;

use crate::generated::{
    perf_event_attr, perf_event_sample_format::PERF_SAMPLE_RAW,
    perf_type_id::PERF_TYPE_TRACEPOINT, PERF_FLAG_FD_CLOEXEC,
};

use super::{syscall, SysResult, Syscall};

/// Opens a raw-sampling tracepoint counter for the trace event `id`, waking
/// up on every sample.
pub(crate) fn perf_event_open_trace_point(id: u32) -> SysResult<RawFd> {
    let mut attr = unsafe { mem::zeroed::<perf_event_attr>() };

    attr.size = mem::size_of::<perf_event_attr>() as u32;
    attr.type_ = PERF_TYPE_TRACEPOINT;
    attr.config = id as u64;
    attr.sample_type = PERF_SAMPLE_RAW as u64;
    attr.__bindgen_anon_1.sample_period = 1;
    attr.__bindgen_anon_2.wakeup_events = 1;

    syscall(Syscall::PerfEventOpen {
        attr,
        pid: -1,
        cpu: 0,
        group: -1,
        flags: PERF_FLAG_FD_CLOEXEC,
    })
    .map(|fd| fd as RawFd)
}

pub(crate) fn perf_event_ioctl(fd: RawFd, request: u32, arg: c_int) -> SysResult<i64> {
    syscall(Syscall::PerfEventIoctl { fd, request, arg })
}
