//! The kernel primitives used by the loader.

mod bpf;
mod perf_event;

#[cfg(test)]
mod fake;

use std::{io, os::unix::io::RawFd};

use libc::{c_int, pid_t, rlimit};

pub(crate) use bpf::*;
#[cfg(test)]
pub(crate) use fake::*;
pub(crate) use perf_event::*;

use crate::generated::{bpf_attr, bpf_cmd, perf_event_attr};

pub(crate) type SysResult<T> = Result<T, (i64, io::Error)>;

#[cfg_attr(test, allow(dead_code))]
pub(crate) enum Syscall<'a> {
    Bpf {
        cmd: bpf_cmd::Type,
        attr: &'a mut bpf_attr,
    },
    PerfEventOpen {
        attr: perf_event_attr,
        pid: pid_t,
        cpu: i32,
        group: i32,
        flags: u32,
    },
    PerfEventIoctl {
        fd: RawFd,
        request: u32,
        arg: c_int,
    },
    GetMemlockRlimit {
        rlim: &'a mut rlimit,
    },
    SetMemlockRlimit {
        rlim: &'a rlimit,
    },
}

impl std::fmt::Debug for Syscall<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bpf { cmd, attr: _ } => f
                .debug_struct("Syscall::Bpf")
                .field("cmd", cmd)
                .field("attr", &format_args!("_"))
                .finish(),
            Self::PerfEventOpen {
                attr: _,
                pid,
                cpu,
                group,
                flags,
            } => f
                .debug_struct("Syscall::PerfEventOpen")
                .field("attr", &format_args!("_"))
                .field("pid", pid)
                .field("cpu", cpu)
                .field("group", group)
                .field("flags", flags)
                .finish(),
            Self::PerfEventIoctl { fd, request, arg } => f
                .debug_struct("Syscall::PerfEventIoctl")
                .field("fd", fd)
                .field("request", request)
                .field("arg", arg)
                .finish(),
            Self::GetMemlockRlimit { rlim: _ } => f.write_str("Syscall::GetMemlockRlimit"),
            Self::SetMemlockRlimit { rlim } => f
                .debug_struct("Syscall::SetMemlockRlimit")
                .field("rlim_cur", &rlim.rlim_cur)
                .field("rlim_max", &rlim.rlim_max)
                .finish(),
        }
    }
}

fn syscall(call: Syscall<'_>) -> SysResult<i64> {
    #[cfg(test)]
    return TEST_SYSCALL.with(|test_impl| unsafe { test_impl.borrow()(call) });

    #[cfg_attr(test, allow(unreachable_code))]
    {
        let ret: i64 = unsafe {
            match call {
                Syscall::Bpf { cmd, attr } => libc::syscall(
                    libc::SYS_bpf,
                    cmd,
                    attr as *mut bpf_attr,
                    std::mem::size_of::<bpf_attr>(),
                ) as i64,
                Syscall::PerfEventOpen {
                    attr,
                    pid,
                    cpu,
                    group,
                    flags,
                } => libc::syscall(
                    libc::SYS_perf_event_open,
                    &attr as *const perf_event_attr,
                    pid,
                    cpu,
                    group,
                    flags,
                ) as i64,
                Syscall::PerfEventIoctl { fd, request, arg } => {
                    libc::ioctl(fd, request as _, arg) as i64
                }
                Syscall::GetMemlockRlimit { rlim } => {
                    libc::getrlimit(libc::RLIMIT_MEMLOCK, rlim as *mut rlimit) as i64
                }
                Syscall::SetMemlockRlimit { rlim } => {
                    libc::setrlimit(libc::RLIMIT_MEMLOCK, rlim as *const rlimit) as i64
                }
            }
        };

        if ret < 0 {
            return Err((ret, io::Error::last_os_error()));
        }

        Ok(ret)
    }
}

/// Reads the current `RLIMIT_MEMLOCK` soft and hard limits.
pub(crate) fn getrlimit_memlock() -> SysResult<rlimit> {
    let mut rlim = rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    syscall(Syscall::GetMemlockRlimit { rlim: &mut rlim })?;
    Ok(rlim)
}

pub(crate) fn setrlimit_memlock(rlim: &rlimit) -> SysResult<()> {
    syscall(Syscall::SetMemlockRlimit { rlim })?;
    Ok(())
}
