use std::{ffi::CStr, mem, os::unix::io::RawFd};

use crate::{
    bpf_map_def,
    generated::{bpf_attr, bpf_cmd, bpf_insn, bpf_prog_type},
    sys::SysResult,
};

use super::{syscall, Syscall};

pub(crate) fn bpf_create_map(def: &bpf_map_def) -> SysResult<RawFd> {
    let mut attr = unsafe { mem::zeroed::<bpf_attr>() };

    let u = unsafe { &mut attr.__bindgen_anon_1 };
    u.map_type = def.map_type;
    u.key_size = def.key_size;
    u.value_size = def.value_size;
    u.max_entries = def.max_entries;
    u.map_flags = def.map_flags;

    sys_bpf(bpf_cmd::BPF_MAP_CREATE, &mut attr).map(|fd| fd as RawFd)
}

pub(crate) fn bpf_load_program(
    ty: bpf_prog_type::Type,
    insns: &[bpf_insn],
    license: &CStr,
    kernel_version: u32,
    log_level: u32,
    log_buf: &mut [u8],
) -> SysResult<RawFd> {
    let mut attr = unsafe { mem::zeroed::<bpf_attr>() };

    let u = unsafe { &mut attr.__bindgen_anon_3 };
    u.prog_type = ty;
    u.expected_attach_type = 0;
    u.insns = insns.as_ptr() as u64;
    u.insn_cnt = insns.len() as u32;
    u.license = license.as_ptr() as u64;
    u.kern_version = kernel_version;
    if log_level != 0 && !log_buf.is_empty() {
        u.log_level = log_level;
        u.log_buf = log_buf.as_mut_ptr() as u64;
        u.log_size = log_buf.len() as u32;
    }

    sys_bpf(bpf_cmd::BPF_PROG_LOAD, &mut attr).map(|fd| fd as RawFd)
}

fn sys_bpf(cmd: bpf_cmd::Type, attr: &mut bpf_attr) -> SysResult<i64> {
    syscall(Syscall::Bpf { cmd, attr })
}
