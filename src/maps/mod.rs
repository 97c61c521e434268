//! Map provisioning.
//!
//! Maps are created in the order they are defined in the `maps` section. The
//! position of a definition in that section is the index relocations use to
//! refer to the map.

use std::{io, os::unix::io::RawFd};

use log::debug;
use thiserror::Error;

use crate::{bpf_map_def, generated::bpf_map_type::BPF_MAP_TYPE_PROG_ARRAY, sys::bpf_create_map};

#[derive(Error, Debug)]
pub enum MapError {
    #[error("failed to create map at index {index}: {code}")]
    CreateFailed {
        index: usize,
        code: i64,
        #[source]
        io_error: io::Error,
    },
}

/// A map created in the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapData {
    pub(crate) def: bpf_map_def,
    pub(crate) fd: RawFd,
}

impl MapData {
    pub fn def(&self) -> &bpf_map_def {
        &self.def
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn is_prog_array(&self) -> bool {
        self.def.map_type == BPF_MAP_TYPE_PROG_ARRAY
    }
}

/// The maps created from one object, indexed by definition order.
#[derive(Debug, Default, Clone)]
pub struct Maps {
    pub(crate) maps: Vec<MapData>,
    pub(crate) prog_array_fd: Option<RawFd>,
}

impl Maps {
    pub fn as_slice(&self) -> &[MapData] {
        &self.maps
    }

    pub fn fds(&self) -> Vec<RawFd> {
        self.maps.iter().map(|m| m.fd).collect()
    }

    /// The file descriptor of the last program array map created.
    pub fn prog_array_fd(&self) -> Option<RawFd> {
        self.prog_array_fd
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

/// Creates one map per definition, in order.
///
/// Creation stops at the first failure. Maps created before the failing one
/// are left open.
pub fn create_maps(defs: &[bpf_map_def]) -> Result<Maps, MapError> {
    let mut maps = Maps::default();
    for (index, def) in defs.iter().enumerate() {
        let fd = bpf_create_map(def).map_err(|(code, io_error)| MapError::CreateFailed {
            index,
            code,
            io_error,
        })?;
        debug!(
            "created map {index} type {} key {} value {} max entries {} flags {:#x}: fd {fd}",
            def.map_type, def.key_size, def.value_size, def.max_entries, def.map_flags
        );

        let map = MapData { def: *def, fd };
        if map.is_prog_array() {
            maps.prog_array_fd = Some(fd);
        }
        maps.maps.push(map);
    }

    Ok(maps)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use assert_matches::assert_matches;
    use libc::EFAULT;

    use super::*;
    use crate::{
        generated::{
            bpf_cmd,
            bpf_map_type::{BPF_MAP_TYPE_ARRAY, BPF_MAP_TYPE_HASH},
        },
        sys::{override_syscall, Syscall},
    };

    thread_local! {
        static CREATED: RefCell<Vec<u32>> = const { RefCell::new(Vec::new()) };
    }

    fn new_def(map_type: u32) -> bpf_map_def {
        bpf_map_def {
            map_type,
            key_size: 4,
            value_size: 4,
            max_entries: 1024,
            map_flags: 0,
        }
    }

    unsafe fn record_create(call: Syscall<'_>) -> crate::sys::SysResult<i64> {
        match call {
            Syscall::Bpf {
                cmd: bpf_cmd::BPF_MAP_CREATE,
                attr,
            } => {
                let map_type = attr.__bindgen_anon_1.map_type;
                let count = CREATED.with(|c| {
                    let mut c = c.borrow_mut();
                    c.push(map_type);
                    c.len()
                });
                if map_type == BPF_MAP_TYPE_HASH && count > 2 {
                    Err((-1, io::Error::from_raw_os_error(EFAULT)))
                } else {
                    Ok(40 + count as i64)
                }
            }
            _ => Err((-1, io::Error::from_raw_os_error(EFAULT))),
        }
    }

    #[test]
    fn test_create_maps() {
        CREATED.with(|c| c.borrow_mut().clear());
        override_syscall(record_create);

        let maps = create_maps(&[
            new_def(BPF_MAP_TYPE_ARRAY),
            new_def(BPF_MAP_TYPE_HASH),
        ])
        .unwrap();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps.fds(), vec![41, 42]);
        assert_eq!(maps.as_slice()[1].def().map_type, BPF_MAP_TYPE_HASH);
        assert_eq!(maps.prog_array_fd(), None);
        assert_eq!(
            CREATED.with(|c| c.borrow().clone()),
            vec![BPF_MAP_TYPE_ARRAY, BPF_MAP_TYPE_HASH]
        );
    }

    #[test]
    fn test_create_maps_empty() {
        CREATED.with(|c| c.borrow_mut().clear());
        override_syscall(record_create);

        let maps = create_maps(&[]).unwrap();
        assert!(maps.is_empty());
        assert!(CREATED.with(|c| c.borrow().is_empty()));
    }

    #[test]
    fn test_create_maps_prog_array_last_wins() {
        CREATED.with(|c| c.borrow_mut().clear());
        override_syscall(record_create);

        let maps = create_maps(&[
            new_def(BPF_MAP_TYPE_PROG_ARRAY),
            new_def(BPF_MAP_TYPE_ARRAY),
            new_def(BPF_MAP_TYPE_PROG_ARRAY),
        ])
        .unwrap();
        assert!(maps.as_slice()[0].is_prog_array());
        assert_eq!(maps.prog_array_fd(), Some(43));
    }

    #[test]
    fn test_create_maps_stops_at_failure() {
        CREATED.with(|c| c.borrow_mut().clear());
        override_syscall(record_create);

        let ret = create_maps(&[
            new_def(BPF_MAP_TYPE_ARRAY),
            new_def(BPF_MAP_TYPE_ARRAY),
            new_def(BPF_MAP_TYPE_HASH),
            new_def(BPF_MAP_TYPE_ARRAY),
        ]);
        assert_matches!(ret, Err(MapError::CreateFailed { index: 2, code: -1, io_error }) => {
            assert_eq!(io_error.raw_os_error(), Some(EFAULT));
        });
        assert_eq!(CREATED.with(|c| c.borrow().len()), 3);
    }
}
