//! A loader for eBPF object files.
//!
//! An object produced by `clang -target bpf` carries a `license` section, a
//! `version` section, a `maps` section with one fixed size definition per map
//! and one section per program, named after the event the program is meant
//! for (for example `kprobe/do_sys_open`). Loading an object creates its maps,
//! points the map references inside each program at the created maps, submits
//! the programs to the kernel and attaches probe and tracepoint programs to
//! their events.
//!
//! ```no_run
//! let bpf = bpf_elf_loader::load_bpf_file("trace_open.o")?;
//! println!("programs: {:?}", bpf.program_fds());
//! println!("events: {:?}", bpf.event_fds());
//! println!("maps: {:?}", bpf.map_fds());
//! # Ok::<(), bpf_elf_loader::BpfError>(())
//! ```
//!
//! The loader uses the `bpf(2)` and `perf_event_open(2)` system calls directly
//! and needs the privileges they require. Probes are registered through the
//! `kprobe_events` file of the tracefs mount, see [`tracefs`].
#![deny(clippy::all)]

mod bpf;
mod generated;
pub mod maps;
pub mod obj;
pub mod programs;
mod sys;
pub mod tracefs;

#[cfg(test)]
mod test_utils;

pub use bpf::*;
pub use generated::bpf_insn;
pub use obj::{KernelVersion, ProgramKind};
pub use object::Endianness;
pub use programs::{LoadedProgram, VerifierLogLevel};
pub use tracefs::{DebugFs, TraceFs};
