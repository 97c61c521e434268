#![allow(dead_code, non_camel_case_types, non_snake_case, clippy::all)]

// FIXME: only the subset of the uapi headers used by the loader, hand-trimmed
// from bindgen output for x86_64 and aarch64

mod linux_bindings;

pub use linux_bindings::*;
