//! Host-side implementations of the OS collaborators.
//!
//! - `memory`: in-process backends with failure injection, used by tests and
//!   embedders that forward to a real OS API themselves.
//! - `file`: JSON files under `<data_dir>/os/`, used by the CLI so state
//!   survives between invocations.

pub mod file;
pub mod memory;
