//! Shared code for the launcher.  The binary in `src/bin` is a thin
//! wrapper around [`launch::launch`].

#![cfg(unix)]

#[macro_use]
extern crate log;

#[macro_use]
pub mod report;

mod err;
pub use err::*;

pub mod cli;
pub mod config;
pub mod environ;
pub mod exec;
pub mod identity;
pub mod launch;
pub mod limits;
pub mod log_path;
pub mod redirect;
