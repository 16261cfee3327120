pub mod config;
pub mod datastore;
pub mod deploy;
pub mod error;
pub mod exec;
pub mod gdbserver;
pub mod ide;
pub mod image;
pub mod recipe;
pub mod setup;
pub mod shared_sysroot;
pub mod store;
pub mod target;
pub mod toolchain;
pub mod workspace;

pub use error::{Error, Result};
