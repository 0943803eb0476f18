//! Per-site scrollbar profiles
//!
//! Profiles describe scrollbar appearance; rules map domains to profiles;
//! the coordinator resolves a page to a profile and renders its stylesheet.

#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod ipc;
pub mod migration;
pub mod profile;
pub mod rules;
pub mod storage;
pub mod style;

pub use coordinator::Coordinator;
pub use error::{CoreError, CoreResult, StorageError};
pub use profile::{Profile, ProfileId, ProfilePatch};
