//! The seven deterministic syscall providers from spec.md §4.6, each a
//! small [`crate::registry::Provider`] implementation taking/returning
//! canonical [`cap_enc::Value`] maps.

pub mod blob;
pub mod compute;
pub mod random;
pub mod result_read;
pub mod treasury;
pub mod zk;
