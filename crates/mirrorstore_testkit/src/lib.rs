//! # Mirrorstore Testkit
//!
//! Shared test support for Mirrorstore: canonical fixtures, proptest
//! strategies, and [`InMemoryRemote`], a remote service with real
//! behavior backed by the same engine the cache uses.
//!
//! [`InMemoryRemote`]: remote::InMemoryRemote

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod remote;

/// One-import convenience for test modules.
pub mod prelude {
    pub use crate::fixtures::{
        messages, messages_config, record, registry_with, things, things_config,
    };
    pub use crate::generators::{arb_record, arb_records, arb_scalar, arb_select};
    pub use crate::remote::InMemoryRemote;
}
