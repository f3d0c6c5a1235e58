//! # Mirrorstore Client
//!
//! Action dispatch, live queries, and the store facade for Mirrorstore.
//!
//! This crate provides:
//!
//! - **[`RemoteService`]**: the async boundary to the backing API, with
//!   a scripted mock for tests
//! - **[`Dispatcher`]**: per-collection actions that pair one remote
//!   call with one reconciliation
//! - **[`LiveQuery`]**: parameter-driven refetch with supersession, so
//!   only the newest issued fetch publishes state
//! - **[`Store`]**: the commit/dispatch/read primitives hosts embed,
//!   plus server-push event routing
//!
//! ## Key Invariants
//!
//! - The cache holds only server-confirmed data; there is no
//!   optimistic write path
//! - A failed remote call propagates unchanged and never touches the
//!   cache
//! - Responses are reconciled before an action's result is published
//! - A superseded live fetch is still reconciled; only its publication
//!   is suppressed
//!
//! ## Example
//!
//! ```no_run
//! use mirrorstore_client::{Action, MockRemoteService, Store};
//! use mirrorstore_core::{CollectionConfig, Params};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), mirrorstore_client::ClientError> {
//! let store = Store::default();
//! store.register(
//!     CollectionConfig::new("messages").with_id_field("id"),
//!     Arc::new(MockRemoteService::new()),
//! )?;
//!
//! let found = store
//!     .dispatch("messages", Action::Find { params: Params::empty() })
//!     .await?;
//! # let _ = found;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod dispatch;
mod error;
mod live;
mod remote;
mod store;

pub use dispatch::Dispatcher;
pub use error::{ClientError, ClientResult, RemoteError, RemoteErrorKind, RemoteResult};
pub use live::{
    HookResult, ItemHook, LiveOptions, LiveQuery, LiveSnapshot, LiveState, PageInfo, QueryMethod,
};
pub use remote::{CallCounts, FindResponse, MockRemoteService, RemoteService, ServiceEvent};
pub use store::{Action, ActionOutput, Mutation, Read, ReadOutput, Store};
