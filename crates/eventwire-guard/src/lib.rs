//! # eventwire-guard
//!
//! Allow-list enforcement for self-describing serialized payloads.
//!
//! Some peers ship events as generic object graphs in which every object
//! names its own type. Materializing an arbitrary type chosen by an untrusted
//! peer is how deserialization exploits work, so every declared type name in
//! the graph (not just the root) is checked before anything is built.
//!
//! ## Wire form
//! ```text
//! {"@type": "app.LoggingEvent",
//!  "message": "disk full",
//!  "throwable": {"@type": "app.ThrowableInfo", "name": "IOException"}}
//! ```
//!
//! ## Components
//! - [`AllowList`]: immutable set of permitted type names
//! - [`WhitelistGuard`]: walks a graph and classifies violations
//! - [`GuardedDecoder`]: a [`Decoder`](eventwire_core::Decoder) that
//!   inspects before materializing with serde

pub mod allow_list;
pub mod decoder;
pub mod guard;

pub use allow_list::AllowList;
pub use decoder::GuardedDecoder;
pub use guard::{GuardConfig, GuardError, GuardMode, WhitelistGuard, TYPE_TAG};
