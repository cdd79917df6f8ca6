//! Market signal collection for the context stage.
//!
//! Sources are external commands. Which ones run is decided by an explicit
//! [`SourceRotation`] state object, and already-seen URLs are filtered by a
//! persisted [`UrlCache`]. Both are passed in by the caller rather than held
//! globally.

mod cache;
mod collector;
mod rotation;
mod source;
mod types;

pub use cache::{CACHE_SCHEMA_VERSION, UrlCache};
pub use collector::{CollectReport, SignalCollector};
pub use rotation::SourceRotation;
pub use source::{CommandSource, SignalSource, StaticSource};
pub use types::Signal;
