//! Canonical event/time-series data model shared by every hearth crate.
//!
//! This crate has no I/O and no async runtime dependency — it is pure data
//! plus the line-protocol codec (§3, §4.3 of the design document).

pub mod event;
pub mod filter_result;
pub mod line_protocol;
pub mod point;
pub mod value;

pub use event::Event;
pub use filter_result::FilterResult;
pub use point::{FieldValue, PointValidationError, StoragePoint, StoragePointBuilder};
pub use value::Value;
