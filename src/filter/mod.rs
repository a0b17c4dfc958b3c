//! Request instrumentation: the tower layer and its building blocks.

mod attributes;
mod body;
pub mod classify;
mod layer;
mod path;
mod pending;
mod writer;

pub use attributes::RequestAttributes;
pub use body::CountingBody;
pub use classify::{is_error, sanitize, Sanitizer};
pub use layer::{FilterSettings, MetricsFuture, MetricsLayer, MetricsService, DEFAULT_PROTOCOL};
pub use path::{is_excluded, truncate};
pub use writer::{encoded_len, CountingWriter, LINE_SEPARATOR};
