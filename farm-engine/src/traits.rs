//! Seams between the engine and its external collaborators

use crate::types::{
    CommandRow, Extracted, FarmRow, HttpRequest, HttpResponse, MapEntry, SourceRow, TemplateRow,
};
use crate::FarmResult;
use async_trait::async_trait;
use farm_common::UnitKind;

/// Fallible asynchronous request primitive
#[async_trait]
pub trait Transport {
    /// Send one request. Non-2xx statuses are returned as responses, not errors.
    async fn send(&self, request: &HttpRequest) -> FarmResult<HttpResponse>;
}

/// Host that can open a new execution context, such as a browser tab
#[async_trait]
pub trait ContextHost {
    /// Open the context at `url` and resolve once it reports readiness
    async fn open(&self, url: &str) -> FarmResult<()>;
}

/// Structured queries over listing pages.
///
/// Missing or malformed structure yields empty results rather than errors.
pub trait PageParser {
    /// Source villages with their home troops; `columns` is the world's unit column order
    fn source_rows(&self, body: &str, columns: &[UnitKind]) -> Extracted<SourceRow>;

    /// Own outgoing commands with their raw arrival text
    fn command_rows(&self, body: &str) -> Extracted<CommandRow>;

    /// Farm-assistant targets
    fn farm_rows(&self, body: &str) -> Extracted<FarmRow>;

    /// Farm-assistant templates in page order
    fn templates(&self, body: &str) -> Vec<TemplateRow>;

    /// Every entry of the raw map directory
    fn map_entries(&self, body: &str) -> Vec<MapEntry>;
}

/// The game server's clock, as opposed to local wall-clock
pub trait RemoteClock {
    /// Current server time in Unix seconds
    fn now(&self) -> i64;
}

/// Receives `(done, total)` progress updates
pub trait ProgressSink {
    fn report(&self, done: usize, total: usize);
}
