//! Paginated listing walker
//!
//! Pages are fetched one at a time through the dispatcher. Each fetch is
//! awaited before the next is issued, so a walk never spreads across lanes.

use crate::dispatcher::Dispatcher;
use crate::types::{Extracted, HttpRequest};
use crate::{FarmResult, ProgressSink};
use std::sync::Arc;
use tracing::{debug, info};

/// A multi-page listing screen
#[derive(Debug, Clone, PartialEq)]
pub struct ListingEndpoint {
    /// Listing URL without the page parameter
    pub base_url: String,
    pub page_param: String,
    /// Page value for the first request, e.g. `-1` for "show all"
    pub first_page: i64,
    /// Rows a full page can hold
    pub page_capacity: usize,
}

impl ListingEndpoint {
    pub fn new(base_url: impl Into<String>, page_param: impl Into<String>, first_page: i64, page_capacity: usize) -> Self {
        Self {
            base_url: base_url.into(),
            page_param: page_param.into(),
            first_page,
            page_capacity,
        }
    }

    /// URL of a page
    pub fn page_url(&self, page: i64) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!("{}{}{}={}", self.base_url, separator, self.page_param, page)
    }
}

/// Whether the walk continues after the page at `index` (0-based)
pub fn has_next_page(index: usize, rows_found: usize, nav_len: usize, capacity: usize) -> bool {
    if rows_found == 0 {
        return false;
    }
    if index == 0 && rows_found == capacity {
        return true;
    }
    index + 1 < nav_len
}

/// Walks listings through a [`Dispatcher`]
#[derive(Clone)]
pub struct Collector {
    dispatcher: Dispatcher,
    max_pages: usize,
    progress: Option<Arc<dyn ProgressSink + Send + Sync>>,
}

impl Collector {
    pub fn new(dispatcher: Dispatcher, max_pages: usize) -> Self {
        Self {
            dispatcher,
            max_pages: max_pages.max(1),
            progress: None,
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink + Send + Sync>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Fetch every page of `endpoint` and concatenate the extracted rows in
    /// discovery order.
    ///
    /// The first request uses the endpoint's first-page sentinel, later ones
    /// page indices counted from 1. A failed fetch fails the whole walk.
    pub async fn collect<T, F>(&self, endpoint: &ListingEndpoint, mut extract: F) -> FarmResult<Vec<T>>
    where
        F: FnMut(&str) -> Extracted<T>,
    {
        let mut rows = Vec::new();
        let mut index = 0usize;

        loop {
            let page = if index == 0 {
                endpoint.first_page
            } else {
                index as i64
            };
            let url = endpoint.page_url(page);
            let response = self.dispatcher.fetch(HttpRequest::get(url.as_str())).await?;
            let extracted = extract(&response.body);
            let found = extracted.rows.len();

            debug!(url = %url, page = index, rows = found, nav_len = extracted.nav_len, "listing page extracted");

            rows.extend(extracted.rows);
            let more = has_next_page(index, found, extracted.nav_len, endpoint.page_capacity);

            if let Some(sink) = &self.progress {
                let total = extracted.nav_len.max(index + 1);
                sink.report(index + 1, total);
            }

            index += 1;
            if !more {
                break;
            }
            if index >= self.max_pages {
                info!(url = %endpoint.base_url, pages = index, "listing page limit reached");
                break;
            }
        }

        Ok(rows)
    }
}
