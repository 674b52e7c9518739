//! Incremental "load more" pagination for history listings.
//!
//! A [`HistoryPaginator`] walks a [`PageSource`] five records at a time.
//! Whether more records exist is always derived from the source's total,
//! never from the size of the page that just arrived, so a short page in
//! the middle of a listing does not end it early.

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::net::error::ApiError;

/// Records fetched per `load_more` call.
pub const PAGE_SIZE: usize = 5;

/// One fetched slice plus the total number of records the source holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Anything that can serve a listing in `skip`/`limit` slices.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn fetch_page(&self, skip: usize, limit: usize) -> Result<Page<T>, ApiError>;

    /// Total record count when it is known before the first fetch.
    fn total_hint(&self) -> Option<usize> {
        None
    }
}

/// A fully loaded listing served page by page.
pub struct MemorySource<T> {
    records: Vec<T>,
}

impl<T> MemorySource<T> {
    #[must_use]
    pub fn new(records: Vec<T>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl<T> PageSource<T> for MemorySource<T>
where
    T: Clone + Send + Sync,
{
    async fn fetch_page(&self, skip: usize, limit: usize) -> Result<Page<T>, ApiError> {
        let items = self.records.iter().skip(skip).take(limit).cloned().collect();
        Ok(Page { items, total: self.records.len() })
    }

    fn total_hint(&self) -> Option<usize> {
        Some(self.records.len())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("a page is already loading")]
    AlreadyLoading,
    #[error("no more records")]
    Exhausted,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// What the listing view renders.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryState<T> {
    pub items: Vec<T>,
    /// Pages loaded so far.
    pub page: usize,
    /// Last total reported by the source.
    pub total: Option<usize>,
    pub has_more: bool,
    pub is_loading: bool,
    pub last_error: Option<String>,
}

impl<T> HistoryState<T> {
    fn initial(total_hint: Option<usize>) -> Self {
        Self {
            items: Vec::new(),
            page: 0,
            total: total_hint,
            has_more: total_hint.is_none_or(|total| total > 0),
            is_loading: false,
            last_error: None,
        }
    }
}

pub struct HistoryPaginator<T, S> {
    source: Arc<S>,
    state: Arc<Mutex<HistoryState<T>>>,
}

impl<T, S> Clone for HistoryPaginator<T, S> {
    fn clone(&self) -> Self {
        Self { source: Arc::clone(&self.source), state: Arc::clone(&self.state) }
    }
}

impl<T, S> HistoryPaginator<T, S>
where
    T: Clone,
    S: PageSource<T>,
{
    #[must_use]
    pub fn new(source: Arc<S>) -> Self {
        let state = HistoryState::initial(source.total_hint());
        Self { source, state: Arc::new(Mutex::new(state)) }
    }

    #[must_use]
    pub fn snapshot(&self) -> HistoryState<T> {
        self.lock().clone()
    }

    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.lock().items.clone()
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.lock().has_more
    }

    /// Fetch and append the next page. Returns the number of new records.
    ///
    /// # Errors
    ///
    /// `AlreadyLoading` or `Exhausted` without touching the source, or the
    /// source error (recorded as `last_error`; the page can be retried).
    pub async fn load_more(&self) -> Result<usize, HistoryError> {
        let skip = {
            let mut state = self.lock();
            if state.is_loading {
                return Err(HistoryError::AlreadyLoading);
            }
            if !state.has_more {
                return Err(HistoryError::Exhausted);
            }
            state.is_loading = true;
            state.page * PAGE_SIZE
        };

        let result = self.source.fetch_page(skip, PAGE_SIZE).await;

        let mut state = self.lock();
        state.is_loading = false;
        match result {
            Ok(Page { items, total }) => {
                let added = items.len();
                state.items.extend(items);
                state.page += 1;
                state.total = Some(total);
                state.has_more = state.page * PAGE_SIZE < total;
                state.last_error = None;
                tracing::debug!(page = state.page, added, total, has_more = state.has_more, "history page loaded");
                Ok(added)
            }
            Err(e) => {
                tracing::warn!(skip, error = %e, "history page failed");
                state.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// The end-of-list sentinel scrolled into view.
    ///
    /// Loads the next page when one is due and nothing is loading; otherwise
    /// returns `Ok(0)`.
    ///
    /// # Errors
    ///
    /// Propagates the source error from [`HistoryPaginator::load_more`].
    pub async fn on_sentinel_visible(&self) -> Result<usize, HistoryError> {
        {
            let state = self.lock();
            if state.is_loading || !state.has_more {
                return Ok(0);
            }
        }
        match self.load_more().await {
            Err(HistoryError::AlreadyLoading | HistoryError::Exhausted) => Ok(0),
            other => other,
        }
    }

    /// Forget everything loaded and start again from the first page.
    pub fn reset(&self) {
        *self.lock() = HistoryState::initial(self.source.total_hint());
    }

    fn lock(&self) -> MutexGuard<'_, HistoryState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
