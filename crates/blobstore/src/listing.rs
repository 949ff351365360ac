//! Paginated prefix listing and last-modified time windows.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::session::{BlobSession, ObjectMetadata};

/// Closed interval `[start, end]` of last-modified timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Earliest accepted timestamp, inclusive.
    pub start: DateTime<Utc>,
    /// Latest accepted timestamp, inclusive.
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Window from `start` to `end`, both inclusive. A window whose start is
    /// after its end matches nothing.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Returns `true` if `object` was last modified inside the window.
    /// Objects without a timestamp never match.
    pub fn contains(&self, object: &ObjectMetadata) -> bool {
        object
            .last_modified
            .is_some_and(|t| self.start <= t && t <= self.end)
    }
}

/// Walk every page under `prefix`, keeping the keys `keep` accepts, in store
/// order.
///
/// Pages are fetched strictly one after another because each request needs
/// the previous page's continuation token. The first failing page aborts the
/// walk and nothing accumulated so far is returned, as does a truncated page
/// whose continuation token is missing or was already used.
pub(crate) async fn collect_keys<S, F>(
    session: &S,
    prefix: &str,
    mut keep: F,
) -> Result<Vec<String>, StoreError>
where
    S: BlobSession + ?Sized,
    F: FnMut(&ObjectMetadata) -> bool,
{
    let mut keys = Vec::new();
    let mut token: Option<String> = None;
    let mut seen_tokens = HashSet::new();
    let mut pages = 0usize;

    loop {
        let page = session
            .list_objects(prefix, token.take())
            .await
            .map_err(|e| {
                warn!(prefix = %prefix, page = pages, error = %e, "listing page failed");
                StoreError::from(e)
            })?;
        pages += 1;

        keys.extend(
            page.objects
                .into_iter()
                .filter(|obj| keep(obj))
                .map(|obj| obj.key),
        );

        if !page.truncated {
            break;
        }
        match page.next_token {
            Some(next) if seen_tokens.insert(next.clone()) => token = Some(next),
            next => {
                warn!(prefix = %prefix, page = pages, token = ?next, "unusable continuation token");
                return Err(StoreError::Pagination {
                    prefix: prefix.to_owned(),
                });
            }
        }
    }

    debug!(prefix = %prefix, pages, keys = keys.len(), "listing complete");
    Ok(keys)
}
