//! Paginated history retrieval
//!
//! The conversations listing advertises a `total` that does not always match
//! the number of items the backend will actually hand out. The engine keeps
//! requesting pages at `offset = collected so far` until the collection
//! converges on `total` or a bounded number of pages brings no new items,
//! and returns whatever it has in the latter case. A transport or decode
//! failure mid-run aborts instead, discarding the partial set.

use crate::error::Result;
use crate::idset::IdSet;
use crate::protocol::{ConversationHistoryPage, HistoryItem};
use async_trait::async_trait;
use rand::Rng;
use std::ops::RangeInclusive;
use std::time::Duration;

/// One page of the conversations listing. The client implements this against
/// the live endpoint; tests substitute mock listers.
#[async_trait]
pub trait ConversationLister {
    async fn list(&mut self, offset: u32, limit: u32) -> Result<ConversationHistoryPage>;
}

/// Retry bookkeeping threaded through the page loop. The attempts counter
/// only moves on no-progress pages and is never reset.
#[derive(Debug, Clone, Copy)]
struct RetryState {
    attempts: u32,
    last_size: usize,
}

/// Uniformly random pause within `range` milliseconds, matching the
/// backend's rate-limit tolerance.
fn random_backoff(range: &RangeInclusive<u64>) -> Duration {
    let millis = rand::rng().random_range(range.clone());
    Duration::from_millis(millis)
}

/// Fold the conversations listing into a deduplicated, insertion-ordered
/// set. `max_failed_attempts` bounds the number of pages that may arrive
/// without growing the set before the engine gives up and returns the
/// partial result as a success.
pub async fn collect_history<L: ConversationLister>(
    lister: &mut L,
    page_limit: u32,
    max_failed_attempts: u32,
    backoff_ms: &RangeInclusive<u64>,
) -> Result<IdSet<HistoryItem>> {
    tracing::debug!(limit = page_limit, "requesting first page for the advertised total");
    let first = lister.list(0, page_limit).await?;
    let total = first.total;

    // `total` is server-controlled and known to be unreliable, so it is not
    // trusted as an allocation size. The hint stays within a small multiple
    // of what one page can actually deliver.
    let capacity_hint = total.min(first.items.len().max(page_limit as usize) * 2);
    let mut collected = IdSet::with_capacity(capacity_hint);
    collected.add_all(first.items);
    tracing::debug!(collected = collected.len(), total, "first page folded");

    let mut state = RetryState {
        attempts: 0,
        last_size: collected.len(),
    };

    while collected.len() < total && state.attempts < max_failed_attempts {
        let pause = random_backoff(backoff_ms);
        tracing::debug!(backoff_ms = pause.as_millis() as u64, "pausing before next page");
        tokio::time::sleep(pause).await;

        let offset = collected.len() as u32;
        let limit = (total - collected.len()).min(page_limit as usize) as u32;
        let page = lister.list(offset, limit).await?;
        collected.add_all(page.items);

        if collected.len() == state.last_size {
            // The advertised total does not always match the real item
            // count, so a page can legitimately bring nothing new. Count it
            // against the bound instead of looping forever.
            state.attempts += 1;
            tracing::warn!(
                collected = collected.len(),
                total,
                attempts = state.attempts,
                "page brought no new conversations"
            );
        }
        state.last_size = collected.len();
    }

    if collected.len() < total {
        tracing::warn!(
            collected = collected.len(),
            total,
            "history retrieval stopped short of the advertised total"
        );
    }
    Ok(collected)
}
