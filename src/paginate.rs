//! Snippet pass over the upload playlist.
//!
//! The loop asks for `min(50, target - processed)` items per page and stops
//! on whichever comes first: the target is reached, the server hands back
//! no continuation token, or the server's reported total equals what has
//! been merged so far. A channel can easily have fewer uploads than the
//! target, so exhaustion and the target are independent exits. A server
//! that answers with the very token it was just given is also treated as
//! exhausted, since following it would request the same page forever.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{debug, warn};

use crate::aggregate::{Aggregator, VideoRecord};
use crate::api::{ApiClient, MAX_PAGE_SIZE, PlaylistItem, Transport};
use crate::error::FetchError;
use crate::progress::Progress;

/// Why the page loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    NoNextPage,
    TotalReached,
    RepeatedToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationSummary {
    pub pages: usize,
    pub processed: usize,
    pub stop: StopReason,
}

/// Picks the requested snippet fields out of one playlist item.
///
/// `videoId` is not a top-level snippet key, so it is filled from the id
/// the record is keyed by. Fields the item does not carry are left out.
pub fn select_snippet_fields(
    item: &PlaylistItem,
    video_id: &str,
    fields: &BTreeSet<String>,
) -> VideoRecord {
    let mut record = VideoRecord::new();
    for field in fields {
        if field == "videoId" {
            record.insert(field.clone(), Value::String(video_id.to_string()));
        } else if let Some(value) = item.snippet.get(field) {
            record.insert(field.clone(), value.clone());
        }
    }
    record
}

/// Folds one page into the aggregator and returns the aggregator size.
pub fn fold_page(
    aggregator: &mut Aggregator,
    items: &[PlaylistItem],
    fields: &BTreeSet<String>,
) -> usize {
    for item in items {
        let Some(video_id) = item.video_id() else {
            warn!("playlist item without resourceId.videoId, skipping");
            continue;
        };
        let record = select_snippet_fields(item, video_id, fields);
        aggregator.create_from_snippet(video_id, record);
    }
    aggregator.len()
}

/// Pages through `playlist_id` until one of the stop conditions fires.
///
/// Pages merged before a failure stay in the aggregator.
pub fn paginate<T: Transport>(
    client: &ApiClient<T>,
    playlist_id: &str,
    target: usize,
    aggregator: &mut Aggregator,
    fields: &BTreeSet<String>,
    progress: &mut dyn Progress,
) -> Result<PaginationSummary, FetchError> {
    let mut processed = aggregator.len();
    let mut page_token: Option<String> = None;
    let mut pages = 0;

    let stop = loop {
        if processed >= target {
            break StopReason::TargetReached;
        }

        let page_size = MAX_PAGE_SIZE.min(target - processed);
        let page = client
            .playlist_page(playlist_id, page_token.as_deref(), page_size)
            .map_err(FetchError::transient)?;
        pages += 1;

        processed = fold_page(aggregator, &page.items, fields);
        progress.advance(processed);
        debug!(
            page = pages,
            received = page.items.len(),
            processed,
            total = page.total_results,
            "merged snippet page"
        );

        if processed >= target {
            break StopReason::TargetReached;
        }
        if page.total_results == processed {
            break StopReason::TotalReached;
        }
        match page.next_page_token {
            None => break StopReason::NoNextPage,
            Some(token) if page_token.as_deref() == Some(token.as_str()) => {
                break StopReason::RepeatedToken;
            }
            Some(token) => page_token = Some(token),
        }
    };

    Ok(PaginationSummary {
        pages,
        processed,
        stop,
    })
}
