//! Orchestrates a whole channel fetch.
//!
//! ```text
//! Init -> ResolvingUploads -> FetchingSnippets -> EnrichingPart(part)* -> Done
//!                  \________________\__________________\______> Failed
//! ```
//!
//! Resolution and snippet failures are fatal. Enrichment problems (a failed
//! batch, an id the snippet pass never produced) are logged, kept as
//! diagnostics, and the run carries on.

use std::collections::BTreeSet;
use std::fmt;

use tracing::{debug, info, warn};

use crate::aggregate::{Aggregator, VideoRecord};
use crate::api::{ApiClient, Transport, VideoItem};
use crate::batch::{DEFAULT_BATCH_SIZE, chunks};
use crate::catalog::{Part, intersect, unsupported_fields};
use crate::error::FetchError;
use crate::paginate::paginate;
use crate::progress::{NoProgress, Progress};

pub const DEFAULT_MAX_RESULTS: usize = 128;
pub const DEFAULT_FIELDS: [&str; 2] = ["title", "videoId"];

/// What to fetch. Validated up front so nothing malformed reaches the
/// network.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    channel_id: String,
    fields: BTreeSet<String>,
    max_results: usize,
    batch_size: usize,
}

impl FetchSettings {
    /// Fails with [`FetchError::InvalidMaxResults`] when `max_results` is 0.
    pub fn new(
        channel_id: impl Into<String>,
        fields: impl IntoIterator<Item = impl Into<String>>,
        max_results: usize,
    ) -> Result<Self, FetchError> {
        if max_results == 0 {
            return Err(FetchError::InvalidMaxResults(max_results));
        }
        Ok(Self::unchecked(channel_id, fields, max_results))
    }

    /// Channel with the default field set and result cap.
    pub fn for_channel(channel_id: impl Into<String>) -> Self {
        Self::unchecked(channel_id, DEFAULT_FIELDS, DEFAULT_MAX_RESULTS)
    }

    fn unchecked(
        channel_id: impl Into<String>,
        fields: impl IntoIterator<Item = impl Into<String>>,
        max_results: usize,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            max_results,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self, FetchError> {
        if batch_size == 0 {
            return Err(FetchError::InvalidSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Init,
    ResolvingUploads,
    FetchingSnippets,
    EnrichingPart(Part),
    Done,
    Failed,
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchState::Init => f.write_str("init"),
            FetchState::ResolvingUploads => f.write_str("resolving uploads"),
            FetchState::FetchingSnippets => f.write_str("fetching snippets"),
            FetchState::EnrichingPart(part) => write!(f, "enriching {part}"),
            FetchState::Done => f.write_str("done"),
            FetchState::Failed => f.write_str("failed"),
        }
    }
}

/// Result of a finished fetch.
#[derive(Debug)]
pub struct FetchOutcome {
    pub upload_playlist_id: String,
    pub records: Aggregator,
    /// Non-fatal problems met while enriching.
    pub diagnostics: Vec<FetchError>,
}

impl FetchOutcome {
    pub fn items(&self) -> Vec<&VideoRecord> {
        self.records.ordered_values()
    }
}

/// Terminal failure plus whatever had been merged when it happened.
#[derive(Debug)]
pub struct FetchFailure {
    pub error: FetchError,
    /// State the fetcher was in when the error fired.
    pub failed_in: FetchState,
    pub partial: Aggregator,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fetch failed while {}: {}", self.failed_in, self.error)
    }
}

impl std::error::Error for FetchFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

pub struct Fetcher<'p, T> {
    client: ApiClient<T>,
    settings: FetchSettings,
    progress: Box<dyn Progress + 'p>,
    state: FetchState,
    aggregator: Aggregator,
    diagnostics: Vec<FetchError>,
}

impl<'p, T: Transport> Fetcher<'p, T> {
    pub fn new(transport: T, settings: FetchSettings) -> Self {
        Self {
            client: ApiClient::new(transport),
            settings,
            progress: Box::new(NoProgress),
            state: FetchState::Init,
            aggregator: Aggregator::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_progress(mut self, progress: impl Progress + 'p) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn state(&self) -> FetchState {
        self.state
    }

    /// Runs the whole state machine and hands over the collected records.
    ///
    /// Afterwards [`Fetcher::state`] reports `Done` or `Failed`. Calling it
    /// again starts a fresh run from an empty aggregator.
    pub fn fetch(&mut self) -> Result<FetchOutcome, FetchFailure> {
        self.state = FetchState::Init;
        let result = self.run();
        let records = std::mem::take(&mut self.aggregator);
        let diagnostics = std::mem::take(&mut self.diagnostics);

        match result {
            Ok(upload_playlist_id) => {
                self.state = FetchState::Done;
                info!(
                    records = records.len(),
                    diagnostics = diagnostics.len(),
                    "fetch complete"
                );
                Ok(FetchOutcome {
                    upload_playlist_id,
                    records,
                    diagnostics,
                })
            }
            Err(error) => {
                let failed_in = self.state;
                self.state = FetchState::Failed;
                warn!(%error, state = %failed_in, "fetch failed");
                Err(FetchFailure {
                    error,
                    failed_in,
                    partial: records,
                })
            }
        }
    }

    fn run(&mut self) -> Result<String, FetchError> {
        let unknown = unsupported_fields(self.settings.fields());
        if !unknown.is_empty() {
            warn!(fields = ?unknown, "requested fields are not supplied by any part");
        }

        self.state = FetchState::ResolvingUploads;
        let channel_id = self.settings.channel_id().to_string();
        let playlist_id = self.client.upload_playlist_id(&channel_id)?;
        info!(channel = %channel_id, playlist = %playlist_id, "resolved upload playlist");

        self.state = FetchState::FetchingSnippets;
        self.fetch_snippets(&playlist_id)?;

        for part in Part::enrichment_parts() {
            self.state = FetchState::EnrichingPart(part);
            self.enrich(part)?;
        }

        Ok(playlist_id)
    }

    fn fetch_snippets(&mut self, playlist_id: &str) -> Result<(), FetchError> {
        let fields = intersect(Part::Snippet, self.settings.fields());
        let labels: Vec<String> = fields.iter().cloned().collect();
        self.progress
            .begin(Part::Snippet.as_str(), &labels, self.settings.max_results());

        let summary = paginate(
            &self.client,
            playlist_id,
            self.settings.max_results(),
            &mut self.aggregator,
            &fields,
            self.progress.as_mut(),
        )?;
        self.progress.finish();
        info!(
            pages = summary.pages,
            records = summary.processed,
            stop = ?summary.stop,
            "snippet pass finished"
        );
        Ok(())
    }

    /// Adds `part` fields to every record, one request per batch of ids.
    fn enrich(&mut self, part: Part) -> Result<(), FetchError> {
        let fields = intersect(part, self.settings.fields());
        if fields.is_empty() {
            debug!(%part, "no requested fields, skipping part");
            return Ok(());
        }

        let ids = self.aggregator.video_ids();
        let labels: Vec<String> = fields.iter().cloned().collect();
        self.progress.begin(part.as_str(), &labels, ids.len());

        let mut done = 0;
        for batch in chunks(&ids, self.settings.batch_size())? {
            match self.client.videos_part(part, batch) {
                Ok(items) => {
                    for item in &items {
                        self.merge_item(part, item, &fields);
                    }
                }
                Err(source) => {
                    let err = FetchError::PartRequest {
                        part: part.as_str().to_string(),
                        ids: batch.to_vec(),
                        source,
                    };
                    self.record_diagnostic(err);
                }
            }
            done += batch.len();
            self.progress.advance(done);
        }
        self.progress.finish();
        Ok(())
    }

    fn merge_item(&mut self, part: Part, item: &VideoItem, fields: &BTreeSet<String>) {
        let mut record = VideoRecord::new();
        if let Some(values) = item.part(part) {
            for field in fields {
                if let Some(value) = values.get(field) {
                    record.insert(field.clone(), value.clone());
                }
            }
        }

        if let Err(err) = self
            .aggregator
            .extend_with_part(&item.id, part.as_str(), record)
        {
            self.record_diagnostic(err);
        }
    }

    fn record_diagnostic(&mut self, err: FetchError) {
        debug_assert!(err.is_recoverable());
        warn!(error = %err, "enrichment problem, continuing");
        self.diagnostics.push(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{RecordedCall, ScriptedTransport, status_error};
    use crate::api::{CHANNELS_RESOURCE, PLAYLIST_ITEMS_RESOURCE, VIDEOS_RESOURCE};
    use crate::error::TransportError;
    use serde_json::{Value, json};

    /// A fake channel: `(id, title)` uploads newest first, every video has
    /// statistics, status and contentDetails.
    struct FakeChannel {
        videos: Vec<(String, String)>,
        ghost_ids: Vec<String>,
        failing_part: Option<&'static str>,
    }

    impl FakeChannel {
        fn with_videos(count: usize) -> Self {
            Self {
                videos: (1..=count)
                    .map(|n| (format!("id{n}"), format!("Video {n}")))
                    .collect(),
                ghost_ids: Vec::new(),
                failing_part: None,
            }
        }

        fn respond(&self, call: &RecordedCall) -> Result<Value, TransportError> {
            match call.resource.as_str() {
                CHANNELS_RESOURCE => Ok(json!({
                    "items": [{ "contentDetails": { "relatedPlaylists": { "uploads": "UUfake" } } }]
                })),
                PLAYLIST_ITEMS_RESOURCE => {
                    let offset: usize = call
                        .param("pageToken")
                        .map(|token| token.parse().unwrap())
                        .unwrap_or(0);
                    let size: usize = call.param("maxResults").unwrap().parse().unwrap();
                    let end = (offset + size).min(self.videos.len());
                    let items: Vec<Value> = self.videos[offset..end]
                        .iter()
                        .enumerate()
                        .map(|(index, (id, title))| {
                            json!({
                                "snippet": {
                                    "title": title,
                                    "description": "",
                                    "position": offset + index,
                                    "resourceId": { "kind": "youtube#video", "videoId": id }
                                }
                            })
                        })
                        .collect();
                    let mut body = json!({
                        "items": items,
                        "pageInfo": { "totalResults": self.videos.len() }
                    });
                    if end < self.videos.len() {
                        body["nextPageToken"] = json!(end.to_string());
                    }
                    Ok(body)
                }
                VIDEOS_RESOURCE => {
                    let part = call.param("part").unwrap();
                    if Some(part) == self.failing_part {
                        return Err(status_error(VIDEOS_RESOURCE, 503));
                    }
                    // Unknown ids lead the response so the real ones are
                    // merged after them.
                    let mut ids = self.ghost_ids.clone();
                    ids.extend(call.param("id").unwrap().split(',').map(str::to_string));
                    let items: Vec<Value> = ids
                        .iter()
                        .map(|id| {
                            let n: usize = id.trim_start_matches(|c: char| !c.is_ascii_digit()).parse().unwrap_or(0);
                            let body = match part {
                                "statistics" => json!({ "viewCount": (n * 100).to_string(), "likeCount": n.to_string() }),
                                "status" => json!({ "privacyStatus": "public", "embeddable": true }),
                                _ => json!({ "duration": "PT1M", "definition": "hd" }),
                            };
                            let mut item = json!({ "kind": "youtube#video", "id": id });
                            item[part] = body;
                            item
                        })
                        .collect();
                    Ok(json!({ "items": items }))
                }
                other => panic!("unexpected resource {other}"),
            }
        }

        fn transport(self) -> ScriptedTransport {
            ScriptedTransport::new(move |call| self.respond(call))
        }
    }

    fn fetch_with(
        transport: &ScriptedTransport,
        fields: &[&str],
        max_results: usize,
    ) -> Result<FetchOutcome, FetchFailure> {
        let settings = FetchSettings::new("UCfake", fields.iter().copied(), max_results).unwrap();
        Fetcher::new(transport, settings).fetch()
    }

    #[test]
    fn end_to_end_three_videos() {
        let transport = FakeChannel::with_videos(3).transport();
        let outcome = fetch_with(&transport, &["videoId", "title", "viewCount"], 10).unwrap();

        assert_eq!(outcome.upload_playlist_id, "UUfake");
        assert!(outcome.diagnostics.is_empty());

        let items = outcome.items();
        assert_eq!(items.len(), 3);
        for (index, record) in items.iter().enumerate() {
            let n = index + 1;
            let keys: Vec<&str> = record.keys().map(String::as_str).collect();
            assert_eq!(keys, vec!["title", "videoId", "viewCount"]);
            assert_eq!(record["videoId"], format!("id{n}").as_str());
            assert_eq!(record["title"], format!("Video {n}").as_str());
            assert_eq!(record["viewCount"], (n * 100).to_string().as_str());
        }

        assert_eq!(transport.calls_to(CHANNELS_RESOURCE).len(), 1);
        let pages = transport.calls_to(PLAYLIST_ITEMS_RESOURCE);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].param("playlistId"), Some("UUfake"));
        assert_eq!(pages[0].param("maxResults"), Some("10"));

        let batches = transport.calls_to(VIDEOS_RESOURCE);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].param("part"), Some("statistics"));
        assert_eq!(batches[0].param("id"), Some("id1,id2,id3"));
    }

    #[test]
    fn parts_without_requested_fields_are_not_requested() {
        let transport = FakeChannel::with_videos(5).transport();
        fetch_with(&transport, &["title", "videoId"], 10).unwrap();
        assert!(transport.calls_to(VIDEOS_RESOURCE).is_empty());

        let transport = FakeChannel::with_videos(5).transport();
        fetch_with(&transport, &["title", "duration"], 10).unwrap();
        let parts: Vec<String> = transport
            .calls_to(VIDEOS_RESOURCE)
            .iter()
            .map(|call| call.param("part").unwrap().to_string())
            .collect();
        assert_eq!(parts, vec!["contentDetails"]);
    }

    #[test]
    fn parts_are_requested_in_catalog_order() {
        let transport = FakeChannel::with_videos(2).transport();
        fetch_with(
            &transport,
            &["duration", "privacyStatus", "likeCount", "title"],
            10,
        )
        .unwrap();
        let parts: Vec<String> = transport
            .calls_to(VIDEOS_RESOURCE)
            .iter()
            .map(|call| call.param("part").unwrap().to_string())
            .collect();
        assert_eq!(parts, vec!["statistics", "status", "contentDetails"]);
    }

    #[test]
    fn enrichment_is_batched_by_32() {
        let transport = FakeChannel::with_videos(100).transport();
        let outcome = fetch_with(&transport, &["videoId", "likeCount"], 100).unwrap();
        assert_eq!(outcome.records.len(), 100);

        let sizes: Vec<usize> = transport
            .calls_to(VIDEOS_RESOURCE)
            .iter()
            .map(|call| call.param("id").unwrap().split(',').count())
            .collect();
        assert_eq!(sizes, vec![32, 32, 32, 4]);
        assert!(outcome.items().iter().all(|record| record.contains_key("likeCount")));
    }

    #[test]
    fn ids_after_an_unknown_video_are_still_merged() {
        let mut channel = FakeChannel::with_videos(3);
        channel.ghost_ids = vec!["ghost".to_string()];
        let transport = channel.transport();
        let outcome = fetch_with(&transport, &["videoId", "viewCount"], 10).unwrap();

        assert_eq!(outcome.records.len(), 3);
        assert!(!outcome.records.contains("ghost"));
        for (index, record) in outcome.items().iter().enumerate() {
            assert_eq!(record["viewCount"], ((index + 1) * 100).to_string().as_str());
        }
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(matches!(
            &outcome.diagnostics[0],
            FetchError::UnknownVideo { video_id, part } if video_id == "ghost" && part == "statistics"
        ));
    }

    #[test]
    fn several_unknown_videos_do_not_stop_the_batch() {
        let mut channel = FakeChannel::with_videos(2);
        channel.ghost_ids = vec!["ghost-a".to_string(), "ghost-b".to_string()];
        let transport = channel.transport();
        let outcome = fetch_with(&transport, &["videoId", "duration"], 10).unwrap();

        assert!(outcome.items().iter().all(|record| record["duration"] == "PT1M"));
        assert_eq!(outcome.diagnostics.len(), 2);
    }

    #[test]
    fn failed_part_batch_is_not_fatal() {
        let mut channel = FakeChannel::with_videos(4);
        channel.failing_part = Some("statistics");
        let transport = channel.transport();
        let outcome = fetch_with(&transport, &["videoId", "viewCount", "privacyStatus"], 10).unwrap();

        assert_eq!(outcome.records.len(), 4);
        assert!(outcome.items().iter().all(|record| !record.contains_key("viewCount")));
        assert!(outcome.items().iter().all(|record| record["privacyStatus"] == "public"));
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(matches!(
            &outcome.diagnostics[0],
            FetchError::PartRequest { part, ids, .. } if part == "statistics" && ids.len() == 4
        ));
    }

    #[test]
    fn resolution_failure_aborts_before_any_listing() {
        let transport = ScriptedTransport::new(|call| {
            if call.resource == CHANNELS_RESOURCE {
                Ok(json!({ "items": [] }))
            } else {
                panic!("no further requests expected")
            }
        });
        let failure = fetch_with(&transport, &["title"], 10).unwrap_err();
        assert!(matches!(failure.error, FetchError::Resolution { .. }));
        assert_eq!(failure.failed_in, FetchState::ResolvingUploads);
        assert!(failure.partial.is_empty());
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn snippet_failure_keeps_partial_records() {
        let channel = FakeChannel::with_videos(80);
        let transport = ScriptedTransport::new(move |call| {
            if call.resource == PLAYLIST_ITEMS_RESOURCE && call.param("pageToken").is_some() {
                return Err(status_error(PLAYLIST_ITEMS_RESOURCE, 500));
            }
            channel.respond(call)
        });
        let failure = fetch_with(&transport, &["title", "viewCount"], 80).unwrap_err();

        assert!(matches!(failure.error, FetchError::TransientFetch { status: Some(500), .. }));
        assert_eq!(failure.failed_in, FetchState::FetchingSnippets);
        assert_eq!(failure.partial.len(), 50);
        assert!(transport.calls_to(VIDEOS_RESOURCE).is_empty());
        assert!(failure.to_string().contains("fetching snippets"));
    }

    #[test]
    fn max_results_caps_records() {
        let transport = FakeChannel::with_videos(70).transport();
        let outcome = fetch_with(&transport, &["videoId"], 55).unwrap();
        let ids = outcome.records.video_ids();
        assert_eq!(ids.len(), 55);
        assert_eq!(ids.first().map(String::as_str), Some("id1"));
        assert_eq!(ids.last().map(String::as_str), Some("id55"));
    }

    #[test]
    fn custom_batch_size_is_honoured() {
        let transport = FakeChannel::with_videos(10).transport();
        let settings = FetchSettings::new("UCfake", ["videoId", "duration"], 10)
            .unwrap()
            .with_batch_size(4)
            .unwrap();
        Fetcher::new(&transport, settings).fetch().unwrap();
        let sizes: Vec<usize> = transport
            .calls_to(VIDEOS_RESOURCE)
            .iter()
            .map(|call| call.param("id").unwrap().split(',').count())
            .collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn zero_batch_size_is_rejected_before_io() {
        let err = FetchSettings::for_channel("UC1").with_batch_size(0).unwrap_err();
        assert!(matches!(err, FetchError::InvalidSize(0)));
    }

    #[test]
    fn default_settings_match_cli_defaults() {
        let settings = FetchSettings::for_channel("UC1");
        assert_eq!(settings.max_results(), DEFAULT_MAX_RESULTS);
        assert_eq!(settings.batch_size(), DEFAULT_BATCH_SIZE);
        let fields: Vec<&str> = settings.fields().iter().map(String::as_str).collect();
        assert_eq!(fields, vec!["title", "videoId"]);
    }

    #[test]
    fn zero_max_results_is_rejected_before_io() {
        let err = FetchSettings::new("UC1", DEFAULT_FIELDS, 0).unwrap_err();
        assert!(matches!(err, FetchError::InvalidMaxResults(0)));
    }

    #[test]
    fn state_is_done_after_a_successful_fetch() {
        let transport = FakeChannel::with_videos(2).transport();
        let mut fetcher = Fetcher::new(&transport, FetchSettings::for_channel("UC1"));
        assert_eq!(fetcher.state(), FetchState::Init);

        let outcome = fetcher.fetch().unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(fetcher.state(), FetchState::Done);
    }

    #[test]
    fn state_is_failed_after_a_fatal_error() {
        let transport = ScriptedTransport::new(|call| Err(status_error(&call.resource, 403)));
        let mut fetcher = Fetcher::new(&transport, FetchSettings::for_channel("UC1"));

        let failure = fetcher.fetch().unwrap_err();
        assert_eq!(failure.failed_in, FetchState::ResolvingUploads);
        assert_eq!(fetcher.state(), FetchState::Failed);
    }
}
