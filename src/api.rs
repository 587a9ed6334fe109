//! Thin YouTube Data API v3 access used by the fetcher.
//!
//! Only three calls are needed: the channel lookup that exposes the upload
//! playlist, paged `playlistItems` listing, and multi-id `videos` lookup for
//! one part at a time. The actual HTTP round trip sits behind [`Transport`]
//! so the fetch logic can be driven by an in-memory transport in tests.

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::catalog::Part;
use crate::config::RuntimeSettings;
use crate::error::{FetchError, TransportError};

pub const CHANNELS_RESOURCE: &str = "channels";
pub const PLAYLIST_ITEMS_RESOURCE: &str = "playlistItems";
pub const VIDEOS_RESOURCE: &str = "videos";

/// Largest `maxResults` the playlistItems endpoint accepts.
pub const MAX_PAGE_SIZE: usize = 50;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One authenticated GET against an API resource, returning the JSON body.
pub trait Transport {
    fn get(&self, resource: &str, params: &[(&str, String)]) -> Result<Value, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, resource: &str, params: &[(&str, String)]) -> Result<Value, TransportError> {
        (**self).get(resource, params)
    }
}

/// Blocking transport backed by a shared `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
    api_url: String,
    api_key: String,
}

impl UreqTransport {
    pub fn new(settings: &RuntimeSettings) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            agent,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        }
    }

    /// Request URL as reported in errors. The key never appears here.
    fn display_url(&self, resource: &str, params: &[(&str, String)]) -> String {
        let query = params
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}/{resource}?{query}", self.api_url)
    }
}

impl Transport for UreqTransport {
    fn get(&self, resource: &str, params: &[(&str, String)]) -> Result<Value, TransportError> {
        let url = format!("{}/{resource}", self.api_url);
        let mut request = self.agent.get(&url).query("key", &self.api_key);
        for (key, value) in params {
            request = request.query(key, value);
        }

        debug!(resource, url = %self.display_url(resource, params), "GET");
        match request.call() {
            Ok(response) => response
                .into_json::<Value>()
                .map_err(|err| TransportError::Decode {
                    resource: resource.to_string(),
                    message: err.to_string(),
                }),
            Err(ureq::Error::Status(status, _)) => Err(TransportError::Status {
                resource: resource.to_string(),
                status,
                url: self.display_url(resource, params),
            }),
            Err(ureq::Error::Transport(err)) => Err(TransportError::Network {
                resource: resource.to_string(),
                message: err.to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelItem {
    content_details: Option<ChannelContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: Option<RelatedPlaylists>,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemListResponse {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    #[serde(default)]
    page_info: PageInfo,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    total_results: usize,
}

/// Entry of the upload playlist. The snippet is kept as raw JSON so any
/// catalog field can be picked out of it.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistItem {
    #[serde(default)]
    pub snippet: Map<String, Value>,
}

impl PlaylistItem {
    /// The video id lives one level down, in `snippet.resourceId.videoId`.
    pub fn video_id(&self) -> Option<&str> {
        self.snippet
            .get("resourceId")
            .and_then(|resource| resource.get("videoId"))
            .and_then(Value::as_str)
    }
}

/// One page of the upload playlist.
#[derive(Debug, Clone)]
pub struct PlaylistPage {
    pub items: Vec<PlaylistItem>,
    pub total_results: usize,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

/// Entry of a `videos` lookup: the id plus whatever part objects were asked
/// for, keyed by part name.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoItem {
    pub id: String,
    #[serde(flatten)]
    pub parts: Map<String, Value>,
}

impl VideoItem {
    pub fn part(&self, part: Part) -> Option<&Map<String, Value>> {
        self.parts.get(part.as_str()).and_then(Value::as_object)
    }
}

pub struct ApiClient<T> {
    transport: T,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Looks up the channel and returns the id of its uploads playlist.
    pub fn upload_playlist_id(&self, channel_id: &str) -> Result<String, FetchError> {
        let resolution = |reason: String| FetchError::Resolution {
            channel_id: channel_id.to_string(),
            reason,
        };

        let params = [
            ("part", Part::ContentDetails.as_str().to_string()),
            ("id", channel_id.to_string()),
        ];
        let body = self
            .transport
            .get(CHANNELS_RESOURCE, &params)
            .map_err(|err| resolution(err.to_string()))?;
        let response: ChannelListResponse =
            decode(CHANNELS_RESOURCE, body).map_err(|err| resolution(err.to_string()))?;

        let item = response
            .items
            .into_iter()
            .next()
            .ok_or_else(|| resolution("channel not found".to_string()))?;
        item.content_details
            .and_then(|details| details.related_playlists)
            .and_then(|playlists| playlists.uploads)
            .filter(|uploads| !uploads.is_empty())
            .ok_or_else(|| resolution("response has no uploads playlist".to_string()))
    }

    pub fn playlist_page(
        &self,
        playlist_id: &str,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<PlaylistPage, TransportError> {
        let mut params = vec![
            ("part", Part::Snippet.as_str().to_string()),
            ("playlistId", playlist_id.to_string()),
            ("maxResults", page_size.to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let body = self.transport.get(PLAYLIST_ITEMS_RESOURCE, &params)?;
        let response: PlaylistItemListResponse = decode(PLAYLIST_ITEMS_RESOURCE, body)?;
        Ok(PlaylistPage {
            items: response.items,
            total_results: response.page_info.total_results,
            next_page_token: response.next_page_token.filter(|token| !token.is_empty()),
        })
    }

    /// Fetches `part` for every id in `ids` with a single request.
    pub fn videos_part(&self, part: Part, ids: &[String]) -> Result<Vec<VideoItem>, TransportError> {
        let params = [("part", part.as_str().to_string()), ("id", ids.join(","))];
        let body = self.transport.get(VIDEOS_RESOURCE, &params)?;
        let response: VideoListResponse = decode(VIDEOS_RESOURCE, body)?;
        Ok(response.items)
    }
}

fn decode<R: DeserializeOwned>(resource: &str, body: Value) -> Result<R, TransportError> {
    serde_json::from_value(body).map_err(|err| TransportError::Decode {
        resource: resource.to_string(),
        message: err.to_string(),
    })
}
