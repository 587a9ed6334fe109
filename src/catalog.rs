//! Static table of API parts and the video fields each part can supply.
//!
//! Field names follow the YouTube Data API v3 `videos`/`playlistItems`
//! resources. The table is fixed at build time; requesting a field that no
//! part lists simply yields nothing for it.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::FetchError;

/// Attribute group exposed by the API for a video resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Part {
    Snippet,
    Statistics,
    Status,
    ContentDetails,
}

impl Part {
    /// Every part in catalog order. Enrichment walks this order so the
    /// request sequence is reproducible.
    pub const ALL: [Part; 4] = [
        Part::Snippet,
        Part::Statistics,
        Part::Status,
        Part::ContentDetails,
    ];

    /// Value sent as the `part` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            Part::Snippet => "snippet",
            Part::Statistics => "statistics",
            Part::Status => "status",
            Part::ContentDetails => "contentDetails",
        }
    }

    pub fn fields(self) -> &'static [&'static str] {
        match self {
            Part::Snippet => &[
                "channelId",
                "channelTitle",
                "title",
                "description",
                "position",
                "playlistId",
                "publishedAt",
                "resourceId",
                "videoId",
                "thumbnails",
            ],
            Part::Statistics => &[
                "commentCount",
                "dislikeCount",
                "favoriteCount",
                "likeCount",
                "viewCount",
            ],
            Part::Status => &[
                "embeddable",
                "license",
                "privacyStatus",
                "uploadStatus",
                "publicStatsViewable",
            ],
            Part::ContentDetails => &[
                "caption",
                "definition",
                "dimension",
                "duration",
                "licensedContent",
                "projection",
            ],
        }
    }

    pub fn supplies(self, field: &str) -> bool {
        self.fields().contains(&field)
    }

    /// Parts after `snippet`, i.e. the ones filled by batch enrichment.
    pub fn enrichment_parts() -> impl Iterator<Item = Part> {
        Part::ALL.into_iter().filter(|part| *part != Part::Snippet)
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Part {
    type Err = FetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Part::ALL
            .into_iter()
            .find(|part| part.as_str() == value)
            .ok_or_else(|| FetchError::UnknownPart(value.to_string()))
    }
}

/// Requested fields that `part` is able to supply.
pub fn intersect(part: Part, requested: &BTreeSet<String>) -> BTreeSet<String> {
    requested
        .iter()
        .filter(|field| part.supplies(field))
        .cloned()
        .collect()
}

/// Requested fields no part knows about. Used to warn about typos up front.
pub fn unsupported_fields(requested: &BTreeSet<String>) -> Vec<String> {
    requested
        .iter()
        .filter(|field| !Part::ALL.iter().any(|part| part.supplies(field)))
        .cloned()
        .collect()
}
