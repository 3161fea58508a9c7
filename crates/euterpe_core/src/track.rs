//! Recommended tracks and listener feedback.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A single recommended track, as returned by the recommendation service.
///
/// Wire field names are kept (`song_id`, `url`, `image_url`, `preview_url`);
/// the service sends empty strings where it has no artwork or preview clip,
/// which deserialize to `None` here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "song_id")]
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: String,
    /// Link to the track on the streaming service.
    #[serde(rename = "url")]
    pub external_url: String,
    #[serde(rename = "image_url", default, deserialize_with = "empty_string_as_none")]
    pub artwork_url: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub valence: f32,
    #[serde(default)]
    pub energy: f32,
    #[serde(default)]
    pub duration_ms: u64,
}

impl Recommendation {
    /// One-line label for logs and the command loop.
    pub fn describe(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }
}

/// Listener reaction to the current track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackRating {
    Like,
    Dislike,
    Skip,
}

impl FeedbackRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackRating::Like => "like",
            FeedbackRating::Dislike => "dislike",
            FeedbackRating::Skip => "skip",
        }
    }
}

impl fmt::Display for FeedbackRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The service uses `""` for absent optional locators.
fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}
