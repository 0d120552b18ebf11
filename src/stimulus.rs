//! Stimulus: the input unit of one cognitive cycle.
//!
//! A stimulus is either raw text or a reference to visual content with an
//! optional caption. It is immutable once created; cycles share it by
//! reference across every analyzer.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Reference to visual/media content.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaRef {
    /// Content reachable at a URL.
    Url { url: String },
    /// Content carried inline.
    Inline {
        mime_type: String,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
}

impl MediaRef {
    /// Reference media by URL.
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    /// Carry media bytes inline.
    pub fn inline(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self::Inline {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// URL usable in an OpenAI-style `image_url` content part.
    ///
    /// Inline content becomes a `data:` URL.
    pub fn to_content_url(&self) -> String {
        match self {
            Self::Url { url } => url.clone(),
            Self::Inline { mime_type, data } => {
                format!("data:{};base64,{}", mime_type, STANDARD.encode(data))
            }
        }
    }

    /// Short description for logs and text-only analyzers.
    pub fn describe(&self) -> String {
        match self {
            Self::Url { url } => format!("media at {}", url),
            Self::Inline { mime_type, data } => {
                format!("inline {} ({} bytes)", mime_type, data.len())
            }
        }
    }
}

impl fmt::Debug for MediaRef {
    // Inline payloads can be megabytes; keep them out of debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url { url } => f.debug_struct("Url").field("url", url).finish(),
            Self::Inline { mime_type, data } => f
                .debug_struct("Inline")
                .field("mime_type", mime_type)
                .field("len", &data.len())
                .finish(),
        }
    }
}

/// Input submitted for one cognitive cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Stimulus {
    /// Raw text.
    Text { text: String },
    /// Visual content with an optional caption.
    Media {
        media: MediaRef,
        #[serde(default)]
        caption: Option<String>,
    },
}

impl Stimulus {
    /// A text stimulus.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// A media stimulus.
    pub fn media(media: MediaRef, caption: Option<String>) -> Self {
        Self::Media { media, caption }
    }

    /// Media reference, if this stimulus carries one.
    pub fn media_ref(&self) -> Option<&MediaRef> {
        match self {
            Self::Text { .. } => None,
            Self::Media { media, .. } => Some(media),
        }
    }

    /// Text rendering for analyzers that cannot see media.
    ///
    /// Text stimuli are returned verbatim; media stimuli yield their caption,
    /// or a placeholder naming the media when there is none.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Media {
                caption: Some(caption),
                ..
            } => caption.clone(),
            Self::Media { media, caption: None } => format!("[{}]", media.describe()),
        }
    }
}

impl From<&str> for Stimulus {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for Stimulus {
    fn from(text: String) -> Self {
        Self::Text { text }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
