use crate::payload::ImagePayload;
use serde::Deserialize;

/// One item as returned by the remote gallery.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteItem {
    #[serde(rename = "dataUrl", default)]
    pub data_url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// A rendered gallery entry.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub session: u64,
    pub index: usize,
    /// `total - index`; 1-based, never 0.
    pub reverse_key: usize,
    pub label: String,
    pub payload: ImagePayload,
}

/// Events emitted by a load session for the display side to apply
pub enum GalleryEvent {
    Cleared {
        session: u64,
    },
    EntryAppended(GalleryEntry),
    Status {
        session: u64,
        message: String,
    },
}

impl GalleryEvent {
    pub fn session(&self) -> u64 {
        match self {
            GalleryEvent::Cleared { session } => *session,
            GalleryEvent::EntryAppended(entry) => entry.session,
            GalleryEvent::Status { session, .. } => *session,
        }
    }
}
