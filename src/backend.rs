use crate::error::Result;
use crate::events::RemoteItem;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Shared cancellation flag. Set to `true` to make the owning session stop at
/// its next check point.
pub type CancelFlag = Arc<AtomicBool>;

/// Abstract interface to the remote gallery.
///
/// Implementations perform one request per call; the loader never issues a
/// second call for the same session before the previous one resolved.
#[async_trait]
pub trait GalleryService: Send + Sync {
    /// Number of images stored in `folder`. An empty folder means unscoped.
    async fn count(&self, folder: &str) -> Result<usize>;

    /// Fetch the image at `index` in `folder`.
    /// The payload inside the returned item may be absent or malformed.
    async fn fetch_item(&self, folder: &str, index: usize) -> Result<RemoteItem>;
}

/// Abstract interface to the remote upload endpoint.
#[async_trait]
pub trait UploadService: Send + Sync {
    /// Send a base64-encoded image. `Ok` only means the request did not fail;
    /// the endpoint does not confirm delivery.
    async fn upload(&self, base64_image: &str) -> Result<()>;
}
