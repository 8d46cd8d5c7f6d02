use crate::backend::{GalleryService, UploadService};
use crate::capture::{CaptureSource, ImageBlob};
use crate::debug_log::DebugLog;
use crate::error::{DocsnapError, Result};
use crate::events::{GalleryEntry, GalleryEvent};
use crate::loader::{GalleryLoader, LoadSession, SessionReport};
use crate::settings::AppSettings;
use crate::sink::{ChannelSink, DisplaySink};
use std::fmt;
use std::sync::{Arc, mpsc};
use tokio::runtime::Handle;

/// Which view is visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Camera,
    Input,
    Output,
    /// A gallery for a folder that is not one of the two configured ones.
    Folder(String),
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Screen::Camera => write!(f, "camera"),
            Screen::Input => write!(f, "input"),
            Screen::Output => write!(f, "output"),
            Screen::Folder(folder) => write!(f, "folder '{}'", folder),
        }
    }
}

/// The application model - owns state and processes commands.
pub struct AppModel {
    settings: AppSettings,
    loader: Option<GalleryLoader>,
    uploader: Option<Arc<dyn UploadService>>,
    log: DebugLog,

    screen: Screen,

    // Gallery display
    sink: Arc<ChannelSink>,
    event_rx: mpsc::Receiver<GalleryEvent>,
    session: Option<LoadSession>,
    live_session: Option<u64>,
    entries: Vec<GalleryEntry>,
    status: String,

    // Capture + upload
    last_capture: Option<ImageBlob>,
}

impl AppModel {
    pub fn new(
        settings: AppSettings,
        gallery: Option<Arc<dyn GalleryService>>,
        uploader: Option<Arc<dyn UploadService>>,
        log: DebugLog,
        runtime: Handle,
    ) -> Self {
        let (sink, event_rx) = ChannelSink::new();
        Self {
            settings,
            loader: gallery.map(|g| GalleryLoader::new(g, log.clone(), runtime)),
            uploader,
            log,
            screen: Screen::Camera,
            sink: Arc::new(sink),
            event_rx,
            session: None,
            live_session: None,
            entries: Vec::new(),
            status: String::new(),
            last_capture: None,
        }
    }

    // Navigation

    /// Switch the visible screen. Leaving a gallery cancels its load; opening
    /// a gallery starts a fresh one.
    pub fn show_screen(&mut self, screen: Screen) {
        self.log.info(format!("Showing {} screen", screen));
        let folder = match &screen {
            Screen::Camera => None,
            Screen::Input => Some(self.settings.input_folder.clone()),
            Screen::Output => Some(self.settings.output_folder.clone()),
            Screen::Folder(folder) => Some(folder.clone()),
        };
        self.screen = screen;

        match (folder, self.loader.as_mut()) {
            (Some(folder), Some(loader)) => {
                let sink: Arc<dyn DisplaySink> = self.sink.clone();
                let session = loader.start_load(&folder, sink);
                self.live_session = Some(session.id());
                self.session = Some(session);
            }
            (Some(_), None) => {
                self.log.error("Gallery endpoint is not configured");
                self.live_session = None;
                self.entries.clear();
                self.status = "Gallery endpoint is not configured".to_string();
            }
            (None, loader) => {
                if let Some(loader) = loader {
                    loader.cancel_active();
                }
                self.live_session = None;
            }
        }
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    /// Apply queued display events of the live session. Events of any other
    /// session are dropped. Returns true if anything changed.
    pub fn process_events(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.event_rx.try_recv() {
            if Some(event.session()) != self.live_session {
                continue;
            }
            match event {
                GalleryEvent::Cleared { .. } => {
                    self.entries.clear();
                    self.status.clear();
                }
                GalleryEvent::EntryAppended(entry) => {
                    self.entries.push(entry);
                }
                GalleryEvent::Status { message, .. } => {
                    self.status = message;
                }
            }
            changed = true;
        }
        changed
    }

    /// True when no load is running.
    pub fn session_finished(&self) -> bool {
        self.session.as_ref().is_none_or(|s| s.is_finished())
    }

    /// Wait for the most recently started load to stop and return its report.
    pub async fn wait_session(&mut self) -> Result<Option<SessionReport>> {
        match self.session.take() {
            Some(session) => Ok(Some(session.wait().await?)),
            None => Ok(None),
        }
    }

    /// Cancel the most recent load without waiting on its in-flight request.
    /// Returns the folder it was loading.
    pub fn abandon_session(&mut self) -> Option<String> {
        let session = self.session.take()?;
        if self.live_session == Some(session.id()) {
            self.live_session = None;
        }
        let folder = session.folder().to_string();
        self.log.info(format!("Abandoned load of '{}'", folder));
        session.abandon();
        Some(folder)
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn debug_log(&self) -> &DebugLog {
        &self.log
    }

    // Capture + upload

    pub fn capture_photo(&mut self, source: &mut dyn CaptureSource) -> Result<()> {
        self.log.info("Capture requested");
        match source.capture() {
            Ok(blob) => {
                self.log.info(format!(
                    "Image captured ({}x{}, {} bytes)",
                    blob.width,
                    blob.height,
                    blob.bytes.len()
                ));
                self.last_capture = Some(blob);
                Ok(())
            }
            Err(e) => {
                self.log.error(format!("Error capturing image: {}", e));
                Err(e)
            }
        }
    }

    pub fn last_capture(&self) -> Option<&ImageBlob> {
        self.last_capture.as_ref()
    }

    /// Upload the last captured image. The capture is kept if sending fails.
    pub async fn send_photo(&mut self) -> Result<()> {
        self.log.info("Send requested");
        let blob = match self.last_capture.as_ref() {
            Some(blob) => blob,
            None => {
                self.log.warn("No captured image to send");
                return Err(DocsnapError::NoCapture);
            }
        };
        let uploader = self.uploader.as_ref().ok_or_else(|| {
            DocsnapError::Config("upload endpoint is not configured".to_string())
        })?;

        match uploader.upload(&blob.to_base64()).await {
            Ok(()) => {
                self.log.info("Image sent");
                self.last_capture = None;
                Ok(())
            }
            Err(e) => {
                self.log.error(format!("Error sending image: {}", e));
                Err(e)
            }
        }
    }
}
