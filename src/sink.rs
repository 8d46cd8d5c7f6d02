use crate::events::{GalleryEntry, GalleryEvent};
use std::sync::mpsc;

/// Where a load session presents its results.
pub trait DisplaySink: Send + Sync {
    /// Remove every entry and status message.
    fn clear(&self, session: u64);

    /// Append one rendered entry.
    fn append(&self, entry: GalleryEntry);

    /// Replace the status / count message.
    fn show_status(&self, session: u64, message: &str);
}

/// Forwards display calls as [`GalleryEvent`]s to whoever owns the receiver.
/// Silently drops events if the receiver is gone.
pub struct ChannelSink {
    tx: mpsc::Sender<GalleryEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::Receiver<GalleryEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl DisplaySink for ChannelSink {
    fn clear(&self, session: u64) {
        let _ = self.tx.send(GalleryEvent::Cleared { session });
    }

    fn append(&self, entry: GalleryEntry) {
        let _ = self.tx.send(GalleryEvent::EntryAppended(entry));
    }

    fn show_status(&self, session: u64, message: &str) {
        let _ = self.tx.send(GalleryEvent::Status {
            session,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Sink that keeps everything in memory, for assertions.
    #[derive(Default)]
    pub struct RecordingSink {
        pub entries: Mutex<Vec<GalleryEntry>>,
        pub statuses: Mutex<Vec<String>>,
        pub clears: Mutex<Vec<u64>>,
    }

    impl RecordingSink {
        pub fn entries(&self) -> Vec<GalleryEntry> {
            self.entries.lock().unwrap().clone()
        }

        pub fn labels(&self) -> Vec<String> {
            self.entries().into_iter().map(|e| e.label).collect()
        }

        pub fn last_status(&self) -> Option<String> {
            self.statuses.lock().unwrap().last().cloned()
        }
    }

    impl DisplaySink for RecordingSink {
        fn clear(&self, session: u64) {
            self.entries.lock().unwrap().clear();
            self.statuses.lock().unwrap().clear();
            self.clears.lock().unwrap().push(session);
        }

        fn append(&self, entry: GalleryEntry) {
            self.entries.lock().unwrap().push(entry);
        }

        fn show_status(&self, _session: u64, message: &str) {
            self.statuses.lock().unwrap().push(message.to_string());
        }
    }
}
