use crate::backend::{CancelFlag, GalleryService};
use crate::debug_log::DebugLog;
use crate::error::{DocsnapError, Result};
use crate::events::{GalleryEntry, RemoteItem};
use crate::payload::ImagePayload;
use crate::sink::DisplaySink;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

// Session bookkeeping

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The count query failed; nothing was retrieved.
    CountFailed,
    /// The folder holds no images.
    Empty,
    /// Every index was attempted.
    Exhausted,
    /// As many unique reverse keys as `total` were seen.
    AllUniqueCollected,
    /// Cancelled from outside (navigation or a newer load).
    Cancelled,
}

/// Summary of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session: u64,
    pub folder: String,
    pub total: usize,
    pub next_index: usize,
    pub rendered: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub reason: StopReason,
}

impl SessionReport {
    /// Turn a failed count into an error; every other outcome passes through.
    pub fn check(self) -> Result<Self> {
        match self.reason {
            StopReason::CountFailed => Err(DocsnapError::CountFailed {
                folder: self.folder,
            }),
            _ => Ok(self),
        }
    }
}

/// Cursor and duplicate-suppression state owned by one running session.
#[derive(Debug)]
pub struct SessionState {
    total: usize,
    next_index: usize,
    seen_reverse_keys: HashSet<usize>,
    rendered: usize,
    duplicates: usize,
    failed: usize,
}

impl SessionState {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            next_index: 0,
            seen_reverse_keys: HashSet::new(),
            rendered: 0,
            duplicates: 0,
            failed: 0,
        }
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn has_next(&self) -> bool {
        self.next_index < self.total
    }

    pub fn advance(&mut self) {
        self.next_index += 1;
    }

    /// `total - index`. Runs from `total` down to 1 and never reaches 0.
    pub fn reverse_key(&self, index: usize) -> usize {
        self.total - index
    }

    /// Record `key` as seen. Returns `false` if it was already seen.
    pub fn admit(&mut self, key: usize) -> bool {
        if self.seen_reverse_keys.insert(key) {
            true
        } else {
            self.duplicates += 1;
            false
        }
    }

    pub fn seen_count(&self) -> usize {
        self.seen_reverse_keys.len()
    }

    /// All unique items have been collected.
    pub fn is_complete(&self) -> bool {
        self.seen_reverse_keys.len() >= self.total
    }

    fn report(&self, session: u64, folder: &str, reason: StopReason) -> SessionReport {
        SessionReport {
            session,
            folder: folder.to_string(),
            total: self.total,
            next_index: self.next_index,
            rendered: self.rendered,
            duplicates: self.duplicates,
            failed: self.failed,
            reason,
        }
    }
}

// Handles

/// Serializes "check flag, then touch the sink" against "set flag", so that
/// once a cancel returns no stale entry can reach the sink.
type RenderGate = Arc<Mutex<()>>;

fn cancel_gated(gate: &RenderGate, flag: &CancelFlag) {
    let _guard = gate.lock().unwrap();
    flag.store(true, Ordering::SeqCst);
}

/// Handle to one in-flight load.
pub struct LoadSession {
    id: u64,
    folder: String,
    cancel_flag: CancelFlag,
    render_gate: RenderGate,
    task: JoinHandle<SessionReport>,
}

impl LoadSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Stop the session. Idempotent; already rendered entries stay.
    pub fn cancel(&self) {
        cancel_gated(&self.render_gate, &self.cancel_flag);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session task to stop.
    pub async fn wait(self) -> Result<SessionReport> {
        Ok(self.task.await?)
    }

    /// Cancel and stop the task outright, dropping any in-flight request
    /// instead of waiting for it to come back.
    pub fn abandon(self) {
        self.cancel();
        self.task.abort();
    }
}

/// Starts load sessions; at most one is live at a time.
pub struct GalleryLoader {
    service: Arc<dyn GalleryService>,
    log: DebugLog,
    runtime: Handle,
    render_gate: RenderGate,
    active_cancel_flag: Option<CancelFlag>,
    next_session_id: u64,
}

impl GalleryLoader {
    pub fn new(service: Arc<dyn GalleryService>, log: DebugLog, runtime: Handle) -> Self {
        Self {
            service,
            log,
            runtime,
            render_gate: Arc::new(Mutex::new(())),
            active_cancel_flag: None,
            next_session_id: 1,
        }
    }

    /// Cancel any previous session, clear `sink`, and start loading `folder`
    /// into it. Returns immediately; entries arrive as the task progresses.
    pub fn start_load(&mut self, folder: &str, sink: Arc<dyn DisplaySink>) -> LoadSession {
        let id = self.next_session_id;
        self.next_session_id += 1;
        let cancel_flag: CancelFlag = Arc::new(AtomicBool::new(false));

        {
            let _guard = self.render_gate.lock().unwrap();
            if let Some(prev) = self.active_cancel_flag.take() {
                prev.store(true, Ordering::SeqCst);
            }
            self.active_cancel_flag = Some(Arc::clone(&cancel_flag));
            sink.clear(id);
        }

        self.log.info(format!(
            "Loading images for folder '{}' (session {})",
            folder, id
        ));

        let runner = SessionRunner {
            id,
            folder: folder.to_string(),
            service: Arc::clone(&self.service),
            sink,
            log: self.log.clone(),
            cancel_flag: Arc::clone(&cancel_flag),
            render_gate: Arc::clone(&self.render_gate),
        };
        let task = self.runtime.spawn(runner.run());

        LoadSession {
            id,
            folder: folder.to_string(),
            cancel_flag,
            render_gate: Arc::clone(&self.render_gate),
            task,
        }
    }

    /// Cancel whichever session is live, if any.
    pub fn cancel_active(&mut self) {
        if let Some(flag) = self.active_cancel_flag.take() {
            cancel_gated(&self.render_gate, &flag);
        }
    }
}

impl Drop for GalleryLoader {
    fn drop(&mut self) {
        if let Some(ref flag) = self.active_cancel_flag {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

// Retrieval loop

struct SessionRunner {
    id: u64,
    folder: String,
    service: Arc<dyn GalleryService>,
    sink: Arc<dyn DisplaySink>,
    log: DebugLog,
    cancel_flag: CancelFlag,
    render_gate: RenderGate,
}

impl SessionRunner {
    fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    /// Run `f` against the sink unless the session is cancelled.
    fn present<F>(&self, f: F) -> bool
    where
        F: FnOnce(&dyn DisplaySink),
    {
        let _guard = self.render_gate.lock().unwrap();
        if self.is_cancelled() {
            return false;
        }
        f(self.sink.as_ref());
        true
    }

    fn stop_cancelled(&self, state: &SessionState) -> SessionReport {
        tracing::debug!(
            session = self.id,
            folder = %self.folder,
            next_index = state.next_index(),
            "load session cancelled"
        );
        state.report(self.id, &self.folder, StopReason::Cancelled)
    }

    async fn run(self) -> SessionReport {
        let total = match self.service.count(&self.folder).await {
            Ok(total) => total,
            Err(e) => {
                let state = SessionState::new(0);
                if self.is_cancelled() {
                    return self.stop_cancelled(&state);
                }
                self.log.error(format!(
                    "Error counting images in '{}': {}",
                    self.folder, e
                ));
                self.present(|sink| {
                    sink.show_status(self.id, &format!("Error loading images: {}", e))
                });
                return state.report(self.id, &self.folder, StopReason::CountFailed);
            }
        };

        let mut state = SessionState::new(total);
        if self.is_cancelled() {
            return self.stop_cancelled(&state);
        }

        if total == 0 {
            self.log.info(format!("No images found in '{}'", self.folder));
            self.present(|sink| sink.show_status(self.id, "No images found"));
            return state.report(self.id, &self.folder, StopReason::Empty);
        }

        self.log.info(format!(
            "Folder '{}' has {} images",
            self.folder, total
        ));
        self.present(|sink| {
            sink.show_status(self.id, &format!("Loading {} images", total))
        });

        loop {
            if self.is_cancelled() {
                return self.stop_cancelled(&state);
            }
            if !state.has_next() {
                self.log.info(format!(
                    "Finished loading '{}': {} of {} images shown",
                    self.folder, state.rendered, total
                ));
                return state.report(self.id, &self.folder, StopReason::Exhausted);
            }

            let index = state.next_index();
            let result = self.service.fetch_item(&self.folder, index).await;

            if self.is_cancelled() {
                return self.stop_cancelled(&state);
            }

            match result {
                Ok(item) => {
                    if !self.accept_item(&mut state, index, item) {
                        return self.stop_cancelled(&state);
                    }
                    if state.is_complete() {
                        self.cancel_flag.store(true, Ordering::SeqCst);
                        self.log.info(format!(
                            "All {} unique images of '{}' collected",
                            total, self.folder
                        ));
                        return state.report(
                            self.id,
                            &self.folder,
                            StopReason::AllUniqueCollected,
                        );
                    }
                }
                Err(e) => {
                    state.failed += 1;
                    self.log.error(format!(
                        "Error loading image at index {} of '{}': {}",
                        index, self.folder, e
                    ));
                }
            }

            state.advance();
        }
    }

    /// Deduplicate and render one successfully fetched item.
    /// Returns `false` if the session was cancelled while rendering.
    fn accept_item(&self, state: &mut SessionState, index: usize, item: RemoteItem) -> bool {
        let reverse_key = state.reverse_key(index);
        // With `total` fixed per session, `total - index` never repeats, so
        // this only fires if the keying scheme changes.
        if !state.admit(reverse_key) {
            self.log.info(format!(
                "Duplicate image skipped (index {}, reverse key {})",
                index, reverse_key
            ));
            return true;
        }

        let payload = match item.data_url.as_deref() {
            Some(url) => ImagePayload::from_data_url(url),
            None => Err(DocsnapError::MissingPayload { index }),
        };
        let payload = match payload {
            Ok(p) => p,
            Err(e) => {
                state.failed += 1;
                self.log.error(format!(
                    "Error loading image at index {} of '{}': {}",
                    index, self.folder, e
                ));
                return true;
            }
        };

        let label = item
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Image {}", index + 1));
        let entry = GalleryEntry {
            session: self.id,
            index,
            reverse_key,
            label: label.clone(),
            payload,
        };

        if !self.present(|sink| sink.append(entry)) {
            return false;
        }
        state.rendered += 1;
        self.log.info(format!(
            "Image {} loaded: {} (reverse key {})",
            index + 1,
            label,
            reverse_key
        ));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_log::LogLevel;
    use crate::payload::tiny_png_data_url;
    use crate::sink::testing::RecordingSink;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::oneshot;

    enum Step {
        Item(RemoteItem),
        Fail,
    }

    /// In-memory gallery. Items default to a valid image named
    /// `<folder>-<index>`; individual indices can be scripted or held back
    /// until the test releases them.
    struct ScriptedService {
        counts: HashMap<String, std::result::Result<usize, String>>,
        steps: Mutex<HashMap<(String, usize), Step>>,
        holds: Mutex<HashMap<(String, usize), oneshot::Receiver<()>>>,
        requests: Mutex<Vec<(String, usize)>>,
    }

    impl ScriptedService {
        fn new() -> Self {
            Self {
                counts: HashMap::new(),
                steps: Mutex::new(HashMap::new()),
                holds: Mutex::new(HashMap::new()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn with_count(mut self, folder: &str, count: usize) -> Self {
            self.counts.insert(folder.to_string(), Ok(count));
            self
        }

        fn with_count_error(mut self, folder: &str) -> Self {
            self.counts
                .insert(folder.to_string(), Err("count unavailable".to_string()));
            self
        }

        fn script(&self, folder: &str, index: usize, step: Step) {
            self.steps
                .lock()
                .unwrap()
                .insert((folder.to_string(), index), step);
        }

        fn hold(&self, folder: &str, index: usize) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.holds
                .lock()
                .unwrap()
                .insert((folder.to_string(), index), rx);
            tx
        }

        fn requested_indices(&self, folder: &str) -> Vec<usize> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|(f, _)| f == folder)
                .map(|(_, i)| *i)
                .collect()
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    fn test_error() -> DocsnapError {
        DocsnapError::Status {
            endpoint: "test".to_string(),
            status: 500,
        }
    }

    #[async_trait]
    impl GalleryService for ScriptedService {
        async fn count(&self, folder: &str) -> Result<usize> {
            match self.counts.get(folder) {
                Some(Ok(n)) => Ok(*n),
                _ => Err(test_error()),
            }
        }

        async fn fetch_item(&self, folder: &str, index: usize) -> Result<RemoteItem> {
            let key = (folder.to_string(), index);
            self.requests.lock().unwrap().push(key.clone());

            let hold = self.holds.lock().unwrap().remove(&key);
            if let Some(rx) = hold {
                let _ = rx.await;
            }

            match self.steps.lock().unwrap().remove(&key) {
                Some(Step::Item(item)) => Ok(item),
                Some(Step::Fail) => Err(test_error()),
                None => Ok(RemoteItem {
                    data_url: Some(tiny_png_data_url(1, 1)),
                    name: Some(format!("{}-{}", folder, index)),
                }),
            }
        }
    }

    fn loader_for(service: &Arc<ScriptedService>) -> (GalleryLoader, DebugLog) {
        let log = DebugLog::new();
        let loader = GalleryLoader::new(
            Arc::clone(service) as Arc<dyn GalleryService>,
            log.clone(),
            Handle::current(),
        );
        (loader, log)
    }

    async fn wait_for_requests(service: &ScriptedService, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while service.request_count() < n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("requests never issued");
    }

    #[tokio::test]
    async fn test_renders_every_item_in_index_order() {
        let service = Arc::new(ScriptedService::new().with_count("input", 3));
        let (mut loader, _log) = loader_for(&service);
        let sink = Arc::new(RecordingSink::default());

        let session = loader.start_load("input", sink.clone());
        let report = session.wait().await.unwrap();

        assert_eq!(sink.labels(), vec!["input-0", "input-1", "input-2"]);
        let keys: Vec<usize> = sink.entries().iter().map(|e| e.reverse_key).collect();
        assert_eq!(keys, vec![3, 2, 1]);
        assert_eq!(service.requested_indices("input"), vec![0, 1, 2]);
        assert_eq!(sink.last_status().as_deref(), Some("Loading 3 images"));
        assert_eq!(report.rendered, 3);
        assert_eq!(report.reason, StopReason::AllUniqueCollected);
    }

    #[tokio::test]
    async fn test_empty_folder_issues_no_item_requests() {
        let service = Arc::new(ScriptedService::new().with_count("output", 0));
        let (mut loader, _log) = loader_for(&service);
        let sink = Arc::new(RecordingSink::default());

        let report = loader.start_load("output", sink.clone()).wait().await.unwrap();

        assert!(sink.entries().is_empty());
        assert_eq!(sink.last_status().as_deref(), Some("No images found"));
        assert_eq!(service.request_count(), 0);
        assert_eq!(report.reason, StopReason::Empty);
    }

    #[tokio::test]
    async fn test_count_failure_stops_before_retrieval() {
        let service = Arc::new(ScriptedService::new().with_count_error("input"));
        let (mut loader, log) = loader_for(&service);
        let sink = Arc::new(RecordingSink::default());

        let report = loader.start_load("input", sink.clone()).wait().await.unwrap();

        assert_eq!(report.reason, StopReason::CountFailed);
        assert_eq!(service.request_count(), 0);
        assert!(sink.entries().is_empty());
        assert!(sink.last_status().unwrap().starts_with("Error loading images"));
        assert_eq!(log.lines_at(LogLevel::Error).len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_discards_in_flight_result() {
        let service = Arc::new(ScriptedService::new().with_count("input", 4));
        let release = service.hold("input", 2);
        let (mut loader, _log) = loader_for(&service);
        let sink = Arc::new(RecordingSink::default());

        let session = loader.start_load("input", sink.clone());
        wait_for_requests(&service, 3).await;
        assert_eq!(sink.entries().len(), 2);

        session.cancel();
        session.cancel();
        assert!(session.is_cancelled());
        release.send(()).unwrap();

        let report = session.wait().await.unwrap();
        assert_eq!(report.reason, StopReason::Cancelled);
        assert_eq!(report.rendered, 2);
        assert_eq!(sink.entries().len(), 2);
        assert_eq!(service.requested_indices("input"), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_abandon_drops_in_flight_request() {
        let service = Arc::new(ScriptedService::new().with_count("input", 3));
        let mut release = service.hold("input", 1);
        let (mut loader, _log) = loader_for(&service);
        let sink = Arc::new(RecordingSink::default());

        let session = loader.start_load("input", sink.clone());
        wait_for_requests(&service, 2).await;
        session.abandon();

        // The held request future is dropped, closing its channel.
        tokio::time::timeout(Duration::from_secs(5), release.closed())
            .await
            .expect("in-flight request was not dropped");
        assert_eq!(sink.labels(), vec!["input-0"]);
        assert_eq!(service.requested_indices("input"), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_count_failure_report_is_an_error() {
        let service = Arc::new(ScriptedService::new().with_count_error("input"));
        let (mut loader, _log) = loader_for(&service);
        let sink = Arc::new(RecordingSink::default());

        let report = loader.start_load("input", sink.clone()).wait().await.unwrap();
        let err = report.check().unwrap_err();
        assert!(matches!(err, DocsnapError::CountFailed { ref folder } if folder == "input"));

        let service = Arc::new(ScriptedService::new().with_count("output", 0));
        let (mut loader, _log) = loader_for(&service);
        let report = loader.start_load("output", sink).wait().await.unwrap();
        assert_eq!(report.check().unwrap().reason, StopReason::Empty);
    }

    #[tokio::test]
    async fn test_failed_item_does_not_stop_session() {
        let service = Arc::new(ScriptedService::new().with_count("input", 3));
        service.script("input", 1, Step::Fail);
        let (mut loader, log) = loader_for(&service);
        let sink = Arc::new(RecordingSink::default());

        let report = loader.start_load("input", sink.clone()).wait().await.unwrap();

        assert_eq!(sink.labels(), vec!["input-0", "input-2"]);
        assert_eq!(service.requested_indices("input"), vec![0, 1, 2]);
        let errors = log.lines_at(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("index 1"));
        assert_eq!(report.failed, 1);
        assert_eq!(report.reason, StopReason::Exhausted);
    }

    #[tokio::test]
    async fn test_missing_and_malformed_payloads_are_skipped() {
        let service = Arc::new(ScriptedService::new().with_count("input", 3));
        service.script(
            "input",
            0,
            Step::Item(RemoteItem {
                data_url: None,
                name: Some("no-payload".to_string()),
            }),
        );
        service.script(
            "input",
            1,
            Step::Item(RemoteItem {
                data_url: Some("not a data url".to_string()),
                name: None,
            }),
        );
        let (mut loader, log) = loader_for(&service);
        let sink = Arc::new(RecordingSink::default());

        let report = loader.start_load("input", sink.clone()).wait().await.unwrap();

        assert_eq!(sink.labels(), vec!["input-2"]);
        assert_eq!(log.lines_at(LogLevel::Error).len(), 2);
        assert_eq!(report.failed, 2);
        // Reverse keys of bad payloads still count as seen.
        assert_eq!(report.reason, StopReason::AllUniqueCollected);
    }

    #[tokio::test]
    async fn test_unnamed_item_gets_fallback_label() {
        let service = Arc::new(ScriptedService::new().with_count("", 2));
        service.script(
            "",
            1,
            Step::Item(RemoteItem {
                data_url: Some(tiny_png_data_url(2, 2)),
                name: None,
            }),
        );
        let (mut loader, _log) = loader_for(&service);
        let sink = Arc::new(RecordingSink::default());

        loader.start_load("", sink.clone()).wait().await.unwrap();

        assert_eq!(sink.labels(), vec!["-0", "Image 2"]);
        assert_eq!(sink.entries()[1].payload.dimensions, Some((2, 2)));
    }

    #[tokio::test]
    async fn test_new_load_cancels_previous_session() {
        let service = Arc::new(
            ScriptedService::new()
                .with_count("input", 3)
                .with_count("output", 2),
        );
        let release = service.hold("input", 1);
        let (mut loader, _log) = loader_for(&service);
        let sink = Arc::new(RecordingSink::default());

        let first = loader.start_load("input", sink.clone());
        wait_for_requests(&service, 2).await;

        let second = loader.start_load("output", sink.clone());
        assert!(first.is_cancelled());
        release.send(()).unwrap();

        let first_report = first.wait().await.unwrap();
        let second_report = second.wait().await.unwrap();

        assert_eq!(first_report.reason, StopReason::Cancelled);
        assert_eq!(second_report.reason, StopReason::AllUniqueCollected);
        assert_eq!(sink.labels(), vec!["output-0", "output-1"]);
        assert_eq!(service.requested_indices("input"), vec![0, 1]);
        assert_eq!(*sink.clears.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_cancel_active_without_handle() {
        let service = Arc::new(ScriptedService::new().with_count("input", 2));
        let release = service.hold("input", 0);
        let (mut loader, _log) = loader_for(&service);
        let sink = Arc::new(RecordingSink::default());

        let session = loader.start_load("input", sink.clone());
        wait_for_requests(&service, 1).await;
        loader.cancel_active();
        release.send(()).unwrap();

        let report = session.wait().await.unwrap();
        assert_eq!(report.reason, StopReason::Cancelled);
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn test_reverse_keys_are_one_based() {
        let state = SessionState::new(4);
        let keys: Vec<usize> = (0..4).map(|i| state.reverse_key(i)).collect();
        assert_eq!(keys, vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_duplicate_reverse_key_is_rejected() {
        let mut state = SessionState::new(3);
        assert!(state.admit(3));
        assert!(!state.admit(3));
        assert_eq!(state.seen_count(), 1);
        assert_eq!(state.duplicates, 1);
    }

    #[test]
    fn test_complete_before_cursor_reaches_total() {
        let mut state = SessionState::new(2);
        state.admit(2);
        state.advance();
        state.admit(1);
        assert!(state.is_complete());
        assert!(state.has_next());
        assert_eq!(state.next_index(), 1);
    }
}
