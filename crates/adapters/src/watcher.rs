//! File watcher feeding the sync engine through a deduplicated queue.

use codeatlas_ports::{BoxFuture, IgnoreMatchInput, IgnorePort};
use codeatlas_shared::{CancellationToken, ErrorCode, ErrorEnvelope, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Callback invoked with the drained set of changed relative paths.
pub type DrainHandler =
    Arc<dyn Fn(Vec<Box<str>>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherOptions {
    /// Cadence of the periodic drain.
    pub drain_interval: Duration,
    /// A file is quiesced only after this long without further events.
    pub stabilization: Duration,
    /// Ignore patterns used as an event prefilter.
    pub ignore_patterns: Vec<Box<str>>,
    /// Extension allowlist used as an event prefilter.
    pub extensions: Option<Vec<Box<str>>>,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            drain_interval: Duration::from_millis(3_000),
            stabilization: Duration::from_millis(100),
            ignore_patterns: Vec::new(),
            extensions: None,
        }
    }
}

/// Snapshot of the watcher queue for status introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherStatus {
    /// Number of paths waiting for the next drain.
    pub pending: usize,
    /// True while a drain is running.
    pub is_processing: bool,
}

struct WatcherShared {
    codebase_root: PathBuf,
    options: WatcherOptions,
    ignore: Arc<dyn IgnorePort>,
    // Path -> last event time; the map keys give at-most-once queueing.
    pending: Mutex<HashMap<Box<str>, Instant>>,
    is_processing: AtomicBool,
    stop_token: CancellationToken,
}

/// Background watcher over one codebase root.
///
/// Events for added or changed files land in a mutex-guarded set; a
/// periodic drainer snapshots and clears the set, then hands the paths to
/// the drain handler. Deletes are never enqueued; the next sync's diff
/// picks removals up, which avoids racing transient atomic-rename deletes.
pub struct FileWatcher {
    shared: Arc<WatcherShared>,
    watcher: Option<RecommendedWatcher>,
    drainer: Option<tokio::task::JoinHandle<()>>,
}

impl FileWatcher {
    /// Start watching `codebase_root` and draining into `handler`.
    pub fn start(
        codebase_root: PathBuf,
        options: WatcherOptions,
        ignore: Arc<dyn IgnorePort>,
        handler: DrainHandler,
    ) -> Result<Self> {
        let shared = Arc::new(WatcherShared {
            codebase_root: codebase_root.clone(),
            options,
            ignore,
            pending: Mutex::new(HashMap::new()),
            is_processing: AtomicBool::new(false),
            stop_token: CancellationToken::new(),
        });

        let event_shared = Arc::clone(&shared);
        let mut watcher = RecommendedWatcher::new(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) => ingest_event(&event_shared, &event),
                Err(error) => {
                    tracing::warn!(%error, "file watcher error");
                },
            },
            notify::Config::default(),
        )
        .map_err(|error| watcher_error("failed to create file watcher", &error))?;
        watcher
            .watch(&codebase_root, RecursiveMode::Recursive)
            .map_err(|error| watcher_error("failed to watch codebase root", &error))?;

        let drain_shared = Arc::clone(&shared);
        let drainer = tokio::spawn(async move {
            drain_loop(drain_shared, handler).await;
        });

        Ok(Self {
            shared,
            watcher: Some(watcher),
            drainer: Some(drainer),
        })
    }

    /// Current queue status.
    pub fn status(&self) -> WatcherStatus {
        let pending = self
            .shared
            .pending
            .lock()
            .map(|queue| queue.len())
            .unwrap_or(0);
        WatcherStatus {
            pending,
            is_processing: self.shared.is_processing.load(Ordering::SeqCst),
        }
    }

    /// Stop watching: halt the watcher, then the drainer, then empty the
    /// queue. An in-flight drain completes before the drainer exits.
    pub async fn stop(&mut self) {
        // Dropping the OS watcher stops event delivery first.
        self.watcher.take();
        self.shared.stop_token.cancel();
        if let Some(drainer) = self.drainer.take() {
            if let Err(error) = drainer.await {
                if !error.is_cancelled() {
                    tracing::warn!(%error, "watcher drainer ended abnormally");
                }
            }
        }
        if let Ok(mut queue) = self.shared.pending.lock() {
            queue.clear();
        }
    }
}

fn watcher_error(message: &str, error: &notify::Error) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::new("watch", "watcher_init_failed"),
        format!("{message}: {error}"),
        codeatlas_shared::ErrorClass::NonRetriable,
    )
}

fn ingest_event(shared: &Arc<WatcherShared>, event: &Event) {
    // Deletes are intentionally not enqueued.
    let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_));
    if !relevant {
        return;
    }

    for path in &event.paths {
        if let Some(relative) = accept_path(shared, path) {
            if let Ok(mut queue) = shared.pending.lock() {
                queue.insert(relative, Instant::now());
            }
        }
    }
}

fn accept_path(shared: &Arc<WatcherShared>, path: &Path) -> Option<Box<str>> {
    // A path that no longer exists was a transient write or a delete.
    if !path.is_file() {
        return None;
    }

    let relative = relative_path_for(&shared.codebase_root, path)?;
    if shared.ignore.is_ignored(&IgnoreMatchInput {
        ignore_patterns: shared.options.ignore_patterns.clone(),
        relative_path: relative.clone().into_boxed_str(),
    }) {
        return None;
    }

    if let Some(extensions) = shared.options.extensions.as_deref() {
        let extension = codeatlas_domain::file_extension_of(&relative);
        if extension.is_empty()
            || !extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
        {
            return None;
        }
    }

    Some(relative.into_boxed_str())
}

fn relative_path_for(root: &Path, path: &Path) -> Option<String> {
    let stripped = path.strip_prefix(root).ok()?;
    let raw = stripped.to_string_lossy();
    let normalized = raw.replace('\\', "/");
    let normalized = normalized.trim_start_matches("./").trim_start_matches('/');
    if normalized.is_empty() {
        None
    } else {
        Some(normalized.to_owned())
    }
}

async fn drain_loop(shared: Arc<WatcherShared>, handler: DrainHandler) {
    let mut interval = tokio::time::interval(shared.options.drain_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = shared.stop_token.cancelled() => return,
            _ = interval.tick() => {},
        }
        drain_once(&shared, &handler).await;
    }
}

async fn drain_once(shared: &Arc<WatcherShared>, handler: &DrainHandler) {
    // Overlapping ticks are dropped while a drain is running.
    if shared
        .is_processing
        .swap(true, Ordering::SeqCst)
    {
        return;
    }

    let drained = snapshot_quiesced(shared);
    if !drained.is_empty() {
        tracing::debug!(count = drained.len(), "draining watcher queue");
        if let Err(error) = handler(drained).await {
            tracing::warn!(%error, "watcher drain failed");
        }
    }

    shared.is_processing.store(false, Ordering::SeqCst);
}

/// Snapshot and remove every quiesced entry; still-settling files stay in
/// the queue for a later drain.
fn snapshot_quiesced(shared: &Arc<WatcherShared>) -> Vec<Box<str>> {
    let stabilization = shared.options.stabilization;
    let now = Instant::now();
    let Ok(mut queue) = shared.pending.lock() else {
        return Vec::new();
    };

    let ready: Vec<Box<str>> = queue
        .iter()
        .filter(|(_, last_event)| now.duration_since(**last_event) >= stabilization)
        .map(|(path, _)| path.clone())
        .collect();
    for path in &ready {
        queue.remove(path);
    }
    let mut ready = ready;
    ready.sort_unstable();
    ready
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ignore::GlobIgnoreMatcher;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn shared_for(root: &Path, options: WatcherOptions) -> Arc<WatcherShared> {
        Arc::new(WatcherShared {
            codebase_root: root.to_path_buf(),
            options,
            ignore: Arc::new(GlobIgnoreMatcher::new()),
            pending: Mutex::new(HashMap::new()),
            is_processing: AtomicBool::new(false),
            stop_token: CancellationToken::new(),
        })
    }

    fn modify_event(path: &Path) -> Event {
        let mut event = Event::new(EventKind::Modify(notify::event::ModifyKind::Any));
        event.paths.push(path.to_path_buf());
        event
    }

    #[tokio::test]
    async fn repeated_events_for_one_file_queue_once() {
        let dir = TempDir::new().expect("temp dir");
        let file = dir.path().join("x.py");
        std::fs::write(&file, "x = 1\n").expect("write file");

        let shared = shared_for(dir.path(), WatcherOptions::default());
        for _ in 0..1_000 {
            ingest_event(&shared, &modify_event(&file));
        }

        let queue = shared.pending.lock().expect("queue lock");
        assert_eq!(queue.len(), 1);
        assert!(queue.contains_key("x.py"));
    }

    #[tokio::test]
    async fn deletes_and_ignored_paths_are_not_enqueued() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::create_dir_all(dir.path().join("node_modules")).expect("mkdir");
        let ignored = dir.path().join("node_modules").join("pkg.js");
        std::fs::write(&ignored, "x").expect("write file");
        let missing = dir.path().join("gone.py");

        let mut options = WatcherOptions::default();
        options.ignore_patterns = vec!["node_modules/".into()];
        let shared = shared_for(dir.path(), options);

        ingest_event(&shared, &modify_event(&ignored));
        ingest_event(&shared, &modify_event(&missing));

        assert!(shared.pending.lock().expect("queue lock").is_empty());
    }

    #[tokio::test]
    async fn drain_invokes_handler_once_and_clears() {
        let dir = TempDir::new().expect("temp dir");
        let file = dir.path().join("x.py");
        std::fs::write(&file, "x = 1\n").expect("write file");

        let mut options = WatcherOptions::default();
        options.stabilization = Duration::from_millis(0);
        let shared = shared_for(dir.path(), options);
        for _ in 0..10 {
            ingest_event(&shared, &modify_event(&file));
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let drained_paths = Arc::new(Mutex::new(Vec::new()));
        let handler: DrainHandler = {
            let calls = Arc::clone(&calls);
            let drained_paths = Arc::clone(&drained_paths);
            Arc::new(move |paths| {
                calls.fetch_add(1, Ordering::SeqCst);
                drained_paths.lock().expect("paths lock").extend(paths);
                Box::pin(async { Ok(()) })
            })
        };

        drain_once(&shared, &handler).await;
        // Second drain sees an empty queue and must not call the handler.
        drain_once(&shared, &handler).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            drained_paths.lock().expect("paths lock").as_slice(),
            &[Box::from("x.py")]
        );
        assert!(shared.pending.lock().expect("queue lock").is_empty());
    }

    #[tokio::test]
    async fn unstabilized_entries_wait_for_the_next_drain() {
        let dir = TempDir::new().expect("temp dir");
        let file = dir.path().join("x.py");
        std::fs::write(&file, "x = 1\n").expect("write file");

        let mut options = WatcherOptions::default();
        options.stabilization = Duration::from_millis(250);
        let shared = shared_for(dir.path(), options);
        ingest_event(&shared, &modify_event(&file));

        let calls = Arc::new(AtomicUsize::new(0));
        let handler: DrainHandler = {
            let calls = Arc::clone(&calls);
            Arc::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(()) })
            })
        };

        drain_once(&shared, &handler).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0, "file is still settling");
        assert_eq!(shared.pending.lock().expect("queue lock").len(), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        drain_once(&shared, &handler).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_and_stop_round_trip() {
        let dir = TempDir::new().expect("temp dir");
        let handler: DrainHandler = Arc::new(|_| Box::pin(async { Ok(()) }));
        let mut watcher = FileWatcher::start(
            dir.path().to_path_buf(),
            WatcherOptions::default(),
            Arc::new(GlobIgnoreMatcher::new()),
            handler,
        )
        .expect("watcher start");

        let status = watcher.status();
        assert_eq!(status.pending, 0);
        assert!(!status.is_processing);

        watcher.stop().await;
        assert_eq!(watcher.status().pending, 0);
    }
}
