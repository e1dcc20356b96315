//! The daemon: one project, one client session over a framed byte stream.
//!
//! Startup builds snapshot v0 with a full walk, starts the watcher and the
//! updater thread, and announces itself. After that, requests are answered in
//! order until `shutdown` or end of input. [`Daemon`] itself is `Sync`, so
//! searches can also run concurrently from other threads while the updater
//! publishes.

use crate::config::DaemonConfig;
use crate::index::{build_snapshot, IndexSnapshot, PathFilter, SnapshotManager};
use crate::patch::{ApplySummary, PatchEngine, PatchResult, PathLocks};
use crate::query::{Pattern, QueryEngine, QueryError, QueryResult, SearchOutcome};
use crate::server::protocol::{read_message, write_message, Request, Response};
use crate::server::updater::{IndexUpdater, UpdaterHandle};
use crate::server::watcher::{start_watcher, ChangeBatch, WatcherHandle};
use anyhow::{bail, Context, Result};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::sync_channel;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Watcher and updater thread, stopped together
struct LiveUpdates {
    watcher: WatcherHandle,
    updater: UpdaterHandle,
}

impl LiveUpdates {
    fn stop(&mut self) {
        // Stopping the watcher drops the sender, letting the updater drain
        self.watcher.stop();
        self.updater.stop();
    }
}

pub struct Daemon {
    root: PathBuf,
    config: DaemonConfig,
    manager: Arc<SnapshotManager>,
    engine: QueryEngine,
    patcher: PatchEngine,
    updater: IndexUpdater,
    live: Mutex<Option<LiveUpdates>>,
}

impl Daemon {
    /// Index `project` and start watching it
    pub fn start(project: &Path, config: DaemonConfig) -> Result<Self> {
        if !project.is_dir() {
            bail!("Invalid directory: {}", project.display());
        }
        let root = project
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", project.display()))?;

        let (builder, stats) = build_snapshot(&root, &config.index)?;
        debug!(files = stats.files_indexed, "initial snapshot ready");

        let manager = Arc::new(SnapshotManager::new(builder.finish(0)));
        let locks = Arc::new(PathLocks::new());
        let filter = PathFilter::new(&root, &config.index)?;
        let updater = IndexUpdater::new(
            root.clone(),
            Arc::clone(&manager),
            Arc::clone(&locks),
            filter.clone(),
            config.index.max_file_size,
        );

        let live = if config.watcher.enabled {
            let (tx, rx) = sync_channel(config.watcher.channel_capacity);
            let watcher = start_watcher(&root, filter, tx)?;
            let updater = updater
                .clone()
                .spawn(rx, config.watcher.debounce_duration())?;
            Some(LiveUpdates { watcher, updater })
        } else {
            info!("file watching disabled");
            None
        };

        Ok(Self {
            engine: QueryEngine::new(config.search.options()),
            patcher: PatchEngine::new(root.clone(), locks),
            root,
            config,
            manager,
            updater,
            live: Mutex::new(live),
        })
    }

    /// Canonical project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Current index snapshot
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.manager.current()
    }

    pub fn is_watching(&self) -> bool {
        self.live
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// Search the current snapshot. `max_results` defaults to the configured
    /// value and must be positive.
    pub fn search(&self, pattern: &str, max_results: Option<i64>) -> QueryResult<SearchOutcome> {
        let max_results = match max_results {
            None => self.config.search.default_max_results,
            Some(n) if n <= 0 => return Err(QueryError::InvalidMaxResults(n)),
            Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
        };
        let pattern = Pattern::parse(pattern)?;
        let snapshot = self.manager.current();
        self.engine.search(&snapshot, &pattern, max_results)
    }

    /// Apply a change string to the project.
    ///
    /// With the watcher running, written files reach the index through
    /// ordinary change events. Without it they are folded in directly.
    pub fn apply_changes(&self, changes: &str) -> PatchResult<ApplySummary> {
        let summary = self.patcher.apply_changes(changes)?;
        if !self.is_watching() {
            let batch = ChangeBatch {
                created: summary.created.clone(),
                modified: summary.modified.clone(),
                deleted: Vec::new(),
            };
            self.updater.apply_batch(&batch);
        }
        Ok(summary)
    }

    /// Answer one decoded request
    pub fn handle_request(&self, request: Request) -> Response {
        match request {
            Request::Search {
                pattern,
                max_results,
            } => match self.search(&pattern, max_results) {
                Ok(outcome) => {
                    debug!(
                        pattern = %pattern,
                        version = outcome.version,
                        total = outcome.total_matches,
                        cached = outcome.cached,
                        "search"
                    );
                    Response::search(&outcome)
                }
                Err(err) => {
                    warn!(pattern = %pattern, error = %err, "search failed");
                    Response::error(err)
                }
            },
            Request::ApplyChanges { changes } => match self.apply_changes(&changes) {
                Ok(_) => Response::applied(),
                Err(err) => {
                    warn!(error = %err, "apply_changes failed");
                    Response::error(err)
                }
            },
            Request::Shutdown => {
                self.shutdown();
                Response::shutdown()
            }
        }
    }

    /// Decode and answer one message body
    pub fn handle_message(&self, body: &[u8]) -> Response {
        match Request::from_slice(body) {
            Ok(request) => self.handle_request(request),
            Err(err) => {
                warn!(error = %err, "bad request");
                Response::error(err)
            }
        }
    }

    /// Stop watching; idempotent
    pub fn shutdown(&self) {
        let live = self
            .live
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(mut live) = live {
            live.stop();
            info!("watcher stopped");
        }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Serve one client until `shutdown` or end of input.
///
/// The `initialized` announcement is written first. Malformed requests get
/// an `{error}` response and the session continues.
pub fn run_session<R: BufRead, W: Write>(daemon: &Daemon, reader: &mut R, writer: &mut W) -> Result<()> {
    let initialized = Response::initialized(
        daemon.snapshot().file_count(),
        daemon.root().to_string_lossy(),
    );
    write_message(writer, &initialized).context("Failed to write initialized response")?;

    loop {
        let body = match read_message(reader) {
            Ok(Some(body)) => body,
            Ok(None) => {
                info!("input closed");
                break;
            }
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                warn!(error = %err, "bad frame");
                write_message(writer, &Response::error(err))
                    .context("Failed to write response")?;
                continue;
            }
            Err(err) => return Err(err).context("Failed to read request"),
        };
        if body.is_empty() {
            continue;
        }

        let response = daemon.handle_message(&body);
        write_message(writer, &response).context("Failed to write response")?;

        if response == Response::shutdown() {
            break;
        }
    }

    daemon.shutdown();
    Ok(())
}
