//! Filesystem watcher for the shared session slot
//!
//! Turns the state directory's native change signal into calls on the
//! [`SessionStore`]. Writes made by this instance are recognized through the
//! persisted writer id and skipped; notifications that do not change the
//! file content are dropped by hash comparison. The surviving events are
//! applied through [`SessionStore::apply_external`], and an identity
//! conflict is escalated to the caller-supplied [`ReloadHandler`] — the only
//! condition allowed to trigger a disruptive, user-visible action.

use crate::io::compute_hash;
use crate::schema::Session;
use crate::session::store::{ExternalOutcome, PersistedSession, SessionStore};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::channel;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Escalation hook for cross-instance identity conflicts.
///
/// Implementations typically tear down all derived state and restart the
/// client, equivalent to a cold start. Partial object graphs keyed to the
/// wrong principal are worse than an observable reload.
pub trait ReloadHandler: Send + Sync {
    fn on_identity_conflict(&self, previous: Session, incoming: Session);
}

/// Watch the session file for external changes until cancelled.
///
/// The parent directory of the store's path is created if missing and
/// watched non-recursively. Event handling runs on a blocking task, polling
/// the notify channel with a timeout so cancellation is observed promptly.
pub async fn watch_session(
    store: Arc<SessionStore>,
    reload: Arc<dyn ReloadHandler>,
    cancel: CancellationToken,
) -> Result<()> {
    let session_path = store.path().to_path_buf();
    let watch_dir = session_path
        .parent()
        .context("Session path has no parent directory")?
        .to_path_buf();
    std::fs::create_dir_all(&watch_dir)
        .with_context(|| format!("Failed to create state dir {}", watch_dir.display()))?;

    info!("Watching session slot at {}", session_path.display());

    let (tx, rx) = channel();
    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(e) = tx.send(event) {
                    error!("Failed to forward file system event: {}", e);
                }
            }
            Err(e) => {
                error!("File system watcher error: {}", e);
            }
        })
        .context("Failed to create file system watcher")?;

    watcher
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .context("Failed to watch state directory")?;

    let cancel_clone = cancel.clone();
    tokio::task::spawn_blocking(move || {
        // Baseline hash so a watcher started after login does not replay the
        // current content as a change.
        let mut last_hash = std::fs::read(&session_path)
            .ok()
            .map(|bytes| compute_hash(&bytes));

        loop {
            if cancel_clone.is_cancelled() {
                info!("Session watcher cancelled");
                break;
            }

            match rx.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(event) => {
                    if !touches_session_file(&session_path, &event) {
                        continue;
                    }
                    handle_change(&store, reload.as_ref(), &session_path, &mut last_hash);
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    warn!("Watcher channel disconnected");
                    break;
                }
            }
        }
        // Keep the watcher alive for the lifetime of the loop.
        drop(watcher);
    })
    .await
    .context("Session watcher task panicked")?;

    Ok(())
}

/// True when a notify event concerns the session file itself.
///
/// Atomic writes rename a temp sibling over the target, so create, modify,
/// rename, and remove kinds all count; events for other files in the state
/// directory (config, temp files) do not.
fn touches_session_file(session_path: &Path, event: &Event) -> bool {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {}
        _ => return false,
    }
    event.paths.iter().any(|p| p == session_path)
}

fn handle_change(
    store: &SessionStore,
    reload: &dyn ReloadHandler,
    session_path: &Path,
    last_hash: &mut Option<String>,
) {
    // A removed file reads as a logged-out slot with no writer attribution.
    let bytes = std::fs::read(session_path).ok();

    let incoming = match &bytes {
        Some(bytes) => {
            let hash = compute_hash(bytes);
            if last_hash.as_deref() == Some(hash.as_str()) {
                debug!("Session notification with unchanged content, skipping");
                return;
            }
            *last_hash = Some(hash);

            let persisted: PersistedSession = match serde_json::from_slice(bytes) {
                Ok(p) => p,
                Err(e) => {
                    // Mid-rename reads or foreign files: wait for the next event.
                    debug!("Unparseable session payload, skipping: {}", e);
                    return;
                }
            };
            if persisted.writer_instance == store.instance_id() {
                debug!("Ignoring self-originated session write");
                return;
            }
            persisted.session
        }
        None => {
            if last_hash.is_none() {
                return;
            }
            *last_hash = None;
            Session::empty()
        }
    };

    match store.apply_external(incoming) {
        ExternalOutcome::Updated => {
            debug!("External session update applied");
        }
        ExternalOutcome::IdentityConflict { previous, incoming } => {
            warn!(
                "Session identity conflict: {:?} -> {:?}, forcing reload",
                previous.user_id(),
                incoming.user_id()
            );
            reload.on_identity_conflict(previous, incoming);
        }
    }
}
