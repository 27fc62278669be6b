//! Bridges watcher events to the broadcaster.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::changes::broadcaster::ChangeBroadcaster;
use crate::watch::ChangeEvent;

/// Spawn the single consumer of the watcher's event stream.
///
/// Each coalesced event becomes exactly one `notify()`. The task ends when
/// the stream closes or shutdown is signalled.
pub fn spawn_dispatcher(
    mut events: mpsc::UnboundedReceiver<ChangeEvent>,
    broadcaster: Arc<ChangeBroadcaster>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::debug!("Change stream closed");
                        break;
                    };
                    let woken = broadcaster.notify();
                    tracing::info!(
                        root = %event.root.display(),
                        path = %event.path.display(),
                        coalesced = event.coalesced,
                        woken,
                        "Files changed"
                    );
                }
                _ = shutdown.recv() => {
                    tracing::info!("Change dispatcher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    })
}
