//! Delay deadline task.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use super::worker::EngineMessage;
use super::TokioClock;

/// Sleep until the armed deadline, then wake the worker.
///
/// The worker re-arms after every batch it processes. After firing, the
/// timer waits for that re-arm instead of firing again for the same
/// deadline. Dropping the deadline sender stops the task.
pub(super) fn spawn<N: Send + 'static>(
    clock: TokioClock,
    mut deadline: watch::Receiver<Option<u64>>,
    inbox: mpsc::Sender<EngineMessage<N>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let next = *deadline.borrow_and_update();
            let Some(at) = next else {
                if deadline.changed().await.is_err() {
                    break;
                }
                continue;
            };

            let fired = tokio::select! {
                _ = tokio::time::sleep_until(clock.instant_at(at)) => true,
                changed = deadline.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    false
                }
            };
            if fired {
                debug!("Timer fired for {}ms", at);
                if inbox.send(EngineMessage::Wake).await.is_err() {
                    break;
                }
                if deadline.changed().await.is_err() {
                    break;
                }
            }
        }
        debug!("Timer stopped");
    })
}
