//! Periodic background tasks.

use std::time::Duration;

use log::{info, warn};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Handle to the tasks spawned by [`Engine::start`](crate::Engine::start).
///
/// Dropping the handle leaves the tasks running until the engine shuts
/// down.
#[derive(Debug)]
pub struct BackgroundTasks {
    token: CancellationToken,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundTasks {
    pub(crate) const fn new(token: CancellationToken, handles: Vec<(&'static str, JoinHandle<()>)>) -> Self {
        Self { token, handles }
    }

    /// Names of the spawned tasks.
    pub fn names(&self) -> Vec<&'static str> {
        self.handles.iter().map(|(name, _)| *name).collect()
    }

    /// Report whether every task has exited.
    pub fn is_finished(&self) -> bool {
        self.handles.iter().all(|(_, handle)| handle.is_finished())
    }

    /// Cancel the tasks and wait for them to exit.
    pub async fn stop(self) {
        self.token.cancel();
        self.join().await;
    }

    pub(crate) async fn join(self) {
        for (name, handle) in self.handles {
            if let Err(err) = handle.await {
                warn!("background task {name} ended abnormally: {err}");
            }
        }
    }
}

/// Run `work` every `period` until `token` is cancelled.
///
/// The first run happens one period after spawning. Missed ticks are
/// delayed rather than bunched.
pub(crate) fn spawn_periodic<F>(
    name: &'static str,
    period: Duration,
    token: CancellationToken,
    mut work: F,
) -> (&'static str, JoinHandle<()>)
where
    F: FnMut() + Send + 'static,
{
    let handle = tokio::spawn(async move {
        info!("background task {name} started, every {period:?}");
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => work(),
            }
        }
        info!("background task {name} stopped");
    });
    (name, handle)
}
