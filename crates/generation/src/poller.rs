/// Status poller
///
/// Reconciles the history store against the providers: every tick it
/// reloads the `Processing` items, fails the ones past their
/// wall-clock deadline, fires one status request per remaining item
/// (concurrently, no cap), and applies terminal reports to the store.
/// Exits on its own when nothing is left to track, or after too many
/// consecutive whole-batch failures.
///
/// `Poller::start` hands back a `PollerHandle` that owns the task:
/// dropping the handle aborts the loop, `shutdown()` stops it
/// cooperatively.
use crate::config::PollerConfig;
use crate::GenerationError;
use futures::future::join_all;
use history::{HistoryItem, HistoryStore, HistoryUpdate};
use providers::{ProviderRegistry, StatusReport, TaskStatus};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Terminal transitions observed by the poller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollerEvent {
    /// A job finished with media
    Completed { id: String, media_uri: String },
    /// A job failed, timed out or finished without media
    Failed { id: String, error: String },
    /// The poller stopped after repeated whole-batch failures
    GaveUp { consecutive_failures: u32 },
}

/// Owned handle to a running poller task
pub struct PollerHandle {
    events: mpsc::UnboundedReceiver<PollerEvent>,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Next event; `None` once the poller has exited and the channel
    /// is drained.
    pub async fn recv(&mut self) -> Option<PollerEvent> {
        self.events.recv().await
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }

    /// Stop the loop cooperatively and wait for it to finish.
    pub async fn shutdown(mut self) {
        let _ = self.stop.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub struct Poller;

impl Poller {
    /// Spawn the polling loop over a store and registry.
    pub fn start(
        registry: Arc<ProviderRegistry>,
        store: HistoryStore,
        config: PollerConfig,
    ) -> PollerHandle {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(registry, store, config, event_tx, stop_rx));

        PollerHandle {
            events,
            stop,
            task: Some(task),
        }
    }
}

enum Tick {
    /// Nothing left to track
    NoJobs,
    /// At least one status request answered (or only local work ran)
    SomeOk,
    /// Every status request in the batch failed
    AllFailed,
}

async fn run_loop(
    registry: Arc<ProviderRegistry>,
    store: HistoryStore,
    config: PollerConfig,
    event_tx: mpsc::UnboundedSender<PollerEvent>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut consecutive_failures = 0u32;
    let mut ticker = tokio::time::interval(config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop_rx.changed() => {
                log::debug!("poller stop requested");
                break;
            }
            _ = ticker.tick() => {}
        }

        match tick(&registry, &store, &config, &event_tx).await {
            Tick::NoJobs => {
                log::debug!("no processing jobs left, poller exiting");
                break;
            }
            Tick::SomeOk => consecutive_failures = 0,
            Tick::AllFailed => {
                consecutive_failures += 1;
                log::warn!(
                    "poll tick failed entirely ({}/{})",
                    consecutive_failures,
                    config.max_consecutive_failures
                );
                if consecutive_failures >= config.max_consecutive_failures {
                    let _ = event_tx.send(PollerEvent::GaveUp {
                        consecutive_failures,
                    });
                    break;
                }
            }
        }
    }
}

async fn tick(
    registry: &Arc<ProviderRegistry>,
    store: &HistoryStore,
    config: &PollerConfig,
    event_tx: &mpsc::UnboundedSender<PollerEvent>,
) -> Tick {
    let active = match store.processing() {
        Ok(items) => items,
        Err(e) => {
            log::warn!("could not read history: {e}");
            return Tick::AllFailed;
        }
    };
    if active.is_empty() {
        return Tick::NoJobs;
    }

    // Deadline pass first: expired jobs are failed locally and never
    // get another status request.
    let mut checks = Vec::new();
    for item in active {
        if item.age_secs() >= config.job_timeout_secs as i64 {
            fail_item(
                store,
                event_tx,
                &item,
                GenerationError::Timeout(config.job_timeout_secs).to_string(),
            );
            continue;
        }
        match item.task_id.clone() {
            Some(task_id) => checks.push((item, task_id)),
            // No task id yet: nothing to poll, the deadline will
            // eventually collect it.
            None => {}
        }
    }
    if checks.is_empty() {
        return Tick::SomeOk;
    }

    let results = join_all(checks.into_iter().map(|(item, task_id)| {
        let registry = registry.clone();
        async move {
            let result = match registry.get(item.provider) {
                Ok(provider) => provider.check_status(&task_id).await,
                Err(e) => Err(e),
            };
            (item, result)
        }
    }))
    .await;

    let mut any_ok = false;
    for (item, result) in results {
        match result {
            Ok(report) => {
                any_ok = true;
                apply_report(store, event_tx, &item, report);
            }
            Err(e) => log::warn!("status check failed for {}: {e}", item.id),
        }
    }

    if any_ok {
        Tick::SomeOk
    } else {
        Tick::AllFailed
    }
}

fn apply_report(
    store: &HistoryStore,
    event_tx: &mpsc::UnboundedSender<PollerEvent>,
    item: &HistoryItem,
    report: StatusReport,
) {
    match report.status {
        TaskStatus::Completed => match report.video_url {
            Some(url) => {
                match store.update_by_id(&item.id, HistoryUpdate::completed(url.clone())) {
                    Ok(_) => {
                        log::info!("job {} completed: {url}", item.id);
                        let _ = event_tx.send(PollerEvent::Completed {
                            id: item.id.clone(),
                            media_uri: url,
                        });
                    }
                    Err(e) => log::warn!("could not persist completion for {}: {e}", item.id),
                }
            }
            None => fail_item(
                store,
                event_tx,
                item,
                "provider reported completion without a media url".to_string(),
            ),
        },
        TaskStatus::Failed => {
            let error = report
                .message
                .unwrap_or_else(|| "provider reported failure".to_string());
            fail_item(store, event_tx, item, error);
        }
        // Still in flight, no store mutation.
        TaskStatus::Pending | TaskStatus::Processing => {}
    }
}

fn fail_item(
    store: &HistoryStore,
    event_tx: &mpsc::UnboundedSender<PollerEvent>,
    item: &HistoryItem,
    error: String,
) {
    match store.update_by_id(&item.id, HistoryUpdate::failed(error.clone())) {
        Ok(_) => {
            log::info!("job {} failed: {error}", item.id);
            let _ = event_tx.send(PollerEvent::Failed {
                id: item.id.clone(),
                error,
            });
        }
        Err(e) => log::warn!("could not persist failure for {}: {e}", item.id),
    }
}
