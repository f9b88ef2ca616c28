use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, task::JoinHandle};
use url::Url;

/// Shared online/offline flag with change notification.
///
/// The platform (or [`spawn_health_probe`]) calls `set_online`; listeners
/// subscribe and react to transitions.
#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Returns `true` when the value actually changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(online, "Connectivity changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Owns a background listener task; removing or dropping it stops the task.
#[derive(Debug)]
pub struct ListenerHandle {
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops the listener and waits for the task to wind down.
    pub async fn remove(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// Polls `health_url` and drives `connectivity` from the result.
///
/// Any 2xx answer counts as online; errors and timeouts count as offline.
pub fn spawn_health_probe(
    client: reqwest::Client,
    health_url: Url,
    interval: Duration,
    connectivity: Connectivity,
) -> ListenerHandle {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let online = match client.get(health_url.clone()).send().await {
                Ok(response) => response.status().is_success(),
                Err(e) => {
                    tracing::debug!("Health probe failed: {}", e);
                    false
                }
            };
            connectivity.set_online(online);
        }
    });

    ListenerHandle::new(task)
}
