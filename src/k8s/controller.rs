/**
 * Lifecycle driver shared by every resource kind the runner manages.
 *
 * A `Controller` owns the desired body of one named object plus the ledger
 * its checks write into. Mutating calls are confirmed through the event
 * watcher, steady state through the condition poller.
 */
use super::outcome::{ErrorDetail, Outcome};
use super::poller::ConditionPoller;
use super::tracker::Tracker;
use super::watcher::{EventWatcher, Transition, WatchTarget};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::ledger::ErrorEntry;
use crate::metrics::ErrorArea;
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

/// Bounds shared by every kind a controller can drive.
pub trait Managed:
    Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static
{
}

impl<K> Managed for K where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static
{
}

/// Presence checks every managed resource answers.
#[async_trait]
pub trait Readable {
    /// True when the object is on the API; a missing object is recorded.
    async fn exists(&mut self, report: bool) -> bool;

    /// True when the object is gone; a lingering object is recorded.
    async fn deleted(&mut self, report: bool) -> bool;
}

/// How a deletion is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirm {
    /// Wait for a `DELETED` event
    Watch,
    /// Re-read at a fixed interval until the object is gone
    Poll,
}

pub struct Controller<K> {
    api: Api<K>,
    manifest: K,
    name: String,
    kind: String,
    tracker: Tracker,
    timeout: Duration,
    poll_interval: Duration,
    confirm: Confirm,
}

impl<K: Managed> Controller<K> {
    pub fn new(api: Api<K>, manifest: K, tracker: Tracker, settings: &Settings) -> Self {
        Self {
            api,
            name: manifest.name_any(),
            kind: K::kind(&()).to_string(),
            manifest,
            tracker,
            timeout: settings.event_timeout,
            poll_interval: settings.delete_poll_interval,
            confirm: Confirm::Poll,
        }
    }

    #[must_use]
    pub fn confirm_by(mut self, confirm: Confirm) -> Self {
        self.confirm = confirm;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub const fn api(&self) -> &Api<K> {
        &self.api
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn tracker(&mut self) -> &mut Tracker {
        &mut self.tracker
    }

    #[must_use]
    pub const fn tracker_ref(&self) -> &Tracker {
        &self.tracker
    }

    /// Swap the desired body; the next `create` or `replace` sends it.
    pub fn set_manifest(&mut self, manifest: K) {
        self.manifest = manifest;
    }

    /// Create the object and wait for its `ADDED` event.
    ///
    /// A conflict is recorded and tolerated.
    ///
    /// # Errors
    ///
    /// Returns `Error::NamespaceGone` when the server says the namespace no longer exists
    pub async fn create(&mut self, report: bool) -> Result<()> {
        let timer = self.tracker.timer("create");
        match self.api.create(&PostParams::default(), &self.manifest).await {
            Ok(_) => {
                info!("{} {} being created", self.kind, self.name);
                let target = WatchTarget::new(&self.kind, &self.name, Transition::Added, self.timeout);
                EventWatcher::new(&mut self.tracker).wait_for(&self.api, &target).await;
            }
            Err(e) => {
                let detail = ErrorDetail::from(e);
                if detail.code() == Some(409) {
                    warn!("{} {} already exists, continuing", self.kind, self.name);
                }
                self.tracker
                    .api_failure(&detail, &format!("creating {} {}", self.kind, self.name));

                let namespace = self.tracker.namespace().to_string();
                if detail.is_namespace_gone(&namespace) {
                    drop(timer);
                    self.report(&format!("Create {}", self.kind)).await;
                    return Err(Error::NamespaceGone(detail.message().to_string()));
                }
            }
        }
        drop(timer);

        if report {
            self.report(&format!("Create {}", self.kind)).await;
        }
        Ok(())
    }

    /// Create only when a silent read says the object is absent.
    ///
    /// # Errors
    ///
    /// Returns `Error::NamespaceGone` when creation finds the namespace gone
    pub async fn create_if_not_exists(&mut self, report: bool) -> Result<()> {
        match Outcome::from(self.api.get(&self.name).await) {
            Outcome::Found(_) => {
                debug!("{} {} already present", self.kind, self.name);
                Ok(())
            }
            Outcome::NotFound => self.create(report).await,
            Outcome::Failed(detail) => {
                self.tracker
                    .api_failure(&detail, &format!("reading {} {}", self.kind, self.name));
                Ok(())
            }
        }
    }

    /// Read the current object without recording anything.
    pub async fn read(&self) -> Outcome<K> {
        Outcome::from(self.api.get(&self.name).await)
    }

    /// Replace the live object with the current manifest.
    pub async fn replace(&mut self) -> bool {
        match self
            .api
            .replace(&self.name, &PostParams::default(), &self.manifest)
            .await
        {
            Ok(_) => {
                info!("Updated {} {}", self.kind, self.name);
                true
            }
            Err(e) => {
                self.tracker
                    .api_failure(&e.into(), &format!("updating {} {}", self.kind, self.name));
                false
            }
        }
    }

    /// Delete the object and confirm it is gone.
    pub async fn delete(&mut self, report: bool) {
        let timer = self.tracker.timer("delete");
        match self.api.delete(&self.name, &DeleteParams::background()).await {
            Ok(_) => {
                info!("Deleting {} {}", self.kind, self.name);
                match self.confirm {
                    Confirm::Watch => {
                        let target =
                            WatchTarget::new(&self.kind, &self.name, Transition::Deleted, self.timeout);
                        EventWatcher::new(&mut self.tracker).wait_for(&self.api, &target).await;
                    }
                    Confirm::Poll => {
                        self.wait_on_deleted().await;
                    }
                }
            }
            Err(e) => {
                self.tracker
                    .api_failure(&e.into(), &format!("deleting {} {}", self.kind, self.name));
            }
        }
        drop(timer);

        if report {
            self.report(&format!("Delete {}", self.kind)).await;
        }
    }

    /// Poll until the object is gone or the event timeout passes.
    pub async fn wait_on_deleted(&mut self) -> bool {
        let deadline = Instant::now() + self.timeout;
        loop {
            match self.read().await {
                Outcome::NotFound => return true,
                Outcome::Found(_) if Instant::now() + self.poll_interval > deadline => {
                    self.tracker.fail(
                        format!("{} {} still exists", self.kind, self.name),
                        ErrorArea::Timeout,
                        "not_deleted",
                    );
                    return false;
                }
                Outcome::Found(_) => sleep(self.poll_interval).await,
                Outcome::Failed(detail) => {
                    self.tracker
                        .api_failure(&detail, &format!("reading {} {}", self.kind, self.name));
                    return false;
                }
            }
        }
    }

    pub async fn report(&mut self, operation: &str) {
        self.tracker.report(operation).await;
    }

    pub fn flush_errors(&mut self) {
        self.tracker.flush();
    }

    pub fn take_errors(&mut self) -> Vec<ErrorEntry> {
        self.tracker.take()
    }
}

#[async_trait]
impl<K: Managed> Readable for Controller<K> {
    async fn exists(&mut self, report: bool) -> bool {
        let found = ConditionPoller::new(&mut self.tracker)
            .check_exists(&self.api, &self.kind, &self.name, true)
            .await
            .is_found();
        if report {
            self.report(&format!("Check {} exists", self.kind)).await;
        }
        found
    }

    async fn deleted(&mut self, report: bool) -> bool {
        let outcome = ConditionPoller::new(&mut self.tracker)
            .check_exists(&self.api, &self.kind, &self.name, false)
            .await;
        if report {
            self.report(&format!("Check {} deleted", self.kind)).await;
        }
        matches!(outcome, Outcome::NotFound)
    }
}
