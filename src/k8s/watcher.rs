/**
 * Bounded waits on Kubernetes watch streams.
 *
 * A watch is opened, events are fed to a visitor until it signals it has
 * seen enough, the stream ends, or the deadline passes. Nothing here raises:
 * a short or failed watch is written to the tracker's ledger and the caller
 * gets whatever was gathered.
 */
use super::outcome::ErrorDetail;
use super::tracker::Tracker;
use crate::metrics::ErrorArea;
use futures::{Stream, TryStreamExt, pin_mut};
use kube::api::{Api, WatchEvent, WatchParams};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info};

/// The API server rejects watch timeouts of 295s and above
const MAX_SERVER_WATCH_SECS: u32 = 290;

/// Which kind of change a watch is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Added,
    Modified,
    Deleted,
    Any,
}

impl Transition {
    /// Whether an observed transition satisfies this filter
    #[must_use]
    pub fn admits(self, observed: Self) -> bool {
        self == Self::Any || self == observed
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Added => "ADDED",
            Self::Modified => "MODIFIED",
            Self::Deleted => "DELETED",
            Self::Any => "ANY",
        };
        f.write_str(s)
    }
}

/// One watch invocation: what to look for and how long to wait.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    pub kind: String,
    pub name: String,
    pub transition: Transition,
    pub count: usize,
    pub timeout: Duration,
}

impl WatchTarget {
    #[must_use]
    pub fn new(kind: &str, name: &str, transition: Transition, timeout: Duration) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            transition,
            count: 1,
            timeout,
        }
    }

    #[must_use]
    pub fn count(mut self, count: usize) -> Self {
        self.count = count.max(1);
        self
    }
}

/// How a watch stopped.
#[derive(Debug)]
pub enum StreamEnd {
    /// The visitor had seen enough
    Satisfied,
    /// The server closed the stream
    Closed,
    /// The deadline passed
    TimedOut,
    /// Opening or reading the stream failed
    Failed(ErrorDetail),
}

/// Server-side watch parameters matching a client-side timeout.
#[must_use]
pub fn watch_params(timeout: Duration) -> WatchParams {
    let secs = u32::try_from(timeout.as_secs()).unwrap_or(u32::MAX);
    WatchParams::default().timeout(secs.clamp(1, MAX_SERVER_WATCH_SECS))
}

/// Feed events from `stream` to `visit` until it breaks, the stream ends or
/// `deadline` passes. Bookmarks are skipped; an in-band error event ends the watch.
pub async fn drive<K, S, F>(stream: S, deadline: Instant, mut visit: F) -> StreamEnd
where
    S: Stream<Item = Result<WatchEvent<K>, kube::Error>>,
    F: FnMut(Transition, K) -> ControlFlow<()>,
{
    pin_mut!(stream);

    loop {
        let event = match timeout_at(deadline, stream.try_next()).await {
            Err(_) => return StreamEnd::TimedOut,
            Ok(Err(e)) => return StreamEnd::Failed(e.into()),
            Ok(Ok(None)) => return StreamEnd::Closed,
            Ok(Ok(Some(event))) => event,
        };

        let (transition, object) = match event {
            WatchEvent::Added(o) => (Transition::Added, o),
            WatchEvent::Modified(o) => (Transition::Modified, o),
            WatchEvent::Deleted(o) => (Transition::Deleted, o),
            WatchEvent::Bookmark(_) => continue,
            WatchEvent::Error(e) => return StreamEnd::Failed(e.into()),
        };

        if visit(transition, object).is_break() {
            return StreamEnd::Satisfied;
        }
    }
}

/// Waits on watch streams and writes short or failed watches to a ledger.
pub struct EventWatcher<'a> {
    tracker: &'a mut Tracker,
}

impl<'a> EventWatcher<'a> {
    pub fn new(tracker: &'a mut Tracker) -> Self {
        Self { tracker }
    }

    /// Watch `api` until `target.count` matching transitions of `target.name` are seen.
    pub async fn wait_for<K>(&mut self, api: &Api<K>, target: &WatchTarget) -> Vec<K>
    where
        K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
    {
        let deadline = Instant::now() + target.timeout;
        match timeout_at(deadline, api.watch(&watch_params(target.timeout), "0")).await {
            Ok(Ok(stream)) => self.collect(target, stream, deadline).await,
            Ok(Err(e)) => {
                self.settle(&target.kind, &StreamEnd::Failed(e.into()), 0, target.count);
                Vec::new()
            }
            Err(_) => {
                self.settle(&target.kind, &StreamEnd::TimedOut, 0, target.count);
                Vec::new()
            }
        }
    }

    /// Same as [`EventWatcher::wait_for`] over an already open stream.
    pub async fn collect<K, S>(&mut self, target: &WatchTarget, stream: S, deadline: Instant) -> Vec<K>
    where
        K: Resource,
        S: Stream<Item = Result<WatchEvent<K>, kube::Error>>,
    {
        let mut matched = Vec::new();
        let end = drive(stream, deadline, |transition, object: K| {
            let name = object.name_any();
            debug!("Event: {} {} {}", transition, target.kind, name);
            if name == target.name && target.transition.admits(transition) {
                info!("{} {} {}", target.kind, name, transition);
                matched.push(object);
                if matched.len() >= target.count {
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        })
        .await;

        self.settle(&target.kind, &end, matched.len(), target.count);
        matched
    }

    /// Open a watch on `api` with `params` and hand every event to `visit`.
    /// The caller decides what counts; recording is left to [`EventWatcher::settle`].
    pub async fn observe<K, F>(
        &mut self,
        api: &Api<K>,
        params: &WatchParams,
        timeout: Duration,
        visit: F,
    ) -> StreamEnd
    where
        K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
        F: FnMut(Transition, K) -> ControlFlow<()>,
    {
        let deadline = Instant::now() + timeout;
        match timeout_at(deadline, api.watch(params, "0")).await {
            Ok(Ok(stream)) => drive(stream, deadline, visit).await,
            Ok(Err(e)) => StreamEnd::Failed(e.into()),
            Err(_) => StreamEnd::TimedOut,
        }
    }

    /// Record how a watch for `wanted` events of `kind` ended after `seen` matched.
    /// A failed stream is recorded even when enough events arrived before it broke.
    pub fn settle(&mut self, kind: &str, end: &StreamEnd, seen: usize, wanted: usize) {
        match end {
            StreamEnd::Satisfied => {}
            StreamEnd::Failed(detail) => {
                self.tracker.api_failure(detail, &format!("watching {kind}"));
            }
            _ if seen >= wanted => {}
            StreamEnd::Closed => self.tracker.fail(
                format!(
                    "{kind} event stream closed after {seen} of {wanted} events, could not track events"
                ),
                ErrorArea::Timeout,
                "events",
            ),
            StreamEnd::TimedOut => {
                self.tracker
                    .fail(format!("{kind} event list stream timed out"), ErrorArea::Timeout, "events");
            }
        }
    }
}
