//! # Stream-to-Cache Reconciler
//!
//! Applies realtime events to the polled state, one event at a time, in
//! arrival order:
//!
//! - `system_update`: the pushed snapshot replaces the `system` cache payload
//!   (no network round-trip) and one point is appended to the chart buffer;
//! - `container_event`: the `containers` cache is refetched, the payload is
//!   not trusted to be complete;
//! - `alert`: forwarded as an operator notification;
//! - `ping` and unknown types: nothing.
//!
//! The caches' own supersession rules are the only synchronisation needed.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::notifications::{Notification, Notifier};
use crate::core::rolling_buffer::{MetricPoint, RollingPointBuffer};
use crate::ingestors::polling::PollingCache;
use crate::models::containers::ContainersReport;
use crate::models::stream::StreamEvent;
use crate::models::system::SystemSnapshot;

/// Chart buffer shared between the reconciler (writer) and renderers.
pub type SharedPoints = Arc<Mutex<RollingPointBuffer>>;

pub struct Reconciler {
    system: Arc<PollingCache<SystemSnapshot>>,
    containers: Arc<PollingCache<ContainersReport>>,
    points: SharedPoints,
    notifier: Notifier,
}

impl Reconciler {
    pub fn new(
        system: Arc<PollingCache<SystemSnapshot>>,
        containers: Arc<PollingCache<ContainersReport>>,
        points: SharedPoints,
        notifier: Notifier,
    ) -> Self {
        Self { system, containers, points, notifier }
    }

    /// Handles one event to completion.
    pub fn apply(&self, event: &StreamEvent) {
        match event {
            StreamEvent::SystemUpdate(snapshot) => {
                let point = MetricPoint::from(snapshot);
                self.system.apply_pushed(snapshot.clone());
                self.points
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(point);
            }
            StreamEvent::ContainerEvent => self.containers.refetch(),
            StreamEvent::Alert(alert) => self.notifier.notify(Notification::from(alert)),
            StreamEvent::Ping => {}
            StreamEvent::Unknown(kind) => log::trace!("Ignoring stream event '{}'", kind),
        }
    }

    /// Spawns the single dispatch loop over `events`.
    pub fn spawn(
        self,
        mut events: mpsc::UnboundedReceiver<Arc<StreamEvent>>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => self.apply(&event),
                        None => break,
                    },
                }
            }
            log::debug!("Reconciler stopped");
        })
    }
}
