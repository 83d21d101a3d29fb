//! Permission brokers for the virtual platform.
//!
//! A real platform asks the user through a UI thread and the capture open
//! blocks until the answer comes back. `DeferredPermissions` reproduces that
//! round trip; `StaticPermissions` answers immediately.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use audio_bridge_core::traits::permission::PermissionBroker;

/// Grants or denies every request.
#[derive(Debug)]
pub struct StaticPermissions {
    granted: bool,
    requests: AtomicUsize,
}

impl StaticPermissions {
    pub fn granted() -> Self {
        Self {
            granted: true,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn denied() -> Self {
        Self {
            granted: false,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl PermissionBroker for StaticPermissions {
    fn request_permission(&self, name: &str) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        log::debug!("permission {} {}", name, if self.granted { "granted" } else { "denied" });
        self.granted
    }
}

#[derive(Default)]
struct Round {
    pending: Option<String>,
    answer: Option<bool>,
}

struct Shared {
    round: Mutex<Round>,
    changed: Condvar,
}

impl Shared {
    fn respond(&self, granted: bool) -> bool {
        let mut round = self.round.lock();
        if round.pending.is_none() {
            return false;
        }
        round.answer = Some(granted);
        self.changed.notify_all();
        true
    }
}

/// Answers on another thread, the way a UI prompt would.
///
/// The requesting thread blocks until `respond` is called or the timeout
/// expires; a timeout counts as a denial. With `with_responder`, a helper
/// thread answers every request after a delay.
pub struct DeferredPermissions {
    shared: Arc<Shared>,
    timeout: Duration,
    responder: Option<(bool, Duration)>,
}

impl DeferredPermissions {
    /// Requests wait up to `timeout` for a manual `respond`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                round: Mutex::new(Round::default()),
                changed: Condvar::new(),
            }),
            timeout,
            responder: None,
        }
    }

    /// Every request is answered with `granted` after `delay`.
    pub fn with_responder(granted: bool, delay: Duration) -> Self {
        let mut broker = Self::new(delay + Duration::from_secs(5));
        broker.responder = Some((granted, delay));
        broker
    }

    /// Answer the pending request. Returns `false` if nothing was pending.
    pub fn respond(&self, granted: bool) -> bool {
        self.shared.respond(granted)
    }

    /// Name of the permission currently being asked for.
    pub fn pending(&self) -> Option<String> {
        self.shared.round.lock().pending.clone()
    }

    /// Block until a request is pending, for tests answering by hand.
    pub fn wait_for_request(&self, timeout: Duration) -> Option<String> {
        let mut round = self.shared.round.lock();
        self.shared
            .changed
            .wait_while_for(&mut round, |r| r.pending.is_none() || r.answer.is_some(), timeout);
        match round.answer {
            None => round.pending.clone(),
            Some(_) => None,
        }
    }
}

impl PermissionBroker for DeferredPermissions {
    fn request_permission(&self, name: &str) -> bool {
        let mut round = self.shared.round.lock();
        round.pending = Some(name.to_string());
        round.answer = None;
        self.shared.changed.notify_all();

        if let Some((granted, delay)) = self.responder {
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name("permission-responder".into())
                .spawn(move || {
                    thread::sleep(delay);
                    shared.respond(granted);
                });
            if let Err(e) = spawned {
                log::error!("failed to spawn permission responder: {}", e);
                round.pending = None;
                return false;
            }
        }

        let timed_out = self
            .shared
            .changed
            .wait_while_for(&mut round, |r| r.answer.is_none(), self.timeout)
            .timed_out();
        let granted = round.answer.take().unwrap_or(false);
        round.pending = None;

        if timed_out {
            log::warn!("permission {} timed out waiting for an answer", name);
        } else {
            log::debug!("permission {} {}", name, if granted { "granted" } else { "denied" });
        }
        granted
    }
}
