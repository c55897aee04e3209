use futures::prelude::*;
use futures::task::{Context, Poll, Waker};
use smallvec::*;
use tracing::{trace};

use std::pin::*;
use std::sync::*;
use std::collections::{HashMap};

///
/// The shared core of a demand bus
///
pub (crate) struct DemandCore {
    /// The number of DemandBus handles that can still post to this core
    poster_count: usize,

    /// The next ID to assign to a new subscriber
    next_subscriber_id: usize,

    /// The slots belonging to the active subscribers
    subscribers: HashMap<usize, Arc<Mutex<DemandSlot>>>
}

///
/// The single-entry buffer for one subscriber to the bus
///
struct DemandSlot {
    /// True if a request has been accepted for this subscriber but not yet consumed
    pending: bool,

    /// True once no further requests can be posted to this slot
    closed: bool,

    /// The task waiting for the next request, if there is one
    notify_waiting: Option<Waker>
}

///
/// A demand bus multicasts 'load more' requests to every subscriber that is currently listening
///
/// Each subscriber has a single slot: posting while a subscriber already has an unconsumed request
/// is absorbed rather than queued, so a burst of requests turns into one. Requests posted when
/// nothing is subscribed are discarded.
///
pub struct DemandBus {
    core: Arc<Mutex<DemandCore>>
}

///
/// A subscription to a demand bus
///
/// This is a stream of `()` values, one per request accepted for this subscriber. It finishes
/// once every `DemandBus` that could post to it has been dropped.
///
pub struct DemandSubscription {
    /// The ID of this subscriber in the core
    id: usize,

    /// The core this subscription belongs to (used to remove the slot when this is dropped)
    core: Weak<Mutex<DemandCore>>,

    /// The slot that the bus posts requests to
    slot: Arc<Mutex<DemandSlot>>
}

impl DemandCore {
    ///
    /// Adds a new subscriber to a demand core
    ///
    /// This doesn't count as a poster, so it can be used by things that only want to listen.
    ///
    pub (crate) fn subscribe(arc_self: &Arc<Mutex<DemandCore>>) -> DemandSubscription {
        let mut core = arc_self.lock().unwrap();

        // Assign an ID
        let id                      = core.next_subscriber_id;
        core.next_subscriber_id     += 1;

        // A subscription made after the last poster has gone can never receive anything
        let slot = DemandSlot {
            pending:        false,
            closed:         core.poster_count == 0,
            notify_waiting: None
        };
        let slot = Arc::new(Mutex::new(slot));

        core.subscribers.insert(id, Arc::clone(&slot));

        DemandSubscription {
            id:     id,
            core:   Arc::downgrade(arc_self),
            slot:   slot
        }
    }
}

impl DemandBus {
    ///
    /// Creates a new demand bus with no subscribers
    ///
    pub fn new() -> DemandBus {
        let core = DemandCore {
            poster_count:       1,
            next_subscriber_id: 0,
            subscribers:        HashMap::new()
        };

        DemandBus {
            core: Arc::new(Mutex::new(core))
        }
    }

    ///
    /// Retrieves the shared core for this bus
    ///
    pub (crate) fn core(&self) -> &Arc<Mutex<DemandCore>> {
        &self.core
    }

    ///
    /// Creates a subscription to this bus
    ///
    /// The subscription only sees requests posted after this call.
    ///
    pub fn subscribe(&self) -> DemandSubscription {
        DemandCore::subscribe(&self.core)
    }

    ///
    /// Counts the subscribers that are currently listening to this bus
    ///
    pub fn count_subscribers(&self) -> usize {
        self.core.lock().unwrap().subscribers.len()
    }

    ///
    /// Creates another handle that posts to the same subscribers as this one
    ///
    pub fn republish(&self) -> DemandBus {
        self.core.lock().unwrap().poster_count += 1;

        DemandBus {
            core: Arc::clone(&self.core)
        }
    }

    ///
    /// Posts a request to every subscriber
    ///
    /// This never waits: subscribers that already have a request waiting absorb this one, and the
    /// request is dropped entirely if there are no subscribers.
    ///
    pub fn post(&self) {
        let to_notify = {
            let core = self.core.lock().unwrap();

            if core.subscribers.len() == 0 {
                trace!("load more request dropped: no subscribers");
                return;
            }

            let mut to_notify: SmallVec<[Waker; 8]> = smallvec![];
            let mut coalesced = 0;

            for slot in core.subscribers.values() {
                let mut slot = slot.lock().unwrap();

                if slot.pending {
                    // Already has a request waiting: this one merges with it
                    coalesced += 1;
                } else {
                    slot.pending = true;
                    to_notify.extend(slot.notify_waiting.take());
                }
            }

            trace!(subscribers = core.subscribers.len(), coalesced = coalesced, "load more request posted");

            to_notify
        };

        // Wake outside of the locks
        to_notify.into_iter().for_each(|waker| waker.wake());
    }
}

impl Default for DemandBus {
    fn default() -> DemandBus {
        DemandBus::new()
    }
}

impl Clone for DemandBus {
    fn clone(&self) -> DemandBus {
        self.republish()
    }
}

impl Drop for DemandBus {
    fn drop(&mut self) {
        let to_notify = {
            let mut core = self.core.lock().unwrap();

            core.poster_count -= 1;
            if core.poster_count == 0 {
                // Nothing can post any more: close every slot so the subscribers can finish
                let mut to_notify: SmallVec<[Waker; 8]> = smallvec![];

                for slot in core.subscribers.values() {
                    let mut slot = slot.lock().unwrap();

                    slot.closed = true;
                    to_notify.extend(slot.notify_waiting.take());
                }

                to_notify
            } else {
                smallvec![]
            }
        };

        to_notify.into_iter().for_each(|waker| waker.wake());
    }
}

impl DemandSubscription {
    ///
    /// The ID of this subscriber within its bus
    ///
    pub fn id(&self) -> usize {
        self.id
    }
}

impl Stream for DemandSubscription {
    type Item = ();

    fn poll_next(self: Pin<&mut Self>, context: &mut Context) -> Poll<Option<()>> {
        let mut slot = self.slot.lock().unwrap();

        if slot.pending {
            // Consume the request
            slot.pending        = false;
            slot.notify_waiting = None;

            Poll::Ready(Some(()))
        } else if slot.closed {
            Poll::Ready(None)
        } else {
            // Wait for the bus to post to this slot
            slot.notify_waiting = Some(context.waker().clone());

            Poll::Pending
        }
    }
}

impl Drop for DemandSubscription {
    fn drop(&mut self) {
        // Release our slot so the bus stops posting to it
        if let Some(core) = self.core.upgrade() {
            core.lock().unwrap().subscribers.remove(&self.id);
        }
    }
}
