use super::generator::*;
use super::demand_bus::*;

use futures::prelude::*;
use futures::future::{BoxFuture};
use futures::task::{Context, Poll};
use tracing::{debug};

use std::pin::*;
use std::sync::*;

///
/// A producer function, boxed so that it can be shared between subscriptions
///
type BoxedProducer<TItem, TError> = Arc<dyn Fn(Emitter<TItem>, LoadMore) -> BoxFuture<'static, Result<(), TError>>+Send+Sync>;

///
/// Lets a producer wait until a subscriber asks for more data
///
/// Each subscription gets its own `LoadMore`: a request made with `request_more()` is seen once by
/// every subscription that is running. Requests that arrive while an earlier one is still waiting
/// to be picked up are merged with it.
///
pub struct LoadMore {
    requests: DemandSubscription
}

///
/// A handle that can request more data from a paged stream from anywhere (including other threads)
///
#[derive(Clone)]
pub struct LoadMoreHandle {
    bus: DemandBus
}

///
/// A paged stream is a lazily started stream that pauses between pages until more data is requested
///
/// Every subscription runs the producer again from the start. The producer emits its first page
/// and then waits on its `LoadMore` for requests: calling `request_more()` wakes every running
/// subscription, each of which loads and emits its next page.
///
pub struct PagedStream<TItem, TError> {
    /// Starts a new run of the producer
    producer: BoxedProducer<TItem, TError>,

    /// Where requests for more data are sent
    bus: DemandBus
}

///
/// The state of a running subscription
///
enum SubscriptionState<TItem, TError> {
    /// Subscribed but not polled yet
    Idle,

    /// The producer is running
    Running(usize, TryGeneratorStream<TItem, TError, BoxFuture<'static, Result<(), TError>>>),

    /// The producer has returned
    Finished
}

///
/// A single subscription to a paged stream
///
/// The producer starts when this is first polled, and is abandoned if this is dropped.
///
pub struct PageSubscription<TItem, TError> {
    /// The producer to run when this subscription starts
    producer: BoxedProducer<TItem, TError>,

    /// The bus this subscription will listen to once it starts
    bus: Arc<Mutex<DemandCore>>,

    /// What this subscription is doing
    state: SubscriptionState<TItem, TError>
}

impl LoadMore {
    ///
    /// The ID of the subscription that this is waiting on behalf of
    ///
    pub fn subscription_id(&self) -> usize {
        self.requests.id()
    }

    ///
    /// Waits for the next request for more data
    ///
    /// Returns immediately if a request has already arrived. Returns false if no more requests can
    /// ever be made (every `PagedStream` and `LoadMoreHandle` that could make one has been dropped).
    ///
    pub async fn wait(&mut self) -> bool {
        self.requests.next().await.is_some()
    }

    ///
    /// Runs a continuation every time more data is requested
    ///
    /// The continuation runs to completion before the next request is picked up. If it returns an
    /// error, this stops waiting and returns that error (which the producer will usually pass on to
    /// end the subscription).
    ///
    pub async fn on_load_more<TError, TFuture, TFn>(&mut self, mut continuation: TFn) -> Result<(), TError>
    where   TFn:        FnMut() -> TFuture,
            TFuture:    Future<Output=Result<(), TError>> {
        while self.wait().await {
            continuation().await?;
        }

        Ok(())
    }
}

impl Stream for LoadMore {
    type Item = ();

    fn poll_next(mut self: Pin<&mut Self>, context: &mut Context) -> Poll<Option<()>> {
        self.requests.poll_next_unpin(context)
    }
}

impl LoadMoreHandle {
    ///
    /// Asks every running subscription of the stream for more data
    ///
    pub fn request_more(&self) {
        self.bus.post();
    }
}

impl<TItem, TError> Clone for PagedStream<TItem, TError> {
    fn clone(&self) -> PagedStream<TItem, TError> {
        PagedStream {
            producer:   Arc::clone(&self.producer),
            bus:        self.bus.republish()
        }
    }
}

impl<TItem, TError> PagedStream<TItem, TError>
where   TItem:  'static+Send,
        TError: 'static+Send {
    ///
    /// Creates a new paged stream from a producer function
    ///
    /// The producer is called once per subscription with an `Emitter` for sending values to the
    /// subscriber and a `LoadMore` for waiting until more values are wanted.
    ///
    pub fn new<TFn, TFuture>(producer: TFn) -> PagedStream<TItem, TError>
    where   TFn:        'static+Send+Sync+Fn(Emitter<TItem>, LoadMore) -> TFuture,
            TFuture:    'static+Send+Future<Output=Result<(), TError>> {
        let producer: BoxedProducer<TItem, TError> = Arc::new(move |emitter: Emitter<TItem>, load_more: LoadMore| {
            producer(emitter, load_more).boxed()
        });

        PagedStream {
            producer:   producer,
            bus:        DemandBus::new()
        }
    }

    ///
    /// Creates a new subscription to this stream
    ///
    /// The subscription runs its own copy of the producer, starting when it's first polled. Values
    /// emitted by other subscriptions are not replayed.
    ///
    pub fn subscribe(&self) -> PageSubscription<TItem, TError> {
        PageSubscription {
            producer:   Arc::clone(&self.producer),
            bus:        Arc::clone(self.bus.core()),
            state:      SubscriptionState::Idle
        }
    }

    ///
    /// Asks every running subscription for more data
    ///
    /// This never blocks. If a subscription hasn't picked up the previous request yet, this is
    /// merged with it, and if nothing is subscribed the request is ignored.
    ///
    pub fn request_more(&self) {
        self.bus.post();
    }

    ///
    /// Returns a handle that can request more data for this stream
    ///
    pub fn load_more_handle(&self) -> LoadMoreHandle {
        LoadMoreHandle {
            bus: self.bus.republish()
        }
    }

    ///
    /// Counts the subscriptions whose producers are currently running
    ///
    pub fn count_subscribers(&self) -> usize {
        self.bus.count_subscribers()
    }
}

///
/// Creates a paged stream from a producer function
///
/// ```
/// # use flo_paged_stream::*;
/// # use futures::prelude::*;
/// # use futures::executor;
/// let pages = paged_stream(|emitter, mut load_more| async move {
///     let mut page = 0;
///     emitter.emit(page).await;
///
///     while load_more.wait().await {
///         page += 1;
///         emitter.emit(page).await;
///     }
///
///     Ok::<_, ()>(())
/// });
///
/// let mut subscription = pages.subscribe();
/// executor::block_on(async {
///     assert!(subscription.next().await == Some(Ok(0)));
///
///     pages.request_more();
///     assert!(subscription.next().await == Some(Ok(1)));
/// });
/// ```
///
pub fn paged_stream<TItem, TError, TFn, TFuture>(producer: TFn) -> PagedStream<TItem, TError>
where   TItem:      'static+Send,
        TError:     'static+Send,
        TFn:        'static+Send+Sync+Fn(Emitter<TItem>, LoadMore) -> TFuture,
        TFuture:    'static+Send+Future<Output=Result<(), TError>> {
    PagedStream::new(producer)
}

impl<TItem, TError> PageSubscription<TItem, TError>
where   TItem:  'static+Send,
        TError: 'static+Send {
    ///
    /// Starts the producer for this subscription
    ///
    fn start(&mut self) {
        // Start listening for requests before the producer runs so none are missed
        let load_more   = LoadMore { requests: DemandCore::subscribe(&self.bus) };
        let id          = load_more.subscription_id();
        let producer    = Arc::clone(&self.producer);

        debug!(subscription = id, "starting paged stream producer");

        let generator   = try_generator_stream(move |emitter| (*producer)(emitter, load_more));
        self.state      = SubscriptionState::Running(id, generator);
    }
}

impl<TItem, TError> Stream for PageSubscription<TItem, TError>
where   TItem:  'static+Send,
        TError: 'static+Send {
    type Item = Result<TItem, TError>;

    fn poll_next(self: Pin<&mut Self>, context: &mut Context) -> Poll<Option<Result<TItem, TError>>> {
        let subscription = self.get_mut();

        if let SubscriptionState::Idle = subscription.state {
            subscription.start();
        }

        let (id, generator) = match &mut subscription.state {
            SubscriptionState::Running(id, generator)   => (*id, generator),
            _                                           => return Poll::Ready(None)
        };

        match generator.poll_next_unpin(context) {
            Poll::Ready(None) => {
                debug!(subscription = id, "paged stream producer finished");
                subscription.state = SubscriptionState::Finished;

                Poll::Ready(None)
            }

            Poll::Ready(Some(Err(error))) => {
                // The generator will finish on the next poll: finish now so the bus slot is released
                debug!(subscription = id, "paged stream producer failed");
                subscription.state = SubscriptionState::Finished;

                Poll::Ready(Some(Err(error)))
            }

            other => other
        }
    }
}

impl<TItem, TError> Drop for PageSubscription<TItem, TError> {
    fn drop(&mut self) {
        if let SubscriptionState::Running(id, _) = &self.state {
            debug!(subscription = *id, "paged stream subscription cancelled");
        }
    }
}
