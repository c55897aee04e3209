use super::paged_stream::*;

use futures::prelude::*;

///
/// A cold stream is a description of a stream that starts again from the beginning for every subscriber
///
/// Nothing runs until a subscription is polled, and subscriptions don't share what they've seen: a
/// subscriber that arrives late gets its own run rather than a replay of anyone else's.
///
pub trait ColdStream {
    /// The items returned by each subscription
    type Item;

    /// The stream type of a single subscription
    type Subscription: Stream<Item=Self::Item>+Send;

    ///
    /// Creates a new, independent subscription to this stream
    ///
    fn subscribe(&self) -> Self::Subscription;
}

impl<TItem, TError> ColdStream for PagedStream<TItem, TError>
where   TItem:  'static+Send,
        TError: 'static+Send {
    type Item           = Result<TItem, TError>;
    type Subscription   = PageSubscription<TItem, TError>;

    fn subscribe(&self) -> PageSubscription<TItem, TError> {
        PagedStream::subscribe(self)
    }
}
