//!
//! `flo_paged_stream` provides streams that deliver data a page at a time, fetching the next page only when a
//! consumer asks for it.
//!
//! A `PagedStream` is built from a producer function. Every subscription runs the producer from the start: it
//! emits its first page, then waits on its `LoadMore` until someone calls `request_more()`. Requests are
//! multicast to every running subscription, and a request that arrives while a subscription still has an
//! earlier one waiting is merged into it, so a burst of requests loads a single page. Requests made while
//! nothing is subscribed are ignored.
//!
//! ## Paged streams
//!
//! ```
//! # extern crate flo_paged_stream;
//! # extern crate futures;
//! # use flo_paged_stream::*;
//! # use futures::prelude::*;
//! # use futures::executor;
//! let numbers = paged_stream(|emitter, mut load_more| async move {
//!     let mut page = vec![1];
//!     emitter.emit(page.clone()).await;
//!
//!     while load_more.wait().await {
//!         page.push(page.len() + 1);
//!         emitter.emit(page.clone()).await;
//!     }
//!
//!     Ok::<_, ()>(())
//! });
//!
//! let mut subscription = numbers.subscribe();
//!
//! executor::block_on(async {
//!     assert!(subscription.next().await == Some(Ok(vec![1])));
//!
//!     numbers.request_more();
//!     assert!(subscription.next().await == Some(Ok(vec![1, 2])));
//!
//!     numbers.request_more();
//!     assert!(subscription.next().await == Some(Ok(vec![1, 2, 3])));
//! });
//! ```
//!
//! Errors returned by the producer end the subscription: the subscriber sees `Err(error)` after the values that
//! were emitted before it, and then the end of the stream.
//!
//! ## Demand bus
//!
//! The `DemandBus` that carries the requests can also be used on its own: it's a multicast signal with a
//! single-entry buffer per subscriber, and posting to it never waits.
//!

#![warn(bare_trait_objects)]

extern crate futures;

mod demand_bus;
mod generator;
mod paged_stream;
mod cold_stream;
mod fetch_pages;

pub use self::demand_bus::*;
pub use self::generator::*;
pub use self::paged_stream::*;
pub use self::cold_stream::*;
pub use self::fetch_pages::*;
