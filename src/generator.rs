use futures::prelude::*;
use futures::future::{BoxFuture};
use futures::task::{Context, Poll, Waker};

use std::mem;
use std::marker::{PhantomData};
use std::pin::*;
use std::sync::*;

///
/// The hand-off point between a generator's future and the stream reading from it
///
struct EmitCore<TItem> {
    /// The ID to assign to the next emission
    next_emit_id: usize,

    /// The value waiting to be read by the stream, and the ID of the emission that sent it
    waiting: Option<(usize, TItem)>,

    /// Emissions that are waiting for the hand-off point to become free
    notify_free: Vec<Waker>,

    /// The emission that's waiting for its value to be read
    notify_taken: Option<Waker>,

    /// The stream, if it's waiting for a value to arrive
    notify_stream: Option<Waker>
}

impl<TItem> EmitCore<TItem> {
    fn new() -> EmitCore<TItem> {
        EmitCore {
            next_emit_id:   0,
            waiting:        None,
            notify_free:    vec![],
            notify_taken:   None,
            notify_stream:  None
        }
    }

    ///
    /// Takes the value that's waiting to be read, or arranges for the stream to be woken when one arrives
    ///
    fn take_waiting(arc_self: &Arc<Mutex<EmitCore<TItem>>>, context: &Context) -> Option<TItem> {
        let (value, to_notify) = {
            let mut core    = arc_self.lock().unwrap();
            let waiting     = core.waiting.take();

            match waiting {
                Some((_id, value))  => {
                    // Wake the emission that sent this value along with anything waiting to send another
                    let mut to_notify = mem::take(&mut core.notify_free);
                    to_notify.extend(core.notify_taken.take());

                    (Some(value), to_notify)
                }

                None                => {
                    // Values can be emitted from other tasks, so they need to be able to wake us up
                    core.notify_stream = Some(context.waker().clone());

                    (None, vec![])
                }
            }
        };

        to_notify.into_iter().for_each(|waker| waker.wake());
        value
    }

    ///
    /// Throws away any value that has been emitted but not read
    ///
    fn discard_waiting(arc_self: &Arc<Mutex<EmitCore<TItem>>>) {
        let mut core        = arc_self.lock().unwrap();
        core.waiting        = None;
        core.notify_taken   = None;
        core.notify_stream  = None;
    }
}

///
/// Sends values from a generator to the stream it's generating
///
/// Each emitted value is handed to the stream one at a time: the future returned by `emit` only
/// completes once whatever is reading the stream has taken the value.
///
pub struct Emitter<TItem> {
    core: Arc<Mutex<EmitCore<TItem>>>
}

///
/// Future that waits for an emitted value to be read from its stream
///
#[must_use = "emitted values are only sent when the future is awaited"]
pub struct EmitValue<TItem> {
    /// Where the value will be sent
    core: Arc<Mutex<EmitCore<TItem>>>,

    /// The value, if it has not been handed over yet
    value: Option<TItem>,

    /// Once the value has been handed over, the ID it was given
    emit_id: Option<usize>
}

impl<TItem> Clone for Emitter<TItem> {
    fn clone(&self) -> Emitter<TItem> {
        Emitter {
            core: Arc::clone(&self.core)
        }
    }
}

impl<TItem> Emitter<TItem> {
    ///
    /// Emits a value, returning a future that completes when the value has been read from the stream
    ///
    pub fn emit(&self, value: TItem) -> EmitValue<TItem> {
        EmitValue {
            core:       Arc::clone(&self.core),
            value:      Some(value),
            emit_id:    None
        }
    }
}

// The value is moved in and out of the core, never pinned
impl<TItem> Unpin for EmitValue<TItem> { }

impl<TItem> Future for EmitValue<TItem> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, context: &mut Context) -> Poll<()> {
        let emit_value  = self.get_mut();
        let emit_id     = emit_value.emit_id;

        let (result, notify_stream) = {
            let mut core = emit_value.core.lock().unwrap();

            match emit_id {
                None => {
                    if core.waiting.is_some() {
                        // Another emission is still in flight
                        core.notify_free.push(context.waker().clone());
                        (Poll::Pending, None)
                    } else if let Some(value) = emit_value.value.take() {
                        // Hand the value over and wait for the stream to read it
                        let emit_id         = core.next_emit_id;
                        core.next_emit_id   += 1;
                        core.waiting        = Some((emit_id, value));
                        core.notify_taken   = Some(context.waker().clone());
                        emit_value.emit_id  = Some(emit_id);

                        (Poll::Pending, core.notify_stream.take())
                    } else {
                        (Poll::Ready(()), None)
                    }
                }

                Some(emit_id) => {
                    let still_waiting = match &core.waiting {
                        Some((waiting_id, _))   => *waiting_id == emit_id,
                        None                    => false
                    };

                    if still_waiting {
                        core.notify_taken = Some(context.waker().clone());
                        (Poll::Pending, None)
                    } else {
                        (Poll::Ready(()), None)
                    }
                }
            }
        };

        // Wake the stream outside of the lock
        notify_stream.map(|waker| waker.wake());

        result
    }
}

impl<TItem> Drop for EmitValue<TItem> {
    fn drop(&mut self) {
        if let Some(emit_id) = self.emit_id {
            let to_notify = {
                let mut core = self.core.lock().unwrap();

                // Withdraw the value if the stream never read it
                let still_waiting = match &core.waiting {
                    Some((waiting_id, _))   => *waiting_id == emit_id,
                    None                    => false
                };

                if still_waiting {
                    core.waiting        = None;
                    core.notify_taken   = None;
                    mem::take(&mut core.notify_free)
                } else {
                    vec![]
                }
            };

            to_notify.into_iter().for_each(|waker| waker.wake());
        }
    }
}

///
/// A stream that returns the values emitted by a generator future
///
pub struct GeneratorStream<TItem, TFuture> {
    /// Where the generator sends its values
    core: Arc<Mutex<EmitCore<TItem>>>,

    /// The generator future, or None once it has finished
    generator: Option<Pin<Box<TFuture>>>
}

///
/// A stream that returns the values emitted by a generator future that can fail
///
/// If the generator returns an error, it's returned as the final item of the stream.
///
pub struct TryGeneratorStream<TItem, TError, TFuture>
where TFuture: Future<Output=Result<(), TError>> {
    /// Where the generator sends its values
    core: Arc<Mutex<EmitCore<TItem>>>,

    /// The generator future, or None once it has finished
    generator: Option<Pin<Box<TFuture>>>,

    error: PhantomData<fn() -> TError>
}

impl<TItem, TFuture> Stream for GeneratorStream<TItem, TFuture>
where TFuture: Future<Output=()> {
    type Item = TItem;

    fn poll_next(self: Pin<&mut Self>, context: &mut Context) -> Poll<Option<TItem>> {
        let stream      = self.get_mut();
        let generator   = match stream.generator.as_mut() {
            Some(generator) => generator,
            None            => return Poll::Ready(None)
        };

        match generator.as_mut().poll(context) {
            Poll::Ready(()) => {
                // Generator has finished
                stream.generator = None;
                EmitCore::discard_waiting(&stream.core);

                Poll::Ready(None)
            }

            Poll::Pending => {
                // The generator is either waiting for us to read a value or for something else
                match EmitCore::take_waiting(&stream.core, context) {
                    Some(value) => Poll::Ready(Some(value)),
                    None        => Poll::Pending
                }
            }
        }
    }
}

impl<TItem, TError, TFuture> Stream for TryGeneratorStream<TItem, TError, TFuture>
where TFuture: Future<Output=Result<(), TError>> {
    type Item = Result<TItem, TError>;

    fn poll_next(self: Pin<&mut Self>, context: &mut Context) -> Poll<Option<Result<TItem, TError>>> {
        let stream      = self.get_mut();
        let generator   = match stream.generator.as_mut() {
            Some(generator) => generator,
            None            => return Poll::Ready(None)
        };

        match generator.as_mut().poll(context) {
            Poll::Ready(result) => {
                // Generator has finished, possibly with an error that ends the stream
                stream.generator = None;
                EmitCore::discard_waiting(&stream.core);

                match result {
                    Ok(())      => Poll::Ready(None),
                    Err(error)  => Poll::Ready(Some(Err(error)))
                }
            }

            Poll::Pending => {
                match EmitCore::take_waiting(&stream.core, context) {
                    Some(value) => Poll::Ready(Some(Ok(value))),
                    None        => Poll::Pending
                }
            }
        }
    }
}

///
/// Creates a stream from a generator function
///
/// The function is passed a `yield_value` function that can be used to send values to the stream.
/// `yield_value(item).await` returns once the item has been read from the stream.
///
pub fn generator_stream<TItem, TFuture, TFn>(generator: TFn) -> GeneratorStream<TItem, TFuture>
where   TItem:      'static+Send,
        TFuture:    Future<Output=()>,
        TFn:        FnOnce(Box<dyn Fn(TItem) -> BoxFuture<'static, ()>+Send+Sync>) -> TFuture {
    let core        = Arc::new(Mutex::new(EmitCore::new()));
    let emitter     = Emitter { core: Arc::clone(&core) };
    let yield_value: Box<dyn Fn(TItem) -> BoxFuture<'static, ()>+Send+Sync> = Box::new(move |item| emitter.emit(item).boxed());

    GeneratorStream {
        core:       core,
        generator:  Some(Box::pin(generator(yield_value)))
    }
}

///
/// Creates a stream from a generator function that can fail
///
/// The function is passed an `Emitter` for sending values to the stream. Values are returned as `Ok(value)`,
/// and if the generator returns an error the stream returns `Err(error)` and then finishes.
///
pub fn try_generator_stream<TItem, TError, TFuture, TFn>(generator: TFn) -> TryGeneratorStream<TItem, TError, TFuture>
where   TFuture:    Future<Output=Result<(), TError>>,
        TFn:        FnOnce(Emitter<TItem>) -> TFuture {
    let core        = Arc::new(Mutex::new(EmitCore::new()));
    let emitter     = Emitter { core: Arc::clone(&core) };

    TryGeneratorStream {
        core:       core,
        generator:  Some(Box::pin(generator(emitter))),
        error:      PhantomData
    }
}
