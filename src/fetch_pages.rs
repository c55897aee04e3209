use super::generator::*;
use super::paged_stream::*;

use futures::prelude::*;

use std::sync::*;

///
/// Creates a paged stream from a function that fetches a page by its index
///
/// Each subscription fetches page 0 straight away, then fetches and emits one more page every time
/// more data is requested. The stream finishes when the fetch function returns `Ok(None)`, and fails
/// with the fetch function's error if it returns one.
///
pub fn fetch_pages<TPage, TError, TFn, TFuture>(fetch: TFn) -> PagedStream<TPage, TError>
where   TPage:      'static+Send,
        TError:     'static+Send,
        TFn:        'static+Send+Sync+Fn(usize) -> TFuture,
        TFuture:    'static+Send+Future<Output=Result<Option<TPage>, TError>> {
    let fetch = Arc::new(fetch);

    paged_stream(move |emitter: Emitter<TPage>, mut load_more: LoadMore| {
        let fetch = Arc::clone(&fetch);

        async move {
            let mut page_index = 0;

            loop {
                // Fetch and emit the next page
                match (*fetch)(page_index).await {
                    Ok(Some(page))  => emitter.emit(page).await,
                    Ok(None)        => return Ok(()),
                    Err(error)      => return Err(error)
                }

                page_index += 1;

                // Don't fetch the next page until it's asked for
                if !load_more.wait().await {
                    return Ok(());
                }
            }
        }
    })
}
