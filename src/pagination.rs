//! Lazy pagination / streaming engine.
//!
//! Converts a page-fetching closure into a lazy [`Stream`] of items, using
//! the same `async_stream::stream!` idiom as the WebSocket receive loop.

use async_stream::stream;
use futures_util::Stream;

use crate::error::Error;

/// Page-number pagination: calls `fetch_page(page_size, page_number)`
/// starting at `first_page` and stops on a short or empty page.
pub struct Paginator;

impl Paginator {
    /// Builds a lazy stream over a page-number API.
    ///
    /// `fetch_page(page_size, page_number) -> Vec<T>` is called with
    /// successive page numbers starting at `first_page`; the stream ends
    /// after yielding a page whose length is less than `page_size`
    /// (inclusive of an empty page).
    pub fn by_page_number<T, F, Fut>(
        page_size: usize,
        first_page: u64,
        fetch_page: F,
    ) -> impl Stream<Item = Result<T, Error>>
    where
        T: Send + 'static,
        F: Fn(usize, u64) -> Fut + 'static,
        Fut: std::future::Future<Output = Result<Vec<T>, Error>>,
    {
        stream! {
            let mut page_number = first_page;
            loop {
                let page = match fetch_page(page_size, page_number).await {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                let short_page = page.len() < page_size;
                for item in page {
                    yield Ok(item);
                }
                if short_page {
                    return;
                }
                page_number += 1;
            }
        }
    }

    /// Cursor pagination: the response's last item id becomes the next
    /// page's cursor, and the stream stops on a short page.
    ///
    /// `fetch_page(page_size, cursor)` is called with `cursor = None` for
    /// the first page; `extract_cursor` derives the next cursor from the
    /// last item of a full page.
    pub fn by_cursor<T, C, F, Fut, E>(
        page_size: usize,
        fetch_page: F,
        extract_cursor: E,
    ) -> impl Stream<Item = Result<T, Error>>
    where
        T: Send + 'static,
        C: Clone + 'static,
        F: Fn(usize, Option<C>) -> Fut + 'static,
        Fut: std::future::Future<Output = Result<Vec<T>, Error>>,
        E: Fn(&T) -> C + 'static,
    {
        stream! {
            let mut cursor: Option<C> = None;
            loop {
                let page = match fetch_page(page_size, cursor.clone()).await {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                let short_page = page.len() < page_size;
                let next_cursor = page.last().map(&extract_cursor);
                for item in page {
                    yield Ok(item);
                }
                if short_page || next_cursor.is_none() {
                    return;
                }
                cursor = next_cursor;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{pin_mut, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn stops_on_short_page_and_yields_all_items() {
        let fetch_calls = Arc::new(AtomicUsize::new(0));
        let pages: Arc<Vec<Vec<u32>>> = Arc::new(vec![
            (0..50).collect(),
            (50..100).collect(),
            (100..117).collect(),
        ]);

        let calls = fetch_calls.clone();
        let pages_for_fetch = pages.clone();
        let stream = Paginator::by_page_number(50, 0, move |page_size, page_number| {
            calls.fetch_add(1, Ordering::SeqCst);
            let pages = pages_for_fetch.clone();
            async move {
                assert_eq!(page_size, 50);
                Ok(pages.get(page_number as usize).cloned().unwrap_or_default())
            }
        });
        pin_mut!(stream);

        let mut items = vec![];
        while let Some(item) = stream.next().await {
            items.push(item.unwrap());
        }

        assert_eq!(items.len(), 117);
        assert_eq!(fetch_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_first_page_yields_nothing() {
        let stream = Paginator::by_page_number(50, 0, |_, _| async { Ok(Vec::<u32>::new()) });
        pin_mut!(stream);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn cursor_pagination_uses_last_item_id() {
        #[derive(Clone)]
        struct Row {
            id: u64,
        }

        let pages: Arc<Vec<Vec<u64>>> = Arc::new(vec![
            (0..10).collect(),
            (10..17).collect(),
        ]);
        let pages_for_fetch = pages.clone();
        let stream = Paginator::by_cursor(
            10,
            move |page_size, cursor: Option<u64>| {
                let pages = pages_for_fetch.clone();
                async move {
                    let page_index = cursor.map(|c| (c / 10) + 1).unwrap_or(0) as usize;
                    let ids = pages.get(page_index).cloned().unwrap_or_default();
                    assert!(ids.len() <= page_size);
                    Ok(ids.into_iter().map(|id| Row { id }).collect::<Vec<_>>())
                }
            },
            |row: &Row| row.id,
        );
        pin_mut!(stream);

        let mut items = vec![];
        while let Some(item) = stream.next().await {
            items.push(item.unwrap().id);
        }
        assert_eq!(items.len(), 17);
        assert_eq!(items.last(), Some(&16));
    }
}
