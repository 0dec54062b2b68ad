//! Lazy page-by-page iteration.
//!
//! [`paginate`] turns a page fetcher into a stream of parsed items. Pages are
//! requested one at a time, only once every item of the previous page has
//! been yielded; at most one page is buffered. The stream ends when a page
//! comes back without a continuation key, or right after the first error.

use std::collections::VecDeque;
use std::future::Future;

use futures::Stream;
use futures::stream;
use tracing::debug;

use dynarepo_model::Item;

/// Items of one fetched page and the key to resume after it.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Item>,
    pub last_evaluated_key: Option<Item>,
}

impl Page {
    /// Whether another page may follow. An empty key counts as none.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.last_evaluated_key
            .as_ref()
            .is_some_and(|key| !key.is_empty())
    }
}

struct Cursor<F, P> {
    fetch: F,
    parse: P,
    start_key: Option<Item>,
    buffer: VecDeque<Item>,
    exhausted: bool,
    pages: usize,
}

/// Stream every item reachable through `fetch`, passing each through `parse`.
///
/// `fetch` receives the exclusive start key (`None` for the first page).
pub fn paginate<F, Fut, P, T, E>(fetch: F, parse: P) -> impl Stream<Item = Result<T, E>>
where
    F: FnMut(Option<Item>) -> Fut,
    Fut: Future<Output = Result<Page, E>>,
    P: FnMut(Item) -> Result<T, E>,
{
    let cursor = Cursor {
        fetch,
        parse,
        start_key: None,
        buffer: VecDeque::new(),
        exhausted: false,
        pages: 0,
    };

    stream::try_unfold(cursor, |mut cursor| async move {
        loop {
            if let Some(item) = cursor.buffer.pop_front() {
                let value = (cursor.parse)(item)?;
                return Ok::<_, E>(Some((value, cursor)));
            }
            if cursor.exhausted {
                return Ok::<_, E>(None);
            }

            let page = (cursor.fetch)(cursor.start_key.take()).await?;
            cursor.pages += 1;
            cursor.exhausted = !page.has_more();
            debug!(
                page = cursor.pages,
                count = page.items.len(),
                more = !cursor.exhausted,
                "fetched page"
            );
            cursor.start_key = page.last_evaluated_key;
            cursor.buffer.extend(page.items);
        }
    })
}
