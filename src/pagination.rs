use crate::models::Page;
use std::future::Future;
use tracing::debug;

/// Drain an offset/limit paginated source.
///
/// Pages are requested one after another starting at offset 0; the offset
/// advances by `page_size` after each page and the loop ends on the first
/// page with `has_more == false`. Items keep their arrival order. The first
/// error aborts the whole fetch.
pub async fn fetch_all<T, E, F, Fut>(page_size: u32, mut fetch_page: F) -> Result<Vec<T>, E>
where
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let limit = page_size.max(1);
    let mut offset: u32 = 0;
    let mut out = Vec::new();
    loop {
        let page = fetch_page(offset, limit).await?;
        debug!(offset, count = page.items.len(), has_more = page.has_more, "page fetched");
        out.extend(page.items);
        if !page.has_more {
            return Ok(out);
        }
        offset = offset.saturating_add(limit);
    }
}
