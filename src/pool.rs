//! Bounded fan-out over a fixed set of work items.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Spawns one task per item with at most `concurrency` running at any
/// instant. All tasks are joined even when some fail; the first error in
/// spawn order is returned.
pub(crate) async fn join_bounded<T, E, F, Fut>(
    concurrency: usize,
    items: Vec<T>,
    f: F,
) -> Result<(), E>
where
    E: Send + 'static,
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut handles = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let fut = f(i, item);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("semaphore is never closed");
            fut.await
        }));
    }
    let mut first_error = None;
    for handle in handles {
        if let Err(e) = handle.await.expect("worker task panicked") {
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }
    match first_error {
        None => Ok(()),
        Some(e) => Err(e),
    }
}
