//! Coalescing of concurrent sub-requests to one subschema into a single
//! executor batch call.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::DelegationError;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::subschema::BatchConfig;
use crate::subschema::Subschema;

/// One enqueued sub-request waiting for its slice of a batch result.
struct Waiter {
    request: Request,
    sender: oneshot::Sender<Result<Response, DelegationError>>,
}

#[derive(Default)]
struct Queue {
    waiters: Vec<Waiter>,
    flush_scheduled: bool,

    // bumped on every early flush so the timer it raced can tell it is stale
    generation: u64,
}

/// Coalesces concurrent calls to one subschema's executor.
///
/// The first call within a window schedules a flush; calls arriving before
/// the window elapses join the same batch. Batches are keyed strictly by
/// subschema, so unrelated subschemas never coalesce together, and every
/// caller receives only its own slice of the batched result.
pub(crate) struct Batcher {
    subschema: Arc<Subschema>,
    config: BatchConfig,
    queue: Arc<Mutex<Queue>>,
}

impl Batcher {
    pub(crate) fn new(subschema: Arc<Subschema>, config: BatchConfig) -> Self {
        Self {
            subschema,
            config,
            queue: Arc::new(Mutex::new(Queue::default())),
        }
    }

    /// Enqueues one sub-request and waits for its own response.
    pub(crate) async fn call(&self, request: Request) -> Result<Response, DelegationError> {
        let (sender, receiver) = oneshot::channel();
        let batch_to_flush = {
            let mut queue = self.queue.lock();
            queue.waiters.push(Waiter { request, sender });
            let full = self
                .config
                .max_size
                .map(|max| queue.waiters.len() >= max)
                .unwrap_or(false);
            if full {
                queue.flush_scheduled = false;
                queue.generation = queue.generation.wrapping_add(1);
                Some(std::mem::take(&mut queue.waiters))
            } else {
                if !queue.flush_scheduled {
                    queue.flush_scheduled = true;
                    let generation = queue.generation;
                    let subschema = self.subschema.clone();
                    let shared = self.queue.clone();
                    let window = self.config.window;
                    tokio::spawn(async move {
                        tokio::time::sleep(window).await;
                        let waiters = {
                            let mut queue = shared.lock();
                            // an early flush already took this timer's batch;
                            // whatever is queued now belongs to a newer window
                            if queue.generation != generation {
                                return;
                            }
                            queue.flush_scheduled = false;
                            std::mem::take(&mut queue.waiters)
                        };
                        flush(subschema, waiters).await;
                    });
                }
                None
            }
        };
        if let Some(waiters) = batch_to_flush {
            let subschema = self.subschema.clone();
            tokio::spawn(async move {
                flush(subschema, waiters).await;
            });
        }

        receiver
            .await
            .unwrap_or_else(|_| {
                Err(DelegationError::SubrequestBatchingError {
                    service: self.subschema.name().to_string(),
                    reason: "batch processing task dropped the response".to_string(),
                })
            })
    }
}

/// Executes one coalesced batch and distributes each result to its caller.
/// A failed entry only fails its own caller.
async fn flush(subschema: Arc<Subschema>, waiters: Vec<Waiter>) {
    if waiters.is_empty() {
        return;
    }
    tracing::debug!(
        service = subschema.name(),
        size = waiters.len(),
        "flushing sub-request batch",
    );

    let (requests, senders): (Vec<Request>, Vec<_>) = waiters
        .into_iter()
        .map(|waiter| (waiter.request, waiter.sender))
        .unzip();
    let expected = requests.len();
    let results = subschema.executor().execute_batch(requests).await;

    if results.len() != expected {
        let error = DelegationError::SubrequestBatchingError {
            service: subschema.name().to_string(),
            reason: format!(
                "batch executor returned {} results for {} requests",
                results.len(),
                expected,
            ),
        };
        for sender in senders {
            let _ = sender.send(Err(error.clone()));
        }
        return;
    }

    for (result, sender) in results.into_iter().zip(senders) {
        let response = result.map_err(|err| DelegationError::SubrequestError {
            service: subschema.name().to_string(),
            reason: err.to_string(),
        });
        let _ = sender.send(response);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json_bytes::json;

    use super::*;
    use crate::executor::Executor;
    use crate::spec::Field;
    use crate::spec::FieldType;
    use crate::spec::Schema;
    use crate::spec::Selection;
    use crate::test_harness::MockExecutor;

    fn request(id: &str) -> Request {
        Request::builder()
            .field_name("userById")
            .argument("id", json!(id))
            .selections(vec![Selection::field(Field::leaf("id"))])
            .build()
    }

    fn batcher(executor: Arc<MockExecutor>, config: BatchConfig) -> Arc<Batcher> {
        let subschema = Arc::new(
            Subschema::builder()
                .name("accounts")
                .schema(
                    Schema::new()
                        .with_query_type("Query")
                        .with_object("Query", [("userById", FieldType::named("User"))])
                        .with_object("User", [("id", FieldType::Id)]),
                )
                .executor(executor as Arc<dyn Executor>)
                .build(),
        );
        Arc::new(Batcher::new(subschema, config))
    }

    #[tokio::test(start_paused = true)]
    async fn an_early_flush_does_not_shorten_the_next_window() {
        let executor = Arc::new(
            MockExecutor::new("accounts")
                .with_response(
                    r#"query { userById(id: "1") { id } }"#,
                    json!({ "data": { "userById": { "id": "1" } } }),
                )
                .with_response(
                    r#"query { userById(id: "2") { id } }"#,
                    json!({ "data": { "userById": { "id": "2" } } }),
                )
                .with_response(
                    r#"query { userById(id: "3") { id } }"#,
                    json!({ "data": { "userById": { "id": "3" } } }),
                ),
        );
        let batcher = batcher(
            executor.clone(),
            BatchConfig::new(Duration::from_millis(100)).with_max_size(2),
        );

        // the first call arms a window timer; the second fills the batch and
        // flushes early, 50ms before that timer's deadline
        let first = tokio::spawn({
            let batcher = batcher.clone();
            async move { batcher.call(request("1")).await }
        });
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(50)).await;
        let second = tokio::spawn({
            let batcher = batcher.clone();
            async move { batcher.call(request("2")).await }
        });
        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());
        assert_eq!(executor.batch_sizes(), vec![2]);

        // the stale timer fires 50ms into the third call's window and must
        // not take its batch with it
        let started = tokio::time::Instant::now();
        assert!(batcher.call(request("3")).await.is_ok());
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(executor.batch_sizes(), vec![2, 1]);
    }
}
