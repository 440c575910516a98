//! The boundary between the delegation engine and subschema backends.

use std::pin::Pin;

use async_trait::async_trait;
use futures::future::join_all;
use futures::Stream;

use crate::graphql::Request;
use crate::graphql::Response;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A stream of responses, as produced by a subscription root field.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Response> + Send>>;

/// What an executor produced for one sub-request.
pub enum ExecutorResult {
    /// A single response, for queries and mutations.
    Response(Response),

    /// A stream of responses, for subscriptions.
    Stream(ResponseStream),
}

impl ExecutorResult {
    /// Unwraps a single response, treating a stream as a protocol error.
    pub(crate) fn into_response(self) -> Result<Response, BoxError> {
        match self {
            ExecutorResult::Response(response) => Ok(response),
            ExecutorResult::Stream(_) => {
                Err("executor returned a stream for a non-subscription operation".into())
            }
        }
    }
}

/// Executes sub-requests against one subschema's backend.
///
/// Implementations typically serialize [`Request::to_document`] and speak
/// HTTP or a websocket; tests plug in an in-memory implementation.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Executes a single operation.
    async fn execute(&self, request: Request) -> Result<ExecutorResult, BoxError>;

    /// Executes a coalesced batch of operations, one result per request in
    /// order. Backends without a native batch endpoint inherit this
    /// concurrent fan-out.
    async fn execute_batch(&self, requests: Vec<Request>) -> Vec<Result<Response, BoxError>> {
        join_all(requests.into_iter().map(|request| async {
            self.execute(request).await?.into_response()
        }))
        .await
    }
}
