//! In-memory executors for exercising delegation without a transport.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json_bytes::Value;

use crate::executor::BoxError;
use crate::executor::Executor;
use crate::executor::ExecutorResult;
use crate::graphql::Request;
use crate::graphql::Response;

/// An executor answering from canned JSON keyed by the printed sub-request
/// document. Every received document is recorded for assertions.
pub struct MockExecutor {
    name: String,
    responses: HashMap<String, Value>,
    streams: HashMap<String, Vec<Value>>,
    failures: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
    batch_sizes: Mutex<Vec<usize>>,
}

impl MockExecutor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: HashMap::new(),
            streams: HashMap::new(),
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    /// Answers `document` with the given raw response value.
    pub fn with_response(mut self, document: impl Into<String>, response: Value) -> Self {
        self.responses.insert(document.into(), response);
        self
    }

    /// Answers `document` with a stream of raw response values, one per item.
    pub fn with_stream(mut self, document: impl Into<String>, items: Vec<Value>) -> Self {
        self.streams.insert(document.into(), items);
        self
    }

    /// Fails `document` at the executor level.
    pub fn with_failure(mut self, document: impl Into<String>, reason: impl Into<String>) -> Self {
        self.failures.insert(document.into(), reason.into());
        self
    }

    /// Every document received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// The size of every batch received so far, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().clone()
    }

    fn response_from(&self, value: Value) -> Response {
        Response::from_value(&self.name, value).unwrap_or_else(|err| {
            Response::builder()
                .error(err.to_graphql_error(None))
                .build()
        })
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn execute(&self, request: Request) -> Result<ExecutorResult, BoxError> {
        let document = request.to_document();
        self.calls.lock().push(document.clone());

        if let Some(reason) = self.failures.get(&document) {
            return Err(reason.clone().into());
        }
        if let Some(items) = self.streams.get(&document) {
            let responses: Vec<Response> = items
                .iter()
                .map(|item| self.response_from(item.clone()))
                .collect();
            return Ok(ExecutorResult::Stream(
                futures::stream::iter(responses).boxed(),
            ));
        }
        match self.responses.get(&document) {
            Some(value) => Ok(ExecutorResult::Response(self.response_from(value.clone()))),
            None => Err(format!("no canned response for document: {document}").into()),
        }
    }

    async fn execute_batch(&self, requests: Vec<Request>) -> Vec<Result<Response, BoxError>> {
        self.batch_sizes.lock().push(requests.len());
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let result = match self.execute(request).await {
                Ok(result) => result.into_response(),
                Err(err) => Err(err),
            };
            results.push(result);
        }
        results
    }
}
