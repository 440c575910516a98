//! Subschema configuration: the schema, its executor and how its types
//! participate in merging.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::executor::Executor;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::spec::Schema;
use crate::spec::Selection;

/// A bidirectional rewrite applied around every sub-request to one subschema.
///
/// Request hooks run in declared order before execution, response hooks in
/// reverse order after it. Type or field renaming between the composed schema
/// and a backend lives here. A pair that renames the root field on the way
/// out must rename the data key back on the way in: the result is extracted
/// under the field name the caller originally requested.
pub trait Transform: Send + Sync {
    fn transform_request(&self, request: Request) -> Request {
        request
    }

    fn transform_response(&self, response: Response) -> Response {
        response
    }
}

/// Batching behavior for one subschema's executor.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// How long the first enqueued sub-request waits for companions before
    /// the batch is flushed.
    pub window: Duration,

    /// Flush early once this many sub-requests have coalesced.
    pub max_size: Option<usize>,
}

impl BatchConfig {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            max_size: None,
        }
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }
}

/// Derives the root field arguments for a merge fetch from the key object
/// projected out of the accumulator.
pub type KeyArgsFn = Arc<dyn Fn(&Object) -> Object + Send + Sync>;

/// How one subschema fetches additional fields of a merged type: the root
/// field to call, the key selection to project from data already held, and
/// how that key becomes the field's arguments.
#[derive(Clone)]
pub struct MergedTypeConfig {
    pub field_name: String,
    pub selection_set: Vec<Selection>,
    pub key_args: KeyArgsFn,
}

impl MergedTypeConfig {
    pub fn new(
        field_name: impl Into<String>,
        selection_set: Vec<Selection>,
        key_args: KeyArgsFn,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            selection_set,
            key_args,
        }
    }
}

impl std::fmt::Debug for MergedTypeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergedTypeConfig")
            .field("field_name", &self.field_name)
            .field("selection_set", &self.selection_set)
            .finish()
    }
}

/// One member of the composed supergraph.
pub struct Subschema {
    name: String,
    schema: Arc<Schema>,
    executor: Arc<dyn Executor>,
    transforms: Vec<Arc<dyn Transform>>,
    batching: Option<BatchConfig>,
    merged_types: HashMap<String, MergedTypeConfig>,
}

#[buildstructor::buildstructor]
impl Subschema {
    #[builder(visibility = "pub")]
    fn new(
        name: String,
        schema: Schema,
        executor: Arc<dyn Executor>,
        transforms: Vec<Arc<dyn Transform>>,
        batching: Option<BatchConfig>,
        merged_types: HashMap<String, MergedTypeConfig>,
    ) -> Self {
        Self {
            name,
            schema: Arc::new(schema),
            executor,
            transforms,
            batching,
            merged_types,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub(crate) fn transforms(&self) -> &[Arc<dyn Transform>] {
        &self.transforms
    }

    pub fn batching(&self) -> Option<&BatchConfig> {
        self.batching.as_ref()
    }

    /// The merge configuration this subschema declares for `type_name`.
    pub fn merged_type_config(&self, type_name: &str) -> Option<&MergedTypeConfig> {
        self.merged_types.get(type_name)
    }

    /// Every type this subschema can contribute merged fields to.
    pub(crate) fn merged_type_names(&self) -> impl Iterator<Item = &str> {
        self.merged_types.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for Subschema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subschema")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("batching", &self.batching)
            .field("merged_types", &self.merged_types)
            .finish()
    }
}
