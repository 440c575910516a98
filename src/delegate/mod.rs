//! Delegation of sub-requests to subschema executors and reconciliation of
//! their results.

pub(crate) mod external;
pub(crate) mod merge;
pub(crate) mod plan;
pub(crate) mod resolve;
pub(crate) mod resolver;

use std::pin::Pin;
use std::sync::Arc;

pub use external::ExternalObject;
pub use external::ResolvedValue;
use futures::Stream;
use futures::StreamExt;
pub use plan::plan_delegation;
pub use plan::DelegationPlan;
pub use plan::MergedTypeInfo;
pub use resolve::resolve_external_value;
pub use resolver::assemble;
pub use resolver::complete_value;
pub use resolver::resolve_merged_field;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use serde_json_bytes::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ConfigurationError;
use crate::error::DelegationError;
use crate::error::ValidationErrors;
use crate::executor::ExecutorResult;
use crate::graphql::OperationKind;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::PathElement;
use crate::spec::FieldType;
use crate::spec::Schema;
use crate::spec::Selection;
use crate::subschema::Subschema;
use crate::supergraph::Supergraph;

/// Per-request delegation state. Cheap to clone; everything shared across
/// requests lives in the supergraph.
#[derive(Clone)]
pub struct DelegationContext {
    pub supergraph: Arc<Supergraph>,

    /// Variables of the ambient operation, forwarded to every sub-request.
    pub variables: Object,

    /// Cancelling this token aborts every in-flight sub-request and closes
    /// every open subscription stream derived from this context.
    pub cancellation: CancellationToken,

    /// Skip merge delegation and return annotated objects as fetched.
    pub skip_merge: bool,
}

#[buildstructor::buildstructor]
impl DelegationContext {
    #[builder(visibility = "pub")]
    fn new(
        supergraph: Arc<Supergraph>,
        variables: JsonMap<ByteString, Value>,
        cancellation: Option<CancellationToken>,
        skip_merge: Option<bool>,
    ) -> Self {
        Self {
            supergraph,
            variables,
            cancellation: cancellation.unwrap_or_default(),
            skip_merge: skip_merge.unwrap_or_default(),
        }
    }

    /// A child context for merge fetches, which must not start their own
    /// merge fixed-point.
    pub(crate) fn for_merge(&self) -> Self {
        Self {
            skip_merge: true,
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for DelegationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegationContext")
            .field("supergraph", &self.supergraph)
            .field("skip_merge", &self.skip_merge)
            .finish()
    }
}

/// A stream of reconciled values, as produced by a delegated subscription.
pub type ResolvedStream =
    Pin<Box<dyn Stream<Item = Result<ResolvedValue, DelegationError>> + Send>>;

/// The outcome of one delegation: a single reconciled value for queries and
/// mutations, a stream of them for subscriptions.
pub enum Delegated {
    Value(ResolvedValue),
    Stream(ResolvedStream),
}

impl Delegated {
    pub fn into_value(self) -> Option<ResolvedValue> {
        match self {
            Delegated::Value(value) => Some(value),
            Delegated::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<ResolvedStream> {
        match self {
            Delegated::Value(_) => None,
            Delegated::Stream(stream) => Some(stream),
        }
    }
}

/// What to delegate and where, for callers that have not built a request
/// themselves.
#[derive(Clone)]
pub struct DelegateOptions {
    pub subschema: Arc<Subschema>,
    pub operation_kind: OperationKind,
    pub operation_name: Option<String>,
    pub field_name: String,
    pub arguments: Object,
    pub selection_set: Vec<Selection>,
    pub return_type: FieldType,
}

#[buildstructor::buildstructor]
impl DelegateOptions {
    #[builder(visibility = "pub")]
    fn new(
        subschema: Arc<Subschema>,
        operation_kind: Option<OperationKind>,
        operation_name: Option<String>,
        field_name: String,
        arguments: JsonMap<ByteString, Value>,
        selections: Vec<Selection>,
        return_type: FieldType,
    ) -> Self {
        Self {
            subschema,
            operation_kind: operation_kind.unwrap_or_default(),
            operation_name,
            field_name,
            arguments,
            selection_set: selections,
            return_type,
        }
    }
}

/// The primary delegation entry point: builds a sub-request from the given
/// options and runs it through [`delegate_request`].
pub async fn delegate_to_schema(
    ctx: &DelegationContext,
    options: DelegateOptions,
) -> Result<Delegated, DelegationError> {
    let request = Request::builder()
        .operation_kind(options.operation_kind)
        .and_operation_name(options.operation_name)
        .field_name(options.field_name)
        .arguments(options.arguments)
        .selections(options.selection_set)
        .variables(ctx.variables.clone())
        .build();
    delegate_request(ctx, &options.subschema, request, &options.return_type).await
}

/// Delegates an already-built sub-request to one subschema.
///
/// Request transforms run in declared order before validation and execution,
/// response transforms in reverse order after it. Queries go through the
/// subschema's batcher when one is configured. A subscription executor result
/// is mapped lazily, item by item, and closes when the context is cancelled.
pub async fn delegate_request(
    ctx: &DelegationContext,
    subschema: &Arc<Subschema>,
    mut request: Request,
    return_type: &FieldType,
) -> Result<Delegated, DelegationError> {
    if ctx.cancellation.is_cancelled() {
        return Err(DelegationError::Cancelled);
    }

    // the caller's expected result shape, before transforms rewrite the
    // request; response transforms restore data under this key
    let selections = request.selection_set.clone();
    let response_key = request.field_name.clone();
    for transform in subschema.transforms() {
        request = transform.transform_request(request);
    }
    prune_to_schema(subschema.schema(), &mut request);
    validate_request(subschema, &request)?;
    tracing::debug!(
        service = subschema.name(),
        field = %request.field_name,
        kind = request.operation_kind.keyword(),
        "delegating sub-request",
    );

    let batcher = matches!(request.operation_kind, OperationKind::Query)
        .then(|| ctx.supergraph.batcher(subschema.name()))
        .flatten();
    let result = match batcher {
        Some(batcher) => {
            let response = tokio::select! {
                _ = ctx.cancellation.cancelled() => return Err(DelegationError::Cancelled),
                response = batcher.call(request) => response?,
            };
            ExecutorResult::Response(response)
        }
        None => {
            tokio::select! {
                _ = ctx.cancellation.cancelled() => return Err(DelegationError::Cancelled),
                result = subschema.executor().execute(request) => {
                    result.map_err(|err| DelegationError::SubrequestError {
                        service: subschema.name().to_string(),
                        reason: err.to_string(),
                    })?
                }
            }
        }
    };

    match result {
        ExecutorResult::Response(response) => {
            let response = apply_response_transforms(subschema, response);
            let value = reconcile_response(
                ctx.clone(),
                subschema.clone(),
                response,
                response_key,
                return_type.clone(),
                selections,
            )
            .await?;
            Ok(Delegated::Value(value))
        }
        ExecutorResult::Stream(stream) => {
            let subschema = subschema.clone();
            let stream_ctx = ctx.clone();
            let return_type = return_type.clone();
            let stream = stream
                .then(move |response| {
                    let response = apply_response_transforms(&subschema, response);
                    reconcile_response(
                        stream_ctx.clone(),
                        subschema.clone(),
                        response,
                        response_key.clone(),
                        return_type.clone(),
                        selections.clone(),
                    )
                })
                .take_until(ctx.cancellation.clone().cancelled_owned())
                .boxed();
            Ok(Delegated::Stream(stream))
        }
    }
}

fn apply_response_transforms(subschema: &Subschema, mut response: Response) -> Response {
    for transform in subschema.transforms().iter().rev() {
        response = transform.transform_response(response);
    }
    response
}

/// Extracts the delegated root field's value and associated errors from a
/// response and reconciles them against the declared return type.
async fn reconcile_response(
    ctx: DelegationContext,
    subschema: Arc<Subschema>,
    response: Response,
    response_key: String,
    return_type: FieldType,
    selections: Vec<Selection>,
) -> Result<ResolvedValue, DelegationError> {
    let root = match response.data {
        Some(Value::Object(mut data)) => data.remove(response_key.as_str()).unwrap_or(Value::Null),
        _ => Value::Null,
    };
    // errors under the root field are rebased to be relative to its value;
    // anything else stays attached unchanged
    let errors = response
        .errors
        .into_iter()
        .map(|error| match error.path.as_ref().and_then(|path| path.first()) {
            Some(PathElement::Key(first)) if *first == response_key => error.sliced(),
            _ => error,
        })
        .collect();
    resolve_external_value(root, errors, subschema, return_type, selections, ctx).await
}

/// Drops from the outgoing selection set every field the target schema does
/// not declare. The caller's full selection keeps driving reconciliation, so
/// fields removed here are exactly the ones a later merge round fetches from
/// another subschema.
fn prune_to_schema(schema: &Schema, request: &mut Request) {
    let inner = schema
        .root_type(request.operation_kind)
        .and_then(|root| schema.field_type(root, &request.field_name))
        .filter(|field_type| !schema.is_leaf(field_type))
        .and_then(|field_type| field_type.inner_type_name());
    if let Some(type_name) = inner {
        request.selection_set = prune_selections(schema, type_name, &request.selection_set);
    }
}

fn prune_selections(
    schema: &Schema,
    type_name: &str,
    selections: &[Selection],
) -> Vec<Selection> {
    let mut kept = Vec::with_capacity(selections.len());
    for selection in selections {
        match selection {
            Selection::Field(field) => {
                if field.is_typename() {
                    kept.push(Selection::Field(field.clone()));
                    continue;
                }
                let field_type = match schema.field_type(type_name, &field.name) {
                    Some(field_type) => field_type,
                    None => continue,
                };
                if schema.is_leaf(field_type) {
                    let mut leaf = field.clone();
                    leaf.selections = None;
                    kept.push(Selection::Field(leaf));
                } else if let Some(inner) = field_type.inner_type_name() {
                    let pruned = prune_selections(schema, inner, field.selection_set());
                    if !pruned.is_empty() {
                        let mut composite = field.clone();
                        composite.selections = Some(pruned);
                        kept.push(Selection::Field(composite));
                    }
                }
            }
            Selection::InlineFragment(fragment) => {
                let on = fragment.type_condition.as_deref().unwrap_or(type_name);
                if !schema.has_type(on) {
                    continue;
                }
                let pruned = prune_selections(schema, on, &fragment.selections);
                if !pruned.is_empty() {
                    kept.push(Selection::InlineFragment(crate::spec::InlineFragment {
                        type_condition: fragment.type_condition.clone(),
                        selections: pruned,
                    }));
                }
            }
        }
    }
    kept
}

/// Validates an outgoing sub-request against the target schema. An invalid
/// operation is never sent.
fn validate_request(subschema: &Subschema, request: &Request) -> Result<(), DelegationError> {
    let schema = subschema.schema();
    let root = schema.root_type(request.operation_kind).ok_or_else(|| {
        ConfigurationError::MissingRootType {
            service: subschema.name().to_string(),
            kind: request.operation_kind,
        }
    })?;

    let mut failures = Vec::new();
    match schema.field_type(root, &request.field_name) {
        None => failures.push(format!(
            "root type '{root}' has no field '{}'",
            request.field_name,
        )),
        Some(field_type) => {
            if !request.selection_set.is_empty() {
                match field_type.inner_type_name() {
                    Some(inner) if !schema.is_leaf(field_type) => {
                        validate_selections(schema, inner, &request.selection_set, &mut failures);
                    }
                    _ => failures.push(format!(
                        "field '{}' of leaf type '{field_type}' cannot have a selection set",
                        request.field_name,
                    )),
                }
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(DelegationError::Validation {
            service: subschema.name().to_string(),
            errors: ValidationErrors { errors: failures },
        })
    }
}

fn validate_selections(
    schema: &Schema,
    type_name: &str,
    selections: &[Selection],
    failures: &mut Vec<String>,
) {
    let def = match schema.type_def(type_name) {
        Some(def) => def,
        None => {
            failures.push(format!("unknown type '{type_name}'"));
            return;
        }
    };
    for selection in selections {
        match selection {
            Selection::Field(field) => {
                if field.is_typename() {
                    continue;
                }
                match def.fields.get(&field.name) {
                    None => {
                        failures.push(format!(
                            "type '{type_name}' has no field '{}'",
                            field.name,
                        ));
                    }
                    Some(field_type) => {
                        if let Some(nested) = &field.selections {
                            match field_type.inner_type_name() {
                                Some(inner) if !schema.is_leaf(field_type) => {
                                    validate_selections(schema, inner, nested, failures);
                                }
                                _ => failures.push(format!(
                                    "field '{}' of leaf type '{field_type}' cannot have a selection set",
                                    field.name,
                                )),
                            }
                        }
                    }
                }
            }
            Selection::InlineFragment(fragment) => {
                let on = fragment.type_condition.as_deref().unwrap_or(type_name);
                if schema.has_type(on) {
                    validate_selections(schema, on, &fragment.selections, failures);
                } else {
                    failures.push(format!("unknown type '{on}' in fragment condition"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Field;
    use crate::test_harness::MockExecutor;

    fn users_subschema() -> Arc<Subschema> {
        Arc::new(
            Subschema::builder()
                .name("users")
                .schema(
                    Schema::new()
                        .with_query_type("Query")
                        .with_object("Query", [("user", FieldType::named("User"))])
                        .with_object(
                            "User",
                            [("id", FieldType::Id), ("name", FieldType::String)],
                        ),
                )
                .executor(Arc::new(MockExecutor::new("users")) as Arc<dyn crate::Executor>)
                .build(),
        )
    }

    #[test]
    fn validation_collects_every_failure() {
        let subschema = users_subschema();
        let request = Request::builder()
            .field_name("user")
            .selections(vec![
                Selection::field(Field::leaf("id")),
                Selection::field(Field::leaf("nope")),
                Selection::field(Field::composite(
                    "name",
                    vec![Selection::field(Field::leaf("first"))],
                )),
            ])
            .build();
        let err = validate_request(&subschema, &request).unwrap_err();
        match err {
            DelegationError::Validation { service, errors } => {
                assert_eq!(service, "users");
                assert_eq!(errors.errors.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn pruning_drops_only_fields_the_target_does_not_declare() {
        let subschema = users_subschema();
        let mut request = Request::builder()
            .field_name("user")
            .selections(vec![
                Selection::field(Field::leaf("id")),
                Selection::field(Field::leaf("email")),
                Selection::field(Field::leaf("__typename")),
            ])
            .build();
        prune_to_schema(subschema.schema(), &mut request);
        assert_eq!(
            request.selection_set,
            vec![
                Selection::field(Field::leaf("id")),
                Selection::field(Field::leaf("__typename")),
            ],
        );
        assert!(validate_request(&subschema, &request).is_ok());
    }

    #[test]
    fn validation_rejects_unknown_root_fields_and_missing_root_types() {
        let subschema = users_subschema();
        let request = Request::builder().field_name("ghost").build();
        assert!(matches!(
            validate_request(&subschema, &request),
            Err(DelegationError::Validation { .. }),
        ));

        let request = Request::builder()
            .operation_kind(OperationKind::Mutation)
            .field_name("user")
            .build();
        assert!(matches!(
            validate_request(&subschema, &request),
            Err(DelegationError::Configuration(
                ConfigurationError::MissingRootType { .. },
            )),
        ));
    }
}
