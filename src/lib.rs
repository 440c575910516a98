//! A delegation and merge-resolution engine for stitched GraphQL schemas.
//!
//! Independent backend schemas ([`Subschema`]) compose into one
//! [`Supergraph`]. Delegation forwards (part of) an operation to one
//! subschema's executor; when several subschemas own fields of the same type,
//! their contributions are fetched concurrently and merged into a single
//! object, with every backend error relocated to its final response path.

#![warn(unreachable_pub)]

mod batching;
pub mod delegate;
mod error;
pub mod executor;
pub mod graphql;
pub mod json_ext;
pub mod spec;
mod subschema;
mod supergraph;
pub mod test_harness;

pub use crate::delegate::assemble;
pub use crate::delegate::complete_value;
pub use crate::delegate::delegate_request;
pub use crate::delegate::delegate_to_schema;
pub use crate::delegate::resolve_external_value;
pub use crate::delegate::resolve_merged_field;
pub use crate::delegate::DelegateOptions;
pub use crate::delegate::Delegated;
pub use crate::delegate::DelegationContext;
pub use crate::delegate::DelegationPlan;
pub use crate::delegate::ExternalObject;
pub use crate::delegate::MergedTypeInfo;
pub use crate::delegate::ResolvedStream;
pub use crate::delegate::ResolvedValue;
pub use crate::error::ConfigurationError;
pub use crate::error::DelegationError;
pub use crate::error::ValidationErrors;
pub use crate::executor::BoxError;
pub use crate::executor::Executor;
pub use crate::executor::ExecutorResult;
pub use crate::executor::ResponseStream;
pub use crate::subschema::BatchConfig;
pub use crate::subschema::KeyArgsFn;
pub use crate::subschema::MergedTypeConfig;
pub use crate::subschema::Subschema;
pub use crate::subschema::Transform;
pub use crate::supergraph::Supergraph;
