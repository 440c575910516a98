//! Delegation errors.

use std::fmt;

use displaydoc::Display;
use serde::Serialize;
use thiserror::Error;

use crate::graphql;
use crate::graphql::OperationKind;
use crate::json_ext::Path;

/// Error types for delegation.
///
/// Data-level errors are converted to GraphQL errors and threaded through
/// result reconciliation; configuration errors indicate the composed schema
/// itself is invalid and propagate as failures.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum DelegationError {
    /// sub-request document failed validation against subschema '{service}': {errors}
    Validation {
        /// The subschema the document was validated against.
        service: String,

        /// Every individual validation failure.
        errors: ValidationErrors,
    },

    /// executor for subschema '{service}' failed: {reason}
    SubrequestError {
        /// The subschema whose executor failed.
        service: String,

        /// The reason the execution failed. Non-error throws from the
        /// executor are captured here as their display form.
        reason: String,
    },

    /// subschema '{service}' returned a malformed response: {reason}
    SubrequestMalformedResponse {
        /// The subschema that responded with the malformed response.
        service: String,

        /// The reason the response could not be interpreted.
        reason: String,
    },

    /// batch processing for subschema '{service}' failed: {reason}
    SubrequestBatchingError {
        /// The subschema for which batch processing failed.
        service: String,

        /// The reason batch processing failed.
        reason: String,
    },

    /// operation was cancelled
    Cancelled,

    /// {0}
    Configuration(#[from] ConfigurationError),
}

/// Errors indicating that the composed schema or a subschema config is
/// invalid. These are fatal: they are never converted into located field
/// errors.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// typename '{typename}' is not a known type of the composed schema (missing type-renaming transform?)
    UnknownTypename { typename: String },

    /// merged type '{type_name}' has no merge configuration in subschema '{service}'
    MissingMergeConfig { type_name: String, service: String },

    /// merge configuration for type '{type_name}' in subschema '{service}' names unknown root field '{field_name}'
    InvalidMergeConfig {
        type_name: String,
        service: String,
        field_name: String,
    },

    /// subschema '{service}' has no root type for {kind} operations
    MissingRootType {
        service: String,
        kind: OperationKind,
    },
}

/// The collected validation failures for one outgoing sub-request document.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub errors: Vec<String>,
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.errors.join("; "))
    }
}

impl DelegationError {
    /// True when this error indicates invalid composition rather than a
    /// transient data failure, and must not be absorbed into a field error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, DelegationError::Configuration(_))
    }

    pub(crate) fn extension_code(&self) -> &'static str {
        match self {
            DelegationError::Validation { .. } => "SUBREQUEST_VALIDATION_FAILED",
            DelegationError::SubrequestError { .. } => "SUBREQUEST_ERROR",
            DelegationError::SubrequestMalformedResponse { .. } => {
                "SUBREQUEST_MALFORMED_RESPONSE"
            }
            DelegationError::SubrequestBatchingError { .. } => "SUBREQUEST_BATCHING_ERROR",
            DelegationError::Cancelled => "OPERATION_CANCELLED",
            DelegationError::Configuration(_) => "INVALID_CONFIGURATION",
        }
    }

    /// Converts the delegation error to a GraphQL error located at `path`.
    pub fn to_graphql_error(&self, path: Option<Path>) -> graphql::Error {
        let mut builder = graphql::Error::builder()
            .message(self.to_string())
            .extension_code(self.extension_code());
        match self {
            DelegationError::Validation { service, errors } => {
                builder = builder.extension("service", service.as_str());
                if let Ok(value) = serde_json_bytes::to_value(&errors.errors) {
                    builder = builder.extension("validationErrors", value);
                }
            }
            DelegationError::SubrequestError { service, .. }
            | DelegationError::SubrequestMalformedResponse { service, .. }
            | DelegationError::SubrequestBatchingError { service, .. } => {
                builder = builder.extension("service", service.as_str());
            }
            _ => {}
        }
        builder.and_path(path).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphql_conversion_carries_code_and_service() {
        let error = DelegationError::SubrequestError {
            service: "reviews".to_string(),
            reason: "connection reset".to_string(),
        };
        let converted = error.to_graphql_error(Some(Path::from("product/reviews")));
        assert_eq!(
            converted.message,
            "executor for subschema 'reviews' failed: connection reset",
        );
        assert_eq!(
            converted.extensions.get("code").and_then(|v| v.as_str()),
            Some("SUBREQUEST_ERROR"),
        );
        assert_eq!(
            converted.extensions.get("service").and_then(|v| v.as_str()),
            Some("reviews"),
        );
        assert_eq!(converted.path, Some(Path::from("product/reviews")));
    }

    #[test]
    fn validation_errors_join_every_failure() {
        let errors = ValidationErrors {
            errors: vec!["unknown field `a`".to_string(), "unknown field `b`".to_string()],
        };
        let error = DelegationError::Validation {
            service: "users".to_string(),
            errors,
        };
        assert!(error.to_string().contains("unknown field `a`"));
        assert!(error.to_string().contains("unknown field `b`"));
        assert!(!error.is_configuration());
        assert!(DelegationError::Configuration(ConfigurationError::UnknownTypename {
            typename: "Ghost".to_string(),
        })
        .is_configuration());
    }
}
