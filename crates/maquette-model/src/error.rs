//! Error types for the model store and event dispatch

use thiserror::Error;

use crate::element::ElementId;

/// Error returned by an event handler to abort dispatch.
///
/// Carries a message and an optional source error supplied by the
/// handler. Dispatch stops at the first failing handler and the error
/// is surfaced to the caller of the mutating operation.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HandlerError {
    /// Create a handler error with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create a handler error wrapping an underlying error
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The handler's failure message
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors that can occur in the element store
#[derive(Debug, Error)]
pub enum ModelError {
    /// No element with this id is registered
    #[error("Unknown element id: {0}")]
    UnknownId(ElementId),

    /// The schema does not define this kind
    #[error("Unknown element kind: {0}")]
    UnknownKind(String),

    /// The kind does not define this property
    #[error("Kind {kind} has no property {property}")]
    UnknownProperty {
        /// Kind that was consulted
        kind: String,
        /// Property that is missing
        property: String,
    },

    /// The property exists but is the wrong flavor for the operation
    #[error("Property {kind}.{property} is {actual}, expected {expected}")]
    PropertyMismatch {
        /// Kind that was consulted
        kind: String,
        /// Property that was used
        property: String,
        /// Flavor the operation needs
        expected: &'static str,
        /// Flavor the schema declares
        actual: &'static str,
    },

    /// An element with this id is already registered
    #[error("Element id already in use: {0}")]
    IdInUse(ElementId),

    /// An event handler failed during dispatch
    #[error("Event handler failed: {0}")]
    Handler(#[from] HandlerError),
}

impl ModelError {
    /// Create a new UnknownProperty error with context
    pub fn unknown_property(kind: impl Into<String>, property: impl Into<String>) -> Self {
        Self::UnknownProperty {
            kind: kind.into(),
            property: property.into(),
        }
    }

    /// Create a new PropertyMismatch error with context
    pub fn property_mismatch(
        kind: impl Into<String>,
        property: impl Into<String>,
        expected: &'static str,
        actual: &'static str,
    ) -> Self {
        Self::PropertyMismatch {
            kind: kind.into(),
            property: property.into(),
            expected,
            actual,
        }
    }
}

/// Errors that can occur while building a schema
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A kind name was declared twice
    #[error("Duplicate kind in schema: {0}")]
    DuplicateKind(String),

    /// A property name was declared twice on the same kind
    #[error("Duplicate property {property} on kind {kind}")]
    DuplicateProperty {
        /// Kind carrying the duplicate
        kind: String,
        /// Property name declared twice
        property: String,
    },

    /// A declared inverse is not declared back from the other side
    #[error("Inverse {inverse} of {kind}.{property} has no reciprocal declaration")]
    InverseMismatch {
        /// Kind declaring the inverse
        kind: String,
        /// Property declaring the inverse
        property: String,
        /// Inverse property name that does not point back
        inverse: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_display_and_source() {
        let plain = HandlerError::new("veto");
        assert_eq!(plain.to_string(), "veto");
        assert!(std::error::Error::source(&plain).is_none());

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let wrapped = HandlerError::with_source("persist failed", io);
        assert_eq!(wrapped.message(), "persist failed");
        assert!(std::error::Error::source(&wrapped).is_some());
    }

    #[test]
    fn test_model_error_display() {
        let err = ModelError::unknown_property("shape", "radius");
        assert_eq!(err.to_string(), "Kind shape has no property radius");

        let err = ModelError::Handler(HandlerError::new("veto"));
        assert_eq!(err.to_string(), "Event handler failed: veto");
    }
}
