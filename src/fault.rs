//! Faults and the per-call error taxonomy
//!
//! Every handler method returns `RpcResult<Value>`. The `ServiceError` side
//! is converted into a wire [`Fault`] at the response boundary, so a bad
//! call never turns into a transport error.

use thiserror::Error;

/// Method missing or wrong number of parameters.
pub const METHOD_MISSING: i32 = 1;
/// Uncaught failure while executing a method.
pub const UNCAUGHT_EXCEPTION: i32 = 2;
pub const MC_WRONG_PARAM: i32 = 3;
pub const MC_MISSING_PARAMS: i32 = 4;
pub const MC_MISSING_METHNAME: i32 = 5;
pub const MC_RECURSIVE_CALL: i32 = 6;
pub const MC_WRONG_PARAM_PARAMS: i32 = 7;
pub const MC_EXPECTED_STRUCT: i32 = 8;
/// Argument of the wrong type or shape.
pub const INVALID_ARGUMENT: i32 = 9;

pub const METHOD_MISSING_MESSAGE: &str = "Method missing or wrong number of parameters!";

/// A structured XML-RPC fault: integer code plus human readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fault {code}: {message}")]
pub struct Fault {
    pub code: i32,
    pub message: String,
}

impl Fault {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Domain-level failure of a single call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("Invalid argument for {method}: {message}")]
    InvalidArgument { method: String, message: String },

    #[error("Method missing or wrong number of parameters!")]
    MethodNotFound { method: String },

    #[error(transparent)]
    Declared(#[from] Fault),

    #[error("Uncaught exception {message} in method {method}")]
    Internal { method: String, message: String },
}

pub type RpcResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn invalid_argument(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            method: method.into(),
            message: message.into(),
        }
    }

    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    /// Raise an explicit fault that is propagated to the caller verbatim.
    pub fn declared(code: i32, message: impl Into<String>) -> Self {
        Self::Declared(Fault::new(code, message))
    }

    pub fn internal(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Fault code this error is reported with.
    pub fn code(&self) -> i32 {
        match self {
            ServiceError::InvalidArgument { .. } => INVALID_ARGUMENT,
            ServiceError::MethodNotFound { .. } => METHOD_MISSING,
            ServiceError::Declared(fault) => fault.code,
            ServiceError::Internal { .. } => UNCAUGHT_EXCEPTION,
        }
    }
}

impl From<ServiceError> for Fault {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Declared(fault) => fault,
            other => Fault::new(other.code(), other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_faults_pass_through_verbatim() {
        let fault: Fault = ServiceError::declared(500, "Server error").into();
        assert_eq!(fault, Fault::new(500, "Server error"));
    }

    #[test]
    fn method_not_found_uses_stock_message() {
        let fault: Fault = ServiceError::method_not_found("service.nope").into();
        assert_eq!(fault.code, METHOD_MISSING);
        assert_eq!(fault.message, METHOD_MISSING_MESSAGE);
    }

    #[test]
    fn invalid_argument_and_internal_have_distinct_codes() {
        let invalid: Fault = ServiceError::invalid_argument("service.sum", "bad").into();
        let internal: Fault = ServiceError::internal("service.sum", "boom").into();
        assert_eq!(invalid.code, INVALID_ARGUMENT);
        assert_eq!(internal.code, UNCAUGHT_EXCEPTION);
        assert_eq!(internal.message, "Uncaught exception boom in method service.sum");
    }
}
