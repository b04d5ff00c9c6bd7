//! The `service` namespace
//!
//! Four trivial operations used to exercise the host end to end: the
//! current time, string upcasing, numeric addition and a method that always
//! faults.

use crate::fault::{RpcResult, ServiceError};
use crate::registry::{Arity, Handler, MethodDef};
use crate::value::{expect_number, expect_str, Number, Value};
use chrono::{Timelike, Utc};

pub const NAMESPACE: &str = "service";

/// Code and message carried by `service.error`.
pub const ERROR_FAULT_CODE: i32 = 500;
pub const ERROR_FAULT_MESSAGE: &str = "Server error";

/// Stateless handler behind the `service` namespace
#[derive(Debug, Clone, Copy, Default)]
pub struct Service;

impl Service {
    /// Current wall-clock time (UTC) at call receipt, whole seconds.
    pub fn time(&self, _params: &[Value]) -> RpcResult<Value> {
        let now = Utc::now().naive_utc();
        let truncated = now.with_nanosecond(0).unwrap_or(now);
        Ok(Value::DateTime(truncated))
    }

    pub fn upcase(&self, params: &[Value]) -> RpcResult<Value> {
        let s = expect_str(params, 0, "service.upcase")?;
        Ok(Value::String(s.to_uppercase()))
    }

    /// `x + y`; integral when both are integers, otherwise a double.
    pub fn sum(&self, params: &[Value]) -> RpcResult<Value> {
        let x = expect_number(params, 0, "service.sum")?;
        let y = expect_number(params, 1, "service.sum")?;
        let total = match (x, y) {
            (Number::Int(a), Number::Int(b)) => Number::Int(a.checked_add(b).ok_or_else(|| {
                ServiceError::invalid_argument("service.sum", "integer overflow")
            })?),
            (Number::Int(a), Number::Double(b)) => Number::Double(a as f64 + b),
            (Number::Double(a), Number::Int(b)) => Number::Double(a + b as f64),
            (Number::Double(a), Number::Double(b)) => Number::Double(a + b),
        };
        if let Number::Double(d) = total {
            if !d.is_finite() {
                return Err(ServiceError::invalid_argument(
                    "service.sum",
                    "result is not a finite number",
                ));
            }
        }
        Ok(total.into())
    }

    /// Always fails; any arguments are ignored.
    pub fn error(&self, _params: &[Value]) -> RpcResult<Value> {
        Err(ServiceError::declared(ERROR_FAULT_CODE, ERROR_FAULT_MESSAGE))
    }
}

impl Handler for Service {
    fn methods() -> Vec<MethodDef<Self>> {
        vec![
            MethodDef {
                name: "time",
                arity: Arity::Exact(0),
                help: "Current server time",
                signature: &["dateTime.iso8601"],
                func: Service::time,
            },
            MethodDef {
                name: "upcase",
                arity: Arity::Exact(1),
                help: "Uppercase the given string",
                signature: &["string", "string"],
                func: Service::upcase,
            },
            MethodDef {
                name: "sum",
                arity: Arity::Exact(2),
                help: "Add two numbers",
                signature: &["double", "double", "double"],
                func: Service::sum,
            },
            MethodDef {
                name: "error",
                arity: Arity::Any,
                help: "Always raises a fault (500, Server error)",
                signature: &[],
                func: Service::error,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{Fault, INVALID_ARGUMENT};
    use chrono::Duration;

    #[test]
    fn upcase_matches_std_uppercase() {
        for s in ["hello", "MiXeD 123", "", "straße", "ǆ"] {
            let out = Service.upcase(&[Value::from(s)]).unwrap();
            assert_eq!(out, Value::String(s.to_uppercase()));
        }
    }

    #[test]
    fn upcase_rejects_non_strings() {
        let fault: Fault = Service.upcase(&[Value::Int(1)]).unwrap_err().into();
        assert_eq!(fault.code, INVALID_ARGUMENT);
    }

    #[test]
    fn sum_of_integers_stays_integral() {
        assert_eq!(Service.sum(&[Value::Int(2), Value::Int(3)]), Ok(Value::Int(5)));
        assert_eq!(Service.sum(&[Value::Int(-1), Value::Int(1)]), Ok(Value::Int(0)));
    }

    #[test]
    fn sum_with_a_double_is_a_double() {
        assert_eq!(
            Service.sum(&[Value::Int(1), Value::Double(0.5)]),
            Ok(Value::Double(1.5))
        );
        assert_eq!(
            Service.sum(&[Value::Double(0.25), Value::Double(0.25)]),
            Ok(Value::Double(0.5))
        );
    }

    #[test]
    fn sum_rejects_non_numbers_and_overflow() {
        let bad = Service.sum(&[Value::from("2"), Value::Int(3)]).unwrap_err();
        assert_eq!(bad.code(), INVALID_ARGUMENT);
        let overflow = Service.sum(&[Value::Int(i64::MAX), Value::Int(1)]).unwrap_err();
        assert_eq!(overflow.code(), INVALID_ARGUMENT);
    }

    #[test]
    fn sum_rejects_non_finite_results() {
        let err = Service
            .sum(&[Value::Double(f64::MAX), Value::Double(f64::MAX)])
            .unwrap_err();
        assert_eq!(err.code(), INVALID_ARGUMENT);
    }

    #[test]
    fn error_always_faults_with_500() {
        for params in [vec![], vec![Value::from("ignored")]] {
            let fault: Fault = Service.error(&params).unwrap_err().into();
            assert_eq!(fault, Fault::new(500, "Server error"));
        }
    }

    #[test]
    fn time_is_close_to_now() {
        let before = Utc::now().naive_utc() - Duration::seconds(1);
        let Value::DateTime(t) = Service.time(&[]).unwrap() else {
            panic!("time must return a dateTime");
        };
        let after = Utc::now().naive_utc() + Duration::seconds(1);
        assert!(t >= before && t <= after);
    }
}
