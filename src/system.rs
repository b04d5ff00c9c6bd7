//! `system.*` introspection and `system.multicall`
//!
//! Both are opt-in. The registry they describe is frozen first; the system
//! methods are then layered on top and see that snapshot.

use crate::errors::HostResult;
use crate::fault::{
    Fault, RpcResult, ServiceError, MC_EXPECTED_STRUCT, MC_MISSING_METHNAME, MC_MISSING_PARAMS,
    MC_RECURSIVE_CALL, MC_WRONG_PARAM, MC_WRONG_PARAM_PARAMS,
};
use crate::registry::{Arity, Method, Registry, RegistryBuilder};
use crate::value::{expect_str, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const LIST_METHODS: &str = "system.listMethods";
pub const METHOD_HELP: &str = "system.methodHelp";
pub const METHOD_SIGNATURE: &str = "system.methodSignature";
pub const MULTICALL: &str = "system.multicall";

/// Which `system.*` features to expose
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemOptions {
    pub introspection: bool,
    pub multicall: bool,
}

#[derive(Debug, Clone)]
struct Description {
    help: &'static str,
    signature: &'static [&'static str],
}

const INTROSPECTION_METHODS: [(&str, Description); 3] = [
    (
        LIST_METHODS,
        Description {
            help: "List the names of all registered methods",
            signature: &["array"],
        },
    ),
    (
        METHOD_HELP,
        Description {
            help: "Help text of the named method",
            signature: &["string", "string"],
        },
    ),
    (
        METHOD_SIGNATURE,
        Description {
            help: "Signatures of the named method",
            signature: &["array", "string"],
        },
    ),
];

const MULTICALL_DESCRIPTION: Description = Description {
    help: "Invoke several methods in one request",
    signature: &["array", "array"],
};

/// Freeze `builder` and, if requested, add the `system.*` methods on top.
pub fn install(builder: RegistryBuilder, options: SystemOptions) -> HostResult<Registry> {
    let base = builder.build()?;
    if !options.introspection && !options.multicall {
        return Ok(base);
    }

    let mut catalog: BTreeMap<String, Description> = base
        .methods()
        .map(|m| {
            (
                m.full_name.clone(),
                Description {
                    help: m.help,
                    signature: m.signature,
                },
            )
        })
        .collect();
    if options.introspection {
        for (name, description) in INTROSPECTION_METHODS {
            catalog.insert(name.to_string(), description);
        }
    }
    if options.multicall {
        catalog.insert(MULTICALL.to_string(), MULTICALL_DESCRIPTION);
    }
    let catalog = Arc::new(catalog);

    let mut layered = Registry::builder();
    for method in base.methods() {
        layered = layered.add_method(method.clone());
    }

    if options.introspection {
        let names = Arc::clone(&catalog);
        layered = layered.add_method(Method::from_fn(
            LIST_METHODS,
            Arity::Exact(0),
            INTROSPECTION_METHODS[0].1.help,
            INTROSPECTION_METHODS[0].1.signature,
            move |_| Ok(names.keys().cloned().collect::<Vec<_>>().into()),
        ));

        let helps = Arc::clone(&catalog);
        layered = layered.add_method(Method::from_fn(
            METHOD_HELP,
            Arity::Exact(1),
            INTROSPECTION_METHODS[1].1.help,
            INTROSPECTION_METHODS[1].1.signature,
            move |params| {
                let name = expect_str(params, 0, METHOD_HELP)?;
                let description = helps
                    .get(name)
                    .ok_or_else(|| ServiceError::method_not_found(name))?;
                Ok(Value::from(description.help))
            },
        ));

        let signatures = Arc::clone(&catalog);
        layered = layered.add_method(Method::from_fn(
            METHOD_SIGNATURE,
            Arity::Exact(1),
            INTROSPECTION_METHODS[2].1.help,
            INTROSPECTION_METHODS[2].1.signature,
            move |params| {
                let name = expect_str(params, 0, METHOD_SIGNATURE)?;
                let description = signatures
                    .get(name)
                    .ok_or_else(|| ServiceError::method_not_found(name))?;
                let mut all = Vec::new();
                if !description.signature.is_empty() {
                    all.push(Value::from(description.signature.to_vec()));
                }
                Ok(Value::Array(all))
            },
        ));
    }

    if !options.multicall {
        return layered.build();
    }

    let inner = Arc::new(layered.build()?);
    let target = Arc::clone(&inner);
    let mut outer = Registry::builder();
    for method in inner.methods() {
        outer = outer.add_method(method.clone());
    }
    outer
        .add_method(Method::from_fn(
            MULTICALL,
            Arity::Exact(1),
            MULTICALL_DESCRIPTION.help,
            MULTICALL_DESCRIPTION.signature,
            move |params| multicall(&target, params),
        ))
        .build()
}

fn fault_value(fault: Fault) -> Value {
    Value::structure([
        ("faultCode", Value::Int(i64::from(fault.code))),
        ("faultString", Value::String(fault.message)),
    ])
}

fn multicall_entry(registry: &Registry, entry: &Value) -> Result<Value, Fault> {
    let members = entry
        .as_struct()
        .ok_or_else(|| Fault::new(MC_EXPECTED_STRUCT, "system.multicall expected struct"))?;
    let name = members
        .get("methodName")
        .and_then(Value::as_str)
        .ok_or_else(|| Fault::new(MC_MISSING_METHNAME, "Missing methodName"))?;
    if name == MULTICALL {
        return Err(Fault::new(
            MC_RECURSIVE_CALL,
            "Recursive system.multicall forbidden",
        ));
    }
    let params = members
        .get("params")
        .ok_or_else(|| Fault::new(MC_MISSING_PARAMS, "Missing params"))?
        .as_array()
        .ok_or_else(|| Fault::new(MC_WRONG_PARAM_PARAMS, "Parameter params have to be an Array"))?;

    registry
        .dispatch(name, params)
        .map(|value| Value::Array(vec![value]))
        .map_err(Fault::from)
}

fn multicall(registry: &Registry, params: &[Value]) -> RpcResult<Value> {
    let calls = params
        .first()
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ServiceError::declared(MC_WRONG_PARAM, "system.multicall expects an array")
        })?;

    let results = calls
        .iter()
        .map(|entry| multicall_entry(registry, entry).unwrap_or_else(fault_value))
        .collect();
    Ok(Value::Array(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{Service, NAMESPACE};

    fn registry(options: SystemOptions) -> Registry {
        install(Registry::builder().add_handler(NAMESPACE, Service), options).unwrap()
    }

    fn call(name: &str, params: Vec<Value>) -> Value {
        Value::structure([
            ("methodName", Value::from(name)),
            ("params", Value::Array(params)),
        ])
    }

    #[test]
    fn disabled_by_default() {
        let reg = registry(SystemOptions::default());
        assert!(reg.lookup(LIST_METHODS).is_none());
        assert!(reg.lookup(MULTICALL).is_none());
    }

    #[test]
    fn list_methods_includes_service_and_system_names() {
        let reg = registry(SystemOptions {
            introspection: true,
            multicall: true,
        });
        let listed = reg.dispatch(LIST_METHODS, &[]).unwrap();
        let names: Vec<&str> = listed
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(names.contains(&"service.upcase"));
        assert!(names.contains(&"system.multicall"));
        assert!(names.contains(&"system.listMethods"));
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn help_and_signature_describe_methods() {
        let reg = registry(SystemOptions {
            introspection: true,
            multicall: false,
        });
        assert_eq!(
            reg.dispatch(METHOD_HELP, &[Value::from("service.upcase")]),
            Ok(Value::from("Uppercase the given string"))
        );
        assert_eq!(
            reg.dispatch(METHOD_SIGNATURE, &[Value::from("service.upcase")]),
            Ok(Value::Array(vec![Value::from(vec!["string", "string"])]))
        );
        assert_eq!(
            reg.dispatch(METHOD_SIGNATURE, &[Value::from("service.error")]),
            Ok(Value::Array(vec![]))
        );
        assert!(reg.dispatch(METHOD_HELP, &[Value::from("nope.nope")]).is_err());
    }

    #[test]
    fn multicall_mixes_results_and_faults() {
        let reg = registry(SystemOptions {
            introspection: false,
            multicall: true,
        });
        let batch = Value::Array(vec![
            call("service.sum", vec![Value::Int(2), Value::Int(3)]),
            call("service.error", vec![]),
            call(MULTICALL, vec![]),
            Value::Int(1),
        ]);
        let out = reg.dispatch(MULTICALL, &[batch]).unwrap();
        let out = out.as_array().unwrap();
        assert_eq!(out[0], Value::Array(vec![Value::Int(5)]));
        assert_eq!(out[1], fault_value(Fault::new(500, "Server error")));
        assert_eq!(
            out[2].as_struct().unwrap()["faultCode"],
            Value::Int(i64::from(MC_RECURSIVE_CALL))
        );
        assert_eq!(
            out[3].as_struct().unwrap()["faultCode"],
            Value::Int(i64::from(MC_EXPECTED_STRUCT))
        );
    }

    #[test]
    fn multicall_requires_an_array() {
        let reg = registry(SystemOptions {
            introspection: false,
            multicall: true,
        });
        let err = reg.dispatch(MULTICALL, &[Value::from("x")]).unwrap_err();
        assert_eq!(err.code(), MC_WRONG_PARAM);
    }
}
