//! Registered services.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::method::{Argv, MethodDescriptor, MethodSet, ReplyValue};
use super::{is_exported, is_exported_or_builtin, Service};
use crate::error::{Result, RpcError};

/// A named receiver and its eligible methods. Read-only once built.
pub struct ServiceDescriptor {
    name: String,
    methods: HashMap<String, Arc<MethodDescriptor>>,
}

impl ServiceDescriptor {
    /// Build the descriptor for `receiver`.
    ///
    /// # Errors
    ///
    /// Returns `Register` if the service name is not exported.
    pub fn new<S: Service>(receiver: S) -> Result<Self> {
        let name = receiver.name();
        if !is_exported(&name) {
            return Err(RpcError::Register(format!(
                "{} is not a valid service name",
                name
            )));
        }

        let mut set = MethodSet::new();
        S::methods(&mut set);

        let receiver = Arc::new(receiver);
        let mut methods = HashMap::new();
        for candidate in set.into_candidates() {
            if !is_exported(&candidate.name) {
                debug!("rpc server: skip {}.{}: method not exported", name, candidate.name);
                continue;
            }
            if !is_exported_or_builtin(candidate.arg_type)
                || !is_exported_or_builtin(candidate.reply_type)
            {
                debug!(
                    "rpc server: skip {}.{}: {} or {} is not exported",
                    name, candidate.name, candidate.arg_type, candidate.reply_type
                );
                continue;
            }
            if methods.contains_key(&candidate.name) {
                debug!("rpc server: skip {}.{}: listed twice", name, candidate.name);
                continue;
            }

            let method = (candidate.bind)(receiver.clone());
            debug!(
                "rpc server: register {}.{}({}, &mut {})",
                name, candidate.name, candidate.arg_type, candidate.reply_type
            );
            methods.insert(
                candidate.name.clone(),
                Arc::new(MethodDescriptor::new(
                    candidate.name,
                    candidate.arg_type,
                    candidate.reply_type,
                    method,
                )),
            );
        }

        if methods.is_empty() {
            warn!("rpc server: service {} has no eligible methods", name);
        }

        Ok(Self { name, methods })
    }

    /// Service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a method by exact name.
    pub fn method(&self, name: &str) -> Option<Arc<MethodDescriptor>> {
        self.methods.get(name).cloned()
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Invoke `method` with a decoded argument, filling `replyv`.
    ///
    /// Returns the method's error text verbatim.
    pub fn call(
        &self,
        method: &MethodDescriptor,
        argv: Argv,
        replyv: &mut dyn ReplyValue,
    ) -> std::result::Result<(), String> {
        method.invoke(argv, replyv)
    }
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Format;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Args {
        num1: i64,
        num2: i64,
    }

    #[allow(non_camel_case_types)]
    #[derive(Debug, Default, Serialize, Deserialize)]
    struct hidden {
        value: i64,
    }

    struct Foo;

    impl Foo {
        fn sum(&self, args: Args, reply: &mut i64) -> std::result::Result<(), String> {
            *reply = args.num1 + args.num2;
            Ok(())
        }

        fn peek(&self, _args: hidden, _reply: &mut i64) -> std::result::Result<(), String> {
            Ok(())
        }
    }

    impl Service for Foo {
        fn methods(set: &mut MethodSet<Self>) {
            set.add("Sum", Foo::sum)
                .add("sum", Foo::sum)
                .add("Peek", Foo::peek);
        }
    }

    #[allow(non_camel_case_types)]
    struct lowercase;

    impl Service for lowercase {
        fn methods(_set: &mut MethodSet<Self>) {}
    }

    struct Renamed;

    impl Service for Renamed {
        fn name(&self) -> String {
            "Calc".to_string()
        }

        fn methods(set: &mut MethodSet<Self>) {
            set.add("Double", |_: &Renamed, n: i64, reply: &mut i64| -> std::result::Result<(), String> {
                *reply = n * 2;
                Ok(())
            });
        }
    }

    #[test]
    fn test_only_eligible_methods_registered() {
        let service = ServiceDescriptor::new(Foo).unwrap();
        assert_eq!(service.name(), "Foo");
        assert_eq!(service.method_names(), vec!["Sum"]);
    }

    #[test]
    fn test_unexported_service_name_rejected() {
        let err = ServiceDescriptor::new(lowercase).unwrap_err();
        assert_eq!(err.to_string(), "rpc server: lowercase is not a valid service name");
    }

    #[test]
    fn test_custom_name() {
        let service = ServiceDescriptor::new(Renamed).unwrap();
        assert_eq!(service.name(), "Calc");
        assert!(service.method("Double").is_some());
    }

    #[test]
    fn test_call_counts_invocations() {
        let service = ServiceDescriptor::new(Foo).unwrap();
        let method = service.method("Sum").unwrap();

        for _ in 0..3 {
            let body = Format::MsgPack.encode(&Args { num1: 1, num2: 2 }).unwrap();
            let argv = method.decode_argv(Format::MsgPack, &body).unwrap();
            let mut replyv = method.new_replyv();
            service.call(&method, argv, &mut *replyv).unwrap();
            assert_eq!(replyv.encode(Format::Json).unwrap(), b"3");
        }

        assert_eq!(method.num_calls(), 3);
    }
}
