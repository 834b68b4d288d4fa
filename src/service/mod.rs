//! Service module - exposing a receiver's methods for remote invocation.
//!
//! Provides:
//! - [`Service`] - implemented by receivers to list their candidate methods
//! - [`MethodSet`] - collects candidates of shape `fn(&Self, Args, &mut Reply) -> Result<(), E>`
//! - [`ServiceDescriptor`] - the registered, read-only view the server dispatches through
//!
//! # Example
//!
//! ```
//! use wirerpc::service::{MethodSet, Service, ServiceDescriptor};
//!
//! struct Arith;
//!
//! impl Arith {
//!     fn sum(&self, args: (i64, i64), reply: &mut i64) -> Result<(), String> {
//!         *reply = args.0 + args.1;
//!         Ok(())
//!     }
//! }
//!
//! impl Service for Arith {
//!     fn methods(set: &mut MethodSet<Self>) {
//!         set.add("Sum", Arith::sum);
//!     }
//! }
//!
//! let service = ServiceDescriptor::new(Arith).unwrap();
//! assert_eq!(service.name(), "Arith");
//! assert!(service.method("Sum").is_some());
//! ```

mod descriptor;
mod method;

pub use descriptor::ServiceDescriptor;
pub use method::{Argv, MethodDescriptor, MethodSet, ReplyValue};

/// A receiver whose methods can be registered on a server.
pub trait Service: Send + Sync + Sized + 'static {
    /// Name requests address the service by. Defaults to the type name.
    fn name(&self) -> String {
        short_type_name(std::any::type_name::<Self>()).to_string()
    }

    /// List candidate methods. Ineligible ones are skipped at registration.
    fn methods(set: &mut MethodSet<Self>);
}

/// Whether `name` starts with an ASCII uppercase letter.
pub(crate) fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

/// Whether a type, given by its `std::any::type_name`, may cross the wire.
///
/// Every path named in the type counts, including generic arguments and
/// tuple or array elements. Primitives and standard library paths always
/// pass; user-defined paths only when their last segment is exported.
pub(crate) fn is_exported_or_builtin(type_name: &str) -> bool {
    type_name
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == ':'))
        .filter(|path| path.contains("::"))
        .all(|path| {
            ["std::", "alloc::", "core::"].iter().any(|p| path.starts_with(p))
                || is_exported(short_type_name(path))
        })
}

/// Last path segment of a type name, without generic arguments.
pub(crate) fn short_type_name(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_exported() {
        assert!(is_exported("Sum"));
        assert!(!is_exported("sum"));
        assert!(!is_exported("_Sum"));
        assert!(!is_exported(""));
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("demo::arith::Arith"), "Arith");
        assert_eq!(short_type_name("demo::Wrapper<demo::Inner>"), "Wrapper");
        assert_eq!(short_type_name("i64"), "i64");
    }

    #[test]
    fn test_builtin_types_are_eligible() {
        assert!(is_exported_or_builtin(std::any::type_name::<i64>()));
        assert!(is_exported_or_builtin(std::any::type_name::<String>()));
        assert!(is_exported_or_builtin(std::any::type_name::<Vec<u8>>()));
        assert!(is_exported_or_builtin(std::any::type_name::<(i64, i64)>()));
        assert!(is_exported_or_builtin(std::any::type_name::<()>()));
        assert!(is_exported_or_builtin(
            std::any::type_name::<std::collections::HashMap<String, i32>>()
        ));
    }

    #[test]
    fn test_user_types_need_exported_names() {
        assert!(is_exported_or_builtin("demo::Args"));
        assert!(!is_exported_or_builtin("demo::args"));
        assert!(!is_exported_or_builtin("demo::args<demo::Args>"));
        assert!(!is_exported_or_builtin("demo::Wrapper<demo::args>"));
        assert!(!is_exported_or_builtin("alloc::vec::Vec<demo::args>"));
    }

    #[test]
    fn test_tuple_and_array_elements_checked() {
        assert!(is_exported_or_builtin("(demo::Args, demo::Reply)"));
        assert!(!is_exported_or_builtin("(demo::hidden, demo::Args)"));
        assert!(!is_exported_or_builtin("(demo::Args, demo::hidden)"));
        assert!(is_exported_or_builtin("[demo::Args; 4]"));
        assert!(!is_exported_or_builtin("[demo::hidden; 4]"));
        assert!(is_exported_or_builtin("(i64, [u8; 2])"));
    }
}
