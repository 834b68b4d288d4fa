//! Method candidates and the type-erased invocation table.

use std::any::{type_name, Any};
use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::Format;
use crate::error::Result;

/// A decoded argument value, erased to be carried into the invocation.
pub type Argv = Box<dyn Any + Send>;

/// A reply value that can be filled by a method and encoded afterwards.
pub trait ReplyValue: Send {
    /// Encode the reply in the connection's format.
    fn encode(&self, format: Format) -> Result<Vec<u8>>;

    /// Access the concrete reply for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<R> ReplyValue for R
where
    R: Serialize + Send + 'static,
{
    fn encode(&self, format: Format) -> Result<Vec<u8>> {
        format.encode(self)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Object-safe view of a method bound to its receiver.
pub(crate) trait Invoke: Send + Sync {
    fn decode_argv(&self, format: Format, body: &[u8]) -> Result<Argv>;
    fn new_replyv(&self) -> Box<dyn ReplyValue>;
    fn invoke(&self, argv: Argv, replyv: &mut dyn ReplyValue) -> std::result::Result<(), String>;
}

/// Typed method that decodes its argument before calling the function.
struct TypedMethod<S, F, A, R, E> {
    receiver: Arc<S>,
    func: Arc<F>,
    _phantom: PhantomData<fn(A) -> (R, E)>,
}

impl<S, F, A, R, E> Invoke for TypedMethod<S, F, A, R, E>
where
    S: Send + Sync + 'static,
    F: Fn(&S, A, &mut R) -> std::result::Result<(), E> + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Default + Send + 'static,
    E: Display + 'static,
{
    fn decode_argv(&self, format: Format, body: &[u8]) -> Result<Argv> {
        let argv: A = format.decode(body)?;
        Ok(Box::new(argv))
    }

    fn new_replyv(&self) -> Box<dyn ReplyValue> {
        Box::new(R::default())
    }

    fn invoke(&self, argv: Argv, replyv: &mut dyn ReplyValue) -> std::result::Result<(), String> {
        let argv = argv
            .downcast::<A>()
            .map_err(|_| format!("rpc server: argument is not {}", type_name::<A>()))?;
        let reply = replyv
            .as_any_mut()
            .downcast_mut::<R>()
            .ok_or_else(|| format!("rpc server: reply is not {}", type_name::<R>()))?;

        (self.func)(&self.receiver, *argv, reply).map_err(|e| e.to_string())
    }
}

type Binder<S> = Box<dyn FnOnce(Arc<S>) -> Box<dyn Invoke> + Send>;

/// A method offered by a receiver, not yet checked for eligibility.
pub(crate) struct Candidate<S> {
    pub(crate) name: String,
    pub(crate) arg_type: &'static str,
    pub(crate) reply_type: &'static str,
    pub(crate) bind: Binder<S>,
}

/// Candidate methods listed by a [`Service`](super::Service).
pub struct MethodSet<S> {
    candidates: Vec<Candidate<S>>,
}

impl<S> MethodSet<S>
where
    S: Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            candidates: Vec::new(),
        }
    }

    /// Offer `func` under `name`.
    ///
    /// The reply starts as `R::default()`, so maps and sequences start empty.
    /// An `Err(e)` return reaches the caller as `e.to_string()`.
    pub fn add<A, R, E, F>(&mut self, name: &str, func: F) -> &mut Self
    where
        F: Fn(&S, A, &mut R) -> std::result::Result<(), E> + Send + Sync + 'static,
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Default + Send + 'static,
        E: Display + 'static,
    {
        let func = Arc::new(func);
        self.candidates.push(Candidate {
            name: name.to_string(),
            arg_type: type_name::<A>(),
            reply_type: type_name::<R>(),
            bind: Box::new(move |receiver: Arc<S>| -> Box<dyn Invoke> {
                Box::new(TypedMethod::<S, F, A, R, E> {
                    receiver,
                    func,
                    _phantom: PhantomData,
                })
            }),
        });
        self
    }

    pub(crate) fn into_candidates(self) -> Vec<Candidate<S>> {
        self.candidates
    }
}

/// A registered method: type shapes, call counter and invocation entry.
pub struct MethodDescriptor {
    name: String,
    arg_type: &'static str,
    reply_type: &'static str,
    num_calls: AtomicU64,
    method: Box<dyn Invoke>,
}

impl MethodDescriptor {
    pub(crate) fn new(
        name: String,
        arg_type: &'static str,
        reply_type: &'static str,
        method: Box<dyn Invoke>,
    ) -> Self {
        Self {
            name,
            arg_type,
            reply_type,
            num_calls: AtomicU64::new(0),
            method,
        }
    }

    /// Method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Argument type name.
    pub fn arg_type(&self) -> &'static str {
        self.arg_type
    }

    /// Reply type name.
    pub fn reply_type(&self) -> &'static str {
        self.reply_type
    }

    /// Number of invocations so far.
    pub fn num_calls(&self) -> u64 {
        self.num_calls.load(Ordering::Relaxed)
    }

    /// Decode a request body into a fresh argument value.
    pub fn decode_argv(&self, format: Format, body: &[u8]) -> Result<Argv> {
        self.method.decode_argv(format, body)
    }

    /// A zero reply value.
    pub fn new_replyv(&self) -> Box<dyn ReplyValue> {
        self.method.new_replyv()
    }

    pub(crate) fn invoke(
        &self,
        argv: Argv,
        replyv: &mut dyn ReplyValue,
    ) -> std::result::Result<(), String> {
        self.num_calls.fetch_add(1, Ordering::Relaxed);
        self.method.invoke(argv, replyv)
    }
}

impl std::fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("arg_type", &self.arg_type)
            .field("reply_type", &self.reply_type)
            .field("num_calls", &self.num_calls())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Counter {
        base: i64,
    }

    fn bind_one<A, R, E, F>(func: F) -> MethodDescriptor
    where
        F: Fn(&Counter, A, &mut R) -> std::result::Result<(), E> + Send + Sync + 'static,
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Default + Send + 'static,
        E: Display + 'static,
    {
        let mut set = MethodSet::new();
        set.add("M", func);
        let candidate = set.into_candidates().remove(0);
        let method = (candidate.bind)(Arc::new(Counter { base: 10 }));
        MethodDescriptor::new(candidate.name, candidate.arg_type, candidate.reply_type, method)
    }

    #[test]
    fn test_invoke_fills_reply_and_counts() {
        let method = bind_one(|c: &Counter, n: i64, reply: &mut i64| -> std::result::Result<(), String> {
            *reply = c.base + n;
            Ok(())
        });

        let argv = method
            .decode_argv(Format::MsgPack, &Format::MsgPack.encode(&5i64).unwrap())
            .unwrap();
        let mut replyv = method.new_replyv();
        method.invoke(argv, &mut *replyv).unwrap();

        let encoded = replyv.encode(Format::Json).unwrap();
        assert_eq!(encoded, b"15");
        assert_eq!(method.num_calls(), 1);
        assert_eq!(method.arg_type(), "i64");
    }

    #[test]
    fn test_error_text_is_verbatim() {
        let method = bind_one(|_: &Counter, _: (), _: &mut i64| Err("divide by zero"));

        let mut replyv = method.new_replyv();
        let err = method.invoke(Box::new(()), &mut *replyv).unwrap_err();
        assert_eq!(err, "divide by zero");
    }

    #[test]
    fn test_container_reply_starts_empty() {
        let method = bind_one(|_: &Counter, _: (), _: &mut HashMap<String, i32>| -> std::result::Result<(), String> {
            Ok(())
        });

        let replyv = method.new_replyv();
        assert_eq!(replyv.encode(Format::Json).unwrap(), b"{}");
    }

    #[test]
    fn test_wrong_argument_type_is_reported() {
        let method = bind_one(|_: &Counter, _: i64, _: &mut i64| -> std::result::Result<(), String> {
            Ok(())
        });

        let mut replyv = method.new_replyv();
        let err = method.invoke(Box::new("text"), &mut *replyv).unwrap_err();
        assert!(err.contains("argument is not i64"));
    }

    #[test]
    fn test_undecodable_argument() {
        let method = bind_one(|_: &Counter, _: i64, _: &mut i64| -> std::result::Result<(), String> {
            Ok(())
        });
        assert!(method.decode_argv(Format::Json, b"\"nope\"").is_err());
    }
}
