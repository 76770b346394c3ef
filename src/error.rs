//! Failures and panic capture.
//!
//! Every failure in this crate ends up as a promise rejection. Panics raised by
//! caller code are intercepted with [`capture`] and turned into a [`Value`].
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("please supply a function")]
    NotAFunction,
    #[error("expected {expected} arguments, got {got}")]
    Arity { expected: usize, got: usize },
    #[error("argument {index}: expected {expected}, got {got}")]
    ArgumentType {
        index: usize,
        expected: &'static str,
        got: &'static str,
    },
    #[error("expected {expected} outputs, got {got}")]
    Outputs { expected: usize, got: usize },
    #[error("{0}")]
    Message(String),
    #[error("{0}")]
    Panic(String),
    #[error("failed to spawn worker: {0}")]
    Spawn(String),
    #[error("the callback was dropped before it was called")]
    CallbackDropped,
}

impl Error {
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Message(message.into())
    }

    /// Converts any error into a crate failure. An [`Error`] is kept as-is,
    /// anything else keeps only its displayable form.
    pub fn from_failure<E>(err: E) -> Self
    where
        E: std::fmt::Display + 'static,
    {
        match (&err as &dyn Any).downcast_ref::<Error>() {
            Some(err) => err.clone(),
            None => Error::Message(err.to_string()),
        }
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::msg(message)
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Message(message)
    }
}

/// Runs `f`, turning a panic into the value that rejects a promise.
///
/// A panic payload that is an [`Error`] or a [`Value`] is kept; a string payload
/// becomes [`Error::Panic`] with that message; any other payload becomes
/// [`Error::Panic`] carrying `fallback`.
pub fn capture<T, F>(fallback: &str, f: F) -> Result<T, Value>
where
    F: FnOnce() -> T,
{
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let failure = intercepted(payload, fallback);
        log::debug!("captured panic: {failure}");
        failure
    })
}

fn intercepted(payload: Box<dyn Any + Send>, fallback: &str) -> Value {
    let payload = match payload.downcast::<Value>() {
        Ok(value) => return *value,
        Err(payload) => payload,
    };
    let payload = match payload.downcast::<Error>() {
        Ok(err) => return Value::Failure(*err),
        Err(payload) => payload,
    };
    if let Some(msg) = payload.downcast_ref::<&str>() {
        Value::Failure(Error::Panic((*msg).to_string()))
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        Value::Failure(Error::Panic(msg.clone()))
    } else {
        Value::Failure(Error::Panic(fallback.to_string()))
    }
}

/// Raises `value` as a panic. The nearest [`capture`] returns it unchanged.
pub fn throw(value: impl Into<Value>) -> ! {
    panic::panic_any(value.into())
}

/// Raises the failure held by `result`, if any.
pub fn throw_on_error<T, E>(result: Result<T, E>) -> T
where
    E: std::fmt::Display + 'static,
{
    match result {
        Ok(value) => value,
        Err(err) => panic::panic_any(Error::from_failure(err)),
    }
}
