//! Blocking adapters for callback-style APIs.
//!
//! The callback is handed to the API and the calling thread waits on a channel
//! until the API calls it back.
use std::sync::mpsc::channel;

use crate::{Error, Value};

/// Called with `(err, result)`. A nil or `"null"` error means success.
pub type ResultCallback = Box<dyn FnOnce(Value, Value) + Send + 'static>;

/// Called with the error only.
pub type ErrorCallback = Box<dyn FnOnce(Value) + Send + 'static>;

/// Calls `call` with a result callback and waits until that callback fires.
///
/// # Examples
///
/// ```
/// use promise_bridge::{call_with_result_callback, Value};
/// use std::thread;
///
/// let result = call_with_result_callback(|callback| {
///     thread::spawn(move || callback(Value::Nil, Value::from("🍓")));
/// });
/// assert_eq!(result, Ok(Value::from("🍓")));
/// ```
pub fn call_with_result_callback<F>(call: F) -> Result<Value, Error>
where
    F: FnOnce(ResultCallback),
{
    let (sender, receiver) = channel();
    call(Box::new(move |err, result| {
        // The waiting side may be gone already.
        let _ = sender.send((err, result));
    }));
    let (err, result) = receiver.recv().map_err(|_| Error::CallbackDropped)?;
    match err.into_failure() {
        Some(err) => Err(err),
        None => Ok(result),
    }
}

/// Calls `call` with an error callback and waits until that callback fires.
pub fn call_with_error_callback<F>(call: F) -> Result<(), Error>
where
    F: FnOnce(ErrorCallback),
{
    let (sender, receiver) = channel();
    call(Box::new(move |err| {
        let _ = sender.send(err);
    }));
    let err = receiver.recv().map_err(|_| Error::CallbackDropped)?;
    match err.into_failure() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
