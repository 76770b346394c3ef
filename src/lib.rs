//! Single-consumer promises and a bridge that runs functions of any shape on
//! another thread and settles a promise with what they returned.
//!
//! # Examples
//!
//! ```
//! use promise_bridge::{promisify, values, Continuation, Error, Value};
//! use futures::executor::block_on;
//!
//! let divide = promisify(|a: i64, b: i64| -> Result<i64, Error> {
//!     if b == 0 {
//!         return Err(Error::msg("division by zero"));
//!     }
//!     Ok(a / b)
//! });
//!
//! let halved = divide.call(values![84, 2]).then(
//!     Some(Continuation::new(|v| v.to_string())),
//!     None,
//! );
//! assert_eq!(block_on(halved.settled()), Ok(Value::from("42")));
//!
//! let failed = divide.call(values![1, 0]);
//! let reason = block_on(failed.settled()).unwrap_err();
//! assert_eq!(reason.to_string(), "division by zero");
//! ```
mod bridge;
mod callback;
mod dispatch;
mod error;
mod promise;
mod value;

pub use bridge::{
    new_promise, promisify, reject, resolve, Bridge, Inline, Job, Promisified, SettleFn, Spawn,
    ThreadSpawner,
};
pub use callback::{
    call_with_error_callback, call_with_result_callback, ErrorCallback, ResultCallback,
};
pub use dispatch::{
    invoke, split_results, Callable, Dispatch, Dynamic, IntoCallable, IntoValues, Normalized,
    Returns, Signature,
};
pub use error::{capture, throw, throw_on_error, Error};
pub use promise::{Continuation, Promise, Settled, State};
pub use value::{FromValue, Value};
