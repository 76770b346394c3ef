use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use crate::{capture, Value};

const CONTINUATION_PANICKED: &str = "continuation panicked";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum State {
    #[default]
    Pending,
    Fulfilled,
    Rejected,
}

/// A callback attached with [`Promise::then`] or [`Promise::catch`]. It
/// consumes the settled value and returns the value of the next link; a panic
/// rejects instead.
#[derive(Clone)]
pub struct Continuation(Arc<dyn Fn(Value) -> Value + Send + Sync>);

impl Continuation {
    pub fn new<F, R>(f: F) -> Self
    where
        F: Fn(Value) -> R + Send + Sync + 'static,
        R: Into<Value>,
    {
        Continuation(Arc::new(move |value| f(value).into()))
    }

    fn call(&self, value: Value) -> Value {
        (self.0)(value)
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Continuation")
    }
}

/// A single-consumer promise.
///
/// The handle is cheap to clone; every clone refers to the same promise. A
/// promise holds at most one pair of continuations and at most one child, the
/// promise returned by [`then`](Self::then).
///
/// Settling an already settled promise is allowed and replays the attached
/// continuation against the new value.
///
/// # Examples
///
/// ```
/// use promise_bridge::{Continuation, Promise, State, Value};
///
/// let promise = Promise::new();
/// let child = promise.then(
///     Some(Continuation::new(|v| format!("got {v}"))),
///     None,
/// );
/// promise.fulfill(1);
/// assert_eq!(child.state(), State::Fulfilled);
/// assert_eq!(child.value(), Some(Value::from("got 1")));
/// ```
#[derive(Clone, Default)]
pub struct Promise {
    promise: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    state: State,
    value: Option<Value>,
    on_fulfilled: Option<Continuation>,
    on_rejected: Option<Continuation>,
    child: Option<Promise>,
    // Set while a settlement round runs outside the lock. Requests that arrive
    // meanwhile wait in `backlog`.
    settling: bool,
    backlog: VecDeque<Step>,
    wakers: Vec<Waker>,
}

enum Step {
    Settle(State, Value),
    Replay,
}

impl Promise {
    /// A pending promise with no value, continuations or child.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state. A promise whose continuation is running already
    /// reports the state it was settled with.
    pub fn state(&self) -> State {
        self.lock().state
    }

    /// The stored value, `None` while pending.
    pub fn value(&self) -> Option<Value> {
        self.lock().value.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == State::Pending
    }

    /// Fulfills the promise with `value`, runs the fulfillment continuation if
    /// one is attached and settles the child with the outcome.
    ///
    /// Fulfilling a settled promise is not an error: the new value is stored and
    /// the continuation runs again. A call made while another settlement of the
    /// same promise is running is queued behind it.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_bridge::{Continuation, Promise, State, Value};
    ///
    /// let promise = Promise::new();
    /// let doubled = promise.then(
    ///     Some(Continuation::new(|v| v.to_string().repeat(2))),
    ///     None,
    /// );
    /// promise.fulfill("🍓");
    /// assert_eq!(promise.state(), State::Fulfilled);
    /// assert_eq!(doubled.value(), Some(Value::from("🍓🍓")));
    /// ```
    pub fn fulfill(&self, value: impl Into<Value>) {
        self.settle(Step::Settle(State::Fulfilled, value.into()));
    }

    /// Rejects the promise with `reason`, runs the rejection continuation if one
    /// is attached and settles the child with the outcome. A rejection
    /// continuation that returns normally leaves the promise fulfilled.
    ///
    /// Like [`fulfill`](Self::fulfill), rejecting a settled promise stores the
    /// new reason and replays the continuation.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_bridge::{Promise, State, Value};
    ///
    /// let promise = Promise::new();
    /// let child = promise.catch(|reason| format!("recovered from {reason}"));
    /// promise.reject("💥");
    /// assert_eq!(promise.state(), State::Fulfilled);
    /// assert_eq!(child.value(), Some(Value::from("recovered from 💥")));
    /// ```
    pub fn reject(&self, reason: impl Into<Value>) {
        self.settle(Step::Settle(State::Rejected, reason.into()));
    }

    /// Attaches continuations and returns the child promise.
    ///
    /// Both continuations are replaced, an absent one passes the value through
    /// to the child unchanged. When the promise is already settled the
    /// settlement is replayed right away with the new continuations. The child
    /// is created by the first call and returned by every later one.
    pub fn then(
        &self,
        on_fulfilled: Option<Continuation>,
        on_rejected: Option<Continuation>,
    ) -> Promise {
        let (child, settled) = {
            let mut inner = self.lock();
            inner.on_fulfilled = on_fulfilled;
            inner.on_rejected = on_rejected;
            let child = inner.child.get_or_insert_with(Promise::new).clone();
            (child, inner.state != State::Pending)
        };
        if settled {
            self.settle(Step::Replay);
        }
        child
    }

    pub fn catch<F, R>(&self, on_rejected: F) -> Promise
    where
        F: Fn(Value) -> R + Send + Sync + 'static,
        R: Into<Value>,
    {
        self.then(None, Some(Continuation::new(on_rejected)))
    }

    /// A future that completes once the promise is settled and no settlement
    /// round is running.
    pub fn settled(&self) -> Settled {
        Settled {
            promise: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Continuations never run under the lock, a poisoned guard still holds
        // consistent fields.
        self.promise.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, step: Step) {
        {
            let mut inner = self.lock();
            if inner.settling {
                log::trace!("settlement already running, queueing");
                inner.backlog.push_back(step);
                return;
            }
            inner.settling = true;
        }
        let mut next = Some(step);
        let mut wakers = Vec::new();
        while let Some(step) = next {
            self.run(step);
            let mut inner = self.lock();
            next = inner.backlog.pop_front();
            if next.is_none() {
                inner.settling = false;
                wakers = std::mem::take(&mut inner.wakers);
            }
        }
        for waker in wakers {
            waker.wake();
        }
    }

    fn run(&self, step: Step) {
        let (continuation, input) = {
            let mut inner = self.lock();
            if let Step::Settle(state, value) = step {
                inner.state = state;
                inner.value = Some(value);
            }
            let continuation = match inner.state {
                State::Pending => return,
                State::Fulfilled => inner.on_fulfilled.clone(),
                State::Rejected => inner.on_rejected.clone(),
            };
            log::trace!(
                "settled {:?}, continuation attached: {}",
                inner.state,
                continuation.is_some()
            );
            (continuation, inner.value.clone().unwrap_or_default())
        };

        if let Some(continuation) = continuation {
            let (state, value) = match capture(CONTINUATION_PANICKED, || continuation.call(input)) {
                Ok(value) => (State::Fulfilled, value),
                Err(failure) => (State::Rejected, failure),
            };
            let mut inner = self.lock();
            inner.state = state;
            inner.value = Some(value);
        }

        let (child, state, value) = {
            let inner = self.lock();
            if !inner.backlog.is_empty() {
                // A newer settlement is queued and propagates in its own round.
                return;
            }
            (
                inner.child.clone(),
                inner.state,
                inner.value.clone().unwrap_or_default(),
            )
        };
        if let Some(child) = child {
            child.settle(Step::Settle(state, value));
        }
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Promise")
            .field("state", &inner.state)
            .field("value", &inner.value)
            .field("has_child", &inner.child.is_some())
            .finish_non_exhaustive()
    }
}

/// Completes with `Ok(value)` when the promise is fulfilled and `Err(reason)`
/// when it is rejected.
#[derive(Debug)]
pub struct Settled {
    promise: Promise,
}

impl Future for Settled {
    type Output = Result<Value, Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut promise = self.promise.lock();
        if promise.settling {
            promise.wakers.push(cx.waker().clone());
            return Poll::Pending;
        }
        let value = promise.value.clone().unwrap_or_default();
        match promise.state {
            State::Pending => {
                promise.wakers.push(cx.waker().clone());
                Poll::Pending
            }
            State::Fulfilled => Poll::Ready(Ok(value)),
            State::Rejected => Poll::Ready(Err(value)),
        }
    }
}
