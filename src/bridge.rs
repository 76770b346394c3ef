//! Running calls on another execution context and settling promises with
//! their outcome.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{capture, invoke, Callable, Error, IntoCallable, Promise, Value};

const BODY_PANICKED: &str = "promisified call panicked";
const EXECUTOR_PANICKED: &str = "promise executor panicked";

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Settles a promise from inside an executor. The first call made through
/// either the `resolve` or the `reject` function of a promise wins.
pub type SettleFn = Arc<dyn Fn(Value) + Send + Sync>;

/// The concurrent-execution facility the bridge schedules work on.
pub trait Spawn: Send + Sync + 'static {
    fn spawn(&self, job: Job) -> Result<(), Error>;
}

/// Runs each job on a new thread.
#[derive(Debug, Clone, Default)]
pub struct ThreadSpawner {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl ThreadSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }
}

impl Spawn for ThreadSpawner {
    fn spawn(&self, job: Job) -> Result<(), Error> {
        let mut builder = std::thread::Builder::new();
        if let Some(name) = &self.name {
            builder = builder.name(name.clone());
        }
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        builder
            .spawn(job)
            .map(drop)
            .map_err(|err| Error::Spawn(err.to_string()))
    }
}

/// Runs each job on the calling thread before `spawn` returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl Spawn for Inline {
    fn spawn(&self, job: Job) -> Result<(), Error> {
        job();
        Ok(())
    }
}

/// Once-only access to a promise's settlement.
#[derive(Clone)]
struct Resolver {
    promise: Promise,
    done: Arc<AtomicBool>,
}

impl Resolver {
    fn new(promise: Promise) -> Self {
        Self {
            promise,
            done: Arc::new(AtomicBool::new(false)),
        }
    }

    fn claim(&self) -> bool {
        let won = self
            .done
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !won {
            log::debug!("promise already settled, ignoring");
        }
        won
    }

    fn resolve(&self, value: Value) {
        if self.claim() {
            self.promise.fulfill(value);
        }
    }

    fn reject(&self, reason: Value) {
        if self.claim() {
            self.promise.reject(reason);
        }
    }
}

/// Schedules bodies on a [`Spawn`] implementation and routes their outcome
/// into promises.
#[derive(Debug, Clone, Default)]
pub struct Bridge<S = ThreadSpawner> {
    spawner: Arc<S>,
}

impl<S: Spawn> Bridge<S> {
    pub fn new(spawner: S) -> Self {
        Self {
            spawner: Arc::new(spawner),
        }
    }

    /// Wraps `function` so that every call runs it on the spawner and returns a
    /// promise of its outcome.
    ///
    /// # Panics
    ///
    /// Panics with [`Error::NotAFunction`] when given a [`Value`] that is not a
    /// function.
    pub fn promisify<Args, Ret>(&self, function: impl IntoCallable<Args, Ret>) -> Promisified<S> {
        Promisified {
            callable: function.into_callable(),
            spawner: self.spawner.clone(),
        }
    }

    /// Runs `executor(resolve, reject)` on the spawner. A panic in the executor
    /// rejects the promise unless it was already settled.
    pub fn new_promise<F>(&self, executor: F) -> Promise
    where
        F: FnOnce(SettleFn, SettleFn) + Send + 'static,
    {
        let promise = Promise::new();
        let resolver = Resolver::new(promise.clone());
        schedule(self.spawner.as_ref(), resolver.clone(), move || {
            let on_resolve = resolver.clone();
            let resolve: SettleFn = Arc::new(move |value| on_resolve.resolve(value));
            let reject: SettleFn = Arc::new(move |reason| resolver.reject(reason));
            match capture(EXECUTOR_PANICKED, || executor(resolve, reject.clone())) {
                Ok(()) => {}
                Err(failure) => reject(failure),
            }
        });
        promise
    }
}

/// A function returned by [`Bridge::promisify`].
pub struct Promisified<S = ThreadSpawner> {
    callable: Callable,
    spawner: Arc<S>,
}

impl<S: Spawn> Promisified<S> {
    /// Schedules the call and returns its promise, pending until the call
    /// finishes on the spawner.
    pub fn call(&self, args: Vec<Value>) -> Promise {
        let promise = Promise::new();
        let resolver = Resolver::new(promise.clone());
        let callable = self.callable.clone();
        schedule(self.spawner.as_ref(), resolver.clone(), move || {
            match capture(BODY_PANICKED, || invoke(&callable, args)) {
                Ok(dispatch) => match dispatch.into_result() {
                    Ok(value) => resolver.resolve(value),
                    Err(err) => resolver.reject(Value::Failure(err)),
                },
                Err(failure) => resolver.reject(failure),
            }
        });
        promise
    }
}

impl<S> Clone for Promisified<S> {
    fn clone(&self) -> Self {
        Self {
            callable: self.callable.clone(),
            spawner: self.spawner.clone(),
        }
    }
}

fn schedule<S, F>(spawner: &S, resolver: Resolver, body: F)
where
    S: Spawn,
    F: FnOnce() + Send + 'static,
{
    log::trace!("scheduling promise body");
    if let Err(err) = spawner.spawn(Box::new(body)) {
        log::warn!("{err}");
        resolver.reject(Value::Failure(err));
    }
}

/// [`Bridge::promisify`] on a default [`ThreadSpawner`].
pub fn promisify<Args, Ret>(function: impl IntoCallable<Args, Ret>) -> Promisified {
    Bridge::<ThreadSpawner>::default().promisify(function)
}

/// [`Bridge::new_promise`] on a default [`ThreadSpawner`].
pub fn new_promise<F>(executor: F) -> Promise
where
    F: FnOnce(SettleFn, SettleFn) + Send + 'static,
{
    Bridge::<ThreadSpawner>::default().new_promise(executor)
}

/// A promise already fulfilled with `value`.
pub fn resolve(value: impl Into<Value>) -> Promise {
    let promise = Promise::new();
    promise.fulfill(value);
    promise
}

/// A promise already rejected with `reason`.
pub fn reject(reason: impl Into<Value>) -> Promise {
    let promise = Promise::new();
    promise.reject(reason);
    promise
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{values, State};

    struct Refuse;

    impl Spawn for Refuse {
        fn spawn(&self, _job: Job) -> Result<(), Error> {
            Err(Error::Spawn("no workers".into()))
        }
    }

    #[test]
    fn promisify_inline_fulfills_with_the_value() {
        let add = Bridge::new(Inline).promisify(|a: i64, b: i64| a + b);
        let promise = add.call(values![40, 2]);
        assert_eq!(promise.state(), State::Fulfilled);
        assert_eq!(promise.value(), Some(Value::Int(42)));
    }

    #[test]
    fn promisify_inline_rejects_with_the_failure() {
        let fail =
            Bridge::new(Inline).promisify(|| -> Result<i64, Error> { Err(Error::msg("E")) });
        let promise = fail.call(vec![]);
        assert_eq!(promise.state(), State::Rejected);
        assert_eq!(promise.value(), Some(Value::Failure(Error::msg("E"))));
    }

    #[test]
    fn promisify_rejects_on_arity_mismatch() {
        let one = Bridge::new(Inline).promisify(|n: i64| n);
        let promise = one.call(values![1, 2]);
        assert_eq!(
            promise.value(),
            Some(Value::Failure(Error::Arity {
                expected: 1,
                got: 2
            }))
        );
    }

    #[test]
    fn spawn_failures_reject() {
        let promise = Bridge::new(Refuse).promisify(|| 1i64).call(vec![]);
        assert_eq!(promise.state(), State::Rejected);
        assert_eq!(
            promise.value(),
            Some(Value::Failure(Error::Spawn("no workers".into())))
        );
    }

    #[test]
    fn the_first_settlement_wins() {
        let promise = Bridge::new(Inline).new_promise(|resolve, reject| {
            resolve(Value::Int(1));
            reject(Value::Int(2));
            resolve(Value::Int(3));
        });
        assert_eq!(promise.state(), State::Fulfilled);
        assert_eq!(promise.value(), Some(Value::Int(1)));
    }

    #[test]
    fn a_panic_after_settling_is_ignored() {
        let promise = Bridge::new(Inline).new_promise(|resolve, _reject| {
            resolve(Value::from("done"));
            panic!("too late");
        });
        assert_eq!(promise.state(), State::Fulfilled);
        assert_eq!(promise.value(), Some(Value::from("done")));
    }

    #[test]
    fn an_executor_panic_rejects() {
        let promise = Bridge::new(Inline).new_promise(|_resolve, _reject| panic!("nope"));
        assert_eq!(promise.state(), State::Rejected);
        assert_eq!(promise.value(), Some(Value::Failure(Error::Panic("nope".into()))));
    }

    #[test]
    fn thread_spawner_applies_its_name() {
        let (tx, rx) = std::sync::mpsc::channel();
        let spawner = ThreadSpawner::new().name("promise-worker").stack_size(256 * 1024);
        spawner
            .spawn(Box::new(move || {
                let name = std::thread::current().name().map(str::to_owned);
                tx.send(name).unwrap();
            }))
            .unwrap();
        assert_eq!(rx.recv().unwrap().as_deref(), Some("promise-worker"));
    }
}
