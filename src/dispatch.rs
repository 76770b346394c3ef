//! Uniform invocation of functions of any arity.
//!
//! A typed Rust function is wrapped once, through [`IntoCallable`], into a
//! [`Callable`]: a `Vec<Value> -> Vec<Value>` function plus the [`Signature`]
//! it declared. [`invoke`] then calls it and splits the outputs into a
//! normalized value and an optional failure.
use std::fmt;
use std::panic::panic_any;
use std::sync::Arc;

use crate::{Error, FromValue, Value};

/// The declared shape of a callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    arity: usize,
    outputs: usize,
    failure_slot: bool,
}

impl Signature {
    pub const fn new(arity: usize, outputs: usize) -> Self {
        Self {
            arity,
            outputs,
            failure_slot: false,
        }
    }

    /// Appends a failure output after the declared values.
    pub const fn with_failure_slot(self) -> Self {
        if self.failure_slot {
            return self;
        }
        Self {
            arity: self.arity,
            outputs: self.outputs + 1,
            failure_slot: true,
        }
    }

    pub const fn arity(&self) -> usize {
        self.arity
    }

    /// Number of outputs, the failure slot included.
    pub const fn outputs(&self) -> usize {
        self.outputs
    }

    pub const fn failure_slot(&self) -> bool {
        self.failure_slot
    }
}

type RawFn = dyn Fn(Vec<Value>) -> Vec<Value> + Send + Sync;

#[derive(Clone)]
pub struct Callable {
    signature: Signature,
    function: Arc<RawFn>,
}

impl Callable {
    /// Wraps an already erased function. When `signature` has a failure slot,
    /// the last output of `function` must be nil or a failure.
    pub fn new<F>(signature: Signature, function: F) -> Self
    where
        F: Fn(Vec<Value>) -> Vec<Value> + Send + Sync + 'static,
    {
        Self {
            signature,
            function: Arc::new(function),
        }
    }

    /// Extracts the callable held by `value`.
    ///
    /// # Panics
    ///
    /// Panics with [`Error::NotAFunction`] when `value` is not a function.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Function(callable) => callable,
            _ => panic_any(Error::NotAFunction),
        }
    }

    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Calls the function with positional arguments and returns its raw outputs.
    ///
    /// # Panics
    ///
    /// Panics with [`Error::Arity`] or [`Error::ArgumentType`] when the
    /// arguments do not match the signature, and with [`Error::Outputs`] when
    /// the function returns a different number of outputs than it declared.
    pub fn call(&self, args: Vec<Value>) -> Vec<Value> {
        if args.len() != self.signature.arity {
            panic_any(Error::Arity {
                expected: self.signature.arity,
                got: args.len(),
            });
        }
        let outputs = (self.function)(args);
        if outputs.len() != self.signature.outputs {
            panic_any(Error::Outputs {
                expected: self.signature.outputs,
                got: outputs.len(),
            });
        }
        outputs
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.function, &other.function)
    }
}

/// The outputs of a call once the failure slot is removed.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Nil,
    Single(Value),
    Many(Vec<Value>),
}

impl Normalized {
    pub fn into_value(self) -> Value {
        match self {
            Normalized::Nil => Value::Nil,
            Normalized::Single(value) => value,
            Normalized::Many(values) => Value::List(values),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub value: Normalized,
    pub failure: Option<Error>,
}

impl Dispatch {
    /// The failure wins over the value.
    pub fn into_result(self) -> Result<Value, Error> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.value.into_value()),
        }
    }
}

/// Calls `callable` and normalizes what it returned.
pub fn invoke(callable: &Callable, args: Vec<Value>) -> Dispatch {
    let outputs = callable.call(args);
    split_results(outputs, callable.signature().failure_slot())
}

/// Splits raw outputs into a normalized value and the failure held in the last
/// output, when `failure_slot` is set.
pub fn split_results(mut outputs: Vec<Value>, failure_slot: bool) -> Dispatch {
    let failure = if failure_slot {
        outputs.pop().and_then(Value::into_failure)
    } else {
        None
    };
    let value = match outputs.len() {
        0 => Normalized::Nil,
        1 => Normalized::Single(outputs.remove(0)),
        _ => Normalized::Many(outputs),
    };
    Dispatch { value, failure }
}

/// Plain return values of a wrapped function.
pub trait IntoValues {
    const COUNT: usize;

    fn into_values(self) -> Vec<Value>;
}

impl IntoValues for () {
    const COUNT: usize = 0;

    fn into_values(self) -> Vec<Value> {
        Vec::new()
    }
}

macro_rules! impl_into_values_single {
    ($($ty:ty),*) => {
        $(
            impl IntoValues for $ty {
                const COUNT: usize = 1;

                fn into_values(self) -> Vec<Value> {
                    vec![Value::from(self)]
                }
            }
        )*
    };
}

impl_into_values_single!(bool, i32, i64, u32, f64, String, &'static str, Value, Callable);

impl<T: Into<Value>> IntoValues for Vec<T> {
    const COUNT: usize = 1;

    fn into_values(self) -> Vec<Value> {
        vec![Value::from(self)]
    }
}

impl<T: Into<Value>> IntoValues for Option<T> {
    const COUNT: usize = 1;

    fn into_values(self) -> Vec<Value> {
        vec![Value::from(self)]
    }
}

macro_rules! impl_into_values_tuple {
    ($count:literal; $($name:ident),*) => {
        impl<$($name: Into<Value>),*> IntoValues for ($($name,)*) {
            const COUNT: usize = $count;

            #[allow(non_snake_case)]
            fn into_values(self) -> Vec<Value> {
                let ($($name,)*) = self;
                vec![$($name.into()),*]
            }
        }
    };
}

impl_into_values_tuple!(2; A, B);
impl_into_values_tuple!(3; A, B, C);
impl_into_values_tuple!(4; A, B, C, D);

/// The return type of a wrapped function. A `Result` declares a failure slot.
pub trait Returns {
    const OUTPUTS: usize;
    const FAILURE_SLOT: bool;

    fn into_outputs(self) -> Vec<Value>;
}

impl<T: IntoValues> Returns for T {
    const OUTPUTS: usize = T::COUNT;
    const FAILURE_SLOT: bool = false;

    fn into_outputs(self) -> Vec<Value> {
        self.into_values()
    }
}

impl<T, E> Returns for Result<T, E>
where
    T: IntoValues,
    E: fmt::Display + 'static,
{
    const OUTPUTS: usize = T::COUNT;
    const FAILURE_SLOT: bool = true;

    fn into_outputs(self) -> Vec<Value> {
        match self {
            Ok(values) => {
                let mut outputs = values.into_values();
                outputs.push(Value::Nil);
                outputs
            }
            Err(err) => {
                let mut outputs = vec![Value::Nil; T::COUNT];
                outputs.push(Value::Failure(Error::from_failure(err)));
                outputs
            }
        }
    }
}

/// Marker for values that are already dynamically typed.
pub struct Dynamic;

/// Anything that can be erased into a [`Callable`].
pub trait IntoCallable<Args, Ret> {
    fn into_callable(self) -> Callable;
}

impl IntoCallable<Dynamic, Dynamic> for Callable {
    fn into_callable(self) -> Callable {
        self
    }
}

/// # Panics
///
/// Panics with [`Error::NotAFunction`] when the value is not a function.
impl IntoCallable<Dynamic, Dynamic> for Value {
    fn into_callable(self) -> Callable {
        Callable::from_value(self)
    }
}

fn argument<T: FromValue>(value: Option<Value>, index: usize) -> T {
    match T::from_value(value.unwrap_or_default()) {
        Ok(arg) => arg,
        Err(other) => panic_any(Error::ArgumentType {
            index,
            expected: T::EXPECTED,
            got: other.type_name(),
        }),
    }
}

macro_rules! impl_into_callable {
    ($arity:literal $(, $arg:ident)*) => {
        impl<Func, Ret, $($arg,)*> IntoCallable<($($arg,)*), Ret> for Func
        where
            Func: Fn($($arg),*) -> Ret + Send + Sync + 'static,
            Ret: Returns,
            $($arg: FromValue,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
            fn into_callable(self) -> Callable {
                let mut signature = Signature::new($arity, Ret::OUTPUTS);
                if Ret::FAILURE_SLOT {
                    signature = signature.with_failure_slot();
                }
                Callable::new(signature, move |args: Vec<Value>| {
                    let mut args = args.into_iter();
                    let mut index = 0;
                    $(
                        let $arg = argument::<$arg>(args.next(), index);
                        index += 1;
                    )*
                    (self)($($arg),*).into_outputs()
                })
            }
        }
    };
}

impl_into_callable!(0);
impl_into_callable!(1, A);
impl_into_callable!(2, A, B);
impl_into_callable!(3, A, B, C);
impl_into_callable!(4, A, B, C, D);
impl_into_callable!(5, A, B, C, D, E);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{capture, values};

    fn wrap<Args, Ret>(f: impl IntoCallable<Args, Ret>) -> Callable {
        f.into_callable()
    }

    #[test]
    fn wrapping_declares_the_failure_slot() {
        assert_eq!(wrap(|| {}).signature(), Signature::new(0, 0));
        assert_eq!(wrap(|| 0i64).signature(), Signature::new(0, 1));
        assert_eq!(
            wrap(|| -> Result<(), Error> { Ok(()) }).signature(),
            Signature::new(0, 0).with_failure_slot()
        );
        assert_eq!(
            wrap(|_: i64| -> Result<i64, Error> { Ok(1) }).signature(),
            Signature::new(1, 1).with_failure_slot()
        );
        assert!(!wrap(|| (1i64, 2i64)).signature().failure_slot());
    }

    #[test]
    fn no_outputs_normalize_to_nil() {
        let dispatch = invoke(&wrap(|| {}), vec![]);
        assert_eq!(dispatch.value, Normalized::Nil);
        assert_eq!(dispatch.failure, None);
    }

    #[test]
    fn a_value_and_an_empty_failure() {
        let dispatch = invoke(&wrap(|| -> Result<i64, Error> { Ok(3) }), vec![]);
        assert_eq!(dispatch.value, Normalized::Single(Value::Int(3)));
        assert_eq!(dispatch.failure, None);
    }

    #[test]
    fn a_value_and_a_failure_are_both_kept() {
        let callable = Callable::new(Signature::new(0, 1).with_failure_slot(), |_| {
            vec![Value::Int(3), Value::Failure(Error::msg("nope"))]
        });
        let dispatch = invoke(&callable, vec![]);
        assert_eq!(dispatch.value, Normalized::Single(Value::Int(3)));
        assert_eq!(dispatch.failure, Some(Error::msg("nope")));
    }

    #[test]
    fn several_values_become_a_list() {
        let dispatch = invoke(&wrap(|| (1i64, 2i64)), vec![]);
        assert_eq!(dispatch.value, Normalized::Many(values![1, 2]));
        assert_eq!(dispatch.value.into_value(), Value::List(values![1, 2]));
    }

    #[test]
    fn only_a_failure() {
        let dispatch = invoke(&wrap(|| -> Result<(), String> { Err("nope".into()) }), vec![]);
        assert_eq!(dispatch.value, Normalized::Nil);
        assert_eq!(dispatch.failure, Some(Error::msg("nope")));
    }

    #[test]
    fn several_values_and_a_failure() {
        let dispatch = invoke(
            &wrap(|| -> Result<(i64, i64), Error> { Err(Error::msg("nope")) }),
            vec![],
        );
        assert_eq!(dispatch.value, Normalized::Many(vec![Value::Nil, Value::Nil]));
        assert_eq!(dispatch.failure, Some(Error::msg("nope")));
        assert_eq!(dispatch.into_result(), Err(Error::msg("nope")));
    }

    #[test]
    fn arguments_are_positional() {
        let concat = wrap(|a: String, b: String, n: i64| format!("{a}{b}{n}"));
        let dispatch = invoke(&concat, values!["x", "y", 3]);
        assert_eq!(dispatch.into_result(), Ok(Value::from("xy3")));
    }

    #[test]
    fn missing_outputs_break_the_declared_contract() {
        let short = Callable::new(Signature::new(0, 1).with_failure_slot(), |_| {
            vec![Value::Int(3)]
        });
        let failure = capture("fallback", || invoke(&short, vec![])).unwrap_err();
        assert_eq!(
            failure,
            Value::Failure(Error::Outputs {
                expected: 2,
                got: 1
            })
        );

        let long = Callable::new(Signature::new(0, 0), |_| values![1]);
        let failure = capture("fallback", || invoke(&long, vec![])).unwrap_err();
        assert_eq!(
            failure,
            Value::Failure(Error::Outputs {
                expected: 0,
                got: 1
            })
        );
    }

    #[test]
    fn split_without_a_failure_slot_keeps_everything() {
        assert_eq!(split_results(vec![], false).value, Normalized::Nil);
        let dispatch = split_results(values![1, Error::msg("kept")], false);
        assert_eq!(dispatch.failure, None);
        assert_eq!(
            dispatch.value,
            Normalized::Many(vec![Value::Int(1), Value::Failure(Error::msg("kept"))])
        );
    }

    #[test]
    fn split_with_a_failure_slot_and_no_outputs() {
        let dispatch = split_results(vec![], true);
        assert_eq!(dispatch.value, Normalized::Nil);
        assert_eq!(dispatch.failure, None);
    }

    #[test]
    fn arity_mismatch_panics_with_an_error() {
        let callable = wrap(|n: i64| n);
        let failure = capture("fallback", || invoke(&callable, vec![])).unwrap_err();
        assert_eq!(
            failure,
            Value::Failure(Error::Arity {
                expected: 1,
                got: 0
            })
        );
    }

    #[test]
    fn argument_type_mismatch_panics_with_an_error() {
        let callable = wrap(|_: i64, _: bool| {});
        let failure = capture("fallback", || invoke(&callable, values![1, "yes"])).unwrap_err();
        assert_eq!(
            failure,
            Value::Failure(Error::ArgumentType {
                index: 1,
                expected: "bool",
                got: "string"
            })
        );
    }

    #[test]
    fn non_functions_are_refused() {
        let failure = capture("fallback", || Value::Int(0).into_callable()).unwrap_err();
        assert_eq!(failure, Value::Failure(Error::NotAFunction));
        assert_eq!(failure.to_string(), "please supply a function");
    }

    #[test]
    fn function_values_are_accepted() {
        let callable = wrap(|| 1i64);
        let dispatch = invoke(&Value::Function(callable).into_callable(), vec![]);
        assert_eq!(dispatch.into_result(), Ok(Value::Int(1)));
    }
}
