//! Recoverable call failures.
//!
//! Everything here ends up as a single message raised through the runtime
//! (see the `From<CallError> for RuntimeError` impl). Binding defects are not
//! represented: those panic at registration time.

use strap_rt::RuntimeError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error("Wrong number of arguments. Expected {}, got {got}.", expected_count(.min, .max))]
    Arity { min: usize, max: usize, got: usize },

    #[error("Failed reading argument #{position}.")]
    ArgRead { position: usize },

    #[error("None of the overloads are compatible with the given arguments. Last attempt: {last}")]
    NoMatchingOverload { last: Box<CallError> },

    /// Every position was built but no instance accepts the combination, or
    /// (with `partial`) the positions built so far already rule out every
    /// instance. `args` pairs 1-based argument positions with the type each
    /// was built as.
    #[error("{}", overload_listing(.partial, .args))]
    NoOverload {
        partial: bool,
        args: Vec<(usize, &'static str)>,
    },

    #[error("Wrong format of argument #{position}\nBuilder: {builder}\nArgument type: {arg_type}\n")]
    WrongFormat {
        position: usize,
        builder: &'static str,
        arg_type: &'static str,
    },

    #[error("No arguments provided.")]
    NoArguments,

    #[error("The data is already dynamic.")]
    AlreadyDynamic,

    #[error("The data is already marked for baking.")]
    AlreadyPending,

    #[error("The data is already baked.")]
    AlreadyBaked,

    #[error("Baked data of type {0} can't be converted to dynamic data.")]
    NotUnbakeable(String),

    #[error("The data can't be read as {0}.")]
    Unreadable(&'static str),

    #[error("{0}")]
    Custom(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl CallError {
    pub fn msg(message: impl Into<String>) -> Self {
        CallError::Custom(message.into())
    }

    /// True for failures raised before the native function ran, which lets
    /// overload resolution move on to the next candidate.
    pub fn is_mismatch(&self) -> bool {
        matches!(self, CallError::Arity { .. } | CallError::ArgRead { .. })
    }
}

fn expected_count(min: &usize, max: &usize) -> String {
    if min == max {
        min.to_string()
    } else {
        format!("between {min} and {max}")
    }
}

fn overload_listing(partial: &bool, args: &[(usize, &'static str)]) -> String {
    let mut out = if *partial {
        String::from("No overload available for the given partial list of arguments:\n")
    } else {
        String::from("No overload available for the given arguments:\n")
    };
    let mut sorted = args.to_vec();
    sorted.sort_by_key(|(position, _)| *position);
    for (position, type_name) in sorted {
        out.push_str(&format!("#{position} {type_name}\n"));
    }
    out
}

impl From<CallError> for RuntimeError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Runtime(inner) => inner,
            other => RuntimeError::Call(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_messages() {
        let exact = CallError::Arity { min: 2, max: 2, got: 1 };
        assert_eq!(
            exact.to_string(),
            "Wrong number of arguments. Expected 2, got 1."
        );
        let range = CallError::Arity { min: 1, max: 3, got: 0 };
        assert_eq!(
            range.to_string(),
            "Wrong number of arguments. Expected between 1 and 3, got 0."
        );
    }

    #[test]
    fn overload_listing_is_sorted_by_position() {
        let err = CallError::NoOverload {
            partial: true,
            args: vec![(2, "Mat2x3"), (1, "Vec3")],
        };
        assert_eq!(
            err.to_string(),
            "No overload available for the given partial list of arguments:\n#1 Vec3\n#2 Mat2x3\n"
        );
    }

    #[test]
    fn runtime_errors_pass_through_unchanged() {
        let err: RuntimeError = CallError::Runtime(RuntimeError::NotCallable("nil")).into();
        assert_eq!(err, RuntimeError::NotCallable("nil"));
        let err: RuntimeError = CallError::ArgRead { position: 3 }.into();
        assert_eq!(err, RuntimeError::Call("Failed reading argument #3.".into()));
    }

    #[test]
    fn only_pre_invocation_failures_are_mismatches() {
        assert!(CallError::ArgRead { position: 1 }.is_mismatch());
        assert!(CallError::Arity { min: 0, max: 0, got: 1 }.is_mismatch());
        assert!(!CallError::msg("boom").is_mismatch());
    }
}
