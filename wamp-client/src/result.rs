//! Values produced by procedures and received by callers.

use serde::Serialize;
use serde_json::Value;
use wamp_core::msg::ResultMessage;
use wamp_core::{Args, Dict, InvocationError};

/// Positional and keyword payload of a result, with its details.
///
/// On the caller side `details` are the RESULT details. On the callee side
/// they become the YIELD options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvocationResult {
    pub args: Args,
    pub kwargs: Dict,
    pub details: Dict,
}

impl InvocationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_args(args: impl IntoIterator<Item = Value>) -> Self {
        InvocationResult {
            args: args.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// First positional value, the common single-value case.
    pub fn value(&self) -> Option<&Value> {
        self.args.first()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

impl From<ResultMessage> for InvocationResult {
    fn from(msg: ResultMessage) -> Self {
        InvocationResult {
            args: msg.args,
            kwargs: msg.kwargs,
            details: msg.details,
        }
    }
}

/// What a procedure handler hands back to its runner.
///
/// Deferred and blocking handlers return one of these as their final value.
/// Streaming handlers yield a sequence of them; untagged values are buffered
/// one step so the last one can become the final result.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerResult {
    /// No payload.
    Empty,
    /// A single value, sent as `[value]`.
    Value(Value),
    /// An explicit positional and keyword payload.
    Args(Args, Dict),
    /// Sent immediately as a progress result.
    Progress(InvocationResult),
    /// Sent immediately as the final result.
    Final(InvocationResult),
}

impl HandlerResult {
    pub fn value(value: impl Into<Value>) -> Self {
        HandlerResult::Value(value.into())
    }

    pub fn progress(result: InvocationResult) -> Self {
        HandlerResult::Progress(result)
    }

    pub fn final_result(result: InvocationResult) -> Self {
        HandlerResult::Final(result)
    }

    /// Serialize `value` into a single positional argument.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, InvocationError> {
        Ok(HandlerResult::Value(serde_json::to_value(value)?))
    }

    /// Payload to put on the wire, whatever the tag.
    pub fn into_result(self) -> InvocationResult {
        match self {
            HandlerResult::Empty => InvocationResult::new(),
            HandlerResult::Value(value) => InvocationResult::with_args([value]),
            HandlerResult::Args(args, kwargs) => InvocationResult {
                args,
                kwargs,
                details: Dict::new(),
            },
            HandlerResult::Progress(result) | HandlerResult::Final(result) => result,
        }
    }
}

impl From<()> for HandlerResult {
    fn from(_: ()) -> Self {
        HandlerResult::Empty
    }
}

impl From<Value> for HandlerResult {
    fn from(value: Value) -> Self {
        HandlerResult::Value(value)
    }
}

impl<T: Into<HandlerResult>> From<Option<T>> for HandlerResult {
    fn from(value: Option<T>) -> Self {
        value.map_or(HandlerResult::Empty, Into::into)
    }
}

impl From<Args> for HandlerResult {
    fn from(args: Args) -> Self {
        HandlerResult::Args(args, Dict::new())
    }
}

impl From<(Args, Dict)> for HandlerResult {
    fn from((args, kwargs): (Args, Dict)) -> Self {
        HandlerResult::Args(args, kwargs)
    }
}

impl From<InvocationResult> for HandlerResult {
    fn from(result: InvocationResult) -> Self {
        HandlerResult::Final(result)
    }
}

macro_rules! value_conversions {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for HandlerResult {
                fn from(value: $ty) -> Self {
                    HandlerResult::Value(Value::from(value))
                }
            }
        )*
    };
}

value_conversions!(bool, i32, i64, u32, u64, f64, String, &str);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_value_is_wrapped() {
        let result = HandlerResult::from(json!({"sum": 3})).into_result();
        assert_eq!(result.args, vec![json!({"sum": 3})]);
        assert!(result.kwargs.is_empty());
    }

    #[test]
    fn test_unit_and_none_are_empty() {
        assert!(HandlerResult::from(()).into_result().is_empty());
        assert!(HandlerResult::from(None::<i64>).into_result().is_empty());
        assert_eq!(
            HandlerResult::from(Some(5i64)).into_result().args,
            vec![json!(5)]
        );
    }

    #[test]
    fn test_args_tuple_is_not_wrapped() {
        let mut kwargs = Dict::new();
        kwargs.insert("unit".into(), json!("ms"));
        let result = HandlerResult::from((vec![json!(1), json!(2)], kwargs.clone())).into_result();
        assert_eq!(result.args, vec![json!(1), json!(2)]);
        assert_eq!(result.kwargs, kwargs);
    }

    #[test]
    fn test_invocation_result_is_final() {
        let tagged = HandlerResult::from(InvocationResult::new().arg("done"));
        assert!(matches!(tagged, HandlerResult::Final(_)));
    }

    #[test]
    fn test_json_helper() {
        #[derive(Serialize)]
        struct Point {
            x: i32,
            y: i32,
        }

        let result = HandlerResult::json(&Point { x: 1, y: 2 }).unwrap();
        assert_eq!(result, HandlerResult::Value(json!({"x": 1, "y": 2})));
    }
}
