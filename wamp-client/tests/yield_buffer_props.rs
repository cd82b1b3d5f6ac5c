use proptest::prelude::*;
use serde_json::json;
use wamp_client::runner::{BufferState, Completion, Flush, YieldBuffer};
use wamp_client::{HandlerResult, InvocationResult};

fn plain(n: i64) -> HandlerResult {
    HandlerResult::Value(json!(n))
}

fn args(n: i64) -> InvocationResult {
    InvocationResult::with_args([json!(n)])
}

proptest! {
    #[test]
    fn test_every_value_but_the_last_is_progress(values in prop::collection::vec(any::<i64>(), 0..50)) {
        let mut buffer = YieldBuffer::new();
        let mut flushed = Vec::new();
        for value in &values {
            flushed.extend(buffer.push(plain(*value)));
        }

        let expected: Vec<Flush> = values
            .iter()
            .take(values.len().saturating_sub(1))
            .map(|v| Flush::Progress(args(*v)))
            .collect();
        prop_assert_eq!(flushed, expected);

        match (values.last(), buffer.finish()) {
            (Some(last), Completion::Final(result)) => prop_assert_eq!(result, args(*last)),
            (None, Completion::Empty) => {}
            (last, completion) => prop_assert!(false, "{:?} ended as {:?}", last, completion),
        }
        prop_assert_eq!(buffer.state(), BufferState::Finished);
    }

    #[test]
    fn test_interrupt_answer_is_the_only_final(
        before in prop::collection::vec(any::<i64>(), 1..20),
        answer in any::<i64>(),
        after in prop::collection::vec(any::<i64>(), 0..5),
    ) {
        let mut buffer = YieldBuffer::new();
        let mut progress = 0;
        for value in &before {
            progress += buffer.push(plain(*value)).len();
        }
        prop_assert_eq!(progress, before.len() - 1);

        buffer.interrupt();
        prop_assert_eq!(buffer.push(plain(answer)), vec![Flush::Final(args(answer))]);

        for value in &after {
            prop_assert!(buffer.push(plain(*value)).is_empty());
        }
        prop_assert_eq!(buffer.finish(), Completion::AlreadyFinished);
    }

    #[test]
    fn test_failure_flushes_pending_as_progress(values in prop::collection::vec(any::<i64>(), 0..20)) {
        let mut buffer = YieldBuffer::new();
        for value in &values {
            buffer.push(plain(*value));
        }

        let expected = values.last().map(|v| Flush::Progress(args(*v)));
        prop_assert_eq!(buffer.fail(), expected);
        prop_assert_eq!(buffer.finish(), Completion::AlreadyFinished);
    }
}
