//! Integration tests for the Store runtime: effect execution, action
//! feedback and broadcasting.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

use std::time::Duration;
use tablebook_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use tablebook_runtime::{RuntimeError, Store};

#[derive(Debug, Clone, PartialEq)]
enum CountAction {
    Increment,
    IncrementLater { after_ms: u64 },
    Incremented { value: u32 },
    RunInOrder,
    Record { step: u32 },
    Fork,
}

#[derive(Debug, Clone, Default)]
struct CountState {
    counter: u32,
    steps: Vec<u32>,
}

#[derive(Clone)]
struct CountReducer;

impl Reducer for CountReducer {
    type State = CountState;
    type Action = CountAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            CountAction::Increment => {
                state.counter += 1;
                let value = state.counter;
                smallvec![Effect::future(async move {
                    Some(CountAction::Incremented { value })
                })]
            },
            CountAction::IncrementLater { after_ms } => smallvec![Effect::Delay {
                duration: Duration::from_millis(after_ms),
                action: Box::new(CountAction::Increment),
            }],
            CountAction::RunInOrder => smallvec![Effect::chain(
                (1..=3)
                    .map(|step| {
                        Effect::future(async move {
                            tokio::time::sleep(Duration::from_millis(u64::from(4 - step))).await;
                            Some(CountAction::Record { step })
                        })
                    })
                    .collect()
            )],
            CountAction::Record { step } => {
                state.steps.push(step);
                SmallVec::new()
            },
            CountAction::Fork => smallvec![Effect::merge(vec![
                Effect::future(async { Some(CountAction::Record { step: 10 }) }),
                Effect::future(async { Some(CountAction::Record { step: 20 }) }),
            ])],
            CountAction::Incremented { .. } => SmallVec::new(),
        }
    }
}

fn store() -> Store<CountState, CountAction, (), CountReducer> {
    Store::new(CountState::default(), CountReducer, ())
}

#[tokio::test]
async fn send_runs_the_reducer_before_returning() {
    let store = store();
    store.send(CountAction::Increment).await.unwrap();
    assert_eq!(store.state(|s| s.counter).await, 1);
}

#[tokio::test]
async fn send_and_wait_for_observes_effect_output() {
    let store = store();

    let result = store
        .send_and_wait_for(
            CountAction::Increment,
            |a| matches!(a, CountAction::Incremented { .. }),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(result, CountAction::Incremented { value: 1 });
}

#[tokio::test]
async fn send_and_wait_for_times_out_without_a_match() {
    let store = store();

    let result = store
        .send_and_wait_for(
            CountAction::Record { step: 1 },
            |_| true,
            Duration::from_millis(50),
        )
        .await;

    assert_eq!(result, Err(RuntimeError::Timeout));
}

#[tokio::test]
async fn delayed_actions_are_fed_back() {
    let store = store();
    store
        .send(CountAction::IncrementLater { after_ms: 10 })
        .await
        .unwrap();

    store.settle(Duration::from_secs(1)).await.unwrap();
    assert_eq!(store.state(|s| s.counter).await, 1);
}

#[tokio::test]
async fn sequential_effects_run_in_order() {
    let store = store();
    store.send(CountAction::RunInOrder).await.unwrap();

    store.settle(Duration::from_secs(1)).await.unwrap();
    assert_eq!(store.state(|s| s.steps.clone()).await, vec![1, 2, 3]);
}

#[tokio::test]
async fn parallel_effects_all_complete() {
    let store = store();
    store.send(CountAction::Fork).await.unwrap();

    store.settle(Duration::from_secs(1)).await.unwrap();
    let mut steps = store.state(|s| s.steps.clone()).await;
    steps.sort_unstable();
    assert_eq!(steps, vec![10, 20]);
}

#[tokio::test]
async fn subscribers_see_every_fed_back_action() {
    let store = store();
    let mut rx = store.subscribe_actions();

    store.send(CountAction::Increment).await.unwrap();
    store.send(CountAction::Increment).await.unwrap();

    let mut values = Vec::new();
    for _ in 0..2 {
        if let CountAction::Incremented { value } = rx.recv().await.unwrap() {
            values.push(value);
        }
    }
    values.sort_unstable();
    assert_eq!(values, vec![1, 2]);
}

#[tokio::test]
async fn shutdown_rejects_new_actions() {
    let store = store();
    store.shutdown(Duration::from_secs(1)).await.unwrap();

    let result = store.send(CountAction::Increment).await;
    assert_eq!(result, Err(RuntimeError::ShutdownInProgress));
    assert!(!store.health().status.is_healthy());
}
