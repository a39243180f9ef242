//! Expansion tests for `#[traced]`
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use postroom_tracing::traced;
use pretty_assertions::assert_eq;
use tracing::field::{Field, Visit};
use tracing_subscriber::{Layer, layer::SubscriberExt};

/// Collects the message of every event it sees.
#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    fn messages(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn exits(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|message| message.starts_with("OnExit"))
            .collect()
    }
}

struct MessageVisitor<'a>(&'a mut Option<String>);

impl Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.0 = Some(format!("{value:?}"));
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for Recorder {
    fn on_event(&self, event: &tracing::Event<'_>, _: tracing_subscriber::layer::Context<'_, S>) {
        let mut message = None;
        event.record(&mut MessageVisitor(&mut message));
        if let Some(message) = message {
            self.0.lock().push(message);
        }
    }
}

fn recorder() -> (Recorder, tracing::subscriber::DefaultGuard) {
    let recorder = Recorder::default();
    let subscriber = tracing_subscriber::registry().with(recorder.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (recorder, guard)
}

#[traced(instrument(level = tracing::Level::TRACE, skip_all), timing(precision = "us"))]
fn first_even(values: &[u32]) -> Option<u32> {
    for value in values {
        if value % 2 == 0 {
            return Some(*value);
        }
    }
    None
}

struct Label {
    text: String,
}

impl Label {
    #[traced(instrument(level = tracing::Level::TRACE, skip(self), fields(label = %self.text)))]
    fn shout(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.text.to_uppercase())
    }
}

#[async_trait]
trait Waiter {
    async fn wait(&self, rounds: usize) -> usize;
}

struct Yielding;

#[async_trait]
impl Waiter for Yielding {
    #[traced(instrument(level = tracing::Level::TRACE, skip_all), timing(precision = "ms"))]
    async fn wait(&self, rounds: usize) -> usize {
        for _ in 0..rounds {
            tokio::task::yield_now().await;
        }
        rounds
    }
}

#[test]
fn test_early_return_emits_exit() {
    let (recorder, _guard) = recorder();

    assert_eq!(first_even(&[1, 3, 4, 5]), Some(4));
    assert_eq!(first_even(&[1, 3]), None);

    let enters = recorder
        .messages()
        .into_iter()
        .filter(|message| message == "OnEnter: first_even")
        .count();
    assert_eq!(enters, 2);

    let exits = recorder.exits();
    assert_eq!(exits.len(), 2);
    assert!(
        exits
            .iter()
            .all(|m| m.starts_with("OnExit: first_even (") && m.ends_with(" us elapsed)"))
    );
}

#[test]
fn test_instrument_fields_borrow_self() {
    let (recorder, _guard) = recorder();

    let label = Label {
        text: "post".to_string(),
    };
    assert_eq!(label.shout("room"), "POSTroom");
    assert_eq!(recorder.exits(), vec!["OnExit: shout".to_string()]);
}

#[tokio::test(flavor = "current_thread")]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_async_trait_exit_waits_for_completion() {
    let (recorder, _guard) = recorder();

    let waiter = Yielding;
    let future = waiter.wait(3);
    assert!(recorder.exits().is_empty());

    assert_eq!(future.await, 3);
    let exits = recorder.exits();
    assert_eq!(exits.len(), 1);
    assert!(exits[0].starts_with("OnExit: wait ("));
}
