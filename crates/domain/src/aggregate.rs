//! Reducer traits shared by the domain state.

use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name, used for logging and metrics labels.
    fn event_type(&self) -> &'static str;
}

/// State that evolves only by applying events.
///
/// Command methods on the implementing type validate input and return the
/// events to apply; `apply` then folds each event into the state.
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Applies an event to the state.
    ///
    /// This method must be pure and deterministic:
    /// - Given the same state and event, it must always produce the same new state
    /// - It must not have side effects
    /// - It must not fail (events represent facts that have happened)
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum CounterEvent {
        Incremented,
        Set { value: i32 },
    }

    impl DomainEvent for CounterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Incremented => "Incremented",
                CounterEvent::Set { .. } => "Set",
            }
        }
    }

    #[derive(Debug, Default)]
    struct Counter {
        value: i32,
    }

    impl Aggregate for Counter {
        type Event = CounterEvent;

        fn apply(&mut self, event: Self::Event) {
            match event {
                CounterEvent::Incremented => self.value += 1,
                CounterEvent::Set { value } => self.value = value,
            }
        }
    }

    #[test]
    fn apply_events_folds_in_order() {
        let mut counter = Counter::default();
        counter.apply_events(vec![
            CounterEvent::Set { value: 40 },
            CounterEvent::Incremented,
            CounterEvent::Incremented,
        ]);
        assert_eq!(counter.value, 42);
    }

    #[test]
    fn event_type_names() {
        assert_eq!(CounterEvent::Incremented.event_type(), "Incremented");
        assert_eq!(CounterEvent::Set { value: 1 }.event_type(), "Set");
    }
}
