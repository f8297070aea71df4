//! Typed broadcast-with-replay reference, replacing the reactive-streams
//! `Subject`/`ReplaySubject` pattern the source leans on (§9 redesign note:
//! "Shared mutable observables... replace with a typed SharedReference<T>").

use tokio::sync::watch;

/// A shared, observable value. `subscribe` replays the current value to new
/// subscribers (like a `ReplaySubject(1)`), then streams updates.
#[derive(Debug)]
pub struct SharedReference<T> {
    tx: watch::Sender<T>,
}

/// A live subscription to a [`SharedReference`]. Drop to unsubscribe.
pub struct Subscription<T> {
    rx: watch::Receiver<T>,
}

impl<T: Clone> SharedReference<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn set(&self, value: T) {
        // A closed receiver set (no subscribers) is not an error here: the
        // value is still observable to any subscriber that attaches later.
        let _ = self.tx.send(value);
    }

    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Mark this reference as finished; existing subscriptions observe the
    /// final value but further `changed()` calls return immediately with no
    /// new value (the sender side is dropped by design when the owner drops
    /// the `SharedReference`, so `finish` is a no-op placeholder kept for
    /// symmetry with the source's `finish()` semantics).
    pub fn finish(self) {
        drop(self);
    }
}

impl<T: Clone> Subscription<T> {
    /// Current value without waiting for a change.
    pub fn get(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Wait for the next update and return it. Returns `None` if the
    /// `SharedReference` was dropped (the stream finished).
    pub async fn next(&mut self) -> Option<T> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow().clone())
    }
}

impl<T: Clone> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_replays_current_value() {
        let shared = SharedReference::new(1);
        let mut sub = shared.subscribe();
        assert_eq!(sub.get(), 1);
        shared.set(2);
        assert_eq!(sub.next().await, Some(2));
    }

    #[tokio::test]
    async fn next_returns_none_after_drop() {
        let shared = SharedReference::new(0);
        let mut sub = shared.subscribe();
        drop(shared);
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn late_subscriber_sees_latest_value() {
        let shared = SharedReference::new("a");
        shared.set("b");
        let sub = shared.subscribe();
        assert_eq!(sub.get(), "b");
    }
}
