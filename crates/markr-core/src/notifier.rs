//! Change notification
//!
//! A single broadcast slot shared by everything that renders bookmark state.
//! Notifications are level-triggered: a subscriber is told *that* the store
//! changed and receives a read-only borrow of the current document to re-read
//! from. It never receives a description of what changed.

use crate::models::BookmarkStoreRoot;

/// Callback invoked after every store mutation
pub type Subscriber = Box<dyn FnMut(&BookmarkStoreRoot)>;

/// Handle returned by [`ChangeNotifier::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Fans store changes out to subscribers in registration order
#[derive(Default)]
pub struct ChangeNotifier {
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_id: u64,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a notifier with subscribers wired in up front
    pub fn with_subscribers(subscribers: impl IntoIterator<Item = Subscriber>) -> Self {
        let mut notifier = Self::new();
        for subscriber in subscribers {
            notifier.subscribe(subscriber);
        }
        notifier
    }

    /// Register a subscriber; it runs after every earlier registration
    pub fn subscribe(&mut self, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, subscriber));
        id
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Invoke every subscriber synchronously
    pub fn fire(&mut self, root: &BookmarkStoreRoot) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber(root);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
