//! One handle over the shared state and the components that act on it.

use crate::claim::ClaimArbiter;
use crate::conversation::ResultConversation;
use crate::dispatch::Dispatcher;
use crate::notifier::Notifier;
use crate::store::LeadStore;
use crate::subscribers::SubscriberRegistry;
use std::sync::Arc;

/// Cloneable bundle handed to every adapter (intake endpoint, chat router).
///
/// All clones share one store and one registry for the life of the process.
#[derive(Clone)]
pub struct LeadService {
    store: Arc<LeadStore>,
    registry: Arc<SubscriberRegistry>,
    dispatcher: Dispatcher,
    arbiter: ClaimArbiter,
    conversation: ResultConversation,
}

impl LeadService {
    pub fn new(registry: SubscriberRegistry, notifier: Arc<dyn Notifier>) -> Self {
        let store = Arc::new(LeadStore::new());
        let registry = Arc::new(registry);
        Self {
            dispatcher: Dispatcher::new(
                Arc::clone(&store),
                Arc::clone(&registry),
                Arc::clone(&notifier),
            ),
            arbiter: ClaimArbiter::new(Arc::clone(&store), Arc::clone(&notifier)),
            conversation: ResultConversation::new(Arc::clone(&store), notifier),
            store,
            registry,
        }
    }

    pub fn store(&self) -> &LeadStore {
        &self.store
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn arbiter(&self) -> &ClaimArbiter {
        &self.arbiter
    }

    pub fn conversation(&self) -> &ResultConversation {
        &self.conversation
    }
}
