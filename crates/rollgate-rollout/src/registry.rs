//! Store client selection by family.

use std::collections::HashMap;
use std::sync::Arc;

use rollgate_state::StoreFamily;
use rollgate_storefront::StoreClient;

/// Maps a rollout's stored [`StoreFamily`] to the client that drives it.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<StoreFamily, Arc<dyn StoreClient>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the client for a family.
    pub fn with(mut self, family: StoreFamily, client: Arc<dyn StoreClient>) -> Self {
        self.clients.insert(family, client);
        self
    }

    pub fn get(&self, family: StoreFamily) -> Option<Arc<dyn StoreClient>> {
        self.clients.get(&family).cloned()
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("families", &self.clients.keys().collect::<Vec<_>>())
            .finish()
    }
}
