//! Handles on the external collaborators shared by every component.

use std::fmt;
use std::sync::Arc;

use crate::core::{DocumentStore, Hub};

/// Document store and notification hub used by the core.
#[derive(Clone)]
pub struct Services {
    /// Durable storage of job records.
    pub store: Arc<dyn DocumentStore>,
    /// Mutation notifications.
    pub hub: Arc<dyn Hub>,
}

impl Services {
    /// Bundle a store and a hub.
    pub fn new(store: Arc<dyn DocumentStore>, hub: Arc<dyn Hub>) -> Self {
        Self { store, hub }
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
