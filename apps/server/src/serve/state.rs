//! Shared server state.

use std::sync::Arc;

use kybcheck_core::JobQueue;
use kybcheck_registry::RegistryClient;
use kybcheck_storage::JobStore;

/// State shared by all handlers. Handlers read the store and submit to
/// the queue; only the pipeline worker writes job state.
pub(crate) struct AppState {
    pub store: Arc<JobStore>,
    pub queue: JobQueue,
    pub registry: RegistryClient,
}
