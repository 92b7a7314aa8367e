use std::sync::Arc;

use mnema_core::MemoryService;

#[derive(Clone)]
pub struct AppState {
  pub service: Arc<MemoryService>,
}

impl AppState {
  #[must_use]
  pub fn new(service: Arc<MemoryService>) -> Self {
    Self { service }
  }
}
