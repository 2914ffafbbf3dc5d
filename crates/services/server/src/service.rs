use common::{Repository, config::Config};

/// Shared handle backing every RPC. Cloning is cheap; each request operates
/// on its own clone and there is no cross-request state beyond the
/// repository root itself.
#[derive(Clone)]
pub struct Service {
    repository: Repository,
}

impl Service {
    pub fn new(config: &Config) -> Self {
        Self {
            repository: config.repository.clone(),
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }
}
