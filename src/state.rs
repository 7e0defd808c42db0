use crate::config::Config;
use crate::db::RegistryStore;
use crate::session::SessionStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn RegistryStore>,
    pub config: Arc<Config>,
    pub sessions: Arc<SessionStore>,
}
