pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod notifications;

use config::Config;

use crate::auth::AuthService;
use crate::db::DynUserStore;
use crate::notifications::NotificationService;

pub struct AppState {
    pub config: Config,
    pub auth: AuthService,
    pub notifier: NotificationService,
}

impl AppState {
    pub fn new(config: Config, store: DynUserStore) -> Self {
        let auth = AuthService::from_config(store, &config.auth);
        let notifier = NotificationService::new(config.telegram.clone());
        Self {
            config,
            auth,
            notifier,
        }
    }
}
