use std::sync::Arc;

use postgate_core::clock::{SharedClock, SystemClock};
use postgate_core::{Dispatcher, Services};
use tracing::info;

use crate::content::MemoryContentStore;
use crate::contrib;
use crate::settings::config::Settings;
use crate::stop_flag;

#[derive(Debug, Clone)]
pub struct AppState {
    pub settings: Settings,
    pub stop_flag: stop_flag::StopFlag,
    pub dispatcher: Dispatcher,
}

pub type SharedAppState = Arc<AppState>;

impl AppState {
    pub async fn new() -> anyhow::Result<SharedAppState> {
        let settings = Settings::new()?;

        let stop_flag = stop_flag::StopFlag::new();
        stop_flag::register_signal_handler(&stop_flag);

        let state = Self::with_clock(settings, Arc::new(SystemClock))?;
        Ok(Arc::new(AppState { stop_flag, ..state }))
    }

    /// State for already loaded settings, without signal handlers.
    pub fn from_settings(settings: Settings) -> anyhow::Result<SharedAppState> {
        Ok(Arc::new(Self::with_clock(settings, Arc::new(SystemClock))?))
    }

    pub fn with_clock(settings: Settings, clock: SharedClock) -> anyhow::Result<AppState> {
        let content = Arc::new(MemoryContentStore::from_settings(&settings.content));
        let services = Services::new(
            settings.api.clone(),
            settings.tenants.clone(),
            content.clone(),
            clock,
        );
        let dispatcher = Dispatcher::new(Arc::new(services), &contrib::registry_builder(content));

        info!(
            tenants = settings.tenants.len(),
            cache = ?settings.api.cache_root,
            "API dispatcher ready"
        );

        Ok(AppState {
            settings,
            stop_flag: stop_flag::StopFlag::new(),
            dispatcher,
        })
    }

    pub async fn new_for_config_only() -> anyhow::Result<SharedAppState> {
        let settings = Settings::new()?;
        Self::from_settings(settings)
    }
}
