use std::sync::Arc;

use turnstile_core::{
    Authenticator, Config, RedemptionService, SanitizedConfig, ScanLogStore, TicketStore,
};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    ticket_store: Arc<dyn TicketStore>,
    scan_log: Arc<dyn ScanLogStore>,
    redemption: RedemptionService,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        ticket_store: Arc<dyn TicketStore>,
        scan_log: Arc<dyn ScanLogStore>,
        redemption: RedemptionService,
    ) -> Self {
        Self {
            config,
            authenticator,
            ticket_store,
            scan_log,
            redemption,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn ticket_store(&self) -> &dyn TicketStore {
        self.ticket_store.as_ref()
    }

    pub fn scan_log(&self) -> &dyn ScanLogStore {
        self.scan_log.as_ref()
    }

    pub fn redemption(&self) -> &RedemptionService {
        &self.redemption
    }
}
