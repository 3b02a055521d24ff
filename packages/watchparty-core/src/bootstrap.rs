//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. This pattern provides:
//!
//! - **Clarity**: All dependency relationships are visible in one place
//! - **Testability**: Easy to swap implementations for testing
//! - **Maintainability**: Service creation logic is isolated from usage

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::{AppState, WsConnectionManager};
use crate::clock::{Clock, SystemClock};
use crate::error::WatchPartyResult;
use crate::events::{EventEmitter, LoggingEventEmitter};
use crate::services::{PartyService, RoomRegistry};
use crate::state::Config;

/// Container for all bootstrapped services.
///
/// This struct holds all the wired services created during bootstrap.
/// It's consumed by `AppState` to build the final application state.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Process-wide room store.
    pub registry: Arc<RoomRegistry>,
    /// Rooms, membership and host authority.
    pub party: Arc<PartyService>,
    /// Manages WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Validated configuration.
    pub config: Arc<Config>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Builds the API state over these services.
    pub fn app_state(&self) -> AppState {
        AppState {
            party: Arc::clone(&self.party),
            ws_manager: Arc::clone(&self.ws_manager),
            config: Arc::clone(&self.config),
        }
    }

    /// Initiates graceful shutdown of all services.
    ///
    /// Closes every WebSocket; each connection then leaves its room through
    /// the normal departure path, which deletes rooms as they empty.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        // Signal cancellation to the server loop
        self.cancel_token.cancel();

        let connections_closed = self.ws_manager.close_all();
        log::info!(
            "[Bootstrap] Closed {} WebSocket connection(s), {} room(s) open",
            connections_closed,
            self.registry.len()
        );

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps all application services with their dependencies.
///
/// This is the composition root where all services are instantiated and
/// wired together. Uses the system clock and logs party events.
pub fn bootstrap_services(config: Config) -> WatchPartyResult<BootstrappedServices> {
    bootstrap_services_with(config, SystemClock::arc(), Arc::new(LoggingEventEmitter))
}

/// Bootstraps services with an injected clock and event emitter.
///
/// Tests use this to pin time and observe party events. Fails with
/// [`WatchPartyError::Configuration`](crate::error::WatchPartyError::Configuration) if `config` does not validate.
pub fn bootstrap_services_with(
    config: Config,
    clock: Arc<dyn Clock>,
    emitter: Arc<dyn EventEmitter>,
) -> WatchPartyResult<BootstrappedServices> {
    config.validate()?;

    let registry = Arc::new(RoomRegistry::new());
    let party = Arc::new(PartyService::new(
        Arc::clone(&registry),
        clock,
        emitter,
        config.client_queue_capacity,
    ));

    Ok(BootstrappedServices {
        registry,
        party,
        ws_manager: Arc::new(WsConnectionManager::new()),
        config: Arc::new(config),
        cancel_token: CancellationToken::new(),
    })
}
