//! Shared server state.

use portico_core::{PorticoConfig, SharedClock};
use portico_tickets::{
    ReplayGuard, StaticCredentials, StaticEntitlements, TicketIssuer, TicketSigner,
    TicketValidator,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// The ticket gate in front of one plugin's assets.
#[derive(Debug, Clone)]
pub struct PluginGate {
    pub validator: TicketValidator,
    pub asset_dir: PathBuf,
}

#[derive(Clone)]
pub struct ApiState {
    pub issuer: TicketIssuer,
    pub gates: Arc<HashMap<String, PluginGate>>,
    /// Shared by every gate; purged periodically by the server.
    pub replay: Option<Arc<ReplayGuard>>,
    pub clock: SharedClock,
}

impl ApiState {
    /// Build the issuer from the static `[auth]` tables and one gate per
    /// plugin with an `asset_dir`.
    pub fn from_config(config: &PorticoConfig, signer: Arc<TicketSigner>, clock: SharedClock) -> Self {
        let issuer = TicketIssuer::new(
            signer.clone(),
            clock.clone(),
            Arc::new(StaticCredentials::from_map(&config.auth.tokens)),
            Arc::new(StaticEntitlements::from_map(&config.auth.entitlements)),
        )
        .with_settings(&config.tickets);

        let base = TicketValidator::from_settings(signer, clock.clone(), &config.tickets);
        let replay = base.replay_guard().cloned();

        let gates = config
            .plugins
            .iter()
            .filter_map(|(id, entry)| {
                let asset_dir = entry.asset_dir.clone()?;
                Some((
                    id.clone(),
                    PluginGate {
                        validator: base.clone().for_plugin(id.clone()),
                        asset_dir,
                    },
                ))
            })
            .collect();

        Self {
            issuer,
            gates: Arc::new(gates),
            replay,
            clock,
        }
    }

    pub fn gate(&self, plugin_id: &str) -> Option<&PluginGate> {
        self.gates.get(plugin_id)
    }
}
