//! Scripting callbacks.
//!
//! The dispatcher notifies a [`ScriptHooks`] implementation at fixed
//! lifecycle points. Calls are synchronous and must not block.

use crate::session::SlotId;
use log::{debug, info};
use shared::PluginManifest;

pub trait ScriptHooks: Send + Sync {
    fn on_server_init(&mut self) {}

    fn on_server_post_init(&mut self) {}

    fn on_server_exit(&mut self, _restarting: bool) {}

    /// Returning false rejects the player.
    fn on_player_connect(&mut self, _slot: SlotId) -> bool {
        true
    }

    fn on_player_disconnect(&mut self, _slot: SlotId) {}

    fn on_gui_action(&mut self, _slot: SlotId, _box_id: i32, _data: &str) {}

    /// Field `field` of plugin `id`: 0 is the name, 1.. are accepted hashes.
    /// None or an empty string ends the enumeration.
    fn on_request_plugin_list(&mut self, _id: usize, _field: usize) -> Option<String> {
        None
    }

    fn on_mp_num_increment(&mut self, _value: u32) {}
}

/// Hooks that serve the plugin manifest from configuration and log the rest.
#[derive(Debug, Default)]
pub struct ConfigHooks {
    manifest: PluginManifest,
}

impl ConfigHooks {
    pub fn new(manifest: PluginManifest) -> Self {
        Self { manifest }
    }
}

impl ScriptHooks for ConfigHooks {
    fn on_server_init(&mut self) {
        info!("Server init, {} plugins configured", self.manifest.len());
    }

    fn on_server_exit(&mut self, restarting: bool) {
        info!("Server exit (restarting: {})", restarting);
    }

    fn on_player_connect(&mut self, slot: SlotId) -> bool {
        info!("Player {} connected", slot);
        true
    }

    fn on_player_disconnect(&mut self, slot: SlotId) {
        info!("Player {} disconnected", slot);
    }

    fn on_gui_action(&mut self, slot: SlotId, box_id: i32, data: &str) {
        debug!("Player {} answered message box {}: {:?}", slot, box_id, data);
    }

    fn on_request_plugin_list(&mut self, id: usize, field: usize) -> Option<String> {
        let entry = self.manifest.entries.get(id)?;
        match field {
            0 => Some(entry.name.clone()),
            n => entry.hashes.get(n - 1).map(|hash| hash.to_string()),
        }
    }

    fn on_mp_num_increment(&mut self, value: u32) {
        debug!("mp_num is now {}", value);
    }
}
