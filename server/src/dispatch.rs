//! Session-aware packet dispatch.
//!
//! [`Dispatcher`] consumes one transport event at a time and answers through
//! an [`Outbox`]. It owns every piece of relay state: the session registry,
//! the three packet controllers, the scripting hooks, the master client and
//! the actor/world working records. Because every entry point takes
//! `&mut self`, one packet is always handled to completion before the next.

use crate::config::{effective_password, parse_checksum, ServerConfig};
use crate::controller::{ApplyContext, PacketController, Relay};
use crate::handshake::{check_handshake, check_plugins};
use crate::master::MasterClient;
use crate::processors::player::change_frames;
use crate::processors::{actor_controller, player_controller, world_controller, MpNumCounter};
use crate::script::ScriptHooks;
use crate::session::{LoadState, Session, SessionRegistry, SlotId};
use crate::transport::{ConnectionId, EventKind, Outbox, TransportEvent};
use log::{debug, info, warn};
use shared::ids::*;
use shared::records::{ActorList, WorldEvent};
use shared::{
    Datagram, PluginEntry, PluginManifest, ReadStream, ServerInfo, WriteStream,
    DEFAULT_PASSWORD, PROTOCOL_VERSION,
};
use std::collections::HashSet;
use std::net::SocketAddr;

pub struct Dispatcher {
    sessions: SessionRegistry,
    player: PacketController<Session>,
    actor: PacketController<ActorList>,
    world: PacketController<WorldEvent>,
    hooks: Box<dyn ScriptHooks>,
    manifest: PluginManifest,
    /// Connections whose plugin probe passed.
    validated: HashSet<ConnectionId>,
    password: String,
    server_name: String,
    max_connections: usize,
    master: Option<MasterClient>,
    base_actor_list: ActorList,
    base_event: WorldEvent,
    mp_num: MpNumCounter,
}

impl Dispatcher {
    pub fn new(config: &ServerConfig, mut hooks: Box<dyn ScriptHooks>) -> Self {
        hooks.on_server_init();

        Self {
            sessions: SessionRegistry::new(config.max_connections),
            player: player_controller(),
            actor: actor_controller(),
            world: world_controller(),
            hooks,
            manifest: PluginManifest::default(),
            validated: HashSet::new(),
            password: config.effective_password().to_string(),
            server_name: config.server_name.clone(),
            max_connections: config.max_connections,
            master: config
                .master
                .as_ref()
                .map(|master| MasterClient::new(master.addr, master.interval)),
            base_actor_list: ActorList::default(),
            base_event: WorldEvent::default(),
            mp_num: MpNumCounter::default(),
        }
    }

    /// Runs once the server is ready to accept players: loads the plugin
    /// manifest from the hooks and hands it to the master client.
    pub fn post_init(&mut self) {
        self.hooks.on_server_post_init();
        self.manifest = self.plugin_list_sample();

        info!("Server requires {} plugins", self.manifest.len());
        for entry in self.manifest.iter() {
            debug!("- {} {:08X?}", entry.name, entry.hashes);
        }

        if let Some(master) = self.master.as_mut() {
            for (name, hash) in self.manifest.advertised() {
                master.push_plugin_entry(name, hash);
            }
        }
    }

    /// Collects the manifest field by field until the hooks stop answering.
    fn plugin_list_sample(&mut self) -> PluginManifest {
        let mut manifest = PluginManifest::default();

        for id in 0.. {
            let name = match self.hooks.on_request_plugin_list(id, 0) {
                Some(name) if !name.is_empty() => name,
                _ => break,
            };

            let mut hashes = Vec::new();
            for field in 1.. {
                let value = match self.hooks.on_request_plugin_list(id, field) {
                    Some(value) if !value.is_empty() => value,
                    _ => break,
                };
                match parse_checksum(&value) {
                    Ok(hash) => hashes.push(hash),
                    Err(e) => warn!("Ignoring checksum for {}: {}", name, e),
                }
            }

            manifest.push(PluginEntry::new(name, hashes));
        }

        manifest
    }

    pub fn set_server_password(&mut self, password: &str) {
        self.password = effective_password(Some(password)).to_string();
    }

    pub fn is_passworded(&self) -> bool {
        self.password != DEFAULT_PASSWORD
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn session_mut(&mut self, conn: ConnectionId) -> Option<&mut Session> {
        self.sessions.get_mut(conn)
    }

    pub fn session_by_slot_mut(&mut self, slot: SlotId) -> Option<&mut Session> {
        self.sessions.by_slot_mut(slot)
    }

    pub fn is_validated(&self, conn: ConnectionId) -> bool {
        self.validated.contains(&conn)
    }

    pub fn base_actor_list(&self) -> &ActorList {
        &self.base_actor_list
    }

    pub fn base_event(&self) -> &WorldEvent {
        &self.base_event
    }

    pub fn mp_num(&self) -> u32 {
        self.mp_num.current()
    }

    pub fn set_mp_num(&mut self, value: u32) {
        self.mp_num.set(value);
    }

    pub fn increment_mp_num(&mut self) -> u32 {
        self.mp_num.increment(self.hooks.as_mut())
    }

    pub fn has_master(&self) -> bool {
        self.master.is_some()
    }

    pub fn master(&self) -> Option<&MasterClient> {
        self.master.as_ref()
    }

    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.server_name.clone(),
            version: PROTOCOL_VERSION,
            players: self.sessions.handshaked_count() as u32,
            max_players: self.max_connections as u32,
            passworded: self.is_passworded(),
            plugins: self.manifest.advertised(),
        }
    }

    /// Handles master traffic before connection classification. Returns true
    /// if the datagram was consumed.
    pub fn intercept_master(
        &mut self,
        datagram: &Datagram,
        addr: SocketAddr,
        out: &mut Outbox,
    ) -> bool {
        if let Datagram::MasterQuery = datagram {
            debug!("Answering server query from {}", addr);
            out.send_to(addr, Datagram::MasterInfo(self.server_info()));
            return true;
        }

        match self.master.as_mut() {
            Some(master) => master.process(datagram, addr),
            None => false,
        }
    }

    pub fn heartbeat(&mut self, out: &mut Outbox) {
        let mut info = self.server_info();
        info.plugins.clear();
        if let Some(master) = self.master.as_mut() {
            master.send_heartbeat(info, out);
        }
    }

    pub fn update(&mut self, event: TransportEvent, out: &mut Outbox) {
        let TransportEvent { conn, addr, kind } = event;
        match kind {
            EventKind::NewIncomingConnection => {
                info!("A connection is incoming from {} ({})", addr, conn);
            }
            EventKind::NoFreeIncomingConnections => {
                warn!("The server is full, turned away {}", addr);
            }
            EventKind::DisconnectionNotification => {
                info!("Connection {} at {} has disconnected", conn, addr);
                self.disconnect_player(conn, out);
            }
            EventKind::ConnectionLost => {
                info!("Connection {} at {} was lost", conn, addr);
                self.disconnect_player(conn, out);
            }
            EventKind::ConnectedPing => {}
            EventKind::Message(frame) => self.route(conn, &frame, out),
        }
    }

    fn route(&mut self, conn: ConnectionId, frame: &[u8], out: &mut Outbox) {
        let Some(&id) = frame.first() else {
            warn!("Empty frame from {}", conn);
            return;
        };

        if id == ID_GAME_PREINIT {
            if self.sessions.contains(conn) {
                warn!("Plugin probe from {} after its session started, ignoring", conn);
            } else {
                self.handle_preinit(conn, frame, out);
            }
            return;
        }

        if !self.sessions.contains(conn) {
            self.sessions.create(conn);
            info!(
                "New session for {} (first packet {}), requesting handshake",
                conn,
                packet_name(id)
            );
            out.send(conn, WriteStream::request(ID_HANDSHAKE, conn.0));
            return;
        }

        let stream = match ReadStream::new(frame) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Malformed {} from {}: {}", packet_name(id), conn, e);
                return;
            }
        };

        if self.player.contains_packet(id) {
            self.process_player_packet(conn, stream, out);
        } else if self.actor.contains_packet(id) {
            self.process_actor_packet(conn, stream, out);
        } else if self.world.contains_packet(id) {
            self.process_world_packet(conn, stream, out);
        } else {
            warn!("Unhandled packet with identifier {} from {}", id, conn);
        }
    }

    fn handle_preinit(&mut self, conn: ConnectionId, frame: &[u8], out: &mut Outbox) {
        if self.validated.contains(&conn) {
            warn!("Repeated plugin probe from {}, ignoring", conn);
            return;
        }

        let offered = match ReadStream::new(frame).and_then(|mut stream| stream.read::<PluginManifest>()) {
            Ok(offered) => offered,
            Err(e) => {
                warn!("Malformed plugin probe from {}: {}", conn, e);
                return;
            }
        };

        debug!("{} loads {} plugins", conn, offered.len());
        for entry in offered.iter() {
            debug!("- {:08X?} {}", entry.hashes.first(), entry.name);
        }

        let (reply, compatible) = match check_plugins(&self.manifest, &offered.entries) {
            Ok(()) => {
                info!("{} passed the plugin check", conn);
                self.validated.insert(conn);
                (PluginManifest::default(), true)
            }
            Err(reason) => {
                warn!("{} failed the plugin check: {}", conn, reason);
                (self.manifest.clone(), false)
            }
        };

        let mut stream = WriteStream::new(ID_GAME_PREINIT, conn.0);
        match stream.write(&reply) {
            Ok(()) => out.send(conn, stream.into_bytes()),
            Err(e) => warn!("Could not encode plugin reply for {}: {}", conn, e),
        }

        if !compatible {
            out.close(conn);
        }
    }

    fn process_player_packet(&mut self, conn: ConnectionId, mut stream: ReadStream<'_>, out: &mut Outbox) {
        let id = stream.id();
        let Some(processor) = self.player.get_packet(id) else {
            return;
        };
        let Some(session) = self.sessions.get_mut(conn) else {
            return;
        };

        if id == ID_HANDSHAKE {
            if let Err(e) = processor.decode(session, &mut stream) {
                warn!("Malformed handshake from {}: {}", conn, e);
                self.kick_player(conn, out);
                return;
            }
            match check_handshake(session, &self.password) {
                Ok(()) => match self.sessions.complete_handshake(conn) {
                    Some(slot) => {
                        let name = self.sessions.get(conn).map_or("", |s| s.display_name());
                        info!("{} completed the handshake as {} (slot {})", conn, name, slot);
                    }
                    None => {
                        warn!("No free slot for {}", conn);
                        self.kick_player(conn, out);
                    }
                },
                Err(e) => {
                    warn!("Rejecting handshake from {}: {}", conn, e);
                    self.kick_player(conn, out);
                }
            }
            return;
        }

        if !session.is_handshaked() {
            warn!(
                "{} sent {} before completing the handshake",
                conn,
                packet_name(id)
            );
            return;
        }

        if id == ID_LOADED {
            if !session.advance_load_state(LoadState::Loaded) {
                debug!("Ignoring repeated {} from {}", packet_name(id), conn);
                return;
            }
            let Some(slot) = session.slot() else {
                return;
            };
            if self.hooks.on_player_connect(slot) {
                info!("Player {} ({}) has loaded", slot, conn);
            } else {
                info!("Player {} ({}) was rejected by the connect hook", slot, conn);
                out.send(conn, WriteStream::request(ID_USER_DISCONNECTED, conn.0));
                self.sessions.remove(conn);
                self.validated.remove(&conn);
                out.close(conn);
            }
            return;
        }

        if id == ID_PLAYER_BASEINFO && !session.is_post_loaded() {
            match processor.decode(session, &mut stream) {
                Ok(()) => info!("Received {} about {}", packet_name(id), session.display_name()),
                Err(e) => warn!("Malformed {} from {}: {}", packet_name(id), conn, e),
            }
        }

        match session.load_state() {
            LoadState::NotLoaded => return,
            LoadState::Loaded => {
                session.advance_load_state(LoadState::PostLoaded);
                self.new_player(conn, out);
                return;
            }
            LoadState::PostLoaded => {}
        }

        if let Err(e) = processor.decode(session, &mut stream) {
            warn!("Malformed {} from {}: {}", packet_name(id), conn, e);
            return;
        }

        let mut ctx = ApplyContext {
            sender: conn,
            slot: session.slot(),
            hooks: self.hooks.as_mut(),
            mp_num: &mut self.mp_num,
        };
        let relay = processor.apply(session, &mut ctx);
        if relay == Relay::None {
            return;
        }

        match processor.frame(conn.0, session) {
            Ok(frame) => self.relay(conn, relay, frame, out),
            Err(e) => warn!("Could not encode {} for relay: {}", packet_name(id), e),
        }
    }

    fn process_actor_packet(&mut self, conn: ConnectionId, mut stream: ReadStream<'_>, out: &mut Outbox) {
        if !self.is_in_world(conn) {
            return;
        }
        let id = stream.id();
        let Some(processor) = self.actor.get_packet(id) else {
            return;
        };

        if let Err(e) = processor.decode(&mut self.base_actor_list, &mut stream) {
            warn!("Malformed {} from {}: {}", packet_name(id), conn, e);
            return;
        }

        let mut ctx = ApplyContext {
            sender: conn,
            slot: self.sessions.get(conn).and_then(Session::slot),
            hooks: self.hooks.as_mut(),
            mp_num: &mut self.mp_num,
        };
        let relay = processor.apply(&mut self.base_actor_list, &mut ctx);
        if relay == Relay::None {
            return;
        }

        match processor.frame(conn.0, &self.base_actor_list) {
            Ok(frame) => self.relay(conn, relay, frame, out),
            Err(e) => warn!("Could not encode {} for relay: {}", packet_name(id), e),
        }
    }

    fn process_world_packet(&mut self, conn: ConnectionId, mut stream: ReadStream<'_>, out: &mut Outbox) {
        if !self.is_in_world(conn) {
            return;
        }
        let id = stream.id();
        let Some(processor) = self.world.get_packet(id) else {
            return;
        };

        if let Err(e) = processor.decode(&mut self.base_event, &mut stream) {
            warn!("Malformed {} from {}: {}", packet_name(id), conn, e);
            return;
        }

        let mut ctx = ApplyContext {
            sender: conn,
            slot: self.sessions.get(conn).and_then(Session::slot),
            hooks: self.hooks.as_mut(),
            mp_num: &mut self.mp_num,
        };
        let relay = processor.apply(&mut self.base_event, &mut ctx);
        if relay == Relay::None {
            return;
        }

        match processor.frame(conn.0, &self.base_event) {
            Ok(frame) => self.relay(conn, relay, frame, out),
            Err(e) => warn!("Could not encode {} for relay: {}", packet_name(id), e),
        }
    }

    /// Actor and world traffic is only accepted from fully loaded players.
    fn is_in_world(&self, conn: ConnectionId) -> bool {
        self.sessions
            .get(conn)
            .map_or(false, |session| session.is_handshaked() && session.is_post_loaded())
    }

    fn relay(&self, sender: ConnectionId, relay: Relay, frame: Vec<u8>, out: &mut Outbox) {
        let targets = match relay {
            Relay::None => return,
            Relay::Others => self.sessions.post_loaded(Some(sender)),
            Relay::All => self.sessions.post_loaded(None),
        };

        for target in targets {
            out.send(target, frame.clone());
        }
    }

    /// Exchanges player state between a newly loaded session and everyone
    /// already in the world.
    fn new_player(&self, conn: ConnectionId, out: &mut Outbox) {
        let Some(session) = self.sessions.get(conn) else {
            return;
        };
        let others = self.sessions.post_loaded(Some(conn));
        info!(
            "{} entered the world, syncing with {} other players",
            session.display_name(),
            others.len()
        );

        let own_frames = self.sync_frames(session);
        for other in others {
            for frame in &own_frames {
                out.send(other, frame.clone());
            }
            if let Some(other_session) = self.sessions.get(other) {
                for frame in self.sync_frames(other_session) {
                    out.send(conn, frame);
                }
            }
        }
    }

    fn sync_frames(&self, session: &Session) -> Vec<Vec<u8>> {
        SYNC_PACKETS
            .iter()
            .filter_map(|id| self.player.get_packet(*id))
            .filter_map(|processor| match processor.frame(session.guid().0, session) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    warn!("Could not encode {}: {}", processor.name(), e);
                    None
                }
            })
            .collect()
    }

    /// Sends every post-loaded session its pending server-side changes.
    pub fn flush_changes(&mut self, out: &mut Outbox) {
        for session in self.sessions.iter_mut() {
            if !session.is_post_loaded() || session.outbound.is_empty() {
                continue;
            }
            let conn = session.guid();
            let pending = session.take_outbound();
            match change_frames(conn.0, &pending) {
                Ok(frames) => {
                    for frame in frames {
                        out.send(conn, frame);
                    }
                }
                Err(e) => warn!("Could not encode changes for {}: {}", conn, e),
            }
        }
    }

    /// Tears down a session after the transport lost or closed it.
    pub fn disconnect_player(&mut self, conn: ConnectionId, out: &mut Outbox) {
        self.validated.remove(&conn);

        let Some(session) = self.sessions.get(conn) else {
            return;
        };
        let slot = session.slot();
        let was_in_world = session.is_post_loaded();

        if let Some(slot) = slot {
            self.hooks.on_player_disconnect(slot);
        }

        if was_in_world {
            let frame = WriteStream::request(ID_USER_DISCONNECTED, conn.0);
            for other in self.sessions.post_loaded(Some(conn)) {
                out.send(other, frame.clone());
            }
        }

        self.sessions.remove(conn);
    }

    /// Removes a session and forcibly closes its connection.
    pub fn kick_player(&mut self, conn: ConnectionId, out: &mut Outbox) {
        info!("Kicking {}", conn);
        self.disconnect_player(conn, out);
        out.close(conn);
    }

    /// Kicks every remaining session and notifies the hooks.
    pub fn shutdown(&mut self, out: &mut Outbox) {
        for conn in self.sessions.ids() {
            self.kick_player(conn, out);
        }
        self.hooks.on_server_exit(false);
    }
}
