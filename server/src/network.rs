//! Server network layer handling UDP communications and the dispatch loop

use crate::config::ServerConfig;
use crate::connection::ConnectionTable;
use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use crate::master::DEFAULT_HEARTBEAT_INTERVAL;
use crate::script::ScriptHooks;
use crate::transport::{timestamp_ms, ConnectionId, EventKind, Outbox, Outgoing, TransportEvent};
use log::{debug, error, info, warn};
use shared::{Datagram, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    DatagramReceived {
        datagram: Datagram,
        addr: SocketAddr,
    },
    ConnectionLost {
        conn: ConnectionId,
        addr: SocketAddr,
    },
}

/// Datagram queued for the sender task
#[derive(Debug)]
pub struct OutboundDatagram {
    pub packet: Datagram,
    pub addr: SocketAddr,
}

/// Cloneable stop switch for a running server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    running: Arc<AtomicBool>,
    exit_code: Arc<AtomicI32>,
}

impl ServerHandle {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            exit_code: Arc::new(AtomicI32::new(0)),
        }
    }

    pub fn stop(&self, exit_code: i32) {
        self.exit_code.store(exit_code, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::SeqCst)
    }
}

/// Snapshot for admin tooling.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerStatus {
    pub connections: usize,
    pub max_connections: usize,
    pub sessions: usize,
    pub pings: Vec<(ConnectionId, Option<f32>)>,
}

/// Main server coordinating networking and dispatch
pub struct Server {
    socket: Arc<UdpSocket>,
    connections: Arc<RwLock<ConnectionTable>>,
    dispatcher: Dispatcher,
    config: ServerConfig,
    handle: ServerHandle,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    send_tx: mpsc::UnboundedSender<OutboundDatagram>,
    send_rx: Option<mpsc::UnboundedReceiver<OutboundDatagram>>,
}

impl Server {
    pub async fn new(config: ServerConfig, hooks: Box<dyn ScriptHooks>) -> Result<Self, ServerError> {
        if config.max_connections == 0 {
            return Err(ServerError::Config("max_connections must be at least 1".to_string()));
        }

        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let mut dispatcher = Dispatcher::new(&config, hooks);
        dispatcher.post_init();

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (send_tx, send_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            connections: Arc::new(RwLock::new(ConnectionTable::new(
                config.max_connections,
                config.connection_timeout,
            ))),
            dispatcher,
            config,
            handle: ServerHandle::new(),
            server_tx,
            server_rx,
            send_tx,
            send_rx: Some(send_rx),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn status(&self) -> ServerStatus {
        let connections = self.connections.read().await;
        ServerStatus {
            connections: connections.len(),
            max_connections: connections.max_connections(),
            sessions: self.dispatcher.sessions().len(),
            pings: connections.pings(),
        }
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match Datagram::decode(&buffer[..len]) {
                        Ok(datagram) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::DatagramReceived { datagram, addr })
                            {
                                error!("Failed to send datagram to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to decode datagram from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that drains the outgoing datagram queue
    fn spawn_network_sender(&mut self) {
        let Some(mut send_rx) = self.send_rx.take() else {
            return;
        };
        let socket = Arc::clone(&self.socket);

        tokio::spawn(async move {
            while let Some(OutboundDatagram { packet, addr }) = send_rx.recv().await {
                if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                    error!("Failed to send datagram to {}: {}", addr, e);
                }
            }
        });
    }

    /// Spawns task that pings connections and reports the silent ones
    fn spawn_liveness_checker(&self) {
        let connections = Arc::clone(&self.connections);
        let server_tx = self.server_tx.clone();
        let send_tx = self.send_tx.clone();
        let ping_interval = self.config.ping_interval;

        tokio::spawn(async move {
            let mut interval = interval(ping_interval);

            loop {
                interval.tick().await;

                let (timed_out, peers) = {
                    let mut connections = connections.write().await;
                    (connections.check_timeouts(), connections.addrs())
                };

                for (conn, addr) in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ConnectionLost { conn, addr }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }

                let timestamp = timestamp_ms();
                for (_, addr) in peers {
                    let ping = OutboundDatagram {
                        packet: Datagram::Ping { timestamp },
                        addr,
                    };
                    if send_tx.send(ping).is_err() {
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Datagram,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let data = packet.encode()?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn queue(&self, packet: Datagram, addr: SocketAddr) {
        if let Err(e) = self.send_tx.send(OutboundDatagram { packet, addr }) {
            error!("Failed to queue datagram for sending: {}", e);
        }
    }

    /// Resolves queued actions to addresses and hands them to the sender.
    async fn flush_outbox(&self, outbox: &mut Outbox) {
        if outbox.is_empty() {
            return;
        }

        let mut connections = self.connections.write().await;
        for item in outbox.drain() {
            match item {
                Outgoing::Frame { conn, frame } => match connections.addr_of(conn) {
                    Some(addr) => self.queue(Datagram::Message(frame), addr),
                    None => debug!("Dropping frame for closed connection {}", conn),
                },
                Outgoing::Datagram { addr, datagram } => self.queue(datagram, addr),
                Outgoing::Close { conn } => {
                    if let Some(connection) = connections.remove(&conn) {
                        info!("Closing connection {} to {}", conn, connection.addr);
                        self.queue(Datagram::Disconnect, connection.addr);
                    }
                }
            }
        }
    }

    async fn handle_datagram(&mut self, datagram: Datagram, addr: SocketAddr, outbox: &mut Outbox) {
        if self.dispatcher.intercept_master(&datagram, addr, outbox) {
            return;
        }

        let event = {
            let mut connections = self.connections.write().await;
            connections.classify(datagram, addr, timestamp_ms(), outbox)
        };

        if let Some(event) = event {
            self.dispatcher.update(event, outbox);
        }
    }

    /// Main server loop. Returns the exit code passed to [`ServerHandle::stop`].
    pub async fn run(&mut self) -> Result<i32, ServerError> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_liveness_checker();

        let has_master = self.dispatcher.has_master();
        let heartbeat_interval = self
            .config
            .master
            .as_ref()
            .map_or(DEFAULT_HEARTBEAT_INTERVAL, |master| master.interval);
        let mut heartbeat = interval(heartbeat_interval);
        let mut poll = interval(self.config.poll_interval);
        let mut status_timer = interval(Duration::from_secs(60));
        let mut outbox = Outbox::new();

        info!("Server started successfully");

        while self.handle.is_running() {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::DatagramReceived { datagram, addr }) => {
                            self.handle_datagram(datagram, addr, &mut outbox).await;
                        },
                        Some(ServerMessage::ConnectionLost { conn, addr }) => {
                            let event = TransportEvent::new(conn, addr, EventKind::ConnectionLost);
                            self.dispatcher.update(event, &mut outbox);
                        },
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = heartbeat.tick(), if has_master => {
                    self.dispatcher.heartbeat(&mut outbox);
                },

                _ = poll.tick() => {
                    self.dispatcher.flush_changes(&mut outbox);
                },

                // Periodic status logging
                _ = status_timer.tick() => {
                    let status = self.status().await;
                    if status.connections > 0 {
                        debug!("{}/{} connections, {} sessions",
                               status.connections, status.max_connections, status.sessions);
                    }
                },
            }

            self.flush_outbox(&mut outbox).await;
        }

        self.dispatcher.shutdown(&mut outbox);
        self.flush_outbox(&mut outbox).await;
        // Give the sender task a moment to put the disconnects on the wire
        tokio::time::sleep(Duration::from_millis(50)).await;

        Ok(self.handle.exit_code())
    }
}
