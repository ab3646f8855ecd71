use crate::metrics::{BRIDGE_CONNECTED, COMMANDS_REJECTED};
use crate::protocol::{AckMsg, HelloMsg, IncomingMessage, ProtocolVersion, StateMsg};
use astra_core::timebase::format_uptime;
use astra_core::{Command, CommandError, DashboardSnapshot, TimeBase};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, instrument, warn};

/// Longest inbound line accepted before the client is dropped.
pub const MAX_LINE_BYTES: usize = 16 * 1024;

pub struct BridgeConfig {
    pub bind_addr: String,
    pub publish_interval: Duration,
    pub require_handshake: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7100".to_string(),
            publish_interval: Duration::from_millis(500),
            require_handshake: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("bridge socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// A command forwarded to the scan loop, answered through `reply`.
#[derive(Debug)]
pub struct OperatorRequest {
    pub command: Command,
    pub reply: oneshot::Sender<Result<(), CommandError>>,
}

impl OperatorRequest {
    pub fn new(command: Command) -> (Self, oneshot::Receiver<Result<(), CommandError>>) {
        let (reply, rx) = oneshot::channel();
        (Self { command, reply }, rx)
    }
}

#[derive(Debug, Default)]
struct InboundState {
    handshake_seen: bool,
    client_id: Option<String>,
}

impl InboundState {
    fn reset(&mut self) {
        self.handshake_seen = false;
        self.client_id = None;
    }

    fn note_handshake(&mut self, hello: &HelloMsg) {
        self.handshake_seen = true;
        self.client_id = hello.client_id.clone();
    }
}

/// Bind the bridge listener. Split from [`run_bridge`] so callers learn the
/// actual address (port 0) and bind failures before spawning the thread.
pub fn bind_bridge(config: &BridgeConfig) -> Result<TcpListener, BridgeError> {
    let listener = TcpListener::bind(&config.bind_addr).map_err(|source| BridgeError::Bind {
        addr: config.bind_addr.clone(),
        source,
    })?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Serve one operator client at a time: newline-delimited JSON state out,
/// commands in. Returns when `stop` is set or the scan loop goes away.
pub fn run_bridge(
    listener: TcpListener,
    snapshots: watch::Receiver<DashboardSnapshot>,
    commands: mpsc::Sender<OperatorRequest>,
    timebase: TimeBase,
    config: BridgeConfig,
    stop: Arc<AtomicBool>,
) -> Result<(), BridgeError> {
    let local: Option<SocketAddr> = listener.local_addr().ok();
    info!(addr = ?local, "Bridge listening");

    let mut client: Option<TcpStream> = None;
    let mut recv_buf: Vec<u8> = Vec::with_capacity(4096);
    let mut send_buf: Vec<u8> = Vec::new();
    let mut send_offset: usize = 0;
    let mut last_publish = Instant::now();
    let mut state_sequence: u64 = 0;
    let mut inbound_state = InboundState::default();

    loop {
        if stop.load(Ordering::Relaxed) || commands.is_closed() {
            break;
        }
        if client.is_none() {
            match listener.accept() {
                Ok((stream, addr)) => {
                    info!(client_addr = %addr, "Bridge client connected");
                    if let Err(e) = stream.set_nonblocking(true) {
                        warn!(error = %e, "Failed to set client nonblocking");
                        continue;
                    }
                    client = Some(stream);
                    BRIDGE_CONNECTED.set(1.0);
                    // First state goes out immediately
                    last_publish = Instant::now()
                        .checked_sub(config.publish_interval)
                        .unwrap_or_else(Instant::now);
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(err) => {
                    warn!("Bridge accept error: {}", err);
                }
            }
        }

        let mut drop_client = false;
        if let Some(stream) = client.as_mut() {
            let mut temp = [0u8; 1024];
            match stream.read(&mut temp) {
                Ok(0) => {
                    info!("Bridge client disconnected");
                    drop_client = true;
                }
                Ok(n) => {
                    recv_buf.extend_from_slice(&temp[..n]);
                    while let Some(pos) = recv_buf.iter().position(|b| *b == b'\n') {
                        let line = recv_buf.drain(..=pos).collect::<Vec<u8>>();
                        let Ok(text) = std::str::from_utf8(&line) else {
                            continue;
                        };
                        let trimmed = text.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match IncomingMessage::parse(trimmed) {
                            Some(msg) => {
                                if let Some(ack) = handle_incoming(
                                    msg,
                                    &commands,
                                    config.require_handshake,
                                    &mut inbound_state,
                                ) {
                                    queue_line(&mut send_buf, &ack);
                                }
                            }
                            None => debug!(line = trimmed, "Ignoring unrecognized bridge message"),
                        }
                    }
                    if recv_buf.len() > MAX_LINE_BYTES {
                        warn!(buffered = recv_buf.len(), "Bridge client line too long, dropping");
                        drop_client = true;
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(err) => {
                    warn!(error = %err, "Bridge read error");
                    drop_client = true;
                }
            }

            if last_publish.elapsed() >= config.publish_interval {
                state_sequence = state_sequence.wrapping_add(1);
                let snapshot = snapshots.borrow().clone();
                let msg = StateMsg {
                    msg_type: "state",
                    protocol_version: ProtocolVersion::v1(),
                    sequence: state_sequence,
                    unix_us: timebase.unix_us(),
                    uptime_hms: format_uptime(snapshot.telemetry.uptime_s),
                    status_label: snapshot.status.label(),
                    snapshot: &snapshot,
                };
                queue_line(&mut send_buf, &msg);
                last_publish = Instant::now();
            }

            if send_offset < send_buf.len() && !drop_client {
                match stream.write(&send_buf[send_offset..]) {
                    Ok(0) => {
                        info!("Bridge client disconnected");
                        drop_client = true;
                    }
                    Ok(n) => {
                        send_offset += n;
                        if send_offset >= send_buf.len() {
                            send_buf.clear();
                            send_offset = 0;
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(err) => {
                        warn!(error = %err, "Bridge write error");
                        drop_client = true;
                    }
                }
            }
        }

        if drop_client {
            client = None;
            recv_buf.clear();
            send_buf.clear();
            send_offset = 0;
            inbound_state.reset();
            BRIDGE_CONNECTED.set(0.0);
        }

        std::thread::sleep(Duration::from_millis(5));
    }

    BRIDGE_CONNECTED.set(0.0);
    info!("Bridge stopped");
    Ok(())
}

fn queue_line<T: serde::Serialize>(send_buf: &mut Vec<u8>, msg: &T) {
    match serde_json::to_vec(msg) {
        Ok(mut line) => {
            line.push(b'\n');
            send_buf.extend_from_slice(&line);
        }
        Err(e) => warn!(error = %e, "Failed to encode bridge message"),
    }
}

#[instrument(skip(commands, inbound_state))]
fn handle_incoming(
    msg: IncomingMessage,
    commands: &mpsc::Sender<OperatorRequest>,
    require_handshake: bool,
    inbound_state: &mut InboundState,
) -> Option<AckMsg> {
    match msg {
        IncomingMessage::Hello(hello) => {
            if !hello.protocol_version.is_supported() {
                warn!(
                    major = hello.protocol_version.major,
                    minor = hello.protocol_version.minor,
                    "Unsupported protocol version"
                );
                return None;
            }
            inbound_state.note_handshake(&hello);
            info!(client_id = ?hello.client_id, "Bridge handshake received");
            None
        }
        IncomingMessage::Command(cmd) => {
            let command = cmd.command;
            if !cmd.protocol_version.is_supported() {
                COMMANDS_REJECTED.inc();
                return Some(AckMsg::rejected(command, "unsupported protocol version"));
            }
            if require_handshake && !inbound_state.handshake_seen {
                warn!("Command received before handshake");
                COMMANDS_REJECTED.inc();
                return Some(AckMsg::rejected(command, "handshake required"));
            }

            let (request, reply) = OperatorRequest::new(command);
            if commands.blocking_send(request).is_err() {
                return Some(AckMsg::rejected(command, "scan loop stopped"));
            }
            match reply.blocking_recv() {
                Ok(Ok(())) => {
                    debug!(command = command.as_str(), "Command accepted");
                    Some(AckMsg::accepted(command))
                }
                Ok(Err(err)) => Some(AckMsg::rejected(command, err.to_string())),
                Err(_) => Some(AckMsg::rejected(command, "scan loop stopped")),
            }
        }
    }
}
