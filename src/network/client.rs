//! TCP client to the actuator board controller.
//!
//! ```text
//! connect (retry every retry_interval, stop-aware)
//!   └─ register "network_client"
//!        ├─ sender   (this thread):  remote_calls ──▶ frames ──▶ socket
//!        └─ receiver (own thread):   socket ──▶ frames ──▶ received_network_data
//!      any I/O error or EOF ─▶ close, deregister, reconnect
//! ```
//!
//! Each connection gets its own session token: whichever side fails first
//! raises it, the sender loop ends, the socket is shut down (unblocking the
//! receiver) and the client goes back to connecting.

use std::io;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use super::codec::{read_frame, write_frame};
use crate::broker::{Broker, ComponentId, ReceivedNetworkData, RemoteCalls};
use crate::config::NetworkConfig;
use crate::worker::{run_polling_loop, Poll, PollPolicy, StopToken};

pub const COMPONENT_ID: &str = "network_client";

const POLICY: PollPolicy = PollPolicy {
    idle_sleep: Duration::from_millis(300),
    busy_yield: Duration::from_millis(10),
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("cannot resolve {address}: {source}")]
    Resolve { address: String, source: io::Error },

    #[error("{0} resolved to no addresses")]
    NoAddress(String),

    #[error("connection to {address} failed: {source}")]
    Connect { address: String, source: io::Error },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub struct NetworkClient {
    broker: Arc<Broker>,
    address: String,
    retry_interval: Duration,
    max_frame_bytes: usize,
}

impl NetworkClient {
    pub fn new(broker: Arc<Broker>, config: &NetworkConfig) -> Self {
        Self {
            broker,
            address: config.address(),
            retry_interval: config.retry_interval(),
            max_frame_bytes: config.max_frame_bytes as usize,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Connect, serve, reconnect, until `stop` is raised.
    pub fn run(&self, stop: &StopToken) {
        let id = ComponentId::new(COMPONENT_ID);

        while let Some(stream) = self.connect(stop) {
            self.broker.register_running(id.clone());
            if let Err(e) = self.serve(stream, stop) {
                log::warn!("network_client: session failed: {e}");
            }
            self.broker.deregister_running(&id);

            if stop.is_stopped() {
                break;
            }
            log::info!("network_client: connection to {} closed, reconnecting", self.address);
        }
    }

    /// Retry until connected.  `None` once `stop` is raised.
    pub fn connect(&self, stop: &StopToken) -> Option<TcpStream> {
        while !stop.is_stopped() {
            match self.try_connect() {
                Ok(stream) => {
                    log::info!("network_client: connected to {}", self.address);
                    return Some(stream);
                }
                Err(e) => {
                    log::warn!(
                        "network_client: {e}; retrying in {:.1}s",
                        self.retry_interval.as_secs_f32()
                    );
                    if !stop.sleep(self.retry_interval) {
                        break;
                    }
                }
            }
        }
        None
    }

    fn try_connect(&self) -> Result<TcpStream, NetworkError> {
        let addresses = self
            .address
            .to_socket_addrs()
            .map_err(|source| NetworkError::Resolve {
                address: self.address.clone(),
                source,
            })?;

        let mut last_error = None;
        for address in addresses {
            match TcpStream::connect_timeout(&address, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(match last_error {
            Some(source) => NetworkError::Connect {
                address: self.address.clone(),
                source,
            },
            None => NetworkError::NoAddress(self.address.clone()),
        })
    }

    fn serve(&self, stream: TcpStream, stop: &StopToken) -> Result<(), NetworkError> {
        let session = StopToken::new();

        let receiver = {
            let reader = stream.try_clone()?;
            let broker = Arc::clone(&self.broker);
            let session = session.clone();
            let max_frame_bytes = self.max_frame_bytes;
            thread::Builder::new()
                .name(format!("{COMPONENT_ID}_receiver"))
                .spawn(move || receive(reader, &broker, max_frame_bytes, &session))?
        };

        let mut writer = &stream;
        run_polling_loop(COMPONENT_ID, &session, POLICY, || {
            if stop.is_stopped() {
                session.stop();
                return Ok(Poll::Idle);
            }
            let Some(call) = self.broker.dequeue(RemoteCalls) else {
                return Ok(Poll::Idle);
            };
            if let Err(e) = write_frame(&mut writer, &call) {
                session.stop();
                anyhow::bail!("dropping '{}', send failed: {e}", call.name);
            }
            log::debug!("network_client: sent '{}'", call.name);
            Ok(Poll::Busy)
        });

        // Unblocks the receiver's pending read.
        let _ = stream.shutdown(Shutdown::Both);
        if receiver.join().is_err() {
            log::error!("network_client: receiver panicked");
        }
        Ok(())
    }
}

fn receive(mut reader: TcpStream, broker: &Broker, max_frame_bytes: usize, session: &StopToken) {
    while !session.is_stopped() {
        match read_frame(&mut reader, max_frame_bytes) {
            Ok(Some(data)) => {
                log::debug!("network_client: received {} bytes", data.len());
                broker.enqueue(ReceivedNetworkData, data);
            }
            Ok(None) => {
                log::info!("network_client: peer closed the connection");
                break;
            }
            Err(e) => {
                if !session.is_stopped() {
                    log::warn!("network_client: receive failed: {e}");
                }
                break;
            }
        }
    }
    session.stop();
}
