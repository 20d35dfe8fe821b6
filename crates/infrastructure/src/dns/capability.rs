//! Background prober for upstream TCP/pipeline/EDNS0/DO support.
//!
//! Probing is advisory: dispatch still downgrades transport choice on a
//! runtime failure regardless of what the prober last observed.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{DNSClass, Name, RecordType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ferrous_dns_application::ports::CapabilityMaintenance;

use crate::dns::health::Capabilities;
use crate::dns::tcp_pool::TcpConnectionPool;

const DEFAULT_WORKERS: usize = 5;
const PROBE_QUEUE_CAPACITY: usize = 1_000;
const MIN_PROBE_INTERVAL: Duration = Duration::from_secs(60);
const FULL_REFRESH_INTERVAL: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const PIPELINE_READ_DEADLINE: Duration = Duration::from_secs(2);

struct ProbeState {
    capabilities: Capabilities,
    last_probed: Option<Instant>,
}

/// Owns per-upstream probe state and a bounded work queue drained by a
/// small worker pool.
pub struct CapabilityProber {
    states: RwLock<HashMap<SocketAddr, ProbeState>>,
    sender: mpsc::Sender<SocketAddr>,
    pool: Arc<TcpConnectionPool>,
}

impl CapabilityProber {
    /// Spawns `workers` background tasks draining the probe queue, and
    /// returns the prober handle plus a cancellation token owner can
    /// trip to stop them.
    pub fn spawn(pool: Arc<TcpConnectionPool>, workers: usize, cancel: CancellationToken) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(PROBE_QUEUE_CAPACITY);
        let prober = Arc::new(Self {
            states: RwLock::new(HashMap::new()),
            sender: tx,
            pool,
        });

        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        for worker_id in 0..workers.max(1).min(DEFAULT_WORKERS.max(workers)) {
            let prober = prober.clone();
            let rx = rx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    let next = tokio::select! {
                        _ = cancel.cancelled() => break,
                        addr = async { rx.lock().await.recv().await } => addr,
                    };
                    let Some(addr) = next else { break };
                    prober.run_probe(addr, worker_id).await;
                }
            });
        }

        prober
    }

    /// Non-blocking submit; a full queue silently drops the probe.
    pub fn submit_probe(&self, addr: SocketAddr) {
        if let Err(_e) = self.sender.try_send(addr) {
            debug!(server = %addr, "probe queue full, dropping submission");
        }
    }

    fn should_probe(&self, addr: SocketAddr) -> bool {
        let states = self.states.read().unwrap();
        match states.get(&addr).and_then(|s| s.last_probed) {
            Some(last) => last.elapsed() >= MIN_PROBE_INTERVAL,
            None => true,
        }
    }

    pub fn capabilities(&self, addr: SocketAddr) -> Capabilities {
        self.states
            .read()
            .unwrap()
            .get(&addr)
            .map(|s| s.capabilities)
            .unwrap_or_default()
    }

    async fn run_probe(&self, addr: SocketAddr, worker_id: usize) {
        if !self.should_probe(addr) {
            return;
        }
        debug!(server = %addr, worker = worker_id, "probing upstream capabilities");

        let mut capabilities = Capabilities::empty();

        let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            _ => {
                self.record(addr, capabilities);
                return;
            }
        };
        let _ = stream.set_nodelay(true);
        capabilities.set(Capabilities::TCP);

        let query = build_probe_query_with_edns(true);
        let mut stream = stream;
        if let Ok(response) = send_and_receive(&mut stream, &query).await {
            if has_edns(&response) {
                capabilities.set(Capabilities::EDNS0);
            }
            if do_bit_echoed(&response) {
                capabilities.set(Capabilities::DO);
            }
        }

        if probe_pipeline(&mut stream).await {
            capabilities.set(Capabilities::PIPELINE);
        }

        self.record(addr, capabilities);

        if capabilities.has(Capabilities::TCP) {
            self.pool.adopt_probed_connection(addr, stream);
            self.pool.top_up(addr);
        }
    }

    fn record(&self, addr: SocketAddr, capabilities: Capabilities) {
        let mut states = self.states.write().unwrap();
        let entry = states.entry(addr).or_insert(ProbeState { capabilities: Capabilities::empty(), last_probed: None });
        entry.capabilities = capabilities;
        entry.last_probed = Some(Instant::now());
    }

    /// Re-enqueues every known upstream. Meant to run every 5 minutes.
    pub fn full_refresh(&self) {
        let addrs: Vec<SocketAddr> = self.states.read().unwrap().keys().copied().collect();
        for addr in addrs {
            self.submit_probe(addr);
        }
    }

    pub fn full_refresh_interval() -> Duration {
        FULL_REFRESH_INTERVAL
    }
}

impl CapabilityMaintenance for CapabilityProber {
    fn full_refresh(&self) {
        CapabilityProber::full_refresh(self)
    }
}

fn build_probe_query_with_edns(set_do: bool) -> Message {
    let mut query = Query::new();
    query.set_name(Name::root());
    query.set_query_type(RecordType::NS);
    query.set_query_class(DNSClass::IN);

    let mut message = Message::new(fastrand::u16(..), MessageType::Query, OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(query);

    let edns = message.extensions_mut().get_or_insert_with(Default::default);
    edns.set_max_payload(4096);
    edns.set_dnssec_ok(set_do);

    message
}

fn has_edns(message: &Message) -> bool {
    message.extensions().is_some()
}

fn do_bit_echoed(message: &Message) -> bool {
    message.extensions().as_ref().map(|e| e.dnssec_ok()).unwrap_or(false)
}

async fn send_and_receive(stream: &mut TcpStream, message: &Message) -> Result<Message, ()> {
    use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};

    let bytes = message.to_bytes().map_err(|_| ())?;
    let len = (bytes.len() as u16).to_be_bytes();
    stream.write_all(&len).await.map_err(|_| ())?;
    stream.write_all(&bytes).await.map_err(|_| ())?;

    let mut len_buf = [0u8; 2];
    tokio::time::timeout(PIPELINE_READ_DEADLINE, stream.read_exact(&mut len_buf))
        .await
        .map_err(|_| ())?
        .map_err(|_| ())?;
    let response_len = u16::from_be_bytes(len_buf) as usize;
    let mut response_buf = vec![0u8; response_len];
    tokio::time::timeout(PIPELINE_READ_DEADLINE, stream.read_exact(&mut response_buf))
        .await
        .map_err(|_| ())?
        .map_err(|_| ())?;

    Message::from_bytes(&response_buf).map_err(|_| ())
}

async fn probe_pipeline(stream: &mut TcpStream) -> bool {
    use hickory_proto::serialize::binary::BinEncodable;

    let queries: Vec<Message> = (0..3).map(|_| build_probe_query_with_edns(false)).collect();
    for query in &queries {
        let Ok(bytes) = query.to_bytes() else { return false };
        let len = (bytes.len() as u16).to_be_bytes();
        if stream.write_all(&len).await.is_err() || stream.write_all(&bytes).await.is_err() {
            return false;
        }
    }

    for _ in 0..3 {
        let mut len_buf = [0u8; 2];
        let read = tokio::time::timeout(PIPELINE_READ_DEADLINE, stream.read_exact(&mut len_buf)).await;
        if read.is_err() || read.unwrap().is_err() {
            return false;
        }
        let response_len = u16::from_be_bytes(len_buf) as usize;
        let mut buf = vec![0u8; response_len];
        let read = tokio::time::timeout(PIPELINE_READ_DEADLINE, stream.read_exact(&mut buf)).await;
        if read.is_err() || read.unwrap().is_err() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_query_carries_edns0_do() {
        let message = build_probe_query_with_edns(true);
        assert!(has_edns(&message));
        assert!(do_bit_echoed(&message));
    }

    #[test]
    fn probe_without_do_does_not_set_it() {
        let message = build_probe_query_with_edns(false);
        assert!(!do_bit_echoed(&message));
    }
}
