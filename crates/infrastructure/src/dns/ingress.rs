//! Worker pool & ingress: UDP/TCP listeners, buffer pools, bounded task
//! submission. §4.10.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::dns::handler::HandlerPipeline;

const UDP_READ_DEADLINE: Duration = Duration::from_secs(1);
const TCP_READ_DEADLINE: Duration = Duration::from_secs(10);
const TCP_WRITE_DEADLINE: Duration = Duration::from_secs(30);
const TCP_FRAME_LIMIT: usize = 4096;
const TASK_SOFT_TIMEOUT: Duration = Duration::from_secs(5);
const UDP_BUFFER_SIZE: usize = 512;
const MIN_WORKERS: usize = 100;

struct UdpTask {
    payload: Vec<u8>,
    from: SocketAddr,
    received_at: Instant,
    socket: Arc<UdpSocket>,
}

fn bind_udp_reuseport(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

fn bind_tcp_reuseport(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;
    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

/// Starts `num_listeners` SO_REUSEPORT UDP+TCP listener pairs on `addr`,
/// each feeding a shared bounded task channel drained by a worker pool.
pub async fn run_ingress(
    addr: SocketAddr,
    handler: Arc<HandlerPipeline>,
    num_listeners: usize,
    workers: usize,
    queue_multiplier: usize,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let worker_count = workers.max(MIN_WORKERS);
    let channel_capacity = workers * queue_multiplier.max(1);

    let (tx, rx) = mpsc::channel::<UdpTask>(channel_capacity);
    spawn_workers(worker_count, rx, handler.clone(), cancel.clone());

    for listener_id in 0..num_listeners.max(1) {
        let udp_socket = bind_udp_reuseport(addr)?;
        let udp_tx = tx.clone();
        let udp_cancel = cancel.clone();
        tokio::spawn(run_udp_listener(udp_socket, udp_tx, udp_cancel, listener_id));

        let tcp_listener = bind_tcp_reuseport(addr)?;
        let tcp_handler = handler.clone();
        let tcp_cancel = cancel.clone();
        tokio::spawn(run_tcp_acceptor(tcp_listener, tcp_handler, tcp_cancel, listener_id));
    }

    info!(bind = %addr, listeners = num_listeners, workers = worker_count, "DNS ingress started");
    Ok(())
}

async fn run_udp_listener(socket: UdpSocket, tx: mpsc::Sender<UdpTask>, cancel: CancellationToken, listener_id: usize) {
    let socket = Arc::new(socket);
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let mut buf = vec![0u8; UDP_BUFFER_SIZE];
        let recv = tokio::time::timeout(UDP_READ_DEADLINE, socket.recv_from(&mut buf)).await;
        let (n, from) = match recv {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                error!(listener = listener_id, error = %e, "udp recv error");
                continue;
            }
            Err(_) => continue, // deadline tick — re-check cancellation
        };
        buf.truncate(n);

        let task = UdpTask { payload: buf, from, received_at: Instant::now(), socket: socket.clone() };
        if tx.try_send(task).is_err() {
            warn!(listener = listener_id, "worker queue full, dropping UDP packet");
        }
    }
}

fn spawn_workers(
    worker_count: usize,
    rx: mpsc::Receiver<UdpTask>,
    handler: Arc<HandlerPipeline>,
    cancel: CancellationToken,
) {
    let rx = Arc::new(tokio::sync::Mutex::new(rx));
    for worker_id in 0..worker_count {
        let rx = rx.clone();
        let handler = handler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => break,
                    task = async { rx.lock().await.recv().await } => task,
                };
                let Some(task) = next else { break };
                process_udp_task(task, &handler, worker_id).await;
            }
        });
    }
}

async fn process_udp_task(task: UdpTask, handler: &HandlerPipeline, worker_id: usize) {
    let elapsed_since_receive = task.received_at.elapsed();
    if elapsed_since_receive > TASK_SOFT_TIMEOUT {
        warn!(worker = worker_id, "dropping stale queued UDP task");
        return;
    }

    let outcome = tokio::time::timeout(TASK_SOFT_TIMEOUT, handler.handle_raw(&task.payload, task.from.ip())).await;
    let response = match outcome {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return,
        Err(_) => {
            warn!(worker = worker_id, client = %task.from, "handler soft timeout, replying SERVFAIL");
            handler.servfail_response(&task.payload)
        }
    };

    if let Err(e) = task.socket.send_to(&response, task.from).await {
        error!(worker = worker_id, error = %e, "failed to write UDP response");
    }
}

async fn run_tcp_acceptor(listener: TcpListener, handler: Arc<HandlerPipeline>, cancel: CancellationToken, listener_id: usize) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let handler = handler.clone();
                        tokio::spawn(async move {
                            handle_tcp_connection(stream, peer, handler).await;
                        });
                    }
                    Err(e) => error!(listener = listener_id, error = %e, "tcp accept error"),
                }
            }
        }
    }
}

async fn handle_tcp_connection(mut stream: TcpStream, peer: SocketAddr, handler: Arc<HandlerPipeline>) {
    loop {
        let mut len_buf = [0u8; 2];
        match tokio::time::timeout(TCP_READ_DEADLINE, stream.read_exact(&mut len_buf)).await {
            Ok(Ok(_)) => {}
            _ => return, // timeout or EOF closes the connection cleanly
        }
        let frame_len = u16::from_be_bytes(len_buf) as usize;
        if frame_len > TCP_FRAME_LIMIT {
            return;
        }

        let mut body = vec![0u8; frame_len];
        if tokio::time::timeout(TCP_READ_DEADLINE, stream.read_exact(&mut body)).await.is_err() {
            return;
        }

        let response = tokio::time::timeout(TASK_SOFT_TIMEOUT, handler.handle_raw(&body, peer.ip()))
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| handler.servfail_response(&body));

        let len_prefix = (response.len() as u16).to_be_bytes();
        if tokio::time::timeout(TCP_WRITE_DEADLINE, async {
            stream.write_all(&len_prefix).await?;
            stream.write_all(&response).await
        })
        .await
        .is_err()
        {
            return;
        }
    }
}
