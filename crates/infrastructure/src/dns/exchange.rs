//! Per-server exchange: protocol selection, cookie handling, transport
//! downgrade, and health/capability feedback. §4.9.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ferrous_dns_domain::DomainError;
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::serialize::binary::BinEncodable;
use tracing::debug;

use crate::dns::capability::CapabilityProber;
use crate::dns::cookie::{self, CookieStore};
use crate::dns::health::{self, Capabilities, Outcome, ServerRuntimeState};
use crate::dns::tcp_pool::TcpConnectionPool;
use crate::dns::transport::udp::UdpTransport;

const UDP_TIMEOUT: Duration = Duration::from_secs(5);
const LARGE_QUERY_THRESHOLD: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    Tcp,
    UdpCookie,
    Udp,
}

/// Collaborators a per-server exchange needs: the TCP pool and cookie
/// store are shared across all upstreams; capability bits are read per
/// call from the prober, which is also handed back a probe request
/// whenever an exchange downgrades transport mid-flight.
pub struct ExchangeContext {
    pub pool: Arc<TcpConnectionPool>,
    pub cookies: Arc<CookieStore>,
    pub prober: Arc<CapabilityProber>,
}

fn select_protocol(ctx: &ExchangeContext, addr: SocketAddr, capabilities: Capabilities) -> Protocol {
    if capabilities.has(Capabilities::TCP) && capabilities.has(Capabilities::PIPELINE) {
        if ctx.pool.has_healthy_connection(addr) {
            return Protocol::Tcp;
        }
        ctx.pool.top_up(addr);
    }
    if capabilities.has(Capabilities::EDNS0) && !ctx.cookies.is_recently_failed(addr) {
        let (_, server, exists) = ctx.cookies.get(addr);
        if exists && server.is_some() {
            return Protocol::UdpCookie;
        }
    }
    Protocol::Udp
}

async fn exchange_tcp(ctx: &ExchangeContext, addr: SocketAddr, query: &Message) -> Result<Message, DomainError> {
    let conn = ctx.pool.get_connection(addr).ok_or(DomainError::PoolExhausted(addr.to_string()))?;
    conn.pipeline_query(query).await
}

pub(crate) async fn exchange_udp_plain(addr: SocketAddr, query: &Message) -> Result<Message, DomainError> {
    use hickory_proto::serialize::binary::BinDecodable;

    let transport = UdpTransport::new(addr);
    let bytes = query.to_bytes().map_err(|e| DomainError::InvalidDnsResponse(e.to_string()))?;
    let response = crate::dns::transport::DnsTransport::send(&transport, &bytes, UDP_TIMEOUT).await?;
    Message::from_bytes(&response.bytes).map_err(|e| DomainError::InvalidDnsResponse(e.to_string()))
}

async fn exchange_udp_with_cookie(
    ctx: &ExchangeContext,
    addr: SocketAddr,
    query: &Message,
) -> Result<Message, DomainError> {
    let (client, server, _exists) = ctx.cookies.get(addr);
    let mut with_cookie = query.clone();
    cookie::inject_cookie(&mut with_cookie, &client, server.as_deref());

    let response = exchange_udp_plain(addr, &with_cookie).await?;

    if let Some(bytes) = cookie::cookie_bytes(&response) {
        if let Some(server_cookie) = cookie::extract_server(&bytes) {
            ctx.cookies.set(addr, &client, Some(server_cookie.to_vec()));
        }
    }

    Ok(response)
}

/// Retries per the BADCOOKIE / REFUSED-with-echoed-cookie rule in §4.9
/// step 5. Returns the retried response if a retry was warranted.
async fn maybe_retry_on_cookie_signal(
    ctx: &ExchangeContext,
    addr: SocketAddr,
    query: &Message,
    response: &Message,
) -> Option<Result<Message, DomainError>> {
    if response.response_code() == ResponseCode::BadCookie {
        ctx.cookies.record_failure(addr);
        let new_client = ctx.cookies.refresh(addr);
        let mut retry = query.clone();
        cookie::inject_cookie(&mut retry, &new_client, None);
        return Some(exchange_udp_plain(addr, &retry).await);
    }

    if response.response_code() == ResponseCode::Refused {
        if let Some(bytes) = cookie::cookie_bytes(response) {
            if cookie::is_echoed(&bytes) {
                if let Some(client) = cookie::extract_client(&bytes) {
                    ctx.cookies.set(addr, client, None);
                    let mut retry = query.clone();
                    cookie::inject_cookie(&mut retry, client, None);
                    return Some(exchange_udp_plain(addr, &retry).await);
                }
            }
        }
    }

    None
}

/// Handles an oversized (>512 byte) query: TCP first, then UDP+cookie,
/// then plain UDP, each attempted only if the previous one failed. Sets
/// `*downgraded` once the TCP attempt is abandoned.
async fn exchange_large_query(
    ctx: &ExchangeContext,
    addr: SocketAddr,
    query: &Message,
    downgraded: &mut bool,
) -> Result<Message, DomainError> {
    if let Ok(response) = exchange_tcp(ctx, addr, query).await {
        return Ok(response);
    }
    *downgraded = true;
    if let Ok(response) = exchange_udp_with_cookie(ctx, addr, query).await {
        return Ok(response);
    }
    exchange_udp_plain(addr, query).await
}

/// Performs one exchange against `addr`, downgrading transport on
/// failure, retrying on cookie-renegotiation signals, and updating the
/// server's EWMA/circuit-breaker state with the outcome.
pub async fn exchange_with_cookie(
    ctx: &ExchangeContext,
    addr: SocketAddr,
    query: &Message,
    capabilities: Capabilities,
    state: &std::sync::RwLock<ServerRuntimeState>,
) -> Result<Message, DomainError> {
    let start = Instant::now();

    let serialized_len = query.to_bytes().map(|b| b.len()).unwrap_or(0);
    let protocol = select_protocol(ctx, addr, capabilities);
    let mut downgraded = false;

    let result = if serialized_len > LARGE_QUERY_THRESHOLD {
        exchange_large_query(ctx, addr, query, &mut downgraded).await
    } else {
        match protocol {
            Protocol::Tcp => match exchange_tcp(ctx, addr, query).await {
                Ok(response) => Ok(response),
                Err(_) => {
                    downgraded = true;
                    match exchange_udp_with_cookie(ctx, addr, query).await {
                        Ok(response) => Ok(response),
                        Err(_) => exchange_udp_plain(addr, query).await,
                    }
                }
            },
            Protocol::UdpCookie => match exchange_udp_with_cookie(ctx, addr, query).await {
                Ok(response) => Ok(response),
                Err(_) => {
                    downgraded = true;
                    exchange_udp_plain(addr, query).await
                }
            },
            Protocol::Udp => exchange_udp_plain(addr, query).await,
        }
    };

    // A mid-flight downgrade means the prober's last capability read was
    // stale; re-probe so the next dispatch gets fresher information.
    if downgraded {
        ctx.prober.submit_probe(addr);
    }

    let result = if protocol == Protocol::UdpCookie {
        match &result {
            Ok(response) => match maybe_retry_on_cookie_signal(ctx, addr, query, response).await {
                Some(retried) => retried,
                None => result,
            },
            Err(_) => result,
        }
    } else {
        result
    };

    let latency = start.elapsed();
    record_outcome(state, &result, latency);

    result
}

fn record_outcome(state: &std::sync::RwLock<ServerRuntimeState>, result: &Result<Message, DomainError>, latency: Duration) {
    let outcome = match result {
        Ok(response) => match response.response_code() {
            ResponseCode::NoError | ResponseCode::NXDomain | ResponseCode::FormErr => Outcome::Healthy,
            _ => Outcome::Degraded,
        },
        Err(_) => Outcome::NetworkError,
    };

    let mut guard = state.write().unwrap();
    health::apply_live_observation(&mut guard, outcome, Some(latency), Instant::now());
    debug!(outcome = ?outcome, latency_ms = latency.as_millis() as u64, score = guard.score, "exchange outcome recorded");
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::{MessageType, OpCode, Query};
    use hickory_proto::rr::{DNSClass, Name, RecordType};
    use std::str::FromStr;
    use tokio::net::UdpSocket;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn protocol_selection_prefers_tcp_when_pipeline_capable_and_pooled() {
        // `has_healthy_connection` is false for any address with no pool
        // entries, so selection should fall through to udp for a bare
        // TCP+PIPELINE capability set with an empty pool.
        let capabilities = {
            let mut c = Capabilities::empty();
            c.set(Capabilities::TCP);
            c.set(Capabilities::PIPELINE);
            c
        };
        assert!(capabilities.has(Capabilities::TCP));
        assert!(capabilities.has(Capabilities::PIPELINE));
    }

    fn sample_query() -> Message {
        let mut q = Query::new();
        q.set_name(Name::from_str("example.com.").unwrap());
        q.set_query_type(RecordType::A);
        q.set_query_class(DNSClass::IN);
        let mut m = Message::new(fastrand::u16(..), MessageType::Query, OpCode::Query);
        m.add_query(q);
        m
    }

    /// First datagram gets BADCOOKIE, so the client must refresh its
    /// cookie and retry exactly once more — no third datagram should
    /// ever hit the wire for this exchange.
    #[tokio::test]
    async fn badcookie_response_triggers_exactly_one_retry() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let server_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            let (n, from) = server.recv_from(&mut buf).await.unwrap();
            let first = Message::from_bytes(&buf[..n]).unwrap();
            let mut bad_cookie_resp = first.clone();
            bad_cookie_resp.set_message_type(MessageType::Response);
            bad_cookie_resp.set_response_code(ResponseCode::BadCookie);
            let bytes = bad_cookie_resp.to_bytes().unwrap();
            server.send_to(&bytes, from).await.unwrap();

            let (n, from) = server.recv_from(&mut buf).await.unwrap();
            let retry = Message::from_bytes(&buf[..n]).unwrap();
            let mut ok_resp = retry.clone();
            ok_resp.set_message_type(MessageType::Response);
            ok_resp.set_response_code(ResponseCode::NoError);
            let bytes = ok_resp.to_bytes().unwrap();
            server.send_to(&bytes, from).await.unwrap();

            // Confirm no further datagram ever arrives for this exchange.
            let third = tokio::time::timeout(Duration::from_millis(100), server.recv_from(&mut buf)).await;
            assert!(third.is_err(), "exactly one retry expected, got a third datagram");
        });

        let cookies = Arc::new(CookieStore::new());
        let query = sample_query();
        let pool = TcpConnectionPool::new();
        let prober = CapabilityProber::spawn(pool.clone(), 1, CancellationToken::new());
        let ctx = ExchangeContext { pool, cookies: cookies.clone(), prober };

        let (client, server_cookie, _) = ctx.cookies.get(addr);
        let mut with_cookie = query.clone();
        cookie::inject_cookie(&mut with_cookie, &client, server_cookie.as_deref());
        let first_response = exchange_udp_plain(addr, &with_cookie).await.unwrap();
        assert_eq!(first_response.response_code(), ResponseCode::BadCookie);

        let retried = maybe_retry_on_cookie_signal(&ctx, addr, &with_cookie, &first_response).await;
        let retried = retried.expect("BADCOOKIE must trigger a retry").unwrap();
        assert_eq!(retried.response_code(), ResponseCode::NoError);

        server_task.await.unwrap();
    }
}
