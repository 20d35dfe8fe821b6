use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use ferrous_dns_domain::DomainError;
use hickory_proto::op::Message;

use crate::ports::{DnsForwarder, RateLimitDecision, RateLimiter, ResponseCache};

/// Orchestrates steps 2-5 of the handler pipeline: rate limit, cache lookup,
/// forwarder dispatch on miss, cache store. Wire-level validation (step 1)
/// happens upstream of this use case, inside the ingress handler, which is
/// the only place that needs to reach into the raw, possibly-malformed
/// message before a well-formed `Message` exists to hand here.
pub struct HandleDnsQueryUseCase {
    cache: Arc<dyn ResponseCache>,
    forwarder: Arc<dyn DnsForwarder>,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl HandleDnsQueryUseCase {
    pub fn new(
        cache: Arc<dyn ResponseCache>,
        forwarder: Arc<dyn DnsForwarder>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            cache,
            forwarder,
            rate_limiter,
        }
    }

    pub async fn execute(&self, query: &Message, client_ip: IpAddr) -> Result<Message, DomainError> {
        let start = Instant::now();

        match self.rate_limiter.check(client_ip) {
            RateLimitDecision::Allow => {}
            RateLimitDecision::Refuse => {
                return Err(DomainError::RateLimited(client_ip.to_string()));
            }
            RateLimitDecision::Banned => {
                return Err(DomainError::RateLimited(format!("{client_ip} (banned)")));
            }
        }

        if let Some(cached) = self.cache.get(query) {
            tracing::debug!(
                client = %client_ip,
                stage = "cache_hit",
                elapsed_us = start.elapsed().as_micros() as u64,
                "query served from cache"
            );
            return Ok(cached);
        }

        let response = match self.forwarder.forward_query(query).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(
                    client = %client_ip,
                    stage = "forward",
                    error = %err,
                    elapsed_us = start.elapsed().as_micros() as u64,
                    "forwarder dispatch failed"
                );
                return Err(err);
            }
        };

        self.cache.set(&response);

        tracing::debug!(
            client = %client_ip,
            stage = "forwarded",
            elapsed_us = start.elapsed().as_micros() as u64,
            "query forwarded upstream"
        );

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AllowAll;
    impl RateLimiter for AllowAll {
        fn check(&self, _client_ip: IpAddr) -> RateLimitDecision {
            RateLimitDecision::Allow
        }
    }

    struct DenyAll;
    impl RateLimiter for DenyAll {
        fn check(&self, _client_ip: IpAddr) -> RateLimitDecision {
            RateLimitDecision::Refuse
        }
    }

    struct EmptyCache {
        set_calls: AtomicUsize,
    }
    impl ResponseCache for EmptyCache {
        fn get(&self, _query: &Message) -> Option<Message> {
            None
        }
        fn set(&self, _response: &Message) {
            self.set_calls.fetch_add(1, Ordering::SeqCst);
        }
        fn delete_by_domain(&self, _domain: &str) -> usize {
            0
        }
    }

    struct HitCache(Message);
    impl ResponseCache for HitCache {
        fn get(&self, _query: &Message) -> Option<Message> {
            Some(self.0.clone())
        }
        fn set(&self, _response: &Message) {}
        fn delete_by_domain(&self, _domain: &str) -> usize {
            0
        }
    }

    struct EchoForwarder;
    #[async_trait]
    impl DnsForwarder for EchoForwarder {
        async fn forward_query(&self, query: &Message) -> Result<Message, DomainError> {
            Ok(query.clone())
        }
    }

    fn sample_client_ip() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    #[tokio::test]
    async fn rate_limited_client_never_reaches_cache_or_forwarder() {
        let use_case = HandleDnsQueryUseCase::new(
            Arc::new(EmptyCache { set_calls: AtomicUsize::new(0) }),
            Arc::new(EchoForwarder),
            Arc::new(DenyAll),
        );
        let result = use_case.execute(&Message::new(), sample_client_ip()).await;
        assert!(matches!(result, Err(DomainError::RateLimited(_))));
    }

    #[tokio::test]
    async fn cache_hit_skips_forwarder() {
        let use_case = HandleDnsQueryUseCase::new(
            Arc::new(HitCache(Message::new())),
            Arc::new(EchoForwarder),
            Arc::new(AllowAll),
        );
        let result = use_case.execute(&Message::new(), sample_client_ip()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn cache_miss_forwards_and_stores_result() {
        let cache = Arc::new(EmptyCache { set_calls: AtomicUsize::new(0) });
        let use_case = HandleDnsQueryUseCase::new(
            cache.clone(),
            Arc::new(EchoForwarder),
            Arc::new(AllowAll),
        );
        let result = use_case.execute(&Message::new(), sample_client_ip()).await;
        assert!(result.is_ok());
        assert_eq!(cache.set_calls.load(Ordering::SeqCst), 1);
    }
}
