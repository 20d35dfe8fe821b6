//! Handler pipeline: wire-level validation, then delegation to the
//! rate-limit/cache/forward use case. §4.11.

use std::net::IpAddr;
use std::time::Instant;

use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::{DNSClass, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use tracing::{info, warn};

use ferrous_dns_application::use_cases::HandleDnsQueryUseCase;

const MAX_QUESTIONS: usize = 10;
const MAX_QNAME_LEN: usize = 253;
const DEFAULT_MESSAGE_SIZE_LIMIT: usize = 4096;

const ALLOWED_QTYPES: &[RecordType] = &[
    RecordType::A,
    RecordType::AAAA,
    RecordType::NS,
    RecordType::CNAME,
    RecordType::SOA,
    RecordType::PTR,
    RecordType::MX,
    RecordType::TXT,
    RecordType::SRV,
    RecordType::CAA,
    RecordType::HTTPS,
    RecordType::DNSKEY,
    RecordType::DS,
    RecordType::RRSIG,
    RecordType::NSEC,
    RecordType::ANY,
];

/// Owns the use case and the wire-level validation that must run before a
/// well-formed `Message` exists to hand it.
pub struct HandlerPipeline {
    use_case: HandleDnsQueryUseCase,
    message_size_limit: usize,
    validation_enabled: bool,
}

impl HandlerPipeline {
    pub fn new(use_case: HandleDnsQueryUseCase, message_size_limit: usize, validation_enabled: bool) -> Self {
        Self {
            use_case,
            message_size_limit: if message_size_limit == 0 { DEFAULT_MESSAGE_SIZE_LIMIT } else { message_size_limit },
            validation_enabled,
        }
    }

    /// Parses, validates, and dispatches a raw wire message. Returns
    /// `None` only when the input couldn't even be parsed enough to
    /// build a response (nothing to reply to).
    pub async fn handle_raw(&self, raw: &[u8], client_ip: IpAddr) -> Option<Vec<u8>> {
        let start = Instant::now();

        if raw.len() > self.message_size_limit {
            return None;
        }

        let query = match Message::from_bytes(raw) {
            Ok(message) => message,
            Err(_) => return None,
        };

        if self.validation_enabled {
            if let Some(reason) = validate(&query, raw.len(), self.message_size_limit) {
                warn!(client = %client_ip, reason, "rejecting malformed query");
                return Some(encode(&error_response(&query, ResponseCode::FormErr)));
            }
        }

        let qname = query.queries().first().map(|q| q.name().to_ascii()).unwrap_or_default();
        let qtype = query.queries().first().map(|q| q.query_type());

        let response = match self.use_case.execute(&query, client_ip).await {
            Ok(response) => response,
            Err(ferrous_dns_domain::DomainError::RateLimited(_)) => error_response(&query, ResponseCode::Refused),
            Err(err) => {
                warn!(client = %client_ip, qname = %qname, error = %err, "forwarder pipeline failed");
                error_response(&query, ResponseCode::ServFail)
            }
        };

        info!(
            client = %client_ip,
            qname = %qname,
            qtype = ?qtype,
            rcode = ?response.response_code(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "query handled"
        );

        Some(encode(&response))
    }

    /// Best-effort SERVFAIL for a task that blew its soft timeout or
    /// otherwise failed before a proper response was produced. Falls
    /// back to a synthetic empty response if the original couldn't be
    /// parsed at all.
    pub fn servfail_response(&self, raw: &[u8]) -> Vec<u8> {
        match Message::from_bytes(raw) {
            Ok(query) => encode(&error_response(&query, ResponseCode::ServFail)),
            Err(_) => {
                let mut message = Message::new();
                message.set_message_type(MessageType::Response);
                message.set_response_code(ResponseCode::ServFail);
                encode(&message)
            }
        }
    }
}

/// Returns `Some(reason)` if the query fails wire-level validation.
fn validate(query: &Message, serialized_len: usize, size_limit: usize) -> Option<&'static str> {
    if serialized_len > size_limit {
        return Some("message exceeds size limit");
    }
    if query.queries().is_empty() {
        return Some("no questions");
    }
    if query.queries().len() > MAX_QUESTIONS {
        return Some("too many questions");
    }
    for question in query.queries() {
        if question.name().to_ascii().len() > MAX_QNAME_LEN {
            return Some("qname too long");
        }
        if question.query_class() != DNSClass::IN {
            return Some("unsupported qclass");
        }
        if !ALLOWED_QTYPES.contains(&question.query_type()) {
            return Some("unsupported qtype");
        }
    }
    None
}

fn error_response(query: &Message, rcode: ResponseCode) -> Message {
    let mut response = Message::new();
    response.set_id(query.id());
    response.set_message_type(MessageType::Response);
    response.set_op_code(query.op_code());
    response.set_recursion_desired(query.recursion_desired());
    response.set_response_code(rcode);
    for question in query.queries() {
        response.add_query(question.clone());
    }
    response
}

fn encode(message: &Message) -> Vec<u8> {
    message.to_bytes().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::{OpCode, Query};
    use hickory_proto::rr::Name;
    use std::str::FromStr;

    fn sample_query(qtype: RecordType, qclass: DNSClass) -> Message {
        let mut query = Query::new();
        query.set_name(Name::from_str("example.com.").unwrap());
        query.set_query_type(qtype);
        query.set_query_class(qclass);
        let mut message = Message::new();
        message.set_id(42);
        message.set_message_type(MessageType::Query);
        message.set_op_code(OpCode::Query);
        message.add_query(query);
        message
    }

    #[test]
    fn accepts_well_formed_query() {
        let query = sample_query(RecordType::A, DNSClass::IN);
        assert!(validate(&query, 32, DEFAULT_MESSAGE_SIZE_LIMIT).is_none());
    }

    #[test]
    fn rejects_unknown_qtype() {
        let query = sample_query(RecordType::Unknown(65000), DNSClass::IN);
        assert_eq!(validate(&query, 32, DEFAULT_MESSAGE_SIZE_LIMIT), Some("unsupported qtype"));
    }

    #[test]
    fn rejects_non_in_class() {
        let query = sample_query(RecordType::A, DNSClass::CH);
        assert_eq!(validate(&query, 32, DEFAULT_MESSAGE_SIZE_LIMIT), Some("unsupported qclass"));
    }

    #[test]
    fn rejects_oversized_serialized_length() {
        let query = sample_query(RecordType::A, DNSClass::IN);
        assert_eq!(validate(&query, 5000, DEFAULT_MESSAGE_SIZE_LIMIT), Some("message exceeds size limit"));
    }

    #[test]
    fn error_response_preserves_id_and_question() {
        let query = sample_query(RecordType::A, DNSClass::IN);
        let response = error_response(&query, ResponseCode::FormErr);
        assert_eq!(response.id(), 42);
        assert_eq!(response.response_code(), ResponseCode::FormErr);
        assert_eq!(response.queries().len(), 1);
    }
}
