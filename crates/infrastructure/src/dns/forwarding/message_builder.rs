//! DNS query message construction.
//!
//! Builds `hickory_proto::op::Message` queries. The forwarder, health
//! prober, and capability prober all go through here so record-type
//! mapping and query flags stay in one place.

use ferrous_dns_domain::{DomainError, RecordType};
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{DNSClass, Name, RecordType as HickoryRecordType};
use std::str::FromStr;

/// Builds DNS query messages.
pub struct MessageBuilder;

impl MessageBuilder {
    /// Builds a standard recursive query: random ID, RD set, single question.
    pub fn build_query(domain: &str, record_type: RecordType) -> Result<Message, DomainError> {
        let name = Name::from_str(domain)
            .map_err(|e| DomainError::InvalidDomainName(format!("invalid domain '{domain}': {e}")))?;

        let mut query = Query::new();
        query.set_name(name);
        query.set_query_type(to_hickory_record_type(record_type));
        query.set_query_class(DNSClass::IN);

        let mut message = Message::new(fastrand::u16(..), MessageType::Query, OpCode::Query);
        message.set_recursion_desired(true);
        message.add_query(query);

        Ok(message)
    }
}

fn to_hickory_record_type(record_type: RecordType) -> HickoryRecordType {
    match record_type {
        RecordType::A => HickoryRecordType::A,
        RecordType::AAAA => HickoryRecordType::AAAA,
        RecordType::CNAME => HickoryRecordType::CNAME,
        RecordType::MX => HickoryRecordType::MX,
        RecordType::TXT => HickoryRecordType::TXT,
        RecordType::PTR => HickoryRecordType::PTR,
        RecordType::SRV => HickoryRecordType::SRV,
        RecordType::SOA => HickoryRecordType::SOA,
        RecordType::NS => HickoryRecordType::NS,
        RecordType::NAPTR => HickoryRecordType::NAPTR,
        RecordType::DS => HickoryRecordType::DS,
        RecordType::DNSKEY => HickoryRecordType::DNSKEY,
        RecordType::SVCB => HickoryRecordType::SVCB,
        RecordType::HTTPS => HickoryRecordType::HTTPS,
        RecordType::CAA => HickoryRecordType::CAA,
        RecordType::TLSA => HickoryRecordType::TLSA,
        RecordType::SSHFP => HickoryRecordType::SSHFP,
        RecordType::DNAME => HickoryRecordType::DNAME,
        RecordType::RRSIG => HickoryRecordType::RRSIG,
        RecordType::NSEC => HickoryRecordType::NSEC,
        RecordType::NSEC3 => HickoryRecordType::NSEC3,
        RecordType::NSEC3PARAM => HickoryRecordType::NSEC3PARAM,
        RecordType::CDS => HickoryRecordType::CDS,
        RecordType::CDNSKEY => HickoryRecordType::CDNSKEY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_query_with_rd_set() {
        let message = MessageBuilder::build_query("example.com", RecordType::A).unwrap();
        assert!(message.recursion_desired());
        assert_eq!(message.queries().len(), 1);
        assert_eq!(message.queries()[0].query_type(), HickoryRecordType::A);
    }

    #[test]
    fn builds_aaaa_query() {
        let message = MessageBuilder::build_query("example.com", RecordType::AAAA).unwrap();
        assert_eq!(message.queries()[0].query_type(), HickoryRecordType::AAAA);
    }

    #[test]
    fn rejects_invalid_domain() {
        let result = MessageBuilder::build_query("..bad..", RecordType::A);
        assert!(result.is_err());
    }

    #[test]
    fn ids_are_not_fixed() {
        let a = MessageBuilder::build_query("example.com", RecordType::A).unwrap();
        let b = MessageBuilder::build_query("example.com", RecordType::A).unwrap();
        assert_ne!(a.id(), b.id(), "query IDs should be randomized per call (flaky only at 1/65536 odds)");
    }
}
