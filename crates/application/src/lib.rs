//! Ferrous DNS Application Layer
//!
//! Ports describe the seams to external collaborators (configuration store,
//! authoritative-zone matcher, statistics sink) and to the core subsystems
//! (response cache, forwarder, rate limiter) that `ferrous-dns-infrastructure`
//! implements. Use cases orchestrate ports; they hold no I/O of their own.
pub mod ports;
pub mod use_cases;

pub use use_cases::HandleDnsQueryUseCase;
