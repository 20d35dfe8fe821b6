//! Ferrous DNS Infrastructure Layer
//!
//! Implements the ports declared by `ferrous-dns-application`: response
//! cache, forwarder, rate limiter. Also owns the ingress/handler pipeline,
//! the EDNS0 cookie store, pipelined TCP connection pool, and the
//! background capability prober — none of which are ports, since nothing
//! outside this crate needs to swap them out.
pub mod dns;
