//! Service discovery using mDNS/DNS-SD
//!
//! Advertises the Wyoming TCP port on the local network so voice clients
//! can discover the gateway without manual configuration

pub mod mdns;

pub use mdns::MdnsAdvertiser;
