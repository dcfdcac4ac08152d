//! This module defines the [`SimOpts`] configuration, which describes how a simulation behaves
//! independently of what it simulates.

use crate::packet::{IPV4_HEADER_LEN, UDP_HEADER_LEN};
use crate::units::Bytes;

/// Simulation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, typed_builder::TypedBuilder)]
pub struct SimOpts {
    /// Seed for every random choice the simulation makes.
    #[builder(default = 1)]
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// The first port handed to applications that bind an ephemeral port.
    #[builder(default = 49153)]
    #[serde(default = "default_ephemeral_port_base")]
    pub ephemeral_port_base: u16,
    /// Bytes added to every payload when computing transmission times.
    #[builder(default = Bytes::new((IPV4_HEADER_LEN + UDP_HEADER_LEN) as u64))]
    #[serde(default = "default_header_overhead")]
    pub header_overhead: Bytes,
}

impl Default for SimOpts {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn default_seed() -> u64 {
    SimOpts::default().seed
}

fn default_ephemeral_port_base() -> u16 {
    SimOpts::default().ephemeral_port_base
}

fn default_header_overhead() -> Bytes {
    SimOpts::default().header_overhead
}
