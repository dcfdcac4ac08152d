//! `netsim` is a small deterministic discrete-event network simulator. A simulation is a set of
//! nodes joined by point-to-point, CSMA and Wi-Fi links, with IPv4 addresses assigned per subnet,
//! node positions that may change over time, and echo applications that run in fixed windows.
//! Scenarios can be built in code, expanded from one of the [built-in
//! scenarios](scenarios), or read from a file with [`utils`].

#![warn(unreachable_pub, missing_docs)]

pub use netsim_core::*;

/// Built-in scenarios and reports.
pub mod scenarios {
    pub use netsim_scenarios::*;
}

/// Reading and writing scenario files.
pub mod utils {
    pub use netsim_utils::*;
}
