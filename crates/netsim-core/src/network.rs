//! The static part of a simulation: nodes, links, interfaces, their addresses and the routes
//! between them.

pub mod address;
pub mod routing;
pub mod topology;
pub mod types;

pub use address::{assign_subnet, AddressAllocator, AddressError, Subnet};
pub use routing::{GlobalRouting, Hop, RoutingAlgo, Routes};
pub use topology::{Topology, TopologyError};
pub use types::*;
