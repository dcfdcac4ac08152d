//! This crate contains the built-in scenarios. Each one is a small parameter struct that expands
//! into a [`Scenario`] with fixed links, subnets, positions and echo applications.

#![warn(unreachable_pub, missing_debug_implementations, missing_docs)]

use std::net::Ipv4Addr;
use std::ops::Range;

use netsim_core::mobility::{Bounds, GridLayout, GridLayoutType, RandomWalk2d};
use netsim_core::network::{LinkId, NodeId, Subnet};
use netsim_core::spec::{AppKind, AppSpec, GridSpec, MobilitySpec, Remote, RuleSpec};
use netsim_core::Scenario;

pub mod cells;
pub mod first;
pub mod report;
pub mod second;
pub mod third;
pub mod wifi_fixed;

pub use cells::Cells;
pub use first::First;
pub use second::Second;
pub use third::Third;
pub use wifi_fixed::WifiFixed;

/// The well-known echo port.
pub const ECHO_PORT: u16 = 9;

/// A scenario that can be expanded from a handful of parameters.
pub trait BuiltIn {
    /// The scenario's name.
    fn name(&self) -> &'static str;

    /// Expands the parameters into a full scenario.
    fn scenario(&self) -> Result<Scenario, Error>;
}

/// Error kinds for built-in scenarios.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Too many or too few Wi-Fi stations for the grid.
    #[error("Number of Wi-Fi stations must be between 1 and {max}, got {got}")]
    WifiStations {
        /// The requested count.
        got: usize,
        /// The largest accepted count.
        max: usize,
    },
}

fn nodes(range: Range<usize>) -> Vec<NodeId> {
    range.map(NodeId::new).collect()
}

/// The `10.b.c.0/24` network.
fn net(b: u8, c: u8) -> Subnet {
    Subnet::slash24(Ipv4Addr::new(10, b, c, 0))
}

fn echo_server(node: NodeId, start: f64, stop: f64) -> AppSpec {
    AppSpec::new(node, start, stop, AppKind::EchoServer { port: ECHO_PORT })
}

fn echo_client(
    node: NodeId,
    server: (LinkId, NodeId),
    max_packets: u32,
    packet_size: u64,
) -> ClientSpec {
    ClientSpec {
        node,
        remote: Remote::Iface {
            link: server.0,
            node: server.1,
            port: ECHO_PORT,
        },
        max_packets,
        packet_size,
    }
}

/// An echo client waiting for its window.
struct ClientSpec {
    node: NodeId,
    remote: Remote,
    max_packets: u32,
    packet_size: u64,
}

impl ClientSpec {
    fn port(mut self, port: u16) -> Self {
        if let Remote::Iface { port: p, .. } = &mut self.remote {
            *p = port;
        }
        self
    }

    fn between(self, start: f64, stop: f64) -> AppSpec {
        AppSpec::new(
            self.node,
            start,
            stop,
            AppKind::EchoClient {
                remote: self.remote,
                max_packets: self.max_packets,
                interval: 1.0,
                packet_size: self.packet_size,
            },
        )
    }
}

/// The area stations wander in.
const WALK_BOUNDS: Bounds = Bounds::new(-50.0, 50.0, -50.0, 50.0);

/// Stations first, then the access point, on a three-wide grid with 5 m columns and 10 m rows.
fn station_grid(stations: &[NodeId], ap: NodeId) -> GridSpec {
    let layout = GridLayout::builder()
        .delta_x(5.0)
        .delta_y(10.0)
        .grid_width(3)
        .layout(GridLayoutType::RowFirst)
        .build();
    let mut nodes = stations.to_vec();
    nodes.push(ap);
    GridSpec::new(nodes, layout)
}

fn station_walk(stations: &[NodeId]) -> MobilitySpec {
    MobilitySpec::new(
        stations.to_vec(),
        RuleSpec::RandomWalk2d(RandomWalk2d::default()),
        WALK_BOUNDS,
    )
}
