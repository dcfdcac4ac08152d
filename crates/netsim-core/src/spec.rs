//! This module defines scenario specifications ([`Scenario`]): a complete, serializable
//! description of a simulation. [`Scenario::build`] validates a scenario and turns it into a
//! ready-to-run [`Simulation`].

use std::net::SocketAddrV4;

use crate::app::{EchoClient, EchoServer};
use crate::driver::{Error, Simulation};
use crate::mobility::{Bounds, ConstantVelocity, GridLayout, Position, RandomWalk2d};
use crate::network::{AddressAllocator, LinkId, LinkParams, NodeId, Subnet};
use crate::opts::SimOpts;
use crate::propagation::RangePropagation;
use crate::trace::{NoopTrace, TraceWriter};
use crate::units::{Bytes, Nanosecs};

/// A simulation scenario. Times are in seconds.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, typed_builder::TypedBuilder)]
pub struct Scenario {
    /// A label for reports.
    #[builder(default, setter(into))]
    #[serde(default)]
    pub name: String,
    #[builder(default)]
    #[serde(default)]
    pub opts: SimOpts,
    /// Nodes are numbered from zero.
    pub nr_nodes: usize,
    /// Links, installed in order. A link's ID is its index.
    #[builder(default)]
    #[serde(default)]
    pub links: Vec<LinkSpec>,
    #[builder(default)]
    #[serde(default)]
    pub subnets: Vec<SubnetSpec>,
    #[builder(default)]
    #[serde(default)]
    pub positions: Vec<PlacementSpec>,
    #[builder(default)]
    #[serde(default)]
    pub grids: Vec<GridSpec>,
    #[builder(default)]
    #[serde(default)]
    pub mobility: Vec<MobilitySpec>,
    #[builder(default)]
    #[serde(default)]
    pub apps: Vec<AppSpec>,
    /// Maximum Wi-Fi range in meters. The default range applies if unset.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub radio_range: Option<f64>,
    /// Nodes whose course changes a runner should report.
    #[builder(default)]
    #[serde(default)]
    pub watch: Vec<NodeId>,
    /// When the simulation stops.
    pub stop: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, derive_new::new)]
pub struct LinkSpec {
    pub endpoints: Vec<NodeId>,
    pub params: LinkParams,
}

/// Addresses from `subnet` go to the interfaces of `links`, link by link, in installation order.
/// Numbering continues across the listed links.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, derive_new::new)]
pub struct SubnetSpec {
    pub subnet: Subnet,
    pub links: Vec<LinkId>,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize, derive_new::new)]
pub struct PlacementSpec {
    pub node: NodeId,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, derive_new::new)]
pub struct GridSpec {
    pub nodes: Vec<NodeId>,
    pub layout: GridLayout,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, derive_new::new)]
pub struct MobilitySpec {
    pub nodes: Vec<NodeId>,
    pub rule: RuleSpec,
    pub bounds: Bounds,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleSpec {
    RandomWalk2d(RandomWalk2d),
    ConstantVelocity(ConstantVelocity),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, derive_new::new)]
pub struct AppSpec {
    pub node: NodeId,
    pub start: f64,
    pub stop: f64,
    pub app: AppKind,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppKind {
    EchoServer {
        port: u16,
    },
    EchoClient {
        remote: Remote,
        max_packets: u32,
        /// Seconds between packets.
        interval: f64,
        packet_size: u64,
    },
}

/// Where an echo client sends to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Remote {
    /// A fixed address.
    Addr(SocketAddrV4),
    /// Whatever address `node`'s interface on `link` ends up with.
    Iface { link: LinkId, node: NodeId, port: u16 },
}

impl Scenario {
    /// The stop time.
    pub fn stop_time(&self) -> Result<Nanosecs, SpecError> {
        secs(self.stop)
    }

    /// Builds a simulation without a trace.
    pub fn build(&self) -> Result<Simulation, Error> {
        self.build_with_trace(NoopTrace)
    }

    /// Builds a simulation that reports to `trace`.
    ///
    /// Correctness properties:
    ///
    /// - Every time is finite and non-negative.
    /// - Every subnet refers to installed links.
    /// - Every remote interface exists and receives an address.
    pub fn build_with_trace(&self, trace: impl TraceWriter + 'static) -> Result<Simulation, Error> {
        // CORRECTNESS: Every time is finite and non-negative.
        self.stop_time()?;
        let mut sim = Simulation::new(self.opts).with_trace(trace);
        if let Some(range) = self.radio_range {
            sim = sim.with_propagation(RangePropagation::new(range));
        }
        sim.add_nodes(self.nr_nodes)?;
        let mut link_ifaces = Vec::with_capacity(self.links.len());
        for link in &self.links {
            let (_, ifaces) = sim.connect(&link.endpoints, link.params.clone())?;
            link_ifaces.push(ifaces);
        }
        for spec in &self.subnets {
            let mut allocator = AddressAllocator::new(spec.subnet);
            for &link in &spec.links {
                // CORRECTNESS: Every subnet refers to installed links.
                let ifaces = link_ifaces
                    .get(link.index())
                    .ok_or(SpecError::UnknownLink(link))?;
                sim.assign(&mut allocator, ifaces)?;
            }
        }
        for &PlacementSpec { node, position } in &self.positions {
            sim.set_position(node, position)?;
        }
        for grid in &self.grids {
            sim.place_on_grid(&grid.nodes, &grid.layout)?;
        }
        for spec in &self.mobility {
            for &node in &spec.nodes {
                match spec.rule {
                    RuleSpec::RandomWalk2d(rule) => sim.set_mobility_rule(node, rule, spec.bounds)?,
                    RuleSpec::ConstantVelocity(rule) => {
                        sim.set_mobility_rule(node, rule, spec.bounds)?
                    }
                }
            }
        }
        for spec in &self.apps {
            let (start, stop) = (secs(spec.start)?, secs(spec.stop)?);
            match &spec.app {
                AppKind::EchoServer { port } => {
                    sim.install(EchoServer::new(*port), spec.node, start, stop)?;
                }
                AppKind::EchoClient {
                    remote,
                    max_packets,
                    interval,
                    packet_size,
                } => {
                    let client = EchoClient::builder()
                        .remote(resolve(&sim, *remote)?)
                        .max_packets(*max_packets)
                        .interval(secs(*interval)?)
                        .packet_size(Bytes::new(*packet_size))
                        .build();
                    sim.install(client, spec.node, start, stop)?;
                }
            }
        }
        Ok(sim)
    }
}

fn secs(t: f64) -> Result<Nanosecs, SpecError> {
    if t.is_finite() && t >= 0.0 {
        Ok(Nanosecs::from_secs_f64(t))
    } else {
        Err(SpecError::InvalidTime(t))
    }
}

fn resolve(sim: &Simulation, remote: Remote) -> Result<SocketAddrV4, SpecError> {
    match remote {
        Remote::Addr(addr) => Ok(addr),
        // CORRECTNESS: Every remote interface exists and receives an address.
        Remote::Iface { link, node, port } => sim
            .topology()
            .iface_on(node, link)
            .and_then(|iface| iface.address())
            .map(|ip| SocketAddrV4::new(ip, port))
            .ok_or(SpecError::UnresolvedRemote { link, node }),
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpecError {
    #[error("Invalid time {0}")]
    InvalidTime(f64),

    #[error("Link {0} does not exist")]
    UnknownLink(LinkId),

    #[error("Node {node} has no address on link {link}")]
    UnresolvedRemote { link: LinkId, node: NodeId },
}
