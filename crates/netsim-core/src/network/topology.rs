use std::net::Ipv4Addr;

use itertools::Itertools;
use petgraph::graph::{NodeIndex, UnGraph};

use crate::network::address::Subnet;
use crate::network::types::{IfaceId, Interface, Link, LinkId, LinkParams, Node, NodeId};

/// The nodes, links and interfaces of a simulated network.
///
/// Everything is stored in arenas and referred to by index, so handles stay valid for the life of
/// the topology. An undirected adjacency graph with one edge per pair of nodes sharing a link is
/// maintained alongside for route computation.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    nodes: Vec<Node>,
    links: Vec<Link>,
    ifaces: Vec<Interface>,
    pub(crate) graph: UnGraph<NodeId, LinkId>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its ID. IDs are handed out densely, starting at zero.
    pub fn add_node(&mut self) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        let idx = self.graph.add_node(id);
        debug_assert_eq!(idx.index(), id.index());
        self.nodes.push(Node::new(id));
        id
    }

    /// Adds `n` nodes and returns their IDs in creation order.
    pub fn add_nodes(&mut self, n: usize) -> Vec<NodeId> {
        (0..n).map(|_| self.add_node()).collect()
    }

    /// Installs a link between `endpoints` and attaches one new interface per endpoint. The
    /// returned interfaces are in the same order as `endpoints`.
    ///
    /// Correctness properties:
    ///
    /// - A point-to-point link has exactly two distinct endpoints.
    /// - A shared medium has at least one endpoint, with no node listed twice.
    /// - Every endpoint is a declared node.
    /// - An access point is one of the endpoints.
    pub fn connect(
        &mut self,
        endpoints: &[NodeId],
        params: LinkParams,
    ) -> Result<(LinkId, Vec<IfaceId>), TopologyError> {
        // CORRECTNESS: Every endpoint is a declared node.
        if let Some(&id) = endpoints.iter().find(|id| id.index() >= self.nodes.len()) {
            return Err(TopologyError::UndeclaredNode(id));
        }
        // CORRECTNESS: An access point is one of the endpoints.
        if let Some(ap) = params.kind.access_point() {
            if !endpoints.contains(&ap) {
                return Err(TopologyError::AccessPointNotAttached(ap));
            }
        }
        if params.kind.is_shared() {
            // CORRECTNESS: A shared medium has at least one endpoint, with no node listed twice.
            if endpoints.is_empty() {
                return Err(TopologyError::EmptyMedium);
            }
            if let Some(&id) = endpoints.iter().duplicates().next() {
                return Err(TopologyError::DuplicateEndpoint(id));
            }
        } else {
            // CORRECTNESS: A point-to-point link has exactly two distinct endpoints.
            if endpoints.len() != 2 {
                return Err(TopologyError::WrongEndpointCount {
                    expected: 2,
                    got: endpoints.len(),
                });
            }
            if endpoints[0] == endpoints[1] {
                return Err(TopologyError::NodeAdjacentSelf(endpoints[0]));
            }
        }
        let link_id = LinkId::new(self.links.len());
        let mut ifaces = Vec::with_capacity(endpoints.len());
        for &node in endpoints {
            let iface_id = IfaceId::new(self.ifaces.len());
            self.ifaces.push(Interface {
                id: iface_id,
                node,
                link: link_id,
                address: None,
            });
            self.nodes[node.index()].ifaces.push(iface_id);
            ifaces.push(iface_id);
        }
        for (&a, &b) in endpoints.iter().tuple_combinations() {
            self.graph
                .add_edge(NodeIndex::new(a.index()), NodeIndex::new(b.index()), link_id);
        }
        log::debug!(
            "installed {} link {} between {} nodes",
            params.kind.as_str(),
            link_id,
            endpoints.len()
        );
        self.links.push(Link {
            id: link_id,
            kind: params.kind,
            data_rate: params.data_rate,
            delay: params.delay,
            ifaces: ifaces.clone(),
        });
        Ok((link_id, ifaces))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.index())
    }

    pub fn iface(&self, id: IfaceId) -> Option<&Interface> {
        self.ifaces.get(id.index())
    }

    /// The interface `node` has on `link`, if it is attached to it.
    pub fn iface_on(&self, node: NodeId, link: LinkId) -> Option<&Interface> {
        self.node(node)?
            .ifaces()
            .iter()
            .map(|&id| &self.ifaces[id.index()])
            .find(|iface| iface.link == link)
    }

    /// Every address assigned to `node`, in interface order.
    pub fn addresses_of(&self, node: NodeId) -> Vec<Ipv4Addr> {
        self.node(node)
            .map(|n| {
                n.ifaces()
                    .iter()
                    .filter_map(|&id| self.ifaces[id.index()].address())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The interface holding `addr`. Independent assignments may hand the same address to several
    /// interfaces; the earliest installed one wins.
    pub fn iface_with_address(&self, addr: Ipv4Addr) -> Option<&Interface> {
        self.ifaces.iter().find(|iface| iface.address() == Some(addr))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    pub fn ifaces(&self) -> impl Iterator<Item = &Interface> {
        self.ifaces.iter()
    }

    pub(crate) fn set_address(&mut self, id: IfaceId, addr: Ipv4Addr, subnet: Subnet) {
        self.ifaces[id.index()].address = Some((addr, subnet));
    }

    delegate::delegate! {
        to self.nodes {
            #[call(len)]
            pub fn nr_nodes(&self) -> usize;
        }

        to self.links {
            #[call(len)]
            pub fn nr_links(&self) -> usize;
        }

        to self.ifaces {
            #[call(len)]
            pub fn nr_ifaces(&self) -> usize;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("Node {0} is not declared")]
    UndeclaredNode(NodeId),

    #[error("Node {0} is connected to itself")]
    NodeAdjacentSelf(NodeId),

    #[error("Point-to-point link needs {expected} endpoints, got {got}")]
    WrongEndpointCount { expected: usize, got: usize },

    #[error("Shared medium has no endpoints")]
    EmptyMedium,

    #[error("Node {0} is attached to the same medium twice")]
    DuplicateEndpoint(NodeId),

    #[error("Access point {0} is not attached to its channel")]
    AccessPointNotAttached(NodeId),
}
