use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use petgraph::{
    graph::NodeIndex,
    visit::{EdgeRef, VisitMap, Visitable},
};
use rustc_hash::FxHashMap;

use crate::network::{
    topology::Topology,
    types::{LinkId, NodeId},
};

/// The trait that must be implemented by route computations. It is invoked once the topology and
/// its addresses are final, before any traffic starts.
pub trait RoutingAlgo {
    /// Computes next-hop tables for every node of `topology`.
    fn compute(&self, topology: &Topology) -> Routes;
}

impl<R: RoutingAlgo + ?Sized> RoutingAlgo for Box<R> {
    fn compute(&self, topology: &Topology) -> Routes {
        (**self).compute(topology)
    }
}

/// One step along a route: the neighbor to hand a packet to and the link to use.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Hop {
    pub node: NodeId,
    pub link: LinkId,
}

pub(crate) type HopMatrix = FxHashMap<NodeId, HopMap>;
pub(crate) type HopMap = FxHashMap<NodeId, Vec<Hop>>;

/// Next-hop tables for every node. Each entry lists every neighbor on a shortest path, sorted by
/// node and then link ID.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Routes {
    inner: HopMatrix,
}

impl Routes {
    /// Every shortest-path next hop from `from` towards `to`.
    pub fn next_hops(&self, from: NodeId, to: NodeId) -> &[Hop] {
        self.inner
            .get(&from)
            .and_then(|m| m.get(&to))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The next hop from `from` towards `to`. Ties are broken by the lowest node and link ID, so
    /// repeated runs forward identically.
    pub fn next_hop(&self, from: NodeId, to: NodeId) -> Option<Hop> {
        self.next_hops(from, to).first().copied()
    }

    /// A stable ordering of the tables, for display and tests.
    pub fn sorted(&self) -> BTreeMap<NodeId, BTreeMap<NodeId, Vec<Hop>>> {
        self.inner
            .iter()
            .map(|(&from, m)| (from, m.iter().map(|(&to, h)| (to, h.clone())).collect()))
            .collect()
    }
}

impl fmt::Display for Routes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (from, table) in self.sorted() {
            for (to, hops) in table {
                let hops = hops
                    .iter()
                    .map(|h| format!("{} (link {})", h.node, h.link))
                    .collect::<Vec<_>>()
                    .join(", ");
                writeln!(f, "{from} -> {to}: via {hops}")?;
            }
        }
        Ok(())
    }
}

/// Shortest-hop-count routing over the whole topology, in the manner of a global routing
/// helper that sees every link. Every node forwards.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalRouting;

impl RoutingAlgo for GlobalRouting {
    /// Builds the routing tables with one BFS per destination.
    fn compute(&self, topology: &Topology) -> Routes {
        let g = &topology.graph;
        let mut hops = HopMatrix::default();
        for start in g.node_indices() {
            let mut discovered = g.visit_map();
            discovered.visit(start);

            let mut queue = VecDeque::new();
            queue.push_back(start);

            let mut distances: FxHashMap<NodeIndex, usize> = [(start, 0)].into_iter().collect();

            while let Some(n) = queue.pop_front() {
                let cur_distance = distances[&n];
                for edge in g.edges(n) {
                    let succ = if edge.source() == n {
                        edge.target()
                    } else {
                        edge.source()
                    };
                    if discovered.visit(succ) {
                        distances.insert(succ, cur_distance + 1);
                        queue.push_back(succ);
                    }
                    // `succ` reaches `start` through `n` whenever `n` is one hop closer.
                    if distances[&succ] == cur_distance + 1 {
                        hops.entry(g[succ])
                            .or_default()
                            .entry(g[start])
                            .or_default()
                            .push(Hop {
                                node: g[n],
                                link: *edge.weight(),
                            });
                    }
                }
            }
        }
        for table in hops.values_mut() {
            for choices in table.values_mut() {
                choices.sort();
                choices.dedup();
            }
        }
        log::debug!("computed routes for {} nodes", hops.len());
        Routes { inner: hops }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::types::LinkParams;
    use crate::testing;
    use crate::units::{Mbps, Millisecs};

    #[test]
    fn route_three_node_chain_succeeds() -> anyhow::Result<()> {
        let mut topo = Topology::new();
        let n = topo.add_nodes(3);
        let p2p = LinkParams::point_to_point(Mbps::new(5), Millisecs::new(2));
        topo.connect(&[n[0], n[1]], p2p.clone())?;
        topo.connect(&[n[1], n[2]], p2p)?;
        let routes = GlobalRouting.compute(&topo);
        insta::assert_snapshot!(routes.to_string(), @r###"
        0 -> 1: via 1 (link 0)
        0 -> 2: via 1 (link 0)
        1 -> 0: via 0 (link 0)
        1 -> 2: via 2 (link 1)
        2 -> 0: via 1 (link 1)
        2 -> 1: via 1 (link 1)
        "###);
        Ok(())
    }

    #[test]
    fn route_bus_behind_router_succeeds() -> anyhow::Result<()> {
        let (topo, _) = testing::router_and_bus()?;
        let routes = GlobalRouting.compute(&topo);
        insta::assert_snapshot!(routes.to_string(), @r###"
        0 -> 1: via 1 (link 0)
        0 -> 2: via 1 (link 0)
        0 -> 3: via 1 (link 0)
        1 -> 0: via 0 (link 0)
        1 -> 2: via 2 (link 1)
        1 -> 3: via 3 (link 1)
        2 -> 0: via 1 (link 1)
        2 -> 1: via 1 (link 1)
        2 -> 3: via 3 (link 1)
        3 -> 0: via 1 (link 1)
        3 -> 1: via 1 (link 1)
        3 -> 2: via 2 (link 1)
        "###);
        Ok(())
    }

    #[test]
    fn equal_cost_paths_sorted() -> anyhow::Result<()> {
        // A square: 0-1, 1-3, 0-2, 2-3.
        let mut topo = Topology::new();
        let n = topo.add_nodes(4);
        let p2p = LinkParams::point_to_point(Mbps::new(5), Millisecs::new(2));
        topo.connect(&[n[0], n[1]], p2p.clone())?;
        topo.connect(&[n[1], n[3]], p2p.clone())?;
        topo.connect(&[n[0], n[2]], p2p.clone())?;
        topo.connect(&[n[2], n[3]], p2p)?;
        let routes = GlobalRouting.compute(&topo);
        assert_eq!(
            routes.next_hops(n[0], n[3]),
            &[
                Hop {
                    node: n[1],
                    link: LinkId::new(0)
                },
                Hop {
                    node: n[2],
                    link: LinkId::new(2)
                },
            ]
        );
        assert_eq!(routes.next_hop(n[3], n[0]).map(|h| h.node), Some(n[1]));
        Ok(())
    }

    #[test]
    fn disconnected_nodes_have_no_route() {
        let mut topo = Topology::new();
        let n = topo.add_nodes(2);
        let routes = GlobalRouting.compute(&topo);
        assert!(routes.next_hop(n[0], n[1]).is_none());
        assert!(routes.next_hops(n[1], n[0]).is_empty());
    }
}
