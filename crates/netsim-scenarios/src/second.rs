//! A chain of point-to-point links with a CSMA bus hanging off node 1.
//!
//! ```text
//!   3 --- 2 --- 0 --- 1 === 4 ... (bus)
//! ```
//!
//! Node 0 first exchanges echoes with node 3 across the chain, then with the last bus node.

use netsim_core::network::{LinkId, LinkParams, NodeId};
use netsim_core::spec::{LinkSpec, SubnetSpec};
use netsim_core::units::{Mbps, Millisecs, Nanosecs};
use netsim_core::Scenario;

use crate::{echo_client, echo_server, net, nodes, BuiltIn, Error};

const NR_CHAIN_NODES: usize = 4;

/// Parameters of the `second` scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, typed_builder::TypedBuilder)]
pub struct Second {
    /// Bus nodes besides node 1. Zero is treated as one.
    #[builder(default = 2)]
    pub n_csma: usize,
}

impl Default for Second {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BuiltIn for Second {
    fn name(&self) -> &'static str {
        "second"
    }

    fn scenario(&self) -> Result<Scenario, Error> {
        let n_csma = self.n_csma.max(1);
        let n = NodeId::new;
        let p2p = LinkParams::point_to_point(Mbps::new(20), Millisecs::new(10));
        let mut bus = vec![n(1)];
        bus.extend(nodes(NR_CHAIN_NODES..NR_CHAIN_NODES + n_csma));
        let last = *bus.last().unwrap_or(&n(1));
        let links = vec![
            LinkSpec::new(vec![n(0), n(1)], p2p.clone()),
            LinkSpec::new(vec![n(0), n(2)], p2p.clone()),
            LinkSpec::new(vec![n(2), n(3)], p2p),
            LinkSpec::new(bus, LinkParams::csma(Mbps::new(100), Nanosecs::new(13120))),
        ];
        let subnets = vec![
            SubnetSpec::new(net(1, 1), vec![LinkId::new(0)]),
            SubnetSpec::new(net(2, 1), vec![LinkId::new(1)]),
            SubnetSpec::new(net(3, 1), vec![LinkId::new(2)]),
            SubnetSpec::new(net(1, 2), vec![LinkId::new(3)]),
        ];
        let apps = vec![
            echo_server(n(3), 1.0, 5.0),
            echo_client(n(0), (LinkId::new(2), n(3)), 50, 2048).between(2.0, 4.0),
            echo_server(last, 8.0, 15.0),
            echo_client(n(0), (LinkId::new(3), last), 3, 2048).between(9.0, 11.0),
        ];
        Ok(Scenario::builder()
            .name(self.name())
            .nr_nodes(NR_CHAIN_NODES + n_csma)
            .links(links)
            .subnets(subnets)
            .apps(apps)
            .stop(15.0)
            .build())
    }
}
