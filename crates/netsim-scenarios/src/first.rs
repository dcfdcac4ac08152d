//! A router with three point-to-point spokes. Two of the spokes get a subnet each; the slow
//! third spoke stays unaddressed. Each addressed leaf runs an echo client against its own
//! address, so every exchange stays on the node.

use netsim_core::network::{LinkId, LinkParams, NodeId};
use netsim_core::spec::{LinkSpec, SubnetSpec};
use netsim_core::units::{BitsPerSec, Mbps, Millisecs};
use netsim_core::Scenario;

use crate::{echo_client, echo_server, net, BuiltIn, Error};

/// Parameters of the `first` scenario. It has none.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct First;

impl BuiltIn for First {
    fn name(&self) -> &'static str {
        "first"
    }

    fn scenario(&self) -> Result<Scenario, Error> {
        let n = NodeId::new;
        let fast = LinkParams::point_to_point(Mbps::new(5), Millisecs::new(3));
        let slow = LinkParams::point_to_point(BitsPerSec::new(1_500_000), Millisecs::new(10));
        let links = vec![
            LinkSpec::new(vec![n(1), n(2)], fast.clone()),
            LinkSpec::new(vec![n(1), n(3)], fast),
            LinkSpec::new(vec![n(1), n(0)], slow),
        ];
        let subnets = vec![
            SubnetSpec::new(net(1, 1), vec![LinkId::new(0)]),
            SubnetSpec::new(net(2, 1), vec![LinkId::new(1)]),
        ];
        let apps = vec![
            echo_server(n(1), 1.0, 15.0),
            echo_server(n(2), 1.0, 15.0),
            echo_client(n(2), (LinkId::new(0), n(2)), 100, 1024).between(2.0, 12.0),
            echo_server(n(1), 1.0, 15.0),
            echo_server(n(3), 1.0, 15.0),
            echo_client(n(3), (LinkId::new(1), n(3)), 50, 1024).between(4.0, 14.0),
        ];
        Ok(Scenario::builder()
            .name(self.name())
            .nr_nodes(4)
            .links(links)
            .subnets(subnets)
            .apps(apps)
            .stop(15.0)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_spoke_has_no_addresses() -> anyhow::Result<()> {
        let sim = First.scenario()?.build()?;
        let topo = sim.topology();
        assert_eq!(topo.nr_links(), 3);
        let slow = topo.link(LinkId::new(2)).unwrap();
        assert!(slow
            .ifaces()
            .iter()
            .all(|&i| topo.iface(i).unwrap().address().is_none()));
        assert_eq!(
            topo.addresses_of(NodeId::new(1)),
            vec!["10.1.1.1".parse::<std::net::Ipv4Addr>()?, "10.2.1.1".parse()?]
        );
        Ok(())
    }

    #[test]
    fn self_echo_stays_on_node() -> anyhow::Result<()> {
        let scenario = First.scenario()?;
        let mut sim = scenario.build()?;
        let summary = sim.run(scenario.stop_time()?)?;
        // Node 2 sends from 2 s to 11 s, node 3 from 4 s to 13 s; each request is echoed.
        assert_eq!(summary.nr_sent, 2 * (10 + 10));
        assert_eq!(summary.nr_delivered, summary.nr_sent);
        assert_eq!(summary.nr_dropped, 0);
        Ok(())
    }
}
