//! Text reports of a configured simulation.

use std::fmt;

use itertools::Itertools;
use netsim_core::mobility::CourseChange;
use netsim_core::network::Topology;
use netsim_core::Simulation;

/// Every assigned address, grouped by subnet.
pub fn addresses(topology: &Topology) -> Addresses<'_> {
    Addresses(topology)
}

/// Every positioned node and where it is.
pub fn locations(sim: &Simulation) -> Locations<'_> {
    Locations(sim)
}

/// One line announcing a node's new position.
pub fn course_change(change: &CourseChange) -> CourseChangeLine<'_> {
    CourseChangeLine(change)
}

/// See [`addresses`].
#[derive(Debug, Clone, Copy)]
pub struct Addresses<'a>(&'a Topology);

impl fmt::Display for Addresses<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let assigned = self
            .0
            .ifaces()
            .filter_map(|iface| Some((iface.subnet()?, iface.address()?, iface)))
            .sorted_by_key(|&(subnet, addr, _)| {
                (u32::from(subnet.network()), subnet.prefix_len(), addr)
            });
        for (subnet, group) in &assigned.group_by(|&(subnet, _, _)| subnet) {
            writeln!(f, "{subnet}")?;
            for (_, addr, iface) in group {
                let kind = self
                    .0
                    .link(iface.link)
                    .map(|link| link.kind.as_str())
                    .unwrap_or("?");
                writeln!(f, "  {addr} node {} link {} ({kind})", iface.node, iface.link)?;
            }
        }
        Ok(())
    }
}

/// See [`locations`].
#[derive(Debug, Clone, Copy)]
pub struct Locations<'a>(&'a Simulation);

impl fmt::Display for Locations<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (node, pos) in self.0.positions() {
            writeln!(f, "node {node}: x = {}, y = {}", pos.x, pos.y)?;
        }
        Ok(())
    }
}

/// See [`course_change`].
#[derive(Debug, Clone, Copy)]
pub struct CourseChangeLine<'a>(&'a CourseChange);

impl fmt::Display for CourseChangeLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let change = self.0;
        write!(
            f,
            "At time {}s node {} moved to x = {}, y = {}",
            change.time.as_secs_f64(),
            change.node,
            change.position.x,
            change.position.y
        )
    }
}

#[cfg(test)]
mod tests {
    use netsim_core::mobility::Position;
    use netsim_core::network::NodeId;
    use netsim_core::units::{Millisecs, Nanosecs};

    use super::*;
    use crate::{BuiltIn, First, Third, WifiFixed};

    #[test]
    fn first_addresses() -> anyhow::Result<()> {
        let sim = First.scenario()?.build()?;
        insta::assert_snapshot!(addresses(sim.topology()).to_string(), @r###"
        10.1.1.0/24
          10.1.1.1 node 1 link 0 (p2p)
          10.1.1.2 node 2 link 0 (p2p)
        10.2.1.0/24
          10.2.1.1 node 1 link 1 (p2p)
          10.2.1.2 node 3 link 1 (p2p)
        "###);
        Ok(())
    }

    #[test]
    fn third_addresses() -> anyhow::Result<()> {
        let sim = Third::builder().n_csma(1).n_wifi(2).build().scenario()?.build()?;
        insta::assert_snapshot!(addresses(sim.topology()).to_string(), @r###"
        10.1.1.0/24
          10.1.1.1 node 0 link 0 (p2p)
          10.1.1.2 node 1 link 0 (p2p)
        10.1.2.0/24
          10.1.2.1 node 1 link 1 (csma)
          10.1.2.2 node 2 link 1 (csma)
        10.1.3.0/24
          10.1.3.1 node 3 link 2 (wifi)
          10.1.3.2 node 4 link 2 (wifi)
          10.1.3.3 node 0 link 2 (wifi)
        "###);
        Ok(())
    }

    #[test]
    fn wifi_fixed_locations() -> anyhow::Result<()> {
        let sim = WifiFixed::builder().distance(50.0).build().scenario()?.build()?;
        insta::assert_snapshot!(locations(&sim).to_string(), @r###"
        node 0: x = 0, y = 0
        node 1: x = 0, y = 50
        node 2: x = 50, y = 0
        node 3: x = 0, y = -50
        node 4: x = -50, y = 0
        "###);
        Ok(())
    }

    #[test]
    fn course_change_line() {
        let change = CourseChange {
            time: Nanosecs::from(Millisecs::new(2500)),
            node: NodeId::new(7),
            position: Position::new(12.5, -3.0, 0.0),
        };
        insta::assert_snapshot!(
            course_change(&change).to_string(),
            @"At time 2.5s node 7 moved to x = 12.5, y = -3"
        );
    }

    #[test]
    fn watched_station_reports_moves() -> anyhow::Result<()> {
        let scenario = Third::default().scenario()?;
        let mut sim = scenario.build()?;
        let changes = sim.course_changes()?;
        sim.run(scenario.stop_time()?)?;
        let lines = changes
            .try_iter()
            .filter(|c| scenario.watch.contains(&c.node))
            .map(|c| course_change(&c).to_string())
            .collect::<Vec<_>>();
        assert!(!lines.is_empty());
        assert!(lines
            .iter()
            .all(|line| line.starts_with("At time ") && line.contains("node 7 moved to")));
        Ok(())
    }

    #[test]
    fn unplaced_nodes_are_left_out() -> anyhow::Result<()> {
        let sim = First.scenario()?.build()?;
        assert_eq!(locations(&sim).to_string(), "");
        Ok(())
    }
}
