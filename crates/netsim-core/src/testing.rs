//! Small topologies shared by tests across the workspace.

use crate::network::{
    topology::{Topology, TopologyError},
    types::{IfaceId, LinkParams},
};
use crate::units::{Mbps, Millisecs, Nanosecs};

/// Node 0 is joined to node 1 by a point-to-point link (link 0); node 1 also sits on a CSMA bus
/// with nodes 2 and 3 (link 1). Returns the point-to-point interfaces followed by the bus
/// interfaces.
pub fn router_and_bus() -> Result<(Topology, Vec<IfaceId>), TopologyError> {
    let mut topology = Topology::new();
    let nodes = topology.add_nodes(4);
    let (_, mut ifaces) = topology.connect(
        &nodes[..2],
        LinkParams::point_to_point(Mbps::new(5), Millisecs::new(2)),
    )?;
    let (_, bus) = topology.connect(
        &nodes[1..],
        LinkParams::csma(Mbps::new(100), Nanosecs::new(6560)),
    )?;
    ifaces.extend(bus);
    Ok((topology, ifaces))
}
