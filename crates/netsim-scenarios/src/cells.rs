//! Three Wi-Fi cells whose access points share a CSMA bus.
//!
//! Each bus node is the access point of its own cell with two wandering stations. A station in
//! the second cell talks to the echo server on the first access point, so requests cross from
//! one cell's radio to the bus.

use netsim_core::network::{LinkId, LinkParams};
use netsim_core::spec::{LinkSpec, SubnetSpec};
use netsim_core::units::{Mbps, Nanosecs};
use netsim_core::Scenario;

use crate::{echo_client, echo_server, net, nodes, station_grid, station_walk, BuiltIn, Error};

const SSIDS: [&str; 3] = ["ns-3-ssid", "ns-3-ssid-2", "ns-3-ssid-3"];
const STATIONS_PER_CELL: usize = 2;

/// Parameters of the `cells` scenario. It has none.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Cells;

impl BuiltIn for Cells {
    fn name(&self) -> &'static str {
        "cells"
    }

    fn scenario(&self) -> Result<Scenario, Error> {
        let nr_cells = SSIDS.len();
        let aps = nodes(0..nr_cells);
        let mut links = vec![LinkSpec::new(
            aps.clone(),
            LinkParams::csma(Mbps::new(100), Nanosecs::new(6560)),
        )];
        let mut subnets = vec![SubnetSpec::new(net(1, 1), vec![LinkId::new(0)])];
        let (mut grids, mut mobility) = (Vec::new(), Vec::new());
        let mut cells = Vec::with_capacity(nr_cells);
        for (i, (&ap, ssid)) in aps.iter().zip(SSIDS).enumerate() {
            let first = nr_cells + i * STATIONS_PER_CELL;
            let stations = nodes(first..first + STATIONS_PER_CELL);
            let mut endpoints = stations.clone();
            endpoints.push(ap);
            links.push(LinkSpec::new(endpoints, LinkParams::infrastructure(ssid, ap)));
            subnets.push(SubnetSpec::new(net(1, 2 + i as u8), vec![LinkId::new(1 + i)]));
            grids.push(station_grid(&stations, ap));
            mobility.push(station_walk(&stations));
            cells.push(stations);
        }
        let server = aps[0];
        let client = cells[1][0];
        let apps = vec![
            echo_server(server, 1.0, 10.0),
            echo_client(client, (LinkId::new(0), server), 5, 1024).between(2.0, 10.0),
        ];
        Ok(Scenario::builder()
            .name(self.name())
            .nr_nodes(nr_cells * (1 + STATIONS_PER_CELL))
            .links(links)
            .subnets(subnets)
            .grids(grids)
            .mobility(mobility)
            .apps(apps)
            .stop(10.0)
            .build())
    }
}
