//! A point-to-point link joining a Wi-Fi cell to a CSMA bus.
//!
//! ```text
//!   stations ~~~ 0 (AP) --- 1 === 2 ... (bus)
//! ```
//!
//! The stations wander inside a 100 m square while the access point stays put. The last station
//! sends one echo request to the last bus node.

use netsim_core::network::{LinkId, LinkParams, NodeId};
use netsim_core::spec::{LinkSpec, SubnetSpec};
use netsim_core::units::{Mbps, Millisecs, Nanosecs};
use netsim_core::Scenario;

use crate::{echo_client, echo_server, net, nodes, station_grid, station_walk, BuiltIn, Error};

/// The largest station count the grid layout accommodates.
pub const MAX_WIFI_STATIONS: usize = 18;

/// Parameters of the `third` scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, typed_builder::TypedBuilder)]
pub struct Third {
    /// Bus nodes besides node 1. Zero is treated as one.
    #[builder(default = 3)]
    pub n_csma: usize,
    /// Wi-Fi stations.
    #[builder(default = 3)]
    pub n_wifi: usize,
}

impl Default for Third {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BuiltIn for Third {
    fn name(&self) -> &'static str {
        "third"
    }

    fn scenario(&self) -> Result<Scenario, Error> {
        if !(1..=MAX_WIFI_STATIONS).contains(&self.n_wifi) {
            return Err(Error::WifiStations {
                got: self.n_wifi,
                max: MAX_WIFI_STATIONS,
            });
        }
        let n_csma = self.n_csma.max(1);
        let (ap, router) = (NodeId::new(0), NodeId::new(1));
        let mut bus = vec![router];
        bus.extend(nodes(2..2 + n_csma));
        let stations = nodes(2 + n_csma..2 + n_csma + self.n_wifi);
        let server = bus[n_csma];
        let client = stations[self.n_wifi - 1];

        let mut cell = stations.clone();
        cell.push(ap);
        let links = vec![
            LinkSpec::new(
                vec![ap, router],
                LinkParams::point_to_point(Mbps::new(5), Millisecs::new(2)),
            ),
            LinkSpec::new(bus, LinkParams::csma(Mbps::new(100), Nanosecs::new(6560))),
            LinkSpec::new(cell, LinkParams::infrastructure("ns-3-ssid", ap)),
        ];
        let subnets = vec![
            SubnetSpec::new(net(1, 1), vec![LinkId::new(0)]),
            SubnetSpec::new(net(1, 2), vec![LinkId::new(1)]),
            SubnetSpec::new(net(1, 3), vec![LinkId::new(2)]),
        ];
        let apps = vec![
            echo_server(server, 1.0, 10.0),
            echo_client(client, (LinkId::new(1), server), 1, 1024).between(2.0, 10.0),
        ];
        Ok(Scenario::builder()
            .name(self.name())
            .nr_nodes(2 + n_csma + self.n_wifi)
            .links(links)
            .subnets(subnets)
            .grids(vec![station_grid(&stations, ap)])
            .mobility(vec![station_walk(&stations)])
            .apps(apps)
            .watch(vec![client])
            .stop(10.0)
            .build())
    }
}
