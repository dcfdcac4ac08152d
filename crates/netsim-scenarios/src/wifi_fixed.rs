//! Four fixed stations around an access point, one on each axis at the same distance.
//!
//! Stations A and B exchange echoes first, then C and D on port 19. Every frame is relayed by the
//! access point, so traffic gets through as long as each station is within radio range of it.

use netsim_core::mobility::Position;
use netsim_core::network::{LinkId, LinkParams, NodeId};
use netsim_core::spec::{AppKind, AppSpec, LinkSpec, PlacementSpec, SubnetSpec};
use netsim_core::Scenario;

use crate::{echo_client, echo_server, net, BuiltIn, Error};

const SECOND_PORT: u16 = 19;

/// Parameters of the `wifi_fixed` scenario.
#[derive(Debug, Clone, Copy, PartialEq, typed_builder::TypedBuilder)]
pub struct WifiFixed {
    /// Distance of every station from the access point, in meters.
    #[builder(default = 115.0)]
    pub distance: f64,
    /// Radio range override, in meters.
    #[builder(default, setter(strip_option))]
    pub radio_range: Option<f64>,
}

impl Default for WifiFixed {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BuiltIn for WifiFixed {
    fn name(&self) -> &'static str {
        "wifi_fixed"
    }

    fn scenario(&self) -> Result<Scenario, Error> {
        let d = self.distance;
        let n = NodeId::new;
        let (ap, a, b, c, dd) = (n(0), n(1), n(2), n(3), n(4));
        let positions = vec![
            PlacementSpec::new(ap, Position::ORIGIN),
            PlacementSpec::new(a, Position::new(0.0, d, 0.0)),
            PlacementSpec::new(b, Position::new(d, 0.0, 0.0)),
            PlacementSpec::new(c, Position::new(0.0, -d, 0.0)),
            PlacementSpec::new(dd, Position::new(-d, 0.0, 0.0)),
        ];
        let link = LinkId::new(0);
        let apps = vec![
            echo_server(b, 1.0, 10.0),
            echo_client(a, (link, b), 2, 1024).between(2.0, 6.0),
            AppSpec::new(dd, 11.0, 20.0, AppKind::EchoServer { port: SECOND_PORT }),
            echo_client(c, (link, dd), 2, 1024)
                .port(SECOND_PORT)
                .between(12.0, 15.0),
        ];
        let scenario = Scenario::builder()
            .name(self.name())
            .nr_nodes(5)
            .links(vec![LinkSpec::new(
                vec![ap, a, b, c, dd],
                LinkParams::infrastructure("ns-3-ssid", ap),
            )])
            .subnets(vec![SubnetSpec::new(net(1, 1), vec![link])])
            .positions(positions)
            .apps(apps)
            .stop(20.0);
        Ok(match self.radio_range {
            Some(range) => scenario.radio_range(range).build(),
            None => scenario.build(),
        })
    }
}
