use std::net::Ipv4Addr;

use crate::network::address::Subnet;
use crate::units::{BitsPerSec, Mbps, Millisecs, Nanosecs};

identifier!(NodeId, usize);
identifier!(LinkId, usize);
identifier!(IfaceId, usize);

/// A simulated host. Its identity is fixed at creation; interfaces are attached as links are
/// installed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Node {
    pub id: NodeId,
    pub(crate) ifaces: Vec<IfaceId>,
}

impl Node {
    pub(crate) fn new(id: NodeId) -> Self {
        Self {
            id,
            ifaces: Vec::new(),
        }
    }

    /// The node's interfaces, in installation order.
    pub fn ifaces(&self) -> &[IfaceId] {
        &self.ifaces
    }
}

/// The medium a link models.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// A dedicated link between exactly two interfaces.
    PointToPoint,
    /// A shared wired bus.
    Csma,
    /// A shared wireless channel. Hops across it are subject to the propagation model.
    Wifi {
        /// The service set the channel belongs to.
        ssid: String,
        /// The access point, if the channel is an infrastructure network. Stations then only
        /// talk to each other through it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ap: Option<NodeId>,
    },
}

impl LinkKind {
    /// Returns true if the medium is shared between any number of interfaces.
    pub fn is_shared(&self) -> bool {
        !matches!(self, LinkKind::PointToPoint)
    }

    /// Returns true if the medium is wireless.
    pub fn is_wireless(&self) -> bool {
        matches!(self, LinkKind::Wifi { .. })
    }

    /// The access point of an infrastructure Wi-Fi channel.
    pub fn access_point(&self) -> Option<NodeId> {
        match self {
            LinkKind::Wifi { ap, .. } => *ap,
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::PointToPoint => "p2p",
            LinkKind::Csma => "csma",
            LinkKind::Wifi { .. } => "wifi",
        }
    }
}

/// Link configuration, given to [`Topology::connect`](super::Topology::connect).
#[derive(
    Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, typed_builder::TypedBuilder,
)]
pub struct LinkParams {
    /// The medium.
    pub kind: LinkKind,
    /// The data rate of every attached interface.
    #[builder(default = BitsPerSec::from(Mbps::new(5)), setter(into))]
    pub data_rate: BitsPerSec,
    /// The propagation delay.
    #[builder(default = Nanosecs::from(Millisecs::new(2)), setter(into))]
    pub delay: Nanosecs,
}

impl LinkParams {
    pub fn point_to_point(data_rate: impl Into<BitsPerSec>, delay: impl Into<Nanosecs>) -> Self {
        Self {
            kind: LinkKind::PointToPoint,
            data_rate: data_rate.into(),
            delay: delay.into(),
        }
    }

    pub fn csma(data_rate: impl Into<BitsPerSec>, delay: impl Into<Nanosecs>) -> Self {
        Self {
            kind: LinkKind::Csma,
            data_rate: data_rate.into(),
            delay: delay.into(),
        }
    }

    /// An ad hoc Wi-Fi channel at 54 Mbps with no propagation delay of its own.
    pub fn wifi(ssid: impl Into<String>) -> Self {
        Self {
            kind: LinkKind::Wifi {
                ssid: ssid.into(),
                ap: None,
            },
            data_rate: Mbps::new(54).into(),
            delay: Nanosecs::ZERO,
        }
    }

    /// Like [`wifi`](Self::wifi), but every frame between two stations is relayed by `ap`.
    pub fn infrastructure(ssid: impl Into<String>, ap: NodeId) -> Self {
        Self {
            kind: LinkKind::Wifi {
                ssid: ssid.into(),
                ap: Some(ap),
            },
            ..Self::wifi("")
        }
    }
}

/// An installed medium and the interfaces attached to it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Link {
    pub id: LinkId,
    pub kind: LinkKind,
    pub data_rate: BitsPerSec,
    pub delay: Nanosecs,
    pub(crate) ifaces: Vec<IfaceId>,
}

impl Link {
    /// The attached interfaces, in installation order.
    pub fn ifaces(&self) -> &[IfaceId] {
        &self.ifaces
    }
}

/// A node's attachment point to a link.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Interface {
    pub id: IfaceId,
    pub node: NodeId,
    pub link: LinkId,
    pub(crate) address: Option<(Ipv4Addr, Subnet)>,
}

impl Interface {
    /// The interface's address, once one has been assigned.
    pub fn address(&self) -> Option<Ipv4Addr> {
        self.address.map(|(addr, _)| addr)
    }

    /// The subnet the interface's address was drawn from.
    pub fn subnet(&self) -> Option<Subnet> {
        self.address.map(|(_, subnet)| subnet)
    }
}
