//! Radio reachability between positioned nodes.

use std::fmt;

use derivative::Derivative;

use crate::mobility::Position;
use crate::network::types::Link;

/// Decides whether a frame sent on a wireless link from one position reaches another.
pub trait PropagationModel: fmt::Debug {
    fn reachable(&self, from: &Position, to: &Position, link: &Link) -> bool;
}

impl<P: PropagationModel + ?Sized> PropagationModel for Box<P> {
    fn reachable(&self, from: &Position, to: &Position, link: &Link) -> bool {
        (**self).reachable(from, to, link)
    }
}

/// Frames reach every receiver within `max_range` meters and none beyond.
#[derive(Debug, Clone, Copy, PartialEq, Derivative, serde::Serialize, serde::Deserialize)]
#[derivative(Default)]
pub struct RangePropagation {
    #[derivative(Default(value = "110.0"))]
    pub max_range: f64,
}

impl RangePropagation {
    pub fn new(max_range: f64) -> Self {
        Self { max_range }
    }
}

impl PropagationModel for RangePropagation {
    fn reachable(&self, from: &Position, to: &Position, _link: &Link) -> bool {
        from.distance(to) <= self.max_range
    }
}

/// Every frame reaches every receiver.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnboundedPropagation;

impl PropagationModel for UnboundedPropagation {
    fn reachable(&self, _from: &Position, _to: &Position, _link: &Link) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{LinkParams, Topology};

    #[test]
    fn range_cutoff() -> anyhow::Result<()> {
        let mut topology = Topology::new();
        let nodes = topology.add_nodes(2);
        let (link, _) = topology.connect(&nodes, LinkParams::wifi("ns-3-ssid"))?;
        let link = topology.link(link).unwrap();
        let ap = Position::ORIGIN;
        let model = RangePropagation::default();
        assert_eq!(model.max_range, 110.0);
        assert!(model.reachable(&ap, &Position::new(110.0, 0.0, 0.0), link));
        assert!(!model.reachable(&ap, &Position::new(0.0, 115.0, 0.0), link));
        assert!(UnboundedPropagation.reachable(&ap, &Position::new(1e6, 0.0, 0.0), link));
        Ok(())
    }
}
