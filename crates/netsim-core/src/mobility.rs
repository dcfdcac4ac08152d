//! Node positions and the rules that move them.
//!
//! The [`MobilityTracker`] owns every node's latest position. Mobile nodes carry a
//! [`MobilityRule`] that the simulation re-evaluates at the rule's cadence; each proposal is
//! clipped to the node's [`Bounds`] before it is stored, and every stored update is announced
//! synchronously to the tracker's subscribers.

use std::collections::BTreeMap;
use std::f64::consts::TAU;
use std::fmt;

use derivative::Derivative;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::network::types::NodeId;
use crate::units::{Nanosecs, Secs};

/// A point in space, in meters.
#[derive(Debug, Default, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Position {
    pub const ORIGIN: Position = Position::new(0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Position) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// An axis-aligned rectangle in the xy-plane.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Bounds {
    pub const fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    fn is_valid(&self) -> bool {
        self.x_min <= self.x_max && self.y_min <= self.y_max
    }

    pub fn contains(&self, pos: &Position) -> bool {
        (self.x_min..=self.x_max).contains(&pos.x) && (self.y_min..=self.y_max).contains(&pos.y)
    }

    /// The closest point to `pos` inside the rectangle. `z` is left alone.
    pub fn clip(&self, pos: Position) -> Position {
        Position {
            x: pos.x.clamp(self.x_min, self.x_max),
            y: pos.y.clamp(self.y_min, self.y_max),
            z: pos.z,
        }
    }
}

/// Decides where a mobile node goes next.
pub trait MobilityRule: fmt::Debug {
    /// The simulated time between two evaluations.
    fn interval(&self) -> Nanosecs;

    /// Proposes the node's next position. The proposal is clipped to the node's bounds by the
    /// caller.
    fn propose(&mut self, current: Position, rng: &mut StdRng) -> Position;
}

/// Every interval, pick a uniformly random direction and a uniformly random speed, and walk in
/// that direction for the whole interval.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize, typed_builder::TypedBuilder)]
pub struct RandomWalk2d {
    /// Minimum speed, in m/s.
    #[builder(default = 2.0)]
    pub speed_min: f64,
    /// Maximum speed, in m/s.
    #[builder(default = 4.0)]
    pub speed_max: f64,
    /// Time between direction changes.
    #[builder(default = Nanosecs::from(Secs::new(1)), setter(into))]
    pub interval: Nanosecs,
}

impl Default for RandomWalk2d {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MobilityRule for RandomWalk2d {
    fn interval(&self) -> Nanosecs {
        self.interval
    }

    fn propose(&mut self, current: Position, rng: &mut StdRng) -> Position {
        let direction = rng.gen_range(0.0..TAU);
        let speed = if self.speed_min < self.speed_max {
            rng.gen_range(self.speed_min..=self.speed_max)
        } else {
            self.speed_min
        };
        let distance = speed * self.interval.as_secs_f64();
        Position {
            x: current.x + distance * direction.cos(),
            y: current.y + distance * direction.sin(),
            z: current.z,
        }
    }
}

/// Move by a fixed velocity every interval.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize, derive_new::new)]
pub struct ConstantVelocity {
    /// Velocity, in m/s along each axis.
    pub velocity: Position,
    pub interval: Nanosecs,
}

impl MobilityRule for ConstantVelocity {
    fn interval(&self) -> Nanosecs {
        self.interval
    }

    fn propose(&mut self, current: Position, _rng: &mut StdRng) -> Position {
        let dt = self.interval.as_secs_f64();
        Position {
            x: current.x + self.velocity.x * dt,
            y: current.y + self.velocity.y * dt,
            z: current.z + self.velocity.z * dt,
        }
    }
}

/// Grid traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Derivative, serde::Serialize, serde::Deserialize)]
#[derivative(Default)]
#[serde(rename_all = "snake_case")]
pub enum GridLayoutType {
    /// Fill a row of `grid_width` positions before starting the next one.
    #[derivative(Default)]
    RowFirst,
    /// Fill a column of `grid_width` positions before starting the next one.
    ColumnFirst,
}

/// Places nodes on a regular grid.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize, typed_builder::TypedBuilder)]
pub struct GridLayout {
    #[builder(default)]
    pub min_x: f64,
    #[builder(default)]
    pub min_y: f64,
    #[builder(default = 1.0)]
    pub delta_x: f64,
    #[builder(default = 1.0)]
    pub delta_y: f64,
    #[builder(default = 10)]
    pub grid_width: usize,
    #[builder(default)]
    #[serde(default)]
    pub layout: GridLayoutType,
}

impl GridLayout {
    /// The `i`th position handed out by the grid.
    pub fn position(&self, i: usize) -> Position {
        let width = self.grid_width.max(1);
        let (major, minor) = (i / width, i % width);
        let (col, row) = match self.layout {
            GridLayoutType::RowFirst => (minor, major),
            GridLayoutType::ColumnFirst => (major, minor),
        };
        Position {
            x: self.min_x + self.delta_x * col as f64,
            y: self.min_y + self.delta_y * row as f64,
            z: 0.0,
        }
    }

    /// The first `n` positions.
    pub fn positions(&self, n: usize) -> Vec<Position> {
        (0..n).map(|i| self.position(i)).collect()
    }
}

/// A position update, announced to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct CourseChange {
    pub time: Nanosecs,
    pub node: NodeId,
    pub position: Position,
}

type Subscriber = Box<dyn FnMut(&CourseChange)>;

#[derive(Debug)]
struct MobilityRecord {
    position: Position,
    rule: Option<(Box<dyn MobilityRule>, Bounds)>,
}

/// Tracks the position of every placed node.
pub struct MobilityTracker {
    records: BTreeMap<NodeId, MobilityRecord>,
    subscribers: Vec<Subscriber>,
    rng: StdRng,
}

impl fmt::Debug for MobilityTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MobilityTracker")
            .field("records", &self.records)
            .field("nr_subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl MobilityTracker {
    /// Creates an empty tracker whose rules draw randomness from `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            records: BTreeMap::new(),
            subscribers: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Places `node` at `pos`. A node with a mobility rule keeps it, and `pos` is clipped to the
    /// rule's bounds.
    pub fn set_position(&mut self, node: NodeId, pos: Position) {
        let record = self.records.entry(node).or_insert(MobilityRecord {
            position: pos,
            rule: None,
        });
        record.position = match &record.rule {
            Some((_, bounds)) => bounds.clip(pos),
            None => pos,
        };
    }

    /// Makes `node` mobile. Its current position (or the origin, if it has none) is clipped to
    /// `bounds`. Returns the delay until the first evaluation.
    pub fn set_rule(
        &mut self,
        node: NodeId,
        rule: Box<dyn MobilityRule>,
        bounds: Bounds,
    ) -> Result<Nanosecs, MobilityError> {
        if !bounds.is_valid() {
            return Err(MobilityError::InvalidBounds(bounds));
        }
        let interval = rule.interval();
        if interval == Nanosecs::ZERO {
            return Err(MobilityError::ZeroInterval(node));
        }
        let record = self.records.entry(node).or_insert(MobilityRecord {
            position: Position::ORIGIN,
            rule: None,
        });
        record.position = bounds.clip(record.position);
        record.rule = Some((rule, bounds));
        Ok(interval)
    }

    /// The latest resolved position of `node`.
    pub fn position(&self, node: NodeId) -> Option<Position> {
        self.records.get(&node).map(|r| r.position)
    }

    /// Returns true if `node` moves under a rule.
    pub fn is_mobile(&self, node: NodeId) -> bool {
        self.records
            .get(&node)
            .map_or(false, |r| r.rule.is_some())
    }

    /// The number of nodes moving under a rule.
    pub fn nr_mobile(&self) -> usize {
        self.records.values().filter(|r| r.rule.is_some()).count()
    }

    /// Every placed node and its position, by node ID.
    pub fn positions(&self) -> impl Iterator<Item = (NodeId, Position)> + '_ {
        self.records.iter().map(|(&id, r)| (id, r.position))
    }

    /// Calls `f` on every position update.
    pub fn subscribe(&mut self, f: impl FnMut(&CourseChange) + 'static) {
        self.subscribers.push(Box::new(f));
    }

    /// Returns a receiver that gets a copy of every position update.
    pub fn subscribe_channel(&mut self) -> crossbeam_channel::Receiver<CourseChange> {
        let (s, r) = crossbeam_channel::unbounded();
        // A dropped receiver only means nobody is listening anymore.
        self.subscribe(move |change| {
            let _ = s.send(*change);
        });
        r
    }

    /// Applies `node`'s rule once at time `now` and notifies subscribers. Returns the delay until
    /// the next evaluation, or `None` if the node is not mobile.
    pub fn evaluate(&mut self, node: NodeId, now: Nanosecs) -> Option<Nanosecs> {
        let record = self.records.get_mut(&node)?;
        let (rule, bounds) = record.rule.as_mut()?;
        let proposed = rule.propose(record.position, &mut self.rng);
        record.position = bounds.clip(proposed);
        let interval = rule.interval();
        let change = CourseChange {
            time: now,
            node,
            position: record.position,
        };
        log::trace!("node {node} moved to {}", change.position);
        for subscriber in &mut self.subscribers {
            subscriber(&change);
        }
        Some(interval)
    }

    /// Forgets every node and subscriber.
    pub fn clear(&mut self) {
        self.records.clear();
        self.subscribers.clear();
    }
}

/// Mobility configuration error.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum MobilityError {
    #[error("invalid bounds {0:?}")]
    InvalidBounds(Bounds),

    #[error("mobility rule for node {0} has a zero interval")]
    ZeroInterval(NodeId),
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::units::Millisecs;

    const BOUNDS: Bounds = Bounds::new(-50.0, 50.0, -50.0, 50.0);

    #[test]
    fn random_walk_stays_in_bounds() -> anyhow::Result<()> {
        let mut tracker = MobilityTracker::new(7);
        let node = NodeId::new(0);
        // Fast enough to hit the walls many times.
        let walk = RandomWalk2d::builder()
            .speed_min(30.0)
            .speed_max(80.0)
            .interval(Millisecs::new(500))
            .build();
        tracker.set_position(node, Position::new(10.0, 20.0, 0.0));
        let interval = tracker.set_rule(node, Box::new(walk), BOUNDS)?;
        let mut now = Nanosecs::ZERO;
        for _ in 0..2_000 {
            now += interval;
            tracker.evaluate(node, now);
            let pos = tracker.position(node).unwrap();
            assert!(BOUNDS.contains(&pos), "{pos} escaped the bounds");
        }
        Ok(())
    }

    #[test]
    fn initial_position_is_clipped() -> anyhow::Result<()> {
        let mut tracker = MobilityTracker::new(0);
        let node = NodeId::new(3);
        tracker.set_position(node, Position::new(120.0, -75.0, 1.5));
        tracker.set_rule(node, Box::new(RandomWalk2d::default()), BOUNDS)?;
        assert_eq!(tracker.position(node), Some(Position::new(50.0, -50.0, 1.5)));
        // Later explicit placements are clipped too.
        tracker.set_position(node, Position::new(-90.0, 0.0, 0.0));
        assert_eq!(tracker.position(node), Some(Position::new(-50.0, 0.0, 0.0)));
        Ok(())
    }

    #[test]
    fn constant_velocity_clips_at_wall() -> anyhow::Result<()> {
        let mut tracker = MobilityTracker::new(0);
        let node = NodeId::new(0);
        let rule = ConstantVelocity::new(Position::new(30.0, 0.0, 0.0), Secs::new(1).into());
        tracker.set_rule(node, Box::new(rule), BOUNDS)?;
        let xs = (1..=3)
            .map(|t| {
                tracker.evaluate(node, Secs::new(t).into());
                tracker.position(node).unwrap().x
            })
            .collect::<Vec<_>>();
        assert_eq!(xs, vec![30.0, 50.0, 50.0]);
        Ok(())
    }

    #[test]
    fn same_seed_same_walk() -> anyhow::Result<()> {
        let walk = |seed| -> anyhow::Result<Vec<Position>> {
            let mut tracker = MobilityTracker::new(seed);
            let node = NodeId::new(0);
            tracker.set_rule(node, Box::new(RandomWalk2d::default()), BOUNDS)?;
            Ok((1..=20)
                .map(|t| {
                    tracker.evaluate(node, Secs::new(t).into());
                    tracker.position(node).unwrap()
                })
                .collect())
        };
        assert_eq!(walk(42)?, walk(42)?);
        assert_ne!(walk(42)?, walk(43)?);
        Ok(())
    }

    #[test]
    fn subscribers_see_every_update() -> anyhow::Result<()> {
        let mut tracker = MobilityTracker::new(1);
        let node = NodeId::new(2);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        tracker.subscribe(move |change| sink.borrow_mut().push(change.time));
        let rx = tracker.subscribe_channel();
        tracker.set_rule(node, Box::new(RandomWalk2d::default()), BOUNDS)?;
        for t in 1..=3 {
            tracker.evaluate(node, Secs::new(t).into());
        }
        let expected = (1..=3).map(|t| Secs::new(t).into()).collect::<Vec<Nanosecs>>();
        assert_eq!(*seen.borrow(), expected);
        let changes = rx.try_iter().collect::<Vec<_>>();
        assert_eq!(changes.len(), 3);
        assert!(changes.iter().all(|c| c.node == node));
        assert_eq!(changes[2].position, tracker.position(node).unwrap());
        Ok(())
    }

    #[test]
    fn fixed_nodes_are_not_evaluated() {
        let mut tracker = MobilityTracker::new(0);
        let node = NodeId::new(0);
        tracker.set_position(node, Position::new(1.0, 2.0, 3.0));
        assert_eq!(tracker.evaluate(node, Nanosecs::ZERO), None);
        assert_eq!(tracker.evaluate(NodeId::new(9), Nanosecs::ZERO), None);
        assert!(!tracker.is_mobile(node));
    }

    #[test]
    fn invalid_rules_fail() {
        let mut tracker = MobilityTracker::new(0);
        let node = NodeId::new(0);
        let inverted = Bounds::new(10.0, -10.0, 0.0, 1.0);
        assert!(matches!(
            tracker.set_rule(node, Box::new(RandomWalk2d::default()), inverted),
            Err(MobilityError::InvalidBounds(..))
        ));
        let still = ConstantVelocity::new(Position::ORIGIN, Nanosecs::ZERO);
        assert!(matches!(
            tracker.set_rule(node, Box::new(still), BOUNDS),
            Err(MobilityError::ZeroInterval(..))
        ));
    }

    #[test]
    fn grid_layouts() {
        let grid = GridLayout::builder()
            .delta_x(5.0)
            .delta_y(10.0)
            .grid_width(3)
            .build();
        let xy = |ps: Vec<Position>| ps.into_iter().map(|p| (p.x, p.y)).collect::<Vec<_>>();
        assert_eq!(
            xy(grid.positions(4)),
            vec![(0.0, 0.0), (5.0, 0.0), (10.0, 0.0), (0.0, 10.0)]
        );
        let columns = GridLayout {
            layout: GridLayoutType::ColumnFirst,
            ..grid
        };
        assert_eq!(
            xy(columns.positions(4)),
            vec![(0.0, 0.0), (0.0, 10.0), (0.0, 20.0), (5.0, 0.0)]
        );
    }
}
