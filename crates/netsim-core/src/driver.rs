//! The simulation driver: owns every component, applies build-time configuration and drains the
//! event queue.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use rustc_hash::FxHashMap;

use crate::app::{AppCommand, AppContext, AppEvent, AppId, AppScheduler, AppState, Application};
use crate::event::{EventQueue, ScheduleError};
use crate::mobility::{
    Bounds, CourseChange, GridLayout, MobilityError, MobilityRule, MobilityTracker, Position,
};
use crate::network::{
    AddressAllocator, AddressError, GlobalRouting, IfaceId, LinkId, LinkParams, NodeId,
    RoutingAlgo, Routes, Subnet, Topology, TopologyError,
};
use crate::opts::SimOpts;
use crate::packet::{Packet, PacketId};
use crate::propagation::{PropagationModel, RangePropagation};
use crate::spec::SpecError;
use crate::trace::{DropReason, NoopTrace, TraceEvent, TraceRecord, TraceWriter};
use crate::units::{Bytes, Nanosecs};

/// Where a simulation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SimState {
    /// Accepting configuration.
    Configured,
    /// Draining the event queue.
    Running,
    /// Finished running; can only be inspected or destroyed.
    Stopped,
    /// Every component has been released.
    Destroyed,
}

impl fmt::Display for SimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SimState::Configured => "configured",
            SimState::Running => "running",
            SimState::Stopped => "stopped",
            SimState::Destroyed => "destroyed",
        };
        write!(f, "{s}")
    }
}

/// What a run did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RunSummary {
    /// The clock when the run ended.
    pub now: Nanosecs,
    pub nr_events: usize,
    pub nr_sent: u64,
    pub nr_delivered: u64,
    pub nr_dropped: u64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stopped at {}s after {} events: {} packets sent, {} delivered, {} dropped",
            self.now.as_secs_f64(),
            self.nr_events,
            self.nr_sent,
            self.nr_delivered,
            self.nr_dropped
        )
    }
}

#[derive(Debug, Clone)]
enum Action {
    App(AppEvent),
    Timer { app: AppId, token: u64 },
    Move(NodeId),
    Arrive { packet: Packet, node: NodeId, link: LinkId },
}

impl From<AppEvent> for Action {
    fn from(event: AppEvent) -> Self {
        Action::App(event)
    }
}

/// A single simulation.
///
/// The topology, addresses, positions and applications are configured first. [`run`](Self::run)
/// then computes routes (unless [`populate_routing_tables`](Self::populate_routing_tables) already
/// did) and dispatches events in timestamp order until the stop time.
pub struct Simulation {
    opts: SimOpts,
    state: SimState,
    queue: EventQueue<Action>,
    topology: Topology,
    mobility: MobilityTracker,
    apps: AppScheduler,
    routes: Option<Routes>,
    sockets: FxHashMap<(NodeId, u16), AppId>,
    ephemeral_ports: FxHashMap<NodeId, u16>,
    next_packet: u64,
    routing: Box<dyn RoutingAlgo>,
    propagation: Box<dyn PropagationModel>,
    trace: Box<dyn TraceWriter>,
    summary: RunSummary,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("state", &self.state)
            .field("now", &self.queue.now())
            .field("pending", &self.queue.len())
            .field("nr_nodes", &self.topology.nr_nodes())
            .field("nr_apps", &self.apps.nr_apps())
            .finish_non_exhaustive()
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(SimOpts::default())
    }
}

impl Simulation {
    /// Creates an empty simulation with global routing, range-limited radio propagation and no
    /// trace.
    pub fn new(opts: SimOpts) -> Self {
        Self {
            opts,
            state: SimState::Configured,
            queue: EventQueue::new(),
            topology: Topology::new(),
            mobility: MobilityTracker::new(opts.seed),
            apps: AppScheduler::new(),
            routes: None,
            sockets: FxHashMap::default(),
            ephemeral_ports: FxHashMap::default(),
            next_packet: 0,
            routing: Box::new(GlobalRouting),
            propagation: Box::new(RangePropagation::default()),
            trace: Box::new(NoopTrace),
            summary: RunSummary::default(),
        }
    }

    pub fn with_routing(mut self, routing: impl RoutingAlgo + 'static) -> Self {
        self.routing = Box::new(routing);
        self
    }

    pub fn with_propagation(mut self, propagation: impl PropagationModel + 'static) -> Self {
        self.propagation = Box::new(propagation);
        self
    }

    pub fn with_trace(mut self, trace: impl TraceWriter + 'static) -> Self {
        self.trace = Box::new(trace);
        self
    }

    fn expect_state(&self, op: &'static str, expected: SimState) -> Result<(), Error> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                op,
                state: self.state,
            })
        }
    }

    fn check_node(&self, node: NodeId) -> Result<(), Error> {
        match self.topology.node(node) {
            Some(_) => Ok(()),
            None => Err(TopologyError::UndeclaredNode(node).into()),
        }
    }

    pub fn add_node(&mut self) -> Result<NodeId, Error> {
        self.expect_state("add a node", SimState::Configured)?;
        Ok(self.topology.add_node())
    }

    pub fn add_nodes(&mut self, n: usize) -> Result<Vec<NodeId>, Error> {
        self.expect_state("add nodes", SimState::Configured)?;
        Ok(self.topology.add_nodes(n))
    }

    /// Installs a link. See [`Topology::connect`].
    pub fn connect(
        &mut self,
        endpoints: &[NodeId],
        params: LinkParams,
    ) -> Result<(LinkId, Vec<IfaceId>), Error> {
        self.expect_state("connect nodes", SimState::Configured)?;
        let installed = self.topology.connect(endpoints, params)?;
        // Routes computed earlier no longer cover the new link.
        self.routes = None;
        Ok(installed)
    }

    /// Assigns addresses from `subnet` to `ifaces`, independently of any earlier assignment.
    pub fn assign_subnet(
        &mut self,
        ifaces: &[IfaceId],
        subnet: Subnet,
    ) -> Result<Vec<Ipv4Addr>, Error> {
        self.expect_state("assign addresses", SimState::Configured)?;
        Ok(crate::network::assign_subnet(
            &mut self.topology,
            ifaces,
            subnet,
        )?)
    }

    /// Assigns the next addresses of `allocator` to `ifaces`.
    pub fn assign(
        &mut self,
        allocator: &mut AddressAllocator,
        ifaces: &[IfaceId],
    ) -> Result<Vec<Ipv4Addr>, Error> {
        self.expect_state("assign addresses", SimState::Configured)?;
        Ok(allocator.assign(&mut self.topology, ifaces)?)
    }

    pub fn set_position(&mut self, node: NodeId, pos: Position) -> Result<(), Error> {
        self.expect_state("place a node", SimState::Configured)?;
        self.check_node(node)?;
        self.mobility.set_position(node, pos);
        Ok(())
    }

    /// Places `nodes` on `grid`, in order.
    pub fn place_on_grid(&mut self, nodes: &[NodeId], grid: &GridLayout) -> Result<(), Error> {
        self.expect_state("place nodes", SimState::Configured)?;
        if let Some(&node) = nodes.iter().find(|&&n| self.topology.node(n).is_none()) {
            return Err(TopologyError::UndeclaredNode(node).into());
        }
        for (&node, pos) in nodes.iter().zip(grid.positions(nodes.len())) {
            self.mobility.set_position(node, pos);
        }
        Ok(())
    }

    /// Makes `node` move under `rule` inside `bounds`. The first move happens one rule interval
    /// from now. Replacing the rule of a node that is already mobile keeps its pending move.
    pub fn set_mobility_rule(
        &mut self,
        node: NodeId,
        rule: impl MobilityRule + 'static,
        bounds: Bounds,
    ) -> Result<(), Error> {
        self.expect_state("set a mobility rule", SimState::Configured)?;
        self.check_node(node)?;
        let was_mobile = self.mobility.is_mobile(node);
        let interval = self.mobility.set_rule(node, Box::new(rule), bounds)?;
        if !was_mobile {
            self.queue.schedule_in(interval, Action::Move(node));
        }
        Ok(())
    }

    /// Calls `f` on every position update.
    pub fn on_course_change(&mut self, f: impl FnMut(&CourseChange) + 'static) -> Result<(), Error> {
        self.expect_state("subscribe to course changes", SimState::Configured)?;
        self.mobility.subscribe(f);
        Ok(())
    }

    /// Returns a receiver of every position update.
    pub fn course_changes(&mut self) -> Result<crossbeam_channel::Receiver<CourseChange>, Error> {
        self.expect_state("subscribe to course changes", SimState::Configured)?;
        Ok(self.mobility.subscribe_channel())
    }

    /// Installs `app` on `node`, active from `start` until `stop`.
    pub fn install(
        &mut self,
        app: impl Application + 'static,
        node: NodeId,
        start: Nanosecs,
        stop: Nanosecs,
    ) -> Result<AppId, Error> {
        self.expect_state("install an application", SimState::Configured)?;
        self.check_node(node)?;
        Ok(self
            .apps
            .install(&mut self.queue, Box::new(app), node, start, stop)?)
    }

    /// Computes routes for the current topology.
    pub fn populate_routing_tables(&mut self) -> Result<&Routes, Error> {
        self.expect_state("compute routes", SimState::Configured)?;
        Ok(self.compute_routes())
    }

    fn compute_routes(&mut self) -> &Routes {
        self.routes.insert(self.routing.compute(&self.topology))
    }

    fn begin(&mut self) -> Result<(), Error> {
        self.expect_state("run", SimState::Configured)?;
        if self.routes.is_none() {
            self.compute_routes();
        }
        self.state = SimState::Running;
        log::debug!(
            "running {} nodes, {} links, {} apps",
            self.topology.nr_nodes(),
            self.topology.nr_links(),
            self.apps.nr_apps()
        );
        Ok(())
    }

    fn finish(&mut self) -> RunSummary {
        self.state = SimState::Stopped;
        self.summary.now = self.queue.now();
        log::debug!("{}", self.summary);
        self.summary
    }

    /// Dispatches every event up to and including `stop`.
    pub fn run(&mut self, stop: Nanosecs) -> Result<RunSummary, Error> {
        self.begin()?;
        while let Some((now, _, action)) = self.queue.pop_until(stop) {
            self.dispatch(now, action);
        }
        Ok(self.finish())
    }

    /// Dispatches events until nothing but mobility updates remain. Those would otherwise go on
    /// forever.
    pub fn run_to_exhaustion(&mut self) -> Result<RunSummary, Error> {
        self.begin()?;
        // Every mobile node always has exactly one move pending.
        while self.queue.len() > self.mobility.nr_mobile() {
            match self.queue.pop_until(Nanosecs::MAX) {
                Some((now, _, action)) => self.dispatch(now, action),
                None => break,
            }
        }
        Ok(self.finish())
    }

    /// Releases every component. Only valid once the simulation has stopped.
    pub fn destroy(&mut self) -> Result<(), Error> {
        self.expect_state("destroy", SimState::Stopped)?;
        self.queue.clear();
        self.apps.clear();
        self.mobility.clear();
        self.sockets.clear();
        self.ephemeral_ports.clear();
        self.routes = None;
        self.topology = Topology::new();
        self.state = SimState::Destroyed;
        Ok(())
    }

    fn dispatch(&mut self, now: Nanosecs, action: Action) {
        log::trace!("{now}: {action:?}");
        self.summary.nr_events += 1;
        match action {
            Action::App(AppEvent::Activate(id)) => {
                self.drive_app(id, now, |apps, ctx| apps.activate(id, ctx));
            }
            Action::App(AppEvent::Deactivate(id)) => {
                self.drive_app(id, now, |apps, ctx| apps.deactivate(id, ctx));
            }
            Action::Timer { app, token } => {
                self.drive_app(app, now, |apps, ctx| apps.timer(app, token, ctx));
            }
            Action::Move(node) => {
                if let Some(interval) = self.mobility.evaluate(node, now) {
                    self.queue.schedule_in(interval, Action::Move(node));
                }
            }
            Action::Arrive { packet, node, link } => {
                self.record(node, Some(link), TraceEvent::Rx, packet);
                self.forward(node, Some(link), packet);
            }
        }
    }

    /// Runs one application hook and applies the commands it recorded.
    fn drive_app<F>(&mut self, id: AppId, now: Nanosecs, hook: F)
    where
        F: FnOnce(&mut AppScheduler, &mut AppContext<'_>) -> bool,
    {
        let Some(node) = self.apps.node(id) else {
            return;
        };
        let addresses = self.topology.addresses_of(node);
        let port = self
            .ephemeral_ports
            .entry(node)
            .or_insert(self.opts.ephemeral_port_base);
        let mut ctx = AppContext::new(now, node, &addresses, port);
        if !hook(&mut self.apps, &mut ctx) {
            log::trace!("app {id} ignored an event in state {:?}", self.apps.state(id));
        }
        for command in ctx.into_commands() {
            self.apply(id, node, command);
        }
    }

    fn apply(&mut self, app: AppId, node: NodeId, command: AppCommand) {
        match command {
            AppCommand::Bind { port } => {
                let owner = *self.sockets.entry((node, port)).or_insert(app);
                if owner != app {
                    log::warn!("app {app}: port {port} on node {node} is taken by app {owner}");
                }
            }
            AppCommand::Unbind { port } => {
                if self.sockets.get(&(node, port)) == Some(&app) {
                    self.sockets.remove(&(node, port));
                }
            }
            AppCommand::Send {
                src_port,
                dst,
                size,
            } => self.send(node, src_port, dst, size),
            AppCommand::SetTimer { delay, token } => {
                self.queue.schedule_in(delay, Action::Timer { app, token });
            }
        }
    }

    fn send(&mut self, node: NodeId, src_port: u16, dst: SocketAddrV4, size: Bytes) {
        let src = SocketAddrV4::new(self.source_address(node, *dst.ip()), src_port);
        let packet = Packet {
            id: PacketId::new(self.next_packet),
            src,
            dst,
            size,
        };
        self.next_packet += 1;
        self.summary.nr_sent += 1;
        self.forward(node, None, packet);
    }

    /// The address of the interface a packet to `dst` leaves `node` through, falling back to the
    /// node's first address.
    fn source_address(&self, node: NodeId, dst: Ipv4Addr) -> Ipv4Addr {
        let local = self.topology.addresses_of(node);
        if local.contains(&dst) {
            return dst;
        }
        self.topology
            .iface_with_address(dst)
            .and_then(|iface| self.routes.as_ref()?.next_hop(node, iface.node))
            .and_then(|hop| self.topology.iface_on(node, hop.link)?.address())
            .or_else(|| local.first().copied())
            .unwrap_or(Ipv4Addr::UNSPECIFIED)
    }

    /// Moves `packet`, currently at `at` (having arrived over `via`, if anywhere), one hop closer
    /// to its destination, or delivers it if it has arrived.
    fn forward(&mut self, at: NodeId, via: Option<LinkId>, packet: Packet) {
        let Some(dst_node) = self
            .topology
            .iface_with_address(*packet.dst.ip())
            .map(|iface| iface.node)
        else {
            return self.drop_packet(at, via, packet, DropReason::NoRoute);
        };
        if dst_node == at {
            return self.deliver(at, via, packet);
        }
        let Some(hop) = self
            .routes
            .as_ref()
            .and_then(|routes| routes.next_hop(at, dst_node))
        else {
            return self.drop_packet(at, via, packet, DropReason::NoRoute);
        };
        let Some(link) = self.topology.link(hop.link) else {
            return self.drop_packet(at, via, packet, DropReason::NoRoute);
        };
        // Stations of an infrastructure network only reach each other through the access point,
        // which forwards the frame on the same channel.
        let next = match link.kind.access_point() {
            Some(ap) if ap != at && ap != hop.node => ap,
            _ => hop.node,
        };
        let reachable = !link.kind.is_wireless() || {
            let from = self.mobility.position(at).unwrap_or_default();
            let to = self.mobility.position(next).unwrap_or_default();
            self.propagation.reachable(&from, &to, link)
        };
        let delay = link.data_rate.length(packet.size + self.opts.header_overhead) + link.delay;
        if !reachable {
            return self.drop_packet(at, Some(hop.link), packet, DropReason::Unreachable);
        }
        self.record(at, Some(hop.link), TraceEvent::Tx, packet);
        self.queue.schedule_in(
            delay,
            Action::Arrive {
                packet,
                node: next,
                link: hop.link,
            },
        );
    }

    fn deliver(&mut self, node: NodeId, via: Option<LinkId>, packet: Packet) {
        let listener = self
            .sockets
            .get(&(node, packet.dst.port()))
            .copied()
            .filter(|&app| self.apps.state(app) == Some(AppState::Active));
        match listener {
            Some(app) => {
                self.summary.nr_delivered += 1;
                let now = self.queue.now();
                self.drive_app(app, now, |apps, ctx| apps.receive(app, &packet, ctx));
            }
            None => self.drop_packet(node, via, packet, DropReason::NoSocket),
        }
    }

    fn drop_packet(&mut self, node: NodeId, link: Option<LinkId>, packet: Packet, reason: DropReason) {
        self.summary.nr_dropped += 1;
        log::warn!(
            "dropped packet {} ({} > {}) at node {node}: {reason:?}",
            packet.id,
            packet.src,
            packet.dst
        );
        self.record(node, link, TraceEvent::Drop(reason), packet);
    }

    fn record(&mut self, node: NodeId, link: Option<LinkId>, event: TraceEvent, packet: Packet) {
        self.trace.record(&TraceRecord {
            time: self.queue.now(),
            node,
            link,
            event,
            packet,
        });
    }

    pub fn opts(&self) -> &SimOpts {
        &self.opts
    }

    pub fn state(&self) -> SimState {
        self.state
    }

    /// The current logical time.
    pub fn now(&self) -> Nanosecs {
        self.queue.now()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// The routes in use, once computed.
    pub fn routes(&self) -> Option<&Routes> {
        self.routes.as_ref()
    }

    /// The latest resolved position of `node`.
    pub fn position(&self, node: NodeId) -> Option<Position> {
        self.mobility.position(node)
    }

    /// Every placed node and its position.
    pub fn positions(&self) -> impl Iterator<Item = (NodeId, Position)> + '_ {
        self.mobility.positions()
    }

    pub fn app_state(&self, id: AppId) -> Option<AppState> {
        self.apps.state(id)
    }

    /// Counters so far.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            now: self.queue.now(),
            ..self.summary
        }
    }

    /// The number of events waiting to be dispatched.
    pub fn nr_pending(&self) -> usize {
        self.queue.len()
    }
}

/// Simulation error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    InvalidTopology(#[from] TopologyError),

    #[error(transparent)]
    InvalidAddress(#[from] AddressError),

    #[error(transparent)]
    InvalidSchedule(#[from] ScheduleError),

    #[error(transparent)]
    InvalidMobility(#[from] MobilityError),

    #[error(transparent)]
    InvalidSpec(#[from] SpecError),

    #[error("cannot {op}: simulation is {state}")]
    InvalidState { op: &'static str, state: SimState },
}
