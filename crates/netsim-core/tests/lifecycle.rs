use std::cell::RefCell;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;

use netsim_core::app::{AppContext, AppState, Application, EchoClient, EchoServer};
use netsim_core::mobility::{Bounds, RandomWalk2d};
use netsim_core::network::{LinkParams, Subnet};
use netsim_core::trace::{MemoryTrace, TraceEvent};
use netsim_core::units::{Mbps, Nanosecs, Secs};
use netsim_core::{SimOpts, Simulation};

fn secs(s: u64) -> Nanosecs {
    Secs::new(s).into()
}

#[derive(Debug)]
struct Recorder(Rc<RefCell<Vec<(&'static str, Nanosecs)>>>);

impl Application for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn start(&mut self, ctx: &mut AppContext<'_>) {
        self.0.borrow_mut().push(("activate", ctx.now()));
    }

    fn stop(&mut self, ctx: &mut AppContext<'_>) {
        self.0.borrow_mut().push(("deactivate", ctx.now()));
    }
}

#[test]
fn app_window_inside_longer_run() -> anyhow::Result<()> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut sim = Simulation::default();
    let node = sim.add_node()?;
    let app = sim.install(Recorder(Rc::clone(&log)), node, secs(2), secs(10))?;
    let summary = sim.run(secs(15))?;
    assert_eq!(
        *log.borrow(),
        vec![("activate", secs(2)), ("deactivate", secs(10))]
    );
    assert_eq!(summary.nr_events, 2);
    assert_eq!(summary.now, secs(10));
    assert_eq!(sim.app_state(app), Some(AppState::Stopped));
    assert_eq!(sim.nr_pending(), 0);
    Ok(())
}

#[test]
fn run_stops_before_later_events() -> anyhow::Result<()> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut sim = Simulation::default();
    let node = sim.add_node()?;
    let app = sim.install(Recorder(Rc::clone(&log)), node, secs(2), secs(10))?;
    sim.run(secs(5))?;
    assert_eq!(log.borrow().len(), 1);
    assert_eq!(sim.app_state(app), Some(AppState::Active));
    assert_eq!(sim.nr_pending(), 1);
    Ok(())
}

#[test]
fn random_walk_respects_bounds() -> anyhow::Result<()> {
    let bounds = Bounds::new(-50.0, 50.0, -50.0, 50.0);
    let mut sim = Simulation::new(SimOpts::builder().seed(11).build());
    let nodes = sim.add_nodes(3)?;
    let changes = sim.course_changes()?;
    for &node in &nodes {
        let walk = RandomWalk2d::builder()
            .speed_min(20.0)
            .speed_max(40.0)
            .build();
        sim.set_mobility_rule(node, walk, bounds)?;
    }
    sim.run(secs(100))?;
    let changes = changes.try_iter().collect::<Vec<_>>();
    assert_eq!(changes.len(), 3 * 100);
    assert!(changes.iter().all(|c| bounds.contains(&c.position)));
    assert!(changes.windows(2).all(|w| w[0].time <= w[1].time));
    Ok(())
}

#[test]
fn echo_across_router_and_bus() -> anyhow::Result<()> {
    let trace = MemoryTrace::new();
    let mut sim = Simulation::default().with_trace(trace.clone());
    let nodes = sim.add_nodes(4)?;
    let (_, p2p) = sim.connect(
        &nodes[..2],
        LinkParams::point_to_point(Mbps::new(5), netsim_core::units::Millisecs::new(2)),
    )?;
    let (_, bus) = sim.connect(
        &nodes[1..],
        LinkParams::csma(Mbps::new(100), Nanosecs::new(6560)),
    )?;
    sim.assign_subnet(&p2p, "10.1.1.0/24".parse::<Subnet>()?)?;
    let bus_addrs = sim.assign_subnet(&bus, "10.1.2.0/24".parse::<Subnet>()?)?;
    assert_eq!(bus_addrs[2], Ipv4Addr::new(10, 1, 2, 3));

    let server = SocketAddrV4::new(bus_addrs[2], 9);
    sim.install(EchoServer::new(9), nodes[3], secs(1), secs(10))?;
    sim.install(
        EchoClient::builder().remote(server).max_packets(2).build(),
        nodes[0],
        secs(2),
        secs(10),
    )?;
    let summary = sim.run(secs(10))?;
    assert_eq!(summary.nr_sent, 4);
    assert_eq!(summary.nr_delivered, 4);
    assert_eq!(summary.nr_dropped, 0);

    // The request leaves node 0 from its point-to-point address and crosses the router.
    let records = trace.records();
    let first_hops = records
        .iter()
        .filter(|r| r.packet.id.inner() == 0)
        .map(|r| (r.event, r.node.inner()))
        .collect::<Vec<_>>();
    assert_eq!(
        first_hops,
        vec![
            (TraceEvent::Tx, 0),
            (TraceEvent::Rx, 1),
            (TraceEvent::Tx, 1),
            (TraceEvent::Rx, 3)
        ]
    );
    assert_eq!(records[0].packet.src.ip(), &Ipv4Addr::new(10, 1, 1, 1));
    Ok(())
}

#[test]
fn identical_inputs_identical_traces() -> anyhow::Result<()> {
    let run = || -> anyhow::Result<Vec<String>> {
        let trace = MemoryTrace::new();
        let mut sim = Simulation::default().with_trace(trace.clone());
        let nodes = sim.add_nodes(2)?;
        let (_, ifaces) = sim.connect(
            &nodes,
            LinkParams::point_to_point(Mbps::new(5), netsim_core::units::Millisecs::new(2)),
        )?;
        let addrs = sim.assign_subnet(&ifaces, "10.1.1.0/24".parse::<Subnet>()?)?;
        sim.install(EchoServer::new(9), nodes[1], secs(1), secs(10))?;
        sim.install(
            EchoClient::builder()
                .remote(SocketAddrV4::new(addrs[1], 9))
                .max_packets(5)
                .build(),
            nodes[0],
            secs(2),
            secs(10),
        )?;
        sim.run(secs(10))?;
        Ok(trace.records().iter().map(|r| r.to_string()).collect())
    };
    assert_eq!(run()?, run()?);
    Ok(())
}
