//! Timed applications and their lifecycle.
//!
//! An application is installed on a node with a start and a stop time. Installing schedules an
//! activation and a deactivation event; each instance moves `Idle -> Active -> Stopped` exactly
//! once. Applications never touch the simulation directly. Their hooks receive an [`AppContext`]
//! and record what they want done (bind a port, send a datagram, arm a timer), and the simulation
//! applies those commands once the hook returns.

pub mod echo;

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::event::{EventQueue, ScheduleError};
use crate::network::types::NodeId;
use crate::packet::Packet;
use crate::units::{Bytes, Nanosecs};

pub use echo::{EchoClient, EchoServer};

identifier!(AppId, usize);

/// A traffic source or sink.
pub trait Application: fmt::Debug {
    /// A short name for logs.
    fn name(&self) -> &'static str;

    /// Called once, when the instance becomes active.
    fn start(&mut self, ctx: &mut AppContext<'_>);

    /// Called once, when the instance stops.
    fn stop(&mut self, ctx: &mut AppContext<'_>);

    /// Called when a timer armed through [`AppContext::set_timer`] fires.
    fn on_timer(&mut self, _token: u64, _ctx: &mut AppContext<'_>) {}

    /// Called when a datagram arrives on a port the instance has bound.
    fn on_receive(&mut self, _packet: &Packet, _ctx: &mut AppContext<'_>) {}
}

/// Something an application asked for during a hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    Bind {
        port: u16,
    },
    Unbind {
        port: u16,
    },
    Send {
        src_port: u16,
        dst: SocketAddrV4,
        size: Bytes,
    },
    SetTimer {
        delay: Nanosecs,
        token: u64,
    },
}

/// The view an application has of the simulation while one of its hooks runs.
#[derive(Debug)]
pub struct AppContext<'a> {
    now: Nanosecs,
    node: NodeId,
    addresses: &'a [Ipv4Addr],
    next_ephemeral: &'a mut u16,
    commands: Vec<AppCommand>,
}

impl<'a> AppContext<'a> {
    pub fn new(
        now: Nanosecs,
        node: NodeId,
        addresses: &'a [Ipv4Addr],
        next_ephemeral: &'a mut u16,
    ) -> Self {
        Self {
            now,
            node,
            addresses,
            next_ephemeral,
            commands: Vec::new(),
        }
    }

    pub fn now(&self) -> Nanosecs {
        self.now
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The node's addresses, in interface order.
    pub fn addresses(&self) -> &[Ipv4Addr] {
        self.addresses
    }

    /// Listens on `port`.
    pub fn bind(&mut self, port: u16) {
        self.commands.push(AppCommand::Bind { port });
    }

    /// Listens on a fresh ephemeral port and returns it.
    pub fn bind_ephemeral(&mut self) -> u16 {
        let port = *self.next_ephemeral;
        *self.next_ephemeral = self.next_ephemeral.checked_add(1).unwrap_or(EPHEMERAL_WRAP);
        self.bind(port);
        port
    }

    pub fn unbind(&mut self, port: u16) {
        self.commands.push(AppCommand::Unbind { port });
    }

    /// Sends `size` bytes from local port `src_port` to `dst`.
    pub fn send_to(&mut self, src_port: u16, dst: SocketAddrV4, size: Bytes) {
        self.commands.push(AppCommand::Send { src_port, dst, size });
    }

    /// Arms a timer that fires `delay` from now with `token`.
    pub fn set_timer(&mut self, delay: Nanosecs, token: u64) {
        self.commands.push(AppCommand::SetTimer { delay, token });
    }

    /// The commands recorded so far, in order.
    pub fn into_commands(self) -> Vec<AppCommand> {
        self.commands
    }
}

/// The first port handed out after the ephemeral range wraps around.
const EPHEMERAL_WRAP: u16 = 49152;

/// Where an instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum AppState {
    Idle,
    Active,
    Stopped,
}

/// Lifecycle events, scheduled at install time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Activate(AppId),
    Deactivate(AppId),
}

#[derive(Debug)]
struct AppInstance {
    node: NodeId,
    start: Nanosecs,
    stop: Nanosecs,
    state: AppState,
    app: Box<dyn Application>,
}

/// Owns every installed application instance.
#[derive(Debug, Default)]
pub struct AppScheduler {
    apps: Vec<AppInstance>,
}

impl AppScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `app` on `node`, scheduling its activation at `start` and its deactivation at
    /// `stop` onto `queue`.
    ///
    /// Correctness properties:
    ///
    /// - `stop` is strictly after `start`.
    /// - `start` is not in the past.
    pub fn install<E: From<AppEvent>>(
        &mut self,
        queue: &mut EventQueue<E>,
        app: Box<dyn Application>,
        node: NodeId,
        start: Nanosecs,
        stop: Nanosecs,
    ) -> Result<AppId, ScheduleError> {
        // CORRECTNESS: `stop` is strictly after `start`.
        if stop <= start {
            return Err(ScheduleError::EmptyDuration { start, stop });
        }
        // CORRECTNESS: `start` is not in the past. Checked before anything is scheduled so a
        // failed install leaves the queue untouched.
        if start < queue.now() {
            return Err(ScheduleError::InPast {
                time: start,
                now: queue.now(),
            });
        }
        let id = AppId::new(self.apps.len());
        queue.schedule(start, AppEvent::Activate(id).into())?;
        queue.schedule(stop, AppEvent::Deactivate(id).into())?;
        log::debug!(
            "installed {} as app {id} on node {node}, active {} to {}",
            app.name(),
            start,
            stop
        );
        self.apps.push(AppInstance {
            node,
            start,
            stop,
            state: AppState::Idle,
            app,
        });
        Ok(id)
    }

    /// Moves `id` from `Idle` to `Active` and runs its start hook. Returns false (and does
    /// nothing) if the instance is not idle.
    pub fn activate(&mut self, id: AppId, ctx: &mut AppContext<'_>) -> bool {
        let Some(instance) = self.apps.get_mut(id.index()) else {
            return false;
        };
        if instance.state != AppState::Idle {
            return false;
        }
        instance.state = AppState::Active;
        instance.app.start(ctx);
        true
    }

    /// Moves `id` to `Stopped`, running its stop hook if it was active. Returns false (and does
    /// nothing) if the instance had already stopped.
    pub fn deactivate(&mut self, id: AppId, ctx: &mut AppContext<'_>) -> bool {
        let Some(instance) = self.apps.get_mut(id.index()) else {
            return false;
        };
        match instance.state {
            AppState::Stopped => false,
            AppState::Idle => {
                instance.state = AppState::Stopped;
                true
            }
            AppState::Active => {
                instance.state = AppState::Stopped;
                instance.app.stop(ctx);
                true
            }
        }
    }

    /// Runs `id`'s timer hook if it is active.
    pub fn timer(&mut self, id: AppId, token: u64, ctx: &mut AppContext<'_>) -> bool {
        match self.active_mut(id) {
            Some(app) => {
                app.on_timer(token, ctx);
                true
            }
            None => false,
        }
    }

    /// Runs `id`'s receive hook if it is active.
    pub fn receive(&mut self, id: AppId, packet: &Packet, ctx: &mut AppContext<'_>) -> bool {
        match self.active_mut(id) {
            Some(app) => {
                app.on_receive(packet, ctx);
                true
            }
            None => false,
        }
    }

    fn active_mut(&mut self, id: AppId) -> Option<&mut Box<dyn Application>> {
        self.apps
            .get_mut(id.index())
            .filter(|i| i.state == AppState::Active)
            .map(|i| &mut i.app)
    }

    pub fn state(&self, id: AppId) -> Option<AppState> {
        self.apps.get(id.index()).map(|i| i.state)
    }

    pub fn node(&self, id: AppId) -> Option<NodeId> {
        self.apps.get(id.index()).map(|i| i.node)
    }

    /// The instance's start and stop times.
    pub fn window(&self, id: AppId) -> Option<(Nanosecs, Nanosecs)> {
        self.apps.get(id.index()).map(|i| (i.start, i.stop))
    }

    /// Drops every instance.
    pub fn clear(&mut self) {
        self.apps.clear();
    }

    delegate::delegate! {
        to self.apps {
            #[call(len)]
            pub fn nr_apps(&self) -> usize;
        }
    }
}
