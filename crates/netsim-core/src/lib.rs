#![warn(unreachable_pub, missing_debug_implementations)]

//! The core netsim library: a deterministic discrete-event driver for small network topologies.
//! A [`Simulation`] owns the [event queue](event::EventQueue), the [topology](network::Topology)
//! and its addresses, node positions, and timed [applications](app::Application), and drains the
//! queue in timestamp order until a stop time.

#[macro_use]
mod ident;

pub mod app;
pub mod driver;
pub mod event;
pub mod mobility;
pub mod network;
pub mod opts;
pub mod packet;
pub mod propagation;
pub mod spec;
pub mod testing;
pub mod trace;
pub mod units;

pub use driver::{Error, RunSummary, SimState, Simulation};
pub use opts::SimOpts;
pub use spec::{Scenario, SpecError};
