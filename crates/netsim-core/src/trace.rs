//! Per-hop packet traces.

use std::cell::RefCell;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use crate::network::types::{LinkId, NodeId};
use crate::packet::Packet;
use crate::units::Nanosecs;

/// What happened to a packet at a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEvent {
    /// Handed to a link.
    Tx,
    /// Received from a link.
    Rx,
    /// Discarded.
    Drop(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// No node holds the destination address, or no route leads to it.
    NoRoute,
    /// The next hop is out of radio range.
    Unreachable,
    /// Nothing listens on the destination port.
    NoSocket,
}

/// One trace entry. The raw frame is only built when asked for.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TraceRecord {
    pub time: Nanosecs,
    pub node: NodeId,
    /// The link the packet was sent or received on, if any.
    pub link: Option<LinkId>,
    pub event: TraceEvent,
    pub packet: Packet,
}

impl TraceRecord {
    /// The packet as it appears on the wire.
    pub fn frame(&self) -> Vec<u8> {
        self.packet.encode()
    }
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.event {
            TraceEvent::Tx => "+",
            TraceEvent::Rx => "r",
            TraceEvent::Drop(_) => "d",
        };
        write!(f, "{tag} {:.9} node {}", self.time.as_secs_f64(), self.node)?;
        if let Some(link) = self.link {
            write!(f, " link {link}")?;
        }
        write!(
            f,
            " {} > {} id {} length {}",
            self.packet.src,
            self.packet.dst,
            self.packet.id,
            self.packet.wire_len()
        )?;
        if let TraceEvent::Drop(reason) = self.event {
            write!(f, " ({reason:?})")?;
        }
        Ok(())
    }
}

/// Receives every trace record, synchronously.
pub trait TraceWriter: fmt::Debug {
    fn record(&mut self, record: &TraceRecord);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTrace;

impl TraceWriter for NoopTrace {
    fn record(&mut self, _record: &TraceRecord) {}
}

/// Keeps every record in memory. Clones share the same buffer, so a clone kept by the caller sees
/// what the simulation recorded.
#[derive(Debug, Default, Clone)]
pub struct MemoryTrace {
    records: Rc<RefCell<Vec<TraceRecord>>>,
}

impl MemoryTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything recorded so far.
    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }
}

impl TraceWriter for MemoryTrace {
    fn record(&mut self, record: &TraceRecord) {
        self.records.borrow_mut().push(record.clone());
    }
}

/// Writes one line per record.
pub struct AsciiTrace<W> {
    out: W,
    failed: bool,
}

impl<W> fmt::Debug for AsciiTrace<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsciiTrace")
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl<W: Write> AsciiTrace<W> {
    pub fn new(out: W) -> Self {
        Self { out, failed: false }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TraceWriter for AsciiTrace<W> {
    fn record(&mut self, record: &TraceRecord) {
        if self.failed {
            return;
        }
        // A write failure is reported once; the simulation carries on without the trace.
        if let Err(e) = writeln!(self.out, "{record}") {
            log::warn!("trace write failed, disabling trace: {e}");
            self.failed = true;
        }
    }
}
