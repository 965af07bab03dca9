//! Identifiers, packets, events and the sink that records them.

use serde::{Deserialize, Serialize};

// nodes are addressed by their stable index into the simulation's node table
pub type NodeId = usize;
pub type PacketId = u64;
pub type Rank = u32;

// virtual time, in abstract simulation units
pub type SimTime = f64;

/// The routing root and data sink
pub const SINK_ID: NodeId = 0;

/// Rank of a node without a usable upstream route
pub const INFINITE_RANK: Rank = Rank::MAX;

// ============================================================================
// Roles and operational states
// ============================================================================

/// Behavioral role assigned to a node at setup
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Legitimate,
    /// Drops everything it is asked to forward, advertises an attractive rank
    Blackhole,
    /// Drops with a probability that grows as its battery drains
    Selfish,
    /// Advertises a fixed low rank, forwards honestly
    RankAttacker,
}

impl Role {
    pub fn is_attacker(&self) -> bool {
        !matches!(self, Role::Legitimate)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Legitimate => "legitimate",
            Role::Blackhole => "blackhole",
            Role::Selfish => "selfish",
            Role::RankAttacker => "rank_attacker",
        }
    }
}

/// Lifecycle of a node on the scheduler
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationalState {
    /// No parent selected yet
    Bootstrapping,
    /// Has a parent; originates data and advertises
    Joined,
    /// Lost its parent; silent until reselection succeeds
    Isolated,
    /// Energy exhausted. Terminal.
    Dead,
}

impl OperationalState {
    pub fn is_alive(&self) -> bool {
        !matches!(self, OperationalState::Dead)
    }
}

/// Terminal outcome of a data packet that did not reach the sink
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DropReason {
    Blackhole,
    Selfish,
    Channel,
    NoRoute,
}

impl DropReason {
    pub const ALL: [DropReason; 4] = [
        DropReason::Blackhole,
        DropReason::Selfish,
        DropReason::Channel,
        DropReason::NoRoute,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DropReason::Blackhole => "blackhole",
            DropReason::Selfish => "selfish",
            DropReason::Channel => "channel",
            DropReason::NoRoute => "no_route",
        }
    }
}

// ============================================================================
// Packets
// ============================================================================

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PacketKind {
    Data,
    Ack { acked: PacketId },
    Advertisement { rank: Rank, version: u64 },
}

impl PacketKind {
    pub fn label(&self) -> &'static str {
        match self {
            PacketKind::Data => "data",
            PacketKind::Ack { .. } => "ack",
            PacketKind::Advertisement { .. } => "advertisement",
        }
    }
}

/// A packet on its current hop.
///
/// Packets are never edited in place; forwarding produces a re-addressed copy
/// that keeps the id and creation time. The only stamp applied after creation
/// is the delivery time at the sink.
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    pub id: PacketId,
    pub kind: PacketKind,
    pub source: NodeId,
    /// Final destination for data, the broadcaster for advertisements
    pub destination: NodeId,
    /// Transmitter of the current hop
    pub sender: NodeId,
    /// `None` for broadcasts
    pub next_hop: Option<NodeId>,
    pub created_at: SimTime,
    pub delivered_at: Option<SimTime>,
    pub size: u32,
    pub hops: u32,
}

impl Packet {
    pub fn data(id: PacketId, source: NodeId, destination: NodeId, created_at: SimTime, size: u32) -> Self {
        Self {
            id,
            kind: PacketKind::Data,
            source,
            destination,
            sender: source,
            next_hop: None,
            created_at,
            delivered_at: None,
            size,
            hops: 0,
        }
    }

    pub fn advertisement(id: PacketId, broadcaster: NodeId, rank: Rank, version: u64, now: SimTime) -> Self {
        Self {
            id,
            kind: PacketKind::Advertisement { rank, version },
            source: broadcaster,
            destination: broadcaster,
            sender: broadcaster,
            next_hop: None,
            created_at: now,
            delivered_at: None,
            size: CONTROL_PACKET_SIZE,
            hops: 0,
        }
    }

    pub fn ack(id: PacketId, from: NodeId, to: NodeId, acked: PacketId, now: SimTime) -> Self {
        Self {
            id,
            kind: PacketKind::Ack { acked },
            source: from,
            destination: to,
            sender: from,
            next_hop: Some(to),
            created_at: now,
            delivered_at: None,
            size: CONTROL_PACKET_SIZE,
            hops: 0,
        }
    }

    /// Copy of this packet handed from `sender` to `next_hop`
    pub fn forwarded(&self, sender: NodeId, next_hop: NodeId) -> Self {
        Self {
            sender,
            next_hop: Some(next_hop),
            hops: self.hops + 1,
            ..self.clone()
        }
    }

    pub fn stamp_delivered(&mut self, now: SimTime) {
        if self.delivered_at.is_none() {
            self.delivered_at = Some(now);
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self.kind, PacketKind::Data)
    }
}

pub const CONTROL_PACKET_SIZE: u32 = 16;

// ============================================================================
// Event Logging System
// ============================================================================

/// Notable per-node occurrences, emitted for debugging and analysis
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StateChange {
        from: OperationalState,
        to: OperationalState,
    },
    ParentSwitch {
        from: Option<NodeId>,
        to: NodeId,
    },
    PacketDelivered {
        packet: PacketId,
        delay: SimTime,
    },
    PacketDropped {
        packet: PacketId,
        reason: DropReason,
    },
    ReportMade {
        suspect: NodeId,
        truthful: bool,
    },
}

/// Trait for consuming events from the simulation
pub trait EventSink {
    fn log(&mut self, time: SimTime, node: NodeId, event: Event);
}

/// No-op event sink (default)
pub struct NoOpSink;

impl EventSink for NoOpSink {
    #[inline(always)]
    fn log(&mut self, _time: SimTime, _node: NodeId, _event: Event) {}
}

/// Forwards events to the `log` facade at debug level
pub struct LogSink;

impl EventSink for LogSink {
    fn log(&mut self, time: SimTime, node: NodeId, event: Event) {
        log::debug!("{:>9.3} n{:<4} {:?}", time, node, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarded_keeps_identity() {
        let p = Packet::data(7, 3, SINK_ID, 12.5, 64);
        let first = p.forwarded(3, 2);
        assert_eq!(first.id, 7);
        assert_eq!(first.hops, 1);
        assert_eq!(first.next_hop, Some(2));

        let second = first.forwarded(2, 1);
        assert_eq!(second.hops, 2);
        assert_eq!(second.sender, 2);
        assert_eq!(second.created_at, 12.5);
        assert_eq!(second.source, 3);
    }

    #[test]
    fn test_delivery_stamp_applied_once() {
        let mut p = Packet::data(1, 1, SINK_ID, 0.0, 64);
        p.stamp_delivered(10.0);
        p.stamp_delivered(20.0);
        assert_eq!(p.delivered_at, Some(10.0));
    }

    #[test]
    fn test_role_helpers() {
        assert!(!Role::Legitimate.is_attacker());
        assert!(Role::Blackhole.is_attacker());
        assert!(Role::Selfish.is_attacker());
        assert!(Role::RankAttacker.is_attacker());
        assert!(!OperationalState::Dead.is_alive());
        assert!(OperationalState::Isolated.is_alive());
    }
}
