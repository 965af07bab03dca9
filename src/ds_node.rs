//! Node operational state machine.
//!
//! A node is a plain record addressed by id. The driver calls one of its
//! handlers each time an event for it is popped; the handler mutates the node,
//! appends to the statistics and returns what should happen next as
//! [`NodeAction`]s. Nothing here touches the scheduler or the channel directly.

use hashbrown::HashSet;
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ds_assessor::{AdvertisementUpdate, LocalAssessor};
use crate::ds_attacker::{behavior_for, ForwardingContext, ForwardingVerdict, RoleBehavior};
use crate::ds_config::SimConfig;
use crate::ds_decision::{DecisionUnit, ForwardingDecision, ParentDecision};
use crate::ds_energy::{Debit, EnergyLedger, EnergyOp};
use crate::ds_error::{ensure_positive, ConfigError, Result};
use crate::ds_interface::{
    DropReason, Event, EventSink, NodeId, OperationalState, Packet, PacketId, PacketKind, Rank, Role, SimTime,
    INFINITE_RANK, SINK_ID,
};
use crate::ds_routing::RoutingState;
use crate::ds_stats::{Game, Statistics};
use crate::ds_topology::Topology;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// Time between two data packets from the same source
    pub generation_interval: f64,
    pub packet_size: u32,
    /// Hops after which a data packet is given up
    pub hop_limit: u32,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            generation_interval: 100.0,
            packet_size: 64,
            hop_limit: 32,
        }
    }
}

impl TrafficConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("traffic.generation_interval", self.generation_interval)?;
        if self.hop_limit == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "traffic.hop_limit",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Driver interface
// ============================================================================

/// Per-node timers
#[derive(Debug, Clone, PartialEq)]
pub enum Timer {
    Advertise,
    Generate,
    /// Re-run the forwarding game for a packet held earlier
    HoldRetry { packet: Packet, holds: u32 },
    AckTimeout { neighbor: NodeId, packet: PacketId },
}

/// Side effects a handler asks the driver to carry out
#[derive(Debug, Clone, PartialEq)]
pub enum NodeAction {
    /// Put a packet on the air; unicast when `to` is set, broadcast otherwise
    Transmit { packet: Packet, to: Option<NodeId> },
    Schedule { delay: SimTime, timer: Timer },
    /// Let the previous hop see what this node did with its packet
    Observe { observer: NodeId, cooperated: bool },
    Report { suspect: NodeId },
}

/// Everything a handler may read or append to besides the node itself
pub struct NodeContext<'a> {
    pub now: SimTime,
    pub config: &'a SimConfig,
    pub topology: &'a Topology,
    pub rng: &'a mut StdRng,
    pub stats: &'a mut Statistics,
    pub events: &'a mut dyn EventSink,
    pub actions: &'a mut Vec<NodeAction>,
}

// ============================================================================
// Node
// ============================================================================

pub struct DsNode {
    id: NodeId,
    role: Role,
    behavior: &'static dyn RoleBehavior,
    state: OperationalState,
    energy: EnergyLedger,
    assessor: LocalAssessor,
    routing: RoutingState,
    pending_acks: HashSet<PacketId>,
    next_packet_seq: u32,
    transmissions: u64,
    originated: u64,
}

impl DsNode {
    pub fn new(id: NodeId, role: Role, config: &SimConfig) -> Self {
        let is_root = id == SINK_ID;
        Self {
            id,
            role,
            behavior: behavior_for(role),
            state: if is_root {
                OperationalState::Joined
            } else {
                OperationalState::Bootstrapping
            },
            energy: EnergyLedger::new(config.energy.initial),
            assessor: LocalAssessor::new(config.assessor.clone()),
            routing: if is_root { RoutingState::new_root() } else { RoutingState::new() },
            pending_acks: HashSet::new(),
            next_packet_seq: 0,
            transmissions: 0,
            originated: 0,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> OperationalState {
        self.state
    }

    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    pub fn energy(&self) -> &EnergyLedger {
        &self.energy
    }

    pub fn assessor(&self) -> &LocalAssessor {
        &self.assessor
    }

    pub fn routing(&self) -> &RoutingState {
        &self.routing
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.routing.parent()
    }

    /// Packets this node put on the air, all kinds
    pub fn transmissions(&self) -> u64 {
        self.transmissions
    }

    /// Data packets this node originated
    pub fn originated(&self) -> u64 {
        self.originated
    }

    /// Replace the energy budget; only meaningful before the run starts
    pub fn set_initial_energy(&mut self, initial: f64) {
        self.energy = EnergyLedger::new(initial);
    }

    fn is_root(&self) -> bool {
        self.routing.is_root()
    }

    fn generates_data(&self) -> bool {
        !self.is_root() && self.role == Role::Legitimate
    }

    /// Rank put into advertisements
    pub fn advertised_rank(&self, attacker_rank: Rank) -> Rank {
        if self.is_root() {
            return 0;
        }
        self.behavior.advertised_rank(self.routing.rank(), attacker_rank)
    }

    fn advertises(&self, attacker_rank: Rank) -> bool {
        self.is_root() || self.state == OperationalState::Joined || self.advertised_rank(attacker_rank) != INFINITE_RANK
    }

    fn next_packet_id(&mut self) -> PacketId {
        let id = ((self.id as u64) << 32) | self.next_packet_seq as u64;
        self.next_packet_seq = self.next_packet_seq.wrapping_add(1);
        id
    }

    // ========================================================================
    // State and energy
    // ========================================================================

    fn set_state(&mut self, to: OperationalState, ctx: &mut NodeContext<'_>) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        debug!("node {} {:?} -> {:?} at {:.3}", self.id, from, to, ctx.now);
        ctx.events.log(ctx.now, self.id, Event::StateChange { from, to });
    }

    fn die(&mut self, ctx: &mut NodeContext<'_>) {
        if !self.is_alive() {
            return;
        }
        self.set_state(OperationalState::Dead, ctx);
        self.pending_acks.clear();
        ctx.stats.record_death();
    }

    /// Debit one operation. Returns whether the operation goes ahead: a
    /// transmission paying the final debit still does, nothing else does.
    fn charge(&mut self, op: EnergyOp, ctx: &mut NodeContext<'_>) -> bool {
        match self.energy.debit(op, &ctx.config.energy, ctx.now) {
            Debit::Charged => true,
            Debit::Depleted => {
                self.die(ctx);
                op.is_transmit()
            }
            Debit::Refused => false,
        }
    }

    /// Settle idle listening up to now; false if that exhausted the node
    fn settle(&mut self, ctx: &mut NodeContext<'_>) -> bool {
        if let Debit::Depleted = self.energy.settle_idle(&ctx.config.energy, ctx.now) {
            self.die(ctx);
        }
        self.is_alive()
    }

    fn drop_data(&mut self, packet: &Packet, reason: DropReason, ctx: &mut NodeContext<'_>) {
        trace!("node {} drops packet {:#x} ({})", self.id, packet.id, reason.label());
        ctx.stats.record_drop(reason);
        ctx.events.log(
            ctx.now,
            self.id,
            Event::PacketDropped {
                packet: packet.id,
                reason,
            },
        );
    }

    fn transmit(&mut self, packet: Packet, to: Option<NodeId>, ctx: &mut NodeContext<'_>) {
        self.transmissions += 1;
        ctx.stats.record_transmission(&packet.kind);
        ctx.actions.push(NodeAction::Transmit { packet, to });
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    /// Arm the first advertisement and, for data sources, the first generation
    pub fn start(&mut self, ctx: &mut NodeContext<'_>) {
        let first_advertisement = ctx.rng.gen_range(0.0..ctx.config.routing.advertisement_interval);
        ctx.actions.push(NodeAction::Schedule {
            delay: first_advertisement,
            timer: Timer::Advertise,
        });
        if self.generates_data() {
            let first_packet = ctx.rng.gen_range(0.0..ctx.config.traffic.generation_interval);
            ctx.actions.push(NodeAction::Schedule {
                delay: first_packet,
                timer: Timer::Generate,
            });
        }
    }

    pub fn on_timer(&mut self, timer: Timer, ctx: &mut NodeContext<'_>) {
        if !self.settle(ctx) {
            if let Timer::HoldRetry { packet, .. } = &timer {
                self.drop_data(packet, DropReason::NoRoute, ctx);
            }
            return;
        }
        match timer {
            Timer::Advertise => self.on_advertise_tick(ctx),
            Timer::Generate => self.on_generate_tick(ctx),
            Timer::HoldRetry { packet, holds } => self.route_data(packet, holds, ctx),
            Timer::AckTimeout { neighbor, packet } => self.on_ack_timeout(neighbor, packet, ctx),
        }
    }

    fn on_advertise_tick(&mut self, ctx: &mut NodeContext<'_>) {
        let evicted = self.assessor.evict_stale(ctx.now);
        if let Some(parent) = self.routing.parent() {
            if evicted.contains(&parent) {
                debug!("node {} lost parent {} to eviction", self.id, parent);
                self.lose_parent(ctx);
            }
        }

        let attacker_rank = ctx.config.routing.attacker_rank;
        if self.advertises(attacker_rank) {
            if self.charge(EnergyOp::TxControl, ctx) {
                let id = self.next_packet_id();
                let version = self.routing.next_version();
                let rank = self.advertised_rank(attacker_rank);
                let packet = Packet::advertisement(id, self.id, rank, version, ctx.now);
                self.transmit(packet, None, ctx);
            }
        }
        if !self.is_root() && self.routing.parent().is_none() && self.is_alive() {
            self.select_parent(ctx);
        }

        if self.is_alive() {
            let delay = ctx.config.routing.next_advertisement_delay(&mut *ctx.rng);
            ctx.actions.push(NodeAction::Schedule {
                delay,
                timer: Timer::Advertise,
            });
        }
    }

    fn on_generate_tick(&mut self, ctx: &mut NodeContext<'_>) {
        if self.state == OperationalState::Joined {
            let id = self.next_packet_id();
            let packet = Packet::data(id, self.id, SINK_ID, ctx.now, ctx.config.traffic.packet_size);
            self.originated += 1;
            ctx.stats.record_generated();
            trace!("node {} originates packet {:#x}", self.id, id);
            self.route_data(packet, 0, ctx);
        }
        if self.is_alive() {
            ctx.actions.push(NodeAction::Schedule {
                delay: ctx.config.traffic.generation_interval,
                timer: Timer::Generate,
            });
        }
    }

    fn on_ack_timeout(&mut self, neighbor: NodeId, packet: PacketId, ctx: &mut NodeContext<'_>) {
        if !self.pending_acks.remove(&packet) {
            return;
        }
        let missed = self.routing.record_missed_ack(neighbor);
        trace!("node {} missed ack {} from {}", self.id, missed, neighbor);
        if self.routing.parent() == Some(neighbor) && missed >= ctx.config.routing.max_missed_acks {
            debug!("node {} lost parent {} after {} missed acks", self.id, neighbor, missed);
            self.lose_parent(ctx);
        }
    }

    /// Packet handed over by the channel
    pub fn on_receive(&mut self, packet: Packet, ctx: &mut NodeContext<'_>) {
        if !self.settle(ctx) {
            if packet.is_data() {
                self.drop_data(&packet, DropReason::NoRoute, ctx);
            }
            return;
        }
        match packet.kind {
            PacketKind::Data => self.on_data(packet, ctx),
            PacketKind::Ack { acked } => {
                if self.charge(EnergyOp::RxControl, ctx) && self.pending_acks.remove(&acked) {
                    self.routing.record_ack(packet.sender);
                }
            }
            PacketKind::Advertisement { rank, version } => self.on_advertisement(packet.sender, rank, version, ctx),
        }
    }

    fn on_data(&mut self, packet: Packet, ctx: &mut NodeContext<'_>) {
        if !self.charge(EnergyOp::RxData, ctx) {
            self.drop_data(&packet, DropReason::NoRoute, ctx);
            return;
        }

        // hop-level acknowledgment back to the previous hop
        if self.charge(EnergyOp::TxControl, ctx) {
            let id = self.next_packet_id();
            let ack = Packet::ack(id, self.id, packet.sender, packet.id, ctx.now);
            self.transmit(ack, Some(packet.sender), ctx);
        }
        if !self.is_alive() {
            self.drop_data(&packet, DropReason::NoRoute, ctx);
            return;
        }

        if packet.destination == self.id {
            let mut packet = packet;
            packet.stamp_delivered(ctx.now);
            let delay = ctx.now - packet.created_at;
            ctx.stats.record_delivered(delay);
            ctx.stats.record_forwarding(self.id, true);
            ctx.events.log(
                ctx.now,
                self.id,
                Event::PacketDelivered {
                    packet: packet.id,
                    delay,
                },
            );
            ctx.actions.push(NodeAction::Observe {
                observer: packet.sender,
                cooperated: true,
            });
            return;
        }

        let mut forwarding = ForwardingContext {
            energy_fraction: self.energy.fraction_remaining(),
            config: &ctx.config.attackers,
            rng: &mut *ctx.rng,
        };
        let verdict = self.behavior.forwarding(&mut forwarding);
        let cooperated = verdict == ForwardingVerdict::Cooperate;
        ctx.stats.record_forwarding(self.id, cooperated);
        ctx.actions.push(NodeAction::Observe {
            observer: packet.sender,
            cooperated,
        });
        match verdict {
            ForwardingVerdict::Defect(reason) => self.drop_data(&packet, reason, ctx),
            ForwardingVerdict::Cooperate => self.route_data(packet, 0, ctx),
        }
    }

    fn on_advertisement(&mut self, sender: NodeId, rank: Rank, version: u64, ctx: &mut NodeContext<'_>) {
        if !self.charge(EnergyOp::RxControl, ctx) || !self.charge(EnergyOp::AssessorUpdate, ctx) {
            return;
        }
        let link_quality = ctx.topology.link_quality(self.id, sender);
        let update = self
            .assessor
            .record_advertisement(sender, rank, version, link_quality, ctx.now);
        if update == AdvertisementUpdate::Stale || self.is_root() {
            return;
        }
        // heard from: give it another chance as next hop
        self.routing.record_ack(sender);
        if self.routing.parent() == Some(sender) {
            self.routing.refresh_rank(rank, ctx.config.routing.hop_cost);
        }
        self.select_parent(ctx);
    }

    /// Watchdog result for a packet this node handed to `neighbor`
    pub fn on_observation(&mut self, neighbor: NodeId, cooperated: bool, ctx: &mut NodeContext<'_>) {
        if !self.settle(ctx) || !self.charge(EnergyOp::AssessorUpdate, ctx) {
            return;
        }
        self.assessor.record_forwarding_outcome(neighbor, cooperated, ctx.now);
        ctx.stats.record_observation(cooperated);
        if cooperated {
            return;
        }
        if self.behavior.reports() {
            self.play_reporting_game(neighbor, ctx);
        }
        if self.routing.parent() == Some(neighbor) && self.is_alive() {
            self.select_parent(ctx);
        }
    }

    pub fn finish(&mut self, ctx: &mut NodeContext<'_>) {
        self.settle(ctx);
    }

    // ========================================================================
    // Games
    // ========================================================================

    /// Forwarding game for a data packet this node holds
    fn route_data(&mut self, packet: Packet, holds: u32, ctx: &mut NodeContext<'_>) {
        if packet.hops >= ctx.config.traffic.hop_limit {
            self.drop_data(&packet, DropReason::NoRoute, ctx);
            return;
        }
        let mut candidates = self
            .routing
            .upstream_candidates(&self.assessor, ctx.config.routing.max_missed_acks);
        if packet.sender != self.id {
            candidates.retain(|id| *id != packet.sender);
        }
        if candidates.is_empty() {
            self.drop_data(&packet, DropReason::NoRoute, ctx);
            return;
        }

        if !self.charge(EnergyOp::Decision, ctx) {
            self.drop_data(&packet, DropReason::NoRoute, ctx);
            return;
        }
        ctx.stats.record_decision(Game::Forwarding);
        let unit = DecisionUnit::new(&self.assessor, &ctx.config.games);
        let decision = unit.select_forwarder(&candidates);
        let avoided: Vec<NodeId> = candidates
            .iter()
            .copied()
            .filter(|id| !unit.is_viable_forwarder(*id))
            .collect();

        match decision {
            ForwardingDecision::Send { next_hop, expected_utility } => {
                trace!(
                    "node {} sends {:#x} via {} (eu {:.2})",
                    self.id,
                    packet.id,
                    next_hop,
                    expected_utility
                );
                self.send_data(packet, next_hop, ctx);
            }
            ForwardingDecision::Hold { best_utility } => {
                let payoffs = ctx.config.games.forwarding();
                let (max_holds, backoff) = (payoffs.max_hold_attempts, payoffs.hold_backoff);
                if holds >= max_holds {
                    self.drop_data(&packet, DropReason::NoRoute, ctx);
                } else {
                    trace!("node {} holds {:#x} (best eu {:.2})", self.id, packet.id, best_utility);
                    ctx.stats.record_hold();
                    ctx.actions.push(NodeAction::Schedule {
                        delay: backoff,
                        timer: Timer::HoldRetry {
                            packet,
                            holds: holds + 1,
                        },
                    });
                }
            }
            ForwardingDecision::NoCandidate => self.drop_data(&packet, DropReason::NoRoute, ctx),
        }

        self.note_avoided(&avoided, ctx);
    }

    /// Candidates passed over in a forwarding round count against them.
    ///
    /// An observed drop pins a neighbor's estimate at zero, after which it is
    /// never tried again; these rounds are what keeps its record growing
    /// toward the reporting threshold.
    fn note_avoided(&mut self, avoided: &[NodeId], ctx: &mut NodeContext<'_>) {
        if avoided.is_empty() || !self.is_alive() || !self.charge(EnergyOp::AssessorUpdate, ctx) {
            return;
        }
        for &neighbor in avoided {
            self.assessor.record_avoided(neighbor);
        }
        if !self.behavior.reports() {
            return;
        }
        for &neighbor in avoided {
            if !self.is_alive() {
                break;
            }
            self.play_reporting_game(neighbor, ctx);
        }
    }

    fn send_data(&mut self, packet: Packet, next_hop: NodeId, ctx: &mut NodeContext<'_>) {
        if !self.charge(EnergyOp::TxData, ctx) {
            self.drop_data(&packet, DropReason::NoRoute, ctx);
            return;
        }
        let outgoing = packet.forwarded(self.id, next_hop);
        if self.is_alive() {
            self.pending_acks.insert(outgoing.id);
            ctx.actions.push(NodeAction::Schedule {
                delay: ctx.config.routing.ack_timeout,
                timer: Timer::AckTimeout {
                    neighbor: next_hop,
                    packet: outgoing.id,
                },
            });
        }
        self.transmit(outgoing, Some(next_hop), ctx);
    }

    /// Parent selection game. A parent no longer worth sending to is dropped
    /// first, and only viable forwarders are considered as replacements.
    fn select_parent(&mut self, ctx: &mut NodeContext<'_>) {
        if let Some(parent) = self.routing.parent() {
            if !DecisionUnit::new(&self.assessor, &ctx.config.games).is_viable_forwarder(parent) {
                debug!("node {} drops defecting parent {}", self.id, parent);
                self.lose_parent(ctx);
            }
        }

        let mut candidates = self
            .routing
            .upstream_candidates(&self.assessor, ctx.config.routing.max_missed_acks);
        let unit = DecisionUnit::new(&self.assessor, &ctx.config.games);
        candidates.retain(|id| unit.is_viable_forwarder(*id));
        if candidates.is_empty() {
            return;
        }
        if !self.charge(EnergyOp::Decision, ctx) {
            return;
        }
        ctx.stats.record_decision(Game::ParentSelection);
        let decision =
            DecisionUnit::new(&self.assessor, &ctx.config.games).select_parent(&candidates, self.routing.parent());

        if let ParentDecision::Switch { from, to, score } = decision {
            let Some(parent_rank) = self.assessor.advertised_rank(to) else {
                return;
            };
            self.routing.adopt_parent(to, parent_rank, ctx.config.routing.hop_cost);
            if from.is_some() {
                ctx.stats.record_parent_switch(self.id);
            }
            debug!(
                "node {} parent {:?} -> {} (score {:.3}, rank {})",
                self.id,
                from,
                to,
                score,
                self.routing.rank()
            );
            ctx.events.log(ctx.now, self.id, Event::ParentSwitch { from, to });
            self.set_state(OperationalState::Joined, ctx);
        }
    }

    fn lose_parent(&mut self, ctx: &mut NodeContext<'_>) {
        self.routing.lose_parent();
        if self.state == OperationalState::Joined {
            self.set_state(OperationalState::Isolated, ctx);
        }
    }

    fn play_reporting_game(&mut self, neighbor: NodeId, ctx: &mut NodeContext<'_>) {
        let eligible = DecisionUnit::new(&self.assessor, &ctx.config.games).report_eligible(neighbor, ctx.now);
        if !eligible || !self.charge(EnergyOp::Decision, ctx) {
            return;
        }
        ctx.stats.record_decision(Game::Reporting);
        let report = DecisionUnit::new(&self.assessor, &ctx.config.games).decide_report(neighbor, ctx.now, &mut *ctx.rng);
        if report {
            self.assessor.mark_reported(neighbor, ctx.now);
            debug!("node {} reports {} at {:.3}", self.id, neighbor, ctx.now);
            ctx.actions.push(NodeAction::Report { suspect: neighbor });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ds_interface::NoOpSink;
    use crate::ds_topology::Position;
    use rand::SeedableRng;

    struct Harness {
        config: SimConfig,
        topology: Topology,
        rng: StdRng,
        stats: Statistics,
        sink: NoOpSink,
        actions: Vec<NodeAction>,
    }

    impl Harness {
        /// Three nodes on a line, 50 apart: sink, 1, 2
        fn line() -> Self {
            Self::line_of(3)
        }

        fn line_of(n: usize) -> Self {
            let positions = (0..n).map(|i| Position { x: i as f64 * 50.0, y: 0.0 }).collect();
            Self {
                config: SimConfig::default().without_attackers(),
                topology: Topology::from_positions(positions, 70.0),
                rng: StdRng::seed_from_u64(1),
                stats: Statistics::new(n),
                sink: NoOpSink,
                actions: Vec::new(),
            }
        }

        fn ctx(&mut self, now: SimTime) -> NodeContext<'_> {
            NodeContext {
                now,
                config: &self.config,
                topology: &self.topology,
                rng: &mut self.rng,
                stats: &mut self.stats,
                events: &mut self.sink,
                actions: &mut self.actions,
            }
        }

        fn take(&mut self) -> Vec<NodeAction> {
            std::mem::take(&mut self.actions)
        }
    }

    fn advertisement(from: NodeId, rank: Rank, version: u64) -> Packet {
        Packet::advertisement(99, from, rank, version, 0.0)
    }

    #[test]
    fn test_root_starts_joined() {
        let h = Harness::line();
        let root = DsNode::new(SINK_ID, Role::Legitimate, &h.config);
        assert_eq!(root.state(), OperationalState::Joined);
        assert_eq!(root.routing().rank(), 0);
        let node = DsNode::new(1, Role::Legitimate, &h.config);
        assert_eq!(node.state(), OperationalState::Bootstrapping);
    }

    #[test]
    fn test_start_arms_timers() {
        let mut h = Harness::line();
        let mut node = DsNode::new(1, Role::Legitimate, &h.config);
        node.start(&mut h.ctx(0.0));
        let actions = h.take();
        assert_eq!(actions.len(), 2);

        let mut root = DsNode::new(SINK_ID, Role::Legitimate, &h.config);
        root.start(&mut h.ctx(0.0));
        let actions = h.take();
        assert_eq!(actions.len(), 1, "sink does not generate data");

        let mut blackhole = DsNode::new(2, Role::Blackhole, &h.config);
        blackhole.start(&mut h.ctx(0.0));
        assert_eq!(h.take().len(), 1, "attackers do not generate data");
    }

    #[test]
    fn test_advertisement_joins_node() {
        let mut h = Harness::line();
        let mut node = DsNode::new(1, Role::Legitimate, &h.config);
        node.on_receive(advertisement(SINK_ID, 0, 1), &mut h.ctx(1.0));
        assert_eq!(node.state(), OperationalState::Joined);
        assert_eq!(node.parent(), Some(SINK_ID));
        assert_eq!(node.routing().rank(), 1);
    }

    #[test]
    fn test_bootstrapping_node_is_silent() {
        let mut h = Harness::line();
        let mut node = DsNode::new(1, Role::Legitimate, &h.config);
        node.on_timer(Timer::Advertise, &mut h.ctx(1.0));
        let actions = h.take();
        assert!(actions.iter().all(|a| !matches!(a, NodeAction::Transmit { .. })));
        assert!(matches!(actions.last(), Some(NodeAction::Schedule { timer: Timer::Advertise, .. })));
    }

    #[test]
    fn test_blackhole_advertises_fake_rank() {
        let mut h = Harness::line();
        let mut node = DsNode::new(2, Role::Blackhole, &h.config);
        node.on_timer(Timer::Advertise, &mut h.ctx(1.0));
        let advertised = h.take().into_iter().find_map(|a| match a {
            NodeAction::Transmit { packet, to: None } => Some(packet.kind),
            _ => None,
        });
        assert_eq!(advertised, Some(PacketKind::Advertisement { rank: 1, version: 1 }));
    }

    #[test]
    fn test_generated_packet_goes_to_parent() {
        let mut h = Harness::line();
        let mut node = DsNode::new(1, Role::Legitimate, &h.config);
        node.on_receive(advertisement(SINK_ID, 0, 1), &mut h.ctx(1.0));
        h.take();

        node.on_timer(Timer::Generate, &mut h.ctx(2.0));
        let actions = h.take();
        let sent = actions.iter().find_map(|a| match a {
            NodeAction::Transmit { packet, to } if packet.is_data() => Some((packet.clone(), *to)),
            _ => None,
        });
        let (packet, to) = sent.expect("data packet sent");
        assert_eq!(to, Some(SINK_ID));
        assert_eq!(packet.hops, 1);
        assert!(actions
            .iter()
            .any(|a| matches!(a, NodeAction::Schedule { timer: Timer::AckTimeout { neighbor: 0, .. }, .. })));
        assert_eq!(h.stats.generated(), 1);
        assert_eq!(node.originated(), 1);
    }

    #[test]
    fn test_sink_delivers_and_acks() {
        let mut h = Harness::line();
        let mut root = DsNode::new(SINK_ID, Role::Legitimate, &h.config);
        let packet = Packet::data(5, 1, SINK_ID, 1.0, 64).forwarded(1, SINK_ID);
        root.on_receive(packet, &mut h.ctx(3.5));

        let actions = h.take();
        assert_eq!(h.stats.delivered(), 1);
        assert!(actions.iter().any(|a| matches!(
            a,
            NodeAction::Transmit { packet: Packet { kind: PacketKind::Ack { acked: 5 }, .. }, to: Some(1) }
        )));
        assert!(actions.contains(&NodeAction::Observe { observer: 1, cooperated: true }));
    }

    #[test]
    fn test_blackhole_drops_and_is_observed() {
        let mut h = Harness::line();
        let mut node = DsNode::new(1, Role::Blackhole, &h.config);
        node.on_receive(advertisement(SINK_ID, 0, 1), &mut h.ctx(1.0));
        h.take();

        let packet = Packet::data(5, 2, SINK_ID, 1.0, 64).forwarded(2, 1);
        node.on_receive(packet, &mut h.ctx(2.0));
        let actions = h.take();
        assert_eq!(h.stats.drops(DropReason::Blackhole), 1);
        assert!(actions.contains(&NodeAction::Observe { observer: 2, cooperated: false }));
        assert!(!actions
            .iter()
            .any(|a| matches!(a, NodeAction::Transmit { packet, .. } if packet.is_data())));
    }

    #[test]
    fn test_missed_acks_isolate_node() {
        let mut h = Harness::line();
        let mut node = DsNode::new(2, Role::Legitimate, &h.config);
        node.on_receive(advertisement(1, 1, 1), &mut h.ctx(1.0));
        assert_eq!(node.parent(), Some(1));

        for t in 0..3 {
            node.on_timer(Timer::Generate, &mut h.ctx(2.0 + t as f64));
            let acks: Vec<(NodeId, PacketId)> = h
                .take()
                .into_iter()
                .filter_map(|a| match a {
                    NodeAction::Schedule { timer: Timer::AckTimeout { neighbor, packet }, .. } => Some((neighbor, packet)),
                    _ => None,
                })
                .collect();
            for (neighbor, packet) in acks {
                node.on_timer(Timer::AckTimeout { neighbor, packet }, &mut h.ctx(10.0 + t as f64));
            }
        }
        assert_eq!(node.state(), OperationalState::Isolated);
        assert_eq!(node.parent(), None);
        assert_eq!(node.routing().rank(), INFINITE_RANK);

        // isolated nodes stop originating
        node.on_timer(Timer::Generate, &mut h.ctx(20.0));
        assert_eq!(node.originated(), 3);

        // a fresh advertisement from elsewhere rejoins it
        node.on_receive(advertisement(SINK_ID, 0, 1), &mut h.ctx(21.0));
        assert_eq!(node.state(), OperationalState::Joined);
        assert_eq!(node.parent(), Some(SINK_ID));
    }

    #[test]
    fn test_ack_clears_pending() {
        let mut h = Harness::line();
        let mut node = DsNode::new(1, Role::Legitimate, &h.config);
        node.on_receive(advertisement(SINK_ID, 0, 1), &mut h.ctx(1.0));
        node.on_timer(Timer::Generate, &mut h.ctx(2.0));
        let (neighbor, packet) = h
            .take()
            .into_iter()
            .find_map(|a| match a {
                NodeAction::Schedule { timer: Timer::AckTimeout { neighbor, packet }, .. } => Some((neighbor, packet)),
                _ => None,
            })
            .unwrap();

        node.on_receive(Packet::ack(1, SINK_ID, 1, packet, 2.1), &mut h.ctx(2.1));
        node.on_timer(Timer::AckTimeout { neighbor, packet }, &mut h.ctx(7.0));
        assert_eq!(node.routing().missed_acks(SINK_ID), 0);
    }

    #[test]
    fn test_hold_then_no_route() {
        let mut h = Harness::line_of(4);
        let mut node = DsNode::new(2, Role::Legitimate, &h.config);
        node.on_receive(advertisement(1, 1, 1), &mut h.ctx(1.0));
        node.on_observation(1, false, &mut h.ctx(1.5));
        assert_eq!(node.state(), OperationalState::Isolated);
        h.take();

        // relayed traffic still has to go somewhere; 1 is the only way up
        let packet = Packet::data(5, 3, SINK_ID, 1.0, 64).forwarded(3, 2);
        node.on_receive(packet, &mut h.ctx(2.0));
        let mut held = h.take().into_iter().find_map(|a| match a {
            NodeAction::Schedule { timer: Timer::HoldRetry { packet, holds }, .. } => Some((packet, holds)),
            _ => None,
        });
        let mut rounds = 0;
        while let Some((packet, holds)) = held.take() {
            rounds += 1;
            node.on_timer(Timer::HoldRetry { packet, holds }, &mut h.ctx(2.0 + 5.0 * rounds as f64));
            held = h.take().into_iter().find_map(|a| match a {
                NodeAction::Schedule { timer: Timer::HoldRetry { packet, holds }, .. } => Some((packet, holds)),
                _ => None,
            });
        }
        assert_eq!(rounds, 3);
        assert_eq!(h.stats.drops(DropReason::NoRoute), 1);
        // the observed drop plus four passed-over rounds
        assert_eq!(node.assessor().negative_count(1), 5);
    }

    #[test]
    fn test_defecting_parent_is_abandoned() {
        let mut h = Harness::line_of(4);
        let mut node = DsNode::new(2, Role::Legitimate, &h.config);
        node.on_receive(advertisement(1, 1, 1), &mut h.ctx(1.0));
        node.on_receive(advertisement(3, 2, 1), &mut h.ctx(1.1));
        assert_eq!(node.parent(), Some(1));

        node.on_observation(1, false, &mut h.ctx(2.0));
        assert_eq!(node.state(), OperationalState::Joined);
        assert_eq!(node.parent(), Some(3));
        assert_eq!(node.routing().rank(), 3);
        assert_eq!(h.stats.parent_switches(2), 0, "lost then joined, not a switch");

        // a better rank does not win the defector back
        node.on_receive(advertisement(1, 1, 2), &mut h.ctx(3.0));
        assert_eq!(node.parent(), Some(3));
    }

    #[test]
    fn test_defecting_parent_without_alternative_isolates() {
        let mut h = Harness::line();
        let mut node = DsNode::new(2, Role::Legitimate, &h.config);
        node.on_receive(advertisement(1, 1, 1), &mut h.ctx(1.0));
        node.on_observation(1, false, &mut h.ctx(2.0));
        assert_eq!(node.state(), OperationalState::Isolated);
        assert_eq!(node.parent(), None);
        assert_eq!(node.routing().rank(), INFINITE_RANK);

        node.on_timer(Timer::Generate, &mut h.ctx(3.0));
        assert_eq!(node.originated(), 0);
    }

    #[test]
    fn test_evicted_parent_is_lost() {
        let mut h = Harness::line();
        let mut node = DsNode::new(1, Role::Legitimate, &h.config);
        node.on_receive(advertisement(SINK_ID, 0, 1), &mut h.ctx(1.0));
        assert_eq!(node.parent(), Some(SINK_ID));
        h.take();

        let window = h.config.assessor.eviction_window;
        node.on_timer(Timer::Advertise, &mut h.ctx(2.0 + window));
        assert!(!node.assessor().contains(SINK_ID));
        assert_eq!(node.state(), OperationalState::Isolated);
        assert_eq!(node.parent(), None);
        assert_eq!(node.routing().rank(), INFINITE_RANK);
        let actions = h.take();
        assert!(
            actions.iter().all(|a| !matches!(a, NodeAction::Transmit { .. })),
            "isolated nodes do not advertise"
        );

        node.on_receive(advertisement(SINK_ID, 0, 2), &mut h.ctx(3.0 + window));
        assert_eq!(node.state(), OperationalState::Joined);
        assert_eq!(node.parent(), Some(SINK_ID));
        assert_eq!(node.routing().rank(), 1);
    }

    #[test]
    fn test_energy_gates_node() {
        let mut h = Harness::line();
        let mut node = DsNode::new(1, Role::Legitimate, &h.config);
        node.set_initial_energy(0.012);
        // rx 0.005 + lia 0.0005 + decision 0.001, then one 0.01 advertisement kills it
        node.on_receive(advertisement(SINK_ID, 0, 1), &mut h.ctx(0.0));
        node.on_timer(Timer::Advertise, &mut h.ctx(0.0));
        assert_eq!(node.state(), OperationalState::Dead);
        assert_eq!(node.transmissions(), 1, "the depleting transmission still goes out");
        assert_eq!(node.energy().balance(), 0.0);
        let actions = h.take();
        assert!(!actions.iter().any(|a| matches!(a, NodeAction::Schedule { .. })));
    }
}
