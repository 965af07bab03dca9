//! Statistics aggregator and the end-of-run report.
//!
//! Components only ever add to the counters here. Nothing in the decision
//! path reads them back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ds_interface::{DropReason, NodeId, PacketKind, Role, SimTime};

/// Which game a decision-unit invocation played
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Game {
    Forwarding,
    ParentSelection,
    Reporting,
}

/// Append-only run counters
#[derive(Debug, Clone)]
pub struct Statistics {
    generated: u64,
    delivered: u64,
    total_delay: f64,
    drops: [u64; 4],
    cooperate_observations: u64,
    defect_observations: u64,
    forwarding_decisions: u64,
    parent_decisions: u64,
    reporting_decisions: u64,
    holds: u64,
    data_transmissions: u64,
    ack_transmissions: u64,
    advertisement_transmissions: u64,
    parent_switches: Vec<u32>,
    /// (cooperated, defected) as forwarder, per node
    forwarding_by_node: Vec<(u64, u64)>,
    reports_true: u64,
    reports_false: u64,
    deaths: u64,
    cancelled_events: u64,
}

fn drop_index(reason: DropReason) -> usize {
    match reason {
        DropReason::Blackhole => 0,
        DropReason::Selfish => 1,
        DropReason::Channel => 2,
        DropReason::NoRoute => 3,
    }
}

impl Statistics {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            generated: 0,
            delivered: 0,
            total_delay: 0.0,
            drops: [0; 4],
            cooperate_observations: 0,
            defect_observations: 0,
            forwarding_decisions: 0,
            parent_decisions: 0,
            reporting_decisions: 0,
            holds: 0,
            data_transmissions: 0,
            ack_transmissions: 0,
            advertisement_transmissions: 0,
            parent_switches: vec![0; num_nodes],
            forwarding_by_node: vec![(0, 0); num_nodes],
            reports_true: 0,
            reports_false: 0,
            deaths: 0,
            cancelled_events: 0,
        }
    }

    pub fn record_generated(&mut self) {
        self.generated += 1;
    }

    pub fn record_delivered(&mut self, delay: SimTime) {
        self.delivered += 1;
        self.total_delay += delay;
    }

    pub fn record_drop(&mut self, reason: DropReason) {
        self.drops[drop_index(reason)] += 1;
    }

    /// Outcome of a forwarder handling a data packet
    pub fn record_forwarding(&mut self, forwarder: NodeId, cooperated: bool) {
        let entry = &mut self.forwarding_by_node[forwarder];
        if cooperated {
            entry.0 += 1;
        } else {
            entry.1 += 1;
        }
    }

    /// A watchdog observation reaching the previous hop
    pub fn record_observation(&mut self, cooperated: bool) {
        if cooperated {
            self.cooperate_observations += 1;
        } else {
            self.defect_observations += 1;
        }
    }

    pub fn record_decision(&mut self, game: Game) {
        match game {
            Game::Forwarding => self.forwarding_decisions += 1,
            Game::ParentSelection => self.parent_decisions += 1,
            Game::Reporting => self.reporting_decisions += 1,
        }
    }

    pub fn record_hold(&mut self) {
        self.holds += 1;
    }

    pub fn record_transmission(&mut self, kind: &PacketKind) {
        match kind {
            PacketKind::Data => self.data_transmissions += 1,
            PacketKind::Ack { .. } => self.ack_transmissions += 1,
            PacketKind::Advertisement { .. } => self.advertisement_transmissions += 1,
        }
    }

    pub fn record_parent_switch(&mut self, node: NodeId) {
        self.parent_switches[node] += 1;
    }

    pub fn record_report(&mut self, truthful: bool) {
        if truthful {
            self.reports_true += 1;
        } else {
            self.reports_false += 1;
        }
    }

    pub fn record_death(&mut self) {
        self.deaths += 1;
    }

    /// An event popped for a dead node and skipped
    pub fn record_cancelled(&mut self) {
        self.cancelled_events += 1;
    }

    pub fn generated(&self) -> u64 {
        self.generated
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn drops(&self, reason: DropReason) -> u64 {
        self.drops[drop_index(reason)]
    }

    pub fn total_drops(&self) -> u64 {
        self.drops.iter().sum()
    }

    pub fn parent_switches(&self, node: NodeId) -> u32 {
        self.parent_switches[node]
    }
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionCounts {
    pub forwarding: u64,
    pub parent_selection: u64,
    pub reporting: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForwardingTally {
    pub cooperated: u64,
    pub defected: u64,
}

impl ForwardingTally {
    pub fn defect_rate(&self) -> f64 {
        let total = self.cooperated + self.defected;
        if total == 0 {
            return 0.0;
        }
        self.defected as f64 / total as f64
    }
}

/// Final state of one node, collected by the driver at the horizon
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSummary {
    pub role: Role,
    pub residual_energy: f64,
    pub alive: bool,
}

/// Everything a run produced, handed to whatever formats or stores it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub horizon: SimTime,
    pub num_nodes: usize,
    pub packets_generated: u64,
    pub packets_delivered: u64,
    pub packets_in_flight: u64,
    /// Drop counts keyed by category label
    pub drops: BTreeMap<String, u64>,
    pub packet_delivery_ratio: f64,
    pub average_delay: f64,
    pub average_residual_energy: f64,
    pub residual_energy: Vec<f64>,
    pub nodes_alive: usize,
    pub node_deaths: u64,
    pub average_parent_switches: f64,
    pub cooperate_observations: u64,
    pub defect_observations: u64,
    pub decisions: DecisionCounts,
    pub holds: u64,
    /// Transmissions keyed by packet kind label
    pub transmissions: BTreeMap<String, u64>,
    pub reports_true: u64,
    pub reports_false: u64,
    pub cancelled_events: u64,
    pub role_counts: BTreeMap<String, usize>,
    /// Forwarder behavior aggregated by role label
    pub forwarding_by_role: BTreeMap<String, ForwardingTally>,
}

impl SimulationReport {
    pub fn build(stats: &Statistics, nodes: &[NodeSummary], in_flight: u64, seed: u64, horizon: SimTime) -> Self {
        let drops: BTreeMap<String, u64> = DropReason::ALL
            .iter()
            .map(|r| (r.label().to_string(), stats.drops(*r)))
            .collect();

        let resolved = stats.delivered + stats.total_drops();
        let packet_delivery_ratio = if resolved == 0 {
            0.0
        } else {
            stats.delivered as f64 / resolved as f64
        };
        let average_delay = if stats.delivered == 0 {
            0.0
        } else {
            stats.total_delay / stats.delivered as f64
        };

        let n = nodes.len();
        let residual_energy: Vec<f64> = nodes.iter().map(|s| s.residual_energy).collect();
        let average_residual_energy = if n == 0 {
            0.0
        } else {
            residual_energy.iter().sum::<f64>() / n as f64
        };
        let average_parent_switches = if n == 0 {
            0.0
        } else {
            stats.parent_switches.iter().map(|s| *s as f64).sum::<f64>() / n as f64
        };

        let mut transmissions = BTreeMap::new();
        transmissions.insert("data".to_string(), stats.data_transmissions);
        transmissions.insert("ack".to_string(), stats.ack_transmissions);
        transmissions.insert("advertisement".to_string(), stats.advertisement_transmissions);

        let mut role_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut forwarding_by_role: BTreeMap<String, ForwardingTally> = BTreeMap::new();
        for (id, node) in nodes.iter().enumerate() {
            *role_counts.entry(node.role.label().to_string()).or_insert(0) += 1;
            let (cooperated, defected) = stats.forwarding_by_node.get(id).copied().unwrap_or((0, 0));
            let tally = forwarding_by_role.entry(node.role.label().to_string()).or_default();
            tally.cooperated += cooperated;
            tally.defected += defected;
        }

        Self {
            seed,
            horizon,
            num_nodes: n,
            packets_generated: stats.generated,
            packets_delivered: stats.delivered,
            packets_in_flight: in_flight,
            drops,
            packet_delivery_ratio,
            average_delay,
            average_residual_energy,
            residual_energy,
            nodes_alive: nodes.iter().filter(|s| s.alive).count(),
            node_deaths: stats.deaths,
            average_parent_switches,
            cooperate_observations: stats.cooperate_observations,
            defect_observations: stats.defect_observations,
            decisions: DecisionCounts {
                forwarding: stats.forwarding_decisions,
                parent_selection: stats.parent_decisions,
                reporting: stats.reporting_decisions,
            },
            holds: stats.holds,
            transmissions,
            reports_true: stats.reports_true,
            reports_false: stats.reports_false,
            cancelled_events: stats.cancelled_events,
            role_counts,
            forwarding_by_role,
        }
    }

    pub fn drops_for(&self, reason: DropReason) -> u64 {
        self.drops.get(reason.label()).copied().unwrap_or(0)
    }

    pub fn total_drops(&self) -> u64 {
        self.drops.values().sum()
    }

    /// Flat name → value mapping of every scalar metric
    pub fn to_metrics(&self) -> BTreeMap<String, f64> {
        let mut m = BTreeMap::new();
        m.insert("packets_generated".to_string(), self.packets_generated as f64);
        m.insert("packets_delivered".to_string(), self.packets_delivered as f64);
        m.insert("packets_in_flight".to_string(), self.packets_in_flight as f64);
        m.insert("packet_delivery_ratio".to_string(), self.packet_delivery_ratio);
        m.insert("average_delay".to_string(), self.average_delay);
        for (label, count) in &self.drops {
            m.insert(format!("dropped_{}", label), *count as f64);
        }
        m.insert("average_residual_energy".to_string(), self.average_residual_energy);
        for (id, energy) in self.residual_energy.iter().enumerate() {
            m.insert(format!("residual_energy_node_{}", id), *energy);
        }
        m.insert("nodes_alive".to_string(), self.nodes_alive as f64);
        m.insert("node_deaths".to_string(), self.node_deaths as f64);
        m.insert("average_parent_switches".to_string(), self.average_parent_switches);
        m.insert("cooperate_observations".to_string(), self.cooperate_observations as f64);
        m.insert("defect_observations".to_string(), self.defect_observations as f64);
        m.insert("decisions_forwarding".to_string(), self.decisions.forwarding as f64);
        m.insert("decisions_parent_selection".to_string(), self.decisions.parent_selection as f64);
        m.insert("decisions_reporting".to_string(), self.decisions.reporting as f64);
        m.insert("holds".to_string(), self.holds as f64);
        for (label, count) in &self.transmissions {
            m.insert(format!("transmissions_{}", label), *count as f64);
        }
        m.insert("reports_true".to_string(), self.reports_true as f64);
        m.insert("reports_false".to_string(), self.reports_false as f64);
        m.insert("cancelled_events".to_string(), self.cancelled_events as f64);
        m
    }

    pub fn print_summary(&self) {
        println!("\n╔════════════════════════════════════════════════════════╗");
        println!("║         DESIST SIMULATION RESULTS                      ║");
        println!("╚════════════════════════════════════════════════════════╝\n");

        println!("Configuration:");
        println!("  Seed: {}", self.seed);
        println!("  Horizon: {:.0}", self.horizon);
        let roles: Vec<String> = self
            .role_counts
            .iter()
            .map(|(role, count)| format!("{} {}", count, role))
            .collect();
        println!("  Nodes: {} ({})", self.num_nodes, roles.join(", "));
        println!();

        println!("═══ Traffic ═══");
        println!(
            "  Generated: {}, delivered: {}, in flight: {}",
            self.packets_generated, self.packets_delivered, self.packets_in_flight
        );
        println!("  PDR: {:.3}", self.packet_delivery_ratio);
        println!("  Average delay: {:.3}", self.average_delay);
        for (label, count) in &self.drops {
            println!("  Dropped ({}): {}", label, count);
        }
        println!();

        println!("═══ Games ═══");
        println!(
            "  Decisions: {} forwarding, {} parent selection, {} reporting",
            self.decisions.forwarding, self.decisions.parent_selection, self.decisions.reporting
        );
        println!("  Holds: {}", self.holds);
        println!(
            "  Observations: {} cooperate, {} defect",
            self.cooperate_observations, self.defect_observations
        );
        println!("  Reports: {} true, {} false", self.reports_true, self.reports_false);
        for (role, tally) in &self.forwarding_by_role {
            if tally.cooperated + tally.defected > 0 {
                println!("  Defect rate ({}): {:.3}", role, tally.defect_rate());
            }
        }
        println!();

        println!("═══ Network ═══");
        println!("  Alive at horizon: {}/{}", self.nodes_alive, self.num_nodes);
        println!("  Average residual energy: {:.3}", self.average_residual_energy);
        println!("  Average parent switches: {:.2}", self.average_parent_switches);
        for (label, count) in &self.transmissions {
            println!("  Transmissions ({}): {}", label, count);
        }
        println!();
    }
}
