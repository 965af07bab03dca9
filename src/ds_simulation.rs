//! Run driver: builds the network from a validated configuration and
//! multiplexes every node's timeline onto one virtual clock.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::ds_attacker::assign_roles;
use crate::ds_config::SimConfig;
use crate::ds_error::Result;
use crate::ds_interface::{DropReason, Event, EventSink, NodeId, NoOpSink, Packet, Role};
use crate::ds_node::{DsNode, NodeAction, NodeContext, Timer};
use crate::ds_scheduler::Scheduler;
use crate::ds_stats::{NodeSummary, SimulationReport, Statistics};
use crate::ds_topology::{Channel, Topology, Transmission};

/// Independent random stream for one concern, derived from the run seed
pub fn derive_rng(seed: u64, stream: &str) -> StdRng {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(stream.as_bytes());
    StdRng::from_seed(*hasher.finalize().as_bytes())
}

#[derive(Debug, Clone)]
enum SimEvent {
    Timer { node: NodeId, timer: Timer },
    /// Channel hands a packet to its receiver
    Intake { to: NodeId, packet: Packet },
    /// Watchdog result reaching the previous hop
    Observation {
        observer: NodeId,
        neighbor: NodeId,
        cooperated: bool,
    },
}

impl SimEvent {
    fn target(&self) -> NodeId {
        match self {
            SimEvent::Timer { node, .. } => *node,
            SimEvent::Intake { to, .. } => *to,
            SimEvent::Observation { observer, .. } => *observer,
        }
    }

    /// Whether a data packet lives inside this event
    fn carries_data(&self) -> bool {
        match self {
            SimEvent::Timer {
                timer: Timer::HoldRetry { .. },
                ..
            } => true,
            SimEvent::Intake { packet, .. } => packet.is_data(),
            _ => false,
        }
    }
}

pub struct Simulation {
    config: SimConfig,
    topology: Topology,
    channel: Channel,
    roles: Vec<Role>,
    nodes: Vec<DsNode>,
    scheduler: Scheduler<SimEvent>,
    stats: Statistics,
    channel_rng: StdRng,
    node_rng: StdRng,
    events: Box<dyn EventSink>,
    finished: bool,
}

impl Simulation {
    /// Validate `config`, place nodes and assign roles
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let mut topology_rng = derive_rng(config.seed, "topology");
        let topology = Topology::random(&config.topology, &mut topology_rng);
        Ok(Self::build(config, topology))
    }

    /// Run on a fixed topology; the node count follows the topology
    pub fn with_topology(mut config: SimConfig, topology: Topology) -> Result<Self> {
        config.topology.num_nodes = topology.len();
        config.topology.radio_range = topology.radio_range();
        config.validate()?;
        Ok(Self::build(config, topology))
    }

    fn build(config: SimConfig, topology: Topology) -> Self {
        let n = topology.len();
        let mut roles_rng = derive_rng(config.seed, "roles");
        let roles = assign_roles(&config.attackers, n, &mut roles_rng);
        let nodes = roles
            .iter()
            .enumerate()
            .map(|(id, role)| DsNode::new(id, *role, &config))
            .collect();

        Self {
            channel: Channel::new(config.channel.clone()),
            scheduler: Scheduler::new(config.horizon),
            stats: Statistics::new(n),
            channel_rng: derive_rng(config.seed, "channel"),
            node_rng: derive_rng(config.seed, "nodes"),
            events: Box::new(NoOpSink),
            finished: false,
            config,
            topology,
            roles,
            nodes,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Override one node's energy budget before the run
    pub fn set_initial_energy(&mut self, node: NodeId, energy: f64) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.set_initial_energy(energy);
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn node(&self, id: NodeId) -> Option<&DsNode> {
        self.nodes.get(id)
    }

    /// Run to the horizon and produce the report.
    ///
    /// A second call does not run again; it reports the finished state.
    pub fn run(&mut self) -> SimulationReport {
        if self.finished {
            warn!("simulation already ran; reporting final state");
            return self.report();
        }
        self.log_setup();

        for id in 0..self.nodes.len() {
            self.with_node(id, |node, ctx| node.start(ctx));
        }

        while let Some((_, event)) = self.scheduler.pop_next() {
            let target = event.target();
            if !self.nodes[target].is_alive() {
                self.cancel(event);
                continue;
            }
            match event {
                SimEvent::Timer { node, timer } => self.with_node(node, |n, ctx| n.on_timer(timer, ctx)),
                SimEvent::Intake { to, packet } => self.with_node(to, |n, ctx| n.on_receive(packet, ctx)),
                SimEvent::Observation {
                    observer,
                    neighbor,
                    cooperated,
                } => self.with_node(observer, |n, ctx| n.on_observation(neighbor, cooperated, ctx)),
            }
        }

        self.scheduler.close();
        if !self.scheduler.is_empty() {
            debug!("{} events left past the horizon", self.scheduler.len());
        }
        for id in 0..self.nodes.len() {
            if self.nodes[id].is_alive() {
                self.with_node(id, |node, ctx| node.finish(ctx));
            }
        }
        self.finished = true;

        let report = self.report();
        info!(
            "run finished: pdr {:.3}, {} delivered, {} dropped, {} in flight, {} alive",
            report.packet_delivery_ratio,
            report.packets_delivered,
            report.total_drops(),
            report.packets_in_flight,
            report.nodes_alive
        );
        report
    }

    fn log_setup(&self) {
        let count = |role: Role| self.roles.iter().filter(|r| **r == role).count();
        info!(
            "starting run: {} nodes, average degree {:.1}, horizon {}, seed {}",
            self.nodes.len(),
            self.topology.average_degree(),
            self.config.horizon,
            self.config.seed
        );
        info!(
            "roles: {} legitimate, {} blackhole, {} selfish, {} rank attacker",
            count(Role::Legitimate),
            count(Role::Blackhole),
            count(Role::Selfish),
            count(Role::RankAttacker)
        );
    }

    fn report(&self) -> SimulationReport {
        let summaries: Vec<NodeSummary> = self
            .nodes
            .iter()
            .map(|n| NodeSummary {
                role: n.role(),
                residual_energy: n.energy().balance(),
                alive: n.is_alive(),
            })
            .collect();
        let in_flight = self.scheduler.pending().filter(|e| e.carries_data()).count() as u64;
        SimulationReport::build(&self.stats, &summaries, in_flight, self.config.seed, self.config.horizon)
    }

    /// Event for a dead node: skipped, but any data it carries is accounted
    fn cancel(&mut self, event: SimEvent) {
        self.stats.record_cancelled();
        let now = self.scheduler.now();
        let (node, packet, reason) = match event {
            SimEvent::Timer {
                node,
                timer: Timer::HoldRetry { packet, .. },
            } => (node, packet, DropReason::NoRoute),
            SimEvent::Intake { to, packet } if packet.is_data() => (to, packet, DropReason::Channel),
            _ => return,
        };
        self.stats.record_drop(reason);
        self.events.log(now, node, Event::PacketDropped { packet: packet.id, reason });
    }

    fn with_node<F>(&mut self, id: NodeId, f: F)
    where
        F: FnOnce(&mut DsNode, &mut NodeContext<'_>),
    {
        let mut actions = Vec::new();
        {
            let mut ctx = NodeContext {
                now: self.scheduler.now(),
                config: &self.config,
                topology: &self.topology,
                rng: &mut self.node_rng,
                stats: &mut self.stats,
                events: self.events.as_mut(),
                actions: &mut actions,
            };
            f(&mut self.nodes[id], &mut ctx);
        }
        self.apply(id, actions);
    }

    fn apply(&mut self, id: NodeId, actions: Vec<NodeAction>) {
        for action in actions {
            match action {
                NodeAction::Transmit { packet, to: Some(to) } => self.unicast(id, to, packet),
                NodeAction::Transmit { packet, to: None } => {
                    let neighbors = self.topology.neighbors(id).to_vec();
                    for to in neighbors {
                        self.unicast(id, to, packet.clone());
                    }
                }
                NodeAction::Schedule { delay, timer } => {
                    self.scheduler.wait_for(delay, SimEvent::Timer { node: id, timer });
                }
                NodeAction::Observe { observer, cooperated } => {
                    let delay = self
                        .channel
                        .propagation_delay(&self.topology, id, observer, &mut self.channel_rng);
                    self.scheduler.wait_for(
                        delay,
                        SimEvent::Observation {
                            observer,
                            neighbor: id,
                            cooperated,
                        },
                    );
                }
                NodeAction::Report { suspect } => {
                    let truthful = self.roles.get(suspect).map(|r| r.is_attacker()).unwrap_or(false);
                    self.stats.record_report(truthful);
                    self.events
                        .log(self.scheduler.now(), id, Event::ReportMade { suspect, truthful });
                }
            }
        }
    }

    fn unicast(&mut self, from: NodeId, to: NodeId, packet: Packet) {
        match self.channel.transmit(&self.topology, from, to, &mut self.channel_rng) {
            Transmission::Delivered { delay } => {
                self.scheduler.wait_for(delay, SimEvent::Intake { to, packet });
            }
            Transmission::Lost => {
                if packet.is_data() {
                    self.stats.record_drop(DropReason::Channel);
                    self.events.log(
                        self.scheduler.now(),
                        from,
                        Event::PacketDropped {
                            packet: packet.id,
                            reason: DropReason::Channel,
                        },
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ds_energy::EnergyConfig;
    use crate::ds_interface::{OperationalState, SINK_ID};
    use crate::ds_topology::Position;

    fn baseline(horizon: f64) -> SimConfig {
        SimConfig {
            horizon,
            seed: 42,
            ..SimConfig::default()
        }
        .without_attackers()
    }

    fn assert_conserved(report: &SimulationReport) {
        assert_eq!(
            report.packets_generated,
            report.packets_delivered + report.total_drops() + report.packets_in_flight,
            "every packet accounted exactly once"
        );
    }

    #[test]
    fn test_streams_are_independent() {
        use rand::Rng;
        let mut a = derive_rng(1, "topology");
        let mut b = derive_rng(1, "channel");
        let mut c = derive_rng(1, "topology");
        let x: u64 = a.gen();
        assert_ne!(x, b.gen::<u64>());
        assert_eq!(x, c.gen::<u64>());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SimConfig::default();
        config.attackers.blackhole = 0.8;
        config.attackers.selfish = 0.3;
        assert!(Simulation::new(config).is_err());

        let mut config = SimConfig::default();
        config.games.forwarding.send_cooperate = f64::NAN;
        assert!(Simulation::new(config).is_err());
    }

    #[test]
    fn test_conservation_with_attackers() {
        let config = SimConfig {
            horizon: 3000.0,
            seed: 7,
            ..SimConfig::default()
        };
        let report = Simulation::new(config).unwrap().run();
        assert!(report.packets_generated > 0);
        assert_conserved(&report);
        assert!((0.0..=1.0).contains(&report.packet_delivery_ratio));
        if report.packet_delivery_ratio == 1.0 {
            assert_eq!(report.total_drops(), 0);
        }
    }

    #[test]
    fn test_conservation_when_nodes_die() {
        let mut config = SimConfig {
            horizon: 3000.0,
            seed: 11,
            ..SimConfig::default()
        };
        config.energy.initial = 3.0;
        let report = Simulation::new(config).unwrap().run();

        assert!(report.node_deaths > 0);
        assert!(report.cancelled_events > 0);
        assert_eq!(report.nodes_alive as u64 + report.node_deaths, report.num_nodes as u64);
        assert_conserved(&report);
        assert!(report.residual_energy.iter().all(|e| *e >= 0.0));
    }

    #[test]
    fn test_dead_nodes_stay_dead() {
        let mut config = SimConfig {
            horizon: 2000.0,
            seed: 3,
            ..SimConfig::default()
        };
        config.energy.initial = 2.0;
        let mut sim = Simulation::new(config).unwrap();
        let report = sim.run();
        for id in 0..report.num_nodes {
            let node = sim.node(id).unwrap();
            if node.state() == OperationalState::Dead {
                assert_eq!(node.energy().balance(), 0.0);
                assert!(node.energy().depleted_at().is_some());
                assert_eq!(report.residual_energy[id], 0.0);
            } else {
                assert!(node.energy().balance() > 0.0);
            }
        }
    }

    #[test]
    fn test_determinism() {
        let config = SimConfig {
            horizon: 1500.0,
            seed: 99,
            ..SimConfig::default()
        };
        let a = Simulation::new(config.clone()).unwrap().run();
        let b = Simulation::new(config).unwrap().run();
        assert_eq!(a, b);
        assert_eq!(a.to_metrics(), b.to_metrics());
    }

    #[test]
    fn test_scenario_a_baseline() {
        let report = Simulation::new(baseline(2000.0)).unwrap().run();
        assert_eq!(report.num_nodes, 50);
        assert!(report.packets_delivered > 0);
        assert!(
            report.packet_delivery_ratio > 0.9,
            "baseline pdr {:.3}",
            report.packet_delivery_ratio
        );
        assert_eq!(report.drops_for(DropReason::Blackhole), 0);
        assert_eq!(report.drops_for(DropReason::Selfish), 0);
        assert_conserved(&report);
    }

    #[test]
    fn test_scenario_b_blackholes() {
        let clean = baseline(2000.0);
        let mut attacked = clean.clone();
        attacked.attackers.blackhole = 0.2;

        let mut sim_a = Simulation::new(clean).unwrap();
        let mut sim_b = Simulation::new(attacked).unwrap();
        for id in 0..sim_a.topology().len() {
            assert_eq!(sim_a.topology().position(id), sim_b.topology().position(id));
        }

        let a = sim_a.run();
        let b = sim_b.run();
        assert_eq!(b.role_counts["blackhole"], 10);
        assert!(b.drops_for(DropReason::Blackhole) > 0);
        assert!(b.packet_delivery_ratio < a.packet_delivery_ratio);

        let tally = &b.forwarding_by_role["blackhole"];
        assert!(tally.defected > 0);
        assert_eq!(tally.cooperated, 0, "blackholes never forward");
        assert_conserved(&b);

        assert!(b.decisions.reporting > 0);
        assert!(b.reports_true > 0, "blackhole neighbors get reported");
        assert_eq!(b.reports_false, 0, "legitimate nodes never defect");

        for id in 0..sim_b.topology().len() {
            let Some(node) = sim_b.node(id) else { continue };
            if node.role() != Role::Legitimate || !node.is_alive() {
                continue;
            }
            if let Some(parent) = node.parent() {
                if sim_b.roles()[parent] == Role::Blackhole {
                    assert_eq!(
                        node.assessor().defect_count(parent),
                        0,
                        "node {} kept parent {} after seeing it drop",
                        id,
                        parent
                    );
                }
            }
        }
    }

    #[test]
    fn test_scenario_c_death_gating() {
        const K: u64 = 5;
        let positions = vec![Position { x: 0.0, y: 0.0 }, Position { x: 30.0, y: 0.0 }];
        let mut config = baseline(2000.0);
        config.energy = EnergyConfig {
            initial: 100.0,
            tx_data: 1.0,
            rx_data: 0.0,
            tx_control: 1.0,
            rx_control: 0.0,
            decision: 0.0,
            assessor_update: 0.0,
            idle_per_unit: 0.0,
        };
        let mut sim = Simulation::with_topology(config, Topology::from_positions(positions, 70.0)).unwrap();
        sim.set_initial_energy(SINK_ID, 1e9);
        sim.set_initial_energy(1, K as f64);
        let report = sim.run();

        let node = sim.node(1).unwrap();
        assert_eq!(node.state(), OperationalState::Dead);
        assert_eq!(node.transmissions(), K);
        assert_eq!(node.energy().balance(), 0.0);
        assert!(node.originated() < K);
        assert_eq!(report.packets_generated, node.originated());
        assert_eq!(report.node_deaths, 1);
        assert_conserved(&report);
    }

    #[test]
    fn test_second_run_reports_same_state() {
        let mut sim = Simulation::new(baseline(500.0)).unwrap();
        let first = sim.run();
        let second = sim.run();
        assert_eq!(first, second);
    }
}
