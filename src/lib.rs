//! # desist - Decentralized Strategic Trust Simulation
//!
//! A discrete-event simulator for game-theoretic trust in constrained wireless
//! networks. Every node decides on its own how to forward traffic, which
//! neighbor to use as its upstream parent and whether to report a misbehaving
//! neighbor, by maximizing expected utility over what it has observed locally.
//! Blackhole, selfish and rank-forging attackers can be mixed in to measure how
//! well cooperation survives.
//!
//! ## Core Components
//!
//! - **Scheduler**: single-threaded virtual-time event queue
//! - **Topology / Channel**: random placement, range-based neighbors, lossy delivery
//! - **EnergyLedger**: per-node budget debited by every operation
//! - **GameConfig**: payoff tables and weights of the three games
//! - **LocalAssessor**: bounded per-neighbor evidence store
//! - **DecisionUnit**: expected-utility choices for forwarding, parent selection and reporting
//! - **RoleBehavior**: attacker overrides, one per role
//! - **DsNode**: per-node operational state machine
//! - **Simulation**: the driver that wires it all together
//!
//! ## Usage
//!
//! ```no_run
//! use desist::{SimConfig, Simulation};
//!
//! let mut config = SimConfig::default();
//! config.horizon = 2000.0;
//! config.attackers.blackhole = 0.2;
//!
//! let mut sim = Simulation::new(config).expect("valid config");
//! let report = sim.run();
//! report.print_summary();
//! ```
//!
//! Scenario files under `scenarios/` are run with the `scenario_runner`
//! binary in `simulator/`.

// Shared types and errors
pub mod ds_error;
pub mod ds_interface;

// Configuration
pub mod ds_config;
pub mod ds_games;

// Substrate
pub mod ds_energy;
pub mod ds_scheduler;
pub mod ds_topology;

// Decision core
pub mod ds_assessor;
pub mod ds_attacker;
pub mod ds_decision;
pub mod ds_routing;

// Node, run driver and results
pub mod ds_node;
pub mod ds_simulation;
pub mod ds_stats;

// Re-export commonly used types
pub use ds_config::SimConfig;
pub use ds_error::ConfigError;
pub use ds_interface::{
    DropReason, Event, EventSink, LogSink, NoOpSink, NodeId, OperationalState, Packet, PacketKind, Rank, Role,
    SimTime, SINK_ID,
};
pub use ds_simulation::Simulation;
pub use ds_stats::SimulationReport;
