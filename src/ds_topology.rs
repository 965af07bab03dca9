//! Spatial placement, range-based neighbor discovery and the radio channel.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ds_error::{ensure_cost, ensure_fraction, ensure_positive, ConfigError, Result};
use crate::ds_interface::{NodeId, SimTime, SINK_ID};

// ============================================================================
// Configuration
// ============================================================================

/// Where nodes are placed and how far they hear each other
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub num_nodes: usize,
    pub width: f64,
    pub height: f64,
    pub radio_range: f64,
    /// Place the sink in the middle of the area instead of at random
    pub sink_at_center: bool,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            num_nodes: 50,
            width: 300.0,
            height: 300.0,
            radio_range: 70.0,
            sink_at_center: true,
        }
    }
}

impl TopologyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_nodes == 0 {
            return Err(ConfigError::EmptyTopology);
        }
        let sane = |v: f64| v.is_finite() && v > 0.0;
        if !sane(self.width) || !sane(self.height) || !sane(self.radio_range) {
            return Err(ConfigError::InvalidArea {
                width: self.width,
                height: self.height,
                range: self.radio_range,
            });
        }
        Ok(())
    }
}

/// Probabilistic delivery and propagation delay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Per-transmission success probability at zero distance
    pub delivery_probability: f64,
    /// Fraction of the success probability lost at the edge of radio range
    /// (quadratic in distance); 0 disables attenuation
    pub distance_attenuation: f64,
    pub delay_min: f64,
    pub delay_max: f64,
    /// Distance units per unit of delay multiplier
    pub delay_distance_scale: f64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            delivery_probability: 0.98,
            distance_attenuation: 0.0,
            delay_min: 0.01,
            delay_max: 0.05,
            delay_distance_scale: 10.0,
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_fraction("channel.delivery_probability", self.delivery_probability)?;
        ensure_fraction("channel.distance_attenuation", self.distance_attenuation)?;
        ensure_cost("channel.delay_min", self.delay_min)?;
        ensure_cost("channel.delay_max", self.delay_max)?;
        if self.delay_max < self.delay_min {
            return Err(ConfigError::InvalidSetting {
                name: "channel.delay_max",
                reason: format!("{} is below delay_min {}", self.delay_max, self.delay_min),
            });
        }
        ensure_positive("channel.delay_distance_scale", self.delay_distance_scale)
    }
}

// ============================================================================
// Topology
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn distance(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Fixed node positions and the symmetric in-range relation
#[derive(Debug, Clone)]
pub struct Topology {
    positions: Vec<Position>,
    /// Sorted ascending so iteration order is reproducible
    neighbors: Vec<Vec<NodeId>>,
    radio_range: f64,
}

impl Topology {
    /// Uniform random placement in the configured rectangle
    pub fn random<R: Rng>(config: &TopologyConfig, rng: &mut R) -> Self {
        let positions = (0..config.num_nodes)
            .map(|id| {
                if id == SINK_ID && config.sink_at_center {
                    Position {
                        x: config.width / 2.0,
                        y: config.height / 2.0,
                    }
                } else {
                    Position {
                        x: rng.gen_range(0.0..config.width),
                        y: rng.gen_range(0.0..config.height),
                    }
                }
            })
            .collect();
        Self::from_positions(positions, config.radio_range)
    }

    /// Explicit placement, mostly for tests and hand-built scenarios
    pub fn from_positions(positions: Vec<Position>, radio_range: f64) -> Self {
        let n = positions.len();
        let mut neighbors = vec![Vec::new(); n];
        for a in 0..n {
            for b in (a + 1)..n {
                if positions[a].distance(&positions[b]) <= radio_range {
                    neighbors[a].push(b);
                    neighbors[b].push(a);
                }
            }
        }
        for list in &mut neighbors {
            list.sort_unstable();
        }
        Self {
            positions,
            neighbors,
            radio_range,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position(&self, node: NodeId) -> Position {
        self.positions[node]
    }

    pub fn neighbors(&self, node: NodeId) -> &[NodeId] {
        &self.neighbors[node]
    }

    pub fn are_neighbors(&self, a: NodeId, b: NodeId) -> bool {
        self.neighbors[a].binary_search(&b).is_ok()
    }

    pub fn distance(&self, a: NodeId, b: NodeId) -> f64 {
        self.positions[a].distance(&self.positions[b])
    }

    pub fn radio_range(&self) -> f64 {
        self.radio_range
    }

    /// Received-signal proxy in [0, 1]: 1 next to the sender, 0 at the edge of range
    pub fn link_quality(&self, a: NodeId, b: NodeId) -> f64 {
        (1.0 - self.distance(a, b) / self.radio_range).clamp(0.0, 1.0)
    }

    pub fn average_degree(&self) -> f64 {
        if self.positions.is_empty() {
            return 0.0;
        }
        let total: usize = self.neighbors.iter().map(|n| n.len()).sum();
        total as f64 / self.positions.len() as f64
    }
}

// ============================================================================
// Channel
// ============================================================================

/// Outcome of a single over-the-air transfer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transmission {
    Delivered { delay: SimTime },
    Lost,
}

pub struct Channel {
    config: ChannelConfig,
}

impl Channel {
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }

    pub fn delivery_probability(&self, distance: f64, radio_range: f64) -> f64 {
        let relative = (distance / radio_range).clamp(0.0, 1.0);
        let attenuation = 1.0 - self.config.distance_attenuation * relative * relative;
        (self.config.delivery_probability * attenuation).clamp(0.0, 1.0)
    }

    /// Sample delivery and propagation delay for one hop
    pub fn transmit<R: Rng>(&self, topology: &Topology, from: NodeId, to: NodeId, rng: &mut R) -> Transmission {
        let distance = topology.distance(from, to);
        let p = self.delivery_probability(distance, topology.radio_range());
        // draw both values every time so the stream does not depend on the outcome
        let roll: f64 = rng.gen();
        let delay = self.sample_delay(distance, rng);
        if roll >= p {
            return Transmission::Lost;
        }
        Transmission::Delivered { delay }
    }

    /// Propagation delay between two nodes, without a delivery roll
    pub fn propagation_delay<R: Rng>(&self, topology: &Topology, from: NodeId, to: NodeId, rng: &mut R) -> SimTime {
        self.sample_delay(topology.distance(from, to), rng)
    }

    fn sample_delay<R: Rng>(&self, distance: f64, rng: &mut R) -> SimTime {
        let jitter = if self.config.delay_max > self.config.delay_min {
            rng.gen_range(self.config.delay_min..self.config.delay_max)
        } else {
            self.config.delay_min
        };
        jitter * distance.max(1.0) / self.config.delay_distance_scale
    }
}
