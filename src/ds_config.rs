//! Run configuration: one serde tree, every section defaulted so scenario
//! files only need to name what they override.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ds_assessor::AssessorConfig;
use crate::ds_attacker::AttackerConfig;
use crate::ds_energy::EnergyConfig;
use crate::ds_error::{ensure_positive, Result};
use crate::ds_games::GameConfig;
use crate::ds_node::TrafficConfig;
use crate::ds_routing::RoutingConfig;
use crate::ds_topology::{ChannelConfig, TopologyConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Virtual time at which the run stops
    pub horizon: f64,
    pub seed: u64,
    pub topology: TopologyConfig,
    pub channel: ChannelConfig,
    pub energy: EnergyConfig,
    pub games: GameConfig,
    pub assessor: AssessorConfig,
    pub routing: RoutingConfig,
    pub traffic: TrafficConfig,
    pub attackers: AttackerConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            horizon: 5000.0,
            seed: 42,
            topology: TopologyConfig::default(),
            channel: ChannelConfig::default(),
            energy: EnergyConfig::default(),
            games: GameConfig::default(),
            assessor: AssessorConfig::default(),
            routing: RoutingConfig::default(),
            traffic: TrafficConfig::default(),
            attackers: AttackerConfig::default(),
        }
    }
}

impl SimConfig {
    /// Every setup-time rule; the first violation wins
    pub fn validate(&self) -> Result<()> {
        ensure_positive("horizon", self.horizon)?;
        self.topology.validate()?;
        self.channel.validate()?;
        self.energy.validate()?;
        self.games.validate()?;
        self.assessor.validate()?;
        self.routing.validate()?;
        self.traffic.validate()?;
        self.attackers.validate()
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: SimConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Same run without any attackers
    pub fn without_attackers(mut self) -> Self {
        self.attackers.blackhole = 0.0;
        self.attackers.selfish = 0.0;
        self.attackers.rank_attacker = 0.0;
        self
    }
}
