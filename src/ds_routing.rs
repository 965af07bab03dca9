//! Parent selection protocol: rank and version bookkeeping, advertisement
//! timing and acknowledgment tracking for one node.

use hashbrown::HashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ds_assessor::LocalAssessor;
use crate::ds_error::{ensure_cost, ensure_positive, ConfigError, Result};
use crate::ds_interface::{NodeId, Rank, SimTime, INFINITE_RANK};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Base time between two advertisements
    pub advertisement_interval: f64,
    /// Uniform extra delay added on top of the base interval
    pub advertisement_jitter: f64,
    pub hop_cost: Rank,
    /// Rank advertised by blackhole and rank attacker nodes
    pub attacker_rank: Rank,
    /// Consecutive unacknowledged data packets before the parent counts as lost
    pub max_missed_acks: u32,
    pub ack_timeout: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            advertisement_interval: 20.0,
            advertisement_jitter: 20.0,
            hop_cost: 1,
            attacker_rank: 1,
            max_missed_acks: 3,
            ack_timeout: 5.0,
        }
    }
}

impl RoutingConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("routing.advertisement_interval", self.advertisement_interval)?;
        ensure_cost("routing.advertisement_jitter", self.advertisement_jitter)?;
        ensure_positive("routing.ack_timeout", self.ack_timeout)?;
        if self.hop_cost == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "routing.hop_cost",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_missed_acks == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "routing.max_missed_acks",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Base interval plus uniform jitter
    pub fn next_advertisement_delay<R: Rng>(&self, rng: &mut R) -> SimTime {
        let jitter = if self.advertisement_jitter > 0.0 {
            rng.gen_range(0.0..self.advertisement_jitter)
        } else {
            0.0
        };
        self.advertisement_interval + jitter
    }
}

/// Routing view of a single node
#[derive(Debug, Clone)]
pub struct RoutingState {
    is_root: bool,
    parent: Option<NodeId>,
    rank: Rank,
    version: u64,
    missed_acks: HashMap<NodeId, u32>,
}

impl RoutingState {
    pub fn new_root() -> Self {
        Self {
            is_root: true,
            parent: None,
            rank: 0,
            version: 0,
            missed_acks: HashMap::new(),
        }
    }

    pub fn new() -> Self {
        Self {
            is_root: false,
            parent: None,
            rank: INFINITE_RANK,
            version: 0,
            missed_acks: HashMap::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Topological rank; infinite without a parent
    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Version stamp for the next advertisement
    pub fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Take `parent` as upstream; returns the previous parent
    pub fn adopt_parent(&mut self, parent: NodeId, parent_rank: Rank, hop_cost: Rank) -> Option<NodeId> {
        let previous = self.parent.replace(parent);
        self.rank = parent_rank.saturating_add(hop_cost);
        self.missed_acks.remove(&parent);
        previous
    }

    /// Follow a rank change advertised by the current parent
    pub fn refresh_rank(&mut self, parent_rank: Rank, hop_cost: Rank) {
        if self.parent.is_some() {
            self.rank = parent_rank.saturating_add(hop_cost);
        }
    }

    pub fn lose_parent(&mut self) -> Option<NodeId> {
        if !self.is_root {
            self.rank = INFINITE_RANK;
        }
        self.parent.take()
    }

    /// Count a missed acknowledgment from `neighbor`; returns the running total
    pub fn record_missed_ack(&mut self, neighbor: NodeId) -> u32 {
        let count = self.missed_acks.entry(neighbor).or_insert(0);
        *count += 1;
        *count
    }

    pub fn record_ack(&mut self, neighbor: NodeId) {
        self.missed_acks.remove(&neighbor);
    }

    pub fn missed_acks(&self, neighbor: NodeId) -> u32 {
        self.missed_acks.get(&neighbor).copied().unwrap_or(0)
    }

    /// Neighbors ranked below us, plus the current parent. Used both as
    /// parent candidates and as next hops for data.
    ///
    /// Neighbors that missed `max_missed_acks` acknowledgments in a row are
    /// left out until they are heard from again.
    pub fn upstream_candidates(&self, assessor: &LocalAssessor, max_missed_acks: u32) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = assessor
            .neighbors_ranked_below(self.rank)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        if let Some(parent) = self.parent {
            if let Err(pos) = ids.binary_search(&parent) {
                ids.insert(pos, parent);
            }
        }
        ids.retain(|id| self.missed_acks(*id) < max_missed_acks);
        ids
    }
}

impl Default for RoutingState {
    fn default() -> Self {
        Self::new()
    }
}
