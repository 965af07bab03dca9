//! Local Information Assessor
//!
//! Bounded, per-neighbor evidence store owned by a single node. Entries are
//! created lazily on first interaction and age out after a period without
//! activity; the store never keeps a full interaction history.

use std::collections::VecDeque;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ds_error::{ensure_fraction, ensure_positive, ConfigError, Result};
use crate::ds_games::ParentWeights;
use crate::ds_interface::{NodeId, Rank, SimTime};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessorConfig {
    /// Cooperation estimate for a neighbor with no forwarding evidence
    pub cooperation_prior: f64,
    /// Advertised ranks kept per neighbor for the stability estimate
    pub rank_window: usize,
    /// Entries idle for longer than this are evicted
    pub eviction_window: f64,
    /// Hard cap on tracked neighbors; the least recently active entry goes first
    pub max_entries: usize,
}

impl Default for AssessorConfig {
    fn default() -> Self {
        Self {
            cooperation_prior: 0.8,
            rank_window: 5,
            eviction_window: 400.0,
            max_entries: 64,
        }
    }
}

impl AssessorConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_fraction("assessor.cooperation_prior", self.cooperation_prior)?;
        ensure_positive("assessor.eviction_window", self.eviction_window)?;
        if self.rank_window == 0 || self.max_entries == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "assessor",
                reason: "rank_window and max_entries must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// What this node has observed about one neighbor
#[derive(Debug, Clone)]
pub struct Evidence {
    pub cooperate: u32,
    pub defect: u32,
    /// Observed defections plus routing rounds where this neighbor was
    /// passed over as not worth the risk
    pub negative: u32,
    pub last_outcome: Option<bool>,
    ranks: VecDeque<Rank>,
    pub last_version: Option<u64>,
    pub stability: f64,
    pub link_quality: f64,
    pub last_activity: SimTime,
    pub last_report: Option<SimTime>,
}

impl Evidence {
    fn new(now: SimTime) -> Self {
        Self {
            cooperate: 0,
            defect: 0,
            negative: 0,
            last_outcome: None,
            ranks: VecDeque::new(),
            last_version: None,
            stability: 1.0,
            link_quality: 0.0,
            last_activity: now,
            last_report: None,
        }
    }

    pub fn advertised_rank(&self) -> Option<Rank> {
        self.ranks.back().copied()
    }

    pub fn rank_window(&self) -> impl Iterator<Item = &Rank> {
        self.ranks.iter()
    }
}

/// Result of feeding an advertisement into the assessor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisementUpdate {
    Accepted,
    /// Version not newer than one already seen; ignored
    Stale,
}

pub struct LocalAssessor {
    config: AssessorConfig,
    entries: IndexMap<NodeId, Evidence>,
}

impl LocalAssessor {
    pub fn new(config: AssessorConfig) -> Self {
        Self {
            config,
            entries: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, neighbor: NodeId) -> Option<&Evidence> {
        self.entries.get(&neighbor)
    }

    pub fn contains(&self, neighbor: NodeId) -> bool {
        self.entries.contains_key(&neighbor)
    }

    fn touch(&mut self, neighbor: NodeId, now: SimTime) -> &mut Evidence {
        if !self.entries.contains_key(&neighbor) && self.entries.len() >= self.config.max_entries {
            self.evict_least_recent();
        }
        let entry = self
            .entries
            .entry(neighbor)
            .or_insert_with(|| Evidence::new(now));
        entry.last_activity = now;
        entry
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by(|a, b| {
                a.1.last_activity
                    .total_cmp(&b.1.last_activity)
                    .then_with(|| a.0.cmp(b.0))
            })
            .map(|(id, _)| *id);
        if let Some(id) = oldest {
            self.entries.shift_remove(&id);
        }
    }

    pub fn record_forwarding_outcome(&mut self, neighbor: NodeId, cooperated: bool, now: SimTime) {
        let entry = self.touch(neighbor, now);
        if cooperated {
            entry.cooperate += 1;
        } else {
            entry.defect += 1;
            entry.negative += 1;
        }
        entry.last_outcome = Some(cooperated);
    }

    /// Count a routing round in which `neighbor` was a candidate but judged
    /// not worth sending to. Leaves activity untouched: nothing was heard.
    pub fn record_avoided(&mut self, neighbor: NodeId) {
        if let Some(e) = self.entries.get_mut(&neighbor) {
            e.negative += 1;
        }
    }

    /// Append an advertised rank and recompute stability as 1 / (1 + variance)
    pub fn record_advertisement(
        &mut self,
        neighbor: NodeId,
        rank: Rank,
        version: u64,
        link_quality: f64,
        now: SimTime,
    ) -> AdvertisementUpdate {
        if let Some(last) = self.entries.get(&neighbor).and_then(|e| e.last_version) {
            if version <= last {
                return AdvertisementUpdate::Stale;
            }
        }

        let window = self.config.rank_window;
        let entry = self.touch(neighbor, now);
        entry.last_version = Some(version);
        entry.link_quality = link_quality.clamp(0.0, 1.0);
        entry.ranks.push_back(rank);
        while entry.ranks.len() > window {
            entry.ranks.pop_front();
        }
        entry.stability = 1.0 / (1.0 + rank_variance(&entry.ranks));
        AdvertisementUpdate::Accepted
    }

    /// cooperate / (cooperate + defect), or the prior without evidence
    pub fn estimate_cooperation_probability(&self, neighbor: NodeId) -> f64 {
        match self.entries.get(&neighbor) {
            Some(e) if e.cooperate + e.defect > 0 => {
                e.cooperate as f64 / (e.cooperate + e.defect) as f64
            }
            _ => self.config.cooperation_prior,
        }
    }

    /// Weighted rank, stability and link quality; `None` if the neighbor never advertised
    pub fn parent_score(&self, neighbor: NodeId, weights: &ParentWeights) -> Option<f64> {
        let entry = self.entries.get(&neighbor)?;
        let rank = entry.advertised_rank()?;
        let rank_term = 1.0 - (rank as f64 / weights.max_rank as f64).min(1.0);
        Some(weights.combine(rank_term, entry.stability, entry.link_quality))
    }

    pub fn advertised_rank(&self, neighbor: NodeId) -> Option<Rank> {
        self.entries.get(&neighbor).and_then(|e| e.advertised_rank())
    }

    /// Neighbors whose last advertised rank is strictly below `rank`, by id
    pub fn neighbors_ranked_below(&self, rank: Rank) -> Vec<(NodeId, Rank)> {
        let mut found: Vec<(NodeId, Rank)> = self
            .entries
            .iter()
            .filter_map(|(id, e)| e.advertised_rank().map(|r| (*id, r)))
            .filter(|(_, r)| *r < rank)
            .collect();
        found.sort_unstable_by_key(|(id, _)| *id);
        found
    }

    pub fn defect_count(&self, neighbor: NodeId) -> u32 {
        self.entries.get(&neighbor).map(|e| e.defect).unwrap_or(0)
    }

    /// Running count of negative interactions, the reporting game's trigger
    pub fn negative_count(&self, neighbor: NodeId) -> u32 {
        self.entries.get(&neighbor).map(|e| e.negative).unwrap_or(0)
    }

    pub fn last_report(&self, neighbor: NodeId) -> Option<SimTime> {
        self.entries.get(&neighbor).and_then(|e| e.last_report)
    }

    pub fn mark_reported(&mut self, neighbor: NodeId, now: SimTime) {
        if let Some(e) = self.entries.get_mut(&neighbor) {
            e.last_report = Some(now);
        }
    }

    /// Drop entries idle for longer than the eviction window; returns evicted ids
    pub fn evict_stale(&mut self, now: SimTime) -> Vec<NodeId> {
        let cutoff = now - self.config.eviction_window;
        let stale: Vec<NodeId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.last_activity < cutoff)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            self.entries.shift_remove(id);
        }
        stale
    }
}

fn rank_variance(ranks: &VecDeque<Rank>) -> f64 {
    if ranks.len() < 2 {
        return 0.0;
    }
    let n = ranks.len() as f64;
    let mean = ranks.iter().map(|r| *r as f64).sum::<f64>() / n;
    ranks.iter().map(|r| (*r as f64 - mean).powi(2)).sum::<f64>() / n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessor() -> LocalAssessor {
        LocalAssessor::new(AssessorConfig::default())
    }

    #[test]
    fn test_prior_without_evidence() {
        let lia = assessor();
        assert_eq!(lia.estimate_cooperation_probability(4), 0.8);
        assert!(lia.is_empty());
    }

    #[test]
    fn test_cooperation_ratio() {
        let mut lia = assessor();
        for _ in 0..3 {
            lia.record_forwarding_outcome(4, true, 1.0);
        }
        lia.record_forwarding_outcome(4, false, 2.0);
        assert_eq!(lia.estimate_cooperation_probability(4), 0.75);

        let e = lia.entry(4).unwrap();
        assert_eq!(e.last_outcome, Some(false));
        assert_eq!(e.last_activity, 2.0);
        assert_eq!(lia.defect_count(4), 1);
        assert_eq!(lia.negative_count(4), 1);
    }

    #[test]
    fn test_avoided_rounds_count_as_negative() {
        let mut lia = assessor();
        lia.record_forwarding_outcome(4, false, 1.0);
        lia.record_avoided(4);
        lia.record_avoided(4);
        assert_eq!(lia.defect_count(4), 1);
        assert_eq!(lia.negative_count(4), 3);
        // Avoidance is not activity; the entry still ages out
        assert_eq!(lia.entry(4).unwrap().last_activity, 1.0);

        // Unknown neighbors are not created
        lia.record_avoided(9);
        assert!(!lia.contains(9));
        assert_eq!(lia.negative_count(9), 0);
    }

    #[test]
    fn test_single_defect_zeroes_estimate() {
        let mut lia = assessor();
        lia.record_forwarding_outcome(9, false, 0.0);
        assert_eq!(lia.estimate_cooperation_probability(9), 0.0);
    }

    #[test]
    fn test_rank_window_is_bounded() {
        let mut lia = assessor();
        for v in 0..20u64 {
            lia.record_advertisement(2, (v % 3) as Rank, v + 1, 0.5, v as f64);
        }
        assert_eq!(lia.entry(2).unwrap().rank_window().count(), 5);
    }

    #[test]
    fn test_stability_drops_with_rank_variance() {
        let mut lia = assessor();
        for v in 1..=5u64 {
            lia.record_advertisement(1, 2, v, 0.5, v as f64);
            lia.record_advertisement(2, if v % 2 == 0 { 1 } else { 6 }, v, 0.5, v as f64);
        }
        let steady = lia.entry(1).unwrap().stability;
        let flappy = lia.entry(2).unwrap().stability;
        assert_eq!(steady, 1.0);
        assert!(flappy < steady);
    }

    #[test]
    fn test_stale_versions_ignored() {
        let mut lia = assessor();
        assert_eq!(lia.record_advertisement(3, 2, 5, 0.5, 0.0), AdvertisementUpdate::Accepted);
        assert_eq!(lia.record_advertisement(3, 9, 5, 0.5, 1.0), AdvertisementUpdate::Stale);
        assert_eq!(lia.record_advertisement(3, 9, 4, 0.5, 1.0), AdvertisementUpdate::Stale);
        assert_eq!(lia.advertised_rank(3), Some(2));
    }

    #[test]
    fn test_parent_score_prefers_lower_rank() {
        let mut lia = assessor();
        let w = ParentWeights::default();
        lia.record_advertisement(1, 1, 1, 0.5, 0.0);
        lia.record_advertisement(2, 4, 1, 0.5, 0.0);
        assert!(lia.parent_score(1, &w).unwrap() > lia.parent_score(2, &w).unwrap());
        assert_eq!(lia.parent_score(7, &w), None);

        // rank 0, perfectly stable, perfect link: every weight fully earned
        lia.record_advertisement(0, 0, 1, 1.0, 0.0);
        assert!((lia.parent_score(0, &w).unwrap() - w.total()).abs() < 1e-12);
    }

    #[test]
    fn test_neighbors_ranked_below_sorted_by_id() {
        let mut lia = assessor();
        lia.record_advertisement(9, 1, 1, 0.5, 0.0);
        lia.record_advertisement(3, 2, 1, 0.5, 0.0);
        lia.record_advertisement(5, 3, 1, 0.5, 0.0);
        lia.record_forwarding_outcome(7, true, 0.0);
        assert_eq!(lia.neighbors_ranked_below(3), vec![(3, 2), (9, 1)]);
    }

    #[test]
    fn test_eviction_by_inactivity() {
        let mut lia = assessor();
        lia.record_forwarding_outcome(1, true, 0.0);
        lia.record_forwarding_outcome(2, true, 300.0);
        let evicted = lia.evict_stale(500.0);
        assert_eq!(evicted, vec![1]);
        assert!(!lia.contains(1));
        assert!(lia.contains(2));
        // evidence is gone with the entry
        assert_eq!(lia.estimate_cooperation_probability(1), 0.8);
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let mut lia = LocalAssessor::new(AssessorConfig {
            max_entries: 2,
            ..AssessorConfig::default()
        });
        lia.record_forwarding_outcome(1, true, 5.0);
        lia.record_forwarding_outcome(2, true, 1.0);
        lia.record_forwarding_outcome(3, true, 6.0);
        assert_eq!(lia.len(), 2);
        assert!(lia.contains(1));
        assert!(!lia.contains(2));
        assert!(lia.contains(3));
    }

    #[test]
    fn test_report_bookkeeping() {
        let mut lia = assessor();
        lia.mark_reported(4, 1.0);
        assert_eq!(lia.last_report(4), None);
        lia.record_forwarding_outcome(4, false, 1.0);
        lia.mark_reported(4, 2.0);
        assert_eq!(lia.last_report(4), Some(2.0));
    }
}
