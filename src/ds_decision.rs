//! Strategic Decision Unit
//!
//! Expected-utility choices for the three games. The unit is a read-only view
//! over one node's assessor and the shared game rules; it never mutates
//! evidence itself; callers record the outcome of each decision.

use rand::Rng;

use crate::ds_assessor::LocalAssessor;
use crate::ds_games::{ForwardingPayoffs, GameConfig, ParentWeights, ReportingPayoffs};
use crate::ds_interface::{NodeId, SimTime};

/// Outcome of the packet forwarding game
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ForwardingDecision {
    Send { next_hop: NodeId, expected_utility: f64 },
    /// Best candidate not worth the risk right now
    Hold { best_utility: f64 },
    NoCandidate,
}

/// Outcome of the parent selection game
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParentDecision {
    Keep(NodeId),
    Switch { from: Option<NodeId>, to: NodeId, score: f64 },
    NoCandidate,
}

pub struct DecisionUnit<'a> {
    assessor: &'a LocalAssessor,
    games: &'a GameConfig,
}

impl<'a> DecisionUnit<'a> {
    pub fn new(assessor: &'a LocalAssessor, games: &'a GameConfig) -> Self {
        Self { assessor, games }
    }

    // ========================================================================
    // Packet Forwarding Game
    // ========================================================================

    /// Pick the candidate with the highest expected send utility.
    ///
    /// Ties go to the lowest id. Holds when even the best candidate falls
    /// below the configured hold threshold.
    pub fn select_forwarder(&self, candidates: &[NodeId]) -> ForwardingDecision {
        let payoffs: &ForwardingPayoffs = self.games.forwarding();
        let mut ordered = candidates.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut best: Option<(NodeId, f64)> = None;
        for id in ordered {
            let eu = self.send_utility(id);
            match best {
                Some((_, best_eu)) if eu <= best_eu => {}
                _ => best = Some((id, eu)),
            }
        }

        match best {
            None => ForwardingDecision::NoCandidate,
            Some((_, eu)) if eu < payoffs.hold_threshold => ForwardingDecision::Hold { best_utility: eu },
            Some((next_hop, expected_utility)) => ForwardingDecision::Send {
                next_hop,
                expected_utility,
            },
        }
    }

    pub fn send_utility(&self, neighbor: NodeId) -> f64 {
        let p = self.assessor.estimate_cooperation_probability(neighbor);
        self.games.forwarding().expected_send_utility(p)
    }

    /// Sending to `neighbor` clears the hold threshold
    pub fn is_viable_forwarder(&self, neighbor: NodeId) -> bool {
        self.send_utility(neighbor) >= self.games.forwarding().hold_threshold
    }

    // ========================================================================
    // Parent Selection Game
    // ========================================================================

    /// Highest parent score wins, lowest id on ties.
    ///
    /// A current parent that still scores is only abandoned for a challenger
    /// that beats it by more than the hysteresis margin.
    pub fn select_parent(&self, candidates: &[NodeId], current: Option<NodeId>) -> ParentDecision {
        let weights: &ParentWeights = self.games.parent();
        let mut ordered = candidates.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut best: Option<(NodeId, f64)> = None;
        for id in ordered {
            let Some(score) = self.assessor.parent_score(id, weights) else {
                continue;
            };
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((id, score)),
            }
        }

        let Some((challenger, challenger_score)) = best else {
            return match current {
                Some(parent) if self.assessor.parent_score(parent, weights).is_some() => {
                    ParentDecision::Keep(parent)
                }
                _ => ParentDecision::NoCandidate,
            };
        };

        if let Some(parent) = current {
            if parent == challenger {
                return ParentDecision::Keep(parent);
            }
            if let Some(current_score) = self.assessor.parent_score(parent, weights) {
                if challenger_score <= current_score + weights.hysteresis_margin {
                    return ParentDecision::Keep(parent);
                }
            }
        }

        ParentDecision::Switch {
            from: current,
            to: challenger,
            score: challenger_score,
        }
    }

    // ========================================================================
    // Information Reporting Game
    // ========================================================================

    /// Whether `neighbor` may be reported at `now`: enough negative
    /// interactions and out of cooldown
    pub fn report_eligible(&self, neighbor: NodeId, now: SimTime) -> bool {
        let payoffs = self.games.reporting();
        if self.assessor.negative_count(neighbor) < payoffs.threshold {
            return false;
        }
        match self.assessor.last_report(neighbor) {
            Some(last) => now - last >= payoffs.cooldown,
            None => true,
        }
    }

    /// Play the reporting game for `neighbor`; one roll per eligible decision
    pub fn decide_report<R: Rng>(&self, neighbor: NodeId, now: SimTime, rng: &mut R) -> bool {
        if !self.report_eligible(neighbor, now) {
            return false;
        }
        let p = report_probability(self.assessor.negative_count(neighbor), self.games.reporting());
        rng.gen::<f64>() < p
    }
}

/// scale · (1 − e^(−excess)); zero below threshold
pub fn report_probability(negatives: u32, payoffs: &ReportingPayoffs) -> f64 {
    if negatives < payoffs.threshold {
        return 0.0;
    }
    let excess = (negatives - payoffs.threshold + 1) as f64;
    payoffs.report_scale() * (1.0 - (-excess).exp())
}
