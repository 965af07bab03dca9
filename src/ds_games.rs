//! Game Formulation Engine
//!
//! Static rules of the three interaction games: payoff tables for the packet
//! forwarding and information reporting games, and the weight vector of the
//! parent selection game. Loaded once, validated, then shared read-only by
//! every node for the whole run.

use serde::{Deserialize, Serialize};

use crate::ds_error::{ensure_cost, ensure_finite, ensure_positive, ConfigError, Result};

// ============================================================================
// Packet Forwarding Game
// ============================================================================

/// Sender payoffs in the forwarding game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardingPayoffs {
    /// Sent, forwarder cooperated (reward minus cost)
    pub send_cooperate: f64,
    /// Sent, forwarder defected (penalty minus cost)
    pub send_defect: f64,
    /// Held instead of sending
    pub hold: f64,
    /// Best expected utility below this holds the packet
    pub hold_threshold: f64,
    /// Delay before a held packet is re-evaluated
    pub hold_backoff: f64,
    /// Holds allowed before the packet is given up as unroutable
    pub max_hold_attempts: u32,
}

impl Default for ForwardingPayoffs {
    fn default() -> Self {
        Self {
            send_cooperate: 4.0,
            send_defect: -11.0,
            hold: -0.1,
            hold_threshold: -0.1,
            hold_backoff: 5.0,
            max_hold_attempts: 3,
        }
    }
}

impl ForwardingPayoffs {
    /// EU(send) = p·payoff(cooperate) + (1−p)·payoff(defect)
    pub fn expected_send_utility(&self, p_cooperate: f64) -> f64 {
        p_cooperate * self.send_cooperate + (1.0 - p_cooperate) * self.send_defect
    }
}

// ============================================================================
// Parent Selection Game
// ============================================================================

/// Child-side weights over the evidence about a candidate parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParentWeights {
    pub rank: f64,
    pub stability: f64,
    pub link_quality: f64,
    /// A challenger must beat the current parent's score by more than this
    pub hysteresis_margin: f64,
    /// Rank at which the rank term bottoms out at zero
    pub max_rank: u32,
}

impl Default for ParentWeights {
    fn default() -> Self {
        Self {
            rank: 0.5,
            stability: 0.3,
            link_quality: 0.2,
            hysteresis_margin: 0.05,
            max_rank: 8,
        }
    }
}

impl ParentWeights {
    pub fn total(&self) -> f64 {
        self.rank + self.stability + self.link_quality
    }

    /// Weighted sum of the three normalized evidence terms
    pub fn combine(&self, rank_term: f64, stability: f64, link_quality: f64) -> f64 {
        self.rank * rank_term + self.stability * stability + self.link_quality * link_quality
    }
}

// ============================================================================
// Information Reporting Game
// ============================================================================

/// Reporter payoffs, indexed by (action, actual behavior of the suspect)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingPayoffs {
    pub report_misbehavior: f64,
    pub report_normal: f64,
    pub silent_misbehavior: f64,
    pub silent_normal: f64,
    /// Negative interactions needed before reporting is considered
    pub threshold: u32,
    /// Minimum time between two reports about the same neighbor
    pub cooldown: f64,
}

impl Default for ReportingPayoffs {
    fn default() -> Self {
        Self {
            report_misbehavior: 5.0,
            report_normal: -3.0,
            silent_misbehavior: -2.0,
            silent_normal: 0.0,
            threshold: 3,
            cooldown: 200.0,
        }
    }
}

impl ReportingPayoffs {
    /// Payoff gained by reporting a neighbor that really misbehaves
    pub fn misbehavior_gain(&self) -> f64 {
        self.report_misbehavior - self.silent_misbehavior
    }

    /// Share of the reporting decision driven by the gain on a correct report.
    ///
    /// Zero when reporting a bad neighbor pays no better than staying silent.
    pub fn report_scale(&self) -> f64 {
        let gain = self.misbehavior_gain();
        if gain <= 0.0 {
            return 0.0;
        }
        let false_report_cost = (self.report_normal - self.silent_normal).abs();
        gain / (gain + false_report_cost)
    }
}

// ============================================================================
// Aggregate
// ============================================================================

/// All game rules, shared read-only across nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub forwarding: ForwardingPayoffs,
    pub parent: ParentWeights,
    pub reporting: ReportingPayoffs,
}

impl GameConfig {
    pub fn forwarding(&self) -> &ForwardingPayoffs {
        &self.forwarding
    }

    pub fn parent(&self) -> &ParentWeights {
        &self.parent
    }

    pub fn reporting(&self) -> &ReportingPayoffs {
        &self.reporting
    }

    /// Payoffs finite; weights finite, non-negative, positive total
    pub fn validate(&self) -> Result<()> {
        let f = &self.forwarding;
        ensure_finite("games.forwarding.send_cooperate", f.send_cooperate)?;
        ensure_finite("games.forwarding.send_defect", f.send_defect)?;
        ensure_finite("games.forwarding.hold", f.hold)?;
        ensure_finite("games.forwarding.hold_threshold", f.hold_threshold)?;
        ensure_positive("games.forwarding.hold_backoff", f.hold_backoff)?;

        let p = &self.parent;
        for (name, value) in [
            ("games.parent.rank", p.rank),
            ("games.parent.stability", p.stability),
            ("games.parent.link_quality", p.link_quality),
        ] {
            ensure_finite(name, value)?;
            if value < 0.0 {
                return Err(ConfigError::NegativeWeight { name, value });
            }
        }
        if p.total() <= 0.0 {
            return Err(ConfigError::ZeroWeightTotal);
        }
        ensure_cost("games.parent.hysteresis_margin", p.hysteresis_margin)?;
        if p.max_rank == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "games.parent.max_rank",
                reason: "must be at least 1".to_string(),
            });
        }

        let r = &self.reporting;
        ensure_finite("games.reporting.report_misbehavior", r.report_misbehavior)?;
        ensure_finite("games.reporting.report_normal", r.report_normal)?;
        ensure_finite("games.reporting.silent_misbehavior", r.silent_misbehavior)?;
        ensure_finite("games.reporting.silent_normal", r.silent_normal)?;
        ensure_cost("games.reporting.cooldown", r.cooldown)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(GameConfig::default().validate().is_ok());
    }

    #[test]
    fn test_expected_send_utility() {
        let f = ForwardingPayoffs::default();
        assert_eq!(f.expected_send_utility(1.0), 4.0);
        assert_eq!(f.expected_send_utility(0.0), -11.0);
        // break-even against holding sits around p = 0.727
        assert!(f.expected_send_utility(0.72) < f.hold_threshold);
        assert!(f.expected_send_utility(0.73) > f.hold_threshold);
    }

    #[test]
    fn test_non_finite_payoff_rejected() {
        let mut games = GameConfig::default();
        games.forwarding.send_defect = f64::NEG_INFINITY;
        assert!(matches!(games.validate(), Err(ConfigError::NonFinite { .. })));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut games = GameConfig::default();
        games.parent.stability = -0.1;
        assert!(matches!(games.validate(), Err(ConfigError::NegativeWeight { .. })));
    }

    #[test]
    fn test_zero_weight_total_rejected() {
        let mut games = GameConfig::default();
        games.parent.rank = 0.0;
        games.parent.stability = 0.0;
        games.parent.link_quality = 0.0;
        assert!(matches!(games.validate(), Err(ConfigError::ZeroWeightTotal)));
    }

    #[test]
    fn test_report_scale() {
        let r = ReportingPayoffs::default();
        // gain 7, false-report cost 3
        assert!((r.report_scale() - 0.7).abs() < 1e-12);

        let richer = ReportingPayoffs {
            report_misbehavior: 10.0,
            ..ReportingPayoffs::default()
        };
        assert!(richer.report_scale() > r.report_scale());

        let pointless = ReportingPayoffs {
            report_misbehavior: -2.0,
            ..ReportingPayoffs::default()
        };
        assert_eq!(pointless.report_scale(), 0.0);
    }
}
