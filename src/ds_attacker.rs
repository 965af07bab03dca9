//! Attacker behavior injection.
//!
//! Roles are drawn once at setup from their own random stream. Each role maps
//! to a [`RoleBehavior`] that overrides what the decision unit would otherwise
//! do in each of the three games.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ds_error::{ensure_fraction, ConfigError, Result};
use crate::ds_interface::{DropReason, NodeId, Rank, Role, SINK_ID};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackerConfig {
    /// Fraction of nodes acting as blackholes
    pub blackhole: f64,
    pub selfish: f64,
    pub rank_attacker: f64,
    /// Defect probability of a selfish node on a full battery
    pub selfish_min_defect: f64,
}

impl Default for AttackerConfig {
    fn default() -> Self {
        Self {
            blackhole: 0.1,
            selfish: 0.1,
            rank_attacker: 0.05,
            selfish_min_defect: 0.2,
        }
    }
}

impl AttackerConfig {
    pub fn total_fraction(&self) -> f64 {
        self.blackhole + self.selfish + self.rank_attacker
    }

    pub fn validate(&self) -> Result<()> {
        ensure_fraction("attackers.blackhole", self.blackhole)?;
        ensure_fraction("attackers.selfish", self.selfish)?;
        ensure_fraction("attackers.rank_attacker", self.rank_attacker)?;
        ensure_fraction("attackers.selfish_min_defect", self.selfish_min_defect)?;
        let total = self.total_fraction();
        // tolerate float noise from e.g. 0.1 + 0.2 + 0.7
        if total > 1.0 + 1e-9 {
            return Err(ConfigError::AttackerFractionsExceedOne(total));
        }
        Ok(())
    }
}

/// Disjoint role assignment over `num_nodes` nodes.
///
/// Each attacker count is `floor(fraction · num_nodes)`, taken from a shuffled
/// list of non-sink ids. The sink is always Legitimate.
pub fn assign_roles(config: &AttackerConfig, num_nodes: usize, rng: &mut StdRng) -> Vec<Role> {
    let mut roles = vec![Role::Legitimate; num_nodes];
    let mut pool: Vec<NodeId> = (0..num_nodes).filter(|id| *id != SINK_ID).collect();
    pool.shuffle(rng);

    let mut pool = pool.into_iter();
    for (role, fraction) in [
        (Role::Blackhole, config.blackhole),
        (Role::Selfish, config.selfish),
        (Role::RankAttacker, config.rank_attacker),
    ] {
        let count = (fraction * num_nodes as f64).floor() as usize;
        for id in pool.by_ref().take(count) {
            roles[id] = role;
        }
    }
    roles
}

// ============================================================================
// Behavior table
// ============================================================================

/// What a forwarder actually does with a data packet it received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardingVerdict {
    Cooperate,
    Defect(DropReason),
}

/// Inputs a role may consult when overriding the forwarding decision
pub struct ForwardingContext<'a> {
    pub energy_fraction: f64,
    pub config: &'a AttackerConfig,
    pub rng: &'a mut StdRng,
}

/// Per-role overrides applied after the decision unit
pub trait RoleBehavior: Sync {
    fn role(&self) -> Role;

    /// Whether to carry a received data packet onward
    fn forwarding(&self, _ctx: &mut ForwardingContext<'_>) -> ForwardingVerdict {
        ForwardingVerdict::Cooperate
    }

    /// Rank put into advertisements, given the topological rank
    fn advertised_rank(&self, true_rank: Rank, _attacker_rank: Rank) -> Rank {
        true_rank
    }

    /// Whether the reporting game is played at all
    fn reports(&self) -> bool {
        false
    }
}

struct Legitimate;
struct Blackhole;
struct Selfish;
struct RankAttacker;

impl RoleBehavior for Legitimate {
    fn role(&self) -> Role {
        Role::Legitimate
    }

    fn reports(&self) -> bool {
        true
    }
}

impl RoleBehavior for Blackhole {
    fn role(&self) -> Role {
        Role::Blackhole
    }

    fn forwarding(&self, _ctx: &mut ForwardingContext<'_>) -> ForwardingVerdict {
        ForwardingVerdict::Defect(DropReason::Blackhole)
    }

    fn advertised_rank(&self, _true_rank: Rank, attacker_rank: Rank) -> Rank {
        attacker_rank
    }
}

impl RoleBehavior for Selfish {
    fn role(&self) -> Role {
        Role::Selfish
    }

    fn forwarding(&self, ctx: &mut ForwardingContext<'_>) -> ForwardingVerdict {
        let p = selfish_defect_probability(ctx.config.selfish_min_defect, ctx.energy_fraction);
        if ctx.rng.gen::<f64>() < p {
            ForwardingVerdict::Defect(DropReason::Selfish)
        } else {
            ForwardingVerdict::Cooperate
        }
    }
}

impl RoleBehavior for RankAttacker {
    fn role(&self) -> Role {
        Role::RankAttacker
    }

    fn advertised_rank(&self, _true_rank: Rank, attacker_rank: Rank) -> Rank {
        attacker_rank
    }
}

static LEGITIMATE: Legitimate = Legitimate;
static BLACKHOLE: Blackhole = Blackhole;
static SELFISH: Selfish = Selfish;
static RANK_ATTACKER: RankAttacker = RankAttacker;

pub fn behavior_for(role: Role) -> &'static dyn RoleBehavior {
    match role {
        Role::Legitimate => &LEGITIMATE,
        Role::Blackhole => &BLACKHOLE,
        Role::Selfish => &SELFISH,
        Role::RankAttacker => &RANK_ATTACKER,
    }
}

/// min + (1 − min)·(1 − energy fraction): grows as the battery drains
pub fn selfish_defect_probability(min_defect: f64, energy_fraction: f64) -> f64 {
    let drained = 1.0 - energy_fraction.clamp(0.0, 1.0);
    (min_defect + (1.0 - min_defect) * drained).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn mix(blackhole: f64, selfish: f64, rank_attacker: f64) -> AttackerConfig {
        AttackerConfig {
            blackhole,
            selfish,
            rank_attacker,
            ..AttackerConfig::default()
        }
    }

    #[test]
    fn test_assignment_counts_and_sink() {
        let config = mix(0.2, 0.1, 0.06);
        let roles = assign_roles(&config, 50, &mut StdRng::seed_from_u64(11));
        let count = |r: Role| roles.iter().filter(|x| **x == r).count();
        assert_eq!(count(Role::Blackhole), 10);
        assert_eq!(count(Role::Selfish), 5);
        assert_eq!(count(Role::RankAttacker), 3);
        assert_eq!(count(Role::Legitimate), 32);
        assert_eq!(roles[SINK_ID], Role::Legitimate);
    }

    #[test]
    fn test_assignment_is_seeded() {
        let config = mix(0.2, 0.2, 0.2);
        let a = assign_roles(&config, 40, &mut StdRng::seed_from_u64(5));
        let b = assign_roles(&config, 40, &mut StdRng::seed_from_u64(5));
        assert_eq!(a, b);
    }

    #[test]
    fn test_full_attacker_share_leaves_sink_alone() {
        let roles = assign_roles(&mix(1.0, 0.0, 0.0), 10, &mut StdRng::seed_from_u64(1));
        assert_eq!(roles[SINK_ID], Role::Legitimate);
        assert!(roles[1..].iter().all(|r| *r == Role::Blackhole));
    }

    #[test]
    fn test_validation() {
        assert!(AttackerConfig::default().validate().is_ok());
        assert!(mix(0.5, 0.3, 0.2).validate().is_ok());
        assert!(matches!(
            mix(0.5, 0.4, 0.2).validate(),
            Err(ConfigError::AttackerFractionsExceedOne(_))
        ));
        assert!(matches!(
            mix(-0.1, 0.0, 0.0).validate(),
            Err(ConfigError::InvalidFraction { .. })
        ));
    }

    #[test]
    fn test_blackhole_always_defects() {
        let config = AttackerConfig::default();
        let mut rng = StdRng::seed_from_u64(2);
        let behavior = behavior_for(Role::Blackhole);
        for _ in 0..200 {
            let mut ctx = ForwardingContext { energy_fraction: 1.0, config: &config, rng: &mut rng };
            assert_eq!(behavior.forwarding(&mut ctx), ForwardingVerdict::Defect(DropReason::Blackhole));
        }
        assert_eq!(behavior.advertised_rank(7, 1), 1);
        assert!(!behavior.reports());
    }

    #[test]
    fn test_selfish_defects_more_when_drained() {
        assert!((selfish_defect_probability(0.2, 1.0) - 0.2).abs() < 1e-12);
        assert!((selfish_defect_probability(0.2, 0.5) - 0.6).abs() < 1e-12);
        assert_eq!(selfish_defect_probability(0.2, 0.0), 1.0);

        let config = AttackerConfig::default();
        let mut rng = StdRng::seed_from_u64(9);
        let behavior = behavior_for(Role::Selfish);
        let mut defects = |fraction: f64| {
            (0..2000)
                .filter(|_| {
                    let mut ctx = ForwardingContext { energy_fraction: fraction, config: &config, rng: &mut rng };
                    behavior.forwarding(&mut ctx) != ForwardingVerdict::Cooperate
                })
                .count()
        };
        let full = defects(1.0);
        let drained = defects(0.1);
        assert!(drained > full);
    }

    #[test]
    fn test_rank_attacker_forwards_honestly() {
        let config = AttackerConfig::default();
        let mut rng = StdRng::seed_from_u64(3);
        let behavior = behavior_for(Role::RankAttacker);
        let mut ctx = ForwardingContext { energy_fraction: 0.0, config: &config, rng: &mut rng };
        assert_eq!(behavior.forwarding(&mut ctx), ForwardingVerdict::Cooperate);
        assert_eq!(behavior.advertised_rank(6, 1), 1);
    }

    #[test]
    fn test_only_legitimate_reports() {
        assert!(behavior_for(Role::Legitimate).reports());
        assert_eq!(behavior_for(Role::Legitimate).advertised_rank(4, 1), 4);
        for role in [Role::Blackhole, Role::Selfish, Role::RankAttacker] {
            assert!(!behavior_for(role).reports());
            assert_eq!(behavior_for(role).role(), role);
        }
    }
}
