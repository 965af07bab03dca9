//! Per-node energy ledger.
//!
//! Every radio operation, every decision-unit invocation and idle listening
//! time is debited here. A debit that takes the balance to zero or below
//! clamps it to zero and marks the ledger depleted; depleted ledgers refuse
//! all later debits, so the balance never changes again.

use serde::{Deserialize, Serialize};

use crate::ds_error::{ensure_cost, ensure_positive, Result};
use crate::ds_interface::SimTime;

/// Budget and per-operation costs (conceptual Joules)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    pub initial: f64,
    pub tx_data: f64,
    pub rx_data: f64,
    pub tx_control: f64,
    pub rx_control: f64,
    /// One strategic decision unit evaluation
    pub decision: f64,
    /// One local information assessor update
    pub assessor_update: f64,
    /// Idle listening, per unit of virtual time
    pub idle_per_unit: f64,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            initial: 100.0,
            tx_data: 0.05,
            rx_data: 0.02,
            tx_control: 0.01,
            rx_control: 0.005,
            decision: 0.001,
            assessor_update: 0.0005,
            idle_per_unit: 0.0001,
        }
    }
}

impl EnergyConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("energy.initial", self.initial)?;
        ensure_cost("energy.tx_data", self.tx_data)?;
        ensure_cost("energy.rx_data", self.rx_data)?;
        ensure_cost("energy.tx_control", self.tx_control)?;
        ensure_cost("energy.rx_control", self.rx_control)?;
        ensure_cost("energy.decision", self.decision)?;
        ensure_cost("energy.assessor_update", self.assessor_update)?;
        ensure_cost("energy.idle_per_unit", self.idle_per_unit)
    }

    pub fn cost(&self, op: EnergyOp) -> f64 {
        match op {
            EnergyOp::TxData => self.tx_data,
            EnergyOp::RxData => self.rx_data,
            EnergyOp::TxControl => self.tx_control,
            EnergyOp::RxControl => self.rx_control,
            EnergyOp::Decision => self.decision,
            EnergyOp::AssessorUpdate => self.assessor_update,
            EnergyOp::Idle(elapsed) => self.idle_per_unit * elapsed.max(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnergyOp {
    TxData,
    RxData,
    TxControl,
    RxControl,
    Decision,
    AssessorUpdate,
    Idle(SimTime),
}

impl EnergyOp {
    pub fn is_transmit(&self) -> bool {
        matches!(self, EnergyOp::TxData | EnergyOp::TxControl)
    }
}

/// Result of a debit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Debit {
    Charged,
    /// This debit exhausted the budget
    Depleted,
    /// Already depleted; nothing was charged
    Refused,
}

#[derive(Debug, Clone)]
pub struct EnergyLedger {
    initial: f64,
    balance: f64,
    depleted_at: Option<SimTime>,
    idle_settled_until: SimTime,
    debit_count: u64,
}

impl EnergyLedger {
    pub fn new(initial: f64) -> Self {
        Self {
            initial,
            balance: initial,
            depleted_at: None,
            idle_settled_until: 0.0,
            debit_count: 0,
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn initial(&self) -> f64 {
        self.initial
    }

    /// Remaining share of the initial budget, in [0, 1]
    pub fn fraction_remaining(&self) -> f64 {
        if self.initial <= 0.0 {
            return 0.0;
        }
        (self.balance / self.initial).clamp(0.0, 1.0)
    }

    pub fn is_depleted(&self) -> bool {
        self.depleted_at.is_some()
    }

    pub fn depleted_at(&self) -> Option<SimTime> {
        self.depleted_at
    }

    pub fn debit_count(&self) -> u64 {
        self.debit_count
    }

    pub fn debit(&mut self, op: EnergyOp, costs: &EnergyConfig, now: SimTime) -> Debit {
        self.charge(costs.cost(op), now)
    }

    /// Charge idle listening from the last settlement up to `now`
    pub fn settle_idle(&mut self, costs: &EnergyConfig, now: SimTime) -> Debit {
        if self.is_depleted() {
            return Debit::Refused;
        }
        let elapsed = now - self.idle_settled_until;
        if elapsed <= 0.0 {
            return Debit::Charged;
        }
        self.idle_settled_until = now;
        self.debit(EnergyOp::Idle(elapsed), costs, now)
    }

    fn charge(&mut self, amount: f64, now: SimTime) -> Debit {
        if self.is_depleted() {
            return Debit::Refused;
        }
        self.debit_count += 1;
        self.balance -= amount;
        if self.balance <= 0.0 {
            self.balance = 0.0;
            self.depleted_at = Some(now);
            return Debit::Depleted;
        }
        Debit::Charged
    }
}
