use crate::domain::{Error, Money};

pub const WORKER_COMMISSION_VERIFIED_PCT: u32 = 5;
pub const WORKER_COMMISSION_UNVERIFIED_PCT: u32 = 10;
pub const CLIENT_COMMISSION_PCT: u32 = 4;
pub const ESCROW_FEE_PCT: u32 = 2;
/// Flat client fee for micro-tasks, independent of the payment amount.
pub const MICRO_TASK_CLIENT_FEE: Money = Money(500);

/// Facts supplied at settlement time by the job/contract collaborators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettlementFacts {
    pub worker_verified: bool,
    pub first_three_jobs: bool,
    pub client_has_subscription: bool,
    pub micro_task: bool,
    /// Overrides the escrowed contract amount as the charged base when the
    /// actual payment differs (partial settlement).
    pub payment_amount: Option<Money>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionInput {
    pub contract_amount: Money,
    pub payment_amount: Money,
    pub worker_verified: bool,
    pub first_three_jobs: bool,
    pub client_has_subscription: bool,
    pub micro_task: bool,
}

impl CommissionInput {
    /// Plain input where the payment equals the contract amount.
    pub fn for_contract(contract_amount: Money) -> Self {
        Self {
            contract_amount,
            payment_amount: contract_amount,
            worker_verified: false,
            first_three_jobs: false,
            client_has_subscription: false,
            micro_task: false,
        }
    }

    pub fn from_facts(contract_amount: Money, facts: &SettlementFacts) -> Self {
        Self {
            contract_amount,
            payment_amount: facts.payment_amount.unwrap_or(contract_amount),
            worker_verified: facts.worker_verified,
            first_three_jobs: facts.first_three_jobs,
            client_has_subscription: facts.client_has_subscription,
            micro_task: facts.micro_task,
        }
    }
}

/// Full fee breakdown for one settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionResult {
    pub worker_commission_percent: u32,
    pub worker_commission: Money,
    pub client_commission_percent: u32,
    pub client_commission: Money,
    pub escrow_fee_percent: u32,
    pub escrow_fee: Money,
    pub net_worker_payout: Money,
    pub net_client_payment: Money,
    pub total_platform_revenue: Money,
}

/// Maps contract and payment facts to a fee breakdown.
///
/// Pure and deterministic: identical inputs always produce identical output,
/// which makes it safe to call at quote time and again at settlement time.
pub fn calculate_commissions(input: &CommissionInput) -> Result<CommissionResult, Error> {
    let worker_commission_percent = if input.first_three_jobs {
        0
    } else if input.worker_verified {
        WORKER_COMMISSION_VERIFIED_PCT
    } else {
        WORKER_COMMISSION_UNVERIFIED_PCT
    };
    let worker_commission = input
        .contract_amount
        .percent(worker_commission_percent)
        .ok_or(Error::Overflow("worker commission"))?;

    let (client_commission_percent, client_commission) = if input.client_has_subscription {
        (0, Money::ZERO)
    } else if input.micro_task {
        (0, MICRO_TASK_CLIENT_FEE)
    } else {
        let fee = input
            .payment_amount
            .percent(CLIENT_COMMISSION_PCT)
            .ok_or(Error::Overflow("client commission"))?;
        (CLIENT_COMMISSION_PCT, fee)
    };

    let escrow_fee = input
        .payment_amount
        .percent(ESCROW_FEE_PCT)
        .ok_or(Error::Overflow("escrow fee"))?;

    let net_worker_payout = input
        .contract_amount
        .checked_sub(worker_commission)
        .ok_or(Error::Overflow("net worker payout"))?;
    let net_client_payment = input
        .payment_amount
        .checked_add(client_commission)
        .and_then(|m| m.checked_add(escrow_fee))
        .ok_or(Error::Overflow("net client payment"))?;
    let total_platform_revenue = worker_commission
        .checked_add(client_commission)
        .and_then(|m| m.checked_add(escrow_fee))
        .ok_or(Error::Overflow("platform revenue"))?;

    Ok(CommissionResult {
        worker_commission_percent,
        worker_commission,
        client_commission_percent,
        client_commission,
        escrow_fee_percent: ESCROW_FEE_PCT,
        escrow_fee,
        net_worker_payout,
        net_client_payment,
        total_platform_revenue,
    })
}
