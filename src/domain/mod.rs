pub mod account;
pub mod application;
pub mod command;
pub mod commission;
pub mod error;
pub mod escrow;
pub mod money;
pub mod traits;
pub mod transaction;

pub type UserId = u64;
pub type JobId = u64;

pub use account::{BalanceView, CreditAccount};
pub use application::{Application, ApplicationStatus};
pub use command::{Command, CommandKind};
pub use commission::{CommissionInput, CommissionResult, SettlementFacts, calculate_commissions};
pub use error::Error;
pub use escrow::{Commission, Escrow, EscrowStatus};
pub use money::Money;
pub use traits::{
    AccountTxn, ApplicationStore, CommandStream, DeadLetterQueue, EscrowStore, EscrowTxn, JobGate,
    LedgerStore, SettlementStore,
};
pub use transaction::{CreditSource, CreditTransaction, TransactionReason};
