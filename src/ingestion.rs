use std::io::Read;
use std::pin::Pin;

use futures::stream::{self, Stream};
use serde::Deserialize;

use crate::domain::traits::CommandStream;
use crate::domain::{Command, CommandKind, Error, JobId, Money, SettlementFacts};

const DEFAULT_CURRENCY: &str = "EUR";

pub struct CsvReader<R: Read> {
    reader: Option<csv::Reader<R>>,
}

impl<R: Read> CsvReader<R> {
    pub fn new(reader: R) -> Result<Self, Error> {
        let rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        Ok(Self { reader: Some(rdr) })
    }
}

/// Internal shape used only for CSV deserialization.
#[derive(Debug, Deserialize)]
struct CsvRow {
    op: String,
    user: u64,
    job: Option<u64>,
    amount: Option<String>,
    verified: Option<bool>,
    first_three: Option<bool>,
    subscription: Option<bool>,
    micro: Option<bool>,
    currency: Option<String>,
}

impl CsvRow {
    fn job(&self) -> Result<JobId, Error> {
        self.job
            .ok_or_else(|| Error::Ingestion(format!("op {} requires a job id", self.op)))
    }

    fn credits(&self) -> Result<u64, Error> {
        let raw = self
            .amount
            .as_deref()
            .ok_or_else(|| Error::Ingestion(format!("op {} requires a credit amount", self.op)))?;
        raw.parse()
            .map_err(|_| Error::Ingestion(format!("invalid credit amount: {raw}")))
    }

    fn money(&self) -> Result<Money, Error> {
        let raw = self
            .amount
            .as_deref()
            .ok_or_else(|| Error::Ingestion(format!("op {} requires a money amount", self.op)))?;
        Money::from_decimal_str(raw)
            .ok_or_else(|| Error::Ingestion(format!("invalid money amount: {raw}")))
    }

    fn facts(&self) -> Result<SettlementFacts, Error> {
        let payment_amount = match self.amount.as_deref() {
            Some(raw) => Some(
                Money::from_decimal_str(raw)
                    .ok_or_else(|| Error::Ingestion(format!("invalid payment amount: {raw}")))?,
            ),
            None => None,
        };
        Ok(SettlementFacts {
            worker_verified: self.verified.unwrap_or(false),
            first_three_jobs: self.first_three.unwrap_or(false),
            client_has_subscription: self.subscription.unwrap_or(false),
            micro_task: self.micro.unwrap_or(false),
            payment_amount,
        })
    }
}

impl TryFrom<CsvRow> for Command {
    type Error = Error;

    fn try_from(row: CsvRow) -> Result<Self, Self::Error> {
        let kind = match row.op.trim().to_ascii_lowercase().as_str() {
            "credit" => CommandKind::Credit {
                amount: row.credits()?,
            },
            "grant" => CommandKind::Grant {
                amount: row.credits()?,
            },
            "reserve" => CommandKind::Reserve {
                job_id: row.job()?,
                amount: row.credits()?,
            },
            "release" => CommandKind::Release {
                job_id: row.job()?,
                amount: row.credits()?,
            },
            "consume" => CommandKind::Consume {
                job_id: row.job()?,
                amount: row.credits()?,
            },
            "refund" => CommandKind::Refund {
                job_id: row.job()?,
                amount: row.credits()?,
            },
            "apply" => CommandKind::Apply {
                job_id: row.job()?,
                credits: row.credits()?,
            },
            "accept" => CommandKind::Accept { job_id: row.job()? },
            "reject" => CommandKind::Reject { job_id: row.job()? },
            "withdraw" => CommandKind::Withdraw { job_id: row.job()? },
            "escrow_create" => CommandKind::EscrowCreate {
                job_id: row.job()?,
                amount: row.money()?,
                currency: row
                    .currency
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CURRENCY.to_owned()),
            },
            "escrow_fund" => CommandKind::EscrowFund { job_id: row.job()? },
            "escrow_release" => CommandKind::EscrowRelease {
                job_id: row.job()?,
                facts: row.facts()?,
            },
            "escrow_cancel" => CommandKind::EscrowCancel { job_id: row.job()? },
            other => {
                return Err(Error::Ingestion(format!("invalid op: {}", other)));
            }
        };

        Ok(Command {
            user_id: row.user,
            kind,
        })
    }
}

impl<R: Read + Send + 'static> CommandStream for CsvReader<R> {
    type Commands = Pin<Box<dyn Stream<Item = Result<Command, Error>> + Send>>;

    fn stream(&mut self) -> Self::Commands {
        // Take ownership of the reader so the iterator we build owns all data
        // and is 'static.
        let reader = match self.reader.take() {
            Some(r) => r,
            None => {
                // Already consumed; return an empty stream.
                return Box::pin(stream::iter(Vec::<Result<Command, Error>>::new()));
            }
        };

        let iter = reader.into_deserialize::<CsvRow>().map(|row| match row {
            Ok(row) => Command::try_from(row),
            Err(e) => Err(Error::Ingestion(format!("CSV deserialization error: {}", e))),
        });

        Box::pin(stream::iter(iter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(op: &str) -> CsvRow {
        CsvRow {
            op: op.to_owned(),
            user: 1,
            job: Some(7),
            amount: Some("5".to_owned()),
            verified: None,
            first_three: None,
            subscription: None,
            micro: None,
            currency: None,
        }
    }

    #[test]
    fn rejects_unknown_ops() {
        let err = Command::try_from(row("settle")).unwrap_err();
        assert!(matches!(err, Error::Ingestion(_)));
    }

    #[test]
    fn ledger_ops_require_a_job_reference() {
        let mut reserve = row("reserve");
        reserve.job = None;
        assert!(Command::try_from(reserve).is_err());

        let mut credit = row("credit");
        credit.job = None;
        assert!(Command::try_from(credit).is_ok());
    }

    #[test]
    fn escrow_create_parses_money_and_defaults_currency() {
        let mut create = row("escrow_create");
        create.amount = Some("100.00".to_owned());
        match Command::try_from(create).unwrap().kind {
            CommandKind::EscrowCreate {
                amount, currency, ..
            } => {
                assert_eq!(amount, Money(10_000));
                assert_eq!(currency, "EUR");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn release_facts_default_to_false() {
        let mut release = row("escrow_release");
        release.amount = None;
        release.verified = Some(true);
        match Command::try_from(release).unwrap().kind {
            CommandKind::EscrowRelease { facts, .. } => {
                assert!(facts.worker_verified);
                assert!(!facts.micro_task);
                assert_eq!(facts.payment_amount, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
