use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, warn};

use crate::domain::{
    Command, CommandKind, CommandStream, CreditSource, DeadLetterQueue, Error, JobGate, JobId,
    SettlementStore,
};
use crate::escrow::EscrowService;
use crate::flow::ApplicationFlow;
use crate::ledger::CreditLedger;

/// Replays a settlement command stream through the ledger, the escrow
/// lifecycle, and the application flow. A rejected command goes to the
/// dead-letter queue; processing continues with the next one.
pub struct Engine<I, S, D, G>
where
    I: CommandStream,
    S: SettlementStore,
    D: DeadLetterQueue,
    G: JobGate,
{
    ingestion: I,
    store: Arc<S>,
    ledger: CreditLedger<S>,
    escrow: EscrowService<S>,
    flow: ApplicationFlow<S, G>,
    dlq: D,
}

impl<I, S, D, G> Engine<I, S, D, G>
where
    I: CommandStream,
    S: SettlementStore,
    D: DeadLetterQueue,
    G: JobGate,
{
    pub fn new(ingestion: I, store: Arc<S>, gate: G, dlq: D) -> Self {
        let ledger = CreditLedger::new(Arc::clone(&store));
        let escrow = EscrowService::new(Arc::clone(&store));
        let flow = ApplicationFlow::new(Arc::clone(&store), ledger.clone(), gate);
        Self {
            ingestion,
            store,
            ledger,
            escrow,
            flow,
            dlq,
        }
    }

    pub async fn process(&mut self) -> Result<(), Error> {
        let mut commands = self.ingestion.stream();

        while let Some(command) = commands.next().await {
            match command {
                Ok(command) => {
                    debug!(%command, "applying command");
                    // ledger and escrow calls may sleep in retry backoff;
                    // keep them off the async workers
                    let outcome = tokio::task::block_in_place(|| self.apply_command(&command));
                    if let Err(e) = outcome {
                        self.dlq.report(&e);
                    }
                }
                Err(e) => self.dlq.report(&e),
            }
        }

        Ok(())
    }

    fn apply_command(&self, command: &Command) -> Result<(), Error> {
        let user = command.user_id;
        match &command.kind {
            CommandKind::Credit { amount } => self
                .ledger
                .credit(user, *amount, CreditSource::Purchase)
                .map(drop),
            CommandKind::Grant { amount } => self
                .ledger
                .credit(user, *amount, CreditSource::FreeGrant)
                .map(drop),
            CommandKind::Reserve { job_id, amount } => {
                self.ledger.reserve(user, *amount, *job_id).map(drop)
            }
            CommandKind::Release { job_id, amount } => {
                self.ledger.release(user, *amount, *job_id).map(drop)
            }
            CommandKind::Consume { job_id, amount } => {
                self.ledger.consume(user, *amount, *job_id).map(drop)
            }
            CommandKind::Refund { job_id, amount } => {
                self.ledger.refund(user, *amount, *job_id).map(drop)
            }
            CommandKind::Apply { job_id, credits } => {
                self.flow.apply(*job_id, user, *credits).map(drop)
            }
            CommandKind::Accept { job_id } => self.flow.accept(*job_id, user).map(drop),
            CommandKind::Reject { job_id } => self.flow.reject(*job_id, user).map(drop),
            CommandKind::Withdraw { job_id } => self.flow.withdraw(*job_id, user).map(drop),
            CommandKind::EscrowCreate {
                job_id,
                amount,
                currency,
            } => self.escrow.create(*job_id, user, *amount, currency).map(drop),
            CommandKind::EscrowFund { job_id } => self.escrow.fund(*job_id).map(drop),
            CommandKind::EscrowRelease { job_id, facts } => {
                self.escrow.release(*job_id, *facts).map(drop)
            }
            CommandKind::EscrowCancel { job_id } => self.cancel_job(*job_id),
        }
    }

    /// Cancelling an escrow also hands back every reservation still pending
    /// against the job. The sweep runs even though the escrow transition
    /// already succeeded; its failures are logged inside the flow.
    fn cancel_job(&self, job_id: JobId) -> Result<(), Error> {
        let cancelled = self.escrow.cancel(job_id);
        match cancelled {
            Ok(_) => {
                self.flow.cancel_pending(job_id);
                Ok(())
            }
            Err(err) => {
                warn!(job_id, %err, "escrow cancellation rejected");
                Err(err)
            }
        }
    }

    pub fn flush(&mut self) {
        self.store.flush();
    }
}
