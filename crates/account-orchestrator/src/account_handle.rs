use crate::commands::{AccountCommand, AccountStatus, IngestEvent, StartOptions};
use crate::tick::TickReport;
use anyhow::Result;
use tokio::sync::{mpsc, oneshot, watch};

#[derive(Clone)]
pub struct AccountHandle {
    tx: mpsc::Sender<AccountCommand>,
    status_rx: watch::Receiver<AccountStatus>,
}

impl AccountHandle {
    /// Creates a new account handle from the actor's command sender and
    /// status channel.
    #[must_use]
    pub const fn new(
        tx: mpsc::Sender<AccountCommand>,
        status_rx: watch::Receiver<AccountStatus>,
    ) -> Self {
        Self { tx, status_rx }
    }

    /// Loads credentials and strategies and, unless disabled, opens the feeds.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent to the account actor.
    pub async fn start(&self, options: StartOptions) -> Result<()> {
        self.tx.send(AccountCommand::Start(options)).await?;
        Ok(())
    }

    /// Closes the feeds and drops per-session state.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent to the account actor.
    pub async fn stop(&self) -> Result<()> {
        self.tx.send(AccountCommand::Stop).await?;
        Ok(())
    }

    /// Reloads strategies. A symbol also makes sure its candle channel is
    /// subscribed.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent to the account actor.
    pub async fn refresh(&self, symbol: Option<String>) -> Result<()> {
        self.tx.send(AccountCommand::Refresh { symbol }).await?;
        Ok(())
    }

    /// Runs one poll-driven evaluation pass and waits for its report.
    ///
    /// # Errors
    /// Returns an error if the actor is gone, or if credentials or strategies
    /// cannot be loaded.
    pub async fn tick(&self, only_symbols: Option<Vec<String>>) -> Result<TickReport> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AccountCommand::Tick {
                only_symbols,
                reply,
            })
            .await?;
        rx.await?
    }

    /// Feeds a forwarded position or candle-direction event to the account.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent to the account actor.
    pub async fn ingest(&self, event: IngestEvent) -> Result<()> {
        self.tx.send(AccountCommand::Ingest(event)).await?;
        Ok(())
    }

    /// Gets the current status of the account.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent or the response cannot be received.
    pub async fn get_status(&self) -> Result<AccountStatus> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(AccountCommand::GetStatus(tx)).await?;
        let status = rx.await?;
        Ok(status)
    }

    /// Last status published by the actor, without a round trip.
    #[must_use]
    pub fn latest_status(&self) -> AccountStatus {
        self.status_rx.borrow().clone()
    }

    /// Waits until no dispatched action is still in flight.
    ///
    /// # Errors
    /// Returns an error if the actor exits first.
    pub async fn wait_until_idle(&self) -> Result<()> {
        let mut rx = self.status_rx.clone();
        loop {
            if rx.borrow_and_update().dispatch.in_flight == 0 {
                return Ok(());
            }
            rx.changed().await?;
        }
    }

    /// Shuts down the account actor.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent to the account actor.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(AccountCommand::Shutdown).await?;
        Ok(())
    }
}
