use crate::account_actor::AccountActor;
use crate::account_handle::AccountHandle;
use crate::commands::AccountStatus;
use crate::deps::AccountDeps;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};

/// One actor per account id, created on first use.
pub struct AccountRegistry {
    accounts: Arc<RwLock<HashMap<String, AccountHandle>>>,
    deps: AccountDeps,
}

impl AccountRegistry {
    #[must_use]
    pub fn new(deps: AccountDeps) -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            deps,
        }
    }

    /// Returns the account's handle, spawning a stopped actor if there is
    /// none yet.
    pub async fn get_or_spawn(&self, account_id: &str) -> AccountHandle {
        if let Some(handle) = self.get_account(account_id).await {
            return handle;
        }

        let mut accounts = self.accounts.write().await;
        // Another caller may have spawned it while we waited for the lock.
        if let Some(handle) = accounts.get(account_id) {
            return handle.clone();
        }

        let (tx, rx) = mpsc::channel(32);
        let (status_tx, status_rx) = watch::channel(AccountStatus::new(account_id));
        let handle = AccountHandle::new(tx, status_rx);

        let actor = AccountActor::new(account_id.to_string(), self.deps.clone(), rx, status_tx);
        let account_id_for_task = account_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = actor.run().await {
                tracing::error!("Account {} error: {}", account_id_for_task, e);
            }
        });

        tracing::info!("Spawned actor for account {}", account_id);
        accounts.insert(account_id.to_string(), handle.clone());
        handle
    }

    /// Gets a handle to the account with the given ID.
    #[must_use]
    pub async fn get_account(&self, account_id: &str) -> Option<AccountHandle> {
        self.accounts.read().await.get(account_id).cloned()
    }

    /// Removes and shuts down the account with the given ID.
    ///
    /// # Errors
    /// Returns an error if the shutdown command cannot be delivered.
    pub async fn remove_account(&self, account_id: &str) -> Result<()> {
        let value = self.accounts.write().await.remove(account_id);
        if let Some(handle) = value {
            handle.shutdown().await?;
        }
        Ok(())
    }

    /// Lists all registered account IDs, sorted.
    #[must_use]
    pub async fn list_accounts(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.accounts.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Latest published status of every account.
    #[must_use]
    pub async fn statuses(&self) -> Vec<AccountStatus> {
        let mut statuses: Vec<AccountStatus> = self
            .accounts
            .read()
            .await
            .values()
            .map(AccountHandle::latest_status)
            .collect();
        statuses.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        statuses
    }

    /// Shuts down all accounts in the registry.
    ///
    /// # Errors
    /// Returns an error if any account shutdown fails.
    pub async fn shutdown_all(&self) -> Result<()> {
        let handles: Vec<_> = self.accounts.read().await.values().cloned().collect();
        for handle in handles {
            handle.shutdown().await?;
        }
        Ok(())
    }
}
