//! Pool Allocator (C9): exactly-once assignment of an unused mailbox
//! to a credential.
//!
//! `PoolAllocator` owns the retry-3-times-then-`ConcurrencyLimit`
//! policy and the Secret Box decrypt-on-return step; `trait PoolRepo`
//! is the persistence boundary (a real relational driver is an
//! external collaborator per `spec.md` §1). `MemPoolRepo` — the
//! crate's only shipped implementation — keys assignments the same
//! way the real schema does: a `HashSet<(CredentialId, MailboxId)>`
//! behind a mutex, where inserting a duplicate key fails exactly like
//! a unique-constraint violation would.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::model::{CredentialId, GroupId, Mailbox, MailboxGroup, MailboxId, MailboxStatus};
use crate::scope::ScopeFilter;
use crate::secret_box::SecretBox;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub total: u64,
    pub used: u64,
    pub remaining: u64,
}

/// Diff produced by [`PoolRepo::update_pool`]: mailbox ids added to and
/// removed from a credential's assignment set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolDiff {
    pub added: Vec<MailboxId>,
    pub removed: Vec<MailboxId>,
}

#[async_trait]
pub trait PoolRepo: Send + Sync {
    /// Resolve a group name to its id.
    ///
    /// # Errors
    ///
    /// Returns `Error::GroupNotFound` on miss.
    async fn find_group_id_by_name(&self, name: &str) -> Result<GroupId>;

    /// The lowest-id mailbox satisfying: `status = Active`, no
    /// existing assignment for `credential_id`, and passing `scope`'s
    /// predicate (and `group_id` if given).
    async fn candidate_mailbox(
        &self,
        credential_id: CredentialId,
        scope: &ScopeFilter,
        group_id: Option<GroupId>,
    ) -> Result<Option<Mailbox>>;

    /// Insert a `PoolAssignment(credential_id, mailbox_id)`.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyUsed` if the pair is already assigned.
    async fn mark_used(&self, credential_id: CredentialId, mailbox_id: MailboxId) -> Result<()>;

    /// Remove assignments for `credential_id` restricted to `scope`
    /// and `group_id`. Returns the number removed.
    async fn reset(
        &self,
        credential_id: CredentialId,
        scope: &ScopeFilter,
        group_id: Option<GroupId>,
    ) -> Result<u64>;

    /// Pool statistics for `credential_id` restricted to `scope` and
    /// `group_id`.
    async fn stats(
        &self,
        credential_id: CredentialId,
        scope: &ScopeFilter,
        group_id: Option<GroupId>,
    ) -> Result<PoolStats>;

    /// Replace the assignment set for `credential_id` with
    /// `desired_mailbox_ids`, computing `(add, remove)` as one
    /// operation. All supplied ids must already have been checked
    /// against scope by the caller.
    async fn update_pool(
        &self,
        credential_id: CredentialId,
        desired_mailbox_ids: &[MailboxId],
    ) -> Result<PoolDiff>;
}

pub struct PoolAllocator {
    repo: Arc<dyn PoolRepo>,
    secret_box: Arc<SecretBox>,
}

impl PoolAllocator {
    #[must_use]
    pub const fn new(repo: Arc<dyn PoolRepo>, secret_box: Arc<SecretBox>) -> Self {
        Self { repo, secret_box }
    }

    /// Allocate an unused mailbox to `credential_id`, retrying up to 3
    /// times on lost allocation races before giving up.
    ///
    /// # Errors
    ///
    /// - `Error::GroupNotFound` if `group_name` doesn't resolve.
    /// - `Error::GroupForbidden` if the resolved group is outside
    ///   `scope`.
    /// - `Error::NoUnusedEmail` if no candidate mailbox exists.
    /// - `Error::ConcurrencyLimit` if all 3 attempts lose the race.
    /// - `Error::CryptoInvalid` if the stored refresh token cannot be
    ///   decrypted.
    pub async fn allocate_and_mark(
        &self,
        credential_id: CredentialId,
        group_name: Option<&str>,
        scope: &ScopeFilter,
        cancel: &CancellationToken,
    ) -> Result<Mailbox> {
        let group_id = match group_name {
            Some(name) => Some(self.repo.find_group_id_by_name(name).await?),
            None => None,
        };
        if let Some(gid) = group_id {
            scope.check_group(gid)?;
        }

        for _attempt in 0..3 {
            if cancel.is_cancelled() {
                return Err(Error::Internal("request cancelled".to_string()));
            }

            let Some(mut mailbox) = self
                .repo
                .candidate_mailbox(credential_id, scope, group_id)
                .await?
            else {
                return Err(Error::NoUnusedEmail);
            };

            match self.repo.mark_used(credential_id, mailbox.id).await {
                Ok(()) => {
                    mailbox.refresh_token_cipher =
                        self.secret_box.decrypt_str(&mailbox.refresh_token_cipher)?;
                    return Ok(mailbox);
                }
                Err(Error::AlreadyUsed) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(Error::ConcurrencyLimit)
    }

    /// # Errors
    ///
    /// As [`PoolRepo::reset`].
    pub async fn reset(
        &self,
        credential_id: CredentialId,
        group_name: Option<&str>,
        scope: &ScopeFilter,
    ) -> Result<u64> {
        let group_id = match group_name {
            Some(name) => Some(self.repo.find_group_id_by_name(name).await?),
            None => None,
        };
        self.repo.reset(credential_id, scope, group_id).await
    }

    /// # Errors
    ///
    /// As [`PoolRepo::stats`].
    pub async fn stats(
        &self,
        credential_id: CredentialId,
        group_name: Option<&str>,
        scope: &ScopeFilter,
    ) -> Result<PoolStats> {
        let group_id = match group_name {
            Some(name) => Some(self.repo.find_group_id_by_name(name).await?),
            None => None,
        };
        self.repo.stats(credential_id, scope, group_id).await
    }

    /// # Errors
    ///
    /// `Error::EmailForbidden` if any id in `desired_mailbox_ids` is
    /// outside `scope`; otherwise as [`PoolRepo::update_pool`].
    pub async fn update_pool(
        &self,
        credential_id: CredentialId,
        desired_mailbox_ids: &[MailboxId],
        scope: &ScopeFilter,
    ) -> Result<PoolDiff> {
        for &id in desired_mailbox_ids {
            scope.check_email(id)?;
        }
        self.repo.update_pool(credential_id, desired_mailbox_ids).await
    }
}

/// In-memory reference `PoolRepo`. The only implementation this crate
/// ships; what the test suite exercises the exactly-once property
/// against.
#[derive(Default)]
pub struct MemPoolRepo {
    mailboxes: Mutex<HashMap<MailboxId, Mailbox>>,
    groups: Mutex<HashMap<GroupId, MailboxGroup>>,
    assignments: Mutex<HashSet<(CredentialId, MailboxId)>>,
}

impl MemPoolRepo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_mailbox(&self, mailbox: Mailbox) {
        self.mailboxes.lock().insert(mailbox.id, mailbox);
    }

    pub fn seed_group(&self, group: MailboxGroup) {
        self.groups.lock().insert(group.id, group);
    }

    fn eligible_ids(
        &self,
        credential_id: CredentialId,
        scope: &ScopeFilter,
        group_id: Option<GroupId>,
    ) -> Vec<MailboxId> {
        let mailboxes = self.mailboxes.lock();
        let assignments = self.assignments.lock();
        let predicate = scope.mailbox_predicate();

        let mut ids: Vec<MailboxId> = mailboxes
            .values()
            .filter(|m| m.status == MailboxStatus::Active)
            .filter(|m| predicate(m))
            .filter(|m| group_id.is_none_or(|gid| m.group_id == Some(gid)))
            .filter(|m| !assignments.contains(&(credential_id, m.id)))
            .map(|m| m.id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl PoolRepo for MemPoolRepo {
    async fn find_group_id_by_name(&self, name: &str) -> Result<GroupId> {
        self.groups
            .lock()
            .values()
            .find(|g| g.name == name)
            .map(|g| g.id)
            .ok_or_else(|| Error::GroupNotFound(name.to_string()))
    }

    async fn candidate_mailbox(
        &self,
        credential_id: CredentialId,
        scope: &ScopeFilter,
        group_id: Option<GroupId>,
    ) -> Result<Option<Mailbox>> {
        let ids = self.eligible_ids(credential_id, scope, group_id);
        let Some(&first) = ids.first() else {
            return Ok(None);
        };
        Ok(self.mailboxes.lock().get(&first).cloned())
    }

    async fn mark_used(&self, credential_id: CredentialId, mailbox_id: MailboxId) -> Result<()> {
        let mut assignments = self.assignments.lock();
        if !assignments.insert((credential_id, mailbox_id)) {
            return Err(Error::AlreadyUsed);
        }
        Ok(())
    }

    async fn reset(
        &self,
        credential_id: CredentialId,
        scope: &ScopeFilter,
        group_id: Option<GroupId>,
    ) -> Result<u64> {
        let mailboxes = self.mailboxes.lock();
        let predicate = scope.mailbox_predicate();
        let in_scope: HashSet<MailboxId> = mailboxes
            .values()
            .filter(|m| predicate(m))
            .filter(|m| group_id.is_none_or(|gid| m.group_id == Some(gid)))
            .map(|m| m.id)
            .collect();
        drop(mailboxes);

        let mut assignments = self.assignments.lock();
        let before = assignments.len();
        assignments.retain(|&(cred, mailbox)| {
            !(cred == credential_id && in_scope.contains(&mailbox))
        });
        Ok((before - assignments.len()) as u64)
    }

    async fn stats(
        &self,
        credential_id: CredentialId,
        scope: &ScopeFilter,
        group_id: Option<GroupId>,
    ) -> Result<PoolStats> {
        let mailboxes = self.mailboxes.lock();
        let predicate = scope.mailbox_predicate();
        let in_scope: Vec<MailboxId> = mailboxes
            .values()
            .filter(|m| predicate(m))
            .filter(|m| group_id.is_none_or(|gid| m.group_id == Some(gid)))
            .map(|m| m.id)
            .collect();
        let total = in_scope.len() as u64;
        drop(mailboxes);

        let assignments = self.assignments.lock();
        let used = in_scope
            .iter()
            .filter(|id| assignments.contains(&(credential_id, **id)))
            .count() as u64;

        Ok(PoolStats {
            total,
            used,
            remaining: total.saturating_sub(used),
        })
    }

    async fn update_pool(
        &self,
        credential_id: CredentialId,
        desired_mailbox_ids: &[MailboxId],
    ) -> Result<PoolDiff> {
        let desired: HashSet<MailboxId> = desired_mailbox_ids.iter().copied().collect();
        let mut assignments = self.assignments.lock();

        let current: HashSet<MailboxId> = assignments
            .iter()
            .filter(|&&(cred, _)| cred == credential_id)
            .map(|&(_, mailbox)| mailbox)
            .collect();

        let added: Vec<MailboxId> = desired.difference(&current).copied().collect();
        let removed: Vec<MailboxId> = current.difference(&desired).copied().collect();

        for &id in &removed {
            assignments.remove(&(credential_id, id));
        }
        for &id in &added {
            assignments.insert((credential_id, id));
        }

        Ok(PoolDiff { added, removed })
    }
}
