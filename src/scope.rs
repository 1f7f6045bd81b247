//! Scope Resolver (C8): intersects a credential's allow-lists with a
//! requested group/email.
//!
//! Per the Design Notes' `ScopeFilter` redesign, this isolates the
//! query-building concern from business logic: a `ScopeFilter` value
//! exposes a plain predicate over `Mailbox` plus explicit
//! `check_group`/`check_email` assertions used by the admin-side
//! scope-update path.

use crate::error::{Error, Result};
use crate::model::{Credential, GroupId, Mailbox, MailboxId};

#[derive(Debug, Clone)]
pub struct ScopeFilter {
    allowed_group_ids: Option<Vec<GroupId>>,
    allowed_email_ids: Option<Vec<MailboxId>>,
}

impl ScopeFilter {
    #[must_use]
    pub fn from_credential(credential: &Credential) -> Self {
        Self {
            allowed_group_ids: credential.allowed_group_ids.clone(),
            allowed_email_ids: credential.allowed_email_ids.clone(),
        }
    }

    #[must_use]
    pub const fn unrestricted() -> Self {
        Self {
            allowed_group_ids: None,
            allowed_email_ids: None,
        }
    }

    /// Assert that an explicitly requested group id is within scope.
    ///
    /// # Errors
    ///
    /// Returns `Error::GroupForbidden` if `allowed_group_ids` is
    /// non-empty and does not contain `group_id`.
    pub fn check_group(&self, group_id: GroupId) -> Result<()> {
        if let Some(ids) = &self.allowed_group_ids {
            if !ids.is_empty() && !ids.contains(&group_id) {
                return Err(Error::GroupForbidden(group_id.to_string()));
            }
        }
        Ok(())
    }

    /// Assert that a mailbox id is within scope.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmailForbidden` if `allowed_email_ids` is
    /// non-empty and does not contain `mailbox_id`.
    pub fn check_email(&self, mailbox_id: MailboxId) -> Result<()> {
        if let Some(ids) = &self.allowed_email_ids {
            if !ids.is_empty() && !ids.contains(&mailbox_id) {
                return Err(Error::EmailForbidden(mailbox_id.to_string()));
            }
        }
        Ok(())
    }

    /// A predicate applying both allow-lists to a mailbox listing.
    ///
    /// Unlike [`check_group`](Self::check_group), this is used when no
    /// single group was explicitly requested: mailboxes outside the
    /// allow-list are simply filtered out rather than rejected.
    #[must_use]
    pub fn mailbox_predicate(&self) -> impl Fn(&Mailbox) -> bool + '_ {
        move |mailbox: &Mailbox| {
            if let Some(ids) = &self.allowed_group_ids {
                if !ids.is_empty() {
                    match mailbox.group_id {
                        Some(gid) if ids.contains(&gid) => {}
                        _ => return false,
                    }
                }
            }
            if let Some(ids) = &self.allowed_email_ids {
                if !ids.is_empty() && !ids.contains(&mailbox.id) {
                    return false;
                }
            }
            true
        }
    }
}
