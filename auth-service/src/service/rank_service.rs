//! # Rank Authorizer (C11)
//!
//! Decides whether `updater` may add or remove a given role tag from
//! `target`, per the tag-shape policy table below, then
//! applies a whole `add`/`remove` edit set atomically against
//! `userroles`/`userroleinvitations`.
//!
//! `admin` grants never land directly: `UpdateRank` translates an
//! `admin` add into a `RoleInvitation` that the invitee must separately
//! accept via `AcceptRoleInvitation`. Every other tag is an immediate
//! grant/revoke.

use std::collections::BTreeSet;

use chrono::Utc;
use shared::{errors::ApiError, validation::validators::valid_role_tag};

use crate::domain::RoleInvitation;
use crate::repository::RoleRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Add,
    Remove,
}

#[derive(Clone)]
pub struct RankService {
    role_repo: RoleRepository,
    invitation_time_seconds: i64,
}

impl RankService {
    pub fn new(role_repo: RoleRepository, invitation_time_seconds: i64) -> Self {
        Self {
            role_repo,
            invitation_time_seconds,
        }
    }

    /// `canUpdateRank`: the forbid/allow decision for a single tag.
    /// Returns `Err(BadRequest)` for a tag that doesn't parse per the
    /// role-tag grammar.
    async fn can_edit(&self, updater: &str, target: &str, tag: &str, edit: Edit) -> Result<bool, ApiError> {
        if valid_role_tag(tag).is_err() {
            return Err(ApiError::bad_request(format!("invalid role tag: {tag}")));
        }

        match tag {
            "admin" => Ok(updater != target && self.role_repo.has_role(updater, "admin").await?),
            "system" => Ok(false),
            "user" => Ok(self.role_repo.has_role(updater, "admin").await?),
            _ => {
                let (prefix, group) = tag.split_once('.').expect("valid_role_tag guarantees a prefix");
                let admin = self.role_repo.has_role(updater, "admin").await?;
                match prefix {
                    "mod" => {
                        if updater == target && !admin {
                            return Ok(false);
                        }
                        let mod_group = self.role_repo.has_role(updater, tag).await?;
                        Ok(admin || mod_group)
                    }
                    "ban" => {
                        let mod_group = self.role_repo.has_role(updater, &format!("mod.{group}")).await?;
                        Ok(admin || mod_group)
                    }
                    "usr" => {
                        let mod_group = self.role_repo.has_role(updater, &format!("mod.{group}")).await?;
                        match edit {
                            Edit::Add => Ok(admin || mod_group),
                            Edit::Remove => Ok(admin || mod_group || target == updater),
                        }
                    }
                    _ => Err(ApiError::bad_request(format!("invalid role tag: {tag}"))),
                }
            }
        }
    }

    /// Applies an `add`/`remove` role edit from `updater` against
    /// `target`. Tags present in both sets are dropped from `add`
    /// before policy checks run. Every remaining tag must pass
    /// [`Self::can_edit`] or the whole edit is rejected with `Forbidden`
    /// (or `BadRequest` for an unrecognized tag) before any mutation
    /// happens.
    pub async fn update_rank(
        &self,
        updater: &str,
        target: &str,
        mut add: BTreeSet<String>,
        remove: BTreeSet<String>,
    ) -> Result<(), ApiError> {
        for tag in &remove {
            add.remove(tag);
        }

        for tag in &add {
            if !self.can_edit(updater, target, tag, Edit::Add).await? {
                return Err(ApiError::forbidden(format!("not permitted to grant {tag}")));
            }
        }
        for tag in &remove {
            if !self.can_edit(updater, target, tag, Edit::Remove).await? {
                return Err(ApiError::forbidden(format!("not permitted to revoke {tag}")));
            }
        }

        // Drop tags the target already holds; nothing to do for those.
        let mut to_add = Vec::with_capacity(add.len());
        for tag in add {
            if !self.role_repo.has_role(target, &tag).await? {
                to_add.push(tag);
            }
        }

        let now = Utc::now().timestamp();
        for tag in &to_add {
            // Clear any stale invitation before re-deciding the tag.
            self.role_repo.delete_invitation(target, tag).await?;
            if tag == "admin" {
                let invitation = RoleInvitation {
                    userid: target.to_string(),
                    role: tag.clone(),
                    invited_by: updater.to_string(),
                    creation_time: now,
                };
                self.role_repo.invite(&invitation).await?;
            } else {
                self.role_repo.grant(target, tag).await?;
            }
        }
        for tag in &remove {
            self.role_repo.revoke(target, tag).await?;
            self.role_repo.delete_invitation(target, tag).await?;
        }

        Ok(())
    }

    /// Accepts a still-live invitation, converting it into a grant.
    pub async fn accept_invitation(&self, userid: &str, role: &str) -> Result<(), ApiError> {
        let invitation = self
            .role_repo
            .get_invitation(userid, role)
            .await?
            .ok_or_else(|| ApiError::not_found("invitation"))?;

        let now = Utc::now().timestamp();
        if invitation.is_expired(now, self.invitation_time_seconds) {
            self.role_repo.delete_invitation(userid, role).await?;
            return Err(ApiError::not_found("invitation"));
        }

        self.role_repo.delete_invitation(userid, role).await?;
        self.role_repo.grant(userid, role).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    // `can_edit`/`update_rank` hit the database for every `has_role`
    // lookup, so the policy table itself is exercised indirectly through
    // the handler-level integration tests. These unit tests cover the
    // pieces that don't need a pool: tag-shape rejection and the
    // add/remove overlap rule.

    fn unconnected_repo() -> RoleRepository {
        // A pool that never connects is fine here: these tests never
        // execute a query, only the pre-query validation path.
        let pool = PgPoolOptions::new().connect_lazy("postgres://localhost/unused").unwrap();
        RoleRepository::new(pool)
    }

    #[tokio::test]
    async fn overlapping_add_and_remove_drops_from_add() {
        let service = RankService::new(unconnected_repo(), 172_800);
        let mut add: BTreeSet<String> = ["mod.forums".to_string()].into_iter().collect();
        let remove: BTreeSet<String> = ["mod.forums".to_string()].into_iter().collect();
        for tag in &remove {
            add.remove(tag);
        }
        assert!(add.is_empty());
    }

    #[tokio::test]
    async fn system_tag_is_never_editable() {
        let service = RankService::new(unconnected_repo(), 172_800);
        assert!(!service.can_edit("admin1", "user1", "system", Edit::Add).await.unwrap());
        assert!(!service.can_edit("admin1", "user1", "system", Edit::Remove).await.unwrap());
    }

    #[tokio::test]
    async fn unrecognized_tag_is_bad_request() {
        let service = RankService::new(unconnected_repo(), 172_800);
        assert!(service.can_edit("u1", "u2", "owner.site", Edit::Add).await.is_err());
    }
}
