use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::AppError;

/// Rejoin cooldown after leaving a group.
pub const REJOIN_COOLDOWN_HOURS: i64 = 48;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipRecord {
    pub user_id: Uuid,
    pub left_at: DateTime<Utc>,
}

/// Group aggregate. All membership mutation runs through the methods below,
/// which are pure with respect to I/O; persistence wraps them in a
/// compare-and-swap on `version` so concurrent mutation of one group is
/// linearized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub is_private: bool,
    pub max_members: Option<i32>,
    pub members: HashSet<Uuid>,
    pub banned_users: HashSet<Uuid>,
    pub join_requests: HashSet<Uuid>,
    pub membership_history: Vec<MembershipRecord>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

/// What `join` did, so callers can shape the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    Requested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left,
    /// The owner was the sole member; the aggregate must be deleted.
    DeleteGroup,
}

impl Group {
    pub fn create(
        name: String,
        owner_id: Uuid,
        initial_members: &[Uuid],
        is_private: bool,
        max_members: Option<i32>,
    ) -> Result<Self, AppError> {
        let mut members: HashSet<Uuid> = initial_members.iter().copied().collect();
        members.insert(owner_id);

        if members.len() < 2 {
            return Err(AppError::InvalidMembership(
                "Group requires at least 2 members including the owner".into(),
            ));
        }
        if let Some(max) = max_members {
            if max < 2 {
                return Err(AppError::InvalidMembership(
                    "Maximum members cannot be less than 2".into(),
                ));
            }
            if members.len() as i32 > max {
                return Err(AppError::InvalidMembership(
                    "Initial members exceed maximum members limit".into(),
                ));
            }
        }

        Ok(Self {
            id: Uuid::new_v4(),
            name,
            owner_id,
            is_private,
            max_members,
            members,
            banned_users: HashSet::new(),
            join_requests: HashSet::new(),
            membership_history: Vec::new(),
            version: 0,
            created_at: Utc::now(),
        })
    }

    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.members.contains(&user_id)
    }

    fn at_capacity(&self) -> bool {
        match self.max_members {
            Some(max) => self.members.len() as i32 >= max,
            None => false,
        }
    }

    /// The most recent history entry for the user governs the cooldown.
    fn cooldown_active(&self, user_id: Uuid, now: DateTime<Utc>) -> bool {
        self.membership_history
            .iter()
            .rev()
            .find(|r| r.user_id == user_id)
            .map(|r| now - r.left_at < Duration::hours(REJOIN_COOLDOWN_HOURS))
            .unwrap_or(false)
    }

    pub fn join(&mut self, user_id: Uuid, now: DateTime<Utc>) -> Result<JoinOutcome, AppError> {
        if self.banned_users.contains(&user_id) {
            return Err(AppError::Banned);
        }
        if self.at_capacity() {
            return Err(AppError::CapacityExceeded);
        }
        if self.cooldown_active(user_id, now) {
            return Err(AppError::CooldownActive);
        }

        if self.is_private {
            if !self.join_requests.insert(user_id) {
                return Err(AppError::AlreadyRequested);
            }
            return Ok(JoinOutcome::Requested);
        }

        // Idempotent for existing members.
        self.members.insert(user_id);
        Ok(JoinOutcome::Joined)
    }

    pub fn approve_join(&mut self, caller: Uuid, user_id: Uuid) -> Result<(), AppError> {
        if caller != self.owner_id {
            return Err(AppError::NotAuthorized);
        }
        if self.at_capacity() {
            return Err(AppError::CapacityExceeded);
        }
        if !self.join_requests.remove(&user_id) {
            return Err(AppError::NoSuchRequest);
        }
        self.members.insert(user_id);
        Ok(())
    }

    pub fn leave(&mut self, user_id: Uuid, now: DateTime<Utc>) -> Result<LeaveOutcome, AppError> {
        if user_id == self.owner_id {
            if self.members.len() > 1 {
                return Err(AppError::OwnerMustTransfer);
            }
            return Ok(LeaveOutcome::DeleteGroup);
        }

        // Idempotent: leaving a group one is not in succeeds without a
        // history entry, so it cannot be used to reset the cooldown clock.
        if self.members.remove(&user_id) {
            self.membership_history.push(MembershipRecord {
                user_id,
                left_at: now,
            });
        }
        Ok(LeaveOutcome::Left)
    }

    pub fn ban(&mut self, caller: Uuid, user_id: Uuid) -> Result<(), AppError> {
        if caller != self.owner_id {
            return Err(AppError::NotAuthorized);
        }
        if user_id == self.owner_id {
            return Err(AppError::CannotBanOwner);
        }
        self.members.remove(&user_id);
        self.banned_users.insert(user_id);
        Ok(())
    }

    pub fn transfer_ownership(&mut self, caller: Uuid, new_owner: Uuid) -> Result<(), AppError> {
        if caller != self.owner_id {
            return Err(AppError::NotAuthorized);
        }
        if !self.members.contains(&new_owner) {
            return Err(AppError::NewOwnerNotMember);
        }
        self.owner_id = new_owner;
        Ok(())
    }

    /// Structural invariants that must hold in every reachable state.
    pub fn check_invariants(&self) -> Result<(), String> {
        if !self.members.contains(&self.owner_id) {
            return Err("owner is not a member".into());
        }
        if self.members.intersection(&self.banned_users).next().is_some() {
            return Err("banned user is a member".into());
        }
        if let Some(max) = self.max_members {
            if max < 2 {
                return Err("max_members below 2".into());
            }
            if self.members.len() as i32 > max {
                return Err("member count exceeds max_members".into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    fn public_group(owner: Uuid, others: &[Uuid], max: Option<i32>) -> Group {
        Group::create("test".into(), owner, others, false, max).unwrap()
    }

    #[test]
    fn create_requires_two_distinct_members() {
        let owner = Uuid::new_v4();
        let err = Group::create("solo".into(), owner, &[owner], false, None).unwrap_err();
        assert!(matches!(err, AppError::InvalidMembership(_)));

        let member = Uuid::new_v4();
        let group = Group::create("ok".into(), owner, &[member], false, None).unwrap();
        assert_eq!(group.members.len(), 2);
        group.check_invariants().unwrap();
    }

    #[test]
    fn create_rejects_undersized_capacity() {
        let ids = ids(3);
        let err = Group::create("tiny".into(), ids[0], &[ids[1]], false, Some(1)).unwrap_err();
        assert!(matches!(err, AppError::InvalidMembership(_)));

        let err =
            Group::create("full".into(), ids[0], &[ids[1], ids[2]], false, Some(2)).unwrap_err();
        assert!(matches!(err, AppError::InvalidMembership(_)));
    }

    #[test]
    fn public_join_is_idempotent() {
        let ids = ids(3);
        let mut group = public_group(ids[0], &[ids[1]], None);
        let now = Utc::now();

        assert_eq!(group.join(ids[2], now).unwrap(), JoinOutcome::Joined);
        assert_eq!(group.join(ids[2], now).unwrap(), JoinOutcome::Joined);
        assert_eq!(group.members.len(), 3);
        group.check_invariants().unwrap();
    }

    #[test]
    fn join_rejected_at_capacity() {
        let ids = ids(3);
        let mut group = public_group(ids[0], &[ids[1]], Some(2));
        let err = group.join(ids[2], Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::CapacityExceeded));
        group.check_invariants().unwrap();
    }

    #[test]
    fn join_rejected_when_banned() {
        let ids = ids(3);
        let mut group = public_group(ids[0], &[ids[1]], None);
        group.ban(ids[0], ids[2]).unwrap();
        assert!(matches!(
            group.join(ids[2], Utc::now()).unwrap_err(),
            AppError::Banned
        ));
    }

    #[test]
    fn cooldown_blocks_rejoin_until_48h() {
        let ids = ids(3);
        let mut group = public_group(ids[0], &[ids[1], ids[2]], None);
        let left_at = Utc::now();
        group.leave(ids[2], left_at).unwrap();

        assert!(matches!(
            group.join(ids[2], left_at).unwrap_err(),
            AppError::CooldownActive
        ));
        assert!(matches!(
            group
                .join(ids[2], left_at + Duration::hours(48) - Duration::seconds(1))
                .unwrap_err(),
            AppError::CooldownActive
        ));
        // Exactly 48h is allowed.
        assert_eq!(
            group
                .join(ids[2], left_at + Duration::hours(48))
                .unwrap(),
            JoinOutcome::Joined
        );
    }

    #[test]
    fn most_recent_history_entry_governs_cooldown() {
        let ids = ids(3);
        let mut group = public_group(ids[0], &[ids[1], ids[2]], None);
        let first_leave = Utc::now() - Duration::hours(100);

        group.leave(ids[2], first_leave).unwrap();
        group.join(ids[2], Utc::now()).unwrap();
        group.leave(ids[2], Utc::now()).unwrap();

        assert!(matches!(
            group.join(ids[2], Utc::now()).unwrap_err(),
            AppError::CooldownActive
        ));
    }

    #[test]
    fn private_join_goes_through_requests() {
        let ids = ids(3);
        let mut group = Group::create("priv".into(), ids[0], &[ids[1]], true, None).unwrap();
        let now = Utc::now();

        assert_eq!(group.join(ids[2], now).unwrap(), JoinOutcome::Requested);
        assert!(!group.is_member(ids[2]));
        assert!(matches!(
            group.join(ids[2], now).unwrap_err(),
            AppError::AlreadyRequested
        ));

        group.approve_join(ids[0], ids[2]).unwrap();
        assert!(group.is_member(ids[2]));
        assert!(group.join_requests.is_empty());
        group.check_invariants().unwrap();
    }

    #[test]
    fn approve_requires_owner_and_pending_request() {
        let ids = ids(4);
        let mut group = Group::create("priv".into(), ids[0], &[ids[1]], true, None).unwrap();
        group.join(ids[2], Utc::now()).unwrap();

        assert!(matches!(
            group.approve_join(ids[1], ids[2]).unwrap_err(),
            AppError::NotAuthorized
        ));
        assert!(matches!(
            group.approve_join(ids[0], ids[3]).unwrap_err(),
            AppError::NoSuchRequest
        ));
    }

    #[test]
    fn approve_respects_capacity() {
        let ids = ids(3);
        let mut group = Group::create("priv".into(), ids[0], &[ids[1]], true, Some(2)).unwrap();
        group.join_requests.insert(ids[2]);
        assert!(matches!(
            group.approve_join(ids[0], ids[2]).unwrap_err(),
            AppError::CapacityExceeded
        ));
        // Request stays pending for when capacity frees up.
        assert!(group.join_requests.contains(&ids[2]));
    }

    #[test]
    fn owner_must_transfer_before_leaving() {
        let ids = ids(2);
        let mut group = public_group(ids[0], &[ids[1]], None);
        let now = Utc::now();

        assert!(matches!(
            group.leave(ids[0], now).unwrap_err(),
            AppError::OwnerMustTransfer
        ));

        group.transfer_ownership(ids[0], ids[1]).unwrap();
        assert_eq!(group.leave(ids[0], now).unwrap(), LeaveOutcome::Left);
        assert!(!group.is_member(ids[0]));
        assert_eq!(group.owner_id, ids[1]);
        group.check_invariants().unwrap();
    }

    #[test]
    fn sole_owner_leaving_deletes_group() {
        let ids = ids(2);
        let mut group = public_group(ids[0], &[ids[1]], None);
        group.leave(ids[1], Utc::now()).unwrap();
        assert_eq!(
            group.leave(ids[0], Utc::now()).unwrap(),
            LeaveOutcome::DeleteGroup
        );
    }

    #[test]
    fn leave_by_non_member_adds_no_history() {
        let ids = ids(3);
        let mut group = public_group(ids[0], &[ids[1]], None);
        assert_eq!(group.leave(ids[2], Utc::now()).unwrap(), LeaveOutcome::Left);
        assert!(group.membership_history.is_empty());
    }

    #[test]
    fn ban_is_idempotent_and_removes_membership() {
        let ids = ids(3);
        let mut group = public_group(ids[0], &[ids[1], ids[2]], None);

        group.ban(ids[0], ids[2]).unwrap();
        group.ban(ids[0], ids[2]).unwrap();

        assert!(!group.is_member(ids[2]));
        assert_eq!(group.banned_users.len(), 1);
        group.check_invariants().unwrap();
    }

    #[test]
    fn ban_guards() {
        let ids = ids(3);
        let mut group = public_group(ids[0], &[ids[1]], None);
        assert!(matches!(
            group.ban(ids[1], ids[2]).unwrap_err(),
            AppError::NotAuthorized
        ));
        assert!(matches!(
            group.ban(ids[0], ids[0]).unwrap_err(),
            AppError::CannotBanOwner
        ));
    }

    #[test]
    fn transfer_requires_member_target() {
        let ids = ids(3);
        let mut group = public_group(ids[0], &[ids[1]], None);
        assert!(matches!(
            group.transfer_ownership(ids[0], ids[2]).unwrap_err(),
            AppError::NewOwnerNotMember
        ));
        assert!(matches!(
            group.transfer_ownership(ids[1], ids[1]).unwrap_err(),
            AppError::NotAuthorized
        ));
    }
}
