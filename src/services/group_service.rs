use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::group::{Group, JoinOutcome, LeaveOutcome};
use crate::store::GroupStore;

/// Bound on optimistic-concurrency retries. Contention past this on a single
/// group is pathological; the caller gets a retryable internal error.
const CAS_ATTEMPTS: usize = 5;

/// Orchestrates membership mutations: load → pure aggregate mutation →
/// compare-and-swap save, retried on conflict. This linearizes concurrent
/// writers per group without holding any in-process lock across I/O.
#[derive(Clone)]
pub struct GroupService {
    store: Arc<dyn GroupStore>,
}

impl GroupService {
    pub fn new(store: Arc<dyn GroupStore>) -> Self {
        Self { store }
    }

    pub async fn create_group(
        &self,
        owner: Uuid,
        name: String,
        initial_members: &[Uuid],
        is_private: bool,
        max_members: Option<i32>,
    ) -> AppResult<Group> {
        if initial_members.is_empty() {
            return Err(AppError::InvalidMembership(
                "Please provide at least one additional member for the group".into(),
            ));
        }
        let group = Group::create(name, owner, initial_members, is_private, max_members)?;
        self.store.insert(&group).await?;
        Ok(group)
    }

    pub async fn get_group(&self, group_id: Uuid) -> AppResult<Group> {
        self.store
            .find(group_id)
            .await?
            .ok_or(AppError::GroupNotFound)
    }

    pub async fn list_groups(&self, limit: i64, offset: i64) -> AppResult<Vec<Group>> {
        self.store.list(limit, offset).await
    }

    pub async fn groups_for_member(&self, user_id: Uuid) -> AppResult<Vec<Group>> {
        self.store.find_by_member(user_id).await
    }

    /// Membership gate shared by the realtime hub's join/send paths.
    pub async fn ensure_member(&self, group_id: Uuid, user_id: Uuid) -> AppResult<Group> {
        let group = self.get_group(group_id).await?;
        if !group.is_member(user_id) {
            return Err(AppError::NotAMember);
        }
        Ok(group)
    }

    pub async fn join(&self, user_id: Uuid, group_id: Uuid) -> AppResult<(Group, JoinOutcome)> {
        self.mutate(group_id, |g| g.join(user_id, Utc::now())).await
    }

    pub async fn approve_join(
        &self,
        caller: Uuid,
        group_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Group> {
        let (group, ()) = self
            .mutate(group_id, |g| g.approve_join(caller, user_id))
            .await?;
        Ok(group)
    }

    pub async fn leave(&self, user_id: Uuid, group_id: Uuid) -> AppResult<LeaveOutcome> {
        for _ in 0..CAS_ATTEMPTS {
            let mut group = self.get_group(group_id).await?;
            // Deletion is CAS-guarded like every other mutation: a join that
            // commits between the load and the delete bumps the version, the
            // delete misses, and the re-evaluated leave sees the new member.
            match group.leave(user_id, Utc::now())? {
                LeaveOutcome::DeleteGroup => {
                    if self.store.delete(&group).await? {
                        return Ok(LeaveOutcome::DeleteGroup);
                    }
                }
                LeaveOutcome::Left => {
                    if self.store.update(&group).await? {
                        return Ok(LeaveOutcome::Left);
                    }
                }
            }
        }
        tracing::error!(%group_id, "group update contention exhausted retries");
        Err(AppError::Internal)
    }

    pub async fn ban(&self, caller: Uuid, group_id: Uuid, user_id: Uuid) -> AppResult<Group> {
        let (group, ()) = self.mutate(group_id, |g| g.ban(caller, user_id)).await?;
        Ok(group)
    }

    pub async fn transfer_ownership(
        &self,
        caller: Uuid,
        group_id: Uuid,
        new_owner: Uuid,
    ) -> AppResult<Group> {
        let (group, ()) = self
            .mutate(group_id, |g| g.transfer_ownership(caller, new_owner))
            .await?;
        Ok(group)
    }

    async fn mutate<T>(
        &self,
        group_id: Uuid,
        mut op: impl FnMut(&mut Group) -> AppResult<T>,
    ) -> AppResult<(Group, T)> {
        for _ in 0..CAS_ATTEMPTS {
            let mut group = self.get_group(group_id).await?;
            let out = op(&mut group)?;
            if self.store.update(&group).await? {
                return Ok((group, out));
            }
        }
        tracing::error!(%group_id, "group update contention exhausted retries");
        Err(AppError::Internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryGroupStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn service() -> GroupService {
        GroupService::new(Arc::new(MemoryGroupStore::new()))
    }

    /// Delegating store that commits a join through the inner store right
    /// before the first delete, reproducing a join racing a sole-owner
    /// leave.
    struct JoinDuringDelete {
        inner: MemoryGroupStore,
        joiner: Uuid,
        fired: AtomicBool,
    }

    #[async_trait]
    impl GroupStore for JoinDuringDelete {
        async fn find(&self, id: Uuid) -> AppResult<Option<Group>> {
            self.inner.find(id).await
        }

        async fn find_by_member(&self, user_id: Uuid) -> AppResult<Vec<Group>> {
            self.inner.find_by_member(user_id).await
        }

        async fn list(&self, limit: i64, offset: i64) -> AppResult<Vec<Group>> {
            self.inner.list(limit, offset).await
        }

        async fn insert(&self, group: &Group) -> AppResult<()> {
            self.inner.insert(group).await
        }

        async fn update(&self, group: &Group) -> AppResult<bool> {
            self.inner.update(group).await
        }

        async fn delete(&self, group: &Group) -> AppResult<bool> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                let mut fresh = self.inner.find(group.id).await?.unwrap();
                fresh.join(self.joiner, Utc::now()).unwrap();
                assert!(self.inner.update(&fresh).await?);
            }
            self.inner.delete(group).await
        }
    }

    #[tokio::test]
    async fn delete_misses_when_a_join_committed_concurrently() {
        let inner = MemoryGroupStore::new();
        let (owner, member, joiner) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let svc = GroupService::new(Arc::new(MemoryGroupStore::clone(&inner)));
        let group = svc
            .create_group(owner, "g".into(), &[member], false, None)
            .await
            .unwrap();
        svc.leave(member, group.id).await.unwrap();

        let racing = GroupService::new(Arc::new(JoinDuringDelete {
            inner,
            joiner,
            fired: AtomicBool::new(false),
        }));

        // The interleaved join bumps the version, the conditional delete
        // misses, and the retried leave sees the new member.
        assert!(matches!(
            racing.leave(owner, group.id).await.unwrap_err(),
            AppError::OwnerMustTransfer
        ));

        let survivor = racing.get_group(group.id).await.unwrap();
        assert!(survivor.is_member(joiner));
        assert!(survivor.is_member(owner));
    }

    #[tokio::test]
    async fn create_then_join_round_trip() {
        let svc = service();
        let (owner, member, joiner) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let group = svc
            .create_group(owner, "g".into(), &[member], false, None)
            .await
            .unwrap();

        let (group, outcome) = svc.join(joiner, group.id).await.unwrap();
        assert_eq!(outcome, JoinOutcome::Joined);
        assert!(group.is_member(joiner));

        // Persisted state reflects the mutation.
        let reloaded = svc.get_group(group.id).await.unwrap();
        assert!(reloaded.is_member(joiner));
        assert_eq!(reloaded.version, 1);
    }

    #[tokio::test]
    async fn concurrent_joins_cannot_overshoot_capacity() {
        let svc = service();
        let (owner, member) = (Uuid::new_v4(), Uuid::new_v4());
        let group = svc
            .create_group(owner, "g".into(), &[member], false, Some(3))
            .await
            .unwrap();

        let mut joined = 0;
        let mut rejected = 0;
        let joiners: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let handles: Vec<_> = joiners
            .iter()
            .map(|&u| {
                let svc = svc.clone();
                let gid = group.id;
                tokio::spawn(async move { svc.join(u, gid).await })
            })
            .collect();
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => joined += 1,
                Err(AppError::CapacityExceeded) => rejected += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(joined, 1);
        assert_eq!(rejected, 3);
        let final_state = svc.get_group(group.id).await.unwrap();
        final_state.check_invariants().unwrap();
        assert_eq!(final_state.members.len(), 3);
    }

    #[tokio::test]
    async fn sole_owner_leave_deletes_the_group() {
        let svc = service();
        let (owner, member) = (Uuid::new_v4(), Uuid::new_v4());
        let group = svc
            .create_group(owner, "g".into(), &[member], false, None)
            .await
            .unwrap();

        assert!(matches!(
            svc.leave(owner, group.id).await.unwrap_err(),
            AppError::OwnerMustTransfer
        ));

        svc.leave(member, group.id).await.unwrap();
        assert_eq!(
            svc.leave(owner, group.id).await.unwrap(),
            LeaveOutcome::DeleteGroup
        );
        assert!(matches!(
            svc.get_group(group.id).await.unwrap_err(),
            AppError::GroupNotFound
        ));
    }

    #[tokio::test]
    async fn ensure_member_rejects_outsiders() {
        let svc = service();
        let (owner, member) = (Uuid::new_v4(), Uuid::new_v4());
        let group = svc
            .create_group(owner, "g".into(), &[member], false, None)
            .await
            .unwrap();

        svc.ensure_member(group.id, member).await.unwrap();
        assert!(matches!(
            svc.ensure_member(group.id, Uuid::new_v4()).await.unwrap_err(),
            AppError::NotAMember
        ));
        assert!(matches!(
            svc.ensure_member(Uuid::new_v4(), member).await.unwrap_err(),
            AppError::GroupNotFound
        ));
    }

    #[tokio::test]
    async fn groups_for_member_filters() {
        let svc = service();
        let (owner, member, outsider) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        svc.create_group(owner, "a".into(), &[member], false, None)
            .await
            .unwrap();
        svc.create_group(owner, "b".into(), &[Uuid::new_v4()], false, None)
            .await
            .unwrap();

        assert_eq!(svc.groups_for_member(member).await.unwrap().len(), 1);
        assert_eq!(svc.groups_for_member(owner).await.unwrap().len(), 2);
        assert!(svc.groups_for_member(outsider).await.unwrap().is_empty());
    }
}
