//! Activity reconciliation.
//!
//! A linked node is active when its latest record is younger than the
//! activity window. Status roles follow:
//! - active, holds inactive  → grant active, revoke inactive
//! - inactive, holds active  → grant inactive, revoke active
//! - already matching        → no-op
//!
//! A member with a linked node always gets the primary role back if it is
//! missing (a grant failed after the link was written). Unlinked members are
//! only touched if they hold the primary role or a status role. The new
//! status role is granted before the old one is revoked, so a failure in
//! between leaves both rather than neither; the next pass fixes it.
//!
//! Two entry points: `check_member` for `/checkroles`, and `sweep` which
//! runs over every holder of the active role on a daily schedule.

use super::error::{GateError, GateResult};
use super::gate::Gatekeeper;
use super::roles::{ensure_manageable, ResolvedRoles};
use crate::discord::traits::{GuildClient, GuildRole, UserRef};
use crate::store::{NodeRecord, NodeStore};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Status role change applied to a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Unchanged,
    Activated,
    Deactivated,
}

/// Result of reconciling one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberCheck {
    pub user: UserRef,
    pub is_active: bool,
    /// Latest record linked to the member
    pub record: Option<NodeRecord>,
    pub change: StatusChange,
    /// Primary role granted during this check, if it was missing
    pub restored_role: Option<String>,
}

impl MemberCheck {
    /// Reply shown to the requester of `/checkroles`.
    pub fn summary(&self) -> String {
        let Some(record) = &self.record else {
            return "❌ No node is linked to your account. Use /node to verify one.".to_string();
        };

        let seen = format!("<t:{}:R>", record.timestamp.timestamp());
        let status = match (self.is_active, self.change) {
            (true, StatusChange::Activated) => format!(
                "✅ Node `{}` is active again (last seen {}). Your active role is restored.",
                record.node_id, seen
            ),
            (true, _) if self.restored_role.is_some() => format!(
                "✅ Node `{}` is active (last seen {}).",
                record.node_id, seen
            ),
            (true, _) => format!(
                "✅ Node `{}` is active (last seen {}). Your roles are up to date.",
                record.node_id, seen
            ),
            (false, StatusChange::Deactivated) => format!(
                "⚠️ Node `{}` has not checked in recently (last seen {}). \
                 You have been moved to inactive.",
                record.node_id, seen
            ),
            (false, _) => format!(
                "⚠️ Node `{}` is inactive (last seen {}). Start your node to become active again.",
                record.node_id, seen
            ),
        };

        match &self.restored_role {
            Some(role) => format!("{status}\nYour {role} role has been restored."),
            None => status,
        }
    }
}

/// Tally of a batch sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub activated: usize,
    pub deactivated: usize,
    pub failed: usize,
}

impl<S: NodeStore + ?Sized> Gatekeeper<S> {
    /// Reconcile a single member (`/checkroles`).
    pub async fn check_member<G: GuildClient + ?Sized>(
        &self,
        guild: &G,
        user: &UserRef,
        now: DateTime<Utc>,
    ) -> GateResult<MemberCheck> {
        let roles = self.roles.resolve(guild).await?;
        self.ensure_roles_manageable(guild, &roles).await?;
        self.reconcile(guild, &roles, user, now).await
    }

    /// Reconcile every holder of the active role.
    ///
    /// Per-member failures are logged and counted, never fatal.
    pub async fn sweep<G: GuildClient + ?Sized>(
        &self,
        guild: &G,
        now: DateTime<Utc>,
    ) -> GateResult<SweepReport> {
        let roles = self.roles.resolve(guild).await?;
        let Some(active) = roles.active.as_ref() else {
            debug!(guild = %guild.guild(), "No active role configured, nothing to sweep");
            return Ok(SweepReport::default());
        };
        self.ensure_roles_manageable(guild, &roles).await?;

        let mut targets: BTreeSet<UserRef> = BTreeSet::new();
        targets.extend(self.holders(guild, active).await?);
        if self.sweep_inactive {
            if let Some(inactive) = roles.inactive.as_ref() {
                targets.extend(self.holders(guild, inactive).await?);
            }
        }

        let mut report = SweepReport::default();
        for user in &targets {
            report.checked += 1;
            match self.reconcile(guild, &roles, user, now).await {
                Ok(check) => match check.change {
                    StatusChange::Activated => report.activated += 1,
                    StatusChange::Deactivated => report.deactivated += 1,
                    StatusChange::Unchanged => {}
                },
                Err(e) => {
                    warn!(guild = %guild.guild(), %user, error = %e, "Skipping member in sweep");
                    report.failed += 1;
                }
            }
        }

        info!(
            guild = %guild.guild(),
            checked = report.checked,
            activated = report.activated,
            deactivated = report.deactivated,
            failed = report.failed,
            "Activity sweep complete"
        );
        Ok(report)
    }

    /// Run `sweep` every `every` until the task is dropped.
    ///
    /// The first sweep runs immediately.
    pub async fn run_sweeps<G: GuildClient + ?Sized>(&self, guild: &G, every: Duration) {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if let Err(e) = self.sweep(guild, Utc::now()).await {
                warn!(guild = %guild.guild(), error = %e, "Activity sweep failed, will retry next interval");
            }
        }
    }

    async fn holders<G: GuildClient + ?Sized>(
        &self,
        guild: &G,
        role: &GuildRole,
    ) -> GateResult<Vec<UserRef>> {
        guild
            .members_with_role(role.id)
            .await
            .map_err(|e| GateError::guild_lookup("role members", e))
    }

    async fn ensure_roles_manageable<G: GuildClient + ?Sized>(
        &self,
        guild: &G,
        roles: &ResolvedRoles,
    ) -> GateResult<()> {
        let standing = guild
            .actor_standing()
            .await
            .map_err(|e| GateError::guild_lookup("bot standing", e))?;
        ensure_manageable(&standing, &roles.managed())
    }

    /// Latest check-in of the member's node.
    ///
    /// Agents keep appending records after the link, and those carry no
    /// user, so the node's own latest record is preferred when newer.
    async fn latest_linked(&self, user: &UserRef) -> GateResult<Option<NodeRecord>> {
        let Some(linked) = self
            .store
            .latest_for_user(user)
            .await
            .map_err(GateError::StoreQueryFailed)?
        else {
            return Ok(None);
        };

        let latest = self
            .store
            .latest_for_node(&linked.node_id)
            .await
            .map_err(GateError::StoreQueryFailed)?;
        Ok(Some(match latest {
            Some(latest) if latest.timestamp > linked.timestamp => NodeRecord {
                discord_user_id: linked.discord_user_id,
                ..latest
            },
            _ => linked,
        }))
    }

    async fn reconcile<G: GuildClient + ?Sized>(
        &self,
        guild: &G,
        roles: &ResolvedRoles,
        user: &UserRef,
        now: DateTime<Utc>,
    ) -> GateResult<MemberCheck> {
        let record = self.latest_linked(user).await?;
        let is_active = record
            .as_ref()
            .is_some_and(|r| r.is_fresh(now, self.windows.activity));

        let linked = record.is_some();
        let mut check = MemberCheck {
            user: user.clone(),
            is_active,
            record,
            change: StatusChange::Unchanged,
            restored_role: None,
        };

        if !linked && roles.status_roles().is_empty() {
            return Ok(check);
        }

        let held = guild
            .member_roles(user)
            .await
            .map_err(|e| GateError::guild_lookup("member roles", e))?;
        let holds = |role: Option<&GuildRole>| role.is_some_and(|r| held.contains(&r.id));

        if linked && !held.contains(&roles.verified.id) {
            guild
                .add_role(user, roles.verified.id)
                .await
                .map_err(|source| GateError::RoleMutationFailed {
                    role: roles.verified.name.clone(),
                    source,
                })?;
            info!(%user, role = %roles.verified.name, "Restored primary role to linked member");
            check.restored_role = Some(roles.verified.name.clone());
        }

        if roles.status_roles().is_empty() {
            return Ok(check);
        }

        let (wanted, unwanted) = if is_active {
            (roles.active.as_ref(), roles.inactive.as_ref())
        } else {
            (roles.inactive.as_ref(), roles.active.as_ref())
        };

        let has_status = holds(roles.active.as_ref()) || holds(roles.inactive.as_ref());
        if !linked && !has_status && !held.contains(&roles.verified.id) {
            return Ok(check);
        }

        let mut changed = false;
        if let Some(role) = wanted.filter(|r| !held.contains(&r.id)) {
            guild
                .add_role(user, role.id)
                .await
                .map_err(|source| GateError::RoleMutationFailed {
                    role: role.name.clone(),
                    source,
                })?;
            changed = true;
        }
        if let Some(role) = unwanted.filter(|r| held.contains(&r.id)) {
            guild
                .remove_role(user, role.id)
                .await
                .map_err(|source| GateError::RoleMutationFailed {
                    role: role.name.clone(),
                    source,
                })?;
            changed = true;
        }

        if changed {
            check.change = if is_active {
                StatusChange::Activated
            } else {
                StatusChange::Deactivated
            };
            info!(%user, is_active, "Status role updated");
        }

        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discord::mock::MockGuildClient;
    use crate::discord::traits::{GuildRef, RoleRef};
    use crate::gatekeeper::gate::GateSettings;
    use crate::gatekeeper::roles::{RoleSettings, RoleSpec};
    use crate::store::MockNodeStore;
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;

    struct Fixture {
        store: Arc<MockNodeStore>,
        guild: MockGuildClient,
        gate: Gatekeeper<MockNodeStore>,
        verified: RoleRef,
        active: RoleRef,
        inactive: RoleRef,
    }

    fn fixture_with(sweep_inactive: bool) -> Fixture {
        let store = Arc::new(MockNodeStore::new());
        let guild = MockGuildClient::new(GuildRef(1));
        let verified = guild.add_catalog_role(10, "Altruistic Mode", 3);
        let active = guild.add_catalog_role(11, "Active Node", 2);
        let inactive = guild.add_catalog_role(12, "Inactive Node", 1);
        guild.set_standing(10, true);

        let mut settings = GateSettings::new(RoleSettings {
            verified: RoleSpec::Name("Altruistic Mode".to_string()),
            active: Some(RoleSpec::Name("Active Node".to_string())),
            inactive: Some(RoleSpec::Name("Inactive Node".to_string())),
        });
        settings.sweep_inactive = sweep_inactive;

        Fixture {
            gate: Gatekeeper::new(store.clone(), settings),
            store,
            guild,
            verified,
            active,
            inactive,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(false)
    }

    fn user(id: &str) -> UserRef {
        UserRef(id.to_string())
    }

    fn linked(node_id: &str, user: &UserRef, timestamp: DateTime<Utc>) -> NodeRecord {
        NodeRecord {
            discord_user_id: Some(user.0.clone()),
            ..NodeRecord::new(node_id, timestamp)
        }
    }

    #[tokio::test]
    async fn test_stale_active_member_is_demoted() {
        let f = fixture();
        let now = Utc::now();
        let alice = user("100");
        f.guild.add_member(&alice, &[f.verified, f.active]);
        f.store
            .insert(linked("xyz", &alice, now - ChronoDuration::days(10)));

        let check = f.gate.check_member(&f.guild, &alice, now).await.unwrap();

        assert!(!check.is_active);
        assert_eq!(check.change, StatusChange::Deactivated);
        assert!(f.guild.has_role(&alice, f.inactive));
        assert!(!f.guild.has_role(&alice, f.active));
        // Primary role is permanent
        assert!(f.guild.has_role(&alice, f.verified));
        assert!(check.summary().contains("moved to inactive"));
    }

    #[tokio::test]
    async fn test_returning_member_is_promoted() {
        let f = fixture();
        let now = Utc::now();
        let alice = user("100");
        f.guild.add_member(&alice, &[f.verified, f.inactive]);
        f.store
            .insert(linked("xyz", &alice, now - ChronoDuration::hours(1)));

        let check = f.gate.check_member(&f.guild, &alice, now).await.unwrap();

        assert!(check.is_active);
        assert_eq!(check.change, StatusChange::Activated);
        assert!(f.guild.has_role(&alice, f.active));
        assert!(!f.guild.has_role(&alice, f.inactive));
    }

    #[tokio::test]
    async fn test_matching_status_is_noop() {
        let f = fixture();
        let now = Utc::now();
        let alice = user("100");
        f.guild.add_member(&alice, &[f.verified, f.active]);
        f.store
            .insert(linked("xyz", &alice, now - ChronoDuration::days(6)));

        let check = f.gate.check_member(&f.guild, &alice, now).await.unwrap();

        assert!(check.is_active);
        assert_eq!(check.change, StatusChange::Unchanged);
        assert!(f.guild.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_unlinked_unverified_member_is_untouched() {
        let f = fixture();
        let alice = user("100");
        f.guild.add_member(&alice, &[]);

        let check = f
            .gate
            .check_member(&f.guild, &alice, Utc::now())
            .await
            .unwrap();

        assert!(!check.is_active);
        assert!(check.record.is_none());
        assert!(f.guild.mutations().is_empty());
        assert!(check.summary().contains("/node"));
    }

    #[tokio::test]
    async fn test_unlinked_check_ins_count_as_activity() {
        let f = fixture();
        let now = Utc::now();
        let alice = user("100");
        f.guild.add_member(&alice, &[f.verified, f.inactive]);
        f.store
            .insert(linked("xyz", &alice, now - ChronoDuration::days(20)));
        f.store
            .insert(NodeRecord::new("xyz", now - ChronoDuration::hours(2)));

        let check = f.gate.check_member(&f.guild, &alice, now).await.unwrap();

        assert!(check.is_active);
        assert_eq!(check.change, StatusChange::Activated);
        let record = check.record.unwrap();
        assert_eq!(record.timestamp, now - ChronoDuration::hours(2));
        assert_eq!(record.linked_user(), Some(alice));
    }

    #[tokio::test]
    async fn test_verified_member_without_status_gets_one() {
        let f = fixture();
        let now = Utc::now();
        let alice = user("100");
        f.guild.add_member(&alice, &[f.verified]);
        f.store.insert(linked("xyz", &alice, now));

        f.gate.check_member(&f.guild, &alice, now).await.unwrap();

        assert!(f.guild.has_role(&alice, f.active));
        assert!(!f.guild.has_role(&alice, f.inactive));
    }

    #[tokio::test]
    async fn test_both_status_roles_collapse_to_one() {
        let f = fixture();
        let now = Utc::now();
        let alice = user("100");
        f.guild.add_member(&alice, &[f.verified, f.active, f.inactive]);
        f.store
            .insert(linked("xyz", &alice, now - ChronoDuration::days(30)));

        f.gate.check_member(&f.guild, &alice, now).await.unwrap();

        assert!(f.guild.has_role(&alice, f.inactive));
        assert!(!f.guild.has_role(&alice, f.active));
    }

    #[tokio::test]
    async fn test_verification_then_check_is_noop() {
        let f = fixture();
        let now = Utc::now();
        let alice = user("100");
        f.guild.add_member(&alice, &[]);
        f.store.insert(NodeRecord::new("abc-123", now));

        f.gate
            .verify(&f.guild, &alice, "abc-123", now)
            .await
            .unwrap();
        let mutations_after_verify = f.guild.mutations().len();

        let check = f.gate.check_member(&f.guild, &alice, now).await.unwrap();

        assert!(check.is_active);
        assert_eq!(check.change, StatusChange::Unchanged);
        assert_eq!(f.guild.mutations().len(), mutations_after_verify);
    }

    #[tokio::test]
    async fn test_sweep_demotes_stale_holders_and_skips_failures() {
        let f = fixture();
        let now = Utc::now();
        let fresh = user("1");
        let stale = user("2");
        let broken = user("3");

        for u in [&fresh, &stale, &broken] {
            f.guild.add_member(u, &[f.verified, f.active]);
        }
        f.store.insert(linked("a", &fresh, now));
        f.store
            .insert(linked("b", &stale, now - ChronoDuration::days(8)));
        f.store
            .insert(linked("c", &broken, now - ChronoDuration::days(8)));

        // Member 3 left the guild between listing and reconciling
        let sweep_guild = FlakyGuild {
            inner: f.guild.clone(),
            missing: broken.clone(),
        };

        let report = f.gate.sweep(&sweep_guild, now).await.unwrap();

        assert_eq!(
            report,
            SweepReport {
                checked: 3,
                activated: 0,
                deactivated: 1,
                failed: 1,
            }
        );
        assert!(f.guild.has_role(&fresh, f.active));
        assert!(f.guild.has_role(&stale, f.inactive));
        assert!(!f.guild.has_role(&stale, f.active));
    }

    #[tokio::test]
    async fn test_failed_primary_grant_is_restored_by_check() {
        let f = fixture();
        let now = Utc::now();
        let alice = user("100");
        f.guild.add_member(&alice, &[]);
        f.store.insert(NodeRecord::new("abc-123", now));
        f.guild.fail_next_grants(1);

        // Link is written, then the primary grant fails
        let result = f.gate.verify(&f.guild, &alice, "abc-123", now).await;
        assert!(matches!(
            result,
            Err(GateError::RoleMutationFailed { ref role, .. }) if role == "Altruistic Mode"
        ));
        assert!(f.guild.held_roles(&alice).is_empty());

        let retry = f.gate.verify(&f.guild, &alice, "abc-123", now).await;
        assert!(matches!(retry, Err(GateError::AlreadyLinked { .. })));

        let check = f.gate.check_member(&f.guild, &alice, now).await.unwrap();

        assert_eq!(check.restored_role.as_deref(), Some("Altruistic Mode"));
        assert_eq!(check.change, StatusChange::Activated);
        assert!(f.guild.has_role(&alice, f.verified));
        assert!(f.guild.has_role(&alice, f.active));
        assert!(!f.guild.has_role(&alice, f.inactive));
        let summary = check.summary();
        assert!(summary.contains("Altruistic Mode role has been restored"));
        assert!(!summary.contains("up to date"));
    }

    #[tokio::test]
    async fn test_restored_primary_without_status_roles() {
        let store = Arc::new(MockNodeStore::new());
        let guild = MockGuildClient::new(GuildRef(1));
        let verified = guild.add_catalog_role(10, "Altruistic Mode", 3);
        let gate = Gatekeeper::new(
            store.clone(),
            GateSettings::new(RoleSettings::verified_only(RoleSpec::Name(
                "Altruistic Mode".to_string(),
            ))),
        );
        let now = Utc::now();
        let alice = user("100");
        guild.add_member(&alice, &[]);
        store.insert(linked("xyz", &alice, now));

        let check = gate.check_member(&guild, &alice, now).await.unwrap();

        assert_eq!(check.restored_role.as_deref(), Some("Altruistic Mode"));
        assert!(guild.has_role(&alice, verified));

        // Second check has nothing left to restore
        let check = gate.check_member(&guild, &alice, now).await.unwrap();
        assert_eq!(check.restored_role, None);
        assert_eq!(guild.mutations().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_counts_failed_role_change_and_continues() {
        let f = fixture();
        let now = Utc::now();
        let stale = user("1");
        let fresh = user("2");
        let missing_primary = user("3");

        f.guild.add_member(&stale, &[f.verified, f.active]);
        f.guild.add_member(&fresh, &[f.verified, f.active]);
        f.guild.add_member(&missing_primary, &[f.active]);
        f.store
            .insert(linked("a", &stale, now - ChronoDuration::days(8)));
        f.store.insert(linked("b", &fresh, now));
        f.store.insert(linked("c", &missing_primary, now));
        f.guild.fail_mutations_for(f.inactive);

        let report = f.gate.sweep(&f.guild, now).await.unwrap();

        assert_eq!(report.checked, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.deactivated, 0);
        // The stale member keeps the active role until the grant succeeds
        assert!(f.guild.has_role(&stale, f.active));
        assert!(f.guild.has_role(&fresh, f.active));
        // Later members are still reconciled
        assert!(f.guild.has_role(&missing_primary, f.verified));
        assert!(f.guild.has_role(&missing_primary, f.active));
    }

    #[tokio::test]
    async fn test_sweep_includes_inactive_holders_when_enabled() {
        let f = fixture_with(true);
        let now = Utc::now();
        let alice = user("100");
        f.guild.add_member(&alice, &[f.verified, f.inactive]);
        f.store.insert(linked("xyz", &alice, now));

        let report = f.gate.sweep(&f.guild, now).await.unwrap();

        assert_eq!(report.activated, 1);
        assert!(f.guild.has_role(&alice, f.active));

        // Without the flag, inactive holders are not visited
        let g = fixture();
        g.guild.add_member(&alice, &[g.verified, g.inactive]);
        g.store.insert(linked("xyz", &alice, now));
        assert_eq!(g.gate.sweep(&g.guild, now).await.unwrap().checked, 0);
    }

    #[tokio::test]
    async fn test_sweep_without_status_roles_is_noop() {
        let store = Arc::new(MockNodeStore::new());
        let guild = MockGuildClient::new(GuildRef(1));
        guild.add_catalog_role(10, "Altruistic Mode", 3);
        let gate = Gatekeeper::new(
            store,
            GateSettings::new(RoleSettings::verified_only(RoleSpec::Name(
                "Altruistic Mode".to_string(),
            ))),
        );

        let report = gate.sweep(&guild, Utc::now()).await.unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_sweep_requires_rank_over_status_roles() {
        let f = fixture();
        f.guild.set_standing(2, true);

        let result = f.gate.sweep(&f.guild, Utc::now()).await;
        assert!(matches!(result, Err(GateError::InsufficientRank { .. })));
    }

    /// Guild where one member's role lookups fail.
    struct FlakyGuild {
        inner: MockGuildClient,
        missing: UserRef,
    }

    #[async_trait::async_trait]
    impl GuildClient for FlakyGuild {
        fn guild(&self) -> GuildRef {
            self.inner.guild()
        }

        async fn roles(&self) -> crate::discord::traits::GuildResult<Vec<GuildRole>> {
            self.inner.roles().await
        }

        async fn member_roles(
            &self,
            user: &UserRef,
        ) -> crate::discord::traits::GuildResult<Vec<RoleRef>> {
            if *user == self.missing {
                return Err(crate::discord::traits::GuildError::MemberNotFound(
                    user.clone(),
                ));
            }
            self.inner.member_roles(user).await
        }

        async fn add_role(
            &self,
            user: &UserRef,
            role: RoleRef,
        ) -> crate::discord::traits::GuildResult<()> {
            self.inner.add_role(user, role).await
        }

        async fn remove_role(
            &self,
            user: &UserRef,
            role: RoleRef,
        ) -> crate::discord::traits::GuildResult<()> {
            self.inner.remove_role(user, role).await
        }

        async fn actor_standing(
            &self,
        ) -> crate::discord::traits::GuildResult<crate::discord::traits::ActorStanding> {
            self.inner.actor_standing().await
        }

        async fn members_with_role(
            &self,
            role: RoleRef,
        ) -> crate::discord::traits::GuildResult<Vec<UserRef>> {
            self.inner.members_with_role(role).await
        }
    }
}
