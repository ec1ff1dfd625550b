//! Property-based tests for the gatekeeper
//!
//! Tests for:
//! - Identifier validation: accepted set, trimming, length bound
//! - Reconciliation: members end with exactly one status role

use super::gate::{GateSettings, Gatekeeper};
use super::identifier::{validate_node_id, MAX_NODE_ID_LEN};
use super::roles::{RoleSettings, RoleSpec};
use crate::discord::mock::MockGuildClient;
use crate::discord::traits::{GuildRef, RoleRef, UserRef};
use crate::store::{MockNodeStore, NodeRecord};
use chrono::{Duration, Utc};
use proptest::prelude::*;
use std::sync::Arc;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

// ============================================================================
// IDENTIFIER VALIDATION
// ============================================================================

proptest! {
    /// Property: every ID over the allowed alphabet and length is accepted unchanged
    #[test]
    fn well_formed_ids_are_accepted(id in "[A-Za-z0-9_-]{1,64}") {
        prop_assert_eq!(validate_node_id(&id).unwrap(), id.as_str());
    }

    /// Property: surrounding whitespace never changes the outcome
    #[test]
    fn whitespace_is_trimmed(
        id in "[A-Za-z0-9_-]{1,64}",
        left in "[ \t\n]{0,4}",
        right in "[ \t\n]{0,4}",
    ) {
        let padded = format!("{left}{id}{right}");
        prop_assert_eq!(validate_node_id(&padded).unwrap(), id.as_str());
    }

    /// Property: an interior character outside the alphabet is always rejected
    #[test]
    fn foreign_characters_are_rejected(
        prefix in "[A-Za-z0-9]{1,20}",
        bad in "[^A-Za-z0-9_\\- \t\n\r]",
        suffix in "[A-Za-z0-9]{1,20}",
    ) {
        let id = format!("{prefix}{bad}{suffix}");
        prop_assert!(validate_node_id(&id).is_err());
    }

    /// Property: nothing longer than the bound is accepted
    #[test]
    fn overlong_ids_are_rejected(extra in 1usize..64) {
        let id = "n".repeat(MAX_NODE_ID_LEN + extra);
        prop_assert!(validate_node_id(&id).is_err());
    }
}

// ============================================================================
// RECONCILIATION
// ============================================================================

proptest! {
    /// Property: after a check, a verified member holds exactly the status
    /// role matching its node's freshness, whatever status roles it held before
    #[test]
    fn reconcile_leaves_exactly_one_status_role(
        age_hours in 0i64..(30 * 24),
        held_active in any::<bool>(),
        held_inactive in any::<bool>(),
    ) {
        let (active_held, inactive_held, expect_active) = block_on(async move {
            let store = Arc::new(MockNodeStore::new());
            let guild = MockGuildClient::new(GuildRef(1));
            let verified = guild.add_catalog_role(10, "Verified", 3);
            let active = guild.add_catalog_role(11, "Active", 2);
            let inactive = guild.add_catalog_role(12, "Inactive", 1);

            let gate = Gatekeeper::new(
                store.clone(),
                GateSettings::new(RoleSettings {
                    verified: RoleSpec::Id(verified),
                    active: Some(RoleSpec::Id(active)),
                    inactive: Some(RoleSpec::Id(inactive)),
                }),
            );

            let user = UserRef("42".to_string());
            let mut held: Vec<RoleRef> = vec![verified];
            if held_active {
                held.push(active);
            }
            if held_inactive {
                held.push(inactive);
            }
            guild.add_member(&user, &held);

            let now = Utc::now();
            store.insert(NodeRecord {
                discord_user_id: Some(user.0.clone()),
                ..NodeRecord::new("node", now - Duration::hours(age_hours))
            });

            let check = gate.check_member(&guild, &user, now).await.unwrap();
            (
                guild.has_role(&user, active),
                guild.has_role(&user, inactive),
                check.is_active,
            )
        });

        prop_assert_eq!(expect_active, age_hours < 7 * 24);
        prop_assert_ne!(active_held, inactive_held, "Exactly one status role must be held");
        prop_assert_eq!(active_held, expect_active);
    }
}
