// End-to-end command flows against the in-memory guild and record store.

use chrono::{Duration, Utc};
use nodegate::discord::{
    handle_command, Command, GuildRef, MockGuildClient, MockResponder, RoleRef, UserRef,
};
use nodegate::gatekeeper::{GateError, GateSettings, Gatekeeper, RoleSettings, RoleSpec};
use nodegate::store::{MockNodeStore, NodeRecord};
use std::sync::Arc;

struct Community {
    store: Arc<MockNodeStore>,
    guild: MockGuildClient,
    gate: Gatekeeper<MockNodeStore>,
    verified: RoleRef,
    active: RoleRef,
    inactive: RoleRef,
}

fn community(sweep_inactive: bool) -> Community {
    let store = Arc::new(MockNodeStore::new());
    let guild = MockGuildClient::new(GuildRef(900));
    let verified = guild.add_catalog_role(10, "Altruistic Mode", 3);
    let active = guild.add_catalog_role(11, "Active Node", 2);
    let inactive = guild.add_catalog_role(12, "Inactive Node", 1);

    let mut settings = GateSettings::new(RoleSettings {
        verified: RoleSpec::Name("Altruistic Mode".to_string()),
        active: Some(RoleSpec::Name("Active Node".to_string())),
        inactive: Some(RoleSpec::Name("Inactive Node".to_string())),
    });
    settings.sweep_inactive = sweep_inactive;

    Community {
        gate: Gatekeeper::new(store.clone(), settings),
        store,
        guild,
        verified,
        active,
        inactive,
    }
}

async fn run(c: &Community, user: &UserRef, command: Command) -> String {
    let responder = MockResponder::new();
    handle_command(&c.gate, Some(&c.guild), &responder, user, &command, Utc::now()).await;

    let replies = responder.replies();
    assert_eq!(replies.len(), 1, "every command gets exactly one reply");
    replies.into_iter().next().unwrap_or_default()
}

fn node(id: &str) -> Command {
    Command::Node {
        node_id: id.to_string(),
    }
}

#[tokio::test]
async fn test_member_lifecycle() {
    let c = community(true);
    let alice = UserRef("1001".to_string());
    c.guild.add_member(&alice, &[]);
    c.store.insert(NodeRecord::new("abc-123", Utc::now()));

    // Verification grants primary and active roles
    let reply = run(&c, &alice, node("abc-123")).await;
    assert!(reply.contains("Node verified"));
    assert!(reply.contains("abc-123"));
    assert!(c.guild.has_role(&alice, c.verified));
    assert!(c.guild.has_role(&alice, c.active));

    // Checking right away changes nothing
    let before = c.guild.mutations().len();
    let reply = run(&c, &alice, Command::CheckRoles).await;
    assert!(reply.contains("is active"));
    assert_eq!(c.guild.mutations().len(), before);

    // A second node for the same member is refused
    c.store.insert(NodeRecord::new("second-node", Utc::now()));
    let reply = run(&c, &alice, node("second-node")).await;
    assert!(reply.contains("already linked to node `abc-123`"));

    // The node goes quiet: rewrite history so its last check-in is old
    let linked = NodeRecord {
        discord_user_id: Some(alice.0.clone()),
        ..NodeRecord::new("abc-123", Utc::now() - Duration::days(10))
    };
    let stale_store = MockNodeStore::new();
    stale_store.insert(linked);
    let stale = Gatekeeper::new(Arc::new(stale_store.clone()), c.gate_settings_for_test());

    let report = stale.sweep(&c.guild, Utc::now()).await.unwrap();
    assert_eq!(report.deactivated, 1);
    assert!(c.guild.has_role(&alice, c.inactive));
    assert!(!c.guild.has_role(&alice, c.active));
    assert!(c.guild.has_role(&alice, c.verified));

    // It reports in again; the inactive sweep promotes it back
    stale_store.insert(NodeRecord {
        discord_user_id: Some(alice.0.clone()),
        ..NodeRecord::new("abc-123", Utc::now())
    });
    let report = stale.sweep(&c.guild, Utc::now()).await.unwrap();
    assert_eq!(report.activated, 1);
    assert!(c.guild.has_role(&alice, c.active));
    assert!(!c.guild.has_role(&alice, c.inactive));
}

#[tokio::test]
async fn test_node_cannot_be_claimed_twice() {
    let c = community(false);
    let alice = UserRef("1001".to_string());
    let mallory = UserRef("1002".to_string());
    c.guild.add_member(&alice, &[]);
    c.guild.add_member(&mallory, &[]);
    c.store.insert(NodeRecord::new("abc-123", Utc::now()));

    run(&c, &alice, node("abc-123")).await;
    let reply = run(&c, &mallory, node("abc-123")).await;

    assert_eq!(
        reply,
        GateError::IdentifierTaken("abc-123".to_string()).user_message()
    );
    assert!(c.guild.held_roles(&mallory).is_empty());
}

#[tokio::test]
async fn test_stale_and_unknown_nodes_are_refused() {
    let c = community(false);
    let alice = UserRef("1001".to_string());
    c.guild.add_member(&alice, &[]);
    c.store
        .insert(NodeRecord::new("old-node", Utc::now() - Duration::hours(25)));

    let reply = run(&c, &alice, node("old-node")).await;
    assert!(reply.contains("has not checked in recently"));

    let reply = run(&c, &alice, node("never-seen")).await;
    assert_eq!(reply, "❌ No node found with this ID.");

    let queries = c.store.query_count();
    let reply = run(&c, &alice, node("bad id!")).await;
    assert!(reply.contains("Invalid node ID"));
    assert_eq!(c.store.query_count(), queries);

    assert!(c.guild.mutations().is_empty());
}

#[tokio::test]
async fn test_record_written_during_link_asks_for_retry() {
    let c = community(false);
    let alice = UserRef("1001".to_string());
    c.guild.add_member(&alice, &[]);
    c.store.insert(NodeRecord::new("abc-123", Utc::now()));
    c.store
        .touch_before_next_link(Utc::now() + Duration::seconds(5));

    let reply = run(&c, &alice, node("abc-123")).await;
    assert!(reply.contains("run the command again"));
    assert!(c.guild.mutations().is_empty());

    let reply = run(&c, &alice, node("abc-123")).await;
    assert!(reply.contains("Node verified"));
}

#[tokio::test]
async fn test_bot_ranked_below_roles() {
    let c = community(false);
    let alice = UserRef("1001".to_string());
    c.guild.add_member(&alice, &[]);
    c.guild.set_standing(3, true);
    c.store.insert(NodeRecord::new("abc-123", Utc::now()));

    let reply = run(&c, &alice, node("abc-123")).await;

    assert!(reply.contains("must be higher than the \"Altruistic Mode\" role"));
    // Nothing was linked either
    assert!(c
        .store
        .records()
        .iter()
        .all(|r| r.discord_user_id.is_none()));
}

impl Community {
    fn gate_settings_for_test(&self) -> GateSettings {
        let mut settings = GateSettings::new(RoleSettings {
            verified: RoleSpec::Id(self.verified),
            active: Some(RoleSpec::Id(self.active)),
            inactive: Some(RoleSpec::Id(self.inactive)),
        });
        settings.sweep_inactive = true;
        settings
    }
}
