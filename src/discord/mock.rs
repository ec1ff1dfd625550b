//! Mock Discord Client for Testing
//!
//! Provides MockGuildClient and MockResponder so the gatekeeper can be tested
//! without a Discord connection.

use super::traits::*;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Mock guild for testing
#[derive(Clone)]
pub struct MockGuildClient {
    state: Arc<Mutex<MockState>>,
    guild: GuildRef,
}

struct MockState {
    roles: Vec<GuildRole>,
    members: HashMap<UserRef, Vec<RoleRef>>,
    standing: ActorStanding,
    failing_roles: HashSet<RoleRef>,
    failing_grants: usize,
    mutations: Vec<RoleMutation>,
    role_listings: usize,
}

/// A role grant or revoke recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleMutation {
    Added(UserRef, RoleRef),
    Removed(UserRef, RoleRef),
}

impl MockGuildClient {
    /// Create a mock guild whose bot outranks everything and can manage roles
    pub fn new(guild: GuildRef) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                roles: Vec::new(),
                members: HashMap::new(),
                standing: ActorStanding {
                    highest_position: u16::MAX,
                    can_manage_roles: true,
                },
                failing_roles: HashSet::new(),
                failing_grants: 0,
                mutations: Vec::new(),
                role_listings: 0,
            })),
            guild,
        }
    }

    /// Add a role to the catalog
    pub fn add_catalog_role(&self, id: u64, name: &str, position: u16) -> RoleRef {
        let role = RoleRef(id);
        self.state.lock().unwrap().roles.push(GuildRole {
            id: role,
            name: name.to_string(),
            position,
        });
        role
    }

    /// Rename a catalog role
    pub fn rename_role(&self, role: RoleRef, name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.roles.iter_mut().find(|r| r.id == role) {
            entry.name = name.to_string();
        }
    }

    /// Delete a catalog role
    pub fn delete_role(&self, role: RoleRef) {
        let mut state = self.state.lock().unwrap();
        state.roles.retain(|r| r.id != role);
        for held in state.members.values_mut() {
            held.retain(|r| *r != role);
        }
    }

    /// Add a member holding the given roles
    pub fn add_member(&self, user: &UserRef, roles: &[RoleRef]) {
        self.state
            .lock()
            .unwrap()
            .members
            .insert(user.clone(), roles.to_vec());
    }

    /// Set the bot's own standing
    pub fn set_standing(&self, highest_position: u16, can_manage_roles: bool) {
        self.state.lock().unwrap().standing = ActorStanding {
            highest_position,
            can_manage_roles,
        };
    }

    /// Make every grant/revoke of `role` fail
    pub fn fail_mutations_for(&self, role: RoleRef) {
        self.state.lock().unwrap().failing_roles.insert(role);
    }

    /// Make the next `count` grants fail with a transient network error
    pub fn fail_next_grants(&self, count: usize) {
        self.state.lock().unwrap().failing_grants = count;
    }

    /// Roles held by a member (empty if unknown)
    pub fn held_roles(&self, user: &UserRef) -> Vec<RoleRef> {
        self.state
            .lock()
            .unwrap()
            .members
            .get(user)
            .cloned()
            .unwrap_or_default()
    }

    /// Check if member holds a role
    pub fn has_role(&self, user: &UserRef, role: RoleRef) -> bool {
        self.held_roles(user).contains(&role)
    }

    /// Role mutations performed so far, in order
    pub fn mutations(&self) -> Vec<RoleMutation> {
        self.state.lock().unwrap().mutations.clone()
    }

    /// Number of times the role catalog was listed
    pub fn role_listings(&self) -> usize {
        self.state.lock().unwrap().role_listings
    }
}

#[async_trait]
impl GuildClient for MockGuildClient {
    fn guild(&self) -> GuildRef {
        self.guild
    }

    async fn roles(&self) -> GuildResult<Vec<GuildRole>> {
        let mut state = self.state.lock().unwrap();
        state.role_listings += 1;
        Ok(state.roles.clone())
    }

    async fn member_roles(&self, user: &UserRef) -> GuildResult<Vec<RoleRef>> {
        self.state
            .lock()
            .unwrap()
            .members
            .get(user)
            .cloned()
            .ok_or_else(|| GuildError::MemberNotFound(user.clone()))
    }

    async fn add_role(&self, user: &UserRef, role: RoleRef) -> GuildResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing_roles.contains(&role) {
            return Err(GuildError::Unauthorized);
        }
        if state.failing_grants > 0 {
            state.failing_grants -= 1;
            return Err(GuildError::Network("503 Service Unavailable".to_string()));
        }
        if !state.roles.iter().any(|r| r.id == role) {
            return Err(GuildError::RoleNotFound(role));
        }

        let held = state
            .members
            .get_mut(user)
            .ok_or_else(|| GuildError::MemberNotFound(user.clone()))?;
        if !held.contains(&role) {
            held.push(role);
        }
        state
            .mutations
            .push(RoleMutation::Added(user.clone(), role));
        Ok(())
    }

    async fn remove_role(&self, user: &UserRef, role: RoleRef) -> GuildResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing_roles.contains(&role) {
            return Err(GuildError::Unauthorized);
        }

        let held = state
            .members
            .get_mut(user)
            .ok_or_else(|| GuildError::MemberNotFound(user.clone()))?;
        held.retain(|r| *r != role);
        state
            .mutations
            .push(RoleMutation::Removed(user.clone(), role));
        Ok(())
    }

    async fn actor_standing(&self) -> GuildResult<ActorStanding> {
        Ok(self.state.lock().unwrap().standing)
    }

    async fn members_with_role(&self, role: RoleRef) -> GuildResult<Vec<UserRef>> {
        let state = self.state.lock().unwrap();
        let mut holders: Vec<UserRef> = state
            .members
            .iter()
            .filter(|(_, held)| held.contains(&role))
            .map(|(user, _)| user.clone())
            .collect();
        holders.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(holders)
    }
}

/// Mock reply channel that records every call
#[derive(Clone, Default)]
pub struct MockResponder {
    state: Arc<Mutex<ResponderState>>,
}

#[derive(Default)]
struct ResponderState {
    acknowledged: usize,
    edits: Vec<String>,
    sends: Vec<String>,
    fail_acknowledge: bool,
}

impl MockResponder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make acknowledge() fail, forcing the fallback path
    pub fn fail_acknowledge(&self) {
        self.state.lock().unwrap().fail_acknowledge = true;
    }

    pub fn acknowledgements(&self) -> usize {
        self.state.lock().unwrap().acknowledged
    }

    pub fn edits(&self) -> Vec<String> {
        self.state.lock().unwrap().edits.clone()
    }

    pub fn sends(&self) -> Vec<String> {
        self.state.lock().unwrap().sends.clone()
    }

    /// Every reply delivered, edits and sends together
    pub fn replies(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.edits.iter().chain(&state.sends).cloned().collect()
    }
}

#[async_trait]
impl Responder for MockResponder {
    async fn acknowledge(&self) -> GuildResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_acknowledge {
            return Err(GuildError::Network("interaction expired".to_string()));
        }
        state.acknowledged += 1;
        Ok(())
    }

    async fn edit(&self, content: &str) -> GuildResult<()> {
        self.state.lock().unwrap().edits.push(content.to_string());
        Ok(())
    }

    async fn send(&self, content: &str) -> GuildResult<()> {
        self.state.lock().unwrap().sends.push(content.to_string());
        Ok(())
    }
}
