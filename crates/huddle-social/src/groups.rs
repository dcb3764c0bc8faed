//! Short-lived groups joined by code
//!
//! A group expires a fixed time after creation. Expired groups no longer
//! accept joins and are removed, with their memberships, by
//! [`SocialClient::purge_expired`].

use huddle_core::{Filter, Group, GroupMember, Notice, Table, UserId, decode_rows, encode_row};
use rand::Rng;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::client::SocialClient;
use crate::config::GROUP_CODE_ALPHABET;
use crate::error::{SocialError, SocialResult};

/// A random uppercase alphanumeric join code
pub fn generate_code(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| GROUP_CODE_ALPHABET[rng.random_range(0..GROUP_CODE_ALPHABET.len())] as char)
        .collect()
}

impl SocialClient {
    /// Create a group and join it
    #[instrument(skip(self))]
    pub async fn create_group(&self, name: &str) -> SocialResult<Group> {
        let result = self.try_create_group(name).await;
        match &result {
            Ok(group) => self.notify(Notice::success(format!(
                "Group \"{}\" created! Code: {}",
                group.name, group.code
            ))),
            Err(e) => {
                warn!(error = %e, "Failed to create group");
                self.notify_failure(e);
            }
        }
        result
    }

    async fn try_create_group(&self, name: &str) -> SocialResult<Group> {
        let user = self.current_user()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(SocialError::EmptyGroupName);
        }

        let now = self.clock.now_utc();
        let group = Group {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            code: generate_code(self.config.group_code_length),
            creator_id: user.id.clone(),
            created_at: now,
            expires_at: now + self.config.group_lifetime(),
        };
        self.store.insert(Table::Groups, encode_row(&group)?).await?;
        self.add_member(&group.id, &user.id).await?;

        info!(group_id = %group.id, code = %group.code, "Group created");
        Ok(group)
    }

    /// Join the unexpired group with this code (case-insensitive)
    #[instrument(skip(self))]
    pub async fn join_by_code(&self, code: &str) -> SocialResult<Group> {
        let result = self.try_join_by_code(code).await;
        match &result {
            Ok(group) => self.notify(Notice::success(format!("Joined group \"{}\"!", group.name))),
            Err(e) => {
                warn!(error = %e, "Failed to join group");
                self.notify_failure(e);
            }
        }
        result
    }

    async fn try_join_by_code(&self, code: &str) -> SocialResult<Group> {
        let user = self.current_user()?;
        let code = code.trim().to_uppercase();
        let now = self.clock.now_utc();

        let rows = self
            .store
            .query(Table::Groups, &Filter::new().eq("code", code.as_str()))
            .await?;
        let group = decode_rows::<Group>(rows)?
            .into_iter()
            .find(|group| !group.is_expired(now))
            .ok_or(SocialError::InvalidGroupCode)?;

        let existing = self
            .store
            .query(
                Table::GroupMembers,
                &Filter::new()
                    .eq("group_id", group.id.as_str())
                    .eq("user_id", &user.id),
            )
            .await?;
        if existing.is_empty() {
            self.add_member(&group.id, &user.id).await?;
        } else {
            debug!(group_id = %group.id, "Already a member");
        }
        Ok(group)
    }

    /// Members of a group, in join order
    pub async fn members(&self, group_id: &str) -> SocialResult<Vec<GroupMember>> {
        let rows = self
            .store
            .query(Table::GroupMembers, &Filter::new().eq("group_id", group_id))
            .await?;
        let mut members: Vec<GroupMember> = decode_rows(rows)?;
        members.sort_by_key(|member| member.joined_at);
        Ok(members)
    }

    /// Delete expired groups and their memberships, returning how many groups went
    #[instrument(skip(self))]
    pub async fn purge_expired(&self) -> SocialResult<usize> {
        let now = self.clock.now_utc();
        let rows = self.store.query(Table::Groups, &Filter::new()).await?;
        let expired: Vec<String> = decode_rows::<Group>(rows)?
            .into_iter()
            .filter(|group| group.is_expired(now))
            .map(|group| group.id)
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        self.store
            .delete(
                Table::GroupMembers,
                &Filter::new().in_list("group_id", expired.iter().map(String::as_str)),
            )
            .await?;
        let removed = self
            .store
            .delete(
                Table::Groups,
                &Filter::new().in_list("id", expired.iter().map(String::as_str)),
            )
            .await?;

        info!(removed, "Purged expired groups");
        Ok(removed)
    }

    async fn add_member(&self, group_id: &str, user_id: &UserId) -> SocialResult<()> {
        let member = GroupMember {
            group_id: group_id.to_string(),
            user_id: user_id.clone(),
            joined_at: self.clock.now_utc(),
        };
        self.store
            .insert(Table::GroupMembers, encode_row(&member)?)
            .await?;
        Ok(())
    }
}
