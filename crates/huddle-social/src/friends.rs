//! Friend requests
//!
//! A request is a `pending` friendship row from the sender to the
//! recipient. Accepting flips it to `accepted` and adds the reciprocal row,
//! so each side's roster query finds the other.

use huddle_core::{
    Filter, Friendship, FriendshipStatus, Notice, Profile, Table, UserId, decode_rows, encode_row,
};
use tracing::{info, instrument, warn};

use crate::client::SocialClient;
use crate::error::{SocialError, SocialResult};

impl SocialClient {
    /// Send a friend request to the user registered under `email`
    #[instrument(skip(self))]
    pub async fn send_request_by_email(&self, email: &str) -> SocialResult<Friendship> {
        let result = self.try_send_request(email).await;
        match &result {
            Ok((_, name)) => {
                self.notify(Notice::success(format!("Friend request sent to {}!", name)))
            }
            Err(e) => {
                warn!(error = %e, "Failed to send friend request");
                self.notify_failure(e);
            }
        }
        result.map(|(friendship, _)| friendship)
    }

    async fn try_send_request(&self, email: &str) -> SocialResult<(Friendship, String)> {
        let user = self.current_user()?;
        let email = email.trim();

        let rows = self
            .store
            .query(Table::Profiles, &Filter::new().eq("email", email))
            .await?;
        let target = decode_rows::<Profile>(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| SocialError::UserNotFound(email.to_string()))?;
        if target.id == user.id {
            return Err(SocialError::CannotFriendSelf);
        }

        if self.relation_exists(&user.id, &target.id).await?
            || self.relation_exists(&target.id, &user.id).await?
        {
            return Err(SocialError::FriendshipExists);
        }

        let request = Friendship {
            user_id: user.id.clone(),
            friend_id: target.id.clone(),
            status: FriendshipStatus::Pending,
            created_at: self.clock.now_utc(),
        };
        self.store
            .insert(Table::Friendships, encode_row(&request)?)
            .await?;

        info!(to = %target.id, "Friend request sent");
        Ok((request, target.username))
    }

    /// Accept the pending request sent by `from`
    #[instrument(skip(self))]
    pub async fn accept_request(&self, from: &UserId) -> SocialResult<Friendship> {
        let user = self.current_user()?;
        let incoming = Filter::new()
            .eq("user_id", from)
            .eq("friend_id", &user.id)
            .eq("status", FriendshipStatus::Pending.as_str());

        let accepted = serde_json::json!({ "status": FriendshipStatus::Accepted.as_str() });
        let updated = self
            .store
            .update(Table::Friendships, &incoming, accepted)
            .await?;
        if updated == 0 {
            return Err(SocialError::RequestNotFound(from.to_string()));
        }

        let reciprocal = Friendship {
            user_id: user.id.clone(),
            friend_id: from.clone(),
            status: FriendshipStatus::Accepted,
            created_at: self.clock.now_utc(),
        };
        self.store
            .upsert(Table::Friendships, encode_row(&reciprocal)?)
            .await?;

        info!(friend = %from, "Friend request accepted");
        Ok(reciprocal)
    }

    /// Requests waiting for the signed-in user's answer, oldest first
    pub async fn pending_requests(&self) -> SocialResult<Vec<Friendship>> {
        let user = self.current_user()?;
        let rows = self
            .store
            .query(
                Table::Friendships,
                &Filter::new()
                    .eq("friend_id", &user.id)
                    .eq("status", FriendshipStatus::Pending.as_str()),
            )
            .await?;
        let mut requests: Vec<Friendship> = decode_rows(rows)?;
        requests.sort_by_key(|request| request.created_at);
        Ok(requests)
    }

    async fn relation_exists(&self, from: &UserId, to: &UserId) -> SocialResult<bool> {
        let rows = self
            .store
            .query(
                Table::Friendships,
                &Filter::new().eq("user_id", from).eq("friend_id", to),
            )
            .await?;
        Ok(!rows.is_empty())
    }
}
