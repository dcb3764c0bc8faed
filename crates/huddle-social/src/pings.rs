//! Pings: a nudge from one friend to another

use huddle_core::{Notice, Ping, Table, UserId, encode_row};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::client::SocialClient;
use crate::error::SocialResult;

impl SocialClient {
    /// Record a ping to `friend_id`
    ///
    /// The outcome is always notified; the error is returned as well.
    #[instrument(skip(self))]
    pub async fn ping(&self, friend_id: &UserId) -> SocialResult<Ping> {
        match self.try_ping(friend_id).await {
            Ok(ping) => {
                debug!(ping_id = %ping.id, "Ping sent");
                self.notify(Notice::success("Ping sent!"));
                Ok(ping)
            }
            Err(e) => {
                warn!(error = %e, "Error sending ping");
                self.notify(Notice::error("Failed to send ping"));
                Err(e)
            }
        }
    }

    async fn try_ping(&self, friend_id: &UserId) -> SocialResult<Ping> {
        let user = self.current_user()?;
        let ping = Ping {
            id: Uuid::new_v4().to_string(),
            from_user_id: user.id,
            to_user_id: friend_id.clone(),
            created_at: self.clock.now_utc(),
        };
        self.store.insert(Table::Pings, encode_row(&ping)?).await?;
        Ok(ping)
    }
}
