//! Profile lookups and the online flag

use huddle_core::{BackendError, Filter, Profile, Table, UserId, decode_rows};
use tracing::{debug, instrument};

use crate::client::SocialClient;
use crate::error::SocialResult;

impl SocialClient {
    /// Fetch a profile by user id
    pub async fn fetch_profile(&self, user_id: &UserId) -> SocialResult<Profile> {
        let rows = self
            .store
            .query(Table::Profiles, &Filter::new().eq("id", user_id))
            .await?;
        decode_rows::<Profile>(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("profile {}", user_id)).into())
    }

    /// Set the signed-in user's online flag and stamp `last_seen`
    #[instrument(skip(self))]
    pub async fn set_presence(&self, is_online: bool) -> SocialResult<()> {
        let user = self.current_user()?;
        let patch = Profile::presence_patch(is_online, self.clock.now_utc());
        let updated = self
            .store
            .update(Table::Profiles, &Filter::new().eq("id", &user.id), patch)
            .await?;
        if updated == 0 {
            return Err(BackendError::NotFound(format!("profile {}", user.id)).into());
        }
        debug!(is_online, "Presence flag updated");
        Ok(())
    }
}
