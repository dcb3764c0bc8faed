//! The social client shared by groups, friends, pings and profiles

use std::sync::Arc;

use huddle_core::{AuthError, AuthProvider, AuthUser, Clock, Notice, Notifier, Store, SystemClock};

use crate::config::SocialConfig;
use crate::error::{SocialError, SocialResult};

/// Social operations for the signed-in user
///
/// Each operation reads the current user from the auth provider, so one
/// client survives sign-out and sign-in.
pub struct SocialClient {
    pub(crate) auth: Arc<dyn AuthProvider>,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: SocialConfig,
}

impl SocialClient {
    /// Create a client with the default config and the system clock
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            auth,
            store,
            notifier,
            clock: Arc::new(SystemClock),
            config: SocialConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: SocialConfig) -> SocialResult<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn config(&self) -> &SocialConfig {
        &self.config
    }

    pub(crate) fn current_user(&self) -> SocialResult<AuthUser> {
        self.auth
            .current_user()
            .ok_or(SocialError::Auth(AuthError::NotSignedIn))
    }

    /// Surface a failed operation to the user
    pub(crate) fn notify_failure(&self, error: &SocialError) {
        self.notifier.notify(Notice::error(error.user_message()));
    }

    pub(crate) fn notify(&self, notice: Notice) {
        self.notifier.notify(notice);
    }
}
