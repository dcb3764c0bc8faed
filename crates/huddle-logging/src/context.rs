//! Session context injection
//!
//! Thread-local storage for the signed-in user's context, so spans created
//! inside a session scope can be tagged with who they belong to.

use std::cell::RefCell;

use huddle_core::UserId;
use uuid::Uuid;

/// Session context data stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContextData {
    /// Short form of the signed-in user's id
    pub user_id: String,
    /// Unique id for this session (one per sign-in)
    pub instance_id: Uuid,
}

thread_local! {
    static SESSION_CONTEXT: RefCell<Option<SessionContextData>> = const { RefCell::new(None) };
}

/// RAII guard for session context
///
/// Creating the guard sets the session context for the current thread;
/// dropping it restores whatever was there before.
///
/// # Example
///
/// ```ignore
/// use huddle_logging::context::SessionContextGuard;
/// use huddle_core::UserId;
///
/// let _guard = SessionContextGuard::new(&UserId::new("alice"));
/// tracing::info!("Roster loaded");
/// ```
pub struct SessionContextGuard {
    previous: Option<SessionContextData>,
}

impl SessionContextGuard {
    /// Enter a fresh session scope for `user`
    pub fn new(user: &UserId) -> Self {
        Self::with_instance_id(user, Uuid::new_v4())
    }

    /// Enter a session scope with a known instance id
    pub fn with_instance_id(user: &UserId, instance_id: Uuid) -> Self {
        let previous = SESSION_CONTEXT.with(|ctx| ctx.borrow().clone());

        let new_ctx = SessionContextData {
            user_id: user.short_id(),
            instance_id,
        };
        SESSION_CONTEXT.with(|ctx| *ctx.borrow_mut() = Some(new_ctx));

        Self { previous }
    }

    /// Get the current session context (if any)
    pub fn current() -> Option<SessionContextData> {
        SESSION_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// Get the current user id (if set)
    pub fn current_user_id() -> Option<String> {
        Self::current().map(|ctx| ctx.user_id)
    }
}

impl Drop for SessionContextGuard {
    fn drop(&mut self) {
        SESSION_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// A span carrying the session fields, for use with `Instrument`
///
/// Async tasks hop threads, so the thread-local guard does not follow them;
/// instrumenting the task with this span does.
pub fn session_span(user: &UserId, instance_id: Uuid) -> tracing::Span {
    tracing::info_span!(
        "session",
        user_id = %user.short_id(),
        instance_id = %instance_id
    )
}
