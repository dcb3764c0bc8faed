//! Custom tracing layers

use tracing::{Subscriber, span};
use tracing_subscriber::{
    layer::{Context, Layer},
    registry::LookupSpan,
};

use crate::context::{SessionContextData, SessionContextGuard};

/// Layer that attaches the active session context to new spans
///
/// When a [`SessionContextGuard`] is live on the creating thread, the span
/// gets a [`SessionContextExtension`] that later layers can read.
pub struct SessionContextLayer;

impl SessionContextLayer {
    /// Create a new session context layer
    pub fn new() -> Self {
        Self
    }
}

impl Default for SessionContextLayer {
    fn default() -> Self {
        Self::new()
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct SessionContextExtension {
    pub data: SessionContextData,
}

impl<S> Layer<S> for SessionContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        // Inherit from the parent when this thread has no guard of its own
        let data = SessionContextGuard::current().or_else(|| {
            span.parent().and_then(|parent| {
                let extensions = parent.extensions();
                extensions
                    .get::<SessionContextExtension>()
                    .map(|ext| ext.data.clone())
            })
        });

        if let Some(data) = data {
            span.extensions_mut().insert(SessionContextExtension { data });
        }
    }
}
