use std::sync::Arc;

use serde_json::Value;

/// A subscribed event handler.
///
/// Handlers are compared by `Arc` data pointer for unsubscribe purposes:
/// clones of one `Handler` are the same handler, separately wrapped closures
/// are distinct even when textually identical.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn same_handler(a: &Handler, b: &Handler) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
