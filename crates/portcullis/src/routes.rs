//! Mounting the security endpoints.

use axum::Router;
use axum::routing::{get, post};

use crate::callback::callback_handler;
use crate::engine::SecurityEngine;
use crate::logout::logout_handler;
use crate::single_logout::back_channel_logout_handler;

/// Router with the callback, logout and (when configured) back-channel
/// logout endpoints at the paths of the `[routes]` configuration.
///
/// Merge it into the application router and install
/// [`SecurityEngine::session_layer`] around both.
pub fn security_routes<S>(engine: &SecurityEngine) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let paths = &engine.config().routes;
    let mut router = Router::new()
        .route(&paths.callback_path, get(callback_handler).post(callback_handler))
        .route(&paths.logout_path, get(logout_handler).post(logout_handler));
    if let Some(path) = &paths.back_channel_logout_path {
        router = router.route(path, post(back_channel_logout_handler));
    }
    log::debug!(
        "Mounted security routes: callback {}, logout {}",
        paths.callback_path,
        paths.logout_path
    );
    router.with_state(engine.clone())
}
