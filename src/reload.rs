//! Reload hook invoked when a session is destroyed with `reload = true`.
//!
//! Hosts implement this as whatever "start over" means for them: a page
//! reload in a browser, returning to a login screen in a desktop app.

/// Action run after a session is torn down with a reload request.
pub trait Reload: Send + Sync {
    fn reload(&self);
}

/// Reload hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReload;

impl Reload for NoReload {
    fn reload(&self) {}
}

impl<F> Reload for F
where
    F: Fn() + Send + Sync,
{
    fn reload(&self) {
        self()
    }
}
