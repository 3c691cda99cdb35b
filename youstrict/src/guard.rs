//! Navigation guard: which screens are reachable given the session state.
//!
//! The rule is a pure function of "is a session active" and the current
//! route. [`NavigationGuard`] re-applies it whenever either input changes.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::models::Route;
use crate::session::SessionStatus;

/// Segment of the protected watch screens.
const PROTECTED_SEGMENT: &str = "videos";

/// Where to send the user, or `None` to stay put.
pub fn redirect(active: bool, route: &Route) -> Option<Route> {
    match (active, route.segment()) {
        (true, None) => Some(Route::Videos),
        (false, Some(PROTECTED_SEGMENT)) => Some(Route::Root),
        _ => None,
    }
}

/// Imperative navigation the guard drives.
pub trait Router: Send + Sync {
    fn current(&self) -> Route;

    /// Replace the current route without pushing history.
    fn replace(&self, route: Route);

    fn subscribe(&self) -> watch::Receiver<Route>;
}

/// Apply the rule once. Returns the route that is current afterward.
pub fn enforce(active: bool, router: &dyn Router) -> Route {
    let current = router.current();
    match redirect(active, &current) {
        Some(target) => {
            info!(from = %current, to = %target, active, "Redirecting");
            router.replace(target.clone());
            target
        }
        None => current,
    }
}

/// Router that keeps the current route in memory.
#[derive(Debug)]
pub struct MemoryRouter {
    route: watch::Sender<Route>,
}

impl MemoryRouter {
    pub fn new(initial: Route) -> Self {
        let (route, _) = watch::channel(initial);
        Self { route }
    }
}

impl Default for MemoryRouter {
    fn default() -> Self {
        Self::new(Route::Root)
    }
}

impl Router for MemoryRouter {
    fn current(&self) -> Route {
        self.route.borrow().clone()
    }

    fn replace(&self, route: Route) {
        self.route.send_if_modified(|current| {
            if *current == route {
                false
            } else {
                *current = route;
                true
            }
        });
    }

    fn subscribe(&self) -> watch::Receiver<Route> {
        self.route.subscribe()
    }
}

/// Background task that keeps the router consistent with the session.
///
/// Dropping the guard stops the task.
#[derive(Debug)]
pub struct NavigationGuard {
    handle: JoinHandle<()>,
}

impl NavigationGuard {
    pub fn spawn(mut sessions: watch::Receiver<SessionStatus>, router: Arc<dyn Router>) -> Self {
        let mut routes = router.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                let active = sessions.borrow_and_update().is_active();
                routes.borrow_and_update();
                enforce(active, router.as_ref());

                tokio::select! {
                    changed = sessions.changed() => if changed.is_err() { break },
                    changed = routes.changed() => if changed.is_err() { break },
                }
            }
        });
        Self { handle }
    }
}

impl Drop for NavigationGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
