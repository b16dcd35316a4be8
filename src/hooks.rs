use leptos::logging::warn;
use leptos::prelude::*;
use leptos::task::spawn_local;
use leptos_router::hooks::use_query_map;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::app::{get_board, get_pool};
use crate::error::error_text;
use crate::model::{Board, Pool};
use crate::poll::PollState;

pub const TV_POLL: Duration = Duration::from_millis(2500);
pub const ADMIN_POLL: Duration = Duration::from_millis(1600);
pub const POOL_POLL: Duration = Duration::from_millis(3000);

/// A polled resource. `refresh` forces an immediate fetch; it is how pages resync after a
/// mutation, since nothing is ever updated locally.
pub struct PollHandle<T: Send + Sync + 'static> {
    state: RwSignal<PollState<T>>,
    refresh: StoredValue<Arc<dyn Fn() + Send + Sync>>,
}

impl<T: Send + Sync + 'static> Clone for PollHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Send + Sync + 'static> Copy for PollHandle<T> {}

impl<T: Clone + Send + Sync + 'static> PollHandle<T> {
    pub fn data(&self) -> T {
        self.state.with(|s| s.data.clone())
    }

    pub fn with_data<U>(&self, f: impl FnOnce(&T) -> U) -> U {
        self.state.with(|s| f(&s.data))
    }

    pub fn loading(&self) -> bool {
        self.state.with(|s| s.loading())
    }

    pub fn error(&self) -> Option<String> {
        self.state.with(|s| s.error.clone())
    }

    /// Does nothing once the owning component is gone.
    pub fn refresh(&self) {
        if let Some(refresh) = self.refresh.try_get_value() {
            refresh();
        }
    }
}

type Spawn = fn(Pin<Box<dyn Future<Output = ()>>>);

/// Stops a running timer.
type StopTimer = Box<dyn FnOnce() + Send + Sync>;

/// Builds the handle without starting anything. Each refresh calls `fetch` and hands the
/// response future to `spawn`; responses landing after unmount or behind a newer one are
/// dropped.
fn polling<T, F, Fut>(initial: T, fetch: F, spawn: Spawn) -> PollHandle<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, String>> + 'static,
{
    let state = RwSignal::new(PollState::new(initial));

    let refresh: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
        let Some(seq) = state.try_update(|s| s.begin()) else {
            return;
        };
        let request = fetch();
        spawn(Box::pin(async move {
            let result = request.await;
            if let Err(e) = &result {
                warn!("Poll failed: {e}");
            }
            let _ = state.try_update(|s| s.complete(seq, result));
        }));
    });

    PollHandle {
        state,
        refresh: StoredValue::new(refresh),
    }
}

/// Fetches immediately, then on every tick of the timer `every` starts. The timer is stopped
/// when the current owner is cleaned up.
fn mount<T>(handle: PollHandle<T>, every: impl FnOnce(Box<dyn Fn()>) -> StopTimer)
where
    T: Clone + Send + Sync + 'static,
{
    handle.refresh();
    let stop = every(Box::new(move || handle.refresh()));
    on_cleanup(stop);
}

/// Fetches once on mount, then every `period` until the calling component is unmounted.
/// Results that arrive after unmount, or after a newer fetch already landed, are dropped.
pub fn use_polling<T, F, Fut>(initial: T, period: Duration, fetch: F) -> PollHandle<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, String>> + 'static,
{
    let handle = polling(initial, fetch, |request| spawn_local(request));

    // Effects only run in the browser, so the server renders the empty state and never polls.
    Effect::new(move || {
        mount(handle, |tick| -> StopTimer {
            match set_interval_with_handle(move || tick(), period) {
                Ok(interval) => Box::new(move || interval.clear()),
                Err(e) => {
                    warn!("Could not start polling: {e:?}");
                    Box::new(|| ())
                }
            }
        })
    });

    handle
}

pub fn use_board(event_id: Option<String>, period: Duration) -> PollHandle<Board> {
    use_polling(Board::default(), period, move || {
        let event_id = event_id.clone();
        async move {
            get_board(event_id)
                .await
                .map_err(|e| error_text(&e.to_string()))
        }
    })
}

pub fn use_pool(event_id: Option<String>, period: Duration) -> PollHandle<Pool> {
    use_polling(Pool::default(), period, move || {
        let event_id = event_id.clone();
        async move {
            get_pool(event_id)
                .await
                .map_err(|e| error_text(&e.to_string()))
        }
    })
}

/// The `?event=` override for this page load, if any. The server falls back to its default.
pub fn use_event_id() -> Option<String> {
    let query = use_query_map();
    query
        .with_untracked(|q| q.get("event"))
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use leptos::reactive::owner::Owner;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::task::{self, LocalSet};

    fn spawn_on_tokio(request: Pin<Box<dyn Future<Output = ()>>>) {
        task::spawn_local(request);
    }

    async fn settle() {
        for _ in 0..4 {
            task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_polling_lifecycle() {
        LocalSet::new()
            .run_until(async {
                let owner = Owner::new();
                let fetches = Arc::new(AtomicUsize::new(0));
                let stopped = Arc::new(AtomicBool::new(false));
                let ticker: Rc<RefCell<Option<Box<dyn Fn()>>>> = Rc::new(RefCell::new(None));
                let tick = {
                    let ticker = ticker.clone();
                    move || {
                        if let Some(tick) = ticker.borrow().as_ref() {
                            tick();
                        }
                    }
                };

                let handle = owner.with(|| {
                    let counter = fetches.clone();
                    let handle = polling(
                        0,
                        move || {
                            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                            async move { Ok(n) }
                        },
                        spawn_on_tokio,
                    );
                    let stopped = stopped.clone();
                    let ticker = ticker.clone();
                    mount(handle, move |every_tick| -> StopTimer {
                        *ticker.borrow_mut() = Some(every_tick);
                        Box::new(move || stopped.store(true, Ordering::SeqCst))
                    });
                    handle
                });

                // Mounting fetches exactly once, right away.
                assert_eq!(fetches.load(Ordering::SeqCst), 1);
                settle().await;
                assert_eq!(handle.state.with_untracked(|s| s.data), 1);
                assert!(!handle.state.with_untracked(|s| s.loading()));

                tick();
                tick();
                assert_eq!(fetches.load(Ordering::SeqCst), 3);
                settle().await;
                assert_eq!(handle.state.with_untracked(|s| s.data), 3);

                // A fetch still in flight at unmount lands on a disposed signal and is dropped.
                tick();
                assert_eq!(fetches.load(Ordering::SeqCst), 4);
                owner.cleanup();
                assert!(stopped.load(Ordering::SeqCst));
                settle().await;

                // Late ticks and manual refreshes after unmount never fetch again.
                tick();
                handle.refresh();
                settle().await;
                assert_eq!(fetches.load(Ordering::SeqCst), 4);
            })
            .await;
    }

    #[tokio::test]
    async fn test_refresh_after_failure_keeps_data() {
        LocalSet::new()
            .run_until(async {
                let owner = Owner::new();
                let calls = Arc::new(AtomicUsize::new(0));
                let handle = owner.with(|| {
                    let calls = calls.clone();
                    polling(
                        "empty".to_string(),
                        move || {
                            let n = calls.fetch_add(1, Ordering::SeqCst);
                            async move {
                                match n {
                                    0 => Ok("board".to_string()),
                                    _ => Err("timed out".to_string()),
                                }
                            }
                        },
                        spawn_on_tokio,
                    )
                });

                handle.refresh();
                settle().await;
                handle.refresh();
                settle().await;
                handle.state.with_untracked(|s| {
                    assert_eq!(s.data, "board");
                    assert_eq!(s.error.as_deref(), Some("timed out"));
                });
                owner.cleanup();
            })
            .await;
    }
}
