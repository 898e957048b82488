//! Iteration guard for the background loops
//!
//! Errors inside a loop iteration are handled where they occur. A panic is the
//! one failure that would otherwise take the whole task down, so every
//! iteration runs under [`isolate`], which logs it and lets the loop go on to
//! its next sleep.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Once;

use futures::FutureExt;

/// Where the last panic on this thread happened
#[derive(Debug)]
struct PanicReport {
    location: String,
    backtrace: String,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicReport>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Record location and backtrace of every panic, then defer to the
/// previously installed hook.
fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let backtrace = Backtrace::force_capture().to_string();
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(PanicReport { location, backtrace }));
            previous(info);
        }));
    });
}

fn take_panic_report() -> Option<PanicReport> {
    LAST_PANIC.with(|slot| slot.borrow_mut().take())
}

/// Run one loop iteration; a panic is logged and turned into `None`.
pub(crate) async fn isolate<F, T>(what: &'static str, iteration: F) -> Option<T>
where
    F: Future<Output = T>,
{
    install_panic_hook();

    match AssertUnwindSafe(iteration).catch_unwind().await {
        Ok(value) => Some(value),
        Err(panic) => {
            // The hook ran on the thread that polled the panicking future,
            // which is this one.
            let report = take_panic_report();
            let (location, backtrace) = match &report {
                Some(r) => (r.location.as_str(), r.backtrace.as_str()),
                None => ("unknown", ""),
            };
            tracing::error!(
                task = what,
                panic = %panic_message(panic.as_ref()),
                location,
                backtrace,
                "Iteration panicked, continuing with next cycle"
            );
            None
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
