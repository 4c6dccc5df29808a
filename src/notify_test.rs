use std::sync::{Arc, Mutex};

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use super::*;

/// Records the level of every event it sees.
#[derive(Clone, Default)]
struct LevelLog(Arc<Mutex<Vec<Level>>>);

impl<S: Subscriber> Layer<S> for LevelLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.0.lock().unwrap().push(*event.metadata().level());
    }
}

fn levels_for(notification: Notification) -> Vec<Level> {
    let log = LevelLog::default();
    let subscriber = tracing_subscriber::registry().with(log.clone());
    tracing::subscriber::with_default(subscriber, || TracingNotifier.notify(notification));
    log.0.lock().unwrap().clone()
}

#[test]
fn constructors_set_level_and_title() {
    let ok = Notification::success("Signed in");
    assert_eq!(ok.level, NotificationLevel::Success);
    assert_eq!(ok.title, "Success");

    let err = Notification::error("Sign-in failed");
    assert_eq!(err.level, NotificationLevel::Error);
    assert_eq!(err.title, "Error");
    assert_eq!(err.message, "Sign-in failed");
}

#[test]
fn tracing_notifier_logs_success_at_info() {
    assert_eq!(levels_for(Notification::success("Account created")), vec![Level::INFO]);
}

#[test]
fn tracing_notifier_logs_error_at_warn() {
    assert_eq!(levels_for(Notification::error("Registration failed")), vec![Level::WARN]);
}
