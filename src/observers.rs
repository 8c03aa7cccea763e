use rust_decimal::Decimal;
use tracing::info;

use crate::events::CirculationEvent;

/// Trait for circulation event observation
pub trait CirculationObserver {
    /// Called after a circulation change has been applied
    fn on_event(&self, event: &CirculationEvent);
}

/// Logs every circulation event
#[derive(Debug)]
pub struct CirculationLogger;

impl CirculationObserver for CirculationLogger {
    fn on_event(&self, event: &CirculationEvent) {
        info!(?event, "circulation");
    }
}

/// Emits member-facing notices for events a member should hear about
#[derive(Debug)]
pub struct NotificationService;

impl CirculationObserver for NotificationService {
    fn on_event(&self, event: &CirculationEvent) {
        match event {
            CirculationEvent::HandedOff { book_id, to, due_at, .. } => {
                info!(member = to, book = book_id, %due_at, "NOTIFICATION: reserved book is now on loan to you");
            }
            CirculationEvent::Returned { user_id, book_id, fine } if *fine > Decimal::ZERO => {
                info!(member = user_id, book = book_id, %fine, "NOTIFICATION: late return fine charged");
            }
            _ => {}
        }
    }
}
