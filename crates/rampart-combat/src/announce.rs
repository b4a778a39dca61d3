//! Countdown announcements for timed region events.

use rampart_common::RegionId;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::events::{MessageKey, ServerMessage};
use crate::ports::{BroadcastScope, SessionSink};
use crate::region::RegionDirectory;
use crate::scheduler::{DelayedEventScheduler, EventId};

/// One notice broadcast at an offset from scheduling time.
#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    /// Delay from scheduling
    pub offset: Duration,
    /// Localisation key
    pub key: MessageKey,
    /// Substitution parameters
    pub params: Vec<String>,
}

impl Announcement {
    /// Creates an announcement with no parameters.
    #[must_use]
    pub const fn new(offset: Duration, key: MessageKey) -> Self {
        Self {
            offset,
            key,
            params: Vec::new(),
        }
    }

    /// Appends a parameter.
    #[must_use]
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Announcements counting down to an event `lead` away, one per entry in
    /// `marks` (time left when announced). Each carries the seconds left.
    #[must_use]
    pub fn countdown(lead: Duration, marks: &[Duration], key: &MessageKey) -> Vec<Self> {
        marks
            .iter()
            .filter(|mark| **mark <= lead)
            .map(|mark| Self::new(lead - *mark, key.clone()).with_param(mark.as_secs().to_string()))
            .collect()
    }
}

/// Schedules every step of a countdown against `region`.
///
/// A step whose region has been torn down by the time it fires is dropped.
pub fn schedule_countdown(
    scheduler: &DelayedEventScheduler,
    directory: &Arc<dyn RegionDirectory>,
    sessions: &Arc<dyn SessionSink>,
    region: RegionId,
    steps: Vec<Announcement>,
) -> Vec<EventId> {
    steps
        .into_iter()
        .map(|step| {
            let directory = Arc::clone(directory);
            let sessions = Arc::clone(sessions);
            scheduler.schedule("announcement", step.offset, move || {
                if directory.region(region).is_none() {
                    warn!(region = %region, "Announcement for a closed region");
                    return;
                }
                sessions.broadcast(
                    region,
                    ServerMessage::notice(step.key, step.params),
                    BroadcastScope::Everyone,
                );
            })
        })
        .collect()
}
