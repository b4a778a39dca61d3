//! Hit requests and the per-target queue that serialises them.
//!
//! Any number of producers push onto a target's [`HitQueue`]; exactly one
//! of them at a time drains it. A producer that loses the race leaves its
//! request for the current drainer, and the drainer re-checks the channel
//! after releasing so nothing is stranded between the last `try_recv` and
//! the release.

use crossbeam_channel::{unbounded, Receiver, Sender};
use rampart_common::{EntityId, MapPosition};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::broadcast::HitOutcome;
use crate::skill::{ComboDefinition, Skill};

/// A pending damage application against one target.
#[derive(Debug, Clone)]
pub struct HitRequest {
    /// Combatant that cast the skill
    pub source: EntityId,
    /// Skill being applied
    pub skill: Arc<Skill>,
    /// Hit shape
    pub kind: HitOutcome,
    /// Ground cell for zone hits
    pub zone: Option<MapPosition>,
    /// Combo stage reached by the cast
    pub combo: Option<ComboDefinition>,
    /// Effect replacing the skill's own
    pub effect_override: Option<u16>,
    /// Also play the cast animation on the target
    pub show_target_animation: bool,
}

impl HitRequest {
    /// Creates a request of the given shape.
    #[must_use]
    pub fn new(source: EntityId, skill: Arc<Skill>, kind: HitOutcome) -> Self {
        Self {
            source,
            skill,
            kind,
            zone: None,
            combo: None,
            effect_override: None,
            show_target_animation: false,
        }
    }

    /// Sets the ground cell.
    #[must_use]
    pub fn at(mut self, cell: MapPosition) -> Self {
        self.zone = Some(cell);
        self
    }

    /// Sets the combo stage.
    #[must_use]
    pub fn with_combo(mut self, combo: Option<ComboDefinition>) -> Self {
        self.combo = combo;
        self
    }

    /// Sets the effect override.
    #[must_use]
    pub fn with_effect(mut self, effect: Option<u16>) -> Self {
        self.effect_override = effect;
        self
    }

    /// Plays the cast animation on the target as well.
    #[must_use]
    pub fn showing_target_animation(mut self) -> Self {
        self.show_target_animation = true;
        self
    }

    /// Effect shown on impact.
    #[must_use]
    pub fn effect(&self) -> u16 {
        self.combo
            .map(|c| c.effect)
            .or(self.effect_override)
            .unwrap_or(self.skill.effect)
    }

    /// Animation shown on impact.
    #[must_use]
    pub fn animation(&self) -> u16 {
        self.combo
            .map_or(self.skill.attack_animation, |c| c.animation)
    }
}

/// Resets the drain token on scope exit, including unwinding.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// FIFO of hit requests against one target with a single active drainer.
#[derive(Debug)]
pub struct HitQueue {
    sender: Sender<HitRequest>,
    receiver: Receiver<HitRequest>,
    draining: AtomicBool,
}

impl Default for HitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl HitQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            draining: AtomicBool::new(false),
        }
    }

    /// Appends a request.
    pub fn push(&self, request: HitRequest) {
        // The receiver lives in `self`, so the channel cannot be disconnected.
        let _ = self.sender.send(request);
    }

    /// Number of requests waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Whether no requests are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Whether some caller is currently draining.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Drains pending requests in arrival order if no one else is.
    ///
    /// Returns how many requests this call processed; 0 means the queue was
    /// empty or another caller holds the drain.
    pub fn drain_with<F: FnMut(HitRequest)>(&self, mut handle: F) -> usize {
        let mut processed = 0;
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                return processed;
            }
            {
                let _guard = DrainGuard(&self.draining);
                while let Ok(request) = self.receiver.try_recv() {
                    handle(request);
                    processed += 1;
                }
            }
            if self.receiver.is_empty() {
                return processed;
            }
        }
    }
}
