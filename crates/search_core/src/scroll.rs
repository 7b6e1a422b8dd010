//! Edge-triggered bridge between a scrollable results view and the search
//! controller. The view reports how visible its end-of-list sentinel is each
//! frame; the adapter decides when that should turn into a request for the
//! next page.

pub const DEFAULT_VISIBILITY_THRESHOLD: f32 = 0.1;

/// Identity of the sentinel element currently mounted in the view. Views
/// mint a fresh handle whenever they rebuild the results list, which re-arms
/// the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentinelHandle(pub u64);

/// One observation of the sentinel, taken by the view on its own cadence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSample {
    pub sentinel: SentinelHandle,
    /// Fraction of the sentinel inside the viewport, 0.0 to 1.0.
    pub visible_ratio: f32,
    pub has_more: bool,
    pub is_loading: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAction {
    Idle,
    LoadNextPage,
}

/// Fires [`ScrollAction::LoadNextPage`] exactly once each time the sentinel
/// becomes both visible and loadable. Staying visible does not re-fire; the
/// edge re-arms when a load starts, when visibility is lost, or when the
/// sentinel is replaced.
#[derive(Debug)]
pub struct ScrollTriggerAdapter {
    threshold: f32,
    watched: Option<SentinelHandle>,
    was_eligible: bool,
}

impl Default for ScrollTriggerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrollTriggerAdapter {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_VISIBILITY_THRESHOLD)
    }

    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            threshold,
            watched: None,
            was_eligible: false,
        }
    }

    /// Feed the latest observation. `None` means the view has no sentinel
    /// mounted right now, for example before the first search or while the
    /// results list is empty.
    pub fn observe(&mut self, sample: Option<ViewportSample>) -> ScrollAction {
        let Some(sample) = sample else {
            self.watched = None;
            self.was_eligible = false;
            return ScrollAction::Idle;
        };

        if self.watched != Some(sample.sentinel) {
            self.watched = Some(sample.sentinel);
            self.was_eligible = false;
        }

        let visible = sample.visible_ratio >= self.threshold;
        let eligible = visible && sample.has_more && !sample.is_loading;
        let rising = eligible && !self.was_eligible;
        self.was_eligible = eligible;

        if rising {
            ScrollAction::LoadNextPage
        } else {
            ScrollAction::Idle
        }
    }
}
