//! Acceptance filters
//!
//! Client-side selection of data frames by identifier. A [`FilterList`]
//! evaluates its filters in order; the first match decides, frames that match
//! nothing pass.

use serde::{Deserialize, Serialize};

use crate::data_frame::DataFrame;
use crate::frame::Frame;

/// Result of a matching filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    #[default]
    Pass,
    Block,
}

/// CAN message filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFilter {
    /// Filter ID
    pub id: u32,
    /// Filter mask
    pub mask: u32,
    /// Apply to extended frames
    pub extended: bool,
    #[serde(default)]
    pub action: FilterAction,
}

impl FrameFilter {
    /// Create a new pass filter
    pub fn new(id: u32, mask: u32, extended: bool) -> Self {
        FrameFilter {
            id,
            mask,
            extended,
            action: FilterAction::Pass,
        }
    }

    /// Create a new block filter
    pub fn block(id: u32, mask: u32, extended: bool) -> Self {
        FrameFilter {
            action: FilterAction::Block,
            ..Self::new(id, mask, extended)
        }
    }

    /// Check if a frame matches this filter
    pub fn matches(&self, frame: &DataFrame) -> bool {
        // Extended flag must match
        if self.extended != frame.is_extended() {
            return false;
        }

        let frame_id = frame.id().raw();
        (frame_id & self.mask) == (self.id & self.mask)
    }
}

/// Ordered list of filters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterList {
    filters: Vec<FrameFilter>,
}

impl FilterList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: FrameFilter) {
        self.filters.push(filter);
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Decide whether a frame is delivered; error and API frames always pass
    pub fn accepts(&self, frame: &Frame) -> bool {
        let Frame::Data(data) = frame else {
            return true;
        };
        self.filters
            .iter()
            .find(|filter| filter.matches(data))
            .map_or(true, |filter| filter.action == FilterAction::Pass)
    }
}

impl FromIterator<FrameFilter> for FilterList {
    fn from_iter<I: IntoIterator<Item = FrameFilter>>(iter: I) -> Self {
        Self {
            filters: iter.into_iter().collect(),
        }
    }
}
