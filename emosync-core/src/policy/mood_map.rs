//! Mood-map policy: valence/arousal scatter placement and point interaction.
//!
//! Valence `[-1, 1]` runs left → right, arousal `[0, 1]` runs bottom → top.
//! The area uses a y-up coordinate system anchored at its bottom-left corner.
//!
//! Interaction per point:
//!
//! ```text
//! Idle ──enter──► Hover ──exit──► Idle
//!                   │
//!                 click
//!                   ▼
//!                Pinned ──click──► Idle
//! ```
//!
//! At most one point is pinned. Exit events never move a point out of
//! `Pinned`.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::trace;

use crate::config::MoodMapConfig;
use crate::types::HistorySample;

/// Rectangle the mood map is drawn into (y-up).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoodArea {
    /// X of the left edge.
    pub left: f32,
    /// Y of the bottom edge.
    pub bottom: f32,
    /// Width (≥ 0).
    pub width: f32,
    /// Height (≥ 0).
    pub height: f32,
}

impl MoodArea {
    /// Build an area; negative extents are treated as zero.
    #[must_use]
    pub fn new(left: f32, bottom: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            bottom,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    /// Place a valence/arousal pair. `None` if either input is not finite.
    #[must_use]
    pub fn place(&self, valence: f32, arousal: f32) -> Option<(f32, f32)> {
        if !valence.is_finite() || !arousal.is_finite() {
            return None;
        }
        let fx = (valence.clamp(-1.0, 1.0) + 1.0) / 2.0;
        let fy = arousal.clamp(0.0, 1.0);
        let x = (self.left + fx * self.width).clamp(self.left, self.right());
        let y = (self.bottom + fy * self.height).clamp(self.bottom, self.top());
        Some((x, y))
    }

    /// X of the right edge.
    #[must_use]
    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    /// Y of the top edge.
    #[must_use]
    pub fn top(&self) -> f32 {
        self.bottom + self.height
    }
}

/// Stable identifier of a plotted point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointId(pub u64);

/// Interaction state of one point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointState {
    /// Not under the pointer, not pinned.
    Idle,
    /// Under the pointer.
    Hover,
    /// Selected by click.
    Pinned,
}

/// A sample placed on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct PlottedPoint {
    /// Point identifier.
    pub id: PointId,
    /// Source sample.
    pub sample: HistorySample,
    /// Horizontal position.
    pub x: f32,
    /// Vertical position.
    pub y: f32,
}

/// Fading detail panel shown for the hovered or pinned point.
#[derive(Debug, Clone)]
pub struct DetailOverlay {
    opacity: f32,
    idle: Duration,
    fade_in: Duration,
    fade_out: Duration,
    idle_delay: Duration,
}

impl DetailOverlay {
    /// Build from configuration.
    #[must_use]
    pub fn new(config: &MoodMapConfig) -> Self {
        Self {
            opacity: 0.0,
            idle: Duration::ZERO,
            fade_in: Duration::from_millis(config.fade_in_ms),
            fade_out: Duration::from_millis(config.fade_out_ms),
            idle_delay: Duration::from_millis(config.idle_delay_ms),
        }
    }

    /// Current opacity in `[0, 1]`.
    #[must_use]
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Whether any part of the overlay is showing.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.opacity > 0.0
    }

    /// Advance by `dt`. `active` is true while something is hovered or pinned.
    pub fn update(&mut self, active: bool, dt: Duration) {
        if active {
            self.idle = Duration::ZERO;
            self.opacity = (self.opacity + step(dt, self.fade_in)).min(1.0);
            return;
        }
        if self.opacity <= 0.0 {
            return;
        }
        self.idle = self.idle.saturating_add(dt);
        if self.idle >= self.idle_delay {
            self.opacity = (self.opacity - step(dt, self.fade_out)).max(0.0);
        }
    }
}

fn step(dt: Duration, over: Duration) -> f32 {
    if over.is_zero() {
        1.0
    } else {
        dt.as_secs_f32() / over.as_secs_f32()
    }
}

/// Bounded scatter of history samples with hover/pin interaction.
#[derive(Debug, Clone)]
pub struct MoodMap {
    area: MoodArea,
    capacity: usize,
    points: VecDeque<PlottedPoint>,
    next_id: u64,
    hovered: Option<PointId>,
    pinned: Option<PointId>,
    overlay: DetailOverlay,
}

impl MoodMap {
    /// Empty map over `area`.
    #[must_use]
    pub fn new(area: MoodArea, config: &MoodMapConfig) -> Self {
        Self {
            area,
            capacity: config.capacity.max(1),
            points: VecDeque::new(),
            next_id: 0,
            hovered: None,
            pinned: None,
            overlay: DetailOverlay::new(config),
        }
    }

    /// Replace the whole history. Samples are ordered by time; only the
    /// newest `capacity` plottable samples are kept. Returns how many were
    /// plotted.
    pub fn plot<I>(&mut self, samples: I) -> usize
    where
        I: IntoIterator<Item = HistorySample>,
    {
        self.points.clear();
        self.hovered = None;
        self.pinned = None;

        let mut samples: Vec<HistorySample> = samples.into_iter().filter(HistorySample::is_plottable).collect();
        samples.sort_by_key(|s| s.timestamp);
        let skip = samples.len().saturating_sub(self.capacity);
        for sample in samples.into_iter().skip(skip) {
            self.push(sample);
        }
        self.points.len()
    }

    /// Append one sample, dropping the oldest beyond capacity.
    /// Non-plottable samples are skipped (`None`).
    pub fn push(&mut self, sample: HistorySample) -> Option<PointId> {
        let (x, y) = self.area.place(sample.valence, sample.arousal)?;
        let id = PointId(self.next_id);
        self.next_id += 1;
        self.points.push_back(PlottedPoint { id, sample, x, y });

        while self.points.len() > self.capacity {
            if let Some(dropped) = self.points.pop_front() {
                trace!(id = dropped.id.0, "Dropped oldest mood sample");
                if self.hovered == Some(dropped.id) {
                    self.hovered = None;
                }
                if self.pinned == Some(dropped.id) {
                    self.pinned = None;
                }
            }
        }
        Some(id)
    }

    /// Move the map to a new area, re-placing every point.
    pub fn resize(&mut self, area: MoodArea) {
        self.area = area;
        for p in &mut self.points {
            if let Some((x, y)) = area.place(p.sample.valence, p.sample.arousal) {
                p.x = x;
                p.y = y;
            }
        }
    }

    /// Plotted points, oldest first.
    pub fn points(&self) -> impl Iterator<Item = &PlottedPoint> {
        self.points.iter()
    }

    /// Number of plotted points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether nothing is plotted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Look up a point.
    #[must_use]
    pub fn get(&self, id: PointId) -> Option<&PlottedPoint> {
        self.points.iter().find(|p| p.id == id)
    }

    /// Drawing area.
    #[must_use]
    pub fn area(&self) -> MoodArea {
        self.area
    }

    /// Interaction state of `id`.
    #[must_use]
    pub fn state_of(&self, id: PointId) -> PointState {
        if self.pinned == Some(id) {
            PointState::Pinned
        } else if self.hovered == Some(id) {
            PointState::Hover
        } else {
            PointState::Idle
        }
    }

    /// The pinned point, if any.
    #[must_use]
    pub fn pinned(&self) -> Option<PointId> {
        self.pinned
    }

    /// Pointer entered `id`.
    pub fn pointer_enter(&mut self, id: PointId) -> PointState {
        if self.get(id).is_some() {
            self.hovered = Some(id);
        }
        self.state_of(id)
    }

    /// Pointer left `id`. A pinned point stays pinned.
    pub fn pointer_exit(&mut self, id: PointId) -> PointState {
        if self.hovered == Some(id) {
            self.hovered = None;
        }
        self.state_of(id)
    }

    /// Click on `id`: pins it (unpinning any other), or unpins it if it was pinned.
    pub fn click(&mut self, id: PointId) -> PointState {
        if self.get(id).is_none() {
            return PointState::Idle;
        }
        if self.pinned == Some(id) {
            self.pinned = None;
            if self.hovered == Some(id) {
                self.hovered = None;
            }
        } else {
            self.pinned = Some(id);
        }
        self.state_of(id)
    }

    /// Point whose details the overlay shows: hover wins over pin.
    #[must_use]
    pub fn detail_target(&self) -> Option<&PlottedPoint> {
        self.hovered.or(self.pinned).and_then(|id| self.get(id))
    }

    /// Advance overlay fading.
    pub fn tick(&mut self, dt: Duration) {
        let active = self.hovered.is_some() || self.pinned.is_some();
        self.overlay.update(active, dt);
    }

    /// Detail overlay.
    #[must_use]
    pub fn overlay(&self) -> &DetailOverlay {
        &self.overlay
    }
}
