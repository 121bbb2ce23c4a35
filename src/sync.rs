//! Reconciles zoom/rotation/scroll when the primary layer of a PlotView
//! changes, so the sky view on screen stays visually unchanged. The
//! decision functions are pure; the watcher is an explicit state machine
//! advanced by completion events correlated strictly by plot id.

use std::time::{Duration, Instant};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::geom::ImagePt;
use crate::view::zoom::ZoomPolicy;
use crate::view::{ActionScope, Plot, PlotId, PlotViewArena, Rotation, ViewError};

/// Plate scales and zoom levels closer than this count as equal.
const MATCH_TOLERANCE: f64 = 0.01;

/// Whether (and how) the new prime plot must re-zoom to preserve the
/// apparent scale of the old one.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoomDecision {
    pub zoom: bool,
    /// Matching by sky scale (plots differ in native resolution) rather
    /// than by nominal level.
    pub zoom_by_scale: bool,
    pub target_level: f64,
}

impl ZoomDecision {
    fn no_change(level: f64) -> Self {
        Self { zoom: false, zoom_by_scale: false, target_level: level }
    }
}

/// Decide how the new prime must re-zoom relative to the old one.
pub fn zoom_decision(old: &Plot, new: &Plot) -> ZoomDecision {
    let same_dims =
        old.data_width == new.data_width && old.data_height == new.data_height;
    let same_level = (old.zoom_factor - new.zoom_factor).abs() < MATCH_TOLERANCE;

    match (old.pixel_scale_arcsec(), new.pixel_scale_arcsec()) {
        (Some(old_scale), Some(new_scale)) => {
            if (old_scale - new_scale).abs() < MATCH_TOLERANCE {
                if same_dims && same_level {
                    ZoomDecision::no_change(new.zoom_factor)
                } else {
                    // same sky resolution: the old nominal level transfers
                    ZoomDecision {
                        zoom: true,
                        zoom_by_scale: false,
                        target_level: old.zoom_factor,
                    }
                }
            } else {
                // different native resolution: match the displayed sky
                // scale, not the nominal level
                let displayed = old_scale / old.zoom_factor;
                let target = ZoomPolicy::zoom_level_for_scale(new, displayed)
                    .unwrap_or(old.zoom_factor);
                ZoomDecision { zoom: true, zoom_by_scale: true, target_level: target }
            }
        }
        // no projection on one side: dims + level equality is all we have
        _ => {
            if same_dims && same_level {
                ZoomDecision::no_change(new.zoom_factor)
            } else {
                ZoomDecision { zoom: true, zoom_by_scale: false, target_level: old.zoom_factor }
            }
        }
    }
}

/// Rotation (if any) the new prime must adopt, issued single-scope before
/// any zoom. Fixed angles only differ when their floors differ.
pub fn rotation_decision(old: &Plot, new: &Plot) -> Option<Rotation> {
    let needed = match (old.rotation, new.rotation) {
        (Rotation::NorthUp, Rotation::NorthUp) => false,
        (Rotation::NorthUp, _) | (_, Rotation::NorthUp) => true,
        (Rotation::Angle(a), Rotation::Angle(b)) => a.floor() != b.floor(),
        (Rotation::Unrotated, Rotation::Unrotated) => false,
        (Rotation::Angle(_), Rotation::Unrotated)
        | (Rotation::Unrotated, Rotation::Angle(_)) => true,
    };
    needed.then_some(old.rotation)
}

/// Async completion/failure events from the host's rotate/zoom pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PlotEvent {
    RotateCompleted { plot_id: PlotId },
    ZoomCompleted { plot_id: PlotId },
    ActionFailed { plot_id: PlotId },
    PlotRemoved { plot_id: PlotId },
}

impl PlotEvent {
    pub fn plot_id(&self) -> PlotId {
        match *self {
            PlotEvent::RotateCompleted { plot_id }
            | PlotEvent::ZoomCompleted { plot_id }
            | PlotEvent::ActionFailed { plot_id }
            | PlotEvent::PlotRemoved { plot_id } => plot_id,
        }
    }
}

/// Commands the synchronizer emits: the same rotate/zoom/scroll a user
/// could issue manually.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SyncCommand {
    Rotate { plot_id: PlotId, scope: ActionScope, rotation: Rotation },
    Zoom { plot_id: PlotId, scope: ActionScope, level: f64, by_scale: bool },
    Scroll { plot_id: PlotId, x: f64, y: f64 },
}

#[derive(Clone, Copy, Debug)]
pub struct SyncOptions {
    /// Upper bound on how long a watcher waits for a completion event.
    pub timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(30) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WatchState {
    WaitingForRotate,
    WaitingForZoom,
}

/// One in-flight prime change. Watchers run concurrently and
/// independently; a superseded or orphaned watcher takes no further
/// action, in particular it never applies a stale scroll correction.
struct PrimeChangeWatcher {
    plot_id: PlotId,
    captured: ImagePt,
    old_plot: Plot,
    state: WatchState,
    deadline: Instant,
}

/// Drives prime-change reconciliation across all PlotViews.
#[derive(Default)]
pub struct PlotGroupSynchronizer {
    options: SyncOptions,
    watchers: Vec<PrimeChangeWatcher>,
}

impl PlotGroupSynchronizer {
    pub fn new(options: SyncOptions) -> Self {
        Self { options, watchers: Vec::new() }
    }

    pub fn active_watchers(&self) -> usize {
        self.watchers.len()
    }

    /// Change the prime layer of a view. Captures the image point under
    /// the scroll anchor, applies the prime switch, and returns the
    /// commands to dispatch now. When a rotate or zoom is required, a
    /// watcher waits for its completion event before the scroll
    /// correction is issued.
    pub fn change_prime(
        &mut self,
        arena: &mut PlotViewArena,
        plot_id: PlotId,
        new_prime: usize,
        now: Instant,
    ) -> Result<Vec<SyncCommand>, ViewError> {
        let view = arena.view_mut(plot_id).ok_or(ViewError::UnknownPlotView(plot_id))?;
        let old_plot = view.prime().ok_or(ViewError::NoLayers(plot_id))?.clone();
        let captured = view
            .find_current_center_point()
            .ok_or(ViewError::NoLayers(plot_id))?;
        view.set_prime(new_prime)?;
        let new_plot = view.prime().ok_or(ViewError::NoLayers(plot_id))?.clone();

        // a newer prime change supersedes any in-flight watcher
        let before = self.watchers.len();
        self.watchers.retain(|w| w.plot_id != plot_id);
        if self.watchers.len() != before {
            debug!("{plot_id}: prime change superseded an in-flight watcher");
        }

        let mut commands = Vec::new();

        if let Some(rotation) = rotation_decision(&old_plot, &new_plot) {
            commands.push(SyncCommand::Rotate {
                plot_id,
                scope: ActionScope::Single,
                rotation,
            });
            self.watchers.push(PrimeChangeWatcher {
                plot_id,
                captured,
                old_plot,
                state: WatchState::WaitingForRotate,
                deadline: now + self.options.timeout,
            });
            return Ok(commands);
        }

        let decision = zoom_decision(&old_plot, &new_plot);
        if decision.zoom {
            commands.push(SyncCommand::Zoom {
                plot_id,
                scope: ActionScope::Single,
                level: decision.target_level,
                by_scale: decision.zoom_by_scale,
            });
            self.watchers.push(PrimeChangeWatcher {
                plot_id,
                captured,
                old_plot,
                state: WatchState::WaitingForZoom,
                deadline: now + self.options.timeout,
            });
            return Ok(commands);
        }

        if let Some(scroll) = scroll_correction(arena, plot_id, captured) {
            commands.push(scroll);
        }
        Ok(commands)
    }

    /// Feed one event from the shared stream. Returns follow-up commands.
    pub fn on_event(
        &mut self,
        arena: &PlotViewArena,
        event: &PlotEvent,
        now: Instant,
    ) -> Vec<SyncCommand> {
        let mut out = Vec::new();
        let event_id = event.plot_id();

        self.watchers.retain_mut(|w| {
            if w.plot_id != event_id {
                return true;
            }
            if now > w.deadline {
                debug!("{event_id}: watcher timed out, abandoning");
                return false;
            }
            match (event, w.state) {
                (PlotEvent::ActionFailed { .. }, _) | (PlotEvent::PlotRemoved { .. }, _) => {
                    debug!("{event_id}: rotate/zoom failed or plot removed, abandoning");
                    false
                }
                (PlotEvent::RotateCompleted { .. }, WatchState::WaitingForRotate) => {
                    // scale comparison depends on the post-rotation state
                    let Some(new_plot) = arena.view(w.plot_id).and_then(|v| v.prime()) else {
                        return false;
                    };
                    let decision = zoom_decision(&w.old_plot, new_plot);
                    if decision.zoom {
                        out.push(SyncCommand::Zoom {
                            plot_id: w.plot_id,
                            scope: ActionScope::Single,
                            level: decision.target_level,
                            by_scale: decision.zoom_by_scale,
                        });
                        w.state = WatchState::WaitingForZoom;
                        true
                    } else {
                        out.extend(scroll_correction(arena, w.plot_id, w.captured));
                        false
                    }
                }
                (PlotEvent::ZoomCompleted { .. }, WatchState::WaitingForZoom) => {
                    out.extend(scroll_correction(arena, w.plot_id, w.captured));
                    false
                }
                // unrelated completion for this plot: keep waiting
                _ => true,
            }
        });
        out
    }

    /// Drop watchers whose deadline passed. The host calls this on a
    /// coarse tick so an event that never arrives cannot pin a watcher.
    pub fn expire_stale(&mut self, now: Instant) {
        self.watchers.retain(|w| {
            if now > w.deadline {
                debug!("{}: watcher expired", w.plot_id);
                false
            } else {
                true
            }
        });
    }
}

/// Scroll offset that restores the captured image point under the scroll
/// anchor, against the view's current (post-rotate/zoom) state.
fn scroll_correction(
    arena: &PlotViewArena,
    plot_id: PlotId,
    captured: ImagePt,
) -> Option<SyncCommand> {
    let view = arena.view(plot_id)?;
    let scroll = view.find_scroll_pt_for_image_pt(captured)?;
    Some(SyncCommand::Scroll { plot_id, x: scroll.x, y: scroll.y })
}
