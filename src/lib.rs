//! Visualization core for a browser-based astronomical image / sky-survey
//! viewer.
//!
//! Everything here is the math and state a canvas-based frontend needs to
//! display FITS images and HiPS all-sky surveys:
//!
//! - [`projection`] -- orthographic (SIN) and Aitoff sky projections with
//!   direction-cosine rotation bases, plus the external-WCS seam for
//!   server-resolved image plots
//! - [`view`] -- plots, plot views, groups, and the
//!   [`CsysConverter`](view::CsysConverter) that moves points among image,
//!   world, screen and device coordinates
//! - [`view::zoom`] -- discrete zoom-level tables and plate-scale
//!   conversions
//! - [`hips`] -- visible HEALPix cell enumeration with seam handling and
//!   corner patching
//! - [`raster`] -- the raw-tile cache and nearest-neighbor compositor
//! - [`stretch`] -- the zscale stretch-range algorithm and its per-band
//!   cache
//! - [`sync`] -- the prime-change synchronizer reconciling zoom, rotation
//!   and scroll across layer switches
//!
//! All conversions return `Option` instead of failing: a point outside a
//! projection's domain simply has no representation and must not be drawn.
//! Server communication, tile fetching/decoding and UI live outside this
//! crate and talk to it through [`projection::WcsTransform`],
//! [`hips::HealpixGeometry`], the raw-tile cache writes and the
//! [`sync`] event/command protocol.

pub mod geom;
pub mod hips;
pub mod projection;
pub mod raster;
pub mod stretch;
pub mod sync;
pub mod view;

pub use geom::{AnyPt, CoordSys, DevicePt, Dim, ImagePt, ScreenPt, WorldPt};
pub use hips::{visible_hips_cells, CellFinderParams, HealpixGeometry, VisibleCell};
pub use projection::{PlotProjection, ProjectionKind, SkyProjection, WcsTransform};
pub use raster::{
    draw_screen_tile_to_main_canvas, make_thumbnail_canvas, Decimation, RasterCanvas,
    RawTileCache,
};
pub use stretch::{zscale, Band, StretchCache, StretchRange, ZscaleParams};
pub use sync::{
    rotation_decision, zoom_decision, PlotEvent, PlotGroupSynchronizer, SyncCommand,
    ZoomDecision,
};
pub use view::zoom::{zoom_to_string, FullType, ZoomDir, ZoomPolicy};
pub use view::{ActionScope, CsysConverter, Plot, PlotId, PlotKind, PlotView, PlotViewArena, Rotation};
