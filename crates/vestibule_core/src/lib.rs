//! Engine-independent portal compositing: which side of the portal the
//! viewer is on, what each of the two per-frame passes draws, and the
//! scene-facing event model.

pub mod compositor;
pub mod config;
pub mod error;
pub mod events;
pub mod layers;
pub mod portal;
pub mod surface;

pub use compositor::{
    ClipSet, FrameInput, FrameReport, MainPassClip, PassDescriptor, PassKind, PassTarget,
    PortalCompositor, RenderBackend,
};
pub use config::VestibuleConfig;
pub use error::{ConfigLoadError, PortalConfigError};
pub use layers::{LayerAssignments, LayerMask, MeshId, RenderLayer};
pub use portal::{
    update_viewer_side, ClippingHalfSpace, ClippingPlanes, HalfSpace, PortalFacing, PortalPlane,
    PortalState, ViewerState,
};
pub use surface::OffscreenSurface;
