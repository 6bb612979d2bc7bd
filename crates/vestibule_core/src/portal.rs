use glam::{Quat, Vec3, Vec4};
use tracing::debug;

use crate::error::PortalConfigError;

const ORIENTATION_EPSILON: f32 = 1.0e-4;

/// The planar opening between the inside and outside environments.
///
/// The plane normal is `orientation * +Z` and points toward the outside
/// environment. A camera with a positive signed distance is outside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalPlane {
    position: Vec3,
    orientation: Quat,
    radius: f32,
}

impl PortalPlane {
    pub fn new(position: Vec3, orientation: Quat, radius: f32) -> Result<Self, PortalConfigError> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(PortalConfigError::InvalidRadius(radius));
        }
        if !position.is_finite() {
            return Err(PortalConfigError::NonFinitePosition);
        }
        if !orientation.is_finite() || orientation.length() < ORIENTATION_EPSILON {
            return Err(PortalConfigError::DegenerateOrientation);
        }

        Ok(Self {
            position,
            orientation: orientation.normalize(),
            radius,
        })
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn normal(&self) -> Vec3 {
        self.orientation * Vec3::Z
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        (point - self.position).dot(self.normal())
    }

    pub fn is_outside(&self, point: Vec3) -> bool {
        self.signed_distance(point) > 0.0
    }

    pub fn within_radius(&self, point: Vec3) -> bool {
        self.position.distance(point) < self.radius
    }
}

/// Which side of the portal a half-space throws away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfSpace {
    Inside,
    Outside,
}

impl HalfSpace {
    pub fn complement(self) -> Self {
        match self {
            Self::Inside => Self::Outside,
            Self::Outside => Self::Inside,
        }
    }
}

/// A plane that keeps points with `normal.dot(p) + constant >= 0` and
/// discards the rest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClippingHalfSpace {
    pub normal: Vec3,
    pub constant: f32,
}

impl ClippingHalfSpace {
    pub fn discarding(plane: &PortalPlane, side: HalfSpace) -> Self {
        let normal = match side {
            HalfSpace::Inside => plane.normal(),
            HalfSpace::Outside => -plane.normal(),
        };
        Self {
            normal,
            constant: -normal.dot(plane.position()),
        }
    }

    pub fn distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.constant
    }

    pub fn keeps(&self, point: Vec3) -> bool {
        self.distance(point) >= 0.0
    }

    pub fn as_vec4(&self) -> Vec4 {
        self.normal.extend(self.constant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClippingPlanes {
    pub inside: ClippingHalfSpace,
    pub outside: ClippingHalfSpace,
}

impl ClippingPlanes {
    pub fn for_portal(plane: &PortalPlane) -> Self {
        Self {
            inside: ClippingHalfSpace::discarding(plane, HalfSpace::Inside),
            outside: ClippingHalfSpace::discarding(plane, HalfSpace::Outside),
        }
    }

    pub fn get(&self, side: HalfSpace) -> ClippingHalfSpace {
        match side {
            HalfSpace::Inside => self.inside,
            HalfSpace::Outside => self.outside,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewerState {
    pub inside_portal: bool,
    pub was_outside_last_frame: bool,
}

impl ViewerState {
    pub fn new(inside_portal: bool) -> Self {
        Self {
            inside_portal,
            was_outside_last_frame: !inside_portal,
        }
    }
}

impl Default for ViewerState {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Edge trigger on the portal plane, gated by proximity to the opening.
///
/// `inside_portal` flips only on a frame where the side changed and the
/// camera is within `radius` of the portal centre. The previous-side flag is
/// always refreshed, so a crossing far from the opening is absorbed.
pub fn update_viewer_side(
    camera_position: Vec3,
    portal_plane: &PortalPlane,
    state: ViewerState,
) -> ViewerState {
    let is_outside = portal_plane.is_outside(camera_position);
    let mut inside_portal = state.inside_portal;
    if state.was_outside_last_frame != is_outside && portal_plane.within_radius(camera_position) {
        inside_portal = !inside_portal;
    }

    ViewerState {
        inside_portal,
        was_outside_last_frame: is_outside,
    }
}

/// Which face of the portal mesh is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalFacing {
    Front,
    Back,
}

impl PortalFacing {
    pub fn for_side(inside_portal: bool) -> Self {
        if inside_portal {
            Self::Back
        } else {
            Self::Front
        }
    }
}

/// Per-frame portal state, owned by the render loop driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortalState {
    pub viewer: ViewerState,
    pub facing: PortalFacing,
}

impl PortalState {
    pub fn new(initial_inside: bool) -> Self {
        Self {
            viewer: ViewerState::new(initial_inside),
            facing: PortalFacing::for_side(initial_inside),
        }
    }

    pub fn inside_portal(&self) -> bool {
        self.viewer.inside_portal
    }

    /// Returns true when the viewer changed sides this frame.
    pub fn advance(&mut self, camera_position: Vec3, portal_plane: &PortalPlane) -> bool {
        let next = update_viewer_side(camera_position, portal_plane, self.viewer);
        let toggled = next.inside_portal != self.viewer.inside_portal;
        self.viewer = next;
        self.facing = PortalFacing::for_side(next.inside_portal);
        if toggled {
            debug!(
                inside = next.inside_portal,
                x = camera_position.x,
                y = camera_position.y,
                z = camera_position.z,
                "viewer crossed the portal"
            );
        }
        toggled
    }
}

impl Default for PortalState {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};

    use super::{
        update_viewer_side, ClippingHalfSpace, ClippingPlanes, HalfSpace, PortalFacing,
        PortalPlane, PortalState, ViewerState,
    };
    use crate::error::PortalConfigError;

    fn unit_portal() -> PortalPlane {
        PortalPlane::new(Vec3::ZERO, Quat::IDENTITY, 1.0).unwrap()
    }

    fn camera_z(z: f32) -> Vec3 {
        Vec3::new(0.0, 0.0, z)
    }

    #[test]
    fn rejects_degenerate_portal_configuration() {
        assert_eq!(
            PortalPlane::new(Vec3::ZERO, Quat::IDENTITY, 0.0),
            Err(PortalConfigError::InvalidRadius(0.0))
        );
        assert!(matches!(
            PortalPlane::new(Vec3::ZERO, Quat::IDENTITY, f32::NAN),
            Err(PortalConfigError::InvalidRadius(_))
        ));
        assert_eq!(
            PortalPlane::new(Vec3::new(f32::INFINITY, 0.0, 0.0), Quat::IDENTITY, 1.0),
            Err(PortalConfigError::NonFinitePosition)
        );
        assert_eq!(
            PortalPlane::new(Vec3::ZERO, Quat::from_xyzw(0.0, 0.0, 0.0, 0.0), 1.0),
            Err(PortalConfigError::DegenerateOrientation)
        );
    }

    #[test]
    fn camera_far_outside_stays_outside() {
        let portal = unit_portal();
        let state = update_viewer_side(camera_z(2.0), &portal, ViewerState::new(false));
        assert!(!state.inside_portal);
        assert!(state.was_outside_last_frame);
    }

    #[test]
    fn crossing_within_radius_flips_on_the_crossing_frame() {
        let portal = unit_portal();
        let mut state = ViewerState::new(false);

        state = update_viewer_side(camera_z(0.5), &portal, state);
        assert!(!state.inside_portal);

        state = update_viewer_side(camera_z(-0.5), &portal, state);
        assert!(state.inside_portal);
        assert!(!state.was_outside_last_frame);

        state = update_viewer_side(camera_z(0.5), &portal, state);
        assert!(!state.inside_portal);
    }

    #[test]
    fn teleport_across_plane_outside_radius_does_not_flip() {
        let portal = unit_portal();
        let mut state = update_viewer_side(camera_z(5.0), &portal, ViewerState::new(false));
        state = update_viewer_side(camera_z(-5.0), &portal, state);

        assert!(!state.inside_portal);
        assert!(!state.was_outside_last_frame);

        // The side change was absorbed without a toggle, so the next crossing
        // through the opening toggles from the stale value.
        state = update_viewer_side(camera_z(-0.5), &portal, state);
        assert!(!state.inside_portal);
        state = update_viewer_side(camera_z(0.5), &portal, state);
        assert!(state.inside_portal);
    }

    #[test]
    fn crossings_at_or_beyond_radius_never_toggle() {
        let portal = unit_portal();
        for offset in [1.0_f32, 1.5, 3.0, 10.0] {
            let lateral = Vec3::new(offset, 0.0, 0.0);
            for initial in [false, true] {
                let mut state = ViewerState {
                    inside_portal: initial,
                    was_outside_last_frame: true,
                };
                state = update_viewer_side(lateral + camera_z(-0.01), &portal, state);
                assert_eq!(state.inside_portal, initial, "offset {offset}");
            }
        }
    }

    #[test]
    fn repeated_update_without_movement_toggles_once() {
        let portal = unit_portal();
        let start = ViewerState::new(false);
        let once = update_viewer_side(camera_z(-0.25), &portal, start);
        let twice = update_viewer_side(camera_z(-0.25), &portal, once);

        assert!(once.inside_portal);
        assert_eq!(once, twice);
    }

    #[test]
    fn rotated_portal_uses_rotated_normal() {
        let portal = PortalPlane::new(
            Vec3::new(0.0, 1.2, 0.0),
            Quat::from_rotation_y(std::f32::consts::PI),
            1.0,
        )
        .unwrap();
        assert!((portal.normal() - Vec3::NEG_Z).length() < 1.0e-5);
        assert!(portal.is_outside(Vec3::new(0.0, 1.2, -0.5)));
        assert!(!portal.is_outside(Vec3::new(0.0, 1.2, 0.5)));
    }

    #[test]
    fn half_spaces_discard_their_named_side() {
        let portal = PortalPlane::new(Vec3::new(0.0, 0.0, 1.0), Quat::IDENTITY, 1.0).unwrap();
        let planes = ClippingPlanes::for_portal(&portal);
        let outside_point = Vec3::new(0.0, 0.0, 3.0);
        let inside_point = Vec3::new(0.0, 0.0, -3.0);

        assert!(planes.inside.keeps(outside_point));
        assert!(!planes.inside.keeps(inside_point));
        assert!(planes.outside.keeps(inside_point));
        assert!(!planes.outside.keeps(outside_point));

        assert_eq!(planes.get(HalfSpace::Inside), planes.inside);
        assert_eq!(HalfSpace::Inside.complement(), HalfSpace::Outside);
        assert_eq!(
            ClippingHalfSpace::discarding(&portal, HalfSpace::Outside).as_vec4(),
            glam::Vec4::new(0.0, 0.0, -1.0, 1.0)
        );
    }

    #[test]
    fn portal_state_flips_facing_with_side() {
        let portal = unit_portal();
        let mut state = PortalState::new(false);
        assert_eq!(state.facing, PortalFacing::Front);

        assert!(!state.advance(camera_z(0.5), &portal));
        assert!(state.advance(camera_z(-0.5), &portal));
        assert!(state.inside_portal());
        assert_eq!(state.facing, PortalFacing::Back);
    }
}
