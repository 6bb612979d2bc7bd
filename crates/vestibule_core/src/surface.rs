use glam::Vec2;

use crate::error::PortalConfigError;

/// Size bookkeeping for the offscreen target that holds the far side of the
/// portal. The GPU texture itself belongs to the rendering backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffscreenSurface {
    viewport_width: u32,
    viewport_height: u32,
    scale: f32,
    generation: u64,
}

impl OffscreenSurface {
    pub fn new(viewport_width: u32, viewport_height: u32, scale: f32) -> Result<Self, PortalConfigError> {
        if !scale.is_finite() || scale <= 0.0 || scale > 1.0 {
            return Err(PortalConfigError::InvalidOffscreenScale(scale));
        }
        if viewport_width == 0 || viewport_height == 0 {
            return Err(PortalConfigError::EmptyViewport {
                width: viewport_width,
                height: viewport_height,
            });
        }

        Ok(Self {
            viewport_width,
            viewport_height,
            scale,
            generation: 0,
        })
    }

    /// Returns false when the size is unchanged or empty (minimized window).
    pub fn resize(&mut self, viewport_width: u32, viewport_height: u32) -> bool {
        if viewport_width == 0 || viewport_height == 0 {
            return false;
        }
        if viewport_width == self.viewport_width && viewport_height == self.viewport_height {
            return false;
        }

        self.viewport_width = viewport_width;
        self.viewport_height = viewport_height;
        self.generation += 1;
        true
    }

    pub fn width(&self) -> u32 {
        scaled_dimension(self.viewport_width, self.scale)
    }

    pub fn height(&self) -> u32 {
        scaled_dimension(self.viewport_height, self.scale)
    }

    pub fn viewport(&self) -> (u32, u32) {
        (self.viewport_width, self.viewport_height)
    }

    /// Uniform consumed by the portal material. Fragment coordinates are in
    /// viewport pixels, so this is the viewport size and not the texture size.
    pub fn resolution(&self) -> Vec2 {
        Vec2::new(self.viewport_width as f32, self.viewport_height as f32)
    }

    /// Bumped on every effective resize. Backends compare it to detect a
    /// texture allocated for an older size.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

fn scaled_dimension(dimension: u32, scale: f32) -> u32 {
    ((dimension.max(1) as f32) * scale).round().max(1.0) as u32
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::OffscreenSurface;
    use crate::error::PortalConfigError;

    #[test]
    fn resize_updates_dimensions_and_resolution() {
        let mut surface = OffscreenSurface::new(800, 600, 1.0).unwrap();
        assert_eq!((surface.width(), surface.height()), (800, 600));

        assert!(surface.resize(1920, 1080));
        assert_eq!((surface.width(), surface.height()), (1920, 1080));
        assert_eq!(surface.resolution(), Vec2::new(1920.0, 1080.0));
        assert_eq!(surface.generation(), 1);
    }

    #[test]
    fn redundant_or_empty_resize_is_ignored() {
        let mut surface = OffscreenSurface::new(800, 600, 1.0).unwrap();
        assert!(!surface.resize(800, 600));
        assert!(!surface.resize(0, 600));
        assert_eq!(surface.viewport(), (800, 600));
        assert_eq!(surface.generation(), 0);
    }

    #[test]
    fn scaled_surface_keeps_full_resolution_uniform() {
        let surface = OffscreenSurface::new(1001, 600, 0.5).unwrap();
        assert_eq!((surface.width(), surface.height()), (501, 300));
        assert_eq!(surface.resolution(), Vec2::new(1001.0, 600.0));
    }

    #[test]
    fn rejects_bad_scale_and_empty_viewport() {
        assert_eq!(
            OffscreenSurface::new(800, 600, 0.0),
            Err(PortalConfigError::InvalidOffscreenScale(0.0))
        );
        assert_eq!(
            OffscreenSurface::new(800, 600, 1.5),
            Err(PortalConfigError::InvalidOffscreenScale(1.5))
        );
        assert_eq!(
            OffscreenSurface::new(0, 600, 1.0),
            Err(PortalConfigError::EmptyViewport { width: 0, height: 600 })
        );
    }
}
