use std::fmt;

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::error::PortalConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u32);

impl fmt::Display for MeshId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderLayer {
    Inside,
    Outside,
    Portal,
}

impl RenderLayer {
    pub fn mask(self) -> LayerMask {
        match self {
            Self::Inside => LayerMask::INSIDE,
            Self::Outside => LayerMask::OUTSIDE,
            Self::Portal => LayerMask::PORTAL,
        }
    }

    /// The environment layer for a viewer side.
    pub fn for_side(inside_portal: bool) -> Self {
        if inside_portal {
            Self::Inside
        } else {
            Self::Outside
        }
    }
}

impl fmt::Display for RenderLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Inside => "inside",
            Self::Outside => "outside",
            Self::Portal => "portal",
        };
        f.write_str(name)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LayerMask: u8 {
        const INSIDE = 1 << 0;
        const OUTSIDE = 1 << 1;
        const PORTAL = 1 << 2;
    }
}

impl LayerMask {
    pub fn allows(self, layer: Option<RenderLayer>) -> bool {
        match layer {
            Some(layer) => self.contains(layer.mask()),
            None => true,
        }
    }

    /// True when exactly one of the two environment layers is enabled.
    pub fn has_single_environment(self) -> bool {
        self.contains(Self::INSIDE) != self.contains(Self::OUTSIDE)
    }
}

/// Mesh to layer association, fixed once the scene is built. Meshes without
/// an entry are drawn in every pass.
#[derive(Debug, Clone, Default)]
pub struct LayerAssignments {
    layers: FxHashMap<MeshId, RenderLayer>,
}

impl LayerAssignments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, mesh: MeshId, layer: RenderLayer) -> Result<(), PortalConfigError> {
        match self.layers.get(&mesh) {
            Some(&existing) if existing != layer => Err(PortalConfigError::ConflictingLayer {
                mesh,
                existing,
                requested: layer,
            }),
            Some(_) => Ok(()),
            None => {
                self.layers.insert(mesh, layer);
                Ok(())
            }
        }
    }

    pub fn layer_of(&self, mesh: MeshId) -> Option<RenderLayer> {
        self.layers.get(&mesh).copied()
    }

    pub fn is_visible(&self, mesh: MeshId, mask: LayerMask) -> bool {
        mask.allows(self.layer_of(mesh))
    }

    pub fn meshes_on(&self, layer: RenderLayer) -> impl Iterator<Item = MeshId> + '_ {
        self.layers
            .iter()
            .filter(move |(_, assigned)| **assigned == layer)
            .map(|(mesh, _)| *mesh)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn validate(&self) -> Result<(), PortalConfigError> {
        if self.meshes_on(RenderLayer::Portal).next().is_none() {
            return Err(PortalConfigError::MissingPortalMesh);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{LayerAssignments, LayerMask, MeshId, RenderLayer};
    use crate::error::PortalConfigError;

    #[test]
    fn reassigning_to_a_different_layer_is_rejected() {
        let mut layers = LayerAssignments::new();
        layers.assign(MeshId(1), RenderLayer::Inside).unwrap();
        layers.assign(MeshId(1), RenderLayer::Inside).unwrap();

        let err = layers.assign(MeshId(1), RenderLayer::Outside).unwrap_err();
        assert_eq!(
            err,
            PortalConfigError::ConflictingLayer {
                mesh: MeshId(1),
                existing: RenderLayer::Inside,
                requested: RenderLayer::Outside,
            }
        );
        assert_eq!(layers.layer_of(MeshId(1)), Some(RenderLayer::Inside));
    }

    #[test]
    fn unassigned_meshes_are_always_visible() {
        let mut layers = LayerAssignments::new();
        layers.assign(MeshId(7), RenderLayer::Portal).unwrap();

        assert!(layers.is_visible(MeshId(99), LayerMask::empty()));
        assert!(layers.is_visible(MeshId(99), LayerMask::INSIDE));
        assert!(!layers.is_visible(MeshId(7), LayerMask::INSIDE | LayerMask::OUTSIDE));
        assert!(layers.is_visible(MeshId(7), LayerMask::PORTAL));
    }

    #[test]
    fn validation_requires_a_portal_mesh() {
        let mut layers = LayerAssignments::new();
        layers.assign(MeshId(1), RenderLayer::Inside).unwrap();
        assert_eq!(layers.validate(), Err(PortalConfigError::MissingPortalMesh));

        layers.assign(MeshId(2), RenderLayer::Portal).unwrap();
        assert_eq!(layers.validate(), Ok(()));
    }

    #[test]
    fn single_environment_check() {
        assert!((LayerMask::INSIDE | LayerMask::PORTAL).has_single_environment());
        assert!(LayerMask::OUTSIDE.has_single_environment());
        assert!(!(LayerMask::INSIDE | LayerMask::OUTSIDE).has_single_environment());
        assert!(!LayerMask::PORTAL.has_single_environment());
    }
}
