use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::layers::{MeshId, RenderLayer};

/// Setup-time validation failures. None of these can occur once a
/// compositor has been built.
#[derive(Debug, Clone, PartialEq)]
pub enum PortalConfigError {
    InvalidRadius(f32),
    NonFinitePosition,
    DegenerateOrientation,
    MissingPortalMesh,
    ConflictingLayer {
        mesh: MeshId,
        existing: RenderLayer,
        requested: RenderLayer,
    },
    InvalidOffscreenScale(f32),
    EmptyViewport {
        width: u32,
        height: u32,
    },
}

impl fmt::Display for PortalConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRadius(radius) => {
                write!(f, "portal radius must be finite and positive, got {radius}")
            }
            Self::NonFinitePosition => write!(f, "portal position has a non-finite component"),
            Self::DegenerateOrientation => {
                write!(f, "portal orientation is not a valid rotation")
            }
            Self::MissingPortalMesh => {
                write!(f, "no mesh is assigned to the portal layer")
            }
            Self::ConflictingLayer {
                mesh,
                existing,
                requested,
            } => write!(
                f,
                "mesh {mesh} is already on the {existing} layer, cannot also assign {requested}"
            ),
            Self::InvalidOffscreenScale(scale) => {
                write!(f, "offscreen scale must be in (0, 1], got {scale}")
            }
            Self::EmptyViewport { width, height } => {
                write!(f, "viewport must be non-empty, got {width}x{height}")
            }
        }
    }
}

impl std::error::Error for PortalConfigError {}

#[derive(Debug)]
pub enum ConfigLoadError {
    Read {
        path: PathBuf,
        source: io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid(PortalConfigError),
}

impl fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse config {}: {source}", path.display())
            }
            Self::Invalid(err) => write!(f, "invalid config: {err}"),
        }
    }
}

impl std::error::Error for ConfigLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(err) => Some(err),
        }
    }
}

impl From<PortalConfigError> for ConfigLoadError {
    fn from(err: PortalConfigError) -> Self {
        Self::Invalid(err)
    }
}
