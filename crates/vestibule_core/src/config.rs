use std::fs;
use std::io;
use std::path::Path;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::compositor::MainPassClip;
use crate::error::{ConfigLoadError, PortalConfigError};
use crate::portal::PortalPlane;

const MIN_FOV_DEGREES: f32 = 30.0;
const MAX_FOV_DEGREES: f32 = 120.0;
const MIN_MOVE_SPEED: f32 = 0.1;
const MAX_MOVE_SPEED: f32 = 20.0;
const MIN_LOOK_SENSITIVITY: f32 = 0.0005;
const MAX_LOOK_SENSITIVITY: f32 = 0.02;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VestibuleConfig {
    #[serde(default)]
    pub portal: PortalSettings,
    #[serde(default)]
    pub render: RenderSettings,
    #[serde(default)]
    pub camera: CameraSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalSettings {
    #[serde(default = "default_portal_position")]
    pub position: Vec3,
    #[serde(default)]
    pub yaw_degrees: f32,
    #[serde(default = "default_portal_radius")]
    pub radius: f32,
    #[serde(default)]
    pub initial_inside: bool,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            position: default_portal_position(),
            yaw_degrees: 0.0,
            radius: default_portal_radius(),
            initial_inside: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default)]
    pub main_pass_clip: MainPassClip,
    #[serde(default = "default_offscreen_scale")]
    pub offscreen_scale: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            main_pass_clip: MainPassClip::default(),
            offscreen_scale: default_offscreen_scale(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    #[serde(default = "default_camera_position")]
    pub position: Vec3,
    #[serde(default = "default_fov_degrees")]
    pub fov_degrees: f32,
    #[serde(default = "default_move_speed")]
    pub move_speed: f32,
    #[serde(default = "default_look_sensitivity")]
    pub look_sensitivity: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            position: default_camera_position(),
            fov_degrees: default_fov_degrees(),
            move_speed: default_move_speed(),
            look_sensitivity: default_look_sensitivity(),
        }
    }
}

impl VestibuleConfig {
    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigLoadError> {
        let parsed = toml::from_str::<Self>(contents).map_err(|source| ConfigLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let config = parsed.sanitize();
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents, path)
    }

    /// A missing file yields the defaults; any other failure is returned.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigLoadError> {
        match Self::load(path) {
            Err(ConfigLoadError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                warn!("config {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn sanitize(mut self) -> Self {
        self.camera.fov_degrees = self.camera.fov_degrees.clamp(MIN_FOV_DEGREES, MAX_FOV_DEGREES);
        self.camera.move_speed = self.camera.move_speed.clamp(MIN_MOVE_SPEED, MAX_MOVE_SPEED);
        self.camera.look_sensitivity = self
            .camera
            .look_sensitivity
            .clamp(MIN_LOOK_SENSITIVITY, MAX_LOOK_SENSITIVITY);
        self
    }

    pub fn validate(&self) -> Result<(), PortalConfigError> {
        self.portal_plane()?;
        let scale = self.render.offscreen_scale;
        if !scale.is_finite() || scale <= 0.0 || scale > 1.0 {
            return Err(PortalConfigError::InvalidOffscreenScale(scale));
        }
        if !self.camera.position.is_finite() {
            return Err(PortalConfigError::NonFinitePosition);
        }
        Ok(())
    }

    pub fn portal_plane(&self) -> Result<PortalPlane, PortalConfigError> {
        PortalPlane::new(
            self.portal.position,
            Quat::from_rotation_y(self.portal.yaw_degrees.to_radians()),
            self.portal.radius,
        )
    }
}

fn default_portal_position() -> Vec3 {
    Vec3::new(0.0, 1.2, 0.0)
}

fn default_portal_radius() -> f32 {
    1.0
}

fn default_offscreen_scale() -> f32 {
    1.0
}

fn default_camera_position() -> Vec3 {
    Vec3::new(0.0, 1.6, 3.0)
}

fn default_fov_degrees() -> f32 {
    50.0
}

fn default_move_speed() -> f32 {
    3.0
}

fn default_look_sensitivity() -> f32 {
    0.0025
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use glam::Vec3;

    use super::VestibuleConfig;
    use crate::compositor::MainPassClip;
    use crate::error::{ConfigLoadError, PortalConfigError};

    #[test]
    fn empty_file_uses_defaults() {
        let config = VestibuleConfig::parse("", Path::new("vestibule.toml")).unwrap();
        assert_eq!(config, VestibuleConfig::default());
        assert_eq!(config.render.main_pass_clip, MainPassClip::Complementary);
        assert!(!config.portal.initial_inside);
    }

    #[test]
    fn parses_sections_and_clamps_soft_values() {
        let contents = r#"
            [portal]
            position = [1.0, 2.0, 3.0]
            yaw_degrees = 90.0
            radius = 0.75
            initial_inside = true

            [render]
            main_pass_clip = "none"
            offscreen_scale = 0.5

            [camera]
            fov_degrees = 200.0
            move_speed = 0.0
        "#;
        let config = VestibuleConfig::parse(contents, Path::new("vestibule.toml")).unwrap();

        assert_eq!(config.portal.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(config.portal.radius, 0.75);
        assert!(config.portal.initial_inside);
        assert_eq!(config.render.main_pass_clip, MainPassClip::None);
        assert_eq!(config.render.offscreen_scale, 0.5);
        assert_eq!(config.camera.fov_degrees, 120.0);
        assert_eq!(config.camera.move_speed, 0.1);

        let normal = config.portal_plane().unwrap().normal();
        assert!((normal - Vec3::X).length() < 1.0e-5);
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let contents = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../vestibule.toml"));
        let config = VestibuleConfig::parse(contents, Path::new("vestibule.toml")).unwrap();
        assert_eq!(config, VestibuleConfig::default());
    }

    #[test]
    fn zero_radius_is_rejected_at_load() {
        let err = VestibuleConfig::parse("[portal]\nradius = 0.0\n", Path::new("vestibule.toml"))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigLoadError::Invalid(PortalConfigError::InvalidRadius(_))
        ));
    }

    #[test]
    fn malformed_toml_reports_parse_error() {
        let err = VestibuleConfig::parse("[portal\n", Path::new("broken.toml")).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = Path::new("definitely/not/here/vestibule.toml");
        assert_eq!(
            VestibuleConfig::load_or_default(path).unwrap(),
            VestibuleConfig::default()
        );
    }
}
