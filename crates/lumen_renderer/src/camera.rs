//! Projective cameras producing primary rays with differentials.

use log::warn;
use lumen_core::{NamedSpaces, ParamList, ParamReader};
use lumen_math::sampling::concentric_sample_disk;
use lumen_math::{Dual2, Ray, Transform, Vec2, Vec3};

use crate::error::CameraError;

/// Where on the film and on the lens a primary ray starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSample {
    /// Continuous raster position; pixel `(i, j)` covers `[i, i+1) x [j, j+1)`.
    pub image: Vec2,
    /// Lens position in the unit square.
    pub lens: Vec2,
}

pub trait Camera: NamedSpaces {
    /// Film size in pixels, `(width, height)`.
    fn resolution(&self) -> (usize, usize);

    /// A world-space ray whose differentials describe one pixel step in x and y.
    fn generate_ray(&self, sample: &CameraSample) -> Ray;
}

/// Settings for a [`PerspectiveCamera`].
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveParams {
    /// Screen window `[xmin, xmax, ymin, ymax]`.
    pub screen: [f32; 4],
    pub hither: f32,
    pub yon: f32,
    pub shutter_open: f32,
    pub shutter_close: f32,
    pub lens_radius: f32,
    pub focal_distance: f32,
    /// Field of view in degrees across the shorter screen axis.
    pub fov: f32,
    pub resolution: (usize, usize),
}

impl PerspectiveParams {
    /// Screen window spanning `[-1, 1]` on the shorter axis.
    pub fn default_screen(frame_aspect: f32) -> [f32; 4] {
        if frame_aspect > 1.0 {
            [-frame_aspect, frame_aspect, -1.0, 1.0]
        } else {
            [-1.0, 1.0, -1.0 / frame_aspect, 1.0 / frame_aspect]
        }
    }

    pub fn with_resolution(width: usize, height: usize) -> Self {
        Self {
            screen: Self::default_screen(width as f32 / height as f32),
            resolution: (width, height),
            ..Self::default()
        }
    }
}

impl Default for PerspectiveParams {
    fn default() -> Self {
        Self {
            screen: Self::default_screen(640.0 / 480.0),
            hither: 1e-3,
            yon: 1e30,
            shutter_open: 0.0,
            shutter_close: 1.0,
            lens_radius: 0.0,
            focal_distance: 1e30,
            fov: 90.0,
            resolution: (640, 480),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    camera_to_world: Transform,
    world_to_camera: Transform,
    camera_to_screen: Transform,
    screen_to_raster: Transform,
    raster_to_camera: Transform,
    ndc_to_camera: Transform,
    params: PerspectiveParams,
}

impl PerspectiveCamera {
    pub fn new(camera_to_world: Transform, params: PerspectiveParams) -> Result<Self, CameraError> {
        let (xres, yres) = params.resolution;
        if xres == 0 || yres == 0 {
            return Err(CameraError::Resolution {
                x: xres as i32,
                y: yres as i32,
            });
        }
        let [x0, x1, y0, y1] = params.screen;
        if x1 == x0 || y1 == y0 {
            return Err(CameraError::ScreenWindow(x0, x1, y0, y1));
        }

        let camera_to_screen = Transform::perspective(params.fov, params.hither, params.yon)?;

        // NDC has its origin at the top-left corner of the screen window and y pointing down
        let screen_to_ndc = Transform::scale(Vec3::new(1.0 / (x1 - x0), 1.0 / (y0 - y1), 1.0))?
            * Transform::translate(Vec3::new(-x0, -y1, 0.0));
        let screen_to_raster =
            Transform::scale(Vec3::new(xres as f32, yres as f32, 1.0))? * screen_to_ndc;

        let screen_to_camera = camera_to_screen.inverse();
        let raster_to_camera = screen_to_camera * screen_to_raster.inverse();
        let ndc_to_camera = screen_to_camera * screen_to_ndc.inverse();

        Ok(Self {
            world_to_camera: camera_to_world.inverse(),
            camera_to_world,
            camera_to_screen,
            screen_to_raster,
            raster_to_camera,
            ndc_to_camera,
            params,
        })
    }

    /// Reads `hither`, `yon`, `shutteropen`, `shutterclose`, `lensradius`,
    /// `focaldistance`, `int[2] resolution`, `frameaspectratio`,
    /// `float[4] screen` and `fov`. Unread parameters are reported.
    pub fn from_params(camera_to_world: Transform, list: &ParamList) -> Result<Self, CameraError> {
        let mut reader = ParamReader::new(list);

        let hither = reader.float("hither", 1e-3).max(1e-4);
        let yon = reader.float("yon", 1e30).min(1e30);
        let shutter_open = reader.float("shutteropen", 0.0);
        let shutter_close = reader.float("shutterclose", 1.0);
        let lens_radius = reader.float("lensradius", 0.0);
        let focal_distance = reader.float("focaldistance", 1e30);

        let (xres, yres) = match reader.ints("resolution") {
            Some(&[x, y, ..]) => (x, y),
            Some(_) => {
                warn!("Camera \"resolution\" needs two values. Using 640x480.");
                (640, 480)
            }
            None => (640, 480),
        };
        if xres <= 0 || yres <= 0 {
            return Err(CameraError::Resolution { x: xres, y: yres });
        }

        let frame = reader.float("frameaspectratio", xres as f32 / yres as f32);
        let screen = match reader.floats("screen") {
            Some(&[a, b, c, d, ..]) => [a, b, c, d],
            Some(_) => {
                warn!("Camera \"screen\" needs four values. Using the default window.");
                PerspectiveParams::default_screen(frame)
            }
            None => PerspectiveParams::default_screen(frame),
        };
        let fov = reader.float("fov", 90.0);
        reader.report_unused("camera");

        Self::new(
            camera_to_world,
            PerspectiveParams {
                screen,
                hither,
                yon,
                shutter_open,
                shutter_close,
                lens_radius,
                focal_distance,
                fov,
                resolution: (xres as usize, yres as usize),
            },
        )
    }

    pub fn camera_to_world(&self) -> &Transform {
        &self.camera_to_world
    }

    pub fn world_to_camera(&self) -> &Transform {
        &self.world_to_camera
    }

    pub fn params(&self) -> &PerspectiveParams {
        &self.params
    }

    pub fn shutter(&self) -> (f32, f32) {
        (self.params.shutter_open, self.params.shutter_close)
    }

    /// Raster position of a world-space point.
    pub fn world_to_raster(&self, p: Vec3) -> Vec3 {
        let screen = self.camera_to_screen.point(self.world_to_camera.point(p));
        self.screen_to_raster.point(screen)
    }
}

impl Camera for PerspectiveCamera {
    fn resolution(&self) -> (usize, usize) {
        self.params.resolution
    }

    fn generate_ray(&self, sample: &CameraSample) -> Ray {
        let raster = Dual2::new(sample.image.extend(0.0), Vec3::X, Vec3::Y);
        // Point on the near plane, seen from the camera origin
        let mut direction = self.raster_to_camera.point_dual(raster);
        let mut origin = Dual2::constant(Vec3::ZERO);

        if self.params.lens_radius > 0.0 {
            let lens = concentric_sample_disk(sample.lens.x, sample.lens.y) * self.params.lens_radius;
            let ft = Dual2::constant(self.params.focal_distance) / direction.z();
            let focus = direction * ft;
            origin = Dual2::constant(lens.extend(0.0));
            direction = focus - origin;
        }

        let ray = Ray::with_differentials(origin, direction.normalize());
        self.camera_to_world.ray(&ray)
    }
}

impl NamedSpaces for PerspectiveCamera {
    fn space_to_world(&self, name: &str) -> Option<Transform> {
        let to_camera = match name {
            "camera" => Transform::IDENTITY,
            "screen" => self.camera_to_screen.inverse(),
            "NDC" => self.ndc_to_camera,
            "raster" => self.raster_to_camera,
            _ => return None,
        };
        Some(self.camera_to_world * to_camera)
    }
}
