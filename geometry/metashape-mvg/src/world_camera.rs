use nalgebra::{Point2, Point3, RowVector3, Rotation3, UnitQuaternion};

use cam_geom::ExtrinsicParameters;
use opencv_ros_camera::RosOpenCvIntrinsics;

use crate::{HomogeneousTransform, Result, SensorIntrinsics};

/// A projecting camera placed in the world frame.
///
/// Built by [`crate::CameraModelDocument::world_camera`] from the chunk
/// transform, the camera pose and the sensor calibration.
#[derive(Debug, Clone)]
pub struct WorldCamera {
    label: Option<String>,
    width: u32,
    height: u32,
    inner: cam_geom::Camera<f64, RosOpenCvIntrinsics<f64>>,
}

impl WorldCamera {
    pub(crate) fn new(
        label: Option<String>,
        sensor: &SensorIntrinsics,
        world_from_cam: &HomogeneousTransform,
        sensor_id: crate::SensorId,
    ) -> Result<Self> {
        let intrinsics = sensor.to_opencv_intrinsics(sensor_id)?;

        // The world frame may be scaled relative to the camera frame. Only
        // the direction of the axes matters for the pose.
        let cam_to_world = Rotation3::from_matrix_unchecked(world_from_cam.rotation());
        let rquat = UnitQuaternion::from_rotation_matrix(&cam_to_world.inverse());
        let camcenter = world_from_cam.transform_point(&Point3::origin());
        let extrinsics = ExtrinsicParameters::from_rotation_and_camcenter(rquat, camcenter);

        Ok(Self {
            label,
            width: sensor.width,
            height: sensor.height,
            inner: cam_geom::Camera::new(intrinsics, extrinsics),
        })
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn intrinsics(&self) -> &RosOpenCvIntrinsics<f64> {
        self.inner.intrinsics()
    }

    pub fn extrinsics(&self) -> &ExtrinsicParameters<f64> {
        self.inner.extrinsics()
    }

    /// Camera center in world coordinates.
    pub fn camcenter(&self) -> &Point3<f64> {
        self.inner.extrinsics().camcenter()
    }

    /// Project a world point to a (distorted) pixel coordinate.
    pub fn project_world_point(&self, pt: &Point3<f64>) -> Point2<f64> {
        let world = cam_geom::Points::new(RowVector3::new(pt.x, pt.y, pt.z));
        let pixels = self.inner.world_to_pixel(&world);
        Point2::new(pixels.data[(0, 0)], pixels.data[(0, 1)])
    }
}
