//! Sensor calibrations.
//!
//! A Metashape `<sensor>` holds the intrinsic calibration shared by every
//! image taken with it:
//!
//! ```text
//! <sensor id="0" label="..." type="frame">
//!   <resolution width="5472" height="3648"/>
//!   <calibration type="frame" class="adjusted">
//!     <f>3685.6</f>
//!     <cx>-12.3</cx>
//!     <cy>8.1</cy>
//!     <k1>-0.0123</k1>
//!     ...
//!   </calibration>
//! </sensor>
//! ```
//!
//! The image size is read from the first child of the sensor. Within
//! `<calibration>`, `f`, `cx` and `cy` are the first three children *by
//! position* and every following child is a distortion coefficient named by
//! its tag. Upstream writes this fixed layout and we rely on it.

use std::collections::BTreeMap;

use nalgebra::Vector5;
use opencv_ros_camera::{Distortion, RosOpenCvIntrinsics};
use serde::Serialize;

use crate::{MetashapeMvgError, Result, XmlNode};

pub type SensorId = i64;

/// Tags of the leading calibration children, in order.
const LEADING_FIELDS: [&str; 3] = ["f", "cx", "cy"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorIntrinsics {
    pub width: u32,
    pub height: u32,
    /// Focal length in pixels.
    pub f: f64,
    /// Principal point offset from the image center, in pixels.
    pub cx: f64,
    pub cy: f64,
    /// Distortion coefficients keyed by their tag name, e.g. `k1` or `p2`.
    pub distortion: BTreeMap<String, f64>,
}

impl SensorIntrinsics {
    fn coefficient(&self, name: &str) -> f64 {
        self.distortion.get(name).copied().unwrap_or(0.0)
    }

    /// Convert to the OpenCV (ROS) pinhole model with 5-term distortion.
    ///
    /// Metashape's affinity (`b1`) and skew (`b2`) terms map into the
    /// camera matrix. Its tangential coefficients are defined the other way
    /// around from OpenCV's, so `p1` and `p2` swap places. Nonzero
    /// coefficients OpenCV cannot express (`k4`, `p3`, `p4`, or any unknown
    /// name) are an error.
    pub fn to_opencv_intrinsics(&self, sensor_id: SensorId) -> Result<RosOpenCvIntrinsics<f64>> {
        const SUPPORTED: [&str; 7] = ["k1", "k2", "k3", "p1", "p2", "b1", "b2"];
        if let Some((name, _)) = self
            .distortion
            .iter()
            .find(|(name, val)| !SUPPORTED.contains(&name.as_str()) && **val != 0.0)
        {
            return Err(MetashapeMvgError::UnsupportedDistortion {
                sensor_id,
                name: name.clone(),
            });
        }

        let fx = self.f + self.coefficient("b1");
        let fy = self.f;
        let skew = self.coefficient("b2");
        let cx = f64::from(self.width) * 0.5 + self.cx;
        let cy = f64::from(self.height) * 0.5 + self.cy;
        let distortion = Distortion::from_opencv_vec(Vector5::new(
            self.coefficient("k1"),
            self.coefficient("k2"),
            self.coefficient("p2"),
            self.coefficient("p1"),
            self.coefficient("k3"),
        ));
        Ok(RosOpenCvIntrinsics::from_params_with_distortion(
            fx, skew, fy, cx, cy, distortion,
        ))
    }
}

fn parse_dimension(node: &XmlNode, name: &str) -> Result<u32> {
    let val: u32 = node.parse_attr(name)?;
    if val == 0 {
        return Err(MetashapeMvgError::malformed(
            format!("<{}> attribute {name}", node.tag()),
            "must be positive",
        ));
    }
    Ok(val)
}

fn parse_sensor(sensor: &XmlNode) -> Result<(SensorId, SensorIntrinsics)> {
    let sensor_id: SensorId = sensor.parse_attr("id")?;

    let resolution = sensor.children().first().ok_or_else(|| {
        MetashapeMvgError::schema(format!("sensor {sensor_id} has no resolution element"))
    })?;
    let width = parse_dimension(resolution, "width")?;
    let height = parse_dimension(resolution, "height")?;

    let calibration = sensor
        .find("calibration")
        .ok_or(MetashapeMvgError::MissingCalibration { sensor_id })?;

    let children = calibration.children();
    for (i, field) in LEADING_FIELDS.into_iter().enumerate() {
        if children.get(i).map(XmlNode::tag) != Some(field) {
            return Err(MetashapeMvgError::MissingField { sensor_id, field });
        }
    }
    let f = children[0].parse_real()?;
    let cx = children[1].parse_real()?;
    let cy = children[2].parse_real()?;

    let distortion = children[LEADING_FIELDS.len()..]
        .iter()
        .map(|c| Ok((c.tag().to_string(), c.parse_real()?)))
        .collect::<Result<BTreeMap<_, _>>>()?;

    Ok((
        sensor_id,
        SensorIntrinsics {
            width,
            height,
            f,
            cx,
            cy,
            distortion,
        },
    ))
}

/// Parse every sensor of a `<sensors>` collection.
///
/// If an id occurs more than once, the later sensor replaces the earlier one.
pub fn load_sensors(sensors: &XmlNode) -> Result<BTreeMap<SensorId, SensorIntrinsics>> {
    sensors.children().iter().map(parse_sensor).collect()
}
