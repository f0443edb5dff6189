//! Camera models from [Agisoft Metashape](https://www.agisoft.com) camera XML
//! exports.
//!
//! Metashape writes its structure-from-motion result as an XML document
//! holding, per chunk, a transform from the chunk-local frame to the world
//! frame (ECEF, EPSG:4978), the calibrated sensors and the aligned camera
//! poses. This crate parses such a document into a [`CameraModelDocument`],
//! validating the numeric content (proper rotations, complete calibrations)
//! before any downstream geometry consumes it.
//!
//! ## Example
//!
//! ```rust
//! use metashape_mvg::CameraModelDocument;
//!
//! let buf = r#"<document version="1.5.0">
//!   <chunk label="Chunk 1">
//!     <sensors>
//!       <sensor id="0" label="main" type="frame">
//!         <resolution width="640" height="480"/>
//!         <calibration type="frame" class="adjusted">
//!           <f>500</f><cx>1.5</cx><cy>-2</cy><k1>0.01</k1>
//!         </calibration>
//!       </sensor>
//!     </sensors>
//!     <components>
//!       <component id="0">
//!         <transform>
//!           <rotation>1 0 0 0 1 0 0 0 1</rotation>
//!           <translation>10 20 30</translation>
//!           <scale>2</scale>
//!         </transform>
//!       </component>
//!     </components>
//!   </chunk>
//! </document>"#;
//!
//! let model = CameraModelDocument::from_xml_str(buf)?;
//! assert_eq!(model.chunk_transform().scale(), 2.0);
//! assert_eq!(model.sensor(0).unwrap().width, 640);
//! # Ok::<(), metashape_mvg::MetashapeMvgError>(())
//! ```
#![deny(rust_2018_idioms)]
use std::collections::BTreeMap;
use std::io::{Read, Write};

use serde::Serialize;

mod xml_tree;
pub use crate::xml_tree::XmlNode;

pub mod transform;
pub use crate::transform::{
    build_transform, HomogeneousTransform, RotationMatrix, DEFAULT_SCALE_TEXT,
    ROTATION_DET_TOLERANCE,
};

pub mod sensors;
pub use crate::sensors::{load_sensors, SensorId, SensorIntrinsics};

pub mod cameras;
pub use crate::cameras::{load_cameras, CameraId, CameraPose};

mod world_camera;
pub use crate::world_camera::WorldCamera;

pub mod geospatial;

#[derive(thiserror::Error, Debug)]
pub enum MetashapeMvgError {
    #[error("malformed {field}: {msg}")]
    MalformedInput { field: String, msg: String },
    #[error("improper rotation matrix with determinant {determinant}")]
    InvalidRotation { determinant: f64 },
    #[error("rotation block is not orthonormal (|RᵀR - I| = {deviation})")]
    NonOrthonormalRotation { deviation: f64 },
    #[error("schema error: {msg}")]
    Schema { msg: String },
    #[error("no calibration provided for sensor {sensor_id}")]
    MissingCalibration { sensor_id: SensorId },
    #[error("incomplete calibration for sensor {sensor_id}: expected <{field}>")]
    MissingField {
        sensor_id: SensorId,
        field: &'static str,
    },
    #[error("sensor {sensor_id}: distortion parameter {name} not supported")]
    UnsupportedDistortion { sensor_id: SensorId, name: String },
    #[error("unknown camera {0}")]
    UnknownCamera(CameraId),
    #[error("unknown sensor {0}")]
    UnknownSensor(SensorId),
    #[error("camera {0} is not aligned")]
    CameraNotAligned(CameraId),
    #[error("xml error: {0}")]
    Xml(#[from] xml::reader::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde_json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("serde_yaml error: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, MetashapeMvgError>;

impl MetashapeMvgError {
    pub(crate) fn schema(msg: impl Into<String>) -> Self {
        MetashapeMvgError::Schema { msg: msg.into() }
    }

    pub(crate) fn malformed(field: impl Into<String>, msg: impl Into<String>) -> Self {
        MetashapeMvgError::MalformedInput {
            field: field.into(),
            msg: msg.into(),
        }
    }
}

/// Read the chunk-level transform from a full camera document.
///
/// The path is `chunk/components/component/transform` and the `components`
/// collection must hold exactly one entry. Multi-component documents are not
/// supported.
pub fn load_chunk_transform(document: &XmlNode) -> Result<HomogeneousTransform> {
    let components = document.child("chunk")?.child("components")?;

    let n_components = components.children().len();
    if n_components != 1 {
        return Err(MetashapeMvgError::schema(format!(
            "expected exactly one entry in <components>, found {n_components}"
        )));
    }
    let transform = components.child("component")?.child("transform")?;

    // An empty element is present but holds zero numbers.
    let rotation = transform.child("rotation")?.text().unwrap_or("");
    let translation = transform.child("translation")?.text().unwrap_or("");
    let scale = transform.child("scale")?.text().unwrap_or("");

    build_transform(rotation, translation, scale)
}

/// Parse every part of a camera document into a [`CameraModelDocument`].
pub fn build_camera_model(document: &XmlNode) -> Result<CameraModelDocument> {
    let chunk_transform = load_chunk_transform(document)?;
    let chunk = document.child("chunk")?;
    let sensors = load_sensors(chunk.child("sensors")?)?;
    let cameras = match chunk.find("cameras") {
        Some(cameras) => load_cameras(cameras)?,
        None => BTreeMap::new(),
    };
    tracing::debug!(
        "parsed camera model with {} sensor(s) and {} camera(s)",
        sensors.len(),
        cameras.len()
    );
    Ok(CameraModelDocument {
        chunk_transform,
        sensors,
        cameras,
    })
}

/// The result of parsing one camera document.
///
/// The chunk transform maps the chunk-local frame (in which the mesh and the
/// camera poses are expressed) to the world frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraModelDocument {
    chunk_transform: HomogeneousTransform,
    sensors: BTreeMap<SensorId, SensorIntrinsics>,
    cameras: BTreeMap<CameraId, CameraPose>,
}

impl CameraModelDocument {
    pub fn new(
        chunk_transform: HomogeneousTransform,
        sensors: BTreeMap<SensorId, SensorIntrinsics>,
        cameras: BTreeMap<CameraId, CameraPose>,
    ) -> Self {
        Self {
            chunk_transform,
            sensors,
            cameras,
        }
    }

    pub fn from_reader<Rd: Read>(reader: Rd) -> Result<Self> {
        let document = XmlNode::from_reader(reader)?;
        build_camera_model(&document)
    }

    pub fn from_xml_str(buf: &str) -> Result<Self> {
        Self::from_reader(buf.as_bytes())
    }

    /// Read a camera document from a path.
    pub fn from_path<P>(path: P) -> Result<Self>
    where
        P: AsRef<std::path::Path>,
    {
        let path = path.as_ref();
        tracing::debug!("reading camera document {}", path.display());
        let rdr = std::io::BufReader::new(std::fs::File::open(path)?);
        Self::from_reader(rdr)
    }

    pub fn chunk_transform(&self) -> &HomogeneousTransform {
        &self.chunk_transform
    }

    pub fn sensors(&self) -> &BTreeMap<SensorId, SensorIntrinsics> {
        &self.sensors
    }

    pub fn sensor(&self, id: SensorId) -> Option<&SensorIntrinsics> {
        self.sensors.get(&id)
    }

    pub fn cameras(&self) -> &BTreeMap<CameraId, CameraPose> {
        &self.cameras
    }

    pub fn camera(&self, id: CameraId) -> Option<&CameraPose> {
        self.cameras.get(&id)
    }

    /// Build a projecting camera in the world frame for an aligned camera.
    pub fn world_camera(&self, id: CameraId) -> Result<WorldCamera> {
        let pose = self
            .cameras
            .get(&id)
            .ok_or(MetashapeMvgError::UnknownCamera(id))?;
        let cam_transform = pose
            .transform
            .as_ref()
            .ok_or(MetashapeMvgError::CameraNotAligned(id))?;
        let sensor = self
            .sensors
            .get(&pose.sensor_id)
            .ok_or(MetashapeMvgError::UnknownSensor(pose.sensor_id))?;
        let world_from_cam = self.chunk_transform.compose(cam_transform);
        WorldCamera::new(
            pose.label.clone(),
            sensor,
            &world_from_cam,
            pose.sensor_id,
        )
    }

    /// Iterate over the world cameras of all aligned cameras.
    pub fn world_cameras(&self) -> impl Iterator<Item = Result<(CameraId, WorldCamera)>> + '_ {
        self.cameras
            .iter()
            .filter(|(_, pose)| pose.is_aligned())
            .map(|(id, _)| self.world_camera(*id).map(|cam| (*id, cam)))
    }

    /// EPSG code of the UTM zone containing the chunk origin.
    pub fn utm_epsg_code(&self, assume_western_hemisphere: bool) -> u32 {
        let origin = nalgebra::Point3::from(self.chunk_transform.translation());
        let geo = geospatial::ecef_to_geodetic(&origin);
        geospatial::utm_epsg_code(geo.lat_deg, geo.lon_deg, assume_western_hemisphere)
    }

    pub fn to_json_writer<W: Write>(&self, writer: &mut W) -> Result<()> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn to_yaml_writer<W: Write>(&self, writer: &mut W) -> Result<()> {
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }
}
