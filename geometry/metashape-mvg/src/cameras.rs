//! Per-image camera poses.
//!
//! ```text
//! <cameras>
//!   <camera id="0" sensor_id="0" label="IMG_0001">
//!     <transform>r00 r01 r02 tx r10 ... 0 0 0 1</transform>
//!   </camera>
//!   <group id="1" label="flight 2" type="folder">
//!     <camera id="1" sensor_id="0" label="IMG_0002"/>
//!   </group>
//! </cameras>
//! ```
//!
//! The transform maps the camera frame (x right, y down, z forward) into the
//! chunk frame. Cameras the upstream tool could not align have none.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{HomogeneousTransform, Result, SensorId, XmlNode};

pub type CameraId = i64;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraPose {
    pub sensor_id: SensorId,
    pub label: Option<String>,
    /// Camera-to-chunk transform, `None` if not aligned.
    pub transform: Option<HomogeneousTransform>,
}

impl CameraPose {
    pub fn is_aligned(&self) -> bool {
        self.transform.is_some()
    }
}

fn parse_camera(camera: &XmlNode) -> Result<(CameraId, CameraPose)> {
    let id: CameraId = camera.parse_attr("id")?;
    let sensor_id: SensorId = camera.parse_attr("sensor_id")?;
    let label = camera.attr("label").map(ToString::to_string);
    let transform = match camera.find("transform") {
        Some(node) => Some(HomogeneousTransform::from_row_major_text(
            node.required_text()?,
        )?),
        None => {
            tracing::debug!("camera {id} ({label:?}) is not aligned");
            None
        }
    };
    Ok((
        id,
        CameraPose {
            sensor_id,
            label,
            transform,
        },
    ))
}

/// Parse every camera of a `<cameras>` collection, including cameras inside
/// `<group>` elements.
///
/// If an id occurs more than once, the later camera replaces the earlier one.
pub fn load_cameras(cameras: &XmlNode) -> Result<BTreeMap<CameraId, CameraPose>> {
    cameras
        .children()
        .iter()
        .flat_map(|child| match child.tag() {
            "group" => child.children().iter().collect::<Vec<_>>(),
            _ => vec![child],
        })
        .filter(|node| node.tag() == "camera")
        .map(parse_camera)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetashapeMvgError;

    const IDENTITY: &str = "1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1";

    fn camera(id: &str, label: &str, transform: Option<&str>) -> XmlNode {
        let mut node = XmlNode::new("camera")
            .with_attr("id", id)
            .with_attr("sensor_id", "0")
            .with_attr("label", label);
        if let Some(t) = transform {
            node = node.with_child(XmlNode::new("transform").with_text(t));
        }
        node
    }

    #[test]
    fn test_cameras_and_groups() {
        let cameras = XmlNode::new("cameras")
            .with_child(camera("0", "IMG_0001", Some(IDENTITY)))
            .with_child(
                XmlNode::new("group")
                    .with_attr("id", "5")
                    .with_child(camera("1", "IMG_0002", None))
                    .with_child(camera("2", "IMG_0003", Some(IDENTITY))),
            );
        let parsed = load_cameras(&cameras).unwrap();
        assert_eq!(parsed.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(parsed[&0].is_aligned());
        assert!(!parsed[&1].is_aligned());
        assert_eq!(parsed[&2].label.as_deref(), Some("IMG_0003"));
        assert_eq!(
            parsed[&0].transform,
            Some(HomogeneousTransform::identity())
        );
    }

    #[test]
    fn test_bad_camera() {
        let cameras = XmlNode::new("cameras").with_child(camera("0", "a", Some("1 0 0 1")));
        assert!(matches!(
            load_cameras(&cameras),
            Err(MetashapeMvgError::MalformedInput { .. })
        ));

        let no_sensor = XmlNode::new("cameras").with_child(XmlNode::new("camera").with_attr("id", "0"));
        assert!(matches!(
            load_cameras(&no_sensor),
            Err(MetashapeMvgError::Schema { .. })
        ));
    }
}
