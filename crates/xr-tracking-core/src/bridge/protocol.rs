//! Wire types exchanged with the native tracking host

use crate::anchor::{AnchorKind, FaceInfo, Geometry, PlaneAlignment, PlaneInfo};
use crate::spatial::{Matrix4, Vector3D};
use crate::video::BufferSize;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::ops::BitOr;
use xr_tracking_config::BridgeConfig;

/// Commands the native host understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BridgeCommand {
    #[serde(rename = "initAR")]
    Init,
    #[serde(rename = "watchAR")]
    Watch,
    #[serde(rename = "stopAR")]
    Stop,
    #[serde(rename = "hitTest")]
    HitTest,
    #[serde(rename = "addAnchor")]
    AddAnchor,
    #[serde(rename = "removeAnchors")]
    RemoveAnchors,
    #[serde(rename = "createImageAnchor")]
    CreateImageAnchor,
    #[serde(rename = "activateDetectionImage")]
    ActivateDetectionImage,
    #[serde(rename = "requestComputerVisionData")]
    RequestComputerVisionData,
    #[serde(rename = "startSendingComputerVisionData")]
    StartComputerVisionData,
    #[serde(rename = "stopSendingComputerVisionData")]
    StopComputerVisionData,
    #[serde(rename = "setUIOptions")]
    SetUiOptions,
}

impl BridgeCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeCommand::Init => "initAR",
            BridgeCommand::Watch => "watchAR",
            BridgeCommand::Stop => "stopAR",
            BridgeCommand::HitTest => "hitTest",
            BridgeCommand::AddAnchor => "addAnchor",
            BridgeCommand::RemoveAnchors => "removeAnchors",
            BridgeCommand::CreateImageAnchor => "createImageAnchor",
            BridgeCommand::ActivateDetectionImage => "activateDetectionImage",
            BridgeCommand::RequestComputerVisionData => "requestComputerVisionData",
            BridgeCommand::StartComputerVisionData => "startSendingComputerVisionData",
            BridgeCommand::StopComputerVisionData => "stopSendingComputerVisionData",
            BridgeCommand::SetUiOptions => "setUIOptions",
        }
    }
}

/// Outbound message: `{commandName, payload, callbackKey}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequest {
    pub command_name: BridgeCommand,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_key: Option<String>,
}

/// What the host streams while watching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    pub location: bool,
    pub camera: bool,
    pub objects: bool,
    pub light_intensity: bool,
    pub computer_vision_data: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for WatchOptions {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            location: config.location,
            camera: config.camera,
            objects: config.objects,
            light_intensity: config.light_intensity,
            computer_vision_data: config.computer_vision_data,
        }
    }
}

/// Native overlay elements shown by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiOptions {
    pub browser: bool,
    pub points: bool,
    pub focus: bool,
    pub rec: bool,
    pub rec_time: bool,
    pub mic: bool,
    pub build: bool,
    pub plane: bool,
    pub warnings: bool,
    pub anchors: bool,
    pub debug: bool,
    pub statistics: bool,
}

impl Default for UiOptions {
    fn default() -> Self {
        Self {
            browser: true,
            points: true,
            focus: false,
            rec: true,
            rec_time: true,
            mic: false,
            build: false,
            plane: true,
            warnings: true,
            anchors: false,
            debug: true,
            statistics: false,
        }
    }
}

/// Hit test result categories, combinable as a bit set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HitTestTypes(pub u32);

impl HitTestTypes {
    pub const FEATURE_POINT: Self = Self(1);
    pub const ESTIMATED_HORIZONTAL_PLANE: Self = Self(2);
    pub const ESTIMATED_VERTICAL_PLANE: Self = Self(4);
    pub const EXISTING_PLANE: Self = Self(8);
    pub const EXISTING_PLANE_USING_EXTENT: Self = Self(16);
    pub const EXISTING_PLANE_USING_GEOMETRY: Self = Self(32);
    pub const EXISTING_PLANES: Self = Self(8 | 16);
    pub const ALL: Self = Self(1 | 2 | 8 | 16);

    pub fn contains(&self, other: HitTestTypes) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for HitTestTypes {
    fn default() -> Self {
        Self::EXISTING_PLANES
    }
}

impl BitOr for HitTestTypes {
    type Output = HitTestTypes;

    fn bitor(self, rhs: Self) -> Self::Output {
        HitTestTypes(self.0 | rhs.0)
    }
}

/// One result of a native hit test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeHit {
    #[serde(rename = "type")]
    pub hit_type: HitTestTypes,
    #[serde(default)]
    pub distance: f32,
    pub world_transform: Matrix4,
    #[serde(default)]
    pub local_transform: Option<Matrix4>,
    /// Present when the hit landed on a tracked anchor
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub anchor_transform: Option<Matrix4>,
    #[serde(default)]
    pub anchor_center: Option<Vector3D>,
    #[serde(default)]
    pub anchor_extent: Option<Vector3D>,
}

/// Native anchor categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeAnchorType {
    Plane,
    Face,
    Anchor,
    Image,
}

/// Anchor or plane as streamed by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeObject {
    pub uuid: String,
    pub transform: Matrix4,
    #[serde(default, rename = "type")]
    pub anchor_type: Option<NativeAnchorType>,
    #[serde(default)]
    pub plane_center: Option<Vector3D>,
    /// x and z are used
    #[serde(default)]
    pub plane_extent: Option<Vector3D>,
    #[serde(default)]
    pub plane_alignment: Option<u8>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default, rename = "blendShapes")]
    pub blend_shapes: Option<HashMap<String, f32>>,
    #[serde(default)]
    pub name: Option<String>,
}

impl NativeObject {
    pub fn plane_extent_xz(&self) -> [f32; 2] {
        self.plane_extent.map_or([0.0, 0.0], |e| [e.x, e.z])
    }

    /// Objects carrying a plane center are planes regardless of the type tag
    pub fn anchor_kind(&self) -> AnchorKind {
        if let Some(center) = self.plane_center {
            return AnchorKind::Plane(PlaneInfo {
                center,
                extent: self.plane_extent_xz(),
                alignment: PlaneAlignment::from_native(self.plane_alignment.unwrap_or(0)),
                geometry: self.geometry.clone(),
            });
        }
        match self.anchor_type {
            Some(NativeAnchorType::Face) => AnchorKind::Face(FaceInfo {
                geometry: self.geometry.clone(),
                blend_shapes: self.blend_shapes.clone().unwrap_or_default(),
            }),
            Some(NativeAnchorType::Image) => AnchorKind::Image {
                name: self.name.clone(),
            },
            _ => AnchorKind::Generic,
        }
    }
}

/// Reply to `activateDetectionImage`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageActivation {
    pub activated: bool,
    pub image_anchor: Option<NativeObject>,
    pub error: Option<String>,
}

/// Per-frame payload pushed while watching
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchData {
    pub timestamp: Option<f64>,
    pub light_intensity: Option<f32>,
    pub camera_transform: Option<Matrix4>,
    pub camera_view: Option<Matrix4>,
    pub projection_camera: Option<Matrix4>,
    #[serde(rename = "newObjects")]
    pub new_objects: Vec<NativeObject>,
    #[serde(rename = "removedObjects")]
    pub removed_objects: Vec<String>,
    pub objects: Vec<NativeObject>,
}

/// Tracking quality reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    Normal,
    Limited,
    LimitedInitializing,
    LimitedExcessiveMotion,
    LimitedInsufficientFeatures,
    NotAvailable,
}

/// Host lifecycle notifications with no payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    RecordStart,
    RecordStop,
    DidMoveBackground,
    WillEnterForeground,
    Interrupted,
    InterruptionEnded,
    ShowDebug,
    UserGrantedComputerVisionData,
    UserGrantedWorldSensingData,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CvBuffer {
    /// Base64 pixel data
    pub buffer: String,
    pub size: BufferSize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CvFrame {
    pub buffers: Vec<CvBuffer>,
    pub pixel_format_type: String,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageResolution {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CvCamera {
    pub camera_intrinsics: [f32; 9],
    pub camera_image_resolution: ImageResolution,
    #[serde(rename = "inverse_viewMatrix")]
    pub inverse_view_matrix: Matrix4,
    pub projection_matrix: Matrix4,
    /// 1 portrait, 2 upside down, 3 landscape right, 4 landscape left
    pub interface_orientation: u8,
}

/// Computer-vision capture as sent by the host
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CvDetail {
    pub frame: Option<CvFrame>,
    pub camera: Option<CvCamera>,
}

/// Everything the host can push into the adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Reply to a command: `{callbackKey, data}`
    #[serde(rename_all = "camelCase")]
    Callback {
        callback_key: String,
        #[serde(default)]
        data: Value,
    },
    Watch(WatchData),
    ComputerVisionData {
        #[serde(default)]
        detail: Option<CvDetail>,
    },
    NativeTime {
        native_time: f64,
    },
    TrackingChanged {
        state: TrackingState,
    },
    Error {
        domain: String,
        code: i64,
        message: String,
    },
    WindowResize {
        width: f32,
        height: f32,
        #[serde(default)]
        focal_length: Option<f32>,
    },
    Lifecycle {
        event: LifecycleEvent,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::TextureCoordinate;
    use serde_json::json;

    fn identity() -> Value {
        json!([1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1])
    }

    #[test]
    fn test_request_wire_format() {
        let request = BridgeRequest {
            command_name: BridgeCommand::HitTest,
            payload: json!({"x": 0.5, "y": 0.5, "type": 24}),
            callback_key: Some("hitTest-1-2".to_string()),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["commandName"], "hitTest");
        assert_eq!(value["callbackKey"], "hitTest-1-2");

        let fire_and_forget = BridgeRequest {
            command_name: BridgeCommand::RemoveAnchors,
            payload: json!(["a"]),
            callback_key: None,
        };
        let value = serde_json::to_value(&fire_and_forget).unwrap();
        assert!(value.get("callbackKey").is_none());
    }

    #[test]
    fn test_parse_callback_and_watch() {
        let callback: InboundMessage = serde_json::from_value(json!({
            "type": "callback",
            "callbackKey": "stop-1-1",
        }))
        .unwrap();
        assert!(matches!(callback, InboundMessage::Callback { ref callback_key, .. } if callback_key == "stop-1-1"));

        let watch: InboundMessage = serde_json::from_value(json!({
            "type": "watch",
            "timestamp": 12.5,
            "light_intensity": 800,
            "newObjects": [{
                "uuid": "p1",
                "transform": identity(),
                "type": "plane",
                "plane_center": {"x": 0, "y": 0, "z": 0},
                "plane_extent": {"x": 2, "z": 1},
                "plane_alignment": 0
            }],
            "removedObjects": ["old"]
        }))
        .unwrap();

        let InboundMessage::Watch(data) = watch else {
            panic!("expected watch data");
        };
        assert_eq!(data.removed_objects, vec!["old".to_string()]);
        match data.new_objects[0].anchor_kind() {
            AnchorKind::Plane(plane) => {
                assert_eq!(plane.extent, [2.0, 1.0]);
                assert_eq!(plane.alignment, PlaneAlignment::Horizontal);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_face_and_image_kinds() {
        let face: NativeObject = serde_json::from_value(json!({
            "uuid": "f1",
            "transform": identity(),
            "type": "face",
            "blendShapes": {"jawOpen": 0.4}
        }))
        .unwrap();
        match face.anchor_kind() {
            AnchorKind::Face(info) => assert!((info.blend_shapes["jawOpen"] - 0.4).abs() < 0.0001),
            other => panic!("unexpected kind {other:?}"),
        }

        let generic: NativeObject = serde_json::from_value(json!({
            "uuid": "a1",
            "transform": identity(),
        }))
        .unwrap();
        assert_eq!(generic.anchor_kind(), AnchorKind::Generic);
    }

    #[test]
    fn test_hit_type_bits() {
        assert!(HitTestTypes::ALL.contains(HitTestTypes::FEATURE_POINT));
        assert!(!HitTestTypes::EXISTING_PLANES.contains(HitTestTypes::FEATURE_POINT));
        assert_eq!(
            HitTestTypes::EXISTING_PLANE | HitTestTypes::EXISTING_PLANE_USING_EXTENT,
            HitTestTypes::EXISTING_PLANES
        );
        // texture coordinates are part of the geometry payload
        let geometry: Geometry = serde_json::from_value(json!({
            "vertices": [{"x": 1, "y": 0, "z": 0}],
            "textureCoordinates": [{"x": 0.5, "y": 0.5}]
        }))
        .unwrap();
        assert_eq!(geometry.texture_coordinates[0], TextureCoordinate { x: 0.5, y: 0.5 });
    }
}
