//! Mutable per-display pose state
//!
//! A display writes here once per frame; coordinate systems read from it
//! whenever they resolve.

use super::view::{FieldOfView, View};
use crate::shared::{read, write};
use crate::spatial::Matrix4;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
pub struct DisplayState {
    pub head_pose: Matrix4,
    pub eye_level_pose: Matrix4,
    /// Backend-global tracker origin
    pub tracker_pose: Matrix4,
    pub views: Vec<View>,
    pub fov: FieldOfView,
    pub depth_near: f32,
    pub depth_far: f32,
}

impl DisplayState {
    pub fn new(views: Vec<View>, fov: FieldOfView, depth_near: f32, depth_far: f32) -> Self {
        Self {
            head_pose: Matrix4::IDENTITY,
            eye_level_pose: Matrix4::IDENTITY,
            tracker_pose: Matrix4::IDENTITY,
            views,
            fov,
            depth_near,
            depth_far,
        }
    }
}

/// Shared handle to a display's pose state
#[derive(Debug, Clone)]
pub struct DisplayHandle(Arc<RwLock<DisplayState>>);

impl DisplayHandle {
    pub fn new(state: DisplayState) -> Self {
        Self(Arc::new(RwLock::new(state)))
    }

    pub fn snapshot(&self) -> DisplayState {
        read(&self.0).clone()
    }

    pub fn head_pose(&self) -> Matrix4 {
        read(&self.0).head_pose
    }

    pub fn eye_level_pose(&self) -> Matrix4 {
        read(&self.0).eye_level_pose
    }

    pub fn tracker_pose(&self) -> Matrix4 {
        read(&self.0).tracker_pose
    }

    pub fn views(&self) -> Vec<View> {
        read(&self.0).views.clone()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut DisplayState) -> R) -> R {
        f(&mut write(&self.0))
    }

    /// True when both handles point at the same display
    pub fn same_display(&self, other: &DisplayHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
