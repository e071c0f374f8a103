// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Math types for lumen. glam is re-exported so downstream crates agree on
//! one version.

mod camera;

pub use camera::{Camera, CameraInput, DepthConvention, Movement};
pub use glam;
pub use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};
