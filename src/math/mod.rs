//! Rigid transforms and geometric primitives

pub mod aabb;
pub mod ray;
pub mod frustum;
pub mod pose;

pub use aabb::Aabb;
pub use ray::Ray;
pub use frustum::{Plane, Frustum};
pub use pose::Pose;
