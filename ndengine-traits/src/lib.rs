//! Shared traits for the ndengine workspace.
//!
//! This crate provides the element-type vocabulary used by `ndengine-buffer`,
//! `ndengine-view` and the `ndengine` executor:
//!
//! - [`DataType`]: the closed set of storable numeric types
//! - [`Element`]: a storable scalar (`f32`, `f64`, `i32`)
//! - [`Real`]: a floating-point compute type (`f32`, `f64`)
//! - [`Ordering`]: row-major (`'c'`) or column-major (`'f'`) element ordering

pub mod dtype;
pub mod scalar;

pub use dtype::{DataType, Ordering};
pub use scalar::{Element, Real};
