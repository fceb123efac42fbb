//! Scene abstraction for the molscript engine
//!
//! The interpreter never touches atoms, bonds or shapes directly. Every
//! query and every observable effect goes through the [`Scene`] trait,
//! which this crate defines together with the values that cross it.
//!
//! # Overview
//!
//! - [`Scene`]: capability interface (queries and effects)
//! - [`PropertyValue`]: scene-side value of a property or parameter
//! - [`ParameterStore`]: typed system parameters with defaults
//! - [`MemoryScene`]: in-memory implementation used by tests and embedders
//!
//! # Example
//!
//! ```rust
//! use molscript_scene::{MemoryScene, Scene, PropertyValue};
//! use molscript_select::AtomProperty;
//!
//! let scene = MemoryScene::with_atoms(5);
//! assert_eq!(scene.atom_count(), 5);
//! assert_eq!(scene.atom_property(0, AtomProperty::AtomNo), PropertyValue::Int(1));
//! ```

mod error;
mod memory;
mod parameters;
mod scene;
mod value;

pub use error::{SceneError, SceneResult};
pub use memory::{Atom, Bond, MemoryScene, ViewState};
pub use parameters::{ParamDefault, ParameterDef, ParameterStore, PARAMETERS};
pub use scene::{Axis, NamedSet, Scene, ShapeKind, ViewChange};
pub use value::PropertyValue;

/// Re-export of the point type used for coordinates
pub use lin_alg::f64::Vec3;
