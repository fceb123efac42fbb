//! Scene capability interface
//!
//! This module defines the `Scene` trait the interpreter drives. Queries take
//! `&self`; every observable effect takes `&mut self` so that the executor can
//! route all of them through a single place and skip them in syntax-check mode.

use lin_alg::f64::Vec3;
use molscript_select::{AtomProperty, BondProperty, Selection};

use crate::error::SceneResult;
use crate::value::PropertyValue;

/// A named atom set provided by the scene (`hydrogen`, `water`, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct NamedSet {
    /// Atoms in the set at evaluation time
    pub selection: Selection,
    /// Whether the set must be recomputed on every use rather than cached
    pub dynamic: bool,
}

impl NamedSet {
    /// A set that may be cached until the scene changes
    pub fn fixed(selection: Selection) -> Self {
        Self {
            selection,
            dynamic: false,
        }
    }

    /// A set that is recomputed on every use
    pub fn dynamic(selection: Selection) -> Self {
        Self {
            selection,
            dynamic: true,
        }
    }
}

/// Kind of shape object addressed by `getProperty`/`setProperty` style calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Draw,
    Isosurface,
    Measures,
    Echo,
    Axes,
    UnitCell,
}

impl ShapeKind {
    /// Parse a shape kind from its script keyword
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "draw" => Some(ShapeKind::Draw),
            "isosurface" => Some(ShapeKind::Isosurface),
            "measure" | "measures" | "measurements" => Some(ShapeKind::Measures),
            "echo" => Some(ShapeKind::Echo),
            "axes" => Some(ShapeKind::Axes),
            "unitcell" => Some(ShapeKind::UnitCell),
            _ => None,
        }
    }

    /// Script keyword for this shape kind
    pub fn name(self) -> &'static str {
        match self {
            ShapeKind::Draw => "draw",
            ShapeKind::Isosurface => "isosurface",
            ShapeKind::Measures => "measures",
            ShapeKind::Echo => "echo",
            ShapeKind::Axes => "axes",
            ShapeKind::UnitCell => "unitcell",
        }
    }
}

/// Coordinate axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Parse an axis name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "x" => Some(Axis::X),
            "y" => Some(Axis::Y),
            "z" => Some(Axis::Z),
            _ => None,
        }
    }
}

/// A change to the camera/view
#[derive(Debug, Clone, Copy)]
pub enum ViewChange {
    /// Rotate about an axis
    Rotate { axis: Axis, degrees: f64 },
    /// Translate along an axis (percent of the view)
    Translate { axis: Axis, amount: f64 },
    /// Set the zoom percentage
    Zoom(f64),
    /// Center the view on a point
    Center(Vec3),
    /// Reset to the default view
    Reset,
}

impl PartialEq for ViewChange {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                ViewChange::Rotate { axis: a, degrees: d },
                ViewChange::Rotate { axis: b, degrees: e },
            ) => a == b && d == e,
            (
                ViewChange::Translate { axis: a, amount: d },
                ViewChange::Translate { axis: b, amount: e },
            ) => a == b && d == e,
            (ViewChange::Zoom(a), ViewChange::Zoom(b)) => a == b,
            (ViewChange::Center(a), ViewChange::Center(b)) => {
                a.x == b.x && a.y == b.y && a.z == b.z
            }
            (ViewChange::Reset, ViewChange::Reset) => true,
            _ => false,
        }
    }
}

/// Capability interface between the interpreter and the structural scene
///
/// Atom indices are zero-based and dense in `[0, atom_count())`; bond indices
/// likewise in `[0, bond_count())`.
pub trait Scene {
    // =========================================================================
    // Queries
    // =========================================================================

    /// Number of atoms in the scene
    fn atom_count(&self) -> usize;

    /// Number of bonds in the scene
    fn bond_count(&self) -> usize;

    /// Value of an atom property; `Undefined` when the atom has none
    fn atom_property(&self, index: usize, property: AtomProperty) -> PropertyValue;

    /// Value of a bond property
    fn bond_property(&self, index: usize, property: BondProperty) -> PropertyValue;

    /// The two atoms joined by a bond
    fn bond_atoms(&self, index: usize) -> Option<(usize, usize)>;

    /// Evaluate a scene-provided named set; `None` if the name is unknown
    fn named_set(&self, name: &str) -> Option<NamedSet>;

    /// Atoms that have been deleted and must never appear in a result
    fn deleted_atoms(&self) -> Selection;

    /// The current selection (`selected`)
    fn selected_atoms(&self) -> Selection;

    /// Atoms currently hidden
    fn hidden_atoms(&self) -> Selection;

    /// Atom position
    fn atom_position(&self, index: usize) -> Option<Vec3> {
        match self.atom_property(index, AtomProperty::Xyz) {
            PropertyValue::Point(p) => Some(p),
            _ => None,
        }
    }

    /// Value of a system parameter; `None` if the name is unknown
    fn parameter(&self, name: &str) -> Option<PropertyValue>;

    /// Parameters that differ from their defaults, in definition order
    fn changed_parameters(&self) -> Vec<(String, PropertyValue)>;

    /// Read a free-form shape property
    fn shape_property(&self, kind: ShapeKind, name: &str) -> Option<PropertyValue>;

    /// Read a text file (script sources) through the scene's file access
    fn read_file(&self, path: &str) -> SceneResult<String>;

    // =========================================================================
    // Effects
    // =========================================================================

    /// Assign a property to every atom in a selection
    fn set_atom_property(
        &mut self,
        atoms: &Selection,
        property: AtomProperty,
        value: &PropertyValue,
    ) -> SceneResult;

    /// Set a system parameter; returns `false` if the name is unknown
    fn set_parameter(&mut self, name: &str, value: PropertyValue) -> SceneResult<bool>;

    /// Reset a system parameter to its default; returns `false` if unknown
    fn reset_parameter(&mut self, name: &str) -> bool;

    /// Replace the current selection
    fn set_selected_atoms(&mut self, atoms: &Selection);

    /// Show or hide atoms
    fn set_visibility(&mut self, atoms: &Selection, visible: bool);

    /// Delete atoms; returns the number of atoms newly deleted
    fn delete_atoms(&mut self, atoms: &Selection) -> usize;

    /// Load a structure file, optionally appending to the current model set
    fn load_file(&mut self, path: &str, append: bool) -> SceneResult;

    /// Remove everything from the scene
    fn zap(&mut self);

    /// Create or modify a shape property
    fn set_shape_property(
        &mut self,
        kind: ShapeKind,
        name: &str,
        value: PropertyValue,
    ) -> SceneResult;

    /// Change the view
    fn transform_view(&mut self, change: ViewChange);

    /// Request a rendering refresh
    fn render_refresh(&mut self);

    /// Enter (`true`) or leave (`false`) a held-refresh bracket
    ///
    /// Brackets nest: refreshes are batched until the outermost bracket ends.
    fn hold_refresh(&mut self, hold: bool);
}
