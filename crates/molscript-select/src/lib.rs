//! Selection values for the molscript engine
//!
//! This crate provides the value side of the structural query language:
//! an immutable-by-convention bitset over atom or bond indices together
//! with the operations the interpreter needs on it.
//!
//! # Overview
//!
//! - [`Selection`]: bitset over a fixed universe of atoms or bonds
//! - Set algebra: `union`, `intersection`, `difference`, `complement`
//! - Canonical text form: `({0 2:4})` for atoms, `[{1 3}]` for bonds
//! - [`CompareOp`]: comparison operators used by property predicates
//! - [`AtomProperty`] / [`BondProperty`]: static keyword tables
//!
//! # Example
//!
//! ```rust
//! use molscript_select::Selection;
//!
//! let sel: Selection = "({0 2:4})".parse().unwrap();
//! assert_eq!(sel.count(), 4);
//! assert_eq!(sel.to_string(), "({0 2:4})");
//! ```

mod compare;
mod error;
mod escape;
mod keywords;
mod selection;

pub use compare::CompareOp;
pub use error::{SelectError, SelectResult};
pub use escape::{parse_escaped, MAX_ESCAPED_INDEX};
pub use keywords::{
    lookup_atom_property, lookup_bond_property, AtomProperty, BondProperty, PropertyType,
};
pub use selection::{Selection, SetKind};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::compare::CompareOp;
    pub use crate::keywords::{AtomProperty, BondProperty, PropertyType};
    pub use crate::selection::{Selection, SetKind};
}
