//! Property keyword definitions
//!
//! Defines the atom and bond properties recognized in comparisons
//! (`atomno=3`), member access (`{*}.temperature`) and property setters,
//! including their aliases and value types.

use phf::phf_map;

/// Value type of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    /// Integer value (e.g., `atomno`)
    Int,
    /// Floating-point value (e.g., `temperature`)
    Float,
    /// String value (e.g., `element`)
    String,
    /// 3D coordinate (e.g., `xyz`)
    Point,
    /// Set of integers, compared by membership (e.g., `symop`)
    IntSet,
}

/// An atom property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomProperty {
    AtomNo,
    AtomIndex,
    ElemNo,
    Element,
    AtomName,
    Group,
    ResNo,
    Chain,
    Model,
    X,
    Y,
    Z,
    Xyz,
    Occupancy,
    Temperature,
    FormalCharge,
    PartialCharge,
    Radius,
    SymOp,
    Label,
    Color,
}

impl AtomProperty {
    /// Canonical keyword for this property
    pub fn name(self) -> &'static str {
        match self {
            AtomProperty::AtomNo => "atomno",
            AtomProperty::AtomIndex => "atomindex",
            AtomProperty::ElemNo => "elemno",
            AtomProperty::Element => "element",
            AtomProperty::AtomName => "atomname",
            AtomProperty::Group => "group",
            AtomProperty::ResNo => "resno",
            AtomProperty::Chain => "chain",
            AtomProperty::Model => "model",
            AtomProperty::X => "x",
            AtomProperty::Y => "y",
            AtomProperty::Z => "z",
            AtomProperty::Xyz => "xyz",
            AtomProperty::Occupancy => "occupancy",
            AtomProperty::Temperature => "temperature",
            AtomProperty::FormalCharge => "formalcharge",
            AtomProperty::PartialCharge => "partialcharge",
            AtomProperty::Radius => "radius",
            AtomProperty::SymOp => "symop",
            AtomProperty::Label => "label",
            AtomProperty::Color => "color",
        }
    }

    /// Value type produced by the scene for this property
    pub fn value_type(self) -> PropertyType {
        match self {
            AtomProperty::AtomNo
            | AtomProperty::AtomIndex
            | AtomProperty::ElemNo
            | AtomProperty::ResNo
            | AtomProperty::Model
            | AtomProperty::FormalCharge => PropertyType::Int,
            AtomProperty::X
            | AtomProperty::Y
            | AtomProperty::Z
            | AtomProperty::Occupancy
            | AtomProperty::Temperature
            | AtomProperty::PartialCharge
            | AtomProperty::Radius => PropertyType::Float,
            AtomProperty::Element
            | AtomProperty::AtomName
            | AtomProperty::Group
            | AtomProperty::Chain
            | AtomProperty::Label
            | AtomProperty::Color => PropertyType::String,
            AtomProperty::Xyz => PropertyType::Point,
            AtomProperty::SymOp => PropertyType::IntSet,
        }
    }

    /// Whether the property can be aggregated numerically
    pub fn is_numeric(self) -> bool {
        matches!(self.value_type(), PropertyType::Int | PropertyType::Float)
    }

    /// Whether scripts may assign this property
    pub fn is_settable(self) -> bool {
        !matches!(
            self,
            AtomProperty::AtomNo
                | AtomProperty::AtomIndex
                | AtomProperty::ElemNo
                | AtomProperty::Model
                | AtomProperty::SymOp
        )
    }
}

impl std::fmt::Display for AtomProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A bond property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondProperty {
    /// Bond order (1, 2, 3, ...)
    Order,
    /// Distance between the two bonded atoms
    Length,
}

impl BondProperty {
    /// Canonical keyword for this property
    pub fn name(self) -> &'static str {
        match self {
            BondProperty::Order => "order",
            BondProperty::Length => "length",
        }
    }

    /// Value type produced by the scene for this property
    pub fn value_type(self) -> PropertyType {
        match self {
            BondProperty::Order => PropertyType::Int,
            BondProperty::Length => PropertyType::Float,
        }
    }
}

impl std::fmt::Display for BondProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Static map of atom property keywords, including aliases
pub static ATOM_PROPERTIES: phf::Map<&'static str, AtomProperty> = phf_map! {
    "atomno" => AtomProperty::AtomNo,
    "atomindex" => AtomProperty::AtomIndex,
    "atomid" => AtomProperty::AtomIndex,
    "elemno" => AtomProperty::ElemNo,
    "element" => AtomProperty::Element,
    "elem" => AtomProperty::Element,
    "atomname" => AtomProperty::AtomName,
    "name" => AtomProperty::AtomName,
    "group" => AtomProperty::Group,
    "resname" => AtomProperty::Group,
    "resno" => AtomProperty::ResNo,
    "resi" => AtomProperty::ResNo,
    "chain" => AtomProperty::Chain,
    "model" => AtomProperty::Model,
    "modelnumber" => AtomProperty::Model,
    "x" => AtomProperty::X,
    "y" => AtomProperty::Y,
    "z" => AtomProperty::Z,
    "xyz" => AtomProperty::Xyz,
    "occupancy" => AtomProperty::Occupancy,
    "temperature" => AtomProperty::Temperature,
    "bfactor" => AtomProperty::Temperature,
    "formalcharge" => AtomProperty::FormalCharge,
    "charge" => AtomProperty::FormalCharge,
    "partialcharge" => AtomProperty::PartialCharge,
    "radius" => AtomProperty::Radius,
    "symop" => AtomProperty::SymOp,
    "label" => AtomProperty::Label,
    "color" => AtomProperty::Color,
    "colour" => AtomProperty::Color,
};

/// Static map of bond property keywords
pub static BOND_PROPERTIES: phf::Map<&'static str, BondProperty> = phf_map! {
    "order" => BondProperty::Order,
    "bondorder" => BondProperty::Order,
    "length" => BondProperty::Length,
    "bondlength" => BondProperty::Length,
};

/// Look up an atom property keyword (case-insensitive)
pub fn lookup_atom_property(name: &str) -> Option<AtomProperty> {
    ATOM_PROPERTIES.get(name.to_ascii_lowercase().as_str()).copied()
}

/// Look up a bond property keyword (case-insensitive)
pub fn lookup_bond_property(name: &str) -> Option<BondProperty> {
    BOND_PROPERTIES.get(name.to_ascii_lowercase().as_str()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_aliases() {
        assert_eq!(lookup_atom_property("ATOMNO"), Some(AtomProperty::AtomNo));
        assert_eq!(lookup_atom_property("bfactor"), Some(AtomProperty::Temperature));
        assert_eq!(lookup_atom_property("elem"), Some(AtomProperty::Element));
        assert_eq!(lookup_atom_property("nonsense"), None);
        assert_eq!(lookup_bond_property("Order"), Some(BondProperty::Order));
    }

    #[test]
    fn test_canonical_names_round_trip() {
        for (_, prop) in ATOM_PROPERTIES.entries() {
            assert_eq!(lookup_atom_property(prop.name()), Some(*prop));
        }
    }

    #[test]
    fn test_value_types() {
        assert!(AtomProperty::AtomNo.is_numeric());
        assert!(!AtomProperty::Element.is_numeric());
        assert_eq!(AtomProperty::SymOp.value_type(), PropertyType::IntSet);
        assert!(!AtomProperty::AtomNo.is_settable());
        assert!(AtomProperty::Radius.is_settable());
    }
}
