//! In-memory scene
//!
//! `MemoryScene` keeps atoms, bonds, shapes and parameters in plain vectors
//! and maps. It backs the interpreter tests and is small enough to embed
//! where no renderer exists. "Files" are registered up front: script texts
//! for `read_file` and atom lists for `load_file`.

use ahash::AHashMap;
use lin_alg::f64::Vec3;
use log::debug;
use molscript_select::{AtomProperty, BondProperty, Selection};
use phf::phf_map;

use crate::error::{SceneError, SceneResult};
use crate::parameters::ParameterStore;
use crate::scene::{Axis, NamedSet, Scene, ShapeKind, ViewChange};
use crate::value::PropertyValue;

static ELEMENT_NUMBERS: phf::Map<&'static str, i32> = phf_map! {
    "H" => 1,
    "C" => 6,
    "N" => 7,
    "O" => 8,
    "F" => 9,
    "P" => 15,
    "S" => 16,
    "CL" => 17,
    "FE" => 26,
    "ZN" => 30,
};

fn element_number(symbol: &str) -> i32 {
    ELEMENT_NUMBERS
        .get(symbol.to_ascii_uppercase().as_str())
        .copied()
        .unwrap_or(0)
}

/// One atom of a [`MemoryScene`]
#[derive(Debug, Clone)]
pub struct Atom {
    pub atomno: i32,
    pub element: String,
    pub name: String,
    pub group: String,
    pub resno: i32,
    pub chain: String,
    pub model: i32,
    pub position: Vec3,
    pub occupancy: f64,
    pub temperature: f64,
    pub formal_charge: i32,
    /// `None` until charges are assigned
    pub partial_charge: Option<f64>,
    pub radius: f64,
    pub symops: Vec<i32>,
    pub label: String,
    pub color: String,
}

impl Atom {
    /// Create an atom of the given element at a position
    pub fn new(element: &str, position: Vec3) -> Self {
        Self {
            atomno: 0,
            element: element.to_string(),
            name: element.to_ascii_uppercase(),
            group: "UNK".to_string(),
            resno: 1,
            chain: "A".to_string(),
            model: 1,
            position,
            occupancy: 1.0,
            temperature: 0.0,
            formal_charge: 0,
            partial_charge: None,
            radius: 1.7,
            symops: Vec::new(),
            label: String::new(),
            color: "cpk".to_string(),
        }
    }

    pub fn with_atomno(mut self, atomno: i32) -> Self {
        self.atomno = atomno;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set residue name and number
    pub fn with_group(mut self, group: &str, resno: i32) -> Self {
        self.group = group.to_string();
        self.resno = resno;
        self
    }

    pub fn with_chain(mut self, chain: &str) -> Self {
        self.chain = chain.to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_partial_charge(mut self, charge: f64) -> Self {
        self.partial_charge = Some(charge);
        self
    }

    pub fn with_symops(mut self, symops: Vec<i32>) -> Self {
        self.symops = symops;
        self
    }

    fn same_as(&self, other: &Atom) -> bool {
        self.atomno == other.atomno
            && self.element == other.element
            && self.name == other.name
            && self.group == other.group
            && self.resno == other.resno
            && self.chain == other.chain
            && self.model == other.model
            && same_point(self.position, other.position)
            && self.occupancy == other.occupancy
            && self.temperature == other.temperature
            && self.formal_charge == other.formal_charge
            && self.partial_charge == other.partial_charge
            && self.radius == other.radius
            && self.symops == other.symops
            && self.label == other.label
            && self.color == other.color
    }
}

fn same_point(a: Vec3, b: Vec3) -> bool {
    a.x == b.x && a.y == b.y && a.z == b.z
}

/// A bond between two atoms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bond {
    pub atom1: usize,
    pub atom2: usize,
    pub order: i32,
}

/// Camera state changed by view commands
#[derive(Debug, Clone, Copy)]
pub struct ViewState {
    /// Zoom in percent
    pub zoom: f64,
    pub center: Vec3,
    /// Accumulated rotation per axis, degrees
    pub rotation: [f64; 3],
    /// Accumulated translation per axis
    pub translation: [f64; 3],
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            zoom: 100.0,
            center: Vec3::new(0.0, 0.0, 0.0),
            rotation: [0.0; 3],
            translation: [0.0; 3],
        }
    }
}

impl PartialEq for ViewState {
    fn eq(&self, other: &Self) -> bool {
        self.zoom == other.zoom
            && same_point(self.center, other.center)
            && self.rotation == other.rotation
            && self.translation == other.translation
    }
}

impl ViewState {
    fn apply(&mut self, change: ViewChange) {
        let axis_index = |axis: Axis| match axis {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        };
        match change {
            ViewChange::Rotate { axis, degrees } => {
                let i = axis_index(axis);
                self.rotation[i] = (self.rotation[i] + degrees) % 360.0;
            }
            ViewChange::Translate { axis, amount } => {
                self.translation[axis_index(axis)] += amount;
            }
            ViewChange::Zoom(zoom) => self.zoom = zoom,
            ViewChange::Center(center) => self.center = center,
            ViewChange::Reset => *self = ViewState::default(),
        }
    }
}

/// In-memory implementation of [`Scene`]
#[derive(Debug, Clone, Default)]
pub struct MemoryScene {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    deleted: Selection,
    selected: Selection,
    hidden: Selection,
    named_sets: AHashMap<String, NamedSet>,
    parameters: ParameterStore,
    shapes: AHashMap<(ShapeKind, String), PropertyValue>,
    view: ViewState,
    files: AHashMap<String, String>,
    structures: AHashMap<String, Vec<Atom>>,
    loaded: Vec<String>,
    refresh_count: usize,
    hold_depth: usize,
    refresh_pending: bool,
}

impl MemoryScene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scene of `n` bonded carbon atoms spaced 1.5 Å along x
    ///
    /// Atom `i` has atom number `i + 1` and temperature `10 * i`.
    pub fn with_atoms(n: usize) -> Self {
        let mut scene = Self::new();
        for i in 0..n {
            let atom = Atom::new("C", Vec3::new(i as f64 * 1.5, 0.0, 0.0))
                .with_atomno(i as i32 + 1)
                .with_name(&format!("C{}", i + 1))
                .with_temperature(i as f64 * 10.0);
            scene.add_atom(atom);
        }
        for i in 1..n {
            scene.add_bond(i - 1, i, 1);
        }
        scene
    }

    /// Append an atom and return its index
    pub fn add_atom(&mut self, atom: Atom) -> usize {
        self.atoms.push(atom);
        self.sync_universe();
        self.atoms.len() - 1
    }

    /// Append a bond and return its index
    pub fn add_bond(&mut self, atom1: usize, atom2: usize, order: i32) -> usize {
        self.bonds.push(Bond {
            atom1,
            atom2,
            order,
        });
        self.bonds.len() - 1
    }

    /// Register a named set
    pub fn define_named_set(&mut self, name: &str, set: NamedSet) {
        self.named_sets.insert(name.to_ascii_lowercase(), set);
    }

    /// Register a text file readable through [`Scene::read_file`]
    pub fn add_file(&mut self, path: &str, contents: &str) {
        self.files.insert(path.to_string(), contents.to_string());
    }

    /// Register a structure loadable through [`Scene::load_file`]
    pub fn add_structure(&mut self, path: &str, atoms: Vec<Atom>) {
        self.structures.insert(path.to_string(), atoms);
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn parameters(&self) -> &ParameterStore {
        &self.parameters
    }

    /// Paths loaded so far, in order
    pub fn loaded_files(&self) -> &[String] {
        &self.loaded
    }

    /// Number of refreshes actually performed
    pub fn refresh_count(&self) -> usize {
        self.refresh_count
    }

    /// Current nesting of held-refresh brackets
    pub fn hold_depth(&self) -> usize {
        self.hold_depth
    }

    fn sync_universe(&mut self) {
        let n = self.atoms.len();
        self.deleted = self.deleted.resized(n);
        self.selected = self.selected.resized(n);
        self.hidden = self.hidden.resized(n);
    }

    fn atoms_where(&self, pred: impl Fn(&Atom) -> bool) -> Selection {
        Selection::from_indices(
            self.atoms.len(),
            self.atoms
                .iter()
                .enumerate()
                .filter(|(_, a)| pred(a))
                .map(|(i, _)| i),
        )
    }

    fn element_set(&self, symbol: &str) -> NamedSet {
        NamedSet::fixed(self.atoms_where(|a| a.element.eq_ignore_ascii_case(symbol)))
    }
}

impl PartialEq for MemoryScene {
    fn eq(&self, other: &Self) -> bool {
        fn same_map<K, V>(a: &AHashMap<K, V>, b: &AHashMap<K, V>, eq: impl Fn(&V, &V) -> bool) -> bool
        where
            K: Eq + std::hash::Hash,
        {
            a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| eq(v, w)))
        }

        self.atoms.len() == other.atoms.len()
            && self.atoms.iter().zip(&other.atoms).all(|(a, b)| a.same_as(b))
            && self.bonds == other.bonds
            && self.deleted == other.deleted
            && self.selected == other.selected
            && self.hidden == other.hidden
            && same_map(&self.named_sets, &other.named_sets, |a, b| a == b)
            && self.parameters == other.parameters
            && same_map(&self.shapes, &other.shapes, |a, b| a == b)
            && self.view == other.view
            && self.loaded == other.loaded
            && self.refresh_count == other.refresh_count
    }
}

impl Scene for MemoryScene {
    fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    fn atom_property(&self, index: usize, property: AtomProperty) -> PropertyValue {
        let Some(atom) = self.atoms.get(index) else {
            return PropertyValue::Undefined;
        };
        match property {
            AtomProperty::AtomNo => PropertyValue::Int(atom.atomno),
            AtomProperty::AtomIndex => PropertyValue::Int(index as i32),
            AtomProperty::ElemNo => PropertyValue::Int(element_number(&atom.element)),
            AtomProperty::Element => PropertyValue::Str(atom.element.clone()),
            AtomProperty::AtomName => PropertyValue::Str(atom.name.clone()),
            AtomProperty::Group => PropertyValue::Str(atom.group.clone()),
            AtomProperty::ResNo => PropertyValue::Int(atom.resno),
            AtomProperty::Chain => PropertyValue::Str(atom.chain.clone()),
            AtomProperty::Model => PropertyValue::Int(atom.model),
            AtomProperty::X => PropertyValue::Float(atom.position.x),
            AtomProperty::Y => PropertyValue::Float(atom.position.y),
            AtomProperty::Z => PropertyValue::Float(atom.position.z),
            AtomProperty::Xyz => PropertyValue::Point(atom.position),
            AtomProperty::Occupancy => PropertyValue::Float(atom.occupancy),
            AtomProperty::Temperature => PropertyValue::Float(atom.temperature),
            AtomProperty::FormalCharge => PropertyValue::Int(atom.formal_charge),
            AtomProperty::PartialCharge => atom
                .partial_charge
                .map_or(PropertyValue::Undefined, PropertyValue::Float),
            AtomProperty::Radius => PropertyValue::Float(atom.radius),
            AtomProperty::SymOp => PropertyValue::IntSet(atom.symops.clone()),
            AtomProperty::Label => PropertyValue::Str(atom.label.clone()),
            AtomProperty::Color => PropertyValue::Str(atom.color.clone()),
        }
    }

    fn bond_property(&self, index: usize, property: BondProperty) -> PropertyValue {
        let Some(bond) = self.bonds.get(index) else {
            return PropertyValue::Undefined;
        };
        match property {
            BondProperty::Order => PropertyValue::Int(bond.order),
            BondProperty::Length => {
                match (self.atoms.get(bond.atom1), self.atoms.get(bond.atom2)) {
                    (Some(a), Some(b)) => {
                        PropertyValue::Float((a.position - b.position).magnitude())
                    }
                    _ => PropertyValue::Undefined,
                }
            }
        }
    }

    fn bond_atoms(&self, index: usize) -> Option<(usize, usize)> {
        self.bonds.get(index).map(|b| (b.atom1, b.atom2))
    }

    fn named_set(&self, name: &str) -> Option<NamedSet> {
        let key = name.to_ascii_lowercase();
        if let Some(set) = self.named_sets.get(&key) {
            return Some(set.clone());
        }
        let n = self.atoms.len();
        let set = match key.as_str() {
            "all" => NamedSet::fixed(Selection::all(n)),
            "none" => NamedSet::fixed(Selection::new(n)),
            "selected" => NamedSet::dynamic(self.selected.clone()),
            "hidden" => NamedSet::dynamic(self.hidden.clone()),
            "visible" => NamedSet::dynamic(self.hidden.complement()),
            "hydrogen" => self.element_set("H"),
            "carbon" => self.element_set("C"),
            "nitrogen" => self.element_set("N"),
            "oxygen" => self.element_set("O"),
            "sulfur" => self.element_set("S"),
            "water" => NamedSet::fixed(self.atoms_where(|a| {
                matches!(a.group.to_ascii_uppercase().as_str(), "HOH" | "WAT" | "H2O")
            })),
            _ => return None,
        };
        Some(set)
    }

    fn deleted_atoms(&self) -> Selection {
        self.deleted.clone()
    }

    fn selected_atoms(&self) -> Selection {
        self.selected.clone()
    }

    fn hidden_atoms(&self) -> Selection {
        self.hidden.clone()
    }

    fn parameter(&self, name: &str) -> Option<PropertyValue> {
        self.parameters.get(name)
    }

    fn changed_parameters(&self) -> Vec<(String, PropertyValue)> {
        self.parameters.changed()
    }

    fn shape_property(&self, kind: ShapeKind, name: &str) -> Option<PropertyValue> {
        self.shapes.get(&(kind, name.to_ascii_lowercase())).cloned()
    }

    fn read_file(&self, path: &str) -> SceneResult<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| SceneError::FileNotFound(path.to_string()))
    }

    fn set_atom_property(
        &mut self,
        atoms: &Selection,
        property: AtomProperty,
        value: &PropertyValue,
    ) -> SceneResult {
        if !property.is_settable() {
            return Err(SceneError::ReadOnly(property.name().to_string()));
        }
        let mismatch =
            |expected| SceneError::type_mismatch(property.name(), expected, value.type_name());
        for i in atoms.indices() {
            let Some(atom) = self.atoms.get_mut(i) else {
                continue;
            };
            match property {
                AtomProperty::Element => atom.element = value.to_string(),
                AtomProperty::AtomName => atom.name = value.to_string(),
                AtomProperty::Group => atom.group = value.to_string(),
                AtomProperty::Chain => atom.chain = value.to_string(),
                AtomProperty::Label => atom.label = value.to_string(),
                AtomProperty::Color => atom.color = value.to_string(),
                AtomProperty::ResNo => {
                    atom.resno = value.as_int().ok_or_else(|| mismatch("integer"))?
                }
                AtomProperty::FormalCharge => {
                    atom.formal_charge = value.as_int().ok_or_else(|| mismatch("integer"))?
                }
                AtomProperty::X | AtomProperty::Y | AtomProperty::Z => {
                    let v = value.as_f64().ok_or_else(|| mismatch("decimal"))?;
                    let p = atom.position;
                    atom.position = match property {
                        AtomProperty::X => Vec3::new(v, p.y, p.z),
                        AtomProperty::Y => Vec3::new(p.x, v, p.z),
                        _ => Vec3::new(p.x, p.y, v),
                    };
                }
                AtomProperty::Xyz => match value {
                    PropertyValue::Point(p) => atom.position = *p,
                    _ => return Err(mismatch("point")),
                },
                AtomProperty::Occupancy => {
                    atom.occupancy = value.as_f64().ok_or_else(|| mismatch("decimal"))?
                }
                AtomProperty::Temperature => {
                    atom.temperature = value.as_f64().ok_or_else(|| mismatch("decimal"))?
                }
                AtomProperty::PartialCharge => {
                    atom.partial_charge = Some(value.as_f64().ok_or_else(|| mismatch("decimal"))?)
                }
                AtomProperty::Radius => {
                    atom.radius = value.as_f64().ok_or_else(|| mismatch("decimal"))?
                }
                AtomProperty::AtomNo
                | AtomProperty::AtomIndex
                | AtomProperty::ElemNo
                | AtomProperty::Model
                | AtomProperty::SymOp => {
                    return Err(SceneError::ReadOnly(property.name().to_string()))
                }
            }
        }
        Ok(())
    }

    fn set_parameter(&mut self, name: &str, value: PropertyValue) -> SceneResult<bool> {
        self.parameters.set(name, value)
    }

    fn reset_parameter(&mut self, name: &str) -> bool {
        self.parameters.reset(name)
    }

    fn set_selected_atoms(&mut self, atoms: &Selection) {
        self.selected = atoms.resized(self.atoms.len());
    }

    fn set_visibility(&mut self, atoms: &Selection, visible: bool) {
        let atoms = atoms.resized(self.atoms.len());
        if visible {
            self.hidden.subtract(&atoms);
        } else {
            self.hidden.union_with(&atoms);
        }
    }

    fn delete_atoms(&mut self, atoms: &Selection) -> usize {
        let atoms = atoms.resized(self.atoms.len());
        let newly = atoms.difference(&self.deleted).count();
        self.deleted.union_with(&atoms);
        self.selected.subtract(&atoms);
        newly
    }

    fn load_file(&mut self, path: &str, append: bool) -> SceneResult {
        let atoms = self
            .structures
            .get(path)
            .cloned()
            .ok_or_else(|| SceneError::FileNotFound(path.to_string()))?;
        if !append {
            self.zap();
        }
        let model = self.atoms.iter().map(|a| a.model).max().unwrap_or(0) + 1;
        for mut atom in atoms {
            atom.model = model;
            self.atoms.push(atom);
        }
        self.sync_universe();
        debug!("Loaded {} as model {}", path, model);
        self.loaded.push(path.to_string());
        Ok(())
    }

    fn zap(&mut self) {
        debug!("Zapping {} atoms", self.atoms.len());
        self.atoms.clear();
        self.bonds.clear();
        self.named_sets.clear();
        self.shapes.clear();
        self.view = ViewState::default();
        self.deleted = Selection::new(0);
        self.selected = Selection::new(0);
        self.hidden = Selection::new(0);
    }

    fn set_shape_property(
        &mut self,
        kind: ShapeKind,
        name: &str,
        value: PropertyValue,
    ) -> SceneResult {
        if kind == ShapeKind::UnitCell {
            return Err(SceneError::NoUnitCell);
        }
        let key = (kind, name.to_ascii_lowercase());
        if value.is_undefined() {
            self.shapes
                .remove(&key)
                .map(|_| ())
                .ok_or_else(|| SceneError::ShapeNotDefined(name.to_string()))
        } else {
            self.shapes.insert(key, value);
            Ok(())
        }
    }

    fn transform_view(&mut self, change: ViewChange) {
        self.view.apply(change);
    }

    fn render_refresh(&mut self) {
        if self.hold_depth > 0 {
            self.refresh_pending = true;
        } else {
            self.refresh_count += 1;
        }
    }

    fn hold_refresh(&mut self, hold: bool) {
        if hold {
            self.hold_depth += 1;
            return;
        }
        self.hold_depth = self.hold_depth.saturating_sub(1);
        if self.hold_depth == 0 && self.refresh_pending {
            self.refresh_pending = false;
            self.refresh_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_atoms() {
        let scene = MemoryScene::with_atoms(5);
        assert_eq!(scene.atom_count(), 5);
        assert_eq!(scene.bond_count(), 4);
        assert_eq!(scene.atom_property(2, AtomProperty::AtomNo), PropertyValue::Int(3));
        assert_eq!(scene.atom_property(2, AtomProperty::X), PropertyValue::Float(3.0));
        assert_eq!(scene.atom_property(9, AtomProperty::X), PropertyValue::Undefined);
        assert_eq!(
            scene.atom_property(0, AtomProperty::PartialCharge),
            PropertyValue::Undefined
        );
        assert_eq!(scene.bond_property(0, BondProperty::Length), PropertyValue::Float(1.5));
    }

    #[test]
    fn test_named_sets() {
        let mut scene = MemoryScene::with_atoms(3);
        scene.add_atom(Atom::new("O", Vec3::new(0.0, 2.0, 0.0)).with_group("HOH", 10));
        assert_eq!(scene.named_set("carbon").unwrap().selection.count(), 3);
        assert_eq!(scene.named_set("WATER").unwrap().selection.count(), 1);
        assert!(scene.named_set("selected").unwrap().dynamic);
        assert!(scene.named_set("waters").is_none());
    }

    #[test]
    fn test_delete_and_visibility() {
        let mut scene = MemoryScene::with_atoms(4);
        let sel = Selection::from_indices(4, [1, 2]);
        assert_eq!(scene.delete_atoms(&sel), 2);
        assert_eq!(scene.delete_atoms(&Selection::from_indices(4, [2, 3])), 1);
        assert_eq!(scene.deleted_atoms().count(), 3);

        scene.set_visibility(&Selection::from_indices(4, [0]), false);
        assert_eq!(scene.named_set("visible").unwrap().selection.count(), 3);
    }

    #[test]
    fn test_set_atom_property() {
        let mut scene = MemoryScene::with_atoms(2);
        let all = Selection::all(2);
        scene
            .set_atom_property(&all, AtomProperty::Temperature, &PropertyValue::Int(7))
            .unwrap();
        assert_eq!(
            scene.atom_property(1, AtomProperty::Temperature),
            PropertyValue::Float(7.0)
        );
        assert!(matches!(
            scene.set_atom_property(&all, AtomProperty::AtomNo, &PropertyValue::Int(1)),
            Err(SceneError::ReadOnly(_))
        ));
    }

    #[test]
    fn test_hold_refresh_batches() {
        let mut scene = MemoryScene::new();
        scene.hold_refresh(true);
        scene.hold_refresh(true);
        scene.render_refresh();
        scene.render_refresh();
        scene.hold_refresh(false);
        assert_eq!(scene.refresh_count(), 0);
        scene.hold_refresh(false);
        assert_eq!(scene.refresh_count(), 1);
    }

    #[test]
    fn test_load_file() {
        let mut scene = MemoryScene::with_atoms(2);
        scene.add_structure("water.xyz", vec![Atom::new("O", Vec3::new(0.0, 0.0, 0.0))]);
        assert!(scene.load_file("missing.xyz", false).is_err());
        scene.load_file("water.xyz", true).unwrap();
        assert_eq!(scene.atom_count(), 3);
        assert_eq!(scene.atom_property(2, AtomProperty::Model), PropertyValue::Int(2));
        scene.load_file("water.xyz", false).unwrap();
        assert_eq!(scene.atom_count(), 1);
    }

    #[test]
    fn test_clone_compares_equal() {
        let mut scene = MemoryScene::with_atoms(3);
        let copy = scene.clone();
        assert_eq!(scene, copy);
        scene.transform_view(ViewChange::Zoom(200.0));
        assert_ne!(scene, copy);
    }
}
