//! Scene effects: load, zap, color, label, spacefill, wireframe, center,
//! zoom, rotate, translate, refresh, draw, isosurface, measure
//!
//! Every mutation goes through [`Executor::effect`] so a syntax check
//! evaluates the arguments and leaves the scene alone.

use lin_alg::f64::Vec3;
use molscript_scene::{Axis, PropertyValue, ShapeKind, ViewChange};
use molscript_select::{AtomProperty, Selection};

use super::{expression_at, number_in_range, path_at, value_from, word_at, Command, CommandRegistry};
use crate::error::{ErrorKind, ScriptError, ScriptResult};
use crate::exec::{Executor, Step};
use crate::rpn::matching_close;
use crate::token::{render_statement, CommandKind, Token};
use crate::value::Value;

/// Spacefill radius used by `spacefill on`
const DEFAULT_SPACEFILL: f64 = 1.7;

/// Wireframe radius used by `wireframe on`
const DEFAULT_WIREFRAME: f64 = 0.15;

/// Register scene commands
pub(super) fn register(registry: &mut CommandRegistry) {
    registry.register(LoadCommand);
    registry.register(ZapCommand);
    registry.register(ColorCommand);
    registry.register(LabelCommand);
    registry.register(SpacefillCommand);
    registry.register(WireframeCommand);
    registry.register(CenterCommand);
    registry.register(ZoomCommand);
    registry.register(RotateCommand);
    registry.register(TranslateCommand);
    registry.register(RefreshCommand);
    registry.register(DrawCommand);
    registry.register(IsosurfaceCommand);
    registry.register(MeasureCommand);
}

/// Selected atoms, restricted to live atoms in the subset
fn selected_atoms(ctx: &Executor<'_>) -> Selection {
    ctx.restrict(ctx.scene.selected_atoms())
}

/// `on`/`off` switch at `index`, if that is what the argument is
fn switch_at(args: &[Token], index: usize) -> Option<bool> {
    match args.get(index) {
        Some(Token::Boolean(on)) => Some(*on),
        _ => match word_at(args, index)?.as_str() {
            "on" => Some(true),
            "off" => Some(false),
            _ => None,
        },
    }
}

fn axis_at(args: &[Token], index: usize) -> ScriptResult<Axis> {
    word_at(args, index)
        .and_then(|word| Axis::from_name(&word))
        .ok_or_else(|| ScriptError::of(ErrorKind::AxesExpected).at_token(index))
}

// ============================================================================
// load command
// ============================================================================

struct LoadCommand;

impl Command for LoadCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Load
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "load" reads a structure file into the scene, replacing what is there
    unless "append" is given. The active subset is cleared.

USAGE

    load [append] filename
    load @variable
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let append = matches!(args.get(1), Some(Token::Identifier(word)) if word == "append");
        let at = if append { 2 } else { 1 };
        let path = path_at(ctx, args, at)
            .ok_or_else(|| ScriptError::of(ErrorKind::FilenameExpected).at_token(0))?;
        if ctx.try_effect(|scene| scene.load_file(&path, append))?.is_some() {
            ctx.engine.subset = None;
            ctx.status(format!("loaded {}", path));
        }
        Ok(Step::Next)
    }
}

// ============================================================================
// zap command
// ============================================================================

struct ZapCommand;

impl Command for ZapCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Zap
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "zap" removes every atom, bond and shape from the scene.

USAGE

    zap
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, _args: &[Token]) -> ScriptResult<Step> {
        if ctx.effect(|scene| scene.zap()).is_some() {
            ctx.engine.subset = None;
        }
        Ok(Step::Next)
    }
}

// ============================================================================
// color command
// ============================================================================

static COLORS: phf::Map<&'static str, (u8, u8, u8)> = phf::phf_map! {
    "black" => (0, 0, 0),
    "white" => (255, 255, 255),
    "red" => (255, 0, 0),
    "green" => (0, 128, 0),
    "lime" => (0, 255, 0),
    "blue" => (0, 0, 255),
    "yellow" => (255, 255, 0),
    "cyan" => (0, 255, 255),
    "magenta" => (255, 0, 255),
    "orange" => (255, 165, 0),
    "purple" => (128, 0, 128),
    "pink" => (255, 192, 203),
    "brown" => (165, 42, 42),
    "gray" => (128, 128, 128),
    "grey" => (128, 128, 128),
    "gold" => (255, 215, 0),
};

fn hex_color((r, g, b): (u8, u8, u8)) -> String {
    format!("[x{:02x}{:02x}{:02x}]", r, g, b)
}

fn named_color(name: &str) -> Option<String> {
    COLORS.get(name.to_ascii_lowercase().as_str()).copied().map(hex_color)
}

fn rgb_component(text: &str) -> Option<u8> {
    let value: f64 = text.trim().parse().ok()?;
    (value.fract() == 0.0 && (0.0..=255.0).contains(&value)).then_some(value as u8)
}

struct ColorCommand;

impl ColorCommand {
    /// Color argument starting at `start`, as `[xRRGGBB]`
    fn color(ctx: &mut Executor<'_>, args: &[Token], start: usize) -> ScriptResult<String> {
        let unknown =
            |name: &str| ScriptError::new(ErrorKind::ColorExpected, &[name]).at_token(start);
        match &args[start..] {
            [] => Err(ScriptError::of(ErrorKind::ColorOrPaletteRequired).at_token(0)),
            [Token::Identifier(name)] | [Token::Str(name)] => {
                named_color(name).ok_or_else(|| unknown(name))
            }
            _ => match ctx.eval_range(args, start, args.len())? {
                Value::String(name) => named_color(&name).ok_or_else(|| unknown(&name)),
                Value::List(items) => {
                    let rgb: Option<Vec<u8>> = items.iter().map(|s| rgb_component(s)).collect();
                    match rgb.as_deref() {
                        Some([r, g, b]) => Ok(hex_color((*r, *g, *b))),
                        _ => Err(ScriptError::of(ErrorKind::BadRgbColor).at_token(start)),
                    }
                }
                Value::Point3(p) => {
                    let rgb = [p.x, p.y, p.z].map(|c| rgb_component(&c.to_string()));
                    match rgb {
                        [Some(r), Some(g), Some(b)] => Ok(hex_color((r, g, b))),
                        _ => Err(ScriptError::of(ErrorKind::BadRgbColor).at_token(start)),
                    }
                }
                other => Err(unknown(&other.to_string())),
            },
        }
    }
}

impl Command for ColorCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Color
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "color" colors the selected atoms, or the atoms of a leading atom
    expression, by name or by [R,G,B] components from 0 to 255.

USAGE

    color [atom-expression] color-name
    color [atom-expression] [r, g, b]

EXAMPLES

    color red
    color {oxygen} [255, 128, 0]
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let (atoms, start) = match expression_at(args, 1)? {
            Some((start, end)) => {
                let atoms = ctx
                    .evaluate_selection(&args[start..end])
                    .map_err(|err| err.offset_token(start))?;
                (atoms, end + 1)
            }
            None => (selected_atoms(ctx), 1),
        };
        let color = PropertyValue::Str(Self::color(ctx, args, start)?);
        ctx.try_effect(|scene| scene.set_atom_property(&atoms, AtomProperty::Color, &color))?;
        Ok(Step::Next)
    }
}

// ============================================================================
// label command
// ============================================================================

struct LabelCommand;

impl Command for LabelCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Label
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "label" attaches text to the selected atoms; "label off" removes it.

USAGE

    label text
    label off
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let Some(Token::Str(text)) = args.get(1) else {
            return Err(ScriptError::of(ErrorKind::StringExpected).at_token(0));
        };
        let text = if text.eq_ignore_ascii_case("off") {
            String::new()
        } else {
            text.clone()
        };
        let atoms = selected_atoms(ctx);
        let label = PropertyValue::Str(text);
        ctx.try_effect(|scene| scene.set_atom_property(&atoms, AtomProperty::Label, &label))?;
        Ok(Step::Next)
    }
}

// ============================================================================
// spacefill command
// ============================================================================

struct SpacefillCommand;

impl Command for SpacefillCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Spacefill
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "spacefill" draws the selected atoms as spheres of the given radius
    in angstroms (0 to 3).

USAGE

    spacefill [on | off | radius]
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let radius = match switch_at(args, 1) {
            Some(true) => DEFAULT_SPACEFILL,
            Some(false) => 0.0,
            None => number_in_range(ctx, args, 1, 0.0, 3.0)?.unwrap_or(DEFAULT_SPACEFILL),
        };
        let atoms = selected_atoms(ctx);
        let radius = PropertyValue::Float(radius);
        ctx.try_effect(|scene| scene.set_atom_property(&atoms, AtomProperty::Radius, &radius))?;
        Ok(Step::Next)
    }
}

// ============================================================================
// wireframe command
// ============================================================================

struct WireframeCommand;

impl Command for WireframeCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Wireframe
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "wireframe" sets the bond radius in angstroms (0 to 2).

USAGE

    wireframe [on | off | radius]
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let radius = match switch_at(args, 1) {
            Some(true) => DEFAULT_WIREFRAME,
            Some(false) => 0.0,
            None => number_in_range(ctx, args, 1, 0.0, 2.0)?.unwrap_or(DEFAULT_WIREFRAME),
        };
        ctx.try_effect(|scene| scene.set_parameter("wireframeRadius", PropertyValue::Float(radius)))?;
        Ok(Step::Next)
    }
}

// ============================================================================
// center command
// ============================================================================

struct CenterCommand;

impl Command for CenterCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Center
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "center" centers the view on a point or on the centroid of an atom
    expression. Without arguments all atoms are used.

USAGE

    center [atom-expression | {x y z}]
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let target = match expression_at(args, 1)? {
            Some((start, end)) => match &args[start..end] {
                [Token::Point3(p)] => Value::Point3(*p),
                inner => Value::Selection(
                    ctx.evaluate_selection(inner)
                        .map_err(|err| err.offset_token(start))?,
                ),
            },
            None => Value::Selection(ctx.restrict(Selection::all(ctx.scene.atom_count()))),
        };
        let point = ctx.as_point(&target).map_err(|err| err.at_token(1))?;
        ctx.effect(|scene| scene.transform_view(ViewChange::Center(point)));
        Ok(Step::Next)
    }
}

// ============================================================================
// zoom command
// ============================================================================

struct ZoomCommand;

impl Command for ZoomCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Zoom
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "zoom" sets the magnification in percent (5 to 5000, default 100).

USAGE

    zoom [percent]
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let percent = number_in_range(ctx, args, 1, 5.0, 5000.0)?.unwrap_or(100.0);
        ctx.effect(|scene| scene.transform_view(ViewChange::Zoom(percent)));
        Ok(Step::Next)
    }
}

// ============================================================================
// rotate command
// ============================================================================

struct RotateCommand;

impl Command for RotateCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Rotate
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "rotate" turns the view about an axis by the given angle in degrees
    (default 90).

USAGE

    rotate x|y|z [degrees]
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let axis = axis_at(args, 1)?;
        let degrees = number_in_range(ctx, args, 2, -3600.0, 3600.0)?.unwrap_or(90.0);
        ctx.effect(|scene| scene.transform_view(ViewChange::Rotate { axis, degrees }));
        Ok(Step::Next)
    }
}

// ============================================================================
// translate command
// ============================================================================

struct TranslateCommand;

impl Command for TranslateCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Translate
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "translate" moves the view along an axis by a percentage of the
    window.

USAGE

    translate x|y|z amount
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let axis = axis_at(args, 1)?;
        let amount = number_in_range(ctx, args, 2, -100.0, 100.0)?
            .ok_or_else(|| ScriptError::of(ErrorKind::NumberExpected).at_token(1))?;
        ctx.effect(|scene| scene.transform_view(ViewChange::Translate { axis, amount }));
        Ok(Step::Next)
    }
}

// ============================================================================
// refresh command
// ============================================================================

struct RefreshCommand;

impl Command for RefreshCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Refresh
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "refresh" redraws the scene now, unless refreshing is turned off.

USAGE

    refresh
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, _args: &[Token]) -> ScriptResult<Step> {
        if ctx.engine.options.refreshing {
            ctx.effect(|scene| scene.render_refresh());
        }
        Ok(Step::Next)
    }
}

// ============================================================================
// draw command
// ============================================================================

struct DrawCommand;

impl Command for DrawCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Draw
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "draw" creates or replaces a named draw object from a point, a plane
    or an atom expression. "draw name delete" removes it.

USAGE

    draw name {x y z} | {a b c d} | {atom-expression}
    draw name delete
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let Some(Token::Identifier(name)) = args.get(1) else {
            return Err(ScriptError::of(ErrorKind::ObjectNameExpected).at_token(0));
        };
        let value = if word_at(args, 2).as_deref() == Some("delete") {
            PropertyValue::Undefined
        } else {
            value_from(ctx, args, 2)?
                .ok_or_else(|| {
                    ScriptError::of(ErrorKind::CoordinateOrNameOrExpressionRequired).at_token(1)
                })?
                .to_property()
        };
        ctx.try_effect(|scene| scene.set_shape_property(ShapeKind::Draw, name, value))?;
        Ok(Step::Next)
    }
}

// ============================================================================
// isosurface command
// ============================================================================

const SURFACE_TYPES: &[&str] = &["vdw", "sasurface", "solvent", "molecular", "mep"];

struct IsosurfaceCommand;

impl Command for IsosurfaceCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Isosurface
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "isosurface" creates a named surface around the selected atoms. A
    molecular electrostatic potential ("mep") surface needs partial
    charges. "isosurface name delete" removes it.

USAGE

    isosurface name vdw | sasurface | solvent | molecular | mep
    isosurface name delete
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let Some(Token::Identifier(name)) = args.get(1) else {
            return Err(ScriptError::of(ErrorKind::ObjectNameExpected).at_token(0));
        };
        let surface = word_at(args, 2)
            .ok_or_else(|| ScriptError::of(ErrorKind::KeywordExpected).at_token(1))?;

        let value = match surface.as_str() {
            "delete" => PropertyValue::Undefined,
            kind if SURFACE_TYPES.contains(&kind) => {
                if kind == "mep" {
                    let atoms = selected_atoms(ctx);
                    let charged = atoms.indices().any(|i| {
                        !ctx.scene
                            .atom_property(i, AtomProperty::PartialCharge)
                            .is_undefined()
                    });
                    if !charged {
                        return Err(ScriptError::of(ErrorKind::NoPartialCharges).at_token(2));
                    }
                }
                PropertyValue::Str(surface.clone())
            }
            other => {
                return Err(ScriptError::new(ErrorKind::KeywordExpected, &[other]).at_token(2))
            }
        };
        ctx.try_effect(|scene| scene.set_shape_property(ShapeKind::Isosurface, name, value))?;
        Ok(Step::Next)
    }
}

// ============================================================================
// measure command
// ============================================================================

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(a.x - b.x, a.y - b.y, a.z - b.z)
}

fn dot(a: Vec3, b: Vec3) -> f64 {
    a.x * b.x + a.y * b.y + a.z * b.z
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(
        a.y * b.z - a.z * b.y,
        a.z * b.x - a.x * b.z,
        a.x * b.y - a.y * b.x,
    )
}

fn length(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

/// Distance, angle or torsion through two to four points
fn measurement(points: &[Vec3]) -> Option<(&'static str, f64)> {
    match points {
        [a, b] => Some(("distance", length(sub(*a, *b)))),
        [a, b, c] => {
            let (u, v) = (sub(*a, *b), sub(*c, *b));
            let cos = (dot(u, v) / (length(u) * length(v))).clamp(-1.0, 1.0);
            Some(("angle", cos.acos().to_degrees()))
        }
        [a, b, c, d] => {
            let (b1, b2, b3) = (sub(*b, *a), sub(*c, *b), sub(*d, *c));
            let (n1, n2) = (cross(b1, b2), cross(b2, b3));
            let y = length(b2) * dot(b1, n2);
            let x = dot(n1, n2);
            Some(("torsion", y.atan2(x).to_degrees()))
        }
        _ => None,
    }
}

struct MeasureCommand;

impl Command for MeasureCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Measure
    }

    fn help(&self) -> &str {
        r#"
DESCRIPTION

    "measure" reports the distance, angle or torsion defined by two,
    three or four points or atom expressions, and keeps it in the scene.

USAGE

    measure {a} {b} [{c} [{d}]]

EXAMPLES

    measure {atomno=1} {atomno=2}
    measure {atomno=1} {atomno=2} {atomno=3}
"#
    }

    fn execute(&self, ctx: &mut Executor<'_>, args: &[Token]) -> ScriptResult<Step> {
        let mut points = Vec::new();
        let mut i = 1;
        while i < args.len() {
            match &args[i] {
                Token::Point3(p) => {
                    points.push(*p);
                    i += 1;
                }
                Token::ExpressionBegin => {
                    let close = matching_close(args, i)?;
                    let atoms = ctx
                        .evaluate_selection(&args[i + 1..close])
                        .map_err(|err| err.offset_token(i + 1))?;
                    let point = ctx
                        .as_point(&Value::Selection(atoms))
                        .map_err(|err| err.at_token(i))?;
                    points.push(point);
                    i = close + 1;
                }
                _ => return Err(ScriptError::of(ErrorKind::ExpressionExpected).at_token(i)),
            }
        }

        let (what, value) = measurement(&points)
            .ok_or_else(|| ScriptError::bad_argument_count().at_token(0))?;
        ctx.status(format!("{} = {:.4}", what, value));
        let name = render_statement(&args[1..], None);
        ctx.try_effect(|scene| {
            scene.set_shape_property(ShapeKind::Measures, &name, PropertyValue::Float(value))
        })?;
        Ok(Step::Next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_colors() {
        assert_eq!(named_color("Red").as_deref(), Some("[xff0000]"));
        assert_eq!(named_color("chartreuse-ish"), None);
        assert_eq!(rgb_component("255"), Some(255));
        assert_eq!(rgb_component("256"), None);
        assert_eq!(rgb_component("1.5"), None);
    }

    #[test]
    fn test_measurements() {
        let o = Vec3::new(0.0, 0.0, 0.0);
        let x = Vec3::new(1.0, 0.0, 0.0);
        let y = Vec3::new(0.0, 1.0, 0.0);
        let (what, d) = measurement(&[o, Vec3::new(3.0, 4.0, 0.0)]).unwrap();
        assert_eq!(what, "distance");
        assert!((d - 5.0).abs() < 1e-12);

        let (_, angle) = measurement(&[x, o, y]).unwrap();
        assert!((angle - 90.0).abs() < 1e-9);

        let (_, torsion) =
            measurement(&[x, o, Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 1.0, 1.0)]).unwrap();
        assert!((torsion.abs() - 90.0).abs() < 1e-9);

        assert!(measurement(&[o]).is_none());
    }
}
