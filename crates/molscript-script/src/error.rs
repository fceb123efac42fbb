//! Error types for script execution
//!
//! Every runtime fault is a [`ScriptError`] of one [`ErrorKind`]. Messages
//! come from per-kind templates with up to three positional substitutions
//! (`{0}`, `{1}`, `{2}`); arguments without a placeholder are appended after
//! a colon. Translation replaces the template before substitution, so both
//! the localized and the untranslated text are kept.

use std::borrow::Cow;

use ahash::AHashMap;
use thiserror::Error;

use crate::value::Value;

/// Result type for script operations
pub type ScriptResult<T = ()> = Result<T, ScriptError>;

macro_rules! error_kinds {
    ($($variant:ident => $name:literal, $template:literal;)*) => {
        /// Kind of script error
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ErrorKind {
            $($variant,)*
        }

        impl ErrorKind {
            /// All error kinds, in declaration order
            pub const ALL: &'static [ErrorKind] = &[$(ErrorKind::$variant,)*];

            /// Identifier of this kind (e.g. `integerOutOfRange`)
            pub fn name(self) -> &'static str {
                match self {
                    $(ErrorKind::$variant => $name,)*
                }
            }

            /// Untranslated message template
            pub fn template(self) -> &'static str {
                match self {
                    $(ErrorKind::$variant => $template,)*
                }
            }
        }
    };
}

error_kinds! {
    AxesExpected => "axesExpected", "x y z axis expected";
    BackgroundModelError => "backgroundModelError", "{0} not allowed with background model displayed";
    BadArgumentCount => "badArgumentCount", "bad argument count";
    BadMillerIndices => "badMillerIndices", "Miller indices cannot all be zero.";
    BadRgbColor => "badRGBColor", "bad [R,G,B] color";
    BooleanExpected => "booleanExpected", "boolean expected";
    BooleanOrNumberExpected => "booleanOrNumberExpected", "boolean or number expected";
    BooleanOrWhateverExpected => "booleanOrWhateverExpected", "boolean, number, or {0} expected";
    CannotSet => "cannotSet", "cannot set value";
    ColorExpected => "colorExpected", "color expected";
    ColorOrPaletteRequired => "colorOrPaletteRequired", "a color or palette name is required";
    CommandExpected => "commandExpected", "command expected";
    CoordinateOrNameOrExpressionRequired => "coordinateOrNameOrExpressionRequired", "{x y z} or $name or (atom expression) required";
    DrawObjectNotDefined => "drawObjectNotDefined", "draw object not defined";
    EndOfStatementUnexpected => "endOfStatementUnexpected", "unexpected end of script command";
    ExpressionExpected => "expressionExpected", "valid (atom expression) expected";
    ExpressionOrIntegerExpected => "expressionOrIntegerExpected", "(atom expression) or integer expected";
    FilenameExpected => "filenameExpected", "filename expected";
    FileNotFound => "fileNotFoundException", "file not found";
    IncompatibleArguments => "incompatibleArguments", "incompatible arguments";
    InsufficientArguments => "insufficientArguments", "insufficient arguments";
    IntegerExpected => "integerExpected", "integer expected";
    IntegerOutOfRange => "integerOutOfRange", "integer out of range ({0} - {1})";
    InvalidArgument => "invalidArgument", "invalid argument";
    InvalidParameterOrder => "invalidParameterOrder", "invalid parameter order";
    KeywordExpected => "keywordExpected", "keyword expected";
    MoCoefficients => "moCoefficients", "no MO coefficient data available";
    MoIndex => "moIndex", "An MO index from 1 to {0} is required";
    MoModelError => "moModelError", "no MO basis/coefficient data available for this frame";
    MoOccupancy => "moOccupancy", "no MO occupancy data available";
    MoOnlyOne => "moOnlyOne", "Only one molecular orbital is available in this file";
    MultipleModelsDisplayedNotOk => "multipleModelsDisplayedNotOK", "{0} require that only one model be displayed";
    MultipleModelsNotOk => "multipleModelsNotOK", "{0} requires that only one model be loaded";
    NoData => "noData", "No data available";
    NoPartialCharges => "noPartialCharges", "No partial charges were read from the file; they are needed to render the MEP data.";
    NoUnitCell => "noUnitCell", "No unit cell";
    NumberExpected => "numberExpected", "number expected";
    NumberMustBe => "numberMustBe", "number must be ({0} or {1})";
    NumberOutOfRange => "numberOutOfRange", "decimal number out of range ({0} - {1})";
    ObjectNameExpected => "objectNameExpected", "object name expected after '$'";
    PlaneExpected => "planeExpected", "plane expected -- either three points or atom expressions or {0} or {1} or {2}";
    PropertyNameExpected => "propertyNameExpected", "property name expected";
    SpaceGroupNotFound => "spaceGroupNotFound", "space group {0} was not found.";
    StringExpected => "stringExpected", "quoted string expected";
    StringOrIdentifierExpected => "stringOrIdentifierExpected", "quoted string or identifier expected";
    TooManyPoints => "tooManyPoints", "too many rotation points were specified";
    TooManyScriptLevels => "tooManyScriptLevels", "too many script levels";
    UnrecognizedAtomProperty => "unrecognizedAtomProperty", "unrecognized atom property";
    UnrecognizedBondProperty => "unrecognizedBondProperty", "unrecognized bond property";
    UnrecognizedCommand => "unrecognizedCommand", "unrecognized command";
    UnrecognizedExpression => "unrecognizedExpression", "runtime unrecognized expression";
    UnrecognizedObject => "unrecognizedObject", "unrecognized object";
    UnrecognizedParameter => "unrecognizedParameter", "unrecognized {0} parameter";
    UnrecognizedParameterWarning => "unrecognizedParameterWarning", "unrecognized {0} parameter in state script (set anyway)";
    UnrecognizedShowParameter => "unrecognizedShowParameter", "unrecognized SHOW parameter --  use {0}";
    What => "what", "{0}";
    WriteWhat => "writeWhat", "write what? {0} or {1} \"filename\"";
    UnexpectedEndOfExpression => "unexpectedEndOfExpression", "unexpected end of expression";
    Interrupted => "interrupted", "script interrupted";
    Compile => "compile", "script compiler error: {0}";
}

impl ErrorKind {
    /// Whether this kind is reported without unwinding
    pub fn is_warning(self) -> bool {
        matches!(self, ErrorKind::UnrecognizedParameterWarning)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Substitute positional arguments into a message template
pub fn format_message(template: &str, args: &[String]) -> String {
    let mut msg = template.to_string();
    let mut trailing = Vec::new();
    for (i, arg) in args.iter().enumerate().take(3) {
        let placeholder = format!("{{{}}}", i);
        if msg.contains(&placeholder) {
            msg = msg.replace(&placeholder, arg);
        } else {
            trailing.push(arg.as_str());
        }
    }
    for arg in trailing {
        msg.push_str(": ");
        msg.push_str(arg);
    }
    msg
}

/// Localization of message templates
pub trait Translator: Send + Sync {
    /// Translate a message template; `{n}` placeholders must be preserved
    fn translate<'a>(&self, template: &'a str) -> Cow<'a, str>;
}

/// Translator that returns templates unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Untranslated;

impl Translator for Untranslated {
    fn translate<'a>(&self, template: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(template)
    }
}

/// Map-backed translator keyed by the untranslated template text
#[derive(Debug, Clone, Default)]
pub struct MessageCatalog {
    entries: AHashMap<String, String>,
}

impl MessageCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a translation for one template
    pub fn insert(&mut self, template: &str, translation: &str) {
        self.entries
            .insert(template.to_string(), translation.to_string());
    }

    /// Number of translated templates
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Translator for MessageCatalog {
    fn translate<'a>(&self, template: &'a str) -> Cow<'a, str> {
        match self.entries.get(template) {
            Some(t) => Cow::Owned(t.clone()),
            None => Cow::Borrowed(template),
        }
    }
}

/// Where an error was raised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPosition {
    /// Script file or function name
    pub script: String,
    /// Source line number (1-based)
    pub line: usize,
    /// Command index within the script (1-based)
    pub command: usize,
    /// Statement text with the offending instruction marked `>> ... <<`
    pub statement: String,
}

/// A runtime script error
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ScriptError {
    kind: ErrorKind,
    args: Vec<String>,
    message: String,
    untranslated: String,
    token: Option<usize>,
    position: Option<ErrorPosition>,
    trace: Vec<String>,
}

impl ScriptError {
    /// Create an error of the given kind with positional arguments
    pub fn new(kind: ErrorKind, args: &[&str]) -> Self {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let message = format_message(kind.template(), &args);
        Self {
            kind,
            args,
            untranslated: message.clone(),
            message,
            token: None,
            position: None,
            trace: Vec::new(),
        }
    }

    /// Create an error with no arguments
    pub fn of(kind: ErrorKind) -> Self {
        Self::new(kind, &[])
    }

    pub fn invalid_argument(detail: impl AsRef<str>) -> Self {
        Self::new(ErrorKind::InvalidArgument, &[detail.as_ref()])
    }

    pub fn bad_argument_count() -> Self {
        Self::of(ErrorKind::BadArgumentCount)
    }

    pub fn integer_out_of_range(min: i32, max: i32) -> Self {
        Self::new(
            ErrorKind::IntegerOutOfRange,
            &[&min.to_string(), &max.to_string()],
        )
    }

    pub fn number_out_of_range(min: f64, max: f64) -> Self {
        Self::new(
            ErrorKind::NumberOutOfRange,
            &[&min.to_string(), &max.to_string()],
        )
    }

    /// Mark the offending instruction within its statement
    pub fn at_token(mut self, index: usize) -> Self {
        self.token.get_or_insert(index);
        self
    }

    /// Shift the marked instruction when a sub-expression was evaluated alone
    pub(crate) fn offset_token(mut self, by: usize) -> Self {
        if self.position.is_none() {
            if let Some(token) = self.token.as_mut() {
                *token += by;
            }
        }
        self
    }

    /// Re-render the message through a translator
    pub fn translated(mut self, translator: &dyn Translator) -> Self {
        self.message = format_message(&translator.translate(self.kind.template()), &self.args);
        self
    }

    /// Attach the source position unless one is already known
    pub(crate) fn locate(mut self, position: ErrorPosition) -> Self {
        self.position.get_or_insert(position);
        self
    }

    /// Add one enclosing call site to the context trace
    pub(crate) fn push_frame(&mut self, frame: String) {
        self.trace.push(frame);
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Translated message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Message before translation
    pub fn untranslated(&self) -> &str {
        &self.untranslated
    }

    /// Index of the offending instruction, when known
    pub fn token(&self) -> Option<usize> {
        self.token
    }

    pub fn position(&self) -> Option<&ErrorPosition> {
        self.position.as_ref()
    }

    /// Enclosing call sites, innermost first
    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    /// Full user-facing report: message, position and call trace
    pub fn report(&self) -> String {
        let mut out = self.message.clone();
        if let Some(pos) = &self.position {
            out.push_str(&format!(
                "\n----\nline {} command {} of {}:\n  {}",
                pos.line, pos.command, pos.script, pos.statement
            ));
        }
        for frame in &self.trace {
            out.push_str("\ncalled from ");
            out.push_str(frame);
        }
        out
    }
}

impl From<molscript_scene::SceneError> for ScriptError {
    fn from(err: molscript_scene::SceneError) -> Self {
        use molscript_scene::SceneError;
        match err {
            SceneError::FileNotFound(path) => ScriptError::new(ErrorKind::FileNotFound, &[&path]),
            SceneError::ReadOnly(name) => ScriptError::new(ErrorKind::CannotSet, &[&name]),
            SceneError::ShapeNotDefined(name) => {
                ScriptError::new(ErrorKind::DrawObjectNotDefined, &[&name])
            }
            SceneError::NoUnitCell => ScriptError::of(ErrorKind::NoUnitCell),
            SceneError::NoAtoms => ScriptError::of(ErrorKind::NoData),
            other => ScriptError::invalid_argument(other.to_string()),
        }
    }
}

impl From<molscript_select::SelectError> for ScriptError {
    fn from(err: molscript_select::SelectError) -> Self {
        ScriptError::new(ErrorKind::ExpressionExpected, &[&err.to_string()])
    }
}

/// Non-error transfer of control out of a running script
#[derive(Debug, Clone, PartialEq)]
pub enum ControlSignal {
    /// Leave the current function or script, optionally with a value
    Return(Option<Value>),
    /// Stop every running script
    Exit,
    /// The controller interrupted execution
    Interrupt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_substitution() {
        let err = ScriptError::integer_out_of_range(1, 10);
        assert_eq!(err.message(), "integer out of range (1 - 10)");
        assert_eq!(err.kind().name(), "integerOutOfRange");
    }

    #[test]
    fn test_unplaced_argument_is_appended() {
        let err = ScriptError::new(ErrorKind::FileNotFound, &["a.spt"]);
        assert_eq!(err.to_string(), "file not found: a.spt");
    }

    #[test]
    fn test_translation_keeps_untranslated() {
        let mut catalog = MessageCatalog::new();
        catalog.insert("integer out of range ({0} - {1})", "entier hors limites ({0} - {1})");
        let err = ScriptError::integer_out_of_range(0, 3).translated(&catalog);
        assert_eq!(err.message(), "entier hors limites (0 - 3)");
        assert_eq!(err.untranslated(), "integer out of range (0 - 3)");
    }

    #[test]
    fn test_report_includes_position_and_trace() {
        let mut err = ScriptError::of(ErrorKind::TooManyScriptLevels).locate(ErrorPosition {
            script: "inner.spt".to_string(),
            line: 3,
            command: 2,
            statement: "script >> \"inner.spt\" <<".to_string(),
        });
        err.push_frame("line 1 command 1 of outer.spt".to_string());
        let report = err.report();
        assert!(report.starts_with("too many script levels\n----\nline 3 command 2 of inner.spt"));
        assert!(report.ends_with("called from line 1 command 1 of outer.spt"));
    }

    #[test]
    fn test_taxonomy_is_complete() {
        assert_eq!(ErrorKind::ALL.len(), 60);
        assert!(ErrorKind::UnrecognizedParameterWarning.is_warning());
        assert!(!ErrorKind::What.is_warning());
    }
}
