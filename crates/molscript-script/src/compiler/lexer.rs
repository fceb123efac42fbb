//! Script lexer
//!
//! Splits source text into [`Lexeme`]s carrying their character span. The
//! text after `echo`, `message`, `goto`, `label` and `pause` is kept raw up
//! to the end of the statement, since it is free-form text.

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_until, take_while},
    character::complete::{char, digit1, multispace0, one_of, satisfy},
    combinator::{map, opt, recognize, value},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use molscript_select::{parse_escaped, Selection};

use super::CompileError;

/// Commands whose arguments are free-form text
const RAW_TEXT_COMMANDS: &[&str] = &["echo", "message", "goto", "label", "pause"];

/// Multi-character punctuation, longest first
const PUNCTUATION: &[&str] = &[
    "**", "==", "!=", "<>", "<=", ">=", "&&", "||", "+=", "-=", "(", ")", "[", "]", "{", "}",
    ",", ";", ".", "=", "<", ">", "+", "-", "*", "/", "\\", "%", "&", "|", "!", ":",
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lex {
    Int(i32),
    Float(f64),
    Str(String),
    Word(String),
    /// `@name`
    VarRef(String),
    /// `@{...}` with the braces removed
    Subst(String),
    /// `({0 2:4})` or `[{1 3}]`
    Bitset(Selection),
    /// Free-form text after a raw-text command
    Raw(String),
    Punct(&'static str),
    Newline,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Lexeme {
    pub kind: Lex,
    pub start: usize,
    pub end: usize,
    pub line: usize,
}

impl Lexeme {
    pub fn is_punct(&self, p: &str) -> bool {
        matches!(self.kind, Lex::Punct(q) if q == p)
    }

    /// Lowercased word text, if this is a word
    pub fn word(&self) -> Option<String> {
        match &self.kind {
            Lex::Word(w) => Some(w.to_ascii_lowercase()),
            _ => None,
        }
    }

    pub fn is_word(&self, w: &str) -> bool {
        matches!(&self.kind, Lex::Word(x) if x.eq_ignore_ascii_case(w))
    }
}

fn blank(input: &str) -> IResult<&str, &str> {
    take_while(|c| c == ' ' || c == '\t' || c == '\r')(input)
}

fn comment(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(pair(alt((tag("#"), tag("//"))), opt(is_not("\n")))),
        recognize(tuple((tag("/*"), take_until("*/"), tag("*/")))),
    ))(input)
}

fn number(input: &str) -> IResult<&str, Lex> {
    let (rest, text) = recognize(tuple((
        digit1,
        opt(pair(char('.'), digit1)),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;
    let is_float = text.contains(|c| matches!(c, '.' | 'e' | 'E'));
    let lex = match (is_float, text.parse::<i32>()) {
        (false, Ok(i)) => Lex::Int(i),
        _ => Lex::Float(text.parse::<f64>().unwrap_or(f64::NAN)),
    };
    Ok((rest, lex))
}

fn quoted(quote: char) -> impl FnMut(&str) -> IResult<&str, String> {
    move |input| {
        let stop = if quote == '"' { "\\\"\n" } else { "\\'\n" };
        delimited(
            char(quote),
            map(
                opt(escaped_transform(
                    is_not(stop),
                    '\\',
                    alt((
                        value("\\", char('\\')),
                        value("\"", char('"')),
                        value("'", char('\'')),
                        value("\n", char('n')),
                        value("\t", char('t')),
                    )),
                )),
                Option::unwrap_or_default,
            ),
            char(quote),
        )(input)
    }
}

fn string(input: &str) -> IResult<&str, Lex> {
    map(alt((quoted('"'), quoted('\''))), Lex::Str)(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_alphabetic() || c == '_' || c == '$'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

fn word(input: &str) -> IResult<&str, Lex> {
    map(identifier, |w: &str| Lex::Word(w.to_string()))(input)
}

fn var_ref(input: &str) -> IResult<&str, Lex> {
    map(preceded(char('@'), identifier), |w: &str| Lex::VarRef(w.to_string()))(input)
}

/// `@{...}` with nested braces
fn substitution(input: &str) -> IResult<&str, Lex> {
    let (body, _) = tag("@{")(input)?;
    let mut depth = 1usize;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[i + 1..], Lex::Subst(body[..i].trim().to_string())));
                }
            }
            _ => {}
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

fn index_list(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        char('{'),
        take_while(|c: char| c.is_ascii_digit() || c == ' ' || c == ':'),
        char('}'),
    )))(input)
}

fn bitset(input: &str) -> IResult<&str, Lex> {
    let (rest, text) = alt((
        recognize(tuple((char('('), multispace0, index_list, multispace0, char(')')))),
        recognize(tuple((char('['), multispace0, index_list, multispace0, char(']')))),
    ))(input)?;
    match parse_escaped(text) {
        Ok(sel) => Ok((rest, Lex::Bitset(sel))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        ))),
    }
}

fn punct(input: &str) -> IResult<&str, Lex> {
    for p in PUNCTUATION.iter().copied() {
        if let Some(rest) = input.strip_prefix(p) {
            return Ok((rest, Lex::Punct(p)));
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Tag,
    )))
}

fn token(input: &str) -> IResult<&str, Lex> {
    alt((
        value(Lex::Newline, char('\n')),
        bitset,
        number,
        string,
        substitution,
        var_ref,
        word,
        punct,
    ))(input)
}

/// Free-form text up to the end of the statement
///
/// Stops at a newline, or at an unquoted `;` or unbalanced `}`. A quote
/// only opens a quoted run at the start of a word, so `don't` stays plain.
fn raw_text(input: &str) -> (&str, &str) {
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut prev = ' ';
    for (i, c) in input.char_indices() {
        let word_start = prev.is_whitespace();
        prev = c;
        match (quote, c) {
            (_, '\n') => return (&input[i..], &input[..i]),
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') if word_start => quote = Some(c),
            (None, '{') => depth += 1,
            (None, '}') if depth == 0 => return (&input[i..], &input[..i]),
            (None, '}') => depth -= 1,
            (None, ';') => return (&input[i..], &input[..i]),
            _ => {}
        }
    }
    ("", input)
}

/// Line numbers (1-based) by character offset
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn line(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }
}

/// Split source text into lexemes
pub(crate) fn tokenize(script: &str, source: &str) -> Result<Vec<Lexeme>, CompileError> {
    let lines = LineIndex::new(source);
    let offset = |rest: &str| source.len() - rest.len();
    let mut out: Vec<Lexeme> = Vec::new();
    let mut input = source;

    loop {
        let (rest, _) = blank(input).unwrap_or((input, ""));
        input = rest;
        if let Ok((rest, _)) = comment(input) {
            input = rest;
            continue;
        }
        if input.is_empty() {
            break;
        }

        let start = offset(input);
        let (rest, kind) = match token(input) {
            Ok(ok) => ok,
            Err(_) => {
                let message = match input.chars().next() {
                    Some('"' | '\'') => "unterminated string".to_string(),
                    Some(c) => format!("unexpected character '{}'", c),
                    None => "unexpected end of script".to_string(),
                };
                return Err(CompileError::new(script, &message, lines.line(start), ""));
            }
        };
        let raw_follows = matches!(&kind, Lex::Word(w)
            if RAW_TEXT_COMMANDS.iter().any(|c| c.eq_ignore_ascii_case(w)))
            && at_statement_start(&out);

        out.push(Lexeme {
            kind,
            start,
            end: offset(rest),
            line: lines.line(start),
        });
        input = rest;

        if raw_follows {
            let (rest, _) = blank(input).unwrap_or((input, ""));
            let start = offset(rest);
            let (rest, text) = raw_text(rest);
            let text = text.trim_end();
            if !text.is_empty() {
                out.push(Lexeme {
                    kind: Lex::Raw(text.to_string()),
                    start,
                    end: start + text.len(),
                    line: lines.line(start),
                });
            }
            input = rest;
        }
    }
    Ok(out)
}

fn at_statement_start(lexemes: &[Lexeme]) -> bool {
    match lexemes.last() {
        None => true,
        Some(last) => {
            matches!(last.kind, Lex::Newline)
                || last.is_punct(";")
                || last.is_punct("{")
                || last.is_punct("}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Lex> {
        tokenize("test", source)
            .unwrap()
            .into_iter()
            .map(|l| l.kind)
            .collect()
    }

    #[test]
    fn test_numbers_and_words() {
        assert_eq!(
            kinds("x = 1.5e2 + 3"),
            vec![
                Lex::Word("x".into()),
                Lex::Punct("="),
                Lex::Float(150.0),
                Lex::Punct("+"),
                Lex::Int(3),
            ]
        );
    }

    #[test]
    fn test_strings_and_comments() {
        assert_eq!(
            kinds("print \"a\\\"b\" # note\nprint 'c'"),
            vec![
                Lex::Word("print".into()),
                Lex::Str("a\"b".into()),
                Lex::Newline,
                Lex::Word("print".into()),
                Lex::Str("c".into()),
            ]
        );
        assert_eq!(kinds("/* multi\nline */ x"), vec![Lex::Word("x".into())]);
        assert_eq!(kinds("print \"\""), vec![Lex::Word("print".into()), Lex::Str(String::new())]);
    }

    #[test]
    fn test_references_and_bitsets() {
        assert_eq!(
            kinds("@n @{ {a}.size } ({0 2:3})"),
            vec![
                Lex::VarRef("n".into()),
                Lex::Subst("{a}.size".into()),
                Lex::Bitset(Selection::from_indices(4, [0, 2, 3])),
            ]
        );
    }

    #[test]
    fn test_raw_text_after_echo() {
        let lexemes = tokenize("test", "echo don't panic; print 1").unwrap();
        assert_eq!(lexemes[1].kind, Lex::Raw("don't panic".into()));
        assert_eq!(lexemes[2].kind, Lex::Punct(";"));
    }

    #[test]
    fn test_operators_longest_match() {
        assert_eq!(
            kinds("a<=b**2!=c"),
            vec![
                Lex::Word("a".into()),
                Lex::Punct("<="),
                Lex::Word("b".into()),
                Lex::Punct("**"),
                Lex::Int(2),
                Lex::Punct("!="),
                Lex::Word("c".into()),
            ]
        );
    }

    #[test]
    fn test_line_numbers() {
        let lexemes = tokenize("test", "a\n\nb").unwrap();
        assert_eq!(lexemes.last().map(|l| l.line), Some(3));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("test", "print \"abc").unwrap_err();
        assert!(err.to_string().contains("unterminated string"));
    }
}
