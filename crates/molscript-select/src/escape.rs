//! Canonical bracketed-index text form
//!
//! Atom selections render as `({0 2:4 9})`, bond selections as `[{1 3}]`.
//! Consecutive runs collapse into `first:last` ranges. The parser accepts the
//! same text (and the bare `{...}` form) so that rendering and re-reading a
//! selection gives back the same set.

use nom::{
    branch::alt,
    character::complete::{char, digit1, multispace0},
    combinator::{all_consuming, map, map_res, opt},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

use crate::error::{SelectError, SelectResult};
use crate::selection::{Selection, SetKind};

/// Largest index accepted in selection text
pub const MAX_ESCAPED_INDEX: usize = (1 << 24) - 1;

/// One entry of an index list: a single index or an inclusive range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Item {
    Single(usize),
    Range(usize, usize),
}

/// Render a selection in canonical text form
pub(crate) fn escape(sel: &Selection) -> String {
    let mut body = String::new();
    let mut run: Option<(usize, usize)> = None;

    for i in sel.indices() {
        run = match run {
            Some((start, end)) if end + 1 == i => Some((start, i)),
            Some(prev) => {
                push_run(&mut body, prev);
                Some((i, i))
            }
            None => Some((i, i)),
        };
    }
    if let Some(prev) = run {
        push_run(&mut body, prev);
    }

    match sel.kind() {
        SetKind::Atoms => format!("({{{}}})", body),
        SetKind::Bonds => format!("[{{{}}}]", body),
    }
}

fn push_run(body: &mut String, run: (usize, usize)) {
    if !body.is_empty() {
        body.push(' ');
    }
    if run.0 == run.1 {
        body.push_str(&run.0.to_string());
    } else {
        body.push_str(&format!("{}:{}", run.0, run.1));
    }
}

fn index(input: &str) -> IResult<&str, usize> {
    map_res(digit1, |s: &str| s.parse::<usize>())(input)
}

fn item(input: &str) -> IResult<&str, Item> {
    let (input, first) = index(input)?;
    let (input, last) = opt(preceded(char(':'), index))(input)?;
    Ok((
        input,
        match last {
            Some(last) => Item::Range(first, last),
            None => Item::Single(first),
        },
    ))
}

fn item_list(input: &str) -> IResult<&str, Vec<Item>> {
    delimited(
        pair(char('{'), multispace0),
        many0(terminated(item, multispace0)),
        char('}'),
    )(input)
}

fn escaped(input: &str) -> IResult<&str, (SetKind, Vec<Item>)> {
    delimited(
        multispace0,
        alt((
            map(delimited(char('('), item_list, char(')')), |items| {
                (SetKind::Atoms, items)
            }),
            map(delimited(char('['), item_list, char(']')), |items| {
                (SetKind::Bonds, items)
            }),
            map(item_list, |items| (SetKind::Atoms, items)),
        )),
        multispace0,
    )(input)
}

/// Parse a selection from its canonical text form
///
/// The universe size of the result is one past the largest index.
pub fn parse_escaped(input: &str) -> SelectResult<Selection> {
    let (_, (kind, items)) = all_consuming(escaped)(input)
        .map_err(|_| SelectError::InvalidEscape(input.to_string()))?;

    let bounded = |index: usize| {
        if index > MAX_ESCAPED_INDEX {
            Err(SelectError::IndexTooLarge {
                index,
                max: MAX_ESCAPED_INDEX,
            })
        } else {
            Ok(index)
        }
    };

    let mut sel = Selection::new(0).with_kind(kind);
    for item in items {
        match item {
            Item::Single(i) => sel.insert(bounded(i)?),
            Item::Range(a, b) if a <= b => {
                let b = bounded(b)?;
                (a..=b).for_each(|i| sel.insert(i));
            }
            Item::Range(a, b) => {
                return Err(SelectError::InvalidRange { start: a, end: b });
            }
        }
    }
    Ok(sel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_ranges() {
        let sel = Selection::from_indices(10, [0, 2, 3, 4, 9]);
        assert_eq!(escape(&sel), "({0 2:4 9})");
    }

    #[test]
    fn test_escape_empty_and_bonds() {
        assert_eq!(escape(&Selection::new(5)), "({})");
        let mut bonds = Selection::bonds(4);
        bonds.insert(1);
        bonds.insert(3);
        assert_eq!(escape(&bonds), "[{1 3}]");
    }

    #[test]
    fn test_parse_forms() {
        let a = parse_escaped("({0 2:4})").unwrap();
        assert_eq!(a.indices().collect::<Vec<_>>(), vec![0, 2, 3, 4]);
        assert_eq!(a.len(), 5);

        let b = parse_escaped(" { 1  5 } ").unwrap();
        assert_eq!(b.indices().collect::<Vec<_>>(), vec![1, 5]);

        let c = parse_escaped("[{7}]").unwrap();
        assert!(c.is_bonds());

        assert!(parse_escaped("({})").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_escaped("({1 x})"),
            Err(SelectError::InvalidEscape(_))
        ));
        assert!(matches!(
            parse_escaped("({4:2})"),
            Err(SelectError::InvalidRange { start: 4, end: 2 })
        ));
    }

    #[test]
    fn test_parse_rejects_huge_indices() {
        assert!(matches!(
            parse_escaped("({0:4000000000})"),
            Err(SelectError::IndexTooLarge { index: 4000000000, .. })
        ));
        assert!(matches!(
            parse_escaped("({18446744073709551615})"),
            Err(SelectError::IndexTooLarge { .. })
        ));
        let edge = format!("({{{}}})", MAX_ESCAPED_INDEX);
        assert_eq!(parse_escaped(&edge).unwrap().count(), 1);
    }

    #[test]
    fn test_render_parse_render() {
        let sel = Selection::from_indices(30, [3, 4, 5, 11, 20, 21, 29]);
        let text = escape(&sel);
        let again = parse_escaped(&text).unwrap();
        assert_eq!(again, sel);
        assert_eq!(escape(&again), text);
    }
}
