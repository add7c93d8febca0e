//! Nom-based segmenter for DexScript
//!
//! Splits a script into lines and each line into `>`-delimited segments.
//! Delimiters inside `{...}`, `[...]`, matching quotes or after a
//! backslash do not split.

use std::sync::OnceLock;

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{anychar, char, none_of, space0, space1},
    combinator::{cut, eof, opt, peek, recognize},
    error::{context, VerboseError, VerboseErrorKind},
    multi::many0_count,
    sequence::{pair, tuple},
    IResult,
};
use regex::Regex;

use crate::error::ScriptError;

/// Segment delimiter
pub const DELIMITER: char = '>';

/// Lines starting with one of these are dropped entirely
pub const COMMENT_MARKERS: [&str; 2] = ["--", "//"];

/// Characters a backslash turns into literals
const ESCAPABLE: &str = ">|{}[]\"'\\";

type Res<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// One `>`-delimited unit of a line, before type resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    raw: String,
}

impl Segment {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Source text, trimmed, quotes and escapes intact
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether the whole segment is one quoted string
    pub fn is_quoted(&self) -> bool {
        matches!(alt((double_quoted, single_quoted))(self.raw.as_str()), Ok(("", _)))
    }

    /// Text with surrounding quotes removed and escapes applied
    pub fn literal(&self) -> String {
        if self.is_quoted() {
            unescape(&self.raw[1..self.raw.len() - 1])
        } else {
            unescape(&self.raw)
        }
    }
}

/// A non-empty, non-comment script line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    /// 1-based line number in the submitted text
    pub number: usize,
    /// Trimmed source text
    pub text: String,
    pub segments: Vec<Segment>,
}

/// Replace `\x` with `x` for the escapable characters
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if ESCAPABLE.contains(next) {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }

    out
}

fn fence_start() -> &'static Regex {
    static FENCE_START: OnceLock<Regex> = OnceLock::new();
    FENCE_START.get_or_init(|| {
        Regex::new(r"^```(?:[A-Za-z0-9_+\-]*[ \t]*\r?\n)?").expect("fence pattern is valid")
    })
}

/// Remove surrounding code-fence markers (with an optional language hint)
pub fn strip_code_fence(content: &str) -> String {
    let trimmed = content.trim();

    if trimmed.len() >= 6 && trimmed.starts_with("```") && trimmed.ends_with("```") {
        let inner = &trimmed[..trimmed.len() - 3];
        return fence_start().replace(inner, "").into_owned();
    }

    trimmed.trim_matches(|c| c == '`' || c == ' ' || c == '\n').to_string()
}

pub fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    COMMENT_MARKERS.iter().any(|marker| trimmed.starts_with(marker))
}

/// Split a script into segmented lines.
///
/// Blank and comment lines are dropped. The first malformed line aborts
/// with a `ScriptError::Parse` naming it.
pub fn segment_script(source: &str) -> Result<Vec<ScriptLine>, ScriptError> {
    let mut lines = Vec::new();

    for (index, raw_line) in source.split('\n').enumerate() {
        let text = raw_line.trim();
        if text.is_empty() || is_comment(text) {
            continue;
        }

        let number = index + 1;
        let segments = segment_line(text).map_err(|message| ScriptError::Parse {
            line: number,
            message: format!("{} in `{}`", message, text),
        })?;

        lines.push(ScriptLine {
            number,
            text: text.to_string(),
            segments,
        });
    }

    tracing::debug!("Segmented script into {} lines", lines.len());

    Ok(lines)
}

/// Split one line into trimmed segments
pub fn segment_line(line: &str) -> Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let mut input = line;

    loop {
        let position = segments.len() + 1;

        match segment(input) {
            Ok((rest, text)) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Err(format!("segment {} is empty", position));
                }
                segments.push(Segment::new(trimmed));
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Err(format!("segment {} is empty", position)),
            Err(nom::Err::Failure(e)) => return Err(describe(&e, position)),
            Err(nom::Err::Incomplete(_)) => return Err("incomplete input".to_string()),
        }

        match char::<_, VerboseError<&str>>(DELIMITER)(input) {
            Ok((rest, _)) => input = rest,
            Err(_) => break,
        }
    }

    if input.starts_with('\\') {
        return Err("dangling escape at end of line".to_string());
    }
    if !input.is_empty() {
        return Err(format!("unexpected `{}` after segment {}", input, segments.len()));
    }

    Ok(segments)
}

fn describe(error: &VerboseError<&str>, position: usize) -> String {
    let reason = error
        .errors
        .iter()
        .find_map(|(_, kind)| match kind {
            VerboseErrorKind::Context(ctx) => Some(*ctx),
            _ => None,
        })
        .unwrap_or("malformed segment");

    format!("{} in segment {}", reason, position)
}

// ============================================================================
// Internal Parsers
// ============================================================================

fn segment(input: &str) -> Res<&str> {
    alt((quoted_segment, plain_segment))(input)
}

fn quoted_segment(input: &str) -> Res<&str> {
    let (rest, _) = space0(input)?;
    let (rest, text) = alt((double_quoted, single_quoted))(rest)?;
    let (rest, _) = space0(rest)?;
    let _ = peek(alt((tag(">"), eof)))(rest)?;
    Ok((rest, text))
}

/// Text up to the next delimiter. A quote opening the segment or following
/// whitespace starts a protected run when it has a closing partner; any
/// other quote is an ordinary character (`Côte d'Ivoire`).
fn plain_segment(input: &str) -> Res<&str> {
    recognize(pair(
        opt(pair(space0, quoted_run)),
        many0_count(alt((
            escaped,
            braced,
            bracketed,
            recognize(pair(space1, quoted_run)),
            recognize(none_of(">{[\\")),
        ))),
    ))(input)
}

/// Balanced quotes, failing softly when unterminated
fn quoted_run(input: &str) -> Res<&str> {
    alt((
        recognize(tuple((
            char('"'),
            many0_count(alt((escaped, recognize(none_of("\"\\"))))),
            char('"'),
        ))),
        recognize(tuple((
            char('\''),
            many0_count(alt((escaped, recognize(none_of("'\\"))))),
            char('\''),
        ))),
    ))(input)
}

fn escaped(input: &str) -> Res<&str> {
    recognize(pair(char('\\'), anychar))(input)
}

fn double_quoted(input: &str) -> Res<&str> {
    recognize(tuple((
        char('"'),
        many0_count(alt((escaped, recognize(none_of("\"\\"))))),
        context("unterminated quote", cut(char('"'))),
    )))(input)
}

fn single_quoted(input: &str) -> Res<&str> {
    recognize(tuple((
        char('\''),
        many0_count(alt((escaped, recognize(none_of("'\\"))))),
        context("unterminated quote", cut(char('\''))),
    )))(input)
}

fn group_body(input: &str) -> Res<&str> {
    recognize(many0_count(alt((
        escaped,
        braced,
        bracketed,
        recognize(none_of("{}[]\\")),
    ))))(input)
}

fn braced(input: &str) -> Res<&str> {
    recognize(tuple((
        char('{'),
        group_body,
        context("unterminated '{'", cut(char('}'))),
    )))(input)
}

fn bracketed(input: &str) -> Res<&str> {
    recognize(tuple((
        char('['),
        group_body,
        context("unterminated '['", cut(char(']'))),
    )))(input)
}

/// Split `text` on `separator` outside of braces, brackets and escapes
pub fn split_top_level(text: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '{' | '[' => {
                depth += 1;
                current.push(c);
            }
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c if c == separator && depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }

    parts.push(current.trim().to_string());
    parts
}
