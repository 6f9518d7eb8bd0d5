//! Tokenization of Dockerfile source text using `nom`.
//!
//! Groups physical lines into logical instructions (joining escaped line
//! continuations, skipping comments, blank lines, and heredoc bodies) and
//! splits each instruction into quote-aware words. Every word keeps its byte
//! span in the original source so writers can substitute it in place.

use std::collections::VecDeque;
use std::ops::Range;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_till, take_while1},
    character::complete::char,
    combinator::recognize,
    multi::many1,
    sequence::delimited,
};

const DEFAULT_ESCAPE: char = '\\';

/// A word of an instruction and where it sits in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    /// The word text, quotes included.
    pub text: String,
    /// Byte range of the word in the original source.
    pub span: Range<usize>,
}

/// One logical instruction, possibly spread over continuation lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInstruction {
    /// Upper-cased instruction keyword.
    pub keyword: String,
    /// Arguments following the keyword.
    pub args: Vec<Word>,
    /// One-based line the instruction starts on.
    pub line: usize,
}

fn double_quoted(input: &str) -> IResult<&str, &str> {
    recognize(delimited(char('"'), take_till(|c: char| c == '"'), char('"'))).parse(input)
}

fn single_quoted(input: &str) -> IResult<&str, &str> {
    recognize(delimited(char('\''), take_till(|c: char| c == '\''), char('\''))).parse(input)
}

fn bare(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace() && c != '"' && c != '\'').parse(input)
}

/// A word is a run of bare and quoted fragments; an unbalanced quote falls
/// back to everything up to the next whitespace.
fn word(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(many1(alt((double_quoted, single_quoted, bare)))),
        take_while1(|c: char| !c.is_whitespace()),
    ))
    .parse(input)
}

/// Splits `segment`, which starts at byte `base` of the source, into words.
fn split_words(segment: &str, base: usize) -> Vec<Word> {
    let mut words = Vec::new();
    let mut input = segment;
    loop {
        input = input.trim_start();
        if input.is_empty() {
            break;
        }
        let Ok((rest, text)) = word(input) else {
            break;
        };
        let start = base + (segment.len() - input.len());
        words.push(Word {
            text: text.to_string(),
            span: start..start + text.len(),
        });
        input = rest;
    }
    words
}

/// Reads the `# escape=` parser directive, if any.
fn escape_char(content: &str) -> char {
    for line in content.lines() {
        let Some(directive) = line.trim().strip_prefix('#') else {
            break;
        };
        let Some((key, value)) = directive.split_once('=') else {
            break;
        };
        if key.trim().eq_ignore_ascii_case("escape") {
            return value.trim().chars().next().unwrap_or(DEFAULT_ESCAPE);
        }
    }
    DEFAULT_ESCAPE
}

/// Extracts heredoc delimiters (`<<EOF`, `<<-"EOF"`) from instruction words.
fn heredoc_delimiters(words: &[Word]) -> Vec<(String, bool)> {
    words
        .iter()
        .filter_map(|w| {
            let rest = w.text.strip_prefix("<<")?;
            let (rest, strip_tabs) = rest
                .strip_prefix('-')
                .map_or((rest, false), |r| (r, true));
            let delimiter = rest.trim_matches(|c| c == '"' || c == '\'');
            let valid = !delimiter.is_empty()
                && delimiter.chars().all(|c| c == '_' || c.is_ascii_alphanumeric());
            valid.then(|| (delimiter.to_string(), strip_tabs))
        })
        .collect()
}

/// Groups the source into logical instructions.
pub fn tokenize(content: &str) -> Vec<RawInstruction> {
    let escape = escape_char(content);
    let mut instructions = Vec::new();
    let mut current: Option<(usize, Vec<Word>)> = None;
    let mut heredocs: VecDeque<(String, bool)> = VecDeque::new();
    let mut offset = 0;

    for (idx, raw_line) in content.split_inclusive('\n').enumerate() {
        let line_start = offset;
        offset += raw_line.len();
        let line = raw_line.trim_end_matches(['\n', '\r']);

        if let Some((delimiter, strip_tabs)) = heredocs.front() {
            let candidate = if *strip_tabs {
                line.trim_start_matches('\t')
            } else {
                line
            };
            if candidate == delimiter.as_str() {
                let _ = heredocs.pop_front();
            }
            continue;
        }

        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let (body, continues) = match line.trim_end().strip_suffix(escape) {
            Some(body) => (body, true),
            None => (line, false),
        };
        let words = split_words(body, line_start);
        match current.as_mut() {
            Some((_, acc)) => acc.extend(words),
            None => current = Some((idx + 1, words)),
        }

        if !continues {
            if let Some((line_no, words)) = current.take() {
                heredocs.extend(heredoc_delimiters(&words));
                if let Some(instruction) = finish(line_no, words) {
                    instructions.push(instruction);
                }
            }
        }
    }

    if let Some((line_no, words)) = current.take() {
        if let Some(instruction) = finish(line_no, words) {
            instructions.push(instruction);
        }
    }

    instructions
}

fn finish(line: usize, mut words: Vec<Word>) -> Option<RawInstruction> {
    if words.is_empty() {
        return None;
    }
    let keyword = words.remove(0).text.to_ascii_uppercase();
    Some(RawInstruction {
        keyword,
        args: words,
        line,
    })
}
