//! `{field}` placeholders in template text.
//!
//! Parsing is lenient: generation must always produce text, so an
//! unclosed or empty brace is kept as literal text instead of failing.

use crate::schema::context::AnalyzedContext;

/// A segment of parsed template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// `{name}` or `{dotted.path}`.
    Field(String),
}

/// Split text into literal and field segments. `{{` and `}}` are literal
/// braces.
pub fn parse(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len();
    let mut i = 0;

    while i < len {
        match chars[i] {
            '{' if i + 1 < len && chars[i + 1] == '{' => {
                literal.push('{');
                i += 2;
            }
            '}' if i + 1 < len && chars[i + 1] == '}' => {
                literal.push('}');
                i += 2;
            }
            '{' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&c| c == '}' || c == '{')
                    .map(|p| i + 1 + p)
                    .filter(|&end| chars[end] == '}' && end > i + 1);
                match close {
                    Some(end) => {
                        if !literal.is_empty() {
                            segments.push(Segment::Literal(std::mem::take(&mut literal)));
                        }
                        let name: String = chars[i + 1..end].iter().collect();
                        segments.push(Segment::Field(name.trim().to_string()));
                        i = end + 1;
                    }
                    None => {
                        literal.push('{');
                        i += 1;
                    }
                }
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

/// Fill placeholders with `lookup`. Unknown fields are left as written.
pub fn fill_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains('{') && !input.contains('}') {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    for segment in parse(input) {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Field(name) => match lookup(&name) {
                Some(value) => out.push_str(&value),
                None => {
                    out.push('{');
                    out.push_str(&name);
                    out.push('}');
                }
            },
        }
    }
    out
}

/// Fill placeholders from an analyzed context.
pub fn fill(input: &str, ctx: &AnalyzedContext) -> String {
    fill_with(input, |name| ctx.display(name))
}
