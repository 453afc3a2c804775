use super::quote::{quote_for, QuoteContext};
use crate::config::ServerSpec;
use std::fmt;

/// The closed set of values a launch template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    StartCommand,
    Host,
    Port,
    AllowOrigin,
    Name,
}

impl Placeholder {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "start_command" | "raw_command" | "command" => Some(Placeholder::StartCommand),
            "sse_host" | "bind_host" | "host" => Some(Placeholder::Host),
            "sse_port" | "bind_port" | "port" => Some(Placeholder::Port),
            "allow_origin" | "origin" => Some(Placeholder::AllowOrigin),
            "name" => Some(Placeholder::Name),
            _ => None,
        }
    }

    fn value(&self, spec: &ServerSpec) -> Option<String> {
        match self {
            Placeholder::StartCommand => spec.raw_command.clone(),
            Placeholder::Host => Some(spec.bind_host.clone()),
            Placeholder::Port => spec.bind_port.map(|p| p.to_string()),
            Placeholder::AllowOrigin => Some(spec.allow_origin.clone()),
            Placeholder::Name => Some(spec.name.clone()),
        }
    }

    /// Config key that supplies this placeholder's value.
    pub fn field(&self) -> &'static str {
        match self {
            Placeholder::StartCommand => "start_command",
            Placeholder::Host => "sse_host",
            Placeholder::Port => "sse_port",
            Placeholder::AllowOrigin => "allow_origin",
            Placeholder::Name => "name",
        }
    }
}

/// Non-fatal problems found while expanding a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderWarning {
    /// `{key}` is not a recognized placeholder; left verbatim.
    UnknownPlaceholder(String),
    /// `{key}` is recognized but the entry has no value for it; left verbatim.
    MissingValue { key: String, field: &'static str },
}

impl fmt::Display for RenderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderWarning::UnknownPlaceholder(key) => {
                write!(f, "unknown placeholder '{{{}}}' left as-is", key)
            }
            RenderWarning::MissingValue { key, field } => write!(
                f,
                "placeholder '{{{}}}' has no value ('{}' is not set), left as-is",
                key, field
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot {
        key: String,
        placeholder: Option<Placeholder>,
        ctx: QuoteContext,
    },
}

/// A parsed launch template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Split `source` into literal text and `{identifier}` slots, tracking the
    /// shell quoting context of each slot. Braces that do not enclose an
    /// identifier (JSON bodies, `${VAR}` expansions) stay literal.
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut ctx = QuoteContext::Bare;
        let chars: Vec<char> = source.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match (ctx, c) {
                (QuoteContext::Bare, '\\') | (QuoteContext::Double, '\\') => {
                    text.push(c);
                    if let Some(&next) = chars.get(i + 1) {
                        text.push(next);
                        i += 1;
                    }
                }
                (QuoteContext::Bare, '\'') => {
                    ctx = QuoteContext::Single;
                    text.push(c);
                }
                (QuoteContext::Single, '\'') => {
                    ctx = QuoteContext::Bare;
                    text.push(c);
                }
                (QuoteContext::Bare, '"') => {
                    ctx = QuoteContext::Double;
                    text.push(c);
                }
                (QuoteContext::Double, '"') => {
                    ctx = QuoteContext::Bare;
                    text.push(c);
                }
                // `${VAR}` belongs to the shell.
                (_, '{') if i > 0 && chars[i - 1] == '$' => text.push(c),
                (_, '{') => match scan_identifier(&chars, i + 1) {
                    Some(end) => {
                        let key: String = chars[i + 1..end].iter().collect();
                        if !text.is_empty() {
                            segments.push(Segment::Text(std::mem::take(&mut text)));
                        }
                        segments.push(Segment::Slot {
                            placeholder: Placeholder::from_key(&key),
                            key,
                            ctx,
                        });
                        i = end;
                    }
                    None => text.push(c),
                },
                _ => text.push(c),
            }
            i += 1;
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }
        Self { segments }
    }

    /// Keys of all `{...}` slots that are not part of the placeholder vocabulary.
    pub fn unknown_placeholders(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Slot {
                    key,
                    placeholder: None,
                    ..
                } => Some(key.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn placeholders(&self) -> impl Iterator<Item = (&str, Placeholder)> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Slot {
                key,
                placeholder: Some(p),
                ..
            } => Some((key.as_str(), *p)),
            _ => None,
        })
    }

    pub fn render(&self, spec: &ServerSpec) -> (String, Vec<RenderWarning>) {
        let mut out = String::new();
        let mut warnings = Vec::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => out.push_str(t),
                Segment::Slot {
                    key,
                    placeholder,
                    ctx,
                } => match placeholder.map(|p| (p, p.value(spec))) {
                    Some((_, Some(value))) => out.push_str(&quote_for(&value, *ctx)),
                    Some((p, None)) => {
                        warnings.push(RenderWarning::MissingValue {
                            key: key.clone(),
                            field: p.field(),
                        });
                        push_verbatim(&mut out, key);
                    }
                    None => {
                        warnings.push(RenderWarning::UnknownPlaceholder(key.clone()));
                        push_verbatim(&mut out, key);
                    }
                },
            }
        }
        (out, warnings)
    }
}

fn push_verbatim(out: &mut String, key: &str) {
    out.push('{');
    out.push_str(key);
    out.push('}');
}

/// Returns the index of the closing `}` if `chars[start..]` is `ident}`.
fn scan_identifier(chars: &[char], start: usize) -> Option<usize> {
    let first = *chars.get(start)?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    let mut i = start + 1;
    while let Some(&c) = chars.get(i) {
        if c == '}' {
            return Some(i);
        }
        if !(c.is_ascii_alphanumeric() || c == '_') {
            return None;
        }
        i += 1;
    }
    None
}
