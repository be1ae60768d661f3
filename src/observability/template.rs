//! Output templates for text sinks.
//!
//! Templates are parsed once into segments and rendered per event:
//!
//! ```text
//! {Timestamp:yyyy-MM-dd HH:mm:ss.fff zzz} [{Level:u3}] {Message:lj}{NewLine}{Exception}
//! ```
//!
//! Supported tokens: `Timestamp`, `Level`, `Message`, `CorrelationId`,
//! `SourceContext`, `NewLine`, `Exception`, `Properties`, and any event field
//! by name. `{{` and `}}` produce literal braces. Alignment suffixes such as
//! `{Level,5}` are accepted and ignored.

use std::fmt::Write as _;

use crate::observability::event::LogEvent;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    /// strftime pattern.
    Timestamp(String),
    Level(LevelFormat),
    Message,
    CorrelationId,
    SourceContext,
    NewLine,
    Exception,
    Properties,
    Field(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LevelFormat {
    Full,
    FullUpper,
    FullLower,
    ShortUpper,
    ShortLower,
}

const DEFAULT_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S%.3f %:z";

/// A parsed output template.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl OutputTemplate {
    pub fn parse(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices().peekable();

        while let Some((i, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '{' => match template[i + 1..].find('}') {
                    Some(len) => {
                        if !literal.is_empty() {
                            segments.push(Segment::Literal(std::mem::take(&mut literal)));
                        }
                        let body = &template[i + 1..i + 1 + len];
                        segments.push(parse_token(body));
                        // Skip the token body and closing brace.
                        for _ in 0..=body.chars().count() {
                            chars.next();
                        }
                    }
                    None => {
                        literal.push_str(&template[i..]);
                        break;
                    }
                },
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self {
            source: template.to_string(),
            segments,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn render(&self, event: &LogEvent) -> String {
        let mut out = String::with_capacity(128);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Timestamp(pattern) => {
                    let _ = write!(out, "{}", event.timestamp.format(pattern));
                }
                Segment::Level(format) => {
                    let level = match format {
                        LevelFormat::Full => event.level.as_str().to_string(),
                        LevelFormat::FullUpper => event.level.as_str().to_uppercase(),
                        LevelFormat::FullLower => event.level.as_str().to_lowercase(),
                        LevelFormat::ShortUpper => event.level.short().to_string(),
                        LevelFormat::ShortLower => event.level.short().to_lowercase(),
                    };
                    out.push_str(&level);
                }
                Segment::Message => out.push_str(&event.rendered_message()),
                Segment::CorrelationId => {
                    if let Some(id) = &event.correlation_id {
                        out.push_str(id);
                    }
                }
                Segment::SourceContext => out.push_str(&event.target),
                Segment::NewLine => out.push('\n'),
                Segment::Exception => {
                    if let Some(error) = &event.error {
                        out.push_str(error);
                        out.push('\n');
                    }
                }
                Segment::Properties => render_properties(event, &mut out),
                Segment::Field(name) => {
                    if let Some(value) = event.field(name) {
                        out.push_str(value);
                    }
                }
            }
        }
        out
    }
}

fn parse_token(body: &str) -> Segment {
    let (name, format) = match body.split_once(':') {
        Some((name, format)) => (name, Some(format)),
        None => (body, None),
    };
    let name = name.split(',').next().unwrap_or(name).trim();

    match name {
        "Timestamp" => Segment::Timestamp(
            format
                .map(timestamp_pattern)
                .unwrap_or_else(|| DEFAULT_TIMESTAMP.to_string()),
        ),
        "Level" => Segment::Level(match format {
            Some("u3") => LevelFormat::ShortUpper,
            Some("w3") => LevelFormat::ShortLower,
            Some("u") => LevelFormat::FullUpper,
            Some("w") => LevelFormat::FullLower,
            _ => LevelFormat::Full,
        }),
        "Message" => Segment::Message,
        "CorrelationId" => Segment::CorrelationId,
        "SourceContext" => Segment::SourceContext,
        "NewLine" => Segment::NewLine,
        "Exception" => Segment::Exception,
        "Properties" => Segment::Properties,
        other => Segment::Field(other.to_string()),
    }
}

/// Accept either a strftime pattern or a .NET-style date pattern.
fn timestamp_pattern(format: &str) -> String {
    if format.contains('%') {
        return format.to_string();
    }

    let mut out = String::with_capacity(format.len() * 2);
    let chars: Vec<char> = format.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let run = chars[i..].iter().take_while(|&&x| x == c).count();
        let mapped = match (c, run) {
            ('y', 4) => Some("%Y"),
            ('y', 2) => Some("%y"),
            ('M', 2) => Some("%m"),
            ('M', 3) => Some("%b"),
            ('d', 2) => Some("%d"),
            ('H', 2) => Some("%H"),
            ('h', 2) => Some("%I"),
            ('m', 2) => Some("%M"),
            ('s', 2) => Some("%S"),
            ('f', 3) => Some("%3f"),
            ('f', 6) => Some("%6f"),
            ('t', 2) => Some("%p"),
            ('z', 3) => Some("%:z"),
            ('z', 2) => Some("%z"),
            _ => None,
        };
        match mapped {
            Some(spec) => out.push_str(spec),
            None => {
                for _ in 0..run {
                    out.push(c);
                }
            }
        }
        i += run;
    }
    out
}

fn render_properties(event: &LogEvent, out: &mut String) {
    let unbound: Vec<&(String, String)> = event
        .fields
        .iter()
        .filter(|(name, _)| !event.message.contains(&format!("{{{name}}}")))
        .collect();
    if unbound.is_empty() {
        return;
    }

    out.push('{');
    for (i, (name, value)) in unbound.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{name}: {value}");
    }
    out.push('}');
}
