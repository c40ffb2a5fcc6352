//! Date and channel templated file patterns.
//!
//! Templates use the brace syntax of the legacy pipeline configuration, for
//! example:
//!
//! ```text
//! /data/aia/{wavelength:04d}/{date.year:04d}/{date.month:02d}/{date.day:02d}/AIA.{date:%Y%m%d_%H}*.{wavelength:04d}.*.fits
//! ```
//!
//! Supported fields are `date.year`, `date.month`, `date.day`, `date.hour`,
//! `date.minute`, `date.second`, `date` (with a strftime spec) and
//! `wavelength` / `channel`. `{{` and `}}` produce literal braces.

use std::fmt;
use std::sync::OnceLock;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, Timelike, Utc};
use regex::Regex;

use crate::error::TemplateError;

/// Numeric format spec: optional zero flag, optional width, optional `d`.
fn format_spec_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(0)?([0-9]+)?d?$").expect("format spec regex is valid"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Strftime(String),
    Channel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NumberFormat {
    zero_pad: bool,
    width: usize,
}

impl NumberFormat {
    fn render(&self, value: i64) -> String {
        if self.zero_pad {
            format!("{:0width$}", value, width = self.width)
        } else {
            format!("{:width$}", value, width = self.width)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field, NumberFormat),
}

/// A parsed file pattern template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePattern {
    source: String,
    segments: Vec<Segment>,
}

impl FilePattern {
    /// Parses `template`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] for unbalanced braces, unknown fields or
    /// malformed format specs.
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices().peekable();

        while let Some((offset, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '}' => {
                    return Err(TemplateError::UnbalancedBrace {
                        template: template.to_string(),
                        offset,
                    })
                }
                '{' => {
                    let mut body = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        body.push(inner);
                    }
                    if !closed {
                        return Err(TemplateError::UnbalancedBrace {
                            template: template.to_string(),
                            offset,
                        });
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(parse_field(template, &body)?);
                }
                other => literal.push(other),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    /// Returns the original template text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns true if the template references the channel.
    pub fn uses_channel(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Field(Field::Channel, _)))
    }

    /// Expands the template for a date and an optional channel.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingChannel`] if the template needs a
    /// channel and `channel` is `None`.
    pub fn expand(
        &self,
        date: &DateTime<Utc>,
        channel: Option<u32>,
    ) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field, format) => {
                    let rendered = match field {
                        Field::Year => format.render(date.year() as i64),
                        Field::Month => format.render(date.month() as i64),
                        Field::Day => format.render(date.day() as i64),
                        Field::Hour => format.render(date.hour() as i64),
                        Field::Minute => format.render(date.minute() as i64),
                        Field::Second => format.render(date.second() as i64),
                        Field::Strftime(spec) => date.format(spec).to_string(),
                        Field::Channel => match channel {
                            Some(c) => format.render(c as i64),
                            None => {
                                return Err(TemplateError::MissingChannel {
                                    template: self.source.clone(),
                                })
                            }
                        },
                    };
                    out.push_str(&rendered);
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for FilePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for FilePattern {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_field(template: &str, body: &str) -> Result<Segment, TemplateError> {
    let (name, spec) = match body.split_once(':') {
        Some((name, spec)) => (name.trim(), spec),
        None => (body.trim(), ""),
    };

    let field = match name {
        "date.year" => Field::Year,
        "date.month" => Field::Month,
        "date.day" => Field::Day,
        "date.hour" => Field::Hour,
        "date.minute" => Field::Minute,
        "date.second" => Field::Second,
        "wavelength" | "channel" => Field::Channel,
        "date" => {
            if spec.is_empty()
                || StrftimeItems::new(spec).any(|item| matches!(item, Item::Error))
            {
                return Err(TemplateError::InvalidFormat {
                    field: name.to_string(),
                    spec: spec.to_string(),
                });
            }
            return Ok(Segment::Field(
                Field::Strftime(spec.to_string()),
                NumberFormat {
                    zero_pad: false,
                    width: 0,
                },
            ));
        }
        other => {
            return Err(TemplateError::UnknownField {
                template: template.to_string(),
                field: other.to_string(),
            })
        }
    };

    let captures = format_spec_regex()
        .captures(spec)
        .ok_or_else(|| TemplateError::InvalidFormat {
            field: name.to_string(),
            spec: spec.to_string(),
        })?;
    let width = match captures.get(2) {
        Some(m) => m.as_str().parse().map_err(|_| TemplateError::InvalidFormat {
            field: name.to_string(),
            spec: spec.to_string(),
        })?,
        None => 0,
    };

    Ok(Segment::Field(
        field,
        NumberFormat {
            zero_pad: captures.get(1).is_some(),
            width,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 10, 16, 6, 0, 0).unwrap()
    }

    #[test]
    fn test_expand_legacy_aia_pattern() {
        let pattern = FilePattern::parse(
            "/data/{wavelength:04d}/{date.year:04d}/{date.month:02d}/{date.day:02d}/H{date.hour:02d}00/AIA.{date.year:04d}{date.month:02d}{date.day:02d}_{date.hour:02d}*.{wavelength:04d}.*.fits",
        )
        .unwrap();
        assert!(pattern.uses_channel());
        assert_eq!(
            pattern.expand(&date(), Some(171)).unwrap(),
            "/data/0171/2015/10/16/H0600/AIA.20151016_06*.0171.*.fits"
        );
    }

    #[test]
    fn test_expand_strftime_field() {
        let pattern = FilePattern::parse("/maps/{date:%Y%m%d_%H%M%S}.SegmentedMap.fits").unwrap();
        assert!(!pattern.uses_channel());
        assert_eq!(
            pattern.expand(&date(), None).unwrap(),
            "/maps/20151016_060000.SegmentedMap.fits"
        );
    }

    #[test]
    fn test_plain_channel_and_escaped_braces() {
        let pattern = FilePattern::parse("{{x}}/{channel}").unwrap();
        assert_eq!(pattern.expand(&date(), Some(94)).unwrap(), "{x}/94");
    }

    #[test]
    fn test_missing_channel_is_an_error() {
        let pattern = FilePattern::parse("/data/{wavelength:04d}/*.fits").unwrap();
        assert_matches!(
            pattern.expand(&date(), None),
            Err(TemplateError::MissingChannel { .. })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_matches!(
            FilePattern::parse("/data/{date.week}"),
            Err(TemplateError::UnknownField { field, .. }) if field == "date.week"
        );
        assert_matches!(
            FilePattern::parse("/data/{date.year"),
            Err(TemplateError::UnbalancedBrace { .. })
        );
        assert_matches!(
            FilePattern::parse("/data/}"),
            Err(TemplateError::UnbalancedBrace { .. })
        );
        assert_matches!(
            FilePattern::parse("/data/{date.year:x}"),
            Err(TemplateError::InvalidFormat { .. })
        );
        assert_matches!(
            FilePattern::parse("/data/{date}"),
            Err(TemplateError::InvalidFormat { .. })
        );
    }
}
