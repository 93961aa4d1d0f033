//! Cell style descriptions and the date pattern used when writing dates.

use chrono::{NaiveDate, NaiveDateTime};
use log::warn;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DATE_PATTERN: &str = "yyyy-MM-dd HH:mm:ss";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPattern {
    NoFill,
    Solid,
    Gray50,
    Gray25,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalAlignment {
    General,
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderStyle {
    None,
    Thin,
    Medium,
    Thick,
    Dashed,
}

/// Declarative style; every unset attribute keeps the storage default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_foreground_color: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_pattern: Option<FillPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<HorizontalAlignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border: Option<BorderStyle>,
}

impl CellStyle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data_format(format: impl Into<String>) -> Self {
        Self {
            data_format: Some(format.into()),
            ..Self::default()
        }
    }

    pub fn data_format(mut self, format: impl Into<String>) -> Self {
        self.data_format = Some(format.into());
        self
    }

    pub fn fill(mut self, rgb: u32, pattern: FillPattern) -> Self {
        self.fill_foreground_color = Some(rgb);
        self.fill_pattern = Some(pattern);
        self
    }

    pub fn alignment(mut self, alignment: HorizontalAlignment) -> Self {
        self.alignment = Some(alignment);
        self
    }

    pub fn border(mut self, border: BorderStyle) -> Self {
        self.border = Some(border);
        self
    }
}

/// A spreadsheet date pattern (`yyyy-MM-dd HH:mm:ss` tokens) together with
/// the equivalent chrono format used to round values before writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePattern {
    pattern: String,
    chrono_format: String,
}

impl Default for DatePattern {
    fn default() -> Self {
        Self::new(DEFAULT_DATE_PATTERN)
    }
}

impl DatePattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let chrono_format = translate_pattern(&pattern);
        Self {
            pattern,
            chrono_format,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn chrono_format(&self) -> &str {
        &self.chrono_format
    }

    /// Drops whatever precision the pattern can't show, so the stored value
    /// matches what the cell displays.
    pub fn round(&self, value: NaiveDateTime) -> NaiveDateTime {
        let rendered = value.format(&self.chrono_format).to_string();
        if let Ok(parsed) = NaiveDateTime::parse_from_str(&rendered, &self.chrono_format) {
            return parsed;
        }
        if let Some(midnight) = NaiveDate::parse_from_str(&rendered, &self.chrono_format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
        {
            return midnight;
        }
        warn!(
            "Date pattern '{}' can't be parsed back; keeping full precision",
            self.pattern
        );
        value
    }
}

fn translate_pattern(pattern: &str) -> String {
    let chars = pattern.chars().collect::<Vec<_>>();
    let mut output = String::with_capacity(pattern.len() * 2);
    let mut idx = 0;
    while idx < chars.len() {
        let ch = chars[idx];
        if ch == '\'' {
            idx += 1;
            while idx < chars.len() && chars[idx] != '\'' {
                push_literal(&mut output, chars[idx]);
                idx += 1;
            }
            idx += 1;
            continue;
        }
        let mut run = 1;
        while idx + run < chars.len() && chars[idx + run] == ch {
            run += 1;
        }
        let token = match (ch, run) {
            ('y', 1..=2) => Some("%y"),
            ('y', _) => Some("%Y"),
            ('M', 1) => Some("%-m"),
            ('M', 2) => Some("%m"),
            ('M', 3) => Some("%b"),
            ('M', _) => Some("%B"),
            ('d', 1) => Some("%-d"),
            ('d', _) => Some("%d"),
            ('H', 1) => Some("%-H"),
            ('H', _) => Some("%H"),
            ('h', 1) => Some("%-I"),
            ('h', _) => Some("%I"),
            ('m', 1) => Some("%-M"),
            ('m', _) => Some("%M"),
            ('s', 1) => Some("%-S"),
            ('s', _) => Some("%S"),
            ('S', _) => Some("%3f"),
            ('a', _) => Some("%p"),
            _ => None,
        };
        match token {
            Some(token) => output.push_str(token),
            None => {
                for _ in 0..run {
                    push_literal(&mut output, ch);
                }
            }
        }
        idx += run;
    }
    output
}

fn push_literal(output: &mut String, ch: char) {
    if ch == '%' {
        output.push_str("%%");
    } else {
        output.push(ch);
    }
}
