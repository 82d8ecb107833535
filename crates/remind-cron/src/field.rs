//! Per-field metadata for the six cron components.
//!
//! Descriptors are plain constants — each one knows its numeric range and,
//! for months and weekdays, the symbolic names it accepts.

use crate::error::{CronError, Result};

/// Metadata for one cron field: numeric range plus symbolic token table.
pub struct FieldDescriptor {
    pub name: &'static str,
    pub min: u32,
    pub max: u32,
    tokens: &'static [(&'static str, u32)],
}

pub const SECOND: FieldDescriptor = FieldDescriptor {
    name: "seconds",
    min: 0,
    max: 59,
    tokens: &[],
};

pub const MINUTE: FieldDescriptor = FieldDescriptor {
    name: "minutes",
    min: 0,
    max: 59,
    tokens: &[],
};

pub const HOUR: FieldDescriptor = FieldDescriptor {
    name: "hours",
    min: 0,
    max: 23,
    tokens: &[],
};

pub const DAY_OF_MONTH: FieldDescriptor = FieldDescriptor {
    name: "day-of-month",
    min: 1,
    max: 31,
    tokens: &[],
};

pub const MONTH: FieldDescriptor = FieldDescriptor {
    name: "months",
    min: 1,
    max: 12,
    tokens: &[
        ("jan", 1),
        ("feb", 2),
        ("mar", 3),
        ("apr", 4),
        ("may", 5),
        ("jun", 6),
        ("jul", 7),
        ("aug", 8),
        ("sep", 9),
        ("oct", 10),
        ("nov", 11),
        ("dec", 12),
        ("january", 1),
        ("february", 2),
        ("march", 3),
        ("april", 4),
        ("june", 6),
        ("july", 7),
        ("august", 8),
        ("september", 9),
        ("october", 10),
        ("november", 11),
        ("december", 12),
    ],
};

pub const DAY_OF_WEEK: FieldDescriptor = FieldDescriptor {
    name: "day-of-week",
    min: 0,
    max: 7,
    tokens: &[
        ("sun", 0),
        ("mon", 1),
        ("tue", 2),
        ("wed", 3),
        ("thu", 4),
        ("fri", 5),
        ("sat", 6),
        ("sunday", 0),
        ("monday", 1),
        ("tuesday", 2),
        ("wednesday", 3),
        ("thursday", 4),
        ("friday", 5),
        ("saturday", 6),
    ],
};

impl FieldDescriptor {
    /// Parse a single token: a number within `[min, max]`, or one of the
    /// field's symbolic names (case-insensitive). Day-of-week maps both `0`
    /// and `7` to Sunday.
    pub fn parse(&self, token: &str) -> Result<u32> {
        if let Ok(n) = token.parse::<u32>() {
            if n < self.min || n > self.max {
                return Err(CronError::OutOfRange {
                    field: self.name,
                    value: token.to_string(),
                    min: self.min,
                    max: self.max,
                });
            }
            // cron convention: day-of-week 7 is an alias for Sunday
            return Ok(if self.name == "day-of-week" { n % 7 } else { n });
        }

        let lower = token.to_ascii_lowercase();
        for (name, value) in self.tokens {
            if *name == lower {
                return Ok(*value);
            }
        }

        Err(CronError::InvalidField {
            field: self.name,
            value: token.to_string(),
        })
    }
}
