//! Pattern templates
//!
//! A template such as `ID-%%-##` fixes the width of every ID issued for a key.
//! `#` marks a digit slot (`0`-`9`) and `%` a letter slot (`A`-`Z`); every
//! other character is a literal copied through unchanged.
//!
//! Incrementing a value works like an odometer with mixed bases: slots are
//! walked right to left, each one keeps `(index + carry) % base` and passes
//! `(index + carry) / base` on to its left neighbour. A carry left over after
//! the leftmost slot means the template is exhausted; values never wrap.
//!
//! Letter slots also accept lowercase values and keep each slot's case, so
//! `a9` followed by one increment of `%#` gives `b0`.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{IdError, Result};

/// Template symbol for a digit slot
pub const DIGIT_SLOT: char = '#';

/// Template symbol for a letter slot
pub const LETTER_SLOT: char = '%';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Digit,
    Letter,
    Literal(char),
}

impl Slot {
    fn base(self) -> u32 {
        match self {
            Slot::Digit => 10,
            Slot::Letter => 26,
            Slot::Literal(_) => 1,
        }
    }

    /// Decode `c` as a symbol of this slot: (index, alphabet origin)
    fn decode(self, c: char) -> Option<(u32, char)> {
        match self {
            Slot::Digit if c.is_ascii_digit() => Some((c as u32 - '0' as u32, '0')),
            Slot::Letter if c.is_ascii_uppercase() => Some((c as u32 - 'A' as u32, 'A')),
            Slot::Letter if c.is_ascii_lowercase() => Some((c as u32 - 'a' as u32, 'a')),
            _ => None,
        }
    }
}

/// A fixed-width ID template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    template: String,
    slots: Vec<Slot>,
}

impl Pattern {
    /// Parse a template; it must contain at least one digit or letter slot
    pub fn parse(template: &str) -> Result<Self> {
        let slots: Vec<Slot> = template
            .chars()
            .map(|c| match c {
                DIGIT_SLOT => Slot::Digit,
                LETTER_SLOT => Slot::Letter,
                other => Slot::Literal(other),
            })
            .collect();

        if !slots.iter().any(|s| !matches!(s, Slot::Literal(_))) {
            return Err(IdError::Config(format!(
                "pattern '{}' has no '{}' or '{}' slot",
                template, DIGIT_SLOT, LETTER_SLOT
            )));
        }
        if template.contains(['\r', '\n', '\0']) {
            return Err(IdError::Config(format!(
                "pattern '{}' contains a control character",
                template.escape_debug()
            )));
        }

        Ok(Self {
            template: template.to_string(),
            slots,
        })
    }

    /// The template string this pattern was parsed from
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Number of characters in every value of this pattern
    pub fn width(&self) -> usize {
        self.slots.len()
    }

    /// The smallest value of the pattern: every slot at its first symbol
    pub fn first(&self) -> String {
        self.slots
            .iter()
            .map(|slot| match slot {
                Slot::Digit => '0',
                Slot::Letter => 'A',
                Slot::Literal(c) => *c,
            })
            .collect()
    }

    /// Check that `value` has the template's width and alphabet
    pub fn validate(&self, value: &str) -> Result<()> {
        self.ordinals(value).map(|_| ())
    }

    /// The value following `value`
    pub fn next(&self, value: &str) -> Result<String> {
        self.add(value, 1)
    }

    /// Add `amount` to `value` with odometer carry propagation
    pub fn add(&self, value: &str, amount: u64) -> Result<String> {
        let mut chars: Vec<char> = value.chars().collect();
        self.ordinals(value)?;

        let mut carry = u128::from(amount);
        for (pos, slot) in self.slots.iter().enumerate().rev() {
            if carry == 0 {
                break;
            }
            let Some((index, origin)) = slot.decode(chars[pos]) else {
                continue;
            };
            let base = u128::from(slot.base());
            let sum = u128::from(index) + carry;
            carry = sum / base;
            // sum % base < 26, always a valid offset from the alphabet origin
            chars[pos] = char::from_u32(origin as u32 + (sum % base) as u32).unwrap_or(origin);
        }

        if carry > 0 {
            return Err(self.exhausted(value));
        }
        Ok(chars.into_iter().collect())
    }

    /// Order two values of this pattern by slot ordinals, left to right.
    ///
    /// Returns `None` when either value does not fit the template.
    pub fn compare(&self, a: &str, b: &str) -> Option<Ordering> {
        let a = self.ordinals(a).ok()?;
        let b = self.ordinals(b).ok()?;
        Some(a.cmp(&b))
    }

    fn ordinals(&self, value: &str) -> Result<Vec<u32>> {
        let chars: Vec<char> = value.chars().collect();
        if chars.len() != self.slots.len() {
            return Err(IdError::Exhausted(format!(
                "pattern '{}': value '{}' does not have width {}",
                self.template,
                value,
                self.width()
            )));
        }

        let mut ordinals = Vec::with_capacity(chars.len());
        for (slot, c) in self.slots.iter().zip(chars) {
            if let Slot::Literal(_) = slot {
                continue;
            }
            match slot.decode(c) {
                Some((index, _)) => ordinals.push(index),
                None => {
                    tracing::debug!(
                        pattern = %self.template,
                        value,
                        found = %c,
                        "value does not match pattern, cannot generate an ID"
                    );
                    return Err(IdError::Exhausted(format!(
                        "pattern '{}': invalid character '{}' in value '{}'",
                        self.template, c, value
                    )));
                }
            }
        }
        Ok(ordinals)
    }

    fn exhausted(&self, value: &str) -> IdError {
        IdError::Exhausted(format!(
            "pattern '{}' and value '{}'",
            self.template, value
        ))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}
