//! Outer-totalistic rules in B/S notation (B3/S23 by default).

use std::fmt;
use std::str::FromStr;

use super::error::StreamLifeError;

/// Birth and survival neighbour counts, one bit per count 0..=8.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rule {
    birth: u16,
    survival: u16,
}

impl Default for Rule {
    fn default() -> Self {
        Self::conway()
    }
}

impl Rule {
    pub const fn conway() -> Self {
        Self {
            birth: 1 << 3,
            survival: (1 << 2) | (1 << 3),
        }
    }

    pub fn new(birth: &[u8], survival: &[u8]) -> Self {
        let mask = |counts: &[u8]| {
            counts
                .iter()
                .filter(|&&n| n <= 8)
                .fold(0u16, |acc, &n| acc | (1 << n))
        };
        Self {
            birth: mask(birth),
            survival: mask(survival),
        }
    }

    /// Next state of a cell given its state and live neighbour count.
    #[inline(always)]
    pub fn next_state(self, alive: bool, neighbors: u8) -> bool {
        let mask = if alive { self.survival } else { self.birth };
        (mask >> neighbors) & 1 == 1
    }

    /// Bitmask lookup table indexed by `alive * 16 + neighbors`.
    pub fn table(self) -> [u8; 32] {
        let mut table = [0u8; 32];
        for n in 0..=8u8 {
            table[n as usize] = self.next_state(false, n) as u8;
            table[16 + n as usize] = self.next_state(true, n) as u8;
        }
        table
    }
}

impl FromStr for Rule {
    type Err = StreamLifeError;

    /// Parses `B3/S23`, `b36/s23` or the bare `23/3` (S/B) form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StreamLifeError::InvalidRule(s.to_owned());
        let (left, right) = s.trim().split_once('/').ok_or_else(invalid)?;
        let digits = |part: &str| -> Result<Vec<u8>, StreamLifeError> {
            part.chars()
                .map(|c| match c.to_digit(10) {
                    Some(d) if d <= 8 => Ok(d as u8),
                    _ => Err(invalid()),
                })
                .collect()
        };
        let split_prefix = |part: &str, prefix: char| {
            part.strip_prefix(prefix)
                .or_else(|| part.strip_prefix(prefix.to_ascii_lowercase()))
                .map(str::to_owned)
        };

        match (split_prefix(left, 'B'), split_prefix(right, 'S')) {
            (Some(b), Some(s)) => Ok(Rule::new(&digits(&b)?, &digits(&s)?)),
            (None, None) => {
                if let (Some(s), Some(b)) = (split_prefix(left, 'S'), split_prefix(right, 'B')) {
                    return Ok(Rule::new(&digits(&b)?, &digits(&s)?));
                }
                Ok(Rule::new(&digits(right)?, &digits(left)?))
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = |mask: u16| {
            (0..=8u16)
                .filter(|&n| (mask >> n) & 1 == 1)
                .map(|n| char::from(b'0' + n as u8))
                .collect::<String>()
        };
        write!(f, "B{}/S{}", counts(self.birth), counts(self.survival))
    }
}
