//! Quantitative rights: copy and print counters.

use serde::{Deserialize, Serialize};

use crate::error::RightsError;
use crate::license::Rights;

/// A consumable right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Right {
    /// Characters of text that may be copied.
    Copy,
    /// Pages that may be printed.
    Print,
}

/// Remaining copy and print allowances. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RightsCounters {
    pub copies_left: Option<u32>,
    pub prints_left: Option<u32>,
}

impl RightsCounters {
    /// Initial counters for a freshly acquired license.
    pub fn from_rights(rights: &Rights) -> Self {
        Self {
            copies_left: rights.copy,
            prints_left: rights.print,
        }
    }

    pub fn left(&self, right: Right) -> Option<u32> {
        match right {
            Right::Copy => self.copies_left,
            Right::Print => self.prints_left,
        }
    }

    pub fn can_consume(&self, right: Right, amount: u32) -> bool {
        self.left(right).map_or(true, |left| left >= amount)
    }

    /// Consume `amount` of `right`, leaving the counters untouched on
    /// failure.
    pub fn consume(&mut self, right: Right, amount: u32) -> Result<(), RightsError> {
        let slot = match right {
            Right::Copy => &mut self.copies_left,
            Right::Print => &mut self.prints_left,
        };
        match slot {
            None => Ok(()),
            Some(left) if *left >= amount => {
                *left -= amount;
                Ok(())
            }
            Some(left) => Err(RightsError::Exhausted {
                right,
                left: *left,
                requested: amount,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_counters() {
        let mut counters = RightsCounters::default();
        assert!(counters.can_consume(Right::Copy, u32::MAX));
        counters.consume(Right::Print, 1000).unwrap();
        assert_eq!(counters.prints_left, None);
    }

    #[test]
    fn test_consume_decrements() {
        let mut counters = RightsCounters {
            copies_left: Some(10),
            prints_left: Some(2),
        };
        counters.consume(Right::Copy, 4).unwrap();
        assert_eq!(counters.left(Right::Copy), Some(6));
        counters.consume(Right::Print, 2).unwrap();
        assert_eq!(counters.left(Right::Print), Some(0));
    }

    #[test]
    fn test_exhausted_leaves_counters_untouched() {
        let mut counters = RightsCounters {
            copies_left: Some(3),
            prints_left: None,
        };
        let err = counters.consume(Right::Copy, 4).unwrap_err();
        assert_eq!(
            err,
            RightsError::Exhausted {
                right: Right::Copy,
                left: 3,
                requested: 4
            }
        );
        assert_eq!(counters.copies_left, Some(3));
        assert!(!counters.can_consume(Right::Copy, 4));
    }

    #[test]
    fn test_from_rights() {
        let rights = Rights {
            print: Some(5),
            copy: None,
            ..Default::default()
        };
        let counters = RightsCounters::from_rights(&rights);
        assert_eq!(counters.prints_left, Some(5));
        assert_eq!(counters.copies_left, None);
    }
}
