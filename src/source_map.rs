//! Mapping between memory locations and source lines.

use std::collections::{BTreeMap, HashMap};
use std::iter::FromIterator;

/// Mapping from memory addresses to the source lines that defined them, and back.
///
/// Line numbers are zero based. A line that defines several bytes maps back to the first of
/// them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    lines: HashMap<usize, usize>,
    addresses: BTreeMap<usize, usize>,
}

impl FromIterator<(usize, usize)> for SourceMap {
    fn from_iter<I>(iter: I) -> Self
        where I: IntoIterator<Item = (usize, usize)>
    {
        let mut map = SourceMap::default();

        for (address, line) in iter {
            map.insert(address, line);
        }

        map
    }
}

impl SourceMap {
    pub fn new() -> SourceMap {
        SourceMap::default()
    }

    /// Records that `line` defined the value of `address`.
    pub fn insert(&mut self, address: usize, line: usize) {
        self.lines.insert(address, line);
        self.addresses.entry(line).or_insert(address);
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.addresses.clear();
    }

    /// Returns the line which defined the value for the given memory location.
    pub fn line_of_address(&self, address: usize) -> Option<usize> {
        self.lines.get(&address).copied()
    }

    /// Returns the first address defined by `line`.
    pub fn address_of_line(&self, line: usize) -> Option<usize> {
        self.addresses.get(&line).copied()
    }

    /// Number of mapped addresses.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_directions() {
        let map: SourceMap = vec![(4, 1), (5, 1), (6, 2)].into_iter().collect();

        assert_eq!(map.line_of_address(5), Some(1));
        assert_eq!(map.address_of_line(1), Some(4));
        assert_eq!(map.address_of_line(0), None);
        assert_eq!(map.len(), 3);
    }
}
