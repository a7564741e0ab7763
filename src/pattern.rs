//! Conversion between opcode bit patterns and byte values.
//!
//! A bit pattern is an eight character string over `0`, `1` and `.`, most significant bit
//! first. A `.` is a don't-care position: it matches either bit and contributes nothing to
//! the value of the pattern.

/// Returns the value of `pattern` with every don't-care bit treated as zero.
///
/// Patterns shorter than eight characters are read as the low bits of the value.
pub fn pattern_to_value(pattern: &str) -> u8 {
    pattern.chars().fold(0u8, |value, bit| {
        let value = value.wrapping_shl(1);

        match bit {
            '1' => value | 1,
            _ => value,
        }
    })
}

/// Renders `value` as an eight character `0`/`1` string.
pub fn value_to_pattern(value: u8) -> String {
    format!("{:08b}", value)
}

/// Checks if `value` agrees with every position of `pattern` that is not a don't-care.
///
/// An empty pattern never matches anything; it is used by catalog entries that cannot be
/// selected through instruction bits (eg. the program counter).
pub fn matches(pattern: &str, value: u8) -> bool {
    if pattern.is_empty() {
        return false;
    }

    let bits = value_to_pattern(value);

    pattern.len() == bits.len()
        && pattern.chars().zip(bits.chars()).all(|(p, b)| p == '.' || p == b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_to_value() {
        assert_eq!(pattern_to_value("0010...."), 0x20);
        assert_eq!(pattern_to_value("....01.."), 0x04);
        assert_eq!(pattern_to_value("........"), 0);
        assert_eq!(pattern_to_value("11111111"), 0xFF);
    }

    #[test]
    fn test_value_to_pattern() {
        assert_eq!(value_to_pattern(0x20), "00100000");
        assert_eq!(value_to_pattern(0xFF), "11111111");
    }

    #[test]
    fn test_matches() {
        assert!(matches("0010....", 0x2F));
        assert!(matches("0010....", 0x20));
        assert!(!matches("0010....", 0x30));
        assert!(matches("......11", 0x03));
        assert!(!matches("", 0x00));
    }
}
