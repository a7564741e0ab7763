//! Binary memory dumps.
//!
//! A dump is the length of the machine identifier, the identifier itself and then two bytes
//! per memory cell: the value followed by a zero byte.
//!
//! ```
//! use edusim::{machines, memory_dump, Machine};
//!
//! let mut machine = Machine::new(&machines::NEANDER);
//! machine.set_memory_value(4, 42);
//!
//! let dump = memory_dump::export(&machine);
//! assert_eq!(dump.len(), 1 + 3 + 2 * 256);
//! assert_eq!(dump[..4], *b"\x03NDR");
//!
//! let mut copy = Machine::new(&machines::NEANDER);
//! memory_dump::import(&mut copy, &dump).unwrap();
//! assert_eq!(copy.get_memory_value(4), 42);
//! ```

use nom::{
    IResult,
    combinator::all_consuming,
    multi::{count, length_data},
    number::complete::be_u8,
    sequence::tuple,
};

use crate::error::ImportError;
use crate::machine::Machine;

type Result<'a, T> = IResult<&'a [u8], T>;

/// Size in bytes of a dump of `machine`.
pub fn dump_size(machine: &Machine) -> usize {
    1 + machine.identifier().len() + 2 * machine.memory_size()
}

/// Serializes the memory of `machine`.
pub fn export(machine: &Machine) -> Vec<u8> {
    let identifier = machine.identifier().as_bytes();
    let mut dump = Vec::with_capacity(dump_size(machine));

    dump.push(identifier.len() as u8);
    dump.extend_from_slice(identifier);

    for value in machine.memory() {
        dump.push(value);
        dump.push(0);
    }

    dump
}

fn parse_identifier(input: &[u8]) -> Result<&[u8]> {
    length_data(be_u8)(input)
}

fn parse_dump(input: &[u8], num_cells: usize) -> Result<(&[u8], Vec<(u8, u8)>)> {
    all_consuming(tuple((parse_identifier, count(tuple((be_u8, be_u8)), num_cells))))(input)
}

/// Reads the identifier of the machine that made `bytes`.
///
/// Returns `None` if the dump does not start with a valid identifier.
pub fn identifier(bytes: &[u8]) -> Option<&str> {
    let (_, identifier) = parse_identifier(bytes).ok()?;
    std::str::from_utf8(identifier).ok()
}

/// Loads a dump made by [export] into the memory of `machine`.
///
/// Only the cells whose value changes are written. Labels of an earlier build are cleared,
/// since they no longer describe the memory.
///
/// # Errors
/// The dump is rejected as a whole if its size does not match the machine exactly, or if it
/// was made by another machine.
pub fn import(machine: &mut Machine, bytes: &[u8]) -> std::result::Result<(), ImportError> {
    let expected = match bytes.first() {
        Some(&length) => 1 + length as usize + 2 * machine.memory_size(),
        None => dump_size(machine),
    };

    if bytes.len() != expected {
        return Err(ImportError::InvalidSize {
            expected,
            found: bytes.len(),
        });
    }

    let (_, (identifier, cells)) =
        parse_dump(bytes, machine.memory_size()).map_err(|_| ImportError::Malformed)?;

    let identifier = std::str::from_utf8(identifier).map_err(|_| ImportError::Malformed)?;

    if identifier != machine.identifier() {
        return Err(ImportError::IdentifierMismatch {
            expected: machine.identifier().to_string(),
            found: identifier.to_string(),
        });
    }

    machine.start_event_queue();

    for (address, (value, _)) in cells.into_iter().enumerate() {
        if machine.get_memory_value(address) != value {
            machine.set_memory_value(address, value as i64);
        }

        machine.set_label(address, String::new());
    }

    machine.update_instruction_strings();
    machine.flush_events();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machines;

    #[test]
    fn test_padding_is_zero() {
        let mut machine = Machine::new(&machines::VOLTA);
        machine.set_memory_value(0, 0xFF);

        let dump = export(&machine);
        assert_eq!(dump[..6], [3, b'V', b'L', b'T', 0xFF, 0]);
    }

    #[test]
    fn test_identifier() {
        let dump = export(&Machine::new(&machines::CESAR));

        assert_eq!(identifier(&dump), Some("C16"));
        assert_eq!(identifier(&[]), None);
        assert_eq!(identifier(&[5, b'N']), None);
    }

    #[test]
    fn test_rejects_wrong_size() {
        let mut machine = Machine::new(&machines::NEANDER);
        let mut dump = export(&machine);
        dump.push(0);

        assert_eq!(
            import(&mut machine, &dump),
            Err(ImportError::InvalidSize { expected: 516, found: 517 }),
        );

        assert_eq!(
            import(&mut machine, &[]),
            Err(ImportError::InvalidSize { expected: 516, found: 0 }),
        );
    }

    #[test]
    fn test_rejects_other_machine() {
        let mut ahmes = Machine::new(&machines::AHMES);
        ahmes.set_memory_value(1, 1);

        let mut neander = Machine::new(&machines::NEANDER);
        let result = import(&mut neander, &export(&ahmes));

        assert_eq!(
            result,
            Err(ImportError::IdentifierMismatch {
                expected: "NDR".to_string(),
                found: "AHM".to_string(),
            }),
        );
        assert_eq!(neander.get_memory_value(1), 0);
    }

    #[test]
    fn test_import_updates_instruction_strings() {
        let mut source = Machine::new(&machines::NEANDER);
        source.set_memory_value(0, 0x20);
        source.set_memory_value(1, 0x80);

        let mut machine = Machine::new(&machines::NEANDER);
        import(&mut machine, &export(&source)).unwrap();

        assert_eq!(machine.memory(), source.memory());
        assert_eq!(machine.instruction_string(0), "LDA 128");
    }
}
