//! Instruction strings for display.
//!
//! Every memory cell that starts an instruction gets the mnemonic and arguments of that
//! instruction; the operand bytes following it get an empty string. Decoding here only peeks
//! at memory, so it never touches the access counter.

use crate::instruction::{AddressingMode, AddressingModeCode, Instruction};
use crate::machine::{Endianness, Machine, Variant};

/// Condition code letters in the order of their bits, most significant first.
const FLAG_LETTERS: [char; 4] = ['N', 'Z', 'V', 'C'];

impl Machine {
    /// Disassembles the instruction starting at `address`.
    ///
    /// # Returns
    /// The instruction string and the number of bytes the instruction occupies. Cells that do
    /// not hold a known opcode give an empty string and a size of one.
    pub fn generate_instruction_string(&self, address: usize) -> (String, usize) {
        let opcode = self.get_memory_value(address);

        let instruction = match self.find_instruction(opcode) {
            Some(instruction) => instruction,
            None => return (String::new(), 1),
        };

        let (arguments, num_bytes) = match self.config().variant {
            Variant::Word => self.word_arguments(address, instruction),
            Variant::Standard | Variant::Stack => self.byte_arguments(address, instruction),
        };

        let separator = match self.config().variant {
            Variant::Word => ", ",
            _ => " ",
        };

        let mut text = instruction.to_string();
        let arguments: Vec<_> = arguments.into_iter().filter(|arg| !arg.is_empty()).collect();

        if !arguments.is_empty() {
            text.push(' ');
            text.push_str(&arguments.join(separator));
        }

        (text, num_bytes)
    }

    /// Regenerates the instruction string of every memory cell, publishing `INS.STR.<addr>`
    /// for the cells whose string changed.
    pub fn update_instruction_strings(&mut self) {
        let size = self.memory_size();
        let mut address = 0;

        while address < size {
            let (text, num_bytes) = self.generate_instruction_string(address);
            self.set_instruction_string(address, text);

            for operand in address + 1..(address + num_bytes).min(size) {
                self.set_instruction_string(operand, String::new());
            }

            address += num_bytes.max(1);
        }
    }

    /// Reads `num_bytes` bytes as one number without counting accesses.
    fn peek_value(&self, address: usize, num_bytes: usize, endianness: Endianness) -> usize {
        (0..num_bytes).fold(0, |value, i| {
            let byte = self.get_memory_value(address + i) as usize;

            match endianness {
                Endianness::Big => (value << 8) | byte,
                Endianness::Little => value | (byte << (8 * i)),
            }
        })
    }

    fn byte_arguments(&self, address: usize, instruction: &Instruction) -> (Vec<String>, usize) {
        let opcode = self.get_memory_value(address);
        let mode = self.find_addressing_mode(opcode);
        let modes: Vec<_> = mode.into_iter().collect();
        let num_bytes = self.instruction_num_bytes(instruction, &modes);

        let operand_width = self.operand_num_bytes(mode);
        let mut cursor = address + 1;

        let arguments = instruction
            .parameters()
            .into_iter()
            .map(|parameter| match parameter {
                "r" => self.find_register(opcode).to_string(),
                _ => {
                    let value = self.peek_value(cursor, operand_width, self.config().endianness);
                    cursor += operand_width;

                    match mode {
                        Some(mode) => mode.render(&value.to_string(), ""),
                        None => value.to_string(),
                    }
                }
            })
            .collect();

        (arguments, num_bytes)
    }

    fn word_register_name(&self, bits: u8) -> &'static str {
        let config = self.config();

        config
            .registers
            .get((bits & 0b111) as usize)
            .map(|register| register.name())
            .unwrap_or("")
    }

    fn word_arguments(&self, address: usize, instruction: &Instruction) -> (Vec<String>, usize) {
        let opcode = self.get_memory_value(address);
        let operand = if instruction.num_bytes == 1 {
            0
        } else {
            self.get_memory_value(address + 1)
        };

        let word = (opcode as u16) << 8 | operand as u16;
        let parameters = instruction.parameters();

        let operand_bits = |parameter: &str| -> u8 {
            match parameter {
                "a0" => ((word >> 6) & 0b11_1111) as u8,
                "a1" => (word & 0b11_1111) as u8,
                _ => operand,
            }
        };

        let modes: Vec<&AddressingMode> = parameters
            .iter()
            .filter(|parameter| parameter.starts_with('a'))
            .filter_map(|parameter| self.word_addressing_mode(operand_bits(*parameter)))
            .collect();

        let num_bytes = self.instruction_num_bytes(instruction, &modes);
        let mut cursor = address + 2;

        let arguments = parameters
            .iter()
            .map(|parameter| match *parameter {
                "r" => self.word_register_name(opcode).to_string(),
                "o" => match instruction.mnemonic() {
                    "sob" => operand.to_string(),
                    _ => (operand as i8).to_string(),
                },
                "f" => FLAG_LETTERS
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| opcode & (0b1000u8 >> *i) != 0)
                    .map(|(_, letter)| *letter)
                    .collect(),
                parameter => {
                    let bits = operand_bits(parameter);
                    let mode = match self.word_addressing_mode(bits) {
                        Some(mode) => mode,
                        None => return String::new(),
                    };

                    let value = if self.operand_num_bytes(Some(mode)) == 2 {
                        let value = self.peek_value(cursor, 2, Endianness::Big);
                        cursor += 2;
                        value
                    } else {
                        0
                    };

                    let value = match mode.code {
                        AddressingModeCode::Indexed | AddressingModeCode::IndexedIndirect => {
                            (value as u16 as i16).to_string()
                        }
                        _ => value.to_string(),
                    };

                    mode.render(&value, self.word_register_name(bits))
                }
            })
            .collect();

        (arguments, num_bytes)
    }
}
