//! Catalogs of the supported machines.
//!
//! | Machine  | Identifier | Memory | Registers                 | Variant  |
//! |----------|------------|--------|---------------------------|----------|
//! | Neander  | `NDR`      | 256    | `AC`, `PC`                | standard |
//! | Ahmes    | `AHM`      | 256    | `AC`, `PC`                | standard |
//! | Ramses   | `RMS`      | 256    | `A`, `B`, `X`, `PC`       | standard |
//! | Pericles | `PRC`      | 4096   | `A`, `B`, `X`, `PC`       | standard |
//! | REG      | `REG`      | 256    | `R0`-`R63`, `PC`          | standard |
//! | Volta    | `VLT`      | 256    | `PC`, `SP`                | stack    |
//! | Cesar    | `C16`      | 65536  | `R0`-`R7` (`R7` is `PC`)  | word     |

use lazy_static::lazy_static;

use crate::instruction::{
    AddressingMode,
    AddressingModeCode as Mode,
    Condition,
    Flag,
    FlagCode,
    Instruction,
    InstructionCode as Code,
    Register,
};
use crate::machine::{Endianness, MachineConfig, Variant};

fn neander_flags() -> Vec<Flag> {
    vec![
        Flag::new(FlagCode::Negative, "N", false),
        Flag::new(FlagCode::Zero, "Z", true),
    ]
}

/// Addressing modes shared by Ramses and Pericles.
fn ramses_addressing_modes() -> Vec<AddressingMode> {
    vec![
        AddressingMode::new("......00", Mode::Direct, "a"),
        AddressingMode::new("......01", Mode::Indirect, "a,I"),
        AddressingMode::new("......10", Mode::Immediate, "#a"),
        AddressingMode::new("......11", Mode::IndexedByX, "a,X"),
    ]
}

/// Registers shared by Ramses and Pericles. `....11..` selects no register.
fn ramses_registers(pc_bits: u32) -> Vec<Register> {
    vec![
        Register::new("A", "....00..", 8, true),
        Register::new("B", "....01..", 8, true),
        Register::new("X", "....10..", 8, true),
        Register::new("PC", "", pc_bits, false),
    ]
}

/// Instruction set shared by Ramses and Pericles. Pericles sizes its operand instructions
/// by addressing mode, which `operand_size` 0 requests.
fn ramses_instructions(operand_size: usize) -> Vec<Instruction> {
    vec![
        Instruction::new(1, "0000....", Code::Nop, "nop"),
        Instruction::new(operand_size, "0001....", Code::Store, "str r a"),
        Instruction::new(operand_size, "0010....", Code::Load, "ldr r a"),
        Instruction::new(operand_size, "0011....", Code::Add, "add r a"),
        Instruction::new(operand_size, "0100....", Code::Or, "or r a"),
        Instruction::new(operand_size, "0101....", Code::And, "and r a"),
        Instruction::new(1, "0110....", Code::Not, "not r"),
        Instruction::new(operand_size, "0111....", Code::Sub, "sub r a"),
        Instruction::new(operand_size, "1000....", Code::Jmp, "jmp a"),
        Instruction::new(operand_size, "1001....", Code::Jn, "jn a"),
        Instruction::new(operand_size, "1010....", Code::Jz, "jz a"),
        Instruction::new(operand_size, "1011....", Code::Jc, "jc a"),
        Instruction::new(operand_size, "1100....", Code::Jsr, "jsr a"),
        Instruction::new(1, "1101....", Code::Neg, "neg r"),
        Instruction::new(1, "1110....", Code::Shr, "shr r"),
        Instruction::new(1, "1111....", Code::Hlt, "hlt"),
    ]
}

lazy_static! {
    /// 8-bit accumulator machine with a single direct addressing mode.
    pub static ref NEANDER: MachineConfig = MachineConfig {
        name: "Neander",
        identifier: "NDR",
        file_extension: "mem",
        memory_size: 256,
        flags: neander_flags(),
        registers: vec![
            Register::new("AC", "", 8, true),
            Register::new("PC", "", 8, false),
        ],
        instructions: vec![
            Instruction::new(1, "0000....", Code::Nop, "nop"),
            Instruction::new(2, "0001....", Code::Store, "sta a"),
            Instruction::new(2, "0010....", Code::Load, "lda a"),
            Instruction::new(2, "0011....", Code::Add, "add a"),
            Instruction::new(2, "0100....", Code::Or, "or a"),
            Instruction::new(2, "0101....", Code::And, "and a"),
            Instruction::new(1, "0110....", Code::Not, "not"),
            Instruction::new(2, "1000....", Code::Jmp, "jmp a"),
            Instruction::new(2, "1001....", Code::Jn, "jn a"),
            Instruction::new(2, "1010....", Code::Jz, "jz a"),
            Instruction::new(1, "1111....", Code::Hlt, "hlt"),
        ],
        addressing_modes: vec![
            AddressingMode::new("........", Mode::Direct, "a"),
        ],
        endianness: Endianness::Big,
        pc_name: "PC",
        accumulator: "AC",
        immediate_num_bytes: 1,
        stack_pointer_name: "",
        stack_size: 0,
        variant: Variant::Standard,
    };

    /// Neander extended with subtraction, shifts and carry/borrow/overflow flags.
    pub static ref AHMES: MachineConfig = MachineConfig {
        name: "Ahmes",
        identifier: "AHM",
        file_extension: "mem",
        memory_size: 256,
        flags: vec![
            Flag::new(FlagCode::Negative, "N", false),
            Flag::new(FlagCode::Zero, "Z", true),
            Flag::new(FlagCode::Overflow, "V", false),
            Flag::new(FlagCode::Carry, "C", false),
            Flag::new(FlagCode::Borrow, "B", false),
        ],
        registers: vec![
            Register::new("AC", "", 8, true),
            Register::new("PC", "", 8, false),
        ],
        instructions: vec![
            Instruction::new(1, "0000....", Code::Nop, "nop"),
            Instruction::new(2, "0001....", Code::Store, "sta a"),
            Instruction::new(2, "0010....", Code::Load, "lda a"),
            Instruction::new(2, "0011....", Code::Add, "add a"),
            Instruction::new(2, "0100....", Code::Or, "or a"),
            Instruction::new(2, "0101....", Code::And, "and a"),
            Instruction::new(1, "0110....", Code::Not, "not"),
            Instruction::new(2, "0111....", Code::Sub, "sub a"),
            Instruction::new(2, "1000....", Code::Jmp, "jmp a"),
            Instruction::new(2, "100100..", Code::Jn, "jn a"),
            Instruction::new(2, "100101..", Code::Jp, "jp a"),
            Instruction::new(2, "100110..", Code::Jv, "jv a"),
            Instruction::new(2, "100111..", Code::Jnv, "jnv a"),
            Instruction::new(2, "101000..", Code::Jz, "jz a"),
            Instruction::new(2, "101001..", Code::Jnz, "jnz a"),
            Instruction::new(2, "101100..", Code::Jc, "jc a"),
            Instruction::new(2, "101101..", Code::Jnc, "jnc a"),
            Instruction::new(2, "101110..", Code::Jb, "jb a"),
            Instruction::new(2, "101111..", Code::Jnb, "jnb a"),
            Instruction::new(1, "111000..", Code::Shr, "shr"),
            Instruction::new(1, "111001..", Code::Shl, "shl"),
            Instruction::new(1, "111010..", Code::Ror, "ror"),
            Instruction::new(1, "111011..", Code::Rol, "rol"),
            Instruction::new(1, "1111....", Code::Hlt, "hlt"),
        ],
        addressing_modes: vec![
            AddressingMode::new("........", Mode::Direct, "a"),
        ],
        endianness: Endianness::Big,
        pc_name: "PC",
        accumulator: "AC",
        immediate_num_bytes: 1,
        stack_pointer_name: "",
        stack_size: 0,
        variant: Variant::Standard,
    };

    /// Three register machine with direct, indirect, immediate and indexed addressing.
    pub static ref RAMSES: MachineConfig = MachineConfig {
        name: "Ramses",
        identifier: "RMS",
        file_extension: "mem",
        memory_size: 256,
        flags: vec![
            Flag::new(FlagCode::Negative, "N", false),
            Flag::new(FlagCode::Zero, "Z", true),
            Flag::new(FlagCode::Carry, "C", false),
        ],
        registers: ramses_registers(8),
        instructions: ramses_instructions(2),
        addressing_modes: ramses_addressing_modes(),
        endianness: Endianness::Big,
        pc_name: "PC",
        accumulator: "",
        immediate_num_bytes: 1,
        stack_pointer_name: "",
        stack_size: 0,
        variant: Variant::Standard,
    };

    /// Ramses with a 12-bit program counter, 4096 bytes of memory and little-endian
    /// two-byte addresses. Immediate operands stay one byte wide.
    pub static ref PERICLES: MachineConfig = MachineConfig {
        name: "Pericles",
        identifier: "PRC",
        file_extension: "mem",
        memory_size: 4096,
        flags: vec![
            Flag::new(FlagCode::Negative, "N", false),
            Flag::new(FlagCode::Zero, "Z", true),
            Flag::new(FlagCode::Carry, "C", false),
        ],
        registers: ramses_registers(12),
        instructions: ramses_instructions(0),
        addressing_modes: ramses_addressing_modes(),
        endianness: Endianness::Little,
        pc_name: "PC",
        accumulator: "",
        immediate_num_bytes: 1,
        stack_pointer_name: "",
        stack_size: 0,
        variant: Variant::Standard,
    };

    /// Register machine with 64 registers and nothing but increment, decrement and a
    /// two-way conditional jump.
    pub static ref REG: MachineConfig = MachineConfig {
        name: "REG",
        identifier: "REG",
        file_extension: "mem",
        memory_size: 256,
        flags: Vec::new(),
        registers: reg_registers(),
        instructions: vec![
            Instruction::new(1, "00......", Code::Hlt, "hlt"),
            Instruction::new(1, "01......", Code::Inc, "inc r"),
            Instruction::new(1, "10......", Code::Dec, "dec r"),
            Instruction::new(3, "11......", Code::If, "if r a0 a1"),
        ],
        addressing_modes: vec![
            AddressingMode::new("........", Mode::Direct, "a"),
        ],
        endianness: Endianness::Big,
        pc_name: "PC",
        accumulator: "",
        immediate_num_bytes: 1,
        stack_pointer_name: "",
        stack_size: 0,
        variant: Variant::Standard,
    };

    /// Stack machine with a 64 cell stack separate from memory.
    pub static ref VOLTA: MachineConfig = MachineConfig {
        name: "Volta",
        identifier: "VLT",
        file_extension: "mem",
        memory_size: 256,
        flags: Vec::new(),
        registers: vec![
            Register::new("PC", "", 8, false),
            Register::new("SP", "", 6, false),
        ],
        instructions: vec![
            Instruction::new(1, "00000000", Code::Nop, "nop"),
            Instruction::new(1, "00000001", Code::Add, "add"),
            Instruction::new(1, "00000010", Code::Sub, "sub"),
            Instruction::new(1, "00000011", Code::And, "and"),
            Instruction::new(1, "00000100", Code::Or, "or"),
            Instruction::new(1, "00010001", Code::Clr, "clr"),
            Instruction::new(1, "00010010", Code::Not, "not"),
            Instruction::new(1, "00010011", Code::Neg, "neg"),
            Instruction::new(1, "00010100", Code::Inc, "inc"),
            Instruction::new(1, "00010101", Code::Dec, "dec"),
            Instruction::new(1, "00010110", Code::Asr, "asr"),
            Instruction::new(1, "00010111", Code::Asl, "asl"),
            Instruction::new(1, "00011000", Code::Ror, "ror"),
            Instruction::new(1, "00011001", Code::Rol, "rol"),
            Instruction::new(1, "00100001", Code::Sz, "sz"),
            Instruction::new(1, "00100010", Code::Snz, "snz"),
            Instruction::new(1, "00100011", Code::Spl, "spl"),
            Instruction::new(1, "00100100", Code::Smi, "smi"),
            Instruction::new(1, "00100101", Code::Spz, "spz"),
            Instruction::new(1, "00100110", Code::Smz, "smz"),
            Instruction::new(1, "01100110", Code::Rts, "rts"),
            Instruction::new(2, "011100..", Code::Push, "psh a"),
            Instruction::new(2, "011101..", Code::Pop, "pop a"),
            Instruction::new(2, "100000..", Code::Jmp, "jmp a"),
            Instruction::new(2, "100001..", Code::Jsr, "jsr a"),
            Instruction::new(1, "1111....", Code::Hlt, "hlt"),
        ],
        addressing_modes: vec![
            AddressingMode::new("......00", Mode::Direct, "a"),
            AddressingMode::new("......01", Mode::Indirect, "a,I"),
            AddressingMode::new("......10", Mode::Immediate, "#a"),
            AddressingMode::new("......11", Mode::IndexedByPc, "a,PC"),
        ],
        endianness: Endianness::Big,
        pc_name: "PC",
        accumulator: "",
        immediate_num_bytes: 1,
        stack_pointer_name: "SP",
        stack_size: 64,
        variant: Variant::Stack,
    };

    /// 16-bit machine with eight registers and eight register based addressing modes.
    ///
    /// Opcode and operand words are stored high byte first, while `DW` and `DAW` literals are
    /// stored low byte first.
    pub static ref CESAR: MachineConfig = MachineConfig {
        name: "Cesar",
        identifier: "C16",
        file_extension: "mem",
        memory_size: 65536,
        flags: vec![
            Flag::new(FlagCode::Negative, "N", false),
            Flag::new(FlagCode::Zero, "Z", true),
            Flag::new(FlagCode::Overflow, "V", false),
            Flag::new(FlagCode::Carry, "C", false),
        ],
        registers: vec![
            Register::new("R0", ".....000", 16, true),
            Register::new("R1", ".....001", 16, true),
            Register::new("R2", ".....010", 16, true),
            Register::new("R3", ".....011", 16, true),
            Register::new("R4", ".....100", 16, true),
            Register::new("R5", ".....101", 16, true),
            Register::new("R6", ".....110", 16, true),
            Register::new("R7", ".....111", 16, false),
        ],
        instructions: cesar_instructions(),
        addressing_modes: vec![
            AddressingMode::new("..101...", Mode::PostIncrementIndirect, "((r)+)"),
            AddressingMode::new("..110...", Mode::PreDecrementIndirect, "(-(r))"),
            AddressingMode::new("..111...", Mode::IndexedIndirect, "(a(r))"),
            AddressingMode::new("..001...", Mode::PostIncrement, "(r)+"),
            AddressingMode::new("..010...", Mode::PreDecrement, "-(r)"),
            AddressingMode::new("..011...", Mode::Indexed, "a(r)"),
            AddressingMode::new("..100...", Mode::RegisterIndirect, "(r)"),
            AddressingMode::new("..000...", Mode::Register, "r"),
            AddressingMode::new("..001...", Mode::Immediate, "#a"),
            AddressingMode::new("..101...", Mode::Direct, "a"),
        ],
        endianness: Endianness::Little,
        pc_name: "R7",
        accumulator: "",
        immediate_num_bytes: 2,
        stack_pointer_name: "R6",
        stack_size: 0,
        variant: Variant::Word,
    };
}

fn reg_registers() -> Vec<Register> {
    const NAMES: [&str; 64] = [
        "R0", "R1", "R2", "R3", "R4", "R5", "R6", "R7", "R8", "R9", "R10", "R11", "R12",
        "R13", "R14", "R15", "R16", "R17", "R18", "R19", "R20", "R21", "R22", "R23", "R24",
        "R25", "R26", "R27", "R28", "R29", "R30", "R31", "R32", "R33", "R34", "R35", "R36",
        "R37", "R38", "R39", "R40", "R41", "R42", "R43", "R44", "R45", "R46", "R47", "R48",
        "R49", "R50", "R51", "R52", "R53", "R54", "R55", "R56", "R57", "R58", "R59", "R60",
        "R61", "R62", "R63",
    ];

    const PATTERNS: [&str; 64] = [
        "..000000", "..000001", "..000010", "..000011", "..000100", "..000101", "..000110",
        "..000111", "..001000", "..001001", "..001010", "..001011", "..001100", "..001101",
        "..001110", "..001111", "..010000", "..010001", "..010010", "..010011", "..010100",
        "..010101", "..010110", "..010111", "..011000", "..011001", "..011010", "..011011",
        "..011100", "..011101", "..011110", "..011111", "..100000", "..100001", "..100010",
        "..100011", "..100100", "..100101", "..100110", "..100111", "..101000", "..101001",
        "..101010", "..101011", "..101100", "..101101", "..101110", "..101111", "..110000",
        "..110001", "..110010", "..110011", "..110100", "..110101", "..110110", "..110111",
        "..111000", "..111001", "..111010", "..111011", "..111100", "..111101", "..111110",
        "..111111",
    ];

    let mut registers: Vec<Register> = NAMES
        .iter()
        .zip(PATTERNS.iter())
        .map(|(&name, &pattern)| Register::new(name, pattern, 8, true))
        .collect();

    registers.push(Register::new("PC", "", 8, false));
    registers
}

fn cesar_instructions() -> Vec<Instruction> {
    vec![
        Instruction::new(1, "0000....", Code::Nop, "nop"),
        Instruction::new(1, "0001....", Code::Ccc, "ccc f"),
        Instruction::new(1, "0010....", Code::Scc, "scc f"),
        Instruction::new(2, "00110000", Code::Branch(Condition::Always), "br o"),
        Instruction::new(2, "00110001", Code::Branch(Condition::NotEqual), "bne o"),
        Instruction::new(2, "00110010", Code::Branch(Condition::Equal), "beq o"),
        Instruction::new(2, "00110011", Code::Branch(Condition::Plus), "bpl o"),
        Instruction::new(2, "00110100", Code::Branch(Condition::Minus), "bmi o"),
        Instruction::new(2, "00110101", Code::Branch(Condition::OverflowClear), "bvc o"),
        Instruction::new(2, "00110110", Code::Branch(Condition::OverflowSet), "bvs o"),
        Instruction::new(2, "00110111", Code::Branch(Condition::CarryClear), "bcc o"),
        Instruction::new(2, "00111000", Code::Branch(Condition::CarrySet), "bcs o"),
        Instruction::new(2, "00111001", Code::Branch(Condition::GreaterOrEqual), "bge o"),
        Instruction::new(2, "00111010", Code::Branch(Condition::Less), "blt o"),
        Instruction::new(2, "00111011", Code::Branch(Condition::Greater), "bgt o"),
        Instruction::new(2, "00111100", Code::Branch(Condition::LessOrEqual), "ble o"),
        Instruction::new(2, "00111101", Code::Branch(Condition::Higher), "bhi o"),
        Instruction::new(2, "00111110", Code::Branch(Condition::LowerOrSame), "bls o"),
        Instruction::new(0, "0100....", Code::Jmp, "jmp a"),
        Instruction::new(2, "0101....", Code::Sob, "sob r o"),
        Instruction::new(0, "0110....", Code::Jsr, "jsr r a"),
        Instruction::new(1, "0111....", Code::Rts, "rts r"),
        Instruction::new(0, "10000000", Code::Clr, "clr a"),
        Instruction::new(0, "10000001", Code::Not, "not a"),
        Instruction::new(0, "10000010", Code::Inc, "inc a"),
        Instruction::new(0, "10000011", Code::Dec, "dec a"),
        Instruction::new(0, "10000100", Code::Neg, "neg a"),
        Instruction::new(0, "10000101", Code::Tst, "tst a"),
        Instruction::new(0, "10000110", Code::Ror, "ror a"),
        Instruction::new(0, "10000111", Code::Rol, "rol a"),
        Instruction::new(0, "10001000", Code::Asr, "asr a"),
        Instruction::new(0, "10001001", Code::Asl, "asl a"),
        Instruction::new(0, "10001010", Code::Adc, "adc a"),
        Instruction::new(0, "10001011", Code::Sbc, "sbc a"),
        Instruction::new(0, "1001....", Code::Mov, "mov a0 a1"),
        Instruction::new(0, "1010....", Code::Add, "add a0 a1"),
        Instruction::new(0, "1011....", Code::Sub, "sub a0 a1"),
        Instruction::new(0, "1100....", Code::Cmp, "cmp a0 a1"),
        Instruction::new(0, "1101....", Code::And, "and a0 a1"),
        Instruction::new(0, "1110....", Code::Or, "or a0 a1"),
        Instruction::new(1, "1111....", Code::Hlt, "hlt"),
    ]
}

/// Every supported machine.
pub fn all() -> Vec<&'static MachineConfig> {
    vec![&*NEANDER, &*AHMES, &*RAMSES, &*PERICLES, &*REG, &*VOLTA, &*CESAR]
}

/// Finds a machine by name or identifier, case-insensitively.
pub fn by_name(name: &str) -> Option<&'static MachineConfig> {
    all().into_iter().find(|config| {
        config.name.eq_ignore_ascii_case(name) || config.identifier.eq_ignore_ascii_case(name)
    })
}

/// Finds a machine by the identifier stored in memory dumps.
pub fn by_identifier(identifier: &str) -> Option<&'static MachineConfig> {
    all().into_iter().find(|config| config.identifier == identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_configs_are_valid() {
        for config in all() {
            config.validate();
        }
    }

    #[test]
    fn test_by_name() {
        assert_eq!(by_name("neander").map(|c| c.identifier), Some("NDR"));
        assert_eq!(by_name("c16").map(|c| c.name), Some("Cesar"));
        assert!(by_name("pdp11").is_none());
    }

    #[test]
    fn test_by_identifier() {
        assert_eq!(by_identifier("RMS").map(|c| c.name), Some("Ramses"));
        assert!(by_identifier("rms").is_none());
        assert!(by_identifier("Ramses").is_none());
    }

    #[test]
    fn test_patterns_do_not_overlap() {
        for config in all() {
            for byte in 0..=255u8 {
                let matching = config.instructions.iter().filter(|ins| ins.matches(byte)).count();
                assert!(matching <= 1, "{}: {:08b} matches {} instructions", config.name, byte, matching);
            }
        }
    }

    #[test]
    fn test_mnemonics_are_unique() {
        for config in all() {
            let mut mnemonics: Vec<_> = config.instructions.iter().map(|i| i.mnemonic()).collect();
            let count = mnemonics.len();
            mnemonics.sort();
            mnemonics.dedup();
            assert_eq!(mnemonics.len(), count, "{}", config.name);
        }
    }
}
