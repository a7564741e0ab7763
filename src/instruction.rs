//! Types for representing the catalog entries of a machine: instructions, addressing modes,
//! registers and flags.

use std::fmt;

use crate::pattern;

/// Describes the predicate of a conditional branch of the Cesar machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    /// Unconditional branch. (`BR`)
    Always,
    /// Branch if the zero flag is clear. (`BNE`)
    NotEqual,
    /// Branch if the zero flag is set. (`BEQ`)
    Equal,
    /// Branch if the negative flag is clear. (`BPL`)
    Plus,
    /// Branch if the negative flag is set. (`BMI`)
    Minus,
    /// Branch if the overflow flag is clear. (`BVC`)
    OverflowClear,
    /// Branch if the overflow flag is set. (`BVS`)
    OverflowSet,
    /// Branch if the carry flag is clear. (`BCC`)
    CarryClear,
    /// Branch if the carry flag is set. (`BCS`)
    CarrySet,
    /// Signed greater or equal. (`BGE`)
    GreaterOrEqual,
    /// Signed less than. (`BLT`)
    Less,
    /// Signed greater than. (`BGT`)
    Greater,
    /// Signed less or equal. (`BLE`)
    LessOrEqual,
    /// Unsigned higher. (`BHI`)
    Higher,
    /// Unsigned lower or same. (`BLS`)
    LowerOrSame,
}

/// Symbolic tag of an instruction.
///
/// The tag names what an instruction does; the exact semantics depend on the
/// [variant](crate::machine::Variant) of the machine executing it. `Add` on an accumulator
/// machine adds a memory operand to a register while on a stack machine it adds the two
/// topmost stack cells.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InstructionCode {
    /// Does nothing besides advancing the program counter.
    Nop,
    /// Copies a register into memory.
    Store,
    /// Copies an operand into a register.
    Load,
    Add,
    Or,
    And,
    Not,
    Sub,
    Neg,
    Inc,
    Dec,
    Clr,
    Shr,
    Shl,
    Ror,
    Rol,
    /// Arithmetic shift right.
    Asr,
    /// Arithmetic shift left.
    Asl,
    /// Add the carry flag.
    Adc,
    /// Subtract the carry flag.
    Sbc,
    /// Sets the flags from an operand without storing anything.
    Tst,
    Mov,
    Cmp,

    Jmp,
    /// Jump if negative.
    Jn,
    /// Jump if positive.
    Jp,
    /// Jump if overflow.
    Jv,
    /// Jump if no overflow.
    Jnv,
    /// Jump if zero.
    Jz,
    /// Jump if not zero.
    Jnz,
    /// Jump if carry.
    Jc,
    /// Jump if no carry.
    Jnc,
    /// Jump if borrow.
    Jb,
    /// Jump if no borrow.
    Jnb,
    /// Jump to subroutine.
    Jsr,
    /// Return from subroutine.
    Rts,
    /// Jump to the first address if a register is zero, to the second one otherwise.
    If,

    /// Pushes an operand onto the stack.
    Push,
    /// Pops the stack into memory.
    Pop,
    /// Skip the next instruction if zero.
    Sz,
    /// Skip the next instruction if not zero.
    Snz,
    /// Skip the next instruction if positive.
    Spl,
    /// Skip the next instruction if negative.
    Smi,
    /// Skip the next instruction if positive or zero.
    Spz,
    /// Skip the next instruction if negative or zero.
    Smz,

    /// Clears the selected condition codes.
    Ccc,
    /// Sets the selected condition codes.
    Scc,
    /// Relative branch on a condition.
    Branch(Condition),
    /// Subtract one and branch backwards if the result is not zero.
    Sob,

    /// Stops the machine.
    Hlt,
}

/// A catalog entry describing one instruction of a machine.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    /// Size of the instruction in bytes. Zero means the size depends on the addressing
    /// mode of its operands.
    pub num_bytes: usize,

    /// Pattern of the first opcode byte.
    pub pattern: &'static str,

    /// What the instruction does.
    pub code: InstructionCode,

    /// Assembly syntax: the mnemonic followed by parameter placeholders.
    /// `r` is a register, `a`, `a0` and `a1` are addressed operands, `f` are flag bits and
    /// `o` is a branch offset.
    pub assembly_format: &'static str,
}

impl Instruction {
    pub const fn new(
        num_bytes: usize,
        pattern: &'static str,
        code: InstructionCode,
        assembly_format: &'static str,
    ) -> Instruction {
        Instruction {
            num_bytes,
            pattern,
            code,
            assembly_format,
        }
    }

    /// The mnemonic of the instruction in lower case.
    pub fn mnemonic(&self) -> &'static str {
        self.assembly_format
            .split_whitespace()
            .next()
            .unwrap_or("")
    }

    /// The parameter placeholders of the assembly format.
    pub fn parameters(&self) -> Vec<&'static str> {
        self.assembly_format.split_whitespace().skip(1).collect()
    }

    /// Value of the opcode with every don't-care bit cleared.
    pub fn value(&self) -> u8 {
        pattern::pattern_to_value(self.pattern)
    }

    /// Checks whether the opcode byte `byte` encodes this instruction.
    pub fn matches(&self, byte: u8) -> bool {
        pattern::matches(self.pattern, byte)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.mnemonic().to_uppercase())
    }
}

/// Symbolic tag of an addressing mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddressingModeCode {
    /// The operand holds the address of the value.
    Direct,
    /// The operand holds the address of the address of the value.
    Indirect,
    /// The operand is the value.
    Immediate,
    /// The address is the operand plus the `X` register.
    IndexedByX,
    /// The address is the operand plus the program counter.
    IndexedByPc,

    /// The value is a register. (`r`)
    Register,
    /// The register holds the address and is incremented afterwards. (`(r)+`)
    PostIncrement,
    /// The register is decremented and then holds the address. (`-(r)`)
    PreDecrement,
    /// The address is a register plus an offset word. (`a(r)`)
    Indexed,
    /// The register holds the address. (`(r)`)
    RegisterIndirect,
    /// Like post-increment, with one extra indirection. (`((r)+)`)
    PostIncrementIndirect,
    /// Like pre-decrement, with one extra indirection. (`(-(r))`)
    PreDecrementIndirect,
    /// Like indexed, with one extra indirection. (`(a(r))`)
    IndexedIndirect,
}

/// A catalog entry describing one addressing mode.
#[derive(Clone, Debug, PartialEq)]
pub struct AddressingMode {
    /// Bits of the opcode selecting the mode.
    pub pattern: &'static str,

    pub code: AddressingModeCode,

    /// Operand syntax, `a` standing for the value and `r` for a register name.
    pub syntax: &'static str,
}

impl AddressingMode {
    pub const fn new(
        pattern: &'static str,
        code: AddressingModeCode,
        syntax: &'static str,
    ) -> AddressingMode {
        AddressingMode {
            pattern,
            code,
            syntax,
        }
    }

    pub fn value(&self) -> u8 {
        pattern::pattern_to_value(self.pattern)
    }

    pub fn matches(&self, byte: u8) -> bool {
        pattern::matches(self.pattern, byte)
    }

    /// Renders the operand syntax with `value` in place of `a` and `register` in place of
    /// `r`.
    pub fn render(&self, value: &str, register: &str) -> String {
        let mut out = String::new();

        for c in self.syntax.chars() {
            match c {
                'a' => out.push_str(value),
                'r' => out.push_str(register),
                c => out.push(c),
            }
        }

        out
    }
}

/// An 8-bit memory or stack cell. Assigned values are masked to their low eight bits.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Byte {
    value: u8,
}

impl Byte {
    pub fn new(value: i64) -> Byte {
        Byte {
            value: (value & 0xFF) as u8,
        }
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn set_value(&mut self, value: i64) {
        self.value = (value & 0xFF) as u8;
    }
}

/// A named register of configurable width.
#[derive(Clone, Debug, PartialEq)]
pub struct Register {
    name: &'static str,
    pattern: &'static str,
    num_bits: u32,
    is_data: bool,
    value: u32,
}

impl Register {
    /// Creates a register.
    ///
    /// # Parameters
    /// - `name`: Name used in assembly and for lookups.
    /// - `pattern`: Bits selecting this register in an opcode. Empty if it is not selectable.
    /// - `num_bits`: Width of the register.
    /// - `is_data`: Data registers are displayed signed when asked to.
    pub fn new(name: &'static str, pattern: &'static str, num_bits: u32, is_data: bool) -> Register {
        assert!(num_bits > 0 && num_bits <= 16, "invalid register width {}", num_bits);

        Register {
            name,
            pattern,
            num_bits,
            is_data,
            value: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn pattern(&self) -> &'static str {
        self.pattern
    }

    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    pub fn is_data(&self) -> bool {
        self.is_data
    }

    pub fn mask(&self) -> u32 {
        (1 << self.num_bits) - 1
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    /// Sets the value, masked to the width of the register.
    pub fn set_value(&mut self, value: i64) {
        self.value = (value & self.mask() as i64) as u32;
    }

    /// The value as it should be shown to a user. Data registers are interpreted as two's
    /// complement numbers when `signed` is set.
    pub fn display_value(&self, signed: bool) -> i64 {
        let sign_bit = 1 << (self.num_bits - 1);

        if signed && self.is_data && self.value & sign_bit != 0 {
            self.value as i64 - (1i64 << self.num_bits)
        } else {
            self.value as i64
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Condition codes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlagCode {
    Negative,
    Zero,
    Carry,
    Borrow,
    Overflow,
}

/// A named condition code with a reset value.
#[derive(Clone, Debug, PartialEq)]
pub struct Flag {
    code: FlagCode,
    name: &'static str,
    default_value: bool,
    value: bool,
}

impl Flag {
    pub fn new(code: FlagCode, name: &'static str, default_value: bool) -> Flag {
        Flag {
            code,
            name,
            default_value,
            value: default_value,
        }
    }

    pub fn code(&self) -> FlagCode {
        self.code
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value(&self) -> bool {
        self.value
    }

    pub fn set_value(&mut self, value: bool) {
        self.value = value;
    }

    pub fn reset(&mut self) {
        self.value = self.default_value;
    }
}
