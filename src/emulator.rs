//! Decode-execute engine.
//!
//! [Machine::step] fetches the instruction at the program counter, decodes its register,
//! addressing mode and operands and executes it. How exactly depends on the
//! [variant](crate::machine::Variant) of the machine:
//!
//! - Standard machines fetch one opcode byte followed by the bytes of at most one addressed
//!   operand. The operand bytes are skipped before the instruction executes, so the program
//!   counter already points at the next instruction.
//! - Stack machines decode like standard ones but compute on their separate stack.
//! - Word machines fetch one or two opcode bytes and resolve register based operands. Reading
//!   an operand may move registers, the program counter included.
//!
//! Undefined opcodes execute as a no-op. Every memory byte read or written by an instruction,
//! the opcode fetch included, increments the access counter.

use slog::trace;

use crate::instruction::{
    AddressingMode,
    AddressingModeCode,
    Condition,
    FlagCode,
    Instruction,
    InstructionCode,
};
use crate::machine::{Endianness, Machine, Variant};

/// Name of the register used by [AddressingModeCode::IndexedByX].
const INDEX_REGISTER: &str = "X";

fn mask(num_bits: u32) -> u32 {
    ((1u64 << num_bits) - 1) as u32
}

fn sign_bit(num_bits: u32) -> u32 {
    1 << (num_bits - 1)
}

/// Interprets the low `num_bits` bits of `value` as a two's complement number.
pub fn to_signed(value: u32, num_bits: u32) -> i64 {
    let value = value & mask(num_bits);

    if value & sign_bit(num_bits) != 0 {
        value as i64 - (1i64 << num_bits)
    } else {
        value as i64
    }
}

/// Result of an ALU operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AluResult {
    value: u32,
    /// Carry out of an addition, borrow of a subtraction.
    carry: bool,
    overflow: bool,
}

fn alu_add(a: u32, b: u32, carry_in: bool, num_bits: u32) -> AluResult {
    let full = a as u64 + b as u64 + carry_in as u64;
    let value = (full & mask(num_bits) as u64) as u32;
    let signed = to_signed(a, num_bits) + to_signed(b, num_bits) + carry_in as i64;

    AluResult {
        value,
        carry: full > mask(num_bits) as u64,
        overflow: signed != to_signed(value, num_bits),
    }
}

fn alu_sub(a: u32, b: u32, borrow_in: bool, num_bits: u32) -> AluResult {
    let full = a as i64 - b as i64 - borrow_in as i64;
    let value = (full & mask(num_bits) as i64) as u32;
    let signed = to_signed(a, num_bits) - to_signed(b, num_bits) - borrow_in as i64;

    AluResult {
        value,
        carry: full < 0,
        overflow: signed != to_signed(value, num_bits),
    }
}

impl Machine {
    /// Executes a single instruction.
    ///
    /// The running state is not consulted: callers implementing "run" keep calling this
    /// while [is_running](Machine::is_running) holds.
    pub fn step(&mut self) {
        match self.config().variant {
            Variant::Word => self.step_word(),
            Variant::Standard | Variant::Stack => self.step_bytes(),
        }

        self.increment_instruction_count();
    }

    /// Starts the machine and steps it until it halts or `max_steps` instructions were
    /// executed.
    ///
    /// # Returns
    /// The number of executed instructions.
    pub fn run(&mut self, max_steps: Option<u64>) -> u64 {
        let mut steps = 0;

        self.set_running(true);

        while self.is_running() && max_steps.map(|max| steps < max).unwrap_or(true) {
            self.step();
            steps += 1;
        }

        steps
    }

    /// Width of an operand in bytes, not counting the opcode.
    pub fn operand_num_bytes(&self, mode: Option<&AddressingMode>) -> usize {
        let config = self.config();
        let code = mode.map(|mode| mode.code).unwrap_or(AddressingModeCode::Direct);

        match config.variant {
            Variant::Word => match code {
                AddressingModeCode::Immediate
                | AddressingModeCode::Direct
                | AddressingModeCode::Indexed
                | AddressingModeCode::IndexedIndirect => 2,
                _ => 0,
            },
            Variant::Standard | Variant::Stack => match code {
                AddressingModeCode::Immediate => config.immediate_num_bytes,
                _ => config.address_num_bytes(),
            },
        }
    }

    /// Size in bytes of `instruction` when its operands use the addressing modes `modes`.
    ///
    /// Instructions of a fixed size ignore `modes`. Variable sized ones add the width of
    /// every operand to their opcode: one byte on byte machines, two on word machines.
    pub fn instruction_num_bytes(&self, instruction: &Instruction, modes: &[&AddressingMode]) -> usize {
        if instruction.num_bytes != 0 {
            return instruction.num_bytes;
        }

        match self.config().variant {
            Variant::Word => {
                2 + modes
                    .iter()
                    .map(|mode| self.operand_num_bytes(Some(*mode)))
                    .sum::<usize>()
            }
            Variant::Standard | Variant::Stack => {
                1 + self.operand_num_bytes(modes.first().copied())
            }
        }
    }

    /// Finds the addressing mode of a word machine operand. `bits` holds the mode in bits
    /// 5-3 and the register in bits 2-0.
    ///
    /// Post-increment and indirect post-increment through the program counter are reported
    /// as the immediate and direct pseudo-modes.
    pub fn word_addressing_mode(&self, bits: u8) -> Option<&'static AddressingMode> {
        let config = self.config();
        let through_pc = bits & 0b111 == 0b111;

        let is_pseudo = |mode: &AddressingMode| {
            mode.code == AddressingModeCode::Immediate || mode.code == AddressingModeCode::Direct
        };

        config
            .addressing_modes
            .iter()
            .find(|mode| mode.matches(bits) && is_pseudo(mode) == through_pc)
            .or_else(|| {
                config
                    .addressing_modes
                    .iter()
                    .find(|mode| mode.matches(bits) && !is_pseudo(mode))
            })
    }

    /// Reads an address operand stored at `address`.
    pub(crate) fn read_address(&mut self, address: usize) -> usize {
        let num_bytes = self.config().address_num_bytes();
        let endianness = self.config().endianness;
        let mut value = 0i64;

        for i in 0..num_bytes {
            let byte = self.read_memory(address + i) as i64;

            value = match endianness {
                Endianness::Big => (value << 8) | byte,
                Endianness::Little => value | (byte << (8 * i)),
            };
        }

        self.wrap_address(value)
    }

    /// Writes an address operand at `address`.
    pub(crate) fn write_address(&mut self, address: usize, value: usize) {
        let num_bytes = self.config().address_num_bytes();
        let endianness = self.config().endianness;

        for i in 0..num_bytes {
            let shift = match endianness {
                Endianness::Big => 8 * (num_bytes - 1 - i),
                Endianness::Little => 8 * i,
            };

            self.write_memory(address + i, (value >> shift) as i64);
        }
    }

    /// Reads a big-endian word.
    pub(crate) fn read_word(&mut self, address: usize) -> u32 {
        let high = self.read_memory(address) as u32;
        let low = self.read_memory(address + 1) as u32;

        (high << 8) | low
    }

    /// Writes a big-endian word.
    pub(crate) fn write_word(&mut self, address: usize, value: u32) {
        self.write_memory(address, (value >> 8) as i64);
        self.write_memory(address + 1, value as i64);
    }

    fn set_nz(&mut self, value: u32, num_bits: u32) {
        self.set_flag(FlagCode::Negative, value & sign_bit(num_bits) != 0);
        self.set_flag(FlagCode::Zero, value & mask(num_bits) == 0);
    }

    fn push_stack(&mut self, value: u32) {
        let sp_name = self.config().stack_pointer_name;
        let sp = self.get_register_value(sp_name) as i64 + 1;

        self.set_register_value(sp_name, sp);
        let sp = self.get_register_value(sp_name) as usize;
        self.set_stack_value(sp, value as i64);
    }

    fn pop_stack(&mut self) -> u32 {
        let sp_name = self.config().stack_pointer_name;
        let sp = self.get_register_value(sp_name);
        let value = self.get_stack_value(sp as usize) as u32;

        self.set_register_value(sp_name, sp as i64 - 1);
        value
    }

    /// Moves the program counter past the instruction it points to.
    fn skip_instruction(&mut self) {
        let pc = self.pc();
        let opcode = self.read_memory(pc);

        let num_bytes = match self.find_instruction(opcode) {
            Some(instruction) => {
                let modes: Vec<_> = self.find_addressing_mode(opcode).into_iter().collect();
                self.instruction_num_bytes(instruction, &modes)
            }
            None => 1,
        };

        self.set_pc((pc + num_bytes) as i64);
    }

    fn step_bytes(&mut self) {
        let pc = self.pc();
        let opcode = self.read_memory(pc);
        self.set_pc(pc as i64 + 1);

        let instruction = match self.find_instruction(opcode) {
            Some(instruction) => instruction,
            None => {
                trace!(self.logger, "undefined opcode"; "pc" => pc, "opcode" => opcode);
                return;
            }
        };

        let register = if instruction.parameters().contains(&"r") {
            self.find_register(opcode)
        } else {
            self.config().accumulator
        };

        let mode = self.find_addressing_mode(opcode);
        let modes: Vec<_> = mode.into_iter().collect();
        let num_bytes = self.instruction_num_bytes(instruction, &modes);

        let operand_address = self.pc();
        if num_bytes != 1 {
            self.set_pc((operand_address + num_bytes - 1) as i64);
        }

        trace!(self.logger, "execute";
            "pc" => pc,
            "instruction" => %instruction,
            "register" => register,
            "mode" => ?mode.map(|mode| mode.code)
        );

        let stack = self.config().variant == Variant::Stack;

        let mut ctx = InstructionEmulationContext {
            machine: self,
            instruction,
            register,
            mode,
            operand_address,
        };

        if stack {
            ctx.execute_stack();
        } else {
            ctx.execute_standard();
        }
    }

    fn step_word(&mut self) {
        let pc = self.pc();
        let opcode = self.read_memory(pc);
        self.set_pc(pc as i64 + 1);

        let instruction = match self.find_instruction(opcode) {
            Some(instruction) => instruction,
            None => {
                trace!(self.logger, "undefined opcode"; "pc" => pc, "opcode" => opcode);
                return;
            }
        };

        let operand = if instruction.num_bytes != 1 {
            let pc = self.pc();
            let operand = self.read_memory(pc);
            self.set_pc(pc as i64 + 1);
            operand
        } else {
            0
        };

        trace!(self.logger, "execute";
            "pc" => pc,
            "instruction" => %instruction,
            "word" => (opcode as u32) << 8 | operand as u32
        );

        let mut ctx = WordEmulationContext {
            machine: self,
            instruction,
            opcode,
            operand,
        };

        ctx.execute();
    }
}

/// Utility struct for implementing methods in the context of emulating a single instruction
/// of a byte oriented machine.
struct InstructionEmulationContext<'m> {
    /// The machine executing the instruction.
    machine: &'m mut Machine,

    instruction: &'static Instruction,

    /// Register the instruction operates on. Empty if the opcode selects none.
    register: &'static str,

    mode: Option<&'static AddressingMode>,

    /// Address of the first operand byte.
    operand_address: usize,
}

impl<'m> InstructionEmulationContext<'m> {
    fn num_bits(&self) -> u32 {
        self.machine.register_num_bits(self.register)
    }

    fn register_value(&self) -> u32 {
        self.machine.get_register_value(self.register)
    }

    fn set_register_value(&mut self, value: u32) {
        self.machine.set_register_value(self.register, value as i64);
    }

    fn mode_code(&self) -> AddressingModeCode {
        self.mode
            .map(|mode| mode.code)
            .unwrap_or(AddressingModeCode::Direct)
    }

    /// Resolves the address the operand refers to. Immediate operands refer to their own
    /// bytes.
    fn effective_address(&mut self) -> usize {
        let pointer = self.operand_address;

        match self.mode_code() {
            AddressingModeCode::Immediate => self.machine.wrap_address(pointer as i64),
            AddressingModeCode::Indirect => {
                let address = self.machine.read_address(pointer);
                self.machine.read_address(address)
            }
            AddressingModeCode::IndexedByX => {
                let base = self.machine.read_address(pointer) as i64;
                let index = self.machine.get_register_value(INDEX_REGISTER) as i64;
                self.machine.wrap_address(base + index)
            }
            AddressingModeCode::IndexedByPc => {
                let base = self.machine.read_address(pointer) as i64;
                let pc = self.machine.pc() as i64;
                self.machine.wrap_address(base + pc)
            }
            _ => self.machine.read_address(pointer),
        }
    }

    fn operand_value(&mut self) -> u32 {
        let address = self.effective_address();
        self.machine.read_memory(address) as u32
    }

    /// Jumps to the operand if `condition` holds. The operand is not read otherwise, and an
    /// immediate operand is never jumped to.
    fn jump_if(&mut self, condition: bool) {
        if !condition || self.mode_code() == AddressingModeCode::Immediate {
            return;
        }

        let address = self.effective_address();
        self.machine.set_pc(address as i64);
    }

    fn set_arithmetic_result(&mut self, result: AluResult, borrow: bool) {
        let num_bits = self.num_bits();
        self.set_register_value(result.value);
        self.machine.set_nz(result.value, num_bits);

        if borrow && self.machine.has_flag(FlagCode::Borrow) {
            self.machine.set_flag(FlagCode::Borrow, result.carry);
        } else {
            self.machine.set_flag(FlagCode::Carry, result.carry);
        }

        self.machine.set_flag(FlagCode::Overflow, result.overflow);
    }

    fn set_logic_result(&mut self, value: u32) {
        let num_bits = self.num_bits();
        self.set_register_value(value);
        self.machine.set_nz(value, num_bits);
    }

    fn set_shift_result(&mut self, value: u32, carry: bool) {
        self.set_logic_result(value);
        self.machine.set_flag(FlagCode::Carry, carry);
    }

    fn execute_standard(&mut self) {
        use InstructionCode::*;

        let num_bits = self.num_bits();
        let msb = sign_bit(num_bits);

        match self.instruction.code {
            Nop => (),
            Store => {
                let address = self.effective_address();
                let value = self.register_value();
                self.machine.write_memory(address, value as i64);
            }
            Load => {
                let value = self.operand_value();
                self.set_logic_result(value);
            }
            Add => {
                let a = self.register_value();
                let b = self.operand_value();
                self.set_arithmetic_result(alu_add(a, b, false, num_bits), false);
            }
            Sub => {
                let a = self.register_value();
                let b = self.operand_value();
                self.set_arithmetic_result(alu_sub(a, b, false, num_bits), true);
            }
            Or => {
                let value = self.register_value() | self.operand_value();
                self.set_logic_result(value);
            }
            And => {
                let value = self.register_value() & self.operand_value();
                self.set_logic_result(value);
            }
            Not => {
                let value = !self.register_value();
                self.set_logic_result(value);
            }
            Neg => {
                let value = alu_sub(0, self.register_value(), false, num_bits).value;
                self.set_logic_result(value);
            }
            Inc => {
                let value = self.register_value().wrapping_add(1);
                self.set_logic_result(value);
            }
            Dec => {
                let value = self.register_value().wrapping_sub(1);
                self.set_logic_result(value);
            }
            Shr => {
                let value = self.register_value();
                self.set_shift_result(value >> 1, value & 1 != 0);
            }
            Shl => {
                let value = self.register_value();
                self.set_shift_result(value << 1, value & msb != 0);
            }
            Ror => {
                let value = self.register_value();
                let carry_in = if self.machine.flag(FlagCode::Carry) { msb } else { 0 };
                self.set_shift_result((value >> 1) | carry_in, value & 1 != 0);
            }
            Rol => {
                let value = self.register_value();
                let carry_in = self.machine.flag(FlagCode::Carry) as u32;
                self.set_shift_result((value << 1) | carry_in, value & msb != 0);
            }
            Jmp => self.jump_if(true),
            Jn => self.jump_if(self.machine.flag(FlagCode::Negative)),
            Jp => {
                let positive = !self.machine.flag(FlagCode::Negative)
                    && !self.machine.flag(FlagCode::Zero);
                self.jump_if(positive)
            }
            Jv => self.jump_if(self.machine.flag(FlagCode::Overflow)),
            Jnv => self.jump_if(!self.machine.flag(FlagCode::Overflow)),
            Jz => self.jump_if(self.machine.flag(FlagCode::Zero)),
            Jnz => self.jump_if(!self.machine.flag(FlagCode::Zero)),
            Jc => self.jump_if(self.machine.flag(FlagCode::Carry)),
            Jnc => self.jump_if(!self.machine.flag(FlagCode::Carry)),
            Jb => self.jump_if(self.machine.flag(FlagCode::Borrow)),
            Jnb => self.jump_if(!self.machine.flag(FlagCode::Borrow)),
            Jsr => {
                if self.mode_code() == AddressingModeCode::Immediate {
                    return;
                }

                let target = self.effective_address();
                let return_address = self.machine.pc();
                self.machine.write_address(target, return_address);

                let num_bytes = self.machine.config().address_num_bytes();
                self.machine.set_pc((target + num_bytes) as i64);
            }
            If => {
                let slot = if self.register_value() == 0 {
                    self.operand_address
                } else {
                    self.operand_address + self.machine.config().address_num_bytes()
                };

                let address = self.machine.read_address(slot);
                self.machine.set_pc(address as i64);
            }
            Hlt => self.machine.set_running(false),
            _ => (),
        }
    }

    fn execute_stack(&mut self) {
        use InstructionCode::*;

        const BITS: u32 = 8;

        let code = self.instruction.code;

        match code {
            Nop => (),
            Add | Sub | And | Or => {
                let b = self.machine.pop_stack();
                let a = self.machine.pop_stack();

                let value = match code {
                    Add => alu_add(a, b, false, BITS).value,
                    Sub => alu_sub(a, b, false, BITS).value,
                    And => a & b,
                    _ => a | b,
                };

                self.machine.push_stack(value);
            }
            Clr | Not | Neg | Inc | Dec | Asr | Asl | Ror | Rol => {
                let a = self.machine.pop_stack();

                let value = match code {
                    Clr => 0,
                    Not => !a,
                    Neg => alu_sub(0, a, false, BITS).value,
                    Inc => a.wrapping_add(1),
                    Dec => a.wrapping_sub(1),
                    Asr => (a >> 1) | (a & 0x80),
                    Asl => a << 1,
                    Ror => (a >> 1) | (a << 7),
                    _ => (a << 1) | (a >> 7),
                };

                self.machine.push_stack(value & mask(BITS));
            }
            Sz | Snz | Spl | Smi | Spz | Smz => {
                let a = to_signed(self.machine.pop_stack(), BITS);

                let skip = match code {
                    Sz => a == 0,
                    Snz => a != 0,
                    Spl => a > 0,
                    Smi => a < 0,
                    Spz => a >= 0,
                    _ => a <= 0,
                };

                if skip {
                    self.machine.skip_instruction();
                }
            }
            Push => {
                let value = self.operand_value();
                self.machine.push_stack(value);
            }
            Pop => {
                let address = self.effective_address();
                let value = self.machine.pop_stack();
                self.machine.write_memory(address, value as i64);
            }
            Jmp => self.jump_if(true),
            Jsr => {
                if self.mode_code() == AddressingModeCode::Immediate {
                    return;
                }

                let target = self.effective_address();
                let return_address = self.machine.pc() as u32;
                self.machine.push_stack(return_address);
                self.machine.set_pc(target as i64);
            }
            Rts => {
                let address = self.machine.pop_stack();
                self.machine.set_pc(address as i64);
            }
            Hlt => self.machine.set_running(false),
            _ => (),
        }
    }
}

/// Where a word machine operand lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Register(usize),
    Memory(usize),
}

/// Utility struct for emulating a single instruction of a word machine.
struct WordEmulationContext<'m> {
    machine: &'m mut Machine,
    instruction: &'static Instruction,
    opcode: u8,
    /// Second opcode byte, zero for single byte instructions.
    operand: u8,
}

impl<'m> WordEmulationContext<'m> {
    const BITS: u32 = 16;

    fn register(&self, index: usize) -> u32 {
        self.machine.register_value_at(index)
    }

    fn set_register(&mut self, index: usize, value: i64) {
        self.machine.set_register_value_at(index, value);
    }

    fn address(&self, value: i64) -> usize {
        self.machine.wrap_address(value)
    }

    /// Reads the word at the program counter and moves past it.
    fn next_word(&mut self) -> u32 {
        let pc = self.machine.pc();
        let word = self.machine.read_word(pc);
        self.machine.set_pc(pc as i64 + 2);
        word
    }

    /// Resolves an operand, applying the side effects of its addressing mode.
    fn resolve(&mut self, bits: u8) -> Location {
        use AddressingModeCode::*;

        let register = (bits & 0b111) as usize;

        let code = self
            .machine
            .word_addressing_mode(bits)
            .map(|mode| mode.code)
            .unwrap_or(Register);

        match code {
            PostIncrement | Immediate => {
                let address = self.register(register);
                self.set_register(register, address as i64 + 2);
                Location::Memory(self.address(address as i64))
            }
            PreDecrement => {
                let address = self.register(register) as i64 - 2;
                self.set_register(register, address);
                Location::Memory(self.address(address))
            }
            Indexed => {
                let offset = self.next_word() as i64;
                let base = self.register(register) as i64;
                Location::Memory(self.address(base + offset))
            }
            RegisterIndirect => Location::Memory(self.address(self.register(register) as i64)),
            PostIncrementIndirect | Direct => {
                let pointer = self.register(register);
                self.set_register(register, pointer as i64 + 2);
                let pointer = self.address(pointer as i64);
                let address = self.machine.read_word(pointer);
                Location::Memory(self.address(address as i64))
            }
            PreDecrementIndirect => {
                let pointer = self.register(register) as i64 - 2;
                self.set_register(register, pointer);
                let pointer = self.address(pointer);
                let address = self.machine.read_word(pointer);
                Location::Memory(self.address(address as i64))
            }
            IndexedIndirect => {
                let offset = self.next_word() as i64;
                let pointer = self.address(self.register(register) as i64 + offset);
                let address = self.machine.read_word(pointer);
                Location::Memory(self.address(address as i64))
            }
            _ => Location::Register(register),
        }
    }

    fn load(&mut self, location: Location) -> u32 {
        match location {
            Location::Register(index) => self.register(index),
            Location::Memory(address) => self.machine.read_word(address),
        }
    }

    fn store(&mut self, location: Location, value: u32) {
        let value = value & mask(Self::BITS);

        match location {
            Location::Register(index) => self.set_register(index, value as i64),
            Location::Memory(address) => self.machine.write_word(address, value),
        }
    }

    fn push(&mut self, value: u32) {
        let sp = self.stack_pointer();
        let address = self.register(sp) as i64 - 2;
        self.set_register(sp, address);
        let address = self.address(address);
        self.machine.write_word(address, value);
    }

    fn pop(&mut self) -> u32 {
        let sp = self.stack_pointer();
        let address = self.register(sp) as i64;
        let pointer = self.address(address);
        let value = self.machine.read_word(pointer);
        self.set_register(sp, address + 2);
        value
    }

    fn stack_pointer(&self) -> usize {
        let name = self.machine.config().stack_pointer_name;

        self.machine
            .registers()
            .iter()
            .position(|register| register.name() == name)
            .unwrap_or_else(|| panic!("{}: no stack pointer", self.machine.name()))
    }

    fn set_flags(&mut self, value: u32, overflow: bool, carry: bool) {
        self.machine.set_nz(value, Self::BITS);
        self.machine.set_flag(FlagCode::Overflow, overflow);
        self.machine.set_flag(FlagCode::Carry, carry);
    }

    /// Sets N and Z from `value` and clears V, leaving C untouched.
    fn set_logic_flags(&mut self, value: u32) {
        self.machine.set_nz(value, Self::BITS);
        self.machine.set_flag(FlagCode::Overflow, false);
    }

    fn condition(&self, condition: Condition) -> bool {
        let n = self.machine.flag(FlagCode::Negative);
        let z = self.machine.flag(FlagCode::Zero);
        let v = self.machine.flag(FlagCode::Overflow);
        let c = self.machine.flag(FlagCode::Carry);

        match condition {
            Condition::Always => true,
            Condition::NotEqual => !z,
            Condition::Equal => z,
            Condition::Plus => !n,
            Condition::Minus => n,
            Condition::OverflowClear => !v,
            Condition::OverflowSet => v,
            Condition::CarryClear => !c,
            Condition::CarrySet => c,
            Condition::GreaterOrEqual => n == v,
            Condition::Less => n != v,
            Condition::Greater => !z && n == v,
            Condition::LessOrEqual => z || n != v,
            Condition::Higher => !c && !z,
            Condition::LowerOrSame => c || z,
        }
    }

    /// Flags selected by the low nibble of the opcode, in `NZVC` order.
    fn selected_flags(&self) -> Vec<FlagCode> {
        let codes = [FlagCode::Negative, FlagCode::Zero, FlagCode::Overflow, FlagCode::Carry];

        codes
            .iter()
            .enumerate()
            .filter(|(i, _)| self.opcode & (0b1000u8 >> *i) != 0)
            .map(|(_, code)| *code)
            .collect()
    }

    fn is_register_mode(&self, bits: u8) -> bool {
        self.machine
            .word_addressing_mode(bits)
            .map(|mode| mode.code == AddressingModeCode::Register)
            .unwrap_or(true)
    }

    fn execute(&mut self) {
        use InstructionCode::*;

        const BITS: u32 = 16;

        let code = self.instruction.code;
        let register = (self.opcode & 0b111) as usize;

        match code {
            Nop => (),
            Ccc | Scc => {
                for flag in self.selected_flags() {
                    self.machine.set_flag(flag, code == Scc);
                }
            }
            Branch(condition) => {
                if self.condition(condition) {
                    let offset = self.operand as i8 as i64;
                    let pc = self.machine.pc() as i64;
                    self.machine.set_pc(pc + offset);
                }
            }
            Sob => {
                let value = self.register(register) as i64 - 1;
                self.set_register(register, value);

                if self.register(register) != 0 {
                    let pc = self.machine.pc() as i64;
                    self.machine.set_pc(pc - self.operand as i64);
                }
            }
            Jmp => {
                if self.is_register_mode(self.operand) {
                    return;
                }

                if let Location::Memory(target) = self.resolve(self.operand) {
                    self.machine.set_pc(target as i64);
                }
            }
            Jsr => {
                if self.is_register_mode(self.operand) {
                    return;
                }

                if let Location::Memory(target) = self.resolve(self.operand) {
                    let saved = self.register(register);
                    self.push(saved);

                    let pc = self.machine.pc() as i64;
                    self.set_register(register, pc);
                    self.machine.set_pc(target as i64);
                }
            }
            Rts => {
                let address = self.register(register) as i64;
                self.machine.set_pc(address);

                let value = self.pop();
                self.set_register(register, value as i64);
            }
            Clr => {
                let location = self.resolve(self.operand);
                self.store(location, 0);
                self.set_flags(0, false, false);
            }
            Not | Inc | Dec | Neg | Tst | Ror | Rol | Asr | Asl | Adc | Sbc => {
                let location = self.resolve(self.operand);
                let value = self.load(location);
                let carry = self.machine.flag(FlagCode::Carry);
                let msb = sign_bit(BITS);

                let (result, overflow, carry) = match code {
                    Not => (!value & mask(BITS), false, true),
                    Inc => {
                        let r = alu_add(value, 1, false, BITS);
                        (r.value, r.overflow, r.carry)
                    }
                    Dec => {
                        let r = alu_sub(value, 1, false, BITS);
                        (r.value, r.overflow, r.carry)
                    }
                    Neg => {
                        let r = alu_sub(0, value, false, BITS);
                        (r.value, value == msb, value != 0)
                    }
                    Tst => (value, false, false),
                    Ror | Rol | Asr | Asl => {
                        let (result, carry_out) = match code {
                            Ror => ((value >> 1) | if carry { msb } else { 0 }, value & 1 != 0),
                            Rol => (((value << 1) | carry as u32) & mask(BITS), value & msb != 0),
                            Asr => ((value >> 1) | (value & msb), value & 1 != 0),
                            _ => ((value << 1) & mask(BITS), value & msb != 0),
                        };

                        let negative = result & msb != 0;
                        (result, negative != carry_out, carry_out)
                    }
                    Adc => {
                        let r = alu_add(value, 0, carry, BITS);
                        (r.value, r.overflow, r.carry)
                    }
                    _ => {
                        let r = alu_sub(value, 0, carry, BITS);
                        (r.value, r.overflow, r.carry)
                    }
                };

                if code != Tst {
                    self.store(location, result);
                }

                self.set_flags(result, overflow, carry);
            }
            Mov | Add | Sub | Cmp | And | Or => {
                let word = (self.opcode as u16) << 8 | self.operand as u16;
                let source_bits = ((word >> 6) & 0b11_1111) as u8;
                let destination_bits = (word & 0b11_1111) as u8;

                let source = self.resolve(source_bits);
                let source = self.load(source);
                let destination = self.resolve(destination_bits);

                if code == Mov {
                    self.store(destination, source);
                    self.set_logic_flags(source);
                    return;
                }

                let value = self.load(destination);

                match code {
                    Add => {
                        let r = alu_add(value, source, false, BITS);
                        self.store(destination, r.value);
                        self.set_flags(r.value, r.overflow, r.carry);
                    }
                    Sub => {
                        let r = alu_sub(value, source, false, BITS);
                        self.store(destination, r.value);
                        self.set_flags(r.value, r.overflow, r.carry);
                    }
                    Cmp => {
                        let r = alu_sub(source, value, false, BITS);
                        self.set_flags(r.value, r.overflow, r.carry);
                    }
                    And => {
                        self.store(destination, value & source);
                        self.set_logic_flags(value & source);
                    }
                    _ => {
                        self.store(destination, value | source);
                        self.set_logic_flags(value | source);
                    }
                }
            }
            Hlt => self.machine.set_running(false),
            _ => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machines;

    macro_rules! assert_register {
        ($machine:expr, $name:expr, $value:expr) => {
            assert_eq!(
                $machine.get_register_value($name),
                $value,
                "register {}",
                $name
            );
        };
    }

    fn load(machine: &mut Machine, bytes: &[u8]) {
        for (address, byte) in bytes.iter().enumerate() {
            machine.set_memory_value(address, *byte as i64);
        }
    }

    #[test]
    fn test_neander_load() {
        let mut machine = Machine::new(&machines::NEANDER);
        load(&mut machine, &[0x20, 0x02, 128]);

        machine.step();

        assert_register!(machine, "AC", 128);
        assert_register!(machine, "PC", 2);
        assert!(machine.is_flag_true("N"));
        assert!(!machine.is_flag_true("Z"));
        assert_eq!(machine.get_access_count(), 3);
        assert_eq!(machine.get_instruction_count(), 1);
    }

    #[test]
    fn test_undefined_opcode_is_nop() {
        let mut machine = Machine::new(&machines::NEANDER);
        load(&mut machine, &[0x70]);

        machine.step();

        assert_register!(machine, "PC", 1);
        assert_eq!(machine.get_instruction_count(), 1);
        assert_eq!(machine.get_access_count(), 1);
    }

    #[test]
    fn test_ahmes_add_overflow() {
        let mut machine = Machine::new(&machines::AHMES);
        load(&mut machine, &[0x20, 0x10, 0x30, 0x11]);
        machine.set_memory_value(0x10, 0x7F);
        machine.set_memory_value(0x11, 0x01);

        machine.step();
        machine.step();

        assert_register!(machine, "AC", 0x80);
        assert!(machine.is_flag_true("V"));
        assert!(!machine.is_flag_true("C"));
        assert!(machine.is_flag_true("N"));
    }

    #[test]
    fn test_ahmes_sub_sets_borrow() {
        let mut machine = Machine::new(&machines::AHMES);
        load(&mut machine, &[0x70, 0x10]);
        machine.set_memory_value(0x10, 1);

        machine.step();

        assert_register!(machine, "AC", 0xFF);
        assert!(machine.is_flag_true("B"));
        assert!(!machine.is_flag_true("C"));
    }

    #[test]
    fn test_ramses_addressing_mode_costs() {
        let mut machine = Machine::new(&machines::RAMSES);
        // LDR A #5, LDR B 10, LDR X 10,I
        load(&mut machine, &[0x22, 0x05, 0x24, 0x0A, 0x29, 0x0A]);
        machine.set_memory_value(10, 20);
        machine.set_memory_value(20, 7);

        machine.step();
        assert_register!(machine, "A", 5);
        assert_eq!(machine.get_access_count(), 2);

        machine.step();
        assert_register!(machine, "B", 20);
        assert_eq!(machine.get_access_count(), 5);

        machine.step();
        assert_register!(machine, "X", 7);
        assert_eq!(machine.get_access_count(), 9);
    }

    #[test]
    fn test_ramses_indexed() {
        let mut machine = Machine::new(&machines::RAMSES);
        // LDR A 10,X
        load(&mut machine, &[0x23, 0x0A]);
        machine.set_register_value("X", 2);
        machine.set_memory_value(12, 99);

        machine.step();

        assert_register!(machine, "A", 99);
        assert_eq!(machine.get_access_count(), 3);
    }

    #[test]
    fn test_ramses_immediate_jump_is_ignored() {
        let mut machine = Machine::new(&machines::RAMSES);
        load(&mut machine, &[0x82, 0x05]);

        machine.step();

        assert_register!(machine, "PC", 2);
    }

    #[test]
    fn test_ramses_unused_register_selector() {
        let mut machine = Machine::new(&machines::RAMSES);
        load(&mut machine, &[0x2E, 0x05]);

        machine.step();

        assert_register!(machine, "A", 0);
        assert_register!(machine, "B", 0);
        assert_register!(machine, "X", 0);
        assert_register!(machine, "", 0);
        assert_register!(machine, "PC", 2);
    }

    #[test]
    fn test_ramses_jsr() {
        let mut machine = Machine::new(&machines::RAMSES);
        load(&mut machine, &[0xC0, 0x10]);

        machine.step();

        assert_eq!(machine.get_memory_value(0x10), 2);
        assert_register!(machine, "PC", 0x11);
    }

    #[test]
    fn test_pericles_variable_size() {
        let mut machine = Machine::new(&machines::PERICLES);
        // LDR A #5, LDR B 123h
        load(&mut machine, &[0x22, 0x05, 0x24, 0x23, 0x01]);
        machine.set_memory_value(0x123, 9);

        machine.step();
        assert_register!(machine, "A", 5);
        assert_register!(machine, "PC", 2);

        machine.step();
        assert_register!(machine, "B", 9);
        assert_register!(machine, "PC", 5);
    }

    #[test]
    fn test_pericles_indirect_and_indexed_costs() {
        let mut machine = Machine::new(&machines::PERICLES);
        // LDR A 100h,I  LDR B 10h,X
        load(&mut machine, &[0x21, 0x00, 0x01, 0x27, 0x10, 0x00]);
        machine.set_memory_value(0x100, 0x34);
        machine.set_memory_value(0x101, 0x02);
        machine.set_memory_value(0x234, 42);
        machine.set_memory_value(0x15, 7);
        machine.set_register_value("X", 5);

        machine.step();
        assert_register!(machine, "A", 42);
        assert_register!(machine, "PC", 3);
        assert_eq!(machine.get_access_count(), 1 + 2 + 2 + 1);

        machine.step();
        assert_register!(machine, "B", 7);
        assert_register!(machine, "PC", 6);
        assert_eq!(machine.get_access_count(), 6 + 1 + 2 + 1);
    }

    #[test]
    fn test_reg_if() {
        let mut machine = Machine::new(&machines::REG);
        // INC R1, IF R1 10 20
        load(&mut machine, &[0x41, 0xC1, 10, 20]);

        machine.step();
        assert_register!(machine, "R1", 1);
        assert_eq!(machine.get_access_count(), 1);

        machine.step();
        assert_register!(machine, "PC", 20);
        assert_eq!(machine.get_access_count(), 1 + 2);
    }

    #[test]
    fn test_reg_if_zero() {
        let mut machine = Machine::new(&machines::REG);
        // IF R2 10 20
        load(&mut machine, &[0xC2, 10, 20]);

        machine.step();

        assert_register!(machine, "PC", 10);
        assert_eq!(machine.get_access_count(), 2);
    }

    #[test]
    fn test_volta_push_pop() {
        let mut machine = Machine::new(&machines::VOLTA);
        load(&mut machine, &[0x72, 0x10, 0x74, 0x0A]);

        machine.step();
        assert_register!(machine, "SP", 1);
        assert_eq!(machine.get_stack_value(1), 16);

        machine.step();
        assert_eq!(machine.get_memory_value(10), 16);
        assert_register!(machine, "SP", 0);
    }

    #[test]
    fn test_volta_operand_order() {
        let mut machine = Machine::new(&machines::VOLTA);
        // PSH #5, PSH #3, SUB
        load(&mut machine, &[0x72, 5, 0x72, 3, 0x02]);

        machine.run(Some(3));

        assert_register!(machine, "SP", 1);
        assert_eq!(machine.get_stack_value(1), 2);
    }

    #[test]
    fn test_volta_skip() {
        let mut machine = Machine::new(&machines::VOLTA);
        // PSH #0, SZ, JMP 20h, HLT
        load(&mut machine, &[0x72, 0x00, 0x21, 0x80, 0x20, 0xF0]);

        machine.step();
        machine.step();
        assert_register!(machine, "PC", 5);
        assert_eq!(machine.get_access_count(), 2 + 2);

        machine.set_running(true);
        machine.step();
        assert!(!machine.is_running());
    }

    #[test]
    fn test_volta_subroutine() {
        let mut machine = Machine::new(&machines::VOLTA);
        // JSR 10h ... RTS
        load(&mut machine, &[0x84, 0x10]);
        machine.set_memory_value(0x10, 0x66);

        machine.step();
        assert_register!(machine, "PC", 0x10);
        assert_eq!(machine.get_stack_value(1), 2);

        machine.step();
        assert_register!(machine, "PC", 2);
        assert_register!(machine, "SP", 0);
    }

    #[test]
    fn test_cesar_mov_immediate() {
        let mut machine = Machine::new(&machines::CESAR);
        // MOV #1234, R0
        load(&mut machine, &[0x93, 0xC0, 0x04, 0xD2]);

        machine.step();

        assert_register!(machine, "R0", 1234);
        assert_register!(machine, "R7", 4);
        assert_eq!(machine.get_access_count(), 4);
        assert!(!machine.is_flag_true("Z"));
    }

    fn cesar(program: &[u8]) -> Machine {
        let mut machine = Machine::new(&machines::CESAR);
        load(&mut machine, program);
        machine
    }

    fn set_word(machine: &mut Machine, address: usize, value: u16) {
        machine.set_memory_value(address, (value >> 8) as i64);
        machine.set_memory_value(address + 1, (value & 0xFF) as i64);
    }

    #[test]
    fn test_cesar_post_increment() {
        // MOV (R1)+, R2
        let mut machine = cesar(&[0x92, 0x42]);
        set_word(&mut machine, 100, 200);
        machine.set_register_value("R1", 100);

        machine.step();

        assert_register!(machine, "R2", 200);
        assert_register!(machine, "R1", 102);
        assert_register!(machine, "R7", 2);
        assert_eq!(machine.get_access_count(), 4);
    }

    #[test]
    fn test_cesar_pre_decrement() {
        // MOV -(R1), R6
        let mut machine = cesar(&[0x94, 0x46]);
        set_word(&mut machine, 100, 200);
        machine.set_register_value("R1", 102);

        machine.step();

        assert_register!(machine, "R6", 200);
        assert_register!(machine, "R1", 100);
        assert_eq!(machine.get_access_count(), 4);
    }

    #[test]
    fn test_cesar_register_indirect() {
        // MOV (R3), R4
        let mut machine = cesar(&[0x98, 0xC4]);
        set_word(&mut machine, 100, 0x1234);
        machine.set_register_value("R3", 100);

        machine.step();

        assert_register!(machine, "R4", 0x1234);
        assert_register!(machine, "R3", 100);
        assert_eq!(machine.get_access_count(), 4);
    }

    #[test]
    fn test_cesar_post_increment_indirect() {
        // MOV ((R1)+), R2
        let mut machine = cesar(&[0x9A, 0x42]);
        set_word(&mut machine, 100, 300);
        set_word(&mut machine, 300, 0x1234);
        machine.set_register_value("R1", 100);

        machine.step();

        assert_register!(machine, "R2", 0x1234);
        assert_register!(machine, "R1", 102);
        assert_eq!(machine.get_access_count(), 2 + 2 + 2);
    }

    #[test]
    fn test_cesar_pre_decrement_indirect() {
        // MOV (-(R3)), R4
        let mut machine = cesar(&[0x9C, 0xC4]);
        set_word(&mut machine, 100, 300);
        set_word(&mut machine, 300, 0x1234);
        machine.set_register_value("R3", 102);

        machine.step();

        assert_register!(machine, "R4", 0x1234);
        assert_register!(machine, "R3", 100);
        assert_eq!(machine.get_access_count(), 2 + 2 + 2);
    }

    #[test]
    fn test_cesar_indexed() {
        // MOV 2(R5), R0
        let mut machine = cesar(&[0x97, 0x40, 0x00, 0x02]);
        set_word(&mut machine, 100, 0x1234);
        machine.set_register_value("R5", 98);

        machine.step();

        assert_register!(machine, "R0", 0x1234);
        assert_register!(machine, "R5", 98);
        assert_register!(machine, "R7", 4);
        assert_eq!(machine.get_access_count(), 2 + 2 + 2);
    }

    #[test]
    fn test_cesar_indexed_indirect() {
        // MOV (2(R5)), R0
        let mut machine = cesar(&[0x9F, 0x40, 0x00, 0x02]);
        set_word(&mut machine, 100, 300);
        set_word(&mut machine, 300, 0x1234);
        machine.set_register_value("R5", 98);

        machine.step();

        assert_register!(machine, "R0", 0x1234);
        assert_register!(machine, "R7", 4);
        assert_eq!(machine.get_access_count(), 2 + 2 + 2 + 2);
    }

    #[test]
    fn test_cesar_store_pre_decrement() {
        // MOV R2, -(R6)
        let mut machine = cesar(&[0x90, 0x96]);
        machine.set_register_value("R2", 7);
        machine.set_register_value("R6", 200);

        machine.step();

        assert_register!(machine, "R6", 198);
        assert_eq!(machine.get_memory_value(198), 0);
        assert_eq!(machine.get_memory_value(199), 7);
        assert_eq!(machine.get_access_count(), 2 + 2);
    }

    #[test]
    fn test_cesar_branch_backwards() {
        let mut machine = Machine::new(&machines::CESAR);
        load(&mut machine, &[0x30, 0xFE]);

        machine.step();

        assert_register!(machine, "R7", 0);
    }

    #[test]
    fn test_cesar_sob() {
        let mut machine = Machine::new(&machines::CESAR);
        load(&mut machine, &[0x51, 0x02]);
        machine.set_register_value("R1", 2);

        machine.step();
        assert_register!(machine, "R1", 1);
        assert_register!(machine, "R7", 0);

        machine.step();
        assert_register!(machine, "R1", 0);
        assert_register!(machine, "R7", 2);
    }

    #[test]
    fn test_cesar_subroutine() {
        let mut machine = Machine::new(&machines::CESAR);
        // JSR R7, 10
        load(&mut machine, &[0x67, 0x2F, 0x00, 0x0A]);
        machine.set_memory_value(10, 0x77);

        machine.step();
        assert_register!(machine, "R7", 10);
        assert_register!(machine, "R6", 0xFFFE);
        assert_eq!(machine.get_memory_value(0xFFFF), 4);

        machine.step();
        assert_register!(machine, "R7", 4);
        assert_register!(machine, "R6", 0);
    }

    #[test]
    fn test_cesar_cmp_and_flags() {
        let mut machine = Machine::new(&machines::CESAR);
        // CMP R0, R1 ; SCC NZ ; CCC NZVC
        load(&mut machine, &[0xC0, 0x01, 0x2C, 0x1F]);
        machine.set_register_value("R0", 1);
        machine.set_register_value("R1", 2);

        machine.step();
        assert!(machine.is_flag_true("N"));
        assert!(machine.is_flag_true("C"));
        assert_register!(machine, "R0", 1);

        machine.step();
        assert!(machine.is_flag_true("Z"));

        machine.step();
        assert!(!machine.is_flag_true("N"));
        assert!(!machine.is_flag_true("Z"));
        assert!(!machine.is_flag_true("C"));
    }

    #[test]
    fn test_run_stops_at_halt() {
        let mut machine = Machine::new(&machines::NEANDER);
        load(&mut machine, &[0x00, 0x00, 0xF0]);

        let steps = machine.run(None);

        assert_eq!(steps, 3);
        assert!(!machine.is_running());
        assert_register!(machine, "PC", 3);
    }

    #[test]
    fn test_alu() {
        assert_eq!(alu_add(0xFF, 1, false, 8), AluResult { value: 0, carry: true, overflow: false });
        assert_eq!(alu_sub(0x80, 1, false, 8), AluResult { value: 0x7F, carry: false, overflow: true });
        assert_eq!(to_signed(0xFFFF, 16), -1);
    }
}
