//! The [Machine] state container and the static [MachineConfig] describing each architecture.

use std::fmt;

use slog::{debug, o, Discard, Logger};

use crate::event::{Event, EventHub, EventListener, Subscription};
use crate::instruction::{AddressingMode, Byte, Flag, FlagCode, Instruction, Register};

/// Byte order of multi-byte values in memory.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

/// The execution model of a machine.
///
/// Every machine is a fixed configuration of catalog tables plus one of these variants,
/// which decide how instructions are fetched, sized, executed and disassembled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Variant {
    /// Accumulator and register machines with byte-wide opcodes and one addressed operand.
    /// Covers variable-length operands too (eg. a 1-byte immediate next to 2-byte addresses).
    Standard,

    /// Machines that compute on a separate stack instead of registers.
    Stack,

    /// 16-bit machines with two-byte opcodes and register based addressing modes.
    Word,
}

/// Immutable description of a machine.
#[derive(Debug)]
pub struct MachineConfig {
    /// Human readable name.
    pub name: &'static str,

    /// Identifier written into memory dumps.
    pub identifier: &'static str,

    /// Extension of memory dump files.
    pub file_extension: &'static str,

    /// Number of memory cells. Must be a power of two.
    pub memory_size: usize,

    pub flags: Vec<Flag>,

    pub registers: Vec<Register>,

    pub instructions: Vec<Instruction>,

    /// Addressing modes in the order the assembler tries them.
    pub addressing_modes: Vec<AddressingMode>,

    /// Byte order of addresses and literal words.
    pub endianness: Endianness,

    /// Name of the program counter, one of `registers`.
    pub pc_name: &'static str,

    /// Register used by instructions whose format names no register. Empty if none.
    pub accumulator: &'static str,

    /// Width of immediate operands in bytes.
    pub immediate_num_bytes: usize,

    /// Name of the stack pointer register. Empty if the machine has no stack.
    pub stack_pointer_name: &'static str,

    /// Number of cells of a separate stack array. Zero if the stack lives in memory.
    pub stack_size: usize,

    pub variant: Variant,
}

impl MachineConfig {
    /// Width of an address operand in bytes.
    pub fn address_num_bytes(&self) -> usize {
        if self.memory_size > 256 {
            2
        } else {
            1
        }
    }

    /// Finds the instruction with the given mnemonic, case-insensitively.
    pub fn instruction_by_mnemonic(&self, mnemonic: &str) -> Option<&Instruction> {
        self.instructions
            .iter()
            .find(|ins| ins.mnemonic().eq_ignore_ascii_case(mnemonic))
    }

    /// Finds the register with the given name, case-insensitively.
    pub fn register_by_name(&self, name: &str) -> Option<&Register> {
        self.registers
            .iter()
            .find(|reg| reg.name().eq_ignore_ascii_case(name))
    }

    /// Checks the invariants every configuration must hold.
    ///
    /// # Panics
    /// If the configuration is inconsistent. This is a defect in the catalog, not a
    /// recoverable condition.
    pub fn validate(&self) {
        assert!(
            self.memory_size.is_power_of_two(),
            "{}: memory size {} is not a power of two",
            self.name,
            self.memory_size
        );

        assert!(
            self.register_by_name(self.pc_name).is_some(),
            "{}: no program counter {}",
            self.name,
            self.pc_name
        );

        if !self.accumulator.is_empty() {
            assert!(
                self.register_by_name(self.accumulator).is_some(),
                "{}: no accumulator {}",
                self.name,
                self.accumulator
            );
        }

        if self.variant == Variant::Stack {
            assert!(self.stack_size.is_power_of_two(), "{}: invalid stack size", self.name);
            assert!(
                self.register_by_name(self.stack_pointer_name).is_some(),
                "{}: no stack pointer {}",
                self.name,
                self.stack_pointer_name
            );
        }

        for ins in &self.instructions {
            assert_eq!(ins.pattern.len(), 8, "{}: bad pattern for {}", self.name, ins.mnemonic());
        }
    }
}

/// The state of an emulated machine: registers, flags, memory and counters.
///
/// Every change of the visible state is published to the listeners registered with
/// [subscribe](Machine::subscribe).
pub struct Machine {
    config: &'static MachineConfig,
    registers: Vec<Register>,
    flags: Vec<Flag>,
    memory: Vec<Byte>,
    stack: Vec<Byte>,
    instruction_strings: Vec<String>,
    labels: Vec<String>,
    pc_index: usize,
    running: bool,
    instruction_count: u64,
    access_count: u64,
    events: EventHub,
    pub(crate) logger: Logger,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Machine")
            .field("name", &self.config.name)
            .field("registers", &self.registers)
            .field("flags", &self.flags)
            .field("running", &self.running)
            .field("instruction_count", &self.instruction_count)
            .field("access_count", &self.access_count)
            .finish()
    }
}

impl Machine {
    /// Creates a machine with zeroed memory and registers.
    ///
    /// # Panics
    /// If the configuration is inconsistent.
    pub fn new(config: &'static MachineConfig) -> Machine {
        Machine::with_logger(config, None)
    }

    /// Creates a machine which logs its execution into `logger`.
    pub fn with_logger<L>(config: &'static MachineConfig, logger: L) -> Machine
    where
        L: Into<Option<Logger>>,
    {
        config.validate();

        let logger = logger
            .into()
            .unwrap_or_else(|| Logger::root(Discard, o!()))
            .new(o!("machine" => config.identifier));

        let pc_index = config
            .registers
            .iter()
            .position(|reg| reg.name().eq_ignore_ascii_case(config.pc_name))
            .unwrap_or_else(|| panic!("{}: no program counter", config.name));

        let mut flags = config.flags.clone();
        flags.iter_mut().for_each(Flag::reset);

        Machine {
            config,
            registers: config.registers.clone(),
            flags,
            memory: vec![Byte::default(); config.memory_size],
            stack: vec![Byte::default(); config.stack_size],
            instruction_strings: vec![String::new(); config.memory_size],
            labels: vec![String::new(); config.memory_size],
            pc_index,
            running: false,
            instruction_count: 0,
            access_count: 0,
            events: EventHub::new(),
            logger,
        }
    }

    /// Creates the machine whose name or identifier is `name`, case-insensitively.
    pub fn by_name(name: &str) -> Option<Machine> {
        crate::machines::by_name(name).map(Machine::new)
    }

    pub fn config(&self) -> &'static MachineConfig {
        self.config
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn identifier(&self) -> &'static str {
        self.config.identifier
    }

    pub fn memory_size(&self) -> usize {
        self.config.memory_size
    }

    /// Masks an address into the memory range.
    pub fn wrap_address(&self, address: i64) -> usize {
        (address & (self.config.memory_size as i64 - 1)) as usize
    }

    pub fn set_logger(&mut self, logger: Logger) {
        self.logger = logger.new(o!("machine" => self.config.identifier));
    }

    // Memory

    /// Reads a memory cell. The address wraps around the memory size.
    pub fn get_memory_value(&self, address: usize) -> u8 {
        self.memory[address & (self.config.memory_size - 1)].value()
    }

    /// Writes a memory cell. The address wraps around and the value is masked to 8 bits.
    pub fn set_memory_value(&mut self, address: usize, value: i64) {
        let address = address & (self.config.memory_size - 1);
        self.memory[address].set_value(value);

        let value = self.memory[address].value();
        self.events.publish(Event::MemoryChange { address, value });
    }

    /// Copy of the whole memory.
    pub fn memory(&self) -> Vec<u8> {
        self.memory.iter().map(Byte::value).collect()
    }

    /// Reads a memory cell on behalf of an executing instruction.
    pub(crate) fn read_memory(&mut self, address: usize) -> u8 {
        self.increment_access_count();
        self.get_memory_value(address)
    }

    /// Writes a memory cell on behalf of an executing instruction.
    pub(crate) fn write_memory(&mut self, address: usize, value: i64) {
        self.increment_access_count();
        self.set_memory_value(address, value);
    }

    // Stack

    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    /// Reads a cell of the separate stack. Returns 0 on machines without one.
    pub fn get_stack_value(&self, index: usize) -> u8 {
        if self.stack.is_empty() {
            return 0;
        }

        self.stack[index & (self.stack.len() - 1)].value()
    }

    pub fn set_stack_value(&mut self, index: usize, value: i64) {
        if self.stack.is_empty() {
            return;
        }

        let address = index & (self.stack.len() - 1);
        self.stack[address].set_value(value);

        let value = self.stack[address].value();
        self.events.publish(Event::StackChange { address, value });
    }

    // Registers

    pub fn registers(&self) -> &[Register] {
        &self.registers
    }

    fn register_index(&self, name: &str) -> usize {
        self.registers
            .iter()
            .position(|reg| reg.name().eq_ignore_ascii_case(name))
            .unwrap_or_else(|| panic!("{}: no register named {:?}", self.config.name, name))
    }

    /// Returns the value of a register. An empty name means "no register" and reads 0.
    ///
    /// # Panics
    /// If the machine has no register with this name.
    pub fn get_register_value(&self, name: &str) -> u32 {
        if name.is_empty() {
            return 0;
        }

        self.registers[self.register_index(name)].value()
    }

    /// Sets a register, masking the value to its width. An empty name is ignored.
    ///
    /// # Panics
    /// If the machine has no register with this name.
    pub fn set_register_value(&mut self, name: &str, value: i64) {
        if name.is_empty() {
            return;
        }

        let index = self.register_index(name);
        self.set_register_value_at(index, value);
    }

    pub fn get_register(&self, name: &str) -> &Register {
        &self.registers[self.register_index(name)]
    }

    pub(crate) fn register_value_at(&self, index: usize) -> u32 {
        self.registers[index].value()
    }

    pub(crate) fn set_register_value_at(&mut self, index: usize, value: i64) {
        let register = &mut self.registers[index];
        register.set_value(value);

        let event = Event::RegisterChange {
            name: register.name(),
            value: register.value(),
        };

        self.events.publish(event);
    }

    /// Width in bits of a register.
    pub fn register_num_bits(&self, name: &str) -> u32 {
        if name.is_empty() {
            return 8;
        }

        self.registers[self.register_index(name)].num_bits()
    }

    pub fn pc(&self) -> usize {
        self.registers[self.pc_index].value() as usize
    }

    pub fn set_pc(&mut self, value: i64) {
        let index = self.pc_index;
        self.set_register_value_at(index, value);
    }

    // Flags

    pub fn flags(&self) -> &[Flag] {
        &self.flags
    }

    fn flag_index(&self, name: &str) -> usize {
        self.flags
            .iter()
            .position(|flag| flag.name().eq_ignore_ascii_case(name))
            .unwrap_or_else(|| panic!("{}: no flag named {:?}", self.config.name, name))
    }

    /// # Panics
    /// If the machine has no flag with this name.
    pub fn get_flag_value(&self, name: &str) -> bool {
        self.flags[self.flag_index(name)].value()
    }

    pub fn is_flag_true(&self, name: &str) -> bool {
        self.get_flag_value(name)
    }

    /// # Panics
    /// If the machine has no flag with this name.
    pub fn set_flag_value(&mut self, name: &str, value: bool) {
        let index = self.flag_index(name);
        self.set_flag_at(index, value);
    }

    fn set_flag_at(&mut self, index: usize, value: bool) {
        let flag = &mut self.flags[index];
        flag.set_value(value);

        let event = Event::FlagChange {
            name: flag.name(),
            value,
        };

        self.events.publish(event);
    }

    pub fn has_flag(&self, code: FlagCode) -> bool {
        self.flags.iter().any(|flag| flag.code() == code)
    }

    /// Value of the flag with the given code, `false` if the machine lacks it.
    pub fn flag(&self, code: FlagCode) -> bool {
        self.flags
            .iter()
            .find(|flag| flag.code() == code)
            .map(Flag::value)
            .unwrap_or(false)
    }

    /// Sets the flag with the given code. Machines without the flag ignore the call.
    pub fn set_flag(&mut self, code: FlagCode, value: bool) {
        if let Some(index) = self.flags.iter().position(|flag| flag.code() == code) {
            self.set_flag_at(index, value);
        }
    }

    // Running state and counters

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
        self.events.publish(Event::RunningChange { running });
    }

    pub fn get_instruction_count(&self) -> u64 {
        self.instruction_count
    }

    pub fn get_access_count(&self) -> u64 {
        self.access_count
    }

    pub(crate) fn increment_instruction_count(&mut self) {
        self.instruction_count += 1;
        let count = self.instruction_count;
        self.events.publish(Event::InstructionCountChange { count });
    }

    pub(crate) fn increment_access_count(&mut self) {
        self.access_count += 1;
        let count = self.access_count;
        self.events.publish(Event::AccessCountChange { count });
    }

    pub fn clear_counters(&mut self) {
        self.instruction_count = 0;
        self.access_count = 0;
        self.events.publish(Event::InstructionCountChange { count: 0 });
        self.events.publish(Event::AccessCountChange { count: 0 });
    }

    /// Resets registers, flags, the stack and the counters, stops the machine and
    /// regenerates the instruction strings. Memory is left untouched.
    pub fn reset(&mut self) {
        debug!(self.logger, "reset");

        for index in 0..self.registers.len() {
            self.set_register_value_at(index, 0);
        }

        for index in 0..self.flags.len() {
            self.flags[index].reset();
            let value = self.flags[index].value();
            self.set_flag_at(index, value);
        }

        for index in 0..self.stack.len() {
            self.set_stack_value(index, 0);
        }

        self.clear_counters();
        self.set_running(false);
        self.update_instruction_strings();
    }

    // Instruction strings and labels

    /// The disassembled text of the instruction starting at `address`. Empty for operand
    /// bytes and for cells that were never disassembled.
    pub fn instruction_string(&self, address: usize) -> &str {
        &self.instruction_strings[address & (self.config.memory_size - 1)]
    }

    pub(crate) fn set_instruction_string(&mut self, address: usize, text: String) {
        if self.instruction_strings[address] != text {
            self.instruction_strings[address] = text.clone();
            self.events.publish(Event::InstructionStringChange { address, text });
        }
    }

    /// The label the last successful build placed at `address`.
    pub fn label(&self, address: usize) -> &str {
        &self.labels[address & (self.config.memory_size - 1)]
    }

    pub(crate) fn set_label(&mut self, address: usize, label: String) {
        if self.labels[address] != label {
            self.labels[address] = label.clone();
            self.events.publish(Event::LabelChange { address, label });
        }
    }

    // Events

    /// Registers `listener` for the events named `event`. See [crate::event] for the names.
    pub fn subscribe<L>(&mut self, event: &str, listener: L) -> Subscription
    where
        L: EventListener + 'static,
    {
        self.events.subscribe(event, listener)
    }

    /// Removes a listener registered with [subscribe](Machine::subscribe).
    pub fn unsubscribe(&mut self, subscription: &Subscription) -> bool {
        self.events.unsubscribe(subscription)
    }

    /// Holds back events until [flush_events](Machine::flush_events) is called.
    pub fn start_event_queue(&mut self) {
        self.events.start_queue();
    }

    pub fn flush_events(&mut self) {
        self.events.flush();
    }

    // Catalog lookups

    /// Finds the instruction encoded by the opcode byte.
    pub fn find_instruction(&self, opcode: u8) -> Option<&'static Instruction> {
        let config = self.config;
        config.instructions.iter().find(|ins| ins.matches(opcode))
    }

    /// Finds the addressing mode selected by the opcode byte.
    pub fn find_addressing_mode(&self, opcode: u8) -> Option<&'static AddressingMode> {
        let config = self.config;
        config.addressing_modes.iter().find(|mode| mode.matches(opcode))
    }

    /// Name of the register selected by the opcode byte, empty if none is.
    pub fn find_register(&self, opcode: u8) -> &'static str {
        let config = self.config;

        config
            .registers
            .iter()
            .find(|reg| crate::pattern::matches(reg.pattern(), opcode))
            .map(Register::name)
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machines;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_memory_wraps_around() {
        let mut machine = Machine::new(&machines::NEANDER);
        machine.set_memory_value(256, 7);
        assert_eq!(machine.get_memory_value(0), 7);
        assert_eq!(machine.get_memory_value(256), 7);

        machine.set_memory_value(1, 0x1FF);
        assert_eq!(machine.get_memory_value(1), 0xFF);
    }

    #[test]
    fn test_register_lookup_is_case_insensitive() {
        let mut machine = Machine::new(&machines::NEANDER);
        machine.set_register_value("ac", 300);
        assert_eq!(machine.get_register_value("AC"), 300 & 0xFF);
    }

    #[test]
    fn test_empty_register_name_is_ignored() {
        let mut machine = Machine::new(&machines::RAMSES);
        machine.set_register_value("", 12);
        assert_eq!(machine.get_register_value(""), 0);
    }

    #[test]
    #[should_panic]
    fn test_unknown_register_panics() {
        let machine = Machine::new(&machines::NEANDER);
        machine.get_register_value("R9");
    }

    #[test]
    fn test_setters_publish_events() {
        let mut machine = Machine::new(&machines::NEANDER);
        let names = Rc::new(RefCell::new(Vec::new()));

        let sink = names.clone();
        machine.subscribe("*", move |event: &Event| sink.borrow_mut().push(event.name()));

        machine.set_memory_value(3, 1);
        machine.set_register_value("AC", 1);
        machine.set_flag_value("N", true);
        machine.set_running(true);

        assert_eq!(*names.borrow(), vec!["MEM.3", "REG.AC", "FLAG.N", "RUNNING"]);
    }

    #[test]
    fn test_clear_counters() {
        let mut machine = Machine::new(&machines::NEANDER);
        machine.read_memory(0);
        machine.increment_instruction_count();
        assert_eq!(machine.get_access_count(), 1);

        machine.clear_counters();
        assert_eq!(machine.get_access_count(), 0);
        assert_eq!(machine.get_instruction_count(), 0);
    }

    #[test]
    fn test_find_register_unused_pattern() {
        let machine = Machine::new(&machines::RAMSES);
        assert_eq!(machine.find_register(0b0010_0100), "B");
        assert_eq!(machine.find_register(0b0010_1100), "");
    }
}
