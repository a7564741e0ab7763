//! Two-pass assembler.
//!
//! The first pass collects labels and reserves the memory every line occupies. Values that
//! refer to labels defined further down evaluate to zero in this pass; only the syntax of the
//! operands decides the size of an instruction. The second pass walks the same lines again
//! with every label known and emits the final bytes into a scratch image, which is copied into
//! the [Machine] only when the whole build succeeds.
//!
//! ```
//! use edusim::{machines, Assembler, Machine};
//!
//! let mut machine = Machine::new(&machines::NEANDER);
//! let errors = Assembler::new().assemble(&mut machine, "lda Value\nhlt\nValue: db 7");
//!
//! assert!(errors.is_empty());
//! assert_eq!(machine.memory()[..4], [0x20, 3, 0xF0, 7]);
//! ```

use std::cmp::Reverse;
use std::collections::HashMap;
use std::ops::RangeInclusive;

use edit_distance::edit_distance;
use itertools::Itertools;
use slog::{debug, o, trace, Discard, Logger};

use crate::error::{AssemblerError, ErrorKind};
use crate::instruction::{AddressingMode, AddressingModeCode, Instruction, InstructionCode, Register};
use crate::machine::{Endianness, Machine, MachineConfig, Variant};
use crate::pattern;
use crate::source_map::SourceMap;
use crate::token::{self, TemplateItem, Token};

/// Directives understood on every machine, besides the instructions of its catalog.
const DIRECTIVES: [&str; 5] = ["org", "db", "dw", "dab", "daw"];

/// Flag letters of `CCC`/`SCC` and the bit each one selects.
const FLAG_BITS: [(char, u8); 4] = [('N', 0b1000), ('Z', 0b0100), ('V', 0b0010), ('C', 0b0001)];

type Result<T> = std::result::Result<T, ErrorKind>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Pass {
    /// Collects labels and reserves memory.
    Reserve,

    /// Emits bytes with every label resolved.
    Emit,
}

/// The effect of one source line.
#[derive(Debug, PartialEq)]
enum Statement {
    /// Moves the write cursor.
    Org(usize),

    /// Bytes placed at the write cursor.
    Data(Vec<u8>),
}

/// An instruction argument matched against one parameter of the assembly format.
#[derive(Debug)]
enum Argument<'t> {
    /// A register selected in the opcode. (`r`)
    Register(&'static Register),

    /// An addressed operand. (`a`, `a0`, `a1`)
    Operand {
        mode: &'static AddressingMode,
        value: Option<Token<'t>>,
        register: Option<&'static Register>,
    },

    /// A branch offset. (`o`)
    Offset(Token<'t>),

    /// Condition code letters. (`f`)
    Flags(&'t str),
}

/// Assembles source text into the memory of a [Machine].
pub struct Assembler {
    logger: Logger,
    memory: Vec<u8>,
    reserved: Vec<bool>,
    labels: HashMap<String, usize>,
    address_labels: Vec<String>,
    source_map: SourceMap,
    pc: usize,
}

impl Default for Assembler {
    fn default() -> Assembler {
        Assembler::new()
    }
}

impl Assembler {
    pub fn new() -> Assembler {
        Assembler::with_logger(None)
    }

    pub fn with_logger<L>(logger: L) -> Assembler
    where
        L: Into<Option<Logger>>,
    {
        let logger = logger
            .into()
            .unwrap_or_else(|| Logger::root(Discard, o!()))
            .new(o!("stage" => "assembly"));

        Assembler {
            logger,
            memory: Vec::new(),
            reserved: Vec::new(),
            labels: HashMap::new(),
            address_labels: Vec::new(),
            source_map: SourceMap::new(),
            pc: 0,
        }
    }

    /// Assembles `source` into the memory of `machine`.
    ///
    /// On success the memory cells whose value changed are written, the labels are published
    /// and the machine is [reset](Machine::reset). On failure the machine is left untouched.
    ///
    /// # Returns
    /// Every error found, at most one per line. Empty if the build succeeded.
    pub fn assemble(&mut self, machine: &mut Machine, source: &str) -> Vec<AssemblerError> {
        self.clear(machine.memory_size());

        let lines: Vec<&str> = source.lines().collect();
        let mut errors = Vec::new();

        debug!(self.logger, "assembling"; "machine" => machine.identifier(), "lines" => lines.len());

        for &pass in &[Pass::Reserve, Pass::Emit] {
            self.pc = 0;

            for (number, line) in lines.iter().enumerate() {
                if let Err(kind) = self.line(machine, number, line, pass) {
                    trace!(self.logger, "error"; "line" => number, "code" => kind.code());
                    errors.push(AssemblerError::new(number, kind));
                }
            }

            if !errors.is_empty() {
                debug!(self.logger, "build failed"; "pass" => ?pass, "errors" => errors.len());
                return errors;
            }
        }

        self.commit(machine);
        errors
    }

    /// Labels of the last build, keyed by their upper case name.
    pub fn labels(&self) -> &HashMap<String, usize> {
        &self.labels
    }

    /// The label defined at `address`, as written in the source.
    pub fn label_at(&self, address: usize) -> Option<&str> {
        self.address_labels
            .get(address)
            .map(String::as_str)
            .filter(|label| !label.is_empty())
    }

    pub fn source_map(&self) -> &SourceMap {
        &self.source_map
    }

    /// First address emitted by the zero based source `line`.
    pub fn address_of_line(&self, line: usize) -> Option<usize> {
        self.source_map.address_of_line(line)
    }

    /// The zero based source line which emitted `address`.
    pub fn line_of_address(&self, address: usize) -> Option<usize> {
        self.source_map.line_of_address(address)
    }

    fn clear(&mut self, memory_size: usize) {
        self.memory = vec![0; memory_size];
        self.reserved = vec![false; memory_size];
        self.labels.clear();
        self.address_labels = vec![String::new(); memory_size];
        self.source_map.clear();
        self.pc = 0;
    }

    fn commit(&mut self, machine: &mut Machine) {
        debug!(self.logger, "commit"; "bytes" => self.source_map.len(), "labels" => self.labels.len());

        machine.start_event_queue();

        for (address, &value) in self.memory.iter().enumerate() {
            if machine.get_memory_value(address) != value {
                machine.set_memory_value(address, value as i64);
            }
        }

        for (address, label) in self.address_labels.iter().enumerate() {
            machine.set_label(address, label.clone());
        }

        machine.reset();
        machine.flush_events();
    }

    fn line(&mut self, machine: &Machine, number: usize, line: &str, pass: Pass) -> Result<()> {
        let text = match find_unquoted(line, b';') {
            Some(index) => &line[..index],
            None => line,
        };

        let text = match find_unquoted(text, b':') {
            Some(index) => {
                if pass == Pass::Reserve {
                    self.define_label(text[..index].trim())?;
                }

                &text[index + 1..]
            }
            None => text,
        };

        let text = text.trim();

        if text.is_empty() {
            return Ok(());
        }

        match self.statement(machine, text, pass)? {
            Statement::Org(address) => self.pc = address,
            Statement::Data(bytes) => self.place(machine, number, &bytes, pass)?,
        }

        Ok(())
    }

    fn define_label(&mut self, label: &str) -> Result<()> {
        if !is_valid_label(label) {
            return Err(ErrorKind::InvalidLabel { label: label.to_string() });
        }

        let key = label.to_uppercase();

        if self.labels.contains_key(&key) {
            return Err(ErrorKind::DuplicateLabel { label: label.to_string() });
        }

        trace!(self.logger, "label"; "label" => label, "address" => self.pc);

        self.labels.insert(key, self.pc);

        if self.address_labels[self.pc].is_empty() {
            self.address_labels[self.pc] = label.to_string();
        }

        Ok(())
    }

    /// Reserves or writes `bytes` at the write cursor and moves the cursor past them.
    fn place(&mut self, machine: &Machine, line: usize, bytes: &[u8], pass: Pass) -> Result<()> {
        for (offset, &byte) in bytes.iter().enumerate() {
            let address = machine.wrap_address((self.pc + offset) as i64);

            match pass {
                Pass::Reserve => {
                    if self.reserved[address] {
                        return Err(ErrorKind::MemoryOverlap { address });
                    }

                    self.reserved[address] = true;
                }
                Pass::Emit => {
                    self.memory[address] = byte;
                    self.source_map.insert(address, line);
                }
            }
        }

        if pass == Pass::Emit {
            trace!(self.logger, "emit"; "line" => line, "address" => self.pc, "bytes" => ?bytes);
        }

        self.pc = machine.wrap_address((self.pc + bytes.len()) as i64);
        Ok(())
    }

    fn statement(&self, machine: &Machine, text: &str, pass: Pass) -> Result<Statement> {
        let tokens = token::lex(text).map_err(|rest| {
            if rest.starts_with('\'') {
                ErrorKind::InvalidString { value: rest.to_string() }
            } else {
                ErrorKind::InvalidArgument { argument: rest.to_string() }
            }
        })?;

        let (mnemonic, args) = match tokens.split_first() {
            Some((Token::Word(mnemonic), args)) => (*mnemonic, args),
            _ => {
                return Err(ErrorKind::InvalidInstruction {
                    mnemonic: text.to_string(),
                    suggestion: None,
                })
            }
        };

        let directive = mnemonic.to_lowercase();

        if DIRECTIVES.contains(&directive.as_str()) {
            return self.directive(machine, &directive, args, pass);
        }

        let config = machine.config();

        match config.instruction_by_mnemonic(mnemonic) {
            Some(instruction) => self
                .instruction(machine, instruction, args, pass)
                .map(Statement::Data),
            None => Err(ErrorKind::InvalidInstruction {
                mnemonic: mnemonic.to_uppercase(),
                suggestion: suggest(config, mnemonic),
            }),
        }
    }

    fn directive(&self, machine: &Machine, name: &str, args: &[Token], pass: Pass) -> Result<Statement> {
        let args: Vec<Token> = args.iter().copied().filter(|token| *token != Token::Comma).collect();

        let wrong_number = || ErrorKind::WrongNumberOfArguments {
            mnemonic: name.to_uppercase(),
        };

        let width = match name {
            "dw" | "daw" => 2,
            _ => 1,
        };

        match (name, args.as_slice()) {
            ("org", [Token::Word(text)]) => {
                // The write cursor has to be known in the first pass already.
                let invalid = || ErrorKind::InvalidAddress { value: text.to_string() };
                let (address, _) = self.resolve(text).ok_or_else(invalid)?;
                let size = machine.memory_size() as i64;

                if address < -size || address >= size {
                    return Err(invalid());
                }

                Ok(Statement::Org(machine.wrap_address(address)))
            }
            ("org", [token]) => Err(ErrorKind::InvalidArgument { argument: token.to_string() }),
            ("org", _) => Err(wrong_number()),
            ("db", []) | ("dw", []) => Ok(Statement::Data(vec![0; width])),
            ("db", [_]) | ("dw", [_]) => self.data(machine, &args, width, pass).map(Statement::Data),
            ("db", _) | ("dw", _) => Err(wrong_number()),
            (_, []) => Err(wrong_number()),
            (_, [Token::LBracket, count, Token::RBracket]) => {
                let text = count.text();
                let invalid = || ErrorKind::InvalidValue { value: text.to_string() };

                let count = match count {
                    Token::Word(_) => self.resolve(text).map(|(count, _)| count).ok_or_else(invalid)?,
                    _ => return Err(invalid()),
                };

                if count < 0 || count as usize * width > machine.memory_size() {
                    return Err(invalid());
                }

                Ok(Statement::Data(vec![0; count as usize * width]))
            }
            _ => self.data(machine, &args, width, pass).map(Statement::Data),
        }
    }

    /// Encodes the values and strings of a data directive, `width` bytes each.
    fn data(&self, machine: &Machine, args: &[Token], width: usize, pass: Pass) -> Result<Vec<u8>> {
        let endianness = machine.config().endianness;
        let mut bytes = Vec::new();

        for arg in args {
            match arg {
                Token::Str(text) => {
                    let content = token::unquote(text);

                    if content.is_empty() || !content.is_ascii() {
                        return Err(ErrorKind::InvalidString { value: text.to_string() });
                    }

                    for c in content.bytes() {
                        push_number(&mut bytes, c as i64, width, endianness);
                    }
                }
                Token::Word(_) => {
                    let value = self.number(*arg, pass, value_range(width), |value| {
                        ErrorKind::InvalidValue { value }
                    })?;

                    push_number(&mut bytes, value, width, endianness);
                }
                _ => return Err(ErrorKind::InvalidArgument { argument: arg.to_string() }),
            }
        }

        Ok(bytes)
    }

    fn instruction(
        &self,
        machine: &Machine,
        instruction: &'static Instruction,
        args: &[Token],
        pass: Pass,
    ) -> Result<Vec<u8>> {
        let arguments = parse_arguments(machine.config(), instruction, args)?;

        match machine.config().variant {
            Variant::Word => self.encode_word(machine, instruction, &arguments, pass),
            Variant::Standard | Variant::Stack => {
                self.encode_bytes(machine, instruction, &arguments, pass)
            }
        }
    }

    /// Encodes an instruction of a byte machine: one opcode byte holding the instruction,
    /// register and addressing mode bits, followed by the operands.
    fn encode_bytes(
        &self,
        machine: &Machine,
        instruction: &Instruction,
        arguments: &[Argument],
        pass: Pass,
    ) -> Result<Vec<u8>> {
        let config = machine.config();
        let mut opcode = instruction.value();
        let mut modes = Vec::new();
        let mut operands = Vec::new();

        for (parameter, argument) in instruction.parameters().into_iter().zip(arguments) {
            match argument {
                Argument::Register(register) => {
                    opcode |= pattern::pattern_to_value(register.pattern());
                }
                Argument::Operand { mode, value, .. } => {
                    if modes.is_empty() {
                        opcode |= mode.value();
                    }

                    modes.push(*mode);

                    let width = machine.operand_num_bytes(Some(*mode));
                    let value = match value {
                        Some(value) if mode.code == AddressingModeCode::Immediate => {
                            self.immediate(*value, width, pass)?
                        }
                        Some(value) => self.address(machine, *value, pass)?,
                        None => 0,
                    };

                    push_number(&mut operands, value, width, config.endianness);
                }
                Argument::Offset(_) | Argument::Flags(_) => {
                    return Err(ErrorKind::NotImplemented { feature: parameter.to_string() });
                }
            }
        }

        let mut bytes = vec![opcode];
        bytes.extend(operands);
        bytes.resize(machine.instruction_num_bytes(instruction, &modes), 0);

        Ok(bytes)
    }

    /// Encodes an instruction of a word machine: a big-endian opcode word followed by one
    /// word for each operand that needs one.
    fn encode_word(
        &self,
        machine: &Machine,
        instruction: &Instruction,
        arguments: &[Argument],
        pass: Pass,
    ) -> Result<Vec<u8>> {
        let mut word = (instruction.value() as u16) << 8;
        let mut operands = Vec::new();

        for (parameter, argument) in instruction.parameters().into_iter().zip(arguments) {
            match argument {
                Argument::Register(register) => {
                    word |= (register_number(register) as u16) << 8;
                }
                Argument::Flags(letters) => {
                    word |= (flag_bits(letters)? as u16) << 8;
                }
                Argument::Offset(token) => {
                    word |= self.offset(instruction, *token, pass)? as u16;
                }
                Argument::Operand { mode, value, register } => {
                    let shift = if parameter == "a0" { 6 } else { 0 };
                    let register = register.map(register_number).unwrap_or(0b111);

                    word |= ((mode.value() | register) as u16) << shift;

                    if machine.operand_num_bytes(Some(*mode)) != 2 {
                        continue;
                    }

                    let value = match (mode.code, value) {
                        (_, None) => 0,
                        (AddressingModeCode::Immediate, Some(value)) => {
                            self.immediate(*value, 2, pass)?
                        }
                        (AddressingModeCode::Direct, Some(value)) => {
                            self.address(machine, *value, pass)?
                        }
                        (_, Some(value)) => self.number(*value, pass, value_range(2), |value| {
                            ErrorKind::InvalidValue { value }
                        })?,
                    };

                    push_number(&mut operands, value, 2, Endianness::Big);
                }
            }
        }

        let mut bytes = vec![(word >> 8) as u8];

        if instruction.num_bytes != 1 {
            bytes.push(word as u8);
            bytes.extend(operands);
        }

        Ok(bytes)
    }

    /// The low byte of a branch or `SOB` instruction.
    ///
    /// A label is turned into the distance from the next instruction: forwards for branches,
    /// backwards for `SOB`. A number is taken as the raw offset byte.
    fn offset(&self, instruction: &Instruction, token: Token, pass: Pass) -> Result<u8> {
        let text = token.text();

        let (value, from_label) = match self.resolve(text) {
            Some(resolved) => resolved,
            None if pass == Pass::Reserve => return Ok(0),
            None => return Err(ErrorKind::InvalidAddress { value: text.to_string() }),
        };

        if !from_label {
            if !value_range(1).contains(&value) {
                return Err(ErrorKind::InvalidValue { value: text.to_string() });
            }

            return Ok(value as u8);
        }

        let next = self.pc as i64 + 2;

        let (offset, range) = match instruction.code {
            InstructionCode::Sob => (next - value, 0..=255),
            _ => (value - next, -128..=127),
        };

        if !range.contains(&offset) {
            return Err(ErrorKind::InvalidAddress { value: text.to_string() });
        }

        Ok(offset as u8)
    }

    /// Evaluates an address operand, wrapping negative addresses around the memory size.
    fn address(&self, machine: &Machine, token: Token, pass: Pass) -> Result<i64> {
        let size = machine.memory_size() as i64;
        let address = self.number(token, pass, -size..=size - 1, |value| ErrorKind::InvalidAddress { value })?;

        Ok(machine.wrap_address(address) as i64)
    }

    /// Evaluates an immediate operand of `width` bytes. Quoted characters give their ASCII
    /// code.
    fn immediate(&self, token: Token, width: usize, pass: Pass) -> Result<i64> {
        match token {
            Token::Str(text) => {
                let content = token::unquote(text);

                match content.as_bytes() {
                    [c] if c.is_ascii() => Ok(*c as i64),
                    _ => Err(ErrorKind::InvalidString { value: text.to_string() }),
                }
            }
            _ => self.number(token, pass, value_range(width), |value| ErrorKind::InvalidValue { value }),
        }
    }

    /// Evaluates a numeric token and checks it against `range`.
    ///
    /// Tokens that do not resolve evaluate to zero in the reserve pass, since they may name a
    /// label defined later on.
    fn number<F>(&self, token: Token, pass: Pass, range: RangeInclusive<i64>, invalid: F) -> Result<i64>
    where
        F: Fn(String) -> ErrorKind,
    {
        let text = token.text();

        let value = match token {
            Token::Word(_) => match self.resolve(text) {
                Some((value, _)) => value,
                None if pass == Pass::Reserve => return Ok(0),
                None => return Err(invalid(text.to_string())),
            },
            _ => return Err(ErrorKind::InvalidArgument { argument: text.to_string() }),
        };

        if range.contains(&value) {
            Ok(value)
        } else {
            Err(invalid(text.to_string()))
        }
    }

    /// Resolves `label+offset`, `label-offset`, a bare label or a literal number, in this order
    /// of preference.
    ///
    /// # Returns
    /// The value and whether it came from a label.
    fn resolve(&self, text: &str) -> Option<(i64, bool)> {
        let split = text
            .get(1..)
            .and_then(|rest| rest.rfind(|c: char| c == '+' || c == '-'))
            .map(|index| index + 1);

        if let Some(split) = split {
            let (label, offset) = text.split_at(split);

            if let Some(&address) = self.labels.get(&label.to_uppercase()) {
                return parse_literal(offset).map(|offset| (address as i64 + offset, true));
            }
        }

        if let Some(&address) = self.labels.get(&text.to_uppercase()) {
            return Some((address as i64, true));
        }

        parse_literal(text).map(|value| (value, false))
    }
}

/// Finds `needle` outside of quoted strings.
///
/// `'''` is the quote character itself and does not start a string, unless it is directly
/// followed by more string content.
fn find_unquoted(line: &str, needle: u8) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut quoted = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' if !quoted && bytes[i..].starts_with(b"'''") && token::ends_char(bytes.get(i + 3)) => {
                i += 2;
            }
            b'\'' => quoted = !quoted,
            byte if byte == needle && !quoted => return Some(i),
            _ => {}
        }

        i += 1;
    }

    None
}

fn is_valid_label(label: &str) -> bool {
    let mut chars = label.chars();

    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Parses a decimal number or a hexadecimal one prefixed with `h`, with an optional sign.
fn parse_literal(text: &str) -> Option<i64> {
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    let value = match digits.strip_prefix(|c: char| c == 'h' || c == 'H') {
        Some(hex) if !hex.is_empty() => i64::from_str_radix(hex, 16).ok()?,
        Some(_) => return None,
        None => digits.parse::<i64>().ok()?,
    };

    Some(if negative { -value } else { value })
}

/// Range of the values that fit into `width` bytes, signed or unsigned.
fn value_range(width: usize) -> RangeInclusive<i64> {
    let bits = 8 * width as u32;
    -(1 << (bits - 1))..=(1 << bits) - 1
}

/// Appends the low `width` bytes of `value`.
fn push_number(bytes: &mut Vec<u8>, value: i64, width: usize, endianness: Endianness) {
    let shifts: Vec<usize> = match endianness {
        Endianness::Big => (0..width).rev().collect(),
        Endianness::Little => (0..width).collect(),
    };

    for i in shifts {
        bytes.push((value >> (8 * i)) as u8);
    }
}

/// Registers that can be named as an argument, ie. those with a selector pattern.
fn selectable_register(config: &'static MachineConfig, name: &str) -> Option<&'static Register> {
    config
        .registers
        .iter()
        .find(|register| !register.pattern().is_empty() && register.name().eq_ignore_ascii_case(name))
}

fn register_number(register: &Register) -> u8 {
    pattern::pattern_to_value(register.pattern()) & 0b111
}

fn flag_bits(letters: &str) -> Result<u8> {
    letters.chars().try_fold(0, |bits, letter| {
        FLAG_BITS
            .iter()
            .find(|(flag, _)| flag.eq_ignore_ascii_case(&letter))
            .map(|(_, bit)| bits | bit)
            .ok_or_else(|| ErrorKind::InvalidArgument { argument: letters.to_string() })
    })
}

/// Finds the known mnemonic closest to `mnemonic`, if any is at most two edits away.
fn suggest(config: &MachineConfig, mnemonic: &str) -> Option<String> {
    let mnemonic = mnemonic.to_lowercase();

    config
        .instructions
        .iter()
        .map(Instruction::mnemonic)
        .chain(DIRECTIVES.iter().copied())
        .map(|candidate| (edit_distance(&mnemonic, candidate), candidate))
        .filter(|(distance, _)| *distance <= 2)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate.to_uppercase())
}

/// Matches the argument tokens of a statement against the parameters of `instruction`.
///
/// Parameters may be separated by commas.
fn parse_arguments<'t>(
    config: &'static MachineConfig,
    instruction: &Instruction,
    tokens: &[Token<'t>],
) -> Result<Vec<Argument<'t>>> {
    let wrong_number = || ErrorKind::WrongNumberOfArguments {
        mnemonic: instruction.mnemonic().to_uppercase(),
    };

    let invalid = |tokens: &[Token<'t>]| ErrorKind::InvalidArgument {
        argument: tokens.iter().map(Token::text).collect(),
    };

    let mut rest = tokens;
    let mut arguments = Vec::new();

    for (index, parameter) in instruction.parameters().into_iter().enumerate() {
        if index > 0 {
            if let Some((Token::Comma, tail)) = rest.split_first() {
                rest = tail;
            }
        }

        let argument = match (parameter, rest.first()) {
            ("f", Some(Token::Word(letters))) => {
                let letters = *letters;
                rest = &rest[1..];
                Argument::Flags(letters)
            }
            ("f", _) => Argument::Flags(""),
            (_, None) => return Err(wrong_number()),
            ("o", Some(&(token @ Token::Word(_)))) => {
                rest = &rest[1..];
                Argument::Offset(token)
            }
            ("r", Some(Token::Word(name))) => {
                let register = selectable_register(config, name).ok_or_else(|| invalid(rest))?;
                rest = &rest[1..];
                Argument::Register(register)
            }
            ("o", _) | ("r", _) => return Err(invalid(rest)),
            _ => {
                let (argument, consumed) = match_operand(config, rest).ok_or_else(|| invalid(rest))?;
                rest = &rest[consumed..];
                argument
            }
        };

        arguments.push(argument);
    }

    if !rest.is_empty() {
        return Err(wrong_number());
    }

    Ok(arguments)
}

/// Finds the addressing mode whose syntax matches the start of `tokens`.
///
/// Longer syntaxes are tried first so that eg. `10,X` is not taken for a plain `10`.
///
/// # Returns
/// The operand and the number of tokens it spans.
fn match_operand<'t>(config: &'static MachineConfig, tokens: &[Token<'t>]) -> Option<(Argument<'t>, usize)> {
    config
        .addressing_modes
        .iter()
        .map(|mode| (mode, token::template(mode.syntax)))
        .sorted_by_key(|(_, template)| Reverse(template.len()))
        .find_map(|(mode, template)| {
            let (value, register) = match_template(config, &template, tokens)?;
            Some((Argument::Operand { mode, value, register }, template.len()))
        })
}

fn match_template<'t>(
    config: &'static MachineConfig,
    template: &[TemplateItem],
    tokens: &[Token<'t>],
) -> Option<(Option<Token<'t>>, Option<&'static Register>)> {
    if tokens.len() < template.len() {
        return None;
    }

    let mut value = None;
    let mut register = None;

    for (item, token) in template.iter().zip(tokens) {
        match (item, token) {
            (TemplateItem::Value, Token::Word(text)) if selectable_register(config, text).is_none() => {
                value = Some(*token);
            }
            (TemplateItem::Value, Token::Str(_)) => {
                value = Some(*token);
            }
            (TemplateItem::Register, Token::Word(name)) => {
                register = Some(selectable_register(config, name)?);
            }
            (TemplateItem::Literal(text), token) if token.text().eq_ignore_ascii_case(text) => {}
            _ => return None,
        }
    }

    Some((value, register))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machines;

    fn build(config: &'static MachineConfig, source: &str) -> (Machine, Assembler, Vec<AssemblerError>) {
        let mut machine = Machine::new(config);
        let mut assembler = Assembler::new();
        let errors = assembler.assemble(&mut machine, source);
        (machine, assembler, errors)
    }

    fn assemble(config: &'static MachineConfig, source: &str) -> Vec<u8> {
        let (machine, _, errors) = build(config, source);
        assert!(errors.is_empty(), "{:?}", errors);
        machine.memory()
    }

    fn error_codes(config: &'static MachineConfig, source: &str) -> Vec<(usize, &'static str)> {
        let (_, _, errors) = build(config, source);
        errors.iter().map(|error| (error.line, error.kind.code())).collect()
    }

    #[test]
    fn test_neander_program() {
        let memory = assemble(&machines::NEANDER, "lda 2\ndb 128");
        assert_eq!(memory[..3], [0x20, 2, 128]);
    }

    #[test]
    fn test_forward_reference() {
        let (machine, assembler, errors) = build(&machines::NEANDER, "JMP Target\nTarget: HLT");

        assert!(errors.is_empty());
        assert_eq!(machine.memory()[..3], [0x80, 2, 0xF0]);
        assert_eq!(assembler.labels().get("TARGET"), Some(&2));
        assert_eq!(assembler.label_at(2), Some("Target"));
        assert_eq!(machine.label(2), "Target");
    }

    #[test]
    fn test_label_offsets() {
        let memory = assemble(&machines::NEANDER, "lda Data+1\nadd Data-1\nData: db 1\ndb 2");
        assert_eq!(memory[..4], [0x20, 5, 0x30, 3]);
    }

    #[test]
    fn test_comments_and_quotes() {
        let memory = assemble(&machines::NEANDER, "db ';' ; a semicolon\ndb ''' ; a quote\ndb ':'");
        assert_eq!(memory[..3], [b';', b'\'', b':']);
    }

    #[test]
    fn test_source_map() {
        let (_, assembler, _) = build(&machines::NEANDER, "; header\nlda 5\n\nhlt");

        assert_eq!(assembler.address_of_line(1), Some(0));
        assert_eq!(assembler.line_of_address(1), Some(1));
        assert_eq!(assembler.line_of_address(2), Some(3));
        assert_eq!(assembler.address_of_line(2), None);
    }

    #[test]
    fn test_label_errors() {
        assert_eq!(error_codes(&machines::NEANDER, "1abc: nop"), vec![(0, "INVALID_LABEL")]);
        assert_eq!(
            error_codes(&machines::NEANDER, "loop: nop\nLOOP: nop"),
            vec![(1, "DUPLICATE_LABEL")],
        );
    }

    #[test]
    fn test_errors_are_collected_per_line() {
        let codes = error_codes(&machines::NEANDER, "lda\nfoo 1\nlda 300\nlda #1");

        assert_eq!(
            codes,
            vec![
                (0, "WRONG_NUMBER_OF_ARGUMENTS"),
                (1, "INVALID_INSTRUCTION"),
                (2, "INVALID_ADDRESS"),
                (3, "INVALID_ARGUMENT"),
            ],
        );
    }

    #[test]
    fn test_unknown_label_fails_in_second_pass() {
        assert_eq!(error_codes(&machines::NEANDER, "jmp Nowhere"), vec![(0, "INVALID_ADDRESS")]);
    }

    #[test]
    fn test_suggestion() {
        let (_, _, errors) = build(&machines::NEANDER, "ldaa 1");

        assert_eq!(errors[0].to_string(), "Line 1: Invalid instruction LDAA, did you mean LDA?");
    }

    #[test]
    fn test_memory_overlap_points_at_later_line() {
        let codes = error_codes(&machines::NEANDER, "lda 10\norg 1\ndb 5");
        assert_eq!(codes, vec![(2, "MEMORY_OVERLAP")]);
    }

    #[test]
    fn test_failed_build_leaves_memory_untouched() {
        let mut machine = Machine::new(&machines::NEANDER);
        machine.set_memory_value(0, 0x60);

        let errors = Assembler::new().assemble(&mut machine, "lda 1\nbad");

        assert_eq!(errors.len(), 1);
        assert_eq!(machine.get_memory_value(0), 0x60);
    }

    #[test]
    fn test_negative_address_wraps() {
        let memory = assemble(&machines::NEANDER, "lda -1");
        assert_eq!(memory[..2], [0x20, 0xFF]);
    }

    #[test]
    fn test_data_directives() {
        let memory = assemble(&machines::NEANDER, "db\ndw h1234\ndab 1, 'ab', -1\ndaw [2]\ndb 9");
        assert_eq!(memory[..10], [0, 0x12, 0x34, 1, b'a', b'b', 0xFF, 0, 0, 0]);
        assert_eq!(memory[10..12], [0, 9]);

        assert_eq!(assemble(&machines::NEANDER, "dab ''', 1")[..2], [b'\'', 1]);
        assert_eq!(assemble(&machines::NEANDER, "dab ''', 'a'")[..2], [b'\'', b'a']);
        assert_eq!(assemble(&machines::NEANDER, "dab '''a', ''' ; quotes")[..3], [b'\'', b'a', b'\'']);

        assert_eq!(error_codes(&machines::NEANDER, "db 256"), vec![(0, "INVALID_VALUE")]);
        assert_eq!(error_codes(&machines::NEANDER, "db 1, 2"), vec![(0, "WRONG_NUMBER_OF_ARGUMENTS")]);
        assert_eq!(error_codes(&machines::NEANDER, "dab"), vec![(0, "WRONG_NUMBER_OF_ARGUMENTS")]);
        assert_eq!(error_codes(&machines::NEANDER, "db ''"), vec![(0, "INVALID_STRING")]);
        assert_eq!(error_codes(&machines::NEANDER, "db 'open"), vec![(0, "INVALID_STRING")]);
    }

    #[test]
    fn test_org() {
        let memory = assemble(&machines::NEANDER, "org 128\nStart: hlt\norg Start+2\ndb 1");
        assert_eq!(memory[128], 0xF0);
        assert_eq!(memory[130], 1);
    }

    #[test]
    fn test_ramses_addressing_modes() {
        let memory = assemble(&machines::RAMSES, "ldr x 10,i\nldr a, #5\nstr b 32,X\nldr a #'A'\nnot x");
        assert_eq!(memory[..9], [0x29, 10, 0x22, 5, 0x17, 32, 0x22, b'A', 0x68]);
    }

    #[test]
    fn test_ramses_register_must_be_selectable() {
        assert_eq!(error_codes(&machines::RAMSES, "ldr pc 1"), vec![(0, "INVALID_ARGUMENT")]);
    }

    #[test]
    fn test_pericles_variable_size() {
        let memory = assemble(&machines::PERICLES, "ldr a #5\njmp 564\ndw 258");
        assert_eq!(memory[..7], [0x22, 5, 0x80, 0x34, 0x02, 0x02, 0x01]);
    }

    #[test]
    fn test_reg_if() {
        let memory = assemble(&machines::REG, "Loop: if r3 End Loop\nEnd: hlt");
        assert_eq!(memory[..4], [0xC3, 3, 0, 0]);
    }

    #[test]
    fn test_volta() {
        let memory = assemble(&machines::VOLTA, "psh #16\npop 10\npsh 3,pc\nrts");
        assert_eq!(memory[..7], [0x72, 16, 0x74, 10, 0x73, 3, 0x66]);
    }

    #[test]
    fn test_cesar_operands() {
        let memory = assemble(&machines::CESAR, "mov #1234, r0\nadd 2(r1), (r2)+\nclr (-(r3))\nhlt");
        assert_eq!(
            memory[..11],
            [0x93, 0xC0, 0x04, 0xD2, 0xA6, 0x4A, 0x00, 0x02, 0x80, 0x33, 0xF0],
        );
    }

    #[test]
    fn test_cesar_direct_and_jsr() {
        let memory = assemble(&machines::CESAR, "jsr r5, Sub\nhlt\nSub: rts r5");
        assert_eq!(memory[..6], [0x65, 0x2F, 0x00, 0x05, 0xF0, 0x75]);
    }

    #[test]
    fn test_cesar_branches() {
        let memory = assemble(&machines::CESAR, "Loop: sob r1, Loop\nbr Loop\nbeq End\nEnd: scc nz\nccc");
        assert_eq!(memory[..9], [0x51, 0x02, 0x30, 0xFC, 0x32, 0x00, 0x2C, 0x10, 0]);
    }

    #[test]
    fn test_cesar_data_is_little_endian() {
        let memory = assemble(&machines::CESAR, "dw 258\ndaw 1, 2");
        assert_eq!(memory[..6], [0x02, 0x01, 0x01, 0x00, 0x02, 0x00]);
    }

    #[test]
    fn test_cesar_branch_out_of_range() {
        let source = "Start: nop\ndab [200]\nbr Start";
        assert_eq!(error_codes(&machines::CESAR, source), vec![(2, "INVALID_ADDRESS")]);
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_literal("42"), Some(42));
        assert_eq!(parse_literal("-42"), Some(-42));
        assert_eq!(parse_literal("h1F"), Some(31));
        assert_eq!(parse_literal("-hff"), Some(-255));
        assert_eq!(parse_literal("h"), None);
        assert_eq!(parse_literal("12ab"), None);
    }

    #[test]
    fn test_find_unquoted() {
        assert_eq!(find_unquoted("db ';' ; x", b';'), Some(7));
        assert_eq!(find_unquoted("db ''' ; x", b';'), Some(7));
        assert_eq!(find_unquoted("db 'it''s;' ; x", b';'), Some(12));
        assert_eq!(find_unquoted("nop", b';'), None);
    }
}
