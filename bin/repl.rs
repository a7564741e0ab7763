use std::io::Write;

use clap::{App, Arg, ArgMatches};
use slog::{o, Discard, Drain, Logger};
use slog_term::{FullFormat, TermDecorator};

use edusim::{memory_dump, Assembler, AssemblerError, ImportError, Machine};

#[derive(Debug)]
enum CommandError {
    InvalidFormat,
    InvalidNumber(String),
    UnknownCommand(String),
}

impl ::std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CommandError::InvalidFormat => write!(f, "invalid format"),
            CommandError::InvalidNumber(n) => write!(f, "invalid number: {}", n),
            CommandError::UnknownCommand(c) => write!(f, "unknown command: .{}", c),
        }
    }
}

#[derive(Debug)]
enum Error {
    CommandError(CommandError),
    UnknownMachine(String),
    Build(Vec<AssemblerError>),
    Import(ImportError),
    IO(std::io::Error),
}

impl ::std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CommandError(ce) => write!(f, "command error: {}", ce),
            Error::UnknownMachine(name) => write!(f, "unknown machine: {}", name),
            Error::Build(errors) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                write!(f, "build failed\n  {}", messages.join("\n  "))
            }
            Error::Import(e) => write!(f, "could not load memory dump: {}", e),
            Error::IO(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl From<CommandError> for Error {
    fn from(ce: CommandError) -> Error {
        Error::CommandError(ce)
    }
}

impl From<ImportError> for Error {
    fn from(e: ImportError) -> Error {
        Error::Import(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::IO(e)
    }
}

/// Parses a decimal or `h` prefixed hexadecimal number, as written in assembly source.
fn parse_number(text: &str) -> Result<usize, CommandError> {
    let result = match text.strip_prefix(|c: char| c == 'h' || c == 'H') {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => text.parse(),
    };

    result.map_err(|_| CommandError::InvalidNumber(text.to_string()))
}

struct REPL {
    machine: Machine,
    assembler: Assembler,
    source: Vec<String>,
    logger: Logger,
}

impl REPL {
    fn new(name: &str, logger: Logger) -> Result<REPL, Error> {
        let config = edusim::machines::by_name(name)
            .ok_or_else(|| Error::UnknownMachine(name.to_string()))?;

        Ok(REPL {
            machine: Machine::with_logger(config, logger.clone()),
            assembler: Assembler::with_logger(logger.clone()),
            source: Vec::new(),
            logger,
        })
    }

    fn build(&mut self) -> Result<(), Error> {
        let source = self.source.join("\n");
        let errors = self.assembler.assemble(&mut self.machine, &source);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Build(errors))
        }
    }

    fn print_registers(&self) {
        for register in self.machine.registers() {
            println!("Register {} = {}", register.name(), register.display_value(true));
        }
    }

    fn print_state(&self) {
        println!(
            "PC = {}  instructions: {}  accesses: {}",
            self.machine.pc(),
            self.machine.get_instruction_count(),
            self.machine.get_access_count()
        );
    }

    fn disassemble(&self, start: usize, count: usize) {
        let mut address = start;

        for _ in 0..count {
            let (text, num_bytes) = self.machine.generate_instruction_string(address);
            let label = self.machine.label(address);

            let bytes: Vec<String> = (address..address + num_bytes)
                .map(|a| format!("{:02x}", self.machine.get_memory_value(a)))
                .collect();

            println!("{:>5}  {:<12} {:<10} {}", address, bytes.join(" "), label, text);

            address = self.machine.wrap_address((address + num_bytes) as i64);
        }
    }

    fn handle_command(&mut self, command: &str) -> Result<(), Error> {
        let cmd = command
            .split(char::is_whitespace)
            .next()
            .ok_or(CommandError::InvalidFormat)?;

        let rest = command[cmd.len()..].trim();
        let args: Vec<_> = rest.split_whitespace().collect();

        match (cmd, args.as_slice()) {
            ("help", _) => {
                println!("Available commands:");
                println!("  .machine <name>              Switch to another machine, discarding the program");
                println!("  .load <file>                 Load assembly source or a memory dump");
                println!("  .list                        Print the program source");
                println!("  .clear                       Discard the program");
                println!("  .step [n]                    Execute one or n instructions");
                println!("  .run                         Execute until the machine halts");
                println!("  .reset                       Reset registers, flags and counters");
                println!("  .regs, .registers            List all registers and their values");
                println!("  .flags                       List all flags");
                println!("  .mem <addr> [n]              Print n memory cells starting at addr");
                println!("  .dis [addr] [n]              Disassemble n instructions starting at addr");
                println!("  .labels                      List all labels of the program");
                println!("Numbers are decimal, or hexadecimal with an h prefix (eg. h1F).");
                println!("Any other line is appended to the program, which is then rebuilt.");
            }
            ("machine", [name]) => {
                *self = REPL::new(name, self.logger.clone())?;
                println!("Machine {}", self.machine.name());
            }
            ("load", [path]) => {
                let extension = format!(".{}", self.machine.config().file_extension);

                if path.ends_with(&extension) {
                    let dump = std::fs::read(path)?;
                    memory_dump::import(&mut self.machine, &dump)?;
                    self.source.clear();
                } else {
                    let source = std::fs::read_to_string(path)?;
                    self.source = source.lines().map(String::from).collect();
                    self.build()?;
                }
            }
            ("list", _) => {
                for (number, line) in self.source.iter().enumerate() {
                    let address = self
                        .assembler
                        .address_of_line(number)
                        .map(|address| address.to_string())
                        .unwrap_or_default();

                    println!("{:>4} {:>5}  {}", number + 1, address, line);
                }
            }
            ("clear", _) => {
                self.source.clear();
                self.build()?;
            }
            ("step", []) => {
                self.machine.step();
                self.print_state();
            }
            ("step", [count]) => {
                for _ in 0..parse_number(count)? {
                    self.machine.step();
                }

                self.print_state();
            }
            ("run", _) => {
                self.machine.run(None);
                self.print_state();
            }
            ("reset", _) => self.machine.reset(),
            ("regs", _) | ("registers", _) => self.print_registers(),
            ("flags", _) => {
                for flag in self.machine.flags() {
                    println!("Flag {} = {}", flag.name(), flag.value() as u8);
                }
            }
            ("mem", [address]) | ("mem", [address, _]) => {
                let start = parse_number(address)?;
                let count = match args.get(1) {
                    Some(count) => parse_number(count)?,
                    None => 1,
                };

                for address in start..start + count {
                    let address = self.machine.wrap_address(address as i64);
                    println!("Memory {} = {}", address, self.machine.get_memory_value(address));
                }
            }
            ("dis", _) => {
                let start = match args.get(0) {
                    Some(address) => parse_number(address)?,
                    None => self.machine.pc(),
                };

                let count = match args.get(1) {
                    Some(count) => parse_number(count)?,
                    None => 8,
                };

                self.disassemble(start, count);
            }
            ("labels", _) => {
                let mut labels: Vec<_> = self.assembler.labels().iter().collect();
                labels.sort_by_key(|(_, address)| **address);

                for (label, address) in labels {
                    println!("Label {} @ {}", label, address);
                }
            }
            _ => return Err(CommandError::UnknownCommand(cmd.to_string()).into()),
        }

        Ok(())
    }

    fn handle_line(&mut self, input: &str) -> Result<(), Error> {
        let input = input.trim_end();

        if input.is_empty() {
            return Ok(());
        }

        if input.starts_with('.') {
            return self.handle_command(&input[1..]);
        }

        self.source.push(input.to_string());

        if let Err(err) = self.build() {
            self.source.pop();
            return Err(err);
        }

        Ok(())
    }

    fn run(&mut self) {
        println!("Type .help for a list of all available commands or start typing instructions");

        loop {
            print!("{} h{:04X}> ", self.machine.identifier(), self.machine.pc());
            let _ = ::std::io::stdout().flush();

            let mut input = String::new();

            match ::std::io::stdin().read_line(&mut input) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }

            if let Err(err) = self.handle_line(&input) {
                eprintln!("Error: {}", err);
            }
        }
    }
}

fn parse_args() -> ArgMatches<'static> {
    App::new("edusimrepl")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Mitja Karhusaari <mitja@karhusaari>")
        .about("Read-Evaluate-Print-Loop utility for the teaching machines")
        .arg(
            Arg::with_name("machine")
                .help("Name or identifier of the machine")
                .long("machine")
                .short("m")
                .value_name("MACHINE")
                .default_value("neander"),
        )
        .arg(
            Arg::with_name("verbose")
                .help("Enables verbose logging")
                .long("verbose")
                .short("v"),
        )
        .get_matches()
}

fn main() {
    let args = parse_args();

    let logger = if args.is_present("verbose") {
        let decorator = TermDecorator::new().build();
        let drain = FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        Logger::root(drain, o!())
    } else {
        Logger::root(Discard, o!())
    };

    let machine = args.value_of("machine").unwrap_or("neander");

    match REPL::new(machine, logger) {
        Ok(mut repl) => repl.run(),
        Err(err) => eprintln!("Error: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42").ok(), Some(42));
        assert_eq!(parse_number("h1F").ok(), Some(0x1F));
        assert_eq!(parse_number("HFF").ok(), Some(0xFF));
        assert!(parse_number("0x10").is_err());
        assert!(parse_number("h").is_err());
    }
}
