use clap::{App, Arg, ArgMatches};
use slog::{o, Discard, Drain, Logger};
use slog_term::{FullFormat, TermDecorator};

use edusim::{memory_dump, Assembler, AssemblerError, ImportError, Machine};

enum Error {
    UnknownMachine(String),
    InvalidSteps(String),
    Build(Vec<AssemblerError>),
    Import(ImportError),
    IO(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::IO(e)
    }
}

impl From<ImportError> for Error {
    fn from(e: ImportError) -> Error {
        Error::Import(e)
    }
}

fn parse_arguments() -> ArgMatches<'static> {
    App::new("edusimrun")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Mitja Karhusaari <mitja@karhusaari.me>")
        .about("Utility for building and executing programs of the teaching machines")
        .arg(Arg::with_name("source")
             .help("File containing assembly source or a memory dump")
             .value_name("SOURCE")
             .required(true)
             .index(1))
        .arg(Arg::with_name("machine")
             .help("Name or identifier of the machine. Memory dumps default to the machine that made them")
             .long("machine")
             .short("m")
             .value_name("MACHINE")
             .default_value("neander"))
        .arg(Arg::with_name("steps")
             .help("Maximum number of instructions to execute")
             .long("steps")
             .short("s")
             .value_name("STEPS")
             .default_value("10000"))
        .arg(Arg::with_name("output")
             .help("Writes the memory dump of the built program into a file")
             .long("output")
             .short("o")
             .value_name("FILE"))
        .arg(Arg::with_name("verbose")
             .help("Enables verbose logging")
             .long("verbose")
             .short("v"))
        .get_matches()
}

fn main() {
    let args = parse_arguments();

    let logger = if args.is_present("verbose") {
        let decorator = TermDecorator::new().build();
        let drain = FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        Logger::root(drain, o!())
    } else {
        Logger::root(Discard, o!())
    };

    match run(&args, logger) {
        Ok(()) => (),
        Err(Error::IO(io)) => eprintln!("IO error: {}", io),
        Err(Error::UnknownMachine(name)) => eprintln!("Unknown machine: {}", name),
        Err(Error::InvalidSteps(steps)) => eprintln!("Invalid number of steps: {}", steps),
        Err(Error::Import(e)) => eprintln!("Could not load memory dump: {}", e),
        Err(Error::Build(errors)) => {
            for error in errors {
                eprintln!("{}", error);
            }
        }
    }
}

fn run(args: &ArgMatches, logger: Logger) -> Result<(), Error> {
    let name = args.value_of("machine").unwrap_or("neander");

    let config = edusim::machines::by_name(name)
        .ok_or_else(|| Error::UnknownMachine(name.to_string()))?;

    let steps = args.value_of("steps").unwrap_or("10000");
    let steps: u64 = steps
        .parse()
        .map_err(|_| Error::InvalidSteps(steps.to_string()))?;

    let path = args.value_of("source").unwrap_or_default();

    let mut machine = if path.ends_with(&format!(".{}", config.file_extension)) {
        let dump = std::fs::read(path)?;

        // Dumps carry the identifier of their machine.
        let config = if args.occurrences_of("machine") == 0 {
            memory_dump::identifier(&dump)
                .and_then(edusim::machines::by_identifier)
                .unwrap_or(config)
        } else {
            config
        };

        let mut machine = Machine::with_logger(config, logger.clone());
        memory_dump::import(&mut machine, &dump)?;
        machine
    } else {
        let mut machine = Machine::with_logger(config, logger.clone());
        let source = std::fs::read_to_string(path)?;
        let errors = Assembler::with_logger(logger).assemble(&mut machine, &source);

        if !errors.is_empty() {
            return Err(Error::Build(errors));
        }

        machine
    };

    if let Some(output) = args.value_of("output") {
        std::fs::write(output, memory_dump::export(&machine))?;
    }

    machine.run(Some(steps));

    let registers: Vec<String> = machine
        .registers()
        .iter()
        .map(|register| format!("{} = {}", register.name(), register.display_value(true)))
        .collect();

    let flags: Vec<String> = machine
        .flags()
        .iter()
        .map(|flag| format!("{} = {}", flag.name(), flag.value() as u8))
        .collect();

    println!("{}", registers.join("  "));

    if !flags.is_empty() {
        println!("{}", flags.join("  "));
    }

    println!(
        "instructions: {}  accesses: {}",
        machine.get_instruction_count(),
        machine.get_access_count()
    );

    Ok(())
}
