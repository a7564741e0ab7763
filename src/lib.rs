//! A crate for assembling and emulating the small teaching architectures used in introductory
//! computer architecture courses: Neander, Ahmes, Ramses, Pericles, REG, Volta and Cesar.
//!
//! Currently this crate provides the functionality to:
//! - Assemble source programs into the memory of any of the machines.
//! - Execute them one instruction at a time, counting instructions and memory accesses.
//! - Observe every change of registers, flags and memory through events.
//! - Disassemble memory into instruction strings.
//! - Read and write binary memory dumps.
//!
//! # Example
//! ```
//! use edusim::{Assembler, Machine};
//!
//! fn main() {
//!     // Adds two numbers together and stores the sum.
//!     let source = r#"
//!                 LDA X
//!                 ADD Y
//!                 STA SUM
//!                 HLT
//!
//!         X:      DB 13
//!         Y:      DB 15
//!         SUM:    DB
//!     "#;
//!
//!     let mut machine = Machine::by_name("neander")
//!         .expect("no such machine");
//!
//!     let errors = Assembler::new().assemble(&mut machine, source);
//!     assert!(errors.is_empty(), "{:?}", errors);
//!
//!     machine.run(Some(100));
//!
//!     assert_eq!(machine.get_memory_value(9), 28);
//!     assert_eq!(machine.get_instruction_count(), 4);
//! }
//! ```
//!
//! # Executables
//!
//! ## `edusimrun`
//!
//! Builds an assembly file (or loads a `.mem` dump) and runs it until it halts, printing the
//! registers, flags and counters afterwards.
//!
//! ```text
//! $ edusimrun --machine neander sum.asm
//! AC = 28  PC = 7
//! N = 0  Z = 0
//! instructions: 4  accesses: 10
//! ```
//!
//! ## `edusimrepl`
//!
//! An interactive environment for building programs and stepping through them.
pub mod pattern;
pub mod instruction;
pub mod event;
pub mod machine;
pub mod machines;
pub mod emulator;
pub mod disassembler;
pub mod token;
pub mod assembler;
pub mod source_map;
pub mod memory_dump;
pub mod error;

pub use assembler::Assembler;
pub use error::{AssemblerError, ErrorKind, ImportError};
pub use event::{Event, Subscription};
pub use machine::{Machine, MachineConfig, Variant};
