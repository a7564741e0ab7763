use edusim::{Assembler, Machine};

use slog::{Logger, Drain, o};
use slog_term::{TermDecorator, FullFormat};

fn logger() -> Logger {
    let decorator = TermDecorator::new().build();
    let drain = FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

fn build(machine: &str, source: &str) -> Machine {
    let logger = logger();

    let mut machine = Machine::by_name(machine)
        .expect("no such machine");
    machine.set_logger(logger.clone());

    let errors = Assembler::with_logger(logger).assemble(&mut machine, source);
    assert!(errors.is_empty(), "could not build the program: {:?}", errors);

    machine
}

#[test]
fn test_neander_sum() {
    let mut machine = build("neander", include_str!("programs/sum.asm"));

    let steps = machine.run(Some(100));

    assert_eq!(steps, 4);
    assert!(!machine.is_running());
    assert_eq!(machine.get_memory_value(9), 28);
    assert_eq!(machine.get_register_value("AC"), 28);
    assert_eq!(machine.pc(), 7);
    assert_eq!(machine.get_instruction_count(), 4);
    assert_eq!(machine.get_access_count(), 10);
}

#[test]
fn test_same_program_on_ahmes() {
    let mut machine = build("AHM", include_str!("programs/sum.asm"));

    machine.run(Some(100));

    assert_eq!(machine.get_memory_value(9), 28);
}

#[test]
fn test_ramses_countdown() {
    let mut machine = build("ramses", include_str!("programs/countdown.asm"));

    machine.run(Some(100));

    assert_eq!(machine.get_instruction_count(), 11);
    assert_eq!(machine.get_register_value("A"), 0);
    assert!(machine.is_flag_true("Z"));
    assert_eq!(machine.get_memory_value(12), 0);
    assert_eq!(machine.label(2), "LOOP");
}

#[test]
fn test_cesar_multiply() {
    let mut machine = build("cesar", include_str!("programs/multiply.asm"));

    machine.run(Some(100));

    assert_eq!(machine.get_instruction_count(), 14);
    assert_eq!(machine.get_register_value("R1"), 0);
    assert_eq!(machine.get_register_value("R2"), 15);
    assert_eq!(machine.get_memory_value(19), 0);
    assert_eq!(machine.get_memory_value(20), 15);
}

#[test]
fn test_volta_stack() {
    let mut machine = build("volta", include_str!("programs/stack.asm"));

    machine.run(Some(2));

    assert_eq!(machine.get_memory_value(10), 16);
    assert_eq!(machine.get_register_value("SP"), 0);
    assert_eq!(machine.pc(), 4);
}

#[test]
fn test_single_step() {
    let mut machine = build("neander", "lda 2\ndb 128");

    machine.step();

    assert_eq!(machine.get_register_value("AC"), 128);
    assert_eq!(machine.pc(), 2);
    assert!(machine.is_flag_true("N"));
    assert!(!machine.is_flag_true("Z"));
    assert_eq!(machine.get_instruction_count(), 1);
    assert_eq!(machine.get_access_count(), 3);
}

#[test]
fn test_run_respects_step_limit() {
    let mut machine = build("neander", "loop: jmp loop");

    assert_eq!(machine.run(Some(25)), 25);
    assert!(machine.is_running());
    assert_eq!(machine.pc(), 0);
}

#[test]
fn test_unselected_register_reads_zero() {
    let mut machine = Machine::by_name("ramses").expect("no such machine");

    // STR with the register bits set to 11.
    machine.set_memory_value(0, 0x1C);
    machine.set_memory_value(1, 5);
    machine.set_memory_value(5, 7);
    machine.set_register_value("A", 9);

    machine.step();

    assert_eq!(machine.get_memory_value(5), 0);
    assert_eq!(machine.get_register_value("A"), 9);
    assert_eq!(machine.pc(), 2);
}

#[test]
fn test_execution_wraps_around_memory() {
    let mut machine = build("neander", "org 254\nnop\nnop\norg 0\nhlt");

    machine.set_pc(254);
    machine.run(Some(10));

    assert_eq!(machine.get_instruction_count(), 3);
    assert_eq!(machine.pc(), 1);
}
