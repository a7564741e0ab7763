use std::cell::RefCell;
use std::rc::Rc;

use edusim::{memory_dump, Assembler, ErrorKind, Event, Machine};

fn machine(name: &str) -> Machine {
    Machine::by_name(name).expect("no such machine")
}

#[test]
fn test_empty_source() {
    let mut machine = machine("neander");
    let mut assembler = Assembler::new();

    let errors = assembler.assemble(&mut machine, "");

    assert!(errors.is_empty());
    assert!(machine.memory().iter().all(|&value| value == 0));
    assert!(assembler.labels().is_empty());
    assert!(assembler.source_map().is_empty());
}

#[test]
fn test_building_twice_gives_the_same_result() {
    let source = include_str!("programs/countdown.asm");

    let mut machine = machine("ramses");
    let mut assembler = Assembler::new();

    assert!(assembler.assemble(&mut machine, source).is_empty());
    let memory = machine.memory();
    let labels = assembler.labels().clone();
    let source_map = assembler.source_map().clone();

    assert!(assembler.assemble(&mut machine, source).is_empty());
    assert_eq!(machine.memory(), memory);
    assert_eq!(*assembler.labels(), labels);
    assert_eq!(*assembler.source_map(), source_map);
}

#[test]
fn test_overlap_is_reported_on_the_later_line() {
    let mut machine = machine("neander");

    let errors = Assembler::new().assemble(&mut machine, "org 4\ndb 1\norg 4\ndb 2");

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].line, 3);
    assert_eq!(errors[0].kind, ErrorKind::MemoryOverlap { address: 4 });
}

#[test]
fn test_failed_build_keeps_the_previous_program() {
    let mut machine = machine("neander");
    let mut assembler = Assembler::new();

    assert!(assembler.assemble(&mut machine, include_str!("programs/sum.asm")).is_empty());
    let memory = machine.memory();

    let errors = assembler.assemble(&mut machine, "lda 1\nfrobnicate 2");

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].to_string(), "Line 2: Invalid instruction FROBNICATE");
    assert_eq!(machine.memory(), memory);
    assert_eq!(machine.label(7), "X");
}

#[test]
fn test_rebuild_clears_stale_cells() {
    let mut machine = machine("neander");
    let mut assembler = Assembler::new();

    assert!(assembler.assemble(&mut machine, "db 1\ndb 2\ndb 3").is_empty());
    assert!(assembler.assemble(&mut machine, "db 9").is_empty());

    assert_eq!(machine.memory()[..3], [9, 0, 0]);
}

#[test]
fn test_build_publishes_events_once() {
    let mut machine = machine("neander");
    let events = Rc::new(RefCell::new(Vec::new()));

    let sink = events.clone();
    machine.subscribe("MEM.9", move |event: &Event| sink.borrow_mut().push(event.clone()));

    let errors = Assembler::new().assemble(&mut machine, include_str!("programs/sum.asm"));
    assert!(errors.is_empty());
    assert!(events.borrow().is_empty());

    machine.run(Some(100));

    assert_eq!(
        *events.borrow(),
        vec![Event::MemoryChange { address: 9, value: 28 }],
    );
}

#[test]
fn test_memory_dump_round_trip() {
    let mut machine = machine("pericles");
    let errors = Assembler::new().assemble(&mut machine, "ldr a, #5\nstr a, h100\nhlt");
    assert!(errors.is_empty(), "{:?}", errors);

    let dump = memory_dump::export(&machine);
    assert_eq!(dump.len(), memory_dump::dump_size(&machine));

    let mut copy = Machine::by_name("PRC").expect("no such machine");
    memory_dump::import(&mut copy, &dump).expect("could not import the dump");

    assert_eq!(copy.memory(), machine.memory());
    assert_eq!(copy.instruction_string(0), machine.instruction_string(0));
}
