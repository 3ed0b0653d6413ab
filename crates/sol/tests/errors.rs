//! Tests for runtime error construction: message wording, source
//! prefixes, and variable descriptions.

use std::rc::Rc;

use sol::{Closure, Instr, MetaMethod, Proto, ProtoBuilder, RunError, RunResult, Value, VarSite, Vm};

fn nop() -> Instr {
    Instr::LoadNil { a: 0, b: 0 }
}

/// `local y = nil; return y + 1` compiled at lines 3..4 of `@demo.sol`.
fn arithmetic_proto(vm: &mut Vm) -> Rc<Proto> {
    let source = vm.interns_mut().intern("@demo.sol");
    let y = vm.interns_mut().intern("y");
    let mut b = ProtoBuilder::new(1);
    b.set_source(source);
    b.set_line(3);
    b.emit(Instr::LoadNil { a: 0, b: 0 });
    b.set_line(4);
    b.emit(Instr::AddI { a: 1, b: 0, sc: 1 });
    b.emit(Instr::MmBinI { a: 0, sb: 1, tag: MetaMethod::Add, flip: false });
    b.emit(Instr::Return1 { a: 1 });
    b.add_local(y, 1, 4);
    Rc::new(b.build())
}

fn push_frame_at(vm: &mut Vm, proto: &Rc<Proto>, pc: usize) -> usize {
    vm.push_value(Value::Closure(Rc::new(Closure::new(proto.clone()))));
    let ci = vm.push_script_frame(0).unwrap();
    vm.frame_mut(ci).set_savedpc(pc + 1);
    ci
}

fn runtime_message(err: &RunError) -> &str {
    err.message().expect("runtime error carries a message")
}

#[test]
fn arithmetic_on_a_named_local() {
    let mut vm = Vm::new();
    let proto = arithmetic_proto(&mut vm);
    // faulting at the metamethod follow-up, as the dispatch loop would
    let ci = push_frame_at(&mut vm, &proto, 2);
    let y_slot = vm.frame(ci).func_slot() + 1;
    let nil = vm.slot(y_slot).clone();
    let err = vm.opint_error(
        (&nil, VarSite::Slot(y_slot)),
        (&Value::Integer(1), VarSite::None),
        "perform arithmetic on",
    );
    assert_eq!(
        runtime_message(&err),
        "demo.sol:4: attempt to perform arithmetic on a nil value (local 'y')"
    );
}

#[test]
fn arithmetic_blames_the_non_number_operand() {
    let mut vm = Vm::new();
    let proto = arithmetic_proto(&mut vm);
    push_frame_at(&mut vm, &proto, 2);
    let err = vm.opint_error(
        (&Value::Integer(1), VarSite::None),
        (&Value::Boolean(true), VarSite::None),
        "perform arithmetic on",
    );
    assert_eq!(runtime_message(&err), "demo.sol:4: attempt to perform arithmetic on a boolean value");
}

#[test]
fn upvalue_sites_use_the_declared_name() {
    let mut vm = Vm::new();
    let source = vm.interns_mut().intern("@demo.sol");
    let acc = vm.interns_mut().intern("acc");
    let mut b = ProtoBuilder::new(2);
    b.set_source(source);
    b.add_upvalue(Some(acc));
    b.set_line(2);
    b.emit(nop());
    let proto = Rc::new(b.build());
    push_frame_at(&mut vm, &proto, 0);
    let err = vm.type_error(&Value::Nil, "index", VarSite::Upvalue(0));
    assert_eq!(runtime_message(&err), "demo.sol:2: attempt to index a nil value (upvalue 'acc')");
}

#[test]
fn sites_outside_the_frame_window_have_no_description() {
    let mut vm = Vm::new();
    let proto = arithmetic_proto(&mut vm);
    let ci = push_frame_at(&mut vm, &proto, 1);
    let beyond = vm.frame(ci).top_slot() + 3;
    let err = vm.type_error(&Value::Nil, "index", VarSite::Slot(beyond));
    assert_eq!(runtime_message(&err), "demo.sol:4: attempt to index a nil value");
}

#[test]
fn native_frames_have_no_position_prefix() {
    let mut vm = Vm::new();
    let err = vm.type_error(&Value::Nil, "call", VarSite::None);
    assert_eq!(runtime_message(&err), "attempt to call a nil value");
}

/// Caller whose pc sits on `CALL` of the global `g`.
fn global_call_proto(vm: &mut Vm) -> Rc<Proto> {
    let source = vm.interns_mut().intern("@demo.sol");
    let env = vm.interns_mut().intern("_ENV");
    let g = vm.interns_mut().intern("g");
    let mut b = ProtoBuilder::new(1);
    b.set_source(source);
    b.add_upvalue(Some(env));
    let kg = b.add_const(Value::Str(g));
    b.set_line(9);
    b.emit(Instr::GetTabUp { a: 0, b: 0, c: u8::try_from(kg).unwrap() });
    b.emit(Instr::Call { a: 0, b: 1, c: 1 });
    Rc::new(b.build())
}

#[test]
fn calling_a_missing_global() {
    let mut vm = Vm::new();
    let proto = global_call_proto(&mut vm);
    let ci = push_frame_at(&mut vm, &proto, 1);
    let g_slot = vm.frame(ci).func_slot() + 1;
    let callee = vm.slot(g_slot).clone();
    let err = vm.call_error(&callee, VarSite::Slot(g_slot));
    assert_eq!(runtime_message(&err), "demo.sol:9: attempt to call a nil value (global 'g')");
}

#[test]
fn push_script_frame_raises_the_call_error() {
    let mut vm = Vm::new();
    vm.push_value(Value::Boolean(false));
    let err = vm.push_script_frame(0).unwrap_err();
    assert_eq!(runtime_message(&err), "attempt to call a boolean value");
}

#[test]
fn for_loop_control_errors() {
    let mut vm = Vm::new();
    let proto = arithmetic_proto(&mut vm);
    push_frame_at(&mut vm, &proto, 0);
    let s = vm.interns_mut().intern("hi");
    let err = vm.for_error(&Value::Str(s), "initial value");
    assert_eq!(
        runtime_message(&err),
        "demo.sol:3: bad 'for' initial value (number expected, got string)"
    );
}

#[test]
fn concat_blames_the_unconcatenable_operand() {
    let mut vm = Vm::new();
    let err = vm.concat_error(
        (&Value::Integer(2), VarSite::None),
        (&Value::Boolean(true), VarSite::None),
    );
    assert_eq!(runtime_message(&err), "attempt to concatenate a boolean value");

    let err = vm.concat_error(
        (&Value::Nil, VarSite::None),
        (&Value::Integer(2), VarSite::None),
    );
    assert_eq!(runtime_message(&err), "attempt to concatenate a nil value");
}

#[test]
fn integer_representation_errors() {
    let mut vm = Vm::new();
    let err = vm.toint_error((&Value::Float(3.5), VarSite::None), (&Value::Integer(1), VarSite::None));
    assert_eq!(runtime_message(&err), "number has no integer representation");

    // first operand fine, second bad
    let err = vm.toint_error((&Value::Integer(1), VarSite::None), (&Value::Float(0.5), VarSite::None));
    assert_eq!(runtime_message(&err), "number has no integer representation");
}

#[test]
fn order_comparison_errors() {
    let mut vm = Vm::new();
    let t1 = Value::Table(Rc::new(std::cell::RefCell::new(sol::Table::new())));
    let t2 = Value::Table(Rc::new(std::cell::RefCell::new(sol::Table::new())));
    let err = vm.order_error(&t1, &t2);
    assert_eq!(runtime_message(&err), "attempt to compare two table values");

    let err = vm.order_error(&Value::Integer(1), &Value::Nil);
    assert_eq!(runtime_message(&err), "attempt to compare number with nil");
}

#[test]
fn add_info_prefixes() {
    let mut vm = Vm::new();
    let id = vm.interns_mut().intern("=stdin");
    assert_eq!(vm.add_info("boom", Some(id), 5), "stdin:5: boom");
    assert_eq!(vm.add_info("boom", None, 1), "?:1: boom");
}

#[test]
fn message_handler_transforms_the_message() {
    fn handler(vm: &mut Vm) -> RunResult<usize> {
        let arg_slot = vm.current_frame().func_slot() + 1;
        let text = vm.slot(arg_slot).clone().to_display(vm.interns());
        let id = vm.interns_mut().intern(&format!("handled: {text}"));
        vm.push_value(Value::Str(id));
        Ok(1)
    }
    let mut vm = Vm::new();
    vm.push_value(Value::Native(handler));
    vm.set_errfunc(Some(vm.stack_len() - 1));
    let err = vm.run_error("boom");
    assert_eq!(runtime_message(&err), "handled: boom");
}

#[test]
fn non_native_handler_slot_leaves_the_message() {
    let mut vm = Vm::new();
    vm.push_value(Value::Integer(3));
    vm.set_errfunc(Some(vm.stack_len() - 1));
    let err = vm.run_error("boom");
    assert_eq!(runtime_message(&err), "boom");
}

#[test]
fn failing_handler_propagates_its_error() {
    fn handler(_vm: &mut Vm) -> RunResult<usize> {
        Err(RunError::Runtime("handler exploded".to_owned()))
    }
    let mut vm = Vm::new();
    vm.push_value(Value::Native(handler));
    vm.set_errfunc(Some(vm.stack_len() - 1));
    let err = vm.run_error("boom");
    assert_eq!(runtime_message(&err), "handler exploded");
    // the handler frame was unwound
    assert!(vm.get_stack(0).is_none());
}
