//! Tests for stack walking and local-variable access.

use std::rc::Rc;

use sol::{Closure, Instr, Proto, ProtoBuilder, Value, Vm};

fn nop() -> Instr {
    Instr::LoadNil { a: 0, b: 0 }
}

/// `function f(x, y) local z ... end` with `z` live over pcs 2..4.
fn two_param_proto(vm: &mut Vm) -> Rc<Proto> {
    let x = vm.interns_mut().intern("x");
    let y = vm.interns_mut().intern("y");
    let z = vm.interns_mut().intern("z");
    let mut b = ProtoBuilder::new(1);
    b.add_param(x);
    b.add_param(y);
    for _ in 0..4 {
        b.emit(nop());
    }
    b.add_local(z, 2, 4);
    b.set_max_stack(5);
    Rc::new(b.build())
}

fn push_script_call(vm: &mut Vm, proto: &Rc<Proto>, args: &[Value]) -> usize {
    vm.push_value(Value::Closure(Rc::new(Closure::new(proto.clone()))));
    for arg in args {
        vm.push_value(arg.clone());
    }
    vm.push_script_frame(args.len()).unwrap()
}

#[test]
fn get_stack_on_idle_chain_fails() {
    let vm = Vm::new();
    assert!(vm.get_stack(0).is_none());
}

#[test]
fn get_stack_walks_levels() {
    let mut vm = Vm::new();
    let proto = two_param_proto(&mut vm);
    push_script_call(&mut vm, &proto, &[]);
    push_script_call(&mut vm, &proto, &[]);
    assert!(vm.get_stack(0).is_some());
    assert!(vm.get_stack(1).is_some());
    assert!(vm.get_stack(2).is_none());
}

#[test]
fn parameters_resolve_by_name() {
    let mut vm = Vm::new();
    let proto = two_param_proto(&mut vm);
    push_script_call(&mut vm, &proto, &[Value::Integer(10), Value::Integer(20)]);
    let ar = vm.get_stack(0).unwrap();

    let name = vm.get_local(Some(&ar), 1).unwrap();
    assert_eq!(name, "x");
    assert_eq!(vm.pop_value(), Value::Integer(10));

    let name = vm.get_local(Some(&ar), 2).unwrap();
    assert_eq!(name, "y");
    assert_eq!(vm.pop_value(), Value::Integer(20));
}

#[test]
fn missing_arguments_read_as_nil() {
    let mut vm = Vm::new();
    let proto = two_param_proto(&mut vm);
    push_script_call(&mut vm, &proto, &[Value::Integer(10)]);
    let ar = vm.get_stack(0).unwrap();
    assert_eq!(vm.get_local(Some(&ar), 2).unwrap(), "y");
    assert_eq!(vm.pop_value(), Value::Nil);
}

#[test]
fn local_visibility_follows_pc() {
    let mut vm = Vm::new();
    let proto = two_param_proto(&mut vm);
    let ci = push_script_call(&mut vm, &proto, &[Value::Nil, Value::Nil]);
    let ar = vm.get_stack(0).unwrap();

    // before pc 2, register 2 has no name but is inside the frame
    vm.frame_mut(ci).set_savedpc(1);
    assert_eq!(vm.get_local(Some(&ar), 3).unwrap(), "(temporary)");
    vm.pop_value();

    // at pc 2 the local becomes visible
    vm.frame_mut(ci).set_savedpc(3);
    assert_eq!(vm.get_local(Some(&ar), 3).unwrap(), "z");
    vm.pop_value();
}

#[test]
fn repeated_lookups_resolve_the_same_slot() {
    let mut vm = Vm::new();
    let proto = two_param_proto(&mut vm);
    let ci = push_script_call(&mut vm, &proto, &[Value::Integer(1)]);
    vm.frame_mut(ci).set_savedpc(3);
    let first = vm.find_local(ci, 3).unwrap();
    let second = vm.find_local(ci, 3).unwrap();
    assert_eq!(first, second);
}

#[test]
fn slots_beyond_the_frame_window_fail() {
    let mut vm = Vm::new();
    let proto = two_param_proto(&mut vm); // maxstacksize 5
    push_script_call(&mut vm, &proto, &[]);
    let ar = vm.get_stack(0).unwrap();
    assert!(vm.get_local(Some(&ar), 5).is_some());
    vm.pop_value();
    assert!(vm.get_local(Some(&ar), 6).is_none());
    assert!(vm.get_local(Some(&ar), 0).is_none());
}

#[test]
fn native_frame_slots_are_c_temporaries() {
    let mut vm = Vm::new();
    fn native(_vm: &mut Vm) -> sol::RunResult<usize> {
        Ok(0)
    }
    vm.push_value(Value::Native(native));
    vm.push_value(Value::Boolean(true));
    vm.push_value(Value::Integer(5));
    vm.push_native_frame(2);
    let ar = vm.get_stack(0).unwrap();
    assert_eq!(vm.get_local(Some(&ar), 1).unwrap(), "(C temporary)");
    assert_eq!(vm.pop_value(), Value::Boolean(true));
    assert_eq!(vm.get_local(Some(&ar), 2).unwrap(), "(C temporary)");
    assert_eq!(vm.pop_value(), Value::Integer(5));
    assert!(vm.get_local(Some(&ar), 3).is_none());
    assert!(vm.get_local(Some(&ar), -1).is_none());
}

fn vararg_proto(vm: &mut Vm) -> Rc<Proto> {
    let a = vm.interns_mut().intern("a");
    let mut b = ProtoBuilder::new(1);
    b.add_param(a);
    b.set_vararg();
    b.emit(Instr::VarargPrep { a: 0 });
    for _ in 0..3 {
        b.emit(nop());
    }
    b.set_max_stack(4);
    Rc::new(b.build())
}

#[test]
fn varargs_resolve_below_the_function() {
    let mut vm = Vm::new();
    let proto = vararg_proto(&mut vm);
    let args = [Value::Integer(1), Value::Integer(2), Value::Integer(3)];
    push_script_call(&mut vm, &proto, &args);
    let ar = vm.get_stack(0).unwrap();

    // fixed parameter keeps its name
    assert_eq!(vm.get_local(Some(&ar), 1).unwrap(), "a");
    assert_eq!(vm.pop_value(), Value::Integer(1));

    // extras are addressed with negative indices, oldest first
    assert_eq!(vm.get_local(Some(&ar), -1).unwrap(), "(vararg)");
    assert_eq!(vm.pop_value(), Value::Integer(2));
    assert_eq!(vm.get_local(Some(&ar), -2).unwrap(), "(vararg)");
    assert_eq!(vm.pop_value(), Value::Integer(3));

    assert!(vm.get_local(Some(&ar), -3).is_none());
}

#[test]
fn vararg_function_with_no_extras() {
    let mut vm = Vm::new();
    let proto = vararg_proto(&mut vm);
    push_script_call(&mut vm, &proto, &[Value::Integer(1)]);
    let ar = vm.get_stack(0).unwrap();
    assert!(vm.get_local(Some(&ar), -1).is_none());
}

#[test]
fn set_local_writes_through() {
    let mut vm = Vm::new();
    let proto = two_param_proto(&mut vm);
    push_script_call(&mut vm, &proto, &[Value::Integer(10)]);
    let ar = vm.get_stack(0).unwrap();

    vm.push_value(Value::Integer(99));
    assert_eq!(vm.set_local(&ar, 1).unwrap(), "x");

    assert_eq!(vm.get_local(Some(&ar), 1).unwrap(), "x");
    assert_eq!(vm.pop_value(), Value::Integer(99));
}

#[test]
fn set_local_keeps_value_on_failure() {
    let mut vm = Vm::new();
    let proto = two_param_proto(&mut vm);
    push_script_call(&mut vm, &proto, &[]);
    let ar = vm.get_stack(0).unwrap();
    vm.push_value(Value::Integer(7));
    let before = vm.stack_len();
    assert!(vm.set_local(&ar, 40).is_none());
    assert_eq!(vm.stack_len(), before);
    assert_eq!(vm.pop_value(), Value::Integer(7));
}

#[test]
fn function_value_parameters_without_a_frame() {
    let mut vm = Vm::new();
    let proto = two_param_proto(&mut vm);
    vm.push_value(Value::Closure(Rc::new(Closure::new(proto))));
    assert_eq!(vm.get_local(None, 1).unwrap(), "x");
    assert_eq!(vm.get_local(None, 2).unwrap(), "y");
    assert!(vm.get_local(None, 3).is_none());
}

#[test]
fn outer_frame_window_ends_at_callee() {
    let mut vm = Vm::new();
    let proto = two_param_proto(&mut vm);
    let outer = push_script_call(&mut vm, &proto, &[Value::Integer(1), Value::Integer(2)]);
    push_script_call(&mut vm, &proto, &[]);
    // outer frame's addressable region stops at the callee's function slot
    let limit = vm.frame(outer + 1).func_slot();
    let base = vm.frame(outer).func_slot() + 1;
    let max_n = i32::try_from(limit - base).unwrap();
    assert!(vm.find_local(outer, max_n).is_some());
    assert!(vm.find_local(outer, max_n + 1).is_none());
}
