//! Integration tests for program evaluation

use exprvm_core::{
    Function, Opcode, Program, ProgramBuilder, Record, Value, ValueCell, Vm, VmError, run,
};
use regex::Regex;
use serde_json::json;

fn build(source: &str, emit: impl FnOnce(&mut ProgramBuilder)) -> Program {
    let mut b = ProgramBuilder::new(source);
    b.at(1, 0);
    emit(&mut b);
    b.build().unwrap()
}

fn user() -> Value {
    Value::record(
        Record::builder("User")
            .field("Name", "ann")
            .field("Greet", Function::new("field", |_| Ok(Value::from("from field"))))
            .method("Greet", |this, args| {
                let name = this.as_record().and_then(|r| r.field("Name")).cloned();
                let greeting = args.first().cloned().unwrap_or(Value::from("hello"));
                Ok(Value::string(format!("{greeting}, {}", name.unwrap_or_default())))
            })
            .build(),
    )
}

#[test]
fn test_push_round_trips_every_shape() {
    let shapes = vec![
        Value::Nil,
        Value::Bool(true),
        Value::Int(-1),
        Value::Int8(-8),
        Value::Int16(-16),
        Value::Int32(-32),
        Value::Int64(-64),
        Value::Uint(1),
        Value::Uint8(8),
        Value::Uint16(16),
        Value::Uint32(32),
        Value::Uint64(64),
        Value::Float32(0.5),
        Value::Float64(2.25),
        Value::from("text"),
        Value::array(vec![Value::Int(1), Value::from("two")]),
        Value::map_from([("k", Value::Bool(false))]),
        user(),
        Value::from(Function::new("f", |_| Ok(Value::Nil))),
        Value::from(Regex::new("a+").unwrap()),
        Value::reference(Value::Int(7)),
    ];
    for shape in shapes {
        let program = build("", |b| {
            b.push(shape.clone());
        });
        assert_eq!(run(&program, &Value::Nil).unwrap(), shape);
    }
}

#[test]
fn test_arithmetic_precedence() {
    // 1 + 2 * 3
    let program = build("1 + 2 * 3", |b| {
        b.push(1i64)
            .push(2i64)
            .push(3i64)
            .op(Opcode::Multiply)
            .op(Opcode::Add);
    });
    assert_eq!(run(&program, &Value::Nil).unwrap(), Value::Int(7));
}

#[test]
fn test_string_operators() {
    let check = |op: Opcode, a: &str, b: &str| {
        let program = build("", |builder| {
            builder.push(a).push(b).op(op);
        });
        run(&program, &Value::Nil).unwrap()
    };
    assert_eq!(check(Opcode::Contains, "hello", "ell"), Value::Bool(true));
    assert_eq!(check(Opcode::Contains, "hello", "xyz"), Value::Bool(false));
    assert_eq!(check(Opcode::StartsWith, "hello", "he"), Value::Bool(true));
    assert_eq!(check(Opcode::EndsWith, "hello", "lo"), Value::Bool(true));
    assert_eq!(check(Opcode::EqualString, "a", "a"), Value::Bool(true));
}

#[test]
fn test_contains_requires_strings() {
    let program = build("", |b| {
        b.push("hello").push(1i64).op(Opcode::Contains);
    });
    let err = run(&program, &Value::Nil).unwrap_err();
    assert_eq!(
        err.message(),
        "interface conversion: interface {} is int, not string"
    );
}

#[test]
fn test_unknown_field_is_positioned_error() {
    let env = Value::map_from([("user", Value::record(Record::builder("User").field("Name", "ann").build()))]);
    let program = build("user.Age", |b| {
        b.fetch("user").at(1, 4).property("Age");
    });

    let err = run(&program, &env).unwrap_err();
    assert_eq!(err.location().line, 1);
    assert_eq!(err.location().column, 4);
    assert_eq!(
        err.to_string(),
        "User{Name: ann} does not contain Age (1:5)\n | user.Age\n | ....^"
    );
}

#[test]
fn test_missing_map_key_is_nil() {
    let env = Value::from_json(json!({"present": 1}));
    let program = build("absent", |b| {
        b.fetch("absent");
    });
    assert_eq!(run(&program, &env).unwrap(), Value::Nil);
}

#[test]
fn test_fetch_map_environment() {
    let env = Value::from_json(json!({"a": {"b": [10, 20]}}));
    let program = build("a.b[1]", |b| {
        b.fetch_map("a").property("b").push(1i64).op(Opcode::Index);
    });
    assert_eq!(run(&program, &env).unwrap(), Value::Int(20));

    let err = run(&program, &user()).unwrap_err();
    assert_eq!(
        err.message(),
        "interface conversion: interface {} is User, not map[string]interface {}"
    );
}

#[test]
fn test_inner_scope_is_dropped_on_end() {
    let program = build("", |b| {
        b.op(Opcode::Begin)
            .push(1i64)
            .store("x")
            .op(Opcode::Begin)
            .push(2i64)
            .store("y")
            .op(Opcode::End)
            .load("y")
            .load("x");
    });
    let mut vm = Vm::new();
    assert_eq!(vm.run(&program, &Value::Nil).unwrap(), Value::Int(1));
    assert_eq!(vm.stack(), &[Value::Nil, Value::Int(1)]);
    assert_eq!(vm.scope().and_then(|s| s.get("x")), Some(&Value::Int(1)));
}

#[test]
fn test_scopes_do_not_fall_through() {
    let program = build("", |b| {
        b.op(Opcode::Begin)
            .push(1i64)
            .store("x")
            .op(Opcode::Begin)
            .load("x");
    });
    assert_eq!(run(&program, &Value::Nil).unwrap(), Value::Nil);
}

#[test]
fn test_conditional_jumps_peek() {
    for (cond, op) in [(Opcode::True, Opcode::JumpIfTrue), (Opcode::False, Opcode::JumpIfFalse)] {
        let mut b = ProgramBuilder::new("");
        b.op(cond);
        let label = b.jump(op);
        b.push("skipped");
        b.patch(label);
        let program = b.build().unwrap();

        let mut vm = Vm::new();
        vm.run(&program, &Value::Nil).unwrap();
        assert_eq!(vm.stack(), &[Value::Bool(cond == Opcode::True)]);
    }
}

#[test]
fn test_conditional_jump_requires_bool() {
    let mut b = ProgramBuilder::new("");
    b.push(1i64);
    let label = b.jump(Opcode::JumpIfTrue);
    b.patch(label);
    let program = b.build().unwrap();
    assert!(matches!(
        Vm::new().run(&program, &Value::Nil),
        Err(VmError::TypeAssertion { expected: "bool", .. })
    ));
}

#[test]
fn test_equal_int_asserts_type() {
    let ok = build("", |b| {
        b.push(3i64).push(3i64).op(Opcode::EqualInt);
    });
    assert_eq!(run(&ok, &Value::Nil).unwrap(), Value::Bool(true));

    let wrong = build("", |b| {
        b.push(3i64).push(Value::Int64(3)).op(Opcode::EqualInt);
    });
    let err = Vm::new().run(&wrong, &Value::Nil).unwrap_err();
    assert!(matches!(err, VmError::TypeAssertion { expected: "int", .. }));

    let wrong = build("", |b| {
        b.push("a").push(1i64).op(Opcode::EqualString);
    });
    assert!(run(&wrong, &Value::Nil).is_err());
}

#[test]
fn test_len() {
    let len_of = |value: Value| {
        let program = build("", |b| {
            b.push(value).op(Opcode::Len);
        });
        let mut vm = Vm::new();
        vm.run(&program, &Value::Nil).map(|v| (v, vm.stack().len()))
    };

    assert_eq!(
        len_of(Value::array(vec![Value::Nil; 4])).unwrap(),
        (Value::Int(4), 2)
    );
    assert_eq!(len_of(Value::from("héllo")).unwrap(), (Value::Int(6), 2));
    assert!(len_of(Value::map_from([("a", Value::Nil)])).is_err());
    assert!(len_of(user()).is_err());
}

#[test]
fn test_method_beats_field() {
    let env = Value::map_from([("user", user())]);
    let program = build("user.Greet()", |b| {
        b.fetch("user").method("Greet", 0);
    });
    assert_eq!(run(&program, &env).unwrap(), Value::from("hello, ann"));

    let program = build("user.Greet(\"hi\")", |b| {
        b.fetch("user").push("hi").method("Greet", 1);
    });
    assert_eq!(run(&program, &env).unwrap(), Value::from("hi, ann"));
}

#[test]
fn test_method_through_reference() {
    let env = Value::map_from([("user", Value::reference(user()))]);
    let program = build("user.Greet()", |b| {
        b.fetch("user").method("Greet", 0);
    });
    assert_eq!(run(&program, &env).unwrap(), Value::from("hello, ann"));
}

#[test]
fn test_call_argument_order() {
    let env = Value::map_from([(
        "sub",
        Value::from(Function::with_arity("sub", 2, |args| {
            exprvm_core::operators::subtract(&args[0], &args[1])
        })),
    )]);
    let program = build("sub(1, 2)", |b| {
        b.push(1i64).push(2i64).call("sub", 2);
    });
    assert_eq!(run(&program, &env).unwrap(), Value::Int(-1));
}

#[test]
fn test_unresolved_call() {
    let env = Value::map_from([("x", Value::Int(1))]);
    let program = build("nope()", |b| {
        b.call("nope", 0);
    });
    let err = run(&program, &env).unwrap_err();
    assert_eq!(err.message(), "cannot get \"nope\" from map");

    let program = build("x()", |b| {
        b.call("x", 0);
    });
    assert!(run(&program, &env).is_err());
}

#[test]
fn test_host_error_propagates() {
    let env = Value::map_from([(
        "fail",
        Value::from(Function::new("fail", |_| Err(VmError::host("disk on fire")))),
    )]);
    let program = build("fail()", |b| {
        b.call("fail", 0);
    });
    assert_eq!(
        run(&program, &env).unwrap_err().to_string(),
        "disk on fire (1:1)\n | fail()\n | ^"
    );
}

#[test]
fn test_literals_preserve_order() {
    let program = build("[1, 2, 3]", |b| {
        b.push(1i64).push(2i64).push(3i64).push(3i64).op(Opcode::Array);
    });
    assert_eq!(
        run(&program, &Value::Nil).unwrap(),
        Value::array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
    );

    let program = build("{b: 1, a: 2}", |b| {
        b.push("b")
            .push(1i64)
            .push("a")
            .push(2i64)
            .push(2i64)
            .op(Opcode::Map);
    });
    let value = run(&program, &Value::Nil).unwrap();
    let keys: Vec<_> = value.as_map().unwrap().keys().cloned().collect();
    assert_eq!(keys, vec!["b", "a"]);
    assert_eq!(value.to_json().unwrap(), json!({"b": 1, "a": 2}));
}

#[test]
fn test_range_and_membership() {
    let program = build("3 in 1..5", |b| {
        b.push(3i64)
            .push(1i64)
            .push(5i64)
            .op(Opcode::Range)
            .op(Opcode::In);
    });
    assert_eq!(run(&program, &Value::Nil).unwrap(), Value::Bool(true));

    let program = build("", |b| {
        b.push("Name").push(user()).op(Opcode::In);
    });
    assert_eq!(run(&program, &Value::Nil).unwrap(), Value::Bool(true));
}

#[test]
fn test_oversized_range_is_positioned_error() {
    let program = build("lo..hi", |b| {
        b.push(i64::MIN).push(i64::MAX).at(1, 2).op(Opcode::Range);
    });
    let err = run(&program, &Value::Nil).unwrap_err();
    assert_eq!(
        err.message(),
        format!("range {}..{} is too large", i64::MIN, i64::MAX)
    );
    assert_eq!(err.location().column, 2);
}

#[test]
fn test_cyclic_reference_environment_faults() {
    let cell = ValueCell::new(Value::Nil);
    let env = Value::Ref(cell.clone());
    cell.set(env.clone());
    let program = build("n", |b| {
        b.fetch("n");
    });

    let err = run(&program, &env).unwrap_err();
    assert_eq!(err.message(), "reference cycle");
    cell.set(Value::Nil);
}

#[test]
fn test_reference_environment_is_read_through() {
    let cell = ValueCell::new(Value::map_from([("n", Value::Int(1))]));
    let env = Value::Ref(cell.clone());
    let program = build("n", |b| {
        b.fetch("n");
    });

    assert_eq!(run(&program, &env).unwrap(), Value::Int(1));
    cell.set(Value::map_from([("n", Value::Int(2))]));
    assert_eq!(run(&program, &env).unwrap(), Value::Int(2));
}

#[test]
fn test_unknown_opcode_is_positioned() {
    let program = build("x", |b| {
        b.push(1i64).raw(0xfd);
    });
    let err = run(&program, &Value::Nil).unwrap_err();
    assert_eq!(err.to_string(), "unknown bytecode 0xfd (1:1)\n | x\n | ^");
}

#[test]
fn test_vm_is_reusable() {
    let program = build("", |b| {
        b.push(1i64).push(2i64).op(Opcode::Add);
    });
    let mut vm = Vm::new();
    assert_eq!(vm.run(&program, &Value::Nil).unwrap(), Value::Int(3));
    assert_eq!(vm.run(&program, &Value::Nil).unwrap(), Value::Int(3));
    assert_eq!(vm.stack().len(), 1);
}
