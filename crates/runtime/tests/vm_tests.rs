
use coil_bytecode::{
    BinaryOp, Condition, Instruction, Label, MethodRef, NumericKind, Type, UnitWriter, ValueKind,
};
use coil_runtime::{ErrorKind, Value, Vm, VmSettings};
use coil_test_utils::{MethodBuilder, UnitBuilder, asm::*};
use runtime_test_utils::*;

const MAIN: &str = "test/Main";

fn run(method: MethodBuilder, args: &[Value]) -> coil_runtime::Result<Option<Value>> {
    let built = method.build(MAIN);
    let name = built.name.clone();
    let descriptor = built.descriptor.to_string();

    let mut unit = UnitBuilder::new(MAIN).build();
    unit.methods.push(built);

    let mut vm = plain_vm(&unit);
    vm.call(MAIN, &name, &descriptor, args)
}

fn check_result(method: MethodBuilder, args: &[Value], expected: impl Into<Value>) {
    match run(method, args) {
        Ok(result) => assert_eq!(result, Some(expected.into())),
        Err(error) => panic!("{error}"),
    }
}

fn check_error(method: MethodBuilder, args: &[Value], check: impl Fn(&ErrorKind) -> bool) {
    match run(method, args) {
        Ok(result) => panic!("expected an error, found {result:?}"),
        Err(error) => assert!(check(error.kind()), "unexpected error: {error}"),
    }
}

mod vm {
    use super::*;

    mod arithmetic {
        use super::*;

        #[test]
        fn int_expression() {
            // (a + 2) * a - 1
            check_result(
                MethodBuilder::new("f", "(I)I").body(vec![
                    iload(0),
                    int(2),
                    iadd(),
                    iload(0),
                    Instruction::Binary {
                        op: BinaryOp::Multiply,
                        kind: NumericKind::Int,
                    },
                    int(1),
                    Instruction::Binary {
                        op: BinaryOp::Subtract,
                        kind: NumericKind::Int,
                    },
                    ret(ValueKind::Int),
                ]),
                &[Value::Int(5)],
                34,
            );
        }

        #[test]
        fn long_parameters_take_two_slots() {
            check_result(
                MethodBuilder::new("f", "(JI)J").body(vec![
                    load(ValueKind::Long, 0),
                    iload(2),
                    Instruction::Convert {
                        from: NumericKind::Int,
                        to: NumericKind::Long,
                    },
                    Instruction::Binary {
                        op: BinaryOp::Add,
                        kind: NumericKind::Long,
                    },
                    ret(ValueKind::Long),
                ]),
                &[Value::Long(1 << 33), Value::Int(1)],
                (1i64 << 33) + 1,
            );
        }

        #[test]
        fn compare_with_nan() {
            check_result(
                MethodBuilder::new("f", "(D)I").body(vec![
                    load(ValueKind::Double, 0),
                    double(1.0),
                    Instruction::Compare {
                        kind: NumericKind::Double,
                        nan_is_greater: true,
                    },
                    ret(ValueKind::Int),
                ]),
                &[Value::Double(f64::NAN)],
                1,
            );
        }

        #[test]
        fn dup_and_swap() {
            // a - (a * 2)
            check_result(
                MethodBuilder::new("f", "(I)I").body(vec![
                    iload(0),
                    Instruction::Dup,
                    int(2),
                    Instruction::Binary {
                        op: BinaryOp::Multiply,
                        kind: NumericKind::Int,
                    },
                    Instruction::Swap,
                    Instruction::Pop,
                    iload(0),
                    Instruction::Swap,
                    Instruction::Binary {
                        op: BinaryOp::Subtract,
                        kind: NumericKind::Int,
                    },
                    ret(ValueKind::Int),
                ]),
                &[Value::Int(3)],
                -3,
            );
        }
    }

    mod control_flow {
        use super::*;

        fn factorial() -> MethodBuilder {
            MethodBuilder::new("factorial", "(I)I").body(vec![
                iload(0),
                int(1),
                if_icmp(Condition::Greater, 0),
                int(1),
                ret(ValueKind::Int),
                label(0),
                iload(0),
                iload(0),
                int(-1),
                iadd(),
                invoke_static(MAIN, "factorial", "(I)I"),
                Instruction::Binary {
                    op: BinaryOp::Multiply,
                    kind: NumericKind::Int,
                },
                ret(ValueKind::Int),
            ])
        }

        #[test]
        fn recursion() {
            check_result(factorial(), &[Value::Int(5)], 120);
        }

        #[test]
        fn table_switch() {
            let method = || {
                MethodBuilder::new("f", "(I)I").body(vec![
                    iload(0),
                    Instruction::TableSwitch {
                        low: 1,
                        default: Label(2),
                        targets: vec![Label(0), Label(1)],
                    },
                    label(0),
                    int(10),
                    ret(ValueKind::Int),
                    label(1),
                    int(20),
                    ret(ValueKind::Int),
                    label(2),
                    int(-1),
                    ret(ValueKind::Int),
                ])
            };

            check_result(method(), &[Value::Int(1)], 10);
            check_result(method(), &[Value::Int(2)], 20);
            check_result(method(), &[Value::Int(3)], -1);
            check_result(method(), &[Value::Int(i32::MIN)], -1);
        }

        #[test]
        fn lookup_switch() {
            let method = || {
                MethodBuilder::new("f", "(I)I").body(vec![
                    iload(0),
                    Instruction::LookupSwitch {
                        default: Label(1),
                        cases: vec![(-5, Label(0))],
                    },
                    label(0),
                    int(1),
                    ret(ValueKind::Int),
                    label(1),
                    int(0),
                    ret(ValueKind::Int),
                ])
            };

            check_result(method(), &[Value::Int(-5)], 1);
            check_result(method(), &[Value::Int(5)], 0);
        }
    }

    mod arrays {
        use super::*;

        #[test]
        fn store_and_load() {
            check_result(
                MethodBuilder::new("f", "()J").body(vec![
                    int(3),
                    Instruction::NewArray(Type::Long),
                    astore(0),
                    aload(0),
                    int(2),
                    long(99),
                    Instruction::ArrayStore(ValueKind::Long),
                    aload(0),
                    int(2),
                    Instruction::ArrayLoad(ValueKind::Long),
                    ret(ValueKind::Long),
                ]),
                &[],
                99i64,
            );
        }

        #[test]
        fn length() {
            check_result(
                MethodBuilder::new("f", "()I").body(vec![
                    int(4),
                    Instruction::NewArray(Type::object("lang/Object")),
                    Instruction::ArrayLength,
                    ret(ValueKind::Int),
                ]),
                &[],
                4,
            );
        }
    }

    #[test]
    fn host_natives() {
        let unit = UnitBuilder::new(MAIN)
            .method(MethodBuilder::new("f", "()V").body(vec![
                int(1),
                invoke_static(HOST, "record", "(I)V"),
                int(2),
                invoke_static(HOST, "record", "(I)V"),
                ret_void(),
            ]))
            .build();
        let mut vm = plain_vm(&unit);
        let recorded = add_recorder(&mut vm);

        assert_eq!(vm.call(MAIN, "f", "()V", &[]).unwrap(), None);
        assert_eq!(*recorded.borrow(), vec![1, 2]);
    }

    #[test]
    fn boxing() {
        check_result(
            MethodBuilder::new("f", "(F)F").body(vec![
                load(ValueKind::Float, 0),
                invoke_static("lang/Float", "valueOf", "(F)Llang/Float;"),
                Instruction::CheckCast(Type::object("lang/Object")),
                Instruction::CheckCast(Type::object("lang/Float")),
                invoke_virtual("lang/Float", "floatValue", "()F"),
                ret(ValueKind::Float),
            ]),
            &[Value::Float(2.5)],
            2.5f32,
        );
    }

    mod should_fail {
        use super::*;

        #[test]
        fn malformed_unit() {
            let mut vm = Vm::new();
            let error = vm.load(b"COIL").unwrap_err();
            assert!(matches!(error.kind(), ErrorKind::MalformedUnit(_)));
        }

        #[test]
        fn verification() {
            let unit = UnitBuilder::new(MAIN)
                .method(
                    MethodBuilder::new("f", "()I")
                        .max_stack(1)
                        .body(vec![float(1.0), ret(ValueKind::Int)]),
                )
                .build();

            let mut vm = Vm::new();
            let error = vm.load(&UnitWriter::write(&unit)).unwrap_err();
            assert!(matches!(
                error.kind(),
                ErrorKind::Verification { method, .. } if method == "test/Main.f()I"
            ));
        }

        #[test]
        fn division_by_zero() {
            check_error(
                MethodBuilder::new("f", "(I)I").body(vec![
                    int(1),
                    iload(0),
                    Instruction::Binary {
                        op: BinaryOp::Divide,
                        kind: NumericKind::Int,
                    },
                    ret(ValueKind::Int),
                ]),
                &[Value::Int(0)],
                |error| matches!(error, ErrorKind::DivisionByZero),
            );
        }

        #[test]
        fn index_out_of_bounds() {
            check_error(
                MethodBuilder::new("f", "()I").body(vec![
                    int(2),
                    Instruction::NewArray(Type::Int),
                    int(2),
                    Instruction::ArrayLoad(ValueKind::Int),
                    ret(ValueKind::Int),
                ]),
                &[],
                |error| {
                    matches!(
                        error,
                        ErrorKind::IndexOutOfBounds {
                            index: 2,
                            length: 2
                        }
                    )
                },
            );
        }

        #[test]
        fn negative_array_size() {
            check_error(
                MethodBuilder::new("f", "()I").body(vec![
                    int(-1),
                    Instruction::NewArray(Type::Int),
                    Instruction::ArrayLength,
                    ret(ValueKind::Int),
                ]),
                &[],
                |error| matches!(error, ErrorKind::NegativeArraySize(-1)),
            );
        }

        #[test]
        fn class_cast() {
            check_error(
                MethodBuilder::new("f", "()V").body(vec![
                    string("hello"),
                    Instruction::CheckCast(Type::object("lang/Integer")),
                    Instruction::Pop,
                    ret_void(),
                ]),
                &[],
                |error| matches!(error, ErrorKind::ClassCast { .. }),
            );
        }

        #[test]
        fn null_array() {
            check_error(
                MethodBuilder::new("f", "()I").body(vec![
                    null(),
                    Instruction::ArrayLength,
                    ret(ValueKind::Int),
                ]),
                &[],
                |error| matches!(error, ErrorKind::NullReference),
            );
        }

        #[test]
        fn thrown_string_has_a_trace() {
            let unit = UnitBuilder::new(MAIN)
                .method(MethodBuilder::new("outer", "()V").body(vec![
                    invoke_static(MAIN, "inner", "()V"),
                    ret_void(),
                ]))
                .method(MethodBuilder::new("inner", "()V").body(vec![
                    Instruction::Nop,
                    string("oops"),
                    Instruction::Throw,
                ]))
                .build();
            let mut vm = plain_vm(&unit);

            let error = vm.call(MAIN, "outer", "()V", &[]).unwrap_err();
            assert_eq!(thrown_message(&error).as_deref(), Some("oops"));

            let trace: Vec<_> = error
                .trace()
                .iter()
                .map(|frame| (frame.method.as_str(), frame.position))
                .collect();
            assert_eq!(
                trace,
                vec![("test/Main.inner()V", 2), ("test/Main.outer()V", 0)]
            );
        }

        #[test]
        fn unknown_method() {
            check_error(
                MethodBuilder::new("f", "()V").body(vec![
                    invoke_static("test/Missing", "g", "()V"),
                    ret_void(),
                ]),
                &[],
                |error| matches!(error, ErrorKind::UnknownMethod(_)),
            );
        }

        #[test]
        fn argument_mismatch() {
            check_error(
                MethodBuilder::new("f", "(I)V").body(vec![ret_void()]),
                &[Value::Long(1)],
                |error| matches!(error, ErrorKind::ArgumentMismatch { .. }),
            );
        }

        #[test]
        fn call_depth_limit() {
            let unit = UnitBuilder::new(MAIN)
                .method(MethodBuilder::new("f", "()V").body(vec![
                    invoke_static(MAIN, "f", "()V"),
                    ret_void(),
                ]))
                .build();

            let mut vm = Vm::with_settings(VmSettings {
                max_call_depth: 16,
                ..Default::default()
            });
            vm.load(&UnitWriter::write(&unit)).unwrap();

            let error = vm.call(MAIN, "f", "()V", &[]).unwrap_err();
            assert!(matches!(error.kind(), ErrorKind::CallDepthLimit(16)));
            assert_eq!(error.trace().len(), 16);
        }

        #[test]
        fn instruction_limit() {
            let unit = UnitBuilder::new(MAIN)
                .method(MethodBuilder::new("f", "()V").body(vec![label(0), goto(0)]))
                .build();

            let mut vm = Vm::with_settings(VmSettings {
                instruction_limit: Some(1000),
                ..Default::default()
            });
            vm.load(&UnitWriter::write(&unit)).unwrap();

            let error = vm.call(MAIN, "f", "()V", &[]).unwrap_err();
            assert!(matches!(error.kind(), ErrorKind::InstructionLimit(1000)));
        }

        #[test]
        fn overriding_a_library_native() {
            let unit = UnitBuilder::new(MAIN)
                .method(MethodBuilder::new("f", "()I").body(vec![
                    int(1),
                    invoke_static("lang/Integer", "valueOf", "(I)Llang/Integer;"),
                    invoke_virtual("lang/Integer", "intValue", "()I"),
                    ret(ValueKind::Int),
                ]))
                .build();
            let mut vm = plain_vm(&unit);
            vm.register_native(
                MethodRef::parse("lang/Integer", "intValue", "()I"),
                |_| coil_runtime::runtime_error!("intValue is unavailable"),
            );

            let error = vm.call(MAIN, "f", "()I", &[]).unwrap_err();
            assert!(matches!(
                error.kind(),
                ErrorKind::StringError(message) if message == "intValue is unavailable"
            ));
        }
    }
}
