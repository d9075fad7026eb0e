mod codec {
    use coil_bytecode::{
        AccessFlags, BinaryOp, CompiledUnit, Condition, Instruction, Label, LabelError,
        NumericKind, ReadError, Type, UnitFlags, UnitReader, UnitWriter, ValueKind,
    };
    use coil_test_utils::{MethodBuilder, UnitBuilder, asm::*, unit_dump};
    use test_case::test_case;

    fn every_instruction() -> Vec<Instruction> {
        use Instruction::*;

        vec![
            Nop,
            null(),
            Pop,
            int(-5),
            long(i64::MIN),
            float(1.5),
            double(-0.25),
            string("héllo"),
            Pop,
            Pop2,
            Pop,
            Pop2,
            Pop,
            iload(1),
            istore(2),
            Increment {
                index: 2,
                delta: -300,
            },
            iload(2),
            Dup,
            DupX1,
            DupX2,
            Dup2,
            Swap,
            Binary {
                op: BinaryOp::Xor,
                kind: NumericKind::Int,
            },
            Negate(NumericKind::Int),
            Convert {
                from: NumericKind::Int,
                to: NumericKind::Double,
            },
            double(2.0),
            Compare {
                kind: NumericKind::Double,
                nan_is_greater: true,
            },
            If {
                condition: Condition::LessOrEqual,
                target: coil_bytecode::Label(0),
            },
            label(0),
            if_icmp(Condition::NotEqual, 1),
            label(1),
            Pop2,
            null(),
            aload(0),
            IfReferenceEqual {
                equal: false,
                target: coil_bytecode::Label(2),
            },
            label(2),
            aload(0),
            IfNull {
                null: true,
                target: coil_bytecode::Label(3),
            },
            label(3),
            iload(1),
            TableSwitch {
                low: -1,
                default: coil_bytecode::Label(4),
                targets: vec![coil_bytecode::Label(4), coil_bytecode::Label(4)],
            },
            label(4),
            iload(1),
            LookupSwitch {
                default: coil_bytecode::Label(5),
                cases: vec![(10, coil_bytecode::Label(5)), (-20, coil_bytecode::Label(5))],
            },
            label(5),
            int(3),
            NewArray(Type::array(Type::object("a/B"))),
            ArrayLength,
            NewArray(Type::Long),
            int(0),
            ArrayLoad(ValueKind::Long),
            Pop2,
            aload(0),
            CheckCast(Type::object("a/B")),
            InstanceOf(Type::array(Type::Int)),
            Pop,
            aload(0),
            MonitorEnter,
            aload(0),
            MonitorExit,
            aload(0),
            invoke_static("a/B", "f", "(Llang/Object;)V"),
            aload(0),
            invoke_virtual("lang/Object", "hash", "()I"),
            Pop,
            goto(6),
            label(6),
            aload(0),
            Throw,
        ]
    }

    fn test_unit() -> CompiledUnit {
        let mut unit = UnitBuilder::new("app/Codec")
            .method(
                MethodBuilder::new("all", "(Llang/Object;I)V")
                    .max_stack(8)
                    .body(every_instruction()),
            )
            .method(
                MethodBuilder::new("abstract", "(Lcoil/Continuation;)J")
                    .access(AccessFlags::PUBLIC | AccessFlags::ABSTRACT),
            )
            .method(
                MethodBuilder::new("id", "(D)D")
                    .instance()
                    .body(vec![load(ValueKind::Double, 1), ret(ValueKind::Double)]),
            )
            .build();
        unit.flags = UnitFlags::INSTRUMENTED;
        unit
    }

    #[test]
    fn written_units_are_read_back_unchanged() {
        let unit = test_unit();
        assert!(!unit.methods[0].stack_map.is_empty());

        let bytes = UnitWriter::write(&unit);
        match UnitReader::read(&bytes) {
            Ok(read) => assert_eq!(read, unit, "\n{}", unit_dump(&unit)),
            Err(error) => panic!("{error}\n{}", unit_dump(&unit)),
        }
    }

    #[test]
    fn writing_is_deterministic() {
        let unit = test_unit();
        let bytes = UnitWriter::write(&unit);
        let read = UnitReader::read(&bytes).unwrap();
        assert_eq!(UnitWriter::write(&read), bytes);
    }

    mod should_fail {
        use super::*;
        use test_case::test_case;

        fn empty_unit_bytes() -> Vec<u8> {
            UnitWriter::write(&CompiledUnit::new("x"))
        }

        fn single_method_bytes(body: Vec<Instruction>) -> Vec<u8> {
            let unit = UnitBuilder::new("x")
                .method(MethodBuilder::new("f", "()V").max_stack(0).body(body))
                .build();
            UnitWriter::write(&unit)
        }

        #[test]
        fn invalid_magic() {
            let mut bytes = empty_unit_bytes();
            bytes[0] = b'K';
            assert_eq!(UnitReader::read(&bytes), Err(ReadError::InvalidMagic));
        }

        #[test]
        fn unsupported_version() {
            let mut bytes = empty_unit_bytes();
            bytes[4] = 99;
            assert_eq!(UnitReader::read(&bytes), Err(ReadError::UnsupportedVersion(99)));
        }

        #[test_case(0)]
        #[test_case(3)]
        #[test_case(5)]
        #[test_case(7)]
        fn truncated(len: usize) {
            let bytes = empty_unit_bytes();
            assert!(matches!(
                UnitReader::read(&bytes[..len]),
                Err(ReadError::InvalidMagic | ReadError::UnexpectedEnd { .. })
            ));
        }

        #[test]
        fn truncated_method() {
            let bytes = single_method_bytes(vec![int(1), Instruction::Pop, ret_void()]);
            for len in 6..bytes.len() {
                assert!(
                    UnitReader::read(&bytes[..len]).is_err(),
                    "expected an error when reading {len} of {} bytes",
                    bytes.len()
                );
            }
        }

        #[test]
        fn trailing_bytes() {
            let mut bytes = empty_unit_bytes();
            let position = bytes.len();
            bytes.push(0);
            assert_eq!(
                UnitReader::read(&bytes),
                Err(ReadError::TrailingBytes { position })
            );
        }

        #[test]
        fn unknown_op() {
            let mut bytes = single_method_bytes(vec![ret_void()]);
            // ReturnVoid is the method's only instruction, followed by an empty stack map
            let position = bytes.len() - 2;
            bytes[position] = 0xee;
            assert_eq!(
                UnitReader::read(&bytes),
                Err(ReadError::UnknownOp { op: 0xee, position })
            );
        }

        #[test]
        fn undefined_label() {
            let bytes = single_method_bytes(vec![goto(3)]);
            assert_eq!(
                UnitReader::read(&bytes),
                Err(ReadError::Label {
                    method: "f()V".into(),
                    source: LabelError::Undefined(Label(3)),
                })
            );
        }

        #[test]
        fn invalid_utf8() {
            let mut bytes = empty_unit_bytes();
            // The unit name 'x' is the last byte before the method count
            let position = bytes.len() - 2;
            bytes[position] = 0xff;
            assert!(matches!(
                UnitReader::read(&bytes),
                Err(ReadError::InvalidUtf8 { .. })
            ));
        }

        #[test]
        fn invalid_descriptor() {
            let unit = UnitBuilder::new("x")
                .method(MethodBuilder::new("f", "()V").max_stack(0).body(vec![ret_void()]))
                .build();
            let bytes = UnitWriter::write(&unit);
            let descriptor = bytes
                .windows(3)
                .position(|window| window == b"()V")
                .unwrap();
            let mut bytes = bytes;
            bytes[descriptor + 2] = b'Q';
            assert!(matches!(
                UnitReader::read(&bytes),
                Err(ReadError::InvalidDescriptor { .. })
            ));
        }
    }
}
