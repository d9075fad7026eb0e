mod analyzer {
    use coil_bytecode::{
        AnalysisErrorKind, Analyzer, BinaryOp, Condition, FrameValue, Frames, Instruction, Label,
        Method, NumericKind, Type, ValueKind,
    };
    use coil_test_utils::{MethodBuilder, asm::*, method_frames};

    const OWNER: &str = "test/Unit";

    fn analyze(method: &Method) -> Frames {
        match Analyzer::analyze(OWNER, method) {
            Ok(frames) => frames,
            Err(error) => panic!("{error}\n\n{}", method_frames(OWNER, method)),
        }
    }

    fn check_analysis_fails(method: Method) -> AnalysisErrorKind {
        match Analyzer::analyze(OWNER, &method) {
            Ok(_) => panic!(
                "Unexpected success while analyzing:\n{}",
                method_frames(OWNER, &method)
            ),
            Err(error) => error.kind,
        }
    }

    #[test]
    fn entry_frame_includes_receiver_and_parameters() {
        let method = MethodBuilder::new("f", "(JLa/B;)V")
            .instance()
            .max_locals(5)
            .body(vec![ret_void()])
            .build(OWNER);

        let frames = analyze(&method);
        let entry = frames[0].as_ref().unwrap();
        assert_eq!(
            entry.locals,
            vec![
                FrameValue::Reference(Type::object(OWNER)),
                FrameValue::Long,
                FrameValue::Top,
                FrameValue::Reference(Type::object("a/B")),
                FrameValue::Top,
            ]
        );
        assert!(entry.stack.is_empty());
    }

    #[test]
    fn stack_values_are_tracked() {
        let method = MethodBuilder::new("f", "(I)I")
            .body(vec![iload(0), int(1), iadd(), ret(ValueKind::Int)])
            .build(OWNER);

        let frames = analyze(&method);
        assert_eq!(frames[2].as_ref().unwrap().stack.as_slice(), &[FrameValue::Int, FrameValue::Int]);
        assert_eq!(frames[3].as_ref().unwrap().stack.as_slice(), &[FrameValue::Int]);
        assert_eq!(method.max_stack, 2);
    }

    #[test]
    fn storing_into_the_second_half_of_a_wide_local_invalidates_it() {
        let method = MethodBuilder::new("f", "()V")
            .body(vec![
                long(1),
                store(ValueKind::Long, 0),
                int(2),
                istore(1),
                ret_void(),
            ])
            .build(OWNER);

        let frames = analyze(&method);
        assert_eq!(
            frames[2].as_ref().unwrap().locals,
            vec![FrameValue::Long, FrameValue::Top]
        );
        assert_eq!(
            frames[4].as_ref().unwrap().locals,
            vec![FrameValue::Top, FrameValue::Int]
        );
    }

    #[test]
    fn locals_with_different_types_merge_to_top() {
        let method = MethodBuilder::new("f", "(I)V")
            .body(vec![
                iload(0),
                Instruction::If {
                    condition: Condition::Equal,
                    target: Label(0),
                },
                int(1),
                istore(1),
                goto(1),
                label(0),
                float(1.0),
                store(ValueKind::Float, 1),
                label(1),
                ret_void(),
            ])
            .build(OWNER);

        let frames = analyze(&method);
        assert_eq!(frames[8].as_ref().unwrap().locals[1], FrameValue::Top);
    }

    #[test]
    fn references_merge_to_a_common_type() {
        let method = MethodBuilder::new("f", "(ILa/B;La/C;)Llang/Object;")
            .body(vec![
                iload(0),
                Instruction::If {
                    condition: Condition::Equal,
                    target: Label(0),
                },
                aload(1),
                goto(1),
                label(0),
                aload(2),
                label(1),
                ret(ValueKind::Reference),
            ])
            .build(OWNER);

        let frames = analyze(&method);
        assert_eq!(
            frames[7].as_ref().unwrap().stack.as_slice(),
            &[FrameValue::object()]
        );
    }

    #[test]
    fn loops_reach_a_fixed_point() {
        // sum = 0; for i in 0..n { sum += i }
        let method = MethodBuilder::new("sum", "(I)I")
            .body(vec![
                int(0),
                istore(1),
                int(0),
                istore(2),
                label(0),
                iload(2),
                iload(0),
                if_icmp(Condition::GreaterOrEqual, 1),
                iload(1),
                iload(2),
                iadd(),
                istore(1),
                Instruction::Increment { index: 2, delta: 1 },
                goto(0),
                label(1),
                iload(1),
                ret(ValueKind::Int),
            ])
            .build(OWNER);

        let frames = analyze(&method);
        assert!(frames.iter().all(Option::is_some));
        assert_eq!(
            frames[4].as_ref().unwrap().locals,
            vec![FrameValue::Int, FrameValue::Int, FrameValue::Int]
        );
        assert_eq!(method.stack_map.len(), 2);
    }

    #[test]
    fn unreachable_code_has_no_frame() {
        let method = MethodBuilder::new("f", "()V")
            .body(vec![goto(0), int(1), Instruction::Pop, label(0), ret_void()])
            .build(OWNER);

        let frames = analyze(&method);
        assert!(frames[1].is_none());
        assert!(frames[2].is_none());
        assert!(frames[3].is_some());
    }

    #[test]
    fn array_loads_produce_the_element_type() {
        let method = MethodBuilder::new("f", "([La/B;)La/B;")
            .body(vec![
                aload(0),
                int(0),
                Instruction::ArrayLoad(ValueKind::Reference),
                ret(ValueKind::Reference),
            ])
            .build(OWNER);

        let frames = analyze(&method);
        assert_eq!(
            frames[3].as_ref().unwrap().stack.as_slice(),
            &[FrameValue::Reference(Type::object("a/B"))]
        );
    }

    mod should_fail {
        use super::*;

        #[test]
        fn mismatched_operand_types() {
            let method = MethodBuilder::new("f", "()I")
                .body(vec![int(1), float(2.0), iadd(), ret(ValueKind::Int)])
                .build(OWNER);

            assert!(matches!(
                check_analysis_fails(method),
                AnalysisErrorKind::UnexpectedType { .. }
            ));
        }

        #[test]
        fn shifting_a_float() {
            let method = MethodBuilder::new("f", "()F")
                .body(vec![
                    float(1.0),
                    int(2),
                    Instruction::Binary {
                        op: BinaryOp::ShiftLeft,
                        kind: NumericKind::Float,
                    },
                    ret(ValueKind::Float),
                ])
                .build(OWNER);

            assert!(matches!(
                check_analysis_fails(method),
                AnalysisErrorKind::InvalidOperation { .. }
            ));
        }

        #[test]
        fn incompatible_stack_heights_at_a_join() {
            let method = MethodBuilder::new("f", "(I)V")
                .body(vec![
                    iload(0),
                    Instruction::If {
                        condition: Condition::Equal,
                        target: Label(0),
                    },
                    int(1),
                    label(0),
                    ret_void(),
                ])
                .build(OWNER);

            assert!(matches!(
                check_analysis_fails(method),
                AnalysisErrorKind::IncompatibleStackHeights { .. }
            ));
        }

        #[test]
        fn local_out_of_range() {
            let method = MethodBuilder::new("f", "()V")
                .max_locals(1)
                .body(vec![iload(3), Instruction::Pop, ret_void()])
                .build(OWNER);

            assert!(matches!(
                check_analysis_fails(method),
                AnalysisErrorKind::InvalidLocal { index: 3, .. }
            ));
        }

        #[test]
        fn falling_off_the_end() {
            let method = MethodBuilder::new("f", "()V")
                .body(vec![Instruction::Nop])
                .build(OWNER);

            assert_eq!(check_analysis_fails(method), AnalysisErrorKind::FallOffEnd);
        }

        #[test]
        fn empty_body() {
            let method = MethodBuilder::new("f", "()V").build(OWNER);

            assert_eq!(check_analysis_fails(method), AnalysisErrorKind::FallOffEnd);
        }

        #[test]
        fn subroutines() {
            let method = MethodBuilder::new("f", "()V")
                .body(vec![Instruction::Jsr(Label(0)), label(0), ret_void()])
                .build(OWNER);

            assert_eq!(
                check_analysis_fails(method),
                AnalysisErrorKind::UnsupportedInstruction("Jsr")
            );
        }

        #[test]
        fn exceeding_max_stack() {
            let method = MethodBuilder::new("f", "()V")
                .max_stack(1)
                .body(vec![int(1), int(2), Instruction::Pop2, ret_void()])
                .build(OWNER);

            assert_eq!(
                check_analysis_fails(method),
                AnalysisErrorKind::StackOverflow { max_stack: 1 }
            );
        }

        #[test]
        fn stack_underflow() {
            let method = MethodBuilder::new("f", "()V")
                .body(vec![Instruction::Pop, ret_void()])
                .build(OWNER);

            assert_eq!(check_analysis_fails(method), AnalysisErrorKind::StackUnderflow);
        }

        #[test]
        fn returning_the_wrong_kind() {
            let method = MethodBuilder::new("f", "()J")
                .body(vec![int(1), ret(ValueKind::Int)])
                .build(OWNER);

            assert!(matches!(
                check_analysis_fails(method),
                AnalysisErrorKind::ReturnMismatch(_)
            ));
        }

        #[test]
        fn passing_the_wrong_argument_type() {
            let method = MethodBuilder::new("f", "()V")
                .body(vec![
                    string("x"),
                    invoke_static("a/B", "g", "(La/C;)V"),
                    ret_void(),
                ])
                .build(OWNER);

            assert!(matches!(
                check_analysis_fails(method),
                AnalysisErrorKind::UnexpectedType { .. }
            ));
        }

        #[test]
        fn undefined_label() {
            let method = MethodBuilder::new("f", "()V")
                .body(vec![goto(7)])
                .build(OWNER);

            assert!(matches!(
                check_analysis_fails(method),
                AnalysisErrorKind::Label(_)
            ));
        }
    }
}
