use crate::{Error, Result};
use coil_bytecode::{
    Instruction, InstructionList, InvokeKind, Label, Method, Type, VerifiedFrame, continuation,
};
use tracing::{debug, trace};

/// The two kinds of continuation points
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointKind {
    /// A direct invocation of the suspend primitive
    Suspend,
    /// An invocation of another method that may suspend
    Save,
}

/// A position in a method where execution may be suspended and later resumed
#[derive(Clone, Debug, PartialEq)]
pub struct ContinuationPoint {
    /// The point's id, dense and unique within the method
    pub id: i32,
    /// The kind of point
    pub kind: PointKind,
    /// The position of the invocation in the original instruction list
    pub position: usize,
    /// The frame at the invocation
    pub frame: VerifiedFrame,
    /// The label that resumed execution jumps to
    pub restore_label: Label,
    /// The return type of the method containing the point
    pub returns: Option<Type>,
}

/// Fails if the method contains instructions that can't be carried across a suspension
pub fn check_supported(method: &Method) -> Result<()> {
    let unsupported = method.instructions.iter().enumerate().find(|(_, instruction)| {
        matches!(
            instruction,
            Instruction::Jsr(_)
                | Instruction::Ret(_)
                | Instruction::MonitorEnter
                | Instruction::MonitorExit
        )
    });

    match unsupported {
        Some((position, instruction)) => Err(Error::UnsupportedConstruct {
            method: method.signature(),
            instruction: instruction.name(),
            position,
        }),
        None => Ok(()),
    }
}

/// Finds and numbers the continuation points in an analyzed method
///
/// Suspend points are numbered first, then save points, each in instruction order.
/// Invocations in unreachable code are left alone. Restore labels are allocated from
/// `instructions`, which must be the list that `frames` was computed for.
pub fn locate(
    instructions: &mut InstructionList,
    frames: &[Option<VerifiedFrame>],
    returns: &Option<Type>,
) -> Vec<ContinuationPoint> {
    let suspend = continuation::suspend();

    let is_suspend =
        |instruction: &Instruction| instruction.invokes(InvokeKind::Virtual, &suspend);
    let is_save = |instruction: &Instruction| {
        instruction
            .invoked_method()
            .is_some_and(|(_, method)| continuation::is_eligible(&method.descriptor))
    };

    let suspend_positions = instructions.positions(is_suspend);
    let save_positions = instructions.positions(is_save);

    let mut result = Vec::with_capacity(suspend_positions.len() + save_positions.len());

    let points = suspend_positions
        .into_iter()
        .map(|position| (PointKind::Suspend, position))
        .chain(
            save_positions
                .into_iter()
                .map(|position| (PointKind::Save, position)),
        );

    for (kind, position) in points {
        let Some(frame) = &frames[position] else {
            trace!(position, "skipping unreachable invocation");
            continue;
        };

        let id = result.len() as i32;
        debug!(id, ?kind, position, "found continuation point");

        result.push(ContinuationPoint {
            id,
            kind,
            position,
            frame: frame.clone(),
            restore_label: instructions.new_label(),
            returns: returns.clone(),
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use coil_bytecode::{Analyzer, ValueKind};
    use coil_test_utils::{MethodBuilder, asm::*};

    const OWNER: &str = "test/Locator";

    fn locate_points(method: &mut Method) -> Vec<ContinuationPoint> {
        let frames = Analyzer::analyze(OWNER, method).unwrap();
        locate(&mut method.instructions, &frames, &method.descriptor.returns)
    }

    #[test]
    fn suspend_points_are_numbered_before_save_points() {
        let mut method = MethodBuilder::new("run", "(Lcoil/Continuation;)V")
            .body(vec![
                aload(0),
                invoke_static("test/Other", "step", "(Lcoil/Continuation;)V"),
                aload(0),
                suspend(),
                aload(0),
                int(1),
                invoke_static("test/Other", "step2", "(Lcoil/Continuation;I)I"),
                Instruction::Pop,
                aload(0),
                suspend(),
                ret_void(),
            ])
            .build(OWNER);

        let points = locate_points(&mut method);

        let summary: Vec<_> = points
            .iter()
            .map(|point| (point.id, point.kind, point.position))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, PointKind::Suspend, 3),
                (1, PointKind::Suspend, 9),
                (2, PointKind::Save, 1),
                (3, PointKind::Save, 6),
            ]
        );

        let labels: Vec<_> = points.iter().map(|point| point.restore_label).collect();
        assert!(labels.iter().all(|label| labels.iter().filter(|l| *l == label).count() == 1));
    }

    #[test]
    fn points_capture_the_frame_at_the_invocation() {
        let mut method = MethodBuilder::new("run", "(Lcoil/Continuation;J)J")
            .body(vec![
                int(7),
                aload(0),
                suspend(),
                Instruction::Pop,
                load(ValueKind::Long, 1),
                ret(ValueKind::Long),
            ])
            .build(OWNER);

        let points = locate_points(&mut method);

        assert_eq!(points.len(), 1);
        let point = &points[0];
        assert_eq!(point.frame.stack.len(), 2);
        assert_eq!(point.returns, Some(Type::Long));
    }

    #[test]
    fn unreachable_invocations_are_skipped() {
        let mut method = MethodBuilder::new("run", "(Lcoil/Continuation;)V")
            .body(vec![
                goto(0),
                aload(0),
                suspend(),
                label(0),
                ret_void(),
            ])
            .build(OWNER);

        assert!(locate_points(&mut method).is_empty());
    }

    #[test]
    fn monitors_are_unsupported() {
        let method = MethodBuilder::new("run", "(Lcoil/Continuation;)V")
            .body(vec![
                aload(0),
                Instruction::MonitorEnter,
                aload(0),
                Instruction::MonitorExit,
                ret_void(),
            ])
            .build(OWNER);

        assert_eq!(
            check_supported(&method),
            Err(Error::UnsupportedConstruct {
                method: "run(Lcoil/Continuation;)V".into(),
                instruction: "MonitorEnter",
                position: 1,
            })
        );
    }
}
