use crate::{
    ContinuationPoint, Error, PointKind, Result, VariableTable, codegen, locator, metadata,
    variable_table::EXTRA_SLOTS,
};
use coil_bytecode::{
    Analyzer, Condition, Constant, Edit, FrameValue, Instruction, InvokeKind, Label, Method,
    ValueKind,
    continuation::{self, MODE_SAVING},
};
use tracing::debug;

const UNRECOGNIZED_MODE: &str = "unrecognized continuation mode";
const UNEXPECTED_SAVING: &str = "unexpected continuation mode (saving isn't allowed on entry)";
const UNRECOGNIZED_POINT: &str = "unrecognized continuation point id";

/// Turns an eligible method into a resumable state machine
///
/// The transformed method starts with a prologue that dispatches on the capability's mode:
///
/// ```text
/// cache the capability parameter
/// switch mode
///   NORMAL  -> goto start
///   SAVING  -> throw
///   LOADING -> pop the method state
///              switch point id
///                each point -> restore the stack and locals, goto the point's restore label
///                default    -> throw
///   default -> throw
/// start:
///   the original body, with save code spliced in at each continuation point
/// ```
pub struct MethodTransformer<'a> {
    owner: &'a str,
    method: Method,
    table: VariableTable,
    points: Vec<ContinuationPoint>,
}

impl<'a> MethodTransformer<'a> {
    /// Transforms a copy of the method, leaving the original untouched
    ///
    /// The result has its max stack, max locals and stack map recomputed, and has passed analysis.
    pub fn transform(owner: &'a str, method: &Method) -> Result<Method> {
        locator::check_supported(method)?;

        let frames = Analyzer::analyze(owner, method).map_err(|source| Error::Analysis {
            method: method.signature(),
            transformed: false,
            source,
        })?;

        let needed = method.max_locals as u32 + EXTRA_SLOTS;
        if needed > u16::MAX as u32 {
            return Err(Error::LimitExceeded {
                method: method.signature(),
                limit: "local slots",
                needed: needed as usize,
            });
        }

        let mut method = method.clone();
        let table = VariableTable::new(method.access, method.max_locals);
        let points = locator::locate(
            &mut method.instructions,
            &frames,
            &method.descriptor.returns,
        );

        debug!(
            method = %method.signature(),
            points = points.len(),
            "transforming"
        );

        let mut transformer = Self {
            owner,
            method,
            table,
            points,
        };

        transformer.splice();
        transformer.finish()
    }

    fn splice(&mut self) {
        let mut edits = Vec::with_capacity(self.points.len() + 1);
        edits.push(Edit::at(0).insert_before(self.prologue()));

        for point in self.points.iter() {
            let edit = match point.kind {
                PointKind::Suspend => Edit::at(point.position)
                    .insert_before(self.suspend_block(point))
                    .remove(),
                PointKind::Save => {
                    let continue_label = self.method.instructions.new_label();
                    Edit::at(point.position)
                        .insert_before(self.save_block(point))
                        .insert_after(self.after_save_call(point, continue_label))
                }
            };
            edits.push(edit);
        }

        self.method.instructions.splice(edits);
    }

    fn finish(mut self) -> Result<Method> {
        self.method.max_locals = self.table.max_locals() as u16;
        metadata::recompute(self.owner, &mut self.method)?;
        Ok(self.method)
    }

    fn prologue(&mut self) -> Vec<Instruction> {
        let table = &self.table;
        let instructions = &mut self.method.instructions;

        let start = instructions.new_label();
        let loading = instructions.new_label();
        let saving = instructions.new_label();
        let bad_mode = instructions.new_label();
        let bad_point = instructions.new_label();
        let load_labels: Vec<Label> = self.points.iter().map(|_| instructions.new_label()).collect();

        let mut result = vec![
            Instruction::Load {
                kind: ValueKind::Reference,
                index: table.continuation_param,
            },
            Instruction::Store {
                kind: ValueKind::Reference,
                index: table.continuation,
            },
        ];

        codegen::get_mode(table, &mut result);
        // Indexed by mode: NORMAL, SAVING, LOADING
        result.push(Instruction::TableSwitch {
            low: 0,
            default: bad_mode,
            targets: vec![start, saving, loading],
        });

        result.push(Instruction::Label(loading));
        codegen::pop_method_state(table, &mut result);
        result.push(Instruction::Load {
            kind: ValueKind::Reference,
            index: table.temp,
        });
        result.push(Instruction::Invoke {
            kind: InvokeKind::Virtual,
            method: continuation::get_continuation_point(),
        });
        result.push(Instruction::TableSwitch {
            low: 0,
            default: bad_point,
            targets: load_labels.clone(),
        });

        for (point, load_label) in self.points.iter().zip(load_labels) {
            result.push(Instruction::Label(load_label));
            codegen::load_operand_stack(table, restored_stack(point), &mut result);
            codegen::load_locals(table, &point.frame.locals, &mut result);
            result.push(Instruction::Goto(point.restore_label));
        }

        result.push(Instruction::Label(bad_mode));
        codegen::throw_fault(UNRECOGNIZED_MODE, &mut result);
        result.push(Instruction::Label(saving));
        codegen::throw_fault(UNEXPECTED_SAVING, &mut result);
        result.push(Instruction::Label(bad_point));
        codegen::throw_fault(UNRECOGNIZED_POINT, &mut result);

        result.push(Instruction::Label(start));
        result
    }

    // Replaces a suspend invocation
    //
    // The capability receiver is dropped, the state is saved and pushed, and the method returns
    // in SAVING mode. Resumed execution continues from the restore label.
    fn suspend_block(&self, point: &ContinuationPoint) -> Vec<Instruction> {
        let table = &self.table;
        let mut result = vec![Instruction::Pop];

        codegen::save_operand_stack(table, restored_stack(point), false, &mut result);
        codegen::save_locals(table, &point.frame.locals, &mut result);
        codegen::push_method_state(table, point.id, &mut result);
        codegen::set_mode(table, MODE_SAVING, &mut result);
        codegen::return_dummy(&point.returns, &mut result);
        result.push(Instruction::Label(point.restore_label));

        result
    }

    // Inserted before an invocation of a method that may suspend
    //
    // The stack and locals are snapshotted and the stack is reloaded for the call.
    // Resumed execution re-issues the call from the restore label.
    fn save_block(&self, point: &ContinuationPoint) -> Vec<Instruction> {
        let table = &self.table;
        let mut result = Vec::new();

        codegen::save_operand_stack(table, &point.frame.stack, true, &mut result);
        codegen::save_locals(table, &point.frame.locals, &mut result);
        result.push(Instruction::Label(point.restore_label));

        result
    }

    // Inserted after an invocation of a method that may suspend
    //
    // If the callee suspended then the snapshot is pushed and the method returns, otherwise
    // execution continues.
    fn after_save_call(&self, point: &ContinuationPoint, continue_label: Label) -> Vec<Instruction> {
        let table = &self.table;
        let mut result = Vec::new();

        codegen::get_mode(table, &mut result);
        result.push(Instruction::Const(Constant::Int(MODE_SAVING)));
        result.push(Instruction::IfCompare {
            condition: Condition::NotEqual,
            target: continue_label,
        });
        codegen::push_method_state(table, point.id, &mut result);
        codegen::return_dummy(&point.returns, &mut result);
        result.push(Instruction::Label(continue_label));

        result
    }
}

// The operand stack that's live at a point's restore label
//
// For suspend points the capability receiver is consumed by the removed invocation.
fn restored_stack(point: &ContinuationPoint) -> &[FrameValue] {
    match point.kind {
        PointKind::Suspend => {
            let stack = point.frame.stack.as_slice();
            &stack[..stack.len().saturating_sub(1)]
        }
        PointKind::Save => point.frame.stack.as_slice(),
    }
}
