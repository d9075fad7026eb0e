use crate::{Instruction, Label};
use rustc_hash::FxHashMap;
use std::{ops::Index, slice};
use thiserror::Error;

/// Label errors that can be found in an [InstructionList]
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum LabelError {
    #[error("label {0} is placed more than once")]
    Duplicate(Label),
    #[error("label {0} is used but never placed")]
    Undefined(Label),
}

/// A change to be applied by [InstructionList::splice]
///
/// Edits are positioned relative to the list as it was before the splice,
/// so the positions of other edits never need to be adjusted.
#[derive(Clone, Debug, Default)]
pub struct Edit {
    position: usize,
    before: Vec<Instruction>,
    after: Vec<Instruction>,
    remove: bool,
}

impl Edit {
    /// Makes an empty edit at the given position
    pub fn at(position: usize) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Instructions to insert before the instruction at the edit's position
    #[must_use]
    pub fn insert_before(mut self, instructions: Vec<Instruction>) -> Self {
        self.before.extend(instructions);
        self
    }

    /// Instructions to insert after the instruction at the edit's position
    #[must_use]
    pub fn insert_after(mut self, instructions: Vec<Instruction>) -> Self {
        self.after.extend(instructions);
        self
    }

    /// Removes the instruction at the edit's position
    #[must_use]
    pub fn remove(mut self) -> Self {
        self.remove = true;
        self
    }

    fn inserted_len(&self) -> usize {
        self.before.len() + self.after.len()
    }
}

/// The editable instruction sequence of a method body
///
/// Jump targets are expressed with [Label]s rather than offsets, so that the list can be edited
/// without patching jumps.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstructionList {
    instructions: Vec<Instruction>,
    next_label: u32,
}

impl InstructionList {
    /// Makes an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a list from a sequence of instructions
    ///
    /// Newly allocated labels will be distinct from any label used in the instructions.
    pub fn from_instructions(instructions: Vec<Instruction>) -> Self {
        let next_label = instructions
            .iter()
            .flat_map(|instruction| {
                let placed = match instruction {
                    Instruction::Label(label) => Some(*label),
                    _ => None,
                };
                placed.into_iter().chain(instruction.jump_targets())
            })
            .map(|label| label.0 + 1)
            .max()
            .unwrap_or(0);

        Self {
            instructions,
            next_label,
        }
    }

    /// Allocates a new label, unique within the list
    pub fn new_label(&mut self) -> Label {
        let result = Label(self.next_label);
        self.next_label += 1;
        result
    }

    /// Appends an instruction to the end of the list
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// The number of instructions in the list, including labels
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// True if the list contains no instructions
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Returns the instruction at the given position
    pub fn get(&self, position: usize) -> Option<&Instruction> {
        self.instructions.get(position)
    }

    /// Returns an iterator over the list's instructions
    pub fn iter(&self) -> slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    /// Returns the instructions as a slice
    pub fn as_slice(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Consumes the list, returning its instructions
    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }

    /// Returns the positions of all instructions matching the predicate
    pub fn positions(&self, predicate: impl Fn(&Instruction) -> bool) -> Vec<usize> {
        self.instructions
            .iter()
            .enumerate()
            .filter_map(|(i, instruction)| predicate(instruction).then_some(i))
            .collect()
    }

    /// Maps each placed label to its position in the list
    ///
    /// Fails if a label is placed twice, or if a jump refers to a label that isn't placed.
    pub fn label_positions(&self) -> Result<FxHashMap<Label, usize>, LabelError> {
        let mut result = FxHashMap::default();

        for (position, instruction) in self.instructions.iter().enumerate() {
            if let Instruction::Label(label) = instruction {
                if result.insert(*label, position).is_some() {
                    return Err(LabelError::Duplicate(*label));
                }
            }
        }

        for instruction in self.instructions.iter() {
            if let Some(missing) = instruction
                .jump_targets()
                .into_iter()
                .find(|target| !result.contains_key(target))
            {
                return Err(LabelError::Undefined(missing));
            }
        }

        Ok(result)
    }

    /// Applies a set of edits in a single pass
    ///
    /// Each edit's position refers to the list before any of the edits are applied.
    /// Edits at the same position are applied in the order they're provided: their inserted
    /// instructions are concatenated in that order. An edit positioned at the end of the list
    /// appends its instructions.
    pub fn splice(&mut self, mut edits: Vec<Edit>) {
        if edits.is_empty() {
            return;
        }

        // sort_by_key is stable, so edits at the same position keep their order
        edits.sort_by_key(|edit| edit.position);

        let inserted: usize = edits.iter().map(Edit::inserted_len).sum();
        let old = std::mem::take(&mut self.instructions);
        let mut result = Vec::with_capacity(old.len() + inserted);
        let mut edits = edits.into_iter().peekable();

        for (position, instruction) in old.into_iter().enumerate() {
            let mut remove = false;
            let mut after = Vec::new();

            while let Some(edit) = edits.next_if(|edit| edit.position == position) {
                result.extend(edit.before);
                after.extend(edit.after);
                remove |= edit.remove;
            }

            if !remove {
                result.push(instruction);
            }
            result.extend(after);
        }

        for edit in edits {
            result.extend(edit.before);
            result.extend(edit.after);
        }

        self.instructions = result;
    }
}

impl Index<usize> for InstructionList {
    type Output = Instruction;

    fn index(&self, position: usize) -> &Self::Output {
        &self.instructions[position]
    }
}

impl<'a> IntoIterator for &'a InstructionList {
    type Item = &'a Instruction;
    type IntoIter = slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

impl From<Vec<Instruction>> for InstructionList {
    fn from(instructions: Vec<Instruction>) -> Self {
        Self::from_instructions(instructions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Constant;

    fn int(n: i32) -> Instruction {
        Instruction::Const(Constant::Int(n))
    }

    #[test]
    fn new_labels_dont_collide_with_existing_labels() {
        let mut list = InstructionList::from_instructions(vec![Instruction::Goto(Label(4)), Instruction::Label(Label(4))]);
        assert_eq!(list.new_label(), Label(5));
        assert_eq!(list.new_label(), Label(6));
    }

    #[test]
    fn splice_uses_original_positions() {
        let mut list = InstructionList::from_instructions(vec![int(0), int(1), int(2)]);

        list.splice(vec![
            Edit::at(2).insert_before(vec![int(20)]).remove(),
            Edit::at(0).insert_before(vec![int(-1)]),
            Edit::at(1).insert_after(vec![int(10), int(11)]),
            Edit::at(3).insert_before(vec![int(3)]),
        ]);

        assert_eq!(
            list.as_slice(),
            &[int(-1), int(0), int(1), int(10), int(11), int(20), int(3)]
        );
    }

    #[test]
    fn edits_at_the_same_position_keep_their_order() {
        let mut list = InstructionList::from_instructions(vec![Instruction::Nop]);

        list.splice(vec![
            Edit::at(0).insert_before(vec![int(1)]),
            Edit::at(0).insert_before(vec![int(2)]).remove(),
        ]);

        assert_eq!(list.as_slice(), &[int(1), int(2)]);
    }

    #[test]
    fn duplicate_labels_are_reported() {
        let list = InstructionList::from_instructions(vec![Instruction::Label(Label(0)), Instruction::Label(Label(0))]);
        assert_eq!(list.label_positions(), Err(LabelError::Duplicate(Label(0))));
    }

    #[test]
    fn undefined_labels_are_reported() {
        let list = InstructionList::from_instructions(vec![Instruction::Goto(Label(3))]);
        assert_eq!(list.label_positions(), Err(LabelError::Undefined(Label(3))));
    }
}
