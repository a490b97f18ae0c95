//! Optimization passes over a [`BinaryScript`].
//!
//! Three passes, applied once, in order: natural-flow folding,
//! dead-branch elimination, dead-block elimination. Each pass is
//! individually idempotent; no fixed-point iteration happens.

use rustc_hash::FxHashSet;

use super::ir::*;

pub struct Optimizer;

impl Optimizer {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, script: &mut BinaryScript) {
        natural_flow(script);
        dead_branch(script);
        dead_block(script);
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop an unconditional branch whose target is the textually next
/// block.
pub fn natural_flow(script: &mut BinaryScript) {
    for i in 0..script.blocks.len().saturating_sub(1) {
        let next_label = script.blocks[i + 1].label;
        let block = &mut script.blocks[i];
        if let Some(Instruction {
            op: Op::Core(CoreOpcode::Branch),
            operand: Operand::Label(target),
        }) = block.instructions.last()
        {
            if *target == next_label {
                block.instructions.pop();
            }
        }
    }
}

/// Fold conditional branches whose operands are integer constants,
/// then drop anything that follows an unconditional terminator
/// within the block.
pub fn dead_branch(script: &mut BinaryScript) {
    for block in &mut script.blocks {
        let instructions = std::mem::take(&mut block.instructions);
        let mut out = Vec::with_capacity(instructions.len());
        let mut i = 0;
        while i < instructions.len() {
            if i + 2 < instructions.len() {
                if let (Some(lhs), Some(rhs), Some((comparison, target))) = (
                    constant_int(&instructions[i]),
                    constant_int(&instructions[i + 1]),
                    comparison_branch(&instructions[i + 2]),
                ) {
                    if evaluate(comparison, lhs, rhs) {
                        out.push(Instruction::core(
                            CoreOpcode::Branch,
                            Operand::Label(target),
                        ));
                    }
                    i += 3;
                    continue;
                }
            }
            out.push(instructions[i].clone());
            i += 1;
        }
        // Truncate past the first unconditional terminator.
        if let Some(end) = out.iter().position(is_terminator) {
            out.truncate(end + 1);
        }
        block.instructions = out;
    }
}

/// Remove blocks unreachable from the entry block.
pub fn dead_block(script: &mut BinaryScript) {
    let Some(entry) = script.blocks.first().map(|b| b.label) else {
        return;
    };
    let mut reachable: FxHashSet<Label> = FxHashSet::default();
    let mut queue = vec![entry];
    while let Some(label) = queue.pop() {
        if !reachable.insert(label) {
            continue;
        }
        let Some(block) = script.blocks.iter().find(|b| b.label == label) else {
            continue;
        };
        let index = script.blocks.iter().position(|b| b.label == label);
        // Fallthrough into the next block counts as an edge unless the
        // block ends in an unconditional terminator.
        if let Some(index) = index {
            let falls_through = !block.instructions.last().is_some_and(is_terminator);
            if falls_through {
                if let Some(next) = script.blocks.get(index + 1) {
                    queue.push(next.label);
                }
            }
        }
        for instruction in &block.instructions {
            if let Operand::Label(target) = instruction.operand {
                queue.push(target);
            }
        }
    }
    script.blocks.retain(|block| reachable.contains(&block.label));
    // Removal can make a branch target the textually next block; fold
    // those so a second application of the pipeline is a no-op.
    natural_flow(script);
}

fn constant_int(instruction: &Instruction) -> Option<i32> {
    match instruction {
        Instruction {
            op: Op::Core(CoreOpcode::PushIntConstant),
            operand: Operand::Int(value),
        } => Some(*value),
        _ => None,
    }
}

fn comparison_branch(instruction: &Instruction) -> Option<(CoreOpcode, Label)> {
    match instruction {
        Instruction {
            op: Op::Core(op),
            operand: Operand::Label(target),
        } if matches!(
            op,
            CoreOpcode::BranchEquals
                | CoreOpcode::BranchLessThan
                | CoreOpcode::BranchGreaterThan
                | CoreOpcode::BranchLessThanOrEquals
                | CoreOpcode::BranchGreaterThanOrEquals
        ) =>
        {
            Some((*op, *target))
        }
        _ => None,
    }
}

fn evaluate(comparison: CoreOpcode, lhs: i32, rhs: i32) -> bool {
    match comparison {
        CoreOpcode::BranchEquals => lhs == rhs,
        CoreOpcode::BranchLessThan => lhs < rhs,
        CoreOpcode::BranchGreaterThan => lhs > rhs,
        CoreOpcode::BranchLessThanOrEquals => lhs <= rhs,
        CoreOpcode::BranchGreaterThanOrEquals => lhs >= rhs,
        _ => false,
    }
}

fn is_terminator(instruction: &Instruction) -> bool {
    matches!(
        instruction.op,
        Op::Core(CoreOpcode::Branch) | Op::Core(CoreOpcode::Return)
    )
}
