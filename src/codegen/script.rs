//! Script code generation.
//!
//! Lowers a type-checked script tree to a [`BinaryScript`]: blocks of
//! abstract instructions with symbolic branch targets. Blocks are
//! created at bind time, so list order is execution-textual order;
//! labels are renumbered at the end so label order and block order
//! agree, which is what the natural-flow pass and the writer rely on.

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::ir::*;
use crate::binding::ConfigGroup;
use crate::semantic::symbol_table::{ConstantValue, ScriptName, SymbolTable};
use crate::semantic::var_scope_group;
use crate::syntax::script::*;
use crate::syntax::{PrimitiveType, StackType};

/// Local slots partitioned by stack type; parameters first.
#[derive(Debug, Default)]
struct LocalMap {
    slots: FxHashMap<SmolStr, (StackType, u16)>,
    int_parameters: u16,
    long_parameters: u16,
    string_parameters: u16,
    int_locals: u16,
    long_locals: u16,
    string_locals: u16,
}

impl LocalMap {
    fn declare_parameter(&mut self, name: &SmolStr, ty: PrimitiveType) {
        let stack = ty.stack_type();
        let slot = match stack {
            StackType::Int => {
                self.int_parameters += 1;
                self.int_parameters - 1
            }
            StackType::Long => {
                self.long_parameters += 1;
                self.long_parameters - 1
            }
            StackType::String => {
                self.string_parameters += 1;
                self.string_parameters - 1
            }
        };
        self.slots.insert(name.clone(), (stack, slot));
    }

    fn declare_local(&mut self, name: &SmolStr, ty: PrimitiveType) -> u16 {
        let stack = ty.stack_type();
        let slot = match stack {
            StackType::Int => {
                self.int_locals += 1;
                self.int_parameters + self.int_locals - 1
            }
            StackType::Long => {
                self.long_locals += 1;
                self.long_parameters + self.long_locals - 1
            }
            StackType::String => {
                self.string_locals += 1;
                self.string_parameters + self.string_locals - 1
            }
        };
        self.slots.insert(name.clone(), (stack, slot));
        slot
    }

    fn slot(&self, name: &str) -> Option<(StackType, u16)> {
        self.slots.get(name).copied()
    }
}

/// Generation state for one script.
struct ScriptGenerator<'a> {
    table: &'a SymbolTable,
    blocks: Vec<Block>,
    working: usize,
    next_label: u32,
    locals: LocalMap,
}

/// Lower a checked script to its binary form. Must only be called
/// for scripts that passed the semantic pass; unresolved names fall
/// back to zero operands rather than aborting.
pub fn generate_script(
    node: &ScriptNode,
    path: &str,
    extension: &str,
    table: &SymbolTable,
) -> BinaryScript {
    let mut generator = ScriptGenerator {
        table,
        blocks: Vec::new(),
        working: 0,
        next_label: 0,
        locals: LocalMap::default(),
    };

    let entry = generator.reserve_label();
    generator.bind(entry);
    for parameter in &node.parameters {
        generator
            .locals
            .declare_parameter(&parameter.name.name, parameter.ty.ty);
    }
    generator.gen_block(&node.body);
    if !generator.ends_with_return() {
        generator.emit(Instruction::core(CoreOpcode::Return, Operand::Int(0)));
    }

    let name = ScriptName::new(node.trigger.name.clone(), node.name.name.clone());
    let mut script = BinaryScript {
        extension: SmolStr::new(extension),
        full_name: name.full(),
        blocks: generator.blocks,
        int_parameters: generator.locals.int_parameters,
        long_parameters: generator.locals.long_parameters,
        string_parameters: generator.locals.string_parameters,
        int_locals: generator.locals.int_locals,
        long_locals: generator.locals.long_locals,
        string_locals: generator.locals.string_locals,
        switches: Vec::new(),
        info: ScriptInfo {
            path: path.to_string(),
            name,
        },
    };
    renumber_labels(&mut script);
    tracing::debug!(name = %script.full_name, blocks = script.blocks.len(), "generated script");
    script
}

/// Rewrite labels so numeric order equals block order.
fn renumber_labels(script: &mut BinaryScript) {
    let mapping: FxHashMap<Label, Label> = script
        .blocks
        .iter()
        .enumerate()
        .map(|(index, block)| (block.label, Label(index as u32)))
        .collect();
    for (index, block) in script.blocks.iter_mut().enumerate() {
        block.label = Label(index as u32);
        for instruction in &mut block.instructions {
            if let Operand::Label(label) = &mut instruction.operand {
                if let Some(new) = mapping.get(label) {
                    *label = *new;
                }
            }
        }
    }
}

impl<'a> ScriptGenerator<'a> {
    fn reserve_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Start a new block for `label`; subsequent instructions land
    /// there.
    fn bind(&mut self, label: Label) {
        self.blocks.push(Block::new(label));
        self.working = self.blocks.len() - 1;
    }

    fn emit(&mut self, instruction: Instruction) {
        self.blocks[self.working].instructions.push(instruction);
    }

    fn ends_with_return(&self) -> bool {
        matches!(
            self.blocks[self.working].instructions.last(),
            Some(Instruction {
                op: Op::Core(CoreOpcode::Return),
                ..
            })
        )
    }

    /// Branch to `label` unless the working block already returned.
    fn branch_to(&mut self, label: Label) {
        if !self.ends_with_return() {
            self.emit(Instruction::core(CoreOpcode::Branch, Operand::Label(label)));
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn gen_block(&mut self, block: &BlockStmt) {
        for stmt in &block.statements {
            self.gen_stmt(stmt);
        }
    }

    fn gen_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(block) => self.gen_block(block),
            Stmt::If(stmt) => self.gen_if(stmt),
            Stmt::While(stmt) => self.gen_while(stmt),
            Stmt::Return(stmt) => {
                for value in &stmt.values {
                    self.gen_expr(value);
                }
                self.emit(Instruction::core(CoreOpcode::Return, Operand::Int(0)));
            }
            Stmt::VarDecl(stmt) => self.gen_var_decl(stmt),
            Stmt::Assign(stmt) => {
                self.gen_expr(&stmt.value);
                // Values sit on the stack left-to-right; pop targets
                // in reverse.
                for target in stmt.targets.iter().rev() {
                    self.gen_store(target);
                }
            }
            Stmt::Expr(stmt) => self.gen_expr(&stmt.expr),
        }
    }

    fn gen_if(&mut self, stmt: &IfStmt) {
        let true_label = self.reserve_label();
        match &stmt.else_body {
            None => {
                let false_label = self.reserve_label();
                self.gen_condition(&stmt.condition, true_label, false_label);
                self.bind(true_label);
                self.gen_block(&stmt.then_body);
                self.branch_to(false_label);
                self.bind(false_label);
            }
            Some(else_body) => {
                let else_label = self.reserve_label();
                let end_label = self.reserve_label();
                self.gen_condition(&stmt.condition, true_label, else_label);
                self.bind(true_label);
                self.gen_block(&stmt.then_body);
                self.branch_to(end_label);
                self.bind(else_label);
                self.gen_stmt(else_body);
                self.branch_to(end_label);
                self.bind(end_label);
            }
        }
    }

    fn gen_while(&mut self, stmt: &WhileStmt) {
        let head_label = self.reserve_label();
        let body_label = self.reserve_label();
        let exit_label = self.reserve_label();
        self.branch_to(head_label);
        self.bind(head_label);
        self.gen_condition(&stmt.condition, body_label, exit_label);
        self.bind(body_label);
        self.gen_block(&stmt.body);
        self.branch_to(head_label);
        self.bind(exit_label);
    }

    fn gen_var_decl(&mut self, stmt: &VarDeclStmt) {
        match &stmt.initializer {
            Some(initializer) => self.gen_expr(initializer),
            None => self.gen_default_value(stmt.ty.ty),
        }
        let slot = self.locals.declare_local(&stmt.name.name, stmt.ty.ty);
        let op = match stmt.ty.ty.stack_type() {
            StackType::Int => CoreOpcode::PopIntLocal,
            StackType::Long => CoreOpcode::PopLongLocal,
            StackType::String => CoreOpcode::PopStringLocal,
        };
        self.emit(Instruction::core(op, Operand::Local(slot)));
    }

    fn gen_default_value(&mut self, ty: PrimitiveType) {
        match ty.stack_type() {
            StackType::Int => {
                self.emit(Instruction::core(CoreOpcode::PushIntConstant, Operand::Int(0)));
            }
            StackType::Long => {
                self.emit(Instruction::core(
                    CoreOpcode::PushLongConstant,
                    Operand::Long(0),
                ));
            }
            StackType::String => {
                self.emit(Instruction::core(
                    CoreOpcode::PushStringConstant,
                    Operand::Str(SmolStr::default()),
                ));
            }
        }
    }

    /// Lower a condition into a conditional branch to `true_label`
    /// and an unconditional branch to `false_label`.
    fn gen_condition(&mut self, condition: &Expr, true_label: Label, false_label: Label) {
        match condition {
            Expr::Binary(binary) if binary.op.is_comparison() => {
                self.gen_expr(&binary.lhs);
                self.gen_expr(&binary.rhs);
                let op = match binary.op {
                    BinaryOp::Equal => CoreOpcode::BranchEquals,
                    BinaryOp::LessThan => CoreOpcode::BranchLessThan,
                    BinaryOp::GreaterThan => CoreOpcode::BranchGreaterThan,
                    BinaryOp::LessThanOrEqual => CoreOpcode::BranchLessThanOrEquals,
                    _ => CoreOpcode::BranchGreaterThanOrEquals,
                };
                self.emit(Instruction::core(op, Operand::Label(true_label)));
            }
            other => {
                self.gen_expr(other);
                self.emit(Instruction::core(
                    CoreOpcode::BranchIfTrue,
                    Operand::Label(true_label),
                ));
            }
        }
        self.emit(Instruction::core(
            CoreOpcode::Branch,
            Operand::Label(false_label),
        ));
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn gen_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Int(lit) => {
                self.emit(Instruction::core(
                    CoreOpcode::PushIntConstant,
                    Operand::Int(lit.value),
                ));
            }
            Expr::Bool(lit) => {
                self.emit(Instruction::core(
                    CoreOpcode::PushIntConstant,
                    Operand::Int(lit.value as i32),
                ));
            }
            Expr::CoordGrid(lit) => {
                self.emit(Instruction::core(
                    CoreOpcode::PushIntConstant,
                    Operand::Int(lit.value),
                ));
            }
            Expr::Long(lit) => {
                self.emit(Instruction::core(
                    CoreOpcode::PushLongConstant,
                    Operand::Long(lit.value),
                ));
            }
            Expr::Str(lit) => {
                self.emit(Instruction::core(
                    CoreOpcode::PushStringConstant,
                    Operand::Str(SmolStr::new(&lit.value)),
                ));
            }
            Expr::Concat(concat) => {
                for part in &concat.parts {
                    self.gen_expr(part);
                }
                self.emit(Instruction::core(
                    CoreOpcode::JoinString,
                    Operand::Int(concat.parts.len() as i32),
                ));
            }
            Expr::ConstantRef(ident) => self.gen_constant(ident),
            Expr::Var(var) => self.gen_load(var),
            Expr::Gosub(call) => {
                for argument in &call.arguments {
                    self.gen_expr(argument);
                }
                let name = ScriptName::new("proc", call.name.name.clone());
                let operand = match self
                    .table
                    .lookup_script(&name)
                    .and_then(|symbol| symbol.predefined_id)
                {
                    Some(id) => Operand::Int(id),
                    None => Operand::Symbol {
                        group: ConfigGroup::new("script"),
                        name: name.full(),
                    },
                };
                self.emit(Instruction::core(CoreOpcode::GosubWithParams, operand));
            }
            Expr::Command(call) => {
                for argument in &call.arguments {
                    self.gen_expr(argument);
                }
                let opcode = self
                    .table
                    .lookup_command(&call.name.name)
                    .map(|symbol| symbol.opcode)
                    .unwrap_or_default();
                self.emit(Instruction::command(opcode, call.alternative));
            }
            Expr::Binary(binary) => {
                self.gen_expr(&binary.lhs);
                self.gen_expr(&binary.rhs);
                let op = match binary.op {
                    BinaryOp::Add => CoreOpcode::Add,
                    BinaryOp::Sub => CoreOpcode::Sub,
                    BinaryOp::Mul => CoreOpcode::Mul,
                    BinaryOp::Div => CoreOpcode::Div,
                    BinaryOp::Mod => CoreOpcode::Mod,
                    // Comparisons never reach value position past the
                    // semantic pass.
                    _ => CoreOpcode::BranchEquals,
                };
                self.emit(Instruction::core(op, Operand::Int(0)));
            }
            Expr::Calc(calc) => self.gen_expr(&calc.expr),
        }
    }

    fn gen_constant(&mut self, ident: &Ident) {
        let Some(constant) = self.table.lookup_constant(&ident.name) else {
            self.emit(Instruction::core(CoreOpcode::PushIntConstant, Operand::Int(0)));
            return;
        };
        let instruction = match &constant.value {
            ConstantValue::Int(value) => {
                Instruction::core(CoreOpcode::PushIntConstant, Operand::Int(*value))
            }
            ConstantValue::Boolean(value) => {
                Instruction::core(CoreOpcode::PushIntConstant, Operand::Int(*value as i32))
            }
            ConstantValue::Long(value) => {
                Instruction::core(CoreOpcode::PushLongConstant, Operand::Long(*value))
            }
            ConstantValue::String(value) => {
                Instruction::core(CoreOpcode::PushStringConstant, Operand::Str(value.clone()))
            }
        };
        self.emit(instruction);
    }

    fn gen_load(&mut self, var: &VarRef) {
        match var_scope_group(var.scope) {
            None => {
                let Some((stack, slot)) = self.locals.slot(&var.name.name) else {
                    self.emit(Instruction::core(CoreOpcode::PushIntConstant, Operand::Int(0)));
                    return;
                };
                let op = match stack {
                    StackType::Int => CoreOpcode::PushIntLocal,
                    StackType::Long => CoreOpcode::PushLongLocal,
                    StackType::String => CoreOpcode::PushStringLocal,
                };
                self.emit(Instruction::core(op, Operand::Local(slot)));
            }
            Some((group, _)) => {
                let op = match var.scope {
                    VarScope::Player => CoreOpcode::PushVarp,
                    VarScope::PlayerBit => CoreOpcode::PushVarpBit,
                    VarScope::ClientInt => CoreOpcode::PushVarcInt,
                    _ => CoreOpcode::PushVarcString,
                };
                self.emit(Instruction::core(
                    op,
                    Operand::Symbol {
                        group,
                        name: var.name.name.clone(),
                    },
                ));
            }
        }
    }

    fn gen_store(&mut self, var: &VarRef) {
        match var_scope_group(var.scope) {
            None => {
                let Some((stack, slot)) = self.locals.slot(&var.name.name) else {
                    return;
                };
                let op = match stack {
                    StackType::Int => CoreOpcode::PopIntLocal,
                    StackType::Long => CoreOpcode::PopLongLocal,
                    StackType::String => CoreOpcode::PopStringLocal,
                };
                self.emit(Instruction::core(op, Operand::Local(slot)));
            }
            Some((group, _)) => {
                let op = match var.scope {
                    VarScope::Player => CoreOpcode::PopVarp,
                    VarScope::PlayerBit => CoreOpcode::PopVarpBit,
                    VarScope::ClientInt => CoreOpcode::PopVarcInt,
                    _ => CoreOpcode::PopVarcString,
                };
                self.emit(Instruction::core(
                    op,
                    Operand::Symbol {
                        group,
                        name: var.name.name.clone(),
                    },
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::LexicalTable;
    use crate::parser::parse_script_file;

    fn generate(source: &str) -> BinaryScript {
        let lexical = LexicalTable::script();
        let parse = parse_script_file(source, &lexical);
        assert!(parse.ok(), "parse diagnostics: {:?}", parse.diagnostics);
        let table = SymbolTable::new();
        generate_script(&parse.value.scripts[0], "test.hsc", "hsc", &table)
    }

    #[test]
    fn test_empty_body_emits_single_return() {
        let script = generate("[proc,empty] {}");
        assert_eq!(script.blocks.len(), 1);
        assert_eq!(
            script.blocks[0].instructions,
            vec![Instruction::core(CoreOpcode::Return, Operand::Int(0))]
        );
    }

    #[test]
    fn test_hello_world_instructions() {
        let script = generate(r#"[proc,hello](string $s) { return("hi"); }"#);
        assert_eq!(script.blocks.len(), 1);
        assert_eq!(
            script.blocks[0].instructions,
            vec![
                Instruction::core(CoreOpcode::PushStringConstant, Operand::Str("hi".into())),
                Instruction::core(CoreOpcode::Return, Operand::Int(0)),
            ]
        );
        assert_eq!(script.string_parameters, 1);
        assert_eq!(script.string_locals, 0);
    }

    #[test]
    fn test_no_trailing_return_after_explicit_return() {
        let script = generate("[proc,r] { return; }");
        let returns = script
            .instructions()
            .filter(|i| i.op == Op::Core(CoreOpcode::Return))
            .count();
        assert_eq!(returns, 1);
    }

    #[test]
    fn test_if_lowering_shape() {
        let script = generate("[proc,p](int $x) { if ($x < 3) { return(1); } return(2); }");
        // entry, true block, false/continuation block
        assert_eq!(script.blocks.len(), 3);
        let entry = &script.blocks[0];
        assert_eq!(
            entry.instructions[entry.instructions.len() - 2],
            Instruction::core(CoreOpcode::BranchLessThan, Operand::Label(Label(1)))
        );
        assert_eq!(
            entry.instructions[entry.instructions.len() - 1],
            Instruction::core(CoreOpcode::Branch, Operand::Label(Label(2)))
        );
    }

    #[test]
    fn test_if_else_block_order_is_textual() {
        let script = generate(
            "[proc,p](int $x) { if ($x < 3) { return(1); } else { return(2); } }",
        );
        // entry, true, else, end (end unreachable until dead-block runs)
        assert_eq!(script.blocks.len(), 4);
        let labels: Vec<_> = script.blocks.iter().map(|b| b.label.0).collect();
        assert_eq!(labels, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_while_lowering_shape() {
        let script = generate("[proc,w](int $x) { while ($x < 3) { ~noop; } }");
        // entry, head, body, exit
        assert_eq!(script.blocks.len(), 4);
        let body = &script.blocks[2];
        // body loops back to the head
        assert_eq!(
            body.instructions.last(),
            Some(&Instruction::core(CoreOpcode::Branch, Operand::Label(Label(1))))
        );
    }

    #[test]
    fn test_var_decl_default_value() {
        let script = generate("[proc,d] { def_int $a; def_string $s; }");
        let instructions: Vec<_> = script.instructions().cloned().collect();
        assert_eq!(
            instructions[0],
            Instruction::core(CoreOpcode::PushIntConstant, Operand::Int(0))
        );
        assert_eq!(
            instructions[1],
            Instruction::core(CoreOpcode::PopIntLocal, Operand::Local(0))
        );
        assert_eq!(
            instructions[2],
            Instruction::core(CoreOpcode::PushStringConstant, Operand::Str("".into()))
        );
        assert_eq!(
            instructions[3],
            Instruction::core(CoreOpcode::PopStringLocal, Operand::Local(0))
        );
    }

    #[test]
    fn test_parameters_take_slots_before_locals() {
        let script = generate("[proc,s](int $a) { def_int $b; }");
        assert_eq!(script.int_parameters, 1);
        assert_eq!(script.int_locals, 1);
        let pop = script
            .instructions()
            .find(|i| i.op == Op::Core(CoreOpcode::PopIntLocal))
            .expect("pop instruction");
        assert_eq!(pop.operand, Operand::Local(1));
    }

    #[test]
    fn test_concat_emits_join_string() {
        let script = generate(
            r#"[proc,c](string $who) { return("hello <$who>"); }"#,
        );
        let join = script
            .instructions()
            .find(|i| i.op == Op::Core(CoreOpcode::JoinString))
            .expect("join instruction");
        assert_eq!(join.operand, Operand::Int(2));
    }

    #[test]
    fn test_global_store_uses_symbol_operand() {
        let script = generate("[proc,g] { %energy = 5; }");
        let pop = script
            .instructions()
            .find(|i| i.op == Op::Core(CoreOpcode::PopVarp))
            .expect("pop varp");
        assert_eq!(
            pop.operand,
            Operand::Symbol {
                group: ConfigGroup::new("varp"),
                name: "energy".into()
            }
        );
    }

    #[test]
    fn test_calc_lowering() {
        let script = generate("[proc,c](int $x)(int) { return(calc($x + 2 * 3)); }");
        let ops: Vec<_> = script.instructions().map(|i| i.op).collect();
        assert!(ops.contains(&Op::Core(CoreOpcode::Mul)));
        assert!(ops.contains(&Op::Core(CoreOpcode::Add)));
        // multiplication binds tighter, so it executes first
        let mul = ops.iter().position(|o| *o == Op::Core(CoreOpcode::Mul));
        let add = ops.iter().position(|o| *o == Op::Core(CoreOpcode::Add));
        assert!(mul < add);
    }
}
