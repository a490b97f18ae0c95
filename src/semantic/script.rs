//! Semantic checking for the script dialect.

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use text_size::TextRange;

use super::symbol_table::{ScriptName, ScriptSymbol, SymbolTable};
use super::{scope_sigil, var_scope_group};
use crate::catalog::TriggerCatalog;
use crate::diagnostics::{DiagnosticKind, Reporter};
use crate::syntax::script::*;
use crate::syntax::{PrimitiveType, StackType, TypeTuple};

/// Pre-pass: declare a script's symbol so later files can call it.
pub fn declare_script(
    node: &ScriptNode,
    table: &mut SymbolTable,
    allow_override: bool,
    reporter: &mut Reporter,
) {
    let symbol = ScriptSymbol {
        name: ScriptName::new(node.trigger.name.clone(), node.name.name.clone()),
        parameters: node.parameters.iter().map(|p| p.ty.ty).collect(),
        returns: node.returns.iter().map(|t| t.ty).collect(),
        predefined_id: None,
    };
    let name = symbol.name.clone();
    if !table.declare_script(symbol, allow_override) {
        reporter.error(
            DiagnosticKind::DuplicateDeclaration,
            node.name.range,
            format!("script '{}' is already declared", name),
        );
    }
}

/// Per-script frame: parameters first, then declared locals.
#[derive(Default)]
struct Frame {
    locals: FxHashMap<SmolStr, PrimitiveType>,
}

/// What return statements must match: the declared tuple when the
/// signature carried one, or the shape of the first return statement
/// otherwise.
struct ReturnShape {
    explicit: bool,
    expected: Option<TypeTuple>,
}

/// Main-pass checker for one batch; resolves names against the batch
/// table and infers expression types bottom-up.
pub struct ScriptChecker<'a> {
    table: &'a SymbolTable,
    triggers: &'a TriggerCatalog,
}

impl<'a> ScriptChecker<'a> {
    pub fn new(table: &'a SymbolTable, triggers: &'a TriggerCatalog) -> Self {
        Self { table, triggers }
    }

    pub fn check(&self, node: &ScriptNode, reporter: &mut Reporter) {
        tracing::debug!(trigger = %node.trigger.name, name = %node.name.name, "check script");
        self.check_trigger(node, reporter);

        let mut frame = Frame::default();
        for parameter in &node.parameters {
            if frame
                .locals
                .insert(parameter.name.name.clone(), parameter.ty.ty)
                .is_some()
            {
                reporter.error(
                    DiagnosticKind::DuplicateDeclaration,
                    parameter.range,
                    format!("duplicate parameter '${}'", parameter.name.name),
                );
            }
        }

        let declared: TypeTuple = node.returns.iter().map(|t| t.ty).collect();
        let mut returns = ReturnShape {
            explicit: node.explicit_returns,
            expected: node.explicit_returns.then_some(declared),
        };
        self.check_block(&node.body, &mut frame, &mut returns, reporter);
    }

    fn check_trigger(&self, node: &ScriptNode, reporter: &mut Reporter) {
        let Some(trigger) = self.triggers.get(&node.trigger.name) else {
            reporter.error(
                DiagnosticKind::UnresolvedName,
                node.trigger.range,
                format!("unknown trigger '{}'", node.trigger.name),
            );
            return;
        };
        if !trigger.support_arguments && !node.parameters.is_empty() {
            reporter.error(
                DiagnosticKind::RuleViolation,
                node.range,
                format!("trigger '{}' does not accept parameters", trigger.name),
            );
        }
        if !trigger.support_returns && !node.returns.is_empty() {
            reporter.error(
                DiagnosticKind::RuleViolation,
                node.range,
                format!("trigger '{}' does not return values", trigger.name),
            );
        }
        if let Some(expected) = &trigger.arguments {
            let actual: Vec<PrimitiveType> = node.parameters.iter().map(|p| p.ty.ty).collect();
            if &actual != expected {
                reporter.error(
                    DiagnosticKind::TypeMismatch,
                    node.range,
                    format!("trigger '{}' requires fixed parameter types", trigger.name),
                );
            }
        }
        if let Some(expected) = &trigger.returns {
            let actual: Vec<PrimitiveType> = node.returns.iter().map(|t| t.ty).collect();
            if &actual != expected {
                reporter.error(
                    DiagnosticKind::TypeMismatch,
                    node.range,
                    format!("trigger '{}' requires fixed return types", trigger.name),
                );
            }
        }
    }

    fn check_block(
        &self,
        block: &BlockStmt,
        frame: &mut Frame,
        returns: &mut ReturnShape,
        reporter: &mut Reporter,
    ) {
        for stmt in &block.statements {
            self.check_stmt(stmt, frame, returns, reporter);
        }
    }

    fn check_stmt(
        &self,
        stmt: &Stmt,
        frame: &mut Frame,
        returns: &mut ReturnShape,
        reporter: &mut Reporter,
    ) {
        match stmt {
            Stmt::Block(block) => self.check_block(block, frame, returns, reporter),
            Stmt::If(stmt) => {
                self.check_condition(&stmt.condition, frame, reporter);
                self.check_block(&stmt.then_body, frame, returns, reporter);
                if let Some(else_body) = &stmt.else_body {
                    self.check_stmt(else_body, frame, returns, reporter);
                }
            }
            Stmt::While(stmt) => {
                self.check_condition(&stmt.condition, frame, reporter);
                self.check_block(&stmt.body, frame, returns, reporter);
            }
            Stmt::Return(stmt) => self.check_return(stmt, frame, returns, reporter),
            Stmt::VarDecl(stmt) => self.check_var_decl(stmt, frame, reporter),
            Stmt::Assign(stmt) => self.check_assign(stmt, frame, reporter),
            Stmt::Expr(stmt) => {
                if let Some(ty) = self.check_expr(&stmt.expr, frame, reporter) {
                    if !ty.is_unit() {
                        reporter.error(
                            DiagnosticKind::TypeMismatch,
                            stmt.range,
                            "the result of this expression is discarded",
                        );
                    }
                }
            }
        }
    }

    fn check_return(
        &self,
        stmt: &ReturnStmt,
        frame: &mut Frame,
        returns: &mut ReturnShape,
        reporter: &mut Reporter,
    ) {
        let mut found = TypeTuple::unit();
        let mut complete = true;
        for value in &stmt.values {
            match self.check_expr(value, frame, reporter) {
                Some(ty) => found.extend(&ty),
                None => complete = false,
            }
        }
        if !complete {
            return;
        }
        match &returns.expected {
            Some(expected) if expected != &found => {
                let what = if returns.explicit {
                    "script returns"
                } else {
                    "earlier return statements provide"
                };
                reporter.error(
                    DiagnosticKind::TupleShapeMismatch,
                    stmt.range,
                    format!(
                        "{} ({}) but this statement provides ({})",
                        what,
                        expected.display(),
                        found.display()
                    ),
                );
            }
            Some(_) => {}
            None => returns.expected = Some(found),
        }
    }

    fn check_var_decl(&self, stmt: &VarDeclStmt, frame: &mut Frame, reporter: &mut Reporter) {
        if let Some(initializer) = &stmt.initializer {
            if let Some(ty) = self.check_expr(initializer, frame, reporter) {
                if let Some(actual) = self.expect_scalar(ty, initializer.range(), reporter) {
                    if actual != stmt.ty.ty {
                        reporter.error(
                            DiagnosticKind::TypeMismatch,
                            initializer.range(),
                            format!("expected {}, found {}", stmt.ty.ty, actual),
                        );
                    }
                }
            }
        }
        if frame
            .locals
            .insert(stmt.name.name.clone(), stmt.ty.ty)
            .is_some()
        {
            reporter.error(
                DiagnosticKind::DuplicateDeclaration,
                stmt.name.range,
                format!("local variable '${}' is already declared", stmt.name.name),
            );
        }
    }

    fn check_assign(&self, stmt: &AssignStmt, frame: &mut Frame, reporter: &mut Reporter) {
        let targets: Vec<Option<PrimitiveType>> = stmt
            .targets
            .iter()
            .map(|target| self.resolve_var(target, frame, reporter))
            .collect();
        let Some(value) = self.check_expr(&stmt.value, frame, reporter) else {
            return;
        };
        if value.len() != targets.len() {
            reporter.error(
                DiagnosticKind::TupleShapeMismatch,
                stmt.range,
                format!(
                    "cannot assign {} value(s) to {} target(s)",
                    value.len(),
                    targets.len()
                ),
            );
            return;
        }
        for (target, actual) in targets.iter().zip(value.components()) {
            if let Some(expected) = target {
                if expected != actual {
                    reporter.error(
                        DiagnosticKind::TypeMismatch,
                        stmt.range,
                        format!("expected {}, found {}", expected, actual),
                    );
                }
            }
        }
    }

    /// Conditions are a single comparison or a boolean-typed
    /// expression.
    fn check_condition(&self, expr: &Expr, frame: &mut Frame, reporter: &mut Reporter) {
        if let Expr::Binary(binary) = expr {
            if binary.op.is_comparison() {
                let lhs = self
                    .check_expr(&binary.lhs, frame, reporter)
                    .and_then(|ty| self.expect_scalar(ty, binary.lhs.range(), reporter));
                let rhs = self
                    .check_expr(&binary.rhs, frame, reporter)
                    .and_then(|ty| self.expect_scalar(ty, binary.rhs.range(), reporter));
                if let (Some(lhs), Some(rhs)) = (lhs, rhs) {
                    if lhs.stack_type() != StackType::Int || rhs.stack_type() != StackType::Int {
                        reporter.error(
                            DiagnosticKind::TypeMismatch,
                            binary.range,
                            "comparison operands must live on the int stack",
                        );
                    } else if lhs != rhs {
                        reporter.error(
                            DiagnosticKind::TypeMismatch,
                            binary.range,
                            format!("cannot compare {} with {}", lhs, rhs),
                        );
                    }
                }
                return;
            }
        }
        if let Some(ty) = self.check_expr(expr, frame, reporter) {
            if ty.as_single() != Some(PrimitiveType::Boolean) {
                reporter.error(
                    DiagnosticKind::TypeMismatch,
                    expr.range(),
                    "condition must be a boolean or a comparison",
                );
            }
        }
    }

    /// Infer an expression's type. `None` means a problem was already
    /// reported below this node.
    fn check_expr(&self, expr: &Expr, frame: &mut Frame, reporter: &mut Reporter) -> Option<TypeTuple> {
        match expr {
            Expr::Int(_) => Some(PrimitiveType::Int.into()),
            Expr::Long(_) => Some(PrimitiveType::Long.into()),
            Expr::Bool(_) => Some(PrimitiveType::Boolean.into()),
            Expr::Str(_) => Some(PrimitiveType::String.into()),
            Expr::CoordGrid(_) => Some(PrimitiveType::Coord.into()),
            Expr::Concat(concat) => {
                for part in &concat.parts {
                    if let Some(ty) = self.check_expr(part, frame, reporter) {
                        if let Some(actual) = self.expect_scalar(ty, part.range(), reporter) {
                            if actual != PrimitiveType::String {
                                reporter.error(
                                    DiagnosticKind::TypeMismatch,
                                    part.range(),
                                    format!("string part must be a string, found {}", actual),
                                );
                            }
                        }
                    }
                }
                Some(PrimitiveType::String.into())
            }
            Expr::ConstantRef(ident) => match self.table.lookup_constant(&ident.name) {
                Some(constant) => Some(constant.ty.into()),
                None => {
                    reporter.error(
                        DiagnosticKind::UnresolvedName,
                        ident.range,
                        format!("unknown constant '{}'", ident.name),
                    );
                    None
                }
            },
            Expr::Var(var) => self.resolve_var(var, frame, reporter).map(Into::into),
            Expr::Gosub(call) => {
                let name = ScriptName::new("proc", call.name.name.clone());
                let Some(symbol) = self.table.lookup_script(&name) else {
                    reporter.error(
                        DiagnosticKind::UnresolvedName,
                        call.name.range,
                        format!("unknown script '~{}'", call.name.name),
                    );
                    return None;
                };
                let parameters = symbol.parameters.clone();
                let returns = symbol.returns.clone();
                self.check_call_args(call, &parameters, "script", frame, reporter);
                Some(returns)
            }
            Expr::Command(call) => {
                let Some(symbol) = self.table.lookup_command(&call.name.name) else {
                    reporter.error(
                        DiagnosticKind::UnresolvedName,
                        call.name.range,
                        format!("unknown command '{}'", call.name.name),
                    );
                    return None;
                };
                if call.alternative && !symbol.alternative {
                    reporter.error(
                        DiagnosticKind::MalformedReference,
                        call.range,
                        format!("command '{}' has no alternative form", call.name.name),
                    );
                }
                let arguments = symbol.arguments.clone();
                let returns = symbol.returns.clone();
                self.check_call_args(call, &arguments, "command", frame, reporter);
                Some(returns)
            }
            Expr::Binary(binary) => {
                if binary.op.is_comparison() {
                    reporter.error(
                        DiagnosticKind::TypeMismatch,
                        binary.range,
                        "comparisons are only allowed in conditions",
                    );
                    return None;
                }
                self.check_arith_operand(&binary.lhs, frame, reporter);
                self.check_arith_operand(&binary.rhs, frame, reporter);
                if matches!(binary.op, BinaryOp::Div | BinaryOp::Mod) {
                    if let Expr::Int(IntLit { value: 0, .. }) = *binary.rhs {
                        reporter.error(
                            DiagnosticKind::RuleViolation,
                            binary.rhs.range(),
                            "division by zero",
                        );
                    }
                }
                Some(PrimitiveType::Int.into())
            }
            Expr::Calc(calc) => {
                self.check_arith_operand(&calc.expr, frame, reporter);
                Some(PrimitiveType::Int.into())
            }
        }
    }

    fn check_arith_operand(&self, expr: &Expr, frame: &mut Frame, reporter: &mut Reporter) {
        if let Some(ty) = self.check_expr(expr, frame, reporter) {
            if let Some(actual) = self.expect_scalar(ty, expr.range(), reporter) {
                if actual.stack_type() != StackType::Int {
                    reporter.error(
                        DiagnosticKind::TypeMismatch,
                        expr.range(),
                        format!("arithmetic requires int values, found {}", actual),
                    );
                }
            }
        }
    }

    fn check_call_args(
        &self,
        call: &CallExpr,
        expected: &[PrimitiveType],
        what: &str,
        frame: &mut Frame,
        reporter: &mut Reporter,
    ) {
        if call.arguments.len() != expected.len() {
            reporter.error(
                DiagnosticKind::ArityMismatch,
                call.range,
                format!(
                    "{} '{}' expects {} argument(s), found {}",
                    what,
                    call.name.name,
                    expected.len(),
                    call.arguments.len()
                ),
            );
        }
        for (argument, expected) in call.arguments.iter().zip(expected) {
            if let Some(ty) = self.check_expr(argument, frame, reporter) {
                if let Some(actual) = self.expect_scalar(ty, argument.range(), reporter) {
                    if actual != *expected {
                        reporter.error(
                            DiagnosticKind::TypeMismatch,
                            argument.range(),
                            format!("expected {}, found {}", expected, actual),
                        );
                    }
                }
            }
        }
    }

    /// Tuple-returning calls may only appear as assignment sources or
    /// in return lists; everywhere else a scalar is required.
    fn expect_scalar(
        &self,
        ty: TypeTuple,
        range: TextRange,
        reporter: &mut Reporter,
    ) -> Option<PrimitiveType> {
        match ty.as_single() {
            Some(ty) => Some(ty),
            None => {
                reporter.error(
                    DiagnosticKind::TupleShapeMismatch,
                    range,
                    format!("a single value is required here, found ({})", ty.display()),
                );
                None
            }
        }
    }

    fn resolve_var(
        &self,
        var: &VarRef,
        frame: &Frame,
        reporter: &mut Reporter,
    ) -> Option<PrimitiveType> {
        match var_scope_group(var.scope) {
            None => match frame.locals.get(&var.name.name) {
                Some(ty) => Some(*ty),
                None => {
                    reporter.error(
                        DiagnosticKind::UnresolvedName,
                        var.range,
                        format!("unknown local variable '${}'", var.name.name),
                    );
                    None
                }
            },
            Some((group, ty)) => {
                if self.table.lookup_config(&group, &var.name.name).is_some() {
                    Some(ty)
                } else {
                    reporter.error(
                        DiagnosticKind::UnresolvedName,
                        var.range,
                        format!(
                            "unknown {} variable '{}{}'",
                            group,
                            scope_sigil(var.scope),
                            var.name.name
                        ),
                    );
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::LexicalTable;
    use crate::parser::parse_script_file;

    fn triggers() -> TriggerCatalog {
        TriggerCatalog::from_toml_str(
            r#"
            [[trigger]]
            name = "proc"
            support_arguments = true
            support_returns = true

            [[trigger]]
            name = "clientscript"
            support_arguments = true
            "#,
        )
        .expect("catalog")
    }

    fn check(source: &str) -> Reporter {
        check_with(source, SymbolTable::new())
    }

    fn check_with(source: &str, mut table: SymbolTable) -> Reporter {
        let lexical = LexicalTable::script();
        let parse = parse_script_file(source, &lexical);
        assert!(parse.ok(), "parse diagnostics: {:?}", parse.diagnostics);
        let mut reporter = Reporter::new();
        for script in &parse.value.scripts {
            declare_script(script, &mut table, false, &mut reporter);
        }
        let triggers = triggers();
        let checker = ScriptChecker::new(&table, &triggers);
        for script in &parse.value.scripts {
            checker.check(script, &mut reporter);
        }
        reporter
    }

    #[test]
    fn test_clean_script() {
        let mut reporter = check("[proc,ok](int $x)(int) { if ($x < 3) { return(1); } return(2); }");
        assert!(!reporter.has_errors(), "{:?}", reporter.take());
    }

    #[test]
    fn test_unknown_trigger() {
        let reporter = check("[widget,x] {}");
        assert!(reporter.iter().any(|d| d.kind == DiagnosticKind::UnresolvedName));
    }

    #[test]
    fn test_trigger_without_returns() {
        let reporter = check("[clientscript,x](int) { return(1); }");
        assert!(reporter.iter().any(|d| d.kind == DiagnosticKind::RuleViolation));
    }

    #[test]
    fn test_unresolved_local() {
        let reporter = check("[proc,x] { $missing = 1; }");
        assert!(reporter.iter().any(|d| d.kind == DiagnosticKind::UnresolvedName));
    }

    #[test]
    fn test_forward_reference_within_batch() {
        let mut reporter = check(
            "[proc,first] { ~second; } [proc,second] { return; }",
        );
        assert!(!reporter.has_errors(), "{:?}", reporter.take());
    }

    #[test]
    fn test_duplicate_declaration() {
        let reporter = check("[proc,same] {} [proc,same] {}");
        assert!(reporter.iter().any(|d| d.kind == DiagnosticKind::DuplicateDeclaration));
    }

    #[test]
    fn test_return_shape_mismatch() {
        let reporter = check("[proc,x](int) { return(\"no\"); }");
        assert!(reporter.iter().any(|d| d.kind == DiagnosticKind::TupleShapeMismatch));
    }

    #[test]
    fn test_condition_must_be_boolean() {
        let reporter = check("[proc,x] { if (1) { return; } }");
        assert!(reporter.iter().any(|d| d.kind == DiagnosticKind::TypeMismatch));
    }

    #[test]
    fn test_arith_outside_int_stack() {
        let reporter = check("[proc,x] { def_int $a = calc(1 + \"two\"); }");
        assert!(reporter.iter().any(|d| d.kind == DiagnosticKind::TypeMismatch));
    }

    #[test]
    fn test_division_by_constant_zero() {
        let reporter = check("[proc,x] { def_int $a = calc(1 / 0); }");
        assert!(reporter.iter().any(|d| d.kind == DiagnosticKind::RuleViolation));
    }

    #[test]
    fn test_multi_assign_from_tuple_call() {
        let mut reporter = check(
            "[proc,pair](int,string) { return(1, \"a\"); } \
             [proc,use] { def_int $a; def_string $b; $a, $b = ~pair; }",
        );
        assert!(!reporter.has_errors(), "{:?}", reporter.take());
    }

    #[test]
    fn test_tuple_in_scalar_position() {
        let reporter = check(
            "[proc,pair](int,string) { return(1, \"a\"); } \
             [proc,use] { def_int $a = ~pair; }",
        );
        assert!(reporter.iter().any(|d| d.kind == DiagnosticKind::TupleShapeMismatch));
    }
}
