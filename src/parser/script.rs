//! Grammar for the script dialect.
//!
//! ```text
//! file      := script*
//! script    := '[' trigger ',' name ']' ('(' params ')')? ('(' types ')')? block
//! stmt      := block | if | while | return | vardecl | assign | expr ';'
//! ```
//!
//! Expressions are literals, scoped variables, calls, single
//! comparisons, and `calc(..)` arithmetic islands. String literals
//! with `<expr>` placeholders become concatenation nodes; each
//! placeholder is re-lexed in place and parsed as an expression.

use text_size::TextRange;

use super::{Parse, Parser};
use crate::diagnostics::DiagnosticKind;
use crate::lexer::{
    LexicalTable, StringPiece, TokenKind, int_value, long_value, pack_coord_grid,
    split_string_literal, tokenize_at,
};
use crate::syntax::PrimitiveType;
use crate::syntax::script::*;

/// Parse a script-dialect source file.
pub fn parse_script_file(source: &str, table: &LexicalTable) -> Parse<ScriptFile> {
    let mut parser = Parser::new(source, table);
    let file = script_file(&mut parser);
    parser.finish(file)
}

fn script_file(p: &mut Parser) -> ScriptFile {
    let mut scripts = Vec::new();
    while !p.at_eof() {
        if p.at(TokenKind::LBracket) {
            match script(p) {
                Some(script) => scripts.push(script),
                None => p.recover(&[TokenKind::LBracket]),
            }
        } else {
            p.error_at_current(
                DiagnosticKind::UnexpectedToken,
                "expected a script declaration",
            );
            p.recover(&[TokenKind::LBracket]);
        }
    }
    ScriptFile {
        scripts,
        range: p.document_range(),
    }
}

fn script(p: &mut Parser) -> Option<ScriptNode> {
    let start = p.current().range;
    p.expect(TokenKind::LBracket)?;
    let trigger = ident(p)?;
    p.expect(TokenKind::Comma)?;
    let name = ident(p)?;
    p.expect(TokenKind::RBracket)?;

    let (parameters, returns) = signature(p)?;
    // A body is either braced or runs to the next script header.
    let body = if p.at(TokenKind::LBrace) {
        block(p)?
    } else {
        bare_body(p)
    };

    Some(ScriptNode {
        trigger,
        name,
        parameters,
        explicit_returns: returns.is_some(),
        returns: returns.unwrap_or_default(),
        body,
        range: p.span_from(start),
    })
}

/// A parenthesized group is a parameter list when it is empty or its
/// first entry is `type $name`; otherwise it is the return types.
fn signature(p: &mut Parser) -> Option<(Vec<Parameter>, Option<Vec<TypeName>>)> {
    let mut parameters = Vec::new();
    let mut returns = None;
    if p.at(TokenKind::LParen) {
        let is_params = p.nth_kind(1) == TokenKind::RParen
            || (p.nth_kind(1) == TokenKind::Type && p.nth_kind(2) == TokenKind::Dollar);
        if is_params {
            parameters = parameter_group(p)?;
            if p.at(TokenKind::LParen) {
                returns = Some(return_group(p)?);
            }
        } else {
            returns = Some(return_group(p)?);
        }
    }
    Some((parameters, returns))
}

fn parameter_group(p: &mut Parser) -> Option<Vec<Parameter>> {
    p.expect(TokenKind::LParen)?;
    let mut parameters = Vec::new();
    if !p.at(TokenKind::RParen) {
        loop {
            parameters.push(parameter(p)?);
            if !p.eat(TokenKind::Comma) {
                break;
            }
        }
    }
    p.expect(TokenKind::RParen)?;
    Some(parameters)
}

fn parameter(p: &mut Parser) -> Option<Parameter> {
    let start = p.current().range;
    let ty = type_name(p)?;
    p.expect(TokenKind::Dollar)?;
    let name = ident(p)?;
    Some(Parameter {
        ty,
        name,
        range: p.span_from(start),
    })
}

fn return_group(p: &mut Parser) -> Option<Vec<TypeName>> {
    p.expect(TokenKind::LParen)?;
    let mut types = Vec::new();
    if !p.at(TokenKind::RParen) {
        loop {
            type_expr(p, &mut types)?;
            if !p.eat(TokenKind::Comma) {
                break;
            }
        }
    }
    p.expect(TokenKind::RParen)?;
    Some(types)
}

/// A type expression: a type name or a parenthesized tuple. Nested
/// tuples flatten into the output list.
fn type_expr(p: &mut Parser, out: &mut Vec<TypeName>) -> Option<()> {
    if p.at(TokenKind::LParen) {
        p.bump();
        loop {
            type_expr(p, out)?;
            if !p.eat(TokenKind::Comma) {
                break;
            }
        }
        p.expect(TokenKind::RParen)?;
        Some(())
    } else {
        out.push(type_name(p)?);
        Some(())
    }
}

fn type_name(p: &mut Parser) -> Option<TypeName> {
    let token = p.expect(TokenKind::Type)?;
    let ty = PrimitiveType::from_representation(&token.text).unwrap_or(PrimitiveType::Int);
    Some(TypeName {
        ty,
        range: token.range,
    })
}

fn ident(p: &mut Parser) -> Option<Ident> {
    let token = p.expect(TokenKind::Identifier)?;
    Some(Ident::new(token.text, token.range))
}

// =============================================================================
// Statements
// =============================================================================

fn block(p: &mut Parser) -> Option<BlockStmt> {
    let start = p.current().range;
    p.expect(TokenKind::LBrace)?;
    let mut statements = Vec::new();
    while !p.at(TokenKind::RBrace) && !p.at(TokenKind::LBracket) && !p.at_eof() {
        match statement(p) {
            Some(stmt) => statements.push(stmt),
            None => {
                p.recover(&[TokenKind::Semicolon, TokenKind::RBrace, TokenKind::LBracket]);
                p.eat(TokenKind::Semicolon);
            }
        }
    }
    p.expect(TokenKind::RBrace)?;
    Some(BlockStmt {
        statements,
        range: p.span_from(start),
    })
}

/// A braceless script body: statements up to the next `[` header or
/// end of file.
fn bare_body(p: &mut Parser) -> BlockStmt {
    let start = p.current().range;
    let mut statements = Vec::new();
    while !p.at(TokenKind::LBracket) && !p.at_eof() {
        match statement(p) {
            Some(stmt) => statements.push(stmt),
            None => {
                p.recover(&[TokenKind::Semicolon, TokenKind::LBracket]);
                p.eat(TokenKind::Semicolon);
            }
        }
    }
    BlockStmt {
        statements,
        range: p.span_from(start),
    }
}

fn statement(p: &mut Parser) -> Option<Stmt> {
    match p.kind() {
        TokenKind::LBrace => block(p).map(Stmt::Block),
        TokenKind::If => if_stmt(p).map(Stmt::If),
        TokenKind::While => while_stmt(p).map(Stmt::While),
        TokenKind::Return => return_stmt(p).map(Stmt::Return),
        TokenKind::DefType => var_decl(p).map(Stmt::VarDecl),
        TokenKind::Dollar
        | TokenKind::Percent
        | TokenKind::PercentPercent
        | TokenKind::Caret
        | TokenKind::Ampersand => assign_stmt(p).map(Stmt::Assign),
        _ => expr_stmt(p).map(Stmt::Expr),
    }
}

fn if_stmt(p: &mut Parser) -> Option<IfStmt> {
    let start = p.current().range;
    p.bump(); // 'if'
    p.expect(TokenKind::LParen)?;
    let condition = expression(p)?;
    p.expect(TokenKind::RParen)?;
    let then_body = block(p)?;
    let else_body = if p.eat(TokenKind::Else) {
        if p.at(TokenKind::If) {
            Some(Box::new(Stmt::If(if_stmt(p)?)))
        } else {
            Some(Box::new(Stmt::Block(block(p)?)))
        }
    } else {
        None
    };
    Some(IfStmt {
        condition,
        then_body,
        else_body,
        range: p.span_from(start),
    })
}

fn while_stmt(p: &mut Parser) -> Option<WhileStmt> {
    let start = p.current().range;
    p.bump(); // 'while'
    p.expect(TokenKind::LParen)?;
    let condition = expression(p)?;
    p.expect(TokenKind::RParen)?;
    let body = block(p)?;
    Some(WhileStmt {
        condition,
        body,
        range: p.span_from(start),
    })
}

fn return_stmt(p: &mut Parser) -> Option<ReturnStmt> {
    let start = p.current().range;
    p.bump(); // 'return'
    let mut values = Vec::new();
    if p.eat(TokenKind::LParen) {
        if !p.at(TokenKind::RParen) {
            loop {
                values.push(expression(p)?);
                if !p.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        p.expect(TokenKind::RParen)?;
    }
    p.expect(TokenKind::Semicolon)?;
    Some(ReturnStmt {
        values,
        range: p.span_from(start),
    })
}

fn var_decl(p: &mut Parser) -> Option<VarDeclStmt> {
    let start = p.current().range;
    let def = p.bump(); // 'def_<type>'
    let ty = def
        .text
        .strip_prefix("def_")
        .and_then(PrimitiveType::from_representation)
        .unwrap_or(PrimitiveType::Int);
    let ty = TypeName {
        ty,
        range: def.range,
    };
    p.expect(TokenKind::Dollar)?;
    let name = ident(p)?;
    let initializer = if p.eat(TokenKind::Equal) {
        Some(expression(p)?)
    } else {
        None
    };
    p.expect(TokenKind::Semicolon)?;
    Some(VarDeclStmt {
        ty,
        name,
        initializer,
        range: p.span_from(start),
    })
}

fn assign_stmt(p: &mut Parser) -> Option<AssignStmt> {
    let start = p.current().range;
    let mut targets = vec![var_ref(p)?];
    while p.eat(TokenKind::Comma) {
        targets.push(var_ref(p)?);
    }
    p.expect(TokenKind::Equal)?;
    let value = expression(p)?;
    p.expect(TokenKind::Semicolon)?;
    Some(AssignStmt {
        targets,
        value,
        range: p.span_from(start),
    })
}

fn expr_stmt(p: &mut Parser) -> Option<ExprStmt> {
    let start = p.current().range;
    let expr = expression(p)?;
    p.expect(TokenKind::Semicolon)?;
    Some(ExprStmt {
        expr,
        range: p.span_from(start),
    })
}

fn var_ref(p: &mut Parser) -> Option<VarRef> {
    let sigil = p.bump();
    let scope = match sigil.kind {
        TokenKind::Dollar => VarScope::Local,
        TokenKind::Percent => VarScope::Player,
        TokenKind::PercentPercent => VarScope::PlayerBit,
        TokenKind::Ampersand => VarScope::ClientInt,
        TokenKind::Caret => VarScope::ClientString,
        _ => {
            p.error_at_current(DiagnosticKind::UnexpectedToken, "expected a variable reference");
            return None;
        }
    };
    let name = ident(p)?;
    Some(VarRef {
        scope,
        range: sigil.range.cover(name.range),
        name,
    })
}

// =============================================================================
// Expressions
// =============================================================================

const COMPARISON_OPS: [TokenKind; 5] = [
    TokenKind::EqualEqual,
    TokenKind::LessThan,
    TokenKind::GreaterThan,
    TokenKind::LessThanOrEqual,
    TokenKind::GreaterThanOrEqual,
];

pub(crate) fn expression(p: &mut Parser) -> Option<Expr> {
    let lhs = primary(p, false)?;
    if p.at_any(&COMPARISON_OPS) {
        let op = comparison_op(p.bump().kind);
        let rhs = primary(p, false)?;
        let range = lhs.range().cover(rhs.range());
        return Some(Expr::Binary(BinaryExpr {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            range,
        }));
    }
    Some(lhs)
}

fn comparison_op(kind: TokenKind) -> BinaryOp {
    match kind {
        TokenKind::EqualEqual => BinaryOp::Equal,
        TokenKind::LessThan => BinaryOp::LessThan,
        TokenKind::GreaterThan => BinaryOp::GreaterThan,
        TokenKind::LessThanOrEqual => BinaryOp::LessThanOrEqual,
        _ => BinaryOp::GreaterThanOrEqual,
    }
}

/// `calc` arithmetic: `+`/`-` over terms, left-associative.
fn arith(p: &mut Parser) -> Option<Expr> {
    let mut lhs = term(p)?;
    while p.at_any(&[TokenKind::Plus, TokenKind::Minus]) {
        let op = if p.bump().kind == TokenKind::Plus {
            BinaryOp::Add
        } else {
            BinaryOp::Sub
        };
        let rhs = term(p)?;
        let range = lhs.range().cover(rhs.range());
        lhs = Expr::Binary(BinaryExpr {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            range,
        });
    }
    Some(lhs)
}

fn term(p: &mut Parser) -> Option<Expr> {
    let mut lhs = primary(p, true)?;
    while p.at_any(&[TokenKind::Star, TokenKind::Slash, TokenKind::Percent]) {
        let op = match p.bump().kind {
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            _ => BinaryOp::Mod,
        };
        let rhs = primary(p, true)?;
        let range = lhs.range().cover(rhs.range());
        lhs = Expr::Binary(BinaryExpr {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            range,
        });
    }
    Some(lhs)
}

fn primary(p: &mut Parser, in_calc: bool) -> Option<Expr> {
    let start = p.current().range;
    match p.kind() {
        TokenKind::Integer => {
            let token = p.bump();
            Some(Expr::Int(IntLit {
                value: int_value(&token.text),
                range: token.range,
            }))
        }
        TokenKind::Long => {
            let token = p.bump();
            Some(Expr::Long(LongLit {
                value: long_value(&token.text),
                range: token.range,
            }))
        }
        TokenKind::Boolean => {
            let token = p.bump();
            Some(Expr::Bool(BoolLit {
                value: token.text == "true" || token.text == "yes",
                range: token.range,
            }))
        }
        TokenKind::CoordGrid => {
            let token = p.bump();
            Some(Expr::CoordGrid(CoordLit {
                value: pack_coord_grid(&token.text),
                range: token.range,
            }))
        }
        TokenKind::String => Some(string_expr(p)),
        TokenKind::Dollar
        | TokenKind::Percent
        | TokenKind::PercentPercent
        | TokenKind::Caret
        | TokenKind::Ampersand => var_ref(p).map(Expr::Var),
        TokenKind::Tilde => {
            p.bump();
            let name = ident(p)?;
            let mut arguments = Vec::new();
            if p.eat(TokenKind::LParen) {
                arguments = call_args(p);
                p.expect(TokenKind::RParen)?;
            }
            Some(Expr::Gosub(CallExpr {
                name,
                arguments,
                alternative: false,
                range: p.span_from(start),
            }))
        }
        TokenKind::Dot => {
            p.bump();
            let name = ident(p)?;
            p.expect(TokenKind::LParen)?;
            let arguments = call_args(p);
            p.expect(TokenKind::RParen)?;
            Some(Expr::Command(CallExpr {
                name,
                arguments,
                alternative: true,
                range: p.span_from(start),
            }))
        }
        TokenKind::Calc => {
            p.bump();
            p.expect(TokenKind::LParen)?;
            let inner = arith(p)?;
            p.expect(TokenKind::RParen)?;
            Some(Expr::Calc(CalcExpr {
                expr: Box::new(inner),
                range: p.span_from(start),
            }))
        }
        TokenKind::Identifier => {
            let token = p.bump();
            let name = Ident::new(token.text, token.range);
            if p.eat(TokenKind::LParen) {
                let arguments = call_args(p);
                p.expect(TokenKind::RParen)?;
                Some(Expr::Command(CallExpr {
                    name,
                    arguments,
                    alternative: false,
                    range: p.span_from(start),
                }))
            } else {
                Some(Expr::ConstantRef(name))
            }
        }
        TokenKind::LParen => {
            p.bump();
            let inner = if in_calc { arith(p)? } else { expression(p)? };
            p.expect(TokenKind::RParen)?;
            Some(inner)
        }
        _ => {
            p.error_at_current(
                DiagnosticKind::UnexpectedToken,
                format!(
                    "expected an expression, found {}",
                    crate::lexer::kind_to_name(p.kind())
                ),
            );
            None
        }
    }
}

fn call_args(p: &mut Parser) -> Vec<Expr> {
    let mut arguments = Vec::new();
    if p.at(TokenKind::RParen) {
        return arguments;
    }
    loop {
        match expression(p) {
            Some(expr) => arguments.push(expr),
            None => p.recover(&[TokenKind::Comma, TokenKind::RParen, TokenKind::Semicolon]),
        }
        if !p.eat(TokenKind::Comma) {
            break;
        }
    }
    arguments
}

/// A string literal; placeholders turn it into a concatenation.
fn string_expr(p: &mut Parser) -> Expr {
    let token = p.bump();
    let pieces = split_string_literal(&token.text, token.range);
    if let [StringPiece::Text { value, .. }] = &pieces[..] {
        return Expr::Str(StringLit {
            value: value.clone(),
            range: token.range,
        });
    }
    let mut parts = Vec::new();
    for piece in pieces {
        match piece {
            StringPiece::Text { value, range } => {
                parts.push(Expr::Str(StringLit { value, range }));
            }
            StringPiece::Interp { range } => {
                if let Some(expr) = placeholder_expr(p, range) {
                    parts.push(expr);
                }
            }
        }
    }
    Expr::Concat(ConcatExpr {
        parts,
        range: token.range,
    })
}

/// Re-lex and parse one `<expr>` placeholder in place.
fn placeholder_expr(p: &mut Parser, range: TextRange) -> Option<Expr> {
    let source = p.source;
    let table = p.table;
    let slice = &source[range];
    let tokens = tokenize_at(slice, range.start(), table, &mut p.reporter);
    let mut sub = Parser::from_tokens(tokens, source, table);
    let expr = expression(&mut sub);
    if !sub.at_eof() {
        sub.error_at_current(
            DiagnosticKind::UnexpectedToken,
            "unexpected token in string placeholder",
        );
    }
    for diagnostic in sub.take_diagnostics() {
        p.report(diagnostic);
    }
    expr
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Parse<ScriptFile> {
        let table = LexicalTable::script();
        parse_script_file(source, &table)
    }

    #[test]
    fn test_parse_empty_file() {
        let result = parse("");
        assert!(result.ok());
        assert!(result.value.scripts.is_empty());
    }

    #[test]
    fn test_parse_hello_world() {
        let result = parse(r#"[proc,hello](string $s) { return("hi"); }"#);
        assert!(result.ok(), "diagnostics: {:?}", result.diagnostics);
        let script = &result.value.scripts[0];
        assert_eq!(script.trigger.name, "proc");
        assert_eq!(script.name.name, "hello");
        assert_eq!(script.parameters.len(), 1);
        assert_eq!(script.parameters[0].ty.ty, PrimitiveType::String);
    }

    #[test]
    fn test_parse_returns_group() {
        let result = parse("[proc,pair] (int, string) {}");
        assert!(result.ok(), "diagnostics: {:?}", result.diagnostics);
        let script = &result.value.scripts[0];
        assert!(script.parameters.is_empty());
        assert_eq!(
            script.returns.iter().map(|t| t.ty).collect::<Vec<_>>(),
            vec![PrimitiveType::Int, PrimitiveType::String]
        );
    }

    #[test]
    fn test_nested_tuple_types_flatten() {
        let result = parse("[proc,t] (int, (string, long)) {}");
        assert!(result.ok(), "diagnostics: {:?}", result.diagnostics);
        let script = &result.value.scripts[0];
        assert_eq!(
            script.returns.iter().map(|t| t.ty).collect::<Vec<_>>(),
            vec![PrimitiveType::Int, PrimitiveType::String, PrimitiveType::Long]
        );
    }

    #[test]
    fn test_parse_if_else() {
        let result = parse(
            "[proc,p](int $x) { if ($x < 3) { return(1); } else { return(2); } }",
        );
        assert!(result.ok(), "diagnostics: {:?}", result.diagnostics);
        let script = &result.value.scripts[0];
        assert!(matches!(script.body.statements[0], Stmt::If(_)));
    }

    #[test]
    fn test_parse_while_and_locals() {
        let result = parse(
            "[proc,count] { def_int $i = 0; while ($i < 10) { $i = calc($i + 1); } }",
        );
        assert!(result.ok(), "diagnostics: {:?}", result.diagnostics);
    }

    #[test]
    fn test_parse_scoped_variables() {
        let result = parse(
            "[proc,v] { %energy = 5; %%flag = 1; &counter = 2; ^label = \"x\"; }",
        );
        assert!(result.ok(), "diagnostics: {:?}", result.diagnostics);
        let script = &result.value.scripts[0];
        let scopes: Vec<_> = script
            .body
            .statements
            .iter()
            .map(|s| match s {
                Stmt::Assign(a) => a.targets[0].scope,
                _ => panic!("expected assignment"),
            })
            .collect();
        assert_eq!(
            scopes,
            vec![
                VarScope::Player,
                VarScope::PlayerBit,
                VarScope::ClientInt,
                VarScope::ClientString
            ]
        );
    }

    #[test]
    fn test_parse_interpolated_string() {
        let result = parse(r#"[proc,msg](int $lvl) { return("level <$lvl>!"); }"#);
        assert!(result.ok(), "diagnostics: {:?}", result.diagnostics);
        let script = &result.value.scripts[0];
        let Stmt::Return(ret) = &script.body.statements[0] else {
            panic!("expected return");
        };
        let Expr::Concat(concat) = &ret.values[0] else {
            panic!("expected concat, got {:?}", ret.values[0]);
        };
        assert_eq!(concat.parts.len(), 3);
        assert!(matches!(concat.parts[1], Expr::Var(_)));
    }

    #[test]
    fn test_parse_gosub_and_command() {
        let result = parse("[proc,a] { ~helper(1); mes(\"hi\"); .mes(\"alt\"); }");
        assert!(result.ok(), "diagnostics: {:?}", result.diagnostics);
        let script = &result.value.scripts[0];
        let kinds: Vec<_> = script
            .body
            .statements
            .iter()
            .map(|s| match s {
                Stmt::Expr(e) => &e.expr,
                _ => panic!("expected expression statement"),
            })
            .collect();
        assert!(matches!(kinds[0], Expr::Gosub(_)));
        assert!(matches!(kinds[1], Expr::Command(c) if !c.alternative));
        assert!(matches!(kinds[2], Expr::Command(c) if c.alternative));
    }

    #[test]
    fn test_error_recovery_keeps_later_scripts() {
        let result = parse("[proc,bad] { if } [proc,good] { return; }");
        assert!(!result.ok());
        let last = result.value.scripts.last().expect("recovered scripts");
        assert_eq!(last.name.name, "good");
    }

    #[test]
    fn test_parent_range_covers_children() {
        let source = "[proc,p](int $x) { if ($x < 3) { return(1); } }";
        let result = parse(source);
        assert!(result.ok());
        let script = &result.value.scripts[0];
        for stmt in &script.body.statements {
            assert!(script.body.range.contains_range(stmt.range()));
            assert!(script.range.contains_range(stmt.range()));
        }
    }

    #[test]
    fn test_multi_assign() {
        let result = parse("[proc,m] { def_int $a; def_string $b; $a, $b = ~pair; }");
        assert!(result.ok(), "diagnostics: {:?}", result.diagnostics);
        let script = &result.value.scripts[0];
        let Stmt::Assign(assign) = &script.body.statements[2] else {
            panic!("expected assignment");
        };
        assert_eq!(assign.targets.len(), 2);
    }
}
