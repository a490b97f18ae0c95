//! Grammar for the configuration dialect.
//!
//! ```text
//! file     := config*
//! config   := '[' name ']' property*
//! property := key '=' value (',' value)*
//! ```
//!
//! A property ends where its value list stops: the next `key =`
//! pair, the next `[` header, or end of file. Recovery skips to the
//! nearest of those synchronization points.

use super::{Parse, Parser};
use crate::diagnostics::DiagnosticKind;
use crate::lexer::{LexicalTable, TokenKind, decode_string, int_value, long_value, pack_coord_grid};
use crate::syntax::PrimitiveType;
use crate::syntax::config::*;
use crate::syntax::script::{BoolLit, CoordLit, Ident, IntLit, LongLit, StringLit};

/// Parse a config-dialect source file.
pub fn parse_config_file(source: &str, table: &LexicalTable) -> Parse<ConfigFile> {
    let mut parser = Parser::new(source, table);
    let file = config_file(&mut parser);
    parser.finish(file)
}

fn config_file(p: &mut Parser) -> ConfigFile {
    let mut configs = Vec::new();
    while !p.at_eof() {
        if p.at(TokenKind::LBracket) {
            match config(p) {
                Some(config) => configs.push(config),
                None => p.recover(&[TokenKind::LBracket]),
            }
        } else {
            p.error_at_current(DiagnosticKind::UnexpectedToken, "expected a config header");
            p.recover(&[TokenKind::LBracket]);
        }
    }
    ConfigFile {
        configs,
        range: p.document_range(),
    }
}

fn config(p: &mut Parser) -> Option<ConfigNode> {
    let start = p.current().range;
    p.expect(TokenKind::LBracket)?;
    let name = {
        let token = p.expect(TokenKind::Identifier)?;
        Ident::new(token.text, token.range)
    };
    p.expect(TokenKind::RBracket)?;

    let mut properties = Vec::new();
    loop {
        match p.kind() {
            TokenKind::LBracket | TokenKind::Eof => break,
            TokenKind::Identifier if p.nth_kind(1) == TokenKind::Equal => {
                match property(p) {
                    Some(property) => properties.push(property),
                    None => recover_to_property(p),
                }
            }
            _ => {
                p.error_at_current(
                    DiagnosticKind::UnexpectedToken,
                    "expected a property or config header",
                );
                recover_to_property(p);
            }
        }
    }

    Some(ConfigNode {
        name,
        properties,
        range: p.span_from(start),
    })
}

/// Skip to the next `key =` pair, config header, or end of file.
fn recover_to_property(p: &mut Parser) {
    while !p.at_eof() {
        match p.kind() {
            TokenKind::LBracket => return,
            TokenKind::Identifier if p.nth_kind(1) == TokenKind::Equal => return,
            _ => {
                p.bump();
            }
        }
    }
}

fn property(p: &mut Parser) -> Option<PropertyNode> {
    let start = p.current().range;
    let key = {
        let token = p.bump();
        Ident::new(token.text, token.range)
    };
    p.expect(TokenKind::Equal)?;
    let mut values = vec![value(p)?];
    while p.eat(TokenKind::Comma) {
        values.push(value(p)?);
    }
    Some(PropertyNode {
        key,
        values,
        range: p.span_from(start),
    })
}

fn value(p: &mut Parser) -> Option<Value> {
    match p.kind() {
        TokenKind::Integer => {
            let token = p.bump();
            Some(Value::Int(IntLit {
                value: int_value(&token.text),
                range: token.range,
            }))
        }
        TokenKind::Long => {
            let token = p.bump();
            Some(Value::Long(LongLit {
                value: long_value(&token.text),
                range: token.range,
            }))
        }
        TokenKind::Boolean => {
            let token = p.bump();
            Some(Value::Bool(BoolLit {
                value: token.text == "yes" || token.text == "true",
                range: token.range,
            }))
        }
        TokenKind::String => {
            let token = p.bump();
            Some(Value::Str(StringLit {
                value: decode_string(&token.text),
                range: token.range,
            }))
        }
        TokenKind::CoordGrid => {
            let token = p.bump();
            Some(Value::CoordGrid(CoordLit {
                value: pack_coord_grid(&token.text),
                range: token.range,
            }))
        }
        TokenKind::Type => {
            let token = p.bump();
            let ty = PrimitiveType::from_representation(&token.text).unwrap_or(PrimitiveType::Int);
            Some(Value::Type(TypeLit {
                ty,
                range: token.range,
            }))
        }
        TokenKind::Identifier => {
            let token = p.bump();
            Some(Value::Reference(Ident::new(token.text, token.range)))
        }
        _ => {
            p.error_at_current(
                DiagnosticKind::UnexpectedToken,
                format!(
                    "expected a value, found {}",
                    crate::lexer::kind_to_name(p.kind())
                ),
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Parse<ConfigFile> {
        let table = LexicalTable::config();
        parse_config_file(source, &table)
    }

    #[test]
    fn test_parse_empty_file() {
        let result = parse("");
        assert!(result.ok());
        assert!(result.value.configs.is_empty());
    }

    #[test]
    fn test_parse_simple_config() {
        let result = parse("[blue_partyhat]\nname=\"Blue partyhat\"\ncost=10\nmembers=yes\n");
        assert!(result.ok(), "diagnostics: {:?}", result.diagnostics);
        let config = &result.value.configs[0];
        assert_eq!(config.name.name, "blue_partyhat");
        assert_eq!(config.properties.len(), 3);
        assert!(matches!(
            config.property("members").map(|p| &p.values[0]),
            Some(Value::Bool(BoolLit { value: true, .. }))
        ));
    }

    #[test]
    fn test_parse_multi_value_property() {
        let result = parse("[thing]\nparam=attack_bonus,12\n");
        assert!(result.ok(), "diagnostics: {:?}", result.diagnostics);
        let property = &result.value.configs[0].properties[0];
        assert_eq!(property.values.len(), 2);
        assert!(matches!(property.values[0], Value::Reference(_)));
        assert!(matches!(property.values[1], Value::Int(_)));
    }

    #[test]
    fn test_parse_type_and_coord_values() {
        let result = parse("[spot]\ntype=long\nwhere=0_50_50_31_3\n");
        assert!(result.ok(), "diagnostics: {:?}", result.diagnostics);
        let config = &result.value.configs[0];
        assert!(matches!(
            config.property("type").map(|p| &p.values[0]),
            Some(Value::Type(TypeLit {
                ty: PrimitiveType::Long,
                ..
            }))
        ));
        assert!(matches!(
            config.property("where").map(|p| &p.values[0]),
            Some(Value::CoordGrid(_))
        ));
    }

    #[test]
    fn test_multiple_configs() {
        let result = parse("[a]\nx=1\n[b]\ny=2\n");
        assert!(result.ok());
        assert_eq!(result.value.configs.len(), 2);
    }

    #[test]
    fn test_recovery_on_bad_property() {
        let result = parse("[a]\nx=;\ny=2\n[b]\nz=3\n");
        assert!(!result.ok());
        assert_eq!(result.value.configs.len(), 2);
        let first = &result.value.configs[0];
        assert!(first.property("y").is_some());
    }

    #[test]
    fn test_range_covers_properties() {
        let source = "[a]\nx=1\ny=2\n";
        let result = parse(source);
        let config = &result.value.configs[0];
        for property in &config.properties {
            assert!(config.range.contains_range(property.range));
        }
    }
}
