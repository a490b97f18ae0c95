//! Semantic checking for the configuration dialect.
//!
//! Every property key must exist in the file extension's binding;
//! values must match the declared component types; rules (`RANGE`,
//! `REQUIRE`) are evaluated against the whole config; companion
//! `type` properties are resolved for type-dispatched and map
//! descriptors.

use rustc_hash::FxHashSet;
use smol_str::SmolStr;

use super::symbol_table::{ConfigSymbol, SymbolTable};
use crate::binding::{Binding, PropertyKind, PropertyRule};
use crate::diagnostics::{DiagnosticKind, Reporter};
use crate::syntax::PrimitiveType;
use crate::syntax::config::{ConfigNode, PropertyNode, Value};

/// Pre-pass: declare a config record in its binding's group.
pub fn declare_config(
    node: &ConfigNode,
    binding: &Binding,
    table: &mut SymbolTable,
    allow_override: bool,
    reporter: &mut Reporter,
) {
    let symbol = ConfigSymbol {
        group: binding.group.clone(),
        name: node.name.name.clone(),
    };
    if !table.declare_config(symbol, allow_override) {
        reporter.error(
            DiagnosticKind::DuplicateDeclaration,
            node.name.range,
            format!(
                "config '{}' is already declared in group '{}'",
                node.name.name, binding.group
            ),
        );
    }
}

pub struct ConfigChecker<'a> {
    table: &'a SymbolTable,
    binding: &'a Binding,
}

impl<'a> ConfigChecker<'a> {
    pub fn new(table: &'a SymbolTable, binding: &'a Binding) -> Self {
        Self { table, binding }
    }

    pub fn check(&self, node: &ConfigNode, reporter: &mut Reporter) {
        tracing::debug!(group = %self.binding.group, name = %node.name.name, "check config");
        let mut seen: FxHashSet<&SmolStr> = FxHashSet::default();
        for property in &node.properties {
            if !seen.insert(&property.key.name) {
                reporter.error(
                    DiagnosticKind::DuplicateDeclaration,
                    property.key.range,
                    format!("property '{}' appears twice", property.key.name),
                );
                continue;
            }
            self.check_property(node, property, reporter);
        }
    }

    fn check_property(&self, node: &ConfigNode, property: &PropertyNode, reporter: &mut Reporter) {
        let Some(descriptor) = self.binding.get(&property.key.name) else {
            reporter.error(
                DiagnosticKind::UnresolvedName,
                property.key.range,
                format!("unknown property '{}'", property.key.name),
            );
            return;
        };

        match &descriptor.kind {
            PropertyKind::Basic { components, .. } => {
                if property.values.len() != components.len() {
                    reporter.error(
                        DiagnosticKind::ArityMismatch,
                        property.range,
                        format!(
                            "property '{}' takes {} value(s), found {}",
                            property.key.name,
                            components.len(),
                            property.values.len()
                        ),
                    );
                }
                for (value, expected) in property.values.iter().zip(components) {
                    self.check_value(value, *expected, reporter);
                }
            }
            PropertyKind::TypeName => {
                if !matches!(&property.values[..], [Value::Type(_)]) {
                    reporter.error(
                        DiagnosticKind::MalformedReference,
                        property.range,
                        format!("property '{}' must name a single type", property.key.name),
                    );
                }
            }
            PropertyKind::TypeDispatched { type_property, .. } => {
                if let Some(dispatch) = self.dispatch_type(node, type_property, property, reporter)
                {
                    self.check_single(property, dispatch, reporter);
                }
            }
            PropertyKind::SplitArray {
                element,
                max_size,
                component_type,
                ..
            } => {
                if *element > *max_size {
                    reporter.error(
                        DiagnosticKind::RuleViolation,
                        property.range,
                        format!(
                            "property '{}' addresses element {} beyond the aggregate's limit of {}",
                            property.key.name, element, max_size
                        ),
                    );
                }
                self.check_single(property, *component_type, reporter);
            }
            PropertyKind::Param { .. } => self.check_param(property, reporter),
            PropertyKind::Map {
                type_property,
                key_type,
                ..
            } => {
                if property.values.len() != 2 {
                    reporter.error(
                        DiagnosticKind::ArityMismatch,
                        property.range,
                        format!(
                            "property '{}' takes a key and a value",
                            property.key.name
                        ),
                    );
                    return;
                }
                self.check_value(&property.values[0], *key_type, reporter);
                if let Some(dispatch) = self.dispatch_type(node, type_property, property, reporter)
                {
                    self.check_value(&property.values[1], dispatch, reporter);
                }
            }
        }

        for rule in &descriptor.rules {
            self.check_rule(node, property, rule, reporter);
        }
    }

    fn check_single(&self, property: &PropertyNode, expected: PrimitiveType, reporter: &mut Reporter) {
        if property.values.len() != 1 {
            reporter.error(
                DiagnosticKind::ArityMismatch,
                property.range,
                format!("property '{}' takes a single value", property.key.name),
            );
            return;
        }
        self.check_value(&property.values[0], expected, reporter);
    }

    fn check_param(&self, property: &PropertyNode, reporter: &mut Reporter) {
        if property.values.len() != 2 {
            reporter.error(
                DiagnosticKind::ArityMismatch,
                property.range,
                format!(
                    "property '{}' takes a parameter reference and a value",
                    property.key.name
                ),
            );
            return;
        }
        self.check_value(&property.values[0], PrimitiveType::Param, reporter);
        // The parameter's own value: any scalar literal or constant.
        match &property.values[1] {
            Value::Int(_) | Value::Long(_) | Value::Bool(_) | Value::Str(_)
            | Value::CoordGrid(_) => {}
            Value::Reference(ident) => {
                if self.table.lookup_constant(&ident.name).is_none() {
                    reporter.error(
                        DiagnosticKind::UnresolvedName,
                        ident.range,
                        format!("unknown constant '{}'", ident.name),
                    );
                }
            }
            Value::Type(lit) => {
                reporter.error(
                    DiagnosticKind::TypeMismatch,
                    lit.range,
                    "a type name is not a parameter value",
                );
            }
        }
    }

    /// Resolve the companion `type` property for a dispatched
    /// descriptor.
    fn dispatch_type(
        &self,
        node: &ConfigNode,
        type_property: &SmolStr,
        property: &PropertyNode,
        reporter: &mut Reporter,
    ) -> Option<PrimitiveType> {
        let Some(companion) = node.property(type_property) else {
            reporter.error(
                DiagnosticKind::RuleViolation,
                property.range,
                format!(
                    "property '{}' requires companion property '{}'",
                    property.key.name, type_property
                ),
            );
            return None;
        };
        match &companion.values[..] {
            [Value::Type(lit)] => Some(lit.ty),
            _ => {
                reporter.error(
                    DiagnosticKind::MalformedReference,
                    companion.range,
                    format!("property '{}' must name a single type", type_property),
                );
                None
            }
        }
    }

    fn check_rule(
        &self,
        node: &ConfigNode,
        property: &PropertyNode,
        rule: &PropertyRule,
        reporter: &mut Reporter,
    ) {
        match rule {
            PropertyRule::Range { lo, hi } => {
                for value in &property.values {
                    if let Value::Int(lit) = value {
                        if lit.value < *lo || lit.value > *hi {
                            reporter.error(
                                DiagnosticKind::RuleViolation,
                                lit.range,
                                format!("value {} is outside [{}, {}]", lit.value, lo, hi),
                            );
                        }
                    }
                }
            }
            PropertyRule::Require(other) => {
                if node.property(other).is_none() {
                    reporter.error(
                        DiagnosticKind::RuleViolation,
                        property.range,
                        format!(
                            "property '{}' requires '{}' in the same config",
                            property.key.name, other
                        ),
                    );
                }
            }
            PropertyRule::EmitEmptyIfTrue | PropertyRule::EmitEmptyIfFalse => {
                // Codegen behavior only; the boolean shape is already
                // enforced by the component check.
            }
        }
    }

    fn check_value(&self, value: &Value, expected: PrimitiveType, reporter: &mut Reporter) {
        let ok = match (value, expected) {
            (Value::Int(_), PrimitiveType::Int) => true,
            (Value::Int(_), PrimitiveType::Coord) => true,
            // Plain integer text widens to a long component.
            (Value::Int(_), PrimitiveType::Long) => true,
            (Value::Long(_), PrimitiveType::Long) => true,
            (Value::Bool(_), PrimitiveType::Boolean) => true,
            (Value::Str(_), PrimitiveType::String) => true,
            (Value::CoordGrid(_), PrimitiveType::Coord) => true,
            (Value::Str(lit), PrimitiveType::Graphic) => {
                // A string naming a registered graphic lowers to its
                // id; an unknown name stays a string payload.
                let _ = lit;
                true
            }
            (Value::Reference(ident), _) => {
                return self.check_reference(ident, expected, reporter);
            }
            _ => false,
        };
        if !ok {
            reporter.error(
                DiagnosticKind::TypeMismatch,
                value.range(),
                format!("expected a {} value", expected),
            );
        }
    }

    fn check_reference(
        &self,
        ident: &crate::syntax::script::Ident,
        expected: PrimitiveType,
        reporter: &mut Reporter,
    ) {
        if let Some(constant) = self.table.lookup_constant(&ident.name) {
            if constant.ty != expected {
                reporter.error(
                    DiagnosticKind::TypeMismatch,
                    ident.range,
                    format!(
                        "constant '{}' has type {}, expected {}",
                        ident.name, constant.ty, expected
                    ),
                );
            }
            return;
        }
        if let Some(group) = expected.reference_group() {
            let group = crate::binding::ConfigGroup::new(group);
            if self.table.lookup_config(&group, &ident.name).is_some() {
                return;
            }
        }
        if expected == PrimitiveType::Graphic && self.table.lookup_graphic(&ident.name).is_some() {
            return;
        }
        reporter.error(
            DiagnosticKind::UnresolvedName,
            ident.range,
            format!("'{}' does not resolve to a {} value", ident.name, expected),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{ConfigGroup, PropertyDescriptor};
    use crate::lexer::LexicalTable;
    use crate::parser::parse_config_file;
    use crate::semantic::symbol_table::{ConstantSymbol, ConstantValue};

    fn obj_binding() -> Binding {
        Binding::new(ConfigGroup::new("obj"))
            .define(
                "name",
                PropertyDescriptor::new(PropertyKind::Basic {
                    opcode: 0x01,
                    components: vec![PrimitiveType::String],
                }),
            )
            .define(
                "cost",
                PropertyDescriptor::new(PropertyKind::Basic {
                    opcode: 0x02,
                    components: vec![PrimitiveType::Int],
                })
                .with_rule(PropertyRule::Range { lo: 0, hi: 1000 }),
            )
            .define(
                "members",
                PropertyDescriptor::new(PropertyKind::Basic {
                    opcode: 0x0a,
                    components: vec![PrimitiveType::Boolean],
                })
                .with_rule(PropertyRule::EmitEmptyIfTrue),
            )
            .define(
                "stackable",
                PropertyDescriptor::new(PropertyKind::Basic {
                    opcode: 0x0b,
                    components: vec![PrimitiveType::Boolean],
                })
                .with_rule(PropertyRule::Require(SmolStr::new("cost"))),
            )
            .define("type", PropertyDescriptor::new(PropertyKind::TypeName))
            .define(
                "val",
                PropertyDescriptor::new(PropertyKind::TypeDispatched {
                    int_opcode: 0x12,
                    long_opcode: 0x13,
                    type_property: SmolStr::new("type"),
                }),
            )
    }

    fn check(source: &str) -> Reporter {
        check_with(source, SymbolTable::new())
    }

    fn check_with(source: &str, mut table: SymbolTable) -> Reporter {
        let lexical = LexicalTable::config();
        let parse = parse_config_file(source, &lexical);
        assert!(parse.ok(), "parse diagnostics: {:?}", parse.diagnostics);
        let binding = obj_binding();
        let mut reporter = Reporter::new();
        for config in &parse.value.configs {
            declare_config(config, &binding, &mut table, false, &mut reporter);
        }
        let checker = ConfigChecker::new(&table, &binding);
        for config in &parse.value.configs {
            checker.check(config, &mut reporter);
        }
        reporter
    }

    #[test]
    fn test_clean_config() {
        let mut reporter = check("[obj_a]\nname=\"Thing\"\ncost=10\nmembers=yes\n");
        assert!(!reporter.has_errors(), "{:?}", reporter.take());
    }

    #[test]
    fn test_unknown_property() {
        let reporter = check("[obj_a]\nweight=5\n");
        assert!(reporter.iter().any(|d| d.kind == DiagnosticKind::UnresolvedName));
    }

    #[test]
    fn test_range_rule() {
        let reporter = check("[obj_a]\ncost=2000\n");
        assert!(reporter.iter().any(|d| d.kind == DiagnosticKind::RuleViolation));
    }

    #[test]
    fn test_require_rule() {
        let reporter = check("[obj_a]\nstackable=yes\n");
        assert!(reporter.iter().any(|d| d.kind == DiagnosticKind::RuleViolation));
        let mut reporter = check("[obj_a]\nstackable=yes\ncost=5\n");
        assert!(!reporter.has_errors(), "{:?}", reporter.take());
    }

    #[test]
    fn test_type_dispatch_requires_companion() {
        let reporter = check("[obj_a]\nval=99\n");
        assert!(reporter.iter().any(|d| d.kind == DiagnosticKind::RuleViolation));
        let mut reporter = check("[obj_a]\ntype=long\nval=99L\n");
        assert!(!reporter.has_errors(), "{:?}", reporter.take());
    }

    #[test]
    fn test_value_type_mismatch() {
        let reporter = check("[obj_a]\ncost=\"ten\"\n");
        assert!(reporter.iter().any(|d| d.kind == DiagnosticKind::TypeMismatch));
    }

    #[test]
    fn test_duplicate_property() {
        let reporter = check("[obj_a]\ncost=1\ncost=2\n");
        assert!(reporter.iter().any(|d| d.kind == DiagnosticKind::DuplicateDeclaration));
    }

    #[test]
    fn test_constant_reference_value() {
        let mut table = SymbolTable::new();
        table.declare_constant(
            ConstantSymbol {
                name: SmolStr::new("max_cost"),
                ty: PrimitiveType::Int,
                value: ConstantValue::Int(100),
            },
            false,
        );
        let mut reporter = check_with("[obj_a]\ncost=max_cost\n", table);
        assert!(!reporter.has_errors(), "{:?}", reporter.take());
    }
}
