//! Configuration code generation.
//!
//! One binary property per source property, except for the aggregate
//! kinds (split-array, parameter, map): those find-or-create a single
//! aggregate keyed by opcode and accumulate into it, at the position
//! of their first contributing source property.

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::ir::{BinaryConfig, BinaryProperty, PropertyValue};
use crate::binding::{Binding, ConfigGroup, PropertyKind};
use crate::driver::CompilerError;
use crate::idgen::IdProvider;
use crate::semantic::symbol_table::{ConstantValue, SymbolTable};
use crate::syntax::config::{ConfigNode, Value};
use crate::syntax::script::{BoolLit, Ident};
use crate::syntax::{PrimitiveType, StackType};

/// Lower a checked config to its binary form. Reference values are
/// resolved through the symbol table and the id provider; a hole in
/// either is an internal error, since the semantic pass and the
/// id-generation step run first.
pub fn generate_config(
    node: &ConfigNode,
    binding: &Binding,
    table: &SymbolTable,
    ids: &dyn IdProvider,
) -> Result<BinaryConfig, CompilerError> {
    let mut properties: Vec<BinaryProperty> = Vec::new();
    let mut aggregates: FxHashMap<u8, usize> = FxHashMap::default();

    for property in &node.properties {
        let Some(descriptor) = binding.get(&property.key.name) else {
            continue;
        };
        match &descriptor.kind {
            PropertyKind::TypeName => {}
            PropertyKind::Basic { opcode, components } => {
                if descriptor.has_emit_empty_rule() {
                    if emit_empty(descriptor, &property.values) {
                        properties.push(BinaryProperty::Basic {
                            opcode: *opcode,
                            values: Vec::new(),
                        });
                    }
                    continue;
                }
                let mut values = Vec::with_capacity(components.len());
                for (value, expected) in property.values.iter().zip(components) {
                    values.push(lower_value(value, *expected, table, ids)?);
                }
                properties.push(BinaryProperty::Basic {
                    opcode: *opcode,
                    values,
                });
            }
            PropertyKind::TypeDispatched {
                int_opcode,
                long_opcode,
                type_property,
            } => {
                let Some(dispatch) = companion_type(node, type_property) else {
                    continue;
                };
                let Some(value) = property.values.first() else {
                    continue;
                };
                let opcode = if dispatch.stack_type() == StackType::Int {
                    *int_opcode
                } else {
                    *long_opcode
                };
                let value = lower_value(value, dispatch, table, ids)?;
                properties.push(BinaryProperty::Basic {
                    opcode,
                    values: vec![value],
                });
            }
            PropertyKind::SplitArray {
                opcode,
                size_type,
                element,
                component,
                component_count,
                component_type,
                ..
            } => {
                let Some(value) = property.values.first() else {
                    continue;
                };
                let value = lower_value(value, *component_type, table, ids)?;
                let columns = split_columns(binding, *opcode, *component_count);
                let index = *aggregates.entry(*opcode).or_insert_with(|| {
                    properties.push(BinaryProperty::SplitArray {
                        opcode: *opcode,
                        size_type: *size_type,
                        columns: columns.clone(),
                        elements: Vec::new(),
                    });
                    properties.len() - 1
                });
                if let BinaryProperty::SplitArray { elements, .. } = &mut properties[index] {
                    let row = (*element as usize).saturating_sub(1);
                    while elements.len() <= row {
                        elements.push(columns.iter().map(|ty| default_value(*ty)).collect());
                    }
                    if let Some(cell) = elements[row].get_mut(*component as usize) {
                        *cell = value;
                    }
                }
            }
            PropertyKind::Param { opcode } => {
                let [reference, value] = &property.values[..] else {
                    continue;
                };
                let id = match reference {
                    Value::Reference(ident) => {
                        param_id(ident, table, ids)?
                    }
                    _ => continue,
                };
                let value = lower_untyped(value, table)?;
                let index = *aggregates.entry(*opcode).or_insert_with(|| {
                    properties.push(BinaryProperty::Params {
                        opcode: *opcode,
                        entries: Vec::new(),
                    });
                    properties.len() - 1
                });
                if let BinaryProperty::Params { entries, .. } = &mut properties[index] {
                    entries.push((id, value));
                }
            }
            PropertyKind::Map {
                int_opcode,
                long_opcode,
                type_property,
                key_type,
            } => {
                let Some(dispatch) = companion_type(node, type_property) else {
                    continue;
                };
                let [key, value] = &property.values[..] else {
                    continue;
                };
                let opcode = if dispatch.stack_type() == StackType::Int {
                    *int_opcode
                } else {
                    *long_opcode
                };
                let key = lower_value(key, *key_type, table, ids)?;
                let value = lower_value(value, dispatch, table, ids)?;
                let value_type = stack_class(dispatch);
                let index = *aggregates.entry(opcode).or_insert_with(|| {
                    properties.push(BinaryProperty::Map {
                        opcode,
                        key_type: *key_type,
                        value_type,
                        entries: Vec::new(),
                    });
                    properties.len() - 1
                });
                if let BinaryProperty::Map { entries, .. } = &mut properties[index] {
                    entries.push((key, value));
                }
            }
        }
    }

    Ok(BinaryConfig {
        group: binding.group.clone(),
        name: node.name.name.clone(),
        properties,
    })
}

/// Whether an `EMIT_EMPTY_*` property should be present in the
/// output: the rule's polarity against the property's boolean value.
fn emit_empty(descriptor: &crate::binding::PropertyDescriptor, values: &[Value]) -> bool {
    let set = matches!(values.first(), Some(Value::Bool(BoolLit { value: true, .. })));
    let on_true = descriptor
        .rules
        .iter()
        .any(|rule| matches!(rule, crate::binding::PropertyRule::EmitEmptyIfTrue));
    if on_true { set } else { !set }
}

fn companion_type(node: &ConfigNode, type_property: &SmolStr) -> Option<PrimitiveType> {
    match node.property(type_property)?.values.first()? {
        Value::Type(lit) => Some(lit.ty),
        _ => None,
    }
}

/// Column types of a split-array aggregate, collected across every
/// contributing descriptor in the binding.
fn split_columns(binding: &Binding, opcode: u8, component_count: u16) -> Vec<PrimitiveType> {
    let mut columns = vec![PrimitiveType::Int; component_count as usize];
    for (_, descriptor) in binding.iter() {
        if let PropertyKind::SplitArray {
            opcode: other,
            component,
            component_type,
            ..
        } = &descriptor.kind
        {
            if *other == opcode {
                if let Some(slot) = columns.get_mut(*component as usize) {
                    *slot = *component_type;
                }
            }
        }
    }
    columns
}

fn default_value(ty: PrimitiveType) -> PropertyValue {
    match ty {
        PrimitiveType::Boolean => PropertyValue::Bool(false),
        PrimitiveType::String => PropertyValue::Str(SmolStr::default()),
        PrimitiveType::Long => PropertyValue::Long(0),
        _ => PropertyValue::Int(0),
    }
}

/// The codec-class primitive a dispatched value serializes as.
fn stack_class(ty: PrimitiveType) -> PrimitiveType {
    match ty.stack_type() {
        StackType::Int => PrimitiveType::Int,
        StackType::Long => PrimitiveType::Long,
        StackType::String => PrimitiveType::String,
    }
}

fn param_id(
    ident: &Ident,
    table: &SymbolTable,
    ids: &dyn IdProvider,
) -> Result<i32, CompilerError> {
    let group = ConfigGroup::new("param");
    if table.lookup_config(&group, &ident.name).is_some() {
        if let Some(id) = ids.find(&group, &ident.name) {
            return Ok(id);
        }
    }
    Err(CompilerError::UnresolvedSymbolId {
        group: group.to_string(),
        name: ident.name.to_string(),
    })
}

fn lower_value(
    value: &Value,
    expected: PrimitiveType,
    table: &SymbolTable,
    ids: &dyn IdProvider,
) -> Result<PropertyValue, CompilerError> {
    Ok(match value {
        Value::Int(lit) => {
            // Plain integer text widens to a long component.
            if expected.stack_type() == StackType::Long {
                PropertyValue::Long(lit.value as i64)
            } else {
                PropertyValue::Int(lit.value)
            }
        }
        Value::Long(lit) => PropertyValue::Long(lit.value),
        Value::Bool(lit) => PropertyValue::Bool(lit.value),
        Value::CoordGrid(lit) => PropertyValue::Int(lit.value),
        Value::Str(lit) => {
            // A string naming a registered graphic lowers to its id.
            if expected == PrimitiveType::Graphic {
                if let Some(graphic) = table.lookup_graphic(&lit.value) {
                    return Ok(PropertyValue::Int(graphic.id));
                }
            }
            PropertyValue::Str(SmolStr::new(&lit.value))
        }
        Value::Type(_) => {
            return Err(CompilerError::MalformedConfig(
                "type literal outside a companion property".into(),
            ));
        }
        Value::Reference(ident) => return lower_reference(ident, expected, table, ids),
    })
}

fn lower_reference(
    ident: &Ident,
    expected: PrimitiveType,
    table: &SymbolTable,
    ids: &dyn IdProvider,
) -> Result<PropertyValue, CompilerError> {
    if let Some(constant) = table.lookup_constant(&ident.name) {
        return Ok(constant_value(&constant.value));
    }
    if let Some(group) = expected.reference_group() {
        let group = ConfigGroup::new(group);
        if table.lookup_config(&group, &ident.name).is_some() {
            if let Some(id) = ids.find(&group, &ident.name) {
                return Ok(PropertyValue::Int(id));
            }
        }
    }
    if expected == PrimitiveType::Graphic {
        if let Some(graphic) = table.lookup_graphic(&ident.name) {
            return Ok(PropertyValue::Int(graphic.id));
        }
    }
    Err(CompilerError::UnresolvedSymbolId {
        group: expected.to_string(),
        name: ident.name.to_string(),
    })
}

/// Lower a parameter's value, whose type comes from the literal
/// itself.
fn lower_untyped(value: &Value, table: &SymbolTable) -> Result<PropertyValue, CompilerError> {
    Ok(match value {
        Value::Int(lit) => PropertyValue::Int(lit.value),
        Value::Long(lit) => PropertyValue::Long(lit.value),
        Value::Bool(lit) => PropertyValue::Bool(lit.value),
        Value::CoordGrid(lit) => PropertyValue::Int(lit.value),
        Value::Str(lit) => PropertyValue::Str(SmolStr::new(&lit.value)),
        Value::Reference(ident) => match table.lookup_constant(&ident.name) {
            Some(constant) => constant_value(&constant.value),
            None => {
                return Err(CompilerError::UnresolvedSymbolId {
                    group: "constant".into(),
                    name: ident.name.to_string(),
                });
            }
        },
        Value::Type(_) => {
            return Err(CompilerError::MalformedConfig(
                "type literal outside a companion property".into(),
            ));
        }
    })
}

fn constant_value(value: &ConstantValue) -> PropertyValue {
    match value {
        ConstantValue::Int(v) => PropertyValue::Int(*v),
        ConstantValue::Long(v) => PropertyValue::Long(*v),
        ConstantValue::Boolean(v) => PropertyValue::Bool(*v),
        ConstantValue::String(v) => PropertyValue::Str(v.clone()),
    }
}
