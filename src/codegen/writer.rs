//! Binary serialization: the single authority for on-disk layout.
//!
//! The bytecode writer flattens a script's blocks in label order,
//! resolves labels to instruction-relative offsets and symbolic
//! operands to ids, and encodes operands at the width the
//! instruction map's `large` flag selects. The config writer emits
//! one `opcode + payload` record per property and a `0x00`
//! terminator; [`read_config`] is its symmetrical inverse, driven by
//! the same binding.

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::ir::*;
use crate::binding::{Binding, ConfigGroup, PropertyKind};
use crate::catalog::InstructionMap;
use crate::driver::CompilerError;
use crate::idgen::IdProvider;
use crate::syntax::{PrimitiveType, StackType};

pub struct BytecodeWriter<'a> {
    map: &'a InstructionMap,
    ids: &'a dyn IdProvider,
}

impl<'a> BytecodeWriter<'a> {
    pub fn new(map: &'a InstructionMap, ids: &'a dyn IdProvider) -> Self {
        Self { map, ids }
    }

    pub fn write(&self, script: &BinaryScript) -> Result<Vec<u8>, CompilerError> {
        let mut index_of_label: FxHashMap<Label, usize> = FxHashMap::default();
        let mut count = 0usize;
        for block in &script.blocks {
            index_of_label.insert(block.label, count);
            count += block.instructions.len();
        }

        let mut out = Vec::new();
        let name = script.full_name.as_bytes();
        put_u16(&mut out, name.len() as u16);
        out.extend_from_slice(name);
        put_u16(&mut out, count as u16);

        let mut index = 0usize;
        for block in &script.blocks {
            for instruction in &block.instructions {
                self.encode(script, instruction, index, &index_of_label, &mut out)?;
                index += 1;
            }
        }

        put_u8(&mut out, script.int_locals.min(255) as u8);
        put_u8(&mut out, script.int_parameters.min(255) as u8);
        put_u8(&mut out, script.string_locals.min(255) as u8);
        put_u8(&mut out, script.string_parameters.min(255) as u8);
        put_u8(&mut out, script.long_locals.min(255) as u8);
        put_u8(&mut out, script.long_parameters.min(255) as u8);
        put_u16(&mut out, script.switches.len() as u16);
        Ok(out)
    }

    fn encode(
        &self,
        script: &BinaryScript,
        instruction: &Instruction,
        index: usize,
        index_of_label: &FxHashMap<Label, usize>,
        out: &mut Vec<u8>,
    ) -> Result<(), CompilerError> {
        let numeric = |operand: &Operand| -> Result<i32, CompilerError> {
            match operand {
                Operand::Int(value) => Ok(*value),
                Operand::Local(slot) => Ok(*slot as i32),
                Operand::Label(label) => {
                    let target =
                        index_of_label
                            .get(label)
                            .copied()
                            .ok_or_else(|| CompilerError::UnresolvedLabel {
                                script: script.full_name.to_string(),
                            })?;
                    Ok(target as i32 - (index as i32 + 1))
                }
                Operand::Symbol { group, name } => self
                    .ids
                    .find(group, name)
                    .ok_or_else(|| CompilerError::UnresolvedSymbolId {
                        group: group.to_string(),
                        name: name.to_string(),
                    }),
                Operand::Long(_) | Operand::Str(_) => Ok(0),
            }
        };

        match instruction.op {
            Op::Command(opcode) => {
                put_u16(out, opcode);
                put_u8(out, numeric(&instruction.operand)? as u8);
            }
            Op::Core(core) => {
                let encoding = self.map.get(core);
                if encoding.large {
                    put_u16(out, encoding.opcode);
                } else {
                    put_u8(out, encoding.opcode as u8);
                }
                match &instruction.operand {
                    Operand::Long(value) => put_i64(out, *value),
                    Operand::Str(value) => put_cstr(out, value),
                    other => {
                        let value = numeric(other)?;
                        if encoding.large {
                            put_i32(out, value);
                        } else {
                            put_u8(out, value as u8);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Config serialization
// =============================================================================

fn value_tag(value: &PropertyValue) -> u8 {
    match value {
        PropertyValue::Int(_) => 0,
        PropertyValue::Long(_) => 1,
        PropertyValue::Str(_) => 2,
        PropertyValue::Bool(_) => 3,
    }
}

fn put_value(out: &mut Vec<u8>, value: &PropertyValue) {
    match value {
        PropertyValue::Int(v) => put_i32(out, *v),
        PropertyValue::Long(v) => put_i64(out, *v),
        PropertyValue::Bool(v) => put_u8(out, *v as u8),
        PropertyValue::Str(v) => put_cstr(out, v),
    }
}

/// Serialize a config: one property record per entry, then `0x00`.
pub fn write_config(config: &BinaryConfig) -> Vec<u8> {
    let mut out = Vec::new();
    for property in &config.properties {
        put_u8(&mut out, property.opcode());
        match property {
            BinaryProperty::Basic { values, .. } => {
                for value in values {
                    put_value(&mut out, value);
                }
            }
            BinaryProperty::SplitArray {
                size_type, elements, ..
            } => {
                put_sized_count(&mut out, *size_type, elements.len());
                for element in elements {
                    for cell in element {
                        put_value(&mut out, cell);
                    }
                }
            }
            BinaryProperty::Params { entries, .. } => {
                put_u8(&mut out, entries.len() as u8);
                for (id, value) in entries {
                    put_u8(&mut out, value_tag(value));
                    put_i32(&mut out, *id);
                    put_value(&mut out, value);
                }
            }
            BinaryProperty::Map { entries, .. } => {
                put_u8(&mut out, entries.len() as u8);
                for (key, value) in entries {
                    put_value(&mut out, key);
                    put_u8(&mut out, value_tag(value));
                    put_value(&mut out, value);
                }
            }
        }
    }
    put_u8(&mut out, 0);
    out
}

/// Payload shape of one opcode, derived from a binding.
enum Shape {
    Empty,
    Basic(Vec<PrimitiveType>),
    Split {
        size_type: PrimitiveType,
        columns: Vec<PrimitiveType>,
    },
    Params,
    Map {
        key_type: PrimitiveType,
    },
}

fn binding_shapes(binding: &Binding) -> FxHashMap<u8, Shape> {
    let mut shapes: FxHashMap<u8, Shape> = FxHashMap::default();
    for (_, descriptor) in binding.iter() {
        match &descriptor.kind {
            PropertyKind::TypeName => {}
            PropertyKind::Basic { opcode, components } => {
                if descriptor.has_emit_empty_rule() {
                    shapes.insert(*opcode, Shape::Empty);
                } else {
                    shapes.insert(*opcode, Shape::Basic(components.clone()));
                }
            }
            PropertyKind::TypeDispatched {
                int_opcode,
                long_opcode,
                ..
            } => {
                shapes.insert(*int_opcode, Shape::Basic(vec![PrimitiveType::Int]));
                shapes.insert(*long_opcode, Shape::Basic(vec![PrimitiveType::Long]));
            }
            PropertyKind::SplitArray {
                opcode,
                size_type,
                component,
                component_count,
                component_type,
                ..
            } => {
                let entry = shapes.entry(*opcode).or_insert_with(|| Shape::Split {
                    size_type: *size_type,
                    columns: vec![PrimitiveType::Int; *component_count as usize],
                });
                if let Shape::Split { columns, .. } = entry {
                    if let Some(slot) = columns.get_mut(*component as usize) {
                        *slot = *component_type;
                    }
                }
            }
            PropertyKind::Param { opcode } => {
                shapes.insert(*opcode, Shape::Params);
            }
            PropertyKind::Map {
                int_opcode,
                long_opcode,
                key_type,
                ..
            } => {
                shapes.insert(*int_opcode, Shape::Map { key_type: *key_type });
                shapes.insert(*long_opcode, Shape::Map { key_type: *key_type });
            }
        }
    }
    shapes
}

/// Read a config back using the binding that produced it.
pub fn read_config(
    bytes: &[u8],
    group: ConfigGroup,
    name: impl Into<SmolStr>,
    binding: &Binding,
) -> Result<BinaryConfig, CompilerError> {
    let shapes = binding_shapes(binding);
    let mut cursor = Cursor { bytes, pos: 0 };
    let mut properties = Vec::new();

    loop {
        let opcode = cursor.u8()?;
        if opcode == 0 {
            break;
        }
        let Some(shape) = shapes.get(&opcode) else {
            return Err(CompilerError::MalformedConfig(format!(
                "unknown opcode 0x{:02x}",
                opcode
            )));
        };
        let property = match shape {
            Shape::Empty => BinaryProperty::Basic {
                opcode,
                values: Vec::new(),
            },
            Shape::Basic(components) => {
                let mut values = Vec::with_capacity(components.len());
                for component in components {
                    values.push(cursor.value(*component)?);
                }
                BinaryProperty::Basic { opcode, values }
            }
            Shape::Split { size_type, columns } => {
                let size = cursor.sized_count(*size_type)?;
                let mut elements = Vec::with_capacity(size);
                for _ in 0..size {
                    let mut element = Vec::with_capacity(columns.len());
                    for column in columns {
                        element.push(cursor.value(*column)?);
                    }
                    elements.push(element);
                }
                BinaryProperty::SplitArray {
                    opcode,
                    size_type: *size_type,
                    columns: columns.clone(),
                    elements,
                }
            }
            Shape::Params => {
                let count = cursor.u8()? as usize;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let tag = cursor.u8()?;
                    let id = cursor.i32()?;
                    entries.push((id, cursor.tagged_value(tag)?));
                }
                BinaryProperty::Params { opcode, entries }
            }
            Shape::Map { key_type } => {
                let count = cursor.u8()? as usize;
                let mut entries = Vec::with_capacity(count);
                let mut value_type = PrimitiveType::Int;
                for _ in 0..count {
                    let key = cursor.value(*key_type)?;
                    let tag = cursor.u8()?;
                    let value = cursor.tagged_value(tag)?;
                    value_type = match tag {
                        1 => PrimitiveType::Long,
                        2 => PrimitiveType::String,
                        _ => PrimitiveType::Int,
                    };
                    entries.push((key, value));
                }
                BinaryProperty::Map {
                    opcode,
                    key_type: *key_type,
                    value_type,
                    entries,
                }
            }
        };
        properties.push(property);
    }

    Ok(BinaryConfig {
        group,
        name: name.into(),
        properties,
    })
}

// =============================================================================
// Byte-level helpers
// =============================================================================

fn put_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_cstr(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(value.as_bytes());
    out.push(0);
}

/// Encode an aggregate's element count with the size type's codec.
fn put_sized_count(out: &mut Vec<u8>, size_type: PrimitiveType, count: usize) {
    match codec(size_type) {
        Codec::Byte => put_u8(out, count as u8),
        Codec::I64 => put_i64(out, count as i64),
        _ => put_i32(out, count as i32),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Codec {
    Byte,
    I32,
    I64,
    CStr,
}

fn codec(ty: PrimitiveType) -> Codec {
    match ty {
        PrimitiveType::Boolean => Codec::Byte,
        PrimitiveType::String => Codec::CStr,
        _ => match ty.stack_type() {
            StackType::Long => Codec::I64,
            _ => Codec::I32,
        },
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn truncated() -> CompilerError {
        CompilerError::MalformedConfig("unexpected end of payload".into())
    }

    fn u8(&mut self) -> Result<u8, CompilerError> {
        let value = *self.bytes.get(self.pos).ok_or_else(Self::truncated)?;
        self.pos += 1;
        Ok(value)
    }

    fn i32(&mut self) -> Result<i32, CompilerError> {
        let end = self.pos + 4;
        let slice = self.bytes.get(self.pos..end).ok_or_else(Self::truncated)?;
        self.pos = end;
        Ok(i32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
    }

    fn i64(&mut self) -> Result<i64, CompilerError> {
        let end = self.pos + 8;
        let slice = self.bytes.get(self.pos..end).ok_or_else(Self::truncated)?;
        self.pos = end;
        let mut buffer = [0u8; 8];
        buffer.copy_from_slice(slice);
        Ok(i64::from_be_bytes(buffer))
    }

    fn cstr(&mut self) -> Result<SmolStr, CompilerError> {
        let start = self.pos;
        while *self.bytes.get(self.pos).ok_or_else(Self::truncated)? != 0 {
            self.pos += 1;
        }
        let value = SmolStr::new(String::from_utf8_lossy(&self.bytes[start..self.pos]));
        self.pos += 1;
        Ok(value)
    }

    fn value(&mut self, ty: PrimitiveType) -> Result<PropertyValue, CompilerError> {
        Ok(match codec(ty) {
            Codec::Byte => PropertyValue::Bool(self.u8()? != 0),
            Codec::I32 => PropertyValue::Int(self.i32()?),
            Codec::I64 => PropertyValue::Long(self.i64()?),
            Codec::CStr => PropertyValue::Str(self.cstr()?),
        })
    }

    fn tagged_value(&mut self, tag: u8) -> Result<PropertyValue, CompilerError> {
        Ok(match tag {
            1 => PropertyValue::Long(self.i64()?),
            2 => PropertyValue::Str(self.cstr()?),
            3 => PropertyValue::Bool(self.u8()? != 0),
            _ => PropertyValue::Int(self.i32()?),
        })
    }

    fn sized_count(&mut self, size_type: PrimitiveType) -> Result<usize, CompilerError> {
        Ok(match codec(size_type) {
            Codec::Byte => self.u8()? as usize,
            Codec::I64 => self.i64()? as usize,
            _ => self.i32()? as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{PropertyDescriptor, PropertyRule};
    use crate::codegen::ir::CoreOpcode;
    use crate::idgen::{IdProvider, MemoryIdProvider};
    use crate::semantic::symbol_table::ScriptName;

    fn instruction_map() -> InstructionMap {
        let document: String = CoreOpcode::ALL
            .iter()
            .enumerate()
            .map(|(i, op)| {
                let large = matches!(
                    op,
                    CoreOpcode::PushIntConstant
                        | CoreOpcode::PushLongConstant
                        | CoreOpcode::PushStringConstant
                        | CoreOpcode::GosubWithParams
                );
                format!("{} = {{ opcode = {}, large = {} }}\n", op.name(), i, large)
            })
            .collect();
        InstructionMap::from_toml_str(&document).expect("map")
    }

    fn sample_script() -> BinaryScript {
        BinaryScript {
            extension: SmolStr::new("hsc"),
            full_name: SmolStr::new("[proc,s]"),
            blocks: vec![Block {
                label: Label(0),
                instructions: vec![
                    Instruction::core(CoreOpcode::PushIntConstant, Operand::Int(7)),
                    Instruction::core(CoreOpcode::Return, Operand::Int(0)),
                ],
            }],
            int_parameters: 1,
            long_parameters: 0,
            string_parameters: 0,
            int_locals: 2,
            long_locals: 0,
            string_locals: 0,
            switches: Vec::new(),
            info: ScriptInfo {
                path: "s.hsc".into(),
                name: ScriptName::new("proc", "s"),
            },
        }
    }

    #[test]
    fn test_bytecode_layout() {
        let map = instruction_map();
        let ids = MemoryIdProvider::new();
        let writer = BytecodeWriter::new(&map, &ids);
        let bytes = writer.write(&sample_script()).expect("write");

        let name = "[proc,s]".as_bytes();
        // u2 name length + name
        assert_eq!(&bytes[0..2], &(name.len() as u16).to_be_bytes());
        assert_eq!(&bytes[2..2 + name.len()], name);
        let mut at = 2 + name.len();
        // u2 instruction count
        assert_eq!(&bytes[at..at + 2], &2u16.to_be_bytes());
        at += 2;
        // push_int_constant is large: u2 opcode + i32 operand
        let push = map.get(CoreOpcode::PushIntConstant);
        assert_eq!(&bytes[at..at + 2], &push.opcode.to_be_bytes());
        at += 2;
        assert_eq!(&bytes[at..at + 4], &7i32.to_be_bytes());
        at += 4;
        // return is small: u1 opcode + u8 operand
        let ret = map.get(CoreOpcode::Return);
        assert_eq!(bytes[at], ret.opcode as u8);
        assert_eq!(bytes[at + 1], 0);
        at += 2;
        // locals and params: int, string, long pairs, then u2 switches
        assert_eq!(&bytes[at..], &[2, 1, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_branch_offsets_are_relative() {
        let map = instruction_map();
        let ids = MemoryIdProvider::new();
        let writer = BytecodeWriter::new(&map, &ids);
        let script = BinaryScript {
            blocks: vec![
                Block {
                    label: Label(0),
                    instructions: vec![Instruction::core(
                        CoreOpcode::Branch,
                        Operand::Label(Label(1)),
                    )],
                },
                Block {
                    label: Label(1),
                    instructions: vec![Instruction::core(CoreOpcode::Return, Operand::Int(0))],
                },
            ],
            ..sample_script()
        };
        let bytes = writer.write(&script).expect("write");
        let name_len = "[proc,s]".len();
        // branch is small: u1 opcode + u8 operand; target is the very
        // next instruction, so the relative offset is 0
        let at = 2 + name_len + 2;
        assert_eq!(bytes[at + 1], 0);
    }

    #[test]
    fn test_symbol_operand_resolution() {
        let map = instruction_map();
        let ids = MemoryIdProvider::new();
        let group = ConfigGroup::new("script");
        ids.find_or_create(&group, "[proc,helper]");
        let writer = BytecodeWriter::new(&map, &ids);
        let script = BinaryScript {
            blocks: vec![Block {
                label: Label(0),
                instructions: vec![
                    Instruction::core(
                        CoreOpcode::GosubWithParams,
                        Operand::Symbol {
                            group: group.clone(),
                            name: SmolStr::new("[proc,helper]"),
                        },
                    ),
                    Instruction::core(CoreOpcode::Return, Operand::Int(0)),
                ],
            }],
            ..sample_script()
        };
        assert!(writer.write(&script).is_ok());

        let unresolved = BinaryScript {
            blocks: vec![Block {
                label: Label(0),
                instructions: vec![Instruction::core(
                    CoreOpcode::GosubWithParams,
                    Operand::Symbol {
                        group,
                        name: SmolStr::new("[proc,missing]"),
                    },
                )],
            }],
            ..sample_script()
        };
        assert!(matches!(
            writer.write(&unresolved),
            Err(CompilerError::UnresolvedSymbolId { .. })
        ));
    }

    fn round_trip_binding() -> Binding {
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
                }),
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
                "countobj1",
                PropertyDescriptor::new(PropertyKind::SplitArray {
                    opcode: 0x20,
                    size_type: PrimitiveType::Int,
                    max_size: 10,
                    element: 1,
                    component: 0,
                    component_count: 2,
                    component_type: PrimitiveType::Obj,
                }),
            )
            .define(
                "count1",
                PropertyDescriptor::new(PropertyKind::SplitArray {
                    opcode: 0x20,
                    size_type: PrimitiveType::Int,
                    max_size: 10,
                    element: 1,
                    component: 1,
                    component_count: 2,
                    component_type: PrimitiveType::Int,
                }),
            )
            .define("param", PropertyDescriptor::new(PropertyKind::Param { opcode: 0x30 }))
    }

    #[test]
    fn test_config_round_trip() {
        let binding = round_trip_binding();
        let config = BinaryConfig {
            group: ConfigGroup::new("obj"),
            name: SmolStr::new("thing"),
            properties: vec![
                BinaryProperty::Basic {
                    opcode: 0x01,
                    values: vec![PropertyValue::Str(SmolStr::new("Thing"))],
                },
                BinaryProperty::Basic {
                    opcode: 0x02,
                    values: vec![PropertyValue::Int(250)],
                },
                BinaryProperty::Basic {
                    opcode: 0x0a,
                    values: vec![],
                },
                BinaryProperty::SplitArray {
                    opcode: 0x20,
                    size_type: PrimitiveType::Int,
                    columns: vec![PrimitiveType::Obj, PrimitiveType::Int],
                    elements: vec![vec![PropertyValue::Int(4151), PropertyValue::Int(100)]],
                },
                BinaryProperty::Params {
                    opcode: 0x30,
                    entries: vec![(7, PropertyValue::Str(SmolStr::new("fast")))],
                },
            ],
        };
        let bytes = write_config(&config);
        assert_eq!(bytes.last(), Some(&0u8));
        let back = read_config(&bytes, ConfigGroup::new("obj"), "thing", &binding).expect("read");
        assert_eq!(back, config);
    }

    #[test]
    fn test_empty_config_is_terminator_only() {
        let config = BinaryConfig {
            group: ConfigGroup::new("obj"),
            name: SmolStr::new("bare"),
            properties: vec![],
        };
        assert_eq!(write_config(&config), vec![0]);
    }
}
