//! Code generation: binary IR, generators, optimizer, and writers.

pub mod config;
pub mod ir;
pub mod optimizer;
pub mod script;
pub mod writer;

pub use config::generate_config;
pub use ir::{BinaryConfig, BinaryProperty, BinaryScript, CoreOpcode, PropertyValue};
pub use optimizer::Optimizer;
pub use script::generate_script;
pub use writer::{BytecodeWriter, read_config, write_config};
