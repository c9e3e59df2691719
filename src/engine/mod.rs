//! Engine: the root object, its instance registry and worker pool

mod core;
mod pool;
pub mod registry;

pub use self::core::{
    create_engine, query_num_supported_engine_interfaces, query_supported_engine_interface,
    EngineCore, EngineHooks, EngineItf,
};
pub use registry::SlotMask;
