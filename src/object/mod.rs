//! Objects, classes and interfaces

pub mod class;
pub mod classes;
pub mod construct;
pub mod dynamic;
pub mod hooks;
pub mod instance;
pub mod interface;
pub mod lifecycle;

pub use class::{ClassBuilder, ClassDescriptor, ClassHooks, InterfaceEntry, NoopHooks, ObjectKind};
pub use construct::check_interfaces;
pub use dynamic::{DynamicInterfaceCallback, DynamicInterfaceEvent, DynamicInterfaceManagementItf};
pub use hooks::MediaHooks;
pub use instance::{Interface, Object, ObjectCallback, ObjectEvent, ObjectRef};
pub use interface::{InterfaceId, InterfaceMask, InterfaceRequest, Relationship};
pub use lifecycle::{InterfaceState, Mode, ObjectState, Phase};
