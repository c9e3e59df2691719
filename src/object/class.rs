//! Class descriptors
//!
//! A class is the immutable catalog shared by every instance of an object
//! kind: which interfaces exist, how each is offered, which slot of the
//! instance holds it, and the hooks run by the lifecycle machine.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{SlError, SlResult};
use crate::object::instance::Object;
use crate::object::interface::{InterfaceId, InterfaceMask, Relationship};
use crate::object::lifecycle::Mode;

/// Object kind identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectKind {
    Engine,
    LedDevice,
    VibraDevice,
    AudioPlayer,
    AudioRecorder,
    MidiPlayer,
    Listener,
    Group3D,
    OutputMix,
    MetadataExtractor,
    /// Backend-defined class
    Extension(u32),
}

impl ObjectKind {
    /// Built-in kinds, in object id order
    pub const BUILTIN: [ObjectKind; 10] = [
        ObjectKind::Engine,
        ObjectKind::LedDevice,
        ObjectKind::VibraDevice,
        ObjectKind::AudioPlayer,
        ObjectKind::AudioRecorder,
        ObjectKind::MidiPlayer,
        ObjectKind::Listener,
        ObjectKind::Group3D,
        ObjectKind::OutputMix,
        ObjectKind::MetadataExtractor,
    ];

    /// Numeric object id
    pub fn raw(self) -> u32 {
        match self {
            ObjectKind::Engine => 0x1001,
            ObjectKind::LedDevice => 0x1002,
            ObjectKind::VibraDevice => 0x1003,
            ObjectKind::AudioPlayer => 0x1004,
            ObjectKind::AudioRecorder => 0x1005,
            ObjectKind::MidiPlayer => 0x1006,
            ObjectKind::Listener => 0x1007,
            ObjectKind::Group3D => 0x1008,
            ObjectKind::OutputMix => 0x1009,
            ObjectKind::MetadataExtractor => 0x100A,
            ObjectKind::Extension(id) => id,
        }
    }
}

/// Lifecycle hooks supplied per class by a backend.
///
/// Hooks always run with the object lock released. They must not block
/// indefinitely because asynchronous requests run them on a shared worker.
pub trait ClassHooks: Send + Sync {
    /// Acquire backend resources
    fn realize(&self, _object: &Object, _mode: Mode) -> SlResult<()> {
        Ok(())
    }

    /// Reacquire resources after suspension
    fn resume(&self, _object: &Object, _mode: Mode) -> SlResult<()> {
        Ok(())
    }

    /// Release backend resources. Runs exactly once and cannot fail.
    fn destroy(&self, _object: &Object) {}

    /// Set up a dynamic interface being added at runtime. Interfaces exposed
    /// at construction are covered by `realize`. On failure the add returns
    /// to where it started.
    fn init_interface(&self, _object: &Object, _id: InterfaceId) -> SlResult<()> {
        Ok(())
    }

    /// Reacquire a suspended interface's resources. On failure the
    /// interface stays suspended.
    fn resume_interface(&self, _object: &Object, _id: InterfaceId) -> SlResult<()> {
        Ok(())
    }

    /// Tear down an initialized interface on removal or destruction
    fn deinit_interface(&self, _object: &Object, _id: InterfaceId) {}
}

/// Hooks that succeed without doing anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ClassHooks for NoopHooks {}

/// One row of a class's interface table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InterfaceEntry {
    pub id: InterfaceId,
    pub relationship: Relationship,
    /// Slot index within instances of the class
    pub index: usize,
}

/// Immutable per-class descriptor
pub struct ClassDescriptor {
    kind: ObjectKind,
    name: &'static str,
    interfaces: Vec<InterfaceEntry>,
    hooks: Arc<dyn ClassHooks>,
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("interfaces", &self.interfaces)
            .finish_non_exhaustive()
    }
}

impl ClassDescriptor {
    /// Start a class table. `Object` and `DynamicInterfaceManagement` are
    /// always the first two (implicit) entries.
    pub fn builder(kind: ObjectKind, name: &'static str) -> ClassBuilder {
        ClassBuilder::new(kind, name)
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of interface slots every instance carries
    pub fn instance_size(&self) -> usize {
        self.interfaces.len()
    }

    pub fn entries(&self) -> &[InterfaceEntry] {
        &self.interfaces
    }

    pub fn hooks(&self) -> &dyn ClassHooks {
        self.hooks.as_ref()
    }

    /// Find an interface; `None` means not present (treated as unavailable)
    pub fn lookup(&self, id: InterfaceId) -> Option<InterfaceEntry> {
        self.interfaces.iter().find(|entry| entry.id == id).copied()
    }

    pub fn entry_at(&self, index: usize) -> Option<InterfaceEntry> {
        self.interfaces.get(index).copied()
    }

    /// Slots whose interface is implicit
    pub fn implicit_mask(&self) -> InterfaceMask {
        let mut mask = InterfaceMask::empty();
        for entry in &self.interfaces {
            if entry.relationship == Relationship::Implicit {
                mask.insert(entry.index);
            }
        }
        mask
    }

    /// Interfaces the class offers in any way, in table order
    pub fn supported_interfaces(&self) -> impl Iterator<Item = InterfaceId> + '_ {
        self.interfaces
            .iter()
            .filter(|entry| entry.relationship != Relationship::Unavailable)
            .map(|entry| entry.id)
    }

    /// Same table with backend-supplied hooks
    pub fn with_hooks(&self, hooks: Arc<dyn ClassHooks>) -> ClassDescriptor {
        ClassDescriptor {
            kind: self.kind,
            name: self.name,
            interfaces: self.interfaces.clone(),
            hooks,
        }
    }
}

/// Assembles a [`ClassDescriptor`]
pub struct ClassBuilder {
    kind: ObjectKind,
    name: &'static str,
    interfaces: Vec<InterfaceEntry>,
    hooks: Arc<dyn ClassHooks>,
    duplicate: bool,
}

impl ClassBuilder {
    fn new(kind: ObjectKind, name: &'static str) -> Self {
        let mut builder = Self {
            kind,
            name,
            interfaces: Vec::new(),
            hooks: Arc::new(NoopHooks),
            duplicate: false,
        };
        builder.push(InterfaceId::Object, Relationship::Implicit);
        builder.push(InterfaceId::DynamicInterfaceManagement, Relationship::Implicit);
        builder
    }

    fn push(&mut self, id: InterfaceId, relationship: Relationship) {
        if self.interfaces.iter().any(|entry| entry.id == id) {
            self.duplicate = true;
            return;
        }
        let index = self.interfaces.len();
        self.interfaces.push(InterfaceEntry {
            id,
            relationship,
            index,
        });
    }

    pub fn interface(mut self, id: InterfaceId, relationship: Relationship) -> Self {
        self.push(id, relationship);
        self
    }

    pub fn interfaces(mut self, table: &[(InterfaceId, Relationship)]) -> Self {
        for &(id, relationship) in table {
            self.push(id, relationship);
        }
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn ClassHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Fails with `ParameterInvalid` on duplicate ids or more slots than an
    /// interface mask can hold
    pub fn build(self) -> SlResult<ClassDescriptor> {
        if self.duplicate || self.interfaces.len() > InterfaceMask::CAPACITY {
            return Err(SlError::ParameterInvalid);
        }
        Ok(self.finish())
    }

    /// Built-in tables are checked by tests instead
    pub(crate) fn finish(self) -> ClassDescriptor {
        debug_assert!(!self.duplicate, "duplicate interface in {}", self.name);
        debug_assert!(self.interfaces.len() <= InterfaceMask::CAPACITY);
        ClassDescriptor {
            kind: self.kind,
            name: self.name,
            interfaces: self.interfaces,
            hooks: self.hooks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_prepends_default_interfaces() {
        let class = ClassDescriptor::builder(ObjectKind::Extension(0x2000), "Probe")
            .interface(InterfaceId::Volume, Relationship::Explicit)
            .build()
            .unwrap();
        assert_eq!(class.instance_size(), 3);
        assert_eq!(class.lookup(InterfaceId::Object).unwrap().index, 0);
        assert_eq!(class.lookup(InterfaceId::DynamicInterfaceManagement).unwrap().index, 1);
        assert_eq!(class.lookup(InterfaceId::Volume).unwrap().index, 2);
        assert_eq!(class.implicit_mask().bits(), 0b11);
        assert!(class.lookup(InterfaceId::Play).is_none());
    }

    #[test]
    fn test_builder_rejects_duplicates() {
        let result = ClassDescriptor::builder(ObjectKind::Extension(1), "Dup")
            .interface(InterfaceId::Volume, Relationship::Explicit)
            .interface(InterfaceId::Volume, Relationship::Optional)
            .build();
        assert_eq!(result.unwrap_err(), SlError::ParameterInvalid);
    }

    #[test]
    fn test_builder_rejects_oversized_table() {
        let table: Vec<_> = InterfaceId::ALL
            .iter()
            .filter(|id| {
                !matches!(id, InterfaceId::Object | InterfaceId::DynamicInterfaceManagement)
            })
            .map(|&id| (id, Relationship::Optional))
            .collect();
        let result = ClassDescriptor::builder(ObjectKind::Extension(2), "Huge")
            .interfaces(&table)
            .build();
        assert_eq!(result.unwrap_err(), SlError::ParameterInvalid);
    }

    #[test]
    fn test_supported_interfaces_skip_unavailable() {
        let class = ClassDescriptor::builder(ObjectKind::Extension(3), "Partial")
            .interface(InterfaceId::Volume, Relationship::Unavailable)
            .interface(InterfaceId::Seek, Relationship::Dynamic)
            .build()
            .unwrap();
        let supported: Vec<_> = class.supported_interfaces().collect();
        assert_eq!(
            supported,
            vec![
                InterfaceId::Object,
                InterfaceId::DynamicInterfaceManagement,
                InterfaceId::Seek
            ]
        );
    }
}
