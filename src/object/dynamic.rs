//! Runtime addition, removal, suspension and resumption of dynamic interfaces

use std::fmt;
use std::sync::Arc;

use crate::error::{SlError, SlResult};
use crate::object::class::InterfaceEntry;
use crate::object::instance::{AsyncOp, Interface, InterfaceSlot, Object, ObjectInner};
use crate::object::interface::{InterfaceId, Relationship};
use crate::object::lifecycle::{interface_step, InterfaceInput, Mode, ObjectState};

/// Notifications delivered to the dynamic interface callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicInterfaceEvent {
    /// An asynchronous add or resume finished or was aborted
    AsyncTermination(SlResult<()>),
    /// An added interface was suspended by the resource manager
    ResourcesLost,
}

pub type DynamicInterfaceCallback = Arc<dyn Fn(InterfaceId, DynamicInterfaceEvent) + Send + Sync>;

pub(crate) fn dim_callback(inner: &ObjectInner) -> Option<DynamicInterfaceCallback> {
    inner.slots.iter().find_map(|slot| match slot {
        InterfaceSlot::DynamicInterfaceManagement(callback) => callback.clone(),
        _ => None,
    })
}

impl Object {
    fn dynamic_entry(&self, id: InterfaceId) -> SlResult<InterfaceEntry> {
        self.class()
            .lookup(id)
            .filter(|entry| entry.relationship == Relationship::Dynamic)
            .ok_or(SlError::FeatureUnsupported)
    }

    /// Add a dynamic interface. Adding one that was exposed at construction
    /// keeps its existing slot.
    pub fn add_interface(self: &Arc<Self>, id: InterfaceId, mode: Mode) -> SlResult<()> {
        let entry = self.dynamic_entry(id)?;
        let mut inner = self.lock();
        if inner.state != ObjectState::Realized {
            return Err(SlError::InvalidState);
        }
        inner.interface_states[entry.index] =
            interface_step(inner.interface_states[entry.index], InterfaceInput::Add(mode))?;
        drop(inner);

        tracing::debug!("#{}: adding {} ({:?})", self.instance_id(), id, mode);
        match mode {
            Mode::Sync => self.commit_interface(AsyncOp::AddInterface(entry.index), entry),
            Mode::Async => self.dispatch(AsyncOp::AddInterface(entry.index)),
        }
    }

    /// Resume a suspended dynamic interface
    pub fn resume_interface(self: &Arc<Self>, id: InterfaceId, mode: Mode) -> SlResult<()> {
        let entry = self.dynamic_entry(id)?;
        let mut inner = self.lock();
        if inner.state != ObjectState::Realized {
            return Err(SlError::InvalidState);
        }
        inner.interface_states[entry.index] =
            interface_step(inner.interface_states[entry.index], InterfaceInput::Resume(mode))?;
        drop(inner);

        match mode {
            Mode::Sync => self.commit_interface(AsyncOp::ResumeInterface(entry.index), entry),
            Mode::Async => self.dispatch(AsyncOp::ResumeInterface(entry.index)),
        }
    }

    /// Remove an added dynamic interface. Always synchronous.
    pub fn remove_interface(&self, id: InterfaceId) -> SlResult<()> {
        let entry = self.dynamic_entry(id)?;
        let mut inner = self.lock();
        inner.interface_states[entry.index] =
            interface_step(inner.interface_states[entry.index], InterfaceInput::Remove)?;
        let slot = std::mem::replace(&mut inner.slots[entry.index], InterfaceSlot::Vacant);
        inner.gotten.remove(entry.index);
        inner.loss_of_control.remove(entry.index);
        drop(inner);

        if !slot.is_vacant() {
            self.deinit_interface(id);
        }
        drop(slot);

        let mut inner = self.lock();
        inner.interface_states[entry.index] = interface_step(
            inner.interface_states[entry.index],
            InterfaceInput::Commit { success: true },
        )?;
        self.notify_all();
        drop(inner);
        tracing::debug!("#{}: removed {}", self.instance_id(), id);
        Ok(())
    }

    /// Resource-manager entry: suspend an added interface
    pub fn suspend_interface(&self, id: InterfaceId) -> SlResult<()> {
        let entry = self.dynamic_entry(id)?;
        let mut inner = self.lock();
        let index = entry.index;
        inner.interface_states[index] =
            interface_step(inner.interface_states[index], InterfaceInput::Suspend)?;
        inner.interface_states[index] = interface_step(
            inner.interface_states[index],
            InterfaceInput::Commit { success: true },
        )?;
        let callback = dim_callback(&inner);
        self.notify_all();
        drop(inner);

        tracing::debug!("#{}: {} suspended", self.instance_id(), id);
        if let Some(callback) = callback {
            callback(id, DynamicInterfaceEvent::ResourcesLost);
        }
        Ok(())
    }

    /// Run the add or resume hook unlocked, then commit. A failed hook sends
    /// the interface back to where the request started.
    fn commit_interface(&self, op: AsyncOp, entry: InterfaceEntry) -> SlResult<()> {
        let hooks = self.class().hooks();
        let vacant = self.lock().slots[entry.index].is_vacant();
        let (result, fresh) = match op {
            AsyncOp::ResumeInterface(_) => {
                (self.call_hook(|| hooks.resume_interface(self, entry.id)), None)
            }
            _ if vacant => {
                let result = self.call_hook(|| hooks.init_interface(self, entry.id));
                let slot = result
                    .is_ok()
                    .then(|| InterfaceSlot::init(entry.id, self.params(), self.engine_ref()));
                (result, slot)
            }
            _ => (Ok(()), None),
        };
        if let Err(err) = result {
            tracing::warn!("#{}: {:?} of {} failed: {}", self.instance_id(), op, entry.id, err);
        }

        let mut inner = self.lock();
        if let Some(slot) = fresh {
            if inner.slots[entry.index].is_vacant() {
                inner.slots[entry.index] = slot;
            }
        }
        let committed = interface_step(
            inner.interface_states[entry.index],
            InterfaceInput::Commit {
                success: result.is_ok(),
            },
        );
        self.notify_all();
        let state = committed?;
        inner.interface_states[entry.index] = state;
        drop(inner);

        tracing::debug!("#{}: {:?} committed, {} is {:?}", self.instance_id(), op, entry.id, state);
        result
    }

    /// Worker side of an asynchronous add or resume
    pub(crate) fn complete_interface_request(&self, op: AsyncOp, index: usize) {
        let Some(entry) = self.class().entry_at(index) else {
            return;
        };
        let mut inner = self.lock();
        if !inner.state.has_been_realized() {
            tracing::debug!("#{}: dropping {:?}, object is {:?}", self.instance_id(), op, inner.state);
            return;
        }
        let dispatched = match interface_step(inner.interface_states[index], InterfaceInput::Dispatch) {
            Ok(state) => state,
            Err(rejected) => {
                tracing::debug!("#{}: dropping stale {:?}: {}", self.instance_id(), op, rejected);
                return;
            }
        };
        inner.interface_states[index] = dispatched;

        if !dispatched.is_transient() {
            // aborted before dispatch
            let callback = dim_callback(&inner);
            self.notify_all();
            drop(inner);
            tracing::debug!("#{}: {:?} aborted", self.instance_id(), op);
            if let Some(callback) = callback {
                callback(
                    entry.id,
                    DynamicInterfaceEvent::AsyncTermination(Err(SlError::OperationAborted)),
                );
            }
            return;
        }
        drop(inner);

        let result = self.commit_interface(op, entry);
        let callback = dim_callback(&self.lock());
        if let Some(callback) = callback {
            callback(entry.id, DynamicInterfaceEvent::AsyncTermination(result));
        }
    }
}

/// Typed view of the `DynamicInterfaceManagement` interface
#[derive(Clone)]
pub struct DynamicInterfaceManagementItf {
    itf: Interface,
}

impl fmt::Debug for DynamicInterfaceManagementItf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DynamicInterfaceManagementItf").field(&self.itf).finish()
    }
}

impl Interface {
    pub fn as_dynamic_interface_management(&self) -> SlResult<DynamicInterfaceManagementItf> {
        self.expect_id(InterfaceId::DynamicInterfaceManagement)?;
        Ok(DynamicInterfaceManagementItf { itf: self.clone() })
    }
}

impl DynamicInterfaceManagementItf {
    fn check(&self) -> SlResult<()> {
        self.itf.object().with_slot(self.itf.index(), |_| ())
    }

    pub fn add_interface(&self, id: InterfaceId, mode: Mode) -> SlResult<()> {
        self.check()?;
        self.itf.object().add_interface(id, mode)
    }

    pub fn remove_interface(&self, id: InterfaceId) -> SlResult<()> {
        self.check()?;
        self.itf.object().remove_interface(id)
    }

    pub fn resume_interface(&self, id: InterfaceId, mode: Mode) -> SlResult<()> {
        self.check()?;
        self.itf.object().resume_interface(id, mode)
    }

    pub fn register_callback(&self, callback: Option<DynamicInterfaceCallback>) -> SlResult<()> {
        self.itf.object().with_slot(self.itf.index(), |slot| {
            if let InterfaceSlot::DynamicInterfaceManagement(current) = slot {
                *current = callback;
            }
        })
    }
}
