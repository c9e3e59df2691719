//! Object instances
//!
//! An [`Object`] is one live instance of a class: the header (identity,
//! owning engine, class, callback, masks, priority, lock, condition variable,
//! states) plus one slot per interface the class declares. Every slot exists
//! from construction onward, exposed or not.
//!
//! All mutable state sits behind a single lock. Hooks and callbacks are always
//! invoked with that lock released.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::audio::buffer_queue::BufferQueue;
use crate::audio::data::MediaEndpoints;
use crate::engine::EngineCore;
use crate::error::{SlError, SlResult};
use crate::object::class::{ClassDescriptor, ObjectKind};
use crate::object::dynamic::{dim_callback, DynamicInterfaceCallback, DynamicInterfaceEvent};
use crate::object::interface::{InterfaceId, InterfaceMask};
use crate::object::lifecycle::{
    interface_step, object_step, InterfaceInput, InterfaceState, Mode, ObjectInput, ObjectState,
    Phase,
};

/// Shared handle to an object
pub type ObjectRef = Arc<Object>;

/// Object-level application callback; the closure carries its own context
pub type ObjectCallback = Arc<dyn Fn(ObjectEvent) + Send + Sync>;

/// Notifications delivered to the object callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectEvent {
    /// An asynchronous realize or resume finished, failed or was aborted
    AsyncTermination {
        result: SlResult<()>,
        state: ObjectState,
    },
    /// The object was suspended by the resource manager
    ResourcesLost { state: ObjectState },
}

/// Storage behind one interface of an instance
pub(crate) enum InterfaceSlot {
    /// Declared but never initialized, or deinitialized
    Vacant,
    /// Initialized; the runtime keeps no state for it
    Plain,
    DynamicInterfaceManagement(Option<DynamicInterfaceCallback>),
    BufferQueue(BufferQueue),
    Engine(Arc<EngineCore>),
}

impl InterfaceSlot {
    pub(crate) fn init(id: InterfaceId, params: &ObjectParams, engine: &Weak<EngineCore>) -> Self {
        match id {
            InterfaceId::DynamicInterfaceManagement => InterfaceSlot::DynamicInterfaceManagement(None),
            InterfaceId::BufferQueue => {
                InterfaceSlot::BufferQueue(BufferQueue::new(params.buffer_queue_capacity))
            }
            InterfaceId::Engine => match engine.upgrade() {
                Some(core) => InterfaceSlot::Engine(core),
                None => InterfaceSlot::Plain,
            },
            _ => InterfaceSlot::Plain,
        }
    }

    pub(crate) fn is_vacant(&self) -> bool {
        matches!(self, InterfaceSlot::Vacant)
    }
}

/// Immutable per-instance construction data
#[derive(Debug, Clone, Default)]
pub(crate) struct ObjectParams {
    pub media: Option<MediaEndpoints>,
    pub device_id: Option<u32>,
    pub buffer_queue_capacity: usize,
}

/// Mutable header fields and interface slots, guarded by the object lock
pub(crate) struct ObjectInner {
    pub state: ObjectState,
    pub interface_states: Vec<InterfaceState>,
    pub slots: Vec<InterfaceSlot>,
    pub gotten: InterfaceMask,
    pub loss_of_control: InterfaceMask,
    pub priority: i32,
    pub preemptable: bool,
    pub callback: Option<ObjectCallback>,
}

impl ObjectInner {
    /// A hook or an unlocked phase is running for the object or one of its
    /// interfaces
    fn in_flight(&self) -> bool {
        let object_busy = matches!(
            self.state,
            ObjectState::Realizing(Phase::Committing)
                | ObjectState::Resuming {
                    phase: Phase::Committing,
                    ..
                }
                | ObjectState::Suspending
                | ObjectState::Destroying
        );
        object_busy
            || self.interface_states.iter().any(|state| {
                matches!(
                    state,
                    InterfaceState::Adding {
                        phase: Phase::Committing,
                        ..
                    } | InterfaceState::Resuming(Phase::Committing)
                        | InterfaceState::Removing
                        | InterfaceState::Suspending
                )
            })
    }

    /// Move every pending request to its aborted variant
    fn abort_pending(&mut self) {
        if let Ok(next) = object_step(self.state, ObjectInput::Abort) {
            self.state = next;
        }
        for state in self.interface_states.iter_mut() {
            if let Ok(next) = interface_step(*state, InterfaceInput::Abort) {
                *state = next;
            }
        }
    }

    /// Settle aborted requests that no worker has reported yet. Returns
    /// whether the object had one, and the interface slots that did.
    fn settle_aborted(&mut self) -> (bool, Vec<usize>) {
        let object = matches!(
            self.state,
            ObjectState::Realizing(Phase::Aborted)
                | ObjectState::Resuming {
                    phase: Phase::Aborted,
                    ..
                }
        );
        if object {
            self.state = object_step(self.state, ObjectInput::Dispatch).unwrap_or(self.state);
        }

        let mut interfaces = Vec::new();
        for (index, state) in self.interface_states.iter_mut().enumerate() {
            if matches!(
                state,
                InterfaceState::Adding {
                    phase: Phase::Aborted,
                    ..
                } | InterfaceState::Resuming(Phase::Aborted)
            ) {
                *state = interface_step(*state, InterfaceInput::Dispatch).unwrap_or(*state);
                interfaces.push(index);
            }
        }
        (object, interfaces)
    }
}

/// Asynchronous work an object queues on its engine's pool
#[derive(Debug, Clone, Copy)]
pub(crate) enum AsyncOp {
    Realize,
    Resume,
    AddInterface(usize),
    ResumeInterface(usize),
}

/// A live object instance
pub struct Object {
    instance_id: u32,
    registry_slot: Option<usize>,
    class: Arc<ClassDescriptor>,
    engine: Weak<EngineCore>,
    exposed: InterfaceMask,
    params: ObjectParams,
    inner: Mutex<ObjectInner>,
    cond: Condvar,
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("instance_id", &self.instance_id)
            .field("class", &self.class.name())
            .field("state", &self.state())
            .finish()
    }
}

impl Object {
    /// Build an instance with every declared slot. Exposed interfaces are
    /// initialized; the rest stay vacant and `Uninitialized`.
    pub(crate) fn new(
        class: Arc<ClassDescriptor>,
        engine: Weak<EngineCore>,
        instance_id: u32,
        registry_slot: Option<usize>,
        exposed: InterfaceMask,
        params: ObjectParams,
    ) -> Self {
        let size = class.instance_size();
        let mut interface_states = Vec::with_capacity(size);
        let mut slots = Vec::with_capacity(size);
        for entry in class.entries() {
            if exposed.contains(entry.index) {
                let state = interface_step(InterfaceState::Uninitialized, InterfaceInput::Expose)
                    .unwrap_or(InterfaceState::Exposed);
                interface_states.push(state);
                slots.push(InterfaceSlot::init(entry.id, &params, &engine));
            } else {
                interface_states.push(InterfaceState::Uninitialized);
                slots.push(InterfaceSlot::Vacant);
            }
        }

        Self {
            instance_id,
            registry_slot,
            class,
            engine,
            exposed,
            params,
            inner: Mutex::new(ObjectInner {
                state: ObjectState::Unrealized,
                interface_states,
                slots,
                gotten: InterfaceMask::empty(),
                loss_of_control: InterfaceMask::empty(),
                priority: i32::MAX,
                preemptable: false,
                callback: None,
            }),
            cond: Condvar::new(),
        }
    }

    /// Engine-scoped identity
    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    pub fn kind(&self) -> ObjectKind {
        self.class.kind()
    }

    pub fn class(&self) -> &Arc<ClassDescriptor> {
        &self.class
    }

    /// Interfaces granted at construction
    pub fn exposed_mask(&self) -> InterfaceMask {
        self.exposed
    }

    /// Data source and sink given at construction, for media objects
    pub fn media(&self) -> Option<&MediaEndpoints> {
        self.params.media.as_ref()
    }

    /// Device id given at construction, for device objects
    pub fn device_id(&self) -> Option<u32> {
        self.params.device_id
    }

    pub fn state(&self) -> ObjectState {
        self.inner.lock().state
    }

    /// State of one of the class's interfaces; `None` when the class does not
    /// declare it
    pub fn interface_state(&self, id: InterfaceId) -> Option<InterfaceState> {
        let entry = self.class.lookup(id)?;
        Some(self.inner.lock().interface_states[entry.index])
    }

    /// Whether the application retrieved the interface
    pub fn is_gotten(&self, id: InterfaceId) -> bool {
        match self.class.lookup(id) {
            Some(entry) => self.inner.lock().gotten.contains(entry.index),
            None => false,
        }
    }

    pub fn register_callback(&self, callback: Option<ObjectCallback>) -> SlResult<()> {
        let mut inner = self.inner.lock();
        if matches!(inner.state, ObjectState::Destroying | ObjectState::Destroyed) {
            return Err(SlError::InvalidState);
        }
        inner.callback = callback;
        Ok(())
    }

    /// Retrieve a handle to an exposed or added interface. The object must be
    /// realized.
    pub fn get_interface(self: &Arc<Self>, id: InterfaceId) -> SlResult<Interface> {
        let entry = self.class.lookup(id).ok_or(SlError::FeatureUnsupported)?;
        let mut inner = self.inner.lock();
        if inner.state != ObjectState::Realized {
            return Err(SlError::InvalidState);
        }
        if !inner.interface_states[entry.index].is_usable() {
            return Err(SlError::FeatureUnsupported);
        }
        inner.gotten.insert(entry.index);
        Ok(Interface {
            object: Arc::clone(self),
            id,
            index: entry.index,
        })
    }

    /// Prepare the object for use
    pub fn realize(self: &Arc<Self>, mode: Mode) -> SlResult<()> {
        self.request(ObjectInput::Realize(mode), AsyncOp::Realize, mode)
    }

    /// Reacquire resources after suspension
    pub fn resume(self: &Arc<Self>, mode: Mode) -> SlResult<()> {
        self.request(ObjectInput::Resume(mode), AsyncOp::Resume, mode)
    }

    fn request(self: &Arc<Self>, input: ObjectInput, op: AsyncOp, mode: Mode) -> SlResult<()> {
        let mut inner = self.inner.lock();
        if mode == Mode::Sync {
            while inner.state.is_transient() {
                self.cond.wait(&mut inner);
            }
        }
        inner.state = object_step(inner.state, input)?;
        drop(inner);

        tracing::debug!(
            "{} #{}: {:?} requested",
            self.class.name(),
            self.instance_id,
            input
        );

        match mode {
            Mode::Sync => self.run_object_hook(op, Mode::Sync).0,
            Mode::Async => self.dispatch(op),
        }
    }

    /// Run the realize or resume hook unlocked, then commit under the lock
    fn run_object_hook(&self, op: AsyncOp, mode: Mode) -> (SlResult<()>, ObjectState) {
        let hooks = self.class.hooks();
        let result = self.call_hook(|| match op {
            AsyncOp::Resume => hooks.resume(self, mode),
            _ => hooks.realize(self, mode),
        });
        if let Err(err) = result {
            tracing::warn!(
                "{} #{}: {:?} hook failed: {}",
                self.class.name(),
                self.instance_id,
                op,
                err
            );
        }

        let mut inner = self.inner.lock();
        let committed = object_step(
            inner.state,
            ObjectInput::Commit {
                success: result.is_ok(),
            },
        );
        let outcome = match committed {
            Ok(state) => {
                inner.state = state;
                result
            }
            Err(rejected) => Err(rejected.into()),
        };
        let state = inner.state;
        self.cond.notify_all();
        (outcome, state)
    }

    pub(crate) fn call_hook(&self, hook: impl FnOnce() -> SlResult<()>) -> SlResult<()> {
        catch_unwind(AssertUnwindSafe(hook)).unwrap_or_else(|_| {
            tracing::error!(
                "{} #{}: lifecycle hook panicked",
                self.class.name(),
                self.instance_id
            );
            Err(SlError::Internal)
        })
    }

    /// Queue the second phase of an asynchronous request. When the pool
    /// refuses it, the request is unwound to its origin.
    pub(crate) fn dispatch(self: &Arc<Self>, op: AsyncOp) -> SlResult<()> {
        let submitted = match self.engine.upgrade() {
            Some(engine) => {
                let object = Arc::clone(self);
                engine.submit(Box::new(move || object.run_async(op)))
            }
            None => Err(SlError::InvalidState),
        };

        if let Err(err) = submitted {
            tracing::warn!(
                "{} #{}: could not queue {:?}: {}",
                self.class.name(),
                self.instance_id,
                op,
                err
            );
            let mut inner = self.inner.lock();
            match op {
                AsyncOp::Realize | AsyncOp::Resume => {
                    inner.state = unwind_object(inner.state);
                }
                AsyncOp::AddInterface(index) | AsyncOp::ResumeInterface(index) => {
                    inner.interface_states[index] = unwind_interface(inner.interface_states[index]);
                }
            }
            self.cond.notify_all();
            return Err(err);
        }
        Ok(())
    }

    /// Worker-side entry point
    fn run_async(&self, op: AsyncOp) {
        match op {
            AsyncOp::Realize | AsyncOp::Resume => self.complete_object_request(op),
            AsyncOp::AddInterface(index) | AsyncOp::ResumeInterface(index) => {
                self.complete_interface_request(op, index)
            }
        }
    }

    fn complete_object_request(&self, op: AsyncOp) {
        let mut inner = self.inner.lock();
        let dispatched = match object_step(inner.state, ObjectInput::Dispatch) {
            Ok(state) => state,
            Err(rejected) => {
                tracing::debug!(
                    "{} #{}: dropping stale {:?}: {}",
                    self.class.name(),
                    self.instance_id,
                    op,
                    rejected
                );
                return;
            }
        };
        inner.state = dispatched;

        if dispatched.is_settled() {
            // aborted before dispatch
            self.cond.notify_all();
            let callback = inner.callback.clone();
            drop(inner);
            tracing::debug!(
                "{} #{}: {:?} aborted",
                self.class.name(),
                self.instance_id,
                op
            );
            if let Some(callback) = callback {
                callback(ObjectEvent::AsyncTermination {
                    result: Err(SlError::OperationAborted),
                    state: dispatched,
                });
            }
            return;
        }
        drop(inner);

        let (result, state) = self.run_object_hook(op, Mode::Async);
        let callback = self.inner.lock().callback.clone();
        if let Some(callback) = callback {
            callback(ObjectEvent::AsyncTermination { result, state });
        }
    }

    /// Cancel asynchronous requests that no worker has picked up yet.
    /// Requests already running are unaffected.
    pub fn abort_async_operation(&self) {
        self.inner.lock().abort_pending();
    }

    /// Resource-manager entry: release the object's active resources
    pub fn suspend(&self) -> SlResult<()> {
        let mut inner = self.inner.lock();
        while inner.state.is_transient() {
            self.cond.wait(&mut inner);
        }
        inner.state = object_step(inner.state, ObjectInput::Suspend)?;
        inner.state = object_step(inner.state, ObjectInput::Commit { success: true })?;
        let state = inner.state;
        let callback = inner.callback.clone();
        self.cond.notify_all();
        drop(inner);

        tracing::debug!("{} #{}: suspended", self.class.name(), self.instance_id);
        if let Some(callback) = callback {
            callback(ObjectEvent::ResourcesLost { state });
        }
        Ok(())
    }

    /// Destroy the object. Never fails; a second call returns once the
    /// first has finished. Queued requests are aborted and reported as
    /// `OperationAborted` once the object is destroyed.
    pub fn destroy(&self) {
        let mut inner = self.inner.lock();
        loop {
            inner.abort_pending();
            if !inner.in_flight() {
                break;
            }
            self.cond.wait(&mut inner);
        }
        if inner.state.is_terminal() {
            return;
        }
        let (object_aborted, interfaces_aborted) = inner.settle_aborted();
        let callback = inner.callback.clone();
        let interface_callback = dim_callback(&inner);
        match object_step(inner.state, ObjectInput::Destroy) {
            Ok(state) => inner.state = state,
            Err(_) => return,
        }
        drop(inner);

        tracing::debug!("{} #{}: destroying", self.class.name(), self.instance_id);
        let hooks = self.class.hooks();
        if catch_unwind(AssertUnwindSafe(|| hooks.destroy(self))).is_err() {
            tracing::error!(
                "{} #{}: destroy hook panicked",
                self.class.name(),
                self.instance_id
            );
        }

        let slots: Vec<InterfaceSlot> = self
            .inner
            .lock()
            .slots
            .iter_mut()
            .map(|slot| std::mem::replace(slot, InterfaceSlot::Vacant))
            .collect();
        for (entry, slot) in self.class.entries().iter().zip(&slots).rev() {
            if !slot.is_vacant() {
                self.deinit_interface(entry.id);
            }
        }
        drop(slots);

        let mut inner = self.inner.lock();
        for state in inner.interface_states.iter_mut() {
            *state = InterfaceState::Uninitialized;
        }
        inner.gotten = InterfaceMask::empty();
        inner.loss_of_control = InterfaceMask::empty();
        inner.callback = None;
        inner.state = object_step(inner.state, ObjectInput::Commit { success: true })
            .unwrap_or(ObjectState::Destroyed);
        let state = inner.state;
        self.cond.notify_all();
        drop(inner);

        if let (Some(engine), Some(slot)) = (self.engine.upgrade(), self.registry_slot) {
            engine.release(slot);
        }
        tracing::debug!("{} #{}: destroyed", self.class.name(), self.instance_id);

        let aborted = Err(SlError::OperationAborted);
        if let (true, Some(callback)) = (object_aborted, callback) {
            callback(ObjectEvent::AsyncTermination {
                result: aborted,
                state,
            });
        }
        if let Some(callback) = interface_callback {
            for index in interfaces_aborted {
                if let Some(entry) = self.class.entry_at(index) {
                    callback(entry.id, DynamicInterfaceEvent::AsyncTermination(aborted));
                }
            }
        }
    }

    /// Run the interface teardown hook unlocked
    pub(crate) fn deinit_interface(&self, id: InterfaceId) {
        let hooks = self.class.hooks();
        if catch_unwind(AssertUnwindSafe(|| hooks.deinit_interface(self, id))).is_err() {
            tracing::error!(
                "{} #{}: deinit hook for {} panicked",
                self.class.name(),
                self.instance_id,
                id
            );
        }
    }

    pub fn set_priority(&self, priority: i32, preemptable: bool) {
        let mut inner = self.inner.lock();
        inner.priority = priority;
        inner.preemptable = preemptable;
    }

    /// `(priority, preemptable)`
    pub fn priority(&self) -> (i32, bool) {
        let inner = self.inner.lock();
        (inner.priority, inner.preemptable)
    }

    /// Enable or disable loss-of-control notifications for the listed
    /// interfaces. Interfaces the class does not declare are ignored.
    pub fn set_loss_of_control_interfaces(&self, ids: &[InterfaceId], enabled: bool) {
        let mut inner = self.inner.lock();
        for &id in ids {
            if let Some(entry) = self.class.lookup(id) {
                if enabled {
                    inner.loss_of_control.insert(entry.index);
                } else {
                    inner.loss_of_control.remove(entry.index);
                }
            }
        }
    }

    pub fn loss_of_control_mask(&self) -> InterfaceMask {
        self.inner.lock().loss_of_control
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ObjectInner> {
        self.inner.lock()
    }

    pub(crate) fn notify_all(&self) {
        self.cond.notify_all();
    }

    pub(crate) fn params(&self) -> &ObjectParams {
        &self.params
    }

    pub(crate) fn registry_slot(&self) -> Option<usize> {
        self.registry_slot
    }

    pub(crate) fn engine_ref(&self) -> &Weak<EngineCore> {
        &self.engine
    }

    /// Run `f` on a usable interface slot. The object must have been
    /// realized and not be under destruction.
    pub(crate) fn with_slot<R>(
        &self,
        index: usize,
        f: impl FnOnce(&mut InterfaceSlot) -> R,
    ) -> SlResult<R> {
        let mut inner = self.inner.lock();
        if !inner.state.has_been_realized() || !inner.interface_states[index].is_usable() {
            return Err(SlError::InvalidState);
        }
        Ok(f(&mut inner.slots[index]))
    }
}

/// Settle an undispatched object request back to its origin
fn unwind_object(state: ObjectState) -> ObjectState {
    object_step(state, ObjectInput::Abort)
        .and_then(|aborted| object_step(aborted, ObjectInput::Dispatch))
        .unwrap_or(state)
}

/// Settle an undispatched interface request back to its origin
fn unwind_interface(state: InterfaceState) -> InterfaceState {
    interface_step(state, InterfaceInput::Abort)
        .and_then(|aborted| interface_step(aborted, InterfaceInput::Dispatch))
        .unwrap_or(state)
}

/// Handle to one interface of an object.
///
/// Typed views (`as_buffer_queue`, `as_engine`, ...) check the interface
/// identity; every operation re-checks that the interface is still usable.
#[derive(Clone)]
pub struct Interface {
    object: ObjectRef,
    id: InterfaceId,
    index: usize,
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface")
            .field("object", &self.object.instance_id())
            .field("id", &self.id)
            .finish()
    }
}

impl Interface {
    pub fn id(&self) -> InterfaceId {
        self.id
    }

    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn expect_id(&self, id: InterfaceId) -> SlResult<()> {
        if self.id == id {
            Ok(())
        } else {
            Err(SlError::FeatureUnsupported)
        }
    }
}
