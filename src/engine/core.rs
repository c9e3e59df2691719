//! Engine object: instance registry, worker pool and the object factory

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::audio::data::{
    check_data_sink, check_data_source, DataSink, DataSource, LocatorKind, MediaEndpoints,
    EXTRACTOR_SOURCES, MIDI_SOURCES, PLAYER_SINKS, PLAYER_SOURCES, RECORDER_SINKS,
    RECORDER_SOURCES,
};
use crate::config::RuntimeConfig;
use crate::constants::{DEFAULTDEVICEID_LED, DEFAULTDEVICEID_VIBRA};
use crate::engine::pool::{Job, ThreadPool};
use crate::engine::registry::InstanceTable;
use crate::error::{SlError, SlResult};
use crate::object::class::{ClassDescriptor, ClassHooks, ObjectKind};
use crate::object::classes;
use crate::object::construct::{check_interfaces, construct};
use crate::object::instance::{Interface, InterfaceSlot, Object, ObjectParams, ObjectRef};
use crate::object::interface::{InterfaceId, InterfaceMask, InterfaceRequest};
use crate::object::lifecycle::Mode;

/// State shared by an engine object and every object it created
pub struct EngineCore {
    config: RuntimeConfig,
    registry: Mutex<InstanceTable>,
    drained: Condvar,
    pool: ThreadPool,
}

impl fmt::Debug for EngineCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineCore")
            .field("instances", &self.instance_count())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

impl EngineCore {
    fn new(config: RuntimeConfig) -> SlResult<Self> {
        let pool = ThreadPool::new(
            &config.engine.thread_name,
            config.engine.worker_threads,
            config.engine.work_queue_capacity,
        )
        .map_err(|e| {
            tracing::warn!("Failed to start engine workers: {}", e);
            SlError::ResourceExhausted
        })?;
        Ok(Self {
            registry: Mutex::new(InstanceTable::new(config.engine.max_instances)),
            drained: Condvar::new(),
            pool,
            config,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Live child objects
    pub fn instance_count(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.registry.lock().is_shut_down()
    }

    pub(crate) fn submit(&self, job: Job) -> SlResult<()> {
        self.pool.submit(job)
    }

    /// Reserve a slot, build the object outside the registry lock, then
    /// install it. A failed build gives the slot back.
    pub(crate) fn admit(&self, build: impl FnOnce(usize, u32) -> ObjectRef) -> SlResult<ObjectRef> {
        let reserved = self.registry.lock().reserve();
        let (slot, instance_id) = reserved.map_err(|err| {
            tracing::warn!("Instance table full or shutting down");
            err
        })?;

        let object = match catch_unwind(AssertUnwindSafe(|| build(slot, instance_id))) {
            Ok(object) => object,
            Err(_) => {
                tracing::error!("Building instance #{} panicked", instance_id);
                self.release(slot);
                return Err(SlError::Internal);
            }
        };

        let installed = self.registry.lock().install(slot, Arc::clone(&object));
        if let Err(err) = installed {
            tracing::warn!("Engine shut down while instance #{} was built", instance_id);
            self.release(slot);
            return Err(err);
        }
        Ok(object)
    }

    /// Free a child's slot once it reached `Destroyed`
    pub(crate) fn release(&self, slot: usize) {
        let released = {
            let mut registry = self.registry.lock();
            let released = registry.release(slot);
            self.drained.notify_all();
            released
        };
        drop(released);
    }

    /// Refuse new children, destroy the live ones, then stop the workers
    fn shutdown(&self) {
        let live = {
            let mut registry = self.registry.lock();
            registry.begin_shutdown();
            registry.live()
        };
        tracing::debug!("Engine shutting down, {} live object(s)", live.len());
        for child in live {
            child.destroy();
        }

        let mut registry = self.registry.lock();
        while !registry.is_empty() {
            self.drained.wait(&mut registry);
        }
        drop(registry);

        self.pool.shutdown();
        tracing::info!("Engine shut down");
    }
}

/// Lifecycle hooks of the engine class
#[derive(Debug, Default, Clone, Copy)]
pub struct EngineHooks;

impl ClassHooks for EngineHooks {
    fn realize(&self, object: &Object, mode: Mode) -> SlResult<()> {
        tracing::info!("Engine #{} realized ({:?})", object.instance_id(), mode);
        Ok(())
    }

    fn destroy(&self, object: &Object) {
        if let Some(core) = object.engine_ref().upgrade() {
            core.shutdown();
        }
    }
}

/// Create an engine object. The engine is returned `Unrealized`.
pub fn create_engine(config: &RuntimeConfig, requests: &[InterfaceRequest]) -> SlResult<ObjectRef> {
    config.validate().map_err(|e| {
        tracing::warn!("Rejecting engine configuration: {}", e);
        SlError::ParameterInvalid
    })?;
    let class = classes::engine();
    let exposed = check_interfaces(&class, requests)?;
    let core = Arc::new(EngineCore::new(config.clone())?);
    let params = ObjectParams {
        buffer_queue_capacity: config.buffer_queue.default_capacity,
        ..ObjectParams::default()
    };
    let engine = Arc::new(Object::new(
        class,
        Arc::downgrade(&core),
        0,
        None,
        exposed,
        params,
    ));
    tracing::info!(
        "Engine created ({} instances, {} worker(s))",
        config.engine.max_instances,
        config.engine.worker_threads
    );
    Ok(engine)
}

/// Interfaces the engine class supports
pub fn query_num_supported_engine_interfaces() -> usize {
    classes::engine().supported_interfaces().count()
}

pub fn query_supported_engine_interface(index: usize) -> SlResult<InterfaceId> {
    classes::engine()
        .supported_interfaces()
        .nth(index)
        .ok_or(SlError::ParameterInvalid)
}

/// Typed view of the `Engine` interface: the object factory
#[derive(Clone)]
pub struct EngineItf {
    itf: Interface,
    core: Arc<EngineCore>,
}

impl fmt::Debug for EngineItf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineItf")
            .field("itf", &self.itf)
            .field("core", &self.core)
            .finish()
    }
}

impl Interface {
    pub fn as_engine(&self) -> SlResult<EngineItf> {
        self.expect_id(InterfaceId::Engine)?;
        let core = self
            .object()
            .with_slot(self.index(), |slot| match slot {
                InterfaceSlot::Engine(core) => Some(Arc::clone(core)),
                _ => None,
            })?
            .ok_or(SlError::Internal)?;
        Ok(EngineItf {
            itf: self.clone(),
            core,
        })
    }
}

impl EngineItf {
    fn check(&self) -> SlResult<()> {
        self.itf.object().with_slot(self.itf.index(), |_| ())
    }

    pub fn core(&self) -> &Arc<EngineCore> {
        &self.core
    }

    pub fn instance_count(&self) -> usize {
        self.core.instance_count()
    }

    fn create_plain(
        &self,
        kind: ObjectKind,
        requests: &[InterfaceRequest],
        device_id: Option<u32>,
    ) -> SlResult<ObjectRef> {
        self.check()?;
        let class = classes::class_for(kind).ok_or(SlError::FeatureUnsupported)?;
        let exposed = check_interfaces(&class, requests)?;
        let params = ObjectParams {
            device_id,
            buffer_queue_capacity: self.core.config.buffer_queue.default_capacity,
            ..ObjectParams::default()
        };
        construct(class, &self.core, exposed, params)
    }

    fn create_media(
        &self,
        kind: ObjectKind,
        source: DataSource,
        sink: Option<DataSink>,
        sources: &[LocatorKind],
        sinks: &[LocatorKind],
        requests: &[InterfaceRequest],
    ) -> SlResult<ObjectRef> {
        self.check()?;
        let class = classes::class_for(kind).ok_or(SlError::FeatureUnsupported)?;
        let exposed = check_interfaces(&class, requests)?;
        check_data_source(&source, sources)?;
        if let Some(sink) = &sink {
            check_data_sink(sink, sinks)?;
        }

        let buffer_queue_capacity = match source.locator.num_buffers() {
            Some(num_buffers) => num_buffers,
            None => {
                if requests_buffer_queue(&class, exposed) {
                    return Err(SlError::FeatureUnsupported);
                }
                self.core.config.buffer_queue.default_capacity
            }
        };

        let params = ObjectParams {
            media: Some(MediaEndpoints { source, sink }),
            device_id: None,
            buffer_queue_capacity,
        };
        construct(class, &self.core, exposed, params)
    }

    pub fn create_led_device(
        &self,
        device_id: u32,
        requests: &[InterfaceRequest],
    ) -> SlResult<ObjectRef> {
        if device_id != DEFAULTDEVICEID_LED {
            return Err(SlError::ParameterInvalid);
        }
        self.create_plain(ObjectKind::LedDevice, requests, Some(device_id))
    }

    pub fn create_vibra_device(
        &self,
        device_id: u32,
        requests: &[InterfaceRequest],
    ) -> SlResult<ObjectRef> {
        if device_id != DEFAULTDEVICEID_VIBRA {
            return Err(SlError::ParameterInvalid);
        }
        self.create_plain(ObjectKind::VibraDevice, requests, Some(device_id))
    }

    pub fn create_audio_player(
        &self,
        source: DataSource,
        sink: DataSink,
        requests: &[InterfaceRequest],
    ) -> SlResult<ObjectRef> {
        self.create_media(
            ObjectKind::AudioPlayer,
            source,
            Some(sink),
            PLAYER_SOURCES,
            PLAYER_SINKS,
            requests,
        )
    }

    pub fn create_audio_recorder(
        &self,
        source: DataSource,
        sink: DataSink,
        requests: &[InterfaceRequest],
    ) -> SlResult<ObjectRef> {
        self.create_media(
            ObjectKind::AudioRecorder,
            source,
            Some(sink),
            RECORDER_SOURCES,
            RECORDER_SINKS,
            requests,
        )
    }

    pub fn create_midi_player(
        &self,
        source: DataSource,
        sink: DataSink,
        requests: &[InterfaceRequest],
    ) -> SlResult<ObjectRef> {
        self.create_media(
            ObjectKind::MidiPlayer,
            source,
            Some(sink),
            MIDI_SOURCES,
            PLAYER_SINKS,
            requests,
        )
    }

    pub fn create_listener(&self, requests: &[InterfaceRequest]) -> SlResult<ObjectRef> {
        self.create_plain(ObjectKind::Listener, requests, None)
    }

    pub fn create_3d_group(&self, requests: &[InterfaceRequest]) -> SlResult<ObjectRef> {
        self.create_plain(ObjectKind::Group3D, requests, None)
    }

    pub fn create_output_mix(&self, requests: &[InterfaceRequest]) -> SlResult<ObjectRef> {
        self.create_plain(ObjectKind::OutputMix, requests, None)
    }

    pub fn create_metadata_extractor(
        &self,
        source: DataSource,
        requests: &[InterfaceRequest],
    ) -> SlResult<ObjectRef> {
        self.create_media(
            ObjectKind::MetadataExtractor,
            source,
            None,
            EXTRACTOR_SOURCES,
            &[],
            requests,
        )
    }

    /// Vendor extension objects are not supported by this runtime
    pub fn create_extension_object(
        &self,
        _parameters: &[u8],
        _object_id: u32,
        _requests: &[InterfaceRequest],
    ) -> SlResult<ObjectRef> {
        self.check()?;
        Err(SlError::FeatureUnsupported)
    }

    /// Create an object of a backend-supplied class
    pub fn create_object(
        &self,
        class: Arc<ClassDescriptor>,
        requests: &[InterfaceRequest],
    ) -> SlResult<ObjectRef> {
        self.check()?;
        if class.kind() == ObjectKind::Engine {
            return Err(SlError::ParameterInvalid);
        }
        let exposed = check_interfaces(&class, requests)?;
        let params = ObjectParams {
            buffer_queue_capacity: self.core.config.buffer_queue.default_capacity,
            ..ObjectParams::default()
        };
        construct(class, &self.core, exposed, params)
    }

    pub fn query_num_supported_interfaces(&self, kind: ObjectKind) -> SlResult<usize> {
        self.check()?;
        let class = classes::class_for(kind).ok_or(SlError::FeatureUnsupported)?;
        let count = class.supported_interfaces().count();
        Ok(count)
    }

    pub fn query_supported_interface(&self, kind: ObjectKind, index: usize) -> SlResult<InterfaceId> {
        self.check()?;
        let class = classes::class_for(kind).ok_or(SlError::FeatureUnsupported)?;
        let id = class.supported_interfaces().nth(index);
        id.ok_or(SlError::ParameterInvalid)
    }
}

fn requests_buffer_queue(class: &ClassDescriptor, exposed: InterfaceMask) -> bool {
    class
        .lookup(InterfaceId::BufferQueue)
        .map_or(false, |entry| exposed.contains(entry.index))
}
