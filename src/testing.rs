//! Shared fixtures for unit tests

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::audio::data::{DataFormat, DataLocator, DataSink, DataSource, PcmFormat};
use crate::config::RuntimeConfig;
use crate::engine::{create_engine, EngineItf};
use crate::error::{SlError, SlResult};
use crate::object::class::{ClassDescriptor, ClassHooks, ObjectKind};
use crate::object::instance::{Object, ObjectRef};
use crate::object::interface::{InterfaceId, InterfaceRequest, Relationship};
use crate::object::lifecycle::Mode;

pub const PROBE_KIND: u32 = 0x7001;

/// Engine realized synchronously, with its factory interface
pub fn realized_engine(config: RuntimeConfig) -> (ObjectRef, EngineItf) {
    let engine = create_engine(&config, &[]).unwrap();
    engine.realize(Mode::Sync).unwrap();
    let itf = engine
        .get_interface(InterfaceId::Engine)
        .unwrap()
        .as_engine()
        .unwrap();
    (engine, itf)
}

/// Engine with one worker and a short work queue
pub fn single_worker_engine() -> (ObjectRef, EngineItf) {
    let mut config = RuntimeConfig::default();
    config.engine.worker_threads = 1;
    config.engine.work_queue_capacity = 4;
    realized_engine(config)
}

pub fn pcm_queue_source(num_buffers: usize) -> DataSource {
    DataSource {
        locator: DataLocator::BufferQueue { num_buffers },
        format: DataFormat::Pcm(PcmFormat::s16le(2, 48_000)),
    }
}

pub fn mix_sink(mix: &ObjectRef) -> DataSink {
    DataSink {
        locator: DataLocator::OutputMix {
            output_mix: Arc::clone(mix),
        },
        format: DataFormat::Unspecified,
    }
}

/// Unrealized player with a buffer queue, rendering into a realized mix
pub fn queue_player(itf: &EngineItf, num_buffers: usize) -> ObjectRef {
    let mix = itf.create_output_mix(&[]).unwrap();
    mix.realize(Mode::Sync).unwrap();
    itf.create_audio_player(
        pcm_queue_source(num_buffers),
        mix_sink(&mix),
        &[InterfaceRequest::required(InterfaceId::BufferQueue)],
    )
    .unwrap()
}

fn probe_builder() -> crate::object::class::ClassBuilder {
    ClassDescriptor::builder(ObjectKind::Extension(PROBE_KIND), "Probe").interfaces(&[
        (InterfaceId::Volume, Relationship::Explicit),
        (InterfaceId::Equalizer, Relationship::Dynamic),
        (InterfaceId::BassBoost, Relationship::Dynamic),
        (InterfaceId::Visualization, Relationship::Optional),
    ])
}

/// Backend-defined class with default hooks
pub fn probe_class() -> Arc<ClassDescriptor> {
    Arc::new(probe_builder().build().unwrap())
}

pub fn probe_class_with(hooks: Arc<dyn ClassHooks>) -> Arc<ClassDescriptor> {
    Arc::new(probe_builder().hooks(hooks).build().unwrap())
}

/// Realize hook that reports entry and then blocks until released
pub struct GateHooks {
    entered: Sender<()>,
    release: Receiver<()>,
}

impl GateHooks {
    /// Returns the hooks, the entry signal and the release trigger
    pub fn new() -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = bounded(8);
        let (release_tx, release_rx) = bounded(8);
        let hooks = Arc::new(Self {
            entered: entered_tx,
            release: release_rx,
        });
        (hooks, entered_rx, release_tx)
    }
}

impl ClassHooks for GateHooks {
    fn realize(&self, _object: &Object, _mode: Mode) -> SlResult<()> {
        self.entered.send(()).ok();
        self.release.recv().ok();
        Ok(())
    }
}

/// Hooks failing with a fixed result code
pub struct FailingHooks(pub SlError);

impl ClassHooks for FailingHooks {
    fn realize(&self, _object: &Object, _mode: Mode) -> SlResult<()> {
        Err(self.0)
    }

    fn resume(&self, _object: &Object, _mode: Mode) -> SlResult<()> {
        Err(self.0)
    }
}

/// Hooks that panic
pub struct PanickingHooks;

impl ClassHooks for PanickingHooks {
    fn realize(&self, _object: &Object, _mode: Mode) -> SlResult<()> {
        panic!("realize hook panicked");
    }

    fn destroy(&self, _object: &Object) {
        panic!("destroy hook panicked");
    }
}

/// Interface hooks that record every call and fail for one chosen interface
#[derive(Default)]
pub struct RecordingHooks {
    calls: Mutex<Vec<(&'static str, InterfaceId)>>,
    fail_on: Mutex<Option<InterfaceId>>,
}

impl RecordingHooks {
    pub fn fail_on(&self, id: Option<InterfaceId>) {
        *self.fail_on.lock() = id;
    }

    pub fn calls(&self) -> Vec<(&'static str, InterfaceId)> {
        self.calls.lock().clone()
    }

    fn record(&self, hook: &'static str, id: InterfaceId) -> SlResult<()> {
        self.calls.lock().push((hook, id));
        if *self.fail_on.lock() == Some(id) {
            Err(SlError::ResourceExhausted)
        } else {
            Ok(())
        }
    }
}

impl ClassHooks for RecordingHooks {
    fn init_interface(&self, _object: &Object, id: InterfaceId) -> SlResult<()> {
        self.record("init", id)
    }

    fn resume_interface(&self, _object: &Object, id: InterfaceId) -> SlResult<()> {
        self.record("resume", id)
    }

    fn deinit_interface(&self, _object: &Object, id: InterfaceId) {
        self.calls.lock().push(("deinit", id));
    }
}
