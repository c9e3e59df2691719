//! # sles-runtime
//!
//! Object/interface runtime for an embedded audio API.
//!
//! Applications never see implementation types. They create objects through
//! an engine, realize them, and then retrieve interfaces (typed capability
//! handles) from them. Every object walks the same lifecycle machine; the
//! engine bounds how many objects are live and runs asynchronous lifecycle
//! work on a small worker pool.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────── Engine object ───────────────────────────────┐
//! │  EngineItf (factory)    Instance table (32 slots)    Worker pool (bounded)   │
//! └───────────┬───────────────────────────┬──────────────────────────┬───────────┘
//!             │ create_*                  │ admit / release          │ async realize,
//!             ▼                           ▼                          │ resume, add
//! ┌──────────────────────────────── Child object ────────────────────┴───────────┐
//! │  Header: class, state, masks, callback, lock + condvar                       │
//! │  Slots:  [Object][DynamicInterfaceManagement][Play][BufferQueue][Volume]...  │
//! └──────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use sles_runtime::config::RuntimeConfig;
//! use sles_runtime::engine::create_engine;
//! use sles_runtime::object::{InterfaceId, Mode};
//!
//! let engine = create_engine(&RuntimeConfig::default(), &[])?;
//! engine.realize(Mode::Sync)?;
//! let factory = engine.get_interface(InterfaceId::Engine)?.as_engine()?;
//! let mix = factory.create_output_mix(&[])?;
//! mix.realize(Mode::Sync)?;
//! engine.destroy();
//! # Ok::<(), sles_runtime::error::SlError>(())
//! ```

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod object;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result, SlError, SlResult};

/// Runtime-wide constants
pub mod constants {
    /// Maximum live child objects per engine
    pub const MAX_INSTANCE: usize = 32;

    /// Default buffer queue depth when the data locator does not give one
    pub const BUFFER_HEADER_TYPICAL: usize = 4;

    /// Largest buffer count a queue locator may declare
    pub const MAX_QUEUED_BUFFERS: usize = u16::MAX as usize;

    pub const DEFAULTDEVICEID_AUDIOINPUT: u32 = 0xFFFF_FFFF;
    pub const DEFAULTDEVICEID_AUDIOOUTPUT: u32 = 0xFFFF_FFFE;
    pub const DEFAULTDEVICEID_LED: u32 = 0xFFFF_FFFD;
    pub const DEFAULTDEVICEID_VIBRA: u32 = 0xFFFF_FFFC;

    /// Sample rates a PCM format may declare, in milliHertz
    pub const SAMPLING_RATES_MILLIHERTZ: [u32; 13] = [
        8_000_000, 11_025_000, 12_000_000, 16_000_000, 22_050_000, 24_000_000, 32_000_000,
        44_100_000, 48_000_000, 64_000_000, 88_200_000, 96_000_000, 192_000_000,
    ];
}
