//! Media plumbing: data locators/formats and buffer queues

pub mod buffer_queue;
pub mod data;

pub use buffer_queue::{
    BufferQueue, BufferQueueCallback, BufferQueueEvent, BufferQueueItf, BufferQueueState,
    BufferQueueStats,
};
pub use data::{
    check_data_sink, check_data_source, DataFormat, DataLocator, DataSink, DataSource,
    IoDeviceType, LocatorKind, MediaEndpoints, PcmFormat,
};
