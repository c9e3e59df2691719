//! Data sources and sinks given to media objects at construction
//!
//! A locator says where data lives; a format says how to interpret it. Both
//! are checked before any instance is allocated.

use std::fmt;

use bytes::Bytes;
use serde::Serialize;

use crate::constants::{MAX_QUEUED_BUFFERS, SAMPLING_RATES_MILLIHERTZ};
use crate::error::{SlError, SlResult};
use crate::object::class::ObjectKind;
use crate::object::instance::ObjectRef;
use crate::object::lifecycle::ObjectState;

/// I/O device category addressed by an `IoDevice` locator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IoDeviceType {
    AudioInput,
    LedArray,
    Vibra,
}

/// Where media data comes from or goes to
#[derive(Clone)]
pub enum DataLocator {
    /// Fixed memory block
    Address { data: Bytes },
    /// Application-fed buffer queue
    BufferQueue { num_buffers: usize },
    IoDevice {
        device_type: IoDeviceType,
        device_id: u32,
        device: Option<ObjectRef>,
    },
    MidiBufferQueue { tpqn: u32, num_buffers: usize },
    /// Render into an output mix object
    OutputMix { output_mix: ObjectRef },
    Uri { uri: String },
}

/// Discriminant of [`DataLocator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LocatorKind {
    Address,
    BufferQueue,
    IoDevice,
    MidiBufferQueue,
    OutputMix,
    Uri,
}

impl DataLocator {
    pub fn kind(&self) -> LocatorKind {
        match self {
            DataLocator::Address { .. } => LocatorKind::Address,
            DataLocator::BufferQueue { .. } => LocatorKind::BufferQueue,
            DataLocator::IoDevice { .. } => LocatorKind::IoDevice,
            DataLocator::MidiBufferQueue { .. } => LocatorKind::MidiBufferQueue,
            DataLocator::OutputMix { .. } => LocatorKind::OutputMix,
            DataLocator::Uri { .. } => LocatorKind::Uri,
        }
    }

    /// Queue depth for buffer-queue locators
    pub fn num_buffers(&self) -> Option<usize> {
        match self {
            DataLocator::BufferQueue { num_buffers }
            | DataLocator::MidiBufferQueue { num_buffers, .. } => Some(*num_buffers),
            _ => None,
        }
    }
}

impl fmt::Debug for DataLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataLocator::Address { data } => write!(f, "Address({} bytes)", data.len()),
            DataLocator::BufferQueue { num_buffers } => write!(f, "BufferQueue({})", num_buffers),
            DataLocator::IoDevice {
                device_type,
                device_id,
                ..
            } => write!(f, "IoDevice({:?}, {:#x})", device_type, device_id),
            DataLocator::MidiBufferQueue { tpqn, num_buffers } => {
                write!(f, "MidiBufferQueue(tpqn={}, {})", tpqn, num_buffers)
            }
            DataLocator::OutputMix { output_mix } => {
                write!(f, "OutputMix(#{})", output_mix.instance_id())
            }
            DataLocator::Uri { uri } => write!(f, "Uri({})", uri),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Endianness {
    Big,
    Little,
}

/// Linear PCM layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PcmFormat {
    pub num_channels: u32,
    /// Sample rate in milliHertz
    pub samples_per_sec: u32,
    pub bits_per_sample: u32,
    pub container_size: u32,
    /// Speaker positions; zero lets the implementation choose
    pub channel_mask: u32,
    pub endianness: Endianness,
}

impl PcmFormat {
    /// 16-bit little-endian PCM with the default channel layout
    pub fn s16le(num_channels: u32, sample_rate_hz: u32) -> Self {
        Self {
            num_channels,
            samples_per_sec: sample_rate_hz.saturating_mul(1000),
            bits_per_sample: 16,
            container_size: 16,
            channel_mask: 0,
            endianness: Endianness::Little,
        }
    }

    /// Bytes per frame
    pub fn frame_size(&self) -> usize {
        (self.container_size as usize / 8) * self.num_channels as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DataFormat {
    Pcm(PcmFormat),
    Mime {
        mime_type: Option<String>,
        container: Option<String>,
    },
    /// No format; required by device and output mix locators
    Unspecified,
}

#[derive(Debug, Clone)]
pub struct DataSource {
    pub locator: DataLocator,
    pub format: DataFormat,
}

#[derive(Debug, Clone)]
pub struct DataSink {
    pub locator: DataLocator,
    pub format: DataFormat,
}

/// Validated endpoints retained by a media object
#[derive(Debug, Clone)]
pub struct MediaEndpoints {
    pub source: DataSource,
    pub sink: Option<DataSink>,
}

pub const PLAYER_SOURCES: &[LocatorKind] =
    &[LocatorKind::Address, LocatorKind::BufferQueue, LocatorKind::Uri];
pub const PLAYER_SINKS: &[LocatorKind] = &[LocatorKind::OutputMix];
pub const MIDI_SOURCES: &[LocatorKind] = &[LocatorKind::MidiBufferQueue, LocatorKind::Uri];
pub const RECORDER_SOURCES: &[LocatorKind] = &[LocatorKind::IoDevice];
pub const RECORDER_SINKS: &[LocatorKind] = &[LocatorKind::Address, LocatorKind::Uri];
pub const EXTRACTOR_SOURCES: &[LocatorKind] = &[LocatorKind::Address, LocatorKind::Uri];

const PCM_WIDTHS: [u32; 6] = [8, 16, 20, 24, 28, 32];

fn check_pcm(pcm: &PcmFormat) -> SlResult<()> {
    match pcm.num_channels {
        0 => return Err(SlError::ParameterInvalid),
        1 | 2 => {}
        _ => return Err(SlError::FeatureUnsupported),
    }
    if !SAMPLING_RATES_MILLIHERTZ.contains(&pcm.samples_per_sec) {
        return Err(SlError::ParameterInvalid);
    }
    if !PCM_WIDTHS.contains(&pcm.bits_per_sample)
        || !PCM_WIDTHS.contains(&pcm.container_size)
        || pcm.container_size < pcm.bits_per_sample
    {
        return Err(SlError::ParameterInvalid);
    }
    if pcm.channel_mask != 0 && pcm.channel_mask.count_ones() != pcm.num_channels {
        return Err(SlError::ParameterInvalid);
    }
    Ok(())
}

fn check_format(format: &DataFormat) -> SlResult<()> {
    match format {
        DataFormat::Pcm(pcm) => check_pcm(pcm),
        _ => Ok(()),
    }
}

/// Checks shared by sources and sinks
fn check_locator(locator: &DataLocator, format: &DataFormat, allowed: &[LocatorKind]) -> SlResult<()> {
    match locator {
        DataLocator::Address { data } => {
            if data.is_empty() {
                return Err(SlError::ParameterInvalid);
            }
            check_format(format)?;
        }
        DataLocator::BufferQueue { num_buffers } => {
            if *num_buffers == 0 || *num_buffers > MAX_QUEUED_BUFFERS {
                return Err(SlError::ParameterInvalid);
            }
            match format {
                DataFormat::Pcm(pcm) => check_pcm(pcm)?,
                _ => return Err(SlError::ParameterInvalid),
            }
        }
        DataLocator::MidiBufferQueue { num_buffers, .. } => {
            if *num_buffers == 0 || *num_buffers > MAX_QUEUED_BUFFERS {
                return Err(SlError::ParameterInvalid);
            }
            check_format(format)?;
        }
        DataLocator::Uri { uri } => {
            if uri.is_empty() {
                return Err(SlError::ParameterInvalid);
            }
            if !matches!(format, DataFormat::Mime { .. }) {
                return Err(SlError::ParameterInvalid);
            }
        }
        DataLocator::IoDevice { .. } => {
            if *format != DataFormat::Unspecified {
                return Err(SlError::ParameterInvalid);
            }
        }
        DataLocator::OutputMix { output_mix } => {
            if *format != DataFormat::Unspecified {
                return Err(SlError::ParameterInvalid);
            }
            if output_mix.kind() != ObjectKind::OutputMix {
                return Err(SlError::ParameterInvalid);
            }
            if output_mix.state() != ObjectState::Realized {
                return Err(SlError::InvalidState);
            }
        }
    }

    if !allowed.contains(&locator.kind()) {
        return Err(SlError::FeatureUnsupported);
    }
    Ok(())
}

pub fn check_data_source(source: &DataSource, allowed: &[LocatorKind]) -> SlResult<()> {
    check_locator(&source.locator, &source.format, allowed)
}

pub fn check_data_sink(sink: &DataSink, allowed: &[LocatorKind]) -> SlResult<()> {
    check_locator(&sink.locator, &sink.format, allowed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bq_source(num_buffers: usize, format: DataFormat) -> DataSource {
        DataSource {
            locator: DataLocator::BufferQueue { num_buffers },
            format,
        }
    }

    #[test]
    fn test_buffer_queue_source() {
        let pcm = DataFormat::Pcm(PcmFormat::s16le(2, 44_100));
        assert!(check_data_source(&bq_source(4, pcm.clone()), PLAYER_SOURCES).is_ok());
        assert_eq!(
            check_data_source(&bq_source(0, pcm.clone()), PLAYER_SOURCES),
            Err(SlError::ParameterInvalid)
        );
        assert!(check_data_source(&bq_source(MAX_QUEUED_BUFFERS, pcm.clone()), PLAYER_SOURCES).is_ok());
        assert_eq!(
            check_data_source(&bq_source(MAX_QUEUED_BUFFERS + 1, pcm), PLAYER_SOURCES),
            Err(SlError::ParameterInvalid)
        );
        assert_eq!(
            check_data_source(&bq_source(4, DataFormat::Unspecified), PLAYER_SOURCES),
            Err(SlError::ParameterInvalid)
        );
    }

    #[test]
    fn test_pcm_rules() {
        let mut pcm = PcmFormat::s16le(2, 48_000);
        assert!(check_pcm(&pcm).is_ok());

        pcm.num_channels = 0;
        assert_eq!(check_pcm(&pcm), Err(SlError::ParameterInvalid));
        pcm.num_channels = 6;
        assert_eq!(check_pcm(&pcm), Err(SlError::FeatureUnsupported));

        let mut pcm = PcmFormat::s16le(1, 44_100);
        pcm.samples_per_sec = 44_100;
        assert_eq!(check_pcm(&pcm), Err(SlError::ParameterInvalid));

        let mut pcm = PcmFormat::s16le(1, 8_000);
        pcm.container_size = 8;
        assert_eq!(check_pcm(&pcm), Err(SlError::ParameterInvalid));
        pcm.container_size = 32;
        pcm.bits_per_sample = 24;
        assert!(check_pcm(&pcm).is_ok());
        pcm.bits_per_sample = 12;
        assert_eq!(check_pcm(&pcm), Err(SlError::ParameterInvalid));

        let mut pcm = PcmFormat::s16le(2, 22_050);
        pcm.channel_mask = 0b1;
        assert_eq!(check_pcm(&pcm), Err(SlError::ParameterInvalid));
        pcm.channel_mask = 0b11;
        assert!(check_pcm(&pcm).is_ok());
    }

    #[test]
    fn test_uri_needs_mime() {
        let mime = DataFormat::Mime {
            mime_type: Some("audio/ogg".into()),
            container: None,
        };
        let source = DataSource {
            locator: DataLocator::Uri {
                uri: "file:///tmp/a.ogg".into(),
            },
            format: mime.clone(),
        };
        assert!(check_data_source(&source, PLAYER_SOURCES).is_ok());

        let empty = DataSource {
            locator: DataLocator::Uri { uri: String::new() },
            format: mime,
        };
        assert_eq!(check_data_source(&empty, PLAYER_SOURCES), Err(SlError::ParameterInvalid));

        let unformatted = DataSource {
            locator: DataLocator::Uri {
                uri: "file:///tmp/a.ogg".into(),
            },
            format: DataFormat::Unspecified,
        };
        assert_eq!(
            check_data_source(&unformatted, PLAYER_SOURCES),
            Err(SlError::ParameterInvalid)
        );
    }

    #[test]
    fn test_disallowed_locator_kind() {
        let source = DataSource {
            locator: DataLocator::IoDevice {
                device_type: IoDeviceType::AudioInput,
                device_id: crate::constants::DEFAULTDEVICEID_AUDIOINPUT,
                device: None,
            },
            format: DataFormat::Unspecified,
        };
        assert_eq!(check_data_source(&source, PLAYER_SOURCES), Err(SlError::FeatureUnsupported));
        assert!(check_data_source(&source, RECORDER_SOURCES).is_ok());
    }

    #[test]
    fn test_empty_address() {
        let source = DataSource {
            locator: DataLocator::Address { data: Bytes::new() },
            format: DataFormat::Unspecified,
        };
        assert_eq!(check_data_source(&source, PLAYER_SOURCES), Err(SlError::ParameterInvalid));
    }
}
