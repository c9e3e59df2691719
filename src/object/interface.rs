//! Interface identifiers, class relationships and interface masks

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

/// Identifier of a capability an object may expose.
///
/// The discriminant order is stable and is the global enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum InterfaceId {
    Commit3D,
    Doppler3D,
    Grouping3D,
    Location3D,
    Macroscopic3D,
    Source3D,
    AudioDecoderCapabilities,
    AudioEncoder,
    AudioEncoderCapabilities,
    AudioIoDeviceCapabilities,
    BassBoost,
    BufferQueue,
    DeviceVolume,
    DynamicInterfaceManagement,
    DynamicSource,
    EffectSend,
    Engine,
    EngineCapabilities,
    EnvironmentalReverb,
    Equalizer,
    LedArray,
    MetadataExtraction,
    MetadataTraversal,
    MidiMessage,
    MidiMuteSolo,
    MidiTempo,
    MidiTime,
    MuteSolo,
    Null,
    Object,
    OutputMix,
    OutputMixExt,
    Pitch,
    Play,
    PlaybackRate,
    PrefetchStatus,
    PresetReverb,
    RatePitch,
    Record,
    Seek,
    ThreadSync,
    Vibra,
    Virtualizer,
    Visualization,
    Volume,
}

const fn iid(n: u8) -> Uuid {
    Uuid::from_u128(0x3a5e_0000_c1a5_11e0_9e7c_0002_a5d5_c51b | ((n as u128) << 96))
}

impl InterfaceId {
    /// Every known interface, in enumeration order
    pub const ALL: [InterfaceId; 45] = [
        InterfaceId::Commit3D,
        InterfaceId::Doppler3D,
        InterfaceId::Grouping3D,
        InterfaceId::Location3D,
        InterfaceId::Macroscopic3D,
        InterfaceId::Source3D,
        InterfaceId::AudioDecoderCapabilities,
        InterfaceId::AudioEncoder,
        InterfaceId::AudioEncoderCapabilities,
        InterfaceId::AudioIoDeviceCapabilities,
        InterfaceId::BassBoost,
        InterfaceId::BufferQueue,
        InterfaceId::DeviceVolume,
        InterfaceId::DynamicInterfaceManagement,
        InterfaceId::DynamicSource,
        InterfaceId::EffectSend,
        InterfaceId::Engine,
        InterfaceId::EngineCapabilities,
        InterfaceId::EnvironmentalReverb,
        InterfaceId::Equalizer,
        InterfaceId::LedArray,
        InterfaceId::MetadataExtraction,
        InterfaceId::MetadataTraversal,
        InterfaceId::MidiMessage,
        InterfaceId::MidiMuteSolo,
        InterfaceId::MidiTempo,
        InterfaceId::MidiTime,
        InterfaceId::MuteSolo,
        InterfaceId::Null,
        InterfaceId::Object,
        InterfaceId::OutputMix,
        InterfaceId::OutputMixExt,
        InterfaceId::Pitch,
        InterfaceId::Play,
        InterfaceId::PlaybackRate,
        InterfaceId::PrefetchStatus,
        InterfaceId::PresetReverb,
        InterfaceId::RatePitch,
        InterfaceId::Record,
        InterfaceId::Seek,
        InterfaceId::ThreadSync,
        InterfaceId::Vibra,
        InterfaceId::Virtualizer,
        InterfaceId::Visualization,
        InterfaceId::Volume,
    ];

    /// Stable UUID used by applications to name this interface
    pub const fn uuid(self) -> Uuid {
        iid(self as u8)
    }

    /// Map an application-supplied UUID back to a known interface
    pub fn from_uuid(uuid: &Uuid) -> Option<InterfaceId> {
        Self::ALL.iter().copied().find(|id| id.uuid() == *uuid)
    }

    pub fn name(self) -> &'static str {
        match self {
            InterfaceId::Commit3D => "3DCommit",
            InterfaceId::Doppler3D => "3DDoppler",
            InterfaceId::Grouping3D => "3DGrouping",
            InterfaceId::Location3D => "3DLocation",
            InterfaceId::Macroscopic3D => "3DMacroscopic",
            InterfaceId::Source3D => "3DSource",
            InterfaceId::AudioDecoderCapabilities => "AudioDecoderCapabilities",
            InterfaceId::AudioEncoder => "AudioEncoder",
            InterfaceId::AudioEncoderCapabilities => "AudioEncoderCapabilities",
            InterfaceId::AudioIoDeviceCapabilities => "AudioIODeviceCapabilities",
            InterfaceId::BassBoost => "BassBoost",
            InterfaceId::BufferQueue => "BufferQueue",
            InterfaceId::DeviceVolume => "DeviceVolume",
            InterfaceId::DynamicInterfaceManagement => "DynamicInterfaceManagement",
            InterfaceId::DynamicSource => "DynamicSource",
            InterfaceId::EffectSend => "EffectSend",
            InterfaceId::Engine => "Engine",
            InterfaceId::EngineCapabilities => "EngineCapabilities",
            InterfaceId::EnvironmentalReverb => "EnvironmentalReverb",
            InterfaceId::Equalizer => "Equalizer",
            InterfaceId::LedArray => "LEDArray",
            InterfaceId::MetadataExtraction => "MetadataExtraction",
            InterfaceId::MetadataTraversal => "MetadataTraversal",
            InterfaceId::MidiMessage => "MIDIMessage",
            InterfaceId::MidiMuteSolo => "MIDIMuteSolo",
            InterfaceId::MidiTempo => "MIDITempo",
            InterfaceId::MidiTime => "MIDITime",
            InterfaceId::MuteSolo => "MuteSolo",
            InterfaceId::Null => "Null",
            InterfaceId::Object => "Object",
            InterfaceId::OutputMix => "OutputMix",
            InterfaceId::OutputMixExt => "OutputMixExt",
            InterfaceId::Pitch => "Pitch",
            InterfaceId::Play => "Play",
            InterfaceId::PlaybackRate => "PlaybackRate",
            InterfaceId::PrefetchStatus => "PrefetchStatus",
            InterfaceId::PresetReverb => "PresetReverb",
            InterfaceId::RatePitch => "RatePitch",
            InterfaceId::Record => "Record",
            InterfaceId::Seek => "Seek",
            InterfaceId::ThreadSync => "ThreadSync",
            InterfaceId::Vibra => "Vibra",
            InterfaceId::Virtualizer => "Virtualizer",
            InterfaceId::Visualization => "Visualization",
            InterfaceId::Volume => "Volume",
        }
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a class offers an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Relationship {
    /// Always present, never requested
    Implicit,
    /// Present when requested at construction
    Explicit,
    /// May be granted when requested, cannot be required
    Optional,
    /// Requestable at construction, addable and removable at runtime
    Dynamic,
    /// Never offered
    Unavailable,
}

impl Relationship {
    /// Whether a caller may mark the interface as required
    pub fn is_guaranteed(self) -> bool {
        matches!(self, Relationship::Implicit | Relationship::Explicit)
    }
}

/// One entry of an interface request made at construction time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceRequest {
    pub iid: Uuid,
    pub required: bool,
}

impl InterfaceRequest {
    pub fn new(id: InterfaceId, required: bool) -> Self {
        Self {
            iid: id.uuid(),
            required,
        }
    }

    pub fn required(id: InterfaceId) -> Self {
        Self::new(id, true)
    }

    pub fn optional(id: InterfaceId) -> Self {
        Self::new(id, false)
    }

    /// Request by raw UUID, as received at the application boundary
    pub fn from_uuid(iid: Uuid, required: bool) -> Self {
        Self { iid, required }
    }
}

/// Bitmask over a class's interface slot indices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct InterfaceMask(u32);

impl InterfaceMask {
    /// Largest slot count a mask can describe
    pub const CAPACITY: usize = 32;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn insert(&mut self, index: usize) {
        debug_assert!(index < Self::CAPACITY);
        self.0 |= 1 << index;
    }

    pub fn remove(&mut self, index: usize) {
        debug_assert!(index < Self::CAPACITY);
        self.0 &= !(1 << index);
    }

    pub fn contains(self, index: usize) -> bool {
        index < Self::CAPACITY && self.0 & (1 << index) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Set indices, lowest first
    pub fn iter(self) -> impl Iterator<Item = usize> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let index = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            Some(index)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuids_are_unique_and_reversible() {
        for (i, id) in InterfaceId::ALL.iter().enumerate() {
            assert_eq!(*id as usize, i);
            assert_eq!(InterfaceId::from_uuid(&id.uuid()), Some(*id));
        }
        let mut uuids: Vec<_> = InterfaceId::ALL.iter().map(|id| id.uuid()).collect();
        uuids.sort();
        uuids.dedup();
        assert_eq!(uuids.len(), InterfaceId::ALL.len());
    }

    #[test]
    fn test_unknown_uuid() {
        assert_eq!(InterfaceId::from_uuid(&Uuid::nil()), None);
    }

    #[test]
    fn test_mask_iteration_order() {
        let mut mask = InterfaceMask::empty();
        mask.insert(5);
        mask.insert(0);
        mask.insert(31);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0, 5, 31]);
        assert_eq!(mask.count(), 3);
        mask.remove(5);
        assert!(!mask.contains(5));
        assert!(!mask.contains(40));
    }
}
