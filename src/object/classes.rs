//! Built-in class tables

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::engine::EngineHooks;
use crate::object::class::{ClassDescriptor, ObjectKind};
use crate::object::hooks::MediaHooks;
use crate::object::interface::InterfaceId as I;
use crate::object::interface::Relationship::{Dynamic, Explicit, Implicit, Optional, Unavailable};

static ENGINE: Lazy<Arc<ClassDescriptor>> = Lazy::new(|| {
    Arc::new(
        ClassDescriptor::builder(ObjectKind::Engine, "Engine")
            .interfaces(&[
                (I::Engine, Implicit),
                (I::EngineCapabilities, Implicit),
                (I::ThreadSync, Implicit),
                (I::AudioIoDeviceCapabilities, Explicit),
                (I::AudioDecoderCapabilities, Explicit),
                (I::AudioEncoderCapabilities, Explicit),
                (I::Commit3D, Explicit),
                (I::DeviceVolume, Optional),
            ])
            .hooks(Arc::new(EngineHooks))
            .finish(),
    )
});

static LED_DEVICE: Lazy<Arc<ClassDescriptor>> = Lazy::new(|| {
    Arc::new(
        ClassDescriptor::builder(ObjectKind::LedDevice, "LEDDevice")
            .interfaces(&[(I::LedArray, Implicit)])
            .finish(),
    )
});

static VIBRA_DEVICE: Lazy<Arc<ClassDescriptor>> = Lazy::new(|| {
    Arc::new(
        ClassDescriptor::builder(ObjectKind::VibraDevice, "VibraDevice")
            .interfaces(&[(I::Vibra, Implicit)])
            .finish(),
    )
});

static AUDIO_PLAYER: Lazy<Arc<ClassDescriptor>> = Lazy::new(|| {
    Arc::new(
        ClassDescriptor::builder(ObjectKind::AudioPlayer, "AudioPlayer")
            .interfaces(&[
                (I::Play, Implicit),
                (I::Doppler3D, Dynamic),
                (I::Grouping3D, Explicit),
                (I::Location3D, Explicit),
                (I::Source3D, Explicit),
                (I::BufferQueue, Explicit),
                (I::EffectSend, Explicit),
                (I::MuteSolo, Explicit),
                (I::MetadataExtraction, Dynamic),
                (I::MetadataTraversal, Dynamic),
                (I::PrefetchStatus, Explicit),
                (I::RatePitch, Dynamic),
                (I::Seek, Explicit),
                (I::Volume, Explicit),
                (I::Macroscopic3D, Optional),
                (I::BassBoost, Dynamic),
                (I::DynamicSource, Optional),
                (I::EnvironmentalReverb, Dynamic),
                (I::Equalizer, Dynamic),
                (I::Pitch, Dynamic),
                (I::PresetReverb, Dynamic),
                (I::PlaybackRate, Dynamic),
                (I::Virtualizer, Dynamic),
                (I::Visualization, Optional),
            ])
            .hooks(Arc::new(MediaHooks))
            .finish(),
    )
});

static AUDIO_RECORDER: Lazy<Arc<ClassDescriptor>> = Lazy::new(|| {
    Arc::new(
        ClassDescriptor::builder(ObjectKind::AudioRecorder, "AudioRecorder")
            .interfaces(&[
                (I::Record, Implicit),
                (I::AudioEncoder, Explicit),
                (I::BassBoost, Dynamic),
                (I::DynamicSource, Optional),
                (I::Equalizer, Dynamic),
                (I::Visualization, Optional),
                (I::Volume, Optional),
            ])
            .hooks(Arc::new(MediaHooks))
            .finish(),
    )
});

static MIDI_PLAYER: Lazy<Arc<ClassDescriptor>> = Lazy::new(|| {
    Arc::new(
        ClassDescriptor::builder(ObjectKind::MidiPlayer, "MidiPlayer")
            .interfaces(&[
                (I::Play, Implicit),
                (I::Doppler3D, Dynamic),
                (I::Grouping3D, Explicit),
                (I::Location3D, Explicit),
                (I::Source3D, Explicit),
                (I::BufferQueue, Explicit),
                (I::EffectSend, Explicit),
                (I::MuteSolo, Explicit),
                (I::MetadataExtraction, Dynamic),
                (I::MetadataTraversal, Dynamic),
                (I::MidiMessage, Explicit),
                (I::MidiTime, Explicit),
                (I::MidiTempo, Explicit),
                (I::MidiMuteSolo, Explicit),
                (I::PrefetchStatus, Explicit),
                (I::Seek, Explicit),
                (I::Volume, Explicit),
                (I::Macroscopic3D, Optional),
                (I::BassBoost, Dynamic),
                (I::DynamicSource, Optional),
                (I::EnvironmentalReverb, Dynamic),
                (I::Equalizer, Dynamic),
                (I::Pitch, Dynamic),
                (I::PresetReverb, Dynamic),
                (I::PlaybackRate, Dynamic),
                (I::Virtualizer, Dynamic),
                (I::Visualization, Optional),
            ])
            .hooks(Arc::new(MediaHooks))
            .finish(),
    )
});

static LISTENER: Lazy<Arc<ClassDescriptor>> = Lazy::new(|| {
    Arc::new(
        ClassDescriptor::builder(ObjectKind::Listener, "Listener")
            .interfaces(&[(I::Doppler3D, Dynamic), (I::Location3D, Explicit)])
            .finish(),
    )
});

static GROUP_3D: Lazy<Arc<ClassDescriptor>> = Lazy::new(|| {
    Arc::new(
        ClassDescriptor::builder(ObjectKind::Group3D, "3DGroup")
            .interfaces(&[
                (I::Location3D, Explicit),
                (I::Doppler3D, Dynamic),
                (I::Source3D, Explicit),
                (I::Macroscopic3D, Optional),
            ])
            .finish(),
    )
});

static OUTPUT_MIX: Lazy<Arc<ClassDescriptor>> = Lazy::new(|| {
    Arc::new(
        ClassDescriptor::builder(ObjectKind::OutputMix, "OutputMix")
            .interfaces(&[
                (I::OutputMix, Implicit),
                (I::OutputMixExt, Unavailable),
                (I::EnvironmentalReverb, Dynamic),
                (I::Equalizer, Dynamic),
                (I::PresetReverb, Dynamic),
                (I::Virtualizer, Dynamic),
                (I::Volume, Explicit),
                (I::BassBoost, Dynamic),
                (I::Visualization, Optional),
            ])
            .finish(),
    )
});

static METADATA_EXTRACTOR: Lazy<Arc<ClassDescriptor>> = Lazy::new(|| {
    Arc::new(
        ClassDescriptor::builder(ObjectKind::MetadataExtractor, "MetadataExtractor")
            .interfaces(&[
                (I::DynamicSource, Explicit),
                (I::MetadataExtraction, Explicit),
                (I::MetadataTraversal, Explicit),
            ])
            .finish(),
    )
});

/// Class table for a built-in kind
pub fn class_for(kind: ObjectKind) -> Option<Arc<ClassDescriptor>> {
    let class = match kind {
        ObjectKind::Engine => &ENGINE,
        ObjectKind::LedDevice => &LED_DEVICE,
        ObjectKind::VibraDevice => &VIBRA_DEVICE,
        ObjectKind::AudioPlayer => &AUDIO_PLAYER,
        ObjectKind::AudioRecorder => &AUDIO_RECORDER,
        ObjectKind::MidiPlayer => &MIDI_PLAYER,
        ObjectKind::Listener => &LISTENER,
        ObjectKind::Group3D => &GROUP_3D,
        ObjectKind::OutputMix => &OUTPUT_MIX,
        ObjectKind::MetadataExtractor => &METADATA_EXTRACTOR,
        ObjectKind::Extension(_) => return None,
    };
    Some(Arc::clone(class))
}

pub fn engine() -> Arc<ClassDescriptor> {
    Arc::clone(&ENGINE)
}

pub fn audio_player() -> Arc<ClassDescriptor> {
    Arc::clone(&AUDIO_PLAYER)
}

pub fn output_mix() -> Arc<ClassDescriptor> {
    Arc::clone(&OUTPUT_MIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::interface::{InterfaceMask, Relationship};

    #[test]
    fn test_slot_indices_unique_and_in_bounds() {
        for kind in ObjectKind::BUILTIN {
            let class = class_for(kind).unwrap();
            assert_eq!(class.kind(), kind);
            assert!(class.instance_size() <= InterfaceMask::CAPACITY);
            let mut seen = InterfaceMask::empty();
            for (position, entry) in class.entries().iter().enumerate() {
                assert_eq!(entry.index, position);
                assert!(entry.index < class.instance_size());
                assert!(!seen.contains(entry.index));
                seen.insert(entry.index);
            }
            let mut ids: Vec<_> = class.entries().iter().map(|e| e.id).collect();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), class.instance_size(), "{}", class.name());
        }
    }

    #[test]
    fn test_every_class_starts_with_default_interfaces() {
        for kind in ObjectKind::BUILTIN {
            let class = class_for(kind).unwrap();
            let first = class.entry_at(0).unwrap();
            let second = class.entry_at(1).unwrap();
            assert_eq!(first.id, I::Object);
            assert_eq!(second.id, I::DynamicInterfaceManagement);
            assert_eq!(first.relationship, Relationship::Implicit);
            assert_eq!(second.relationship, Relationship::Implicit);
        }
    }

    #[test]
    fn test_instance_sizes() {
        let sizes: Vec<_> = ObjectKind::BUILTIN
            .iter()
            .map(|&kind| class_for(kind).unwrap().instance_size())
            .collect();
        assert_eq!(sizes, vec![10, 3, 3, 26, 9, 29, 4, 6, 11, 5]);
    }

    #[test]
    fn test_extension_kinds_have_no_builtin_class() {
        assert!(class_for(ObjectKind::Extension(7)).is_none());
    }
}
