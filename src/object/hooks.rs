//! Lifecycle hooks for media objects (players and recorders)

use crate::audio::data::DataLocator;
use crate::error::{SlError, SlResult};
use crate::object::class::ClassHooks;
use crate::object::instance::Object;
use crate::object::lifecycle::{Mode, ObjectState};

/// Media objects depend on the objects their locators reference. Those must
/// still be realized when the media object is.
#[derive(Debug, Default, Clone, Copy)]
pub struct MediaHooks;

fn check_dependency(object: &Object, locator: &DataLocator) -> SlResult<()> {
    let dependency = match locator {
        DataLocator::OutputMix { output_mix } => Some(output_mix),
        DataLocator::IoDevice {
            device: Some(device),
            ..
        } => Some(device),
        _ => None,
    };
    if let Some(dependency) = dependency {
        let state = dependency.state();
        if state != ObjectState::Realized {
            tracing::warn!(
                "{} #{}: {} #{} is {:?}",
                object.class().name(),
                object.instance_id(),
                dependency.class().name(),
                dependency.instance_id(),
                state
            );
            return Err(SlError::InvalidState);
        }
    }
    Ok(())
}

impl ClassHooks for MediaHooks {
    fn realize(&self, object: &Object, mode: Mode) -> SlResult<()> {
        let Some(media) = object.media() else {
            return Ok(());
        };
        check_dependency(object, &media.source.locator)?;
        if let Some(sink) = &media.sink {
            check_dependency(object, &sink.locator)?;
        }
        tracing::debug!(
            "{} #{}: realized ({:?}) {:?} -> {:?}",
            object.class().name(),
            object.instance_id(),
            mode,
            media.source.locator,
            media.sink.as_ref().map(|sink| &sink.locator)
        );
        Ok(())
    }

    fn resume(&self, object: &Object, mode: Mode) -> SlResult<()> {
        self.realize(object, mode)
    }

    fn destroy(&self, object: &Object) {
        tracing::debug!(
            "{} #{}: releasing media resources",
            object.class().name(),
            object.instance_id()
        );
    }
}
