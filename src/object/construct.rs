//! Interface request validation and instance construction

use std::sync::Arc;

use crate::engine::EngineCore;
use crate::error::{SlError, SlResult};
use crate::object::class::ClassDescriptor;
use crate::object::instance::{Object, ObjectParams, ObjectRef};
use crate::object::interface::{InterfaceId, InterfaceMask, InterfaceRequest, Relationship};

/// Compute the exposed mask for a construction request.
///
/// Implicit interfaces are always exposed. Requested interfaces are exposed
/// when the class offers them; a required interface must be guaranteed by the
/// class (implicit or explicit). Nothing is mutated on failure.
pub fn check_interfaces(
    class: &ClassDescriptor,
    requests: &[InterfaceRequest],
) -> SlResult<InterfaceMask> {
    let mut exposed = class.implicit_mask();
    for request in requests {
        let id = InterfaceId::from_uuid(&request.iid).ok_or(SlError::ParameterInvalid)?;
        let entry = match class.lookup(id) {
            Some(entry) if entry.relationship != Relationship::Unavailable => entry,
            _ => {
                if request.required {
                    tracing::debug!("{}: required {} is unavailable", class.name(), id);
                    return Err(SlError::FeatureUnsupported);
                }
                continue;
            }
        };
        if request.required && !entry.relationship.is_guaranteed() {
            tracing::debug!(
                "{}: {} is {:?} and cannot be required",
                class.name(),
                id,
                entry.relationship
            );
            return Err(SlError::FeatureUnsupported);
        }
        exposed.insert(entry.index);
    }
    Ok(exposed)
}

/// Admit and allocate a child object. The object starts `Unrealized`.
pub(crate) fn construct(
    class: Arc<ClassDescriptor>,
    engine: &Arc<EngineCore>,
    exposed: InterfaceMask,
    params: ObjectParams,
) -> SlResult<ObjectRef> {
    let weak = Arc::downgrade(engine);
    let object = engine.admit(|slot, instance_id| {
        Arc::new(Object::new(class, weak, instance_id, Some(slot), exposed, params))
    })?;
    tracing::debug!(
        "{} #{} created, exposed {:#x}",
        object.class().name(),
        object.instance_id(),
        exposed.bits()
    );
    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::classes;
    use proptest::prelude::*;

    #[test]
    fn test_implicit_always_exposed() {
        let class = classes::audio_player();
        let mask = check_interfaces(&class, &[]).unwrap();
        assert_eq!(mask, class.implicit_mask());
        assert!(mask.contains(class.lookup(InterfaceId::Play).unwrap().index));
    }

    #[test]
    fn test_explicit_required() {
        let class = classes::audio_player();
        let mask =
            check_interfaces(&class, &[InterfaceRequest::required(InterfaceId::Volume)]).unwrap();
        assert!(mask.contains(class.lookup(InterfaceId::Volume).unwrap().index));
    }

    #[test]
    fn test_dynamic_cannot_be_required() {
        let class = classes::audio_player();
        assert_eq!(
            check_interfaces(&class, &[InterfaceRequest::required(InterfaceId::Equalizer)]),
            Err(SlError::FeatureUnsupported)
        );
        let mask =
            check_interfaces(&class, &[InterfaceRequest::optional(InterfaceId::Equalizer)]).unwrap();
        assert!(mask.contains(class.lookup(InterfaceId::Equalizer).unwrap().index));
    }

    #[test]
    fn test_absent_and_unavailable() {
        let mix = classes::output_mix();
        assert_eq!(
            check_interfaces(&mix, &[InterfaceRequest::required(InterfaceId::OutputMixExt)]),
            Err(SlError::FeatureUnsupported)
        );
        assert_eq!(
            check_interfaces(&mix, &[InterfaceRequest::required(InterfaceId::Seek)]),
            Err(SlError::FeatureUnsupported)
        );
        let mask = check_interfaces(
            &mix,
            &[
                InterfaceRequest::optional(InterfaceId::OutputMixExt),
                InterfaceRequest::optional(InterfaceId::Seek),
            ],
        )
        .unwrap();
        assert_eq!(mask, mix.implicit_mask());
    }

    #[test]
    fn test_unknown_uuid() {
        let class = classes::engine();
        let request = InterfaceRequest::from_uuid(uuid::Uuid::nil(), false);
        assert_eq!(check_interfaces(&class, &[request]), Err(SlError::ParameterInvalid));
    }

    proptest! {
        #[test]
        fn prop_validation_matches_relationships(
            picks in proptest::collection::vec((0usize..InterfaceId::ALL.len(), any::<bool>()), 0..12)
        ) {
            let class = classes::audio_player();
            let requests: Vec<_> = picks
                .iter()
                .map(|&(i, required)| InterfaceRequest::new(InterfaceId::ALL[i], required))
                .collect();

            let admissible = requests.iter().all(|request| {
                let id = InterfaceId::from_uuid(&request.iid).unwrap();
                let relationship = class.lookup(id).map(|e| e.relationship);
                !request.required || relationship.map_or(false, Relationship::is_guaranteed)
            });

            match check_interfaces(&class, &requests) {
                Ok(mask) => {
                    prop_assert!(admissible);
                    let mut expected = class.implicit_mask();
                    for request in &requests {
                        let id = InterfaceId::from_uuid(&request.iid).unwrap();
                        if let Some(entry) = class.lookup(id) {
                            if entry.relationship != Relationship::Unavailable {
                                expected.insert(entry.index);
                            }
                        }
                    }
                    prop_assert_eq!(mask, expected);
                }
                Err(err) => {
                    prop_assert!(!admissible);
                    prop_assert_eq!(err, SlError::FeatureUnsupported);
                }
            }
        }
    }
}
