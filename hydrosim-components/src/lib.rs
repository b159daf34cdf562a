//! Standard sub-models for catchment simulations.
//!
//! The models are registered by identifier in [`standard_registry`], which is what simulations
//! use to swap the model of an element by name.

pub mod error_correction;
pub mod preprocessing;
pub mod reservoir;
pub mod routing;
pub mod runoff;

use hydrosim_core::component::ComponentKind;
use hydrosim_core::registry::ModelRegistry;

use error_correction::{Erris, Maerris};
use preprocessing::InputScaling;
use reservoir::{ControlledReleaseReservoir, LevelVolumeAreaReservoir};
use routing::{Lag, Muskingum, NoRouting};
use runoff::{Gr4j, NullRunoff, UnitRunoff};

/// Catalog of every standard model.
pub fn standard_registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry
        .register(Gr4j::ID, ComponentKind::Runoff, Gr4j::create)
        .register(UnitRunoff::ID, ComponentKind::Runoff, UnitRunoff::create)
        .register(NullRunoff::ID, ComponentKind::Runoff, NullRunoff::create)
        .register(NoRouting::ID, ComponentKind::Routing, NoRouting::create)
        .register(Lag::ID, ComponentKind::Routing, Lag::create)
        .register(Muskingum::ID, ComponentKind::Routing, Muskingum::create)
        .register(
            ControlledReleaseReservoir::ID,
            ComponentKind::Reservoir,
            ControlledReleaseReservoir::create,
        )
        .register(
            LevelVolumeAreaReservoir::ID,
            ComponentKind::Reservoir,
            LevelVolumeAreaReservoir::create,
        )
        .register(Erris::ID, ComponentKind::ErrorCorrection, Erris::create)
        .register(Maerris::ID, ComponentKind::ErrorCorrection, Maerris::create)
        .register(
            InputScaling::ID,
            ComponentKind::Preprocessing,
            InputScaling::create,
        );
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_kinds() {
        let registry = standard_registry();
        assert_eq!(
            registry.model_ids(Some(ComponentKind::Runoff)),
            vec!["GR4J", "UnitRunoff", "NullRunoff"]
        );
        assert_eq!(
            registry.model_ids(Some(ComponentKind::Routing)),
            vec!["NoRouting", "Lag", "Muskingum"]
        );
        for id in registry.model_ids(None) {
            let model = registry.create(&id).unwrap();
            assert_eq!(model.model_id(), id);
            assert_eq!(model.kind(), registry.kind_of(&id).unwrap());
        }
    }

    #[test]
    fn variables_by_model_id() {
        let registry = standard_registry();
        let vars = registry.variable_ids(Gr4j::ID).unwrap();
        for name in ["x1", "x2", "x3", "x4", "S", "R", "P", "E", "runoff"] {
            assert!(vars.contains(&name.to_string()), "{} missing", name);
        }
        assert!(registry.variable_ids("SACSMA").is_err());
    }
}
