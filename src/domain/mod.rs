//! Channel domain: configs, sync outcomes, events
pub mod aggregates;
pub mod events;
pub mod value_objects;
