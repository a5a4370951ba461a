//! CAN interface adapters

pub mod factory;
pub mod mock;
pub mod simulation;
pub mod traits;

pub use factory::{create_adapter, AdapterKind};
pub use mock::{MockAdapter, MockAdapterConfig, MockAdapterHandle, MockCall};
pub use simulation::SimulationAdapter;
pub use traits::{
    AdapterError, AdapterEvent, AdapterEventReceiver, AdapterEventSender, AdapterStatistics,
    CanAdapter, ConnectionState, Feature, FeatureSet,
};
