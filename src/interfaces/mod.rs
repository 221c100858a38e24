// ============================================================================
// Interfaces Module
// Contains all trait definitions and contracts
// ============================================================================

mod event_handler;
mod validation_gateway;

pub use event_handler::{
    EngineEvent, EventHandler, LoggingEventHandler, NoOpEventHandler, RecordingEventHandler,
};
pub use validation_gateway::{
    AcceptAllGateway, BoundsGateway, DelayedGateway, GatewayError, ValidationGateway, Verdict,
};
