//! Contains common, primitive identifier types.

use slotmap::new_key_type;

new_key_type! {
    /// Uniquely and safely identifies a telemetry sink registered with the engine.
    ///
    /// Keys are generational, so a removed sink's id never addresses a sink
    /// registered later.
    pub struct SinkId;
}
