//! Shared wire contract between `labctrl-server` and `labctrl-client`.
//!
//! Holds nothing that performs I/O: units and quantities, the command/event
//! wire shapes, and the error taxonomy, so the server and the client can
//! never disagree on what a byte on the wire means.

pub mod error;
pub mod protocol;
pub mod quantity;
pub mod units;

pub use error::OperationResult;
pub use protocol::{
    ChannelCommand, ChannelCommandAck, ChannelHandshake, ChannelHandshakeAck, ChannelMessage,
    CommandResponse, SensorOperation, StageOperation, Target, TargetError, TargetRequest,
    UpdateEvent,
};
pub use quantity::{to_logical, to_physical, ParameterSpec, ParameterSpecError};
pub use units::{convert, Dimension, PhysicalQuantity, Unit, UnitError};
