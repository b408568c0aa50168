pub mod fully_connected;

pub use fully_connected::{
    GemmBinding, OperatorFormat, OperatorKind, QuantizationParams, QuantizedFullyConnected,
};
