pub mod calls;
pub mod signaling;

pub use signaling::{RelayOutcome, SignalingRelay};
