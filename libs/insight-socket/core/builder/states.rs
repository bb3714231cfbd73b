/// Type-state markers for the builder pattern
///
/// These types track at compile time whether a transport has been chosen,
/// so `build()` only exists on a fully configured builder.

/// Marker trait for transport state
pub trait TransportState {}

/// Transport has not been set
pub struct NoTransport;
impl TransportState for NoTransport {}

/// Transport has been set
pub struct HasTransport;
impl TransportState for HasTransport {}
