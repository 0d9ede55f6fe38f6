//! These models represent the objects passed between the transport, the
//! relay and the upstream provider adapter.
//!
//! The wire format mirrors what chat UIs send and receive: a request with the
//! new message plus prior history, and either a single response document or a
//! sequence of stream events. The adapter converts these into the provider's
//! own request/response shapes; nothing outside `providers` ever sees those.
pub mod message;
pub mod role;
