//! Request and Response models for the ops API
//!
//! DTOs used for serializing/deserializing HTTP request and response bodies.
//! Reports and rules are served in their own serialized form.

pub mod requests;
pub mod responses;

pub use requests::{AutoInvalidationRequest, EntityChangeRequest, ManualInvalidationRequest};
pub use responses::{
    AutoInvalidationResponse, ClearCacheResponse, InvalidationResponse, RemoveRuleResponse,
    RuleResponse,
};
