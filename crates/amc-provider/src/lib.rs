//! Backend configuration resolution for the amc coding client.
//!
//! Merges the optional project secrets document with explicit CLI overrides
//! into one effective editor model, and seeds OPENAI_* environment defaults
//! for OpenAI-compatible backends. All of this runs once near process start,
//! before any session activity.

mod model;
mod secrets;

pub use model::choose_editor_model;
pub use secrets::{
    load_project_secrets, OPENAI_API_BASE_ENV, OPENAI_API_KEY_ENV, OPENAI_BASE_URL_ENV,
};
