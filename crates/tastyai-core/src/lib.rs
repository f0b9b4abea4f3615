//! Core types and error definitions for the TastyAI recipe recommender.
//!
//! This crate provides the foundational types shared across all TastyAI crates:
//! recipe records with normalized list fields, validated user preferences, and
//! the unified error type.
//!
//! # Main types
//!
//! - [`TastyError`]: Unified error enum for all TastyAI subsystems.
//! - [`TastyResult`]: Convenience alias for `Result<T, TastyError>`.
//! - [`RecipeRecord`]: One corpus row with list fields parsed into sequences.
//! - [`UserPreferences`]: Validated preferences driving ranking and filtering.
//! - [`SugarPolicy`]: Closed set of sugar preferences.
//! - [`RankedCandidate`]: A recipe scored and ranked for one request.

/// Unified error type.
pub mod error;
/// User preference types and their validating constructors.
pub mod preferences;
/// Recipe records and list-field normalization.
pub mod recipe;

pub use error::{TastyError, TastyResult};
pub use preferences::{ExtractedPreferences, Language, SugarPolicy, UserPreferences};
pub use recipe::{parse_list, RankedCandidate, RecipeRecord};
