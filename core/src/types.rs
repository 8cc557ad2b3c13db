//! Shared primitive types used across the entire engine.

/// A stable, unique identifier for a user account.
pub type UserId = String;

/// Identifier of a detected fraud cluster.
/// Derived from the component representative, not random — see detector.rs.
pub type ClusterId = String;

/// Identifier of the admin performing a gateway action.
pub type AdminId = String;
