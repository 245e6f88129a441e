//! Typed records for storage and API.

pub mod cache;
pub mod connection;
pub mod session;

pub use cache::{
    CachedRecoveryCycle, CachedWorkout, NewCachedRecoveryCycle, NewCachedWorkout, SleepBreakdown,
    ZoneDurations,
};
pub use connection::{ConnectionSummary, OAuthState, WhoopConnection};
pub use session::{NewSession, Profile, ReadinessEntry, Session, WearableMetrics};
