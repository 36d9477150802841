//! Branded ID newtypes for type safety.
//!
//! Riders, drivers, rides and live connections each get a distinct ID type
//! wrapping a `String`, so a ride ID can never be passed where a user ID is
//! expected. Generated IDs are a short prefix plus a UUID v7 (time-ordered),
//! which keeps them unique for the lifetime of the process and beyond.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

fn prefixed_v7(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::now_v7().simple())
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh, globally unique ID.
            #[must_use]
            pub fn generate() -> Self {
                Self(prefixed_v7($prefix))
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifier of a connected participant (driver or customer).
    ///
    /// Supplied by the client on upgrade; [`UserId::generate`] produces the
    /// `unknown_*` fallback used when the client omits it.
    UserId, "unknown"
}

branded_id! {
    /// Identifier of a ride, assigned when the customer's request is broadcast.
    RideId, "ride"
}

branded_id! {
    /// Identifier of one live WebSocket connection.
    ///
    /// A user reconnecting gets a new connection ID, which lets the registry
    /// tell a stale connection apart from its replacement.
    ConnectionId, "conn"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_ride_ids_are_prefixed() {
        let id = RideId::generate();
        assert!(id.starts_with("ride_"), "got {id}");
    }

    #[test]
    fn generated_user_ids_use_unknown_prefix() {
        assert!(UserId::generate().starts_with("unknown_"));
    }

    #[test]
    fn generated_ids_are_unique() {
        let ids: HashSet<RideId> = (0..1_000).map(|_| RideId::generate()).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn serde_is_transparent() {
        let id = UserId::from("driver_42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"driver_42\"");
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn borrow_allows_str_lookup() {
        let mut map = std::collections::HashMap::new();
        let _ = map.insert(RideId::from("ride_1"), 7);
        assert_eq!(map.get("ride_1"), Some(&7));
    }

    #[test]
    fn display_and_deref() {
        let id = ConnectionId::from("conn_x");
        assert_eq!(id.to_string(), "conn_x");
        assert_eq!(id.len(), 6);
        assert_eq!(String::from(id), "conn_x");
    }
}
