use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! object_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                $name(Uuid::new_v4())
            }

            /// Parse an identifier from its string form.
            ///
            /// Returns `None` for anything that is not a well-formed UUID.
            pub fn parse(raw: &str) -> Option<Self> {
                Uuid::parse_str(raw.trim()).ok().map($name)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name(Uuid::nil())
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map($name)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                $name(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

object_id!(
    /// Identifier of a stored policy.
    PolicyId
);

impl PolicyId {
    /// Placeholder carried by a candidate that has not been inserted yet.
    pub fn nil() -> Self {
        PolicyId(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

object_id!(
    /// Identifier of an externally managed service.
    ServiceId
);

object_id!(
    /// Identifier of an externally managed authority.
    AuthorityId
);

object_id!(
    /// Identifier of a secondary authentication configuration.
    SecondaryId
);

/// Serde adapter for optional references where the empty string means "unset".
pub mod optional_id {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Display,
        S: Serializer,
    {
        match value {
            Some(id) => serializer.collect_str(id),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => s.parse().map(Some).map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Holder {
        #[serde(with = "optional_id", default)]
        secondary: Option<SecondaryId>,
    }

    #[test]
    fn test_parse_valid_and_malformed() {
        let id = PolicyId::new();
        assert_eq!(PolicyId::parse(&id.to_string()), Some(id));
        assert_eq!(PolicyId::parse("not-an-id"), None);
        assert_eq!(PolicyId::parse(""), None);
    }

    #[test]
    fn test_nil_placeholder() {
        assert!(PolicyId::nil().is_nil());
        assert!(!PolicyId::new().is_nil());
        assert_eq!(PolicyId::default(), PolicyId::nil());
    }

    #[test]
    fn test_transparent_serialization() {
        let id = ServiceId::new();
        let value = serde_json::to_value(id).unwrap();
        assert_eq!(value, json!(id.to_string()));
    }

    #[test]
    fn test_optional_id_empty_sentinel() {
        let holder: Holder = serde_json::from_value(json!({ "secondary": "" })).unwrap();
        assert_eq!(holder.secondary, None);

        let holder: Holder = serde_json::from_value(json!({ "secondary": null })).unwrap();
        assert_eq!(holder.secondary, None);

        let holder: Holder = serde_json::from_value(json!({})).unwrap();
        assert_eq!(holder.secondary, None);

        let encoded = serde_json::to_value(&Holder { secondary: None }).unwrap();
        assert_eq!(encoded, json!({ "secondary": "" }));
    }

    #[test]
    fn test_optional_id_round_trip_and_rejects_garbage() {
        let id = SecondaryId::new();
        let holder: Holder =
            serde_json::from_value(json!({ "secondary": id.to_string() })).unwrap();
        assert_eq!(holder.secondary, Some(id));

        let result: Result<Holder, _> = serde_json::from_value(json!({ "secondary": "xyz" }));
        assert!(result.is_err());
    }
}
