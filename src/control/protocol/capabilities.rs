//! Client capability flags sent with `initialize`

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// Client capabilities for negotiation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClientCapabilities: u8 {
        /// Opt into experimental protocol surface (required for dynamic tools)
        const EXPERIMENTAL_API = 0b0001;
    }
}

impl ClientCapabilities {
    /// Capabilities needed for the given configuration
    #[must_use]
    pub fn for_dynamic_tools(has_dynamic_tools: bool) -> Self {
        if has_dynamic_tools {
            Self::EXPERIMENTAL_API
        } else {
            Self::empty()
        }
    }
}

// Serialized as an object of boolean fields
impl Serialize for ClientCapabilities {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ClientCapabilities", 1)?;
        state.serialize_field("experimentalApi", &self.contains(Self::EXPERIMENTAL_API))?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ClientCapabilities {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Helper {
            #[serde(default)]
            experimental_api: bool,
        }

        let h = Helper::deserialize(deserializer)?;
        let mut caps = Self::empty();
        if h.experimental_api {
            caps |= Self::EXPERIMENTAL_API;
        }
        Ok(caps)
    }
}
