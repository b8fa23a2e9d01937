//! Branded identifiers.
//!
//! Every entity id is its own newtype over a `String` so that a
//! `SessionId` can never be passed where a `TraceId` is expected.
//! Values are opaque; `new()` mints a UUIDv4 but ids loaded from
//! external systems keep whatever form they arrived in.

use serde::{Deserialize, Serialize};

macro_rules! declare_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a fresh random id.
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
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

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

declare_id!(
    /// Identifies a tenant project. Owns everything else.
    ProjectId
);
declare_id!(
    /// Identifies a conversation session within a project.
    SessionId
);
declare_id!(
    /// Identifies one execution trace (one agent run).
    TraceId
);
declare_id!(
    /// Identifies a persisted conversation message.
    MessageId
);
declare_id!(
    /// Identifies a single tool invocation within a run.
    ToolCallId
);
declare_id!(
    /// Identifies a pending or resolved approval request.
    ApprovalId
);
declare_id!(
    /// Identifies one version of a prompt layer.
    PromptLayerId
);
declare_id!(
    /// Identifies an agent on the inter-agent bus.
    AgentId
);
declare_id!(
    /// Identifies one usage record (one LLM response).
    UsageRecordId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        // Compile-time property: this function only accepts a ProjectId.
        fn takes_project(_: &ProjectId) {}
        let p = ProjectId::from("proj_1");
        takes_project(&p);
        // A SessionId cannot be passed here; the following would not compile:
        // takes_project(&SessionId::from("s_1"));
    }

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(TraceId::new(), TraceId::new());
    }

    #[test]
    fn serde_is_transparent() {
        let id = SessionId::from("sess_42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"sess_42\"");
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_round_trips() {
        let id = ApprovalId::from("appr_7");
        assert_eq!(id.to_string(), "appr_7");
        assert_eq!(id.as_str(), "appr_7");
    }
}
