use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An assistant message kept in the provider's native shape.
///
/// Converting a response into [`crate::AssistantMessage`] and back may lose
/// fields a provider relies on (reasoning traces, tool call indices,
/// provider-specific ids). Providers wrap their own message type in an
/// `OpaqueMessage`; the workflow stores it in the conversation and passes it
/// back untouched with [`crate::ModelMessage::Opaque`].
///
/// Two opaque messages are equal when their ids are equal.
pub struct OpaqueMessage(Arc<dyn OpaqueMessageObject>);

impl OpaqueMessage {
    /// Wraps `value` under the given id. The id should be unique within
    /// one conversation.
    #[inline]
    pub fn new<ID: Into<String>, T: Send + Sync + 'static>(
        id: ID,
        value: T,
    ) -> Self {
        let id = id.into();
        Self(Arc::new(OpaqueMessageInner { id, value }))
    }

    /// Returns the id of this message.
    #[inline]
    pub fn id(&self) -> &str {
        self.0.id()
    }

    /// Returns the wrapped value if it has type `T`.
    #[inline]
    pub fn to_raw<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref()
    }
}

impl Clone for OpaqueMessage {
    #[inline]
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl Debug for OpaqueMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OpaqueMessage").field(&self.0.id()).finish()
    }
}

impl PartialEq for OpaqueMessage {
    fn eq(&self, other: &Self) -> bool {
        self.0.id() == other.0.id()
    }
}

impl Eq for OpaqueMessage {}

impl Hash for OpaqueMessage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id().hash(state);
    }
}

trait OpaqueMessageObject: Send + Sync {
    fn id(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
}

struct OpaqueMessageInner<T> {
    id: String,
    value: T,
}

impl<T: Send + Sync + 'static> OpaqueMessageObject for OpaqueMessageInner<T> {
    fn id(&self) -> &str {
        &self.id
    }

    fn as_any(&self) -> &dyn Any {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    struct ProviderMessage {
        reasoning: String,
    }

    #[test]
    fn test_downcast() {
        let opaque = OpaqueMessage::new(
            "chatcmpl-1",
            ProviderMessage {
                reasoning: "think first".to_owned(),
            },
        );
        assert_eq!(opaque.id(), "chatcmpl-1");
        let raw = opaque.to_raw::<ProviderMessage>().unwrap();
        assert_eq!(raw.reasoning, "think first");
        assert!(opaque.to_raw::<String>().is_none());
    }

    #[test]
    fn test_identity_by_id() {
        let first = OpaqueMessage::new("chatcmpl-1", 1u8);
        let same_id = OpaqueMessage::new("chatcmpl-1", "other payload");
        let second = OpaqueMessage::new("chatcmpl-2", 1u8);
        assert_eq!(first, same_id);
        assert_ne!(first, second);

        let set: HashSet<_> = [first.clone(), same_id, second].into();
        assert_eq!(set.len(), 2);
    }
}
