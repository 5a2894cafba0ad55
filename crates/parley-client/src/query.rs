//! Query collaborator used by [`Conversation::fetch`](crate::Conversation::fetch).

use std::future::Future;

use parley_proto::ConversationData;

use crate::{error::ConversationError, ids::ConversationId};

/// Conversation lookup filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    /// Match a single conversation by id.
    pub object_id: Option<String>,
    /// Maximum number of results.
    pub limit: Option<u32>,
}

impl Query {
    /// Query matching exactly one conversation.
    pub fn by_id(id: &ConversationId) -> Self {
        Self { object_id: Some(id.as_str().to_string()), limit: Some(1) }
    }

    /// Returns true if `data` satisfies the filter.
    pub fn matches(&self, data: &ConversationData) -> bool {
        self.object_id.as_deref().is_none_or(|id| id == data.id)
    }
}

/// Executes conversation queries against storage.
///
/// Implementations own whatever refresh side effects a query has (updating
/// cached conversation objects, for example).
pub trait ConversationQuery: Send + Sync + 'static {
    /// Run a query.
    fn execute(
        &self,
        query: Query,
    ) -> impl Future<Output = Result<Vec<ConversationData>, ConversationError>> + Send;
}
