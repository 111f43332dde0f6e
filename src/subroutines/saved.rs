//! Saved messages: named snippets remembered per thread

use super::{joined_name, CallContext, SubroutineError, SubroutineKind, SubroutineOutput, SubroutineRegistry};
use crate::db::{DbError, SavedMessages};
use crate::transport::{Reaction, Transport};
use std::sync::Arc;

/// History fetched when saving: the trigger plus the message before it
const SAVE_HISTORY_DEPTH: usize = 2;

impl SubroutineRegistry {
    /// Save the message sent just before the trigger under the given name
    pub(super) fn save_message(
        &self,
        args: &[String],
        context: &CallContext,
    ) -> Result<SubroutineOutput, SubroutineError> {
        let name = joined_name(SubroutineKind::SaveMessage, args)?;
        let transport = Arc::clone(&self.transport);
        let saved = Arc::clone(&self.saved);
        let thread_id = context.thread_id().to_string();
        let trigger_id = context.message.message_id.clone();

        Ok(SubroutineOutput::Deferred(Box::pin(async move {
            let history = transport
                .thread_history(&thread_id, SAVE_HISTORY_DEPTH)
                .await?;
            let target = history
                .into_iter()
                .rev()
                .find(|m| m.message_id != trigger_id)
                .ok_or_else(|| SubroutineError::NoHistory(thread_id.clone()))?;

            saved.save(&thread_id, &name, &target.body).await?;
            if let Err(e) = transport.set_reaction(&target.message_id, Reaction::Wow).await {
                tracing::warn!(thread_id = %thread_id, error = %e, "Failed to react to saved message");
            }
            tracing::info!(thread_id = %thread_id, name = %name, "Message saved");
            Ok(format!("Saved under {name}"))
        })))
    }

    pub(super) fn recall_message(
        &self,
        args: &[String],
        context: &CallContext,
    ) -> Result<SubroutineOutput, SubroutineError> {
        let name = joined_name(SubroutineKind::RecallMessage, args)?;
        let saved = Arc::clone(&self.saved);
        let thread_id = context.thread_id().to_string();

        Ok(SubroutineOutput::Deferred(Box::pin(async move {
            match saved.get(&thread_id, &name).await {
                Ok(body) => Ok(body),
                Err(DbError::MessageNotFound(_)) => Err(SubroutineError::NotFound(name)),
                Err(e) => Err(e.into()),
            }
        })))
    }

    pub(super) fn delete_message(
        &self,
        args: &[String],
        context: &CallContext,
    ) -> Result<SubroutineOutput, SubroutineError> {
        let name = joined_name(SubroutineKind::DeleteMessage, args)?;
        let saved = Arc::clone(&self.saved);
        let thread_id = context.thread_id().to_string();

        Ok(SubroutineOutput::Deferred(Box::pin(async move {
            let existed = saved.delete(&thread_id, &name).await?;
            tracing::info!(thread_id = %thread_id, name = %name, existed, "Saved message deleted");
            Ok(format!("No worries, {name} is forgotten"))
        })))
    }

    pub(super) fn list_messages(&self, context: &CallContext) -> SubroutineOutput {
        let saved = Arc::clone(&self.saved);
        let thread_id = context.thread_id().to_string();

        SubroutineOutput::Deferred(Box::pin(async move {
            let mut text = String::from("My saved messages:");
            for name in saved.names(&thread_id).await? {
                text.push('\n');
                text.push_str(&name);
            }
            Ok(text)
        }))
    }
}
