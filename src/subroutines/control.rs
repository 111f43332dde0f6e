//! Conversation control: awaiting, mirroring and reloading

use super::{CallContext, SubroutineError, SubroutineKind, SubroutineOutput, SubroutineRegistry};
use std::sync::Arc;

const MIRROR_CONFIRMATION: &str = "TIME TO SPAM";
const RELOAD_CONFIRMATION: &str = "Updated!";

impl SubroutineRegistry {
    /// Force awaiting membership for the thread. Overrides the automatic
    /// transition of the current pass.
    pub(super) fn wait(
        &self,
        args: &[String],
        context: &CallContext,
    ) -> Result<SubroutineOutput, SubroutineError> {
        let awaiting = match args {
            [flag] if flag == "true" => true,
            [flag] if flag == "false" => false,
            _ => {
                return Err(SubroutineError::invalid(
                    SubroutineKind::Wait,
                    format!("expected `true` or `false`, got {args:?}"),
                ))
            }
        };

        let changed = self.state.set_awaiting(context.thread_id(), awaiting);
        context.record_wait(awaiting);
        tracing::info!(thread_id = %context.thread_id(), awaiting, changed, "Awaiting set manually");
        Ok(SubroutineOutput::empty())
    }

    pub(super) fn who_is_awaiting(&self) -> SubroutineOutput {
        let mut text = String::from("Threads I'm waiting for:");
        for thread_id in self.state.list_awaiting() {
            text.push('\n');
            text.push_str(&thread_id);
        }
        SubroutineOutput::Immediate(text)
    }

    /// Mirror the last mentioned user other than the bot
    pub(super) fn mirror(&self, context: &CallContext) -> Result<SubroutineOutput, SubroutineError> {
        let thread_id = context.thread_id();
        let target = self.state.update(|store| {
            let mentions = store.var(thread_id, "mentions").unwrap_or_default();
            let target = mentions
                .split_whitespace()
                .rev()
                .find(|id| *id != self.bot_id)
                .map(String::from)?;
            store.set_mirror_target(Some(target.clone()));
            Some(target)
        });

        match target {
            Some(target) => {
                tracing::info!(thread_id = %thread_id, target = %target, "Mirroring user");
                Ok(SubroutineOutput::Immediate(MIRROR_CONFIRMATION.to_string()))
            }
            None => Err(SubroutineError::invalid(
                SubroutineKind::Mirror,
                "no mentioned user to mirror",
            )),
        }
    }

    pub(super) fn unmirror(&self) -> SubroutineOutput {
        self.state.update(|store| store.set_mirror_target(None));
        tracing::info!("Mirroring stopped");
        SubroutineOutput::empty()
    }

    /// Re-read the runtime config and rules. Nothing changes unless both load.
    pub(super) fn reload(&self) -> SubroutineOutput {
        let config = Arc::clone(&self.config);
        let engine = Arc::clone(&self.engine);
        SubroutineOutput::Deferred(Box::pin(async move {
            let next = config
                .read_from_disk()
                .await
                .map_err(|e| SubroutineError::Reload(e.to_string()))?;
            engine
                .reload()
                .await
                .map_err(|e| SubroutineError::Reload(e.to_string()))?;
            config.replace(next);
            Ok(RELOAD_CONFIRMATION.to_string())
        }))
    }
}
