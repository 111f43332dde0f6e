//! Quote of the day
//!
//! Always produces text: fetch failures turn into a fixed apology.

use super::{SubroutineOutput, SubroutineRegistry};
use crate::fetch::{Quote, QuoteSource};
use std::sync::Arc;

const DEFAULT_CATEGORY: &str = "inspire";

pub(crate) const RATE_LIMITED_APOLOGY: &str = "I'm sorry, I can only find 10 quotes per hour \
because the people who made the quote API won't share freely :(";
pub(crate) const GENERIC_APOLOGY: &str =
    "Oh dear, I am very confused. Somebody should probably check my log.";

impl SubroutineRegistry {
    /// Quote of the day. Never fails: fetch errors become an apology.
    pub(super) fn fetch_quote(&self, args: &[String]) -> SubroutineOutput {
        let category = args
            .first()
            .map_or_else(|| DEFAULT_CATEGORY.to_string(), Clone::clone);
        let quotes = Arc::clone(&self.quotes);

        SubroutineOutput::Deferred(Box::pin(async move {
            Ok(match quotes.quote_of_the_day(&category).await {
                Ok(quote) => format_quote(&quote),
                Err(e) if e.is_rate_limited() => {
                    tracing::info!(category = %category, "Quote API rate limited");
                    RATE_LIMITED_APOLOGY.to_string()
                }
                Err(e) => {
                    tracing::error!(category = %category, error = %e, error_kind = ?e.kind, "Failed to fetch quote");
                    GENERIC_APOLOGY.to_string()
                }
            })
        }))
    }
}

fn format_quote(quote: &Quote) -> String {
    format!("{}\n-{}", quote.text, quote.author)
}
