//! The output sink contract and its keystroke-injector implementation
//!
//! A sink is a live text-input target. The contract is two calls:
//! `replace_partial_text` shows provisional text that the next call
//! will remove, and `commit_text` makes text permanent. Any adapter to
//! a real text field has to implement exactly this pair.
//!
//! Correctness hinges on the partial bookkeeping: the sink records how
//! many characters the previous partial inserted so the next call
//! deletes exactly that span. Inserting without deleting duplicates
//! text in the target field; deleting the wrong length corrupts the
//! text around it.

use super::TextInjector;
use crate::error::OutputError;

/// A live text-input target that accepts committed and provisional text
#[async_trait::async_trait]
pub trait OutputSink: Send {
    /// Insert text permanently, removing any pending partial first
    async fn commit_text(&mut self, text: &str) -> Result<(), OutputError>;

    /// Replace the previously shown partial with new provisional text
    async fn replace_partial_text(&mut self, text: &str) -> Result<(), OutputError>;

    /// Characters of provisional text currently in the target
    fn pending_partial_chars(&self) -> usize;
}

/// Adapts a fallback chain of keystroke injectors to the sink contract
///
/// The focused window is the text field; partials are typed in and
/// backspaced out again. Availability is re-probed on each call, so if
/// the preferred injector disappears mid-session the next write moves
/// down the chain. A single write never spans two injectors: once the
/// delete for a call has run, a failure is reported rather than retried
/// elsewhere, because a second attempt would delete the span twice.
pub struct InjectorSink {
    injectors: Vec<Box<dyn TextInjector>>,
    pending_partial_chars: usize,
}

impl InjectorSink {
    pub fn new(injectors: Vec<Box<dyn TextInjector>>) -> Self {
        Self {
            injectors,
            pending_partial_chars: 0,
        }
    }

    /// Probe the chain and report whether any injector is usable
    pub async fn any_available(&self) -> bool {
        for injector in &self.injectors {
            if injector.is_available().await {
                return true;
            }
        }
        false
    }

    async fn active_index(&self) -> Result<usize, OutputError> {
        for (i, injector) in self.injectors.iter().enumerate() {
            if injector.is_available().await {
                return Ok(i);
            }
            tracing::debug!("{} not available, trying next", injector.name());
        }
        Err(OutputError::AllMethodsFailed)
    }

    /// Delete the pending partial span, if any
    ///
    /// Zeroes the counter as soon as the delete lands so a later
    /// failure cannot cause the span to be deleted again.
    async fn clear_pending(&mut self, idx: usize) -> Result<(), OutputError> {
        if self.pending_partial_chars > 0 {
            let count = self.pending_partial_chars;
            self.injectors[idx].delete_chars(count).await?;
            self.pending_partial_chars = 0;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl OutputSink for InjectorSink {
    async fn commit_text(&mut self, text: &str) -> Result<(), OutputError> {
        let idx = self.active_index().await?;
        self.clear_pending(idx).await?;
        self.injectors[idx].type_text(text).await?;
        tracing::debug!(
            "Committed {} chars via {}",
            text.chars().count(),
            self.injectors[idx].name()
        );
        Ok(())
    }

    async fn replace_partial_text(&mut self, text: &str) -> Result<(), OutputError> {
        let idx = self.active_index().await?;
        self.clear_pending(idx).await?;
        self.injectors[idx].type_text(text).await?;
        self.pending_partial_chars = text.chars().count();
        Ok(())
    }

    fn pending_partial_chars(&self) -> usize {
        self.pending_partial_chars
    }
}
