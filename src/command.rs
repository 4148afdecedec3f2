//! Thin command router for inbound chat text.
//!
//! Maps the first word of a message to one of a fixed set of command names by
//! unique prefix. The chat platform itself (message intake, sending, file
//! upload) is an external collaborator reached through [`Responder`].

/// Fire-and-forget responder supplied by the chat collaborator. Delivery
/// failures are the implementation's problem to log.
pub trait Responder: Send + Sync {
    fn respond(&self, message: &str);
}

/// Prefix-matching command router.
#[derive(Debug, Clone)]
pub struct Router {
    commands: Vec<String>,
    fallback: String,
}

impl Router {
    /// `fallback` receives the whole input when no unique prefix matches.
    pub fn new<I, S>(commands: I, fallback: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            fallback: fallback.to_string(),
        }
    }

    /// Resolve inbound text to `(command, argument)`.
    ///
    /// Empty input routes to `help`. An ambiguous or unknown prefix routes to
    /// the fallback command with the untouched input as its argument.
    pub fn resolve(&self, text: &str) -> (String, String) {
        let text = text.trim();
        let (word, arg) = match text.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim_start()),
            None => (text, ""),
        };
        if word.is_empty() {
            return ("help".to_string(), String::new());
        }
        let mut matches = self.commands.iter().filter(|c| c.starts_with(word));
        match (matches.next(), matches.next()) {
            (Some(command), None) => (command.clone(), arg.to_string()),
            _ => (self.fallback.clone(), text.to_string()),
        }
    }
}
