//! Ticket-suggestion classifier over a finished bot reply
use lazy_static::lazy_static;
use regex::Regex;

pub const DEFAULT_TICKET_PATTERN: &str = r"crea un ticket|TICKET-\d{4}";

lazy_static! {
    static ref DEFAULT_TICKET_REGEX: Regex =
        Regex::new(DEFAULT_TICKET_PATTERN).expect("default ticket pattern is valid");
}

#[derive(Debug, Clone)]
pub struct TicketClassifier {
    pattern: Regex,
}

impl TicketClassifier {
    pub fn new(pattern: &str) -> anyhow::Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| anyhow::anyhow!("Invalid ticket pattern '{}': {}", pattern, e))?;
        Ok(Self { pattern })
    }

    /// True when the reply recommends opening a support ticket
    pub fn suggests_ticket(&self, reply: &str) -> bool {
        self.pattern.is_match(reply)
    }
}

impl Default for TicketClassifier {
    fn default() -> Self {
        Self { pattern: DEFAULT_TICKET_REGEX.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pattern() {
        let classifier = TicketClassifier::default();
        assert!(classifier.suggests_ticket("Si el problema sigue, crea un ticket por favor."));
        assert!(classifier.suggests_ticket("Tu caso es TICKET-1234."));
        assert!(!classifier.suggests_ticket("TICKET-12 no cuenta"));
        assert!(!classifier.suggests_ticket("Todo resuelto."));
    }

    #[test]
    fn test_custom_pattern_and_invalid_pattern() {
        let classifier = TicketClassifier::new(r"(?i)open a ticket").unwrap();
        assert!(classifier.suggests_ticket("Please OPEN A TICKET"));
        assert!(TicketClassifier::new("(unclosed").is_err());
    }
}
