use regex::Regex;
use std::sync::LazyLock;

/// Terms that mark a message as spam, matched case-insensitively anywhere in the message.
pub const SPAM_TERMS: [&str; 5] = ["viagra", "casino", "lottery", "winner", "congratulations"];

pub const MIN_NAME_CHARS: usize = 2;
pub const MIN_MESSAGE_CHARS: usize = 10;

pub const NAME_TOO_SHORT: &str = "Name must be at least 2 characters long";
pub const INVALID_EMAIL: &str = "Please enter a valid email address";
pub const MESSAGE_TOO_SHORT: &str = "Message must be at least 10 characters long";
pub const SPAM_DETECTED: &str = "Message contains inappropriate content";
pub const INVALID_REPLY_TO: &str = "Please enter a valid reply-to address";
pub const HONEYPOT_TRIGGERED: &str = "Submission rejected";

static EMAIL_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

/// Returns true if `candidate` has the `local@domain.tld` shape accepted by the contact form.
#[must_use]
pub fn is_valid_email(candidate: &str) -> bool {
    EMAIL_PATTERN.as_ref().is_some_and(|re| re.is_match(candidate))
}

/// Sender-supplied overrides for the outgoing envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub to: Option<String>,
    pub from: Option<String>,
    pub subject: Option<String>,
    pub reply_to: Option<String>,
    pub html: Option<String>,
}

/// A single contact-form submission.
///
/// Text fields are trimmed on construction and blank values collapse to `None`,
/// so an absent field and a whitespace-only field validate identically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    name: Option<String>,
    email: Option<String>,
    message: Option<String>,
    overrides: Overrides,
    honeypot: Option<String>,
}

fn normalize(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationRules {
    pub max_message_chars: usize,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self { max_message_chars: 1000 }
    }
}

impl Submission {
    #[must_use]
    pub fn new(name: Option<String>, email: Option<String>, message: Option<String>) -> Self {
        Self {
            name: normalize(name),
            email: normalize(email),
            message: normalize(message),
            overrides: Overrides::default(),
            honeypot: None,
        }
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = Overrides {
            to: normalize(overrides.to),
            from: normalize(overrides.from),
            subject: normalize(overrides.subject),
            reply_to: normalize(overrides.reply_to),
            // Pre-rendered bodies are taken as-is apart from dropping blanks.
            html: overrides.html.filter(|h| !h.trim().is_empty()),
        };
        self
    }

    #[must_use]
    pub fn with_honeypot(mut self, honeypot: Option<String>) -> Self {
        self.honeypot = normalize(honeypot);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn email(&self) -> &str {
        self.email.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub const fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    /// Checks every rule and returns all violations in a stable order.
    /// An empty vector means the submission is acceptable.
    #[must_use]
    pub fn validate(&self, rules: &ValidationRules) -> Vec<String> {
        let mut errors = Vec::new();

        if self.name().chars().count() < MIN_NAME_CHARS {
            errors.push(NAME_TOO_SHORT.to_string());
        }

        if !is_valid_email(self.email()) {
            errors.push(INVALID_EMAIL.to_string());
        }

        let message_chars = self.message().chars().count();
        if message_chars < MIN_MESSAGE_CHARS {
            errors.push(MESSAGE_TOO_SHORT.to_string());
        } else if message_chars > rules.max_message_chars {
            errors.push(format!("Message must be at most {} characters long", rules.max_message_chars));
        }

        if contains_spam(self.message()) {
            errors.push(SPAM_DETECTED.to_string());
        }

        if let Some(reply_to) = &self.overrides.reply_to
            && !is_valid_email(reply_to)
        {
            errors.push(INVALID_REPLY_TO.to_string());
        }

        if self.honeypot.is_some() {
            errors.push(HONEYPOT_TRIGGERED.to_string());
        }

        errors
    }
}

fn contains_spam(message: &str) -> bool {
    let lowered = message.to_lowercase();
    SPAM_TERMS.iter().any(|term| lowered.contains(term))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(name: &str, email: &str, message: &str) -> Submission {
        Submission::new(Some(name.into()), Some(email.into()), Some(message.into()))
    }

    #[test]
    fn test_valid_submission_passes() {
        let s = submission("Al", "al@x.com", "Hello there, nice site!");
        assert!(s.validate(&ValidationRules::default()).is_empty());
    }

    #[test]
    fn test_short_name_rejected() {
        for name in ["", "A", "  B  "] {
            let errors = submission(name, "al@x.com", "Hello there, nice site!").validate(&ValidationRules::default());
            assert_eq!(errors, vec![NAME_TOO_SHORT.to_string()], "name {name:?} should be rejected");
        }
    }

    #[test]
    fn test_name_length_counts_characters_not_bytes() {
        let s = submission("Zoë", "z@x.com", "Hello there, nice site!");
        assert!(s.validate(&ValidationRules::default()).is_empty());

        let s = submission("é", "z@x.com", "Hello there, nice site!");
        assert_eq!(s.validate(&ValidationRules::default()), vec![NAME_TOO_SHORT.to_string()]);
    }

    #[test]
    fn test_email_pattern() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last+tag@sub.example.org"));

        for invalid in ["a@b", "a.com", "@b.com", "a b@c.com", "a@@b.com", ""] {
            assert!(!is_valid_email(invalid), "{invalid:?} should not be a valid email");
        }
    }

    #[test]
    fn test_missing_fields_collect_all_errors() {
        let errors = Submission::new(None, None, None).validate(&ValidationRules::default());
        assert_eq!(
            errors,
            vec![NAME_TOO_SHORT.to_string(), INVALID_EMAIL.to_string(), MESSAGE_TOO_SHORT.to_string()]
        );
    }

    #[test]
    fn test_whitespace_only_message_is_too_short() {
        let errors = submission("Alice", "a@b.co", "   \n\t  ").validate(&ValidationRules::default());
        assert_eq!(errors, vec![MESSAGE_TOO_SHORT.to_string()]);
    }

    #[test]
    fn test_message_too_long() {
        let rules = ValidationRules { max_message_chars: 20 };
        let errors = submission("Alice", "a@b.co", &"x".repeat(21)).validate(&rules);
        assert_eq!(errors, vec!["Message must be at most 20 characters long".to_string()]);

        assert!(submission("Alice", "a@b.co", &"x".repeat(20)).validate(&rules).is_empty());
    }

    #[test]
    fn test_spam_terms_any_casing() {
        for message in ["Buy VIAGRA today please", "Visit our Casino now!!", "You are a WiNnEr, claim it"] {
            let errors = submission("Alice", "a@b.co", message).validate(&ValidationRules::default());
            assert_eq!(errors, vec![SPAM_DETECTED.to_string()], "{message:?} should be flagged");
        }
    }

    #[test]
    fn test_spam_reported_once() {
        let errors =
            submission("Alice", "a@b.co", "casino lottery winner viagra").validate(&ValidationRules::default());
        assert_eq!(errors.iter().filter(|e| *e == SPAM_DETECTED).count(), 1);
    }

    #[test]
    fn test_invalid_reply_to_override() {
        let s = submission("Alice", "a@b.co", "Hello there, nice site!")
            .with_overrides(Overrides { reply_to: Some("nope".into()), ..Overrides::default() });
        assert_eq!(s.validate(&ValidationRules::default()), vec![INVALID_REPLY_TO.to_string()]);
    }

    #[test]
    fn test_honeypot_rejects() {
        let s = submission("Alice", "a@b.co", "Hello there, nice site!").with_honeypot(Some("http://spam".into()));
        assert_eq!(s.validate(&ValidationRules::default()), vec![HONEYPOT_TRIGGERED.to_string()]);

        let s = submission("Alice", "a@b.co", "Hello there, nice site!").with_honeypot(Some("   ".into()));
        assert!(s.validate(&ValidationRules::default()).is_empty());
    }

    #[test]
    fn test_fields_are_trimmed() {
        let s = submission("  Alice ", " a@b.co ", "  Hello there, nice site!  ");
        assert_eq!(s.name(), "Alice");
        assert_eq!(s.email(), "a@b.co");
        assert_eq!(s.message(), "Hello there, nice site!");
    }
}
