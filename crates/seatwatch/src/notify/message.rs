/// Notification email composition
use super::error::NotifyError;
use crate::catalog::CourseQuery;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::Message;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default `From` header.
pub const DEFAULT_FROM: &str = "Waitlist Watcher <WaitlistWatcher@InternalSystem.ca>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpeningKind {
    Seats,
    Waitlist,
}

/// A number of newly available seats of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Opening {
    pub kind: OpeningKind,
    pub count: u32,
}

impl Opening {
    pub fn seats(count: u32) -> Self {
        Self {
            kind: OpeningKind::Seats,
            count,
        }
    }

    pub fn waitlist(count: u32) -> Self {
        Self {
            kind: OpeningKind::Waitlist,
            count,
        }
    }

    pub fn is_waitlist(&self) -> bool {
        self.kind == OpeningKind::Waitlist
    }
}

impl fmt::Display for Opening {
    /// `3 seats`, `1 waitlist-seat`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}seat{}",
            self.count,
            if self.is_waitlist() { "waitlist-" } else { "" },
            if self.count == 1 { "" } else { "s" }
        )
    }
}

/// A plain-text email ready to hand to a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub from: Mailbox,
    pub to: Mailbox,
    pub subject: String,
    pub body: String,
}

impl Email {
    /// Builds the opening notice for `query` addressed to `to`.
    pub fn opening_notice(
        from: &str,
        to: &str,
        opening: Opening,
        query: &CourseQuery,
    ) -> Result<Self, NotifyError> {
        let from: Mailbox = from.parse()?;
        let to: Mailbox = to.trim().parse()?;

        let subject = format!(
            "{}Opening in {}",
            if opening.is_waitlist() { "waitlist " } else { "" },
            query
        );
        let body = format!(
            "Hi,\n\n\
             This email is to inform you that {} {} opened up for {}.\n\n\
             Thank you for using the waitlist watcher.\n\n\
             Have a great day.",
            opening,
            if opening.count == 1 { "has" } else { "have" },
            query
        );

        Ok(Self {
            from,
            to,
            subject,
            body,
        })
    }

    /// Converts into a `lettre` message with a `text/plain` body.
    pub fn to_message(&self) -> Result<Message, NotifyError> {
        Ok(Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(self.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(self.body.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Term;

    fn query() -> CourseQuery {
        CourseQuery::new("SENG", 275, "A01", Term::Fall)
    }

    #[test]
    fn test_plural_seats() {
        let email = Email::opening_notice(DEFAULT_FROM, "bob@uvic.ca", Opening::seats(3), &query())
            .unwrap();

        assert_eq!(email.subject, "Opening in SENG 275 A01");
        assert!(email
            .body
            .contains("inform you that 3 seats have opened up for SENG 275 A01."));
        assert!(!email.body.contains("3 seat "));
    }

    #[test]
    fn test_single_waitlist_seat() {
        let email = Email::opening_notice(DEFAULT_FROM, "bob@uvic.ca", Opening::waitlist(1), &query())
            .unwrap();

        assert_eq!(email.subject, "waitlist Opening in SENG 275 A01");
        assert!(email
            .body
            .contains("inform you that 1 waitlist-seat has opened up for SENG 275 A01."));
    }

    #[test]
    fn test_headers() {
        let email = Email::opening_notice(DEFAULT_FROM, " bob@uvic.ca ", Opening::seats(2), &query())
            .unwrap();

        assert_eq!(email.from.email.to_string(), "WaitlistWatcher@InternalSystem.ca");
        assert_eq!(email.from.name.as_deref(), Some("Waitlist Watcher"));
        assert_eq!(email.to.email.to_string(), "bob@uvic.ca");
        assert!(email.body.starts_with("Hi,\n\n"));
        assert!(email
            .body
            .contains("\n\nThank you for using the waitlist watcher.\n\n"));
        assert!(email.body.ends_with("Have a great day."));
    }

    #[test]
    fn test_invalid_recipient() {
        let err = Email::opening_notice(DEFAULT_FROM, "not-an-address", Opening::seats(2), &query())
            .unwrap_err();
        assert!(matches!(err, NotifyError::InvalidAddress { .. }));
    }

    #[test]
    fn test_to_message() {
        let email = Email::opening_notice(DEFAULT_FROM, "bob@uvic.ca", Opening::seats(2), &query())
            .unwrap();
        let formatted = String::from_utf8(email.to_message().unwrap().formatted()).unwrap();

        assert!(formatted.contains("Subject: Opening in SENG 275 A01"));
        assert!(formatted.contains("To: bob@uvic.ca"));
        assert!(formatted.contains("Content-Type: text/plain"));
    }
}
