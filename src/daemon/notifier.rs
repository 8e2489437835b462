use anyhow::Result;
use log::debug;

use crate::chat::ChatSink;
use crate::config::{MAX_MESSAGE_CHARS, TELEGRAM_TEXT_LIMIT};
use crate::error::RelayError;

/// Split `body` into consecutive slices of at most `max_chars` characters.
/// Concatenating the slices gives back `body`.
pub fn split_body(body: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut out = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in body.char_indices() {
        if count == max_chars {
            out.push(&body[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < body.len() {
        out.push(&body[start..]);
    }
    out
}

/// Chat texts for one mail, in send order. Numbered parts carry the subject
/// cut down to whatever room the body slice leaves under the Telegram limit.
pub fn build_messages(subject: &str, body: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.clamp(1, MAX_MESSAGE_CHARS);
    let subject_and_body = format!("{subject}:\n{body}");
    if subject_and_body.chars().count() <= max_chars {
        return vec![subject_and_body];
    }

    let slices = split_body(body, max_chars);
    if slices.is_empty() {
        // Only the subject overflows; send what fits.
        return vec![subject_and_body.chars().take(max_chars).collect()];
    }

    let widest_suffix = format!(" (parte {}):\n", slices.len()).chars().count();
    let room = TELEGRAM_TEXT_LIMIT.saturating_sub(max_chars + widest_suffix);
    let header: String = subject.chars().take(room).collect();

    slices
        .iter()
        .enumerate()
        .map(|(i, slice)| format!("{header} (parte {}):\n{slice}", i + 1))
        .collect()
}

/// Formats mails into chat messages and delivers them in order.
pub struct Notifier<'a> {
    chat: &'a dyn ChatSink,
    max_chars: usize,
}

impl<'a> Notifier<'a> {
    pub fn new(chat: &'a dyn ChatSink) -> Self {
        Self::with_limit(chat, MAX_MESSAGE_CHARS)
    }

    pub fn with_limit(chat: &'a dyn ChatSink, max_chars: usize) -> Self {
        Self { chat, max_chars }
    }

    /// Send every chunk of one mail, stopping at the first failure.
    /// Returns how many chat messages were sent.
    pub fn notify(&self, message_id: &str, subject: &str, body: &str) -> Result<usize> {
        let texts = build_messages(subject, body, self.max_chars);
        let total = texts.len();
        for (i, text) in texts.iter().enumerate() {
            self.chat.send_text(text).map_err(|e| {
                e.context(RelayError::SendFailure {
                    id: message_id.to_string(),
                    part: i + 1,
                    total,
                })
            })?;
            debug!("sent part {}/{} for {message_id}", i + 1, total);
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        sent: RefCell<Vec<String>>,
        fail_on: Option<usize>,
    }

    impl ChatSink for Recorder {
        fn send_text(&self, text: &str) -> Result<()> {
            if self.fail_on == Some(self.sent.borrow().len()) {
                return Err(anyhow!("flood control"));
            }
            self.sent.borrow_mut().push(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn split_preserves_content_and_bounds() {
        for len in [0usize, 1, 3999, 4000, 4001, 8000, 12345] {
            let body: String = (0..len).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
            let parts = split_body(&body, 4000);
            assert_eq!(parts.len(), len.div_ceil(4000), "len {len}");
            assert!(parts.iter().all(|p| p.chars().count() <= 4000));
            assert_eq!(parts.concat(), body);
        }
    }

    #[test]
    fn split_counts_characters_not_bytes() {
        let body = "é".repeat(5);
        let parts = split_body(&body, 2);
        assert_eq!(parts, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn short_mail_is_one_message() {
        let msgs = build_messages("S", "hello", 4000);
        assert_eq!(msgs, vec!["S:\nhello".to_string()]);
    }

    #[test]
    fn one_char_over_the_limit_switches_to_numbered_parts() {
        // "S:\n" is three characters
        let fits = build_messages("S", &"x".repeat(3997), 4000);
        assert_eq!(fits.len(), 1);
        assert!(fits[0].starts_with("S:\n"));

        let over = build_messages("S", &"x".repeat(3998), 4000);
        assert_eq!(over.len(), 1);
        assert!(over[0].starts_with("S (parte 1):\n"));
    }

    #[test]
    fn long_body_is_split_into_numbered_parts() {
        let body = "x".repeat(9000);
        let msgs = build_messages("S", &body, 4000);
        assert_eq!(msgs.len(), 3);
        for (i, (msg, len)) in msgs.iter().zip([4000, 4000, 1000]).enumerate() {
            let header = format!("S (parte {}):\n", i + 1);
            assert!(msg.starts_with(&header));
            assert_eq!(msg[header.len()..].chars().count(), len);
        }
    }

    #[test]
    fn overlong_subject_with_empty_body_sends_one_truncated_message() {
        let subject = "s".repeat(5000);
        let msgs = build_messages(&subject, "", 4000);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].chars().count(), 4000);
    }

    #[test]
    fn every_text_fits_in_one_telegram_message() {
        let long_subject = "s".repeat(5000);
        let long_subject = long_subject.as_str();
        let medium_subject = "m".repeat(120);
        let medium_subject = medium_subject.as_str();
        let huge_body = "x".repeat(45_000);
        let huge_body = huge_body.as_str();
        let cases: [(&str, &str, usize); 6] = [
            ("S", huge_body, 4000),
            (medium_subject, huge_body, 4000),
            (medium_subject, huge_body, 4096),
            (long_subject, "x", 4000),
            (long_subject, "", 4000),
            (long_subject, huge_body, 4000),
        ];
        for (subject, body, limit) in cases {
            for text in build_messages(subject, body, limit) {
                assert!(
                    text.chars().count() <= TELEGRAM_TEXT_LIMIT,
                    "subject {} body {} limit {limit}: {} chars",
                    subject.len(),
                    body.len(),
                    text.chars().count()
                );
            }
        }
    }

    #[test]
    fn long_subject_is_cut_in_headers_but_body_slices_keep_their_size() {
        let subject = "m".repeat(120);
        let msgs = build_messages(&subject, &"x".repeat(9000), 4000);
        assert_eq!(msgs.len(), 3);
        // 4096 - 4000 - " (parte 3):\n"
        let kept = "m".repeat(84);
        for (i, (msg, len)) in msgs.iter().zip([4000, 4000, 1000]).enumerate() {
            let header = format!("{kept} (parte {}):\n", i + 1);
            assert!(msg.starts_with(&header));
            assert_eq!(msg[header.len()..].chars().count(), len);
        }

        let tiny_body = build_messages(&"s".repeat(5000), "x", 4000);
        assert_eq!(tiny_body.len(), 1);
        assert!(tiny_body[0].ends_with(" (parte 1):\nx"));
    }

    #[test]
    fn notify_sends_parts_in_order() {
        let chat = Recorder::default();
        let n = Notifier::new(&chat);
        let sent = n.notify("m1", "S", &"y".repeat(4500)).unwrap();
        assert_eq!(sent, 2);
        let log = chat.sent.borrow();
        assert!(log[0].starts_with("S (parte 1):\n"));
        assert!(log[1].starts_with("S (parte 2):\n"));
    }

    #[test]
    fn notify_stops_at_first_failed_part() {
        let chat = Recorder {
            fail_on: Some(1),
            ..Default::default()
        };
        let n = Notifier::with_limit(&chat, 10);
        let err = n.notify("m1", "S", &"z".repeat(30)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<RelayError>(),
            Some(&RelayError::SendFailure {
                id: "m1".into(),
                part: 2,
                total: 3
            })
        );
        assert_eq!(chat.sent.borrow().len(), 1);
    }
}
