use crate::domain::submission::Submission;
use time::OffsetDateTime;
use time::macros::format_description;

/// A fully addressed message ready to be handed to a mail transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Display name of the sender, without any quoting.
    pub from_name: String,
    pub from_email: String,
    pub to: String,
    pub reply_to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub html: String,
    pub text: String,
}

/// Escapes the five HTML-significant characters.
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Plain-text body. User input is deliberately not escaped here.
#[must_use]
pub fn render_text(submission: &Submission) -> String {
    format!("Name: {}\nEmail: {}\nMessage: {}", submission.name(), submission.email(), submission.message())
}

fn format_received_at(received_at: OffsetDateTime) -> String {
    received_at
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC"))
        .unwrap_or_else(|_| received_at.unix_timestamp().to_string())
}

/// Renders the HTML notification and its plain-text fallback.
#[must_use]
pub fn render_email(submission: &Submission, received_at: OffsetDateTime) -> RenderedEmail {
    let name = escape_html(submission.name());
    let email = escape_html(submission.email());
    let message = escape_html(submission.message()).replace("\r\n", "\n").replace('\n', "<br>\n");
    let received = format_received_at(received_at.to_offset(time::UtcOffset::UTC));

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Portfolio Contact Form</title>
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
        .header {{ background: linear-gradient(135deg, #ff6b6b, #ffa726); color: white; padding: 20px; text-align: center; border-radius: 10px 10px 0 0; }}
        .content {{ padding: 20px; background: #f9f9f9; }}
        .field {{ margin-bottom: 15px; }}
        .label {{ font-weight: bold; color: #555; }}
        .value {{ margin-top: 5px; }}
        .footer {{ text-align: center; padding: 20px; color: #666; font-size: 12px; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>New Portfolio Contact</h1>
        </div>
        <div class="content">
            <div class="field">
                <div class="label">Name:</div>
                <div class="value">{name}</div>
            </div>
            <div class="field">
                <div class="label">Email:</div>
                <div class="value"><a href="mailto:{email}">{email}</a></div>
            </div>
            <div class="field">
                <div class="label">Message:</div>
                <div class="value">{message}</div>
            </div>
        </div>
        <div class="footer">
            <p>This message was sent from your portfolio contact form.</p>
            <p>Received on {received}</p>
        </div>
    </div>
</body>
</html>
"#
    );

    RenderedEmail { html, text: render_text(submission) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn submission(name: &str, email: &str, message: &str) -> Submission {
        Submission::new(Some(name.into()), Some(email.into()), Some(message.into()))
    }

    #[test]
    fn test_escape_html_all_special_characters() {
        assert_eq!(escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#), "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#039;Jerry&#039;&lt;/a&gt;");
        assert_eq!(escape_html("plain text"), "plain text");
    }

    #[test]
    fn test_render_escapes_script_tags() {
        let s = submission("<script>alert(1)</script>", "al@x.com", "<script>steal()</script> hello there");
        let rendered = render_email(&s, datetime!(2024-05-01 12:30:00 UTC));

        assert!(!rendered.html.contains("<script>"));
        assert!(rendered.html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(rendered.html.contains("&lt;script&gt;steal()&lt;/script&gt; hello there"));
    }

    #[test]
    fn test_text_fallback_is_raw() {
        let s = submission("<b>Al</b>", "al@x.com", "Tom & Jerry say <hi>");
        let rendered = render_email(&s, datetime!(2024-05-01 12:30:00 UTC));

        assert_eq!(rendered.text, "Name: <b>Al</b>\nEmail: al@x.com\nMessage: Tom & Jerry say <hi>");
    }

    #[test]
    fn test_render_includes_mailto_and_timestamp() {
        let s = submission("Al", "al@x.com", "Line one\nLine two");
        let rendered = render_email(&s, datetime!(2024-05-01 12:30:05 UTC));

        assert!(rendered.html.contains(r#"<a href="mailto:al@x.com">al@x.com</a>"#));
        assert!(rendered.html.contains("Line one<br>\nLine two"));
        assert!(rendered.html.contains("Received on 2024-05-01 12:30:05 UTC"));
    }
}
