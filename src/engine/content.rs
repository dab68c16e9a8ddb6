//! Message-content heuristics: quoted-reply stripping, questionnaire
//! detection, and numbered-answer parsing.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

/// Markers injected by our own outbound questionnaire mails. A body
/// containing one of these is bot-generated boilerplate, not a user
/// answer, and is stripped from follow-up comments.
const BOT_CONTENT_MARKERS: &[&str] = &[
    "This email contains an interactive questionnaire form",
    "Service Request Questionnaire",
    "Please Complete Questionnaire",
    "Answer: Your answer to question",
    "Additional Comments",
    "Question Attachments:",
    "Comments Attachments:",
    "General Attachments:",
    "(no files)",
];

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

static QUESTIONNAIRE_ANSWER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Q\d+:\s*\w+").expect("valid regex"));

static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[Qq]?(\d+)\s*[.:]\s*(.*)$").expect("valid regex"));

/// Reduce an HTML (or plain) body to visible text.
fn html_to_text(body: &str) -> String {
    let text = HTML_TAG.replace_all(body, " ");
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .trim()
        .to_string()
}

fn is_quoted_header(line: &str) -> bool {
    line.starts_with("From:")
        || line.starts_with("To:")
        || line.starts_with("Subject:")
        || line.starts_with("Date:")
        || line.starts_with("-----Original Message-----")
        || (line.starts_with("On ") && line.contains("wrote:"))
}

fn is_bot_content(line: &str) -> bool {
    BOT_CONTENT_MARKERS.iter().any(|m| line.contains(m))
}

/// Extract the new content a sender actually wrote, dropping quoted
/// reply headers and bot-generated sections.
///
/// Once a quoted header or bot marker is seen, everything after it is
/// quoted history and is dropped. If nothing survives, the first
/// usable line is taken; failing that, a fixed placeholder.
pub fn extract_new_content(body: &str) -> String {
    let text = html_to_text(body);
    let lines: Vec<&str> = text.lines().map(str::trim).collect();

    let mut clean: Vec<&str> = Vec::new();
    let mut in_quoted_section = false;

    for line in &lines {
        if line.is_empty() {
            continue;
        }
        if is_bot_content(line) || is_quoted_header(line) {
            in_quoted_section = true;
            continue;
        }
        if !in_quoted_section && line.len() > 3 {
            clean.push(line);
        }
    }

    if !clean.is_empty() {
        return clean.join("\n");
    }

    // Fallback: first usable line from the top of the message.
    lines
        .iter()
        .take(5)
        .find(|l| !l.is_empty() && !is_bot_content(l))
        .map(|l| l.to_string())
        .unwrap_or_else(|| "Follow-up message".to_string())
}

/// Whether a follow-up body is a questionnaire response.
///
/// Bot-form boilerplate disqualifies the body outright (that is our
/// own outbound form echoed back). Otherwise, bracketed question tags,
/// `Q<n>:` markers, or leading-numbered answer lines qualify it.
pub fn is_questionnaire_response(body: &str) -> bool {
    let text = html_to_text(body);

    let bot_indicators = [
        "This email contains an interactive questionnaire form",
        "Service Request Questionnaire",
        "Please Complete Questionnaire",
    ];
    if bot_indicators.iter().any(|m| text.contains(m)) {
        return false;
    }

    let tags = ["[Q", "[COMMENTS]", "[GENERAL_ATTACHMENT]"];
    if tags.iter().any(|t| text.contains(t)) {
        return true;
    }

    if QUESTIONNAIRE_ANSWER.is_match(&text) {
        return true;
    }

    text.lines().any(|line| {
        NUMBERED_LINE
            .captures(line)
            .is_some_and(|c| !c[2].trim().is_empty())
    })
}

/// Parse numbered answers: a leading integer, `.` or `:`, then free
/// text that may continue over following lines until the next number.
///
/// Empty answers are dropped; the result may be empty.
pub fn parse_numbered_answers(body: &str) -> BTreeMap<u32, String> {
    let text = html_to_text(body);
    let mut answers: BTreeMap<u32, String> = BTreeMap::new();

    let mut current: Option<(u32, Vec<String>)> = None;
    let flush = |entry: Option<(u32, Vec<String>)>, answers: &mut BTreeMap<u32, String>| {
        if let Some((number, parts)) = entry {
            let answer = parts.join("\n").trim().to_string();
            if !answer.is_empty() {
                answers.insert(number, answer);
            }
        }
    };

    for line in text.lines() {
        let trimmed = line.trim();
        // Quoted history ends the answer section outright.
        if is_quoted_header(trimmed) || is_bot_content(trimmed) {
            break;
        }
        if let Some(caps) = NUMBERED_LINE.captures(line) {
            if let Ok(number) = caps[1].parse::<u32>() {
                flush(current.take(), &mut answers);
                current = Some((number, vec![caps[2].trim().to_string()]));
                continue;
            }
        }
        if let Some((_, parts)) = current.as_mut()
            && !trimmed.is_empty()
        {
            parts.push(trimmed.to_string());
        }
    }
    flush(current, &mut answers);

    answers
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── extract_new_content ─────────────────────────────────────────

    #[test]
    fn strips_quoted_reply_headers() {
        let body = "The printer is still jammed.\n\
                    From: helpdesk@x.com\n\
                    Subject: Re: Printer\n\
                    Earlier quoted text here.";
        assert_eq!(extract_new_content(body), "The printer is still jammed.");
    }

    #[test]
    fn drops_everything_after_reply_separator() {
        let body = "Thanks, that fixed it.\n\
                    On Tue, Jan 2 at 9:00 AM helpdesk wrote:\n\
                    Please try restarting.";
        assert_eq!(extract_new_content(body), "Thanks, that fixed it.");
    }

    #[test]
    fn strips_bot_generated_sections() {
        let body = "Here is an update from me.\n\
                    Service Request Questionnaire\n\
                    Q1: Q1\n\
                    Answer: Your answer to question";
        assert_eq!(extract_new_content(body), "Here is an update from me.");
    }

    #[test]
    fn html_body_is_flattened() {
        let body = "<html><body><p>VPN still broken &amp; slow</p></body></html>";
        assert_eq!(extract_new_content(body), "VPN still broken & slow");
    }

    #[test]
    fn empty_body_falls_back_to_placeholder() {
        assert_eq!(extract_new_content("   \n  "), "Follow-up message");
    }

    #[test]
    fn short_only_lines_fall_back_to_first_usable_line() {
        // Every line is <= 3 chars so the main pass keeps nothing.
        assert_eq!(extract_new_content("ok"), "ok");
    }

    // ── is_questionnaire_response ───────────────────────────────────

    #[test]
    fn bracketed_tags_qualify() {
        assert!(is_questionnaire_response("[Q1] my answer"));
        assert!(is_questionnaire_response("see [COMMENTS] below"));
    }

    #[test]
    fn q_number_pattern_qualifies() {
        assert!(is_questionnaire_response("Q1: urgent\nQ2: since Monday"));
    }

    #[test]
    fn numbered_answer_lines_qualify() {
        assert!(is_questionnaire_response(
            "1. It's urgent\n2. Started yesterday"
        ));
    }

    #[test]
    fn bot_form_boilerplate_disqualifies() {
        let body = "Service Request Questionnaire\n1. question one\n2. question two";
        assert!(!is_questionnaire_response(body));
    }

    #[test]
    fn plain_followup_does_not_qualify() {
        assert!(!is_questionnaire_response(
            "Any update on this? It is blocking the team."
        ));
    }

    #[test]
    fn bare_numbered_lines_without_text_do_not_qualify() {
        assert!(!is_questionnaire_response("1.\n2.\n3."));
    }

    // ── parse_numbered_answers ──────────────────────────────────────

    #[test]
    fn parses_dot_numbered_answers() {
        let answers = parse_numbered_answers("1. It's urgent\n2. Started yesterday");
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[&1], "It's urgent");
        assert_eq!(answers[&2], "Started yesterday");
    }

    #[test]
    fn parses_q_prefixed_answers() {
        let answers = parse_numbered_answers("Q1: urgent\nQ2: since Monday");
        assert_eq!(answers[&1], "urgent");
        assert_eq!(answers[&2], "since Monday");
    }

    #[test]
    fn parses_colon_numbered_answers() {
        let answers = parse_numbered_answers("1: yes\n2: the third floor printer");
        assert_eq!(answers[&1], "yes");
        assert_eq!(answers[&2], "the third floor printer");
    }

    #[test]
    fn multiline_answer_accumulates_until_next_number() {
        let answers =
            parse_numbered_answers("1. It started Monday\nand got worse Tuesday\n2. Yes");
        assert_eq!(answers[&1], "It started Monday\nand got worse Tuesday");
        assert_eq!(answers[&2], "Yes");
    }

    #[test]
    fn empty_answers_are_dropped() {
        let answers = parse_numbered_answers("1.\n2. only this one\n3.   ");
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[&2], "only this one");
    }

    #[test]
    fn quoted_history_does_not_leak_into_answers() {
        let answers = parse_numbered_answers(
            "1. Fixed now\nFrom: helpdesk@x.com\n2. should not appear",
        );
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[&1], "Fixed now");
    }

    #[test]
    fn no_answers_yields_empty_map() {
        assert!(parse_numbered_answers("just a sentence").is_empty());
    }
}
