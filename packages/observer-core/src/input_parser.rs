//! Detects and parses `[INPUT_REQUIRED]` blocks in captured pane output.
//!
//! Ported from the original `InputParser`: scan the tail of the buffer for
//! the marker first (most recent request wins), then read a small fixed
//! window of lines looking for `TYPE`/`PROMPT`/`MESSAGE`/`OPTIONS` fields.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::model::{InputRequest, InputType};

const INPUT_MARKER: &str = "[INPUT_REQUIRED]";
const BLOCK_WINDOW: usize = 20;

static TYPE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*TYPE:\s*(\w+)\s*$").unwrap());
static PROMPT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*PROMPT:\s*(.+)$").unwrap());
static MESSAGE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*MESSAGE:\s*(.+)$").unwrap());
static OPTIONS_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*OPTIONS:\s*$").unwrap());
static OPTION_LINE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+\)\s*(.+)$").unwrap());

pub struct InputParser;

impl InputParser {
    /// Tail-first substring scan, cheap enough to call on every output
    /// update before committing to the full block parse.
    pub fn has_input_marker(lines: &[String]) -> bool {
        lines.iter().rev().any(|line| line.contains(INPUT_MARKER))
    }

    /// Finds the most recent `[INPUT_REQUIRED]` marker and parses the block
    /// that follows it, if any.
    pub fn parse(lines: &[String]) -> Option<InputRequest> {
        let marker_index = lines.iter().rposition(|line| line.contains(INPUT_MARKER))?;
        let block = Self::extract_block(lines, marker_index);
        Self::parse_block(&block)
    }

    fn extract_block(lines: &[String], marker_index: usize) -> Vec<String> {
        let mut block = Vec::new();
        let mut seen_content = false;
        let end = (marker_index + 1 + BLOCK_WINDOW).min(lines.len());
        for line in &lines[marker_index + 1..end] {
            if line.trim().is_empty() {
                if seen_content {
                    break;
                }
                continue;
            }
            seen_content = true;
            block.push(line.clone());
        }
        block
    }

    fn parse_block(block: &[String]) -> Option<InputRequest> {
        let mut declared_type: Option<InputType> = None;
        let mut prompt = None;
        let mut message = None;
        let mut options = Vec::new();
        let mut in_options = false;

        for line in block {
            if in_options {
                if let Some(caps) = OPTION_LINE_PATTERN.captures(line) {
                    options.push(caps[1].trim().to_string());
                    continue;
                }
                in_options = false;
            }

            if let Some(caps) = TYPE_PATTERN.captures(line) {
                declared_type = match caps[1].to_ascii_lowercase().as_str() {
                    "text" => Some(InputType::Text),
                    "choice" => Some(InputType::Choice),
                    "confirm" => Some(InputType::Confirm),
                    other => {
                        warn!(value = other, "input parser: unrecognized TYPE, inferring instead");
                        None
                    }
                };
                continue;
            }
            if let Some(caps) = PROMPT_PATTERN.captures(line) {
                prompt = Some(caps[1].trim().to_string());
                continue;
            }
            if let Some(caps) = MESSAGE_PATTERN.captures(line) {
                message = Some(caps[1].trim().to_string());
                continue;
            }
            if OPTIONS_PATTERN.is_match(line) {
                in_options = true;
                continue;
            }
        }

        let input_type = declared_type.unwrap_or_else(|| {
            if !options.is_empty() {
                InputType::Choice
            } else if message.is_some() {
                InputType::Confirm
            } else if prompt.is_some() {
                InputType::Text
            } else {
                InputType::Text
            }
        });

        if prompt.is_none() && message.is_none() && options.is_empty() {
            return None;
        }

        Some(InputRequest {
            input_type,
            prompt,
            message,
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(|l| l.to_string()).collect()
    }

    #[test]
    fn no_marker_returns_none() {
        assert!(InputParser::parse(&lines("just output\nmore output")).is_none());
    }

    #[test]
    fn text_prompt_with_explicit_type() {
        let input = lines("[INPUT_REQUIRED]\nTYPE: text\nPROMPT: Enter your name");
        let req = InputParser::parse(&input).unwrap();
        assert_eq!(req.input_type, InputType::Text);
        assert_eq!(req.prompt.as_deref(), Some("Enter your name"));
    }

    #[test]
    fn choice_inferred_from_options() {
        let input = lines("[INPUT_REQUIRED]\nPROMPT: pick one\nOPTIONS:\n1) yes\n2) no");
        let req = InputParser::parse(&input).unwrap();
        assert_eq!(req.input_type, InputType::Choice);
        assert_eq!(req.options, vec!["yes".to_string(), "no".to_string()]);
    }

    #[test]
    fn confirm_inferred_from_message_only() {
        let input = lines("[INPUT_REQUIRED]\nMESSAGE: Overwrite existing file?");
        let req = InputParser::parse(&input).unwrap();
        assert_eq!(req.input_type, InputType::Confirm);
        assert_eq!(req.message.as_deref(), Some("Overwrite existing file?"));
    }

    #[test]
    fn unknown_type_value_falls_back_to_inference() {
        let input = lines("[INPUT_REQUIRED]\nTYPE: bogus\nPROMPT: hi");
        let req = InputParser::parse(&input).unwrap();
        assert_eq!(req.input_type, InputType::Text);
    }

    #[test]
    fn most_recent_marker_wins() {
        let input = lines(
            "[INPUT_REQUIRED]\nPROMPT: stale\n\n[INPUT_REQUIRED]\nPROMPT: fresh",
        );
        let req = InputParser::parse(&input).unwrap();
        assert_eq!(req.prompt.as_deref(), Some("fresh"));
    }

    #[test]
    fn blank_line_after_content_ends_block() {
        let input = lines("[INPUT_REQUIRED]\nPROMPT: hi\n\ntrailing noise not part of block");
        let req = InputParser::parse(&input).unwrap();
        assert_eq!(req.prompt.as_deref(), Some("hi"));
    }
}
