//! Parsing and validation of generated question JSON
//!
//! Accepts `{"sections": [{"section_name", "questions": [...]}]}` or a flat
//! `{"questions": [...]}` where each question names its own section. Markdown code fences
//! around the JSON are tolerated, as are option labels such as "A) " and correct answers given
//! as a letter, a 0-based index, or the option text itself.

use crate::model::{Difficulty, Question};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// One reason generated output was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    Unparseable(String),
    NoQuestions,
    CountOutOfTolerance {
        expected: u32,
        actual: usize,
        tolerance: u32,
    },
    MissingText { index: usize },
    WrongOptionCount { index: usize, found: usize },
    EmptyOption { index: usize },
    BadCorrectAnswer { index: usize, value: String },
    BadDifficulty { index: usize, value: String },
    MissingSection { index: usize },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Question numbers are reported 1-based
        match self {
            ValidationIssue::Unparseable(e) => write!(f, "response is not valid JSON: {}", e),
            ValidationIssue::NoQuestions => write!(f, "response contains no questions"),
            ValidationIssue::CountOutOfTolerance {
                expected,
                actual,
                tolerance,
            } => write!(
                f,
                "expected {} questions (+/-{}), got {}",
                expected, tolerance, actual
            ),
            ValidationIssue::MissingText { index } => {
                write!(f, "question {} has no question_text", index + 1)
            }
            ValidationIssue::WrongOptionCount { index, found } => write!(
                f,
                "question {} has {} options, exactly 4 are required",
                index + 1,
                found
            ),
            ValidationIssue::EmptyOption { index } => {
                write!(f, "question {} has an empty option", index + 1)
            }
            ValidationIssue::BadCorrectAnswer { index, value } => write!(
                f,
                "question {} has invalid correct_answer '{}' (use A, B, C or D)",
                index + 1,
                value
            ),
            ValidationIssue::BadDifficulty { index, value } => write!(
                f,
                "question {} has invalid difficulty '{}' (use easy, medium or hard)",
                index + 1,
                value
            ),
            ValidationIssue::MissingSection { index } => {
                write!(f, "question {} has no section", index + 1)
            }
        }
    }
}

/// Join issues into one line for error messages
pub fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Deserialize)]
struct WireTest {
    #[serde(default)]
    sections: Vec<WireSection>,
    #[serde(default)]
    questions: Vec<WireQuestion>,
}

#[derive(Debug, Deserialize)]
struct WireSection {
    #[serde(default, alias = "name")]
    section_name: Option<String>,
    #[serde(default)]
    questions: Vec<WireQuestion>,
}

#[derive(Debug, Deserialize)]
struct WireQuestion {
    #[serde(default, alias = "question", alias = "text")]
    question_text: Option<String>,
    #[serde(default)]
    options: Option<Vec<Value>>,
    #[serde(default, alias = "answer", alias = "correct_option")]
    correct_answer: Option<Value>,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    topic: Option<String>,
}

/// Remove a surrounding markdown code fence, if any
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Strip a leading "A) ", "(b) " or "C. " label from an option
pub fn strip_option_label(option: &str) -> &str {
    let trimmed = option.trim();
    let mut chars = trimmed.char_indices();
    let rest = match (chars.next(), chars.next(), chars.next()) {
        (Some((_, '(')), Some((_, l)), Some((i, ')'))) if is_label(l) => &trimmed[i + 1..],
        (Some((_, l)), Some((i, sep)), _) if is_label(l) && matches!(sep, ')' | '.' | ':') => {
            &trimmed[i + 1..]
        }
        _ => return trimmed,
    };
    // Only a label when followed by whitespace, so "A.I. tools" stays intact
    if rest.starts_with(char::is_whitespace) {
        rest.trim_start()
    } else {
        trimmed
    }
}

fn is_label(c: char) -> bool {
    matches!(c.to_ascii_uppercase(), 'A'..='D')
}

fn option_text(value: &Value) -> String {
    match value {
        Value::String(s) => strip_option_label(s).to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Resolve a wire correct answer to a 0-based option index.
///
/// Option text wins over the letter and index forms, so an answer of "2" among the options
/// "1".."4" selects the option reading "2".
fn parse_correct_answer(value: &Value, options: &[String]) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as usize).filter(|&n| n < 4),
        Value::String(s) => {
            let s = s.trim();
            let text = strip_option_label(s);
            if let Some(position) = options.iter().position(|o| o.eq_ignore_ascii_case(text)) {
                return Some(position);
            }

            let upper = s.to_ascii_uppercase();
            let letter = upper
                .strip_prefix("OPTION ")
                .unwrap_or(&upper)
                .trim_start_matches('(')
                .trim_end_matches([')', '.', ':']);
            let mut chars = letter.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if is_label(c) => Some((c as u8 - b'A') as usize),
                (Some(c), None) => c.to_digit(10).filter(|&d| d < 4).map(|d| d as usize),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Allowed deviation from `expected`: `ratio` of it, at least one question
pub fn count_tolerance(expected: u32, ratio: f64) -> u32 {
    let raw = (expected as f64 * ratio + 1e-9).floor() as u32;
    raw.max(1)
}

pub fn within_tolerance(expected: u32, actual: usize, ratio: f64) -> bool {
    let tolerance = count_tolerance(expected, ratio) as i64;
    (actual as i64 - expected as i64).abs() <= tolerance
}

/// Parse raw model output and validate every question plus the overall count
pub fn parse_questions(
    raw: &str,
    expected: u32,
    tolerance_ratio: f64,
) -> Result<Vec<Question>, Vec<ValidationIssue>> {
    let body = strip_code_fences(raw);
    let wire: WireTest = serde_json::from_str(body)
        .or_else(|first_err| {
            // Fall back to the outermost braces when the model wrapped the JSON in prose
            match (body.find('{'), body.rfind('}')) {
                (Some(start), Some(end)) if start < end => {
                    serde_json::from_str(&body[start..=end]).map_err(|_| first_err)
                }
                _ => Err(first_err),
            }
        })
        .map_err(|e| vec![ValidationIssue::Unparseable(e.to_string())])?;

    let mut flattened: Vec<(Option<String>, WireQuestion)> = Vec::new();
    for section in wire.sections {
        for question in section.questions {
            flattened.push((section.section_name.clone(), question));
        }
    }
    for question in wire.questions {
        flattened.push((None, question));
    }

    if flattened.is_empty() {
        return Err(vec![ValidationIssue::NoQuestions]);
    }

    let mut issues = Vec::new();
    let mut questions = Vec::with_capacity(flattened.len());
    for (index, (section_name, wire_q)) in flattened.into_iter().enumerate() {
        match validate_question(index, section_name, wire_q) {
            Ok(q) => questions.push(q),
            Err(mut errs) => issues.append(&mut errs),
        }
    }

    let actual = questions.len() + issues_question_count(&issues);
    if !within_tolerance(expected, actual, tolerance_ratio) {
        issues.push(ValidationIssue::CountOutOfTolerance {
            expected,
            actual,
            tolerance: count_tolerance(expected, tolerance_ratio),
        });
    }

    if issues.is_empty() {
        Ok(questions)
    } else {
        Err(issues)
    }
}

/// Number of distinct questions that produced issues
fn issues_question_count(issues: &[ValidationIssue]) -> usize {
    let mut seen: Vec<usize> = issues
        .iter()
        .filter_map(|issue| match issue {
            ValidationIssue::MissingText { index }
            | ValidationIssue::WrongOptionCount { index, .. }
            | ValidationIssue::EmptyOption { index }
            | ValidationIssue::BadCorrectAnswer { index, .. }
            | ValidationIssue::BadDifficulty { index, .. }
            | ValidationIssue::MissingSection { index } => Some(*index),
            _ => None,
        })
        .collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

fn validate_question(
    index: usize,
    section_name: Option<String>,
    wire: WireQuestion,
) -> Result<Question, Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    let text = wire
        .question_text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if text.is_none() {
        issues.push(ValidationIssue::MissingText { index });
    }

    let options: Vec<String> = wire
        .options
        .unwrap_or_default()
        .iter()
        .map(option_text)
        .collect();
    if options.len() != 4 {
        issues.push(ValidationIssue::WrongOptionCount {
            index,
            found: options.len(),
        });
    } else if options.iter().any(|o| o.is_empty()) {
        issues.push(ValidationIssue::EmptyOption { index });
    }

    let correct = wire
        .correct_answer
        .as_ref()
        .and_then(|v| parse_correct_answer(v, &options));
    if correct.is_none() {
        let value = wire
            .correct_answer
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "missing".to_string());
        issues.push(ValidationIssue::BadCorrectAnswer { index, value });
    }

    let difficulty_raw = wire.difficulty.unwrap_or_default();
    let difficulty = Difficulty::parse(&difficulty_raw);
    if difficulty.is_none() {
        issues.push(ValidationIssue::BadDifficulty {
            index,
            value: difficulty_raw,
        });
    }

    let section = wire
        .section
        .or(section_name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if section.is_none() {
        issues.push(ValidationIssue::MissingSection { index });
    }

    match (text, <[String; 4]>::try_from(options), correct, difficulty, section) {
        (Some(text), Ok(options), Some(correct_option), Some(difficulty), Some(section))
            if issues.is_empty() =>
        {
            Ok(Question {
                text,
                options,
                correct_option,
                explanation: wire
                    .explanation
                    .map(|e| e.trim().to_string())
                    .filter(|e| !e.is_empty()),
                difficulty,
                section,
                topic: wire
                    .topic
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty()),
            })
        }
        _ => Err(issues),
    }
}
