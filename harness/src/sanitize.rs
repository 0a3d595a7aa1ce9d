//! Normalization of raw model output into candidate Python source.
//!
//! Cleanup is an ordered list of [`SanitizeRule`]s. Each rule is a pure
//! `&str -> String` pass that never fails, so a rule can be exercised on its
//! own and the full pipeline is just a fold over [`SanitizeRule::ORDERED`].

use crate::prompt::END_OF_PROMPT_MARKER;
use crate::syntax::is_valid_python;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static LANGUAGE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^```(?:python3?|py)[ \t]*(?:\r?\n)?").expect("invalid language fence regex")
});

static LEADING_BARE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A\s*```[ \t]*\r?\n").expect("invalid bare fence regex"));

static TRAILING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n```[ \t]*\s*\z").expect("invalid closing fence regex"));

const UNITTEST_IMPORT: &str = "import unittest";

const INDENT_LEVEL: &str = "    ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeRule {
    /// Drop an echoed prompt and everything up to the last end-of-prompt marker.
    StripPromptEcho,
    /// Remove ```` ```python ```` / ```` ```py ```` fence lines, and a bare
    /// opening fence at the very start.
    StripOpeningFence,
    /// Remove a closing ```` ``` ```` fence at the end of the text.
    StripClosingFence,
    /// Replace typographic quotes with ASCII quotes.
    NormalizeQuotes,
    /// Remove the indentation shared by every non-blank line. If the result
    /// does not parse but dropping one four-space level from every line
    /// does, use that instead.
    Dedent,
    /// Prepend `import unittest` when the text never imports it.
    EnsureUnittestImport,
    /// Trim surrounding whitespace.
    Trim,
}

impl SanitizeRule {
    pub const ORDERED: [SanitizeRule; 7] = [
        SanitizeRule::StripPromptEcho,
        SanitizeRule::StripOpeningFence,
        SanitizeRule::StripClosingFence,
        SanitizeRule::NormalizeQuotes,
        SanitizeRule::Dedent,
        SanitizeRule::EnsureUnittestImport,
        SanitizeRule::Trim,
    ];

    pub fn apply(self, text: &str, prompt: &str) -> String {
        match self {
            SanitizeRule::StripPromptEcho => strip_prompt_echo(text, prompt),
            SanitizeRule::StripOpeningFence => {
                let text = LEADING_BARE_FENCE.replace(text, "");
                LANGUAGE_FENCE.replace_all(&text, "").into_owned()
            }
            SanitizeRule::StripClosingFence => TRAILING_FENCE.replace(text, "").into_owned(),
            SanitizeRule::NormalizeQuotes => normalize_quotes(text),
            SanitizeRule::Dedent => dedent(text),
            SanitizeRule::EnsureUnittestImport => {
                if text.contains(UNITTEST_IMPORT) {
                    text.to_string()
                } else {
                    format!("{}\n\n{}", UNITTEST_IMPORT, text)
                }
            }
            SanitizeRule::Trim => text.trim().to_string(),
        }
    }
}

/// Runs every rule in order. Always returns text containing `import unittest`,
/// whether or not it is valid Python.
pub fn clean_code(generated: &str, prompt: &str) -> String {
    SanitizeRule::ORDERED
        .iter()
        .fold(generated.to_string(), |code, rule| {
            let next = rule.apply(&code, prompt);
            if next != code {
                debug!("Sanitize rule {:?} changed the output", rule);
            }
            next
        })
}

fn strip_prompt_echo(text: &str, prompt: &str) -> String {
    let text = text.strip_prefix(prompt).unwrap_or(text);
    text.rsplit(END_OF_PROMPT_MARKER)
        .next()
        .unwrap_or(text)
        .to_string()
}

fn normalize_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect()
}

fn leading_whitespace(line: &str) -> &str {
    let end = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..end]
}

fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let len = a
        .char_indices()
        .zip(b.chars())
        .take_while(|((_, x), y)| x == y)
        .last()
        .map(|((i, c), _)| i + c.len_utf8())
        .unwrap_or(0);
    &a[..len]
}

fn dedent_margin(text: &str) -> String {
    let margin = text
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .map(leading_whitespace)
        .reduce(common_prefix)
        .unwrap_or("");

    if margin.is_empty() {
        return text.to_string();
    }

    text.split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                line.strip_prefix(margin).unwrap_or(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_indent_level(text: &str) -> String {
    text.split('\n')
        .map(|line| line.strip_prefix(INDENT_LEVEL).unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Shared-margin dedent, falling back to dropping one indentation level from
/// every line when only that makes the text parse.
fn dedent(text: &str) -> String {
    let dedented = dedent_margin(text);
    if is_valid_python(&dedented) {
        return dedented;
    }

    let stripped = strip_indent_level(text);
    if stripped != dedented && is_valid_python(&stripped) {
        debug!("Dropped one indentation level from every line");
        stripped
    } else {
        dedented
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{TestPrompt, EXAMPLE_TESTS};

    fn apply(rule: SanitizeRule, text: &str) -> String {
        rule.apply(text, "")
    }

    #[test]
    fn test_strip_prompt_echo_keeps_suffix_after_last_marker() {
        let text = "rules\nYOUR GENERATION:\nfirst\nYOUR GENERATION:\nimport unittest";
        assert_eq!(
            apply(SanitizeRule::StripPromptEcho, text),
            "\nimport unittest"
        );
        assert_eq!(apply(SanitizeRule::StripPromptEcho, "no marker"), "no marker");
    }

    #[test]
    fn test_strip_prompt_echo_removes_verbatim_prompt() {
        let prompt = TestPrompt::build("def add(a, b): return a + b");
        let raw = format!("{}x = 1", prompt);
        assert_eq!(SanitizeRule::StripPromptEcho.apply(&raw, &prompt), "x = 1");
    }

    #[test]
    fn test_strip_opening_fence() {
        assert_eq!(
            apply(SanitizeRule::StripOpeningFence, "\n```python\nimport unittest\n"),
            "\nimport unittest\n"
        );
        assert_eq!(
            apply(SanitizeRule::StripOpeningFence, "```py\nx = 1"),
            "x = 1"
        );
        assert_eq!(apply(SanitizeRule::StripOpeningFence, "```\nx = 1"), "x = 1");
        assert_eq!(
            apply(SanitizeRule::StripOpeningFence, "x = '```python'"),
            "x = '```python'"
        );
    }

    #[test]
    fn test_strip_closing_fence() {
        assert_eq!(apply(SanitizeRule::StripClosingFence, "x = 1\n```"), "x = 1");
        assert_eq!(
            apply(SanitizeRule::StripClosingFence, "x = 1\n```\n\n"),
            "x = 1"
        );
        assert_eq!(
            apply(SanitizeRule::StripClosingFence, "x = 1\n```\nmore"),
            "x = 1\n```\nmore"
        );
    }

    #[test]
    fn test_normalize_quotes() {
        assert_eq!(
            apply(SanitizeRule::NormalizeQuotes, "s = \u{201C}hi\u{201D}"),
            "s = \"hi\""
        );
        assert_eq!(
            apply(SanitizeRule::NormalizeQuotes, "c = \u{2018}a\u{2019}"),
            "c = 'a'"
        );
    }

    #[test]
    fn test_dedent_removes_shared_margin_only() {
        let over_indented = "    class T:\n        def f(self):\n            pass\n";
        assert_eq!(
            apply(SanitizeRule::Dedent, over_indented),
            "class T:\n    def f(self):\n        pass\n"
        );

        let nested = "class T:\n    def f(self):\n        if True:\n            pass";
        assert_eq!(apply(SanitizeRule::Dedent, nested), nested);
    }

    #[test]
    fn test_dedent_ignores_blank_lines() {
        let text = "    a = 1\n\n  \n    b = 2";
        assert_eq!(apply(SanitizeRule::Dedent, text), "a = 1\n\n\nb = 2");
    }

    #[test]
    fn test_dedent_with_tabs() {
        assert_eq!(apply(SanitizeRule::Dedent, "\tx = 1\n\ty = 2"), "x = 1\ny = 2");
        assert_eq!(
            apply(SanitizeRule::Dedent, "\tx = 1\n    y = 2"),
            "\tx = 1\n    y = 2"
        );
    }

    #[test]
    fn test_dedent_drops_one_level_when_only_the_body_is_over_indented() {
        let text = "import unittest\n    class GeneratedTests(unittest.TestCase):\n        def test_a(self):\n            self.assertTrue(True)\n";
        assert_eq!(
            apply(SanitizeRule::Dedent, text),
            "import unittest\nclass GeneratedTests(unittest.TestCase):\n    def test_a(self):\n        self.assertTrue(True)\n"
        );
    }

    #[test]
    fn test_dedent_keeps_margin_result_when_nothing_parses() {
        let text = "  x = (1 +\n  y = 2";
        assert_eq!(apply(SanitizeRule::Dedent, text), "x = (1 +\ny = 2");
    }

    #[test]
    fn test_ensure_import() {
        assert_eq!(
            apply(SanitizeRule::EnsureUnittestImport, "class A: pass"),
            "import unittest\n\nclass A: pass"
        );
        assert_eq!(
            apply(SanitizeRule::EnsureUnittestImport, "import unittest\nx = 1"),
            "import unittest\nx = 1"
        );
    }

    #[test]
    fn test_clean_code_always_imports_unittest() {
        for raw in [
            "",
            "   ",
            "YOUR GENERATION:",
            "```python\n```",
            "garbage ) ( text",
            "\u{201C}",
        ] {
            let cleaned = clean_code(raw, "prompt");
            assert!(cleaned.contains("import unittest"), "for {:?}", raw);
        }
    }

    #[test]
    fn test_clean_code_leaves_example_unchanged() {
        let prompt = TestPrompt::build("def add(a, b): return a + b");
        let raw = format!("{}{}", prompt, EXAMPLE_TESTS);
        assert_eq!(clean_code(&raw, &prompt), EXAMPLE_TESTS.trim());
        assert_eq!(clean_code(EXAMPLE_TESTS, &prompt), EXAMPLE_TESTS.trim());
    }

    #[test]
    fn test_clean_code_repairs_over_indented_class_after_import() {
        let raw = "YOUR GENERATION:\nimport unittest\n    class GeneratedTests(unittest.TestCase):\n        def test_a(self):\n            self.assertEqual(add(1, 2), 3)\n";
        let cleaned = clean_code(raw, "");
        assert_eq!(
            cleaned,
            "import unittest\nclass GeneratedTests(unittest.TestCase):\n    def test_a(self):\n        self.assertEqual(add(1, 2), 3)"
        );
        assert!(crate::syntax::check_syntax(&cleaned).is_ok());
    }

    #[test]
    fn test_clean_code_fenced_and_over_indented() {
        let raw = "YOUR GENERATION:\n```python\n    class GeneratedTests(unittest.TestCase):\n        def test_a(self):\n            self.assertEqual(\u{201C}a\u{201D}, \"a\")\n```\n";
        assert_eq!(
            clean_code(raw, ""),
            "import unittest\n\n\nclass GeneratedTests(unittest.TestCase):\n    def test_a(self):\n        self.assertEqual(\"a\", \"a\")"
        );
    }
}
