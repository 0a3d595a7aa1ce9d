//! Prompt template for unit-test generation
//!
//! The template asks for a single `unittest.TestCase` subclass named
//! [`TEST_CLASS_NAME`] with exactly three documented test methods, shows one
//! worked example, and ends with [`END_OF_PROMPT_MARKER`]. Text-generation
//! pipelines that echo the prompt are cut back at that marker by the
//! sanitizer.

/// Last line of every prompt; everything the model writes follows it.
pub const END_OF_PROMPT_MARKER: &str = "YOUR GENERATION:";

/// Class the executor looks up after running the generated code.
pub const TEST_CLASS_NAME: &str = "GeneratedTests";

/// Worked example embedded in the prompt.
///
/// Already column-0, fence-free and importing `unittest`, so it passes
/// through the sanitizer unchanged.
pub const EXAMPLE_TESTS: &str = r#"import unittest
class GeneratedTests(unittest.TestCase):
    def test_normal_case(self):
        """Test addition with positive numbers"""
        self.assertEqual(add(2, 3), 5)

    def test_negative_numbers(self):
        """Test addition with negative values"""
        self.assertEqual(add(-1, -1), -2)

    def test_mixed_types(self):
        """Test type handling"""
        with self.assertRaises(TypeError):
            add("2", 3)
"#;

/// Builder for the test-generation prompt.
///
/// # Example
/// ```
/// use harness::prompt::{TestPrompt, END_OF_PROMPT_MARKER};
///
/// let prompt = TestPrompt::build("def add(a, b):\n    return a + b");
/// assert!(prompt.contains("def add(a, b):"));
/// assert!(prompt.trim_end().ends_with(END_OF_PROMPT_MARKER));
/// ```
pub struct TestPrompt;

impl TestPrompt {
    pub fn build(code: &str) -> String {
        format!(
            "Generate PROPERLY FORMATTED Python unit tests for:\n\
             {code}\n\
             \n\
             STRICT RULES:\n\
             1. Class name: {class}(unittest.TestCase)\n\
             2. Exactly 3 test methods with docstrings\n\
             3. Perfect indentation and syntax\n\
             4. No markdown, only code\n\
             5. Complete import statements\n\
             \n\
             EXAMPLE:\n\
             {example}\n\
             {marker}\n",
            code = code,
            class = TEST_CLASS_NAME,
            example = EXAMPLE_TESTS,
            marker = END_OF_PROMPT_MARKER,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_code_and_rules() {
        let prompt = TestPrompt::build("def mul(a, b):\n    return a * b");

        assert!(prompt.starts_with("Generate PROPERLY FORMATTED Python unit tests for:\n"));
        assert!(prompt.contains("def mul(a, b):\n    return a * b\n"));
        assert!(prompt.contains("1. Class name: GeneratedTests(unittest.TestCase)"));
        assert!(prompt.contains("2. Exactly 3 test methods with docstrings"));
        assert!(prompt.contains("4. No markdown, only code"));
        assert!(prompt.contains("5. Complete import statements"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let code = "def add(a, b): return a + b";
        assert_eq!(TestPrompt::build(code), TestPrompt::build(code));
    }

    #[test]
    fn test_prompt_contains_example_before_marker() {
        let prompt = TestPrompt::build("x = 1");
        let example_at = prompt.find("EXAMPLE:\nimport unittest").unwrap();
        let marker_at = prompt.rfind(END_OF_PROMPT_MARKER).unwrap();

        assert!(example_at < marker_at);
        assert!(prompt.contains("            add(\"2\", 3)\n"));
        assert_eq!(prompt.matches(END_OF_PROMPT_MARKER).count(), 1);
        assert!(prompt.ends_with("YOUR GENERATION:\n"));
    }
}
