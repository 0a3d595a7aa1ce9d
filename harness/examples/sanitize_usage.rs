//! Example walking raw model output through every sanitize rule
//!
//! Run with: cargo run --package harness --example sanitize_usage

use harness::prompt::TestPrompt;
use harness::sanitize::{clean_code, SanitizeRule};
use harness::syntax::check_syntax;

const RAW: &str = "YOUR GENERATION:
```python
    class GeneratedTests(unittest.TestCase):
        def test_greeting(self):
            \"\"\"Test greeting text\"\"\"
            self.assertEqual(greet(\u{201C}Ada\u{201D}), \u{201C}Hello, Ada\u{201D})
```
";

fn main() {
    println!("=== Sanitizer Demo ===\n");

    let prompt = TestPrompt::build("def greet(name):\n    return f\"Hello, {name}\"");

    println!("RAW MODEL OUTPUT:");
    println!("{}", "=".repeat(60));
    println!("{}\n", RAW);

    let mut text = RAW.to_string();
    for rule in SanitizeRule::ORDERED {
        let next = rule.apply(&text, &prompt);
        let marker = if next == text { "unchanged" } else { "changed" };
        println!("{:<22} {}", format!("{:?}", rule), marker);
        text = next;
    }

    assert_eq!(text, clean_code(RAW, &prompt));

    println!("\nCLEANED CODE:");
    println!("{}", "=".repeat(60));
    println!("{}\n", text);

    match check_syntax(&text) {
        Ok(()) => println!("Syntax check: OK"),
        Err(issue) => println!("Syntax check failed: {}", issue),
    }
}
