//! Sandboxed evaluation of small script snippets lifted out of the base player script.

use crate::error::{Error, ErrorContext, Result};
use boa_engine::{Context, Source};

/// Evaluates a single self-contained function definition named `main` whose body performs only
/// array and string manipulation. Every run gets a fresh engine context, so evaluations cannot
/// observe each other and the snippet has no access to anything but the language itself.
///
/// A loop iteration budget bounds hostile or broken snippets; exceeding it surfaces as
/// [`Error::ScriptTimeout`].
#[derive(Clone, Debug)]
pub struct ScriptEvaluator {
    instruction_budget: u64,
}

impl Default for ScriptEvaluator {
    fn default() -> Self {
        Self {
            instruction_budget: 100_000,
        }
    }
}

impl ScriptEvaluator {
    pub fn new(instruction_budget: u64) -> Self {
        Self { instruction_budget }
    }

    /// Evaluate `source` (which must define a function `main`) applied to `arg` and return the
    /// result coerced to a string.
    pub fn run(&self, source: &str, arg: &str) -> Result<String> {
        let mut context = Context::default();
        context
            .runtime_limits_mut()
            .set_loop_iteration_limit(self.instruction_budget);
        context.runtime_limits_mut().set_recursion_limit(256);

        // The argument is emitted as a json string literal, which is also a valid js string
        // literal for the character set involved here.
        let argument = serde_json::to_string(arg)?;
        let script = format!("{source}\nmain({argument})");

        let value = context
            .eval(Source::from_bytes(script.as_bytes()))
            .map_err(|e| classify_eval_error(e.to_string()))?;
        let result = value
            .to_string(&mut context)
            .map_err(|e| classify_eval_error(e.to_string()))?;

        Ok(result.to_std_string_escaped())
    }
}

fn classify_eval_error(message: String) -> Error {
    if message.contains("limit") {
        Error::ScriptTimeout(ErrorContext::new(format!(
            "script exceeded its instruction budget: {message}"
        )))
    } else {
        Error::Decode(ErrorContext::new(format!(
            "script evaluation failed: {message}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_string_manipulation() {
        let evaluator = ScriptEvaluator::default();
        let source = r#"function main(a){var b=a.split("");b.reverse();return b.join("")}"#;
        assert_eq!(evaluator.run(source, "abc123").unwrap(), "321cba");
    }

    #[test]
    fn evaluates_character_code_arithmetic() {
        let evaluator = ScriptEvaluator::default();
        let source = r#"function main(a){
            var b=a.split("");
            for(var i=0;i<b.length;i++){b[i]=String.fromCharCode(b[i].charCodeAt(0)+1)}
            return b.join("")
        }"#;
        assert_eq!(evaluator.run(source, "abc").unwrap(), "bcd");
    }

    #[test]
    fn evaluation_is_deterministic() {
        let evaluator = ScriptEvaluator::default();
        let source = r#"function main(a){var b=a.split("");b.splice(0,1);b.push(b[0]);return b.join("")}"#;
        let first = evaluator.run(source, "scrambled").unwrap();
        let second = evaluator.run(source, "scrambled").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn runaway_loops_hit_the_budget() {
        let evaluator = ScriptEvaluator::new(1_000);
        let source = r#"function main(a){var i=0;while(true){i++}return a}"#;
        match evaluator.run(source, "x") {
            Err(Error::ScriptTimeout(_)) => {}
            other => panic!("expected a script timeout, got {other:?}"),
        }
    }

    #[test]
    fn broken_snippets_fail_with_decode() {
        let evaluator = ScriptEvaluator::default();
        match evaluator.run("function main(a){ return missing(a) }", "x") {
            Err(Error::Decode(_)) => {}
            other => panic!("expected a decode error, got {other:?}"),
        }
    }
}
