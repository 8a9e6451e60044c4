//! Extraction of the url descrambling routine from the base player script.
//!
//! Signed media urls carry an obfuscated `n` query parameter. The platform's own web player
//! rewrites it through a routine shipped inside the base player script before requesting media
//! bytes; urls with the original value are throttled into uselessness. The routine is
//! recognisable by its shape: it turns the input into a scratch array, shuffles it through a
//! table of operations built around `.slice(0,0)` and returns the joined result. The shape is
//! a moving target, the scan below is deliberately isolated and covered by fixture tests so a
//! rolled player script only requires touching this file.

use crate::error::{Error, ErrorContext, Result};
use crate::evaluator::ScriptEvaluator;
use crate::parse::matched_braces;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static FUNCTION_HEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"=\s*function\(\s*(?P<arg>[a-zA-Z_$][\w$]*)\s*\)\s*\{").unwrap());
static SIGNATURE_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"signatureTimestamp["']?\s*[:=]\s*(?P<sts>\d+)"#).unwrap());

/// Scan the base player script for the descrambling function and return it as a
/// self-contained definition renamed to `main`, ready for the evaluator.
pub(crate) fn extract_descramble_function(player_js: &str) -> Result<String> {
    for head in FUNCTION_HEAD.captures_iter(player_js) {
        let whole = head.get(0).expect("regex match");
        let body_start = whole.end() - 1;
        let Some(body) = matched_braces(&player_js[body_start..]) else {
            continue;
        };

        if body.contains(".slice(0,0)") && body.contains(".join(") {
            let arg = &head["arg"];
            return Ok(format!("function main({arg}){body}"));
        }
    }

    Err(Error::Decode(ErrorContext::new(
        "could not locate the descrambling function in the player script",
    )))
}

/// The signature timestamp baked into the player script. Sent along in player requests of
/// personas which work through the watch page.
pub(crate) fn extract_signature_timestamp(player_js: &str) -> Option<u64> {
    SIGNATURE_TIMESTAMP
        .captures(player_js)?
        .name("sts")?
        .as_str()
        .parse()
        .ok()
}

/// Ciphertext to plaintext mapping of descrambled `n` values. One cache lives for one
/// manifest resolution; renditions of one response share their `n` value in practice, so this
/// keeps evaluator invocations at one per distinct ciphertext.
#[derive(Debug, Default)]
pub(crate) struct NCache {
    entries: HashMap<String, String>,
}

impl NCache {
    pub(crate) fn resolve(
        &mut self,
        evaluator: &ScriptEvaluator,
        descramble_fn: &str,
        ciphertext: &str,
    ) -> Result<String> {
        if let Some(plaintext) = self.entries.get(ciphertext) {
            return Ok(plaintext.clone());
        }

        let plaintext = evaluator.run(descramble_fn, ciphertext)?;
        self.entries
            .insert(ciphertext.to_string(), plaintext.clone());
        Ok(plaintext)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
