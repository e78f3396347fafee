//! House style: violation detection and the conservative automatic rewrite
//! applied to every generated draft.

use std::sync::OnceLock;

use regex::Regex;

use prfirm_core::platform::{HashtagPlacement, HashtagRule};
use prfirm_core::state::{Severity, Violation};
use prfirm_core::traits::StyleChecker;

const EM_DASH: char = '\u{2014}';

/// Sentences longer than this many words are reported (soft).
pub const MAX_SENTENCE_WORDS: usize = 30;

struct Rule {
    kind: &'static str,
    severity: Severity,
    pattern: Regex,
}

fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let rule = |kind, severity, pattern: &str| Rule {
            kind,
            severity,
            pattern: Regex::new(pattern).expect("style rule pattern"),
        };
        vec![
            rule("em_dash", Severity::Hard, "\u{2014}"),
            rule(
                "rhetorical_contrast",
                Severity::Hard,
                r"(?i)\bnot\s+(?:just\s+)?[^.?!]{0,80}?\s+but\b",
            ),
            rule(
                "tidy_wrap_up",
                Severity::Soft,
                r"(?i)\b(?:in conclusion|to sum up|in summary)\b",
            ),
            rule("listicle_cliche", Severity::Soft, r"(?i)\b\d+\s+(?:ways|tips|things)\b"),
            rule(
                "weasel_words",
                Severity::Soft,
                r"(?i)\b(?:world-class|cutting-edge|state-of-the-art|leverage|unlock|empower)\b",
            ),
        ]
    })
}

fn contrast_rewrite() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bnot\s+(?:just\s+)?([^.,;!?]{1,80}?)\s+but\s+")
            .expect("contrast rewrite pattern")
    })
}

fn hashtag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#\w+").expect("hashtag pattern"))
}

fn hashtag_with_space() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*#\w+").expect("hashtag pattern"))
}

/// Default [`StyleChecker`]: hard bans gate the revision loop, soft
/// fingerprints are only reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct HouseStyleChecker;

impl HouseStyleChecker {
    pub fn new() -> Self {
        Self
    }
}

impl StyleChecker for HouseStyleChecker {
    fn check(&self, text: &str) -> Vec<Violation> {
        let mut violations = Vec::new();
        for rule in rules() {
            for m in rule.pattern.find_iter(text) {
                violations.push(Violation {
                    kind: rule.kind.to_string(),
                    start: m.start(),
                    end: m.end(),
                    severity: rule.severity,
                });
            }
        }
        violations.extend(long_sentences(text));
        violations
    }
}

fn long_sentences(text: &str) -> Vec<Violation> {
    let mut out = Vec::new();
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        let end = idx + ch.len_utf8();
        let at_end = end == text.len();
        if matches!(ch, '.' | '!' | '?' | '\n') || at_end {
            let sentence = &text[start..end];
            if sentence.split_whitespace().count() > MAX_SENTENCE_WORDS {
                out.push(Violation {
                    kind: "long_sentence".into(),
                    start,
                    end,
                    severity: Severity::Soft,
                });
            }
            start = end;
        }
    }
    out
}

/// Remove the hard-banned constructions without dropping content.
///
/// Em dashes become `"; "`. `not X but Y` and `not just X but Y` become
/// `X and Y`.
pub fn rewrite_with_constraints(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut out = text.replace(EM_DASH, "; ");
    loop {
        let next = contrast_rewrite()
            .replace_all(&out, |caps: &regex::Captures<'_>| {
                format!("{} and ", caps[1].trim())
            })
            .into_owned();
        if next == out {
            return out;
        }
        out = next;
    }
}

/// Apply the platform's hashtag rule.
///
/// `End` moves every tag to a final line, keeping the last `max` when a
/// cap is set. Platforms that allow no tags lose them entirely.
pub fn place_hashtags(text: &str, rule: &HashtagRule) -> String {
    match rule.placement {
        HashtagPlacement::End => {
            let tags: Vec<&str> = hashtag().find_iter(text).map(|m| m.as_str()).collect();
            if tags.is_empty() {
                return text.to_string();
            }
            let keep = if rule.max > 0 {
                tags.len().min(rule.max as usize)
            } else {
                tags.len()
            };
            let body = hashtag_with_space().replace_all(text, "");
            format!("{}\n{}", body.trim(), tags[tags.len() - keep..].join(" "))
        }
        HashtagPlacement::None if rule.max == 0 => {
            hashtag_with_space().replace_all(text, "").trim().to_string()
        }
        _ => text.to_string(),
    }
}

/// Whether any violation in `violations` is hard.
pub fn has_blocking(violations: &[Violation]) -> bool {
    violations.iter().any(|v| v.severity == Severity::Hard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<String> {
        HouseStyleChecker::new()
            .check(text)
            .into_iter()
            .map(|v| v.kind)
            .collect()
    }

    #[test]
    fn test_em_dash_is_hard_violation() {
        let v = HouseStyleChecker::new().check("Fast\u{2014}and simple.");
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].kind, "em_dash");
        assert_eq!(v[0].severity, Severity::Hard);
        assert_eq!((v[0].start, v[0].end), (4, 7));
        assert!(has_blocking(&v));
    }

    #[test]
    fn test_rhetorical_contrast_detected() {
        assert_eq!(kinds("It is not a tool but a teammate."), vec!["rhetorical_contrast"]);
        assert_eq!(
            kinds("Not just faster but smarter."),
            vec!["rhetorical_contrast"]
        );
        assert!(kinds("We did not ship. But we will.").is_empty());
    }

    #[test]
    fn test_soft_fingerprints_do_not_block() {
        let v = HouseStyleChecker::new().check("In summary, 5 ways to leverage AI.");
        let found: Vec<&str> = v.iter().map(|v| v.kind.as_str()).collect();
        assert!(found.contains(&"tidy_wrap_up"));
        assert!(found.contains(&"listicle_cliche"));
        assert!(found.contains(&"weasel_words"));
        assert!(!has_blocking(&v));
    }

    #[test]
    fn test_long_sentence_is_soft() {
        let long = vec!["word"; 31].join(" ") + ".";
        let v = HouseStyleChecker::new().check(&long);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].kind, "long_sentence");
        assert!(!has_blocking(&v));
        assert!(HouseStyleChecker::new().check(&(vec!["word"; 30].join(" ") + ".")).is_empty());
    }

    #[test]
    fn test_clean_copy_has_no_violations() {
        assert!(kinds("Meet the new scheduling assistant. It books meetings for you.").is_empty());
    }

    #[test]
    fn test_rewrite_replaces_em_dash() {
        assert_eq!(rewrite_with_constraints("Fast\u{2014}simple"), "Fast; simple");
    }

    #[test]
    fn test_rewrite_turns_contrast_into_coordination() {
        assert_eq!(
            rewrite_with_constraints("It is not a tool but a teammate."),
            "It is a tool and a teammate."
        );
        assert_eq!(
            rewrite_with_constraints("Not just faster but smarter, not cheaper but better."),
            "faster and smarter, cheaper and better."
        );
    }

    #[test]
    fn test_rewritten_text_passes_hard_rules() {
        let text = "Not just a launch but a shift\u{2014}for everyone.";
        let rewritten = rewrite_with_constraints(text);
        assert!(!has_blocking(&HouseStyleChecker::new().check(&rewritten)));
    }

    #[test]
    fn test_hashtags_moved_to_end_and_capped() {
        let rule = HashtagRule {
            placement: HashtagPlacement::End,
            min: 0,
            max: 2,
        };
        let out = place_hashtags("Big #news today #ai for #teams.", &rule);
        assert_eq!(out, "Big today for.\n#ai #teams");
    }

    #[test]
    fn test_hashtags_stripped_when_platform_allows_none() {
        let out = place_hashtags("Hello #team, welcome.", &HashtagRule::default());
        assert_eq!(out, "Hello, welcome.");
    }

    #[test]
    fn test_inline_hashtags_untouched() {
        let rule = HashtagRule {
            placement: HashtagPlacement::Inline,
            min: 0,
            max: 3,
        };
        assert_eq!(place_hashtags("Ship it #rust", &rule), "Ship it #rust");
    }
}
