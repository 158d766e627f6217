//! Lexical scan for declared type symbols
//!
//! Finds `class`, `interface`, `trait` and `enum` declarations and qualifies
//! them with the namespace in effect at that point of the file. This is a
//! token scan, not a parse: anonymous `new class` expressions and `X::class`
//! references are skipped, everything else that looks like a declaration is
//! reported.

use regex::Regex;
use std::sync::OnceLock;

fn declaration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(namespace|class|interface|trait|enum)\s+(\\?[A-Za-z_][A-Za-z0-9_]*(?:\\[A-Za-z_][A-Za-z0-9_]*)*)")
            .expect("declaration pattern is valid")
    })
}

/// Fully qualified symbols declared in `source`, in order of appearance
pub fn scan(source: &str) -> Vec<String> {
    let mut namespace = String::new();
    let mut symbols = Vec::new();

    for captures in declaration_pattern().captures_iter(source) {
        let (Some(whole), Some(keyword), Some(name)) =
            (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };

        let name = name.as_str().trim_start_matches('\\');
        if keyword.as_str() == "namespace" {
            namespace = name.to_string();
            continue;
        }

        let before = source[..whole.start()].trim_end();
        if before.ends_with("::") || ends_with_word(before, "new") {
            continue;
        }

        if namespace.is_empty() {
            symbols.push(name.to_string());
        } else {
            symbols.push(format!("{}\\{}", namespace, name));
        }
    }

    symbols
}

fn ends_with_word(text: &str, word: &str) -> bool {
    text.strip_suffix(word).is_some_and(|rest| {
        !rest
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_namespaced_declarations() {
        let source = r#"
            namespace Vendor\Tool;

            interface Runner {}
            final class Engine implements Runner {}
            trait Logs {}
            enum Mode: string { case Fast = 'fast'; }
        "#;
        assert_eq!(
            scan(source),
            vec![
                "Vendor\\Tool\\Runner",
                "Vendor\\Tool\\Engine",
                "Vendor\\Tool\\Logs",
                "Vendor\\Tool\\Mode",
            ]
        );
    }

    #[test]
    fn test_global_namespace() {
        assert_eq!(scan("class Plain {}"), vec!["Plain"]);
    }

    #[test]
    fn test_skips_anonymous_and_qualified_references() {
        let source = r#"
            namespace App;
            class Factory {
                public function make() {
                    $name = Factory::class;
                    return new class extends Base {};
                }
            }
        "#;
        assert_eq!(scan(source), vec!["App\\Factory"]);
    }

    #[test]
    fn test_namespace_switches() {
        let source = "namespace A; class One {} namespace B; class Two {}";
        assert_eq!(scan(source), vec!["A\\One", "B\\Two"]);
    }

    #[test]
    fn test_renew_is_not_new() {
        assert_eq!(scan("renew class Thing {}"), vec!["Thing"]);
    }
}
