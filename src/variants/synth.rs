//! Grammar variant synthesis
//!
//! A variant is the `default` baseline with up to five rule bodies replaced.
//! Each [`RuleSite`] names a rule, the canonical rendering its body must have
//! in the baseline, and a generator for the replacement body. Every site is
//! checked on every synthesis, so a baseline that drifted away from what the
//! generators expect fails loudly instead of producing a subtly wrong parser.

use super::baseline::{quoted_identifier, LETTER_PATTERN};
use super::customization::{CustomizationSpec, RESERVED_CONSTANT};
use super::error::{Result, VariantError};
use super::fingerprint::Fingerprint;
use crate::portable::parser_dsl::*;
use crate::portable::{Grammar, ParseError};

/// A patchable rule of the `default` baseline
pub struct RuleSite {
    /// Rule name
    pub rule: &'static str,
    /// Canonical rendering of the unpatched body
    pub canonical: &'static str,
    /// Replacement body; `None` leaves the rule as it is
    pub generate: fn(&CustomizationSpec) -> Option<Dynamic>,
}

/// The five rule sites, in patch order
pub const RULE_SITES: [RuleSite; 5] = [
    RuleSite {
        rule: "identifier_alone",
        canonical: r#"seq(not(@KEYWORDS), choice(label("value", re("[A-Za-z\\p{Ll}\\p{Lu}\\p{Lo}]\\p{M}*")), seq("`", label("id", re("[^`]*")), "`")))"#,
        generate: identifier_site,
    },
    RuleSite {
        rule: "func_id",
        canonical: r#"not("")"#,
        generate: function_site,
    },
    RuleSite {
        rule: "builtin_operators",
        canonical: "@predefined_built_operators",
        generate: builtin_site,
    },
    RuleSite {
        rule: "constant",
        canonical: "@pi",
        generate: constant_site,
    },
    RuleSite {
        rule: "KEYWORDS",
        canonical: "@BUILTIN_KEYWORDS",
        generate: keywords_site,
    },
];

/// Custom patterns first as `const`, then ordinary identifiers that are
/// neither keywords nor custom patterns
fn identifier_site(spec: &CustomizationSpec) -> Option<Dynamic> {
    if spec.identifier_patterns.is_empty() {
        return None;
    }
    let custom = || spec.identifier_patterns.iter().map(|p| dynamic(re(p.as_str())));

    let reserved = choice(std::iter::once(dynamic(ref_("KEYWORDS"))).chain(custom()));
    let ordinary = choice(vec![
        dynamic(reserved.not_ahead().then(re(LETTER_PATTERN).label("value"))),
        dynamic(quoted_identifier()),
    ]);
    Some(dynamic(choice(vec![
        dynamic(choice(custom()).label("const")),
        dynamic(ordinary),
    ])))
}

fn function_site(spec: &CustomizationSpec) -> Option<Dynamic> {
    if spec.function_names.is_empty() {
        return None;
    }
    Some(dynamic(choice(
        spec.function_names.iter().map(|name| re(name.as_str())),
    )))
}

fn builtin_site(spec: &CustomizationSpec) -> Option<Dynamic> {
    if spec.builtin_package_symbols.is_empty() {
        return None;
    }
    Some(dynamic(choice(
        spec.builtin_package_symbols
            .iter()
            .map(|symbol| ref_(symbol.as_str()))
            .chain(std::iter::once(ref_("predefined_built_operators"))),
    )))
}

fn constant_site(spec: &CustomizationSpec) -> Option<Dynamic> {
    spec.constant_enabled
        .then(|| dynamic(ref_("pi").or(ref_(RESERVED_CONSTANT))))
}

fn keywords_site(spec: &CustomizationSpec) -> Option<Dynamic> {
    spec.constant_enabled
        .then(|| dynamic(ref_("BUILTIN_KEYWORDS").or(ref_(RESERVED_CONSTANT))))
}

/// Name carried by a synthesized grammar
pub fn variant_name(fingerprint: &Fingerprint) -> String {
    format!("grammar{}", fingerprint)
}

/// Check every rule site against a baseline grammar
pub fn verify_sites(key: &str, baseline: &Grammar) -> Result<()> {
    for site in &RULE_SITES {
        let Some(body) = baseline.render_rule(site.rule) else {
            return Err(VariantError::SchemaDrift {
                key: key.to_string(),
                site: site.rule,
                reason: "is missing from the baseline".to_string(),
            });
        };
        if body != site.canonical {
            return Err(VariantError::SchemaDrift {
                key: key.to_string(),
                site: site.rule,
                reason: format!("has body `{}`, expected `{}`", body, site.canonical),
            });
        }
    }
    Ok(())
}

/// Synthesize the source text of a variant
///
/// `baseline_source` is the emitted `default` template. The result is
/// byte-identical for equal inputs.
pub fn synthesize(key: &str, baseline_source: &str, spec: &CustomizationSpec) -> Result<String> {
    let compile_error = |source: ParseError| VariantError::Compile {
        key: key.to_string(),
        source,
    };

    let baseline = Grammar::from_source(baseline_source).map_err(compile_error)?;
    verify_sites(key, &baseline)?;

    for symbol in &spec.builtin_package_symbols {
        if baseline.rule(symbol).is_none() {
            return Err(VariantError::UnknownPackageSymbol {
                key: key.to_string(),
                symbol: symbol.clone(),
            });
        }
    }
    if spec.constant_enabled && baseline.rule(RESERVED_CONSTANT).is_none() {
        return Err(VariantError::SchemaDrift {
            key: key.to_string(),
            site: "constant",
            reason: format!("needs a `{}` rule in the baseline", RESERVED_CONSTANT),
        });
    }

    let mut builder = GrammarBuilder::from_grammar(baseline);
    for site in &RULE_SITES {
        if let Some(body) = (site.generate)(spec) {
            builder.replace_rule(site.rule, body);
        }
    }

    let grammar = builder
        .named(variant_name(&Fingerprint::of(key)))
        .try_build()
        .map_err(compile_error)?;
    log_debug!(
        "synthesized variant {} ({} atoms)",
        Fingerprint::of(key).short(),
        grammar.atom_count()
    );
    grammar.to_source().map_err(|e| {
        compile_error(ParseError::InvalidGrammar {
            reason: format!("cannot emit grammar source: {}", e),
        })
    })
}
