//! Baseline grammars and their on-disk templates
//!
//! Two grammars are built in: `init` (a `where` block of typed definitions)
//! and `default` (the expression grammar every user variant is synthesized
//! from). Their emitted source lives in a template directory using the same
//! file naming as the artifact store; the timestamp in a template's file
//! name is what the bootstrap reconciler compares against.

use super::error::{Result, VariantError};
use super::fingerprint::Baseline;
use super::store::{Artifact, ArtifactStore};
use crate::portable::parser_dsl::*;
use crate::portable::{Grammar, GrammarCompiler};
use std::path::Path;
use time::PrimitiveDateTime;

/// A single Unicode letter followed by combining marks
pub const LETTER_PATTERN: &str = r"[A-Za-z\p{Ll}\p{Lu}\p{Lo}]\p{M}*";

/// Body of a backtick-quoted identifier
pub const QUOTED_PATTERN: &str = "[^`]*";

/// Builtin package symbols with a sub-rule in the `default` grammar
pub const PACKAGE_SYMBOLS: [&str; 6] = ["sin", "cos", "tan", "atan2", "trace", "det"];

/// Built-in grammar description for a baseline
pub fn grammar(which: Baseline) -> Grammar {
    match which {
        Baseline::Init => init_grammar(),
        Baseline::Default => default_grammar(),
    }
}

/// Name given to a baseline's emitted grammar
pub fn grammar_name(which: Baseline) -> String {
    format!("grammar{}", which.key())
}

fn ws() -> Wrapped<Leaf> {
    re("[ \\t]*").ignore()
}

/// `name(args)` call of a fixed operator
fn call(op: impl Parslet + 'static) -> Joined<Dynamic> {
    seq(vec![
        dynamic(op),
        dynamic(ws()),
        dynamic(str("(")),
        dynamic(ws()),
        dynamic(ref_("arguments")),
        dynamic(ws()),
        dynamic(str(")")),
    ])
}

fn default_grammar() -> Grammar {
    let mut builder = GrammarBuilder::new().named(grammar_name(Baseline::Default));

    builder
        .rule_mut(
            "statement",
            seq(vec![dynamic(ws()), dynamic(ref_("expression")), dynamic(ws())]),
        )
        .rule_mut(
            "expression",
            choice(
                [
                    "function_call",
                    "builtin_operators",
                    "constant",
                    "number",
                    "identifier_alone",
                ]
                .map(ref_),
            ),
        )
        .rule_mut("function_call", call(ref_("func_id").label("name")))
        .rule_mut(
            "arguments",
            ref_("expression").then(
                seq(vec![
                    dynamic(ws()),
                    dynamic(str(",")),
                    dynamic(ws()),
                    dynamic(ref_("expression")),
                ])
                .many(),
            ),
        )
        // No custom functions until a variant lists some
        .rule_mut("func_id", never())
        .rule_mut("builtin_operators", ref_("predefined_built_operators"))
        .rule_mut(
            "predefined_built_operators",
            call(choice(["exp", "log", "sqrt"].map(str)).label("op")),
        );

    for symbol in PACKAGE_SYMBOLS {
        builder.rule_mut(symbol, call(str(symbol).label(symbol)));
    }

    builder
        .rule_mut("constant", ref_("pi"))
        .rule_mut("pi", str("π").label("pi"))
        .rule_mut("e", str("e").label("e"))
        .rule_mut("number", re(r"[0-9]+(\.[0-9]+)?").label("number"))
        .rule_mut(
            "identifier_alone",
            ref_("KEYWORDS").not_ahead().then(ordinary_identifier()),
        )
        .rule_mut("KEYWORDS", ref_("BUILTIN_KEYWORDS"))
        .rule_mut(
            "BUILTIN_KEYWORDS",
            choice(["where", "given", "sum", "for", "in"].map(str)),
        );

    builder.build()
}

/// Letter identifier or backtick-quoted literal
pub(crate) fn ordinary_identifier() -> Pair<Wrapped<Leaf>, Joined<Dynamic>> {
    re(LETTER_PATTERN).label("value").or(quoted_identifier())
}

pub(crate) fn quoted_identifier() -> Joined<Dynamic> {
    seq(vec![
        dynamic(str("`")),
        dynamic(re(QUOTED_PATTERN).label("id")),
        dynamic(str("`")),
    ])
}

fn init_grammar() -> Grammar {
    let separator = re("[ \\t]*[,\\n][ \\t\\n]*").ignore();
    GrammarBuilder::new()
        .named(grammar_name(Baseline::Init))
        .rule(
            "where_block",
            seq(vec![
                dynamic(ws()),
                dynamic(str("where").ignore()),
                dynamic(re("[ \\t\\n]+").ignore()),
                dynamic(ref_("definition")),
                dynamic(separator.then(ref_("definition")).many()),
                dynamic(re("[ \\t\\n]*").ignore()),
            ]),
        )
        .rule(
            "definition",
            seq(vec![
                dynamic(ref_("identifier").label("name")),
                dynamic(ws()),
                dynamic(str(":")),
                dynamic(ws()),
                dynamic(ref_("type_name").label("type")),
            ]),
        )
        .rule("identifier", ordinary_identifier())
        .rule(
            "type_name",
            choice(vec![
                dynamic(re("ℝ(\\^[0-9]+(×[0-9]+)?)?")),
                dynamic(str("scalar")),
                dynamic(str("vector")),
                dynamic(str("matrix")),
            ]),
        )
        .build()
}

/// Emitted source of one baseline template
#[derive(Debug, Clone)]
pub struct Template {
    /// Which baseline this is
    pub which: Baseline,
    /// Template file
    pub artifact: Artifact,
    /// Emitted source text
    pub source: String,
}

/// The two baseline templates
#[derive(Debug, Clone)]
pub struct BaselineTemplates {
    init: Template,
    default: Template,
}

impl BaselineTemplates {
    /// Read the newest template of each baseline from `dir`
    pub fn load(dir: &Path, prefix: &str) -> Result<Self> {
        let store = ArtifactStore::open(dir, prefix)?;
        let init = load_one(&store, Baseline::Init)?;
        let default = load_one(&store, Baseline::Default)?;
        match (init, default) {
            (Some(init), Some(default)) => Ok(Self { init, default }),
            (None, _) => Err(missing(Baseline::Init, dir)),
            (_, None) => Err(missing(Baseline::Default, dir)),
        }
    }

    /// Regenerate both templates from the built-in grammars
    pub fn emit(dir: &Path, prefix: &str, compiler: &dyn GrammarCompiler) -> Result<Self> {
        let store = ArtifactStore::open(dir, prefix)?;
        Ok(Self {
            init: emit_one(&store, Baseline::Init, compiler)?,
            default: emit_one(&store, Baseline::Default, compiler)?,
        })
    }

    /// Load templates, emitting whichever are missing
    pub fn load_or_emit(dir: &Path, prefix: &str, compiler: &dyn GrammarCompiler) -> Result<Self> {
        let store = ArtifactStore::open(dir, prefix)?;
        let init = match load_one(&store, Baseline::Init)? {
            Some(template) => template,
            None => emit_one(&store, Baseline::Init, compiler)?,
        };
        let default = match load_one(&store, Baseline::Default)? {
            Some(template) => template,
            None => emit_one(&store, Baseline::Default, compiler)?,
        };
        Ok(Self { init, default })
    }

    /// Template of one baseline
    pub fn get(&self, which: Baseline) -> &Template {
        match which {
            Baseline::Init => &self.init,
            Baseline::Default => &self.default,
        }
    }

    /// Source text of one baseline
    pub fn source(&self, which: Baseline) -> &str {
        &self.get(which).source
    }

    /// Timestamp encoded in one baseline's template file name
    pub fn created_at(&self, which: Baseline) -> PrimitiveDateTime {
        self.get(which).artifact.created_at
    }

    /// Both templates, `init` first
    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        [&self.init, &self.default].into_iter()
    }
}

fn missing(which: Baseline, dir: &Path) -> VariantError {
    VariantError::MissingBaseline {
        which: which.key(),
        dir: dir.to_path_buf(),
    }
}

fn load_one(store: &ArtifactStore, which: Baseline) -> Result<Option<Template>> {
    let Some(artifact) = store.find(which.fingerprint())? else {
        return Ok(None);
    };
    let source = store.read(&artifact)?;
    Ok(Some(Template {
        which,
        artifact,
        source,
    }))
}

fn emit_one(store: &ArtifactStore, which: Baseline, compiler: &dyn GrammarCompiler) -> Result<Template> {
    let source = compiler
        .emit_source(&grammar(which), &grammar_name(which))
        .map_err(|source| VariantError::Compile {
            key: which.key().to_string(),
            source,
        })?;
    let artifact = store.write(which.fingerprint(), &source)?;
    log_info!("emitted `{}` baseline template {}", which, artifact.name);
    Ok(Template {
        which,
        artifact,
        source,
    })
}
